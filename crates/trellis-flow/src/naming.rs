//! Deterministic names for unnamed expressions.
//!
//! Derived names depend only on the shape of the expression and the names
//! of its children, so lowering the same expression twice yields the same
//! tree.

const MAX_SLUG_LEN: usize = 40;
const BODY_SUFFIX: &str = "_body";

/// Lowercase, non-alphanumerics folded to single underscores, trimmed.
pub fn slug(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    let trimmed = out.trim_matches('_');
    let mut slug: String = trimmed.chars().take(MAX_SLUG_LEN).collect();
    while slug.ends_with('_') {
        slug.pop();
    }
    slug
}

fn part(name: &str) -> &str {
    name.trim_start_matches('_')
}

fn joined<'a>(names: impl IntoIterator<Item = &'a str>, sep: &str) -> String {
    names.into_iter().map(part).collect::<Vec<_>>().join(sep)
}

pub(crate) fn sequence<'a>(children: impl IntoIterator<Item = &'a str>) -> String {
    joined(children, "_then_")
}

pub(crate) fn parallel<'a>(children: impl IntoIterator<Item = &'a str>) -> String {
    joined(children, "_and_")
}

pub(crate) fn fallback<'a>(children: impl IntoIterator<Item = &'a str>) -> String {
    joined(children, "_or_")
}

pub(crate) fn race<'a>(children: impl IntoIterator<Item = &'a str>) -> String {
    format!("race_{}", joined(children, "_"))
}

pub(crate) fn times(body: &str, n: u32) -> String {
    format!("{}_x{}", part(body), n)
}

/// Body of a predicate loop: the steps before its checkpoint.
pub(crate) fn loop_body<'a>(steps: impl IntoIterator<Item = &'a str>) -> String {
    let steps = joined(steps, "_then_");
    if steps.is_empty() {
        return "until_check_body".to_string();
    }
    format!("{steps}{BODY_SUFFIX}")
}

pub(crate) fn until(body: &str) -> String {
    let body = part(body);
    format!("{}_loop", body.strip_suffix(BODY_SUFFIX).unwrap_or(body))
}

pub(crate) fn map_over(list_key: &str) -> String {
    format!("map_{}", part(list_key))
}

pub(crate) fn timeout(body: &str) -> String {
    format!("{}_timeout", part(body))
}

pub(crate) fn route(key: &str) -> String {
    format!("route_{}", part(key))
}

pub(crate) fn gate(message: &str) -> String {
    format!("gate_{}", slug(message))
}

pub(crate) fn tap(keys: &[String]) -> String {
    if keys.is_empty() {
        return "tap".to_string();
    }
    format!("tap_{}", joined(keys.iter().map(String::as_str), "_"))
}

pub(crate) fn transform<'a>(writes: impl IntoIterator<Item = &'a str>) -> String {
    let body = joined(writes, "_");
    if body.is_empty() {
        "transform".to_string()
    } else {
        format!("transform_{body}")
    }
}

pub(crate) fn capture(key: &str) -> String {
    format!("capture_{}", part(key))
}

pub(crate) fn transfer(target: &str) -> String {
    format!("transfer_to_{}", part(target))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slug() {
        assert_eq!(slug("Ship to production?"), "ship_to_production");
        assert_eq!(slug("  --Hello,   World!-- "), "hello_world");
        assert_eq!(slug("???"), "");
        let long = "word ".repeat(20);
        assert!(slug(&long).len() <= MAX_SLUG_LEN);
        assert!(!slug(&long).ends_with('_'));
    }

    #[test]
    fn test_composite_names() {
        assert_eq!(sequence(["a", "b", "c"]), "a_then_b_then_c");
        assert_eq!(parallel(["a", "b"]), "a_and_b");
        assert_eq!(fallback(["fast", "slow"]), "fast_or_slow");
        assert_eq!(race(["fast", "thorough"]), "race_fast_thorough");
    }

    #[test]
    fn test_leading_underscores_trimmed() {
        assert_eq!(sequence(["draft", "_until_check"]), "draft_then_until_check");
        assert_eq!(loop_body(["draft", "review"]), "draft_then_review_body");
        assert_eq!(until("draft_then_review_body"), "draft_then_review_loop");
        assert_eq!(until("_poll"), "poll_loop");
        assert_eq!(times("_hidden", 3), "hidden_x3");
    }

    #[test]
    fn test_leaf_names() {
        assert_eq!(tap(&["a".into(), "b".into()]), "tap_a_b");
        assert_eq!(tap(&[]), "tap");
        assert_eq!(transform(["x"]), "transform_x");
        assert_eq!(transform(std::iter::empty()), "transform");
        assert_eq!(capture("question"), "capture_question");
        assert_eq!(transfer("billing"), "transfer_to_billing");
        assert_eq!(route("intent"), "route_intent");
        assert_eq!(map_over("docs"), "map_docs");
        assert_eq!(timeout("slow"), "slow_timeout");
        assert_eq!(gate("Approve?"), "gate_approve");
    }
}
