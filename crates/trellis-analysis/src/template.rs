use std::sync::OnceLock;

use regex::Regex;

/// A `{key}` reference inside an instruction. `{key?}` marks it optional.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    pub key: String,
    pub optional: bool,
}

fn pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\{\{|\}\}|\{([A-Za-z_][A-Za-z0-9_]*(?::[A-Za-z_][A-Za-z0-9_]*)?)(\?)?\}")
            .unwrap()
    })
}

/// Placeholders in order of appearance. `{{` and `}}` are literal braces.
pub fn placeholders(template: &str) -> Vec<Placeholder> {
    pattern()
        .captures_iter(template)
        .filter_map(|caps| {
            let key = caps.get(1)?;
            Some(Placeholder {
                key: key.as_str().to_string(),
                optional: caps.get(2).is_some(),
            })
        })
        .collect()
}

/// Keys the template cannot render without.
pub fn required_keys(template: &str) -> Vec<String> {
    placeholders(template)
        .into_iter()
        .filter(|p| !p.optional)
        .map(|p| p.key)
        .collect()
}
