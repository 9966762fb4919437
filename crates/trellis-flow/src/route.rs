use trellis_core::predicate::Predicate;
use trellis_core::{Result, TrellisError};

use crate::flow::{Flow, FlowKind};
use crate::ops;

/// Conditional routing on a state key: ordered predicate → branch rules
/// and an optional default. The first matching rule wins.
#[derive(Debug, Clone)]
pub struct Route {
    key: String,
    rules: Vec<(Predicate, Flow)>,
    default: Option<Flow>,
}

impl Route {
    pub fn on(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            rules: Vec::new(),
            default: None,
        }
    }

    /// Branch when the key equals `value`.
    pub fn equals(mut self, value: impl Into<serde_json::Value>, target: impl Into<Flow>) -> Self {
        let predicate = Predicate::equals(self.key.clone(), value);
        self.rules.push((predicate, target.into()));
        self
    }

    /// Branch when the key's string value contains `needle`.
    pub fn contains(mut self, needle: impl Into<String>, target: impl Into<Flow>) -> Self {
        let predicate = Predicate::contains(self.key.clone(), needle);
        self.rules.push((predicate, target.into()));
        self
    }

    /// Branch on an arbitrary predicate.
    pub fn when(mut self, predicate: Predicate, target: impl Into<Flow>) -> Self {
        self.rules.push((predicate, target.into()));
        self
    }

    /// Branch taken when no rule matches.
    pub fn otherwise(mut self, target: impl Into<Flow>) -> Self {
        self.default = Some(target.into());
        self
    }
}

impl From<Route> for Flow {
    fn from(route: Route) -> Self {
        Flow::from_kind(FlowKind::Route {
            key: route.key,
            rules: route.rules,
            default: route.default.map(Box::new),
        })
    }
}

/// A value → branch mapping applied to the output key of the preceding
/// step, e.g. `classifier.outputs("intent").branch(routes)`.
#[derive(Debug, Clone, Default)]
pub struct Routes {
    arms: Vec<(serde_json::Value, Flow)>,
    default: Option<Flow>,
}

impl Routes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(value, branch)` pairs, keeping their order.
    pub fn from_pairs<I, V, F>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (V, F)>,
        V: Into<serde_json::Value>,
        F: Into<Flow>,
    {
        Self {
            arms: pairs
                .into_iter()
                .map(|(v, f)| (v.into(), f.into()))
                .collect(),
            default: None,
        }
    }

    pub fn when(mut self, value: impl Into<serde_json::Value>, target: impl Into<Flow>) -> Self {
        self.arms.push((value.into(), target.into()));
        self
    }

    pub fn otherwise(mut self, target: impl Into<Flow>) -> Self {
        self.default = Some(target.into());
        self
    }

    /// `source >> Route(source.output_key)`. Fails when the source declares
    /// no output key.
    pub(crate) fn attach(self, source: Flow) -> Result<Flow> {
        let key = source
            .output_key()
            .ok_or_else(|| TrellisError::MissingOutputKey {
                node: source.label(),
            })?
            .to_string();

        let mut route = Route::on(key);
        for (value, target) in self.arms {
            route = route.equals(value, target);
        }
        if let Some(default) = self.default {
            route = route.otherwise(default);
        }
        Ok(ops::sequence(source, route.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Agent;
    use crate::flow::Compose;
    use trellis_core::NodeKind;

    #[test]
    fn test_branch_lowers_to_sequence_with_route() {
        let flow = Agent::new("classifier")
            .outputs("intent")
            .branch(
                Routes::new()
                    .when("billing", Agent::new("billing"))
                    .when("tech", Agent::new("tech")),
            )
            .unwrap();
        let node = flow.to_ir().unwrap();
        let steps = node.children();
        assert_eq!(steps.len(), 2);
        let NodeKind::Route {
            key,
            rules,
            default,
        } = steps[1].kind()
        else {
            panic!("expected route");
        };
        assert_eq!(key, "intent");
        assert_eq!(rules.len(), 2);
        assert!(default.is_none());
        assert_eq!(rules[0].predicate, Predicate::equals("intent", "billing"));
        assert_eq!(steps[1].name(), "route_intent");
    }

    #[test]
    fn test_branch_without_output_key_fails() {
        let err = Agent::new("classifier")
            .branch(Routes::new().when("x", Agent::new("x")))
            .unwrap_err();
        assert!(matches!(err, TrellisError::MissingOutputKey { ref node } if node == "classifier"));
        assert!(err.to_string().contains("output key"));
    }

    #[test]
    fn test_branch_uses_last_step_output_key() {
        let pipeline = Agent::new("fetch") >> Agent::new("label").outputs("category");
        let flow = pipeline
            .branch(Routes::from_pairs([("a", Agent::new("x")), ("b", Agent::new("y"))]))
            .unwrap();
        let node = flow.to_ir().unwrap();
        assert_eq!(node.children().len(), 3);
    }

    #[test]
    fn test_general_route_with_default() {
        let flow: Flow = Route::on("score")
            .when(Predicate::parse("score == 10").unwrap(), Agent::new("celebrate"))
            .contains("retry", Agent::new("again"))
            .otherwise(Agent::new("fallthrough"))
            .into();
        let node = flow.to_ir().unwrap();
        assert_eq!(node.children().len(), 3);
    }
}
