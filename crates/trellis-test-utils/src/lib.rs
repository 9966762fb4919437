//! Workflows and tables reused across crate tests.

use serde_json::json;
use trellis_core::schema::{FieldType, Schema};
use trellis_core::{Node, Predicate};
use trellis_flow::{capture, Agent, Compose, Flow, Routes};

/// `research >> write >> edit`, each step feeding the next.
pub fn three_step_chain() -> Flow {
    Agent::new("research").outputs("findings")
        >> Agent::new("write")
            .instruct("Write a draft from {findings}.")
            .outputs("draft")
        >> Agent::new("edit").instruct("Polish {draft}.")
}

/// Capture the question, classify it, then route on the intent.
pub fn support_router() -> Flow {
    (capture("question")
        >> Agent::new("classifier")
            .instruct("Classify: {question}")
            .outputs("intent"))
    .branch(
        Routes::new()
            .when("billing", Agent::new("billing").instruct("Answer billing question: {question}"))
            .when("tech", Agent::new("tech").instruct("Answer tech question: {question}")),
    )
    .expect("classifier declares an output key")
}

/// Draft/review loop that exits once `approved` is truthy.
pub fn review_loop(max: u32) -> Flow {
    (Agent::new("draft").outputs("text") >> Agent::new("review").reads(["text"]).outputs("approved"))
        .until_max(Predicate::truthy("approved"), max)
}

/// `a` produces {f1, f2}; `b` consumes {f1, f2, f3}.
pub fn schema_mismatch() -> Node {
    let a = Agent::new("a").produces(
        Schema::new("Partial")
            .field("f1", FieldType::String)
            .field("f2", FieldType::String),
    );
    let b = Agent::new("b").consumes(
        Schema::new("Full")
            .field("f1", FieldType::String)
            .field("f2", FieldType::String)
            .field("f3", FieldType::String),
    );
    (a >> b).build().expect("fixture lowers")
}

/// Two-step sequence `a >> b`.
pub fn pair() -> Node {
    (Agent::new("a") >> Agent::new("b"))
        .build()
        .expect("fixture lowers")
}

/// Mock responses for [`pair`]: text for `a`, a state record for `b`.
pub fn pair_responses() -> serde_json::Value {
    json!({ "a": "hello", "b": { "x": 1 } })
}

/// An execution config in TOML, with an env reference for `app_name`.
pub const SAMPLE_CONFIG: &str = r#"
app_name = "${TRELLIS_TEST_APP}"
resumable = true
contract_mode = "strict"
visibility = "annotate"

[[middleware]]
type = "retry"
max_retries = 5

[[middleware]]
type = "logging"

[compaction]
interval = 8
overlap = 2
"#;
