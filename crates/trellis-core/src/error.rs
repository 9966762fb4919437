use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrellisError {
    // Construction errors
    #[error("{node}: routing on a mapping requires a declared output key (call .outputs(key) first)")]
    MissingOutputKey { node: String },

    #[error("duplicate sibling name '{name}' inside '{parent}'")]
    DuplicateName { parent: String, name: String },

    #[error("{kind} requires at least one child")]
    EmptyComposite { kind: String },

    #[error("{node}: iteration bound must be at least 1 (got {bound})")]
    InvalidBound { node: String, bound: u32 },

    #[error("not a structural schema: {0}")]
    NotStructural(String),

    #[error("invalid predicate expression: {0}")]
    InvalidPredicate(String),

    // Compilation errors
    #[error("contract check failed with {count} error(s); first: {first}")]
    ContractViolation { count: usize, first: String },

    #[error("backend '{backend}' cannot {operation}: requires a live runtime")]
    Unimplemented { backend: String, operation: String },

    #[error("backend error: {0}")]
    Backend(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TrellisError>;
