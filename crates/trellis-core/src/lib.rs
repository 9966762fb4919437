pub mod config;
pub mod error;
pub mod event;
pub mod ir;
pub mod predicate;
pub mod schema;
pub mod state_op;
pub mod traits;
pub mod types;

pub use config::ExecutionConfig;
pub use error::{Result, TrellisError};
pub use event::{Event, EventActions, Failure, FailureKind};
pub use ir::{Node, NodeKind};
pub use predicate::Predicate;
pub use schema::{FieldType, Schema};
pub use state_op::StateOp;
pub use traits::Backend;
pub use types::*;
