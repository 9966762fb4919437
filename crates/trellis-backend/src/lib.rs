pub mod compile;
pub mod dry_run;
pub mod mock;
pub mod protocol;

pub use compile::{compile_checked, Compilation};
pub use dry_run::{DryRunBackend, ExecutionPlan, PlanStep};
pub use mock::{MockBackend, MockResponse};
pub use protocol::{collect_stream, final_response, merged_state, Backend};
