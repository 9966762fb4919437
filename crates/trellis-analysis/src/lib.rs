pub mod contracts;
pub mod export;
pub mod template;
pub mod visibility;

pub use contracts::{check, check_with, Diagnostic, DiagnosticLevel, Diagnostics};
pub use export::{export, ExportOptions, GraphFormat};
pub use visibility::{infer, EventFilter};
