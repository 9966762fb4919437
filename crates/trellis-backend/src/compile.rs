use tracing::{debug, info, warn};
use trellis_analysis::contracts::{self, Diagnostic, DiagnosticLevel, Diagnostics};
use trellis_analysis::visibility::{self, EventFilter};
use trellis_core::config::ExecutionConfig;
use trellis_core::ir::Node;
use trellis_core::traits::Backend;
use trellis_core::types::{ContractMode, VisibilityMap};
use trellis_core::{Result, TrellisError};

/// Output of [`compile_checked`]: the backend artifact plus the results of
/// the static passes that ran before it.
#[derive(Debug)]
pub struct Compilation<C> {
    pub artifact: C,
    pub diagnostics: Vec<Diagnostic>,
    pub visibility: VisibilityMap,
}

impl<C> Compilation<C> {
    /// Event filter for the compiled tree under `config.visibility`.
    pub fn event_filter(&self, config: &ExecutionConfig) -> EventFilter {
        EventFilter::new(self.visibility.clone(), config.visibility)
    }
}

/// Run the contract and visibility passes, then hand the tree to `backend`.
///
/// `config.contract_mode` decides what diagnostics do: `advisory` logs them,
/// `strict` fails on the first error-level diagnostic, `unchecked` skips the
/// contract pass.
pub fn compile_checked<B: Backend>(
    backend: &B,
    node: &Node,
    config: &ExecutionConfig,
) -> Result<Compilation<B::Compiled>> {
    let diagnostics = match config.contract_mode {
        ContractMode::Unchecked => {
            debug!(root = node.name(), "Contract check skipped");
            Vec::new()
        }
        mode => {
            let diagnostics = contracts::check(node);
            for d in &diagnostics {
                match d.level {
                    DiagnosticLevel::Error | DiagnosticLevel::Warning => {
                        warn!(node = %d.node, level = %d.level, "{}", d.message)
                    }
                    DiagnosticLevel::Info => debug!(node = %d.node, "{}", d.message),
                }
            }
            let errors = diagnostics.errors();
            if mode == ContractMode::Strict && !errors.is_empty() {
                return Err(TrellisError::ContractViolation {
                    count: errors.len(),
                    first: errors[0].to_string(),
                });
            }
            diagnostics
        }
    };

    let visibility = visibility::infer(node, config.visibility);
    let artifact = backend.compile(node, config)?;
    info!(
        backend = backend.name(),
        root = node.name(),
        nodes = node.count(),
        diagnostics = diagnostics.len(),
        "Compiled workflow"
    );

    Ok(Compilation {
        artifact,
        diagnostics,
        visibility,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dry_run::DryRunBackend;
    use crate::mock::MockBackend;
    use trellis_core::types::{Visibility, VisibilityPolicy};
    use trellis_test_utils::{schema_mismatch, three_step_chain};

    #[test]
    fn test_advisory_keeps_going() {
        let compiled = compile_checked(
            &MockBackend::new(),
            &schema_mismatch(),
            &ExecutionConfig::default(),
        )
        .unwrap();
        assert!(compiled.diagnostics.has_errors());
        assert_eq!(compiled.artifact, schema_mismatch());
    }

    #[test]
    fn test_strict_aborts_on_error() {
        let config = ExecutionConfig::default().with_contract_mode(ContractMode::Strict);
        let err = compile_checked(&MockBackend::new(), &schema_mismatch(), &config).unwrap_err();
        let TrellisError::ContractViolation { count, first } = err else {
            panic!("expected contract violation");
        };
        assert_eq!(count, 1);
        assert!(first.contains("'f3'"));
    }

    #[test]
    fn test_strict_passes_clean_tree() {
        let config = ExecutionConfig::default().with_contract_mode(ContractMode::Strict);
        let node = three_step_chain().build().unwrap();
        let compiled = compile_checked(&DryRunBackend, &node, &config).unwrap();
        assert!(!compiled.diagnostics.has_errors());
        assert_eq!(compiled.artifact.steps.len(), 4);
    }

    #[test]
    fn test_unchecked_skips_contracts() {
        let config = ExecutionConfig::default().with_contract_mode(ContractMode::Unchecked);
        let compiled = compile_checked(&MockBackend::new(), &schema_mismatch(), &config).unwrap();
        assert!(compiled.diagnostics.is_empty());
    }

    #[test]
    fn test_visibility_follows_config() {
        let node = three_step_chain().build().unwrap();
        let config = ExecutionConfig::default().with_visibility(VisibilityPolicy::Filtered);
        let compiled = compile_checked(&MockBackend::new(), &node, &config).unwrap();
        assert_eq!(compiled.visibility["research"], Visibility::Internal);
        assert_eq!(compiled.visibility["edit"], Visibility::User);
        assert_eq!(compiled.event_filter(&config).policy(), VisibilityPolicy::Filtered);
    }
}
