use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Result, TrellisError};
use crate::types::{ContractMode, VisibilityPolicy};

/// Configuration handed to `Backend::compile`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default = "default_app_name")]
    pub app_name: String,
    /// Ordered middleware stack, outermost first.
    #[serde(default)]
    pub middleware: Vec<Middleware>,
    /// Whether the runtime may resume an interrupted invocation.
    #[serde(default)]
    pub resumable: bool,
    #[serde(default)]
    pub compaction: Option<CompactionConfig>,
    #[serde(default)]
    pub contract_mode: ContractMode,
    #[serde(default)]
    pub visibility: VisibilityPolicy,
}

fn default_app_name() -> String {
    "trellis".to_string()
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            middleware: Vec::new(),
            resumable: false,
            compaction: None,
            contract_mode: ContractMode::default(),
            visibility: VisibilityPolicy::default(),
        }
    }
}

impl ExecutionConfig {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            ..Self::default()
        }
    }

    pub fn with_middleware(mut self, middleware: Middleware) -> Self {
        self.middleware.push(middleware);
        self
    }

    pub fn with_contract_mode(mut self, mode: ContractMode) -> Self {
        self.contract_mode = mode;
        self
    }

    pub fn with_visibility(mut self, policy: VisibilityPolicy) -> Self {
        self.visibility = policy;
        self
    }

    pub fn with_compaction(mut self, compaction: CompactionConfig) -> Self {
        self.compaction = Some(compaction);
        self
    }

    pub fn resumable(mut self, resumable: bool) -> Self {
        self.resumable = resumable;
        self
    }

    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| TrellisError::ConfigNotFound(path.display().to_string()))?;

        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(&content);

        let config: Self =
            toml::from_str(&expanded).map_err(|e| TrellisError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the runtime could not honour.
    pub fn validate(&self) -> Result<()> {
        if self.app_name.trim().is_empty() {
            return Err(TrellisError::Config("app_name must not be empty".into()));
        }
        if let Some(c) = &self.compaction {
            if c.interval == 0 {
                return Err(TrellisError::Config("compaction.interval must be at least 1".into()));
            }
            if c.overlap >= c.interval {
                return Err(TrellisError::Config(format!(
                    "compaction.overlap ({}) must be smaller than interval ({})",
                    c.overlap, c.interval
                )));
            }
        }
        for m in &self.middleware {
            if let Middleware::Retry(r) = m {
                if r.initial_backoff_ms > r.max_backoff_ms {
                    return Err(TrellisError::Config(
                        "retry.initial_backoff_ms exceeds max_backoff_ms".into(),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// One layer of the runtime's middleware stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Middleware {
    /// Retry failed model/tool calls with exponential backoff.
    Retry(RetryConfig),
    /// Structured logging of every event.
    Logging {
        #[serde(default = "default_log_level")]
        level: String,
    },
    /// Abort once the invocation has spent this many tokens.
    TokenBudget { max_tokens: u64 },
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Retry configuration for model and tool calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

fn default_max_retries() -> u32 { 3 }
fn default_initial_backoff() -> u64 { 1000 }
fn default_max_backoff() -> u64 { 30000 }

/// Conversation compaction policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompactionConfig {
    /// Compact every N invocations.
    #[serde(default = "default_compaction_interval")]
    pub interval: u32,
    /// Invocations carried over between compaction windows.
    #[serde(default = "default_compaction_overlap")]
    pub overlap: u32,
    /// Compact early once history exceeds this many bytes.
    #[serde(default)]
    pub size_threshold: Option<u64>,
    /// Compact early once history exceeds this many tokens.
    #[serde(default)]
    pub token_threshold: Option<u64>,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            interval: default_compaction_interval(),
            overlap: default_compaction_overlap(),
            size_threshold: None,
            token_threshold: None,
        }
    }
}

fn default_compaction_interval() -> u32 { 10 }
fn default_compaction_overlap() -> u32 { 2 }

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    warn!(var = %var_name, "Config references unset environment variable");
                    result.push_str("${");
                    result.push_str(&var_name);
                    result.push('}');
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}
