//! Configuration checks beyond schema validation
//!
//! Schema-level constraints (URLs, email, ranges) are enforced by the
//! `validator` derives when loading. The checks here flag configurations
//! that load fine but are probably not what the operator wants.

mod lint;

pub use lint::lint_config;

/// Result of linting a configuration
#[derive(Debug, Default, Clone)]
pub struct ValidationResult {
    /// Non-fatal findings
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    /// Create an empty result
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a warning
    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    /// Whether nothing was flagged
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// A non-fatal configuration finding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationWarning {
    pub message: String,
}

impl ValidationWarning {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}
