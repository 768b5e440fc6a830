//! # Leaf Error Type
//!
//! [`ChiError`] covers operations that are either-or — parsing, mangling,
//! cache I/O — where there is no use accumulating multiple findings. The
//! accumulating carrier for the compilation pipeline proper is
//! [`crate::diagnostic::DiagnosticRecord`]; see that module's doc comment
//! for the split.

use crate::diagnostic::DiagnosticRecord;

/// Result type used for non-accumulating operations throughout the crate.
pub type Result<T> = std::result::Result<T, ChiError>;

#[derive(Debug, thiserror::Error)]
pub enum ChiError {
    #[error("module not found: {0}")]
    ModuleNotFound(String),

    #[error("type not found: {0}")]
    TypeNotFound(String),

    #[error("node type not found: {0}")]
    NodeTypeNotFound(String),

    #[error("module {0} is still depended on by {1}")]
    ModuleInUse(String, String),

    #[error("workspace marker not found above {0}")]
    WorkspaceNotFound(String),

    #[error("malformed module JSON: {0}")]
    Parse(String),

    #[error("mangling error: {0}")]
    Mangle(#[from] crate::mangle::UnmangleError),

    #[error("cache I/O error for {module}: {source}")]
    Cache { module: String, #[source] source: std::io::Error },

    #[error("subprocess {program} failed: {detail}")]
    Subprocess { program: String, detail: String },

    #[error("LLVM IR verification failed for function {0}")]
    IrVerify(String),

    #[error("{0}")]
    Custom(String),
}

impl ChiError {
    /// The diagnostic code this error maps to (spec §7's component prefixes).
    pub fn code(&self) -> &'static str {
        match self {
            ChiError::ModuleNotFound(_) | ChiError::TypeNotFound(_) | ChiError::NodeTypeNotFound(_) => "ENotFound",
            ChiError::ModuleInUse(..) => "EModuleInUse",
            ChiError::WorkspaceNotFound(_) => "ENotFound",
            ChiError::Parse(_) => "EParse",
            ChiError::Mangle(_) => "EMangle",
            ChiError::Cache { .. } => "ECache",
            ChiError::Subprocess { .. } => "EFetch",
            ChiError::IrVerify(_) => "EIRVerify",
            ChiError::Custom(_) => "ECustom",
        }
    }
}

/// Converts a leaf error into a single-entry diagnostic record, so both
/// vocabularies compose at call boundaries (spec §7).
impl From<ChiError> for DiagnosticRecord {
    fn from(err: ChiError) -> Self {
        DiagnosticRecord::error(err.code(), err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_into_a_single_entry_diagnostic_record() {
        let record: DiagnosticRecord = ChiError::ModuleNotFound("a/b".to_string()).into();
        assert!(!record.success());
        assert_eq!(record.entries().len(), 1);
        assert_eq!(record.entries()[0].code, "ENotFound");
    }
}
