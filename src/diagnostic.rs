//! # Diagnostic Record
//!
//! An accumulating, composable result type threaded through the whole
//! compilation pipeline. A [`DiagnosticRecord`] never throws away
//! information: a module that fails to validate still carries forward
//! the diagnostics of every function that *did* compile cleanly.
//!
//! This is the Rust equivalent of the original `chig::Result` type: a
//! `bool success` plus an ordered list of structured entries, composable
//! by concatenation.
//!
//! # Example
//!
//! ```
//! use chigraph::diagnostic::{DiagnosticRecord, Severity};
//!
//! let mut record = DiagnosticRecord::new();
//! record.push("ENotFound", "module not found", serde_json::json!({ "name": "foo" }));
//! assert!(!record.success());
//! println!("{}", record.render());
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity implied by an entry's error code.
///
/// Derived from the first character of the code (`E`, `W`, or `I`) rather
/// than stored redundantly, matching the original scheme in spec §4.A.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    /// `E*` — flips `success` to `false`.
    Error,
    /// `W*` — advisory, never flips `success`.
    Warning,
    /// `I*` — informational, never flips `success`.
    Info,
}

impl Severity {
    fn from_code(code: &str) -> Self {
        match code.as_bytes().first() {
            Some(b'E') => Severity::Error,
            Some(b'W') => Severity::Warning,
            Some(b'I') => Severity::Info,
            _ => panic!("diagnostic code must start with E, W, or I, got {code:?}"),
        }
    }
}

/// A single diagnostic entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticEntry {
    /// Error code, e.g. `"EConnErr"`, `"WDeprecated"`, `"INotice"`.
    pub code: String,

    /// Short human-readable overview of the entry.
    pub overview: String,

    /// Arbitrary structured payload (node UUIDs, file paths, ...).
    pub data: serde_json::Value,
}

impl DiagnosticEntry {
    /// Severity this entry's code implies.
    #[inline]
    pub fn severity(&self) -> Severity {
        Severity::from_code(&self.code)
    }
}

/// An accumulating, composable diagnostic result.
///
/// `DiagnosticRecord` is the carrier type returned by every fallible
/// operation in the compilation pipeline that can produce more than one
/// finding (loading, validating, compiling). Two records compose by
/// concatenating their entries; composition fails iff either operand has
/// already failed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiagnosticRecord {
    entries: Vec<DiagnosticEntry>,
    success: bool,
}

impl DiagnosticRecord {
    /// Creates a fresh, successful, empty record.
    #[inline]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            success: true,
        }
    }

    /// Appends one entry. An `E*` code flips `success` to `false`
    /// permanently — later successes can never un-fail a record.
    ///
    /// # Panics
    ///
    /// Panics if `code` does not start with `E`, `W`, or `I`, mirroring the
    /// `Expects(ec[0] == 'E' || ec[0] == 'I' || ec[0] == 'W')` assertion in
    /// the original `chig::Result::addEntry`.
    pub fn push(&mut self, code: impl Into<String>, overview: impl Into<String>, data: serde_json::Value) {
        let code = code.into();
        let severity = Severity::from_code(&code);
        self.entries.push(DiagnosticEntry {
            code,
            overview: overview.into(),
            data,
        });
        if severity == Severity::Error {
            self.success = false;
        }
    }

    /// Convenience for an error-severity entry with no payload.
    pub fn error(code: impl Into<String>, overview: impl Into<String>) -> Self {
        let mut record = Self::new();
        record.push(code, overview, serde_json::Value::Null);
        record
    }

    /// Whether every entry so far has been non-`E`.
    #[must_use]
    #[inline]
    pub fn success(&self) -> bool {
        self.success
    }

    /// All entries in the order they were recorded.
    #[inline]
    pub fn entries(&self) -> &[DiagnosticEntry] {
        &self.entries
    }

    /// Merges `other` into `self` in place, preserving order.
    pub fn extend(&mut self, other: DiagnosticRecord) {
        self.success &= other.success;
        self.entries.extend(other.entries);
    }

    /// Renders the record as the plain-text tree described in spec §7:
    /// `code: overview` lines followed by the pretty-printed payload.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&entry.code);
            out.push_str(": ");
            out.push_str(&entry.overview);
            out.push('\n');
            pretty_print_json(&entry.data, 1, &mut out);
        }
        out
    }
}

/// Recursive pretty-printer mirroring `chig::prettyPrintJson`.
fn pretty_print_json(value: &serde_json::Value, indent: usize, out: &mut String) {
    let pad = "\t".repeat(indent);
    match value {
        serde_json::Value::Array(items) => {
            out.push_str(&pad);
            out.push_str("[\n");
            for item in items {
                pretty_print_json(item, indent + 1, out);
                out.push_str(",\n");
            }
            out.push_str(&pad);
            out.push_str("]\n");
        }
        serde_json::Value::String(_) | serde_json::Value::Number(_) => {
            out.push_str(&pad);
            out.push_str(&value.to_string());
        }
        serde_json::Value::Object(map) => {
            for (key, val) in map {
                out.push_str(&pad);
                out.push_str(key);
                out.push('\n');
                pretty_print_json(val, indent + 1, out);
            }
        }
        _ => {}
    }
}

impl fmt::Display for DiagnosticRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

impl std::ops::Add for DiagnosticRecord {
    type Output = DiagnosticRecord;

    fn add(mut self, rhs: DiagnosticRecord) -> DiagnosticRecord {
        self.extend(rhs);
        self
    }
}

impl std::ops::AddAssign for DiagnosticRecord {
    fn add_assign(&mut self, rhs: DiagnosticRecord) {
        self.extend(rhs);
    }
}

impl FromIterator<DiagnosticRecord> for DiagnosticRecord {
    fn from_iter<T: IntoIterator<Item = DiagnosticRecord>>(iter: T) -> Self {
        let mut acc = DiagnosticRecord::new();
        for record in iter {
            acc.extend(record);
        }
        acc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_record_succeeds() {
        let record = DiagnosticRecord::new();
        assert!(record.success());
        assert!(record.entries().is_empty());
    }

    #[test]
    fn error_entry_flips_success() {
        let mut record = DiagnosticRecord::new();
        record.push("EConnErr", "bad connection", serde_json::json!({"node": "abc"}));
        assert!(!record.success());
        assert_eq!(record.entries().len(), 1);
    }

    #[test]
    fn warning_and_info_do_not_flip_success() {
        let mut record = DiagnosticRecord::new();
        record.push("WDeprecated", "old node type", serde_json::Value::Null);
        record.push("INotice", "fyi", serde_json::Value::Null);
        assert!(record.success());
    }

    #[test]
    fn composition_is_associative_and_conjunctive() {
        let mut a = DiagnosticRecord::new();
        a.push("IOk", "a", serde_json::Value::Null);

        let mut b = DiagnosticRecord::new();
        b.push("EBad", "b", serde_json::Value::Null);

        let mut c = DiagnosticRecord::new();
        c.push("IOk", "c", serde_json::Value::Null);

        let left = (a.clone() + b.clone()) + c.clone();
        let right = a + (b + c);

        assert_eq!(left.success(), right.success());
        assert_eq!(left.entries().len(), right.entries().len());
        assert!(!left.success());
    }

    #[test]
    fn entry_order_is_preserved() {
        let mut a = DiagnosticRecord::new();
        a.push("IFirst", "first", serde_json::Value::Null);
        let mut b = DiagnosticRecord::new();
        b.push("ISecond", "second", serde_json::Value::Null);

        let combined = a + b;
        let codes: Vec<_> = combined.entries().iter().map(|e| e.code.as_str()).collect();
        assert_eq!(codes, vec!["IFirst", "ISecond"]);
    }

    #[test]
    fn render_contains_code_and_overview() {
        let mut record = DiagnosticRecord::new();
        record.push("ENotFound", "module not found", serde_json::json!({"name": "foo"}));
        let rendered = record.render();
        assert!(rendered.contains("ENotFound: module not found"));
        assert!(rendered.contains("name"));
    }

    #[test]
    #[should_panic]
    fn invalid_code_prefix_panics() {
        let mut record = DiagnosticRecord::new();
        record.push("XBad", "nope", serde_json::Value::Null);
    }
}
