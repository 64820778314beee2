//! Immutable diagnostic context passed explicitly through operations
//!
//! Operations receive a [`DiagnosticContext`] by reference, derive an enriched
//! copy with [`DiagnosticContext::with`] for nested work, open a tracing span
//! from it, and attach it to the errors they return. Nothing is shared or
//! mutated between calls.

use std::fmt;

use tracing::Span;

/// Ordered key/value fields describing the operation in progress
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DiagnosticContext {
    fields: Vec<(String, String)>,
}

impl DiagnosticContext {
    /// Create an empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a copy of this context with `key` set to `value`
    ///
    /// Setting an existing key replaces its value in place, keeping field order.
    pub fn with(&self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        let key = key.into();
        let value = value.to_string();
        let mut fields = self.fields.clone();
        match fields.iter_mut().find(|(k, _)| *k == key) {
            Some(existing) => existing.1 = value,
            None => fields.push((key, value)),
        }
        Self { fields }
    }

    /// Look up the value of a field
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Iterate over fields in insertion order
    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Whether the context has no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Open an info-level span carrying these fields
    pub fn span(&self) -> Span {
        tracing::info_span!("trellis", context = %self)
    }
}

impl fmt::Display for DiagnosticContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}={}", key, value)?;
        }
        Ok(())
    }
}
