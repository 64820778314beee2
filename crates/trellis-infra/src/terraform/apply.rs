//! Folding `terraform apply -json` events into a per-resource report

use std::fmt;

use serde::Deserialize;
use tracing::debug;

/// Resource that failed to apply
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceFailure {
    /// Resource address, empty for configuration-level diagnostics
    pub address: String,
    /// Diagnostic summary and detail
    pub message: String,
}

/// Counts from Terraform's change summary
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct ChangeSummary {
    /// Resources created
    #[serde(default)]
    pub add: u32,
    /// Resources updated in place
    #[serde(default)]
    pub change: u32,
    /// Resources destroyed
    #[serde(default)]
    pub remove: u32,
}

/// Outcome of an apply, resource by resource
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Addresses of resources applied successfully
    pub applied: Vec<String>,
    /// Resources that failed
    pub failed: Vec<ResourceFailure>,
    /// Final change counts, when Terraform reported them
    pub summary: Option<ChangeSummary>,
}

/// Apply finished but some resources failed
#[derive(Debug, PartialEq, Eq)]
pub struct ApplyFailed {
    /// Failures from the report
    pub failed: Vec<ResourceFailure>,
}

impl fmt::Display for ApplyFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} resource(s) failed", self.failed.len())?;
        for failure in &self.failed {
            if failure.address.is_empty() {
                write!(f, "; {}", failure.message)?;
            } else {
                write!(f, "; {}: {}", failure.address, failure.message)?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for ApplyFailed {}

#[derive(Deserialize)]
struct Event {
    #[serde(rename = "@message", default)]
    message: String,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    hook: Option<Hook>,
    #[serde(default)]
    diagnostic: Option<Diagnostic>,
    #[serde(default)]
    changes: Option<ChangeSummary>,
}

#[derive(Deserialize)]
struct Hook {
    resource: HookResource,
}

#[derive(Deserialize)]
struct HookResource {
    addr: String,
}

#[derive(Deserialize)]
struct Diagnostic {
    severity: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    detail: String,
    #[serde(default)]
    address: Option<String>,
}

impl ApplyReport {
    /// Build a report from a complete event stream
    pub fn from_event_stream(stream: &str) -> Self {
        let mut report = Self::default();
        for line in stream.lines() {
            report.record(line);
        }
        report
    }

    /// Fold one line of the event stream into the report
    ///
    /// Returns the event's human-readable message. Lines that are not JSON
    /// events are ignored.
    pub fn record(&mut self, line: &str) -> Option<String> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let event: Event = match serde_json::from_str(line) {
            Ok(event) => event,
            Err(e) => {
                debug!(error = %e, "ignoring non-event terraform output line");
                return None;
            }
        };

        match event.kind.as_str() {
            "apply_complete" => {
                if let Some(hook) = event.hook {
                    self.applied.push(hook.resource.addr);
                }
            }
            "apply_errored" => {
                if let Some(hook) = event.hook {
                    self.record_failure(hook.resource.addr, String::new());
                }
            }
            "diagnostic" => {
                if let Some(diagnostic) = event.diagnostic {
                    if diagnostic.severity == "error" {
                        let message = if diagnostic.detail.is_empty() {
                            diagnostic.summary
                        } else {
                            format!("{}: {}", diagnostic.summary, diagnostic.detail)
                        };
                        self.record_failure(diagnostic.address.unwrap_or_default(), message);
                    }
                }
            }
            "change_summary" => self.summary = event.changes,
            _ => {}
        }

        Some(event.message)
    }

    fn record_failure(&mut self, address: String, message: String) {
        // apply_errored and its diagnostic describe the same failure
        if !address.is_empty() {
            if let Some(existing) = self.failed.iter_mut().find(|f| f.address == address) {
                if existing.message.is_empty() {
                    existing.message = message;
                }
                return;
            }
        }
        self.failed.push(ResourceFailure { address, message });
    }

    /// Whether every resource applied
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Addresses of the failed resources
    pub fn failed_addresses(&self) -> Vec<&str> {
        self.failed
            .iter()
            .filter(|f| !f.address.is_empty())
            .map(|f| f.address.as_str())
            .collect()
    }

    /// Turn a report with failures into an error
    pub fn into_result(self) -> Result<Self, ApplyFailed> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(ApplyFailed {
                failed: self.failed,
            })
        }
    }
}
