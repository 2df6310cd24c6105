//! Error report sink
//!
//! Components hand breadcrumbs about non-fatal failures to a reporter
//! the embedding application supplies. Reporting is fire-and-forget;
//! callers never branch on it.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

pub trait ErrorReporter: Send + Sync {
    fn report(&self, message: &str, tag: &str, severity: Severity, description: &str);
}

/// Default reporter: forwards everything to the log.
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&self, message: &str, tag: &str, severity: Severity, description: &str) {
        match severity {
            Severity::Error => {
                tracing::error!(tag = %tag, description = %description, "{message}")
            }
            Severity::Warning => {
                tracing::warn!(tag = %tag, description = %description, "{message}")
            }
            Severity::Info => {
                tracing::info!(tag = %tag, description = %description, "{message}")
            }
        }
    }
}
