//! Content-level problems found while reading a log.
//!
//! Nothing here is an error: a bad line contributes no state and reading
//! carries on. Callers choose where warnings go by supplying a
//! [`WarningSink`].

use std::fmt;

use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub enum Warning {
    /// The line has no `T<seconds>` token.
    MissingTimestamp { line: usize, raw: String },
    /// The leading token starts with `T` but is not a valid offset.
    MalformedTimestamp { line: usize, token: String },
    /// First line of a contiguous run of undecodable compressed lines.
    CorruptPayload { line: usize, error: String },
    /// Emitted once a corrupt run of more than one line ends.
    CorruptRunEnded { line: usize, more: usize },
    /// A reserved event (or handler-claimed payload) that could not be applied.
    BadEvent {
        line: usize,
        payload: String,
        reason: String,
    },
    /// The final line has no terminating newline; a crash artifact.
    Unterminated { line: usize },
}

impl Warning {
    pub fn line(&self) -> usize {
        match self {
            Warning::MissingTimestamp { line, .. }
            | Warning::MalformedTimestamp { line, .. }
            | Warning::CorruptPayload { line, .. }
            | Warning::CorruptRunEnded { line, .. }
            | Warning::BadEvent { line, .. }
            | Warning::Unterminated { line } => *line,
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::MissingTimestamp { raw, .. } => {
                write!(f, "missing timestamp: {:?}", preview(raw))
            }
            Warning::MalformedTimestamp { token, .. } => {
                write!(f, "malformed timestamp {:?}", token)
            }
            Warning::CorruptPayload { error, .. } => {
                write!(f, "corrupt compressed payload: {}", error)
            }
            Warning::CorruptRunEnded { more, .. } => {
                write!(f, "...and {} more corrupt line(s)", more)
            }
            Warning::BadEvent {
                payload, reason, ..
            } => write!(f, "unusable event {:?}: {}", preview(payload), reason),
            Warning::Unterminated { .. } => write!(f, "incomplete final line ignored"),
        }
    }
}

fn preview(s: &str) -> String {
    if s.chars().count() > 60 {
        format!("{}...", s.chars().take(57).collect::<String>())
    } else {
        s.to_string()
    }
}

pub trait WarningSink {
    fn warn(&mut self, warning: Warning);
}

/// Collects warnings in order.
impl WarningSink for Vec<Warning> {
    fn warn(&mut self, warning: Warning) {
        self.push(warning);
    }
}

/// Forwards warnings to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl WarningSink for TracingSink {
    fn warn(&mut self, warning: Warning) {
        warn!(line = warning.line(), "{}", warning);
    }
}

/// Discards warnings.
#[derive(Debug, Default, Clone, Copy)]
pub struct IgnoreWarnings;

impl WarningSink for IgnoreWarnings {
    fn warn(&mut self, _warning: Warning) {}
}

/// Collapses runs of corrupt lines into one warning plus a trailing count.
#[derive(Debug, Default)]
pub(crate) struct CorruptRun {
    count: usize,
    last_line: usize,
}

impl CorruptRun {
    pub(crate) fn failed(&mut self, sink: &mut dyn WarningSink, line: usize, error: String) {
        if self.count == 0 {
            sink.warn(Warning::CorruptPayload { line, error });
        }
        self.count += 1;
        self.last_line = line;
    }

    /// Close out the current run, if any.
    pub(crate) fn end(&mut self, sink: &mut dyn WarningSink) {
        if self.count > 1 {
            sink.warn(Warning::CorruptRunEnded {
                line: self.last_line,
                more: self.count - 1,
            });
        }
        self.count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corrupt_run_reports_first_and_count() {
        let mut sink: Vec<Warning> = Vec::new();
        let mut run = CorruptRun::default();

        for line in 4..=7 {
            run.failed(&mut sink, line, "bad".to_string());
        }
        run.end(&mut sink);

        assert_eq!(
            sink,
            vec![
                Warning::CorruptPayload {
                    line: 4,
                    error: "bad".to_string()
                },
                Warning::CorruptRunEnded { line: 7, more: 3 },
            ]
        );
    }

    #[test]
    fn test_single_corrupt_line_has_no_summary() {
        let mut sink: Vec<Warning> = Vec::new();
        let mut run = CorruptRun::default();

        run.failed(&mut sink, 2, "bad".to_string());
        run.end(&mut sink);
        run.end(&mut sink);

        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_sinks_accept_every_warning() {
        let warning = Warning::Unterminated { line: 9 };
        TracingSink.warn(warning.clone());
        IgnoreWarnings.warn(warning.clone());
        assert_eq!(warning.line(), 9);
        assert_eq!(warning.to_string(), "incomplete final line ignored");
    }

    #[test]
    fn test_display_truncates_long_payloads() {
        let warning = Warning::BadEvent {
            line: 1,
            payload: "x".repeat(100),
            reason: "nope".to_string(),
        };
        let text = warning.to_string();
        assert!(text.contains("..."));
        assert!(text.len() < 100);
    }
}
