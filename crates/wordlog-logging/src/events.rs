use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::PathBuf;

/// Operator-facing events emitted by the wordlog CLI
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LogEvent {
    ReplayFinished {
        path: PathBuf,
        lines: usize,
        entries: usize,
        sessions: usize,
        elapsed_secs: f64,
        corrupt_lines: usize,
    },
    SessionOpened {
        path: PathBuf,
        resumed: bool,
    },
    SessionClosed {
        path: PathBuf,
        elapsed_secs: f64,
    },
    Forked {
        from: PathBuf,
        to: PathBuf,
        line: usize,
        backup: Option<PathBuf>,
    },
    Archived {
        from: PathBuf,
        to: PathBuf,
    },
    ReplayWarning {
        line: usize,
        message: String,
    },
    ErrorEncountered {
        error: String,
    },
}

impl LogEvent {
    fn with_timestamp(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or_default();
        if let Some(obj) = value.as_object_mut() {
            obj.insert(
                "timestamp".to_string(),
                serde_json::Value::String(chrono::Utc::now().to_rfc3339()),
            );
        }
        value
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable format with colors
    #[default]
    Pretty,
    /// JSON lines format for machine consumption
    Json,
    /// Compact single-line format
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            "compact" => Ok(LogFormat::Compact),
            _ => Err(format!("Unknown log format: {}", s)),
        }
    }
}

/// Prints [`LogEvent`]s to stderr in the configured format
pub struct Logger {
    format: LogFormat,
}

impl Logger {
    pub fn new(format: LogFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> LogFormat {
        self.format
    }

    pub fn log(&self, event: &LogEvent) {
        let _ = writeln!(std::io::stderr(), "{}", self.render(event));
    }

    /// Render an event as a single line (or block, for `Pretty`).
    pub fn render(&self, event: &LogEvent) -> String {
        match self.format {
            LogFormat::Json => event.with_timestamp().to_string(),
            LogFormat::Pretty => Self::render_pretty(event),
            LogFormat::Compact => Self::render_compact(event),
        }
    }

    fn render_pretty(event: &LogEvent) -> String {
        match event {
            LogEvent::ReplayFinished {
                path,
                lines,
                entries,
                sessions,
                elapsed_secs,
                corrupt_lines,
            } => {
                let mut out = format!(
                    "{} {} {}",
                    "▶".bright_cyan(),
                    "Replayed".bright_cyan().bold(),
                    path.display().to_string().dimmed()
                );
                out.push_str(&format!(
                    "\n    {} lines, {} entries, {} {}, {}",
                    lines,
                    entries,
                    sessions,
                    if *sessions == 1 { "session" } else { "sessions" },
                    format_elapsed(*elapsed_secs)
                ));
                if *corrupt_lines > 0 {
                    out.push_str(&format!(
                        "\n    {} {} corrupt {} skipped",
                        "⚠".bright_yellow(),
                        corrupt_lines,
                        if *corrupt_lines == 1 { "line" } else { "lines" }
                    ));
                }
                out
            }
            LogEvent::SessionOpened { path, resumed } => format!(
                "{} {} {}",
                "●".bright_green(),
                if *resumed {
                    "Resumed session in".bold()
                } else {
                    "Started session in".bold()
                },
                path.display()
            ),
            LogEvent::SessionClosed { path, elapsed_secs } => format!(
                "{} Session closed ({}) {}",
                "✓".bright_green(),
                format_elapsed(*elapsed_secs),
                path.display().to_string().dimmed()
            ),
            LogEvent::Forked {
                from,
                to,
                line,
                backup,
            } => {
                let mut out = format!(
                    "{} Forked {} at line {} → {}",
                    "⑂".bright_magenta(),
                    from.display().to_string().dimmed(),
                    line,
                    to.display()
                );
                if let Some(backup) = backup {
                    out.push_str(&format!(
                        "\n    {} previous file kept as {}",
                        "↳".dimmed(),
                        backup.display()
                    ));
                }
                out
            }
            LogEvent::Archived { from, to } => format!(
                "{} Archived {} → {}",
                "✓".bright_green(),
                from.display().to_string().dimmed(),
                to.display().to_string().bold()
            ),
            LogEvent::ReplayWarning { line, message } => format!(
                "{} line {}: {}",
                "⚠".bright_yellow(),
                line,
                message.yellow()
            ),
            LogEvent::ErrorEncountered { error } => {
                format!("{} {}", "✗".bright_red(), error.bright_red())
            }
        }
    }

    fn render_compact(event: &LogEvent) -> String {
        let timestamp = chrono::Utc::now().format("%H:%M:%S");
        match event {
            LogEvent::ReplayFinished {
                lines,
                sessions,
                elapsed_secs,
                corrupt_lines,
                ..
            } => format!(
                "[{}] replay lines={} sessions={} elapsed={:.1}s corrupt={}",
                timestamp, lines, sessions, elapsed_secs, corrupt_lines
            ),
            LogEvent::SessionOpened { path, resumed } => format!(
                "[{}] session:{} {}",
                timestamp,
                if *resumed { "resume" } else { "start" },
                path.display()
            ),
            LogEvent::SessionClosed { elapsed_secs, .. } => {
                format!("[{}] session:close {:.1}s", timestamp, elapsed_secs)
            }
            LogEvent::Forked { to, line, .. } => {
                format!("[{}] fork:{} {}", timestamp, line, to.display())
            }
            LogEvent::Archived { to, .. } => {
                format!("[{}] archive {}", timestamp, to.display())
            }
            LogEvent::ReplayWarning { line, message } => {
                format!("[{}] warn:{} {}", timestamp, line, message)
            }
            LogEvent::ErrorEncountered { error } => format!("[{}] error {}", timestamp, error),
        }
    }
}

/// `1h02m03s`-style rendering of a seconds count.
pub fn format_elapsed(secs: f64) -> String {
    let total = secs.max(0.0).round() as u64;
    let (hours, rem) = (total / 3600, total % 3600);
    let (minutes, seconds) = (rem / 60, rem % 60);
    if hours > 0 {
        format!("{}h{:02}m{:02}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m{:02}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}
