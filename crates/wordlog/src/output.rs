use colored::Colorize;

use wordlog_logging::{format_elapsed, LogEvent, Logger};
use wordlog_store::{CursorLine, LogSummary, Snapshot, Warning, WarningSink};

/// Sends replay warnings through the operator [`Logger`].
pub struct LoggerSink<'a> {
    logger: &'a Logger,
    count: usize,
}

impl<'a> LoggerSink<'a> {
    pub fn new(logger: &'a Logger) -> Self {
        Self { logger, count: 0 }
    }

    pub fn count(&self) -> usize {
        self.count
    }
}

impl WarningSink for LoggerSink<'_> {
    fn warn(&mut self, warning: Warning) {
        self.count += 1;
        self.logger.log(&LogEvent::ReplayWarning {
            line: warning.line(),
            message: warning.to_string(),
        });
    }
}

pub fn print_snapshot(snapshot: &Snapshot) {
    println!("{}", "=== Log Detail ===".bright_blue().bold());
    println!(
        "{}  {}",
        "Site:".dimmed(),
        snapshot.site.as_deref().unwrap_or("-")
    );
    println!(
        "{}  {}",
        "Puzzle:".dimmed(),
        snapshot.puzzle_id.as_deref().unwrap_or("-")
    );
    if let Some(start) = snapshot.start {
        println!("{}  {}", "Started:".dimmed(), start.format("%Y-%m-%d %H:%M:%S %:z"));
    }
    println!(
        "{}  {}",
        "Total Time:".dimmed(),
        format_elapsed(snapshot.total_elapsed())
    );
    if snapshot.corrupt_lines > 0 {
        println!(
            "{}  {}",
            "Corrupt Lines:".dimmed(),
            snapshot.corrupt_lines.to_string().bright_red()
        );
    }

    if !snapshot.sessions.is_empty() {
        println!();
        println!(
            "{}",
            format!("--- Sessions ({}) ---", snapshot.sessions.len()).dimmed()
        );
        for (i, session) in snapshot.sessions.iter().enumerate() {
            println!(
                "  {} {}  {}",
                format!("[{}]", i + 1).bright_blue(),
                session.start.format("%Y-%m-%d %H:%M:%S"),
                format_elapsed(session.elapsed)
            );
        }
    }

    if !snapshot.entries.is_empty() {
        println!();
        println!(
            "{}",
            format!("--- Entries ({}) ---", snapshot.entries.len()).dimmed()
        );
        for entry in &snapshot.entries {
            println!(
                "  {:>5} {:>9} {}",
                entry.line.to_string().dimmed(),
                format!("T{:.1}", entry.offset),
                first_line(&entry.payload)
            );
        }
    }
}

pub fn print_line(line: &CursorLine) {
    let offset = line
        .offset
        .map(|o| format!("T{:.1}", o))
        .unwrap_or_else(|| "-".to_string());
    let payload = if line.corrupt {
        format!("{} {}", "(corrupt)".bright_red(), line.payload)
    } else if line.is_session_marker() {
        line.payload.bright_cyan().to_string()
    } else {
        line.payload.clone()
    };
    println!("{:>5} {:>9} {}", line.number.to_string().dimmed(), offset, payload);
}

pub fn print_logs_table(summaries: &[LogSummary]) {
    println!(
        "{:<20} {:<24} {:<10} {:<9} {:<9} {}",
        "STARTED".dimmed(),
        "SITE".dimmed(),
        "PUZZLE".dimmed(),
        "SESSIONS".dimmed(),
        "TIME".dimmed(),
        "FILE".dimmed(),
    );

    for s in summaries {
        let started = s
            .start
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "...".to_string());
        let file = s
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let file = if s.corrupt_lines > 0 {
            file.bright_yellow().to_string()
        } else {
            file
        };

        println!(
            "{:<20} {:<24} {:<10} {:<9} {:<9} {}",
            started,
            s.site.as_deref().unwrap_or("-"),
            s.puzzle_id.as_deref().unwrap_or("-"),
            s.sessions,
            format_elapsed(s.total_elapsed),
            file
        );
    }
}

fn first_line(payload: &str) -> String {
    match payload.split_once('\n') {
        Some((first, _)) => format!("{} ...", first),
        None => payload.to_string(),
    }
}
