//! The interactive recording loop behind `wordlog play`.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use colored::Colorize;

use wordlog_logging::{LogEvent, Logger};
use wordlog_store::{
    Dispatch, Dispatcher, LogCursor, Matcher, StoredLog, WarningSink,
};

use crate::output::LoggerSink;

pub const INPUT_PREFIX: &str = "input:";

/// How one pass of the loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    Done,
    /// Keep going, recording into this file from now on.
    ContinueWithFile(PathBuf),
}

/// What the loop knows about the puzzle so far.
#[derive(Debug, Default)]
pub struct Transcript {
    pub inputs: Vec<String>,
}

pub fn transcript_dispatcher() -> Dispatcher<Transcript> {
    Dispatcher::new().on(Matcher::prefix(INPUT_PREFIX), |t: &mut Transcript, e| {
        t.inputs.push(e.rest.to_string());
        Ok(())
    })
}

/// Run sessions starting at `path` until input ends, following forks.
///
/// Setting `interrupted` ends the current session the same way `:quit` does.
pub fn play<R: BufRead, W: Write>(
    path: &Path,
    log: impl Fn(&Path) -> StoredLog,
    input: &mut R,
    out: &mut W,
    logger: &Logger,
    interrupted: &AtomicBool,
) -> Result<PathBuf> {
    let mut current = path.to_path_buf();
    loop {
        let mut stored = log(current.as_path());
        match run_session(&mut stored, input, out, logger, interrupted)? {
            Flow::Done => return Ok(current),
            Flow::ContinueWithFile(next) => current = next,
        }
    }
}

/// Replay `stored`, open a session on it and record input until `:quit`,
/// end of input, or a fork.
pub fn run_session<R: BufRead, W: Write>(
    stored: &mut StoredLog,
    input: &mut R,
    out: &mut W,
    logger: &Logger,
    interrupted: &AtomicBool,
) -> Result<Flow> {
    let mut sink = LoggerSink::new(logger);
    let snapshot = stored.load(&mut sink)?;
    let mut dispatcher = transcript_dispatcher();
    let mut transcript = Transcript::default();
    dispatcher.replay_into(&snapshot, &mut transcript, &mut sink);

    stored.open_session(&mut sink)?;
    logger.log(&LogEvent::SessionOpened {
        path: stored.log_file().to_path_buf(),
        resumed: !snapshot.sessions.is_empty(),
    });
    if !transcript.inputs.is_empty() {
        writeln!(
            out,
            "{} {} earlier input(s)",
            "Resumed with".dimmed(),
            transcript.inputs.len()
        )?;
    }

    let flow = record(
        stored,
        &mut dispatcher,
        &mut transcript,
        input,
        out,
        &mut sink,
        interrupted,
    );

    if let Some(session) = stored.close()? {
        logger.log(&LogEvent::SessionClosed {
            path: stored.log_file().to_path_buf(),
            elapsed_secs: session.elapsed,
        });
    }
    flow
}

fn record<R: BufRead, W: Write>(
    stored: &mut StoredLog,
    dispatcher: &mut Dispatcher<Transcript>,
    transcript: &mut Transcript,
    input: &mut R,
    out: &mut W,
    sink: &mut dyn WarningSink,
    interrupted: &AtomicBool,
) -> Result<Flow> {
    let mut line = String::new();
    loop {
        line.clear();
        let read = input.read_line(&mut line).context("Failed to read input")?;
        // Input typed after an interrupt is not recorded.
        if interrupted.load(Ordering::SeqCst) {
            writeln!(out, "{}", "Interrupted, closing session.".bright_yellow())?;
            return Ok(Flow::Done);
        }
        if read == 0 {
            return Ok(Flow::Done);
        }
        let text = line.trim();
        if text.is_empty() {
            continue;
        }

        match parse_command(text) {
            Some(Command::Quit) => return Ok(Flow::Done),
            Some(Command::Site(site)) => stored.set_site(site)?,
            Some(Command::Puzzle(id)) => stored.set_puzzle_id(id)?,
            Some(Command::Fork(at)) => {
                let dest = fork_path(stored.log_file(), at);
                let mut cursor = LogCursor::open(stored.log_file(), sink)?;
                cursor.seek(at);
                let outcome = cursor.fork(&dest)?;
                writeln!(
                    out,
                    "{} {} ({} lines)",
                    "Forked to".bright_green(),
                    outcome.path.display(),
                    outcome.lines
                )?;
                return Ok(Flow::ContinueWithFile(outcome.path));
            }
            Some(Command::Unknown(other)) => {
                writeln!(out, "{} {}", "Unknown command:".bright_red(), other)?;
            }
            None => {
                let message = format!("{INPUT_PREFIX} {text}");
                let offset = stored.log(&message)?;
                if let Ok(Dispatch::Handled) = dispatcher.dispatch(transcript, offset, &message) {
                    writeln!(out, "{} {}", "recorded".dimmed(), transcript.inputs.len())?;
                }
            }
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Command<'a> {
    Quit,
    Site(&'a str),
    Puzzle(&'a str),
    Fork(i64),
    Unknown(&'a str),
}

fn parse_command(text: &str) -> Option<Command<'_>> {
    let rest = text.strip_prefix(':')?;
    let (name, arg) = rest.split_once(' ').unwrap_or((rest, ""));
    let arg = arg.trim();
    Some(match (name, arg) {
        ("quit" | "q", _) => Command::Quit,
        ("site", site) if !site.is_empty() => Command::Site(site),
        ("puzzle", id) if !id.is_empty() => Command::Puzzle(id),
        ("fork", at) => match at.parse() {
            Ok(at) => Command::Fork(at),
            Err(_) => Command::Unknown(text),
        },
        _ => Command::Unknown(text),
    })
}

/// `<stem>.fork<N>.log` next to `path`.
fn fork_path(path: &Path, at: i64) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "log".to_string());
    path.with_file_name(format!("{}.fork{}.log", stem, at))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Cursor;
    use tempfile::TempDir;
    use wordlog_logging::LogFormat;
    use wordlog_store::{replay, CompressionContext, Warning};

    fn running() -> AtomicBool {
        AtomicBool::new(false)
    }

    fn payloads(path: &Path) -> Vec<String> {
        let mut warnings: Vec<Warning> = Vec::new();
        let snapshot = replay(path, &mut CompressionContext::default(), &mut warnings).unwrap();
        assert!(warnings.is_empty(), "{warnings:?}");
        snapshot.entries.into_iter().map(|e| e.payload).collect()
    }

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command("crane"), None);
        assert_eq!(parse_command(":quit"), Some(Command::Quit));
        assert_eq!(parse_command(":site  nyt.com "), Some(Command::Site("nyt.com")));
        assert_eq!(parse_command(":fork -2"), Some(Command::Fork(-2)));
        assert_eq!(parse_command(":fork x"), Some(Command::Unknown(":fork x")));
        assert_eq!(parse_command(":site"), Some(Command::Unknown(":site")));
    }

    #[test]
    fn test_fork_path() {
        assert_eq!(
            fork_path(Path::new("/logs/a.log"), 3),
            PathBuf::from("/logs/a.fork3.log")
        );
    }

    #[test]
    fn test_session_records_inputs_and_identity() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.log");
        let logger = Logger::new(LogFormat::Compact);
        let mut input = Cursor::new(":site semantle.com\n:puzzle 812\ncrane\n\nslate\n:quit\nignored\n");
        let mut out: Vec<u8> = Vec::new();

        let mut stored = StoredLog::new(&path);
        let flow = run_session(&mut stored, &mut input, &mut out, &logger, &running()).unwrap();

        assert_eq!(flow, Flow::Done);
        assert_eq!(payloads(&path), vec!["input: crane", "input: slate"]);
        assert_eq!(stored.site(), Some("semantle.com"));
        assert_eq!(stored.puzzle_id(), Some("812"));
    }

    #[test]
    fn test_resume_reports_earlier_inputs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.log");
        let logger = Logger::new(LogFormat::Compact);

        let mut stored = StoredLog::new(&path);
        run_session(
            &mut stored,
            &mut Cursor::new("crane\n"),
            &mut Vec::<u8>::new(),
            &logger,
            &running(),
        )
        .unwrap();
        drop(stored);

        let mut out: Vec<u8> = Vec::new();
        let mut stored = StoredLog::new(&path);
        run_session(&mut stored, &mut Cursor::new("slate\n"), &mut out, &logger, &running()).unwrap();

        let printed = String::from_utf8(out).unwrap();
        assert!(printed.contains("1 earlier input(s)"), "{printed}");
        assert_eq!(stored.sessions().len(), 2);
    }

    #[test]
    fn test_fork_continues_in_new_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.log");
        let logger = Logger::new(LogFormat::Compact);
        // Lines: now, crane, oops; fork keeps the first two.
        let mut input = Cursor::new("crane\noops\n:fork 2\nslate\n");

        let last = play(
            &path,
            |p| StoredLog::new(p),
            &mut input,
            &mut Vec::<u8>::new(),
            &logger,
            &running(),
        )
        .unwrap();

        assert_eq!(last, dir.path().join("a.fork2.log"));
        assert_eq!(payloads(&path), vec!["input: crane", "input: oops"]);
        assert_eq!(payloads(&last), vec!["input: crane", "input: slate"]);
        assert_eq!(fs::read_to_string(&last).unwrap().lines().count(), 4);
    }

    #[test]
    fn test_interrupt_closes_session_without_recording() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.log");
        let logger = Logger::new(LogFormat::Compact);
        let interrupted = AtomicBool::new(true);
        let mut out: Vec<u8> = Vec::new();

        let mut stored = StoredLog::new(&path);
        let flow = run_session(
            &mut stored,
            &mut Cursor::new("crane\n"),
            &mut out,
            &logger,
            &interrupted,
        )
        .unwrap();

        assert_eq!(flow, Flow::Done);
        assert!(!stored.is_logging());
        assert_eq!(stored.sessions().len(), 1);
        assert!(payloads(&path).is_empty());
        assert!(String::from_utf8(out).unwrap().contains("Interrupted"));
    }
}
