use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};

use wordlog_logging::{init_tracing, LogEvent, LogFormat, Logger};

mod commands;
mod config;
mod output;
mod play;

use commands::SeekTarget;
use config::{Config, Overrides, Settings};

#[derive(Parser, Debug)]
#[command(
    name = "wordlog",
    about = "Replayable session logs for word-puzzle solving",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log output format
    #[arg(long, value_enum, default_value = "pretty", global = true)]
    log_format: LogFormatChoice,

    /// Tracing filter (overrides log_level in the config file)
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Record a solving session, resuming FILE if given
    Play {
        /// Log file (default: a fresh file in the log directory)
        file: Option<PathBuf>,

        /// Site the puzzle is from
        #[arg(long)]
        site: Option<String>,

        /// Puzzle identifier
        #[arg(long)]
        puzzle: Option<String>,
    },

    /// Replay a log and print what it contains
    Replay {
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Jump to a line of a log
    Seek {
        file: PathBuf,

        #[command(flatten)]
        target: SeekArgs,

        /// Start from this line (searches begin after it)
        #[arg(long, allow_hyphen_values = true)]
        from: Option<i64>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Copy a log up to a line into a new file
    Fork {
        file: PathBuf,

        /// Last line to keep (0 = last line, negative counts back)
        #[arg(long, allow_hyphen_values = true)]
        line: i64,

        /// Destination file
        #[arg(long)]
        to: PathBuf,
    },

    /// Commit a finished log into the archive
    Archive {
        file: PathBuf,

        /// Archive repository (default: from config)
        #[arg(long)]
        archive_dir: Option<PathBuf>,
    },

    /// List in-progress logs
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct SeekArgs {
    /// Line number (0 = last line, negative counts back)
    #[arg(long, allow_hyphen_values = true)]
    line: Option<i64>,

    /// Session number (0 = last session, negative counts back)
    #[arg(long, allow_hyphen_values = true)]
    session: Option<i64>,

    /// Next line containing this text
    #[arg(long)]
    find: Option<String>,

    /// Next line matching this regex
    #[arg(long)]
    regex: Option<String>,
}

impl SeekArgs {
    fn into_target(self) -> Option<SeekTarget> {
        self.line
            .map(SeekTarget::Line)
            .or(self.session.map(SeekTarget::Session))
            .or(self.find.map(SeekTarget::Find))
            .or(self.regex.map(SeekTarget::Regex))
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormatChoice {
    Pretty,
    Json,
    Compact,
}

impl From<LogFormatChoice> for LogFormat {
    fn from(choice: LogFormatChoice) -> Self {
        match choice {
            LogFormatChoice::Pretty => LogFormat::Pretty,
            LogFormatChoice::Json => LogFormat::Json,
            LogFormatChoice::Compact => LogFormat::Compact,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    let log_format: LogFormat = cli.log_format.into();
    let logger = Logger::new(log_format);

    if let Err(e) = run(cli, &logger) {
        logger.log(&LogEvent::ErrorEncountered {
            error: format!("{:#}", e),
        });
        std::process::exit(1);
    }
}

fn run(cli: Cli, logger: &Logger) -> Result<()> {
    let working_dir = std::env::current_dir().context("Failed to get current directory")?;
    let config = Config::load(&working_dir)?;

    let archive_override = match &cli.command {
        Command::Archive { archive_dir, .. } => archive_dir.clone(),
        _ => None,
    };
    let settings = Settings::resolve(
        config,
        Overrides {
            archive_dir: archive_override,
            log_level: cli.log_level.clone(),
        },
    )?;
    init_tracing(&settings.log_level, logger.format());

    match cli.command {
        Command::Play { file, site, puzzle } => {
            // The first Ctrl+C lets the loop close the session after the
            // pending read; a second one exits at once. Every record is a
            // whole line, so the log stays parseable either way.
            let interrupted = Arc::new(AtomicBool::new(false));
            let handle = interrupted.clone();
            ctrlc::set_handler(move || {
                if handle.swap(true, Ordering::SeqCst) {
                    std::process::exit(130);
                }
                eprintln!("\nInterrupted. Press Enter to close the session, Ctrl+C again to quit.");
            })
            .context("Failed to set Ctrl+C handler")?;
            commands::handle_play(file, site, puzzle, &settings, logger, &interrupted)?;
            if interrupted.load(Ordering::SeqCst) {
                std::process::exit(130);
            }
            Ok(())
        }
        Command::Replay { file, json } => commands::handle_replay(&file, json, logger),
        Command::Seek {
            file,
            target,
            from,
            json,
        } => {
            let target = target
                .into_target()
                .context("One of --line, --session, --find or --regex is required")?;
            commands::handle_seek(&file, target, from, json, logger)
        }
        Command::Fork { file, line, to } => commands::handle_fork(&file, line, &to, logger),
        Command::Archive { file, .. } => commands::handle_archive(&file, &settings, logger),
        Command::List { json } => commands::handle_list(json, &settings, logger),
    }
}
