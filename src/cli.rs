//! Command-line interface for livetrans
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use std::time::Duration;

/// Real-time speech translation for live rooms
#[derive(Parser, Debug)]
#[command(name = "livetrans", version, about = "Real-time speech translation for live rooms")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: debug, -vv: trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Translate a WAV recording through a full session, writing one WAV per
    /// audio language and a JSON-lines message log
    Run {
        /// Input WAV file (the speaker)
        #[arg(long, short = 'i', value_name = "FILE")]
        input: PathBuf,

        /// Session descriptor JSON file
        #[arg(
            long,
            short = 's',
            value_name = "FILE",
            required_unless_present_any = ["room", "metadata"]
        )]
        session: Option<PathBuf>,

        /// Fetch the descriptor for this room from the event service
        #[arg(
            long,
            value_name = "NAME",
            requires = "events_url",
            conflicts_with_all = ["session", "metadata"]
        )]
        room: Option<String>,

        /// Event service base URL, used with --room
        #[arg(long, value_name = "URL")]
        events_url: Option<String>,

        /// Descriptor JSON passed inline, as carried in room metadata
        #[arg(long, value_name = "JSON", conflicts_with = "session")]
        metadata: Option<String>,

        /// Recognizer script (overrides engines.script)
        #[arg(long, value_name = "FILE")]
        script: Option<PathBuf>,

        /// Output directory for tracks and messages
        #[arg(long, short = 'o', value_name = "DIR", default_value = "livetrans-out")]
        out_dir: PathBuf,

        /// Stop after this much input audio. Examples: 30s, 5m, 1m30s
        #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
        max_duration: Option<Duration>,

        /// Pace input at real time instead of as fast as possible
        #[arg(long)]
        realtime: bool,

        /// Translate interim transcripts as well as finals
        #[arg(long)]
        translate_interim: bool,

        /// Print the session report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Parse a session descriptor and print the derived targets
    Session {
        /// Session descriptor JSON file
        file: PathBuf,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Parse a duration string.
///
/// Supports bare numbers (seconds) and anything `humantime` accepts
/// (`30s`, `5m`, `1h30m`).
fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(s).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_command() {
        let cli = Cli::try_parse_from([
            "livetrans",
            "run",
            "--input",
            "talk.wav",
            "--session",
            "event.json",
        ])
        .unwrap();
        match cli.command {
            Commands::Run {
                input,
                session,
                room,
                events_url,
                metadata,
                script,
                out_dir,
                max_duration,
                realtime,
                translate_interim,
                json,
            } => {
                assert_eq!(input, PathBuf::from("talk.wav"));
                assert_eq!(session, Some(PathBuf::from("event.json")));
                assert!(room.is_none());
                assert!(events_url.is_none());
                assert!(metadata.is_none());
                assert!(script.is_none());
                assert_eq!(out_dir, PathBuf::from("livetrans-out"));
                assert!(max_duration.is_none());
                assert!(!realtime);
                assert!(!translate_interim);
                assert!(!json);
            }
            other => panic!("unexpected command: {:?}", other),
        }
        assert!(!cli.quiet);
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn test_parse_run_with_options() {
        let cli = Cli::try_parse_from([
            "livetrans",
            "-vv",
            "--config",
            "/tmp/lt.toml",
            "run",
            "-i",
            "talk.wav",
            "-s",
            "event.json",
            "--script",
            "lines.txt",
            "-o",
            "out",
            "--max-duration",
            "1m30s",
            "--realtime",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/lt.toml")));
        let Commands::Run {
            script,
            out_dir,
            max_duration,
            realtime,
            ..
        } = cli.command
        else {
            panic!("expected run");
        };
        assert_eq!(script, Some(PathBuf::from("lines.txt")));
        assert_eq!(out_dir, PathBuf::from("out"));
        assert_eq!(max_duration, Some(Duration::from_secs(90)));
        assert!(realtime);
    }

    #[test]
    fn test_run_requires_input_and_session() {
        assert!(Cli::try_parse_from(["livetrans", "run", "--input", "a.wav"]).is_err());
        assert!(Cli::try_parse_from(["livetrans", "run", "--session", "e.json"]).is_err());
    }

    #[test]
    fn test_run_with_room_needs_events_url() {
        let base = ["livetrans", "run", "-i", "a.wav", "--room", "hall-a"];
        assert!(Cli::try_parse_from(base).is_err());

        let cli = Cli::try_parse_from(
            base.iter()
                .copied()
                .chain(["--events-url", "https://events.example.com"]),
        )
        .unwrap();
        let Commands::Run {
            session,
            room,
            events_url,
            ..
        } = cli.command
        else {
            panic!("expected run");
        };
        assert!(session.is_none());
        assert_eq!(room.as_deref(), Some("hall-a"));
        assert_eq!(events_url.as_deref(), Some("https://events.example.com"));
    }

    #[test]
    fn test_session_sources_are_exclusive() {
        assert!(
            Cli::try_parse_from([
                "livetrans", "run", "-i", "a.wav", "-s", "e.json", "--metadata", "{}",
            ])
            .is_err()
        );
        let cli = Cli::try_parse_from(["livetrans", "run", "-i", "a.wav", "--metadata", "{}"]);
        assert!(cli.is_ok());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["livetrans", "session", "event.json", "-q"]).unwrap();
        assert!(cli.quiet);
        assert!(matches!(cli.command, Commands::Session { .. }));
    }

    #[test]
    fn test_parse_completions() {
        let cli = Cli::try_parse_from(["livetrans", "completions", "bash"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Completions { shell: Shell::Bash }
        ));
    }

    #[test]
    fn test_missing_subcommand_is_error() {
        assert!(Cli::try_parse_from(["livetrans"]).is_err());
    }

    #[test]
    fn test_parse_duration_formats() {
        assert_eq!(parse_duration("45"), Ok(Duration::from_secs(45)));
        assert_eq!(parse_duration("2m"), Ok(Duration::from_secs(120)));
        assert_eq!(parse_duration(" 1h "), Ok(Duration::from_secs(3600)));
        assert!(parse_duration("soon").is_err());
    }
}
