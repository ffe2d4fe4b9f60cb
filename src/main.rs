use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use livetrans::cli::{Cli, Commands};
use livetrans::config::Config;
use livetrans::engine::Engines;
use livetrans::pipeline::{SessionController, StopHandle};
use livetrans::session::{FileSessionSource, MetadataSessionSource, SessionConfig, SessionSource};
use livetrans::transport::{FileTransport, FileTransportConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

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
            let mut config = load_config(cli.config.as_deref())?;
            if script.is_some() {
                config.engines.script = script;
            }
            if translate_interim {
                config.pipeline.translate_interim = true;
            }
            let source = session_source(session, room, events_url, metadata)?;
            let options = RunOptions {
                input,
                source,
                out_dir,
                max_duration,
                realtime,
                json,
            };
            run_session(config, options).await?;
        }
        Commands::Session { file } => {
            show_session(&file)?;
        }
        Commands::Completions { shell } => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "livetrans",
                &mut std::io::stdout(),
            );
        }
    }

    Ok(())
}

/// Logs go to stderr so the session report on stdout stays clean.
/// `RUST_LOG` takes precedence over `-v`/`-q`.
fn init_tracing(verbose: u8, quiet: bool) {
    let default_level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("livetrans={}", default_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Load configuration from file with environment overrides.
fn load_config(custom_path: Option<&Path>) -> Result<Config> {
    let config = match custom_path {
        Some(path) => Config::load(path)?,
        None => match Config::default_path() {
            Some(path) => Config::load_or_default(&path)?,
            None => Config::default(),
        },
    };
    let config = config.with_env_overrides();
    config.validate()?;
    Ok(config)
}

/// Picks where the session descriptor comes from. Clap guarantees exactly
/// one of file, room or metadata is present.
fn session_source(
    session: Option<PathBuf>,
    room: Option<String>,
    events_url: Option<String>,
    metadata: Option<String>,
) -> Result<Arc<dyn SessionSource>> {
    if let Some(path) = session {
        return Ok(Arc::new(FileSessionSource::new(path)));
    }
    if let Some(json) = metadata {
        return Ok(Arc::new(MetadataSessionSource::new(json)));
    }
    match (room, events_url) {
        (Some(room), Some(url)) => room_source(url, room),
        _ => anyhow::bail!("no session descriptor given (use --session, --metadata or --room)"),
    }
}

#[cfg(feature = "http")]
fn room_source(url: String, room: String) -> Result<Arc<dyn SessionSource>> {
    Ok(Arc::new(livetrans::session::HttpSessionSource::new(url, room)))
}

#[cfg(not(feature = "http"))]
fn room_source(_url: String, _room: String) -> Result<Arc<dyn SessionSource>> {
    anyhow::bail!("--room needs the http feature")
}

struct RunOptions {
    input: PathBuf,
    source: Arc<dyn SessionSource>,
    out_dir: PathBuf,
    max_duration: Option<Duration>,
    realtime: bool,
    json: bool,
}

async fn run_session(config: Config, options: RunOptions) -> Result<()> {
    tracing::info!(version = %livetrans::version_string(), "livetrans starting");
    let engines = Engines::from_config(&config)?;
    let mut transport_config =
        FileTransportConfig::new(options.input.clone(), options.out_dir.clone());
    transport_config.realtime = options.realtime;
    transport_config.max_duration = options.max_duration;
    let transport = Arc::new(FileTransport::new(transport_config));
    let log_path = transport.message_log_path();
    let described = options.source.describe();
    tracing::info!(source = %described, "session descriptor source");

    let controller = SessionController::new(config, transport, options.source, engines);
    tokio::spawn(stop_on_ctrl_c(controller.stop_handle()));

    let report = controller
        .run()
        .await
        .with_context(|| format!("session from {} failed", described))?;

    if options.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report);
        println!("  messages:      {}", log_path.display());
    }
    Ok(())
}

/// First Ctrl-C drains the session, a second one aborts it.
async fn stop_on_ctrl_c(stop: StopHandle) {
    if tokio::signal::ctrl_c().await.is_err() {
        return;
    }
    tracing::info!("interrupt received, draining (press Ctrl-C again to abort)");
    stop.stop();
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::warn!("second interrupt, aborting");
        stop.abort();
    }
}

fn show_session(path: &Path) -> Result<()> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let session = SessionConfig::from_json(&text)?;

    if let Some(name) = &session.event_name {
        println!("event:    {}", name);
    }
    println!("source:   {}", session.source_language);
    let captions: Vec<String> = session
        .caption_targets
        .iter()
        .map(ToString::to_string)
        .collect();
    if captions.is_empty() {
        println!("captions: -");
    } else {
        println!("captions: {}", captions.join(", "));
    }
    if session.audio_targets.is_empty() {
        println!("audio:    -");
    } else {
        println!("audio:");
        for lang in &session.audio_targets {
            println!(
                "  {:<8} voice {}",
                lang.as_str(),
                session.voice_for(lang).as_deref().unwrap_or("(engine default)")
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_config_missing_custom_path_is_error() {
        assert!(load_config(Some(Path::new("/nonexistent/livetrans.toml"))).is_err());
    }

    #[tokio::test]
    async fn test_metadata_session_source() {
        let source = session_source(
            None,
            None,
            None,
            Some(
                r#"{"sourceLanguage":"en-US","outputs":[{"lang":"es-ES","audio":true}]}"#
                    .to_string(),
            ),
        )
        .unwrap();
        assert_eq!(source.describe(), "room metadata");
        let config = source.resolve().await.unwrap();
        assert_eq!(config.audio_targets.len(), 1);
    }

    #[test]
    fn test_session_source_requires_one() {
        assert!(session_source(None, Some("hall".to_string()), None, None).is_err());
    }
}
