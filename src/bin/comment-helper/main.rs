mod dom;
mod face;
mod hands;

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand};
use dotenvy::dotenv;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use comment_helper::{Config, MessageBus, TriggerController, TriggerOutcome};

#[derive(Parser)]
#[command(name = "comment-helper", version, about = "Types a sample comment on the open post")]
struct Cli {
    /// JSON config file; every field is optional
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Attach to Chrome and serve the trigger UI (default)
    Serve(ServeArgs),
    /// Ask a running daemon to act on a tab
    Trigger {
        /// Target id of the tab; defaults to the first tab
        #[arg(long)]
        tab: Option<String>,
        /// Daemon base URL; defaults to the configured UI port and the
        /// fallbacks after it
        #[arg(long)]
        daemon: Option<String>,
    },
}

#[derive(Args, Default)]
struct ServeArgs {
    /// Domain marker a tab URL must contain
    #[arg(long)]
    target: Option<String>,
    /// Remote debugging endpoint of a running Chrome
    #[arg(long)]
    chrome_url: Option<String>,
    /// First port tried by the web UI
    #[arg(long)]
    port: Option<u16>,
}

impl ServeArgs {
    fn apply(self, config: &mut Config) {
        if let Some(target) = self.target {
            config.inject_match = target.clone();
            config.target_marker = target;
        }
        if let Some(url) = self.chrome_url {
            config.chrome_url = url;
        }
        if let Some(port) = self.port {
            config.ui_port = port;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command.unwrap_or(Command::Serve(ServeArgs::default())) {
        Command::Serve(args) => serve(config, args).await,
        Command::Trigger { tab, daemon } => trigger(&config, daemon, tab).await,
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn serve(mut config: Config, args: ServeArgs) -> Result<()> {
    args.apply(&mut config);
    let config = Arc::new(config);
    info!(target_marker = %config.target_marker, "starting comment helper");

    let debugger_url = match hands::resolve_debugger_url(&config.chrome_url).await {
        Ok(url) => Some(url),
        Err(err) => {
            warn!(error = %format!("{err:#}"), "no running Chrome to attach to");
            None
        }
    };

    // Browser launch blocks for a while
    let launch_config = config.clone();
    let session = tokio::task::spawn_blocking(move || {
        hands::BrowserSession::launch(&launch_config, debugger_url)
    })
    .await
    .context("browser launch panicked")??;
    let session = Arc::new(session);

    let bus = MessageBus::new();
    let controller = Arc::new(TriggerController::new(
        config.target_marker.clone(),
        bus.clone(),
    ));
    let injector = Arc::new(hands::Injector::new(
        bus,
        config.inject_match.clone(),
        Arc::new(config.interactor.clone()),
    ));

    for tab in session.tabs()? {
        if !injector.ensure_injected(&tab) {
            debug!(url = %tab.get_url(), "tab does not match, no interactor");
        }
    }

    let state = face::AppState {
        controller,
        session,
        injector,
    };
    face::start_server(state, config.ui_port).await?;

    info!("ready, press Ctrl+C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C")?;
    info!("shutting down");
    Ok(())
}

/// Base URLs a daemon started with `config` may be listening on.
fn daemon_candidates(config: &Config) -> Vec<String> {
    let first = config.ui_port;
    (first..=first.saturating_add(9))
        .map(|port| format!("http://127.0.0.1:{port}"))
        .collect()
}

async fn trigger(config: &Config, daemon: Option<String>, tab: Option<String>) -> Result<()> {
    let candidates = match daemon {
        Some(daemon) => vec![daemon],
        None => daemon_candidates(config),
    };
    let client = reqwest::Client::new();

    for daemon in &candidates {
        let url = format!("{}/trigger", daemon.trim_end_matches('/'));
        let sent = client
            .post(&url)
            .json(&serde_json::json!({ "tab_id": tab }))
            .send()
            .await;
        let response = match sent {
            Ok(response) => response,
            Err(err) if err.is_connect() => {
                debug!(%daemon, "no daemon listening");
                continue;
            }
            Err(err) => {
                return Err(err).with_context(|| format!("could not reach daemon at {daemon}"));
            }
        };

        let outcome: TriggerOutcome = response
            .error_for_status()?
            .json()
            .await
            .context("unexpected reply from daemon")?;
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    Err(anyhow!("no daemon answered at {}", candidates.join(", ")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn daemon_candidates_follow_the_configured_port() {
        let config = Config {
            ui_port: 4100,
            ..Config::default()
        };
        let candidates = daemon_candidates(&config);
        assert_eq!(candidates.len(), 10);
        assert_eq!(candidates[0], "http://127.0.0.1:4100");
        assert_eq!(candidates[9], "http://127.0.0.1:4109");
    }

    #[test]
    fn trigger_daemon_defaults_to_none() {
        let cli = Cli::try_parse_from(["comment-helper", "trigger", "--tab", "t1"]).unwrap();
        match cli.command {
            Some(Command::Trigger { tab, daemon }) => {
                assert_eq!(tab.as_deref(), Some("t1"));
                assert_eq!(daemon, None);
            }
            _ => panic!("expected trigger subcommand"),
        }
    }
}
