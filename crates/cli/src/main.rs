use anyhow::Context;
use clap::Parser;
use config::Config;
use flume::bounded;
use nozzle_life::{
    cli::{Cli, Command},
    ingest::process_line,
    signals::{handle_signal, wait_for_signal},
};
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info};
use tracing_log::AsTrace;
use tracker::clock::SystemClock;
use tracker::persistence::JsonFileStore;
use tracker::{ApiCommand, ApiResponse, PersistenceScheduler, Tracker};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity.log_level_filter().as_trace())
        .with_writer(std::io::stderr)
        .with_level(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    debug!(config = ?cli);

    let config = match &cli.conffile {
        Some(path) => Config::load(path)?,
        _ => Config::new(),
    };

    let command = cli.command();
    if command == Command::PrintConfig {
        return emit(&config.to_toml_string()?);
    }

    let settings_path = cli.settings_path(config.persistence.settings_path.as_deref());
    let store = JsonFileStore::open(&settings_path)
        .with_context(|| format!("opening settings {}", settings_path.display()))?;
    let tracker = Tracker::new(config.clone(), Box::new(store), Arc::new(SystemClock));

    match command {
        Command::Run => run(config, tracker).await,
        Command::Status => {
            let generated_at = tracker.clock().now().to_rfc3339();
            let payload = tracker.status_payload(generated_at.into());
            emit(&serde_json::to_string_pretty(&payload)?)
        }
        Command::Reset { tool } => {
            let state = tracker.reset_tool(&tool)?;
            save_before_exit(&tracker)?;
            emit(&serde_json::to_string_pretty(&state)?)
        }
        Command::Assign { tool, profile } => {
            let state = tracker.set_tool_profile(&tool, &profile)?;
            save_before_exit(&tracker)?;
            emit(&serde_json::to_string_pretty(&state)?)
        }
        Command::ExportCsv => match tracker.handle_command(ApiCommand::ExportLogCsv) {
            ApiResponse::Csv(csv) => emit(csv.trim_end()),
            ApiResponse::Json(value) => emit(&value.to_string()),
        },
        Command::PrintConfig => Ok(()),
    }
}

/// Follow the host on stdin until it hangs up or we are interrupted.
async fn run(config: Config, tracker: Tracker) -> anyhow::Result<()> {
    tracker.startup()?;

    let scheduler = PersistenceScheduler::spawn(
        tracker.clone(),
        config.persistence.wake_period,
        config.persistence.join_timeout,
        config.persistence.save_on_shutdown,
    );

    let (events_tx, events_rx) = bounded(8);
    tokio::spawn(async move {
        if let Err(err) = wait_for_signal(&events_tx).await {
            error!(error = ?err, "Error while waiting for signal");
        }
    });

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("interrupted");
                break;
            }
            res = events_rx.recv_async() => {
                let event = res?;
                debug!(?event, "Received signal event");
                handle_signal(&tracker, event);
            }
            line = lines.next_line() => match line? {
                Some(line) => process_line(&tracker, &line, &mut stdout).await?,
                None => {
                    info!("host closed input");
                    break;
                }
            },
        }
    }

    scheduler.shutdown().await?;
    Ok(())
}

/// One-shot commands have no later flush to retry a failed save.
fn save_before_exit(tracker: &Tracker) -> anyhow::Result<()> {
    if tracker.session().dirty {
        tracker.flush(true).context("saving settings")?;
    }
    Ok(())
}

fn emit(text: &str) -> anyhow::Result<()> {
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{text}")?;
    Ok(())
}
