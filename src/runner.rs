use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use stagefetch::config::Config;
use stagefetch::events::{ChannelSink, ProgressValue, TransferEvent};
use stagefetch::humanize::{ByteSize, progress_bar};
use stagefetch::orchestrator::{Batch, BatchOutcome, Orchestrator};
use stagefetch::transport::HttpTransport;

use crate::cli::FetchArgs;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Run one batch from the command line. Returns `true` when every transfer
/// was published.
pub async fn run(args: FetchArgs) -> Result<bool, AnyError> {
    let mut config = match &args.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    args.apply(&mut config);
    config.validate()?;

    let urls = args.all_urls(&config);
    if urls.is_empty() {
        return Err("no URLs given on the command line or in transfer.urls".into());
    }

    let staging_dir = &config.transfer.staging_dir;
    let published_dir = &config.transfer.published_dir;
    let batch = Batch::from_urls(&urls, staging_dir, published_dir)?;

    // The engine never creates directories itself
    tokio::fs::create_dir_all(staging_dir).await?;
    tokio::fs::create_dir_all(published_dir).await?;

    let transport = Arc::new(HttpTransport::new(&config.http.client_config())?);
    let (sink, events) = ChannelSink::new();
    let renderer = tokio::spawn(render_events(events, !args.json));

    let token = CancellationToken::new();
    tokio::spawn(cancel_on_shutdown(token.clone()));

    let orchestrator = Orchestrator::new(transport, config.retry.policy(), Arc::new(sink))
        .with_progress_interval(config.progress.byte_interval())
        .with_cancellation(token);

    let outcome = orchestrator.run_batch(batch, config.transfer.concurrency_limit).await;
    let metrics = orchestrator.metrics().snapshot();

    // Dropping the last sink handle ends the renderer
    drop(orchestrator);
    renderer.await?;

    info!(
        started = metrics.transfers_started,
        succeeded = metrics.transfers_succeeded,
        failed = metrics.transfers_failed,
        retries = metrics.retries_scheduled,
        bytes = metrics.bytes_written,
        "Batch metrics"
    );

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_summary(&outcome);
    }

    Ok(!outcome.any_failed())
}

/// Sole consumer of transfer events; owns the terminal
async fn render_events(mut events: UnboundedReceiver<TransferEvent>, draw: bool) {
    while let Some(event) = events.recv().await {
        if draw {
            eprintln!("{}", render_event(&event));
        }
    }
}

fn render_event(event: &TransferEvent) -> String {
    match event {
        TransferEvent::Started { resource } => format!("{resource} started"),
        TransferEvent::Progress {
            resource,
            value: ProgressValue::Percent(percent),
        } => format!("{resource} {}", progress_bar(*percent)),
        TransferEvent::Progress {
            resource,
            value: ProgressValue::Bytes(bytes),
        } => format!("{resource} {}", ByteSize(*bytes)),
        TransferEvent::Retrying {
            resource,
            attempt,
            delay,
            error,
        } => format!(
            "{resource} attempt {attempt} failed ({error}), retrying in {:.1}s",
            delay.as_secs_f64()
        ),
        TransferEvent::Succeeded {
            resource,
            published_path,
        } => format!("{resource} done -> {}", published_path.display()),
        TransferEvent::Failed {
            resource,
            attempts,
            error,
        } => format!("{resource} failed after {attempts} attempts: {error}"),
    }
}

fn print_summary(outcome: &BatchOutcome) {
    for (name, transfer) in outcome.succeeded() {
        let size = transfer.bytes.map(ByteSize).unwrap_or(ByteSize(0));
        println!("ok      {name} ({size})");
    }
    for (name, transfer) in outcome.failed() {
        let error = transfer.error.as_deref().unwrap_or("unknown error");
        println!("failed  {name}: {error}");
    }
}

async fn cancel_on_shutdown(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received, cancelling transfers");
    token.cancel();
}
