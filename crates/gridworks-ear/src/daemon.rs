//! The long-running ear service.
//!
//! One loop owns the [`Ear`]: it archives messages as the source delivers
//! them and ticks the cron clock once a second. Only the source's network
//! loop runs on its own task.

use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::EarSettings;
use crate::ear::Ear;
use crate::error::Result;
use crate::message::HeardMessage;
use crate::source::{MessageSource, MqttSource, RawMessage};
use crate::store::open_store;
use crate::subscriptions::subscriptions;

/// Run the ear until Ctrl-C or SIGTERM.
///
/// # Errors
///
/// Returns an error if the store, ear or MQTT source cannot be started.
pub async fn run(settings: EarSettings) -> Result<()> {
    let store = open_store(&settings).await?;
    let mut ear = Ear::new(settings.clone(), store, Utc::now())?;
    let source = MqttSource::new(settings.mqtt.clone(), subscriptions(&settings.tracking));

    serve(&mut ear, source, settings.mqtt.channel_capacity, shutdown_signal()).await
}

/// Drive `ear` from `source` until `shutdown` resolves or the source closes.
///
/// # Errors
///
/// Returns an error if the source cannot be started.
pub async fn serve<S, F>(
    ear: &mut Ear,
    mut source: S,
    channel_capacity: usize,
    shutdown: F,
) -> Result<()>
where
    S: MessageSource,
    F: Future<Output = ()>,
{
    let (tx, mut rx) = mpsc::channel(channel_capacity.max(1));
    source.start(tx).await?;
    info!("Ear listening on {}", source.name());

    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            () = &mut shutdown => {
                info!("Shutdown requested");
                break;
            }
            received = rx.recv() => match received {
                Some(raw) => handle_raw(ear, raw).await,
                None => {
                    warn!("{} source closed", source.name());
                    break;
                }
            },
            _ = ticker.tick() => {
                if let Err(e) = ear.tick(Utc::now()).await {
                    error!("Periodic job failed: {}", e);
                }
            }
        }
    }

    source.stop();
    info!("Ear stopped");
    Ok(())
}

async fn handle_raw(ear: &mut Ear, raw: RawMessage) {
    let message = match HeardMessage::from_mqtt(&raw.topic, raw.payload, raw.received_at) {
        Ok(message) => message,
        Err(e) => {
            debug!("Ignoring message: {}", e);
            return;
        }
    };
    if let Err(e) = ear.on_message(&message).await {
        error!("Could not archive {}: {}", message.kafka_topic(), e);
    }
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Could not listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Could not listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
