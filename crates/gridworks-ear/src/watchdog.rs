//! External liveness check for a running ear.
//!
//! Meant to be run from cron or a systemd timer, separately from the daemon.
//! The daemon touches the minute marker every minute; if the marker goes
//! stale the ear is presumed dead. An alarm file remembers that the warning
//! was delivered, so operators get one warning and one recovery per outage.
//! A warning Slack did not accept leaves no alarm file and is retried on the
//! next check.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::alert::{EarWarningType, SlackNotifier};
use crate::config::EarSettings;
use crate::cron::modified_at;
use crate::error::Result;

/// Result of one watchdog check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchdogOutcome {
    /// Marker is fresh and no alarm is raised.
    Healthy,
    /// Marker went stale; a warning was delivered.
    Alarmed,
    /// Marker is stale but the warning was silenced, disabled or rejected.
    DeadUnreported,
    /// Marker is still stale; the warning was already sent.
    StillDead,
    /// Marker is fresh again; a recovery was sent.
    Recovered,
}

impl std::fmt::Display for WatchdogOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Alarmed => write!(f, "alarmed"),
            Self::DeadUnreported => write!(f, "dead (warning not sent)"),
            Self::StillDead => write!(f, "still dead"),
            Self::Recovered => write!(f, "recovered"),
        }
    }
}

/// Check the ear's minute marker at `now` and alert on state changes.
///
/// # Errors
///
/// Returns an error if the marker or alarm file cannot be read or written.
/// A failed Slack post is logged, not returned, and no alarm is recorded.
pub async fn check(settings: &EarSettings, now: DateTime<Utc>) -> Result<WatchdogOutcome> {
    let marker = settings.minute_cron_file();
    let alarm_file = settings.alarm_file();
    let notifier = SlackNotifier::new(
        settings.slack.web_hook_url.clone(),
        settings.watchdog.warning_silencer_file.clone(),
    );

    let dead_after = settings.dead_after();
    let last_seen = modified_at(&marker)?;
    let dead = last_seen.is_none_or(|at| (now - at).to_std().is_ok_and(|age| age > dead_after));

    if dead {
        if alarm_file.exists() {
            return Ok(WatchdogOutcome::StillDead);
        }

        let message = match last_seen {
            Some(at) => format!(
                "Ear service {} has not run its minute job since {}",
                settings.my_fqdn,
                at.to_rfc3339()
            ),
            None => format!(
                "Ear service {} has no minute marker at {}",
                settings.my_fqdn,
                marker.display()
            ),
        };
        warn!("{}", message);
        match notifier
            .send_warning(EarWarningType::EarAppearsDead, &message)
            .await
        {
            Ok(Some(status)) if (200..300).contains(&status) => {}
            Ok(Some(status)) => {
                warn!("Slack refused the warning ({}); will retry", status);
                return Ok(WatchdogOutcome::DeadUnreported);
            }
            Ok(None) => return Ok(WatchdogOutcome::DeadUnreported),
            Err(e) => {
                warn!("Could not send Slack warning: {}; will retry", e);
                return Ok(WatchdogOutcome::DeadUnreported);
            }
        }

        if let Some(parent) = alarm_file.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&alarm_file, now.to_rfc3339())?;
        return Ok(WatchdogOutcome::Alarmed);
    }

    if alarm_file.exists() {
        let message = format!("Ear service {} is running again", settings.my_fqdn);
        info!("{}", message);
        if let Err(e) = notifier
            .send_recovery(EarWarningType::EarAppearsDead, &message)
            .await
        {
            warn!("Could not send Slack recovery: {}", e);
        }
        std::fs::remove_file(&alarm_file)?;
        return Ok(WatchdogOutcome::Recovered);
    }

    Ok(WatchdogOutcome::Healthy)
}
