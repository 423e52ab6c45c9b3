//! The ear: archive every heard message and keep the archive healthy.
//!
//! Messages go straight to the object store while puts are working. When a
//! put fails the ear stops trying on the hot path and writes messages to the
//! local cache instead; the minute heartbeat is what turns uploads
//! back on. The hour job schedules a cache drain, which `tick` then works
//! through a batch at a time so message handling never waits on a long
//! backlog.

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::alert::{EarWarningType, SlackNotifier};
use crate::cache::LocalCache;
use crate::config::EarSettings;
use crate::cron::{CronClock, CronMarkers, Job};
use crate::error::Result;
use crate::journal::{Disposition, Journal};
use crate::message::{compute_hash, HeardMessage};
use crate::store::ObjectStore;
use crate::universe::{check_universe_type, world_root};

/// Cached files uploaded per tick while a drain is pending.
pub const CACHE_DRAIN_BATCH: usize = 32;

/// Outcome of one attempt to drain the local cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Files put in the store and removed locally.
    pub uploaded: usize,
    /// Files still waiting.
    pub remaining: usize,
}

/// The archiving core of the service.
#[derive(Debug)]
pub struct Ear {
    settings: EarSettings,
    store: Box<dyn ObjectStore>,
    cache: LocalCache,
    journal: Journal,
    notifier: SlackNotifier,
    clock: CronClock,
    markers: CronMarkers,
    put_works: bool,
    folder_name: String,
    messages_heard_this_hour: u64,
    last_hour_job: DateTime<Utc>,
    drain_pending: bool,
}

impl Ear {
    /// Build an ear from settings and an object store, starting at `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if the universe check fails or the cache, journal or
    /// cron markers cannot be set up.
    pub fn new(
        settings: EarSettings,
        store: Box<dyn ObjectStore>,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let journal = Journal::open(settings.journal_path())?;
        Self::with_journal(settings, store, journal, now)
    }

    /// Build an ear with an already opened journal.
    ///
    /// # Errors
    ///
    /// Returns an error if the universe check fails or the cache or cron
    /// markers cannot be set up.
    pub fn with_journal(
        settings: EarSettings,
        store: Box<dyn ObjectStore>,
        journal: Journal,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        check_universe_type(&settings.g_node_alias, settings.universe_type)?;

        let cache = LocalCache::open(settings.cache_dir())?;
        let markers = CronMarkers::init(
            settings.minute_cron_file(),
            settings.hour_cron_file(),
            settings.day_cron_file(),
            now,
        )?;
        let notifier = SlackNotifier::new(
            settings.slack.web_hook_url.clone(),
            settings.watchdog.warning_silencer_file.clone(),
        );

        info!(
            "Ear {} archiving {} ({}) to {}",
            settings.g_node_alias,
            settings.world_instance_alias,
            settings.universe_type,
            store.name()
        );

        Ok(Self {
            clock: CronClock::starting_at(now),
            folder_name: folder_name_for(now),
            settings,
            store,
            cache,
            journal,
            notifier,
            markers,
            put_works: false,
            messages_heard_this_hour: 0,
            last_hour_job: now,
            drain_pending: false,
        })
    }

    /// Settings the ear runs with.
    #[must_use]
    pub fn settings(&self) -> &EarSettings {
        &self.settings
    }

    /// The local cache.
    #[must_use]
    pub fn cache(&self) -> &LocalCache {
        &self.cache
    }

    /// The message journal.
    #[must_use]
    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    /// Whether the last put succeeded.
    #[must_use]
    pub fn put_works(&self) -> bool {
        self.put_works
    }

    /// Messages heard since the last hour job.
    #[must_use]
    pub fn messages_heard_this_hour(&self) -> u64 {
        self.messages_heard_this_hour
    }

    /// Whether the hour job left cached files for `tick` to upload.
    #[must_use]
    pub fn is_draining_cache(&self) -> bool {
        self.drain_pending
    }

    /// `<world_instance_alias>/eventstore/<YYYYMMDD>`, the current folder.
    #[must_use]
    pub fn output_folder_root(&self) -> String {
        format!(
            "{}/eventstore/{}",
            self.settings.world_instance_alias, self.folder_name
        )
    }

    /// Archive one heard message.
    ///
    /// # Errors
    ///
    /// Returns an error only if the message could be neither uploaded nor
    /// cached, or the journal write fails.
    pub async fn on_message(&mut self, message: &HeardMessage) -> Result<Disposition> {
        self.messages_heard_this_hour += 1;

        if self.settings.log_message_summary {
            info!(
                "IN {} ({} bytes, {})",
                message.kafka_topic(),
                message.len(),
                message.format
            );
        }

        let file_name = message.file_name(&self.settings.my_fqdn);
        let uploaded = if self.put_works {
            self.put(&file_name, message.payload.clone()).await
        } else {
            false
        };

        let disposition = if uploaded {
            Disposition::Uploaded
        } else {
            let discarded = self.cache.store(
                &file_name,
                &message.payload,
                self.settings.universe_type.is_disposable(),
            )?;
            for name in &discarded {
                self.journal.forget(name)?;
            }
            Disposition::Cached
        };

        self.journal
            .record(message, &file_name, disposition, Utc::now())?;
        Ok(disposition)
    }

    /// Put a payload into the current folder. Updates `put_works`.
    pub async fn put(&mut self, file_name: &str, payload: Vec<u8>) -> bool {
        let key = format!("{}/{}", self.output_folder_root(), file_name);
        match self.store.put(&key, payload).await {
            Ok(()) => {
                if !self.put_works {
                    info!("Puts to {} are working", self.store.name());
                }
                self.put_works = true;
                true
            }
            Err(e) => {
                if e.is_transient() {
                    info!("{}", e);
                } else {
                    warn!("{}", e);
                }
                self.put_works = false;
                false
            }
        }
    }

    /// Put the heartbeat object. This is how a failing store is re-checked.
    pub async fn heartbeat(&mut self, now: DateTime<Utc>) -> bool {
        let payload = json!({
            "EarDns": self.settings.my_fqdn,
            "UnixTimeMs": now.timestamp_millis(),
        })
        .to_string();
        let file_name = format!(
            "{}-heartbeat.a-0-{}.txt",
            world_root(&self.settings.world_instance_alias),
            self.settings.my_fqdn
        );
        self.put(&file_name, payload.into_bytes()).await
    }

    /// Upload every cached file, deleting each one that made it.
    ///
    /// Stops at the first failed put; the rest stay cached. Files whose
    /// contents no longer match the journaled hash are uploaded anyway, with
    /// a warning.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache or journal cannot be accessed.
    pub async fn try_to_empty_cache(&mut self, now: DateTime<Utc>) -> Result<FlushReport> {
        self.drain_cache(now, usize::MAX).await
    }

    /// Upload at most `limit` cached files, oldest names first.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache or journal cannot be accessed.
    pub async fn drain_cache(&mut self, now: DateTime<Utc>, limit: usize) -> Result<FlushReport> {
        let pending = self.cache.pending()?;
        let mut report = FlushReport {
            uploaded: 0,
            remaining: pending.len(),
        };

        for file_name in pending.into_iter().take(limit) {
            let payload = self.cache.read(&file_name)?;
            if let Some(entry) = self.journal.get_by_file_name(&file_name)? {
                if entry.payload_hash != compute_hash(&payload) {
                    warn!("Cached {} does not match its journal entry", file_name);
                }
            }

            if !self.put(&file_name, payload).await {
                break;
            }
            self.cache.remove(&file_name)?;
            self.journal.mark_uploaded(&file_name, now)?;
            info!("Put cached {} in {} and deleted locally", file_name, self.store.name());
            report.uploaded += 1;
            report.remaining -= 1;
        }

        Ok(report)
    }

    /// Move to the folder for `now` if the day changed.
    ///
    /// With a non-zero `rollover_min_bytes`, the folder only changes once the
    /// current one holds more than that many bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the folder size cannot be read.
    pub async fn possibly_update_folder(&mut self, now: DateTime<Utc>) -> Result<bool> {
        let candidate = folder_name_for(now);
        if candidate == self.folder_name {
            return Ok(false);
        }

        let min_bytes = self.settings.store.rollover_min_bytes;
        if min_bytes > 0 {
            let size = self.store.folder_size(&self.output_folder_root()).await?;
            if size <= min_bytes {
                debug!(
                    "{} holds {} bytes; staying put",
                    self.output_folder_root(),
                    size
                );
                return Ok(false);
            }
        }

        self.folder_name = candidate;
        info!("output_folder_root is now {}", self.output_folder_root());
        Ok(true)
    }

    /// Run every job that is due at `now`, in minute, hour, day order, then
    /// upload one batch of a pending cache drain.
    ///
    /// # Errors
    ///
    /// Returns an error if a job fails; later jobs are not run.
    pub async fn tick(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.clock.is_due(Job::Minute, now) {
            self.run_minute_job(now).await?;
        }
        if self.clock.is_due(Job::Hour, now) {
            self.run_hour_job(now).await?;
        }
        if self.clock.is_due(Job::Day, now) {
            self.run_day_job(now).await?;
        }
        if self.drain_pending && self.put_works {
            let report = self.drain_cache(now, CACHE_DRAIN_BATCH).await?;
            if report.uploaded > 0 {
                info!(
                    "Cache drain: {} uploaded, {} remaining",
                    report.uploaded, report.remaining
                );
            }
            if report.remaining == 0 {
                self.drain_pending = false;
            }
        }
        Ok(())
    }

    /// Heartbeat.
    ///
    /// # Errors
    ///
    /// Returns an error if the marker cannot be touched.
    pub async fn run_minute_job(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.heartbeat(now).await;
        self.finish(Job::Minute, now)
    }

    /// Silence check, counter reset, and scheduling the cache drain.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache or marker cannot be accessed.
    pub async fn run_hour_job(&mut self, now: DateTime<Utc>) -> Result<()> {
        let quiet_for = now - self.last_hour_job;
        let threshold = i64::try_from(self.settings.cron.silence_warning_after_secs)
            .unwrap_or(i64::MAX);
        if self.messages_heard_this_hour == 0 && quiet_for.num_seconds() > threshold {
            let warning_message = format!(
                "Ear service {} heard 0 messages last hour",
                self.settings.my_fqdn
            );
            warn!("{}", warning_message);
            if let Err(e) = self
                .notifier
                .send_warning(EarWarningType::EarHeardNoMessagesForAnHour, &warning_message)
                .await
            {
                warn!("Could not send Slack warning: {}", e);
            }
        }
        self.messages_heard_this_hour = 0;

        if self.put_works && !self.cache.is_empty()? {
            info!("{} cached files to upload", self.cache.len()?);
            self.drain_pending = true;
        }

        self.last_hour_job = now;
        info!("Ran cron every hour");
        self.finish(Job::Hour, now)
    }

    /// Folder rollover and journal pruning.
    ///
    /// # Errors
    ///
    /// Returns an error if the rollover check, pruning or marker touch fails.
    pub async fn run_day_job(&mut self, now: DateTime<Utc>) -> Result<()> {
        if let Err(e) = self.possibly_update_folder(now).await {
            warn!("Could not check folder rollover: {}", e);
        }
        if self.settings.journal_max_age().is_some() {
            let max_age = chrono::Duration::days(i64::from(self.settings.journal.max_age_days));
            self.journal.prune_older_than(max_age, now)?;
        }
        info!("Ran cron every day");
        self.finish(Job::Day, now)
    }

    fn finish(&mut self, job: Job, now: DateTime<Utc>) -> Result<()> {
        self.clock.mark_ran(job, now);
        self.markers.touch(job, now)
    }
}

/// UTC `YYYYMMDD` folder name for a moment.
#[must_use]
pub fn folder_name_for(now: DateTime<Utc>) -> String {
    now.format("%Y%m%d").to_string()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::TimeZone;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::config::StoreKind;
    use crate::error::Error;
    use crate::store::FsStore;
    use crate::universe::UniverseType;

    /// Filesystem store whose puts can be switched off.
    #[derive(Debug, Clone)]
    struct FlakyStore {
        inner: FsStore,
        up: Arc<AtomicBool>,
    }

    #[async_trait]
    impl ObjectStore for FlakyStore {
        fn name(&self) -> &'static str {
            "flaky"
        }

        async fn put(&self, key: &str, body: Vec<u8>) -> Result<()> {
            if self.up.load(Ordering::SeqCst) {
                self.inner.put(key, body).await
            } else {
                Err(Error::object_store("flaky", key, "endpoint unreachable"))
            }
        }

        async fn folder_size(&self, prefix: &str) -> Result<u64> {
            self.inner.folder_size(prefix).await
        }
    }

    struct Fixture {
        dir: tempfile::TempDir,
        up: Arc<AtomicBool>,
        ear: Ear,
    }

    impl Fixture {
        fn bucket(&self) -> std::path::PathBuf {
            self.dir.path().join("bucket")
        }
    }

    fn at(s: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(s, 0).unwrap()
    }

    // 2023-11-14T22:13:20Z
    const T0: i64 = 1_700_000_000;

    fn settings_in(dir: &std::path::Path) -> EarSettings {
        let mut settings = EarSettings::default();
        settings.g_node_alias = "hw1.isone.ear".to_string();
        settings.world_instance_alias = "hw1__1".to_string();
        settings.universe_type = UniverseType::Hybrid;
        settings.my_fqdn = "ear.test".to_string();
        settings.output_dir = dir.join("output");
        settings.store.kind = StoreKind::Filesystem;
        settings.store.root = Some(dir.join("bucket"));
        settings.watchdog.warning_silencer_file = dir.join("silencer.txt");
        settings
    }

    fn fixture_with(settings: impl FnOnce(&mut EarSettings), up: bool) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let mut s = settings_in(dir.path());
        settings(&mut s);
        let up = Arc::new(AtomicBool::new(up));
        let store = FlakyStore {
            inner: FsStore::open(s.store_root()).unwrap(),
            up: Arc::clone(&up),
        };
        let ear = Ear::with_journal(
            s,
            Box::new(store),
            Journal::open_in_memory().unwrap(),
            at(T0),
        )
        .unwrap();
        Fixture { dir, up, ear }
    }

    fn fixture(up: bool) -> Fixture {
        fixture_with(|_| {}, up)
    }

    fn heard(ms: i64) -> HeardMessage {
        HeardMessage::from_mqtt(
            "gw/hw1-isone-ct-orange1/gt-telemetry-110",
            b"{\"Value\": 1}".to_vec(),
            Utc.timestamp_millis_opt(ms).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_universe_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings_in(dir.path());
        settings.universe_type = UniverseType::Dev;
        let store = FsStore::open(settings.store_root()).unwrap();
        let result = Ear::with_journal(
            settings,
            Box::new(store),
            Journal::open_in_memory().unwrap(),
            at(T0),
        );
        assert!(matches!(result, Err(Error::UniverseMismatch { .. })));
    }

    #[test]
    fn test_output_folder_root() {
        let fx = fixture(true);
        assert_eq!(fx.ear.output_folder_root(), "hw1__1/eventstore/20231114");
        assert!(!fx.ear.put_works());
    }

    #[test]
    fn test_markers_created_on_start() {
        let fx = fixture(true);
        let settings = fx.ear.settings();
        assert!(settings.minute_cron_file().exists());
        assert!(settings.hour_cron_file().exists());
        assert!(settings.day_cron_file().exists());
    }

    #[tokio::test]
    async fn test_messages_are_cached_until_heartbeat_succeeds() {
        let mut fx = fixture(true);
        let msg = heard(T0 * 1000 + 5);

        // put_works starts false, so the first message is cached.
        assert_eq!(fx.ear.on_message(&msg).await.unwrap(), Disposition::Cached);
        assert_eq!(fx.ear.cache().len().unwrap(), 1);

        assert!(fx.ear.heartbeat(at(T0)).await);
        assert!(fx.ear.put_works());

        let next = heard(T0 * 1000 + 10);
        assert_eq!(fx.ear.on_message(&next).await.unwrap(), Disposition::Uploaded);
        let entry = fx
            .ear
            .journal()
            .get_by_file_name(&next.file_name("ear.test"))
            .unwrap()
            .unwrap();
        assert!(entry.uploaded_at.unwrap() > next.received_at);

        let key = fx
            .bucket()
            .join("hw1__1/eventstore/20231114")
            .join(next.file_name("ear.test"));
        assert_eq!(std::fs::read(key).unwrap(), next.payload);
        assert_eq!(fx.ear.messages_heard_this_hour(), 2);
    }

    #[tokio::test]
    async fn test_heartbeat_object() {
        let mut fx = fixture(true);
        assert!(fx.ear.heartbeat(at(T0)).await);

        let path = fx
            .bucket()
            .join("hw1__1/eventstore/20231114/hw1-heartbeat.a-0-ear.test.txt");
        let body: serde_json::Value =
            serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
        assert_eq!(body["EarDns"], "ear.test");
        assert_eq!(body["UnixTimeMs"], T0 * 1000);
    }

    #[tokio::test]
    async fn test_failed_put_falls_back_to_cache() {
        let mut fx = fixture(true);
        assert!(fx.ear.heartbeat(at(T0)).await);

        fx.up.store(false, Ordering::SeqCst);
        let msg = heard(T0 * 1000);
        assert_eq!(fx.ear.on_message(&msg).await.unwrap(), Disposition::Cached);
        assert!(!fx.ear.put_works());
        assert_eq!(
            fx.ear.cache().pending().unwrap(),
            vec![msg.file_name("ear.test")]
        );

        let entry = fx
            .ear
            .journal()
            .get_by_file_name(&msg.file_name("ear.test"))
            .unwrap()
            .unwrap();
        assert_eq!(entry.status, Disposition::Cached);
    }

    #[tokio::test]
    async fn test_try_to_empty_cache() {
        let mut fx = fixture(false);
        let a = heard(T0 * 1000 + 1);
        let b = heard(T0 * 1000 + 2);
        fx.ear.on_message(&a).await.unwrap();
        fx.ear.on_message(&b).await.unwrap();
        assert_eq!(fx.ear.cache().len().unwrap(), 2);

        // Still down: nothing moves.
        let report = fx.ear.try_to_empty_cache(at(T0)).await.unwrap();
        assert_eq!(report, FlushReport { uploaded: 0, remaining: 2 });

        fx.up.store(true, Ordering::SeqCst);
        let report = fx.ear.try_to_empty_cache(at(T0 + 60)).await.unwrap();
        assert_eq!(report, FlushReport { uploaded: 2, remaining: 0 });
        assert!(fx.ear.cache().is_empty().unwrap());

        let stats = fx.ear.journal().stats().unwrap();
        assert_eq!(stats.uploaded, 2);
        assert_eq!(stats.cached, 0);
        assert!(fx
            .bucket()
            .join("hw1__1/eventstore/20231114")
            .join(a.file_name("ear.test"))
            .exists());
    }

    #[tokio::test]
    async fn test_dev_universe_keeps_only_newest_cached() {
        let mut fx = fixture_with(
            |s| {
                s.g_node_alias = "d1.ear".to_string();
                s.world_instance_alias = "d1__1".to_string();
                s.universe_type = UniverseType::Dev;
            },
            false,
        );
        fx.ear.on_message(&heard(T0 * 1000 + 1)).await.unwrap();
        let last = heard(T0 * 1000 + 2);
        fx.ear.on_message(&last).await.unwrap();
        assert_eq!(
            fx.ear.cache().pending().unwrap(),
            vec![last.file_name("ear.test")]
        );
    }

    #[tokio::test]
    async fn test_dev_journal_forgets_discarded_files() {
        let mut fx = fixture_with(
            |s| {
                s.g_node_alias = "d1.ear".to_string();
                s.world_instance_alias = "d1__1".to_string();
                s.universe_type = UniverseType::Dev;
            },
            false,
        );
        for i in 0..20 {
            fx.ear.on_message(&heard(T0 * 1000 + i)).await.unwrap();
        }

        let journal = fx.ear.journal();
        assert_eq!(fx.ear.cache().len().unwrap(), 1);
        assert_eq!(journal.count().unwrap(), 1);
        assert_eq!(journal.count_by_status(Disposition::Cached).unwrap(), 1);
        let kept = heard(T0 * 1000 + 19).file_name("ear.test");
        assert!(journal.get_by_file_name(&kept).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_possibly_update_folder_rolls_daily() {
        let mut fx = fixture(true);
        assert!(!fx.ear.possibly_update_folder(at(T0 + 10)).await.unwrap());
        assert!(fx.ear.possibly_update_folder(at(T0 + 86_400)).await.unwrap());
        assert_eq!(fx.ear.output_folder_root(), "hw1__1/eventstore/20231115");
    }

    #[tokio::test]
    async fn test_rollover_waits_for_size() {
        let mut fx = fixture_with(|s| s.store.rollover_min_bytes = 20, true);
        assert!(!fx.ear.possibly_update_folder(at(T0 + 86_400)).await.unwrap());

        fx.ear.put("big.json", vec![0; 32]).await;
        assert!(fx.ear.possibly_update_folder(at(T0 + 86_400)).await.unwrap());
        assert_eq!(fx.ear.output_folder_root(), "hw1__1/eventstore/20231115");
    }

    #[tokio::test]
    async fn test_tick_runs_minute_job_and_enables_puts() {
        let mut fx = fixture(true);
        fx.ear.tick(at(T0)).await.unwrap();
        assert!(fx.ear.put_works());
        assert_eq!(
            crate::cron::modified_at(&fx.ear.settings().minute_cron_file()).unwrap(),
            Some(at(T0))
        );
    }

    #[tokio::test]
    async fn test_hour_job_schedules_drain_and_resets_counter() {
        let mut fx = fixture(false);
        fx.ear.on_message(&heard(T0 * 1000)).await.unwrap();
        assert_eq!(fx.ear.messages_heard_this_hour(), 1);

        fx.up.store(true, Ordering::SeqCst);
        fx.ear.run_minute_job(at(T0 + 60)).await.unwrap();
        fx.ear.run_hour_job(at(T0 + 3_600)).await.unwrap();

        assert_eq!(fx.ear.messages_heard_this_hour(), 0);
        assert!(fx.ear.is_draining_cache());
        assert_eq!(fx.ear.cache().len().unwrap(), 1);

        fx.ear.tick(at(T0 + 3_600)).await.unwrap();
        assert!(fx.ear.cache().is_empty().unwrap());
        assert!(!fx.ear.is_draining_cache());
    }

    #[tokio::test]
    async fn test_backlog_drains_in_batches() {
        let mut fx = fixture(false);
        let backlog = CACHE_DRAIN_BATCH + 5;
        for i in 0..backlog {
            let ms = T0 * 1000 + i64::try_from(i).unwrap();
            fx.ear.on_message(&heard(ms)).await.unwrap();
        }

        fx.up.store(true, Ordering::SeqCst);
        fx.ear.run_minute_job(at(T0 + 60)).await.unwrap();
        fx.ear.run_hour_job(at(T0 + 3_600)).await.unwrap();
        assert_eq!(fx.ear.cache().len().unwrap(), backlog);

        fx.ear.tick(at(T0 + 3_600)).await.unwrap();
        assert_eq!(fx.ear.cache().len().unwrap(), 5);
        assert!(fx.ear.is_draining_cache());

        fx.ear.tick(at(T0 + 3_601)).await.unwrap();
        assert!(fx.ear.cache().is_empty().unwrap());
        assert!(!fx.ear.is_draining_cache());
        assert_eq!(
            fx.ear.journal().count_by_status(Disposition::Uploaded).unwrap(),
            i64::try_from(backlog).unwrap()
        );
    }

    #[tokio::test]
    async fn test_hour_job_skips_drain_while_puts_fail() {
        let mut fx = fixture(false);
        fx.ear.on_message(&heard(T0 * 1000)).await.unwrap();
        fx.ear.run_hour_job(at(T0 + 3_600)).await.unwrap();
        assert!(!fx.ear.is_draining_cache());
        assert_eq!(fx.ear.cache().len().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_silent_hour_sends_warning() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let uri = server.uri();
        let mut fx = fixture_with(move |s| s.slack.web_hook_url = uri, true);

        // Less than half an hour since start: no warning.
        fx.ear.run_hour_job(at(T0 + 600)).await.unwrap();
        // A full silent hour after that: warning.
        fx.ear.run_hour_job(at(T0 + 600 + 3_600)).await.unwrap();
    }

    #[tokio::test]
    async fn test_busy_hour_sends_no_warning() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let uri = server.uri();
        let mut fx = fixture_with(move |s| s.slack.web_hook_url = uri, true);
        fx.ear.on_message(&heard(T0 * 1000)).await.unwrap();
        fx.ear.run_hour_job(at(T0 + 3_600)).await.unwrap();
    }

    #[tokio::test]
    async fn test_day_job_prunes_journal() {
        let mut fx = fixture_with(|s| s.journal.max_age_days = 1, true);
        fx.ear.heartbeat(at(T0)).await;
        fx.ear.on_message(&heard(T0 * 1000)).await.unwrap();
        assert_eq!(fx.ear.journal().count().unwrap(), 1);

        fx.ear.run_day_job(at(T0 + 3 * 86_400)).await.unwrap();
        assert_eq!(fx.ear.journal().count().unwrap(), 0);
        assert_eq!(fx.ear.output_folder_root(), "hw1__1/eventstore/20231117");
    }

    #[test]
    fn test_folder_name_for() {
        assert_eq!(folder_name_for(at(0)), "19700101");
        assert_eq!(folder_name_for(at(T0)), "20231114");
    }
}
