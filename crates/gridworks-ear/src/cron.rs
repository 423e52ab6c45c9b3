//! Minute, hour and day job scheduling.
//!
//! The clock keeps the unix second of each job's last run. A job is due once
//! the current time passes the next boundary after its last run, so a job
//! that runs late does not run twice for the same boundary.
//!
//! Each job also touches a marker file on success. External watchers (the
//! `gear watchdog` command, or plain `stat`) read the marker's modification
//! time to tell a live ear from a dead one.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};

const MINUTE_SECS: i64 = 60;
const HOUR_SECS: i64 = 3_600;
const DAY_SECS: i64 = 86_400;

/// A periodic job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Job {
    /// Runs every minute.
    Minute,
    /// Runs every hour.
    Hour,
    /// Runs every day.
    Day,
}

impl std::fmt::Display for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Minute => write!(f, "minute"),
            Self::Hour => write!(f, "hour"),
            Self::Day => write!(f, "day"),
        }
    }
}

/// Last-run bookkeeping for the three periodic jobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronClock {
    last_minute_s: i64,
    last_hour_s: i64,
    last_day_s: i64,
}

impl CronClock {
    /// Clock for an ear starting at `now`.
    ///
    /// The minute job is anchored to the previous five-minute boundary, so it
    /// fires on the first tick after startup.
    #[must_use]
    pub fn starting_at(now: DateTime<Utc>) -> Self {
        let now_s = now.timestamp();
        Self {
            last_minute_s: now_s - now_s.rem_euclid(300),
            last_hour_s: now_s - now_s.rem_euclid(HOUR_SECS),
            last_day_s: now_s - now_s.rem_euclid(DAY_SECS),
        }
    }

    /// Unix second after which `job` is next due.
    #[must_use]
    pub fn next_run_s(&self, job: Job) -> i64 {
        let (last, period) = match job {
            Job::Minute => (self.last_minute_s, MINUTE_SECS),
            Job::Hour => (self.last_hour_s, HOUR_SECS),
            Job::Day => (self.last_day_s, DAY_SECS),
        };
        last - last.rem_euclid(period) + period
    }

    /// Whether `job` is due at `now`.
    #[must_use]
    pub fn is_due(&self, job: Job, now: DateTime<Utc>) -> bool {
        now.timestamp() > self.next_run_s(job)
    }

    /// Record that `job` ran at `now`.
    pub fn mark_ran(&mut self, job: Job, now: DateTime<Utc>) {
        let now_s = now.timestamp();
        match job {
            Job::Minute => self.last_minute_s = now_s,
            Job::Hour => self.last_hour_s = now_s,
            Job::Day => self.last_day_s = now_s,
        }
    }

    /// Unix second of the last run of `job`.
    #[must_use]
    pub fn last_run_s(&self, job: Job) -> i64 {
        match job {
            Job::Minute => self.last_minute_s,
            Job::Hour => self.last_hour_s,
            Job::Day => self.last_day_s,
        }
    }
}

/// Marker files touched by successful jobs.
#[derive(Debug, Clone)]
pub struct CronMarkers {
    minute: PathBuf,
    hour: PathBuf,
    day: PathBuf,
}

impl CronMarkers {
    /// Create any missing marker, stamped with `now`.
    ///
    /// Existing markers keep their time, so a one-shot command never makes a
    /// dead daemon look alive.
    ///
    /// # Errors
    ///
    /// Returns an error if a marker cannot be created or touched.
    pub fn init(
        minute: PathBuf,
        hour: PathBuf,
        day: PathBuf,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let markers = Self { minute, hour, day };
        for job in [Job::Minute, Job::Hour, Job::Day] {
            if !markers.path(job).exists() {
                markers.touch(job, now)?;
            }
        }
        Ok(markers)
    }

    /// Path of the marker for `job`.
    #[must_use]
    pub fn path(&self, job: Job) -> &Path {
        match job {
            Job::Minute => &self.minute,
            Job::Hour => &self.hour,
            Job::Day => &self.day,
        }
    }

    /// Set the marker's modification time to `now`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or its time set.
    pub fn touch(&self, job: Job, now: DateTime<Utc>) -> Result<()> {
        touch(self.path(job), now)
    }
}

/// Set a file's modification time, creating it (and its parents) if needed.
///
/// # Errors
///
/// Returns an error if the file cannot be created or its time set.
pub fn touch(path: &Path, now: DateTime<Utc>) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                path: parent.to_path_buf(),
                source,
            })?;
        }
    }
    let file: File = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    file.set_modified(SystemTime::from(now))?;
    Ok(())
}

/// Modification time of a file, or `None` if it does not exist.
///
/// # Errors
///
/// Returns an error if the file exists but its metadata cannot be read.
pub fn modified_at(path: &Path) -> Result<Option<DateTime<Utc>>> {
    match std::fs::metadata(path) {
        Ok(meta) => Ok(Some(DateTime::<Utc>::from(meta.modified()?))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(s: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(s, 0).unwrap()
    }

    // 2023-11-14T22:13:20Z
    const T0: i64 = 1_700_000_000;

    #[test]
    fn test_starting_at_floors() {
        let clock = CronClock::starting_at(at(T0));
        assert_eq!(clock.last_run_s(Job::Minute), T0 - T0 % 300);
        assert_eq!(clock.last_run_s(Job::Hour), T0 - T0 % 3_600);
        assert_eq!(clock.last_run_s(Job::Day), T0 - T0 % 86_400);
    }

    #[test]
    fn test_minute_job_due_shortly_after_start() {
        // T0 % 300 == 200, so the minute anchor is 200s back and the next
        // boundary is already behind us.
        let clock = CronClock::starting_at(at(T0));
        assert!(clock.is_due(Job::Minute, at(T0)));
    }

    #[test]
    fn test_next_run_rounds_to_period() {
        let mut clock = CronClock::starting_at(at(T0));
        clock.mark_ran(Job::Minute, at(T0 + 7));
        let expected = (T0 + 7) - (T0 + 7) % 60 + 60;
        assert_eq!(clock.next_run_s(Job::Minute), expected);
        assert!(!clock.is_due(Job::Minute, at(expected)));
        assert!(clock.is_due(Job::Minute, at(expected + 1)));
    }

    #[test]
    fn test_hour_and_day_not_due_right_after_start() {
        let clock = CronClock::starting_at(at(T0));
        assert!(!clock.is_due(Job::Hour, at(T0)));
        assert!(!clock.is_due(Job::Day, at(T0)));
    }

    #[test]
    fn test_hour_due_after_boundary() {
        let clock = CronClock::starting_at(at(T0));
        let boundary = T0 - T0 % 3_600 + 3_600;
        assert!(!clock.is_due(Job::Hour, at(boundary)));
        assert!(clock.is_due(Job::Hour, at(boundary + 1)));
    }

    #[test]
    fn test_late_run_does_not_repeat() {
        let mut clock = CronClock::starting_at(at(T0));
        let late = T0 - T0 % 86_400 + 86_400 + 5_000;
        assert!(clock.is_due(Job::Day, at(late)));
        clock.mark_ran(Job::Day, at(late));
        assert!(!clock.is_due(Job::Day, at(late + 1)));
    }

    #[test]
    fn test_markers_init_and_touch() {
        let dir = tempfile::tempdir().unwrap();
        let markers = CronMarkers::init(
            dir.path().join("m.txt"),
            dir.path().join("sub/h.txt"),
            dir.path().join("d.txt"),
            at(T0),
        )
        .unwrap();

        for job in [Job::Minute, Job::Hour, Job::Day] {
            assert_eq!(modified_at(markers.path(job)).unwrap(), Some(at(T0)));
        }

        markers.touch(Job::Hour, at(T0 + 3_600)).unwrap();
        assert_eq!(
            modified_at(markers.path(Job::Hour)).unwrap(),
            Some(at(T0 + 3_600))
        );
    }

    #[test]
    fn test_init_keeps_existing_marker_time() {
        let dir = tempfile::tempdir().unwrap();
        let minute = dir.path().join("m.txt");
        touch(&minute, at(T0)).unwrap();

        let markers = CronMarkers::init(
            minute.clone(),
            dir.path().join("h.txt"),
            dir.path().join("d.txt"),
            at(T0 + 900),
        )
        .unwrap();
        assert_eq!(modified_at(&minute).unwrap(), Some(at(T0)));
        assert_eq!(
            modified_at(markers.path(Job::Day)).unwrap(),
            Some(at(T0 + 900))
        );
    }

    #[test]
    fn test_touch_keeps_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("marker.txt");
        std::fs::write(&path, b"keep").unwrap();
        touch(&path, at(T0)).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"keep");
    }

    #[test]
    fn test_modified_at_missing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(modified_at(&dir.path().join("nope")).unwrap().is_none());
    }

    #[test]
    fn test_job_display() {
        assert_eq!(Job::Minute.to_string(), "minute");
        assert_eq!(Job::Hour.to_string(), "hour");
        assert_eq!(Job::Day.to_string(), "day");
    }
}
