//! Per-job execution progress.
//!
//! Progress is mutated from two independent sources: telemetry records sent
//! by the program running on the controller, and explicit control calls
//! (pause, resume, scrub). Neither source is ordered relative to the other,
//! so every write clamps `current` into `[0, total]` and simply overwrites
//! the previous value.
//!
//! All indices are motion ordinals: `current == n` means the first `n`
//! motion instructions of the job have completed.

use crate::store::{InMemoryStore, KeyValueStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Progress of one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEntry {
    /// Job identifier.
    pub job_id: String,
    /// Completed motion instructions.
    pub current: u64,
    /// Total motion instructions in the job.
    pub total: u64,
    /// Position a resume should restart from.
    pub last_confirmed_index: u64,
    /// Whether the job is paused.
    pub paused: bool,
    /// Time of the last mutation.
    pub updated_at: DateTime<Utc>,
}

impl ProgressEntry {
    /// Fresh entry at position zero.
    pub fn new(job_id: impl Into<String>, total: u64) -> Self {
        Self {
            job_id: job_id.into(),
            current: 0,
            total,
            last_confirmed_index: 0,
            paused: false,
            updated_at: Utc::now(),
        }
    }

    /// Whether every motion has been reported complete.
    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.current >= self.total
    }

    /// Completion as a percentage.
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.current as f64 * 100.0 / self.total as f64
    }
}

/// Notification published after every progress mutation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "entry", rename_all = "camelCase")]
pub enum ProgressEvent {
    /// A compiled job was registered.
    Registered(ProgressEntry),
    /// A telemetry record was applied.
    Recorded(ProgressEntry),
    /// Position was scrubbed manually.
    Overridden(ProgressEntry),
    /// The job was paused.
    Paused(ProgressEntry),
    /// The job was resumed.
    Resumed(ProgressEntry),
}

impl ProgressEvent {
    /// The entry state after the mutation.
    pub fn entry(&self) -> &ProgressEntry {
        match self {
            ProgressEvent::Registered(entry)
            | ProgressEvent::Recorded(entry)
            | ProgressEvent::Overridden(entry)
            | ProgressEvent::Paused(entry)
            | ProgressEvent::Resumed(entry) => entry,
        }
    }
}

/// Clamp a possibly negative index into `[0, total]`.
pub fn clamp_index(index: i64, total: u64) -> u64 {
    if index <= 0 {
        0
    } else {
        (index as u64).min(total)
    }
}

/// Progress store over an injected key-value store.
pub struct ProgressStore<S = InMemoryStore<ProgressEntry>> {
    entries: S,
    events: broadcast::Sender<ProgressEvent>,
}

impl ProgressStore<InMemoryStore<ProgressEntry>> {
    /// Progress store backed by a fresh in-memory map.
    pub fn in_memory() -> Self {
        Self::new(InMemoryStore::new())
    }
}

impl<S> ProgressStore<S>
where
    S: KeyValueStore<ProgressEntry>,
{
    /// Wrap `entries`.
    pub fn new(entries: S) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { entries, events }
    }

    /// Receive every subsequent mutation.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.events.subscribe()
    }

    fn publish(&self, event: ProgressEvent) {
        // No subscribers is the normal case outside the request layer.
        let _ = self.events.send(event);
    }

    /// Start tracking a newly compiled job at position zero.
    ///
    /// Replaces any entry already stored under `job_id`.
    pub fn register(&self, job_id: &str, total: u64) -> ProgressEntry {
        let entry = ProgressEntry::new(job_id, total);
        self.entries.insert(job_id.to_string(), entry.clone());
        tracing::debug!(job_id, total, "Progress tracking started");
        self.publish(ProgressEvent::Registered(entry.clone()));
        entry
    }

    /// Apply a telemetry record.
    ///
    /// Last write wins: an out-of-order record moves `current` backwards.
    /// While paused, `last_confirmed_index` stays frozen.
    pub fn record_progress(&self, job_id: &str, current: i64, total: u64) -> ProgressEntry {
        let entry = self.entries.upsert(
            job_id,
            &mut || ProgressEntry::new(job_id, total),
            &mut |entry| {
                entry.total = total;
                entry.current = clamp_index(current, total);
                if !entry.paused {
                    entry.last_confirmed_index = entry.current;
                }
                entry.updated_at = Utc::now();
            },
        );
        tracing::trace!(job_id, current = entry.current, total, "Progress recorded");
        self.publish(ProgressEvent::Recorded(entry.clone()));
        entry
    }

    /// Scrub to `index`, clamped into `[0, total]`.
    pub fn override_progress(&self, job_id: &str, index: i64) -> Option<ProgressEntry> {
        let entry = self.entries.update(job_id, &mut |entry| {
            entry.current = clamp_index(index, entry.total);
            entry.last_confirmed_index = entry.current;
            entry.updated_at = Utc::now();
        })?;
        tracing::debug!(job_id, current = entry.current, "Progress overridden");
        self.publish(ProgressEvent::Overridden(entry.clone()));
        Some(entry)
    }

    /// Pause the job, freezing the resume position at the current value.
    pub fn mark_job_paused(&self, job_id: &str) -> Option<ProgressEntry> {
        let entry = self.entries.update(job_id, &mut |entry| {
            entry.paused = true;
            entry.last_confirmed_index = entry.current;
            entry.updated_at = Utc::now();
        })?;
        tracing::info!(job_id, position = entry.last_confirmed_index, "Job paused");
        self.publish(ProgressEvent::Paused(entry.clone()));
        Some(entry)
    }

    /// Clear the pause flag without moving the position.
    pub fn resume_job(&self, job_id: &str) -> Option<ProgressEntry> {
        let entry = self.entries.update(job_id, &mut |entry| {
            entry.paused = false;
            entry.updated_at = Utc::now();
        })?;
        tracing::info!(job_id, position = entry.last_confirmed_index, "Job resumed");
        self.publish(ProgressEvent::Resumed(entry.clone()));
        Some(entry)
    }

    /// Current entry for `job_id`.
    pub fn get(&self, job_id: &str) -> Option<ProgressEntry> {
        self.entries.get(job_id)
    }

    /// Position a resume should restart from; 0 for an unknown job.
    pub fn get_resume_position(&self, job_id: &str) -> u64 {
        self.entries
            .get(job_id)
            .map(|entry| entry.last_confirmed_index)
            .unwrap_or(0)
    }

    /// Identifiers of every tracked job.
    pub fn job_ids(&self) -> Vec<String> {
        self.entries.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_index() {
        assert_eq!(clamp_index(-5, 10), 0);
        assert_eq!(clamp_index(0, 10), 0);
        assert_eq!(clamp_index(7, 10), 7);
        assert_eq!(clamp_index(15, 10), 10);
        assert_eq!(clamp_index(3, 0), 0);
    }

    #[test]
    fn test_register_starts_at_zero() {
        let store = ProgressStore::in_memory();
        let entry = store.register("job", 12);
        assert_eq!(entry.current, 0);
        assert_eq!(entry.total, 12);
        assert!(!entry.paused);
        assert_eq!(store.get_resume_position("job"), 0);
    }

    #[test]
    fn test_record_is_last_write_wins() {
        let store = ProgressStore::in_memory();
        store.register("x", 10);
        store.record_progress("x", 5, 10);
        let entry = store.record_progress("x", 3, 10);
        assert_eq!(entry.current, 3);
        assert_eq!(store.get("x").unwrap().current, 3);
    }

    #[test]
    fn test_record_clamps_and_creates_unknown_jobs() {
        let store = ProgressStore::in_memory();
        let entry = store.record_progress("late", 40, 20);
        assert_eq!(entry.current, 20);
        assert!(entry.is_complete());

        let entry = store.record_progress("late", -1, 20);
        assert_eq!(entry.current, 0);
    }

    #[test]
    fn test_override_clamps() {
        let store = ProgressStore::in_memory();
        store.register("job", 8);
        assert_eq!(store.override_progress("job", 100).unwrap().current, 8);
        assert_eq!(store.override_progress("job", -3).unwrap().current, 0);
        assert!(store.override_progress("missing", 1).is_none());
    }

    #[test]
    fn test_pause_freezes_resume_position() {
        let store = ProgressStore::in_memory();
        store.register("job", 100);
        store.record_progress("job", 40, 100);
        store.mark_job_paused("job").unwrap();

        // Telemetry still trickles in after the pause was requested.
        let entry = store.record_progress("job", 43, 100);
        assert_eq!(entry.current, 43);
        assert_eq!(store.get_resume_position("job"), 40);

        let resumed = store.resume_job("job").unwrap();
        assert!(!resumed.paused);
        assert_eq!(resumed.last_confirmed_index, 40);
    }

    #[test]
    fn test_unknown_job_controls() {
        let store = ProgressStore::in_memory();
        assert!(store.mark_job_paused("nope").is_none());
        assert!(store.resume_job("nope").is_none());
        assert_eq!(store.get_resume_position("nope"), 0);
    }

    #[test]
    fn test_events_are_published() {
        let store = ProgressStore::in_memory();
        let mut events = store.subscribe();
        store.register("job", 4);
        store.record_progress("job", 2, 4);

        let first = events.try_recv().unwrap();
        assert!(matches!(first, ProgressEvent::Registered(_)));
        let second = events.try_recv().unwrap();
        assert_eq!(second.entry().current, 2);
    }

    #[test]
    fn test_percent() {
        let mut entry = ProgressEntry::new("job", 4);
        assert_eq!(entry.percent(), 0.0);
        entry.current = 1;
        assert_eq!(entry.percent(), 25.0);
        assert_eq!(ProgressEntry::new("empty", 0).percent(), 0.0);
    }

    #[test]
    fn test_event_wire_shape() {
        let store = ProgressStore::in_memory();
        let mut events = store.subscribe();
        store.register("job", 4);

        let json = serde_json::to_value(events.try_recv().unwrap()).unwrap();
        assert_eq!(json["type"], "registered");
        assert_eq!(json["entry"]["jobId"], "job");
        assert_eq!(json["entry"]["lastConfirmedIndex"], 0);
    }
}
