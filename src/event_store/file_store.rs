//! Append-only JSONL event logs behind the cqrs-es `EventStore` trait.
//!
//! Commits take an exclusive `fs2` lock, compare the last stored sequence
//! with the loaded one and append all lines in one write. Snapshots are
//! optional and written through a temp file.
//!
//! One store holds one aggregate type. Each stored line carries the actor
//! metadata of the command that produced it, so the log doubles as the
//! audit trail.

use crate::domain::audit::AuditRecord;
use crate::domain::types::TimestampUtc;
use async_trait::async_trait;
use cqrs_es::{
    Aggregate, AggregateContext, AggregateError, DomainEvent, EventEnvelope, EventStore,
};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Seek, SeekFrom, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

/// One line of an event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEvent<E> {
    pub aggregate_id: String,
    pub sequence: u64,
    pub recorded_at: TimestampUtc,
    pub event_type: String,
    pub event_version: String,
    pub event: E,
    pub metadata: HashMap<String, String>,
}

/// Aggregate state as of `sequence`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredSnapshot<A> {
    pub aggregate_id: String,
    pub sequence: u64,
    pub snapshot_at: TimestampUtc,
    pub state: A,
}

/// File-based event store for aggregate type `A`.
#[derive(Debug, Clone)]
pub struct FileEventStore<A> {
    /// JSONL log shared by every aggregate of this type.
    pub log_path: PathBuf,
    /// Directory holding one `<aggregate_id>.json` snapshot per aggregate.
    pub snapshot_dir: PathBuf,
    /// 0 disables snapshots.
    pub snapshot_every: u64,
    _aggregate: PhantomData<fn() -> A>,
}

/// Loaded aggregate plus the sequence its commit must follow.
pub struct FileAggregateContext<A: Aggregate> {
    pub aggregate_id: String,
    pub aggregate: A,
    /// Sequence of the last applied event.
    pub current_sequence: u64,
}

impl<A: Aggregate> AggregateContext<A> for FileAggregateContext<A> {
    fn aggregate(&self) -> &A {
        &self.aggregate
    }
}

fn unexpected<E: std::error::Error>(
    err: impl std::error::Error + Send + Sync + 'static,
) -> AggregateError<E> {
    AggregateError::UnexpectedError(Box::new(err))
}

impl<A: Aggregate> FileEventStore<A> {
    pub fn new(log_path: PathBuf, snapshot_dir: PathBuf, snapshot_every: u64) -> Self {
        Self {
            log_path,
            snapshot_dir,
            snapshot_every,
            _aggregate: PhantomData,
        }
    }

    /// Store laid out under `data_dir` and named after the aggregate type:
    /// `<data_dir>/<type>.jsonl` and `<data_dir>/snapshots/<type>/`.
    pub fn in_dir(data_dir: &Path, snapshot_every: u64) -> Self {
        let name = A::aggregate_type();
        Self::new(
            data_dir.join(format!("{}.jsonl", name)),
            data_dir.join("snapshots").join(name),
            snapshot_every,
        )
    }

    fn snapshot_path(&self, aggregate_id: &str) -> PathBuf {
        self.snapshot_dir.join(format!("{}.json", aggregate_id))
    }

    /// Reads the whole log under one shared lock.
    pub fn load_all(&self) -> Result<Vec<StoredEvent<A::Event>>, AggregateError<A::Error>> {
        let file = match File::open(&self.log_path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(unexpected(e)),
        };

        file.lock_shared().map_err(unexpected)?;
        read_records::<A>(&file)
    }

    /// Rebuilds every aggregate in the log from a single read, keyed by id,
    /// with the sequence of its last event.
    pub fn replay_all(&self) -> Result<BTreeMap<String, (u64, A)>, AggregateError<A::Error>> {
        Ok(replay(self.load_all()?))
    }

    /// Audit records of one aggregate, oldest first.
    pub fn audit_trail(&self, aggregate_id: &str) -> Result<Vec<AuditRecord>, AggregateError<A::Error>> {
        let entity = A::aggregate_type();
        Ok(self
            .load_all()?
            .into_iter()
            .filter(|stored| stored.aggregate_id == aggregate_id)
            .map(|stored| {
                AuditRecord::new(
                    entity.clone(),
                    stored.aggregate_id,
                    stored.sequence,
                    stored.event_type,
                    stored.metadata,
                    stored.recorded_at,
                )
            })
            .collect())
    }

    /// Commits like [`EventStore::commit`], after running `invariant` over
    /// every aggregate of the log as read under the exclusive lock.
    ///
    /// Rules spanning several aggregates of this type (seat limits, unique
    /// reference codes) only hold when checked here. An `invariant` error is
    /// returned as `AggregateError::UserError` and nothing is written.
    pub fn commit_guarded(
        &self,
        events: Vec<A::Event>,
        context: FileAggregateContext<A>,
        metadata: HashMap<String, String>,
        invariant: impl FnOnce(&BTreeMap<String, (u64, A)>) -> Result<(), A::Error>,
    ) -> Result<Vec<EventEnvelope<A>>, AggregateError<A::Error>> {
        if events.is_empty() {
            return Ok(Vec::new());
        }

        if let Some(parent) = self.log_path.parent() {
            std::fs::create_dir_all(parent).map_err(unexpected)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.log_path)
            .map_err(unexpected)?;

        // Exclusive lock: the sequence check and the append are one step
        file.lock_exclusive().map_err(unexpected)?;

        let FileAggregateContext {
            aggregate_id,
            mut aggregate,
            current_sequence,
        } = context;

        // Someone else committed since this aggregate was loaded
        let records = read_records::<A>(&file)?;
        if last_sequence(&records, &aggregate_id) != current_sequence {
            return Err(AggregateError::AggregateConflict);
        }
        invariant(&replay(records)).map_err(AggregateError::UserError)?;

        let recorded_at = TimestampUtc::now();
        let mut sequence = current_sequence;
        let mut envelopes: Vec<EventEnvelope<A>> = Vec::new();
        let mut buffer = String::new();

        for event in events {
            sequence += 1;

            let record = StoredEvent {
                aggregate_id: aggregate_id.clone(),
                sequence,
                recorded_at,
                event_type: event.event_type(),
                event_version: event.event_version(),
                event: event.clone(),
                metadata: metadata.clone(),
            };

            let line = serde_json::to_string(&record).map_err(unexpected)?;
            buffer.push_str(&line);
            buffer.push('\n');

            envelopes.push(EventEnvelope {
                aggregate_id: aggregate_id.clone(),
                sequence: sequence as usize,
                payload: event,
                metadata: metadata.clone(),
            });
        }

        // All events of one command land in a single write
        file.write_all(buffer.as_bytes()).map_err(unexpected)?;
        file.flush().map_err(unexpected)?;
        file.sync_all().map_err(unexpected)?;

        // Snapshot when the commit crosses a multiple of snapshot_every
        if should_snapshot(current_sequence, sequence, self.snapshot_every) {
            for envelope in &envelopes {
                aggregate.apply(envelope.payload.clone());
            }
            let snapshot = StoredSnapshot {
                aggregate_id: aggregate_id.clone(),
                sequence,
                snapshot_at: TimestampUtc::now(),
                state: aggregate,
            };
            save_snapshot::<A>(&self.snapshot_path(&aggregate_id), &snapshot)?;
        }

        tracing::debug!(
            aggregate_type = %A::aggregate_type(),
            aggregate_id = %aggregate_id,
            sequence,
            "committed events"
        );

        Ok(envelopes)
    }
}

#[async_trait]
impl<A: Aggregate> EventStore<A> for FileEventStore<A> {
    type AC = FileAggregateContext<A>;

    async fn load_events(
        &self,
        aggregate_id: &str,
    ) -> Result<Vec<EventEnvelope<A>>, AggregateError<A::Error>> {
        Ok(self
            .load_all()?
            .into_iter()
            .filter(|stored| stored.aggregate_id == aggregate_id)
            .map(|stored| EventEnvelope {
                aggregate_id: stored.aggregate_id,
                sequence: stored.sequence as usize,
                payload: stored.event,
                metadata: stored.metadata,
            })
            .collect())
    }

    async fn load_aggregate(&self, aggregate_id: &str) -> Result<Self::AC, AggregateError<A::Error>> {
        let mut aggregate = A::default();
        let mut current_sequence = 0u64;

        // Snapshot first, if any
        if let Some(snapshot) = load_snapshot::<A>(&self.snapshot_path(aggregate_id))? {
            if snapshot.aggregate_id == aggregate_id {
                aggregate = snapshot.state;
                current_sequence = snapshot.sequence;
            }
        }

        // Replay what came after the snapshot
        let events = self.load_events(aggregate_id).await?;
        for event in events {
            let seq = event.sequence as u64;
            if seq > current_sequence {
                current_sequence = seq;
                aggregate.apply(event.payload);
            }
        }

        Ok(FileAggregateContext {
            aggregate_id: aggregate_id.to_string(),
            aggregate,
            current_sequence,
        })
    }

    async fn commit(
        &self,
        events: Vec<A::Event>,
        context: Self::AC,
        metadata: HashMap<String, String>,
    ) -> Result<Vec<EventEnvelope<A>>, AggregateError<A::Error>> {
        self.commit_guarded(events, context, metadata, |_| Ok(()))
    }
}

/// Parse every line of the log, checking the recorded type and version.
fn read_records<A: Aggregate>(
    file: &File,
) -> Result<Vec<StoredEvent<A::Event>>, AggregateError<A::Error>> {
    let mut reader = BufReader::new(file.try_clone().map_err(unexpected)?);
    reader.seek(SeekFrom::Start(0)).map_err(unexpected)?;

    let mut records = Vec::new();
    for line in reader.lines() {
        let line = line.map_err(unexpected)?;
        if line.trim().is_empty() {
            continue;
        }
        let stored: StoredEvent<A::Event> = serde_json::from_str(&line)
            .map_err(|e| AggregateError::DeserializationError(Box::new(e)))?;

        // Refuse lines written by another aggregate or event version
        if stored.event_type != stored.event.event_type()
            || stored.event_version != stored.event.event_version()
        {
            return Err(unexpected(std::io::Error::new(
                ErrorKind::InvalidData,
                "event version/type mismatch",
            )));
        }
        records.push(stored);
    }
    Ok(records)
}

fn load_snapshot<A: Aggregate>(
    path: &Path,
) -> Result<Option<StoredSnapshot<A>>, AggregateError<A::Error>> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(unexpected(e)),
    };

    let snapshot: StoredSnapshot<A> = serde_json::from_str(&content)
        .map_err(|e| AggregateError::DeserializationError(Box::new(e)))?;

    Ok(Some(snapshot))
}

fn save_snapshot<A: Aggregate>(
    path: &Path,
    snapshot: &StoredSnapshot<A>,
) -> Result<(), AggregateError<A::Error>> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(unexpected)?;
    }

    let content = serde_json::to_string(snapshot).map_err(unexpected)?;

    // Readers see either the old or the new snapshot, never a partial one
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, content).map_err(unexpected)?;
    std::fs::rename(&tmp_path, path).map_err(unexpected)?;

    Ok(())
}

/// Highest sequence recorded for `aggregate_id`, 0 when it has none.
fn last_sequence<E>(records: &[StoredEvent<E>], aggregate_id: &str) -> u64 {
    records
        .iter()
        .rev()
        .find(|stored| stored.aggregate_id == aggregate_id)
        .map(|stored| stored.sequence)
        .unwrap_or(0)
}

/// Folds log records into one aggregate per id, with its last sequence.
fn replay<A: Aggregate>(records: Vec<StoredEvent<A::Event>>) -> BTreeMap<String, (u64, A)> {
    let mut aggregates: BTreeMap<String, (u64, A)> = BTreeMap::new();
    for stored in records {
        let entry = aggregates.entry(stored.aggregate_id).or_default();
        entry.0 = stored.sequence;
        entry.1.apply(stored.event);
    }
    aggregates
}

/// True when a commit moving from `before` to `after` crosses a multiple of
/// the snapshot threshold.
fn should_snapshot(before: u64, after: u64, snapshot_every: u64) -> bool {
    if snapshot_every == 0 {
        return false;
    }
    after / snapshot_every > before / snapshot_every
}

#[cfg(test)]
#[path = "tests/file_store_tests.rs"]
mod tests;
