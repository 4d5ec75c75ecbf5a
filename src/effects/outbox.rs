//! Durable queue of side effects whose dispatch failed.
//!
//! Entries live in `outbox.jsonl`; entries that exhaust `max_attempts` move
//! to `dead_letters.jsonl` so nothing is dropped silently.

use super::{append_jsonl, CollaboratorError, SideEffect};
use crate::domain::types::TimestampUtc;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEntry {
    pub id: Uuid,
    pub effect: SideEffect,
    pub attempts: u32,
    pub last_error: String,
    pub enqueued_at: TimestampUtc,
    pub last_attempt_at: TimestampUtc,
}

#[derive(Debug, Clone)]
pub struct Outbox {
    path: PathBuf,
    dead_letter_path: PathBuf,
    max_attempts: u32,
}

/// Pending entries read under an exclusive lock, held until
/// [`Outbox::settle`] rewrites the file.
pub struct OutboxBatch {
    file: File,
    entries: Vec<OutboxEntry>,
}

impl OutboxBatch {
    pub fn take_entries(&mut self) -> Vec<OutboxEntry> {
        std::mem::take(&mut self.entries)
    }
}

impl Outbox {
    /// Outbox files under `dir`. `max_attempts` counts the first failed
    /// dispatch.
    pub fn new(dir: &Path, max_attempts: u32) -> Self {
        Self {
            path: dir.join("outbox.jsonl"),
            dead_letter_path: dir.join("dead_letters.jsonl"),
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dead_letter_path(&self) -> &Path {
        &self.dead_letter_path
    }

    /// Parks `effect` after its first failed attempt.
    pub fn enqueue(&self, effect: SideEffect, error: &str) -> Result<(), CollaboratorError> {
        let now = TimestampUtc::now();
        let entry = OutboxEntry {
            id: Uuid::new_v4(),
            effect,
            attempts: 1,
            last_error: error.to_string(),
            enqueued_at: now,
            last_attempt_at: now,
        };
        if entry.attempts >= self.max_attempts {
            return append_jsonl(&self.dead_letter_path, &entry);
        }
        append_jsonl(&self.path, &entry)
    }

    /// Entries still waiting for delivery.
    pub fn pending(&self) -> Result<Vec<OutboxEntry>, CollaboratorError> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        file.lock_shared()?;
        read_entries(&file)
    }

    /// Entries that exhausted their attempts.
    pub fn dead_letters(&self) -> Result<Vec<OutboxEntry>, CollaboratorError> {
        match File::open(&self.dead_letter_path) {
            Ok(file) => {
                file.lock_shared()?;
                read_entries(&file)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Locks the outbox and reads every pending entry.
    pub fn lock_pending(&self) -> Result<OutboxBatch, CollaboratorError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&self.path)?;
        file.lock_exclusive()?;
        let entries = read_entries(&file)?;
        Ok(OutboxBatch { file, entries })
    }

    /// Rewrites the outbox with the entries that failed again, moving the
    /// exhausted ones to the dead-letter file. Returns `(pending, dead)`.
    pub fn settle(
        &self,
        batch: OutboxBatch,
        failed: Vec<OutboxEntry>,
    ) -> Result<(usize, usize), CollaboratorError> {
        let (dead, retry): (Vec<_>, Vec<_>) = failed
            .into_iter()
            .partition(|entry| entry.attempts >= self.max_attempts);

        // Dead letters first: a crash before the rewrite duplicates, never drops.
        for entry in &dead {
            append_jsonl(&self.dead_letter_path, entry)?;
        }

        let mut content = String::new();
        for entry in &retry {
            content.push_str(&serde_json::to_string(entry)?);
            content.push('\n');
        }
        let mut file = batch.file;
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;

        Ok((retry.len(), dead.len()))
    }
}

fn read_entries(file: &File) -> Result<Vec<OutboxEntry>, CollaboratorError> {
    let mut reader = BufReader::new(file.try_clone()?);
    reader.seek(SeekFrom::Start(0))?;
    let mut entries = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        entries.push(serde_json::from_str(&line)?);
    }
    Ok(entries)
}
