//! Audit ledger - append-only JSONL storage
//!
//! Each line is one sealed `AuditLogEntry`. Reopening an existing file resumes
//! the sequence and hash chain from its last line.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use trustdesk_core::{TrustError, TrustResult};

use crate::chain::{self, GENESIS};
use crate::entry::AuditLogEntry;
use crate::sink::{AuditQuery, AuditSink};

struct Tail {
    file: File,
    last_sequence: u64,
    last_hash: String,
}

/// Append-only JSONL audit ledger
pub struct JsonlAuditLog {
    path: PathBuf,
    tail: Mutex<Tail>,
}

impl JsonlAuditLog {
    /// Open (or create) the ledger at `path`
    pub fn open(path: impl AsRef<Path>) -> TrustResult<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(TrustError::storage)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(TrustError::storage)?;

        let existing = read_entries(&path)?;
        let (last_sequence, last_hash) = existing
            .last()
            .map(|e| (e.sequence, e.hash.clone()))
            .unwrap_or((0, GENESIS.to_string()));

        Ok(Self {
            path,
            tail: Mutex::new(Tail {
                file,
                last_sequence,
                last_hash,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current line count (for checkpointing)
    pub fn line_count(&self) -> TrustResult<usize> {
        Ok(read_entries(&self.path)?.len())
    }
}

impl AuditSink for JsonlAuditLog {
    fn append(&self, entry: AuditLogEntry) -> TrustResult<AuditLogEntry> {
        let mut tail = self
            .tail
            .lock()
            .map_err(|_| TrustError::storage("audit ledger lock poisoned"))?;

        let sealed = chain::seal(entry, tail.last_sequence + 1, &tail.last_hash);
        let json = serde_json::to_string(&sealed).map_err(TrustError::storage)?;
        writeln!(tail.file, "{}", json).map_err(TrustError::storage)?;
        tail.file.flush().map_err(TrustError::storage)?;

        tail.last_sequence = sealed.sequence;
        tail.last_hash = sealed.hash.clone();
        Ok(sealed)
    }

    fn query(&self, query: &AuditQuery) -> TrustResult<Vec<AuditLogEntry>> {
        let entries = read_entries(&self.path)?;
        Ok(query.apply(entries.iter()))
    }

    fn read_all(&self) -> TrustResult<Vec<AuditLogEntry>> {
        read_entries(&self.path)
    }
}

fn read_entries(path: &Path) -> TrustResult<Vec<AuditLogEntry>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(TrustError::storage(e)),
    };

    let mut entries = Vec::new();
    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(TrustError::storage)?;
        if line.trim().is_empty() {
            continue;
        }
        let entry: AuditLogEntry = serde_json::from_str(&line).map_err(|e| {
            TrustError::storage(format!("corrupt audit line {}: {}", line_no + 1, e))
        })?;
        entries.push(entry);
    }
    Ok(entries)
}
