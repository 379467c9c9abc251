use anyhow::{bail, Context, Result};
use arena::Arena;
use batch::WriteBatch;
use bytes::Bytes;
use config::Config;
use memtable::{Lookup, LookupKey, MemTable, SequenceNumber, ValueType, MAX_SEQUENCE_NUMBER};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use tracing::{debug, info, warn};
use wal::{LogReader, LogWriter, WritableFile};

/// Outcome of replaying a log into a memtable.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplayStats {
    pub batches: usize,
    pub last_sequence: SequenceNumber,
    pub corrupt_records: usize,
    pub dropped_bytes: u64,
    /// Length of the intact prefix of the log.
    pub valid_len: u64,
    /// Damaged bytes cut from the end of the log before reopening it.
    pub truncated_bytes: u64,
}

/// Replays every batch in the log at `path` into `mem`.
///
/// A missing log is an empty log. Damaged physical records are skipped;
/// a record that passes its checksum but does not decode as a batch is a
/// hard error.
pub fn replay_log(path: &Path, mem: &MemTable) -> Result<ReplayStats> {
    let mut reader = match LogReader::open(path) {
        Ok(r) => r,
        Err(wal::WalError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
            return Ok(ReplayStats::default());
        }
        Err(e) => return Err(e).with_context(|| format!("opening {}", path.display())),
    };

    let mut stats = ReplayStats::default();
    loop {
        let record = match reader.read_record() {
            Ok(Some(r)) => r,
            Ok(None) => break,
            Err(e) if e.is_corruption() => {
                warn!(error = %e, "skipping damaged log block");
                stats.corrupt_records += 1;
                continue;
            }
            Err(e) => return Err(e).context("reading log"),
        };

        let batch = WriteBatch::from_contents(record).context("decoding logged batch")?;
        batch.insert_into(mem).context("replaying logged batch")?;
        if batch.count() > 0 {
            let last = batch.sequence() + batch.count() as u64 - 1;
            stats.last_sequence = stats.last_sequence.max(last);
        }
        stats.batches += 1;
    }
    stats.dropped_bytes = reader.dropped_bytes();
    stats.valid_len = reader.last_record_end();
    debug!(?stats, "log replayed");
    Ok(stats)
}

/// Cuts the log at `path` back to `valid_len` bytes, returning how many
/// bytes were removed.
///
/// Appending behind a torn or damaged tail would put new records in a
/// block the reader abandons, so the tail goes before the log is reopened.
fn truncate_damaged_tail(path: &Path, valid_len: u64) -> Result<u64> {
    let len = match std::fs::metadata(path) {
        Ok(m) => m.len(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e).with_context(|| format!("inspecting {}", path.display())),
    };
    if len <= valid_len {
        return Ok(0);
    }

    let file = OpenOptions::new()
        .write(true)
        .open(path)
        .with_context(|| format!("opening {} to cut damaged tail", path.display()))?;
    file.set_len(valid_len)
        .with_context(|| format!("truncating {}", path.display()))?;
    file.sync_all()?;

    let removed = len - valid_len;
    warn!(path = %path.display(), valid_len, removed, "cut damaged log tail");
    Ok(removed)
}

/// A memtable fronted by a write-ahead log.
///
/// Every batch is appended to the log before it touches the memtable, so
/// whatever [`Store::open`] replays is a superset of what was acknowledged.
/// After a failed append the store refuses further writes: the failed
/// record may still be on disk and would otherwise share sequence numbers
/// with the next batch.
pub struct Store<F: WritableFile = File> {
    mem: MemTable,
    log: LogWriter<F>,
    last_sequence: SequenceNumber,
    replay: ReplayStats,
    log_error: Option<String>,
}

impl Store<File> {
    /// Replays the configured log into a fresh memtable, cuts any damaged
    /// tail, then opens the log for appending.
    pub fn open(cfg: &Config) -> Result<Self> {
        let mem = MemTable::with_arena(Arena::with_block_size(cfg.arena_block_size));
        let mut replay = replay_log(&cfg.wal_path, &mem)?;
        replay.truncated_bytes = truncate_damaged_tail(&cfg.wal_path, replay.valid_len)?;
        let log = LogWriter::create(&cfg.wal_path, cfg.wal_sync)
            .with_context(|| format!("opening {} for append", cfg.wal_path.display()))?;

        info!(
            wal = %cfg.wal_path.display(),
            batches = replay.batches,
            last_sequence = replay.last_sequence,
            "store opened"
        );

        let mut store = Self::with_log(mem, log, replay.last_sequence);
        store.replay = replay;
        Ok(store)
    }
}

impl<F: WritableFile> Store<F> {
    /// Wraps an already recovered memtable and a log positioned for
    /// appending.
    pub fn with_log(mem: MemTable, log: LogWriter<F>, last_sequence: SequenceNumber) -> Self {
        Self {
            mem,
            log,
            last_sequence,
            replay: ReplayStats::default(),
            log_error: None,
        }
    }

    /// Stamps `batch` with the next sequence numbers, logs it and applies
    /// it. An empty batch is a no-op.
    pub fn write(&mut self, batch: &mut WriteBatch) -> Result<()> {
        if let Some(e) = &self.log_error {
            bail!("writes disabled after log failure: {}", e);
        }
        if batch.is_empty() {
            return Ok(());
        }
        let count = batch.count() as u64;
        if count > MAX_SEQUENCE_NUMBER - self.last_sequence {
            bail!("sequence numbers exhausted at {}", self.last_sequence);
        }

        batch.set_sequence(self.last_sequence + 1);
        if let Err(e) = self.log.add_record(batch.contents()) {
            warn!(error = %e, "log append failed; rejecting further writes");
            self.log_error = Some(e.to_string());
            return Err(e).context("appending batch to log");
        }
        batch.insert_into(&self.mem).context("applying batch")?;
        self.last_sequence += count;
        Ok(())
    }

    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let mut b = WriteBatch::new();
        b.put(key, value);
        self.write(&mut b)
    }

    pub fn delete(&mut self, key: &[u8]) -> Result<()> {
        let mut b = WriteBatch::new();
        b.delete(key);
        self.write(&mut b)
    }

    /// Latest value of `key`, if it is live.
    pub fn get(&self, key: &[u8]) -> Option<Bytes> {
        match self.mem.get(&LookupKey::new(key, self.last_sequence)) {
            Lookup::Found(v) => Some(v),
            Lookup::Deleted | Lookup::NotFound => None,
        }
    }

    /// Every live key with its latest value, in key order.
    pub fn scan(&self) -> Vec<(Vec<u8>, Vec<u8>)> {
        let mut out = Vec::new();
        let mut prev: Option<Vec<u8>> = None;
        let mut it = self.mem.iter();
        it.seek_to_first();
        while let (Some(key), Some(value), Some(t)) = (it.key(), it.value(), it.value_type()) {
            // Versions of one key are adjacent, newest first.
            if prev.as_deref() != Some(key) {
                prev = Some(key.to_vec());
                if t == ValueType::Value {
                    out.push((key.to_vec(), value.to_vec()));
                }
            }
            it.next();
        }
        out
    }

    pub fn last_sequence(&self) -> SequenceNumber {
        self.last_sequence
    }

    pub fn replay_stats(&self) -> ReplayStats {
        self.replay
    }

    /// The log failure that disabled writes, if any.
    pub fn log_error(&self) -> Option<&str> {
        self.log_error.as_deref()
    }
}

impl<F: WritableFile> fmt::Debug for Store<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("last_sequence", &self.last_sequence)
            .field("entries", &self.mem.len())
            .field("memory_usage", &self.mem.approximate_memory_usage())
            .field("block_offset", &self.log.block_offset())
            .field("replay", &self.replay)
            .field("log_error", &self.log_error)
            .finish()
    }
}
