//! # Write-Ahead Journal
//!
//! Every table mutation is appended here before it is applied in memory.
//! On restart the journal is replayed on top of the last snapshot:
//! - Committed transactions: replayed
//! - Operations written outside a transaction: replayed (autocommit)
//! - Uncommitted or rolled back transactions: discarded
//!
//! ## Format
//!
//! ```text
//! [4 bytes: magic "SJNL"]
//! [4 bytes: version]
//! [8 bytes: LSN at last checkpoint]
//!
//! Entry format:
//! [8 bytes: LSN (Log Sequence Number)]
//! [1 byte: record type (BEGIN/OP/COMMIT/ROLLBACK)]
//! [4 bytes: payload length]
//! [N bytes: payload (JSON journal operation)]
//! [4 bytes: CRC32 of above]
//! ```
//!
//! A torn record at the tail (crash mid-write) ends recovery; the file is
//! truncated back to the last intact record before new records are appended.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::error::{PersistenceError, PersistenceResult};

/// Magic bytes identifying a journal file.
const WAL_MAGIC: &[u8; 4] = b"SJNL";

/// Current journal format version.
const WAL_VERSION: u32 = 1;

/// Header length in bytes.
const HEADER_LEN: u64 = 16;

/// Journal record types.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordType {
    /// Begin a new transaction.
    Begin = 1,
    /// An operation, inside a transaction or autocommitted.
    Operation = 2,
    /// Commit the open transaction (durable).
    Commit = 3,
    /// Discard the open transaction.
    Rollback = 4,
}

impl RecordType {
    /// Converts from u8.
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Begin),
            2 => Some(Self::Operation),
            3 => Some(Self::Commit),
            4 => Some(Self::Rollback),
            _ => None,
        }
    }
}

/// A journal record on disk.
#[derive(Clone, Debug)]
pub struct WalRecord {
    /// Log Sequence Number (unique, monotonic).
    pub lsn: u64,
    /// Record type.
    pub record_type: RecordType,
    /// Payload data.
    pub payload: Vec<u8>,
}

/// Outcome of replaying a journal.
#[derive(Debug, Default)]
pub struct Recovery {
    /// Payloads of committed operations in journal order.
    pub committed: Vec<Vec<u8>>,
    /// Transactions that never committed.
    pub discarded_transactions: usize,
}

/// Write-ahead journal for crash-safe table mutations.
pub struct WriteAheadLog {
    /// Path to the journal file.
    path: PathBuf,
    /// Next Log Sequence Number.
    current_lsn: AtomicU64,
    /// File handle (protected by mutex for writes).
    file: Mutex<BufWriter<File>>,
    /// LSN of the open transaction's BEGIN record.
    open_txn: Mutex<Option<u64>>,
}

impl WriteAheadLog {
    /// Opens or creates a journal file and replays it.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors or when the header is not a journal header.
    pub fn open(path: impl AsRef<Path>) -> PersistenceResult<(Self, Recovery)> {
        let path = path.as_ref().to_path_buf();

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)?;

        if file.metadata()?.len() == 0 {
            let mut writer = BufWriter::new(&file);
            Self::write_header(&mut writer, 0)?;
            writer.flush()?;
        }

        let (recovery, max_lsn, valid_len) = Self::recover(&path)?;

        // Drop a torn tail and append after the last intact record.
        file.set_len(valid_len)?;
        let mut writer = BufWriter::new(file);
        writer.seek(SeekFrom::End(0))?;

        if recovery.discarded_transactions > 0 {
            tracing::warn!(
                "journal recovery: {} uncommitted transactions discarded",
                recovery.discarded_transactions
            );
        }

        let wal = Self {
            path,
            current_lsn: AtomicU64::new(max_lsn + 1),
            file: Mutex::new(writer),
            open_txn: Mutex::new(None),
        };
        Ok((wal, recovery))
    }

    /// Path of the journal file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true while a transaction is open.
    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.open_txn.lock().is_some()
    }

    /// Begins a new transaction.
    ///
    /// # Errors
    ///
    /// Fails if a transaction is already open or the write fails.
    pub fn begin(&self) -> PersistenceResult<u64> {
        let mut open = self.open_txn.lock();
        if open.is_some() {
            return Err(PersistenceError::Transaction("transaction already open"));
        }
        let lsn = self.write_record(RecordType::Begin, &[])?;
        *open = Some(lsn);
        Ok(lsn)
    }

    /// Appends an operation.
    ///
    /// Outside a transaction the operation is autocommitted and synced.
    ///
    /// # Errors
    ///
    /// Fails if the write or sync fails.
    pub fn append(&self, payload: &[u8]) -> PersistenceResult<u64> {
        let lsn = self.write_record(RecordType::Operation, payload)?;
        if !self.in_transaction() {
            self.sync()?;
        }
        Ok(lsn)
    }

    /// Commits the open transaction (durable).
    ///
    /// After this returns, the data is guaranteed to be on disk.
    ///
    /// # Errors
    ///
    /// Fails if no transaction is open or the write fails.
    pub fn commit(&self) -> PersistenceResult<()> {
        let mut open = self.open_txn.lock();
        if open.is_none() {
            return Err(PersistenceError::Transaction("commit without begin"));
        }
        let result = self
            .write_record(RecordType::Commit, &[])
            .and_then(|_| self.sync());
        *open = None;
        result
    }

    /// Rolls back the open transaction.
    ///
    /// # Errors
    ///
    /// Fails if no transaction is open or the write fails.
    pub fn rollback(&self) -> PersistenceResult<()> {
        let mut open = self.open_txn.lock();
        if open.is_none() {
            return Err(PersistenceError::Transaction("rollback without begin"));
        }
        *open = None;
        self.write_record(RecordType::Rollback, &[])?;
        Ok(())
    }

    /// Writes a record to the journal.
    #[allow(clippy::cast_possible_truncation)]
    fn write_record(&self, record_type: RecordType, payload: &[u8]) -> PersistenceResult<u64> {
        let lsn = self.current_lsn.fetch_add(1, Ordering::SeqCst);
        let len = payload.len() as u32;

        let mut crc_data = Vec::with_capacity(8 + 1 + 4 + payload.len());
        crc_data.extend_from_slice(&lsn.to_le_bytes());
        crc_data.push(record_type as u8);
        crc_data.extend_from_slice(&len.to_le_bytes());
        crc_data.extend_from_slice(payload);
        let crc = crc32fast::hash(&crc_data);

        let mut file = self.file.lock();
        file.write_all(&crc_data)?;
        file.write_all(&crc.to_le_bytes())?;

        Ok(lsn)
    }

    /// Syncs the journal to disk.
    fn sync(&self) -> PersistenceResult<()> {
        let mut file = self.file.lock();
        file.flush()?;
        file.get_ref().sync_all()?;
        Ok(())
    }

    fn write_header(writer: &mut impl Write, lsn: u64) -> PersistenceResult<()> {
        writer.write_all(WAL_MAGIC)?;
        writer.write_all(&WAL_VERSION.to_le_bytes())?;
        writer.write_all(&lsn.to_le_bytes())?;
        Ok(())
    }

    /// Replays the journal file.
    ///
    /// Returns committed payloads, the highest LSN seen and the byte length
    /// of the intact prefix.
    fn recover(path: &Path) -> PersistenceResult<(Recovery, u64, u64)> {
        let mut recovery = Recovery::default();
        let mut reader = BufReader::new(File::open(path)?);

        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if &magic != WAL_MAGIC {
            return Err(PersistenceError::Corrupted("invalid journal magic".to_string()));
        }

        let mut version_bytes = [0u8; 4];
        reader.read_exact(&mut version_bytes)?;
        let version = u32::from_le_bytes(version_bytes);
        if version != WAL_VERSION {
            return Err(PersistenceError::Corrupted(format!(
                "unsupported journal version: {version}"
            )));
        }

        let mut lsn_bytes = [0u8; 8];
        reader.read_exact(&mut lsn_bytes)?;
        let checkpoint_lsn = u64::from_le_bytes(lsn_bytes);

        let mut open_txn: Option<Vec<Vec<u8>>> = None;
        let mut max_lsn = checkpoint_lsn;
        let mut valid_len = HEADER_LEN;

        // End of file or a torn record both end the replay.
        while let Ok(record) = Self::read_record(&mut reader) {
            max_lsn = max_lsn.max(record.lsn);
            valid_len += 8 + 1 + 4 + record.payload.len() as u64 + 4;

            match record.record_type {
                RecordType::Begin => {
                    if open_txn.replace(Vec::new()).is_some() {
                        recovery.discarded_transactions += 1;
                    }
                }
                RecordType::Operation => match open_txn.as_mut() {
                    Some(ops) => ops.push(record.payload),
                    None => recovery.committed.push(record.payload),
                },
                RecordType::Commit => {
                    if let Some(ops) = open_txn.take() {
                        recovery.committed.extend(ops);
                    }
                }
                RecordType::Rollback => {
                    open_txn = None;
                }
            }
        }

        if open_txn.is_some() {
            recovery.discarded_transactions += 1;
        }

        Ok((recovery, max_lsn, valid_len))
    }

    /// Reads a single record from the journal.
    fn read_record(reader: &mut impl Read) -> PersistenceResult<WalRecord> {
        let mut lsn_bytes = [0u8; 8];
        reader.read_exact(&mut lsn_bytes)?;
        let lsn = u64::from_le_bytes(lsn_bytes);

        let mut type_byte = [0u8; 1];
        reader.read_exact(&mut type_byte)?;
        let record_type = RecordType::from_u8(type_byte[0])
            .ok_or_else(|| PersistenceError::Corrupted("invalid record type".to_string()))?;

        let mut len_bytes = [0u8; 4];
        reader.read_exact(&mut len_bytes)?;
        let payload_len = u32::from_le_bytes(len_bytes) as usize;

        let mut payload = vec![0u8; payload_len];
        reader.read_exact(&mut payload)?;

        let mut crc_bytes = [0u8; 4];
        reader.read_exact(&mut crc_bytes)?;
        let stored_crc = u32::from_le_bytes(crc_bytes);

        let mut crc_data = Vec::with_capacity(8 + 1 + 4 + payload_len);
        crc_data.extend_from_slice(&lsn_bytes);
        crc_data.push(type_byte[0]);
        crc_data.extend_from_slice(&len_bytes);
        crc_data.extend_from_slice(&payload);

        if crc32fast::hash(&crc_data) != stored_crc {
            return Err(PersistenceError::Corrupted("CRC mismatch".to_string()));
        }

        Ok(WalRecord {
            lsn,
            record_type,
            payload,
        })
    }

    /// Truncates the journal after a checkpoint.
    ///
    /// Call this after the snapshot holding every committed record is on
    /// disk.
    ///
    /// # Errors
    ///
    /// Fails inside an open transaction or on I/O errors.
    pub fn checkpoint(&self) -> PersistenceResult<()> {
        if self.in_transaction() {
            return Err(PersistenceError::Transaction("checkpoint inside transaction"));
        }
        let mut file = self.file.lock();

        file.seek(SeekFrom::Start(0))?;
        let current_lsn = self.current_lsn.load(Ordering::SeqCst);
        Self::write_header(&mut *file, current_lsn)?;
        file.flush()?;

        file.get_ref().set_len(HEADER_LEN)?;
        file.seek(SeekFrom::Start(HEADER_LEN))?;
        file.get_ref().sync_all()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn temp_wal_path() -> PathBuf {
        let id = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("test_journal_{id}.wal"))
    }

    #[test]
    fn test_wal_create_and_open() {
        let path = temp_wal_path();
        {
            let (_wal, recovery) = WriteAheadLog::open(&path).unwrap();
            assert!(recovery.committed.is_empty());
        }
        assert!(path.exists());
        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_committed_transaction_is_replayed() {
        let path = temp_wal_path();
        {
            let (wal, _) = WriteAheadLog::open(&path).unwrap();
            wal.begin().unwrap();
            wal.append(b"one").unwrap();
            wal.append(b"two").unwrap();
            wal.commit().unwrap();
        }
        {
            let (_wal, recovery) = WriteAheadLog::open(&path).unwrap();
            assert_eq!(recovery.committed, vec![b"one".to_vec(), b"two".to_vec()]);
        }
        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_rolled_back_transaction_is_discarded() {
        let path = temp_wal_path();
        {
            let (wal, _) = WriteAheadLog::open(&path).unwrap();
            wal.append(b"auto").unwrap();
            wal.begin().unwrap();
            wal.append(b"lost").unwrap();
            wal.rollback().unwrap();
        }
        {
            let (_wal, recovery) = WriteAheadLog::open(&path).unwrap();
            assert_eq!(recovery.committed, vec![b"auto".to_vec()]);
        }
        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_incomplete_transaction_is_discarded() {
        let path = temp_wal_path();
        {
            let (wal, _) = WriteAheadLog::open(&path).unwrap();
            wal.begin().unwrap();
            wal.append(b"half").unwrap();
            // Dropped without commit, like a crash.
            wal.file.lock().flush().unwrap();
        }
        {
            let (wal, recovery) = WriteAheadLog::open(&path).unwrap();
            assert!(recovery.committed.is_empty());
            assert_eq!(recovery.discarded_transactions, 1);
            assert!(!wal.in_transaction());
        }
        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_torn_tail_is_truncated() {
        let path = temp_wal_path();
        {
            let (wal, _) = WriteAheadLog::open(&path).unwrap();
            wal.append(b"kept").unwrap();
        }
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&[9, 9, 9]).unwrap();
        }
        {
            let (wal, recovery) = WriteAheadLog::open(&path).unwrap();
            assert_eq!(recovery.committed, vec![b"kept".to_vec()]);
            wal.append(b"after").unwrap();
        }
        {
            let (_wal, recovery) = WriteAheadLog::open(&path).unwrap();
            assert_eq!(recovery.committed, vec![b"kept".to_vec(), b"after".to_vec()]);
        }
        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_checkpoint_truncates() {
        let path = temp_wal_path();
        {
            let (wal, _) = WriteAheadLog::open(&path).unwrap();
            wal.append(b"x").unwrap();
            wal.checkpoint().unwrap();
            wal.append(b"y").unwrap();
        }
        {
            let (_wal, recovery) = WriteAheadLog::open(&path).unwrap();
            assert_eq!(recovery.committed, vec![b"y".to_vec()]);
        }
        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_nested_begin_rejected() {
        let path = temp_wal_path();
        {
            let (wal, _) = WriteAheadLog::open(&path).unwrap();
            wal.begin().unwrap();
            assert!(wal.begin().is_err());
            wal.rollback().unwrap();
            assert!(wal.commit().is_err());
        }
        fs::remove_file(&path).ok();
    }
}
