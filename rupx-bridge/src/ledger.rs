//! Per-address transfer history.
//!
//! The ledger is a convenience log, never the source of truth for whether a
//! transfer happened: a failed write after an on-chain success is reported
//! but does not change the transfer's outcome.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use ethers::types::Address;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{BridgeError, BridgeResult};
use crate::types::{checksummed, TransferRecord};

/// Name of the file an export of `address`'s history is offered as.
pub fn export_file_name(address: &Address) -> String {
    let short: String = checksummed(address).chars().take(6).collect();
    format!("rupaya_bridge_transactions_{short}.json")
}

/// Append-only, address-partitioned history of terminal transfer outcomes.
#[async_trait]
pub trait TransferLedger: Send + Sync {
    /// Persist `record` after every record already stored for `address`.
    async fn append(&self, address: Address, record: TransferRecord) -> BridgeResult<()>;

    /// Records of `address` in append order (most recent last).
    async fn list(&self, address: Address) -> BridgeResult<Vec<TransferRecord>>;

    /// Remove every record of `address`. Other partitions are untouched.
    async fn clear(&self, address: Address) -> BridgeResult<()>;

    /// Pretty-printed JSON array of [`TransferLedger::list`].
    async fn export(&self, address: Address) -> BridgeResult<Vec<u8>> {
        let records = self.list(address).await?;
        Ok(serde_json::to_vec_pretty(&records)?)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// FILE LEDGER
// ═══════════════════════════════════════════════════════════════════════════════

/// One JSON file per address under a directory.
///
/// Read-modify-write of a partition is serialised within the process, and
/// every write replaces the file atomically (temp file + rename). Across
/// processes the last writer wins.
pub struct FileLedger {
    dir: PathBuf,
    partitions: Mutex<HashMap<Address, Arc<Mutex<()>>>>,
}

impl FileLedger {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            partitions: Mutex::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding the history of `address`.
    pub fn partition_path(&self, address: &Address) -> PathBuf {
        self.dir.join(format!("bridge_transactions_{address:#x}.json"))
    }

    async fn partition_lock(&self, address: Address) -> Arc<Mutex<()>> {
        self.partitions
            .lock()
            .await
            .entry(address)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn read_partition(&self, path: &Path) -> BridgeResult<Vec<TransferRecord>> {
        match tokio::fs::read(path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(Vec::new()),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                BridgeError::Storage(format!("corrupt history file {}: {e}", path.display()))
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_partition(&self, path: &Path, records: &[TransferRecord]) -> BridgeResult<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let bytes = serde_json::to_vec_pretty(records)?;

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

#[async_trait]
impl TransferLedger for FileLedger {
    async fn append(&self, address: Address, record: TransferRecord) -> BridgeResult<()> {
        let lock = self.partition_lock(address).await;
        let _guard = lock.lock().await;

        let path = self.partition_path(&address);
        let mut records = self.read_partition(&path).await?;
        records.push(record);
        self.write_partition(&path, &records).await?;
        debug!("Appended history record #{} for {:#x}", records.len(), address);
        Ok(())
    }

    async fn list(&self, address: Address) -> BridgeResult<Vec<TransferRecord>> {
        let lock = self.partition_lock(address).await;
        let _guard = lock.lock().await;
        self.read_partition(&self.partition_path(&address)).await
    }

    async fn clear(&self, address: Address) -> BridgeResult<()> {
        let lock = self.partition_lock(address).await;
        let _guard = lock.lock().await;

        match tokio::fs::remove_file(self.partition_path(&address)).await {
            Ok(()) => {
                info!("Cleared history of {:#x}", address);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// MEMORY LEDGER
// ═══════════════════════════════════════════════════════════════════════════════

/// In-process ledger, for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryLedger {
    partitions: Mutex<HashMap<Address, Vec<TransferRecord>>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TransferLedger for MemoryLedger {
    async fn append(&self, address: Address, record: TransferRecord) -> BridgeResult<()> {
        self.partitions.lock().await.entry(address).or_default().push(record);
        Ok(())
    }

    async fn list(&self, address: Address) -> BridgeResult<Vec<TransferRecord>> {
        Ok(self
            .partitions
            .lock()
            .await
            .get(&address)
            .cloned()
            .unwrap_or_default())
    }

    async fn clear(&self, address: Address) -> BridgeResult<()> {
        self.partitions.lock().await.remove(&address);
        Ok(())
    }
}
