//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `inventory` - Per-event capacity state (key: event_id)
//! - `bookings` - Booking ledger records (key: booking_id)
//! - `indices` - Secondary indices: idempotency token, event and requester
//!   lookups
//!
//! A reservation decision is committed with a single `WriteBatch` covering
//! the inventory snapshot, the booking record and all indices, so readers
//! never observe inventory updated without its ledger entry or vice versa.

use crate::{
    error::{Error, Result},
    inventory::EventInventory,
    types::{BookingRecord, EventId, RequesterId},
    Config,
};
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DBCompactionStyle, Options, WriteBatch, DB};
use std::sync::Arc;
use uuid::Uuid;

/// Column family names
const CF_INVENTORY: &str = "inventory";
const CF_BOOKINGS: &str = "bookings";
const CF_INDICES: &str = "indices";

/// Index key prefixes
const IDX_TOKEN: u8 = b't';
const IDX_EVENT: u8 = b'e';
const IDX_REQUESTER: u8 = b'r';

/// Storage wrapper for RocksDB
pub struct Storage {
    db: Arc<DB>,
    #[cfg(test)]
    fail_commits: std::sync::atomic::AtomicBool,
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        // Create directory if not exists
        std::fs::create_dir_all(path)?;

        // Database options
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        // Tuning from config
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_target_file_size_base(config.rocksdb.target_file_size_mb * 1024 * 1024);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        // Universal compaction for write-heavy workload
        db_opts.set_compaction_style(DBCompactionStyle::Universal);

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_INVENTORY, Self::cf_options_inventory()),
            ColumnFamilyDescriptor::new(CF_BOOKINGS, Self::cf_options_bookings()),
            ColumnFamilyDescriptor::new(CF_INDICES, Self::cf_options_indices()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(path = ?path, "Opened RocksDB for booking storage");

        Ok(Self {
            db: Arc::new(db),
            #[cfg(test)]
            fail_commits: std::sync::atomic::AtomicBool::new(false),
        })
    }

    // Column family options

    fn cf_options_inventory() -> Options {
        let mut opts = Options::default();
        // Inventory is frequently read, use LZ4 for speed
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_options_bookings() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts.set_bottommost_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_options_indices() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        // Indices benefit from bloom filters
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false); // 10 bits per key
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    // Inventory operations

    /// Put inventory snapshot (publish/archive; reservation commits go
    /// through [`Storage::commit_decision`])
    pub fn put_inventory(&self, inventory: &EventInventory) -> Result<()> {
        let cf = self.cf_handle(CF_INVENTORY)?;
        let value = bincode::serialize(inventory)?;
        self.db.put_cf(cf, inventory.event_id.as_str().as_bytes(), value)?;
        Ok(())
    }

    /// Get committed inventory snapshot
    pub fn get_inventory(&self, event_id: &EventId) -> Result<EventInventory> {
        let cf = self.cf_handle(CF_INVENTORY)?;
        let value = self
            .db
            .get_cf(cf, event_id.as_str().as_bytes())?
            .ok_or_else(|| Error::NotFound(format!("event {}", event_id)))?;
        Ok(bincode::deserialize(&value)?)
    }

    /// Whether an event has published inventory
    pub fn inventory_exists(&self, event_id: &EventId) -> Result<bool> {
        let cf = self.cf_handle(CF_INVENTORY)?;
        Ok(self.db.get_cf(cf, event_id.as_str().as_bytes())?.is_some())
    }

    // Booking operations

    /// Get booking record by ID
    pub fn get_booking(&self, booking_id: Uuid) -> Result<BookingRecord> {
        let cf = self.cf_handle(CF_BOOKINGS)?;
        let value = self
            .db
            .get_cf(cf, booking_id.as_bytes())?
            .ok_or_else(|| Error::NotFound(format!("booking {}", booking_id)))?;
        Ok(bincode::deserialize(&value)?)
    }

    /// Resolve an idempotency token to its booking ID, if one was committed
    pub fn booking_id_for_token(&self, token: &str) -> Result<Option<Uuid>> {
        let cf = self.cf_handle(CF_INDICES)?;
        let key = Self::index_key_token(token);
        match self.db.get_cf(cf, &key)? {
            Some(value) => {
                let bytes: [u8; 16] = value.as_slice().try_into().map_err(|_| {
                    Error::Storage(format!("corrupt token index for {}", token))
                })?;
                Ok(Some(Uuid::from_bytes(bytes)))
            }
            None => Ok(None),
        }
    }

    /// List bookings for an event, in booking-ID (time) order
    pub fn list_bookings_by_event(&self, event_id: &EventId) -> Result<Vec<BookingRecord>> {
        self.scan_booking_index(Self::index_prefix_event(event_id))
    }

    /// List bookings by requester, in booking-ID (time) order
    pub fn list_bookings_by_requester(
        &self,
        requester_id: &RequesterId,
    ) -> Result<Vec<BookingRecord>> {
        self.scan_booking_index(Self::index_prefix_requester(requester_id))
    }

    fn scan_booking_index(&self, prefix: Vec<u8>) -> Result<Vec<BookingRecord>> {
        let cf = self.cf_handle(CF_INDICES)?;
        let iter = self.db.prefix_iterator_cf(cf, &prefix);

        let mut bookings = Vec::new();
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            // Booking ID is the trailing 16 bytes of the index key
            if key.len() >= prefix.len() + 16 {
                let booking_id_bytes: [u8; 16] = key[key.len() - 16..]
                    .try_into()
                    .map_err(|_| Error::Storage("corrupt booking index key".to_string()))?;
                bookings.push(self.get_booking(Uuid::from_bytes(booking_id_bytes))?);
            }
        }
        Ok(bookings)
    }

    // Atomic decision commit

    /// Commit one reservation/release decision atomically.
    ///
    /// Writes the booking record, its indices and (for decisions that touch
    /// capacity) the new inventory snapshot in a single `WriteBatch`.
    /// Rejected decisions pass `None` for inventory: the audit entry is
    /// written, capacity is untouched.
    pub fn commit_decision(
        &self,
        inventory: Option<&EventInventory>,
        record: &BookingRecord,
    ) -> Result<()> {
        #[cfg(test)]
        if self.fail_commits.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(Error::Storage("injected commit failure".to_string()));
        }

        let mut batch = WriteBatch::default();

        // 1. Booking record
        let cf_bookings = self.cf_handle(CF_BOOKINGS)?;
        batch.put_cf(cf_bookings, record.booking_id.as_bytes(), bincode::serialize(record)?);

        // 2. Indices
        let cf_indices = self.cf_handle(CF_INDICES)?;
        batch.put_cf(
            cf_indices,
            Self::index_key_token(&record.idempotency_token),
            record.booking_id.as_bytes(),
        );
        batch.put_cf(
            cf_indices,
            Self::index_key_event(&record.event_id, record.booking_id),
            b"",
        );
        batch.put_cf(
            cf_indices,
            Self::index_key_requester(&record.requester_id, record.booking_id),
            b"",
        );

        // 3. Inventory snapshot
        if let Some(inventory) = inventory {
            let cf_inventory = self.cf_handle(CF_INVENTORY)?;
            batch.put_cf(
                cf_inventory,
                inventory.event_id.as_str().as_bytes(),
                bincode::serialize(inventory)?,
            );
        }

        self.db.write(batch)?;

        tracing::debug!(
            booking_id = %record.booking_id,
            event_id = %record.event_id,
            status = ?record.status,
            "Decision committed"
        );

        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn inject_commit_failures(&self, fail: bool) {
        self.fail_commits
            .store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    // Index key helpers
    //
    // Event and requester IDs are opaque variable-length bytes, so composite
    // keys length-prefix the ID: an ID that extends another can never share
    // its scan prefix.

    fn index_key_token(token: &str) -> Vec<u8> {
        let mut key = vec![IDX_TOKEN];
        key.extend_from_slice(token.as_bytes());
        key
    }

    fn scoped_prefix(tag: u8, id: &str) -> Vec<u8> {
        let id = id.as_bytes();
        let mut key = Vec::with_capacity(5 + id.len() + 16);
        key.push(tag);
        key.extend_from_slice(&(id.len() as u32).to_be_bytes());
        key.extend_from_slice(id);
        key
    }

    fn index_prefix_event(event_id: &EventId) -> Vec<u8> {
        Self::scoped_prefix(IDX_EVENT, event_id.as_str())
    }

    fn index_key_event(event_id: &EventId, booking_id: Uuid) -> Vec<u8> {
        let mut key = Self::index_prefix_event(event_id);
        key.extend_from_slice(booking_id.as_bytes());
        key
    }

    fn index_prefix_requester(requester_id: &RequesterId) -> Vec<u8> {
        Self::scoped_prefix(IDX_REQUESTER, requester_id.as_str())
    }

    fn index_key_requester(requester_id: &RequesterId, booking_id: Uuid) -> Vec<u8> {
        let mut key = Self::index_prefix_requester(requester_id);
        key.extend_from_slice(booking_id.as_bytes());
        key
    }

    // Statistics

    /// Get storage statistics (approximate counts)
    pub fn get_stats(&self) -> Result<StorageStats> {
        Ok(StorageStats {
            total_events: self.approximate_count(CF_INVENTORY)?,
            total_bookings: self.approximate_count(CF_BOOKINGS)?,
        })
    }

    fn approximate_count(&self, cf_name: &str) -> Result<u64> {
        let cf = self.cf_handle(cf_name)?;
        Ok(self
            .db
            .property_int_value_cf(cf, "rocksdb.estimate-num-keys")?
            .unwrap_or(0))
    }
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage").finish_non_exhaustive()
    }
}

/// Storage statistics
#[derive(Debug, Clone)]
pub struct StorageStats {
    /// Approximate number of events with inventory
    pub total_events: u64,
    /// Approximate number of ledger records
    pub total_bookings: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::CapacitySpec;
    use crate::types::{BookingRecord, ReservationWant, SeatId};
    use tempfile::TempDir;

    fn test_storage() -> (Storage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        (Storage::open(&config).unwrap(), temp_dir)
    }

    fn test_record(event: &str, requester: &str, token: &str) -> BookingRecord {
        BookingRecord::confirmed(
            EventId::new(event),
            RequesterId::new(requester),
            ReservationWant::Units(2),
            token,
        )
    }

    #[test]
    fn test_inventory_roundtrip() {
        let (storage, _temp) = test_storage();

        let inventory = EventInventory::new(
            EventId::new("E1"),
            CapacitySpec::Seated {
                seat_ids: vec![SeatId::new("1-1"), SeatId::new("1-2")],
            },
        )
        .unwrap();

        storage.put_inventory(&inventory).unwrap();

        let loaded = storage.get_inventory(&EventId::new("E1")).unwrap();
        assert_eq!(loaded.total(), 2);
        assert_eq!(loaded.remaining(), 2);
        assert!(!loaded.archived);

        let err = storage.get_inventory(&EventId::new("missing")).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_commit_decision_writes_record_and_indices() {
        let (storage, _temp) = test_storage();

        let inventory =
            EventInventory::new(EventId::new("E2"), CapacitySpec::Unseated { total: 10 }).unwrap();
        let record = test_record("E2", "alice", "tok-1");

        storage.commit_decision(Some(&inventory), &record).unwrap();

        let loaded = storage.get_booking(record.booking_id).unwrap();
        assert_eq!(loaded.idempotency_token, "tok-1");

        let resolved = storage.booking_id_for_token("tok-1").unwrap();
        assert_eq!(resolved, Some(record.booking_id));
        assert_eq!(storage.booking_id_for_token("tok-unknown").unwrap(), None);

        let by_event = storage.list_bookings_by_event(&EventId::new("E2")).unwrap();
        assert_eq!(by_event.len(), 1);

        let by_requester = storage
            .list_bookings_by_requester(&RequesterId::new("alice"))
            .unwrap();
        assert_eq!(by_requester.len(), 1);
    }

    #[test]
    fn test_rejected_commit_leaves_inventory_untouched() {
        let (storage, _temp) = test_storage();

        let inventory =
            EventInventory::new(EventId::new("E3"), CapacitySpec::Unseated { total: 5 }).unwrap();
        storage.put_inventory(&inventory).unwrap();

        let record = BookingRecord::rejected(
            EventId::new("E3"),
            RequesterId::new("bob"),
            ReservationWant::Units(9),
            "tok-r",
            crate::types::RejectReason::InsufficientCapacity { requested: 9, remaining: 5 },
        );
        storage.commit_decision(None, &record).unwrap();

        let loaded = storage.get_inventory(&EventId::new("E3")).unwrap();
        assert_eq!(loaded.remaining(), 5);
        assert_eq!(
            storage.booking_id_for_token("tok-r").unwrap(),
            Some(record.booking_id)
        );
    }

    #[test]
    fn test_index_order_follows_booking_time() {
        let (storage, _temp) = test_storage();

        let first = test_record("E4", "carol", "tok-a");
        let second = test_record("E4", "carol", "tok-b");
        storage.commit_decision(None, &first).unwrap();
        storage.commit_decision(None, &second).unwrap();

        // UUIDv7 keys sort by creation time
        let bookings = storage.list_bookings_by_event(&EventId::new("E4")).unwrap();
        assert_eq!(bookings.len(), 2);
        assert_eq!(bookings[0].booking_id, first.booking_id);
        assert_eq!(bookings[1].booking_id, second.booking_id);
    }

    #[test]
    fn test_index_scan_respects_id_boundaries() {
        let (storage, _temp) = test_storage();

        // IDs are opaque: one may be a byte-level prefix of another
        let foreign = test_record("A|B", "bob|2", "tok-1");
        let local = test_record("A", "bob", "tok-2");
        storage.commit_decision(None, &foreign).unwrap();
        storage.commit_decision(None, &local).unwrap();

        let by_event = storage.list_bookings_by_event(&EventId::new("A")).unwrap();
        assert_eq!(by_event.len(), 1);
        assert_eq!(by_event[0].booking_id, local.booking_id);

        let by_requester = storage
            .list_bookings_by_requester(&RequesterId::new("bob"))
            .unwrap();
        assert_eq!(by_requester.len(), 1);
        assert_eq!(by_requester[0].booking_id, local.booking_id);
    }

    #[test]
    fn test_injected_commit_failure() {
        let (storage, _temp) = test_storage();

        let record = test_record("E5", "dave", "tok-f");
        storage.inject_commit_failures(true);
        let err = storage.commit_decision(None, &record).unwrap_err();
        assert!(matches!(err, Error::Storage(_)));

        // Nothing was written
        assert_eq!(storage.booking_id_for_token("tok-f").unwrap(), None);

        storage.inject_commit_failures(false);
        storage.commit_decision(None, &record).unwrap();
        assert!(storage.get_booking(record.booking_id).is_ok());
    }
}
