//! Reader slot management for MVCC
//!
//! This module manages reader slots to track active read transactions
//! and determine which pages can be safely recycled. The table is backed
//! by the `lock.mdb` memory map so that multiple processes opening the
//! same environment observe and coordinate over the same slots.

use crate::error::{Error, Result, TransactionId};
use memmap2::{MmapMut, MmapOptions};
use std::fs::File;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Maximum number of readers
pub const MAX_READERS: usize = 126;

/// Magic value stamped into a freshly initialized `lock.mdb`.
const LOCK_MAGIC: u32 = 0x5A44_424C; // "ZDBL"
const LOCK_VERSION: u32 = 1;

/// Fixed header at the start of `lock.mdb`, ahead of the `ReaderSlot` array.
/// All fields are atomics so concurrent processes can read/write it without
/// a separate lock.
#[repr(C)]
struct LockFileHeader {
    magic: AtomicU32,
    version: AtomicU32,
    num_slots: AtomicU32,
    _reserved: AtomicU32,
}

/// Reader slot information stored in shared memory
#[repr(C)]
#[derive(Debug)]
pub struct ReaderSlot {
    /// Process ID
    pub pid: AtomicU32,
    /// Thread ID
    pub tid: AtomicU64,
    /// Transaction ID being read
    pub txn_id: AtomicU64,
    /// Timestamp when slot was acquired (for stale reader detection)
    pub timestamp: AtomicU64,
}

impl ReaderSlot {
    /// Create a new empty reader slot
    pub fn new() -> Self {
        Self {
            pid: AtomicU32::new(0),
            tid: AtomicU64::new(0),
            txn_id: AtomicU64::new(0),
            timestamp: AtomicU64::new(0),
        }
    }

    /// Check if this slot is free
    pub fn is_free(&self) -> bool {
        self.pid.load(Ordering::Acquire) == 0
    }

    /// Try to acquire this slot
    pub fn try_acquire(&self, txn_id: TransactionId) -> bool {
        // Try to atomically set PID from 0 to current process ID
        let pid = std::process::id();
        let old_pid = self.pid.compare_exchange(0, pid, Ordering::AcqRel, Ordering::Acquire);

        if old_pid.is_ok() {
            // Successfully acquired the slot
            self.tid.store(thread_id(), Ordering::Release);
            self.txn_id.store(txn_id.0, Ordering::Release);
            self.timestamp.store(current_timestamp(), Ordering::Release);
            true
        } else {
            false
        }
    }

    /// Release this slot
    pub fn release(&self) {
        // Clear transaction ID first to ensure readers see consistent state
        self.txn_id.store(0, Ordering::Release);
        self.tid.store(0, Ordering::Release);
        self.timestamp.store(0, Ordering::Release);
        // Clear PID last to make slot available
        self.pid.store(0, Ordering::Release);
    }

    /// Check if this slot is stale (process died without releasing)
    pub fn is_stale(&self) -> bool {
        let pid = self.pid.load(Ordering::Acquire);
        if pid == 0 {
            return false;
        }

        // Check if process is still alive
        #[cfg(unix)]
        {
            unsafe {
                // Send signal 0 to check if process exists
                libc::kill(pid as i32, 0) != 0
            }
        }

        #[cfg(not(unix))]
        {
            // On non-Unix systems, use a timeout approach
            let timestamp = self.timestamp.load(Ordering::Acquire);
            let now = current_timestamp();
            // Consider stale after 5 minutes of inactivity
            now.saturating_sub(timestamp) > 300_000_000_000 // 5 minutes in nanoseconds
        }
    }
}

impl Default for ReaderSlot {
    fn default() -> Self {
        Self::new()
    }
}

/// Backing storage for the slot array: either private to this process, or
/// mapped from `lock.mdb` and shared with every other process that has the
/// environment open.
enum Storage {
    Owned(Vec<ReaderSlot>),
    Shared {
        #[allow(dead_code)]
        mmap: MmapMut,
        #[allow(dead_code)]
        header: NonNull<LockFileHeader>,
        slots: NonNull<ReaderSlot>,
        count: usize,
    },
}

// SAFETY: `ReaderSlot` and `LockFileHeader` are `#[repr(C)]` structs of
// atomics only, so concurrent access to the mapped region from multiple
// threads (or processes) is sound.
unsafe impl Send for Storage {}
unsafe impl Sync for Storage {}

/// Reader table for managing all reader slots
pub struct ReaderTable {
    storage: Storage,
}

impl ReaderTable {
    /// Create a new, process-local reader table. Used for tests and any
    /// caller that does not need cross-process coordination.
    pub fn new(max_readers: usize) -> Self {
        let mut slots = Vec::with_capacity(max_readers);
        for _ in 0..max_readers {
            slots.push(ReaderSlot::new());
        }
        Self { storage: Storage::Owned(slots) }
    }

    /// Open (or initialize) the reader slot array inside `lock.mdb`.
    ///
    /// `initialize` indicates this process won the exclusive-lock race in
    /// the open handshake; the header's magic value is authoritative
    /// regardless, so a process that loses the race but finds an
    /// uninitialized file (e.g. it was truncated) will still initialize it.
    /// All processes sharing an environment must agree on `max_readers`.
    pub fn open_shared(lock_file: &File, max_readers: usize, initialize: bool) -> Result<Self> {
        let header_size = std::mem::size_of::<LockFileHeader>();
        let slot_size = std::mem::size_of::<ReaderSlot>();
        let total_size = header_size + slot_size * max_readers;

        let metadata = lock_file.metadata().map_err(|e| Error::Io(e.to_string()))?;
        if metadata.len() < total_size as u64 {
            lock_file.set_len(total_size as u64).map_err(|e| Error::Io(e.to_string()))?;
        }

        let mut mmap = unsafe {
            MmapOptions::new().len(total_size).map_mut(lock_file).map_err(|e| Error::Io(e.to_string()))?
        };

        let base = mmap.as_mut_ptr();
        let header_ptr = base as *mut LockFileHeader;
        let slots_ptr = unsafe { base.add(header_size) as *mut ReaderSlot };

        let header = unsafe { NonNull::new_unchecked(header_ptr) };
        let slots = unsafe { NonNull::new_unchecked(slots_ptr) };

        let hdr = unsafe { header.as_ref() };
        let needs_init = hdr.magic.load(Ordering::Acquire) != LOCK_MAGIC;

        // The magic check, not the `initialize` hint, decides whether to
        // stamp fresh slots: a process that lost the exclusive-lock race
        // still has to initialize if it finds untouched memory.
        let _ = initialize;
        if needs_init {
            for i in 0..max_readers {
                unsafe {
                    slots_ptr.add(i).write(ReaderSlot::new());
                }
            }
            hdr.num_slots.store(max_readers as u32, Ordering::Release);
            hdr.version.store(LOCK_VERSION, Ordering::Release);
            hdr.magic.store(LOCK_MAGIC, Ordering::Release);
        }

        Ok(Self { storage: Storage::Shared { mmap, header, slots, count: max_readers } })
    }

    fn slots(&self) -> &[ReaderSlot] {
        match &self.storage {
            Storage::Owned(slots) => slots.as_slice(),
            Storage::Shared { slots, count, .. } => unsafe {
                std::slice::from_raw_parts(slots.as_ptr(), *count)
            },
        }
    }

    /// Try to acquire a reader slot.
    ///
    /// Only ever scans for a free slot. Stale slots left behind by a
    /// crashed reader are not force-released here; call [`cleanup_stale`]
    /// explicitly to reclaim them.
    ///
    /// [`cleanup_stale`]: ReaderTable::cleanup_stale
    pub fn acquire(&self, txn_id: TransactionId) -> Result<usize> {
        for (i, slot) in self.slots().iter().enumerate() {
            if slot.try_acquire(txn_id) {
                return Ok(i);
            }
        }

        Err(Error::ReadersFull)
    }

    /// Release a reader slot
    pub fn release(&self, slot_index: usize) {
        if let Some(slot) = self.slots().get(slot_index) {
            slot.release();
        }
    }

    /// Get the oldest active reader transaction ID
    pub fn oldest_reader(&self) -> Option<TransactionId> {
        let mut oldest = None;

        for slot in self.slots() {
            let txn_id = slot.txn_id.load(Ordering::Acquire);
            if txn_id > 0 {
                match oldest {
                    None => oldest = Some(TransactionId(txn_id)),
                    Some(TransactionId(old)) if txn_id < old => {
                        oldest = Some(TransactionId(txn_id));
                    }
                    _ => {}
                }
            }
        }

        oldest
    }

    /// Clean up stale reader slots
    pub fn cleanup_stale(&self) -> usize {
        let mut cleaned = 0;

        for slot in self.slots() {
            if slot.is_stale() {
                slot.release();
                cleaned += 1;
            }
        }

        cleaned
    }

    /// Get all active reader transaction IDs
    pub fn active_readers(&self) -> Vec<TransactionId> {
        let mut readers = Vec::new();

        for slot in self.slots() {
            let txn_id = slot.txn_id.load(Ordering::Acquire);
            if txn_id > 0 {
                readers.push(TransactionId(txn_id));
            }
        }

        readers
    }

    /// Get reader count
    pub fn reader_count(&self) -> usize {
        self.slots().iter().filter(|slot| !slot.is_free()).count()
    }

    /// Enumerate all active readers with detailed information
    pub fn enumerate_readers(&self) -> Vec<ReaderInfo> {
        let mut readers = Vec::new();

        for (slot_idx, slot) in self.slots().iter().enumerate() {
            let pid = slot.pid.load(Ordering::Acquire);
            if pid > 0 {
                readers.push(ReaderInfo {
                    slot_index: slot_idx,
                    pid,
                    tid: slot.tid.load(Ordering::Acquire),
                    txn_id: TransactionId(slot.txn_id.load(Ordering::Acquire)),
                    timestamp: slot.timestamp.load(Ordering::Acquire),
                    is_stale: slot.is_stale(),
                });
            }
        }

        readers
    }
}

/// Detailed information about an active reader
#[derive(Debug, Clone)]
pub struct ReaderInfo {
    /// Slot index
    pub slot_index: usize,
    /// Process ID
    pub pid: u32,
    /// Thread ID
    pub tid: u64,
    /// Transaction ID
    pub txn_id: TransactionId,
    /// Timestamp when acquired (nanoseconds since epoch)
    pub timestamp: u64,
    /// Whether this reader appears to be stale
    pub is_stale: bool,
}

impl ReaderInfo {
    /// Get age of this reader in seconds
    pub fn age_seconds(&self) -> u64 {
        let now = current_timestamp();
        (now.saturating_sub(self.timestamp)) / 1_000_000_000
    }
}

/// Get current thread ID
fn thread_id() -> u64 {
    #[cfg(unix)]
    {
        unsafe { libc::pthread_self() as u64 }
    }

    #[cfg(windows)]
    {
        unsafe { winapi::um::processthreadsapi::GetCurrentThreadId() as u64 }
    }

    #[cfg(not(any(unix, windows)))]
    {
        // Fallback: use thread local storage address as ID
        thread_local! {
            static THREAD_ID: u8 = 0;
        }
        THREAD_ID.with(|id| id as *const _ as u64)
    }
}

/// Get current timestamp in nanoseconds
fn current_timestamp() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_slot_acquire_release() {
        let slot = ReaderSlot::new();
        assert!(slot.is_free());

        // Acquire slot
        assert!(slot.try_acquire(TransactionId(100)));
        assert!(!slot.is_free());
        assert_eq!(slot.txn_id.load(Ordering::Acquire), 100);

        // Can't acquire again
        assert!(!slot.try_acquire(TransactionId(200)));

        // Release slot
        slot.release();
        assert!(slot.is_free());
        assert_eq!(slot.txn_id.load(Ordering::Acquire), 0);
    }

    #[test]
    fn test_reader_table() {
        let table = ReaderTable::new(10);

        // Acquire some slots
        let slot1 = table.acquire(TransactionId(100)).unwrap();
        let slot2 = table.acquire(TransactionId(200)).unwrap();
        let slot3 = table.acquire(TransactionId(150)).unwrap();

        assert_eq!(table.reader_count(), 3);

        // Check oldest reader
        assert_eq!(table.oldest_reader(), Some(TransactionId(100)));

        // Release a slot
        table.release(slot1);
        assert_eq!(table.reader_count(), 2);
        assert_eq!(table.oldest_reader(), Some(TransactionId(150)));

        // Release all
        table.release(slot2);
        table.release(slot3);
        assert_eq!(table.reader_count(), 0);
        assert_eq!(table.oldest_reader(), None);
    }

    #[test]
    fn test_reader_table_full() {
        let table = ReaderTable::new(3);

        // Fill all slots
        let _slot1 = table.acquire(TransactionId(100)).unwrap();
        let _slot2 = table.acquire(TransactionId(200)).unwrap();
        let _slot3 = table.acquire(TransactionId(300)).unwrap();

        // Next acquire should fail
        assert!(table.acquire(TransactionId(400)).is_err());
    }

    #[test]
    fn test_reader_table_does_not_steal_stale_slots() {
        let table = ReaderTable::new(1);
        let slot = table.acquire(TransactionId(1)).unwrap();

        // Simulate a crashed reader: PID no longer exists, slot never released.
        table.slots()[slot].pid.store(u32::MAX, Ordering::Release);

        // acquire() must not force-release the stale slot on its own.
        assert!(table.acquire(TransactionId(2)).is_err());

        // Only an explicit cleanup_stale() reclaims it.
        assert_eq!(table.cleanup_stale(), 1);
        assert!(table.acquire(TransactionId(2)).is_ok());
    }

    #[test]
    fn test_reader_table_open_shared() {
        use tempfile::NamedTempFile;

        let file = NamedTempFile::new().unwrap();
        let table_a =
            ReaderTable::open_shared(file.as_file(), 4, true).expect("first opener initializes");
        let slot = table_a.acquire(TransactionId(42)).unwrap();

        // A second handle onto the same file sees the slot the first one took.
        let table_b =
            ReaderTable::open_shared(file.as_file(), 4, false).expect("second opener attaches");
        assert_eq!(table_b.reader_count(), 1);
        assert_eq!(table_b.oldest_reader(), Some(TransactionId(42)));

        table_a.release(slot);
        assert_eq!(table_b.reader_count(), 0);
    }

    #[test]
    fn test_reader_management_integration() {
        use crate::env::EnvBuilder;
        use tempfile::TempDir;

        let dir = TempDir::new().unwrap();
        let env =
            EnvBuilder::new().map_size(10 * 1024 * 1024).max_readers(5).open(dir.path()).unwrap();

        // Start multiple read transactions
        let txn1 = env.read_txn().unwrap();
        let txn2 = env.read_txn().unwrap();
        let txn3 = env.read_txn().unwrap();

        // Check reader count
        let inner = env.inner();
        assert_eq!(inner.readers.reader_count(), 3);

        // Drop a transaction
        drop(txn2);

        // Reader count should decrease
        assert_eq!(inner.readers.reader_count(), 2);

        // Should be able to start new transactions
        let txn4 = env.read_txn().unwrap();
        let txn5 = env.read_txn().unwrap();

        assert_eq!(inner.readers.reader_count(), 4);

        // Clean up
        drop(txn1);
        drop(txn3);
        drop(txn4);
        drop(txn5);

        assert_eq!(inner.readers.reader_count(), 0);
    }
}
