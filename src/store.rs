//! Shared tag table between the downloader and the advertisement cycler.
//!
//! The table sits behind a blocking mutex. Access is only possible through a
//! synchronous closure, so no caller can hold the lock across an `.await`
//! (radio handshakes, dwell sleeps, network I/O).

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;
use heapless::Vec;

use crate::error::FetchError;
use crate::tag::TagRecord;

/// The records currently held by a [`TagStore`].
///
/// Only the first `count()` records exist; there is no way to reach past them.
pub struct TagTable<const N: usize> {
    records: Vec<TagRecord, N>,
    capacity: usize,
}

impl<const N: usize> TagTable<N> {
    const fn new(capacity: usize) -> Self {
        Self {
            records: Vec::new(),
            capacity: if capacity < N { capacity } else { N },
        }
    }

    pub fn count(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn get(&self, index: usize) -> Option<&TagRecord> {
        self.records.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TagRecord> {
        self.records.iter()
    }

    /// Replace every record. On overflow the old records are kept.
    pub fn replace<I>(&mut self, records: I) -> Result<(), FetchError>
    where
        I: IntoIterator<Item = TagRecord>,
    {
        let mut fresh: Vec<TagRecord, N> = Vec::new();
        for record in records {
            if fresh.len() == self.capacity {
                return Err(FetchError::TooManyTags);
            }
            // Cannot fail: capacity <= N.
            let _ = fresh.push(record);
        }
        self.records = fresh;
        Ok(())
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

/// Fixed-capacity tag list shared by producer and consumer.
///
/// `N` sizes the backing buffer; `capacity` (from configuration) may be
/// smaller and is what the store enforces.
pub struct TagStore<M: RawMutex, const N: usize> {
    table: Mutex<M, RefCell<TagTable<N>>>,
}

impl<M: RawMutex, const N: usize> TagStore<M, N> {
    pub const fn new(capacity: usize) -> Self {
        Self {
            table: Mutex::new(RefCell::new(TagTable::new(capacity))),
        }
    }

    /// Run `f` with the table locked. The lock is released when `f` returns.
    pub fn with_exclusive_access<R>(&self, f: impl FnOnce(&mut TagTable<N>) -> R) -> R {
        self.table.lock(|table| f(&mut table.borrow_mut()))
    }

    pub fn capacity(&self) -> usize {
        self.with_exclusive_access(|table| table.capacity())
    }

    pub fn count(&self) -> usize {
        self.with_exclusive_access(|table| table.count())
    }

    /// Swap in a freshly downloaded tag list.
    pub fn replace<I>(&self, records: I) -> Result<(), FetchError>
    where
        I: IntoIterator<Item = TagRecord>,
    {
        self.with_exclusive_access(|table| table.replace(records))
    }

    /// Copy out the record at `index`.
    ///
    /// If the table shrank below `index` since the caller last looked, the
    /// rotation restarts at the first record. Returns the index actually used.
    pub fn snapshot(&self, index: usize) -> Option<(usize, TagRecord)> {
        self.with_exclusive_access(|table| {
            let index = if index < table.count() { index } else { 0 };
            table.get(index).map(|record| (index, record.clone()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

    fn tag(id: u32) -> TagRecord {
        TagRecord::new(id, "AAAA", true).unwrap()
    }

    #[test]
    fn test_starts_empty() {
        let store: TagStore<CriticalSectionRawMutex, 4> = TagStore::new(4);
        assert_eq!(store.count(), 0);
        assert_eq!(store.snapshot(0), None);
        assert_eq!(store.snapshot(3), None);
    }

    #[test]
    fn test_capacity_is_clamped_to_buffer() {
        let store: TagStore<CriticalSectionRawMutex, 4> = TagStore::new(10);
        assert_eq!(store.capacity(), 4);

        let store: TagStore<CriticalSectionRawMutex, 4> = TagStore::new(2);
        assert_eq!(store.capacity(), 2);
    }

    #[test]
    fn test_replace_and_snapshot() {
        let store: TagStore<CriticalSectionRawMutex, 4> = TagStore::new(4);
        store.replace([tag(10), tag(11), tag(12)]).unwrap();

        assert_eq!(store.count(), 3);
        assert_eq!(store.snapshot(1), Some((1, tag(11))));
        assert_eq!(store.snapshot(2), Some((2, tag(12))));
    }

    #[test]
    fn test_snapshot_wraps_after_shrink() {
        let store: TagStore<CriticalSectionRawMutex, 4> = TagStore::new(4);
        store.replace([tag(1), tag(2), tag(3), tag(4)]).unwrap();
        store.replace([tag(5)]).unwrap();

        assert_eq!(store.snapshot(3), Some((0, tag(5))));
    }

    #[test]
    fn test_overflow_keeps_previous_table() {
        let store: TagStore<CriticalSectionRawMutex, 8> = TagStore::new(2);
        store.replace([tag(1), tag(2)]).unwrap();

        let result = store.replace([tag(3), tag(4), tag(5)]);
        assert_eq!(result, Err(FetchError::TooManyTags));
        assert_eq!(store.count(), 2);
        assert_eq!(store.snapshot(0), Some((0, tag(1))));
    }

    #[test]
    fn test_replace_with_empty_list() {
        let store: TagStore<CriticalSectionRawMutex, 4> = TagStore::new(4);
        store.replace([tag(1)]).unwrap();
        store.replace([]).unwrap();
        assert_eq!(store.count(), 0);
    }

    #[test]
    fn test_exclusive_access_sees_whole_table() {
        let store: TagStore<CriticalSectionRawMutex, 4> = TagStore::new(4);
        store.replace([tag(1), tag(2), tag(3)]).unwrap();

        let ids = store.with_exclusive_access(|table| {
            let mut sum = 0;
            for record in table.iter() {
                sum += record.id;
            }
            sum
        });
        assert_eq!(ids, 6);

        store.with_exclusive_access(|table| table.clear());
        assert_eq!(store.count(), 0);
    }
}
