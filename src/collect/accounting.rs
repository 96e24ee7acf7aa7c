//! Byte accounting for the collector. Times are in nanoseconds. Chunk bytes
//! refer to bytes reserved (but maybe not occupied); object bytes refer to
//! bytes occupied by objects, and are only maintained when detailed
//! accounting is enabled because they are expensive to gather.

use crate::util::address::ByteSize;

/// A snapshot of per-generation byte counts, taken by the controller right
/// before and right after the traced region of a cycle. Both snapshots are
/// taken while the old generation's live objects sit in its from-half.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct GenerationBytes {
    pub young_chunk: ByteSize,
    pub old_chunk: ByteSize,
    /// Zero unless detailed accounting is enabled.
    pub young_object: ByteSize,
    /// Zero unless detailed accounting is enabled.
    pub old_object: ByteSize,
}

/// Per-cycle before/after counters, a bounded circular history of
/// promoted/copied samples, and lifetime totals partitioned by incremental
/// vs. complete cycles. Collection policies and the summary report read
/// these; only the thread executing a cycle body writes them.
pub struct Accounting {
    incremental_count: u64,
    incremental_total_nanos: u64,
    complete_count: u64,
    complete_total_nanos: u64,
    collected_total_chunk_bytes: ByteSize,
    normal_chunk_bytes: ByteSize,
    promoted_total_chunk_bytes: ByteSize,
    copied_total_chunk_bytes: ByteSize,

    before: GenerationBytes,
    after: GenerationBytes,

    /// Count of cycles seen, used as the rolling index into the histories.
    history: usize,
    promoted_unpinned_chunk_bytes: Vec<ByteSize>,
    copied_unpinned_chunk_bytes: Vec<ByteSize>,

    detailed: bool,
    collected_total_object_bytes: ByteSize,
    normal_object_bytes: ByteSize,
}

impl Accounting {
    /// `history_len` is the depth of the circular history (at least one);
    /// `detailed` enables object-byte accounting.
    pub fn new(history_len: usize, detailed: bool) -> Self {
        assert!(history_len > 0, "accounting history must hold at least one sample");
        Accounting {
            incremental_count: 0,
            incremental_total_nanos: 0,
            complete_count: 0,
            complete_total_nanos: 0,
            collected_total_chunk_bytes: 0,
            normal_chunk_bytes: 0,
            promoted_total_chunk_bytes: 0,
            copied_total_chunk_bytes: 0,
            before: GenerationBytes::default(),
            after: GenerationBytes::default(),
            history: 0,
            promoted_unpinned_chunk_bytes: vec![0; history_len],
            copied_unpinned_chunk_bytes: vec![0; history_len],
            detailed,
            collected_total_object_bytes: 0,
            normal_object_bytes: 0,
        }
    }

    /// Snapshot generation bytes before any tracing, and advance the history
    /// index.
    pub fn before_collection(&mut self, sample: GenerationBytes) {
        self.history += 1;
        self.before = sample;
        // Objects are allocated in the young generation, so the young bytes
        // seen here are bytes the mutator allocated since the last cycle.
        self.normal_chunk_bytes += sample.young_chunk;
        if self.detailed {
            self.normal_object_bytes += sample.young_object;
        }
        trace!(
            "accounting before collection: young_chunk={} old_chunk={}",
            sample.young_chunk,
            sample.old_chunk
        );
    }

    /// Snapshot post-cycle bytes and fold the cycle into history and
    /// lifetime totals. `complete` selects which history the cycle feeds:
    /// incremental cycles only promote, complete cycles only copy (and copy
    /// everything reachable, so the copied sample is the whole old
    /// generation).
    pub fn after_collection(
        &mut self,
        complete: bool,
        sample: GenerationBytes,
        collection_nanos: u64,
    ) {
        self.after = sample;
        self.after_collection_common();
        let index = self.history_index(0);
        if complete {
            self.complete_count += 1;
            self.copied_unpinned_chunk_bytes[index] = sample.old_chunk;
            self.copied_total_chunk_bytes += sample.old_chunk;
            self.complete_total_nanos += collection_nanos;
        } else {
            self.incremental_count += 1;
            let promoted = sample.old_chunk.saturating_sub(self.before.old_chunk);
            self.promoted_unpinned_chunk_bytes[index] = promoted;
            self.promoted_total_chunk_bytes += promoted;
            self.incremental_total_nanos += collection_nanos;
        }
        trace!(
            "accounting after collection: complete={} old_chunk_after={}",
            complete,
            sample.old_chunk
        );
    }

    fn after_collection_common(&mut self) {
        let before_chunk = self.before.young_chunk + self.before.old_chunk;
        let after_chunk = self.after.young_chunk + self.after.old_chunk;
        self.collected_total_chunk_bytes += before_chunk.saturating_sub(after_chunk);
        if self.detailed {
            let before_object = self.before.young_object + self.before.old_object;
            let after_object = self.after.young_object + self.after.old_object;
            self.collected_total_object_bytes += before_object.saturating_sub(after_object);
        }
    }

    fn history_index(&self, offset: usize) -> usize {
        (self.history + offset) % self.promoted_unpinned_chunk_bytes.len()
    }

    /// Average the non-zero elements of a history. A slot holding zero is
    /// indistinguishable from one that was never recorded, so zeros are
    /// excluded by construction.
    fn average_of_history(history: &[ByteSize]) -> ByteSize {
        let mut sum = 0;
        let mut count = 0;
        for &sample in history {
            if sample > 0 {
                sum += sample;
                count += 1;
            }
        }
        if count > 0 {
            sum / count
        } else {
            0
        }
    }

    /// Average promoted bytes over the recorded incremental cycles.
    pub fn average_promoted_chunk_bytes(&self) -> ByteSize {
        Self::average_of_history(&self.promoted_unpinned_chunk_bytes)
    }

    /// Average copied bytes over the recorded complete cycles.
    pub fn average_copied_chunk_bytes(&self) -> ByteSize {
        Self::average_of_history(&self.copied_unpinned_chunk_bytes)
    }

    pub fn incremental_count(&self) -> u64 {
        self.incremental_count
    }

    pub fn incremental_total_nanos(&self) -> u64 {
        self.incremental_total_nanos
    }

    pub fn complete_count(&self) -> u64 {
        self.complete_count
    }

    pub fn complete_total_nanos(&self) -> u64 {
        self.complete_total_nanos
    }

    pub fn collected_total_chunk_bytes(&self) -> ByteSize {
        self.collected_total_chunk_bytes
    }

    pub fn collected_total_object_bytes(&self) -> ByteSize {
        self.collected_total_object_bytes
    }

    /// Lifetime bytes allocated normally (young-generation chunk bytes seen
    /// before each cycle).
    pub fn normal_chunk_bytes(&self) -> ByteSize {
        self.normal_chunk_bytes
    }

    pub fn normal_object_bytes(&self) -> ByteSize {
        self.normal_object_bytes
    }

    pub fn promoted_total_chunk_bytes(&self) -> ByteSize {
        self.promoted_total_chunk_bytes
    }

    pub fn copied_total_chunk_bytes(&self) -> ByteSize {
        self.copied_total_chunk_bytes
    }

    /// Bytes held in the old generation after the last cycle.
    pub fn old_chunk_bytes_after(&self) -> ByteSize {
        self.after.old_chunk
    }

    /// Bytes held in the young generation after the last cycle.
    pub fn young_chunk_bytes_after(&self) -> ByteSize {
        self.after.young_chunk
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(young: ByteSize, old: ByteSize) -> GenerationBytes {
        GenerationBytes {
            young_chunk: young,
            old_chunk: old,
            young_object: young,
            old_object: old,
        }
    }

    #[test]
    fn incremental_cycle_records_promoted_bytes() {
        let mut acct = Accounting::new(4, false);
        acct.before_collection(bytes(1000, 5000));
        acct.after_collection(false, bytes(0, 5300), 10);
        assert_eq!(acct.incremental_count(), 1);
        assert_eq!(acct.promoted_total_chunk_bytes(), 300);
        assert_eq!(acct.average_promoted_chunk_bytes(), 300);
        assert_eq!(acct.incremental_total_nanos(), 10);
    }

    #[test]
    fn complete_cycle_records_copied_bytes() {
        let mut acct = Accounting::new(4, false);
        acct.before_collection(bytes(1000, 5000));
        acct.after_collection(true, bytes(0, 4200), 25);
        assert_eq!(acct.complete_count(), 1);
        assert_eq!(acct.copied_total_chunk_bytes(), 4200);
        assert_eq!(acct.average_copied_chunk_bytes(), 4200);
        assert_eq!(acct.complete_total_nanos(), 25);
    }

    #[test]
    fn collected_bytes_are_before_minus_after() {
        let mut acct = Accounting::new(1, true);
        acct.before_collection(bytes(1000, 5000));
        acct.after_collection(false, bytes(0, 5200), 1);
        // 6000 before, 5200 after.
        assert_eq!(acct.collected_total_chunk_bytes(), 800);
        assert_eq!(acct.collected_total_object_bytes(), 800);
    }

    #[test]
    fn history_average_skips_zero_slots() {
        let mut acct = Accounting::new(4, false);
        // Two cycles that promote, two that promote nothing.
        for promoted in [100usize, 0, 300, 0] {
            acct.before_collection(bytes(500, 1000));
            acct.after_collection(false, bytes(0, 1000 + promoted), 1);
        }
        assert_eq!(acct.average_promoted_chunk_bytes(), 200);
    }

    #[test]
    fn history_wraps_around() {
        let mut acct = Accounting::new(2, false);
        for promoted in [100usize, 200, 400] {
            acct.before_collection(bytes(500, 1000));
            acct.after_collection(false, bytes(0, 1000 + promoted), 1);
        }
        // Depth 2: only the last two samples survive.
        assert_eq!(acct.average_promoted_chunk_bytes(), 300);
        assert_eq!(acct.promoted_total_chunk_bytes(), 700);
    }

    #[test]
    fn normal_bytes_accumulate_young_allocation() {
        let mut acct = Accounting::new(1, false);
        acct.before_collection(bytes(1000, 0));
        acct.after_collection(false, bytes(0, 500), 1);
        acct.before_collection(bytes(700, 500));
        acct.after_collection(false, bytes(0, 600), 1);
        assert_eq!(acct.normal_chunk_bytes(), 1700);
    }
}
