use std::sync::atomic::{AtomicU64, Ordering};

/// One byte range of a multi-part download, `end` inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRange {
    pub index: u64,
    pub start: u64,
    pub end: u64,
}

impl ChunkRange {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// `Range` header value for this chunk.
    pub fn header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

/// Fixed-size partition of `[0, total)` handed out to chunk workers.
///
/// `claim` is the only point where workers share state; the atomic counter
/// guarantees every index is handed out exactly once.
#[derive(Debug)]
pub struct ChunkPlan {
    total: u64,
    chunk_size: u64,
    count: u64,
    next: AtomicU64,
}

impl ChunkPlan {
    pub fn new(total: u64, chunk_size: u64) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            total,
            chunk_size,
            count: total.div_ceil(chunk_size),
            next: AtomicU64::new(0),
        }
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn chunk_count(&self) -> u64 {
        self.count
    }

    /// Byte range of chunk `index`; the last chunk may be short.
    pub fn range(&self, index: u64) -> Option<ChunkRange> {
        if index >= self.count {
            return None;
        }
        let start = index * self.chunk_size;
        let end = (start + self.chunk_size).min(self.total) - 1;
        Some(ChunkRange { index, start, end })
    }

    /// Take the next unclaimed chunk, or `None` once all are handed out.
    pub fn claim(&self) -> Option<ChunkRange> {
        let index = self.next.fetch_add(1, Ordering::AcqRel);
        self.range(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn last_chunk_is_short() {
        let plan = ChunkPlan::new(10, 4);
        assert_eq!(plan.chunk_count(), 3);
        assert_eq!(plan.range(2), Some(ChunkRange { index: 2, start: 8, end: 9 }));
        assert_eq!(plan.range(3), None);
    }

    #[test]
    fn header_value_is_inclusive() {
        let plan = ChunkPlan::new(1024, 1024);
        assert_eq!(plan.claim().unwrap().header_value(), "bytes=0-1023");
        assert!(plan.claim().is_none());
    }

    #[test]
    fn concurrent_claims_never_repeat() {
        let plan = std::sync::Arc::new(ChunkPlan::new(1000, 7));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let plan = plan.clone();
                std::thread::spawn(move || {
                    let mut mine = Vec::new();
                    while let Some(chunk) = plan.claim() {
                        mine.push(chunk.index);
                    }
                    mine
                })
            })
            .collect();

        let mut all: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();
        let expected: Vec<u64> = (0..plan.chunk_count()).collect();
        assert_eq!(all, expected);
    }

    proptest! {
        #[test]
        fn chunks_cover_every_byte_exactly_once(total in 1u64..50_000, chunk_size in 1u64..5_000) {
            let plan = ChunkPlan::new(total, chunk_size);
            let mut cursor = 0u64;
            while let Some(chunk) = plan.claim() {
                prop_assert_eq!(chunk.start, cursor);
                prop_assert!(chunk.end >= chunk.start);
                prop_assert!(chunk.len() <= chunk_size);
                cursor = chunk.end + 1;
            }
            prop_assert_eq!(cursor, total);
        }
    }
}
