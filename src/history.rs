//! Hash-chained break history with a bounded retention window.
//!
//! ## Chain
//!
//! Every break appends one [`BreakRecord`] whose `prev_hash` is the chain
//! hash of the record before it (all zeroes for the genesis link). The
//! chain head hash therefore commits to the entire break history, and a
//! claimant proves an order's execution by replaying the contiguous record
//! span from its open break to its close break.
//!
//! ## Window
//!
//! Only the newest `max_history` records are retained. The depth converges
//! toward the governed target by at most one record per break, so a depth
//! change never drops a span a claimant could still be assembling all at
//! once.

use std::collections::VecDeque;

use crate::error::PoolResult;
use crate::types::BreakRecord;

/// Default retention depth of the break window.
pub const DEFAULT_MAX_HISTORY: u64 = 256;

/// The settlement history chain.
#[derive(Debug, Clone)]
pub struct HistoryChain {
    /// Retained records, oldest first.
    records: VecDeque<BreakRecord>,
    /// Chain hash of the newest record; zero before the first break.
    last_hash: [u8; 32],
    /// Total breaks ever appended. The next record's `seq`.
    breaks_count: u64,
    /// Current retention depth.
    max_history: u64,
    /// Governed target depth; `max_history` drifts toward it one per break.
    desired_max_history: u64,
}

impl Default for HistoryChain {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HISTORY)
    }
}

impl HistoryChain {
    /// Create an empty chain with the given retention depth.
    pub fn new(max_history: u64) -> Self {
        Self {
            records: VecDeque::new(),
            last_hash: [0u8; 32],
            breaks_count: 0,
            max_history,
            desired_max_history: max_history,
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Chain hash of the newest record.
    #[inline]
    pub fn last_hash(&self) -> [u8; 32] {
        self.last_hash
    }

    /// Total breaks ever appended.
    #[inline]
    pub fn breaks_count(&self) -> u64 {
        self.breaks_count
    }

    /// Number of records currently retained.
    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Current retention depth.
    #[inline]
    pub fn max_history(&self) -> u64 {
        self.max_history
    }

    /// Governed target depth.
    #[inline]
    pub fn desired_max_history(&self) -> u64 {
        self.desired_max_history
    }

    /// Sequence number of the oldest retained record.
    pub fn oldest_seq(&self) -> Option<u64> {
        self.records.front().map(|record| record.seq)
    }

    /// Whether the record with `seq` is still retained.
    pub fn contains_seq(&self, seq: u64) -> bool {
        match self.oldest_seq() {
            Some(oldest) => seq >= oldest && seq < self.breaks_count,
            None => false,
        }
    }

    /// Borrow a retained record by sequence number.
    pub fn get(&self, seq: u64) -> Option<&BreakRecord> {
        let oldest = self.oldest_seq()?;
        let offset = seq.checked_sub(oldest)?;
        self.records.get(offset as usize)
    }

    /// Iterate retained records, oldest first.
    pub fn records(&self) -> impl Iterator<Item = &BreakRecord> {
        self.records.iter()
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Retarget the retention depth. Takes effect one record per break.
    pub fn set_desired_max_history(&mut self, depth: u64) {
        self.desired_max_history = depth;
    }

    /// Append the next break record, returning its chain hash.
    ///
    /// The chain owns linking: the record's `seq` and `prev_hash` are
    /// assigned here, whatever the caller put in those fields. The depth
    /// converges toward the target by one and the window is trimmed from
    /// the front.
    pub fn append(&mut self, mut record: BreakRecord) -> PoolResult<[u8; 32]> {
        record.seq = self.breaks_count;
        record.prev_hash = self.last_hash;
        let hash = record.chain_hash()?;

        self.records.push_back(record);
        self.last_hash = hash;
        self.breaks_count += 1;

        if self.max_history < self.desired_max_history {
            self.max_history += 1;
        } else if self.max_history > self.desired_max_history {
            self.max_history = self.max_history.saturating_sub(1).max(1);
        }
        while self.records.len() as u64 > self.max_history {
            self.records.pop_front();
        }
        Ok(hash)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
