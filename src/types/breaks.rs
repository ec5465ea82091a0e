//! Break records: the hash-chained checkpoints of the settlement engine.
//!
//! ## SSZ serialization
//!
//! A break record is encoded with `ssz_rs` (fixed-size container of
//! little-endian fields) and its chain hash is `SHA256(ssz(record))`, where
//! the record embeds the previous record's hash. Deterministic encoding is
//! what lets a caller replay a record sequence and reproduce the engine's
//! chain byte-for-byte.
//!
//! ## Structured, not packed
//!
//! Storage-constrained settings pack trigger descriptors and balances into
//! a few machine words; nothing here is storage-constrained, so every
//! field is explicit.

use sha2::{Digest, Sha256};
use ssz_rs::prelude::*;

use crate::error::{PoolError, PoolResult};

// ============================================================================
// BreakReason enum
// ============================================================================

/// What triggered a break.
///
/// Represented as u8 for record encoding. `OrderTimeout`, `OrderStopLoss`
/// and `OrderClosed` mark "this order closed here" for the order named by
/// the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BreakReason {
    /// A new delayed order entered the queues.
    #[default]
    OrderOpen,
    /// An order reached its absolute timeout.
    OrderTimeout,
    /// An order's stop-loss bound was crossed.
    OrderStopLoss,
    /// An order was closed explicitly.
    OrderClosed,
    /// An instant swap moved the available balances.
    Swap,
    /// Liquidity was minted.
    Mint,
    /// Liquidity was burned.
    Burn,
    /// Totals were re-aligned with external token balances.
    Sync,
    /// Governance changed a parameter.
    ParamChange,
    /// Governance locked the pool.
    Lock,
    /// Governance emergency-locked the pool.
    EmergencyLock,
}

impl BreakReason {
    /// Convert to u8 for serialization.
    pub fn to_u8(self) -> u8 {
        match self {
            BreakReason::OrderOpen => 0,
            BreakReason::OrderTimeout => 1,
            BreakReason::OrderStopLoss => 2,
            BreakReason::OrderClosed => 3,
            BreakReason::Swap => 4,
            BreakReason::Mint => 5,
            BreakReason::Burn => 6,
            BreakReason::Sync => 7,
            BreakReason::ParamChange => 8,
            BreakReason::Lock => 9,
            BreakReason::EmergencyLock => 10,
        }
    }

    /// Convert from u8 for deserialization.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(BreakReason::OrderOpen),
            1 => Some(BreakReason::OrderTimeout),
            2 => Some(BreakReason::OrderStopLoss),
            3 => Some(BreakReason::OrderClosed),
            4 => Some(BreakReason::Swap),
            5 => Some(BreakReason::Mint),
            6 => Some(BreakReason::Burn),
            7 => Some(BreakReason::Sync),
            8 => Some(BreakReason::ParamChange),
            9 => Some(BreakReason::Lock),
            10 => Some(BreakReason::EmergencyLock),
            _ => None,
        }
    }

    /// Whether this reason closes the order the record names.
    pub fn closes_order(self) -> bool {
        matches!(
            self,
            BreakReason::OrderTimeout | BreakReason::OrderStopLoss | BreakReason::OrderClosed
        )
    }
}

// ============================================================================
// BreakRecord struct
// ============================================================================

/// One link of the settlement history chain.
///
/// All balance fields describe the pool *after* the break settled its
/// trigger and requoted the surviving orders; `flow_in_a/b` are the pool
/// input flow speeds after the break, `committed_a/b` the un-converted
/// input per direction. Together with the constant per-order input speeds
/// these fields are sufficient to replay any order's execution over the
/// interval this record opens.
#[derive(Debug, Clone, PartialEq, Eq, Default, SimpleSerialize)]
pub struct BreakRecord {
    /// Break sequence number (monotonic, one per break).
    pub seq: u64,

    /// Pool time of the break, seconds.
    pub time: u64,

    /// Trigger descriptor as u8 (see [`BreakReason`]).
    pub reason_raw: u8,

    /// Order this break concerns; 0 when none.
    pub order_id: u64,

    /// Available balance of side A after the break.
    pub available_a: u128,

    /// Available balance of side B after the break.
    pub available_b: u128,

    /// Remaining un-converted input of A→B orders after the break.
    pub committed_a: u128,

    /// Remaining un-converted input of B→A orders after the break.
    pub committed_b: u128,

    /// Pool input flow speed of side A after the break (`<< 32`).
    pub flow_in_a: u128,

    /// Pool input flow speed of side B after the break (`<< 32`).
    pub flow_in_b: u128,

    /// Swap fee complement in effect from this break on (e.g. 997).
    pub not_fee: u64,

    /// Chain hash of the previous record.
    pub prev_hash: [u8; 32],
}

impl BreakRecord {
    /// Decode the trigger descriptor.
    pub fn reason(&self) -> Option<BreakReason> {
        BreakReason::from_u8(self.reason_raw)
    }

    /// Whether this record closes `order_id`.
    pub fn closes(&self, order_id: u64) -> bool {
        self.order_id == order_id
            && self.reason().map(BreakReason::closes_order).unwrap_or(false)
    }

    /// Chain hash of this record: `SHA256(ssz(record))`.
    ///
    /// Encoding a fixed-size container cannot fail for well-formed data; a
    /// failure is escalated as the fatal arithmetic class because it would
    /// mean the chain can no longer be extended.
    pub fn chain_hash(&self) -> PoolResult<[u8; 32]> {
        let encoded = ssz_rs::serialize(self).map_err(|_| PoolError::ArithmeticOverflow)?;
        let mut hasher = Sha256::new();
        hasher.update(&encoded);
        let digest = hasher.finalize();

        let mut hash = [0u8; 32];
        hash.copy_from_slice(&digest);
        Ok(hash)
    }

    /// Chain hash as a hex string, for events and logs.
    pub fn chain_hash_hex(&self) -> PoolResult<String> {
        Ok(hex::encode(self.chain_hash()?))
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
