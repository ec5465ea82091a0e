//! # flowpool
//!
//! Constant-product exchange pool with streamed (delayed) orders and a
//! hash-chained settlement history.
//!
//! ## Architecture
//!
//! The engine consists of:
//! - **Types**: fixed-point amounts, streamed orders, break records
//! - **Ledger**: total/locked/available balances and flow speeds per side
//! - **Queue**: active orders in dual intrusive sorted lists
//! - **History**: hash-chained break records with a bounded window
//! - **Engine**: the break engine, instant swaps, liquidity, governance
//!
//! ## Design Principles
//!
//! 1. **Determinism**: settlement is a pure function of state and time;
//!    replayed claims reproduce the engine's numbers bit-for-bit
//! 2. **No Floating Point**: all math is fixed-point (`2^32`-scaled flow
//!    speeds, 256-bit quote intermediates)
//! 3. **Checkpointed Settlement**: prices are quoted only at flow breaks;
//!    between breaks balances evolve linearly from per-order anchors
//! 4. **Atomic Operations**: every public mutation commits completely or
//!    rolls back to its snapshot
//!
//! ## Example
//!
//! ```
//! use flowpool::{Direction, FlowPool};
//!
//! let mut pool = FlowPool::new(1);
//! pool.mint(0, 1, 1_000, 2_000).unwrap();
//!
//! // stream 100 A into B over 10 seconds
//! let id = pool.add_order(0, 7, Direction::AToB, 0, 0, 100, 10).unwrap();
//! let open_hash = pool.order(id).unwrap().open_hash;
//!
//! // the timeout closes the order at t=10
//! pool.process_delayed_orders(10).unwrap();
//!
//! // claim by replaying the break-record span
//! let span: Vec<_> = pool.history().records().skip(1).cloned().collect();
//! let (out, refund) = pool.claim_order(open_hash, &span).unwrap();
//! assert!(out > 0);
//! assert_eq!(refund, 0);
//! ```

// ============================================================================
// Module declarations
// ============================================================================

/// Error taxonomy
pub mod error;

/// Core data types: amounts, orders, break records
pub mod types;

/// Balance ledger: total/locked/available per side
pub mod ledger;

/// Active-order queue: dual intrusive sorted lists over a slab arena
pub mod queue;

/// Hash-chained break history with a bounded window
pub mod history;

/// The break engine: settlement, swaps, liquidity, governance
pub mod engine;

// ============================================================================
// Re-exports for convenience
// ============================================================================

pub use error::{PoolError, PoolResult};
pub use types::{BreakReason, BreakRecord, CloseReason, Direction, Order, OrderStatus, Side};
pub use ledger::PoolLedger;
pub use queue::OrderQueue;
pub use history::HistoryChain;
pub use engine::{FlowPool, PoolEvent, PoolStatus};
