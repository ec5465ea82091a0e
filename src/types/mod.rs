//! Core data types for the delayed-exchange pool.
//!
//! This module contains the foundational data structures:
//! - `amount`: fixed-point balance and flow-speed arithmetic
//! - `order`: streamed orders and their accrual anchors
//! - `breaks`: hash-chained break records

pub mod amount;
pub mod breaks;
pub mod order;

pub use breaks::{BreakReason, BreakRecord};
pub use order::{CloseReason, Direction, Order, OrderStatus, Side};
