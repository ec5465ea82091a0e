//! Order node for slab-based storage.
//!
//! ## Design
//!
//! `OrderNode` wraps an `Order` with two pairs of doubly-linked list
//! pointers, because an active order sits in up to two sorted lists at
//! once:
//! - the *timeout list*, ascending by `(timeout, id)` — every active order
//!   is linked here;
//! - the *stop-loss list*, ascending by `(stop_loss_key, id)` — only orders
//!   carrying a stop-loss bound are linked here.
//!
//! ## Slab Integration
//!
//! Per official slab docs (https://docs.rs/slab/0.4.11):
//! - Keys are `usize` values returned by `slab.insert()`
//! - Keys may be reused after `slab.remove()`
//! - O(1) insert, remove, and lookup
//!
//! The pointers are slab keys, not direct references, so unlinking a node
//! from either list is O(1) once its key is known.

use crate::types::Order;

/// Order node stored in the slab.
///
/// Contains the order data plus linked-list pointers for both sorted
/// queues. `stop_prev`/`stop_next` are meaningful only while
/// `in_stop_list` is set.
#[derive(Debug, Clone)]
pub struct OrderNode {
    /// The actual order data
    pub order: Order,

    /// Next order in the timeout list (later timeout); slab key.
    pub timeout_next: Option<usize>,

    /// Previous order in the timeout list (earlier timeout); slab key.
    pub timeout_prev: Option<usize>,

    /// Next order in the stop-loss list (higher key); slab key.
    pub stop_next: Option<usize>,

    /// Previous order in the stop-loss list (lower key); slab key.
    pub stop_prev: Option<usize>,

    /// Whether this node is linked into the stop-loss list.
    pub in_stop_list: bool,
}

impl OrderNode {
    /// Create a new order node (not yet linked into either list).
    #[inline]
    pub fn new(order: Order) -> Self {
        Self {
            order,
            timeout_next: None,
            timeout_prev: None,
            stop_next: None,
            stop_prev: None,
            in_stop_list: false,
        }
    }

    /// Get the order ID
    #[inline]
    pub fn order_id(&self) -> u64 {
        self.order.id
    }

    /// Get the order's absolute timeout
    #[inline]
    pub fn timeout(&self) -> u64 {
        self.order.timeout
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
