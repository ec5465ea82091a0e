//! Active-order queue: slab arena with two intrusive sorted lists.
//!
//! ## Design
//!
//! Every active order lives in one slab slot and is linked into:
//! - the **timeout list**, ascending by `(timeout, id)`, so the next order
//!   to expire is always the head;
//! - the **stop-loss list**, ascending by `(stop_loss_key, id)`, linking
//!   only the orders that carry a stop-loss bound.
//!
//! Insertion walks from the tail (new orders usually sort late), removal
//! splices in O(1) from both lists at once.
//!
//! ## Trigger search
//!
//! Between breaks the pool's available balances drift linearly: input flow
//! releases locked value into availability, output accrual removes it. The
//! queue solves, per stop-loss order, the earliest whole second at which
//! the linearized balances cross its bound, and combines that with the head
//! of the timeout list into the next scheduled break. The solve is
//! conservative: it predicts the break time, and the actual crossing is
//! re-checked against the settled balances when that break executes.

pub mod node;

pub use node::OrderNode;

use std::collections::HashMap;

use primitive_types::U256;
use slab::Slab;

use crate::error::PoolResult;
use crate::ledger::PoolLedger;
use crate::types::amount::FLOW_ONE;
use crate::types::{Direction, Order, Side};

/// Dual-sorted queue of active orders.
///
/// The queue owns active orders only; closed orders are handed back to the
/// caller on removal.
#[derive(Debug, Clone, Default)]
pub struct OrderQueue {
    /// Arena of order nodes.
    arena: Slab<OrderNode>,
    /// Order id -> slab key.
    index: HashMap<u64, usize>,
    /// Head of the timeout list (earliest timeout).
    timeout_head: Option<usize>,
    /// Tail of the timeout list (latest timeout).
    timeout_tail: Option<usize>,
    /// Head of the stop-loss list (lowest key).
    stop_head: Option<usize>,
    /// Tail of the stop-loss list (highest key).
    stop_tail: Option<usize>,
}

impl OrderQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of active orders.
    #[inline]
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    /// Whether the queue holds no orders.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    /// Whether `id` is queued.
    #[inline]
    pub fn contains(&self, id: u64) -> bool {
        self.index.contains_key(&id)
    }

    /// Borrow an order by id.
    pub fn get(&self, id: u64) -> Option<&Order> {
        self.index.get(&id).map(|&key| &self.arena[key].order)
    }

    /// Mutably borrow an order by id.
    pub fn get_mut(&mut self, id: u64) -> Option<&mut Order> {
        let key = *self.index.get(&id)?;
        Some(&mut self.arena[key].order)
    }

    // ========================================================================
    // Insert / remove
    // ========================================================================

    /// Insert an active order into both lists.
    ///
    /// The stop-loss list is only joined when the order carries a bound;
    /// computing its sort key can fail on degenerate bounds, which is the
    /// only error path here.
    pub fn insert(&mut self, order: Order) -> PoolResult<()> {
        let stop_key = if order.has_stop_loss() {
            Some(order.stop_loss_key()?)
        } else {
            None
        };
        let id = order.id;
        let key = self.arena.insert(OrderNode::new(order));
        self.index.insert(id, key);
        self.link_timeout(key);
        if let Some(sort_key) = stop_key {
            self.link_stop(key, sort_key);
        }
        Ok(())
    }

    /// Remove an order from both lists, returning it by value.
    pub fn remove(&mut self, id: u64) -> Option<Order> {
        let key = self.index.remove(&id)?;
        self.unlink_timeout(key);
        if self.arena[key].in_stop_list {
            self.unlink_stop(key);
        }
        Some(self.arena.remove(key).order)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Earliest `(timeout, id)` among active orders.
    pub fn first_timeout(&self) -> Option<(u64, u64)> {
        self.timeout_head.map(|key| {
            let node = &self.arena[key];
            (node.order.timeout, node.order.id)
        })
    }

    /// Iterate orders in timeout order.
    pub fn iter(&self) -> QueueIter<'_> {
        QueueIter {
            queue: self,
            cursor: self.timeout_head,
        }
    }

    /// Order ids in timeout order.
    ///
    /// The engine advances and requotes through `get_mut`, so iteration
    /// snapshots the ids first.
    pub fn ids_by_timeout(&self) -> Vec<u64> {
        self.iter().map(|order| order.id).collect()
    }

    /// Order ids in stop-loss key order (stop-loss orders only).
    pub fn ids_by_stop_loss(&self) -> Vec<u64> {
        let mut ids = Vec::new();
        let mut cursor = self.stop_head;
        while let Some(key) = cursor {
            let node = &self.arena[key];
            ids.push(node.order.id);
            cursor = node.stop_next;
        }
        ids
    }

    /// Sum of un-converted input over active orders of a direction.
    pub fn committed(&self, direction: Direction) -> u128 {
        self.iter()
            .filter(|order| order.direction == direction)
            .map(Order::remaining_in)
            .sum()
    }

    /// First stop-loss order already violated by the given available
    /// balances, walking the stop-loss list in key order.
    pub fn stop_loss_triggered(&self, available_a: u128, available_b: u128) -> Option<u64> {
        let mut cursor = self.stop_head;
        while let Some(key) = cursor {
            let node = &self.arena[key];
            if node.order.stop_loss_crossed(available_a, available_b) {
                return Some(node.order.id);
            }
            cursor = node.stop_next;
        }
        None
    }

    /// Earliest predicted stop-loss crossing after `now`, as `(time, id)`,
    /// under the ledger's current linear drift. Ties break on the lower id.
    pub fn next_stop_loss_crossing(
        &self,
        ledger: &PoolLedger,
        now: u64,
    ) -> Option<(u64, u64)> {
        let available_a = ledger.available(Side::A);
        let available_b = ledger.available(Side::B);
        let drift_a = ledger.available_drift(Side::A);
        let drift_b = ledger.available_drift(Side::B);

        let mut best: Option<(u64, u64)> = None;
        let mut cursor = self.stop_head;
        while let Some(key) = cursor {
            let node = &self.arena[key];
            if let Some(t) =
                crossing_candidate(&node.order, available_a, available_b, drift_a, drift_b, now)
            {
                let candidate = (t, node.order.id);
                if best.map_or(true, |b| candidate < b) {
                    best = Some(candidate);
                }
            }
            cursor = node.stop_next;
        }
        best
    }

    /// Next scheduled break `(time, id)`: the earlier of the head timeout
    /// and the earliest predicted stop-loss crossing.
    pub fn next_trigger(&self, ledger: &PoolLedger, now: u64) -> Option<(u64, u64)> {
        let timeout = self.first_timeout();
        let crossing = self.next_stop_loss_crossing(ledger, now);
        match (timeout, crossing) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(b),
            (None, None) => None,
        }
    }

    // ========================================================================
    // Intrusive list plumbing
    // ========================================================================

    fn timeout_sort_key(&self, key: usize) -> (u64, u64) {
        let node = &self.arena[key];
        (node.order.timeout, node.order.id)
    }

    fn link_timeout(&mut self, key: usize) {
        let sort_key = self.timeout_sort_key(key);

        // walk from the tail: fresh orders usually expire last
        let mut cursor = self.timeout_tail;
        while let Some(c) = cursor {
            if self.timeout_sort_key(c) <= sort_key {
                break;
            }
            cursor = self.arena[c].timeout_prev;
        }

        match cursor {
            None => {
                let old_head = self.timeout_head;
                self.arena[key].timeout_next = old_head;
                self.arena[key].timeout_prev = None;
                match old_head {
                    Some(h) => self.arena[h].timeout_prev = Some(key),
                    None => self.timeout_tail = Some(key),
                }
                self.timeout_head = Some(key);
            }
            Some(c) => {
                let next = self.arena[c].timeout_next;
                self.arena[key].timeout_prev = Some(c);
                self.arena[key].timeout_next = next;
                self.arena[c].timeout_next = Some(key);
                match next {
                    Some(n) => self.arena[n].timeout_prev = Some(key),
                    None => self.timeout_tail = Some(key),
                }
            }
        }
    }

    fn unlink_timeout(&mut self, key: usize) {
        let (prev, next) = {
            let node = &self.arena[key];
            (node.timeout_prev, node.timeout_next)
        };
        match prev {
            Some(p) => self.arena[p].timeout_next = next,
            None => self.timeout_head = next,
        }
        match next {
            Some(n) => self.arena[n].timeout_prev = prev,
            None => self.timeout_tail = prev,
        }
        let node = &mut self.arena[key];
        node.timeout_prev = None;
        node.timeout_next = None;
    }

    fn stop_sort_key(&self, key: usize) -> PoolResult<(u128, u64)> {
        let node = &self.arena[key];
        Ok((node.order.stop_loss_key()?, node.order.id))
    }

    fn link_stop(&mut self, key: usize, sort_key: u128) {
        let sort_key = (sort_key, self.arena[key].order.id);

        let mut cursor = self.stop_tail;
        while let Some(c) = cursor {
            // keys were validated at insert, so re-deriving cannot fail
            if self.stop_sort_key(c).unwrap_or((0, 0)) <= sort_key {
                break;
            }
            cursor = self.arena[c].stop_prev;
        }

        match cursor {
            None => {
                let old_head = self.stop_head;
                self.arena[key].stop_next = old_head;
                self.arena[key].stop_prev = None;
                match old_head {
                    Some(h) => self.arena[h].stop_prev = Some(key),
                    None => self.stop_tail = Some(key),
                }
                self.stop_head = Some(key);
            }
            Some(c) => {
                let next = self.arena[c].stop_next;
                self.arena[key].stop_prev = Some(c);
                self.arena[key].stop_next = next;
                self.arena[c].stop_next = Some(key);
                match next {
                    Some(n) => self.arena[n].stop_prev = Some(key),
                    None => self.stop_tail = Some(key),
                }
            }
        }
        self.arena[key].in_stop_list = true;
    }

    fn unlink_stop(&mut self, key: usize) {
        let (prev, next) = {
            let node = &self.arena[key];
            (node.stop_prev, node.stop_next)
        };
        match prev {
            Some(p) => self.arena[p].stop_next = next,
            None => self.stop_head = next,
        }
        match next {
            Some(n) => self.arena[n].stop_prev = prev,
            None => self.stop_tail = prev,
        }
        let node = &mut self.arena[key];
        node.stop_prev = None;
        node.stop_next = None;
        node.in_stop_list = false;
    }
}

/// Iterator over queued orders in timeout order.
pub struct QueueIter<'a> {
    queue: &'a OrderQueue,
    cursor: Option<usize>,
}

impl<'a> Iterator for QueueIter<'a> {
    type Item = &'a Order;

    fn next(&mut self) -> Option<Self::Item> {
        let key = self.cursor?;
        let node = &self.queue.arena[key];
        self.cursor = node.timeout_next;
        Some(&node.order)
    }
}

// ============================================================================
// Stop-loss crossing solve
// ============================================================================

/// Earliest whole second `t >= now` at which the linearized available
/// balances cross `order`'s stop-loss bound; `None` when the drift never
/// reaches it.
///
/// The linearized balance of side `x` is
/// `available_x(now) + (gain_x - loss_x) * dt` with rates in `<< 32` units,
/// and the crossing inequality is cleared of signs by moving each loss term
/// to the other side. Products are checked: a bound so extreme that the
/// 256-bit solve overflows is treated as unschedulable, and the settled
/// balance check at the next break still closes such an order.
fn crossing_candidate(
    order: &Order,
    available_a: u128,
    available_b: u128,
    drift_a: (u128, u128),
    drift_b: (u128, u128),
    now: u64,
) -> Option<u64> {
    if !order.has_stop_loss() {
        return None;
    }
    let sl_a = U256::from(order.stop_loss_a);
    let sl_b = U256::from(order.stop_loss_b);
    let (gain_a, loss_a) = drift_a;
    let (gain_b, loss_b) = drift_b;

    // output-side terms for an A->B order; B->A is the mirror image
    let scale = U256::from(FLOW_ONE);
    let out_base = U256::from(available_b).checked_mul(sl_a)?.checked_mul(scale)?;
    let in_base = U256::from(available_a).checked_mul(sl_b)?.checked_mul(scale)?;
    let out_grow = U256::from(gain_b)
        .checked_mul(sl_a)?
        .checked_add(U256::from(loss_a).checked_mul(sl_b)?)?;
    let in_grow = U256::from(gain_a)
        .checked_mul(sl_b)?
        .checked_add(U256::from(loss_b).checked_mul(sl_a)?)?;

    // crossed once lhs(dt) <= rhs(dt)
    let (lhs0, lhs_grow, rhs0, rhs_grow) = match order.direction {
        Direction::AToB => (out_base, out_grow, in_base, in_grow),
        Direction::BToA => (in_base, in_grow, out_base, out_grow),
    };

    if lhs0 <= rhs0 {
        return Some(now);
    }
    if rhs_grow <= lhs_grow {
        return None;
    }
    let gap = lhs0 - rhs0;
    let closing = rhs_grow - lhs_grow;
    let dt = (gap + closing - U256::one()) / closing;
    if dt > U256::from(u64::MAX) {
        return None;
    }
    now.checked_add(dt.as_u64())
}

// ============================================================================
// Unit Tests
// ============================================================================
