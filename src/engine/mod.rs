//! The break engine: checkpointed settlement of streamed orders.
//!
//! ## Breaks
//!
//! A *flow break* is the only point at which conversion prices are quoted.
//! Each break advances every active order's anchors to the break time,
//! settles whatever triggered the break (an order timing out, a stop-loss
//! crossing, or a state-changing operation), requotes the surviving orders
//! against the post-settlement available balances, and appends one
//! [`BreakRecord`] to the hash chain. Between breaks, balances evolve
//! piecewise-linearly from the anchors; nothing is quoted continuously.
//!
//! Every state-changing operation forces exactly one break of its own, so
//! the chain is a complete audit trail and claim-replay intervals stay
//! linear.
//!
//! ## Pool states
//!
//! - `Active`: all operations available.
//! - `Locked`: elapsed time pinned to the last break; orders stop
//!   converting and cannot time out. Close, claim, burn and process remain
//!   usable and flag a degraded-operation event.
//! - `EmergencyLocked`: entered by governance after a fatal arithmetic
//!   failure in a forward advance; same restrictions as `Locked`, with the
//!   state pinned at the last good break.
//!
//! ## Atomicity
//!
//! Public mutating operations run against a snapshot: any error rolls the
//! pool back, so an observer never sees a partial commit.

pub mod governance;
pub mod swap;

use std::collections::HashMap;

use crate::error::{PoolError, PoolResult};
use crate::history::HistoryChain;
use crate::ledger::PoolLedger;
use crate::queue::OrderQueue;
use crate::types::amount;
use crate::types::{BreakReason, BreakRecord, CloseReason, Direction, Order, OrderStatus, Side};

/// Upper bound on breaks drained by a single call.
pub const MAX_BREAKS_PER_STEP: usize = 64;

/// How far past a predicted stop-loss crossing the exact check scans.
///
/// The crossing solver works on the linearized drift; per-order floor
/// rounding can land the true crossing a few seconds later. Anything the
/// scan misses is caught exactly at the next break.
const CROSSING_SCAN_LIMIT: u64 = 64;

/// Default swap-fee complement: 3 per mille fee.
pub const DEFAULT_NOT_FEE: u64 = 997;

// ============================================================================
// Pool status and events
// ============================================================================

/// Operating state of the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolStatus {
    /// Normal operation.
    Active,
    /// Time frozen at the last break by governance.
    Locked,
    /// Time frozen after a fatal arithmetic failure.
    EmergencyLocked,
}

/// Host-visible events, drained with [`FlowPool::take_events`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolEvent {
    /// One flow break was appended to the chain.
    FlowBreak {
        seq: u64,
        time: u64,
        reason: BreakReason,
        order_id: u64,
        available_a: u128,
        available_b: u128,
        flow_in_a: u128,
        flow_in_b: u128,
        hash: [u8; 32],
    },
    /// An operation succeeded while the pool was locked.
    DegradedOperation { time: u64, order_id: u64 },
}

// ============================================================================
// FlowPool
// ============================================================================

/// A constant-product pool with streamed orders and checkpointed
/// settlement.
///
/// Token movement is external: deposits arrive as operation parameters and
/// payouts are returned as values. All internal mutation is finalized
/// before any value is handed back to the caller.
#[derive(Debug, Clone)]
pub struct FlowPool {
    pub(crate) ledger: PoolLedger,
    pub(crate) queue: OrderQueue,
    pub(crate) history: HistoryChain,
    pub(crate) status: PoolStatus,

    /// Authorized governance principal.
    pub(crate) governor: u64,
    /// Swap fee complement per mille (997 = 0.3% fee).
    pub(crate) not_fee: u64,
    /// Fee per mille charged inside the arbitrage allowance.
    pub(crate) instant_swap_fee: u64,
    /// Per-mille share of pool growth minted to the governor.
    pub(crate) protocol_fee: u64,

    /// Time of the newest break; the frozen clock while locked.
    pub(crate) last_break_time: u64,
    /// Next order id to issue; ids start at 1 and are never reused.
    pub(crate) next_order_id: u64,

    /// Closed orders awaiting claim, and claimed orders until their close
    /// break leaves the retained window.
    pub(crate) closed: HashMap<u64, Order>,

    /// Liquidity share ledger.
    pub(crate) shares: HashMap<u64, u128>,
    pub(crate) total_shares: u128,
    /// `sqrt(available_a * available_b)` at the last liquidity event, the
    /// protocol-fee baseline.
    pub(crate) last_root_k: u128,

    events: Vec<PoolEvent>,
}

impl FlowPool {
    /// Create an empty active pool governed by `governor`.
    pub fn new(governor: u64) -> Self {
        Self {
            ledger: PoolLedger::new(),
            queue: OrderQueue::new(),
            history: HistoryChain::default(),
            status: PoolStatus::Active,
            governor,
            not_fee: DEFAULT_NOT_FEE,
            instant_swap_fee: 0,
            protocol_fee: 0,
            last_break_time: 0,
            next_order_id: 1,
            closed: HashMap::new(),
            shares: HashMap::new(),
            total_shares: 0,
            last_root_k: 0,
            events: Vec::new(),
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    #[inline]
    pub fn status(&self) -> PoolStatus {
        self.status
    }

    #[inline]
    pub fn governor(&self) -> u64 {
        self.governor
    }

    #[inline]
    pub fn not_fee(&self) -> u64 {
        self.not_fee
    }

    #[inline]
    pub fn total(&self, side: Side) -> u128 {
        self.ledger.total(side)
    }

    #[inline]
    pub fn locked(&self, side: Side) -> u128 {
        self.ledger.locked(side)
    }

    #[inline]
    pub fn available(&self, side: Side) -> u128 {
        self.ledger.available(side)
    }

    #[inline]
    pub fn flow_in(&self, side: Side) -> u128 {
        self.ledger.flow_in(side)
    }

    #[inline]
    pub fn breaks_count(&self) -> u64 {
        self.history.breaks_count()
    }

    #[inline]
    pub fn last_break_hash(&self) -> [u8; 32] {
        self.history.last_hash()
    }

    /// The break history window, for claimants assembling record spans.
    #[inline]
    pub fn history(&self) -> &HistoryChain {
        &self.history
    }

    /// Number of active orders.
    #[inline]
    pub fn active_orders(&self) -> usize {
        self.queue.len()
    }

    /// Look up an order, active or retained.
    pub fn order(&self, id: u64) -> Option<&Order> {
        self.queue.get(id).or_else(|| self.closed.get(&id))
    }

    /// Liquidity shares held by `owner`.
    pub fn shares_of(&self, owner: u64) -> u128 {
        self.shares.get(&owner).copied().unwrap_or(0)
    }

    #[inline]
    pub fn total_shares(&self) -> u128 {
        self.total_shares
    }

    /// Drain accumulated events.
    pub fn take_events(&mut self) -> Vec<PoolEvent> {
        std::mem::take(&mut self.events)
    }

    /// Pool clock for an operation: `now`, never earlier than the last
    /// break, and frozen at the last break while locked.
    pub fn effective_now(&self, now: u64) -> u64 {
        match self.status {
            PoolStatus::Active => now.max(self.last_break_time),
            PoolStatus::Locked | PoolStatus::EmergencyLocked => self.last_break_time,
        }
    }

    // ========================================================================
    // Public operations
    // ========================================================================

    /// Open a streamed order converting `amount_in` over `period` seconds.
    ///
    /// Both stop-loss bounds must be zero (no bound) or both positive; a
    /// bound the current rate already violates is rejected with
    /// [`PoolError::InvalidExchangeRate`]. Forces an `OrderOpen` break and
    /// returns the order id.
    #[allow(clippy::too_many_arguments)]
    pub fn add_order(
        &mut self,
        now: u64,
        owner: u64,
        direction: Direction,
        stop_loss_a: u128,
        stop_loss_b: u128,
        amount_in: u128,
        period: u64,
    ) -> PoolResult<u64> {
        self.transactional(|pool| {
            pool.add_order_inner(now, owner, direction, stop_loss_a, stop_loss_b, amount_in, period)
        })
    }

    /// Close an order before its timeout.
    ///
    /// The owner may close at any time; anyone may close once the timeout
    /// has passed on the pool clock. Allowed while locked (degraded).
    pub fn close_order(&mut self, now: u64, caller: u64, id: u64) -> PoolResult<()> {
        self.transactional(|pool| pool.close_order_inner(now, caller, id))
    }

    /// Drain due breaks up to `now`. Idempotent; bounded per call by
    /// [`MAX_BREAKS_PER_STEP`]; a no-op while locked or when nothing is
    /// due. Returns the number of breaks drained.
    pub fn process_delayed_orders(&mut self, now: u64) -> PoolResult<usize> {
        self.transactional(|pool| {
            let eff = pool.effective_now(now);
            pool.drain(eff)
        })
    }

    /// Claim a closed order by replaying its break-record span.
    ///
    /// `records` must run contiguously from the order's open break to its
    /// close break; the replayed execution must reproduce the engine's
    /// settled totals exactly. Returns `(accrued_output, input_refund)`.
    pub fn claim_order(
        &mut self,
        open_hash: [u8; 32],
        records: &[BreakRecord],
    ) -> PoolResult<(u128, u128)> {
        self.transactional(|pool| pool.claim_order_inner(open_hash, records))
    }

    // ========================================================================
    // Operation bodies
    // ========================================================================

    fn add_order_inner(
        &mut self,
        now: u64,
        owner: u64,
        direction: Direction,
        stop_loss_a: u128,
        stop_loss_b: u128,
        amount_in: u128,
        period: u64,
    ) -> PoolResult<u64> {
        if self.status != PoolStatus::Active {
            return Err(PoolError::LockedPool);
        }
        if (stop_loss_a == 0) != (stop_loss_b == 0) {
            return Err(PoolError::InvalidExchangeRate);
        }
        let eff = self.effective_now(now);
        self.drain_for_break(eff)?;
        self.settle_to(eff)?;

        let id = self.next_order_id;
        let order = Order::new(id, owner, direction, amount_in, stop_loss_a, stop_loss_b, eff, period)?;
        if order.stop_loss_crossed(self.ledger.available(Side::A), self.ledger.available(Side::B)) {
            return Err(PoolError::InvalidExchangeRate);
        }
        self.next_order_id += 1;

        let input = direction.input_side();
        self.ledger.deposit(input, amount_in)?;
        self.ledger.lock(input, amount_in)?;
        self.ledger.add_flow_in(input, order.in_flow_speed)?;
        self.queue.insert(order)?;

        let hash = self.finish_break(eff, BreakReason::OrderOpen, id)?;
        self.queue
            .get_mut(id)
            .ok_or(PoolError::UnknownOrder)?
            .open_hash = hash;
        Ok(id)
    }

    fn close_order_inner(&mut self, now: u64, caller: u64, id: u64) -> PoolResult<()> {
        let eff = self.effective_now(now);

        if !self.queue.contains(id) {
            return Err(match self.closed.get(&id) {
                Some(order) if order.status == OrderStatus::Claimed => PoolError::AlreadyClaimed,
                Some(_) => PoolError::OrderNotReady,
                None if id > 0 && id < self.next_order_id => PoolError::AlreadyClaimed,
                None => PoolError::UnknownOrder,
            });
        }
        let order = self.queue.get(id).ok_or(PoolError::UnknownOrder)?;
        if caller != order.owner && eff < order.timeout {
            return Err(PoolError::Unauthorized);
        }

        if self.status == PoolStatus::Active {
            self.drain_for_break(eff)?;
            if !self.queue.contains(id) {
                // the drain expired it on its own trigger
                return Ok(());
            }
        }
        self.close_queued(eff, id, CloseReason::Manual, BreakReason::OrderClosed)?;
        if self.status != PoolStatus::Active {
            self.events.push(PoolEvent::DegradedOperation { time: eff, order_id: id });
        }
        Ok(())
    }

    fn claim_order_inner(
        &mut self,
        open_hash: [u8; 32],
        records: &[BreakRecord],
    ) -> PoolResult<(u128, u128)> {
        let first = records.first().ok_or(PoolError::ProofInvalid)?;
        let id = first.order_id;
        if self.queue.contains(id) {
            return Err(PoolError::OrderNotReady);
        }
        let order = match self.closed.get(&id) {
            Some(order) => order.clone(),
            None if id > 0 && id < self.next_order_id => return Err(PoolError::AlreadyClaimed),
            None => return Err(PoolError::UnknownOrder),
        };
        if order.status == OrderStatus::Claimed {
            return Err(PoolError::AlreadyClaimed);
        }

        let (executed_in, executed_out) = replay_execution(&order, open_hash, records)?;
        if executed_in != order.executed_in || executed_out != order.executed_out {
            return Err(PoolError::ProofInvalid);
        }

        let refund = order.amount_in - executed_in;
        let direction = order.direction;
        self.ledger.payout_locked(direction.output_side(), executed_out)?;
        self.ledger.payout_locked(direction.input_side(), refund)?;
        if let Some(stored) = self.closed.get_mut(&id) {
            stored.status = OrderStatus::Claimed;
        }
        if self.status != PoolStatus::Active {
            self.events.push(PoolEvent::DegradedOperation {
                time: self.last_break_time,
                order_id: id,
            });
        }
        Ok((executed_out, refund))
    }

    // ========================================================================
    // Break machinery
    // ========================================================================

    /// Run `f` against the pool, rolling back to a snapshot on any error.
    pub(crate) fn transactional<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> PoolResult<T>,
    ) -> PoolResult<T> {
        let snapshot = self.clone();
        match f(self) {
            Ok(value) => Ok(value),
            Err(err) => {
                *self = snapshot;
                Err(err)
            }
        }
    }

    /// Drain scheduled breaks (timeouts and stop-loss crossings) up to
    /// `eff`, at most [`MAX_BREAKS_PER_STEP`] of them.
    pub(crate) fn drain(&mut self, eff: u64) -> PoolResult<usize> {
        let mut drained = 0usize;
        while drained < MAX_BREAKS_PER_STEP {
            let timeout = self
                .queue
                .first_timeout()
                .filter(|&(t, _)| t <= eff)
                .map(|(t, id)| (t, id, true));
            let crossing = self
                .verified_crossing(eff)?
                .map(|(t, id)| (t, id, false));

            let trigger = match (timeout, crossing) {
                (Some(a), Some(b)) => Some(if (a.0, a.1) <= (b.0, b.1) { a } else { b }),
                (Some(a), None) => Some(a),
                (None, Some(b)) => Some(b),
                (None, None) => None,
            };
            let Some((time, id, is_timeout)) = trigger else {
                break;
            };

            let (close_reason, break_reason) = if is_timeout {
                (CloseReason::Timeout, BreakReason::OrderTimeout)
            } else {
                (CloseReason::StopLoss, BreakReason::OrderStopLoss)
            };
            self.close_queued(time, id, close_reason, break_reason)?;
            drained += 1;
        }
        Ok(drained)
    }

    /// Drain everything due before an operation chains its own break.
    ///
    /// The per-call bound can leave a backlog, and an operation break
    /// appended over a still-queued earlier trigger would put the chain
    /// out of time order. The operation is refused (retryable) until
    /// [`FlowPool::process_delayed_orders`] has cleared the backlog.
    pub(crate) fn drain_for_break(&mut self, eff: u64) -> PoolResult<()> {
        self.drain(eff)?;
        let timeout_due = self
            .queue
            .first_timeout()
            .map_or(false, |(t, _)| t <= eff);
        if timeout_due || self.verified_crossing(eff)?.is_some() {
            return Err(PoolError::OrderNotReady);
        }
        Ok(())
    }

    /// Close an active order at `time`: settle, splice out, requote, chain.
    fn close_queued(
        &mut self,
        time: u64,
        id: u64,
        close_reason: CloseReason,
        break_reason: BreakReason,
    ) -> PoolResult<()> {
        self.settle_to(time)?;
        let mut order = self.queue.remove(id).ok_or(PoolError::UnknownOrder)?;
        self.ledger
            .sub_flow_in(order.direction.input_side(), order.in_flow_speed)?;

        let seq = self.history.breaks_count();
        let hash = self.finish_break(time, break_reason, id)?;
        order.close(close_reason, seq, hash);
        self.closed.insert(id, order);
        Ok(())
    }

    /// Advance every active order's accrual to `t` and apply the ledger
    /// deltas: input released into availability, output locked away.
    pub(crate) fn settle_to(&mut self, t: u64) -> PoolResult<()> {
        for id in self.queue.ids_by_timeout() {
            let (d_in, d_out, direction) = {
                let order = self.queue.get_mut(id).ok_or(PoolError::UnknownOrder)?;
                let (d_in, d_out) = order.advance_to(t)?;
                (d_in, d_out, order.direction)
            };
            self.ledger.release_input(direction.input_side(), d_in)?;
            self.ledger.accrue_output(direction.output_side(), d_out)?;
        }
        Ok(())
    }

    /// Requote every active order at `time` against the settled available
    /// balances (one constant-product quote per direction, split pro rata),
    /// then append the break record and refresh events and GC.
    pub(crate) fn finish_break(
        &mut self,
        time: u64,
        reason: BreakReason,
        order_id: u64,
    ) -> PoolResult<[u8; 32]> {
        // while locked the clock is pinned and projections are frozen, so
        // only an active pool requotes
        if self.status == PoolStatus::Active {
            self.requote_all(time)?;
        }
        self.chain_break(time, reason, order_id)
    }

    /// Append the break record for the current state without requoting.
    ///
    /// The emergency transition calls this directly: the quote path is
    /// exactly what failed, and the state stays pinned as-is.
    pub(crate) fn chain_break(
        &mut self,
        time: u64,
        reason: BreakReason,
        order_id: u64,
    ) -> PoolResult<[u8; 32]> {
        let available_a = self.ledger.available(Side::A);
        let available_b = self.ledger.available(Side::B);
        let flow_in_a = self.ledger.flow_in(Side::A);
        let flow_in_b = self.ledger.flow_in(Side::B);
        let record = BreakRecord {
            time,
            reason_raw: reason.to_u8(),
            order_id,
            available_a,
            available_b,
            committed_a: self.queue.committed(Direction::AToB),
            committed_b: self.queue.committed(Direction::BToA),
            flow_in_a,
            flow_in_b,
            not_fee: self.not_fee,
            ..Default::default()
        };
        let seq = self.history.breaks_count();
        let hash = self.history.append(record)?;
        self.last_break_time = time;

        log::trace!(
            "flow break seq={} time={} reason={:?} order={} avail=({}, {})",
            seq,
            time,
            reason,
            order_id,
            available_a,
            available_b,
        );
        self.events.push(PoolEvent::FlowBreak {
            seq,
            time,
            reason,
            order_id,
            available_a,
            available_b,
            flow_in_a,
            flow_in_b,
            hash,
        });

        self.gc_claimed();
        Ok(hash)
    }

    pub(crate) fn requote_all(&mut self, time: u64) -> PoolResult<()> {
        let committed_a = self.queue.committed(Direction::AToB);
        let committed_b = self.queue.committed(Direction::BToA);
        let available_a = self.ledger.available(Side::A);
        let available_b = self.ledger.available(Side::B);

        let total_out_ab = if committed_a > 0 {
            swap::cp_quote(committed_a, available_a, available_b, self.not_fee)?
        } else {
            0
        };
        let total_out_ba = if committed_b > 0 {
            swap::cp_quote(committed_b, available_b, available_a, self.not_fee)?
        } else {
            0
        };

        let mut rate_a = 0u128;
        let mut rate_b = 0u128;
        for id in self.queue.ids_by_timeout() {
            let direction = self.queue.get(id).ok_or(PoolError::UnknownOrder)?.direction;
            let (committed, total_out) = match direction {
                Direction::AToB => (committed_a, total_out_ab),
                Direction::BToA => (committed_b, total_out_ba),
            };
            let order = self.queue.get_mut(id).ok_or(PoolError::UnknownOrder)?;
            let remaining = order.remaining_in();
            let projected = if committed > 0 {
                amount::mul_div(total_out, remaining, committed)?
            } else {
                0
            };
            order.requote(time, projected);
            let rate = order.out_flow_rate()?;
            match direction {
                Direction::AToB => {
                    rate_b = rate_b.checked_add(rate).ok_or(PoolError::ArithmeticOverflow)?;
                }
                Direction::BToA => {
                    rate_a = rate_a.checked_add(rate).ok_or(PoolError::ArithmeticOverflow)?;
                }
            }
        }
        self.ledger.set_out_rates(rate_a, rate_b);
        Ok(())
    }

    /// Exact available balances at `t` within the current interval, without
    /// mutating any order.
    fn available_at(&self, t: u64) -> PoolResult<(u128, u128)> {
        let mut available_a = self.ledger.available(Side::A);
        let mut available_b = self.ledger.available(Side::B);
        for order in self.queue.iter() {
            let (executed_in, executed_out) = order.evaluate_at(t)?;
            let d_in = executed_in - order.executed_in;
            let d_out = executed_out - order.executed_out;
            match order.direction {
                Direction::AToB => {
                    available_a = amount::balance_add(available_a, d_in)?;
                    available_b = amount::balance_sub(available_b, d_out)?;
                }
                Direction::BToA => {
                    available_b = amount::balance_add(available_b, d_in)?;
                    available_a = amount::balance_sub(available_a, d_out)?;
                }
            }
        }
        Ok((available_a, available_b))
    }

    /// Earliest exact stop-loss crossing at or after the linear estimate,
    /// within `eff` and before the next timeout.
    fn verified_crossing(&self, eff: u64) -> PoolResult<Option<(u64, u64)>> {
        let Some((estimate, _)) = self
            .queue
            .next_stop_loss_crossing(&self.ledger, self.last_break_time)
        else {
            return Ok(None);
        };
        let horizon = self
            .queue
            .first_timeout()
            .map_or(eff, |(t, _)| t.min(eff));
        let mut t = estimate.max(self.last_break_time);
        let mut scanned = 0u64;
        while t <= horizon && scanned <= CROSSING_SCAN_LIMIT {
            let (available_a, available_b) = self.available_at(t)?;
            if let Some(id) = self.queue.stop_loss_triggered(available_a, available_b) {
                return Ok(Some((t, id)));
            }
            t += 1;
            scanned += 1;
        }
        Ok(None)
    }

    /// Drop claimed orders whose close break left the retained window.
    fn gc_claimed(&mut self) {
        let history = &self.history;
        self.closed
            .retain(|_, order| {
                order.status != OrderStatus::Claimed || history.contains_seq(order.close_seq)
            });
    }
}

// ============================================================================
// Claim replay
// ============================================================================

/// Replay an order's execution across a contiguous record span, returning
/// the integrated `(executed_in, executed_out)`.
///
/// The replay uses the same accrual helpers as the engine: per interval the
/// direction's total output is re-quoted from the record's balances and
/// split pro rata over its committed input, and the order's slice is
/// interpolated linearly. A genuine span therefore reproduces the engine's
/// settled totals bit-for-bit.
fn replay_execution(
    order: &Order,
    open_hash: [u8; 32],
    records: &[BreakRecord],
) -> PoolResult<(u128, u128)> {
    let first = records.first().ok_or(PoolError::ProofInvalid)?;
    if first.reason() != Some(BreakReason::OrderOpen) || first.order_id != order.id {
        return Err(PoolError::ProofInvalid);
    }
    let mut prev_hash = first.chain_hash()?;
    if prev_hash != open_hash || prev_hash != order.open_hash {
        return Err(PoolError::ProofInvalid);
    }

    let mut executed_in = 0u128;
    let mut executed_out = 0u128;
    let mut remaining = order.amount_in;
    let mut prev = first;

    for (offset, record) in records.iter().enumerate().skip(1) {
        if record.seq != prev.seq + 1 || record.prev_hash != prev_hash || record.time < prev.time {
            return Err(PoolError::ProofInvalid);
        }
        let hash = record.chain_hash()?;

        // integrate the interval [prev.time, record.time)
        let (avail_in, avail_out, committed) = match order.direction {
            Direction::AToB => (prev.available_a, prev.available_b, prev.committed_a),
            Direction::BToA => (prev.available_b, prev.available_a, prev.committed_b),
        };
        let projected = if committed > 0 && remaining > 0 {
            let total_out = swap::cp_quote(committed, avail_in, avail_out, prev.not_fee)?;
            amount::mul_div(total_out, remaining, committed)?
        } else {
            0
        };
        let period = order.timeout.saturating_sub(prev.time);
        let el = record.time - prev.time;
        let (d_in, d_out) = if period == 0 || el >= period {
            (remaining, projected)
        } else {
            let converted = amount::flow_elapsed(order.in_flow_speed, el)?;
            (
                converted.min(remaining),
                amount::mul_div(projected, el as u128, period as u128)?,
            )
        };
        executed_in += d_in;
        executed_out += d_out;
        remaining -= d_in;

        if record.closes(order.id) {
            if hash != order.close_hash || offset != records.len() - 1 {
                return Err(PoolError::ProofInvalid);
            }
            return Ok((executed_in, executed_out));
        }
        prev_hash = hash;
        prev = record;
    }
    // span never reached the close break
    Err(PoolError::ProofInvalid)
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_pool() -> FlowPool {
        let mut pool = FlowPool::new(1);
        pool.mint(0, 1, 150, 200).unwrap();
        pool
    }

    #[test]
    fn test_add_order_opens_break() {
        let mut pool = seeded_pool();
        let id = pool
            .add_order(10, 7, Direction::AToB, 0, 0, 100, 10)
            .unwrap();
        assert_eq!(id, 1);
        assert_eq!(pool.total(Side::A), 250);
        assert_eq!(pool.locked(Side::A), 100);
        assert_eq!(pool.available(Side::A), 150);
        assert_eq!(pool.breaks_count(), 2); // mint + open
        let order = pool.order(id).unwrap();
        assert_ne!(order.open_hash, [0u8; 32]);
        assert_eq!(order.open_hash, pool.last_break_hash());
    }

    #[test]
    fn test_add_order_rejects_mixed_stop_loss() {
        let mut pool = seeded_pool();
        assert_eq!(
            pool.add_order(10, 7, Direction::AToB, 5, 0, 100, 10),
            Err(PoolError::InvalidExchangeRate)
        );
    }

    #[test]
    fn test_add_order_rejects_crossed_stop_loss() {
        let mut pool = seeded_pool();
        // pool rate is 200/150 = 1.33 B per A; demanding >= 2 B per A is
        // already violated
        assert_eq!(
            pool.add_order(10, 7, Direction::AToB, 1, 2, 100, 10),
            Err(PoolError::InvalidExchangeRate)
        );
        // rollback left no trace
        assert_eq!(pool.breaks_count(), 1);
        assert_eq!(pool.total(Side::A), 150);
    }

    #[test]
    fn test_timeout_drain_converts_fully() {
        let mut pool = seeded_pool();
        pool.add_order(0, 7, Direction::AToB, 0, 0, 100, 10).unwrap();

        let drained = pool.process_delayed_orders(100).unwrap();
        assert_eq!(drained, 1);

        let expected_out = 100u128 * 997 * 200 / (150 * 1000 + 100 * 997);
        let order = pool.order(1).unwrap();
        assert_eq!(order.status, OrderStatus::Closed);
        assert_eq!(order.close_reason, Some(CloseReason::Timeout));
        assert_eq!(order.executed_in, 100);
        assert_eq!(order.executed_out, expected_out);
        // input fully released, output locked for the claim
        assert_eq!(pool.available(Side::A), 250);
        assert_eq!(pool.locked(Side::A), 0);
        assert_eq!(pool.locked(Side::B), expected_out);
        assert_eq!(pool.flow_in(Side::A), 0);
    }

    #[test]
    fn test_half_elapse_releases_half_input() {
        let mut pool = seeded_pool();
        pool.add_order(0, 7, Direction::AToB, 0, 0, 100, 10).unwrap();

        // a mid-flight break settles the linear accrual
        pool.process_delayed_orders(5).unwrap(); // nothing due yet
        assert_eq!(pool.locked(Side::A), 100); // no break, no settle observable

        // force a break at t=5 through a second order
        pool.add_order(5, 8, Direction::BToA, 0, 0, 10, 100).unwrap();
        assert_eq!(pool.locked(Side::A), 50);
        assert_eq!(pool.available(Side::A), 200);
    }

    #[test]
    fn test_process_idempotent() {
        let mut pool = seeded_pool();
        pool.add_order(0, 7, Direction::AToB, 0, 0, 100, 10).unwrap();
        assert_eq!(pool.process_delayed_orders(100).unwrap(), 1);
        assert_eq!(pool.process_delayed_orders(100).unwrap(), 0);
        assert_eq!(pool.process_delayed_orders(200).unwrap(), 0);
    }

    #[test]
    fn test_close_order_authorization() {
        let mut pool = seeded_pool();
        let id = pool.add_order(0, 7, Direction::AToB, 0, 0, 100, 10).unwrap();

        // a stranger cannot close before the timeout
        assert_eq!(pool.close_order(5, 99, id), Err(PoolError::Unauthorized));
        // the owner can
        pool.close_order(5, 7, id).unwrap();
        let order = pool.order(id).unwrap();
        assert_eq!(order.close_reason, Some(CloseReason::Manual));
        assert_eq!(order.executed_in, 50);
        // closing again is rejected
        assert_eq!(pool.close_order(6, 7, id), Err(PoolError::OrderNotReady));
        assert_eq!(pool.close_order(6, 7, 42), Err(PoolError::UnknownOrder));
    }

    #[test]
    fn test_close_after_timeout_by_anyone() {
        let mut pool = seeded_pool();
        let id = pool.add_order(0, 7, Direction::AToB, 0, 0, 100, 10).unwrap();
        // the drain inside close_order expires the order first; the close
        // then reports success without a second break
        pool.close_order(50, 99, id).unwrap();
        let order = pool.order(id).unwrap();
        assert_eq!(order.close_reason, Some(CloseReason::Timeout));
    }

    #[test]
    fn test_claim_single_interval() {
        let mut pool = seeded_pool();
        let id = pool.add_order(0, 7, Direction::AToB, 0, 0, 100, 10).unwrap();
        let open_hash = pool.order(id).unwrap().open_hash;
        pool.process_delayed_orders(100).unwrap();

        let records: Vec<BreakRecord> = pool.history().records().cloned().collect();
        // span: open break .. close break
        let span = &records[1..];
        assert_eq!(span.len(), 2);

        let expected_out = 100u128 * 997 * 200 / (150 * 1000 + 100 * 997);
        let total_b = pool.total(Side::B);
        let (out, refund) = pool.claim_order(open_hash, span).unwrap();
        assert_eq!(out, expected_out);
        assert_eq!(refund, 0);
        assert_eq!(pool.total(Side::B), total_b - expected_out);
        assert_eq!(pool.locked(Side::B), 0);

        // double claim
        assert_eq!(
            pool.claim_order(open_hash, span),
            Err(PoolError::AlreadyClaimed)
        );
    }

    #[test]
    fn test_claim_active_order_not_ready() {
        let mut pool = seeded_pool();
        let id = pool.add_order(0, 7, Direction::AToB, 0, 0, 100, 10).unwrap();
        let open_hash = pool.order(id).unwrap().open_hash;
        let records: Vec<BreakRecord> = pool.history().records().cloned().collect();
        assert_eq!(
            pool.claim_order(open_hash, &records[1..]),
            Err(PoolError::OrderNotReady)
        );
    }

    #[test]
    fn test_claim_rejects_tampered_span() {
        let mut pool = seeded_pool();
        let id = pool.add_order(0, 7, Direction::AToB, 0, 0, 100, 10).unwrap();
        let open_hash = pool.order(id).unwrap().open_hash;
        pool.process_delayed_orders(100).unwrap();

        let records: Vec<BreakRecord> = pool.history().records().cloned().collect();
        let mut span: Vec<BreakRecord> = records[1..].to_vec();
        span[1].available_b += 1;
        assert_eq!(
            pool.claim_order(open_hash, &span),
            Err(PoolError::ProofInvalid)
        );
        // wrong open hash
        assert_eq!(
            pool.claim_order([9u8; 32], &records[1..]),
            Err(PoolError::ProofInvalid)
        );
    }

    #[test]
    fn test_stop_loss_closes_on_rate_move() {
        let mut pool = seeded_pool();
        // demands at least 1 B per A; current rate 200/150 is fine
        let id = pool
            .add_order(0, 7, Direction::AToB, 1, 1, 100, 100)
            .unwrap();
        // a large swap pushes the rate below 1 B per A
        pool.swap(1, 9, Direction::AToB, 200, 0).unwrap();
        pool.process_delayed_orders(2).unwrap();

        let order = pool.order(id).unwrap();
        assert_eq!(order.status, OrderStatus::Closed);
        assert_eq!(order.close_reason, Some(CloseReason::StopLoss));
        // partial conversion leaves a refundable remainder
        assert!(order.executed_in < 100);
    }

    #[test]
    fn test_events_and_chain_grow_together() {
        let mut pool = seeded_pool();
        pool.take_events();
        pool.add_order(0, 7, Direction::AToB, 0, 0, 100, 10).unwrap();
        pool.process_delayed_orders(100).unwrap();

        let events = pool.take_events();
        let breaks: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                PoolEvent::FlowBreak { seq, reason, .. } => Some((*seq, *reason)),
                _ => None,
            })
            .collect();
        assert_eq!(
            breaks,
            vec![(1, BreakReason::OrderOpen), (2, BreakReason::OrderTimeout)]
        );
        assert_eq!(pool.breaks_count(), 3);
        assert!(pool.take_events().is_empty());
    }

    #[test]
    fn test_flow_speed_consistency() {
        let mut pool = seeded_pool();
        pool.add_order(0, 7, Direction::AToB, 0, 0, 100, 10).unwrap();
        pool.add_order(0, 8, Direction::AToB, 0, 0, 60, 20).unwrap();
        pool.add_order(0, 9, Direction::BToA, 0, 0, 40, 10).unwrap();

        let expected_a = amount::flow_speed(100, 10).unwrap() + amount::flow_speed(60, 20).unwrap();
        assert_eq!(pool.flow_in(Side::A), expected_a);
        assert_eq!(pool.flow_in(Side::B), amount::flow_speed(40, 10).unwrap());

        pool.process_delayed_orders(30).unwrap();
        assert_eq!(pool.flow_in(Side::A), 0);
        assert_eq!(pool.flow_in(Side::B), 0);
    }

    #[test]
    fn test_backlog_defers_operation_breaks() {
        let mut pool = FlowPool::new(1);
        pool.mint(0, 1, 100_000, 200_000).unwrap();
        for i in 1..=70u64 {
            pool.add_order(0, 100 + i, Direction::AToB, 0, 0, 100, i)
                .unwrap();
        }

        // more expired orders than one drain step handles: the swap must
        // not chain its break over the still-queued earlier triggers
        assert_eq!(
            pool.swap(1_000, 9, Direction::AToB, 50, 0),
            Err(PoolError::OrderNotReady)
        );
        assert_eq!(pool.active_orders(), 70); // rolled back

        assert_eq!(
            pool.process_delayed_orders(1_000).unwrap(),
            MAX_BREAKS_PER_STEP
        );
        assert_eq!(pool.process_delayed_orders(1_000).unwrap(), 6);
        pool.swap(1_000, 9, Direction::AToB, 50, 0).unwrap();

        // record times never regress across the whole chain
        let times: Vec<u64> = pool.history().records().map(|r| r.time).collect();
        assert!(times.windows(2).all(|w| w[0] <= w[1]));

        // the last order to expire still claims its genuine span
        let order = pool.order(70).unwrap().clone();
        let open_seq = pool
            .history()
            .records()
            .find(|r| r.order_id == 70 && r.reason() == Some(BreakReason::OrderOpen))
            .unwrap()
            .seq;
        let span: Vec<BreakRecord> = pool
            .history()
            .records()
            .filter(|r| r.seq >= open_seq && r.seq <= order.close_seq)
            .cloned()
            .collect();
        let (out, refund) = pool.claim_order(order.open_hash, &span).unwrap();
        assert_eq!(out, order.executed_out);
        assert_eq!(refund, 0);
    }
}
