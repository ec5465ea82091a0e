//! Order types for the delayed-exchange pool.
//!
//! ## Streamed execution
//!
//! A delayed order does not execute atomically: its committed input converts
//! into the pool at a fixed flow speed over a caller-chosen period. The
//! conversion state is tracked by *anchors* that are reset at every break:
//! between breaks the order's executed input and accrued output are pure
//! linear functions of elapsed time, which is what makes claim replay from
//! break records bit-exact.
//!
//! ## Fixed-point representation
//!
//! Amounts are `u128` base units; the input flow speed is
//! `amount << 32 / period` (see [`crate::types::amount`]).

use primitive_types::U256;

use crate::error::{PoolError, PoolResult};
use crate::types::amount::{self, FLOW_SHIFT};

// ============================================================================
// Side and Direction enums
// ============================================================================

/// One token side of the pool pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// Token A side.
    A,
    /// Token B side.
    B,
}

impl Side {
    /// Returns the opposite side.
    pub fn opposite(self) -> Self {
        match self {
            Side::A => Side::B,
            Side::B => Side::A,
        }
    }
}

/// Order direction: which side is the input.
///
/// Represented as u8 where needed for record encoding:
/// - AToB = 0 (sells A into the pool, accrues B)
/// - BToA = 1 (sells B into the pool, accrues A)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    /// Input is token A, output is token B.
    #[default]
    AToB,
    /// Input is token B, output is token A.
    BToA,
}

impl Direction {
    /// Convert to u8 for record encoding.
    pub fn to_u8(self) -> u8 {
        match self {
            Direction::AToB => 0,
            Direction::BToA => 1,
        }
    }

    /// Convert from u8; `None` for out-of-range values.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Direction::AToB),
            1 => Some(Direction::BToA),
            _ => None,
        }
    }

    /// Returns the opposite direction.
    pub fn opposite(self) -> Self {
        match self {
            Direction::AToB => Direction::BToA,
            Direction::BToA => Direction::AToB,
        }
    }

    /// The side the order pays in.
    pub fn input_side(self) -> Side {
        match self {
            Direction::AToB => Side::A,
            Direction::BToA => Side::B,
        }
    }

    /// The side the order accrues.
    pub fn output_side(self) -> Side {
        self.input_side().opposite()
    }
}

// ============================================================================
// Lifecycle enums
// ============================================================================

/// Why a closed order stopped flowing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The order's absolute timeout was reached; the full input converted.
    Timeout,
    /// The pool rate crossed the order's stop-loss bound.
    StopLoss,
    /// The owner (or, after timeout, anyone) closed it explicitly.
    Manual,
}

/// Order lifecycle. Created Active, closed exactly once, claimed exactly
/// once after close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    /// In the queues, converting.
    Active,
    /// Removed from the queues; awaiting claim.
    Closed,
    /// Paid out; retained only until the close break leaves the history
    /// window.
    Claimed,
}

// ============================================================================
// Order struct
// ============================================================================

/// A streamed order and its conversion state.
///
/// The `anchor_*` fields snapshot the conversion at the last break that
/// touched the pool; `executed_in`/`executed_out` cache the most recent
/// evaluation so ledger deltas can be applied incrementally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    /// Unique order identifier; monotonic, never reused.
    pub id: u64,

    /// Owning principal.
    pub owner: u64,

    /// Which side is the input.
    pub direction: Direction,

    /// Committed input amount.
    pub amount_in: u128,

    /// Caller-chosen conversion period in seconds.
    pub period: u64,

    /// Time the order opened (its open break).
    pub open_time: u64,

    /// Absolute timeout: `open_time + period`.
    pub timeout: u64,

    /// Input flow speed, fixed at open: `amount_in << 32 / period`.
    pub in_flow_speed: u128,

    /// Stop-loss bound, token A amount. Zero together with `stop_loss_b`
    /// means no stop-loss.
    pub stop_loss_a: u128,

    /// Stop-loss bound, token B amount.
    pub stop_loss_b: u128,

    /// Chain hash of the break at which the order opened.
    pub open_hash: [u8; 32],

    /// Chain hash of the break at which the order closed; zero while active.
    pub close_hash: [u8; 32],

    /// Lifecycle status.
    pub status: OrderStatus,

    /// Close trigger; `None` while active.
    pub close_reason: Option<CloseReason>,

    /// Sequence number of the close break; 0 while active.
    pub close_seq: u64,

    // ------------------------------------------------------------------
    // Accrual anchors, reset at every break
    // ------------------------------------------------------------------
    /// Time of the last break (anchor origin).
    pub anchor_time: u64,

    /// Executed input at the anchor.
    pub anchor_in: u128,

    /// Accrued output at the anchor.
    pub anchor_out: u128,

    /// Unconverted input at the anchor.
    pub remaining_at_anchor: u128,

    /// Projected output for the remaining input, quoted at the anchor.
    pub projected_out: u128,

    /// Seconds from the anchor to the timeout.
    pub period_at_anchor: u64,

    /// Executed input at the last evaluation.
    pub executed_in: u128,

    /// Accrued output at the last evaluation.
    pub executed_out: u128,
}

impl Order {
    /// Create a new active order opening at `open_time`.
    ///
    /// Fails with [`PoolError::InvalidTimeout`] on a zero period, with
    /// [`PoolError::InvalidAmount`] on a zero amount, and with
    /// [`PoolError::ArithmeticOverflow`] when the flow speed or timeout is
    /// not representable.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: u64,
        owner: u64,
        direction: Direction,
        amount_in: u128,
        stop_loss_a: u128,
        stop_loss_b: u128,
        open_time: u64,
        period: u64,
    ) -> PoolResult<Self> {
        if period == 0 {
            return Err(PoolError::InvalidTimeout);
        }
        if amount_in == 0 || amount_in > amount::BALANCE_MAX {
            return Err(PoolError::InvalidAmount);
        }
        let in_flow_speed = amount::flow_speed(amount_in, period)?;
        let timeout = open_time
            .checked_add(period)
            .ok_or(PoolError::InvalidTimeout)?;
        Ok(Self {
            id,
            owner,
            direction,
            amount_in,
            period,
            open_time,
            timeout,
            in_flow_speed,
            stop_loss_a,
            stop_loss_b,
            open_hash: [0u8; 32],
            close_hash: [0u8; 32],
            status: OrderStatus::Active,
            close_reason: None,
            close_seq: 0,
            anchor_time: open_time,
            anchor_in: 0,
            anchor_out: 0,
            remaining_at_anchor: amount_in,
            projected_out: 0,
            period_at_anchor: period,
            executed_in: 0,
            executed_out: 0,
        })
    }

    /// Whether the order carries a stop-loss bound.
    #[inline]
    pub fn has_stop_loss(&self) -> bool {
        self.stop_loss_a > 0 && self.stop_loss_b > 0
    }

    /// Unconverted input at the last evaluation.
    #[inline]
    pub fn remaining_in(&self) -> u128 {
        self.amount_in - self.executed_in
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.status == OrderStatus::Active
    }

    /// Normalized stop-loss threshold: B-per-A rate `<< 32`.
    ///
    /// Orders without a stop-loss have no key and are never linked into the
    /// stop-loss list.
    pub fn stop_loss_key(&self) -> PoolResult<u128> {
        amount::mul_div(self.stop_loss_b, 1 << FLOW_SHIFT, self.stop_loss_a)
    }

    /// Whether the given available balances already violate the stop-loss.
    ///
    /// An `AToB` order sells A and demands at least `stop_loss_b` of B per
    /// `stop_loss_a` of A: it closes once
    /// `available_b * stop_loss_a <= available_a * stop_loss_b`.
    /// A `BToA` order is the mirror image.
    pub fn stop_loss_crossed(&self, available_a: u128, available_b: u128) -> bool {
        if !self.has_stop_loss() {
            return false;
        }
        let lhs = U256::from(available_b) * U256::from(self.stop_loss_a);
        let rhs = U256::from(available_a) * U256::from(self.stop_loss_b);
        match self.direction {
            Direction::AToB => lhs <= rhs,
            Direction::BToA => rhs <= lhs,
        }
    }

    // ------------------------------------------------------------------
    // Accrual evaluation
    // ------------------------------------------------------------------

    /// Evaluate the conversion at time `t >= anchor_time` without mutating.
    ///
    /// Returns `(executed_in, executed_out)` at `t`. At or past the anchor
    /// horizon the full remainder converts exactly (true-up: no rounding
    /// dust survives a timeout).
    pub fn evaluate_at(&self, t: u64) -> PoolResult<(u128, u128)> {
        let el = t.saturating_sub(self.anchor_time);
        if el >= self.period_at_anchor || self.period_at_anchor == 0 {
            return Ok((
                self.anchor_in + self.remaining_at_anchor,
                self.anchor_out + self.projected_out,
            ));
        }
        let converted = amount::flow_elapsed(self.in_flow_speed, el)?;
        let executed_in = self.anchor_in + converted.min(self.remaining_at_anchor);
        let executed_out = self.anchor_out
            + amount::mul_div(
                self.projected_out,
                el as u128,
                self.period_at_anchor as u128,
            )?;
        Ok((executed_in, executed_out))
    }

    /// Advance the cached evaluation to `t`, returning the `(input, output)`
    /// deltas since the previous evaluation.
    pub fn advance_to(&mut self, t: u64) -> PoolResult<(u128, u128)> {
        let (executed_in, executed_out) = self.evaluate_at(t)?;
        let d_in = executed_in - self.executed_in;
        let d_out = executed_out - self.executed_out;
        self.executed_in = executed_in;
        self.executed_out = executed_out;
        Ok((d_in, d_out))
    }

    /// Reset the anchors at a break, installing a freshly quoted projected
    /// output for the remaining input.
    pub fn requote(&mut self, time: u64, projected_out: u128) {
        self.anchor_time = time;
        self.anchor_in = self.executed_in;
        self.anchor_out = self.executed_out;
        self.remaining_at_anchor = self.amount_in - self.executed_in;
        self.projected_out = projected_out;
        self.period_at_anchor = self.timeout.saturating_sub(time);
    }

    /// Mark the order closed at a break.
    pub fn close(&mut self, reason: CloseReason, close_seq: u64, close_hash: [u8; 32]) {
        self.status = OrderStatus::Closed;
        self.close_reason = Some(reason);
        self.close_seq = close_seq;
        self.close_hash = close_hash;
    }

    /// Linearized output rate over the anchor interval, `<< 32` per second.
    ///
    /// Used only for stop-loss crossing solves; accrual itself interpolates
    /// `projected_out` directly.
    pub fn out_flow_rate(&self) -> PoolResult<u128> {
        if self.period_at_anchor == 0 {
            return Ok(0);
        }
        amount::mul_div(
            self.projected_out,
            1 << FLOW_SHIFT,
            self.period_at_anchor as u128,
        )
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
