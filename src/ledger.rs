//! Pool ledger: total/locked balances and aggregate flow speeds.
//!
//! ## Balance model
//!
//! Each token side carries a *total* balance (everything the pool holds)
//! and a *locked* balance (the portion committed to active order flow:
//! un-converted input plus accrued, un-claimed output). The difference is
//! the *available* balance that instant swaps and liquidity operations may
//! touch.
//!
//! Order flow never changes totals. Advancing time only moves value between
//! the locked and available partitions:
//! - releasing input: an order's converted input stops being the order's
//!   property and joins the pool (`locked` down, available up);
//! - accruing output: the pool sets aside output for the order
//!   (`locked` up, available down).
//!
//! Totals move only on deposits, withdrawals, swap payouts and claims.
//!
//! ## Overflow policy
//!
//! Every mutation is checked. Caller-parameter violations (overdrawing the
//! available balance, syncing a total below the locked balance) surface as
//! [`InvalidAmount`](crate::error::PoolError::InvalidAmount) and are fixed
//! by retrying with corrected inputs. Genuine representation failures
//! surface as
//! [`ArithmeticOverflow`](crate::error::PoolError::ArithmeticOverflow)
//! and the engine treats them as fatal (§ emergency lock).

use crate::error::{PoolError, PoolResult};
use crate::types::amount;
use crate::types::order::Side;

/// Balance and flow-speed ledger for one pool.
///
/// `flow_in_*` hold the sum of active orders' input flow speeds per input
/// side (the flow-speed consistency invariant); `out_rate_*` hold the
/// linearized output-accrual rates per output side, refreshed at every
/// requote and used only for stop-loss crossing solves.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolLedger {
    /// Total balance of side A.
    total_a: u128,
    /// Total balance of side B.
    total_b: u128,
    /// Balance of side A committed to active order flow.
    locked_a: u128,
    /// Balance of side B committed to active order flow.
    locked_b: u128,
    /// Sum of input flow speeds of A→B orders (`<< 32`).
    flow_in_a: u128,
    /// Sum of input flow speeds of B→A orders (`<< 32`).
    flow_in_b: u128,
    /// Linearized output-accrual rate into locked A (`<< 32`).
    out_rate_a: u128,
    /// Linearized output-accrual rate into locked B (`<< 32`).
    out_rate_b: u128,
}

impl PoolLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Total balance of a side.
    #[inline]
    pub fn total(&self, side: Side) -> u128 {
        match side {
            Side::A => self.total_a,
            Side::B => self.total_b,
        }
    }

    /// Locked balance of a side.
    #[inline]
    pub fn locked(&self, side: Side) -> u128 {
        match side {
            Side::A => self.locked_a,
            Side::B => self.locked_b,
        }
    }

    /// Available balance: `total - locked`. Never underflows by invariant.
    #[inline]
    pub fn available(&self, side: Side) -> u128 {
        self.total(side) - self.locked(side)
    }

    /// Aggregate input flow speed of orders paying in `side`.
    #[inline]
    pub fn flow_in(&self, side: Side) -> u128 {
        match side {
            Side::A => self.flow_in_a,
            Side::B => self.flow_in_b,
        }
    }

    /// Linearized output-accrual rate into `side`'s locked balance.
    #[inline]
    pub fn out_rate(&self, side: Side) -> u128 {
        match side {
            Side::A => self.out_rate_a,
            Side::B => self.out_rate_b,
        }
    }

    fn total_mut(&mut self, side: Side) -> &mut u128 {
        match side {
            Side::A => &mut self.total_a,
            Side::B => &mut self.total_b,
        }
    }

    fn locked_mut(&mut self, side: Side) -> &mut u128 {
        match side {
            Side::A => &mut self.locked_a,
            Side::B => &mut self.locked_b,
        }
    }

    fn flow_in_mut(&mut self, side: Side) -> &mut u128 {
        match side {
            Side::A => &mut self.flow_in_a,
            Side::B => &mut self.flow_in_b,
        }
    }

    // ========================================================================
    // Deposits and withdrawals (totals move)
    // ========================================================================

    /// Credit an external deposit to a side's total.
    pub fn deposit(&mut self, side: Side, amount: u128) -> PoolResult<()> {
        *self.total_mut(side) = amount::balance_add(self.total(side), amount)?;
        Ok(())
    }

    /// Debit an amount from a side's *available* balance.
    ///
    /// Overdrawing is a parameter error, not an arithmetic failure.
    pub fn withdraw_available(&mut self, side: Side, amount: u128) -> PoolResult<()> {
        if amount > self.available(side) {
            return Err(PoolError::InvalidAmount);
        }
        *self.total_mut(side) = amount::balance_sub(self.total(side), amount)?;
        Ok(())
    }

    /// Force a side's total to an externally observed value (sync).
    ///
    /// A total beyond the representable range is a representation failure;
    /// one below the locked balance is a parameter error.
    pub fn set_total(&mut self, side: Side, total: u128) -> PoolResult<()> {
        if total > amount::BALANCE_MAX {
            return Err(PoolError::ArithmeticOverflow);
        }
        if total < self.locked(side) {
            return Err(PoolError::InvalidAmount);
        }
        *self.total_mut(side) = total;
        Ok(())
    }

    // ========================================================================
    // Lock partition (order flow; totals fixed)
    // ========================================================================

    /// Commit an amount of a side's balance to order flow.
    ///
    /// Used at order open, right after the matching deposit.
    pub fn lock(&mut self, side: Side, amount: u128) -> PoolResult<()> {
        let locked = amount::balance_add(self.locked(side), amount)?;
        if locked > self.total(side) {
            return Err(PoolError::ArithmeticOverflow);
        }
        *self.locked_mut(side) = locked;
        Ok(())
    }

    /// Release converted input into the pool: locked down, available up.
    pub fn release_input(&mut self, side: Side, amount: u128) -> PoolResult<()> {
        *self.locked_mut(side) = amount::balance_sub(self.locked(side), amount)?;
        Ok(())
    }

    /// Set aside accrued output for an order: locked up, available down.
    pub fn accrue_output(&mut self, side: Side, amount: u128) -> PoolResult<()> {
        let locked = amount::balance_add(self.locked(side), amount)?;
        if locked > self.total(side) {
            return Err(PoolError::ArithmeticOverflow);
        }
        *self.locked_mut(side) = locked;
        Ok(())
    }

    /// Pay locked value out of the pool (claim): locked and total both down.
    pub fn payout_locked(&mut self, side: Side, amount: u128) -> PoolResult<()> {
        *self.locked_mut(side) = amount::balance_sub(self.locked(side), amount)?;
        *self.total_mut(side) = amount::balance_sub(self.total(side), amount)?;
        Ok(())
    }

    // ========================================================================
    // Flow speeds
    // ========================================================================

    /// Add an order's input flow speed to its side's aggregate.
    pub fn add_flow_in(&mut self, side: Side, speed: u128) -> PoolResult<()> {
        let sum = self
            .flow_in(side)
            .checked_add(speed)
            .ok_or(PoolError::ArithmeticOverflow)?;
        *self.flow_in_mut(side) = sum;
        Ok(())
    }

    /// Remove an order's input flow speed from its side's aggregate.
    pub fn sub_flow_in(&mut self, side: Side, speed: u128) -> PoolResult<()> {
        *self.flow_in_mut(side) = self
            .flow_in(side)
            .checked_sub(speed)
            .ok_or(PoolError::ArithmeticOverflow)?;
        Ok(())
    }

    /// Install the linearized output rates computed at a requote.
    pub fn set_out_rates(&mut self, rate_a: u128, rate_b: u128) {
        self.out_rate_a = rate_a;
        self.out_rate_b = rate_b;
    }

    /// Signed drift of a side's available balance, as `(gain, loss)` rates
    /// in `<< 32` units per second.
    ///
    /// Input flow releases locked value into availability; output accrual
    /// removes it. Used by the stop-loss crossing solver.
    pub fn available_drift(&self, side: Side) -> (u128, u128) {
        (self.flow_in(side), self.out_rate(side))
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
