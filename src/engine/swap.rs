//! Instant swaps, liquidity shares and balance sync.
//!
//! ## Instant swaps
//!
//! A swap quotes against *available* balances only (locked order value is
//! untouchable) and forces its own break, so in-flight orders are settled
//! to the swap time first and requoted against the post-swap balances
//! after.
//!
//! ## Arbitrage allowance
//!
//! In-flight orders drift the pool rate between breaks, and arbitrageurs
//! restoring it are doing the pool a service. The input slice up to the
//! sum of opposing orders' still-projected outputs is therefore charged
//! the (usually zero) `instant_swap_fee`; only the excess pays the
//! standard fee. The allowance is recomputed at every break, so it never
//! survives across operations.
//!
//! ## Liquidity
//!
//! Shares follow the usual constant-product rules: `sqrt(a * b)` at
//! genesis, min-ratio against available balances after, pro-rata of
//! available balances on burn. Before each liquidity event the pool mints
//! the governor a `protocol_fee` per-mille share of the growth of
//! `sqrt(available_a * available_b)` since the previous event.

use primitive_types::U256;

use crate::error::{PoolError, PoolResult};
use crate::types::amount::{self, FEE_DENOMINATOR};
use crate::types::{BreakReason, Direction, Side};

use super::{FlowPool, PoolEvent, PoolStatus};

/// Constant-product output quote: how much of the out reserve `amount_in`
/// buys at the `not_fee` fee complement.
///
/// `out = in * not_fee * out_reserve / (in_reserve * 1000 + in * not_fee)`
/// with 256-bit intermediates, floored.
pub(crate) fn cp_quote(
    amount_in: u128,
    in_reserve: u128,
    out_reserve: u128,
    not_fee: u64,
) -> PoolResult<u128> {
    if amount_in == 0 || out_reserve == 0 {
        return Ok(0);
    }
    let in_with_fee = U256::from(amount_in) * U256::from(not_fee);
    let numerator = in_with_fee * U256::from(out_reserve);
    let denominator = U256::from(in_reserve) * U256::from(FEE_DENOMINATOR) + in_with_fee;
    if denominator.is_zero() {
        return Ok(0);
    }
    amount::u256_to_u128(numerator / denominator)
}

impl FlowPool {
    /// Swap `amount_in` of the input side for the output side instantly.
    ///
    /// Fails with [`PoolError::InvalidExchangeRate`] when the quoted output
    /// is below `min_amount_out`, and with [`PoolError::LockedPool`] while
    /// locked. Returns the output amount owed to `to`.
    pub fn swap(
        &mut self,
        now: u64,
        to: u64,
        direction: Direction,
        amount_in: u128,
        min_amount_out: u128,
    ) -> PoolResult<u128> {
        self.transactional(|pool| pool.swap_inner(now, to, direction, amount_in, min_amount_out))
    }

    /// Deposit `amount_a`/`amount_b` and mint liquidity shares to `to`.
    pub fn mint(&mut self, now: u64, to: u64, amount_a: u128, amount_b: u128) -> PoolResult<u128> {
        self.transactional(|pool| pool.mint_inner(now, to, amount_a, amount_b))
    }

    /// Burn `shares` of `owner`'s liquidity for a pro-rata slice of the
    /// available balances. Allowed while locked (degraded).
    pub fn burn(&mut self, now: u64, owner: u64, shares: u128) -> PoolResult<(u128, u128)> {
        self.transactional(|pool| pool.burn_inner(now, owner, shares))
    }

    /// Re-align totals with externally observed token balances. The new
    /// totals must still cover the locked balances.
    pub fn sync(&mut self, now: u64, actual_a: u128, actual_b: u128) -> PoolResult<()> {
        self.transactional(|pool| pool.sync_inner(now, actual_a, actual_b))
    }

    // ========================================================================
    // Bodies
    // ========================================================================

    fn swap_inner(
        &mut self,
        now: u64,
        to: u64,
        direction: Direction,
        amount_in: u128,
        min_amount_out: u128,
    ) -> PoolResult<u128> {
        if self.status != PoolStatus::Active {
            return Err(PoolError::LockedPool);
        }
        if amount_in == 0 || amount_in > amount::BALANCE_MAX {
            return Err(PoolError::InvalidAmount);
        }
        let eff = self.effective_now(now);
        self.drain_for_break(eff)?;
        self.settle_to(eff)?;

        let input = direction.input_side();
        let output = direction.output_side();
        let avail_in = self.ledger.available(input);
        let avail_out = self.ledger.available(output);

        // the still-projected output of opposing orders, in the swap's
        // input token
        let allowance = self.arbitrage_allowance(direction.opposite())?;
        let in_allow = amount_in.min(allowance);
        let in_rest = amount_in - in_allow;

        let allow_not_fee = FEE_DENOMINATOR as u64 - self.instant_swap_fee;
        let out_allow = cp_quote(in_allow, avail_in, avail_out, allow_not_fee)?;
        let mid_in = amount::balance_add(avail_in, in_allow)?;
        let mid_out = amount::balance_sub(avail_out, out_allow)?;
        let out_rest = cp_quote(in_rest, mid_in, mid_out, self.not_fee)?;

        let amount_out = out_allow
            .checked_add(out_rest)
            .ok_or(PoolError::ArithmeticOverflow)?;
        if amount_out < min_amount_out {
            return Err(PoolError::InvalidExchangeRate);
        }

        self.ledger.deposit(input, amount_in)?;
        self.ledger.withdraw_available(output, amount_out)?;
        self.finish_break(eff, BreakReason::Swap, 0)?;
        log::trace!(
            "swap to={} dir={:?} in={} out={} allowance={}",
            to,
            direction,
            amount_in,
            amount_out,
            allowance,
        );
        Ok(amount_out)
    }

    fn mint_inner(&mut self, now: u64, to: u64, amount_a: u128, amount_b: u128) -> PoolResult<u128> {
        if self.status != PoolStatus::Active {
            return Err(PoolError::LockedPool);
        }
        if amount_a == 0 || amount_b == 0 {
            return Err(PoolError::InvalidAmount);
        }
        let eff = self.effective_now(now);
        self.drain_for_break(eff)?;
        self.settle_to(eff)?;
        self.mint_protocol_fee()?;

        let avail_a = self.ledger.available(Side::A);
        let avail_b = self.ledger.available(Side::B);
        let minted = if self.total_shares == 0 {
            amount::isqrt_wide(amount_a, amount_b)
        } else {
            amount::mul_div(self.total_shares, amount_a, avail_a)?
                .min(amount::mul_div(self.total_shares, amount_b, avail_b)?)
        };
        if minted == 0 {
            return Err(PoolError::InvalidAmount);
        }

        self.ledger.deposit(Side::A, amount_a)?;
        self.ledger.deposit(Side::B, amount_b)?;
        self.credit_shares(to, minted)?;
        self.last_root_k =
            amount::isqrt_wide(self.ledger.available(Side::A), self.ledger.available(Side::B));
        self.finish_break(eff, BreakReason::Mint, 0)?;
        Ok(minted)
    }

    fn burn_inner(&mut self, now: u64, owner: u64, shares: u128) -> PoolResult<(u128, u128)> {
        if shares == 0 || shares > self.shares_of(owner) {
            return Err(PoolError::InvalidAmount);
        }
        let eff = self.effective_now(now);
        if self.status == PoolStatus::Active {
            self.drain_for_break(eff)?;
        }
        self.settle_to(eff)?;
        self.mint_protocol_fee()?;

        let avail_a = self.ledger.available(Side::A);
        let avail_b = self.ledger.available(Side::B);
        let out_a = amount::mul_div(avail_a, shares, self.total_shares)?;
        let out_b = amount::mul_div(avail_b, shares, self.total_shares)?;

        self.ledger.withdraw_available(Side::A, out_a)?;
        self.ledger.withdraw_available(Side::B, out_b)?;
        self.debit_shares(owner, shares)?;
        self.last_root_k =
            amount::isqrt_wide(self.ledger.available(Side::A), self.ledger.available(Side::B));
        self.finish_break(eff, BreakReason::Burn, 0)?;
        if self.status != PoolStatus::Active {
            self.events.push(PoolEvent::DegradedOperation { time: eff, order_id: 0 });
        }
        Ok((out_a, out_b))
    }

    fn sync_inner(&mut self, now: u64, actual_a: u128, actual_b: u128) -> PoolResult<()> {
        if self.status != PoolStatus::Active {
            return Err(PoolError::LockedPool);
        }
        let eff = self.effective_now(now);
        self.drain_for_break(eff)?;
        self.settle_to(eff)?;
        self.ledger.set_total(Side::A, actual_a)?;
        self.ledger.set_total(Side::B, actual_b)?;
        self.finish_break(eff, BreakReason::Sync, 0)?;
        Ok(())
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Sum of still-projected outputs of active orders flowing in
    /// `direction`, i.e. what the pool will owe them beyond what already
    /// accrued.
    fn arbitrage_allowance(&self, direction: Direction) -> PoolResult<u128> {
        let mut allowance = 0u128;
        for order in self.queue.iter().filter(|o| o.direction == direction) {
            let pending = order
                .anchor_out
                .checked_add(order.projected_out)
                .and_then(|total| total.checked_sub(order.executed_out))
                .ok_or(PoolError::ArithmeticOverflow)?;
            allowance = allowance
                .checked_add(pending)
                .ok_or(PoolError::ArithmeticOverflow)?;
        }
        Ok(allowance)
    }

    /// Mint the governor its per-mille share of pool growth since the last
    /// liquidity event:
    /// `s * fee * (r2 - r1) / ((1000 - fee) * r2 + fee * r1)` with
    /// `r = sqrt(available_a * available_b)`.
    fn mint_protocol_fee(&mut self) -> PoolResult<u128> {
        if self.protocol_fee == 0 || self.total_shares == 0 || self.last_root_k == 0 {
            return Ok(0);
        }
        let r2 = amount::isqrt_wide(
            self.ledger.available(Side::A),
            self.ledger.available(Side::B),
        );
        let r1 = self.last_root_k;
        if r2 <= r1 {
            return Ok(0);
        }
        let fee = U256::from(self.protocol_fee);
        let numerator = U256::from(self.total_shares) * fee * U256::from(r2 - r1);
        let denominator = U256::from(FEE_DENOMINATOR - self.protocol_fee as u128) * U256::from(r2)
            + fee * U256::from(r1);
        let minted = amount::u256_to_u128(numerator / denominator)?;
        if minted > 0 {
            let governor = self.governor;
            self.credit_shares(governor, minted)?;
        }
        Ok(minted)
    }

    fn credit_shares(&mut self, owner: u64, minted: u128) -> PoolResult<()> {
        let entry = self.shares.entry(owner).or_insert(0);
        *entry = entry
            .checked_add(minted)
            .ok_or(PoolError::ArithmeticOverflow)?;
        self.total_shares = self
            .total_shares
            .checked_add(minted)
            .ok_or(PoolError::ArithmeticOverflow)?;
        Ok(())
    }

    fn debit_shares(&mut self, owner: u64, burned: u128) -> PoolResult<()> {
        let held = self.shares_of(owner);
        let left = held
            .checked_sub(burned)
            .ok_or(PoolError::ArithmeticOverflow)?;
        if left == 0 {
            self.shares.remove(&owner);
        } else {
            self.shares.insert(owner, left);
        }
        self.total_shares = self
            .total_shares
            .checked_sub(burned)
            .ok_or(PoolError::ArithmeticOverflow)?;
        Ok(())
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
