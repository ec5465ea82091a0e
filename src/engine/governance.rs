//! Governance gate: parameter setters and pool state transitions.
//!
//! A single authorized principal (the governor) owns every setter. Each
//! change first settles the pool with a break of its own and is then
//! chained as a `ParamChange` record, so the audit trail shows exactly
//! which intervals ran under which parameters — a claim replay reads the
//! fee out of the record, never out of current state.
//!
//! `lock` freezes the pool clock at the last break: orders stop converting
//! and cannot time out, and only close, claim, burn and process remain
//! usable. `emergency_lock` probes a forward advance on a scratch copy and
//! engages only when that advance dies with the fatal arithmetic error,
//! pinning the real pool at its last good break.

use crate::error::{PoolError, PoolResult};
use crate::types::amount::FEE_DENOMINATOR;
use crate::types::BreakReason;

use super::{FlowPool, PoolStatus};

impl FlowPool {
    fn require_governor(&self, caller: u64) -> PoolResult<()> {
        if caller != self.governor {
            return Err(PoolError::Unauthorized);
        }
        Ok(())
    }

    /// Settle to the frozen-or-current clock and chain a parameter change.
    fn param_break(&mut self, now: u64) -> PoolResult<()> {
        let eff = self.effective_now(now);
        if self.status == PoolStatus::Active {
            self.drain_for_break(eff)?;
        }
        self.settle_to(eff)?;
        self.finish_break(eff, BreakReason::ParamChange, 0)?;
        Ok(())
    }

    /// Set the swap fee in per mille. The previous fee applies up to this
    /// call's break, the new one from it.
    pub fn set_fee(&mut self, now: u64, caller: u64, fee: u64) -> PoolResult<()> {
        self.require_governor(caller)?;
        if fee as u128 >= FEE_DENOMINATOR {
            return Err(PoolError::InvalidAmount);
        }
        self.transactional(|pool| {
            // settle the outgoing fee's last interval before switching
            let eff = pool.effective_now(now);
            if pool.status == PoolStatus::Active {
                pool.drain_for_break(eff)?;
            }
            pool.settle_to(eff)?;
            pool.not_fee = FEE_DENOMINATOR as u64 - fee;
            pool.finish_break(eff, BreakReason::ParamChange, 0)?;
            Ok(())
        })
    }

    /// Set the fee charged inside the arbitrage allowance, per mille.
    pub fn set_instant_swap_fee(&mut self, now: u64, caller: u64, fee: u64) -> PoolResult<()> {
        self.require_governor(caller)?;
        if fee as u128 >= FEE_DENOMINATOR {
            return Err(PoolError::InvalidAmount);
        }
        self.transactional(|pool| {
            pool.instant_swap_fee = fee;
            pool.param_break(now)
        })
    }

    /// Set the per-mille share of pool growth minted to the governor.
    pub fn set_protocol_fee(&mut self, now: u64, caller: u64, fee: u64) -> PoolResult<()> {
        self.require_governor(caller)?;
        if fee as u128 >= FEE_DENOMINATOR {
            return Err(PoolError::InvalidAmount);
        }
        self.transactional(|pool| {
            pool.protocol_fee = fee;
            pool.param_break(now)
        })
    }

    /// Retarget the break-history retention depth. The window converges by
    /// at most one record per break.
    pub fn set_desired_max_history(&mut self, now: u64, caller: u64, depth: u64) -> PoolResult<()> {
        self.require_governor(caller)?;
        if depth == 0 {
            return Err(PoolError::InvalidAmount);
        }
        self.transactional(|pool| {
            pool.history.set_desired_max_history(depth);
            pool.param_break(now)
        })
    }

    /// Freeze the pool clock at the last break.
    ///
    /// Settles everything due up to `now` first, so the freeze point is a
    /// fully settled state. Idempotent on an already-locked pool.
    pub fn lock(&mut self, now: u64, caller: u64) -> PoolResult<()> {
        self.require_governor(caller)?;
        if self.status != PoolStatus::Active {
            return Ok(());
        }
        self.transactional(|pool| {
            let eff = pool.effective_now(now);
            pool.drain_for_break(eff)?;
            pool.settle_to(eff)?;
            pool.status = PoolStatus::Locked;
            pool.finish_break(eff, BreakReason::Lock, 0)?;
            Ok(())
        })
    }

    /// Probe a forward advance; engage the emergency lock only if the probe
    /// dies with [`PoolError::ArithmeticOverflow`].
    ///
    /// A healthy pool is left completely untouched and `Ok(false)` is
    /// returned. On engagement the failed step is discarded, the pool is
    /// pinned at its last good break and `Ok(true)` is returned.
    pub fn emergency_lock(&mut self, now: u64, caller: u64) -> PoolResult<bool> {
        self.require_governor(caller)?;
        if self.status == PoolStatus::EmergencyLocked {
            return Ok(false);
        }

        let mut probe = self.clone();
        let eff = probe.effective_now(now);
        let advanced = probe
            .drain(eff)
            .and_then(|_| probe.settle_to(eff))
            .and_then(|_| probe.requote_all(eff));
        match advanced {
            Ok(()) => Ok(false),
            Err(PoolError::ArithmeticOverflow) => {
                self.transactional(|pool| {
                    pool.status = PoolStatus::EmergencyLocked;
                    let frozen = pool.last_break_time;
                    // no requote: the quote path is what just failed
                    pool.chain_break(frozen, BreakReason::EmergencyLock, 0)?;
                    Ok(())
                })?;
                Ok(true)
            }
            Err(err) => Err(err),
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
