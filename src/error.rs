//! Error taxonomy for the flowpool engine.
//!
//! ## Failure classes
//!
//! Every operation either commits completely or leaves the pool untouched;
//! errors therefore describe *why nothing happened*, never a partial state.
//!
//! Most variants are immediately retryable with corrected inputs. The one
//! exception is [`PoolError::ArithmeticOverflow`]: a balance or flow
//! projection left the representable range, and the pool refuses all forward
//! accrual until governance issues an emergency lock that pins state at the
//! last good break.

use thiserror::Error;

/// All failures surfaced by the pool engine.
///
/// Callers can distinguish "retry later" ([`OrderNotReady`]), "retry with
/// different parameters" ([`InvalidExchangeRate`], [`InvalidTimeout`],
/// [`InvalidAmount`]), "permanently invalid" ([`ProofInvalid`],
/// [`AlreadyClaimed`], [`UnknownOrder`], [`Unauthorized`]) and "needs
/// governance action" ([`ArithmeticOverflow`]).
///
/// [`OrderNotReady`]: PoolError::OrderNotReady
/// [`InvalidExchangeRate`]: PoolError::InvalidExchangeRate
/// [`InvalidTimeout`]: PoolError::InvalidTimeout
/// [`InvalidAmount`]: PoolError::InvalidAmount
/// [`ProofInvalid`]: PoolError::ProofInvalid
/// [`AlreadyClaimed`]: PoolError::AlreadyClaimed
/// [`UnknownOrder`]: PoolError::UnknownOrder
/// [`Unauthorized`]: PoolError::Unauthorized
/// [`ArithmeticOverflow`]: PoolError::ArithmeticOverflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PoolError {
    /// An instant swap would violate the caller's minimum-output bound.
    #[error("exchange rate outside the caller's bound")]
    InvalidExchangeRate,

    /// Order parameters are malformed: zero period, or a timeout that is
    /// not in the future.
    #[error("invalid order timeout")]
    InvalidTimeout,

    /// An amount is zero, exceeds the representable balance range, or
    /// overdraws the balance it is taken from.
    #[error("invalid amount")]
    InvalidAmount,

    /// Claim attempted before the order's close break exists, or a mutation
    /// found more due breaks than one step may drain. Call the drain
    /// operation (repeatedly if needed) and retry.
    #[error("order is not ready; drain due breaks and retry")]
    OrderNotReady,

    /// Mutation attempted while the pool is Locked or EmergencyLocked.
    /// Close, claim and withdraw paths remain available.
    #[error("pool is locked")]
    LockedPool,

    /// A balance or flow projection would exceed the fixed-point width.
    ///
    /// Fatal class: the operation is fully rejected and the pool stays
    /// stuck until governance issues an emergency lock.
    #[error("arithmetic overflow in balance or flow projection")]
    ArithmeticOverflow,

    /// A governance-only operation was called by another principal.
    #[error("caller is not the governor")]
    Unauthorized,

    /// The order was already claimed (or its claimed record has been
    /// garbage-collected); replaying any proof is a no-op rejection.
    #[error("order already claimed")]
    AlreadyClaimed,

    /// The supplied replay sequence does not reproduce the recorded hash
    /// chain, or its integration diverges from the settled outcome.
    #[error("claim proof does not match recorded history")]
    ProofInvalid,

    /// No order with the given id was ever issued by this pool.
    #[error("unknown order id")]
    UnknownOrder,
}

/// Convenience alias used across the crate.
pub type PoolResult<T> = Result<T, PoolError>;

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(PoolError::LockedPool.to_string(), "pool is locked");
        assert_eq!(
            PoolError::ArithmeticOverflow.to_string(),
            "arithmetic overflow in balance or flow projection"
        );
    }

    #[test]
    fn test_error_equality() {
        assert_eq!(PoolError::OrderNotReady, PoolError::OrderNotReady);
        assert_ne!(PoolError::OrderNotReady, PoolError::AlreadyClaimed);
    }
}
