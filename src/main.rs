//! flowpool - Binary Entry Point
//!
//! Walks one pool through its life: liquidity in, a streamed order, an
//! instant swap against it, the timeout break, and a replayed claim.

use flowpool::types::amount::flow_display;
use flowpool::{Direction, FlowPool, PoolError, Side};

fn main() -> Result<(), PoolError> {
    println!("===========================================");
    println!("  flowpool - streamed-order exchange pool");
    println!("===========================================");
    println!();

    let mut pool = FlowPool::new(1);

    println!("Minting initial liquidity (1000 A / 2000 B)...");
    let shares = pool.mint(0, 1, 1_000, 2_000)?;
    println!("  Shares minted: {}", shares);
    println!();

    println!("Opening a streamed order: 100 A -> B over 10 seconds...");
    let id = pool.add_order(0, 7, Direction::AToB, 0, 0, 100, 10)?;
    let order = pool.order(id).ok_or(PoolError::UnknownOrder)?;
    let open_hash = order.open_hash;
    println!("  Order ID: {}", id);
    println!("  Input flow: {} A/s", flow_display(order.in_flow_speed));
    println!("  Projected output: {} B", order.projected_out);
    println!("  Open hash: {}", hex::encode(open_hash));
    println!();

    println!("Instant swap at t=5: 50 B -> A...");
    let out = pool.swap(5, 9, Direction::BToA, 50, 0)?;
    println!("  Swap output: {} A", out);
    println!(
        "  Available now: {} A / {} B (locked {} A / {} B)",
        pool.available(Side::A),
        pool.available(Side::B),
        pool.locked(Side::A),
        pool.locked(Side::B),
    );
    println!();

    println!("Draining the timeout break at t=10...");
    let drained = pool.process_delayed_orders(10)?;
    let order = pool.order(id).ok_or(PoolError::UnknownOrder)?;
    println!("  Breaks drained: {}", drained);
    println!("  Order status: {:?}", order.status);
    println!(
        "  Executed: {} A in, {} B out",
        order.executed_in, order.executed_out
    );
    println!();

    println!("Replaying the break-record span to claim...");
    let span: Vec<_> = pool
        .history()
        .records()
        .filter(|record| record.seq >= 1)
        .cloned()
        .collect();
    println!("  Span length: {} records", span.len());
    let (payout, refund) = pool.claim_order(open_hash, &span)?;
    println!("  Claim payout: {} B (refund {} A)", payout, refund);
    println!();

    println!("Chain head after {} breaks:", pool.breaks_count());
    println!("  {}", hex::encode(pool.last_break_hash()));
    println!();
    println!("Run 'cargo test' to verify all tests pass.");
    Ok(())
}
