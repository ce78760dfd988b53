//! One forward hop: checkout, call, measure, return.

use std::time::{Duration, Instant};

use comms::{msg::ForwardRequest, rpc};
use log::info;
use tokio::io;

use crate::{error::Result, metrics::RoleLatency, pool::AddressPool};

/// Checks an address out of `pool`, issues one forward call carrying
/// `payload` and records the round trip into the role's accumulator.
///
/// The address goes back into the pool on every path, including failures,
/// so the pool never shrinks. Only successful round trips are measured.
///
/// # Arguments
/// * `role` - The destination role, used for the pool and the wire label.
/// * `pool` - The replica pool of that role.
/// * `latency` - The per-role latency accumulators.
/// * `timeout` - Optional bound on the full connect + call round trip.
/// * `tag` - The end-to-end correlation tag, passed through unchanged.
/// * `payload` - The freshly serialized output tensor.
pub async fn forward_once(
    role: &str,
    pool: &AddressPool,
    latency: &RoleLatency,
    timeout: Option<Duration>,
    tag: &str,
    payload: &[u8],
) -> Result<()> {
    let addr = pool.acquire().await?;

    let req = ForwardRequest::forward(role, tag, payload);
    let started = Instant::now();

    let res = match timeout {
        None => rpc::forward(&addr, req).await,
        Some(limit) => match tokio::time::timeout(limit, rpc::forward(&addr, req)).await {
            Ok(res) => res,
            Err(_) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("forward to {addr} timed out"),
            )),
        },
    };

    pool.release(addr);
    res?;

    let rtt = started.elapsed();
    let mean = latency.record(role, rtt);
    info!(
        role = role,
        rtt_ms = rtt.as_millis() as u64,
        mean_ms = mean.as_millis() as u64;
        "forward round trip"
    );

    Ok(())
}
