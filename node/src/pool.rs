//! Checkout pool over the replica addresses of one downstream role.

use std::time::Duration;

use log::warn;
use tokio::sync::{Mutex, mpsc};

use crate::error::{NodeErr, Result};

/// A blocking checkout pool of interchangeable replica addresses.
///
/// Membership is fixed at startup. An address is either free inside the pool
/// or checked out by exactly one in-flight forward; `release` must run on
/// every path, including failures, or the pool shrinks for good.
///
/// No fairness is promised: any free address may be handed out.
pub struct AddressPool {
    role: String,
    tx: mpsc::Sender<String>,
    rx: Mutex<mpsc::Receiver<String>>,
    timeout: Option<Duration>,
}

impl AddressPool {
    /// Creates a pool holding `addrs` for the downstream `role`.
    ///
    /// # Arguments
    /// * `role` - The downstream role these replicas serve, used in diagnostics.
    /// * `addrs` - The replica addresses, assumed non-empty.
    /// * `timeout` - Optional bound on how long `acquire` may wait.
    pub fn new(role: &str, addrs: Vec<String>, timeout: Option<Duration>) -> Self {
        let (tx, rx) = mpsc::channel(addrs.len().max(1));

        for addr in addrs {
            // The channel was sized to fit every address.
            tx.try_send(addr).ok();
        }

        Self {
            role: role.to_string(),
            tx,
            rx: Mutex::new(rx),
            timeout,
        }
    }

    /// Checks an address out of the pool, waiting until one is free.
    ///
    /// # Returns
    /// A free address, or `AcquireTimeout` if the configured bound elapsed.
    pub async fn acquire(&self) -> Result<String> {
        // The bound covers the wait for the receiver lock too, so queued
        // acquirers cannot each restart the clock.
        let addr = match self.timeout {
            None => self.rx.lock().await.recv().await,
            Some(limit) => {
                let recv = async { self.rx.lock().await.recv().await };
                match tokio::time::timeout(limit, recv).await {
                    Ok(addr) => addr,
                    Err(_) => {
                        return Err(NodeErr::AcquireTimeout {
                            role: self.role.clone(),
                        });
                    }
                }
            }
        };

        // The pool holds its own sender, so the channel cannot close.
        addr.ok_or_else(|| NodeErr::Io(std::io::Error::other("address pool closed")))
    }

    /// Returns a checked-out address, making it available again.
    pub fn release(&self, addr: String) {
        if self.tx.try_send(addr).is_err() {
            // Only reachable if an address is returned twice.
            warn!("address pool for role {} rejected a release", self.role);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::BTreeSet, sync::Arc, time::Duration};

    use tokio::task::JoinSet;

    use super::*;
    use crate::error::NodeErr;

    fn addrs(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("10.0.0.{i}:12345")).collect()
    }

    #[tokio::test]
    async fn membership_survives_concurrent_checkout() {
        let original: BTreeSet<_> = addrs(3).into_iter().collect();
        let pool = Arc::new(AddressPool::new("fc1", addrs(3), None));

        let mut tasks = JoinSet::new();
        for _ in 0..8 {
            let pool = Arc::clone(&pool);
            tasks.spawn(async move {
                for _ in 0..50 {
                    let addr = pool.acquire().await.unwrap();
                    tokio::task::yield_now().await;
                    pool.release(addr);
                }
            });
        }
        while let Some(res) = tasks.join_next().await {
            res.unwrap();
        }

        let mut drained = BTreeSet::new();
        for _ in 0..3 {
            drained.insert(pool.acquire().await.unwrap());
        }
        assert_eq!(drained, original);
    }

    #[tokio::test]
    async fn size_one_pool_blocks_second_acquirer() {
        let pool = Arc::new(AddressPool::new("fc1", addrs(1), None));
        let held = pool.acquire().await.unwrap();

        let second = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.acquire().await.unwrap() })
        };

        // The second acquire must stay pending while the address is out.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!second.is_finished());

        pool.release(held.clone());
        assert_eq!(second.await.unwrap(), held);
    }

    #[tokio::test]
    async fn acquire_times_out_when_configured() {
        let pool = AddressPool::new("fc1", addrs(1), Some(Duration::from_millis(20)));
        let _held = pool.acquire().await.unwrap();

        match pool.acquire().await {
            Err(NodeErr::AcquireTimeout { role }) => assert_eq!(role, "fc1"),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn queued_acquirers_share_the_configured_bound() {
        let limit = Duration::from_millis(20);
        let pool = Arc::new(AddressPool::new("fc1", addrs(1), Some(limit)));
        let _held = pool.acquire().await.unwrap();

        // Both waiters time out after `limit` each, not one after the other.
        let mut tasks = JoinSet::new();
        for _ in 0..2 {
            let pool = Arc::clone(&pool);
            tasks.spawn(async move {
                let start = tokio::time::Instant::now();
                let res = pool.acquire().await;
                (start.elapsed(), res)
            });
        }
        while let Some(res) = tasks.join_next().await {
            let (elapsed, res) = res.unwrap();
            assert!(matches!(res, Err(NodeErr::AcquireTimeout { .. })));
            assert!(elapsed <= limit + Duration::from_millis(5), "waited {elapsed:?}");
        }
    }

    #[tokio::test]
    async fn double_release_does_not_grow_the_pool() {
        let pool = AddressPool::new("fc1", addrs(1), Some(Duration::from_millis(20)));
        pool.release("10.0.0.0:12345".to_string());

        let _held = pool.acquire().await.unwrap();
        assert!(pool.acquire().await.is_err());
    }
}
