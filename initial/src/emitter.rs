use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use log::warn;
use node::{AddressPool, Result, forward::forward_once, metrics::RoleLatency};
use rand::RngCore;
use tokio_util::task::TaskTracker;

use crate::config::EntryConfig;

/// Originates synthetic requests into the pipeline at a fixed cadence.
///
/// Every tick builds a fresh random frame, assigns it an entry tag and spawns
/// an independent forward to one first-stage replica. Emissions are never
/// serialized against each other: a slow hop delays nothing but itself.
pub struct Emitter {
    pool: Arc<AddressPool>,
    first_role: String,
    frame_len: usize,
    period: Duration,
    tag_prefix: String,
    seq: AtomicU64,
    latency: Arc<RoleLatency>,
    emissions: TaskTracker,
    timeout: Option<Duration>,
}

impl Emitter {
    /// Builds an emitter from the entry config.
    pub fn new(cfg: &EntryConfig) -> Result<Self> {
        let replicas = cfg.first_stage_replicas();
        let acquire_timeout = cfg.acquire_timeout_ms.map(Duration::from_millis);

        Ok(Self {
            pool: Arc::new(AddressPool::new(&cfg.first_role, replicas, acquire_timeout)),
            first_role: cfg.first_role.clone(),
            frame_len: cfg.frame_len,
            period: Duration::from_millis(cfg.period_ms),
            tag_prefix: cfg.tag.clone(),
            seq: AtomicU64::new(0),
            latency: Arc::new(RoleLatency::new()),
            emissions: TaskTracker::new(),
            timeout: cfg.forward_timeout_ms.map(Duration::from_millis),
        })
    }

    /// Per-role latency accumulators of the emission path.
    pub fn latency(&self) -> &RoleLatency {
        &self.latency
    }

    /// Emits forever at the configured cadence.
    pub async fn run(&self) {
        let mut ticker = tokio::time::interval(self.period);

        loop {
            ticker.tick().await;
            self.emit_one();
        }
    }

    /// Builds one synthetic frame and spawns its forward.
    pub fn emit_one(&self) {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let tag = format!("{}-{seq}", self.tag_prefix);

        let mut frame = vec![0u8; self.frame_len];
        rand::rng().fill_bytes(&mut frame);

        let role = self.first_role.clone();
        let pool = Arc::clone(&self.pool);
        let latency = Arc::clone(&self.latency);
        let timeout = self.timeout;

        self.emissions.spawn(async move {
            if let Err(e) = forward_once(&role, &pool, &latency, timeout, &tag, &frame).await {
                warn!("emission failed: tag={tag} {e}");
            }
        });
    }

    /// Closes the tracker and drains in-flight emissions.
    pub async fn shutdown(&self) {
        self.emissions.close();
        self.emissions.wait().await;
    }
}
