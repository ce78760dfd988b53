//! The per-device stage coordinator.

use std::{collections::HashMap, sync::Arc, time::Duration};

use log::{debug, warn};
use tokio_util::task::TaskTracker;

use crate::{
    buffer::AggregationBuffer,
    compute::{ComputeSlot, UnitFactory},
    config::{Dtype, InputSpec, NodeConfig},
    error::{NodeErr, Result},
    forward::forward_once,
    metrics::RoleLatency,
    pool::AddressPool,
    serve::ForwardHandler,
};

struct Target {
    copies: usize,
    pool: Arc<AddressPool>,
}

/// One pipeline stage: owns the compute unit, the replica pools of its
/// downstream roles, the merge window if this role is a merge point, and
/// the latency accumulators.
///
/// Requests are handled concurrently; only the compute step is serialized,
/// by the slot's lock. Downstream forwards run on tracked background tasks
/// and never delay the ack to the inbound caller.
pub struct StageCoordinator {
    role: String,
    input: InputSpec,
    buffer: Option<AggregationBuffer>,
    compute: Arc<ComputeSlot>,
    targets: HashMap<String, Target>,
    latency: Arc<RoleLatency>,
    forwards: TaskTracker,
    forward_timeout: Option<Duration>,
}

impl StageCoordinator {
    /// Builds a coordinator from its validated config.
    ///
    /// # Arguments
    /// * `cfg` - The startup configuration of this stage.
    /// * `factory` - Builds the compute unit, called once on first request.
    ///
    /// # Returns
    /// A coordinator ready to serve, or a config error if a downstream role
    /// has no replicas.
    pub fn new(cfg: &NodeConfig, factory: UnitFactory) -> Result<Self> {
        cfg.validate()?;

        let acquire_timeout = cfg.acquire_timeout_ms.map(Duration::from_millis);
        let mut targets = HashMap::new();

        for down in &cfg.downstream {
            let replicas = cfg.replicas(&down.role);
            if replicas.is_empty() {
                return Err(NodeErr::NoReplicas {
                    role: down.role.clone(),
                });
            }

            let pool = Arc::new(AddressPool::new(&down.role, replicas, acquire_timeout));
            targets.insert(
                down.role.clone(),
                Target {
                    copies: down.copies,
                    pool,
                },
            );
        }

        Ok(Self {
            role: cfg.role.clone(),
            input: cfg.input,
            buffer: cfg.quorum.map(AggregationBuffer::new),
            compute: Arc::new(ComputeSlot::new(factory)),
            targets,
            latency: Arc::new(RoleLatency::new()),
            forwards: TaskTracker::new(),
            forward_timeout: cfg.forward_timeout_ms.map(Duration::from_millis),
        })
    }

    /// The per-role latency accumulators, for observability.
    pub fn latency(&self) -> &RoleLatency {
        &self.latency
    }

    /// Closes the forward tracker and drains in-flight forwards.
    pub async fn shutdown(&self) {
        self.forwards.close();
        self.forwards.wait().await;
    }

    /// Spawns one tracked forward task per configured downstream copy.
    ///
    /// Failures are logged by the task itself; the output is shared, each
    /// task serializes it freshly at send time.
    fn spawn_forwards(&self, tag: &str, output: &Arc<Vec<f32>>) {
        for (role, target) in &self.targets {
            for _ in 0..target.copies {
                let role = role.clone();
                let pool = Arc::clone(&target.pool);
                let latency = Arc::clone(&self.latency);
                let output = Arc::clone(output);
                let tag = tag.to_string();
                let timeout = self.forward_timeout;

                self.forwards.spawn(async move {
                    let payload = bytemuck::cast_slice(output.as_slice());
                    if let Err(e) = forward_once(&role, &pool, &latency, timeout, &tag, payload).await
                    {
                        warn!("forward to role {role} failed: tag={tag} {e}");
                    }
                });
            }
        }
    }
}

impl ForwardHandler for StageCoordinator {
    async fn handle(&self, next: &str, tag: &str, input: &[u8]) -> Result<()> {
        if next != self.role {
            warn!("dropping request for role {next} at role {}: tag={tag}", self.role);
            return Ok(());
        }

        let tensor = decode(&self.role, &self.input, input)?;

        let batch = match &self.buffer {
            None => tensor,
            Some(buffer) => match buffer.offer(tensor) {
                // Below quorum: ack the partial, touch nothing downstream.
                None => {
                    debug!("holding partial input: role={} tag={tag}", self.role);
                    return Ok(());
                }
                Some(batch) => batch,
            },
        };

        let output = self.compute.infer(batch).await?;
        debug!(
            "inference finished: role={} tag={tag} out_len={}",
            self.role,
            output.len()
        );

        let output = Arc::new(output);
        self.spawn_forwards(tag, &output);

        Ok(())
    }
}

/// Decodes a payload against the stage's configured dtype and length.
fn decode(role: &str, spec: &InputSpec, bytes: &[u8]) -> Result<Vec<f32>> {
    let expected = match spec.dtype {
        Dtype::U8 => spec.len,
        Dtype::F32 => spec.len * size_of::<f32>(),
    };

    if bytes.len() != expected {
        return Err(NodeErr::PayloadSize {
            role: role.to_string(),
            got: bytes.len(),
            expected,
        });
    }

    let tensor = match spec.dtype {
        Dtype::U8 => bytes.iter().map(|b| *b as f32).collect(),
        // Copying collect, so the source bytes need no alignment.
        Dtype::F32 => bytemuck::pod_collect_to_vec(bytes),
    };

    Ok(tensor)
}
