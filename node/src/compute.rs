//! Exclusive ownership of a stage's one compute unit.

use std::{io, sync::Arc};

use model::ComputeUnit;
use parking_lot::Mutex;
use tokio::task;

/// Builds the stage's compute unit; invoked at most once per process.
pub type UnitFactory = Box<dyn Fn() -> Box<dyn ComputeUnit> + Send + Sync>;

/// Holds the lazily built compute unit and the lock serializing its use.
///
/// Construction is assumed prohibitively expensive, so the unit is built on
/// the first request and reused for the process lifetime. Both the first-use
/// construction and every inference happen under the same lock, which makes
/// initialization atomic under concurrent early requests and guarantees the
/// unit never sees overlapping invocations.
pub struct ComputeSlot {
    factory: UnitFactory,
    unit: Mutex<Option<Box<dyn ComputeUnit>>>,
}

impl ComputeSlot {
    pub fn new(factory: UnitFactory) -> Self {
        Self {
            factory,
            unit: Mutex::new(None),
        }
    }

    /// Runs one inference on the blocking pool.
    ///
    /// The lock is held for the whole critical section and released on every
    /// exit path. Buffering and forwarding are deliberately outside of it.
    pub async fn infer(self: &Arc<Self>, input: Vec<f32>) -> io::Result<Vec<f32>> {
        let slot = Arc::clone(self);

        task::spawn_blocking(move || {
            let mut unit = slot.unit.lock();
            let unit = unit.get_or_insert_with(|| (slot.factory)());
            unit.infer(&input)
        })
        .await
        .map_err(|e| io::Error::other(format!("inference join error: {e}")))
    }
}
