use log::{info, warn};
use node::{Result, config::ENTRY_ROLE, serve::ForwardHandler};

use crate::stats::RoundTripStats;

/// Completion intake: the terminal sink of the pipeline.
///
/// The last stage forwards its output here, closing the loop. There is no
/// compute unit and no merge logic, only the round-trip accumulator.
pub struct Intake {
    stats: RoundTripStats,
}

impl Default for Intake {
    fn default() -> Self {
        Self::new()
    }
}

impl Intake {
    pub fn new() -> Self {
        Self {
            stats: RoundTripStats::new(),
        }
    }

    pub fn stats(&self) -> &RoundTripStats {
        &self.stats
    }
}

impl ForwardHandler for Intake {
    async fn handle(&self, next: &str, tag: &str, _input: &[u8]) -> Result<()> {
        if next != ENTRY_ROLE {
            warn!("unexpected terminal role {next} at the intake: tag={tag}");
            return Ok(());
        }

        match self.stats.complete() {
            None => info!("first frame returned, round-trip baseline started: tag={tag}"),
            Some((mean, completions)) => info!(
                completions = completions,
                mean_ms = mean.as_millis() as u64;
                "pipeline round trip"
            ),
        }

        Ok(())
    }
}
