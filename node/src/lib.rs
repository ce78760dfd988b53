pub mod buffer;
pub mod compute;
pub mod config;
pub mod error;
pub mod forward;
pub mod metrics;
pub mod pool;
pub mod serve;
pub mod stage;

pub use buffer::AggregationBuffer;
pub use config::NodeConfig;
pub use error::{NodeErr, Result};
pub use pool::AddressPool;
pub use stage::StageCoordinator;
