pub mod config;
pub mod emitter;
pub mod intake;
pub mod stats;

pub use config::EntryConfig;
pub use emitter::Emitter;
pub use intake::Intake;
pub use stats::RoundTripStats;
