mod unit;

pub use unit::{ComputeUnit, UnitSpec, build};
