//! Live polling driver

pub mod controller;

pub use controller::{CycleReport, LiveConfig, LiveCycleController};
