//! Background execution: the fixed-delay interval loop driving poll cycles.

pub mod scheduler;

pub use scheduler::{IntervalHandle, IntervalTask, spawn_interval};
