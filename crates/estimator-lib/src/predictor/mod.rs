//! Prediction dispatch
//!
//! Selects the bundle for a (city, property type) pair and runs the
//! scale -> infer -> unscale pipeline.

mod dispatcher;

pub use dispatcher::{Dispatcher, Prediction};
