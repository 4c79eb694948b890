#![cfg_attr(not(test), no_std)]
//! Single-shot temperature/humidity acquisition from a DHT11 or DHT22 sensor
//! wired to one GPIO line, serialized into a fixed-shape JSON snapshot.
//!
//! The library is hardware agnostic: anything implementing the embedded-hal
//! 0.2 pin and delay traits can drive it. The ESP32-C3 firmware in `main.rs`
//! is one such consumer.

extern crate alloc;

pub mod acquire;
pub mod interrupt;
pub mod reading;
pub mod sampler;
pub mod sensor;

pub use acquire::{AcquireError, CancelToken, Failure, FailureKind, Outcome, RetryPolicy, SensorReader};
pub use interrupt::CancelOnPress;
pub use reading::{to_pretty_json, Reading, Snapshot};
pub use sampler::{SampleSummary, Sampler};
pub use sensor::{Dht, Dht11, Dht22, HygroThermometer, Model, RawMeasurement, ReadError, Release};
