#![cfg_attr(not(any(test, feature = "std")), no_std)]

pub mod aggregate;
pub mod channel;
pub mod config;
pub mod error;
pub mod meter;
pub mod power;
pub mod report;
pub mod zcr;

pub use aggregate::{AggregatedSnapshot, ChannelSummary};
pub use channel::{Channel, ChannelKind};
pub use config::{CalibrationConfig, CalibrationOverrides, MeterOptions, MeterSignals};
pub use error::{CalibrationField, MeterError};
pub use meter::calibration::{CalibrationProfile, CalibrationStore};
pub use meter::{EnergyMeter, MeterState};
pub use power::ChannelMetrics;
