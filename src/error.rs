use core::fmt;

use crate::channel::Channel;

/// Calibration fields that can be overridden at runtime.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CalibrationField {
    LineFreq,
    PgaGain,
    Gain(Channel),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MeterError {
    /// override or configuration value rejected, prior value retained
    InvalidCalibration(CalibrationField),
    InvalidOptions(&'static str),
    /// one board did not respond, its channels are missing from this cycle
    DeviceUnavailable { board: u8 },
    /// scaling requested for a channel without calibration entry
    UnknownChannel(Channel),
    /// hardware initialization failed, the engine can't sample
    Faulted,
    /// lifecycle call in the wrong state (e.g. loop before setup)
    NotReady,
    Storage,
    Encoding,
}

impl fmt::Display for MeterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MeterError::InvalidCalibration(field) => write!(f, "invalid calibration value for {field:?}"),
            MeterError::InvalidOptions(reason) => write!(f, "invalid meter options: {reason}"),
            MeterError::DeviceUnavailable { board } => write!(f, "board {board} unavailable"),
            MeterError::UnknownChannel(channel) => write!(f, "no calibration entry for {channel}"),
            MeterError::Faulted => write!(f, "metering hardware failed to initialize"),
            MeterError::NotReady => write!(f, "engine not ready"),
            MeterError::Storage => write!(f, "error accessing configuration storage"),
            MeterError::Encoding => write!(f, "error encoding or decoding data"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for MeterError {}
