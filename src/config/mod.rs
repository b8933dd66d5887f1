pub mod defaults;
mod overrides;
mod structs;

pub use overrides::*;
pub use structs::*;

use crc::{Crc, CRC_32_ISCSI};
use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, signal};
use embedded_storage::{ReadStorage, Storage};
use log::{debug, warn};

use crate::aggregate::AggregatedSnapshot;
use crate::error::MeterError;

type Signal<T> = signal::Signal<CriticalSectionRawMutex, T>;

/// Handoff between the sampling loop and the rest of the application.
pub struct MeterSignals {
    /// finished reporting intervals, a newer snapshot replaces an unread one
    pub snapshots: Signal<AggregatedSnapshot>,
    /// calibration overrides, picked up at the next cycle boundary
    pub overrides: Signal<CalibrationOverrides>,
}

impl MeterSignals {
    pub const fn new() -> Self {
        Self {
            snapshots: Signal::new(),
            overrides: Signal::new(),
        }
    }
}

impl Default for MeterSignals {
    fn default() -> Self {
        Self::new()
    }
}

const CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_ISCSI);

/// bytes reserved for the stored configuration, starting at offset 0
pub const CONFIG_SIZE: usize = 512;

pub fn read_config<S: ReadStorage>(storage: &mut S) -> Result<(MeterOptions, CalibrationConfig), MeterError> {
    let mut buffer = [0u8; CONFIG_SIZE];
    if storage.read(0, &mut buffer).is_err() {
        warn!("error reading config from storage");
        return Err(MeterError::Storage);
    }

    let Ok((options, buffer)) = postcard::take_from_bytes_crc32::<MeterOptions>(&buffer, CRC.digest())
    else {
        debug!("error deserializing meter options");
        return Err(MeterError::Encoding);
    };

    let Ok((calibration, _)) =
        postcard::take_from_bytes_crc32::<CalibrationConfig>(buffer, CRC.digest())
    else {
        debug!("error deserializing calibration");
        return Err(MeterError::Encoding);
    };

    options.validate()?;

    Ok((options, calibration))
}

/// returns the number of bytes written
pub fn write_config<S: Storage>(
    storage: &mut S,
    options: &MeterOptions,
    calibration: &CalibrationConfig,
) -> Result<usize, MeterError> {
    let mut buffer = [0u8; CONFIG_SIZE];
    let mut n = 0;

    n += postcard::to_slice_crc32(options, &mut buffer[n..], CRC.digest())
        .map_err(|_| MeterError::Encoding)?
        .len();
    n += postcard::to_slice_crc32(calibration, &mut buffer[n..], CRC.digest())
        .map_err(|_| MeterError::Encoding)?
        .len();

    if storage.write(0, &buffer[..n]).is_err() {
        warn!("error writing config to storage");
        return Err(MeterError::Storage);
    }

    Ok(n)
}
