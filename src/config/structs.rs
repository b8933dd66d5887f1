use heapless::Vec;
use serde::{Deserialize, Serialize};

use super::defaults;
use crate::channel::{CURRENT_CHANNELS_PER_BOARD, MAX_ADDON_BOARDS, MAX_BOARDS, VOLTAGE_CHANNELS_PER_BOARD};
use crate::error::MeterError;

pub const MIN_SAMPLES_PER_CYCLE: usize = 8;
pub const MAX_SAMPLES_PER_CYCLE: usize = 64;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct MeterOptions {
    // read power values computed by the board instead of sampling waveforms
    pub direct_register_mode: bool,
    // fundamental / harmonic power
    pub metering_values_extended: bool,
    pub addon_boards: u8,
    // waveform samples per line cycle, multiple of 4
    pub samples_per_cycle: usize,
    // how many line cycles make up one snapshot
    pub cycles_per_report: u32,
    // voltage channel feeding each CT
    pub phase_map: [u8; CURRENT_CHANNELS_PER_BOARD],
    // watchdog for a single board read
    pub board_timeout_ms: u32,
}

impl Default for MeterOptions {
    fn default() -> Self {
        Self {
            direct_register_mode: defaults::DIRECT_REGISTER_MODE,
            metering_values_extended: defaults::EXPORT_METERING_VALS,
            addon_boards: defaults::NUM_OF_ADDON_BOARDS,
            samples_per_cycle: defaults::SAMPLES_PER_CYCLE,
            cycles_per_report: defaults::CYCLES_PER_REPORT,
            phase_map: defaults::PHASE_MAP,
            board_timeout_ms: defaults::BOARD_TIMEOUT_MS,
        }
    }
}

impl MeterOptions {
    pub fn validate(&self) -> Result<(), MeterError> {
        if self.addon_boards as usize > MAX_ADDON_BOARDS {
            return Err(MeterError::InvalidOptions("at most 6 add-on boards"));
        }
        if self.samples_per_cycle < MIN_SAMPLES_PER_CYCLE
            || self.samples_per_cycle > MAX_SAMPLES_PER_CYCLE
            || self.samples_per_cycle % 4 != 0
        {
            return Err(MeterError::InvalidOptions(
                "samples per cycle must be a multiple of 4 between 8 and 64",
            ));
        }
        if self.cycles_per_report == 0 {
            return Err(MeterError::InvalidOptions("cycles per report must be positive"));
        }
        if self
            .phase_map
            .iter()
            .any(|&v| v as usize >= VOLTAGE_CHANNELS_PER_BOARD)
        {
            return Err(MeterError::InvalidOptions("phase map refers to unknown voltage channel"));
        }
        if self.board_timeout_ms == 0 {
            return Err(MeterError::InvalidOptions("board timeout must be positive"));
        }
        Ok(())
    }

    pub fn board_count(&self) -> usize {
        1 + self.addon_boards as usize
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoardCalibration {
    pub voltage_gain: [u16; VOLTAGE_CHANNELS_PER_BOARD],
    pub current_gain: [u16; CURRENT_CHANNELS_PER_BOARD],
}

impl Default for BoardCalibration {
    fn default() -> Self {
        Self {
            voltage_gain: defaults::VOLTAGE_GAINS,
            current_gain: defaults::CURRENT_GAINS,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CalibrationConfig {
    pub line_freq: u16,
    pub pga_gain: u16,
    pub boards: Vec<BoardCalibration, MAX_BOARDS>,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self::with_boards(1 + defaults::NUM_OF_ADDON_BOARDS as usize)
    }
}

impl CalibrationConfig {
    /// compiled-in defaults for the main board plus add-on boards
    pub fn with_boards(count: usize) -> Self {
        let mut boards = Vec::new();
        for _ in 0..count.min(MAX_BOARDS) {
            let _ = boards.push(BoardCalibration::default());
        }
        Self {
            line_freq: defaults::LINE_FREQ,
            pga_gain: defaults::PGA_GAIN,
            boards,
        }
    }
}
