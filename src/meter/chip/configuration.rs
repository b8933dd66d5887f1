use crate::channel::{CURRENT_CHANNELS_PER_BOARD, VOLTAGE_CHANNELS_PER_BOARD};
use crate::meter::calibration::CalibrationProfile;

/// Register values written to one board during configuration.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BoardConfiguration {
    /// MMode0
    pub line_freq: u16,
    /// MMode1
    pub pga_gain: u16,
    pub voltage_gain: [u16; VOLTAGE_CHANNELS_PER_BOARD],
    pub current_gain: [u16; CURRENT_CHANNELS_PER_BOARD],
}

impl BoardConfiguration {
    pub fn from_profile(profile: &CalibrationProfile, board: usize) -> Option<Self> {
        let cal = profile.board(board)?;
        Some(Self {
            line_freq: profile.line_freq_code(),
            pga_gain: profile.pga().mmode1(),
            voltage_gain: cal.voltage_gain,
            current_gain: cal.current_gain,
        })
    }
}
