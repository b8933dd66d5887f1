use heapless::{String, Vec};
use serde::Deserialize;

use crate::channel::ChannelKind;
use crate::error::MeterError;

pub const MAX_CHANNEL_OVERRIDES: usize = 16;

/// Runtime calibration overrides, e.g. from a configuration page.
///
/// ```json
/// {"line_freq": 135, "channels": [{"kind": "current", "board": 0, "index": 1, "preset": "sct-013-030"}]}
/// ```
#[derive(Deserialize, Clone, Debug, Default, PartialEq)]
pub struct CalibrationOverrides {
    #[serde(default)]
    pub line_freq: Option<u16>,
    #[serde(default)]
    pub pga_gain: Option<u16>,
    #[serde(default)]
    pub channels: Vec<ChannelOverride, MAX_CHANNEL_OVERRIDES>,
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct ChannelOverride {
    pub kind: ChannelKind,
    #[serde(default)]
    pub board: u8,
    /// 0-based, CT1 is 0
    pub index: u8,
    #[serde(default)]
    pub gain: Option<u16>,
    #[serde(default)]
    pub preset: Option<String<32>>,
}

pub fn parse_overrides(body: &[u8]) -> Result<CalibrationOverrides, MeterError> {
    let Ok((value, _)) = serde_json_core::from_slice(body) else {
        return Err(MeterError::Encoding);
    };
    Ok(value)
}
