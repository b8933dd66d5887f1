use core::ops::RangeInclusive;

use embassy_time::Duration;
use embedded_storage::{ReadStorage, Storage};
use heapless::Vec;
use log::{info, warn};

use crate::channel::{Channel, ChannelKind, MAX_BOARDS};
use crate::config::{self, BoardCalibration, CalibrationConfig, CalibrationOverrides, MeterOptions};
use crate::error::{CalibrationField, MeterError};

use super::sample::RawSample;

/// line frequency codes accepted by the metering ICs (MMode0)
pub const LINE_FREQ_CODES: [(u16, &str); 4] = [
    (5231, "60 Hz, six channel meter"),
    (135, "50 Hz, six channel meter"),
    (4485, "60 Hz, split single phase meter"),
    (389, "50 Hz, split single phase meter"),
];

// MMode0 frequency select bit
const LINE_FREQ_60HZ_BIT: u16 = 1 << 12;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LineFrequency {
    F50,
    F60,
}

impl LineFrequency {
    pub fn from_code(code: u16) -> Option<Self> {
        if !LINE_FREQ_CODES.iter().any(|(c, _)| *c == code) {
            return None;
        }
        if code & LINE_FREQ_60HZ_BIT != 0 {
            Some(LineFrequency::F60)
        } else {
            Some(LineFrequency::F50)
        }
    }

    pub fn hz(&self) -> u32 {
        match self {
            LineFrequency::F50 => 50,
            LineFrequency::F60 => 60,
        }
    }

    /// duration of one line cycle
    pub fn cycle_period(&self) -> Duration {
        Duration::from_hz(self.hz() as u64)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PgaGain {
    /// up to 10 A
    X1,
    /// 100 A
    X2,
    /// 100 A - 200 A
    X4,
}

impl PgaGain {
    pub fn from_mmode1(value: u16) -> Option<Self> {
        match value {
            0 => Some(PgaGain::X1),
            21 => Some(PgaGain::X2),
            42 => Some(PgaGain::X4),
            _ => None,
        }
    }

    pub fn mmode1(&self) -> u16 {
        match self {
            PgaGain::X1 => 0,
            PgaGain::X2 => 21,
            PgaGain::X4 => 42,
        }
    }

    pub fn multiplier(&self) -> f32 {
        match self {
            PgaGain::X1 => 1.0,
            PgaGain::X2 => 2.0,
            PgaGain::X4 => 4.0,
        }
    }
}

#[derive(Copy, Clone, Debug)]
pub struct Preset {
    pub name: &'static str,
    pub gain: u16,
}

pub const VOLTAGE_PRESETS: &[Preset] = &[
    Preset {
        name: "jameco-112336",
        gain: 42080,
    },
    Preset {
        name: "jameco-167151",
        gain: 32428,
    },
    // meter revision 1.3 and later
    Preset {
        name: "jameco-157041",
        gain: 7305,
    },
];

pub const CURRENT_PRESETS: &[Preset] = &[
    Preset {
        name: "sct-013-030",
        gain: 8650,
    },
    Preset {
        name: "sct-013-050",
        gain: 15420,
    },
    Preset {
        name: "sct-013-000",
        gain: 32498,
    },
];

pub fn lookup_preset(kind: ChannelKind, name: &str) -> Option<u16> {
    let table = match kind {
        ChannelKind::Voltage => VOLTAGE_PRESETS,
        ChannelKind::Current => CURRENT_PRESETS,
    };
    table
        .iter()
        .find(|p| p.name.eq_ignore_ascii_case(name))
        .map(|p| p.gain)
}

pub const VOLTAGE_GAIN_RANGE: RangeInclusive<u16> = 3000..=65535;
pub const CURRENT_GAIN_RANGE: RangeInclusive<u16> = 4000..=65535;

// raw waveform count to volts / amps at unity gain
pub const VOLTAGE_COUNT_LSB: f32 = 1e-6;
pub const CURRENT_COUNT_LSB: f32 = 1e-8;

// register LSBs in direct register mode
pub const DIRECT_VOLTAGE_LSB: f32 = 0.01;
pub const DIRECT_CURRENT_LSB: f32 = 0.001;
pub const DIRECT_POWER_LSB: f32 = 0.00032;
pub const DIRECT_PF_LSB: f32 = 0.001;
pub const DIRECT_ANGLE_LSB: f32 = 0.1;
pub const DIRECT_FREQ_LSB: f32 = 0.01;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ChannelCalibration {
    pub channel: Channel,
    pub gain: u16,
}

/// Validated calibration, immutable while a cycle is computed.
#[derive(Clone, Debug, PartialEq)]
pub struct CalibrationProfile {
    line_freq_code: u16,
    line_freq: LineFrequency,
    pga: PgaGain,
    boards: Vec<BoardCalibration, MAX_BOARDS>,
}

impl CalibrationProfile {
    pub fn from_config(config: &CalibrationConfig) -> Result<Self, MeterError> {
        let line_freq = LineFrequency::from_code(config.line_freq)
            .ok_or(MeterError::InvalidCalibration(CalibrationField::LineFreq))?;
        let pga = PgaGain::from_mmode1(config.pga_gain)
            .ok_or(MeterError::InvalidCalibration(CalibrationField::PgaGain))?;
        let profile = Self {
            line_freq_code: config.line_freq,
            line_freq,
            pga,
            boards: config.boards.clone(),
        };
        for entry in profile.channels() {
            if !gain_in_range(entry.channel, entry.gain) {
                return Err(MeterError::InvalidCalibration(CalibrationField::Gain(entry.channel)));
            }
        }
        Ok(profile)
    }

    pub fn to_config(&self) -> CalibrationConfig {
        CalibrationConfig {
            line_freq: self.line_freq_code,
            pga_gain: self.pga.mmode1(),
            boards: self.boards.clone(),
        }
    }

    pub fn line_freq_code(&self) -> u16 {
        self.line_freq_code
    }

    pub fn line_frequency(&self) -> LineFrequency {
        self.line_freq
    }

    pub fn pga(&self) -> PgaGain {
        self.pga
    }

    pub fn board_count(&self) -> usize {
        self.boards.len()
    }

    pub fn board(&self, board: usize) -> Option<&BoardCalibration> {
        self.boards.get(board)
    }

    pub fn gain_for(&self, channel: Channel) -> Option<u16> {
        let board = self.boards.get(channel.board() as usize)?;
        let index = channel.index() as usize;
        match channel {
            Channel::Voltage(_) => board.voltage_gain.get(index).copied(),
            Channel::Current(_) => board.current_gain.get(index).copied(),
        }
    }

    fn gain_mut(&mut self, channel: Channel) -> Option<&mut u16> {
        let board = self.boards.get_mut(channel.board() as usize)?;
        let index = channel.index() as usize;
        match channel {
            Channel::Voltage(_) => board.voltage_gain.get_mut(index),
            Channel::Current(_) => board.current_gain.get_mut(index),
        }
    }

    /// all voltage channels followed by all current channels
    pub fn channels(&self) -> impl Iterator<Item = ChannelCalibration> + '_ {
        let voltage = self.boards.iter().enumerate().flat_map(|(b, cal)| {
            cal.voltage_gain.iter().enumerate().filter_map(move |(i, gain)| {
                let channel = Channel::new(ChannelKind::Voltage, b as u8, i as u8)?;
                Some(ChannelCalibration { channel, gain: *gain })
            })
        });
        let current = self.boards.iter().enumerate().flat_map(|(b, cal)| {
            cal.current_gain.iter().enumerate().filter_map(move |(i, gain)| {
                let channel = Channel::new(ChannelKind::Current, b as u8, i as u8)?;
                Some(ChannelCalibration { channel, gain: *gain })
            })
        });
        voltage.chain(current)
    }
}

fn gain_in_range(channel: Channel, gain: u16) -> bool {
    match channel.kind() {
        ChannelKind::Voltage => VOLTAGE_GAIN_RANGE.contains(&gain),
        ChannelKind::Current => CURRENT_GAIN_RANGE.contains(&gain),
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct OverrideReport {
    pub applied: usize,
    pub rejected: usize,
}

impl OverrideReport {
    fn record(&mut self, result: Result<(), MeterError>) {
        match result {
            Ok(()) => self.applied += 1,
            Err(e) => {
                warn!("override rejected: {e}");
                self.rejected += 1;
            }
        }
    }
}

/// Active calibration plus overrides staged for the next cycle boundary.
pub struct CalibrationStore {
    active: CalibrationProfile,
    pending: Option<CalibrationProfile>,
}

impl CalibrationStore {
    pub fn new(config: CalibrationConfig) -> Result<Self, MeterError> {
        Ok(Self {
            active: CalibrationProfile::from_config(&config)?,
            pending: None,
        })
    }

    /// load options and calibration from storage, falls back to compiled defaults
    pub fn restore<S: ReadStorage>(storage: &mut S) -> (MeterOptions, Self) {
        match config::read_config(storage) {
            Ok((options, calibration)) => match Self::new(calibration) {
                Ok(store) if store.active.board_count() >= options.board_count() => {
                    info!("loaded config from storage");
                    return (options, store);
                }
                _ => warn!("stored calibration invalid"),
            },
            Err(e) => warn!("error loading config: {e}"),
        }

        warn!("using default config");
        let options = MeterOptions::default();
        let store = Self::with_defaults(options.board_count());
        (options, store)
    }

    /// compiled-in calibration for `boards` boards
    pub fn with_defaults(boards: usize) -> Self {
        let config = CalibrationConfig::with_boards(boards);
        Self {
            active: CalibrationProfile {
                line_freq_code: config.line_freq,
                line_freq: LineFrequency::from_code(config.line_freq).unwrap_or(LineFrequency::F60),
                pga: PgaGain::from_mmode1(config.pga_gain).unwrap_or(PgaGain::X1),
                boards: config.boards,
            },
            pending: None,
        }
    }

    /// save options and the latest accepted calibration
    pub fn persist<S: Storage>(&self, storage: &mut S, options: &MeterOptions) -> Result<(), MeterError> {
        let config = self.latest().to_config();
        let n = config::write_config(storage, options, &config)?;
        info!("saved config, {n} bytes");
        Ok(())
    }

    pub fn profile(&self) -> &CalibrationProfile {
        &self.active
    }

    pub fn config(&self) -> CalibrationConfig {
        self.active.to_config()
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    fn latest(&self) -> &CalibrationProfile {
        self.pending.as_ref().unwrap_or(&self.active)
    }

    /// validate and stage a single field, the prior value is kept on error
    pub fn override_field(&mut self, field: CalibrationField, value: u16) -> Result<(), MeterError> {
        let mut staged = self.latest().clone();
        let invalid = MeterError::InvalidCalibration(field);
        match field {
            CalibrationField::LineFreq => {
                staged.line_freq = LineFrequency::from_code(value).ok_or(invalid)?;
                staged.line_freq_code = value;
            }
            CalibrationField::PgaGain => {
                staged.pga = PgaGain::from_mmode1(value).ok_or(invalid)?;
            }
            CalibrationField::Gain(channel) => {
                if !gain_in_range(channel, value) {
                    return Err(invalid);
                }
                *staged.gain_mut(channel).ok_or(invalid)? = value;
            }
        }
        self.pending = Some(staged);
        Ok(())
    }

    pub fn override_preset(&mut self, channel: Channel, name: &str) -> Result<(), MeterError> {
        let gain = lookup_preset(channel.kind(), name)
            .ok_or(MeterError::InvalidCalibration(CalibrationField::Gain(channel)))?;
        self.override_field(CalibrationField::Gain(channel), gain)
    }

    pub fn apply_overrides(&mut self, overrides: &CalibrationOverrides) -> OverrideReport {
        let mut report = OverrideReport::default();

        if let Some(value) = overrides.line_freq {
            report.record(self.override_field(CalibrationField::LineFreq, value));
        }
        if let Some(value) = overrides.pga_gain {
            report.record(self.override_field(CalibrationField::PgaGain, value));
        }
        for entry in overrides.channels.iter() {
            let Some(channel) = Channel::new(entry.kind, entry.board, entry.index) else {
                warn!("override for unknown channel board {} index {}", entry.board, entry.index);
                report.rejected += 1;
                continue;
            };
            if let Some(gain) = entry.gain {
                report.record(self.override_field(CalibrationField::Gain(channel), gain));
            }
            if let Some(preset) = entry.preset.as_ref() {
                report.record(self.override_preset(channel, preset));
            }
        }
        report
    }

    /// promote staged overrides, returns true if the active profile changed
    pub fn apply_pending(&mut self) -> bool {
        match self.pending.take() {
            Some(staged) if staged != self.active => {
                self.active = staged;
                true
            }
            _ => false,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ScaledWaveformPoint {
    pub channel: Channel,
    /// volts or amps
    pub physical_value: f32,
    pub cycle_index: u32,
}

pub fn scale(sample: &RawSample, profile: &CalibrationProfile) -> Result<ScaledWaveformPoint, MeterError> {
    let gain = profile
        .gain_for(sample.channel)
        .ok_or(MeterError::UnknownChannel(sample.channel))?;
    let factor = match sample.channel.kind() {
        ChannelKind::Voltage => VOLTAGE_COUNT_LSB,
        ChannelKind::Current => CURRENT_COUNT_LSB / profile.pga.multiplier(),
    };
    Ok(ScaledWaveformPoint {
        channel: sample.channel,
        physical_value: sample.raw_count as f32 * gain as f32 * factor,
        cycle_index: sample.cycle_index,
    })
}
