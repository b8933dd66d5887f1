use heapless::Vec;
use serde::Serialize;

use crate::aggregate::{AggregatedSnapshot, ChannelSummary};
use crate::channel::MAX_CURRENT_CHANNELS;
use crate::error::MeterError;

// fixed point, no floats on the wire

#[derive(Serialize, Debug, PartialEq)]
pub struct SnapshotReport {
    #[serde(rename = "seq")]
    pub interval: u32,
    pub cycles: u32,
    /// milliseconds
    #[serde(rename = "dur")]
    pub duration: u32,
    /// 3 decimal places
    #[serde(rename = "freq", skip_serializing_if = "Option::is_none")]
    pub frequency: Option<u32>,
    #[serde(rename = "miss", skip_serializing_if = "is_zero")]
    pub missing_boards: u8,
    #[serde(rename = "ch")]
    pub channels: Vec<ChannelReport, MAX_CURRENT_CHANNELS>,
}

#[derive(Serialize, Debug, PartialEq)]
pub struct ChannelReport {
    pub id: u8,
    /// 3 decimal places
    pub volt: i32,
    /// 3 decimal places
    pub curr: i32,
    /// active power, 3 decimal places
    pub powa: i32,
    /// reactive power, 3 decimal places
    pub powr: i32,
    /// apparent power, 3 decimal places
    pub pows: i32,
    /// 3 decimal places
    pub pf: i32,
    /// 1 decimal place
    pub ang: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub powf: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub powh: Option<i32>,
    /// net energy of the interval, 3 decimal places
    pub engy: i64,
    /// lifetime import / export, 3 decimal places
    pub imp: i64,
    pub exp: i64,
}

fn is_zero(v: &u8) -> bool {
    *v == 0
}

fn milli(v: f32) -> i32 {
    libm::roundf(v * 1e3) as i32
}

fn milli64(v: f64) -> i64 {
    libm::round(v * 1e3) as i64
}

impl From<&ChannelSummary> for ChannelReport {
    fn from(c: &ChannelSummary) -> Self {
        Self {
            id: c.channel.id(),
            volt: milli(c.voltage_rms),
            curr: milli(c.current_rms),
            powa: milli(c.real_power),
            powr: milli(c.reactive_power),
            pows: milli(c.apparent_power),
            pf: milli(c.power_factor),
            ang: libm::roundf(c.phase_angle * 10.0) as i32,
            powf: c.fundamental_power.map(milli),
            powh: c.harmonic_power.map(milli),
            engy: milli64(c.energy_wh as f64),
            imp: milli64(c.total_import_wh),
            exp: milli64(c.total_export_wh),
        }
    }
}

impl From<&AggregatedSnapshot> for SnapshotReport {
    fn from(s: &AggregatedSnapshot) -> Self {
        Self {
            interval: s.interval,
            cycles: s.cycles,
            duration: libm::roundf(s.duration_s * 1e3) as u32,
            frequency: s.frequency_hz.map(|f| libm::roundf(f * 1e3) as u32),
            missing_boards: s.missing_boards,
            channels: s.channels.iter().map(ChannelReport::from).collect(),
        }
    }
}

/// write a snapshot as JSON into `buffer`, returns the number of bytes used
pub fn encode_snapshot(snapshot: &AggregatedSnapshot, buffer: &mut [u8]) -> Result<usize, MeterError> {
    let report = SnapshotReport::from(snapshot);
    serde_json_core::to_slice(&report, buffer).map_err(|_| MeterError::Encoding)
}
