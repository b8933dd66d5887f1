use core::f32::consts::PI;

use heapless::Vec;

use crate::channel::{Channel, ChannelKind, CURRENT_CHANNELS_PER_BOARD, VOLTAGE_CHANNELS_PER_BOARD};
use crate::config::MAX_SAMPLES_PER_CYCLE;
use crate::meter::calibration::{
    DIRECT_ANGLE_LSB, DIRECT_CURRENT_LSB, DIRECT_PF_LSB, DIRECT_POWER_LSB, DIRECT_VOLTAGE_LSB,
};
use crate::meter::sample::DirectReading;

/// below this RMS current (amps) a channel is treated as idle
pub const CURRENT_NOISE_FLOOR: f32 = 0.005;

/// Power quality of one current channel over one line cycle.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ChannelMetrics {
    pub channel: Channel,
    /// voltage channel this CT is measured against
    pub voltage_channel: Channel,
    pub voltage_rms: f32,
    pub current_rms: f32,
    /// watts, negative when exporting
    pub real_power: f32,
    /// volt-amperes, always >= |real_power|
    pub apparent_power: f32,
    /// var, positive when the current lags (inductive)
    pub reactive_power: f32,
    pub power_factor: f32,
    /// degrees
    pub phase_angle: f32,
    pub fundamental_power: Option<f32>,
    pub harmonic_power: Option<f32>,
}

impl ChannelMetrics {
    fn idle(channel: Channel, voltage_channel: Channel, voltage_rms: f32, current_rms: f32, extended: bool) -> Self {
        Self {
            channel,
            voltage_channel,
            voltage_rms,
            current_rms,
            real_power: 0.0,
            apparent_power: 0.0,
            reactive_power: 0.0,
            power_factor: 0.0,
            phase_angle: 0.0,
            fundamental_power: extended.then_some(0.0),
            harmonic_power: extended.then_some(0.0),
        }
    }
}

/// Scaled samples of one board over one line cycle.
#[derive(Clone, Debug)]
pub struct CycleWaveforms {
    pub voltage: [[f32; MAX_SAMPLES_PER_CYCLE]; VOLTAGE_CHANNELS_PER_BOARD],
    pub current: [[f32; MAX_SAMPLES_PER_CYCLE]; CURRENT_CHANNELS_PER_BOARD],
    pub len: usize,
}

impl Default for CycleWaveforms {
    fn default() -> Self {
        Self {
            voltage: [[0.0; MAX_SAMPLES_PER_CYCLE]; VOLTAGE_CHANNELS_PER_BOARD],
            current: [[0.0; MAX_SAMPLES_PER_CYCLE]; CURRENT_CHANNELS_PER_BOARD],
            len: 0,
        }
    }
}

impl CycleWaveforms {
    pub fn clear(&mut self) {
        self.len = 0;
    }

    pub fn voltage(&self, index: usize) -> &[f32] {
        &self.voltage[index][..self.len]
    }

    pub fn current(&self, index: usize) -> &[f32] {
        &self.current[index][..self.len]
    }
}

fn rms(x: &[f32]) -> f32 {
    if x.is_empty() {
        return 0.0;
    }
    libm::sqrtf(x.iter().map(|a| a * a).sum::<f32>() / x.len() as f32)
}

/// first harmonic of a signal covering exactly one period, as (re, im) peak amplitude
fn fundamental_bin(x: &[f32]) -> (f32, f32) {
    let n = x.len() as f32;
    let (mut re, mut im) = (0.0f32, 0.0f32);
    for (k, a) in x.iter().enumerate() {
        let w = 2.0 * PI * k as f32 / n;
        re += a * libm::cosf(w);
        im -= a * libm::sinf(w);
    }
    (2.0 * re / n, 2.0 * im / n)
}

/// `v` and `i` hold one line cycle of equally spaced samples
pub fn compute_channel(channel: Channel, voltage_channel: Channel, v: &[f32], i: &[f32], extended: bool) -> ChannelMetrics {
    let n = v.len().min(i.len());
    let (v, i) = (&v[..n], &i[..n]);
    let voltage_rms = rms(v);
    let current_rms = rms(i);

    if n == 0 || current_rms < CURRENT_NOISE_FLOOR {
        return ChannelMetrics::idle(channel, voltage_channel, voltage_rms, current_rms, extended);
    }

    let real_power = v.iter().zip(i).map(|(a, b)| a * b).sum::<f32>() / n as f32;
    let apparent_power = (voltage_rms * current_rms).max(libm::fabsf(real_power));

    // v(t - T/4) * i(t) is positive when the current lags
    let shift = n / 4;
    let quadrature = (0..n).map(|k| v[(k + n - shift) % n] * i[k]).sum::<f32>();
    let magnitude = libm::sqrtf((apparent_power * apparent_power - real_power * real_power).max(0.0));
    let reactive_power = if quadrature < 0.0 { -magnitude } else { magnitude };

    let power_factor = if apparent_power > 0.0 {
        (real_power / apparent_power).clamp(-1.0, 1.0)
    } else {
        0.0
    };
    let angle = libm::acosf(libm::fabsf(power_factor)).to_degrees();
    let phase_angle = if power_factor < 0.0 { -angle } else { angle };

    let (fundamental_power, harmonic_power) = if extended {
        let (vr, vi) = fundamental_bin(v);
        let (ir, ii) = fundamental_bin(i);
        // 1/2 Re(V1 * conj(I1))
        let fundamental = 0.5 * (vr * ir + vi * ii);
        (Some(fundamental), Some(real_power - fundamental))
    } else {
        (None, None)
    };

    ChannelMetrics {
        channel,
        voltage_channel,
        voltage_rms,
        current_rms,
        real_power,
        apparent_power,
        reactive_power,
        power_factor,
        phase_angle,
        fundamental_power,
        harmonic_power,
    }
}

fn board_channels(board: u8, ct: usize, phase_map: &[u8; CURRENT_CHANNELS_PER_BOARD]) -> Option<(Channel, Channel)> {
    let voltage = phase_map[ct];
    Some((
        Channel::new(ChannelKind::Current, board, ct as u8)?,
        Channel::new(ChannelKind::Voltage, board, voltage)?,
    ))
}

/// metrics for every CT of one board, each paired with the voltage channel from `phase_map`
pub fn compute_cycle(
    board: u8,
    waveforms: &CycleWaveforms,
    phase_map: &[u8; CURRENT_CHANNELS_PER_BOARD],
    extended: bool,
) -> Vec<ChannelMetrics, CURRENT_CHANNELS_PER_BOARD> {
    let mut metrics = Vec::new();
    for ct in 0..CURRENT_CHANNELS_PER_BOARD {
        let Some((channel, voltage_channel)) = board_channels(board, ct, phase_map) else {
            continue;
        };
        let v = waveforms.voltage(voltage_channel.index() as usize);
        let i = waveforms.current(ct);
        let _ = metrics.push(compute_channel(channel, voltage_channel, v, i, extended));
    }
    metrics
}

/// metrics computed by the board, converted from register units
pub fn from_direct(
    board: u8,
    reading: &DirectReading,
    phase_map: &[u8; CURRENT_CHANNELS_PER_BOARD],
    extended: bool,
) -> Vec<ChannelMetrics, CURRENT_CHANNELS_PER_BOARD> {
    let mut metrics = Vec::new();
    for ct in 0..CURRENT_CHANNELS_PER_BOARD {
        let Some((channel, voltage_channel)) = board_channels(board, ct, phase_map) else {
            continue;
        };
        let voltage_rms = reading.urms[voltage_channel.index() as usize] as f32 * DIRECT_VOLTAGE_LSB;
        let current_rms = reading.irms[ct] as f32 * DIRECT_CURRENT_LSB;
        let real_power = reading.pmean[ct] as f32 * DIRECT_POWER_LSB;
        let apparent_power = (reading.smean[ct] as f32 * DIRECT_POWER_LSB).max(libm::fabsf(real_power));
        let _ = metrics.push(ChannelMetrics {
            channel,
            voltage_channel,
            voltage_rms,
            current_rms,
            real_power,
            apparent_power,
            reactive_power: reading.qmean[ct] as f32 * DIRECT_POWER_LSB,
            power_factor: (reading.pfmean[ct] as f32 * DIRECT_PF_LSB).clamp(-1.0, 1.0),
            phase_angle: (reading.pangle[ct] as f32 * DIRECT_ANGLE_LSB).clamp(-180.0, 180.0),
            fundamental_power: reading
                .pmeanf
                .filter(|_| extended)
                .map(|p| p[ct] as f32 * DIRECT_POWER_LSB),
            harmonic_power: reading
                .pmeanh
                .filter(|_| extended)
                .map(|p| p[ct] as f32 * DIRECT_POWER_LSB),
        });
    }
    metrics
}

#[cfg(test)]
mod tests {
    use super::*;

    const N: usize = 32;

    fn wave(rms: f32, phase_deg: f32, third: f32) -> [f32; N] {
        core::array::from_fn(|k| {
            let a = 2.0 * PI * k as f32 / N as f32 - phase_deg.to_radians();
            core::f32::consts::SQRT_2 * rms * (libm::sinf(a) + third * libm::sinf(3.0 * a))
        })
    }

    fn compute(v: &[f32], i: &[f32], extended: bool) -> ChannelMetrics {
        compute_channel(Channel::Current(0), Channel::Voltage(0), v, i, extended)
    }

    fn check_invariants(m: &ChannelMetrics) {
        assert!(m.apparent_power >= m.real_power.abs());
        assert!((-1.0..=1.0).contains(&m.power_factor));
        assert!((-180.0..=180.0).contains(&m.phase_angle));
    }

    #[test]
    fn resistive_load() {
        let m = compute(&wave(120.0, 0.0, 0.0), &wave(10.0, 0.0, 0.0), false);
        check_invariants(&m);
        assert!((m.voltage_rms - 120.0).abs() < 0.01);
        assert!((m.current_rms - 10.0).abs() < 0.01);
        assert!((m.real_power - 1200.0).abs() < 1.0);
        assert!(m.reactive_power.abs() < 5.0);
        assert!((m.power_factor - 1.0).abs() < 1e-3);
        assert!(m.phase_angle.abs() < 3.0);
        assert_eq!(m.fundamental_power, None);
    }

    #[test]
    fn lagging_and_leading_loads() {
        let lag = compute(&wave(120.0, 0.0, 0.0), &wave(10.0, 60.0, 0.0), false);
        check_invariants(&lag);
        assert!((lag.power_factor - 0.5).abs() < 1e-3);
        assert!((lag.phase_angle - 60.0).abs() < 0.5);
        assert!((lag.reactive_power - 1039.2).abs() < 2.0);

        let lead = compute(&wave(120.0, 0.0, 0.0), &wave(10.0, -60.0, 0.0), false);
        assert!((lead.reactive_power + 1039.2).abs() < 2.0);
        assert!((lead.real_power - 600.0).abs() < 1.0);
    }

    #[test]
    fn export_gives_negative_power_factor() {
        let m = compute(&wave(120.0, 0.0, 0.0), &wave(5.0, 150.0, 0.0), false);
        check_invariants(&m);
        assert!(m.real_power < 0.0);
        assert!(m.power_factor < 0.0);
        assert!((m.phase_angle + 30.0).abs() < 0.5);
    }

    #[test]
    fn zero_current_reports_zero() {
        let m = compute(&wave(120.0, 0.0, 0.0), &[0.0; N], true);
        check_invariants(&m);
        assert_eq!(m.real_power, 0.0);
        assert_eq!(m.apparent_power, 0.0);
        assert_eq!(m.power_factor, 0.0);
        assert_eq!(m.phase_angle, 0.0);
        assert_eq!(m.fundamental_power, Some(0.0));
        assert!((m.voltage_rms - 120.0).abs() < 0.01);
    }

    #[test]
    fn harmonic_power_is_split_off() {
        let m = compute(&wave(120.0, 0.0, 0.1), &wave(10.0, 0.0, 0.5), true);
        check_invariants(&m);
        let fundamental = m.fundamental_power.unwrap();
        let harmonic = m.harmonic_power.unwrap();
        assert!((fundamental - 1200.0).abs() < 1.0);
        // 2 * 120 * 0.1 * 10 * 0.5 / 2
        assert!((harmonic - 60.0).abs() < 1.0);
        assert!((m.real_power - fundamental - harmonic).abs() < 1e-3);
    }

    #[test]
    fn phase_map_selects_voltage_channel() {
        let mut waveforms = CycleWaveforms {
            len: N,
            ..Default::default()
        };
        waveforms.voltage[0][..N].copy_from_slice(&wave(120.0, 0.0, 0.0));
        waveforms.voltage[1][..N].copy_from_slice(&wave(120.0, 180.0, 0.0));
        for ct in 0..CURRENT_CHANNELS_PER_BOARD {
            waveforms.current[ct][..N].copy_from_slice(&wave(1.0, 0.0, 0.0));
        }

        let metrics = compute_cycle(1, &waveforms, &[0, 0, 0, 1, 1, 1], false);
        assert_eq!(metrics.len(), 6);
        assert_eq!(metrics[0].channel, Channel::Current(6));
        assert_eq!(metrics[0].voltage_channel, Channel::Voltage(2));
        assert_eq!(metrics[5].voltage_channel, Channel::Voltage(3));
        assert!(metrics[0].real_power > 0.0);
        assert!(metrics[5].real_power < 0.0);
    }
}
