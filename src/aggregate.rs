use embassy_time::Duration;
use heapless::Vec;

use crate::channel::{Channel, MAX_CURRENT_CHANNELS};
use crate::power::ChannelMetrics;

const SECONDS_PER_HOUR: f32 = 3600.0;

#[derive(Copy, Clone, Debug)]
struct ChannelAccumulator {
    channel: Channel,
    voltage_channel: Channel,
    cycles: u32,
    voltage_rms: f32,
    current_rms: f32,
    real_power: f32,
    apparent_power: f32,
    reactive_power: f32,
    fundamental_power: Option<f32>,
    harmonic_power: Option<f32>,
    import_wh: f32,
    export_wh: f32,
}

impl ChannelAccumulator {
    fn new(metrics: &ChannelMetrics) -> Self {
        Self {
            channel: metrics.channel,
            voltage_channel: metrics.voltage_channel,
            cycles: 0,
            voltage_rms: 0.0,
            current_rms: 0.0,
            real_power: 0.0,
            apparent_power: 0.0,
            reactive_power: 0.0,
            fundamental_power: None,
            harmonic_power: None,
            import_wh: 0.0,
            export_wh: 0.0,
        }
    }
}

#[derive(Default)]
struct Interval {
    cycles: u32,
    duration_s: f32,
    frequency_sum: f32,
    frequency_count: u32,
    missing_boards: u8,
    channels: Vec<ChannelAccumulator, MAX_CURRENT_CHANNELS>,
}

/// Energy since the aggregator was created, not reset by `finalize`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LifetimeEnergy {
    pub channel: Channel,
    pub import_wh: f64,
    pub export_wh: f64,
}

/// Averages of one current channel over a reporting interval.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ChannelSummary {
    pub channel: Channel,
    pub voltage_channel: Channel,
    /// cycles in which the channel was measured
    pub cycles: u32,
    pub voltage_rms: f32,
    pub current_rms: f32,
    pub real_power: f32,
    pub apparent_power: f32,
    pub reactive_power: f32,
    /// derived from the averaged real and apparent power
    pub power_factor: f32,
    pub phase_angle: f32,
    pub fundamental_power: Option<f32>,
    pub harmonic_power: Option<f32>,
    /// net energy of the interval
    pub energy_wh: f32,
    pub import_wh: f32,
    pub export_wh: f32,
    pub total_import_wh: f64,
    pub total_export_wh: f64,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AggregatedSnapshot {
    /// sequence number, starts at 0
    pub interval: u32,
    pub cycles: u32,
    pub duration_s: f32,
    /// measured line frequency
    pub frequency_hz: Option<f32>,
    /// bit n set: board n was missing in at least one cycle
    pub missing_boards: u8,
    pub channels: Vec<ChannelSummary, MAX_CURRENT_CHANNELS>,
}

impl AggregatedSnapshot {
    pub fn channel(&self, channel: Channel) -> Option<&ChannelSummary> {
        self.channels.iter().find(|c| c.channel == channel)
    }
}

#[derive(Default)]
pub struct Aggregator {
    sequence: u32,
    current: Interval,
    lifetime: Vec<LifetimeEnergy, MAX_CURRENT_CHANNELS>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cycles(&self) -> u32 {
        self.current.cycles
    }

    pub fn lifetime(&self, channel: Channel) -> Option<&LifetimeEnergy> {
        self.lifetime.iter().find(|l| l.channel == channel)
    }

    /// fold one cycle of one channel into the interval
    pub fn accumulate(&mut self, metrics: &ChannelMetrics, elapsed: Duration) {
        let channels = &mut self.current.channels;
        let idx = match channels.iter().position(|c| c.channel == metrics.channel) {
            Some(idx) => idx,
            None => {
                if channels.push(ChannelAccumulator::new(metrics)).is_err() {
                    return;
                }
                channels.len() - 1
            }
        };
        let acc = &mut channels[idx];

        acc.cycles += 1;
        acc.voltage_channel = metrics.voltage_channel;
        acc.voltage_rms += metrics.voltage_rms;
        acc.current_rms += metrics.current_rms;
        acc.real_power += metrics.real_power;
        acc.apparent_power += metrics.apparent_power;
        acc.reactive_power += metrics.reactive_power;
        if let Some(p) = metrics.fundamental_power {
            *acc.fundamental_power.get_or_insert(0.0) += p;
        }
        if let Some(p) = metrics.harmonic_power {
            *acc.harmonic_power.get_or_insert(0.0) += p;
        }

        let energy_wh = metrics.real_power * elapsed.as_micros() as f32 / 1e6 / SECONDS_PER_HOUR;
        let (import_wh, export_wh) = if energy_wh >= 0.0 {
            (energy_wh, 0.0)
        } else {
            (0.0, -energy_wh)
        };
        acc.import_wh += import_wh;
        acc.export_wh += export_wh;

        let lifetime = match self.lifetime.iter().position(|l| l.channel == metrics.channel) {
            Some(idx) => &mut self.lifetime[idx],
            None => {
                let entry = LifetimeEnergy {
                    channel: metrics.channel,
                    import_wh: 0.0,
                    export_wh: 0.0,
                };
                if self.lifetime.push(entry).is_err() {
                    return;
                }
                let last = self.lifetime.len() - 1;
                &mut self.lifetime[last]
            }
        };
        lifetime.import_wh += import_wh as f64;
        lifetime.export_wh += export_wh as f64;
    }

    pub fn end_cycle(&mut self, elapsed: Duration, missing_boards: u8) {
        self.current.cycles += 1;
        self.current.duration_s += elapsed.as_micros() as f32 / 1e6;
        self.current.missing_boards |= missing_boards;
    }

    pub fn record_frequency(&mut self, hz: f32) {
        self.current.frequency_sum += hz;
        self.current.frequency_count += 1;
    }

    /// close the interval and start a new one, lifetime totals are kept
    pub fn finalize(&mut self) -> AggregatedSnapshot {
        let interval = core::mem::take(&mut self.current);
        let sequence = self.sequence;
        self.sequence = self.sequence.wrapping_add(1);

        let mut snapshot = AggregatedSnapshot {
            interval: sequence,
            cycles: interval.cycles,
            duration_s: interval.duration_s,
            frequency_hz: (interval.frequency_count > 0)
                .then(|| interval.frequency_sum / interval.frequency_count as f32),
            missing_boards: interval.missing_boards,
            channels: Vec::new(),
        };

        for acc in interval.channels.iter() {
            let n = acc.cycles.max(1) as f32;
            let real_power = acc.real_power / n;
            let apparent_power = (acc.apparent_power / n).max(libm::fabsf(real_power));
            let power_factor = if apparent_power > 0.0 {
                (real_power / apparent_power).clamp(-1.0, 1.0)
            } else {
                0.0
            };
            let angle = libm::acosf(libm::fabsf(power_factor)).to_degrees();
            let lifetime = self.lifetime(acc.channel).copied();

            let _ = snapshot.channels.push(ChannelSummary {
                channel: acc.channel,
                voltage_channel: acc.voltage_channel,
                cycles: acc.cycles,
                voltage_rms: acc.voltage_rms / n,
                current_rms: acc.current_rms / n,
                real_power,
                apparent_power,
                reactive_power: acc.reactive_power / n,
                power_factor,
                phase_angle: match power_factor {
                    pf if pf == 0.0 && apparent_power == 0.0 => 0.0,
                    pf if pf < 0.0 => -angle,
                    _ => angle,
                },
                fundamental_power: acc.fundamental_power.map(|p| p / n),
                harmonic_power: acc.harmonic_power.map(|p| p / n),
                energy_wh: acc.import_wh - acc.export_wh,
                import_wh: acc.import_wh,
                export_wh: acc.export_wh,
                total_import_wh: lifetime.map(|l| l.import_wh).unwrap_or(0.0),
                total_export_wh: lifetime.map(|l| l.export_wh).unwrap_or(0.0),
            });
        }
        snapshot
    }
}
