use core::f64::consts::PI;

use rand_core::RngCore;

use super::frame::{self, CrcError};
use super::MeterDriver;
use crate::meter::calibration::{
    PgaGain, CURRENT_COUNT_LSB, DIRECT_ANGLE_LSB, DIRECT_CURRENT_LSB, DIRECT_FREQ_LSB, DIRECT_PF_LSB,
    DIRECT_POWER_LSB, DIRECT_VOLTAGE_LSB, VOLTAGE_COUNT_LSB,
};
use crate::meter::chip::Reg;

const REG_COUNT: usize = 96;

/// One load on a CT.
#[derive(Copy, Clone, Debug, Default)]
pub struct LoadModel {
    /// fundamental RMS current in amps
    pub current_rms: f32,
    /// current lagging its voltage, degrees
    pub phase_deg: f32,
    /// third harmonic amplitude relative to the fundamental
    pub third_harmonic: f32,
}

/// Signals seen by a simulated board.
#[derive(Copy, Clone, Debug)]
pub struct WaveformModel {
    pub frequency_hz: f32,
    /// rate at which `latch` advances simulated time
    pub sample_rate_hz: f32,
    pub voltage_rms: [f32; 2],
    pub voltage_phase_deg: [f32; 2],
    pub loads: [LoadModel; 6],
    /// voltage input feeding each CT
    pub load_voltage: [usize; 6],
    /// gains that reproduce the modelled values exactly
    pub true_voltage_gain: u16,
    pub true_current_gain: u16,
    pub noise_counts: u32,
}

impl Default for WaveformModel {
    fn default() -> Self {
        Self {
            frequency_hz: 60.0,
            sample_rate_hz: 60.0 * 32.0,
            voltage_rms: [120.0, 120.0],
            voltage_phase_deg: [0.0, 180.0],
            loads: Default::default(),
            load_voltage: [0, 0, 0, 1, 1, 1],
            true_voltage_gain: 7305,
            true_current_gain: 32498,
            noise_counts: 0,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum SimulatedError {
    NoResponse,
    Crc(CrcError),
}

impl From<CrcError> for SimulatedError {
    fn from(e: CrcError) -> Self {
        SimulatedError::Crc(e)
    }
}

/// Board front-end driven by a `WaveformModel`, speaking the same frames as the SPI bus.
pub struct SimulatedDriver<R> {
    model: WaveformModel,
    rng: R,
    regs: [u32; REG_COUNT],
    next_read: Option<u8>,
    sample_index: u64,
    responsive: bool,
    hang: bool,
}

impl<R: RngCore> SimulatedDriver<R> {
    pub fn new(model: WaveformModel, rng: R) -> Self {
        Self {
            model,
            rng,
            regs: [0; REG_COUNT],
            next_read: None,
            sample_index: 0,
            responsive: true,
            hang: false,
        }
    }

    pub fn model_mut(&mut self) -> &mut WaveformModel {
        &mut self.model
    }

    /// an unresponsive board fails every transaction
    pub fn set_responsive(&mut self, responsive: bool) {
        self.responsive = responsive;
    }

    /// a hung board never completes a transaction
    pub fn set_hang(&mut self, hang: bool) {
        self.hang = hang;
    }

    async fn check(&self) -> Result<(), SimulatedError> {
        if self.hang {
            core::future::pending::<()>().await;
        }
        if !self.responsive {
            return Err(SimulatedError::NoResponse);
        }
        Ok(())
    }

    fn reg(&self, reg: Reg) -> u32 {
        self.regs[reg as usize]
    }

    fn gain_ratio(&self, reg: Reg, true_gain: u16) -> f32 {
        (self.reg(reg) & 0xffff) as f32 / true_gain as f32
    }

    fn write(&mut self, addr: u8, value: u16) {
        let idx = (addr / 2) as usize;
        if idx >= REG_COUNT {
            return;
        }
        if idx == Reg::SOFT_RESET as usize && value == 0x789A {
            self.regs = [0; REG_COUNT];
        }
        let reg = &mut self.regs[idx];
        if addr % 2 == 0 {
            *reg = (*reg & 0xffff_0000) | value as u32;
        } else {
            *reg = (*reg & 0x0000_ffff) | ((value as u32) << 16);
        }
        self.regs[Reg::LAST_DATA as usize] = value as u32;
    }

    fn read(&self, addr: u8) -> u32 {
        let idx = (addr / 2) as usize;
        if idx >= REG_COUNT {
            return 0;
        }
        self.direct_value(idx).unwrap_or(self.regs[idx])
    }

    fn voltage_rms(&self, v: usize) -> f32 {
        self.model.voltage_rms[v] * self.gain_ratio(Reg::UGAIN[v], self.model.true_voltage_gain)
    }

    /// (fundamental RMS, total RMS) current as measured
    fn current_rms(&self, ct: usize) -> (f32, f32) {
        let load = &self.model.loads[ct];
        let ratio = self.gain_ratio(Reg::IGAIN[ct], self.model.true_current_gain);
        let fundamental = load.current_rms * ratio;
        let h = load.third_harmonic;
        (fundamental, fundamental * libm::sqrtf(1.0 + h * h))
    }

    /// metering registers computed from the model
    fn direct_value(&self, idx: usize) -> Option<u32> {
        let find = |regs: &[Reg]| regs.iter().position(|r| *r as usize == idx);
        let counts = |value: f32, lsb: f32| libm::roundf(value / lsb) as i32 as u32;

        if let Some(v) = find(&Reg::URMS) {
            return Some(counts(self.voltage_rms(v), DIRECT_VOLTAGE_LSB));
        }
        if idx == Reg::FREQ as usize {
            return Some(counts(self.model.frequency_hz, DIRECT_FREQ_LSB));
        }
        let tables: [(&[Reg], u8); 8] = [
            (&Reg::IRMS, 0),
            (&Reg::PMEAN, 1),
            (&Reg::QMEAN, 2),
            (&Reg::SMEAN, 3),
            (&Reg::PFMEAN, 4),
            (&Reg::PANGLE, 5),
            (&Reg::PMEANF, 6),
            (&Reg::PMEANH, 7),
        ];
        let (ct, quantity) = tables
            .iter()
            .find_map(|(regs, q)| find(regs).map(|ct| (ct, *q)))?;

        let load = &self.model.loads[ct];
        let vrms = self.voltage_rms(self.model.load_voltage[ct]);
        let (i_fund, i_total) = self.current_rms(ct);
        let phi = load.phase_deg.to_radians();
        let p = vrms * i_fund * libm::cosf(phi);
        let q = vrms * i_fund * libm::sinf(phi);
        let s = vrms * i_total;
        let pf = if s > 0.0 { p / s } else { 0.0 };

        Some(match quantity {
            0 => counts(i_total, DIRECT_CURRENT_LSB),
            1 | 6 => counts(p, DIRECT_POWER_LSB),
            2 => counts(q, DIRECT_POWER_LSB),
            3 => counts(s, DIRECT_POWER_LSB),
            4 => counts(pf, DIRECT_PF_LSB),
            5 => counts(load.phase_deg, DIRECT_ANGLE_LSB),
            _ => 0,
        })
    }

    fn noise(&mut self) -> i32 {
        let n = self.model.noise_counts;
        if n == 0 {
            return 0;
        }
        (self.rng.next_u32() % (2 * n + 1)) as i32 - n as i32
    }

    /// fill the waveform registers for the next sampling instant
    fn capture(&mut self) {
        let m = self.model;
        let t = self.sample_index as f64 / m.sample_rate_hz as f64;
        let theta = libm::fmod(2.0 * PI * m.frequency_hz as f64 * t, 2.0 * PI);
        self.sample_index += 1;

        let pga = PgaGain::from_mmode1((self.reg(Reg::MMODE1) & 0xffff) as u16)
            .unwrap_or(PgaGain::X1)
            .multiplier();
        let v_lsb = m.true_voltage_gain as f32 * VOLTAGE_COUNT_LSB;
        let i_lsb = m.true_current_gain as f32 * CURRENT_COUNT_LSB / pga;

        let v_angle = |v: usize| theta + (m.voltage_phase_deg[v] as f64).to_radians();

        for v in 0..2 {
            let value = core::f32::consts::SQRT_2 * m.voltage_rms[v] * libm::sin(v_angle(v)) as f32;
            let count = libm::roundf(value / v_lsb) as i32 + self.noise();
            self.regs[Reg::VWV[v] as usize] = count as u32;
        }
        for ct in 0..6 {
            let load = m.loads[ct];
            let a = v_angle(m.load_voltage[ct]) - (load.phase_deg as f64).to_radians();
            let fundamental = libm::sin(a) as f32;
            let harmonic = load.third_harmonic * libm::sin(3.0 * a) as f32;
            let value = core::f32::consts::SQRT_2 * load.current_rms * (fundamental + harmonic);
            let count = libm::roundf(value / i_lsb) as i32 + self.noise();
            self.regs[Reg::IWV[ct] as usize] = count as u32;
        }
    }
}

impl<R: RngCore> MeterDriver for SimulatedDriver<R> {
    type Error = SimulatedError;

    async fn transaction(
        &mut self,
        next_read_addr: Option<u8>,
        write: Option<(u8, u16)>,
    ) -> Result<u32, SimulatedError> {
        self.check().await?;

        let request = frame::encode_request(next_read_addr, write);
        let (next_read, write) = frame::decode_request(&request)?;

        let value = self.next_read.map(|addr| self.read(addr)).unwrap_or(0);
        if let Some((addr, val)) = write {
            self.write(addr, val);
        }
        self.next_read = next_read;

        let response = frame::encode_response(value);
        Ok(frame::decode_response(&response)?)
    }

    async fn hardware_reset(&mut self) -> Result<(), SimulatedError> {
        self.check().await?;
        self.regs = [0; REG_COUNT];
        self.next_read = None;
        Ok(())
    }

    async fn latch(&mut self) -> Result<(), SimulatedError> {
        self.check().await?;
        self.capture();
        Ok(())
    }
}
