/// Register bank of one metering board (two metering ICs behind one bus).
/// Registers are 32 bit wide and written as two 16 bit halves.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[allow(non_camel_case_types, unused)]
pub enum Reg {
    /// write 0x789A to reset
    SOFT_RESET = 0,
    /// 0x55AA unlocks configuration registers, 0x0000 locks them again
    CFG_ACCESS = 1,
    /// metering enable
    METER_EN = 2,
    /// echo of the last value written
    LAST_DATA = 3,
    /// line frequency code
    MMODE0 = 4,
    /// PGA gain
    MMODE1 = 5,
    UGAIN1 = 6,
    UGAIN2 = 7,
    IGAIN1 = 8,
    IGAIN2 = 9,
    IGAIN3 = 10,
    IGAIN4 = 11,
    IGAIN5 = 12,
    IGAIN6 = 13,

    // instantaneous waveform samples, latched on SYN
    V1WV = 16,
    V2WV = 17,
    I1WV = 18,
    I2WV = 19,
    I3WV = 20,
    I4WV = 21,
    I5WV = 22,
    I6WV = 23,

    // RMS voltage, 0.01 V
    URMS1 = 32,
    URMS2 = 33,
    // RMS current, 0.001 A
    IRMS1 = 34,
    IRMS2 = 35,
    IRMS3 = 36,
    IRMS4 = 37,
    IRMS5 = 38,
    IRMS6 = 39,
    // mean active power
    PMEAN1 = 40,
    PMEAN2 = 41,
    PMEAN3 = 42,
    PMEAN4 = 43,
    PMEAN5 = 44,
    PMEAN6 = 45,
    // mean reactive power
    QMEAN1 = 46,
    QMEAN2 = 47,
    QMEAN3 = 48,
    QMEAN4 = 49,
    QMEAN5 = 50,
    QMEAN6 = 51,
    // mean apparent power
    SMEAN1 = 52,
    SMEAN2 = 53,
    SMEAN3 = 54,
    SMEAN4 = 55,
    SMEAN5 = 56,
    SMEAN6 = 57,
    // power factor, 0.001
    PFMEAN1 = 58,
    PFMEAN2 = 59,
    PFMEAN3 = 60,
    PFMEAN4 = 61,
    PFMEAN5 = 62,
    PFMEAN6 = 63,
    // phase angle, 0.1 degree
    PANGLE1 = 64,
    PANGLE2 = 65,
    PANGLE3 = 66,
    PANGLE4 = 67,
    PANGLE5 = 68,
    PANGLE6 = 69,
    // fundamental active power
    PMEANF1 = 70,
    PMEANF2 = 71,
    PMEANF3 = 72,
    PMEANF4 = 73,
    PMEANF5 = 74,
    PMEANF6 = 75,
    // harmonic active power
    PMEANH1 = 76,
    PMEANH2 = 77,
    PMEANH3 = 78,
    PMEANH4 = 79,
    PMEANH5 = 80,
    PMEANH6 = 81,

    // line frequency, 0.01 Hz
    FREQ = 84,
}

impl Reg {
    pub fn addr(&self) -> u8 {
        2 * (*self as u8)
    }

    pub const UGAIN: [Reg; 2] = [Reg::UGAIN1, Reg::UGAIN2];
    pub const IGAIN: [Reg; 6] = [
        Reg::IGAIN1,
        Reg::IGAIN2,
        Reg::IGAIN3,
        Reg::IGAIN4,
        Reg::IGAIN5,
        Reg::IGAIN6,
    ];

    /// voltage then current waveforms, the order of `RawSample`s from one board
    pub const WAVEFORMS: [Reg; 8] = [
        Reg::V1WV,
        Reg::V2WV,
        Reg::I1WV,
        Reg::I2WV,
        Reg::I3WV,
        Reg::I4WV,
        Reg::I5WV,
        Reg::I6WV,
    ];
    pub const VWV: [Reg; 2] = [Reg::V1WV, Reg::V2WV];
    pub const IWV: [Reg; 6] = [
        Reg::I1WV,
        Reg::I2WV,
        Reg::I3WV,
        Reg::I4WV,
        Reg::I5WV,
        Reg::I6WV,
    ];

    pub const URMS: [Reg; 2] = [Reg::URMS1, Reg::URMS2];
    pub const IRMS: [Reg; 6] = [
        Reg::IRMS1,
        Reg::IRMS2,
        Reg::IRMS3,
        Reg::IRMS4,
        Reg::IRMS5,
        Reg::IRMS6,
    ];
    pub const PMEAN: [Reg; 6] = [
        Reg::PMEAN1,
        Reg::PMEAN2,
        Reg::PMEAN3,
        Reg::PMEAN4,
        Reg::PMEAN5,
        Reg::PMEAN6,
    ];
    pub const QMEAN: [Reg; 6] = [
        Reg::QMEAN1,
        Reg::QMEAN2,
        Reg::QMEAN3,
        Reg::QMEAN4,
        Reg::QMEAN5,
        Reg::QMEAN6,
    ];
    pub const SMEAN: [Reg; 6] = [
        Reg::SMEAN1,
        Reg::SMEAN2,
        Reg::SMEAN3,
        Reg::SMEAN4,
        Reg::SMEAN5,
        Reg::SMEAN6,
    ];
    pub const PFMEAN: [Reg; 6] = [
        Reg::PFMEAN1,
        Reg::PFMEAN2,
        Reg::PFMEAN3,
        Reg::PFMEAN4,
        Reg::PFMEAN5,
        Reg::PFMEAN6,
    ];
    pub const PANGLE: [Reg; 6] = [
        Reg::PANGLE1,
        Reg::PANGLE2,
        Reg::PANGLE3,
        Reg::PANGLE4,
        Reg::PANGLE5,
        Reg::PANGLE6,
    ];
    pub const PMEANF: [Reg; 6] = [
        Reg::PMEANF1,
        Reg::PMEANF2,
        Reg::PMEANF3,
        Reg::PMEANF4,
        Reg::PMEANF5,
        Reg::PMEANF6,
    ];
    pub const PMEANH: [Reg; 6] = [
        Reg::PMEANH1,
        Reg::PMEANH2,
        Reg::PMEANH3,
        Reg::PMEANH4,
        Reg::PMEANH5,
        Reg::PMEANH6,
    ];
}
