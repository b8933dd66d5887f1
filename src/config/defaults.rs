// Compiled-in calibration defaults. A stored or runtime override takes priority.

/// line frequency code written to the metering IC mode register
/// 5231: 60 Hz six channel meter, 135: 50 Hz six channel meter
pub const LINE_FREQ: u16 = 5231;

/// 0: 10A (1x), 21: 100A (2x), 42: 100A - 200A (4x)
pub const PGA_GAIN: u16 = 0;

/// 7305 is the 9V AC transformer on meter revisions >= 1.3, see `VOLTAGE_PRESETS`
pub const VOLTAGE_GAIN: u16 = 7305;
pub const VOLTAGE_GAIN2: u16 = 7305;

/// 32498 is the 100A/50mA SCT-013-000, see `CURRENT_PRESETS`
pub const CURRENT_GAIN_CT1: u16 = 32498;
pub const CURRENT_GAIN_CT2: u16 = 32498;
pub const CURRENT_GAIN_CT3: u16 = 32498;
pub const CURRENT_GAIN_CT4: u16 = 32498;
pub const CURRENT_GAIN_CT5: u16 = 32498;
pub const CURRENT_GAIN_CT6: u16 = 32498;

pub const VOLTAGE_GAINS: [u16; 2] = [VOLTAGE_GAIN, VOLTAGE_GAIN2];
pub const CURRENT_GAINS: [u16; 6] = [
    CURRENT_GAIN_CT1,
    CURRENT_GAIN_CT2,
    CURRENT_GAIN_CT3,
    CURRENT_GAIN_CT4,
    CURRENT_GAIN_CT5,
    CURRENT_GAIN_CT6,
];

/// 0 disables add-on boards, at most 6
pub const NUM_OF_ADDON_BOARDS: u8 = 0;

/// power is read from the board instead of computed (voltage jumpers bridged)
pub const DIRECT_REGISTER_MODE: bool = false;

/// also compute fundamental / harmonic power
pub const EXPORT_METERING_VALS: bool = false;

pub const SAMPLES_PER_CYCLE: usize = 32;

/// about 10 seconds at 60 Hz
pub const CYCLES_PER_REPORT: u32 = 600;

/// CT1-CT3 sit on the first IC (V1), CT4-CT6 on the second (V2)
pub const PHASE_MAP: [u8; 6] = [0, 0, 0, 1, 1, 1];

pub const BOARD_TIMEOUT_MS: u32 = 20;
