use embassy_futures::select::{select, Either};
use embassy_time::{Duration, Timer};
use heapless::Vec;
use log::debug;

use super::chip::{Board, Reg};
use super::driver::MeterDriver;
use crate::channel::{Channel, ChannelKind, CURRENT_CHANNELS_PER_BOARD, MAX_CHANNELS, VOLTAGE_CHANNELS_PER_BOARD};
use crate::error::MeterError;

pub const CHANNELS_PER_BOARD: usize = VOLTAGE_CHANNELS_PER_BOARD + CURRENT_CHANNELS_PER_BOARD;

/// One instantaneous register count.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RawSample {
    pub channel: Channel,
    pub raw_count: i32,
    pub cycle_index: u32,
}

/// Values computed by the metering ICs themselves, in register units.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct DirectReading {
    pub urms: [u32; VOLTAGE_CHANNELS_PER_BOARD],
    pub irms: [u32; CURRENT_CHANNELS_PER_BOARD],
    pub pmean: [i32; CURRENT_CHANNELS_PER_BOARD],
    pub qmean: [i32; CURRENT_CHANNELS_PER_BOARD],
    pub smean: [i32; CURRENT_CHANNELS_PER_BOARD],
    pub pfmean: [i32; CURRENT_CHANNELS_PER_BOARD],
    pub pangle: [i32; CURRENT_CHANNELS_PER_BOARD],
    /// only read with extended metering values
    pub pmeanf: Option<[i32; CURRENT_CHANNELS_PER_BOARD]>,
    pub pmeanh: Option<[i32; CURRENT_CHANNELS_PER_BOARD]>,
    pub freq: u32,
}

/// A board and its bus, owned by the engine.
pub struct BoardSlot<D> {
    pub driver: D,
    pub configured: bool,
    pub consecutive_errors: u8,
}

impl<D> BoardSlot<D> {
    pub fn new(driver: D) -> Self {
        Self {
            driver,
            configured: false,
            consecutive_errors: 0,
        }
    }
}

/// latch and read the waveform registers of one board, voltage channels first
pub async fn read_samples<'a, D: MeterDriver>(
    board: &mut Board<'a, D>,
    board_index: u8,
    cycle_index: u32,
) -> Result<[RawSample; CHANNELS_PER_BOARD], D::Error> {
    board.driver.latch().await?;

    let mut counts = [0i32; CHANNELS_PER_BOARD];
    board.read_registers_signed(&Reg::WAVEFORMS, &mut counts).await?;

    let mut samples = [RawSample {
        channel: Channel::Voltage(0),
        raw_count: 0,
        cycle_index,
    }; CHANNELS_PER_BOARD];
    for (i, (sample, count)) in samples.iter_mut().zip(counts).enumerate() {
        let (kind, index) = if i < VOLTAGE_CHANNELS_PER_BOARD {
            (ChannelKind::Voltage, i)
        } else {
            (ChannelKind::Current, i - VOLTAGE_CHANNELS_PER_BOARD)
        };
        // board_index < MAX_BOARDS is checked when the engine is built
        if let Some(channel) = Channel::new(kind, board_index, index as u8) {
            sample.channel = channel;
        }
        sample.raw_count = count;
    }
    Ok(samples)
}

pub async fn read_direct<'a, D: MeterDriver>(
    board: &mut Board<'a, D>,
    extended: bool,
) -> Result<DirectReading, D::Error> {
    let mut reading = DirectReading::default();
    board.read_registers(&Reg::URMS, &mut reading.urms).await?;
    board.read_registers(&Reg::IRMS, &mut reading.irms).await?;

    let signed = [
        (&Reg::PMEAN, &mut reading.pmean),
        (&Reg::QMEAN, &mut reading.qmean),
        (&Reg::SMEAN, &mut reading.smean),
        (&Reg::PFMEAN, &mut reading.pfmean),
        (&Reg::PANGLE, &mut reading.pangle),
    ];
    for (regs, out) in signed {
        board.read_registers_signed(regs, out).await?;
    }

    if extended {
        let mut fundamental = [0i32; CURRENT_CHANNELS_PER_BOARD];
        let mut harmonic = [0i32; CURRENT_CHANNELS_PER_BOARD];
        board.read_registers_signed(&Reg::PMEANF, &mut fundamental).await?;
        board.read_registers_signed(&Reg::PMEANH, &mut harmonic).await?;
        reading.pmeanf = Some(fundamental);
        reading.pmeanh = Some(harmonic);
    }

    reading.freq = board.read_register(Reg::FREQ).await?;
    Ok(reading)
}

/// read one board with a watchdog, any bus error or timeout makes the board unavailable
pub async fn read_board<D: MeterDriver>(
    slot: &mut BoardSlot<D>,
    board_index: u8,
    cycle_index: u32,
    timeout: Duration,
) -> Result<[RawSample; CHANNELS_PER_BOARD], MeterError> {
    let mut board = Board::new(&mut slot.driver);
    match select(read_samples(&mut board, board_index, cycle_index), Timer::after(timeout)).await {
        Either::First(Ok(samples)) => Ok(samples),
        Either::First(Err(e)) => {
            debug!("board {board_index} read error {e:?}");
            Err(MeterError::DeviceUnavailable { board: board_index })
        }
        Either::Second(_) => {
            debug!("board {board_index} read timed out");
            Err(MeterError::DeviceUnavailable { board: board_index })
        }
    }
}

pub async fn read_board_direct<D: MeterDriver>(
    slot: &mut BoardSlot<D>,
    board_index: u8,
    extended: bool,
    timeout: Duration,
) -> Result<DirectReading, MeterError> {
    let mut board = Board::new(&mut slot.driver);
    match select(read_direct(&mut board, extended), Timer::after(timeout)).await {
        Either::First(Ok(reading)) => Ok(reading),
        Either::First(Err(e)) => {
            debug!("board {board_index} read error {e:?}");
            Err(MeterError::DeviceUnavailable { board: board_index })
        }
        Either::Second(_) => {
            debug!("board {board_index} read timed out");
            Err(MeterError::DeviceUnavailable { board: board_index })
        }
    }
}

/// One sampling instant across all configured boards. Boards in `skip` or not
/// configured are left out, failing boards are reported in `failed` and omitted.
pub struct Acquisition {
    pub samples: Vec<RawSample, MAX_CHANNELS>,
    pub failed: u8,
}

pub async fn acquire_cycle<D: MeterDriver>(
    boards: &mut [BoardSlot<D>],
    skip: u8,
    cycle_index: u32,
    timeout: Duration,
) -> Acquisition {
    let mut acquisition = Acquisition {
        samples: Vec::new(),
        failed: 0,
    };
    for (b, slot) in boards.iter_mut().enumerate() {
        if !slot.configured || skip & (1 << b) != 0 {
            continue;
        }
        match read_board(slot, b as u8, cycle_index, timeout).await {
            Ok(samples) => {
                let _ = acquisition.samples.extend_from_slice(&samples);
            }
            Err(_) => acquisition.failed |= 1 << b,
        }
    }
    acquisition
}
