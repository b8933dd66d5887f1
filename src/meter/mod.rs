pub mod calibration;
pub mod chip;
pub mod clock;
pub mod driver;
pub mod sample;

use embassy_futures::select::{select, Either};
use embassy_time::{Duration, Instant, Timer};
use embedded_hal_async::delay::DelayNs;
use embedded_storage::Storage;
use heapless::Vec;
use log::{debug, error, info, warn};

use crate::aggregate::{AggregatedSnapshot, Aggregator, LifetimeEnergy};
use crate::channel::{Channel, MAX_BOARDS};
use crate::config::{MeterOptions, MeterSignals};
use crate::error::MeterError;
use crate::power::{self, CycleWaveforms};
use crate::zcr::ZeroCrossingTracker;
use calibration::{CalibrationStore, DIRECT_FREQ_LSB};
use chip::{Board, BoardConfiguration, ConfigureError};
use clock::CycleClock;
use driver::MeterDriver;
use sample::BoardSlot;

/// consecutive failed cycles before a board is dropped until the next report
pub const MAX_READ_ERRORS: u8 = 3;

/// reset and configuration of a single board
const CONFIGURE_TIMEOUT: Duration = Duration::from_millis(200);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MeterState {
    Uninitialized,
    Calibrated,
    Sampling,
    /// the main board could not be initialized
    Faulted,
}

/// Samples the main board and its add-on boards once per line cycle and emits
/// aggregated snapshots every `cycles_per_report` cycles.
pub struct EnergyMeter<'s, D: MeterDriver, DL: DelayNs> {
    state: MeterState,
    options: MeterOptions,
    store: CalibrationStore,
    boards: Vec<BoardSlot<D>, MAX_BOARDS>,
    delay: DL,
    signals: &'s MeterSignals,
    clock: CycleClock,
    aggregator: Aggregator,
    zcr: ZeroCrossingTracker,
    waveforms: [CycleWaveforms; MAX_BOARDS],
    cycle_index: u32,
}

impl<'s, D: MeterDriver, DL: DelayNs> EnergyMeter<'s, D, DL> {
    /// `drivers` holds one bus per board, main board first. Extra drivers are ignored.
    pub fn new(
        options: MeterOptions,
        store: CalibrationStore,
        drivers: impl IntoIterator<Item = D>,
        delay: DL,
        signals: &'s MeterSignals,
    ) -> Result<Self, MeterError> {
        options.validate()?;
        let board_count = options.board_count();
        if store.profile().board_count() < board_count {
            return Err(MeterError::InvalidOptions("no calibration for some add-on boards"));
        }

        let mut boards = Vec::new();
        for driver in drivers.into_iter().take(board_count) {
            let _ = boards.push(BoardSlot::new(driver));
        }
        if boards.len() < board_count {
            return Err(MeterError::InvalidOptions("no driver for some add-on boards"));
        }

        let clock = CycleClock::new(store.profile().line_frequency().cycle_period());

        Ok(Self {
            state: MeterState::Uninitialized,
            options,
            store,
            boards,
            delay,
            signals,
            clock,
            aggregator: Aggregator::new(),
            zcr: ZeroCrossingTracker::new(),
            waveforms: Default::default(),
            cycle_index: 0,
        })
    }

    pub fn state(&self) -> MeterState {
        self.state
    }

    pub fn options(&self) -> &MeterOptions {
        &self.options
    }

    pub fn calibration(&self) -> &CalibrationStore {
        &self.store
    }

    /// overrides staged here are applied by `setup` or at the next cycle boundary
    pub fn calibration_mut(&mut self) -> &mut CalibrationStore {
        &mut self.store
    }

    /// cycles sampled since setup
    pub fn cycle_count(&self) -> u32 {
        self.cycle_index
    }

    pub fn board_configured(&self, board: usize) -> bool {
        self.boards.get(board).map(|b| b.configured).unwrap_or(false)
    }

    pub fn driver_mut(&mut self, board: usize) -> Option<&mut D> {
        self.boards.get_mut(board).map(|b| &mut b.driver)
    }

    pub fn lifetime_energy(&self, channel: Channel) -> Option<&LifetimeEnergy> {
        self.aggregator.lifetime(channel)
    }

    pub fn persist<S: Storage>(&self, storage: &mut S) -> Result<(), MeterError> {
        self.store.persist(storage, &self.options)
    }

    /// One-time hardware initialization. A main board failure is fatal, add-on
    /// boards that fail are left out and retried at every report.
    pub async fn setup(&mut self) -> Result<(), MeterError> {
        if self.state != MeterState::Uninitialized {
            return Err(MeterError::NotReady);
        }

        if self.store.apply_pending() {
            debug!("applied calibration overrides before setup");
        }
        self.clock.set_period(self.store.profile().line_frequency().cycle_period());

        for b in 0..self.boards.len() {
            match self.configure_board(b).await {
                Ok(()) => info!("board {b} configured"),
                Err(e) if b == 0 => {
                    error!("main board initialization failed: {e}");
                    self.state = MeterState::Faulted;
                    return Err(MeterError::Faulted);
                }
                Err(e) => warn!("{e}, continuing without it"),
            }
        }

        info!(
            "energy meter calibrated: {} Hz, {} boards, {}",
            self.store.profile().line_frequency().hz(),
            self.boards.len(),
            if self.options.direct_register_mode {
                "direct register mode"
            } else {
                "waveform mode"
            }
        );
        self.state = MeterState::Calibrated;
        Ok(())
    }

    async fn configure_board(&mut self, b: usize) -> Result<(), MeterError> {
        let unavailable = MeterError::DeviceUnavailable { board: b as u8 };
        let config = BoardConfiguration::from_profile(self.store.profile(), b).ok_or(unavailable)?;
        let slot = self.boards.get_mut(b).ok_or(unavailable)?;
        slot.configured = false;

        let configure = async {
            slot.driver.hardware_reset().await.map_err(ConfigureError::Bus)?;
            Board::new(&mut slot.driver).configure(&config).await
        };
        let result = match select(configure, Timer::after(CONFIGURE_TIMEOUT)).await {
            Either::First(result) => result,
            Either::Second(_) => {
                debug!("board {b} configuration timed out");
                return Err(unavailable);
            }
        };
        if let Err(e) = result {
            debug!("board {b} configuration error {e:?}");
            return Err(unavailable);
        }

        slot.configured = true;
        slot.consecutive_errors = 0;
        Ok(())
    }

    /// Advance by at most one line cycle. Returns the snapshot when a reporting
    /// interval was completed.
    pub async fn loop_once(&mut self, now: Instant) -> Result<Option<AggregatedSnapshot>, MeterError> {
        match self.state {
            MeterState::Uninitialized => return Err(MeterError::NotReady),
            MeterState::Faulted => return Err(MeterError::Faulted),
            MeterState::Calibrated | MeterState::Sampling => {}
        }
        let Some(tick) = self.clock.poll(now) else {
            return Ok(None);
        };
        self.state = MeterState::Sampling;
        if tick.skipped {
            debug!("missed line cycles, {} ms since last cycle", tick.elapsed.as_millis());
            self.zcr.reset();
        }

        self.cycle_boundary().await;

        let missing = if self.options.direct_register_mode {
            self.direct_cycle(tick.elapsed).await
        } else {
            self.waveform_cycle(tick.start, tick.elapsed).await
        };
        self.aggregator.end_cycle(tick.elapsed, missing);
        self.cycle_index = self.cycle_index.wrapping_add(1);

        if self.aggregator.cycles() < self.options.cycles_per_report {
            return Ok(None);
        }

        let snapshot = self.aggregator.finalize();
        debug!(
            "snapshot {}: {} cycles, {} channels",
            snapshot.interval,
            snapshot.cycles,
            snapshot.channels.len()
        );
        self.signals.snapshots.signal(snapshot.clone());
        self.retry_boards().await;
        Ok(Some(snapshot))
    }

    /// Drive `loop_once` forever, one call per line cycle.
    pub async fn run(&mut self) -> Result<(), MeterError> {
        if self.state == MeterState::Uninitialized {
            self.setup().await?;
        }
        loop {
            let now = Instant::now();
            self.loop_once(now).await?;
            let due = self.clock.next_due().unwrap_or(now + self.clock.period());
            Timer::at(due).await;
        }
    }

    /// overrides are only applied between cycles
    async fn cycle_boundary(&mut self) {
        if self.signals.overrides.signaled() {
            // completes immediately once signaled
            let overrides = self.signals.overrides.wait().await;
            let report = self.store.apply_overrides(&overrides);
            info!("calibration overrides: {} applied, {} rejected", report.applied, report.rejected);
        }
        if !self.store.apply_pending() {
            return;
        }

        info!("calibration updated");
        self.clock.set_period(self.store.profile().line_frequency().cycle_period());
        for b in 0..self.boards.len() {
            if !self.boards[b].configured {
                continue;
            }
            if let Err(e) = self.configure_board(b).await {
                warn!("{e} after calibration update");
            }
        }
    }

    async fn retry_boards(&mut self) {
        for b in 0..self.boards.len() {
            if self.boards[b].configured {
                continue;
            }
            match self.configure_board(b).await {
                Ok(()) => info!("board {b} back online"),
                Err(e) => debug!("{e}, retrying at next report"),
            }
        }
    }

    fn board_failed(&mut self, b: usize) {
        let slot = &mut self.boards[b];
        slot.consecutive_errors = slot.consecutive_errors.saturating_add(1);
        warn!("{}", MeterError::DeviceUnavailable { board: b as u8 });
        if slot.consecutive_errors >= MAX_READ_ERRORS {
            warn!("board {b} too many read errors, dropping until next report");
            slot.configured = false;
        }
    }

    /// returns the mask of boards missing from this cycle. `elapsed` is the time
    /// credited to the cycle, samples are spaced over one line period
    async fn waveform_cycle(&mut self, start: Instant, elapsed: Duration) -> u8 {
        let period = self.clock.period();
        let n = self.options.samples_per_cycle;
        let spacing_ns = period.as_micros() * 1000 / n as u64;
        let timeout = Duration::from_millis(self.options.board_timeout_ms as u64);
        let start_ns = start.as_micros() * 1000;

        let mut failed = 0u8;
        for k in 0..n {
            let acquisition = sample::acquire_cycle(&mut self.boards, failed, self.cycle_index, timeout).await;
            failed |= acquisition.failed;

            for raw in acquisition.samples.iter() {
                let point = match calibration::scale(raw, self.store.profile()) {
                    Ok(point) => point,
                    Err(e) => {
                        warn!("{e}");
                        continue;
                    }
                };
                let waveforms = &mut self.waveforms[point.channel.board() as usize];
                let index = point.channel.index() as usize;
                match point.channel {
                    Channel::Voltage(_) => waveforms.voltage[index][k] = point.physical_value,
                    Channel::Current(_) => waveforms.current[index][k] = point.physical_value,
                }
            }

            if self.boards[0].configured && failed & 1 == 0 {
                let time_ns = start_ns + k as u64 * spacing_ns;
                self.zcr.push(time_ns, self.waveforms[0].voltage[0][k]);
            }

            if k + 1 < n {
                self.delay.delay_ns(spacing_ns as u32).await;
            }
        }

        let mut missing = 0u8;
        for b in 0..self.boards.len() {
            if failed & (1 << b) != 0 {
                self.board_failed(b);
                missing |= 1 << b;
                continue;
            }
            if !self.boards[b].configured {
                missing |= 1 << b;
                continue;
            }
            self.boards[b].consecutive_errors = 0;
            self.waveforms[b].len = n;
            let metrics = power::compute_cycle(
                b as u8,
                &self.waveforms[b],
                &self.options.phase_map,
                self.options.metering_values_extended,
            );
            for m in metrics.iter() {
                self.aggregator.accumulate(m, elapsed);
            }
        }

        if missing & 1 == 0 {
            if let Some(hz) = self.zcr.frequency() {
                self.aggregator.record_frequency(hz);
            }
        } else {
            self.zcr.reset();
        }
        missing
    }

    async fn direct_cycle(&mut self, elapsed: Duration) -> u8 {
        let timeout = Duration::from_millis(self.options.board_timeout_ms as u64);
        let extended = self.options.metering_values_extended;

        let mut missing = 0u8;
        for b in 0..self.boards.len() {
            if !self.boards[b].configured {
                missing |= 1 << b;
                continue;
            }
            match sample::read_board_direct(&mut self.boards[b], b as u8, extended, timeout).await {
                Ok(reading) => {
                    self.boards[b].consecutive_errors = 0;
                    for m in power::from_direct(b as u8, &reading, &self.options.phase_map, extended).iter() {
                        self.aggregator.accumulate(m, elapsed);
                    }
                    if b == 0 && reading.freq > 0 {
                        self.aggregator.record_frequency(reading.freq as f32 * DIRECT_FREQ_LSB);
                    }
                }
                Err(_) => {
                    self.board_failed(b);
                    missing |= 1 << b;
                }
            }
        }
        missing
    }
}
