use embassy_futures::block_on;
use embassy_futures::select::{select, Either};
use embassy_time::Instant;
use embedded_storage::{ReadStorage, Storage};
use energy_meter::config::parse_overrides;
use energy_meter::meter::driver::sim::{LoadModel, SimulatedDriver, WaveformModel};
use energy_meter::{
    AggregatedSnapshot, CalibrationConfig, CalibrationField, CalibrationStore, Channel, EnergyMeter, MeterError,
    MeterOptions, MeterSignals, MeterState,
};
use rand::{rngs::SmallRng, SeedableRng};

struct NoopDelay;

impl embedded_hal_async::delay::DelayNs for NoopDelay {
    async fn delay_ns(&mut self, _ns: u32) {}
}

type Meter<'s> = EnergyMeter<'s, SimulatedDriver<SmallRng>, NoopDelay>;

fn model(frequency_hz: f32, samples_per_cycle: usize) -> WaveformModel {
    let mut model = WaveformModel {
        frequency_hz,
        sample_rate_hz: frequency_hz * samples_per_cycle as f32,
        ..Default::default()
    };
    model.loads[0] = LoadModel {
        current_rms: 10.0,
        ..Default::default()
    };
    model.loads[1] = LoadModel {
        current_rms: 5.0,
        phase_deg: 60.0,
        ..Default::default()
    };
    // solar feeding back on the second leg
    model.loads[3] = LoadModel {
        current_rms: 2.0,
        phase_deg: 180.0,
        ..Default::default()
    };
    model
}

fn drivers(count: usize, model: WaveformModel) -> Vec<SimulatedDriver<SmallRng>> {
    (0..count)
        .map(|b| SimulatedDriver::new(model, SmallRng::seed_from_u64(b as u64)))
        .collect()
}

fn meter<'s>(
    options: MeterOptions,
    store: CalibrationStore,
    drivers: Vec<SimulatedDriver<SmallRng>>,
    signals: &'s MeterSignals,
) -> Meter<'s> {
    EnergyMeter::new(options, store, drivers, NoopDelay, signals).unwrap()
}

/// step simulated time in 1 ms increments until a snapshot is emitted
fn run_until_snapshot(meter: &mut Meter<'_>, now_ms: &mut u64) -> AggregatedSnapshot {
    for _ in 0..10_000 {
        let snapshot = block_on(meter.loop_once(Instant::from_millis(*now_ms))).unwrap();
        *now_ms += 1;
        if let Some(snapshot) = snapshot {
            return snapshot;
        }
    }
    panic!("no snapshot emitted");
}

fn assert_close(actual: f32, expected: f32, tolerance: f32) {
    assert!(
        (actual - expected).abs() <= tolerance,
        "expected {expected} +- {tolerance}, got {actual}"
    );
}

#[test]
fn cycle_cadence_follows_line_frequency() {
    let signals = MeterSignals::new();
    let options = MeterOptions {
        cycles_per_report: 1000,
        ..Default::default()
    };

    let mut meter60 = meter(
        options.clone(),
        CalibrationStore::with_defaults(1),
        drivers(1, model(60.0, 32)),
        &signals,
    );
    block_on(meter60.setup()).unwrap();
    for ms in 0..1000 {
        block_on(meter60.loop_once(Instant::from_millis(ms))).unwrap();
    }
    assert_eq!(meter60.cycle_count(), 60);

    let mut store = CalibrationStore::with_defaults(1);
    store.override_field(CalibrationField::LineFreq, 135).unwrap();
    let mut meter50 = meter(options, store, drivers(1, model(50.0, 32)), &signals);
    block_on(meter50.setup()).unwrap();
    for ms in 0..1000 {
        block_on(meter50.loop_once(Instant::from_millis(ms))).unwrap();
    }
    assert_eq!(meter50.cycle_count(), 50);
}

#[test]
fn snapshot_reports_modelled_loads() {
    let signals = MeterSignals::new();
    let options = MeterOptions {
        cycles_per_report: 30,
        ..Default::default()
    };
    let mut model = model(60.0, 32);
    model.noise_counts = 3;
    let mut meter = meter(options, CalibrationStore::with_defaults(1), drivers(1, model), &signals);
    block_on(meter.setup()).unwrap();
    assert_eq!(meter.state(), MeterState::Calibrated);

    let mut now = 0;
    let snapshot = run_until_snapshot(&mut meter, &mut now);
    assert_eq!(meter.state(), MeterState::Sampling);
    assert_eq!(snapshot.interval, 0);
    assert_eq!(snapshot.cycles, 30);
    assert_eq!(snapshot.missing_boards, 0);
    assert_eq!(snapshot.channels.len(), 6);
    assert_close(snapshot.frequency_hz.unwrap(), 60.0, 0.1);

    let ct1 = snapshot.channel(Channel::Current(0)).unwrap();
    assert_eq!(ct1.voltage_channel, Channel::Voltage(0));
    assert_close(ct1.voltage_rms, 120.0, 0.5);
    assert_close(ct1.current_rms, 10.0, 0.05);
    assert_close(ct1.real_power, 1200.0, 6.0);
    assert_close(ct1.power_factor, 1.0, 0.01);
    // 1200 W for 30 cycles at 60 Hz
    assert_close(ct1.energy_wh, 1200.0 * 0.5 / 3600.0, 0.002);

    let ct2 = snapshot.channel(Channel::Current(1)).unwrap();
    assert_close(ct2.real_power, 300.0, 3.0);
    assert_close(ct2.reactive_power, 519.6, 5.0);
    assert_close(ct2.phase_angle, 60.0, 1.0);

    let ct4 = snapshot.channel(Channel::Current(3)).unwrap();
    assert_eq!(ct4.voltage_channel, Channel::Voltage(1));
    assert_close(ct4.real_power, -240.0, 3.0);
    assert!(ct4.export_wh > 0.0);
    assert_eq!(ct4.import_wh, 0.0);

    let idle = snapshot.channel(Channel::Current(5)).unwrap();
    assert_eq!(idle.real_power, 0.0);
    assert_eq!(idle.power_factor, 0.0);

    for c in snapshot.channels.iter() {
        assert!(c.apparent_power >= c.real_power.abs());
        assert!((-1.0..=1.0).contains(&c.power_factor));
        assert!((-180.0..=180.0).contains(&c.phase_angle));
    }

    assert!(signals.snapshots.signaled());
    assert_eq!(block_on(signals.snapshots.wait()), snapshot);
}

#[test]
fn sparse_polling_credits_wall_time() {
    let signals = MeterSignals::new();
    let options = MeterOptions {
        cycles_per_report: 10,
        ..Default::default()
    };
    let mut meter = meter(
        options,
        CalibrationStore::with_defaults(1),
        drivers(1, model(60.0, 32)),
        &signals,
    );
    block_on(meter.setup()).unwrap();

    // host loop every 100 ms, far slower than the line cycle
    let mut snapshot = None;
    for k in 0..10 {
        snapshot = block_on(meter.loop_once(Instant::from_millis(k * 100))).unwrap();
    }
    let snapshot = snapshot.unwrap();
    assert_eq!(snapshot.cycles, 10);

    // one period for the first cycle, then 100 ms per cycle
    let duration_s = 1.0 / 60.0 + 0.9;
    assert_close(snapshot.duration_s, duration_s, 0.001);

    let ct1 = snapshot.channel(Channel::Current(0)).unwrap();
    assert_close(ct1.real_power, 1200.0, 6.0);
    assert_close(ct1.energy_wh, 1200.0 * duration_s / 3600.0, 0.003);
    assert_close(ct1.import_wh, ct1.energy_wh, 1e-6);

    let ct4 = snapshot.channel(Channel::Current(3)).unwrap();
    assert_close(ct4.export_wh, 240.0 * duration_s / 3600.0, 0.001);

    // a single sampled cycle between gaps holds at most one crossing
    assert_eq!(snapshot.frequency_hz, None);
}

#[test]
fn skipped_cycles_do_not_bias_frequency() {
    let signals = MeterSignals::new();
    let options = MeterOptions {
        cycles_per_report: 10,
        ..Default::default()
    };
    let mut meter = meter(
        options,
        CalibrationStore::with_defaults(1),
        drivers(1, model(60.0, 32)),
        &signals,
    );
    block_on(meter.setup()).unwrap();

    let mut frequencies = std::vec::Vec::new();
    let polls = (0..=1000).chain(1100..=1600);
    for ms in polls {
        if let Some(snapshot) = block_on(meter.loop_once(Instant::from_millis(ms))).unwrap() {
            frequencies.push(snapshot.frequency_hz);
        }
    }
    assert!(frequencies.len() >= 8);
    for f in frequencies {
        assert_close(f.unwrap(), 60.0, 0.1);
    }
}

#[test]
fn run_samples_in_real_time() {
    let signals = MeterSignals::new();
    let options = MeterOptions {
        cycles_per_report: 6,
        ..Default::default()
    };
    let mut meter = meter(
        options,
        CalibrationStore::with_defaults(1),
        drivers(1, model(60.0, 32)),
        &signals,
    );

    let snapshot = match block_on(select(meter.run(), signals.snapshots.wait())) {
        Either::First(result) => panic!("run returned {result:?}"),
        Either::Second(snapshot) => snapshot,
    };
    assert_eq!(meter.state(), MeterState::Sampling);
    assert_eq!(snapshot.cycles, 6);
    // late wakeups only ever add time
    assert!(snapshot.duration_s >= 6.0 * 0.0166);

    let ct1 = snapshot.channel(Channel::Current(0)).unwrap();
    assert_close(ct1.real_power, 1200.0, 6.0);
    assert_close(ct1.energy_wh, ct1.real_power * snapshot.duration_s / 3600.0, 1e-4);
}

#[test]
fn unavailable_addon_board_is_left_out() {
    let signals = MeterSignals::new();
    let options = MeterOptions {
        addon_boards: 2,
        cycles_per_report: 10,
        ..Default::default()
    };
    let mut drivers = drivers(3, model(60.0, 32));
    drivers[2].set_responsive(false);
    let mut meter = meter(options, CalibrationStore::with_defaults(3), drivers, &signals);

    block_on(meter.setup()).unwrap();
    assert!(meter.board_configured(0));
    assert!(meter.board_configured(1));
    assert!(!meter.board_configured(2));

    let mut now = 0;
    let snapshot = run_until_snapshot(&mut meter, &mut now);
    assert_eq!(snapshot.channels.len(), 12);
    assert_eq!(snapshot.missing_boards, 0b100);
    assert!(snapshot.channel(Channel::Current(6)).is_some());
    assert!(snapshot.channel(Channel::Current(12)).is_none());
    assert_close(snapshot.channel(Channel::Current(6)).unwrap().real_power, 1200.0, 6.0);

    // the board comes back and is picked up at the next report
    meter.driver_mut(2).unwrap().set_responsive(true);
    run_until_snapshot(&mut meter, &mut now);
    assert!(meter.board_configured(2));
    let snapshot = run_until_snapshot(&mut meter, &mut now);
    assert_eq!(snapshot.channels.len(), 18);
    assert_eq!(snapshot.missing_boards, 0);
}

#[test]
fn main_board_failure_is_fatal() {
    let signals = MeterSignals::new();
    let mut drivers = drivers(1, model(60.0, 32));
    drivers[0].set_responsive(false);
    let mut meter = meter(MeterOptions::default(), CalibrationStore::with_defaults(1), drivers, &signals);

    assert_eq!(block_on(meter.loop_once(Instant::from_millis(0))), Err(MeterError::NotReady));
    assert_eq!(block_on(meter.setup()), Err(MeterError::Faulted));
    assert_eq!(meter.state(), MeterState::Faulted);
    assert_eq!(block_on(meter.loop_once(Instant::from_millis(0))), Err(MeterError::Faulted));
}

#[test]
fn invalid_options_are_rejected() {
    let signals = MeterSignals::new();
    let options = MeterOptions {
        samples_per_cycle: 30,
        ..Default::default()
    };
    let result = EnergyMeter::new(
        options,
        CalibrationStore::with_defaults(1),
        drivers(1, model(60.0, 32)),
        NoopDelay,
        &signals,
    );
    assert!(matches!(result, Err(MeterError::InvalidOptions(_))));

    // two add-on boards need three drivers
    let options = MeterOptions {
        addon_boards: 2,
        ..Default::default()
    };
    let result = EnergyMeter::new(
        options,
        CalibrationStore::with_defaults(3),
        drivers(2, model(60.0, 32)),
        NoopDelay,
        &signals,
    );
    assert!(matches!(result, Err(MeterError::InvalidOptions(_))));
}

#[test]
fn direct_register_mode_passes_values_through() {
    let signals = MeterSignals::new();
    let options = MeterOptions {
        direct_register_mode: true,
        metering_values_extended: true,
        cycles_per_report: 5,
        ..Default::default()
    };
    let mut meter = meter(
        options,
        CalibrationStore::with_defaults(1),
        drivers(1, model(60.0, 32)),
        &signals,
    );
    block_on(meter.setup()).unwrap();

    let mut now = 0;
    let snapshot = run_until_snapshot(&mut meter, &mut now);
    assert_eq!(snapshot.cycles, 5);
    assert_close(snapshot.frequency_hz.unwrap(), 60.0, 0.01);

    let ct1 = snapshot.channel(Channel::Current(0)).unwrap();
    assert_close(ct1.voltage_rms, 120.0, 0.01);
    assert_close(ct1.current_rms, 10.0, 0.001);
    assert_close(ct1.real_power, 1200.0, 0.01);
    assert_close(ct1.fundamental_power.unwrap(), 1200.0, 0.01);
    assert_close(ct1.harmonic_power.unwrap(), 0.0, 0.01);

    let ct2 = snapshot.channel(Channel::Current(1)).unwrap();
    assert_close(ct2.phase_angle, 60.0, 0.2);
    assert_close(ct2.reactive_power, 519.6, 0.1);
}

#[test]
fn overrides_apply_at_cycle_boundary() {
    let signals = MeterSignals::new();
    let options = MeterOptions {
        cycles_per_report: 10,
        ..Default::default()
    };
    let mut meter = meter(
        options,
        CalibrationStore::with_defaults(1),
        drivers(1, model(60.0, 32)),
        &signals,
    );
    block_on(meter.setup()).unwrap();

    let mut now = 0;
    let before = run_until_snapshot(&mut meter, &mut now);
    assert_close(before.channel(Channel::Current(0)).unwrap().real_power, 1200.0, 6.0);

    // doubled CT1 gain, CT2 gain of 0 is rejected
    let overrides = parse_overrides(
        br#"{"channels":[{"kind":"current","index":0,"gain":64996},{"kind":"current","index":1,"gain":0}]}"#,
    )
    .unwrap();
    signals.overrides.signal(overrides);
    assert_eq!(meter.calibration().profile().gain_for(Channel::Current(0)), Some(32498));

    let after = run_until_snapshot(&mut meter, &mut now);
    let profile = meter.calibration().profile();
    assert_eq!(profile.gain_for(Channel::Current(0)), Some(64996));
    assert_eq!(profile.gain_for(Channel::Current(1)), Some(32498));
    assert_close(after.channel(Channel::Current(0)).unwrap().real_power, 2400.0, 12.0);
    assert_close(after.channel(Channel::Current(1)).unwrap().real_power, 300.0, 3.0);
    // lifetime energy keeps counting across snapshots
    let total = meter.lifetime_energy(Channel::Current(0)).unwrap();
    assert!(total.import_wh > before.channel(Channel::Current(0)).unwrap().import_wh as f64);
}

struct MemStorage([u8; 1024]);

impl ReadStorage for MemStorage {
    type Error = ();

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), ()> {
        let offset = offset as usize;
        let src = self.0.get(offset..offset + bytes.len()).ok_or(())?;
        bytes.copy_from_slice(src);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.0.len()
    }
}

impl Storage for MemStorage {
    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), ()> {
        let offset = offset as usize;
        let dst = self.0.get_mut(offset..offset + bytes.len()).ok_or(())?;
        dst.copy_from_slice(bytes);
        Ok(())
    }
}

#[test]
fn calibration_survives_power_cycle() {
    let mut storage = MemStorage([0; 1024]);

    // nothing stored yet
    let (options, store) = CalibrationStore::restore(&mut storage);
    assert_eq!(options, MeterOptions::default());
    assert_eq!(store.config(), CalibrationConfig::default());

    let options = MeterOptions {
        addon_boards: 1,
        metering_values_extended: true,
        ..Default::default()
    };
    let mut store = CalibrationStore::new(CalibrationConfig::with_boards(2)).unwrap();
    store.override_preset(Channel::Voltage(2), "jameco-112336").unwrap();
    store.override_field(CalibrationField::PgaGain, 42).unwrap();
    store.apply_pending();
    store.persist(&mut storage, &options).unwrap();

    let (restored_options, restored) = CalibrationStore::restore(&mut storage);
    assert_eq!(restored_options, options);
    assert_eq!(restored.config(), store.config());
    assert_eq!(restored.profile().gain_for(Channel::Voltage(2)), Some(42080));

    // corrupted medium falls back to defaults
    storage.0[3] ^= 0xff;
    let (fallback_options, fallback) = CalibrationStore::restore(&mut storage);
    assert_eq!(fallback_options, MeterOptions::default());
    assert_eq!(fallback.config(), CalibrationConfig::default());
}

#[test]
fn hung_board_is_dropped_by_watchdog() {
    let signals = MeterSignals::new();
    let options = MeterOptions {
        addon_boards: 1,
        cycles_per_report: 5,
        board_timeout_ms: 5,
        ..Default::default()
    };
    let mut meter = meter(
        options,
        CalibrationStore::with_defaults(2),
        drivers(2, model(60.0, 32)),
        &signals,
    );
    block_on(meter.setup()).unwrap();
    meter.driver_mut(1).unwrap().set_hang(true);

    let mut now = 0;
    let mut cycles = 0;
    while cycles < 3 {
        block_on(meter.loop_once(Instant::from_millis(now))).unwrap();
        cycles = meter.cycle_count();
        now += 1;
    }
    assert!(!meter.board_configured(1));

    let snapshot = run_until_snapshot(&mut meter, &mut now);
    assert_eq!(snapshot.missing_boards, 0b10);
    assert!(snapshot.channel(Channel::Current(6)).is_none());
    assert_eq!(snapshot.channel(Channel::Current(0)).unwrap().cycles, 5);
}
