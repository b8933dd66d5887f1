/// maximum number of zero crossings to keep
pub const ZCR_COUNT: usize = 64;

/// volts below zero a waveform has to reach before the next rising crossing counts
const ZCR_HYSTERESIS: f32 = 1.0;

/// Measures line frequency from rising zero crossings of a sampled voltage.
pub struct ZeroCrossingTracker {
    /// nanosecond timestamps of the last crossings
    times: [u64; ZCR_COUNT],
    /// next index to be written
    head: usize,
    len: usize,
    last: Option<(u64, f32)>,
    armed: bool,
}

impl Default for ZeroCrossingTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ZeroCrossingTracker {
    pub const fn new() -> Self {
        Self {
            times: [0; ZCR_COUNT],
            head: 0,
            len: 0,
            last: None,
            armed: false,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn push(&mut self, time_ns: u64, value: f32) {
        if value < -ZCR_HYSTERESIS {
            self.armed = true;
        }
        if let Some((t0, v0)) = self.last {
            if self.armed && v0 < 0.0 && value >= 0.0 && time_ns > t0 {
                let fraction = -v0 / (value - v0);
                let crossing = t0 + ((time_ns - t0) as f32 * fraction) as u64;
                self.record(crossing);
                self.armed = false;
            }
        }
        self.last = Some((time_ns, value));
    }

    fn record(&mut self, time_ns: u64) {
        self.times[self.head] = time_ns;
        self.head = (self.head + 1) % ZCR_COUNT;
        self.len = (self.len + 1).min(ZCR_COUNT);
    }

    /// frequency over the stored crossings, `None` until two crossings were seen
    pub fn frequency(&self) -> Option<f32> {
        if self.len < 2 {
            return None;
        }
        let newest = self.times[(self.head + ZCR_COUNT - 1) % ZCR_COUNT];
        let oldest = self.times[(self.head + ZCR_COUNT - self.len) % ZCR_COUNT];
        let tdiff = newest.checked_sub(oldest).filter(|t| *t > 0)?;
        Some(((self.len - 1) as f64 * 1e9 / tdiff as f64) as f32)
    }
}
