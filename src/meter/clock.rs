use embassy_time::{Duration, Instant};

/// Decides when the next line cycle is due.
pub struct CycleClock {
    period: Duration,
    next_due: Option<Instant>,
    started: Option<Instant>,
}

impl CycleClock {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            next_due: None,
            started: None,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// scheduled start of the current cycle
    pub fn started(&self) -> Option<Instant> {
        self.started
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.next_due
    }

    pub fn set_period(&mut self, period: Duration) {
        if let Some(due) = self.next_due.as_mut() {
            // keep the phase of the last cycle start
            *due = *due - self.period + period;
        }
        self.period = period;
    }

    /// starts a cycle if one is due at `now`. the first poll always starts a cycle,
    /// cycles missed by more than one period are skipped
    pub fn poll(&mut self, now: Instant) -> Option<CycleTick> {
        let tick = match (self.next_due, self.started) {
            (Some(due), _) if now < due => return None,
            (Some(due), Some(previous)) if now < due + self.period => CycleTick {
                start: due,
                elapsed: due - previous,
                skipped: false,
            },
            (Some(_), Some(previous)) => CycleTick {
                start: now,
                elapsed: now - previous,
                skipped: true,
            },
            _ => CycleTick {
                start: now,
                elapsed: self.period,
                skipped: false,
            },
        };
        self.started = Some(tick.start);
        self.next_due = Some(tick.start + self.period);
        Some(tick)
    }
}

/// A started line cycle.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CycleTick {
    /// scheduled start, or `now` after missed cycles
    pub start: Instant,
    /// time since the previous cycle started, one period for the first cycle
    pub elapsed: Duration,
    /// at least one cycle was missed before this one
    pub skipped: bool,
}
