use chrono::{DateTime, Duration, SubsecRound, Utc};

/// Hands out strictly increasing timestamps at microsecond precision.
#[derive(Debug, Default)]
pub(crate) struct MonotonicClock {
    last: Option<DateTime<Utc>>,
}

impl MonotonicClock {
    /// Start after an already-stored timestamp.
    pub(crate) fn starting_after(last: Option<DateTime<Utc>>) -> Self {
        Self { last }
    }

    pub(crate) fn next(&mut self) -> DateTime<Utc> {
        let now = Utc::now().trunc_subsecs(6);
        let next = match self.last {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last = Some(next);
        next
    }
}
