//! Drift-free sample clock
//!
//! Converts wall-clock ticks into whole PCM samples. The sub-sample remainder
//! of every tick is kept in milli-sample units so the long-run sample count
//! after `T` ms is exactly `floor(T * rate / 1000)`.

/// Tick-to-sample converter for one stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SampleClock {
    sample_rate: u32,
    interval_ms: u32,
    last_tick_ms: Option<u32>,
    acc_num_missed_samples: u32,
}

impl SampleClock {
    /// Create a clock for `sample_rate` Hz ticking every `interval_ms`
    #[must_use]
    pub const fn new(sample_rate: u32, interval_ms: u32) -> Self {
        Self {
            sample_rate,
            interval_ms,
            last_tick_ms: None,
            acc_num_missed_samples: 0,
        }
    }

    /// Sampling frequency in Hz
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Nominal tick period in milliseconds
    #[must_use]
    pub const fn interval_ms(&self) -> u32 {
        self.interval_ms
    }

    /// Sub-sample remainder, always below 1000
    #[must_use]
    pub const fn acc_num_missed_samples(&self) -> u32 {
        self.acc_num_missed_samples
    }

    /// Samples that became due at `now_ms`
    ///
    /// The first tick after a reset accounts for one nominal interval.
    /// `now_ms` may wrap around.
    #[allow(clippy::cast_possible_truncation)]
    pub fn tick(&mut self, now_ms: u32) -> usize {
        let elapsed = match self.last_tick_ms {
            Some(last) => now_ms.wrapping_sub(last),
            None => self.interval_ms,
        };
        self.last_tick_ms = Some(now_ms);

        let scaled = u64::from(elapsed) * u64::from(self.sample_rate);
        let mut samples = scaled / 1000;
        // remainder is below 1000, the accumulator below 2000
        self.acc_num_missed_samples += (scaled % 1000) as u32;
        while self.acc_num_missed_samples >= 1000 {
            samples += 1;
            self.acc_num_missed_samples -= 1000;
        }
        usize::try_from(samples).unwrap_or(usize::MAX)
    }

    /// Forget the previous tick and the remainder
    pub fn reset(&mut self) {
        self.last_tick_ms = None;
        self.acc_num_missed_samples = 0;
    }
}
