/// Number of most recent matched lines the transmit percentage covers.
pub const SAMPLE_WINDOW: u32 = 100;

/// Rotating bit array over the last [`SAMPLE_WINDOW`] matched lines, one
/// bit per line: set when the line was transmitted, clear when dropped.
#[derive(Clone, Copy, Debug, Default)]
pub struct TransmitSampler {
    bits: u128,
    position: u32,
    filled: u32,
}

impl TransmitSampler {
    /// Empty sampler; reports 100 until something is dropped.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            bits: 0,
            position: 0,
            filled: 0,
        }
    }

    /// Records one matched line.
    pub fn record(&mut self, transmitted: bool) {
        self.set_bit(self.position, transmitted);
        self.position = (self.position + 1) % SAMPLE_WINDOW;
        self.filled = (self.filled + 1).min(SAMPLE_WINDOW);
    }

    /// Rewrites the most recent record, e.g. after a send failed.
    pub fn amend_last(&mut self, transmitted: bool) {
        if self.filled == 0 {
            return;
        }
        let last = (self.position + SAMPLE_WINDOW - 1) % SAMPLE_WINDOW;
        self.set_bit(last, transmitted);
    }

    /// Lines matched within the window.
    #[must_use]
    pub const fn matched(&self) -> u32 {
        self.filled
    }

    /// Lines transmitted within the window.
    #[must_use]
    pub const fn transmitted(&self) -> u32 {
        self.bits.count_ones()
    }

    /// `round(transmitted / matched * 100)`, or 100 when nothing was dropped.
    #[must_use]
    pub fn percent(&self) -> u8 {
        let matched = self.matched();
        let transmitted = self.transmitted();
        if matched == transmitted {
            return 100;
        }
        ((f64::from(transmitted) / f64::from(matched)) * 100.0).round() as u8
    }

    fn set_bit(&mut self, index: u32, value: bool) {
        let mask = 1u128 << index;
        if value {
            self.bits |= mask;
        } else {
            self.bits &= !mask;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn all_transmitted_is_hundred_percent() {
        let mut sampler = TransmitSampler::new();
        assert_eq!(sampler.percent(), 100);
        for _ in 0..250 {
            sampler.record(true);
        }
        assert_eq!(sampler.matched(), 100);
        assert_eq!(sampler.percent(), 100);
    }

    #[test]
    fn window_forgets_old_drops() {
        let mut sampler = TransmitSampler::new();
        for _ in 0..50 {
            sampler.record(false);
        }
        assert_eq!(sampler.percent(), 0);
        for _ in 0..100 {
            sampler.record(true);
        }
        assert_eq!(sampler.percent(), 100);
    }

    #[test]
    fn amend_last_flips_latest_record() {
        let mut sampler = TransmitSampler::new();
        sampler.record(true);
        sampler.record(true);
        sampler.amend_last(false);
        assert_eq!(sampler.percent(), 50);
    }

    proptest! {
        #[test]
        fn percent_tracks_ratio_of_last_hundred(history in proptest::collection::vec(any::<bool>(), 1..400)) {
            let mut sampler = TransmitSampler::new();
            for sent in &history {
                sampler.record(*sent);
            }
            let window = &history[history.len().saturating_sub(100)..];
            let matched = window.len() as f64;
            let transmitted = window.iter().filter(|sent| **sent).count() as f64;
            let percent = f64::from(sampler.percent());
            if matched == transmitted {
                prop_assert!((percent - 100.0).abs() < f64::EPSILON);
            } else {
                prop_assert!((percent - transmitted / matched * 100.0).abs() <= 1.0);
            }
        }
    }
}
