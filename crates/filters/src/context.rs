//! Local grep context: `-B N`, `-A N` and `-m N`.

use std::collections::VecDeque;

use bytes::Bytes;

/// Context window limits. `0` disables each limit.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ContextOptions {
    /// Non-matching lines kept and emitted before a match.
    pub before: usize,
    /// Non-matching lines emitted after a match.
    pub after: usize,
    /// Matches accepted before the filter stops.
    pub max_count: usize,
}

impl ContextOptions {
    /// Whether any limit is active.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.before > 0 || self.after > 0 || self.max_count > 0
    }
}

/// State machine deciding which lines a context-aware grep emits.
#[derive(Debug)]
pub struct GrepContext {
    options: ContextOptions,
    ring: VecDeque<Bytes>,
    after_remaining: usize,
    matches: usize,
    finished: bool,
}

impl GrepContext {
    /// Fresh state for `options`.
    #[must_use]
    pub fn new(options: ContextOptions) -> Self {
        Self {
            options,
            ring: VecDeque::with_capacity(options.before),
            after_remaining: 0,
            matches: 0,
            finished: false,
        }
    }

    /// Whether `max_count` was reached and the trailing window flushed.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.finished
    }

    fn max_reached(&self) -> bool {
        self.options.max_count > 0 && self.matches >= self.options.max_count
    }

    /// Feeds line `count` and appends what must be emitted, in order, to `out`.
    ///
    /// Buffered leading lines get their counts reconstructed from `count`.
    pub fn push(&mut self, content: Bytes, count: u64, matched: bool, out: &mut Vec<(Bytes, u64)>) {
        if self.finished {
            return;
        }

        if self.max_reached() {
            self.emit_trailing(content, count, out);
            return;
        }

        if matched {
            let buffered = self.ring.len() as u64;
            for (i, line) in self.ring.drain(..).enumerate() {
                out.push((line, count.saturating_sub(buffered) + i as u64));
            }
            out.push((content, count));
            self.matches += 1;
            self.after_remaining = self.options.after;
            if self.max_reached() && self.after_remaining == 0 {
                self.finished = true;
            }
            return;
        }

        if self.after_remaining > 0 {
            self.emit_trailing(content, count, out);
        } else if self.options.before > 0 {
            if self.ring.len() == self.options.before {
                self.ring.pop_front();
            }
            self.ring.push_back(content);
        }
    }

    fn emit_trailing(&mut self, content: Bytes, count: u64, out: &mut Vec<(Bytes, u64)>) {
        if self.after_remaining > 0 {
            out.push((content, count));
            self.after_remaining -= 1;
        }
        if self.max_reached() && self.after_remaining == 0 {
            self.finished = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(options: ContextOptions, lines: &[&str], needle: &str) -> (Vec<(String, u64)>, bool) {
        let mut context = GrepContext::new(options);
        let mut out = Vec::new();
        for (i, line) in lines.iter().enumerate() {
            context.push(
                Bytes::copy_from_slice(line.as_bytes()),
                i as u64 + 1,
                line.contains(needle),
                &mut out,
            );
        }
        let out = out
            .into_iter()
            .map(|(b, c)| (String::from_utf8(b.to_vec()).unwrap(), c))
            .collect();
        (out, context.is_finished())
    }

    const LINES: &[&str] = &["a", "b", "c", "MATCH1", "d", "e", "f", "MATCH2", "g"];

    #[test]
    fn before_window_flushes_in_order_with_counts() {
        let (out, _) = run(
            ContextOptions {
                before: 2,
                ..ContextOptions::default()
            },
            LINES,
            "MATCH",
        );
        assert_eq!(
            out,
            vec![
                ("b".into(), 2),
                ("c".into(), 3),
                ("MATCH1".into(), 4),
                ("e".into(), 6),
                ("f".into(), 7),
                ("MATCH2".into(), 8),
            ]
        );
    }

    #[test]
    fn after_window_emits_following_lines() {
        let (out, _) = run(
            ContextOptions {
                after: 1,
                ..ContextOptions::default()
            },
            LINES,
            "MATCH",
        );
        let names: Vec<_> = out.iter().map(|(l, _)| l.as_str()).collect();
        assert_eq!(names, ["MATCH1", "d", "MATCH2", "g"]);
    }

    #[test]
    fn max_count_one_stops_after_trailing_window() {
        let (out, finished) = run(
            ContextOptions {
                after: 2,
                max_count: 1,
                ..ContextOptions::default()
            },
            LINES,
            "MATCH",
        );
        let names: Vec<_> = out.iter().map(|(l, _)| l.as_str()).collect();
        assert_eq!(names, ["MATCH1", "d", "e"]);
        assert!(finished);
    }

    #[test]
    fn max_count_zero_is_disabled() {
        let (out, finished) = run(
            ContextOptions {
                after: 0,
                before: 0,
                max_count: 0,
            },
            LINES,
            "MATCH",
        );
        assert_eq!(out.len(), 2);
        assert!(!finished);
    }

    #[test]
    fn max_count_without_after_finishes_at_match() {
        let (out, finished) = run(
            ContextOptions {
                max_count: 2,
                ..ContextOptions::default()
            },
            LINES,
            "MATCH",
        );
        assert_eq!(out.len(), 2);
        assert!(finished);
    }
}
