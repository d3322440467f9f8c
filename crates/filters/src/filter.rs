//! The filter stage between a file reader and the session writer.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

use crate::context::{ContextOptions, GrepContext};
use crate::line_regex::LineRegex;
use crate::sampler::TransmitSampler;

/// A line as produced by the reader, before filtering.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RawLine {
    /// Line bytes, including the newline when present.
    pub content: Bytes,
    /// 1-based line count within the file.
    pub count: u64,
}

/// A line that passed the filter.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Line {
    /// Line bytes, including the newline when present.
    pub content: Bytes,
    /// 1-based line count within the file.
    pub count: u64,
    /// Transmitted percentage over the last matched lines.
    pub percent: u8,
    /// Source identifier, e.g. the glob id of the file.
    pub source: Arc<str>,
}

/// Counters reported when the filter finishes.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct FilterStats {
    /// Lines read from the input.
    pub seen: u64,
    /// Lines that passed the regex or context window.
    pub matched: u64,
    /// Lines handed to the output.
    pub transmitted: u64,
    /// Lines dropped because the output was full.
    pub dropped: u64,
}

/// Regex plus optional grep context, with transmit sampling.
#[derive(Debug)]
pub struct LineFilter {
    regex: LineRegex,
    source: Arc<str>,
    can_skip_lines: bool,
    context: Option<GrepContext>,
    sampler: TransmitSampler,
    stats: FilterStats,
    scratch: Vec<(Bytes, u64)>,
}

impl LineFilter {
    /// Creates a filter. `can_skip_lines` lets the stage drop lines when
    /// the output is at capacity; an active `context` disables that.
    pub fn new(
        regex: LineRegex,
        source: impl Into<Arc<str>>,
        can_skip_lines: bool,
        context: ContextOptions,
    ) -> Self {
        let context = context.is_active().then(|| GrepContext::new(context));
        Self {
            regex,
            source: source.into(),
            can_skip_lines: can_skip_lines && context.is_none(),
            context,
            sampler: TransmitSampler::new(),
            stats: FilterStats::default(),
            scratch: Vec::new(),
        }
    }

    /// Whether lines may be dropped under back-pressure.
    pub const fn can_skip_lines(&self) -> bool {
        self.can_skip_lines
    }

    /// Counters so far.
    pub const fn stats(&self) -> FilterStats {
        self.stats
    }

    /// Filters one line, appending the lines to emit to `out`.
    ///
    /// Returns `false` once the context's `max_count` is exhausted and no
    /// further input is wanted.
    pub fn evaluate(&mut self, raw: RawLine, out: &mut Vec<Line>) -> bool {
        self.stats.seen += 1;
        let matched = self.regex.is_match(&raw.content);

        match self.context.as_mut() {
            None => {
                if matched {
                    self.scratch.push((raw.content, raw.count));
                }
            }
            Some(context) => context.push(raw.content, raw.count, matched, &mut self.scratch),
        }

        for (content, count) in self.scratch.drain(..) {
            self.stats.matched += 1;
            self.sampler.record(true);
            out.push(Line {
                content,
                count,
                percent: self.sampler.percent(),
                source: Arc::clone(&self.source),
            });
        }

        !self
            .context
            .as_ref()
            .is_some_and(GrepContext::is_finished)
    }

    fn note_dropped(&mut self) {
        self.sampler.amend_last(false);
        self.stats.dropped += 1;
    }

    /// Drives the filter until the input ends, the output closes, the
    /// context is exhausted, or `cancel` fires.
    pub async fn run(
        mut self,
        mut input: mpsc::Receiver<RawLine>,
        output: mpsc::Sender<Line>,
        cancel: CancellationToken,
    ) -> FilterStats {
        let mut batch = Vec::new();
        loop {
            let raw = tokio::select! {
                () = cancel.cancelled() => break,
                raw = input.recv() => match raw {
                    Some(raw) => raw,
                    None => break,
                },
            };

            let more = self.evaluate(raw, &mut batch);
            for line in batch.drain(..) {
                if self.can_skip_lines {
                    match output.try_send(line) {
                        Ok(()) => self.stats.transmitted += 1,
                        Err(TrySendError::Full(_)) => self.note_dropped(),
                        Err(TrySendError::Closed(_)) => return self.stats,
                    }
                } else if output.send(line).await.is_ok() {
                    self.stats.transmitted += 1;
                } else {
                    return self.stats;
                }
            }

            if !more {
                tracing::debug!(source = %self.source, "max count reached, filter finished");
                break;
            }
        }
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line_regex::RegexFlag;

    fn raw(count: u64, text: &str) -> RawLine {
        RawLine {
            content: Bytes::copy_from_slice(text.as_bytes()),
            count,
        }
    }

    #[test]
    fn context_forces_lossless_mode() {
        let regex = LineRegex::new("x", RegexFlag::Default).unwrap();
        let filter = LineFilter::new(
            regex,
            "src",
            true,
            ContextOptions {
                after: 1,
                ..ContextOptions::default()
            },
        );
        assert!(!filter.can_skip_lines());
    }

    #[test]
    fn evaluate_emits_matching_lines_with_source() {
        let regex = LineRegex::new("ERROR", RegexFlag::Default).unwrap();
        let mut filter = LineFilter::new(regex, "app", false, ContextOptions::default());
        let mut out = Vec::new();
        assert!(filter.evaluate(raw(1, "INFO ok\n"), &mut out));
        assert!(filter.evaluate(raw(2, "ERROR bad\n"), &mut out));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].count, 2);
        assert_eq!(&*out[0].source, "app");
        assert_eq!(out[0].percent, 100);
        assert_eq!(filter.stats().seen, 2);
        assert_eq!(filter.stats().matched, 1);
    }

    #[tokio::test]
    async fn skipping_filter_drops_when_output_is_full() {
        let (in_tx, in_rx) = mpsc::channel(16);
        let (out_tx, mut out_rx) = mpsc::channel(1);
        let filter = LineFilter::new(LineRegex::noop(), "tail", true, ContextOptions::default());
        for i in 1..=5 {
            in_tx.send(raw(i, "line\n")).await.unwrap();
        }
        drop(in_tx);

        let stats = filter.run(in_rx, out_tx, CancellationToken::new()).await;
        assert_eq!(stats.seen, 5);
        assert_eq!(stats.transmitted, 1);
        assert_eq!(stats.dropped, 4);
        assert_eq!(out_rx.recv().await.unwrap().count, 1);
    }

    #[tokio::test]
    async fn lossless_filter_stops_at_max_count() {
        let (in_tx, in_rx) = mpsc::channel(16);
        let (out_tx, mut out_rx) = mpsc::channel(16);
        let regex = LineRegex::new("hit", RegexFlag::Default).unwrap();
        let filter = LineFilter::new(
            regex,
            "cat",
            false,
            ContextOptions {
                max_count: 1,
                ..ContextOptions::default()
            },
        );
        for (i, text) in ["miss", "hit one", "hit two"].iter().enumerate() {
            in_tx.send(raw(i as u64 + 1, text)).await.unwrap();
        }

        let stats = filter.run(in_rx, out_tx, CancellationToken::new()).await;
        assert_eq!(stats.transmitted, 1);
        assert_eq!(&out_rx.recv().await.unwrap().content[..], b"hit one");
        assert!(out_rx.recv().await.is_none());
    }
}
