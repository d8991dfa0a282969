// src/ingest/types.rs
use anyhow::{Context, Result};
use metrics::counter;
use std::collections::VecDeque;
use std::time::Duration;

use crate::model::{GeoPoint, Origin};

/// One parsed feed message: a location, its raw hashtags, and provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct RawMention {
    pub loc: GeoPoint,
    pub hashtags: Vec<String>, // as written upstream, not yet lowercased
    pub origin: Origin,
}

/// Line-delimited feed body.
#[async_trait::async_trait]
pub trait LineSource: Send {
    /// `Ok(None)` at end of stream.
    async fn next_line(&mut self) -> Result<Option<String>>;
}

#[async_trait::async_trait]
pub trait StreamProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn open(&self) -> Result<Box<dyn LineSource>>;

    /// `Ok(None)` for well-formed lines that carry nothing to ingest
    /// (keep-alives, control messages, untagged or ungeolocated posts).
    /// `Err` means the line is malformed.
    fn parse_line(&self, line: &str) -> Result<Option<RawMention>>;
}

/// Canned lines, for fixtures and tests.
pub struct FixtureLines(VecDeque<String>);

impl FixtureLines {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(lines.into_iter().map(Into::into).collect())
    }
}

#[async_trait::async_trait]
impl LineSource for FixtureLines {
    async fn next_line(&mut self) -> Result<Option<String>> {
        Ok(self.0.pop_front())
    }
}

/// Longest feed line accepted; longer ones are dropped as malformed.
pub const MAX_LINE_BYTES: usize = 1 << 20;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client for long-lived feed connections. No total request timeout:
/// stalls are detected per line by the adapter.
pub(crate) fn stream_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .tcp_keepalive(Duration::from_secs(60))
        .build()
        .context("building stream http client")
}

fn decode(line: &[u8]) -> String {
    String::from_utf8_lossy(line).trim_end().to_string()
}

/// Incremental newline splitter with a length cap. A line over the cap is
/// discarded up to and including its terminating newline.
#[derive(Debug)]
pub struct LineSplitter {
    buf: Vec<u8>,
    // bytes of `buf` already known to hold no newline
    scanned: usize,
    max_len: usize,
    discarding: bool,
    dropped: u64,
}

impl LineSplitter {
    pub fn new(max_len: usize) -> Self {
        Self {
            buf: Vec::with_capacity(8 * 1024),
            scanned: 0,
            max_len,
            discarding: false,
            dropped: 0,
        }
    }

    /// Over-long lines discarded so far.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Next complete line, if one is buffered.
    pub fn next_line(&mut self) -> Option<String> {
        loop {
            let Some(i) = self.buf[self.scanned..].iter().position(|b| *b == b'\n') else {
                if self.buf.len() > self.max_len {
                    if !self.discarding {
                        self.dropped += 1;
                        self.discarding = true;
                    }
                    self.buf.clear();
                    self.scanned = 0;
                } else {
                    self.scanned = self.buf.len();
                }
                return None;
            };
            let end = self.scanned + i;
            let line: Vec<u8> = self.buf.drain(..=end).collect();
            self.scanned = 0;
            if std::mem::take(&mut self.discarding) {
                continue;
            }
            if line.len() - 1 > self.max_len {
                self.dropped += 1;
                continue;
            }
            return Some(decode(&line));
        }
    }

    /// The unterminated tail at end of stream.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buf);
        self.scanned = 0;
        if std::mem::take(&mut self.discarding) || rest.is_empty() {
            return None;
        }
        Some(decode(&rest))
    }
}

/// Splits a streaming HTTP body into lines.
pub struct HttpLines {
    resp: reqwest::Response,
    lines: LineSplitter,
    done: bool,
}

impl HttpLines {
    pub fn new(resp: reqwest::Response) -> Self {
        Self {
            resp,
            lines: LineSplitter::new(MAX_LINE_BYTES),
            done: false,
        }
    }
}

impl HttpLines {
    fn report_dropped(&self, before: u64) {
        let dropped = self.lines.dropped() - before;
        if dropped > 0 {
            counter!("ingest_malformed_total").increment(dropped);
            tracing::warn!(target: "ingest", max_bytes = MAX_LINE_BYTES, "over-long line dropped");
        }
    }
}

#[async_trait::async_trait]
impl LineSource for HttpLines {
    async fn next_line(&mut self) -> Result<Option<String>> {
        loop {
            let before = self.lines.dropped();
            let line = self.lines.next_line();
            self.report_dropped(before);
            if line.is_some() {
                return Ok(line);
            }
            if self.done {
                return Ok(self.lines.finish());
            }
            match self.resp.chunk().await.context("reading stream chunk")? {
                Some(bytes) => self.lines.push(&bytes),
                None => self.done = true,
            }
        }
    }
}
