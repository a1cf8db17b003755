use std::io::{Read, Write};

use serde_json::Value;
use tracing::debug;

use crate::error::GenebaseError;
use crate::query::Query;
use crate::retry::{CancelToken, RetryPolicy};
use crate::uniprot::{Endpoints, UniprotTransport, ensure_ok};

const READ_CHUNK: usize = 64 * 1024;

/// Counts FASTA record starts (`>` at the beginning of a line) across
/// arbitrarily split chunks. A fresh counter treats its first byte as a line
/// start.
#[derive(Debug, Clone, Copy)]
pub struct MarkerCounter {
    at_line_start: bool,
    count: u64,
}

impl MarkerCounter {
    pub fn new() -> Self {
        Self {
            at_line_start: true,
            count: 0,
        }
    }

    pub fn feed(&mut self, chunk: &[u8]) {
        for &byte in chunk {
            if self.at_line_start && byte == b'>' {
                self.count += 1;
            }
            self.at_line_start = byte == b'\n';
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }
}

impl Default for MarkerCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// A fully read FASTA page.
#[derive(Debug)]
struct FastaPage {
    bytes: Vec<u8>,
    records: u64,
    next: Option<String>,
}

#[derive(Clone, Copy)]
pub struct PagedFetcher<'a> {
    transport: &'a dyn UniprotTransport,
    endpoints: &'a Endpoints,
    cancel: &'a CancelToken,
    policy: RetryPolicy,
    page_size: usize,
}

impl<'a> PagedFetcher<'a> {
    pub fn new(
        transport: &'a dyn UniprotTransport,
        endpoints: &'a Endpoints,
        cancel: &'a CancelToken,
        policy: RetryPolicy,
        page_size: usize,
    ) -> Self {
        Self {
            transport,
            endpoints,
            cancel,
            policy,
            page_size: page_size.max(1),
        }
    }

    pub fn with_policy(self, policy: RetryPolicy) -> Self {
        Self { policy, ..self }
    }

    pub fn endpoints(&self) -> &'a Endpoints {
        self.endpoints
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Streams every FASTA page of a search into `sink` and returns the
    /// number of records written. Exhausting retries on any page, first or
    /// continuation, fails the whole call.
    pub fn fetch_fasta(&self, query: &Query, sink: &mut dyn Write) -> Result<u64, GenebaseError> {
        let expression = query.expression();
        let size = self.page_size.to_string();
        let url = self.endpoints.search(&[
            ("query", expression.as_str()),
            ("format", "fasta"),
            ("size", size.as_str()),
        ])?;
        self.fetch_url(url, sink)
    }

    /// Same as [`fetch_fasta`](Self::fetch_fasta) from a prepared first URL.
    pub fn fetch_url(&self, first_url: String, sink: &mut dyn Write) -> Result<u64, GenebaseError> {
        let mut url = first_url;
        let mut total = 0u64;
        let mut pages = 0usize;
        loop {
            let page = self.read_fasta_page(&url)?;
            sink.write_all(&page.bytes)
                .map_err(|err| GenebaseError::Filesystem(err.to_string()))?;
            total += page.records;
            pages += 1;
            match page.next {
                Some(next) => url = next,
                None => break,
            }
        }
        debug!(pages, records = total, "fasta fetch complete");
        Ok(total)
    }

    /// One JSON page under the retry policy, with its continuation link.
    pub fn fetch_json_page(&self, url: &str) -> Result<(Value, Option<String>), GenebaseError> {
        self.policy.run(url, self.cancel, |attempt| {
            debug!(url, attempt, "requesting json page");
            let response = ensure_ok(self.transport.get(url)?)?;
            let next = response.next_link.clone();
            let value: Value = serde_json::from_reader(response.body).map_err(|err| {
                if err.is_io() || err.is_eof() {
                    GenebaseError::UniprotTransient(err.to_string())
                } else {
                    GenebaseError::UniprotPayload(err.to_string())
                }
            })?;
            Ok((value, next))
        })
    }

    fn read_fasta_page(&self, url: &str) -> Result<FastaPage, GenebaseError> {
        self.policy.run(url, self.cancel, |attempt| {
            debug!(url, attempt, "requesting fasta page");
            let response = ensure_ok(self.transport.get(url)?)?;
            let next = response.next_link.clone();
            let mut body = response.body;
            let mut bytes = Vec::new();
            let mut counter = MarkerCounter::new();
            let mut chunk = vec![0u8; READ_CHUNK];
            loop {
                let read = body
                    .read(&mut chunk)
                    .map_err(|err| GenebaseError::UniprotTransient(err.to_string()))?;
                if read == 0 {
                    break;
                }
                counter.feed(&chunk[..read]);
                bytes.extend_from_slice(&chunk[..read]);
            }
            // Pages and entries are concatenated; the next `>` must start a line.
            if bytes.last().is_some_and(|&last| last != b'\n') {
                bytes.push(b'\n');
            }
            Ok(FastaPage {
                bytes,
                records: counter.count(),
                next,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_marker_at_first_byte() {
        let mut counter = MarkerCounter::new();
        counter.feed(b">sp|A1|X\nMKT\n>sp|A2|Y\nVLA\n");
        assert_eq!(counter.count(), 2);
    }

    #[test]
    fn counts_across_chunk_boundaries() {
        let mut counter = MarkerCounter::new();
        counter.feed(b">a\nMK");
        counter.feed(b"T\n");
        counter.feed(b">b\nVLA\n");
        counter.feed(b"\n");
        counter.feed(b">");
        counter.feed(b"c\n");
        assert_eq!(counter.count(), 3);
    }

    #[test]
    fn ignores_inline_markers() {
        let mut counter = MarkerCounter::new();
        counter.feed(b">a desc with > inside\nMKT>VLA\n");
        assert_eq!(counter.count(), 1);
    }

    #[test]
    fn empty_body_counts_zero() {
        let mut counter = MarkerCounter::new();
        counter.feed(b"");
        assert_eq!(counter.count(), 0);
    }
}
