use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};

use camino::Utf8Path;
use flate2::read::MultiGzDecoder;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::info;

use crate::error::GenebaseError;
use crate::store::write_atomic;

pub const DEFAULT_LINE_WIDTH: usize = 60;

/// Upper-cases and drops every whitespace character.
pub fn normalize_sequence(sequence: &str) -> String {
    sequence
        .chars()
        .filter(|ch| !ch.is_whitespace())
        .map(|ch| ch.to_ascii_uppercase())
        .collect()
}

/// SHA-256 of the normalized sequence, lowercase hex.
pub fn sequence_hash(sequence: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_sequence(sequence).as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DedupEntry {
    pub hash: String,
    pub header: String,
    pub count: u64,
}

/// Content hash to first-seen header and occurrence count, kept in first
/// encounter order.
#[derive(Debug, Default)]
pub struct DedupIndex {
    positions: HashMap<String, usize>,
    entries: Vec<DedupEntry>,
}

impl DedupIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one occurrence; true when the hash had not been seen yet.
    pub fn observe(&mut self, hash: String, header: &str) -> bool {
        if let Some(&position) = self.positions.get(&hash) {
            self.entries[position].count += 1;
            return false;
        }
        self.positions.insert(hash.clone(), self.entries.len());
        self.entries.push(DedupEntry {
            hash,
            header: header.to_string(),
            count: 1,
        });
        true
    }

    pub fn entries(&self) -> &[DedupEntry] {
        &self.entries
    }

    pub fn get(&self, hash: &str) -> Option<&DedupEntry> {
        self.positions.get(hash).map(|&position| &self.entries[position])
    }

    pub fn total_records(&self) -> u64 {
        self.entries.iter().map(|entry| entry.count).sum()
    }

    pub fn summary(&self) -> DedupSummary {
        let total_records = self.total_records();
        let unique_records = self.entries.len() as u64;
        DedupSummary {
            total_records,
            unique_records,
            duplicate_records: total_records - unique_records,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DedupSummary {
    pub total_records: u64,
    pub unique_records: u64,
    pub duplicate_records: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct Deduplicator {
    line_width: usize,
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self::new(DEFAULT_LINE_WIDTH)
    }
}

impl Deduplicator {
    pub fn new(line_width: usize) -> Self {
        Self {
            line_width: line_width.max(1),
        }
    }

    /// Deduplicates `input` (plain or `.gz`) into `retained` and writes the
    /// per-hash report to `report`. Both outputs are replaced atomically.
    pub fn run(
        &self,
        input: &Utf8Path,
        retained: &Utf8Path,
        report: &Utf8Path,
    ) -> Result<DedupSummary, GenebaseError> {
        let file = File::open(input.as_std_path())
            .map_err(|err| GenebaseError::Filesystem(format!("open {input}: {err}")))?;
        let reader: Box<dyn BufRead> = if input.extension() == Some("gz") {
            Box::new(BufReader::new(MultiGzDecoder::new(file)))
        } else {
            Box::new(BufReader::new(file))
        };

        let index = write_atomic(retained, |writer| self.dedup_stream(reader, writer))?;
        write_atomic(report, |writer| write_report(&index, writer))?;

        let summary = index.summary();
        info!(
            total = summary.total_records,
            unique = summary.unique_records,
            duplicates = summary.duplicate_records,
            "deduplication complete"
        );
        Ok(summary)
    }

    /// Streams FASTA records from `reader`, writing the first record of each
    /// distinct sequence to `retained` as it is met.
    pub fn dedup_stream<R: BufRead>(
        &self,
        mut reader: R,
        retained: &mut dyn Write,
    ) -> Result<DedupIndex, GenebaseError> {
        let mut index = DedupIndex::new();
        let mut current: Option<(String, String)> = None;
        let mut line = Vec::new();
        loop {
            line.clear();
            let read = reader
                .read_until(b'\n', &mut line)
                .map_err(|err| GenebaseError::Filesystem(err.to_string()))?;
            if read == 0 {
                break;
            }
            let text = String::from_utf8_lossy(&line);
            if let Some(header) = text.strip_prefix('>') {
                if let Some((header, sequence)) = current.take() {
                    self.emit(&mut index, &header, &sequence, retained)?;
                }
                current = Some((header.trim_end().to_string(), String::new()));
            } else if let Some((_, sequence)) = current.as_mut() {
                sequence.extend(text.chars().filter(|ch| !ch.is_whitespace()));
            }
        }
        if let Some((header, sequence)) = current.take() {
            self.emit(&mut index, &header, &sequence, retained)?;
        }
        Ok(index)
    }

    fn emit(
        &self,
        index: &mut DedupIndex,
        header: &str,
        sequence: &str,
        retained: &mut dyn Write,
    ) -> Result<(), GenebaseError> {
        if index.observe(sequence_hash(sequence), header) {
            write_record(retained, header, sequence, self.line_width)
                .map_err(|err| GenebaseError::Filesystem(err.to_string()))?;
        }
        Ok(())
    }
}

fn write_record(
    writer: &mut dyn Write,
    header: &str,
    sequence: &str,
    line_width: usize,
) -> std::io::Result<()> {
    writeln!(writer, ">{header}")?;
    for chunk in sequence.as_bytes().chunks(line_width) {
        writer.write_all(chunk)?;
        writer.write_all(b"\n")?;
    }
    Ok(())
}

/// `hash<TAB>header<TAB>count`, one line per distinct sequence.
pub fn write_report(index: &DedupIndex, writer: &mut dyn Write) -> Result<(), GenebaseError> {
    for entry in index.entries() {
        writeln!(writer, "{}\t{}\t{}", entry.hash, entry.header, entry.count)
            .map_err(|err| GenebaseError::Filesystem(err.to_string()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn dedup(input: &str) -> (DedupIndex, String) {
        let mut out = Vec::new();
        let index = Deduplicator::default()
            .dedup_stream(Cursor::new(input.as_bytes().to_vec()), &mut out)
            .unwrap();
        (index, String::from_utf8(out).unwrap())
    }

    #[test]
    fn normalization_ignores_case_and_whitespace() {
        assert_eq!(sequence_hash("MKT\nVLA"), sequence_hash("mktvla"));
        assert_eq!(sequence_hash(" M K T\r\n"), sequence_hash("MKT"));
        assert_ne!(sequence_hash("MKT"), sequence_hash("MKV"));
        assert_eq!(sequence_hash("MKT").len(), 64);
    }

    #[test]
    fn keeps_first_header_and_counts_duplicates() {
        let (index, out) = dedup(">first\nMKT\nVLA\n>second\nmktvla\n>third\nGGG\n");
        assert_eq!(out, ">first\nMKTVLA\n>third\nGGG\n");
        let entry = index.get(&sequence_hash("MKTVLA")).unwrap();
        assert_eq!(entry.header, "first");
        assert_eq!(entry.count, 2);
        assert_eq!(index.total_records(), 3);
        assert_eq!(index.summary().duplicate_records, 1);
    }

    #[test]
    fn wraps_at_sixty_columns() {
        let sequence = "A".repeat(130);
        let (_, out) = dedup(&format!(">long\n{sequence}\n"));
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[1].len(), 60);
        assert_eq!(lines[2].len(), 60);
        assert_eq!(lines[3].len(), 10);
    }

    #[test]
    fn ignores_preamble_and_handles_missing_trailing_newline() {
        let (index, out) = dedup("junk line\n>a\nMK\n>b\nMK");
        assert_eq!(out, ">a\nMK\n");
        assert_eq!(index.total_records(), 2);
    }

    #[test]
    fn report_lines() {
        let (index, _) = dedup(">x desc\nMK\n>y\nMK\n");
        let mut report = Vec::new();
        write_report(&index, &mut report).unwrap();
        let report = String::from_utf8(report).unwrap();
        assert_eq!(report, format!("{}\tx desc\t2\n", sequence_hash("MK")));
    }
}
