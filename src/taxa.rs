use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::sync::LazyLock;

use camino::Utf8Path;
use regex::Regex;

use crate::error::GenebaseError;
use crate::store::{RAW_EXTENSION, RAW_PREFIX, write_atomic};

static ORGANISM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\sOS=([^=]+?)\s(?:OX=|GN=|PE=|SV=|$)").expect("valid organism regex")
});

/// Organism name (`OS=` field) of a UniProt FASTA header.
pub fn extract_organism(header: &str) -> Option<String> {
    ORGANISM_RE
        .captures(header)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|name| !name.is_empty())
}

/// Term to the set of organisms its raw records came from.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OrganismTable {
    rows: BTreeMap<String, BTreeSet<String>>,
}

impl OrganismTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.rows
    }

    pub fn add_headers<R: BufRead>(&mut self, term: &str, reader: R) -> Result<(), GenebaseError> {
        let organisms = self.rows.entry(term.to_string()).or_default();
        for line in reader.lines() {
            let line = line.map_err(|err| GenebaseError::Filesystem(err.to_string()))?;
            if !line.starts_with('>') {
                continue;
            }
            if let Some(organism) = extract_organism(&line) {
                organisms.insert(organism);
            }
        }
        Ok(())
    }

    /// Builds the table from `(term, raw file)` pairs, keyed by the term as
    /// given rather than by its file stem.
    pub fn from_term_files<'p, I>(files: I) -> Result<Self, GenebaseError>
    where
        I: IntoIterator<Item = (&'p str, &'p Utf8Path)>,
    {
        let mut table = Self::new();
        for (term, path) in files {
            let file = File::open(path.as_std_path())
                .map_err(|err| GenebaseError::Filesystem(format!("open {path}: {err}")))?;
            table.add_headers(term, BufReader::new(file))?;
        }
        Ok(table)
    }

    /// Builds the table from every `uniprot_<stem>.fasta` in `raw_dir`, keyed
    /// by file stem.
    pub fn from_raw_dir(raw_dir: &Utf8Path) -> Result<Self, GenebaseError> {
        let mut table = Self::new();
        if !raw_dir.as_std_path().exists() {
            return Ok(table);
        }
        let entries = fs::read_dir(raw_dir.as_std_path())
            .map_err(|err| GenebaseError::Filesystem(format!("read {raw_dir}: {err}")))?;
        for entry in entries {
            let entry = entry.map_err(|err| GenebaseError::Filesystem(err.to_string()))?;
            let path = entry.path();
            let Some(term) = path
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(|name| name.strip_prefix(RAW_PREFIX))
                .and_then(|name| name.strip_suffix(&format!(".{RAW_EXTENSION}")))
            else {
                continue;
            };
            let file = File::open(&path)
                .map_err(|err| GenebaseError::Filesystem(format!("open {}: {err}", path.display())))?;
            table.add_headers(term, BufReader::new(file))?;
        }
        Ok(table)
    }

    pub fn write_tsv(&self, writer: &mut dyn Write) -> Result<(), GenebaseError> {
        let mut write = || -> std::io::Result<()> {
            writeln!(writer, "protein\ttaxa")?;
            for (term, organisms) in &self.rows {
                let joined = organisms.iter().cloned().collect::<Vec<_>>().join(", ");
                writeln!(writer, "{term}\t{joined}")?;
            }
            Ok(())
        };
        write().map_err(|err| GenebaseError::Filesystem(err.to_string()))
    }

    pub fn write_to(&self, path: &Utf8Path) -> Result<(), GenebaseError> {
        write_atomic(path, |writer| self.write_tsv(writer))
    }
}
