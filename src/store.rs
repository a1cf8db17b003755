use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tempfile::{Builder, NamedTempFile};

use crate::domain::Term;
use crate::error::GenebaseError;

pub const RAW_PREFIX: &str = "uniprot_";
pub const RAW_EXTENSION: &str = "fasta";

/// File layout of one run under its output directory.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: Utf8PathBuf,
}

impl OutputLayout {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn raw_dir(&self) -> Utf8PathBuf {
        self.root.join("raw")
    }

    pub fn term_raw_path(&self, term: &Term) -> Utf8PathBuf {
        self.raw_dir()
            .join(format!("{RAW_PREFIX}{}.{RAW_EXTENSION}", term.file_stem()))
    }

    pub fn combined_path(&self) -> Utf8PathBuf {
        self.root.join("combined.fasta")
    }

    pub fn dedup_path(&self) -> Utf8PathBuf {
        self.root.join("dedup.fasta")
    }

    pub fn report_path(&self) -> Utf8PathBuf {
        self.root.join("dedup_report.tsv")
    }

    pub fn not_found_path(&self) -> Utf8PathBuf {
        self.root.join("not_found.txt")
    }

    pub fn organism_table_path(&self) -> Utf8PathBuf {
        self.root.join("protein_taxa.tsv")
    }

    pub fn summary_path(&self) -> Utf8PathBuf {
        self.root.join("run.json")
    }

    pub fn ensure_dirs(&self) -> Result<(), GenebaseError> {
        fs::create_dir_all(self.raw_dir().as_std_path()).map_err(|err| {
            GenebaseError::Filesystem(format!("create {}: {err}", self.raw_dir()))
        })
    }

    /// Truncates the run-wide append targets and drops outputs of a previous
    /// run so a new run starts empty.
    pub fn reset_run_files(&self) -> Result<(), GenebaseError> {
        for path in [self.combined_path(), self.not_found_path()] {
            File::create(path.as_std_path())
                .map_err(|err| GenebaseError::Filesystem(format!("create {path}: {err}")))?;
        }
        for path in [self.dedup_path(), self.report_path(), self.organism_table_path()] {
            remove_if_exists(&path)?;
        }
        let raw_dir = self.raw_dir();
        let entries = fs::read_dir(raw_dir.as_std_path())
            .map_err(|err| GenebaseError::Filesystem(format!("read {raw_dir}: {err}")))?;
        for entry in entries {
            let entry = entry.map_err(|err| GenebaseError::Filesystem(err.to_string()))?;
            let Ok(path) = Utf8PathBuf::from_path_buf(entry.path()) else {
                continue;
            };
            let is_raw = path.extension() == Some(RAW_EXTENSION)
                && path.file_name().is_some_and(|name| name.starts_with(RAW_PREFIX));
            if is_raw {
                remove_if_exists(&path)?;
            }
        }
        Ok(())
    }

    /// Scratch file for one term's records, removed on drop unless persisted.
    pub fn term_scratch(&self) -> Result<NamedTempFile, GenebaseError> {
        Builder::new()
            .prefix(".genebase-term")
            .suffix(".fasta")
            .tempfile_in(self.raw_dir().as_std_path())
            .map_err(|err| GenebaseError::Filesystem(err.to_string()))
    }

    pub fn append_line(path: &Utf8Path, line: &str) -> Result<(), GenebaseError> {
        let mut file = open_append(path)?;
        writeln!(file, "{line}")
            .and_then(|_| file.flush())
            .map_err(|err| GenebaseError::Filesystem(format!("append {path}: {err}")))
    }

    /// Appends the whole of `source` to `dest` and flushes.
    pub fn append_file(source: &Utf8Path, dest: &Utf8Path) -> Result<u64, GenebaseError> {
        let mut input = File::open(source.as_std_path())
            .map_err(|err| GenebaseError::Filesystem(format!("open {source}: {err}")))?;
        let mut output = open_append(dest)?;
        let copied = io::copy(&mut input, &mut output)
            .and_then(|copied| output.sync_data().map(|_| copied))
            .map_err(|err| GenebaseError::Filesystem(format!("append {dest}: {err}")))?;
        Ok(copied)
    }

    pub fn write_json<T: Serialize>(path: &Utf8Path, value: &T) -> Result<(), GenebaseError> {
        let content = serde_json::to_vec_pretty(value)
            .map_err(|err| GenebaseError::Filesystem(err.to_string()))?;
        write_atomic(path, |writer| {
            writer
                .write_all(&content)
                .and_then(|_| writer.write_all(b"\n"))
                .map_err(|err| GenebaseError::Filesystem(err.to_string()))
        })
    }
}

fn remove_if_exists(path: &Utf8Path) -> Result<(), GenebaseError> {
    match fs::remove_file(path.as_std_path()) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(GenebaseError::Filesystem(format!("remove {path}: {err}"))),
    }
}

fn open_append(path: &Utf8Path) -> Result<File, GenebaseError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path.as_std_path())
        .map_err(|err| GenebaseError::Filesystem(format!("open {path}: {err}")))
}

/// Writes `path` through a sibling temp file that replaces it only after
/// `fill` succeeds.
pub fn write_atomic<T, F>(path: &Utf8Path, fill: F) -> Result<T, GenebaseError>
where
    F: FnOnce(&mut dyn Write) -> Result<T, GenebaseError>,
{
    let parent = match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent.to_path_buf(),
        _ => Utf8PathBuf::from("."),
    };
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| GenebaseError::Filesystem(format!("create {parent}: {err}")))?;
    let mut temp = Builder::new()
        .prefix(".genebase-file")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| GenebaseError::Filesystem(err.to_string()))?;
    let value = {
        let mut writer = BufWriter::new(temp.as_file_mut());
        let value = fill(&mut writer)?;
        writer
            .flush()
            .map_err(|err| GenebaseError::Filesystem(err.to_string()))?;
        value
    };
    temp.persist(path.as_std_path())
        .map_err(|err| GenebaseError::Filesystem(err.to_string()))?;
    Ok(value)
}
