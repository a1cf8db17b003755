use std::fs::{self, File};
use std::io::{Seek, SeekFrom};
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::{info, warn};

use crate::batch::BatchRetriever;
use crate::config::ResolvedConfig;
use crate::dedup::{DedupSummary, Deduplicator};
use crate::domain::{ReviewedFilter, Term};
use crate::error::GenebaseError;
use crate::fallback::FallbackSelector;
use crate::fetch::PagedFetcher;
use crate::query::QueryBuilder;
use crate::retry::CancelToken;
use crate::store::OutputLayout;
use crate::taxa::OrganismTable;
use crate::uniprot::{Endpoints, UniprotTransport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TermStatus {
    /// Reviewed search returned records.
    Primary,
    /// Reviewed search was empty; capped unreviewed accessions were fetched.
    Fallback,
    NotFound,
    Invalid,
}

#[derive(Debug, Clone, Serialize)]
pub struct TermOutcome {
    pub term: String,
    pub status: TermStatus,
    pub records: u64,
    pub fallback_accessions: usize,
    pub raw_path: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunPaths {
    pub combined: String,
    pub dedup: String,
    pub report: String,
    pub not_found: String,
    pub organism_table: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub started_at: String,
    pub finished_at: String,
    pub cancelled: bool,
    pub terms: Vec<TermOutcome>,
    pub not_found: Vec<String>,
    pub combined_records: u64,
    pub dedup: Option<DedupSummary>,
    pub paths: RunPaths,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// Reads one term per line, skipping blank lines.
pub fn read_terms(path: &Utf8Path) -> Result<Vec<String>, GenebaseError> {
    let content = fs::read_to_string(path.as_std_path())
        .map_err(|_| GenebaseError::InputRead(path.as_std_path().to_path_buf()))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

struct TermProgress {
    status: TermStatus,
    records: u64,
    fallback_accessions: usize,
}

impl TermProgress {
    fn not_found(fallback_accessions: usize) -> Self {
        Self {
            status: TermStatus::NotFound,
            records: 0,
            fallback_accessions,
        }
    }
}

pub struct App<T: UniprotTransport> {
    transport: T,
    config: ResolvedConfig,
    endpoints: Endpoints,
    queries: QueryBuilder,
    cancel: CancelToken,
}

impl<T: UniprotTransport> App<T> {
    pub fn new(transport: T, config: ResolvedConfig) -> Self {
        let endpoints = Endpoints::new(&config.base_url);
        let queries = QueryBuilder::new(config.taxonomy_filter.clone());
        Self {
            transport,
            config,
            endpoints,
            queries,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    /// Drives every term through primary and fallback retrieval, then
    /// deduplicates the combined collection once.
    pub fn run(
        &self,
        lines: &[String],
        layout: &OutputLayout,
        sink: &dyn ProgressSink,
    ) -> Result<RunResult, GenebaseError> {
        let started_at = iso_timestamp();
        layout.ensure_dirs()?;
        layout.reset_run_files()?;

        let mut outcomes = Vec::with_capacity(lines.len());
        let mut not_found = Vec::new();
        let mut combined_records = 0u64;
        let mut cancelled = false;

        for (index, line) in lines.iter().enumerate() {
            if index > 0 && self.cancel.sleep(self.config.term_delay()).is_err() {
                cancelled = true;
                break;
            }
            let start = Instant::now();

            let term = match line.parse::<Term>() {
                Ok(term) => term,
                Err(err) => {
                    warn!(line = %line, "skipping term: {err}");
                    OutputLayout::append_line(&layout.not_found_path(), line)?;
                    not_found.push(line.clone());
                    outcomes.push(TermOutcome {
                        term: line.clone(),
                        status: TermStatus::Invalid,
                        records: 0,
                        fallback_accessions: 0,
                        raw_path: None,
                    });
                    continue;
                }
            };

            sink.event(ProgressEvent {
                message: format!("phase=Resolve; term {} ({}/{})", term, index + 1, lines.len()),
                elapsed: None,
            });

            let mut scratch = layout.term_scratch()?;
            let progress = match self.resolve_term(&term, scratch.as_file_mut(), sink) {
                Ok(progress) => progress,
                Err(GenebaseError::Cancelled) => {
                    cancelled = true;
                    break;
                }
                Err(err) => return Err(err),
            };

            let raw_path = if progress.records > 0 {
                let raw_path = layout.term_raw_path(&term);
                scratch
                    .persist(raw_path.as_std_path())
                    .map_err(|err| GenebaseError::Filesystem(err.to_string()))?;
                OutputLayout::append_file(&raw_path, &layout.combined_path())?;
                combined_records += progress.records;
                info!(term = %term, status = ?progress.status, records = progress.records, "term done");
                Some(raw_path.to_string())
            } else {
                drop(scratch);
                OutputLayout::append_line(&layout.not_found_path(), term.as_str())?;
                not_found.push(term.to_string());
                info!(term = %term, "term not found");
                None
            };

            sink.event(ProgressEvent {
                message: format!(
                    "phase=Store; term {} status={:?} records={}",
                    term, progress.status, progress.records
                ),
                elapsed: Some(start.elapsed()),
            });

            outcomes.push(TermOutcome {
                term: term.to_string(),
                status: progress.status,
                records: progress.records,
                fallback_accessions: progress.fallback_accessions,
                raw_path,
            });
        }

        let dedup = if cancelled {
            warn!(processed = outcomes.len(), "run cancelled before deduplication");
            None
        } else if combined_records == 0 {
            info!("no records found for any term");
            None
        } else {
            sink.event(ProgressEvent {
                message: format!("phase=Dedup; {combined_records} records"),
                elapsed: None,
            });
            let summary = Deduplicator::default().run(
                &layout.combined_path(),
                &layout.dedup_path(),
                &layout.report_path(),
            )?;
            let raw_files: Vec<(&str, Utf8PathBuf)> = outcomes
                .iter()
                .filter_map(|outcome| {
                    let path = outcome.raw_path.as_deref()?;
                    Some((outcome.term.as_str(), Utf8PathBuf::from(path)))
                })
                .collect();
            OrganismTable::from_term_files(
                raw_files.iter().map(|(term, path)| (*term, path.as_path())),
            )?
            .write_to(&layout.organism_table_path())?;
            Some(summary)
        };

        let result = RunResult {
            started_at,
            finished_at: iso_timestamp(),
            cancelled,
            terms: outcomes,
            not_found,
            combined_records,
            dedup,
            paths: run_paths(layout),
        };
        OutputLayout::write_json(&layout.summary_path(), &result)?;

        if cancelled {
            return Err(GenebaseError::Cancelled);
        }
        Ok(result)
    }

    fn fetcher(&self) -> PagedFetcher<'_> {
        PagedFetcher::new(
            &self.transport,
            &self.endpoints,
            &self.cancel,
            self.config.page_policy(),
            self.config.page_size,
        )
    }

    /// Init -> PrimaryFetch -> {Done | FallbackSearch -> {FallbackFetch -> Done | NotFound}}
    fn resolve_term(
        &self,
        term: &Term,
        scratch: &mut File,
        sink: &dyn ProgressSink,
    ) -> Result<TermProgress, GenebaseError> {
        let fetcher = self.fetcher();
        let primary = self.queries.build(term, ReviewedFilter::Reviewed);

        sink.event(ProgressEvent {
            message: format!("phase=PrimaryFetch; term {term}"),
            elapsed: None,
        });
        match fetcher.fetch_fasta(&primary, scratch) {
            Ok(records) if records > 0 => {
                return Ok(TermProgress {
                    status: TermStatus::Primary,
                    records,
                    fallback_accessions: 0,
                });
            }
            Ok(_) => {}
            Err(err @ (GenebaseError::Cancelled | GenebaseError::Filesystem(_))) => {
                return Err(err);
            }
            Err(err) => warn!(term = %term, "primary fetch failed, trying fallback: {err}"),
        }
        truncate(scratch)?;

        sink.event(ProgressEvent {
            message: format!("phase=FallbackSearch; term {term}"),
            elapsed: None,
        });
        let group = FallbackSelector::new(fetcher, self.config.per_taxon_cap).select(&primary)?;
        if group.is_empty() {
            return Ok(TermProgress::not_found(0));
        }

        let accessions = group.flatten();
        sink.event(ProgressEvent {
            message: format!(
                "phase=FallbackFetch; term {term} accessions={} taxa={}",
                accessions.len(),
                group.taxa().len()
            ),
            elapsed: None,
        });
        let retriever = BatchRetriever::new(
            fetcher,
            self.config.batch_size,
            self.config.single_entry_policy(),
        );
        let records = retriever.retrieve(&accessions, scratch)?;
        if records == 0 {
            truncate(scratch)?;
            return Ok(TermProgress::not_found(accessions.len()));
        }
        Ok(TermProgress {
            status: TermStatus::Fallback,
            records,
            fallback_accessions: accessions.len(),
        })
    }
}

/// Deduplicates an existing collection into `layout`'s dedup outputs.
pub fn dedup_file(input: &Utf8Path, layout: &OutputLayout) -> Result<DedupSummary, GenebaseError> {
    fs::create_dir_all(layout.root().as_std_path())
        .map_err(|err| GenebaseError::Filesystem(format!("create {}: {err}", layout.root())))?;
    Deduplicator::default().run(input, &layout.dedup_path(), &layout.report_path())
}

/// Rebuilds `protein_taxa.tsv` from the raw per-term files of `layout`.
/// Terms are taken from `run.json` when present so rows carry the original
/// names; otherwise every raw file is read and keyed by its stem.
pub fn write_organism_table(layout: &OutputLayout) -> Result<OrganismTable, GenebaseError> {
    let summary_path = layout.summary_path();
    let table = if summary_path.as_std_path().exists() {
        let raw_files = recorded_raw_files(&summary_path)?;
        OrganismTable::from_term_files(
            raw_files
                .iter()
                .filter(|(_, path)| path.as_std_path().exists())
                .map(|(term, path)| (term.as_str(), path.as_path())),
        )?
    } else {
        OrganismTable::from_raw_dir(&layout.raw_dir())?
    };
    table.write_to(&layout.organism_table_path())?;
    Ok(table)
}

fn recorded_raw_files(summary_path: &Utf8Path) -> Result<Vec<(String, Utf8PathBuf)>, GenebaseError> {
    let content = fs::read_to_string(summary_path.as_std_path())
        .map_err(|_| GenebaseError::InputRead(summary_path.as_std_path().to_path_buf()))?;
    let value: serde_json::Value = serde_json::from_str(&content)
        .map_err(|err| GenebaseError::Filesystem(format!("parse {summary_path}: {err}")))?;
    let terms = value
        .get("terms")
        .and_then(|terms| terms.as_array())
        .map(Vec::as_slice)
        .unwrap_or_default();
    Ok(terms
        .iter()
        .filter_map(|outcome| {
            let term = outcome.get("term")?.as_str()?;
            let path = outcome.get("raw_path")?.as_str()?;
            Some((term.to_string(), Utf8PathBuf::from(path)))
        })
        .collect())
}

fn truncate(file: &mut File) -> Result<(), GenebaseError> {
    file.set_len(0)
        .and_then(|_| file.seek(SeekFrom::Start(0)).map(|_| ()))
        .map_err(|err| GenebaseError::Filesystem(err.to_string()))
}

fn run_paths(layout: &OutputLayout) -> RunPaths {
    RunPaths {
        combined: layout.combined_path().to_string(),
        dedup: layout.dedup_path().to_string(),
        report: layout.report_path().to_string(),
        not_found: layout.not_found_path().to_string(),
        organism_table: layout.organism_table_path().to_string(),
    }
}

fn iso_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}
