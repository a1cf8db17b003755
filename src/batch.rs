use std::collections::HashSet;
use std::io::Write;

use tracing::{debug, warn};

use crate::domain::Accession;
use crate::error::GenebaseError;
use crate::fetch::PagedFetcher;
use crate::query::QueryBuilder;
use crate::retry::RetryPolicy;

pub struct BatchRetriever<'a> {
    fetcher: PagedFetcher<'a>,
    batch_size: usize,
    single_policy: RetryPolicy,
}

impl<'a> BatchRetriever<'a> {
    pub fn new(fetcher: PagedFetcher<'a>, batch_size: usize, single_policy: RetryPolicy) -> Self {
        Self {
            fetcher,
            batch_size: batch_size.max(1),
            single_policy,
        }
    }

    /// Fetches full FASTA records for `accessions` into `sink` and returns
    /// the number of records written. Units that cannot be fetched are
    /// skipped; only cancellation and sink failures are errors.
    pub fn retrieve(
        &self,
        accessions: &[Accession],
        sink: &mut dyn Write,
    ) -> Result<u64, GenebaseError> {
        let mut seen = HashSet::new();
        let unique: Vec<Accession> = accessions
            .iter()
            .filter(|acc| seen.insert(acc.as_str().to_string()))
            .cloned()
            .collect();

        let mut total = 0u64;
        for (index, batch) in unique.chunks(self.batch_size).enumerate() {
            match self.fetch_batch(batch, sink) {
                Ok(count) => {
                    debug!(batch = index, size = batch.len(), records = count, "batch fetched");
                    total += count;
                }
                Err(err @ (GenebaseError::Cancelled | GenebaseError::Filesystem(_))) => {
                    return Err(err);
                }
                Err(err) => {
                    warn!(
                        batch = index,
                        size = batch.len(),
                        "batch fetch failed, falling back to single entries: {err}"
                    );
                    total += self.fetch_singles(batch, sink)?;
                }
            }
        }
        Ok(total)
    }

    fn fetch_batch(&self, batch: &[Accession], sink: &mut dyn Write) -> Result<u64, GenebaseError> {
        let query = QueryBuilder::accessions(batch);
        let size = self.batch_size.to_string();
        let url = self.fetcher.endpoints().stream(&[
            ("query", query.as_str()),
            ("format", "fasta"),
            ("size", size.as_str()),
        ])?;
        // Buffered so a batch failing on a later page leaves nothing behind
        // for the single-entry fallback to repeat.
        let mut buffer = Vec::new();
        let count = self.fetcher.fetch_url(url, &mut buffer)?;
        sink.write_all(&buffer)
            .map_err(|err| GenebaseError::Filesystem(err.to_string()))?;
        Ok(count)
    }

    fn fetch_singles(&self, batch: &[Accession], sink: &mut dyn Write) -> Result<u64, GenebaseError> {
        let single = self.fetcher.with_policy(self.single_policy);
        let mut total = 0u64;
        for accession in batch {
            let url = self.fetcher.endpoints().entry(accession);
            match single.fetch_url(url, sink) {
                Ok(count) => total += count,
                Err(err @ (GenebaseError::Cancelled | GenebaseError::Filesystem(_))) => {
                    return Err(err);
                }
                Err(err) => warn!(accession = %accession, "skipping accession: {err}"),
            }
        }
        Ok(total)
    }
}
