use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use crate::domain::{Accession, ReviewedFilter, TaxonId};
use crate::error::GenebaseError;
use crate::fetch::PagedFetcher;
use crate::query::Query;
use crate::uniprot::parse_search_hits;

const SEARCH_FIELDS: &str = "accession,organism_id,reviewed";

/// Accessions bucketed by taxon. Buckets never exceed `cap` and keep the
/// order in which accessions were offered; taxa iterate in first-seen order.
#[derive(Debug, Clone)]
pub struct AccessionGroup {
    cap: usize,
    taxa: Vec<TaxonId>,
    buckets: HashMap<TaxonId, Vec<Accession>>,
}

impl AccessionGroup {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            taxa: Vec::new(),
            buckets: HashMap::new(),
        }
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Returns false when the taxon bucket is already full.
    pub fn offer(&mut self, taxon: TaxonId, accession: Accession) -> bool {
        if self.cap == 0 {
            return false;
        }
        if !self.buckets.contains_key(&taxon) {
            self.taxa.push(taxon);
        }
        let bucket = self.buckets.entry(taxon).or_default();
        if bucket.len() >= self.cap || bucket.contains(&accession) {
            return false;
        }
        bucket.push(accession);
        true
    }

    pub fn get(&self, taxon: TaxonId) -> Option<&[Accession]> {
        self.buckets.get(&taxon).map(Vec::as_slice)
    }

    pub fn taxa(&self) -> &[TaxonId] {
        &self.taxa
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.values().all(Vec::is_empty)
    }

    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    /// All accessions, taxon by taxon, without repeats.
    pub fn flatten(&self) -> Vec<Accession> {
        let mut seen = HashSet::new();
        self.taxa
            .iter()
            .filter_map(|taxon| self.buckets.get(taxon))
            .flatten()
            .filter(|acc| seen.insert(acc.as_str().to_string()))
            .cloned()
            .collect()
    }
}

pub struct FallbackSelector<'a> {
    fetcher: PagedFetcher<'a>,
    per_taxon_cap: usize,
}

impl<'a> FallbackSelector<'a> {
    pub fn new(fetcher: PagedFetcher<'a>, per_taxon_cap: usize) -> Self {
        Self {
            fetcher,
            per_taxon_cap,
        }
    }

    /// Scans the unreviewed search for `query`'s term and keeps at most
    /// `per_taxon_cap` accessions per taxon. A failing page ends the scan
    /// with what was collected so far; only cancellation is an error.
    pub fn select(&self, query: &Query) -> Result<AccessionGroup, GenebaseError> {
        let query = query.with_reviewed(ReviewedFilter::Unreviewed);
        let expression = query.expression();
        let size = self.fetcher.page_size().to_string();
        let mut group = AccessionGroup::new(self.per_taxon_cap);

        let mut url = self.fetcher.endpoints().search(&[
            ("query", expression.as_str()),
            ("format", "json"),
            ("fields", SEARCH_FIELDS),
            ("size", size.as_str()),
        ])?;
        let mut pages = 0usize;
        loop {
            let (value, next) = match self.fetcher.fetch_json_page(&url) {
                Ok(page) => page,
                Err(GenebaseError::Cancelled) => return Err(GenebaseError::Cancelled),
                Err(err) => {
                    warn!(term = %query.term(), pages, "fallback search stopped early: {err}");
                    break;
                }
            };
            let hits = match parse_search_hits(&value) {
                Ok(hits) => hits,
                Err(err) => {
                    warn!(term = %query.term(), pages, "fallback search stopped early: {err}");
                    break;
                }
            };
            for hit in hits {
                if hit.reviewed {
                    continue;
                }
                group.offer(hit.taxon, hit.accession);
            }
            pages += 1;
            match next {
                Some(next) => url = next,
                None => break,
            }
        }
        debug!(
            term = %query.term(),
            pages,
            taxa = group.taxa().len(),
            accessions = group.len(),
            "fallback selection complete"
        );
        Ok(group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acc(value: &str) -> Accession {
        value.parse().unwrap()
    }

    #[test]
    fn bucket_respects_cap_and_order() {
        let mut group = AccessionGroup::new(2);
        assert!(group.offer(TaxonId(7), acc("A1")));
        assert!(group.offer(TaxonId(9), acc("B1")));
        assert!(group.offer(TaxonId(7), acc("A2")));
        assert!(!group.offer(TaxonId(7), acc("A3")));
        assert_eq!(group.get(TaxonId(7)).unwrap(), &[acc("A1"), acc("A2")]);
        assert_eq!(group.taxa(), &[TaxonId(7), TaxonId(9)]);
        assert_eq!(group.flatten(), vec![acc("A1"), acc("A2"), acc("B1")]);
    }

    #[test]
    fn repeated_accession_is_not_double_counted() {
        let mut group = AccessionGroup::new(3);
        assert!(group.offer(TaxonId(1), acc("A1")));
        assert!(!group.offer(TaxonId(1), acc("A1")));
        assert_eq!(group.len(), 1);
    }

    #[test]
    fn zero_cap_keeps_nothing() {
        let mut group = AccessionGroup::new(0);
        assert!(!group.offer(TaxonId(1), acc("A1")));
        assert!(group.is_empty());
    }
}
