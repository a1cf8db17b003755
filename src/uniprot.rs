use std::io::Read;
use std::time::Duration;

use reqwest::Url;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, LINK, USER_AGENT};
use serde_json::Value;

use crate::domain::{Accession, TaxonId};
use crate::error::GenebaseError;

pub const DEFAULT_BASE_URL: &str = "https://rest.uniprot.org/uniprotkb";

/// One HTTP response from the UniProtKB REST service. The body is left
/// unread so callers can stream it.
pub struct UniprotResponse {
    pub status: u16,
    pub next_link: Option<String>,
    pub body: Box<dyn Read + Send>,
}

impl std::fmt::Debug for UniprotResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UniprotResponse")
            .field("status", &self.status)
            .field("next_link", &self.next_link)
            .finish_non_exhaustive()
    }
}

pub trait UniprotTransport: Send + Sync {
    /// Issues a GET for an absolute URL. Network failures are reported as
    /// errors; any HTTP status is reported as a response.
    fn get(&self, url: &str) -> Result<UniprotResponse, GenebaseError>;
}

#[derive(Debug, Clone)]
pub struct Endpoints {
    base_url: String,
}

impl Endpoints {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn search(&self, params: &[(&str, &str)]) -> Result<String, GenebaseError> {
        self.with_params("search", params)
    }

    pub fn stream(&self, params: &[(&str, &str)]) -> Result<String, GenebaseError> {
        self.with_params("stream", params)
    }

    pub fn entry(&self, accession: &Accession) -> String {
        format!("{}/{}.fasta", self.base_url, accession.as_str())
    }

    fn with_params(&self, path: &str, params: &[(&str, &str)]) -> Result<String, GenebaseError> {
        let url = Url::parse_with_params(&format!("{}/{path}", self.base_url), params)
            .map_err(|err| GenebaseError::UniprotHttp(err.to_string()))?;
        Ok(url.into())
    }
}

impl Default for Endpoints {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

#[derive(Clone)]
pub struct UniprotHttpClient {
    client: Client,
}

impl UniprotHttpClient {
    pub fn new(timeout: Duration) -> Result<Self, GenebaseError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("genebase/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| GenebaseError::UniprotHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| GenebaseError::UniprotHttp(err.to_string()))?;
        Ok(Self { client })
    }
}

impl UniprotTransport for UniprotHttpClient {
    fn get(&self, url: &str) -> Result<UniprotResponse, GenebaseError> {
        let response = self.client.get(url).send().map_err(|err| {
            if is_retryable_error(&err) {
                GenebaseError::UniprotTransient(err.to_string())
            } else {
                GenebaseError::UniprotHttp(err.to_string())
            }
        })?;
        let status = response.status().as_u16();
        let next_link = response
            .headers()
            .get_all(LINK)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .find_map(parse_next_link);
        Ok(UniprotResponse {
            status,
            next_link,
            body: Box::new(response),
        })
    }
}

/// Turns any non-200 response into a status error carrying the first
/// kilobytes of the body.
pub fn ensure_ok(response: UniprotResponse) -> Result<UniprotResponse, GenebaseError> {
    if response.status == 200 {
        return Ok(response);
    }
    let status = response.status;
    let mut message = String::new();
    let _ = response.body.take(4096).read_to_string(&mut message);
    if message.trim().is_empty() {
        message = "UniProt request failed".to_string();
    }
    Err(GenebaseError::UniprotStatus {
        status,
        message: message.trim().to_string(),
    })
}

/// Extracts the `rel="next"` target from a `Link` header value.
pub fn parse_next_link(header: &str) -> Option<String> {
    header
        .split(',')
        .find(|part| part.contains("rel=\"next\""))
        .and_then(|part| {
            let start = part.find('<')?;
            let end = part[start + 1..].find('>')?;
            Some(part[start + 1..start + 1 + end].trim().to_string())
        })
        .filter(|url| !url.is_empty())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub accession: Accession,
    pub taxon: TaxonId,
    pub reviewed: bool,
}

/// Reads the `results` array of a JSON search page restricted to
/// `accession,organism_id,reviewed`. Entries missing an accession or taxon
/// are dropped.
pub fn parse_search_hits(raw: &Value) -> Result<Vec<SearchHit>, GenebaseError> {
    let results = raw
        .get("results")
        .and_then(|v| v.as_array())
        .ok_or_else(|| GenebaseError::UniprotPayload("missing results array".to_string()))?;

    let mut hits = Vec::with_capacity(results.len());
    for item in results {
        let accession = item
            .get("primaryAccession")
            .and_then(|v| v.as_str())
            .and_then(|v| v.parse::<Accession>().ok());
        let taxon = item
            .get("organism")
            .and_then(|v| v.get("taxonId"))
            .and_then(|v| v.as_u64())
            .map(TaxonId);
        let (Some(accession), Some(taxon)) = (accession, taxon) else {
            continue;
        };
        let reviewed = item
            .get("entryType")
            .and_then(|v| v.as_str())
            .map(is_reviewed_entry_type)
            .unwrap_or(false);
        hits.push(SearchHit {
            accession,
            taxon,
            reviewed,
        });
    }
    Ok(hits)
}

fn is_reviewed_entry_type(entry_type: &str) -> bool {
    let lower = entry_type.to_lowercase();
    lower.contains("reviewed") && !lower.contains("unreviewed")
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request() || err.is_body()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn next_link_from_header() {
        let header = "<https://rest.uniprot.org/uniprotkb/search?cursor=abc&size=500>; rel=\"next\"";
        assert_eq!(
            parse_next_link(header).as_deref(),
            Some("https://rest.uniprot.org/uniprotkb/search?cursor=abc&size=500")
        );
    }

    #[test]
    fn next_link_among_other_relations() {
        let header = "<https://x/prev>; rel=\"prev\", <https://x/next>; rel=\"next\"";
        assert_eq!(parse_next_link(header).as_deref(), Some("https://x/next"));
        assert_eq!(parse_next_link("<https://x/prev>; rel=\"prev\""), None);
    }

    #[test]
    fn search_url_encodes_query() {
        let endpoints = Endpoints::new("https://rest.uniprot.org/uniprotkb/");
        let url = endpoints
            .search(&[("query", "gene_exact:\"recA\""), ("format", "fasta")])
            .unwrap();
        assert!(url.starts_with("https://rest.uniprot.org/uniprotkb/search?query="));
        assert!(url.contains("format=fasta"));
        assert!(!url.contains('"'));
    }

    #[test]
    fn entry_url() {
        let endpoints = Endpoints::default();
        let acc: Accession = "P69905".parse().unwrap();
        assert_eq!(
            endpoints.entry(&acc),
            "https://rest.uniprot.org/uniprotkb/P69905.fasta"
        );
    }

    #[test]
    fn search_hits_from_json() {
        let raw = json!({
            "results": [
                {
                    "entryType": "UniProtKB unreviewed (TrEMBL)",
                    "primaryAccession": "A0A0B4J2F0",
                    "organism": { "taxonId": 1654 }
                },
                {
                    "entryType": "UniProtKB reviewed (Swiss-Prot)",
                    "primaryAccession": "P02699",
                    "organism": { "taxonId": 9913 }
                },
                { "primaryAccession": "Q00000" }
            ]
        });
        let hits = parse_search_hits(&raw).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].taxon, TaxonId(1654));
        assert!(!hits[0].reviewed);
        assert!(hits[1].reviewed);
    }

    #[test]
    fn search_hits_require_results() {
        assert!(parse_search_hits(&json!({ "messages": ["bad"] })).is_err());
    }

    #[test]
    fn non_200_becomes_status_error() {
        let response = UniprotResponse {
            status: 503,
            next_link: None,
            body: Box::new(std::io::Cursor::new(b"busy".to_vec())),
        };
        let err = ensure_ok(response).unwrap_err();
        assert!(err.is_transient());
        assert!(err.to_string().contains("busy"));
    }
}
