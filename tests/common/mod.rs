#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::Mutex;

use reqwest::Url;
use serde_json::{Value, json};

use genebase::config::ResolvedConfig;
use genebase::error::GenebaseError;
use genebase::uniprot::{UniprotResponse, UniprotTransport};

pub const BASE_URL: &str = "https://mock.test/uniprotkb";

pub fn test_config() -> ResolvedConfig {
    ResolvedConfig {
        base_url: BASE_URL.to_string(),
        taxonomy_filter: "taxonomy_id:201174".to_string(),
        backoff_unit_ms: 0,
        term_delay_ms: 0,
        ..ResolvedConfig::default()
    }
}

/// Decoded view of one request URL.
#[derive(Debug, Clone)]
pub struct Request {
    pub url: String,
    pub path: String,
    pub query: String,
    pub format: String,
    pub fields: String,
}

impl Request {
    fn parse(url: &str) -> Self {
        let parsed = Url::parse(url).expect("mock transport got an invalid url");
        let param = |name: &str| {
            parsed
                .query_pairs()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.into_owned())
                .unwrap_or_default()
        };
        Self {
            url: url.to_string(),
            path: parsed.path().to_string(),
            query: param("query"),
            format: param("format"),
            fields: param("fields"),
        }
    }

    pub fn is_search(&self, format: &str) -> bool {
        self.path.ends_with("/search") && self.format == format
    }

    pub fn is_stream(&self) -> bool {
        self.path.ends_with("/stream")
    }
}

#[derive(Debug, Clone)]
pub enum Reply {
    Body {
        status: u16,
        body: Vec<u8>,
        next: Option<String>,
    },
    Timeout,
}

impl Reply {
    pub fn fasta(body: &str) -> Self {
        Self::page(body, None)
    }

    pub fn page(body: &str, next: Option<&str>) -> Self {
        Reply::Body {
            status: 200,
            body: body.as_bytes().to_vec(),
            next: next.map(str::to_string),
        }
    }

    pub fn json(value: Value, next: Option<&str>) -> Self {
        Reply::Body {
            status: 200,
            body: serde_json::to_vec(&value).unwrap(),
            next: next.map(str::to_string),
        }
    }

    pub fn status(status: u16) -> Self {
        Reply::Body {
            status,
            body: b"mock failure".to_vec(),
            next: None,
        }
    }
}

type Matcher = Box<dyn Fn(&Request) -> bool + Send + Sync>;

struct Route {
    matcher: Matcher,
    replies: VecDeque<Reply>,
}

/// In-memory stand-in for the UniProt REST service. Each route answers with
/// its replies in order and repeats the last one once the queue is drained.
/// Unrouted requests get a 404.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<Vec<Route>>,
    calls: Mutex<Vec<Request>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(self, matcher: F, replies: Vec<Reply>) -> Self
    where
        F: Fn(&Request) -> bool + Send + Sync + 'static,
    {
        self.routes.lock().unwrap().push(Route {
            matcher: Box::new(matcher),
            replies: replies.into(),
        });
        self
    }

    pub fn calls(&self) -> Vec<Request> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count_calls<F: Fn(&Request) -> bool>(&self, predicate: F) -> usize {
        self.calls.lock().unwrap().iter().filter(|r| predicate(r)).count()
    }
}

impl UniprotTransport for ScriptedTransport {
    fn get(&self, url: &str) -> Result<UniprotResponse, GenebaseError> {
        let request = Request::parse(url);
        self.calls.lock().unwrap().push(request.clone());

        let mut routes = self.routes.lock().unwrap();
        let Some(route) = routes.iter_mut().find(|route| (route.matcher)(&request)) else {
            return Ok(response(404, b"not routed".to_vec(), None));
        };
        let reply = if route.replies.len() > 1 {
            route.replies.pop_front()
        } else {
            route.replies.front().cloned()
        };
        match reply {
            Some(Reply::Body { status, body, next }) => Ok(response(status, body, next)),
            Some(Reply::Timeout) => Err(GenebaseError::UniprotTransient(
                "operation timed out".to_string(),
            )),
            None => Ok(response(404, b"no reply".to_vec(), None)),
        }
    }
}

fn response(status: u16, body: Vec<u8>, next: Option<String>) -> UniprotResponse {
    UniprotResponse {
        status,
        next_link: next,
        body: Box::new(Cursor::new(body)),
    }
}

pub fn fasta_records(prefix: &str, accessions: &[&str], sequence: &str) -> String {
    accessions
        .iter()
        .map(|acc| {
            format!(
                ">tr|{acc}|{acc}_{prefix} {prefix} protein OS=Actinomyces sp. OX=1654 PE=4 SV=1\n{sequence}\n"
            )
        })
        .collect()
}

pub fn search_results(hits: &[(&str, u64, bool)]) -> Value {
    let results = hits
        .iter()
        .map(|(acc, taxon, reviewed)| {
            let entry_type = if *reviewed {
                "UniProtKB reviewed (Swiss-Prot)"
            } else {
                "UniProtKB unreviewed (TrEMBL)"
            };
            json!({
                "entryType": entry_type,
                "primaryAccession": acc,
                "organism": { "taxonId": taxon }
            })
        })
        .collect::<Vec<_>>();
    json!({ "results": results })
}

pub fn count_headers(text: &str) -> usize {
    text.lines().filter(|line| line.starts_with('>')).count()
}
