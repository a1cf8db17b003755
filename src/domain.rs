use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::GenebaseError;

/// A gene or protein name as supplied on one input line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Term(String);

impl Term {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name safe to embed in a file name. Anything outside `[A-Za-z0-9._-]`
    /// becomes `_`; when that changes the term, a short digest of the
    /// original is appended so distinct terms never share a stem.
    pub fn file_stem(&self) -> String {
        let sanitized: String = self
            .0
            .chars()
            .map(|ch| {
                if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') {
                    ch
                } else {
                    '_'
                }
            })
            .collect();
        if sanitized == self.0 {
            return sanitized;
        }
        let digest = Sha256::digest(self.0.as_bytes());
        format!("{sanitized}-{}", hex::encode(&digest[..4]))
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Term {
    type Err = GenebaseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let unquoted = strip_quotes(trimmed).trim();
        if unquoted.is_empty() {
            return Err(GenebaseError::InvalidTerm(value.to_string()));
        }
        Ok(Self(unquoted.to_string()))
    }
}

fn strip_quotes(value: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReviewedFilter {
    Reviewed,
    Unreviewed,
    Any,
}

impl ReviewedFilter {
    pub fn clause(&self) -> Option<&'static str> {
        match self {
            ReviewedFilter::Reviewed => Some("reviewed:true"),
            ReviewedFilter::Unreviewed => Some("reviewed:false"),
            ReviewedFilter::Any => None,
        }
    }
}

impl fmt::Display for ReviewedFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReviewedFilter::Reviewed => write!(f, "reviewed"),
            ReviewedFilter::Unreviewed => write!(f, "unreviewed"),
            ReviewedFilter::Any => write!(f, "any"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaxonId(pub u64);

impl fmt::Display for TaxonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Accession(String);

impl Accession {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Accession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Accession {
    type Err = GenebaseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_uppercase();
        let is_valid = !normalized.is_empty()
            && normalized
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_');
        if !is_valid {
            return Err(GenebaseError::InvalidAccession(value.to_string()));
        }
        Ok(Self(normalized))
    }
}
