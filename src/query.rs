use crate::domain::{Accession, ReviewedFilter, Term};

/// A fully scoped UniProtKB search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    taxonomy_filter: String,
    reviewed: ReviewedFilter,
    term: Term,
}

impl Query {
    pub fn term(&self) -> &Term {
        &self.term
    }

    pub fn reviewed(&self) -> ReviewedFilter {
        self.reviewed
    }

    /// Same scope and term with a different reviewed selector.
    pub fn with_reviewed(&self, reviewed: ReviewedFilter) -> Self {
        Self {
            reviewed,
            ..self.clone()
        }
    }

    pub fn expression(&self) -> String {
        let quoted = quote(self.term.as_str());
        let mut clauses = Vec::with_capacity(3);
        if !self.taxonomy_filter.is_empty() {
            clauses.push(format!("({})", self.taxonomy_filter));
        }
        if let Some(clause) = self.reviewed.clause() {
            clauses.push(clause.to_string());
        }
        clauses.push(format!(
            "(protein_name:{quoted} OR gene_exact:{quoted} OR {quoted})"
        ));
        clauses.join(" AND ")
    }
}

#[derive(Debug, Clone)]
pub struct QueryBuilder {
    taxonomy_filter: String,
}

impl QueryBuilder {
    pub fn new(taxonomy_filter: impl Into<String>) -> Self {
        let taxonomy_filter = taxonomy_filter.into();
        let trimmed = taxonomy_filter.trim();
        let inner = trimmed
            .strip_prefix('(')
            .and_then(|rest| rest.strip_suffix(')'))
            .filter(|inner| !inner.contains('(') && !inner.contains(')'))
            .unwrap_or(trimmed);
        Self {
            taxonomy_filter: inner.trim().to_string(),
        }
    }

    pub fn build(&self, term: &Term, reviewed: ReviewedFilter) -> Query {
        Query {
            taxonomy_filter: self.taxonomy_filter.clone(),
            reviewed,
            term: term.clone(),
        }
    }

    pub fn accessions(accessions: &[Accession]) -> String {
        let clauses = accessions
            .iter()
            .map(|acc| format!("accession:{}", acc.as_str()))
            .collect::<Vec<_>>()
            .join(" OR ");
        format!("({clauses})")
    }
}

fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        if ch == '"' || ch == '\\' {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn term(value: &str) -> Term {
        value.parse().unwrap()
    }

    #[test]
    fn reviewed_query_expression() {
        let builder = QueryBuilder::new("(taxonomy_id:201174)");
        let query = builder.build(&term("rhodopsin"), ReviewedFilter::Reviewed);
        assert_eq!(
            query.expression(),
            "(taxonomy_id:201174) AND reviewed:true AND (protein_name:\"rhodopsin\" OR gene_exact:\"rhodopsin\" OR \"rhodopsin\")"
        );
    }

    #[test]
    fn unrestricted_omits_reviewed_clause() {
        let builder = QueryBuilder::new("taxonomy_id:1654");
        let query = builder.build(&term("recA"), ReviewedFilter::Any);
        assert!(query.expression().starts_with("(taxonomy_id:1654) AND (protein_name:"));
        assert!(!query.expression().contains("reviewed:"));
    }

    #[test]
    fn embedded_quotes_are_escaped() {
        let builder = QueryBuilder::new("taxonomy_id:2");
        let query = builder.build(&term("the \"big\" one"), ReviewedFilter::Unreviewed);
        assert!(query.expression().contains("gene_exact:\"the \\\"big\\\" one\""));
        assert!(query.expression().contains("reviewed:false"));
    }

    #[test]
    fn compound_filter_keeps_its_parentheses() {
        let builder = QueryBuilder::new("(taxonomy_id:2) OR (taxonomy_id:2157)");
        let query = builder.build(&term("ftsZ"), ReviewedFilter::Any);
        assert!(
            query
                .expression()
                .starts_with("((taxonomy_id:2) OR (taxonomy_id:2157)) AND")
        );
    }

    #[test]
    fn accession_disjunction() {
        let accs = vec!["A1".parse().unwrap(), "Q9XYZ1".parse().unwrap()];
        assert_eq!(
            QueryBuilder::accessions(&accs),
            "(accession:A1 OR accession:Q9XYZ1)"
        );
    }
}
