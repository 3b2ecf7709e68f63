use crate::analyzer::Analyzer;
use crate::error::{Result, SearchError};
use crate::index::Postings;
use crate::DocId;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BooleanOp {
    And,
    Or,
    AndNot,
}

/// `left op right` over two single-word operands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BooleanQuery {
    pub left: String,
    pub op: BooleanOp,
    pub right: String,
}

impl BooleanQuery {
    /// Accepts `a AND b`, `a OR b`, `a AND NOT b` and `a NOT b`. Operators
    /// are case-insensitive.
    pub fn parse(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split_whitespace().collect();
        let upper: Vec<String> = parts.iter().map(|p| p.to_uppercase()).collect();
        let upper: Vec<&str> = upper.iter().map(String::as_str).collect();
        let op = match upper.as_slice() {
            [_, "AND", "NOT", _] | [_, "NOT", _] => BooleanOp::AndNot,
            [_, "AND", _] => BooleanOp::And,
            [_, "OR", _] => BooleanOp::Or,
            _ => {
                return Err(SearchError::InvalidQuery(format!(
                    "expected `a AND b`, `a OR b` or `a AND NOT b`, got {s:?}"
                )))
            }
        };
        let (left, right) = (parts[0], parts[parts.len() - 1]);
        Ok(Self { left: left.to_string(), op, right: right.to_string() })
    }
}

/// Set algebra over postings lists.
pub struct BooleanRetriever<'a> {
    postings: &'a Postings,
}

impl<'a> BooleanRetriever<'a> {
    pub fn new(postings: &'a Postings) -> Self {
        Self { postings }
    }

    fn lookup(&self, term: &str) -> Result<&'a BTreeSet<DocId>> {
        self.postings.get(term).ok_or_else(|| SearchError::UnknownTerm(term.to_string()))
    }

    pub fn evaluate(&self, a: &str, b: &str, op: BooleanOp) -> Result<BTreeSet<DocId>> {
        let l1 = self.lookup(a)?;
        let l2 = self.lookup(b)?;
        let out = match op {
            BooleanOp::And => l1.intersection(l2).copied().collect(),
            BooleanOp::Or => l1.union(l2).copied().collect(),
            BooleanOp::AndNot => l1.difference(l2).copied().collect(),
        };
        Ok(out)
    }

    /// Parse `query`, map both operands to lemmas and evaluate.
    pub fn search(&self, analyzer: &Analyzer, query: &str) -> Result<BTreeSet<DocId>> {
        let q = BooleanQuery::parse(query)?;
        let left = analyzer.lemma_of(&q.left)?;
        let right = analyzer.lemma_of(&q.right)?;
        self.evaluate(&left, &right, q.op)
    }
}
