//! Exact-match field queries

use serde::{Deserialize, Serialize};

/// Conjunction of `field == value` terms
///
/// A missing field compares equal to the empty string, so two entries that
/// both lack a field still match on it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldQuery {
    pub terms: Vec<(String, String)>,
}

impl FieldQuery {
    pub fn new(terms: Vec<(String, String)>) -> Self {
        Self { terms }
    }

    /// Build a query from field names, reading each value with `lookup`
    pub fn from_fields<F>(fields: &[String], lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            terms: fields
                .iter()
                .map(|f| (f.clone(), lookup(f).unwrap_or_default()))
                .collect(),
        }
    }

    pub fn matches<F>(&self, lookup: F) -> bool
    where
        F: Fn(&str) -> Option<String>,
    {
        self.terms
            .iter()
            .all(|(field, value)| lookup(field).unwrap_or_default() == *value)
    }
}
