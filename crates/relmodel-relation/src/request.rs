//! Per-call relation switches and extra aggregation predicates.

use relmodel_query::Criteria;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Which relation categories an assemble call resolves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelationParam {
    pub build_one_to_one: bool,
    /// Build local one-to-one and resolve the slave records' own dictionaries.
    pub build_one_to_one_with_dict: bool,
    pub build_dict: bool,
    pub build_remote_one_to_one: bool,
    pub build_remote_one_to_one_with_dict: bool,
    pub build_remote_dict: bool,
    pub build_aggregation: bool,
    pub build_remote_aggregation: bool,
    /// Attach raw join-table rows; single-entity calls only.
    pub build_many_to_many: bool,
}

impl RelationParam {
    /// Nothing is built.
    pub fn none() -> Self {
        Self::default()
    }

    /// Local and remote one-to-one plus dictionaries.
    pub fn normal() -> Self {
        Self {
            build_one_to_one: true,
            build_dict: true,
            build_remote_one_to_one: true,
            build_remote_dict: true,
            ..Self::default()
        }
    }

    /// Local and remote dictionaries only.
    pub fn dict_only() -> Self {
        Self {
            build_dict: true,
            build_remote_dict: true,
            ..Self::default()
        }
    }

    /// Every category.
    pub fn full() -> Self {
        Self {
            build_one_to_one: true,
            build_one_to_one_with_dict: true,
            build_dict: true,
            build_remote_one_to_one: true,
            build_remote_one_to_one_with_dict: true,
            build_remote_dict: true,
            build_aggregation: true,
            build_remote_aggregation: true,
            build_many_to_many: true,
        }
    }

    pub fn one_to_one(&self) -> bool {
        self.build_one_to_one || self.build_one_to_one_with_dict
    }

    pub fn remote_one_to_one(&self) -> bool {
        self.build_remote_one_to_one || self.build_remote_one_to_one_with_dict
    }
}

/// Extra predicates per aggregate relation field.
///
/// An absent entry means no extra predicate. Each predicate may name the
/// model it targets; for many-to-many aggregates that decides whether it
/// filters the join table or the slave.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredicateMap {
    entries: HashMap<String, Vec<Criteria>>,
}

impl PredicateMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a predicate for a relation field.
    pub fn add(mut self, relation_field: impl Into<String>, criteria: Criteria) -> Self {
        self.entries
            .entry(relation_field.into())
            .or_default()
            .push(criteria);
        self
    }

    /// Predicates for a relation field, in insertion order.
    pub fn get(&self, relation_field: &str) -> &[Criteria] {
        self.entries
            .get(relation_field)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Merge another map in; its predicates follow the existing ones.
    pub fn merge(&mut self, other: &PredicateMap) {
        for (field, criteria) in &other.entries {
            self.entries
                .entry(field.clone())
                .or_default()
                .extend(criteria.iter().cloned());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets() {
        assert!(RelationParam::normal().one_to_one());
        assert!(!RelationParam::normal().build_aggregation);
        assert!(!RelationParam::dict_only().one_to_one());
        assert!(RelationParam::full().build_many_to_many);
        let with_dict = RelationParam {
            build_remote_one_to_one_with_dict: true,
            ..RelationParam::none()
        };
        assert!(with_dict.remote_one_to_one());
    }

    #[test]
    fn predicate_map_defaults_to_empty() {
        let mut map = PredicateMap::new().add("totalScore", Criteria::eq("grade", 3_i64));
        assert_eq!(map.get("totalScore").len(), 1);
        assert!(map.get("other").is_empty());

        let extra = PredicateMap::new().add("totalScore", Criteria::eq("term", 1_i64));
        map.merge(&extra);
        assert_eq!(map.get("totalScore").len(), 2);
        assert_eq!(map.get("totalScore")[1].field, "term");
    }

    #[test]
    fn param_deserializes_partial_json() {
        let param: RelationParam = serde_json::from_str(r#"{"build_dict": true}"#).unwrap();
        assert!(param.build_dict);
        assert!(!param.build_remote_dict);
        assert!(!param.one_to_one());
    }
}
