//! The filter algebra behind `game list`.
//!
//! A filter is one `(rule, value)` pair. A group of filters is their
//! intersection, a union of groups is the set union of the groups' results.
//! Which rules exist is decided by whoever owns the resolver; the container
//! registers its rules against its indices at construction.

use serde_json::Value;
use std::collections::{BTreeSet, HashMap};

use crate::error::{Error, Result};

pub const INVALID_FILTER_ARG: &str = "filters must be expressed as a JSON object or array";

/// A filter value. Rules decide which variant they accept.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    String(String),
    Bool(bool),
    UInt(u64),
}

/// One criterion, e.g. `("is_running", Bool(true))`.
#[derive(Debug, Clone)]
pub struct Filter {
    pub rule: String,
    pub value: FilterValue,
}

/// Filters whose results are intersected.
pub type Group = Vec<Filter>;

/// Groups whose results are united.
pub type Union = Vec<Group>;

/// Parses the wire shape of a filter union: a single JSON object (one group)
/// or an array of objects (a union of groups.)
pub fn parse_union(value: &Value) -> Result<Union> {
    match value {
        Value::Object(_) => Ok(vec![parse_group(value)?]),
        Value::Array(groups) => groups.iter().map(parse_group).collect(),
        _ => Err(Error::Invalid(INVALID_FILTER_ARG.to_string())),
    }
}

fn parse_group(value: &Value) -> Result<Group> {
    let Value::Object(fields) = value else {
        return Err(Error::Invalid(INVALID_FILTER_ARG.to_string()));
    };

    fields
        .iter()
        .map(|(rule, raw)| {
            let value = match raw {
                Value::String(s) => FilterValue::String(s.clone()),
                Value::Bool(b) => FilterValue::Bool(*b),
                Value::Number(n) => n
                    .as_u64()
                    .map(FilterValue::UInt)
                    .ok_or_else(|| invalid_value(rule))?,
                _ => return Err(invalid_value(rule)),
            };
            Ok(Filter {
                rule: rule.clone(),
                value,
            })
        })
        .collect()
}

fn invalid_value(rule: &str) -> Error {
    Error::Invalid(format!("Invalid value for filter '{rule}'"))
}

type Rule<C, T> = Box<dyn Fn(&C, &FilterValue) -> Option<BTreeSet<T>> + Send + Sync>;

/// Reduces filter unions to id sets against a context `C` (the container's
/// indices.) A rule returns `None` when handed a value of the wrong type.
pub struct FilterResolver<C, T: Ord> {
    rules: HashMap<String, Rule<C, T>>,
}

impl<C, T: Ord + Copy> FilterResolver<C, T> {
    pub fn new() -> FilterResolver<C, T> {
        FilterResolver {
            rules: HashMap::new(),
        }
    }

    /// Registers a rule. Registering the same rule twice is a programming
    /// error, so it panics rather than failing softly.
    pub fn add_rule(
        &mut self,
        rule: &str,
        callback: impl Fn(&C, &FilterValue) -> Option<BTreeSet<T>> + Send + Sync + 'static,
    ) {
        let previous = self.rules.insert(rule.to_string(), Box::new(callback));
        assert!(previous.is_none(), "filter rule '{rule}' was already added");
    }

    fn resolve_filter(&self, context: &C, filter: &Filter) -> Result<BTreeSet<T>> {
        let rule = self
            .rules
            .get(&filter.rule)
            .ok_or_else(|| Error::Invalid(format!("Unsupported filter '{}'", filter.rule)))?;

        rule(context, &filter.value).ok_or_else(|| invalid_value(&filter.rule))
    }

    fn resolve_group(&self, context: &C, group: &Group) -> Result<BTreeSet<T>> {
        let mut intersection: Option<BTreeSet<T>> = None;

        for filter in group {
            let result = self.resolve_filter(context, filter)?;

            // One empty filter empties the whole group; skip the rest.
            if result.is_empty() {
                return Ok(BTreeSet::new());
            }

            intersection = Some(match intersection {
                None => result,
                Some(so_far) => so_far.intersection(&result).copied().collect(),
            });
        }

        Ok(intersection.unwrap_or_default())
    }

    /// Reduces an entire union to one id set.
    pub fn resolve(&self, context: &C, union: &Union) -> Result<BTreeSet<T>> {
        let mut result = BTreeSet::new();
        for group in union {
            result.extend(self.resolve_group(context, group)?);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Toy context: the numbers 0..10, with rules for evenness and minimum.
    struct Numbers;

    fn resolver() -> FilterResolver<Numbers, u64> {
        let mut resolver = FilterResolver::new();
        resolver.add_rule("even", |_: &Numbers, value| match value {
            FilterValue::Bool(even) => {
                Some((0..10u64).filter(|n| (n % 2 == 0) == *even).collect())
            }
            _ => None,
        });
        resolver.add_rule("at_least", |_: &Numbers, value| match value {
            FilterValue::UInt(min) => Some((*min..10u64).collect()),
            _ => None,
        });
        resolver
    }

    #[test]
    fn group_intersects_and_union_unites() {
        let resolver = resolver();

        let union = parse_union(&json!({"even": true, "at_least": 5})).unwrap();
        let result = resolver.resolve(&Numbers, &union).unwrap();
        assert_eq!(result, BTreeSet::from([6, 8]));

        let union = parse_union(&json!([{"even": true}, {"at_least": 7}])).unwrap();
        let result = resolver.resolve(&Numbers, &union).unwrap();
        assert_eq!(result, BTreeSet::from([0, 2, 4, 6, 7, 8, 9]));
    }

    #[test]
    fn empty_filter_empties_its_group_but_not_the_union() {
        let resolver = resolver();

        // at_least 10 matches nothing, so its group collapses.
        let union = parse_union(&json!([{"even": true, "at_least": 10}, {"at_least": 9}])).unwrap();
        let result = resolver.resolve(&Numbers, &union).unwrap();
        assert_eq!(result, BTreeSet::from([9]));

        // A union of only empty groups is empty.
        let union = parse_union(&json!([{"at_least": 10}])).unwrap();
        assert!(resolver.resolve(&Numbers, &union).unwrap().is_empty());
    }

    #[test]
    fn unknown_rules_and_bad_values_are_rejected() {
        let resolver = resolver();

        let union = parse_union(&json!({"nope": 1})).unwrap();
        let error = resolver.resolve(&Numbers, &union).unwrap_err();
        assert_eq!(error.to_string(), "Unsupported filter 'nope'");

        let union = parse_union(&json!({"even": "yes"})).unwrap();
        let error = resolver.resolve(&Numbers, &union).unwrap_err();
        assert_eq!(error.to_string(), "Invalid value for filter 'even'");
    }

    #[test]
    fn filters_must_be_an_object_or_array() {
        assert!(parse_union(&json!("is_running")).is_err());
        assert!(parse_union(&json!([42])).is_err());
        assert!(parse_union(&json!({})).is_ok());
    }
}
