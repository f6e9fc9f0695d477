//! Store-agnostic query specification.
//!
//! A [`QuerySpec`] is an immutable value: a conjunctive [`Filter`], an optional
//! single-field [`Sort`], and `skip`/`limit` applied after filtering and
//! sorting, in that order. Stores either translate the specification natively
//! (SQL in `rsvp-postgres`) or evaluate it in memory with [`QuerySpec::apply`].
//! Both paths must agree on the semantics documented here.
//!
//! # Semantics
//!
//! - Conditions in a [`Filter`] are ANDed; [`Condition::AnyOf`] is an OR.
//! - A condition on a missing field never matches.
//! - [`Condition::ContainsIgnoreCase`] is a literal substring match (no
//!   wildcard or regex interpretation of the needle). Only ASCII letters fold
//!   case, so `"É"` and `"é"` differ on every backend whatever its collation.
//! - [`Scalar::Time`] compares chronologically against timestamp strings.
//! - Sorting is stable in memory, but callers must not rely on the relative
//!   order of records whose sort keys compare equal.
//! - `limit == 0` means unlimited; `skip` past the end yields nothing.
//!
//! # Text search
//!
//! Free-text search is not delegated to native full-text indexes. A
//! [`TextSearch`] expands a term into an `AnyOf` of case-insensitive substring
//! matches over a fixed field list, so it behaves the same on every backend.

use crate::document::Document;
use crate::timestamp;
use crate::types::{EventId, RegistrationId, RegistrationStatus, UserId};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;

// ============================================================================
// Scalars
// ============================================================================

/// A typed comparison operand.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Scalar {
    /// String compared lexically
    Text(String),
    /// Integer compared numerically
    Int(i64),
    /// Boolean
    Bool(bool),
    /// Timestamp compared chronologically
    Time(DateTime<Utc>),
}

impl Scalar {
    /// JSON form as it would be stored in a document.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Text(text) => Value::String(text.clone()),
            Self::Int(n) => Value::from(*n),
            Self::Bool(b) => Value::Bool(*b),
            Self::Time(time) => Value::String(timestamp::format(time)),
        }
    }

    /// Order of a stored value relative to this operand, if comparable.
    fn compare_stored(&self, stored: &Value) -> Option<Ordering> {
        match self {
            Self::Text(text) => stored.as_str().map(|s| s.cmp(text.as_str())),
            Self::Int(n) => match stored.as_i64() {
                Some(value) => Some(value.cmp(n)),
                #[allow(clippy::cast_precision_loss)]
                None => stored.as_f64().and_then(|value| value.partial_cmp(&(*n as f64))),
            },
            Self::Bool(b) => stored.as_bool().map(|value| value.cmp(b)),
            Self::Time(time) => stored
                .as_str()
                .and_then(timestamp::parse)
                .map(|value| value.cmp(time)),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => write!(f, "{text:?}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Time(time) => write!(f, "time({})", timestamp::format(time)),
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u32> for Scalar {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<DateTime<Utc>> for Scalar {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Time(value)
    }
}

impl From<EventId> for Scalar {
    fn from(value: EventId) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<UserId> for Scalar {
    fn from(value: UserId) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<RegistrationId> for Scalar {
    fn from(value: RegistrationId) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<RegistrationStatus> for Scalar {
    fn from(value: RegistrationStatus) -> Self {
        Self::Text(value.as_str().to_string())
    }
}

// ============================================================================
// Conditions
// ============================================================================

/// Comparison operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompareOp {
    /// `=`
    Eq,
    /// `>`
    Gt,
    /// `>=`
    Gte,
    /// `<`
    Lt,
    /// `<=`
    Lte,
}

impl CompareOp {
    /// SQL / display symbol.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
        }
    }

    /// Whether `stored <op> operand` holds given `stored.cmp(operand)`.
    #[must_use]
    pub const fn accepts(self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => matches!(ordering, Ordering::Equal),
            Self::Gt => matches!(ordering, Ordering::Greater),
            Self::Gte => !matches!(ordering, Ordering::Less),
            Self::Lt => matches!(ordering, Ordering::Less),
            Self::Lte => !matches!(ordering, Ordering::Greater),
        }
    }
}

/// A single predicate over a top-level document field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Condition {
    /// `field <op> value`
    Compare {
        /// Field name
        field: String,
        /// Operator
        op: CompareOp,
        /// Operand
        value: Scalar,
    },
    /// ASCII case-insensitive literal substring match on a string field.
    ContainsIgnoreCase {
        /// Field name
        field: String,
        /// Substring to look for
        needle: String,
    },
    /// Disjunction. An empty list matches nothing.
    AnyOf(Vec<Condition>),
}

impl Condition {
    /// Build a comparison condition.
    #[must_use]
    pub fn compare(field: impl Into<String>, op: CompareOp, value: impl Into<Scalar>) -> Self {
        Self::Compare {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    /// Build a case-insensitive substring condition.
    #[must_use]
    pub fn contains(field: impl Into<String>, needle: impl Into<String>) -> Self {
        Self::ContainsIgnoreCase {
            field: field.into(),
            needle: needle.into(),
        }
    }

    /// Evaluate against a document.
    #[must_use]
    pub fn matches(&self, document: &Document) -> bool {
        match self {
            Self::Compare { field, op, value } => document
                .get(field)
                .and_then(|stored| value.compare_stored(stored))
                .is_some_and(|ordering| op.accepts(ordering)),
            Self::ContainsIgnoreCase { field, needle } => document
                .get(field)
                .and_then(Value::as_str)
                .is_some_and(|stored| contains_ignore_case(stored, needle)),
            Self::AnyOf(conditions) => conditions.iter().any(|c| c.matches(document)),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compare { field, op, value } => write!(f, "{field} {} {value}", op.symbol()),
            Self::ContainsIgnoreCase { field, needle } => write!(f, "{field} ~* {needle:?}"),
            Self::AnyOf(conditions) => {
                f.write_str("(")?;
                for (i, condition) in conditions.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" OR ")?;
                    }
                    write!(f, "{condition}")?;
                }
                f.write_str(")")
            }
        }
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack
        .to_ascii_lowercase()
        .contains(&needle.to_ascii_lowercase())
}

// ============================================================================
// Filter
// ============================================================================

/// A conjunction of conditions. The empty filter matches every document.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    /// The empty filter (matches everything).
    #[must_use]
    pub const fn new() -> Self {
        Self {
            conditions: Vec::new(),
        }
    }

    /// Add an arbitrary condition.
    #[must_use]
    pub fn and(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Add `field = value`.
    #[must_use]
    pub fn eq(self, field: impl Into<String>, value: impl Into<Scalar>) -> Self {
        self.and(Condition::compare(field, CompareOp::Eq, value))
    }

    /// Add `field > value`.
    #[must_use]
    pub fn gt(self, field: impl Into<String>, value: impl Into<Scalar>) -> Self {
        self.and(Condition::compare(field, CompareOp::Gt, value))
    }

    /// Add `field >= value` (inclusive lower bound).
    #[must_use]
    pub fn gte(self, field: impl Into<String>, value: impl Into<Scalar>) -> Self {
        self.and(Condition::compare(field, CompareOp::Gte, value))
    }

    /// Add `field < value`.
    #[must_use]
    pub fn lt(self, field: impl Into<String>, value: impl Into<Scalar>) -> Self {
        self.and(Condition::compare(field, CompareOp::Lt, value))
    }

    /// Add `field <= value` (inclusive upper bound).
    #[must_use]
    pub fn lte(self, field: impl Into<String>, value: impl Into<Scalar>) -> Self {
        self.and(Condition::compare(field, CompareOp::Lte, value))
    }

    /// Add a case-insensitive substring match.
    #[must_use]
    pub fn contains(self, field: impl Into<String>, needle: impl Into<String>) -> Self {
        self.and(Condition::contains(field, needle))
    }

    /// Add a disjunction.
    #[must_use]
    pub fn any_of(self, conditions: Vec<Condition>) -> Self {
        self.and(Condition::AnyOf(conditions))
    }

    /// The conditions, in insertion order.
    #[must_use]
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Whether this filter has no conditions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Evaluate against a document.
    #[must_use]
    pub fn matches(&self, document: &Document) -> bool {
        self.conditions.iter().all(|c| c.matches(document))
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.conditions.is_empty() {
            return f.write_str("*");
        }
        for (i, condition) in self.conditions.iter().enumerate() {
            if i > 0 {
                f.write_str(" AND ")?;
            }
            write!(f, "{condition}")?;
        }
        Ok(())
    }
}

// ============================================================================
// Text search
// ============================================================================

/// Text-search emulation: OR of case-insensitive substring matches.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextSearch {
    fields: &'static [&'static str],
}

impl TextSearch {
    /// Search over the given fields.
    #[must_use]
    pub const fn over(fields: &'static [&'static str]) -> Self {
        Self { fields }
    }

    /// Condition for a term, or `None` for a blank term.
    #[must_use]
    pub fn condition(&self, term: &str) -> Option<Condition> {
        let term = term.trim();
        if term.is_empty() || self.fields.is_empty() {
            return None;
        }
        Some(Condition::AnyOf(
            self.fields
                .iter()
                .map(|field| Condition::contains(*field, term))
                .collect(),
        ))
    }

    /// Add the term's condition (if any) to a filter.
    #[must_use]
    pub fn apply(&self, filter: Filter, term: &str) -> Filter {
        match self.condition(term) {
            Some(condition) => filter.and(condition),
            None => filter,
        }
    }
}

// ============================================================================
// Sorting
// ============================================================================

/// Sort direction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SortDirection {
    /// Smallest first
    #[default]
    Ascending,
    /// Largest first
    Descending,
}

/// Single-field sort key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sort {
    /// Field name
    pub field: String,
    /// Direction
    pub direction: SortDirection,
}

impl Sort {
    /// Ascending on `field`.
    #[must_use]
    pub fn ascending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Ascending,
        }
    }

    /// Descending on `field`.
    #[must_use]
    pub fn descending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Descending,
        }
    }

    /// Compare two documents by this key.
    #[must_use]
    pub fn compare(&self, a: &Document, b: &Document) -> Ordering {
        let ordering = compare_json(a.get(&self.field), b.get(&self.field));
        match self.direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    }
}

/// Type rank mirroring PostgreSQL's jsonb ordering, with missing fields lowest.
const fn json_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::String(_)) => 1,
        Some(Value::Number(_)) => 2,
        Some(Value::Bool(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Object(_)) => 5,
    }
}

fn compare_json(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            match (x.as_i64(), y.as_i64()) {
                (Some(x), Some(y)) => x.cmp(&y),
                _ => x
                    .as_f64()
                    .partial_cmp(&y.as_f64())
                    .unwrap_or(Ordering::Equal),
            }
        }
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        _ => json_rank(a).cmp(&json_rank(b)),
    }
}

// ============================================================================
// Query specification
// ============================================================================

/// Immutable query: filter, then sort, then skip, then limit.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QuerySpec {
    /// Conjunctive filter
    pub filter: Filter,
    /// Optional single-field sort
    pub sort: Option<Sort>,
    /// Records to skip after sorting
    pub skip: u64,
    /// Maximum records to return (`0` = unlimited)
    pub limit: u64,
}

impl QuerySpec {
    /// Query for every record matching `filter`.
    #[must_use]
    pub const fn new(filter: Filter) -> Self {
        Self {
            filter,
            sort: None,
            skip: 0,
            limit: 0,
        }
    }

    /// Set the sort key.
    #[must_use]
    pub fn sort(mut self, sort: Sort) -> Self {
        self.sort = Some(sort);
        self
    }

    /// Set the number of records to skip.
    #[must_use]
    pub const fn skip(mut self, skip: u64) -> Self {
        self.skip = skip;
        self
    }

    /// Set the maximum number of records (`0` = unlimited).
    #[must_use]
    pub const fn limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    /// Evaluate the specification over an in-memory set of documents.
    #[must_use]
    pub fn apply<I>(&self, documents: I) -> Vec<Document>
    where
        I: IntoIterator<Item = Document>,
    {
        let mut matched: Vec<Document> = documents
            .into_iter()
            .filter(|doc| self.filter.matches(doc))
            .collect();

        if let Some(sort) = &self.sort {
            matched.sort_by(|a, b| sort.compare(a, b));
        }

        let skip = usize::try_from(self.skip).unwrap_or(usize::MAX);
        let limit = match self.limit {
            0 => usize::MAX,
            n => usize::try_from(n).unwrap_or(usize::MAX),
        };

        matched.into_iter().skip(skip).take(limit).collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    fn events() -> Vec<Document> {
        vec![
            doc(json!({
                "_id": "a", "name": "Rust Meetup", "organizer": "Ferris Club",
                "description": "Talks about async", "location": "Berlin, DE",
                "category": "Technology", "date": "2026-03-01T18:00:00.000Z", "capacity": 50
            })),
            doc(json!({
                "_id": "b", "name": "Leadership Summit", "organizer": "Biz Guild",
                "description": "Strategy and RUST-belt manufacturing", "location": "Pittsburgh, PA",
                "category": "Business", "date": "2026-04-20T10:00:00.000Z", "capacity": 150
            })),
            doc(json!({
                "_id": "c", "name": "Wellness Expo", "organizer": "Rusty Health",
                "description": "Nutrition", "location": "Seattle, WA",
                "category": "Health", "date": "2026-03-30T10:00:00.000Z", "capacity": 250
            })),
        ]
    }

    fn ids(docs: &[Document]) -> Vec<&str> {
        docs.iter().map(|d| d["_id"].as_str().unwrap()).collect()
    }

    #[test]
    fn empty_filter_matches_everything() {
        let result = QuerySpec::new(Filter::new()).apply(events());
        assert_eq!(result.len(), 3);
    }

    #[test]
    fn text_search_matches_any_field_case_insensitively() {
        let search = TextSearch::over(&["name", "description", "organizer"]);
        let filter = search.apply(Filter::new(), "rust");
        let mut result = ids(&QuerySpec::new(filter).apply(events()))
            .into_iter()
            .map(str::to_string)
            .collect::<Vec<_>>();
        result.sort();
        assert_eq!(result, vec!["a", "b", "c"]);
    }

    #[test]
    fn blank_search_term_adds_no_condition() {
        let search = TextSearch::over(&["name"]);
        assert!(search.condition("   ").is_none());
        assert!(search.apply(Filter::new(), "").is_empty());
    }

    #[test]
    fn contains_is_literal_not_a_pattern() {
        let filter = Filter::new().contains("location", ".*");
        assert!(QuerySpec::new(filter).apply(events()).is_empty());
    }

    #[test]
    fn case_folding_is_ascii_only() {
        let filter = Filter::new().contains("name", "CAFÉ");
        assert!(filter.matches(&doc(json!({ "name": "Le cafÉ" }))));
        assert!(!filter.matches(&doc(json!({ "name": "Le café" }))));
    }

    #[test]
    fn date_range_bounds_are_inclusive() {
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 18, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 3, 30, 10, 0, 0).unwrap();
        let filter = Filter::new().gte("date", start).lte("date", end);
        let spec = QuerySpec::new(filter).sort(Sort::ascending("date"));
        assert_eq!(ids(&spec.apply(events())), vec!["a", "c"]);
    }

    #[test]
    fn conditions_on_missing_fields_never_match() {
        let filter = Filter::new().eq("venue", "Berlin");
        assert!(QuerySpec::new(filter).apply(events()).is_empty());
    }

    #[test]
    fn combined_criteria_are_conjunctive() {
        let filter = TextSearch::over(&["name", "description", "organizer"])
            .apply(Filter::new(), "rust")
            .eq("category", "Business")
            .contains("location", "pitts");
        assert_eq!(ids(&QuerySpec::new(filter).apply(events())), vec!["b"]);
    }

    #[test]
    fn numeric_sort_descending() {
        let spec = QuerySpec::new(Filter::new()).sort(Sort::descending("capacity"));
        assert_eq!(ids(&spec.apply(events())), vec!["c", "b", "a"]);
    }

    #[test]
    fn skip_then_limit() {
        let spec = QuerySpec::new(Filter::new())
            .sort(Sort::ascending("capacity"))
            .skip(1)
            .limit(1);
        assert_eq!(ids(&spec.apply(events())), vec!["b"]);
    }

    #[test]
    fn skip_beyond_end_is_empty() {
        let spec = QuerySpec::new(Filter::new()).skip(10);
        assert!(spec.apply(events()).is_empty());
    }

    #[test]
    fn empty_any_of_matches_nothing() {
        let filter = Filter::new().any_of(vec![]);
        assert!(QuerySpec::new(filter).apply(events()).is_empty());
    }

    #[test]
    fn display_is_stable() {
        let filter = Filter::new().eq("userId", "u1").eq("status", "active");
        assert_eq!(filter.to_string(), r#"userId = "u1" AND status = "active""#);
    }

    proptest! {
        #[test]
        fn skip_and_limit_slice_the_sorted_result(
            values in proptest::collection::vec(0i64..100, 0..40),
            skip in 0u64..50,
            limit in 0u64..50,
        ) {
            let docs: Vec<Document> = values
                .iter()
                .enumerate()
                .map(|(i, v)| doc(json!({ "_id": i.to_string(), "n": v })))
                .collect();

            let full = QuerySpec::new(Filter::new()).sort(Sort::ascending("n")).apply(docs.clone());
            let page = QuerySpec::new(Filter::new())
                .sort(Sort::ascending("n"))
                .skip(skip)
                .limit(limit)
                .apply(docs);

            let start = usize::try_from(skip).unwrap().min(full.len());
            let end = if limit == 0 {
                full.len()
            } else {
                (start + usize::try_from(limit).unwrap()).min(full.len())
            };
            let expected: Vec<i64> = full[start..end].iter().map(|d| d["n"].as_i64().unwrap()).collect();
            let actual: Vec<i64> = page.iter().map(|d| d["n"].as_i64().unwrap()).collect();
            prop_assert_eq!(actual, expected);
        }

        #[test]
        fn range_filter_agrees_with_direct_comparison(
            values in proptest::collection::vec(-50i64..50, 0..40),
            low in -60i64..60,
            high in -60i64..60,
        ) {
            let docs: Vec<Document> = values
                .iter()
                .map(|v| doc(json!({ "n": v })))
                .collect();
            let matched = QuerySpec::new(Filter::new().gte("n", low).lte("n", high)).apply(docs);
            let expected = values.iter().filter(|v| **v >= low && **v <= high).count();
            prop_assert_eq!(matched.len(), expected);
        }
    }
}
