//! Translation of query specifications into SQL over the `documents` table.
//!
//! Field names are always bound as parameters, never spliced into the SQL
//! text. Every comparison first checks the JSON type of the stored value so a
//! condition on a missing or differently typed field does not match, the same
//! as in-memory evaluation. String ordering uses the `"C"` collation (byte
//! order) for the same reason.

use rsvp_core::query::{Condition, Filter, QuerySpec, Scalar, Sort, SortDirection};
use rsvp_core::store::Update;
use rsvp_core::timestamp;
use serde_json::Value;
use sqlx::{Postgres, QueryBuilder};

/// Escape `LIKE` metacharacters so the needle matches literally.
pub(crate) fn like_pattern(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len() + 2);
    escaped.push('%');
    for ch in needle.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

/// Append a boolean SQL expression for `filter`.
pub(crate) fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &Filter) {
    if filter.is_empty() {
        builder.push("TRUE");
        return;
    }
    for (i, condition) in filter.conditions().iter().enumerate() {
        if i > 0 {
            builder.push(" AND ");
        }
        push_condition(builder, condition);
    }
}

fn push_type_check(builder: &mut QueryBuilder<'_, Postgres>, field: &str, json_type: &str) {
    builder
        .push("(jsonb_typeof(data -> ")
        .push_bind(field.to_string())
        .push(format!(") = '{json_type}' AND "));
}

fn push_condition(builder: &mut QueryBuilder<'_, Postgres>, condition: &Condition) {
    match condition {
        Condition::Compare { field, op, value } => {
            let symbol = op.symbol();
            match value {
                Scalar::Text(text) => {
                    push_type_check(builder, field, "string");
                    builder
                        .push("(data ->> ")
                        .push_bind(field.clone())
                        .push(format!(") COLLATE \"C\" {symbol} "))
                        .push_bind(text.clone())
                        .push(")");
                }
                Scalar::Time(time) => {
                    // Stored timestamps are fixed-width RFC 3339, so byte order is chronological.
                    push_type_check(builder, field, "string");
                    builder
                        .push("(data ->> ")
                        .push_bind(field.clone())
                        .push(format!(") COLLATE \"C\" {symbol} "))
                        .push_bind(timestamp::format(time))
                        .push(")");
                }
                Scalar::Int(n) => {
                    push_type_check(builder, field, "number");
                    builder
                        .push("(data ->> ")
                        .push_bind(field.clone())
                        .push(format!(")::numeric {symbol} "))
                        .push_bind(*n)
                        .push(")");
                }
                Scalar::Bool(b) => {
                    push_type_check(builder, field, "boolean");
                    builder
                        .push("(data ->> ")
                        .push_bind(field.clone())
                        .push(format!(")::boolean {symbol} "))
                        .push_bind(*b)
                        .push(")");
                }
            }
        }
        Condition::ContainsIgnoreCase { field, needle } => {
            push_type_check(builder, field, "string");
            // lower() under the C collation folds ASCII only, as in memory
            builder
                .push("lower((data ->> ")
                .push_bind(field.clone())
                .push(") COLLATE \"C\") LIKE lower(")
                .push_bind(like_pattern(needle))
                .push(" COLLATE \"C\") ESCAPE '\\')");
        }
        Condition::AnyOf(conditions) => {
            if conditions.is_empty() {
                builder.push("FALSE");
                return;
            }
            builder.push("(");
            for (i, condition) in conditions.iter().enumerate() {
                if i > 0 {
                    builder.push(" OR ");
                }
                push_condition(builder, condition);
            }
            builder.push(")");
        }
    }
}

/// Append an `ORDER BY` clause matching in-memory ordering: missing values,
/// then strings, numbers, booleans, arrays and objects.
pub(crate) fn push_sort(builder: &mut QueryBuilder<'_, Postgres>, sort: Option<&Sort>) {
    let Some(sort) = sort else {
        builder.push(" ORDER BY created_at, id");
        return;
    };
    let direction = match sort.direction {
        SortDirection::Ascending => "ASC",
        SortDirection::Descending => "DESC",
    };
    builder
        .push(" ORDER BY CASE jsonb_typeof(data -> ")
        .push_bind(sort.field.clone())
        .push(format!(
            ") WHEN 'string' THEN 1 WHEN 'number' THEN 2 WHEN 'boolean' THEN 3 \
             WHEN 'array' THEN 4 WHEN 'object' THEN 5 ELSE 0 END {direction}, "
        ))
        .push("CASE WHEN jsonb_typeof(data -> ")
        .push_bind(sort.field.clone())
        .push(") = 'number' THEN (data ->> ")
        .push_bind(sort.field.clone())
        .push(format!(")::numeric END {direction}, (data ->> "))
        .push_bind(sort.field.clone())
        .push(format!(") COLLATE \"C\" {direction}, id"));
}

/// Append `OFFSET`/`LIMIT` (`limit == 0` means no limit).
pub(crate) fn push_paging(builder: &mut QueryBuilder<'_, Postgres>, spec: &QuerySpec) {
    if spec.skip > 0 {
        builder
            .push(" OFFSET ")
            .push_bind(i64::try_from(spec.skip).unwrap_or(i64::MAX));
    }
    if spec.limit > 0 {
        builder
            .push(" LIMIT ")
            .push_bind(i64::try_from(spec.limit).unwrap_or(i64::MAX));
    }
}

/// Append the new `data` value for `update`: field overwrites merged into the
/// current document, then integer increments.
pub(crate) fn push_update_expression(builder: &mut QueryBuilder<'_, Postgres>, update: &Update) {
    for _ in &update.inc {
        builder.push("jsonb_set(");
    }
    builder
        .push("data || ")
        .push_bind(Value::Object(update.set.clone()))
        .push("::jsonb");
    for (field, delta) in &update.inc {
        builder
            .push(", ARRAY[")
            .push_bind(field.clone())
            .push("]::text[], to_jsonb(COALESCE((data ->> ")
            .push_bind(field.clone())
            .push(")::bigint, 0) + ")
            .push_bind(*delta)
            .push("), true)");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_pattern_escapes_metacharacters() {
        assert_eq!(like_pattern("50%_off\\"), "%50\\%\\_off\\\\%");
        assert_eq!(like_pattern("rust"), "%rust%");
    }

    #[test]
    fn empty_filter_is_true() {
        let mut builder = QueryBuilder::<Postgres>::new("");
        push_filter(&mut builder, &Filter::new());
        assert_eq!(builder.sql(), "TRUE");
    }

    #[test]
    fn field_names_are_bound_not_spliced() {
        let mut builder = QueryBuilder::<Postgres>::new("");
        push_filter(
            &mut builder,
            &Filter::new().eq("name'; DROP TABLE documents; --", "x"),
        );
        assert!(!builder.sql().contains("DROP TABLE"));
    }

    #[test]
    fn substring_match_folds_ascii_only() {
        let mut builder = QueryBuilder::<Postgres>::new("");
        push_filter(&mut builder, &Filter::new().contains("location", "berlin"));
        let sql = builder.sql();
        assert!(sql.contains("COLLATE \"C\") LIKE lower("));
        assert!(!sql.contains("ILIKE"));
    }

    #[test]
    fn disjunction_is_parenthesized() {
        let mut builder = QueryBuilder::<Postgres>::new("");
        push_filter(
            &mut builder,
            &Filter::new()
                .eq("category", "Technology")
                .any_of(vec![
                    Condition::contains("name", "rust"),
                    Condition::contains("organizer", "rust"),
                ]),
        );
        let sql = builder.sql();
        assert!(sql.contains(" AND (("));
        assert!(sql.contains(" OR "));
    }

    #[test]
    fn empty_disjunction_is_false() {
        let mut builder = QueryBuilder::<Postgres>::new("");
        push_filter(&mut builder, &Filter::new().any_of(vec![]));
        assert_eq!(builder.sql(), "FALSE");
    }

    #[test]
    fn increments_nest_jsonb_set() {
        let mut builder = QueryBuilder::<Postgres>::new("");
        push_update_expression(&mut builder, &Update::new().inc("a", 1).inc("b", -1));
        assert!(builder.sql().starts_with("jsonb_set(jsonb_set(data || "));
    }
}
