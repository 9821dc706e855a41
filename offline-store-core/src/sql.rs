//! Statement text for the postgres offline store.
//!
//! Identifiers are interpolated only through [`sanitize`]; values are left as
//! positional parameters for the caller to bind.

use crate::naming::sanitize;

pub(crate) const TABLE_EXISTS: &str = "SELECT 1 FROM information_schema.tables \
     WHERE table_schema = current_schema() AND table_name = $1";

pub(crate) const TABLE_COLUMNS: &str = "SELECT column_name::text FROM information_schema.columns \
     WHERE table_schema = current_schema() AND table_name = $1 ORDER BY ordinal_position";

/// Binds: `$1` table name. Held until the surrounding transaction ends.
pub(crate) const LOCK_TABLE_BUILD: &str = "SELECT pg_advisory_xact_lock(hashtext($1))";

pub(crate) const SNAPSHOT_TRANSACTION: &str =
    "SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY";

pub(crate) fn create_resource_table(table: &str) -> String {
    format!(
        "CREATE TABLE {} (entity VARCHAR, value JSONB, ts TIMESTAMPTZ, UNIQUE (entity, ts))",
        sanitize(table)
    )
}

/// Binds: `$1` entity, `$2` value envelope, `$3` timestamp.
pub(crate) fn upsert_record(table: &str) -> String {
    format!(
        "INSERT INTO {} (entity, value, ts) VALUES ($1, $2, $3) \
         ON CONFLICT (entity, ts) DO UPDATE SET value = excluded.value",
        sanitize(table)
    )
}

pub(crate) fn create_materialization_table(materialization: &str, source: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} AS (SELECT entity, value, ts FROM {} WHERE 1=2)",
        sanitize(materialization),
        sanitize(source)
    )
}

pub(crate) fn clear_table(table: &str) -> String {
    format!("DELETE FROM {}", sanitize(table))
}

pub(crate) fn materialize_latest(materialization: &str, source: &str) -> String {
    format!(
        "INSERT INTO {} SELECT entity, value, ts FROM \
         (SELECT entity, value, ts, row_number() OVER (PARTITION BY entity ORDER BY ts DESC) AS rn \
         FROM {}) t WHERE rn = 1",
        sanitize(materialization),
        sanitize(source)
    )
}

pub(crate) fn count_rows(table: &str) -> String {
    format!("SELECT COUNT(*) FROM {}", sanitize(table))
}

/// Binds: `$1` exclusive start position, `$2` inclusive end position.
pub(crate) fn materialization_segment(materialization: &str) -> String {
    format!(
        "SELECT entity, value, ts FROM \
         (SELECT entity, value, ts, row_number() OVER (ORDER BY entity) AS rn FROM {}) t \
         WHERE rn > $1 AND rn <= $2 ORDER BY rn",
        sanitize(materialization)
    )
}

/// Point-in-time join of `label` against each of `features`, in order.
///
/// Each feature contributes one column named after its table, holding the
/// latest value at or before the label timestamp (NULL when none).
pub(crate) fn create_training_set(training_set: &str, label: &str, features: &[String]) -> String {
    let mut columns = Vec::with_capacity(features.len() + 1);
    let mut joins = String::new();
    for (i, feature) in features.iter().enumerate() {
        let feature = sanitize(feature);
        let alias = format!("t{}", i);
        joins.push_str(&format!(
            " LEFT JOIN LATERAL (SELECT entity, value AS {feature}, ts FROM {feature} \
             WHERE entity = l.entity AND ts <= l.ts ORDER BY ts DESC LIMIT 1) {alias} \
             ON {alias}.entity = l.entity",
        ));
        columns.push(format!("{}.{}", alias, feature));
    }
    columns.push("l.value AS label".to_string());
    format!(
        "CREATE TABLE {} AS (SELECT {} FROM (SELECT entity, value, ts FROM {}) l{})",
        sanitize(training_set),
        columns.join(", "),
        sanitize(label),
        joins
    )
}

pub(crate) fn select_columns(table: &str, columns: &[String]) -> String {
    let columns = columns
        .iter()
        .map(|c| sanitize(c))
        .collect::<Vec<_>>()
        .join(", ");
    format!("SELECT {} FROM {}", columns, sanitize(table))
}

pub(crate) fn declare_cursor(cursor: &str, query: &str) -> String {
    format!("DECLARE {} NO SCROLL CURSOR FOR {}", sanitize(cursor), query)
}

pub(crate) fn fetch_forward(cursor: &str, batch_size: u32) -> String {
    format!("FETCH FORWARD {} FROM {}", batch_size, sanitize(cursor))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_statements() {
        assert_eq!(
            create_resource_table("featureform_resource_feature_age_v1"),
            "CREATE TABLE \"featureform_resource_feature_age_v1\" \
             (entity VARCHAR, value JSONB, ts TIMESTAMPTZ, UNIQUE (entity, ts))"
        );
        let upsert = upsert_record("featureform_resource_feature_age_v1");
        assert!(upsert.starts_with(
            "INSERT INTO \"featureform_resource_feature_age_v1\" (entity, value, ts) VALUES ($1, $2, $3)"
        ));
        assert!(upsert.ends_with("ON CONFLICT (entity, ts) DO UPDATE SET value = excluded.value"));
    }

    #[test]
    fn materialization_statements() {
        let create = create_materialization_table("m", "src");
        assert_eq!(
            create,
            "CREATE TABLE IF NOT EXISTS \"m\" AS (SELECT entity, value, ts FROM \"src\" WHERE 1=2)"
        );
        let insert = materialize_latest("m", "src");
        assert!(insert.starts_with("INSERT INTO \"m\" SELECT entity, value, ts FROM"));
        assert!(insert.contains("PARTITION BY entity ORDER BY ts DESC"));
        assert!(insert.ends_with("FROM \"src\") t WHERE rn = 1"));
        let segment = materialization_segment("m");
        assert!(segment.contains("row_number() OVER (ORDER BY entity) AS rn FROM \"m\""));
        assert!(segment.contains("WHERE rn > $1 AND rn <= $2"));
    }

    #[test]
    fn training_set_joins_features_in_order() {
        let features = vec!["f_a".to_string(), "f_b".to_string()];
        let query = create_training_set("ts", "lbl", &features);
        assert!(query.starts_with(
            "CREATE TABLE \"ts\" AS (SELECT t0.\"f_a\", t1.\"f_b\", l.value AS label \
             FROM (SELECT entity, value, ts FROM \"lbl\") l LEFT JOIN LATERAL"
        ));
        let first = query.find("FROM \"f_a\" WHERE entity = l.entity AND ts <= l.ts");
        let second = query.find("FROM \"f_b\" WHERE entity = l.entity AND ts <= l.ts");
        assert!(matches!((first, second), (Some(a), Some(b)) if a < b));
        assert!(query.contains("ORDER BY ts DESC LIMIT 1) t1 ON t1.entity = l.entity"));
        assert!(query.ends_with(')'));
    }

    #[test]
    fn identifiers_cannot_escape_quotes() {
        let query = select_columns("ts\"; DROP TABLE x; --", &["label".to_string()]);
        assert_eq!(query, "SELECT \"label\" FROM \"ts\"\"; DROP TABLE x; --\"");
    }

    #[test]
    fn build_lock_is_transaction_scoped() {
        assert!(LOCK_TABLE_BUILD.contains("pg_advisory_xact_lock"));
        assert!(LOCK_TABLE_BUILD.contains("$1"));
    }

    #[test]
    fn cursor_statements() {
        assert_eq!(
            declare_cursor("rows", "SELECT 1"),
            "DECLARE \"rows\" NO SCROLL CURSOR FOR SELECT 1"
        );
        assert_eq!(fetch_forward("rows", 10), "FETCH FORWARD 10 FROM \"rows\"");
    }
}
