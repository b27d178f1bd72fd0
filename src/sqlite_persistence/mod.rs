mod versioned_schema;

pub use versioned_schema::{
    open_versioned, Column, ForeignKey, SqlType, Table, VersionedSchema, BASE_DB_VERSION,
};

use chrono::{DateTime, Utc};

/// Timestamps are persisted as unix milliseconds so range queries compare
/// numerically and elapsed-time checks keep sub-second precision.
pub fn to_unix_millis(dt: &DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}

pub fn from_unix_millis(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}

/// Lock a store connection, turning a poisoned mutex into an error instead of a panic.
pub fn lock_conn(
    conn: &std::sync::Mutex<rusqlite::Connection>,
) -> anyhow::Result<std::sync::MutexGuard<'_, rusqlite::Connection>> {
    conn.lock()
        .map_err(|_| anyhow::anyhow!("sqlite connection mutex poisoned"))
}

/// Row-mapping error for a text column holding a value we cannot parse.
pub fn invalid_value(column: &str, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        format!("column {} has unexpected value '{}'", column, value).into(),
    )
}
