//! Internal helpers for model conversion and the storage clock.
//!
//! These utilities are **not** part of the public API.

use chrono::{DateTime, NaiveDateTime, Utc};
use sea_orm::{ConnectionTrait, Statement};
use uuid::Uuid;

use crate::{EngineError, ResultEngine};

/// Parse a UUID from storage and return a labeled error on failure.
pub(crate) fn parse_uuid(value: &str, label: &str) -> ResultEngine<Uuid> {
    Uuid::parse_str(value).map_err(|_| EngineError::InvalidId(format!("invalid {label} id")))
}

/// Current time according to the database.
///
/// Deadlines are always compared against this clock so that every engine
/// instance sharing the database agrees on what "now" is.
pub(crate) async fn storage_now<C: ConnectionTrait>(conn: &C) -> ResultEngine<DateTime<Utc>> {
    let backend = conn.get_database_backend();
    let row = conn
        .query_one(Statement::from_string(
            backend,
            "SELECT strftime('%Y-%m-%d %H:%M:%f', 'now') AS now",
        ))
        .await?
        .ok_or_else(|| EngineError::KeyNotFound("storage clock".to_string()))?;
    let raw: String = row.try_get("", "now")?;
    parse_storage_time(&raw)
}

fn parse_storage_time(raw: &str) -> ResultEngine<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|_| EngineError::InvalidId(format!("invalid storage timestamp: {raw}")))
}

#[cfg(test)]
mod tests {
    use chrono::{Datelike, Timelike};

    use super::*;

    #[test]
    fn parses_sqlite_timestamps() {
        let now = parse_storage_time("2026-10-19 08:15:42.517").unwrap();
        assert_eq!((now.year(), now.month(), now.day()), (2026, 10, 19));
        assert_eq!((now.hour(), now.minute(), now.second()), (8, 15, 42));
        assert_eq!(now.timestamp_subsec_millis(), 517);

        assert!(parse_storage_time("yesterday").is_err());
    }

    #[test]
    fn rejects_malformed_ids() {
        assert!(parse_uuid("not-a-uuid", "account").is_err());
        let id = Uuid::new_v4();
        assert_eq!(parse_uuid(&id.to_string(), "account").unwrap(), id);
    }
}
