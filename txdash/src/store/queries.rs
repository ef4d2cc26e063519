use chrono::{NaiveDateTime, TimeDelta, Timelike};
use rusqlite::{params, params_from_iter, Connection};

use super::{Store, StorageError};
use crate::domain::prelude::*;
use crate::domain::transactions::TIMESTAMP_FORMAT;

/// Selector value that means "no restriction" for a categorical filter.
pub const ALL: &str = "All";

/// Parse layout for stored timestamps. Accepts any number of fractional digits.
const TIMESTAMP_PARSE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

const SELECT_COLUMNS: &str = "SELECT id, card_scheme, transaction_date, transaction_time, reject_code, reject_description, timestamp FROM transactions";

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

/// AND-composed restrictions for reads.
///
/// Bounds are inclusive. An absent bound, or a categorical selector that is
/// absent, empty or [`ALL`], places no restriction on that dimension.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionFilter {
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
    pub card_scheme: Option<String>,
    pub status_code: Option<String>,
}

impl TransactionFilter {
    pub fn since(mut self, start: NaiveDateTime) -> Self {
        self.start = Some(start);
        self
    }

    pub fn until(mut self, end: NaiveDateTime) -> Self {
        self.end = Some(end);
        self
    }

    pub fn card_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.card_scheme = Some(scheme.into());
        self
    }

    pub fn status_code(mut self, code: impl Into<String>) -> Self {
        self.status_code = Some(code.into());
        self
    }

    /// Renders the filter as a `WHERE` clause and its positional parameters.
    fn where_clause(&self) -> (String, Vec<String>) {
        let mut conditions = Vec::new();
        let mut values = Vec::new();

        if let Some(scheme) = selector(&self.card_scheme) {
            values.push(scheme.to_string());
            conditions.push(format!("card_scheme = ?{}", values.len()));
        }
        if let Some(code) = selector(&self.status_code) {
            values.push(code.to_string());
            conditions.push(format!("reject_code = ?{}", values.len()));
        }
        if let Some(start) = self.start {
            values.push(ceil_to_micros(start).format(TIMESTAMP_FORMAT).to_string());
            conditions.push(format!("timestamp >= ?{}", values.len()));
        }
        if let Some(end) = self.end {
            values.push(end.format(TIMESTAMP_FORMAT).to_string());
            conditions.push(format!("timestamp <= ?{}", values.len()));
        }

        if conditions.is_empty() {
            (String::new(), values)
        } else {
            (format!(" WHERE {}", conditions.join(" AND ")), values)
        }
    }
}

fn selector(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty() && *v != ALL)
}

/// Rounds up to the storage precision, so a lower bound never admits a row
/// stamped before it.
fn ceil_to_micros(at: NaiveDateTime) -> NaiveDateTime {
    match at.nanosecond() % 1_000 {
        0 => at,
        rem => at + TimeDelta::nanoseconds(i64::from(1_000 - rem)),
    }
}

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// Rows per `YYYY-MM-DD HH:MM` minute as aggregated by SQLite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinuteCountRow {
    pub minute: String,
    pub count: u64,
}

/// Per-scheme counts as aggregated by SQLite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemeCountRow {
    pub card_scheme: String,
    pub total: u64,
    pub approved: u64,
}

struct TransactionRow {
    id: i64,
    card_scheme: String,
    transaction_date: String,
    transaction_time: String,
    reject_code: String,
    reject_description: String,
    timestamp: String,
}

impl TransactionRow {
    fn into_transaction(self) -> Result<Transaction, StorageError> {
        let timestamp = NaiveDateTime::parse_from_str(&self.timestamp, TIMESTAMP_PARSE_FORMAT).map_err(|e| {
            StorageError::Corrupt(format!("transaction {} timestamp {:?}: {e}", self.id, self.timestamp))
        })?;
        Ok(Transaction {
            id: self.id,
            card_scheme: self.card_scheme,
            transaction_date: self.transaction_date,
            transaction_time: self.transaction_time,
            status_code: self.reject_code,
            status_description: self.reject_description,
            timestamp,
        })
    }
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

fn insert(conn: &Connection, record: &NewTransaction) -> Result<i64, rusqlite::Error> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO transactions (card_scheme, transaction_date, transaction_time, reject_code, reject_description, timestamp) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    stmt.execute(params![
        record.card_scheme(),
        record.transaction_date(),
        record.transaction_time(),
        record.status().code(),
        record.status().description(),
        record.timestamp().format(TIMESTAMP_FORMAT).to_string(),
    ])?;
    Ok(conn.last_insert_rowid())
}

/// Inserts one transaction and returns its assigned id.
pub fn append(store: &Store, record: &NewTransaction) -> Result<i64, StorageError> {
    let conn = store.session()?;
    Ok(insert(&conn, record)?)
}

/// Inserts all `records` in one transaction.
///
/// Either every row is committed or, on error, none of them is visible.
pub fn append_batch(store: &Store, records: &[NewTransaction]) -> Result<Vec<i64>, StorageError> {
    if records.is_empty() {
        return Ok(Vec::new());
    }

    let mut conn = store.session()?;
    let tx = conn.transaction()?;
    let ids = records
        .iter()
        .map(|record| insert(&tx, record))
        .collect::<Result<Vec<_>, _>>()?;
    tx.commit()?;
    Ok(ids)
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// Returns the transactions matching `filter`, oldest first.
pub fn query(store: &Store, filter: &TransactionFilter) -> Result<Vec<Transaction>, StorageError> {
    let (clause, values) = filter.where_clause();
    let sql = format!("{SELECT_COLUMNS}{clause} ORDER BY timestamp, id");

    let conn = store.session()?;
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(values.iter()), |row| {
            Ok(TransactionRow {
                id: row.get(0)?,
                card_scheme: row.get(1)?,
                transaction_date: row.get(2)?,
                transaction_time: row.get(3)?,
                reject_code: row.get(4)?,
                reject_description: row.get(5)?,
                timestamp: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter().map(TransactionRow::into_transaction).collect()
}

/// Counts the transactions matching `filter`.
pub fn count(store: &Store, filter: &TransactionFilter) -> Result<u64, StorageError> {
    let (clause, values) = filter.where_clause();
    let sql = format!("SELECT COUNT(*) FROM transactions{clause}");

    let conn = store.session()?;
    let n: i64 = conn.query_row(&sql, params_from_iter(values.iter()), |row| row.get(0))?;
    Ok(n.max(0) as u64)
}

/// Counts the transactions matching `filter` per calendar minute, oldest first.
///
/// The stored text layout is fixed-width, so its first 16 characters are the
/// minute the row falls in.
pub fn minute_counts(store: &Store, filter: &TransactionFilter) -> Result<Vec<MinuteCountRow>, StorageError> {
    let (clause, values) = filter.where_clause();
    let sql = format!(
        "SELECT substr(timestamp, 1, 16) AS minute, COUNT(*) FROM transactions{clause} GROUP BY minute ORDER BY minute"
    );

    let conn = store.session()?;
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(values.iter()), |row| {
            let count: i64 = row.get(1)?;
            Ok(MinuteCountRow {
                minute: row.get(0)?,
                count: count.max(0) as u64,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Total and approved counts for every scheme present in the table.
pub fn scheme_counts(store: &Store) -> Result<Vec<SchemeCountRow>, StorageError> {
    let conn = store.session()?;
    let mut stmt = conn.prepare(
        "SELECT card_scheme, COUNT(*), SUM(CASE WHEN reject_code = ?1 THEN 1 ELSE 0 END) FROM transactions GROUP BY card_scheme ORDER BY card_scheme",
    )?;
    let rows = stmt
        .query_map(params![APPROVED_CODE], |row| {
            let total: i64 = row.get(1)?;
            let approved: i64 = row.get(2)?;
            Ok(SchemeCountRow {
                card_scheme: row.get(0)?,
                total: total.max(0) as u64,
                approved: approved.max(0) as u64,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Distinct `(code, description)` pairs that occur in the table.
pub fn distinct_statuses(store: &Store) -> Result<Vec<StatusEntry>, StorageError> {
    let conn = store.session()?;
    let mut stmt = conn.prepare(
        "SELECT DISTINCT reject_code, reject_description FROM transactions ORDER BY reject_code, reject_description",
    )?;
    let rows = stmt
        .query_map([], |row| Ok(StatusEntry::from_stored(row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn seeded() -> Store {
        let store = Store::open_in_memory().unwrap();
        let catalog = Catalog::default();
        let records = vec![
            catalog.record("Visa", "0000", at(10, 0, 5)).unwrap(),
            catalog.record("Visa", "0001", at(10, 0, 40)).unwrap(),
            catalog.record("MasterCard", "0000", at(10, 1, 10)).unwrap(),
            catalog.record("MasterCard", "0004", at(10, 2, 0)).unwrap(),
        ];
        append_batch(&store, &records).unwrap();
        store
    }

    #[test]
    fn append_assigns_increasing_ids() {
        let store = Store::open_in_memory().unwrap();
        let catalog = Catalog::default();
        let first = append(&store, &catalog.record("Visa", "0000", at(1, 0, 0)).unwrap()).unwrap();
        let second = append(&store, &catalog.record("Visa", "0000", at(0, 0, 0)).unwrap()).unwrap();
        assert!(second > first);
    }

    #[test]
    fn stored_rows_keep_the_status_pair_and_derived_strings() {
        let store = seeded();
        let rows = query(&store, &TransactionFilter::default()).unwrap();
        assert_eq!(rows.len(), 4);

        let first = &rows[0];
        assert_eq!(first.card_scheme, "Visa");
        assert_eq!(first.transaction_date, "20240101");
        assert_eq!(first.transaction_time, "100005");
        assert_eq!(first.status_code, "0000");
        assert_eq!(first.status_description, "approved");
        assert_eq!(first.timestamp, at(10, 0, 5));
    }

    #[test]
    fn failed_batch_leaves_nothing_visible() {
        let store = Store::open_in_memory().unwrap();
        store
            .session()
            .unwrap()
            .execute_batch(
                "CREATE TRIGGER reject_unknown BEFORE INSERT ON transactions
                 WHEN NEW.card_scheme = 'Amex'
                 BEGIN SELECT RAISE(ABORT, 'unsupported scheme'); END;",
            )
            .unwrap();

        let catalog = Catalog::default();
        let records = vec![
            catalog.record("Visa", "0000", at(10, 0, 0)).unwrap(),
            catalog.record("MasterCard", "0001", at(10, 0, 1)).unwrap(),
            catalog.record("Amex", "0000", at(10, 0, 2)).unwrap(),
        ];

        let err = append_batch(&store, &records).unwrap_err();
        assert!(matches!(err, StorageError::Sqlite(_)));
        assert_eq!(count(&store, &TransactionFilter::default()).unwrap(), 0);

        // the connection is usable again after the rollback
        append_batch(&store, &records[..2]).unwrap();
        assert_eq!(count(&store, &TransactionFilter::default()).unwrap(), 2);
    }

    #[test]
    fn empty_batch_is_a_no_op() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(append_batch(&store, &[]).unwrap(), Vec::<i64>::new());
        assert_eq!(count(&store, &TransactionFilter::default()).unwrap(), 0);
    }

    #[test]
    fn time_bounds_are_inclusive() {
        let store = seeded();
        let filter = TransactionFilter::default().since(at(10, 0, 40)).until(at(10, 1, 10));
        let rows = query(&store, &filter).unwrap();
        let stamps: Vec<_> = rows.iter().map(|r| r.timestamp).collect();
        assert_eq!(stamps, vec![at(10, 0, 40), at(10, 1, 10)]);
    }

    #[test]
    fn sub_microsecond_start_excludes_the_earlier_row() {
        let store = seeded();
        let start = at(10, 0, 40) + TimeDelta::nanoseconds(500);
        let rows = query(&store, &TransactionFilter::default().since(start)).unwrap();
        let stamps: Vec<_> = rows.iter().map(|r| r.timestamp).collect();
        assert_eq!(stamps, vec![at(10, 1, 10), at(10, 2, 0)]);

        // an upper bound a few nanoseconds past a row still includes it
        let end = at(10, 0, 40) + TimeDelta::nanoseconds(500);
        assert_eq!(count(&store, &TransactionFilter::default().until(end)).unwrap(), 2);
    }

    #[test]
    fn minute_counts_group_and_filter_in_sql() {
        let store = seeded();
        let rows = minute_counts(&store, &TransactionFilter::default()).unwrap();
        assert_eq!(
            rows,
            vec![
                MinuteCountRow {
                    minute: "2024-01-01 10:00".into(),
                    count: 2,
                },
                MinuteCountRow {
                    minute: "2024-01-01 10:01".into(),
                    count: 1,
                },
                MinuteCountRow {
                    minute: "2024-01-01 10:02".into(),
                    count: 1,
                },
            ]
        );

        let filter = TransactionFilter::default().card_scheme("Visa").until(at(10, 0, 5));
        let rows = minute_counts(&store, &filter).unwrap();
        assert_eq!(
            rows,
            vec![MinuteCountRow {
                minute: "2024-01-01 10:00".into(),
                count: 1,
            }]
        );
        assert_eq!(count(&store, &filter).unwrap(), 1);
    }

    #[test]
    fn filters_compose_with_and() {
        let store = seeded();
        let filter = TransactionFilter::default()
            .card_scheme("MasterCard")
            .status_code("0000")
            .since(at(10, 0, 0));
        let rows = query(&store, &filter).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].timestamp, at(10, 1, 10));
        assert_eq!(count(&store, &filter).unwrap(), 1);
    }

    #[test]
    fn all_and_empty_selectors_do_not_restrict() {
        let store = seeded();
        let unrestricted = query(&store, &TransactionFilter::default()).unwrap();
        let all = query(&store, &TransactionFilter::default().card_scheme(ALL).status_code(ALL)).unwrap();
        let empty = query(&store, &TransactionFilter::default().card_scheme("").status_code("")).unwrap();
        assert_eq!(all, unrestricted);
        assert_eq!(empty, unrestricted);
    }

    #[test]
    fn scheme_counts_split_approved() {
        let store = seeded();
        let counts = scheme_counts(&store).unwrap();
        assert_eq!(
            counts,
            vec![
                SchemeCountRow {
                    card_scheme: "MasterCard".into(),
                    total: 2,
                    approved: 1,
                },
                SchemeCountRow {
                    card_scheme: "Visa".into(),
                    total: 2,
                    approved: 1,
                },
            ]
        );
    }

    #[test]
    fn distinct_statuses_lists_each_observed_pair_once() {
        let store = seeded();
        let codes: Vec<_> = distinct_statuses(&store)
            .unwrap()
            .iter()
            .map(|s| s.code().to_string())
            .collect();
        assert_eq!(codes, vec!["0000", "0001", "0004"]);
    }

    #[test]
    fn corrupt_timestamp_is_reported() {
        let store = Store::open_in_memory().unwrap();
        store
            .session()
            .unwrap()
            .execute(
                "INSERT INTO transactions (card_scheme, transaction_date, transaction_time, reject_code, reject_description, timestamp) VALUES ('Visa', '', '', '0000', 'approved', 'yesterday')",
                [],
            )
            .unwrap();
        let err = query(&store, &TransactionFilter::default()).unwrap_err();
        assert!(matches!(err, StorageError::Corrupt(_)));
    }
}
