pub mod prelude {
    pub use super::{
        catalog::{Catalog, CatalogError, StatusEntry, APPROVED_CODE},
        transactions::{NewTransaction, Transaction},
    };
}

pub mod transactions {
    use super::catalog::StatusEntry;
    use chrono::NaiveDateTime;
    use serde::Serialize;

    /// Fixed-width text layout for stored timestamps.
    ///
    /// Always six fractional digits, so lexicographic order in SQLite matches
    /// chronological order and range filters can use the timestamp index.
    ///
    pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

    pub const DATE_FORMAT: &str = "%Y%m%d";
    pub const TIME_FORMAT: &str = "%H%M%S";

    /// Domain model for a persisted card transaction.
    ///
    /// Rows are immutable once written; `id` is assigned by the store.
    ///
    #[derive(Serialize, Debug, Clone, PartialEq, Eq)]
    pub struct Transaction {
        pub id: i64,
        pub card_scheme: String,
        pub transaction_date: String,
        pub transaction_time: String,
        pub status_code: String,
        pub status_description: String,
        pub timestamp: NaiveDateTime,
    }

    /// A transaction that has not been stored yet.
    ///
    /// The status pair can only come from a [`StatusEntry`] handed out by the
    /// catalog, and the date/time strings are derived from `timestamp`, so a
    /// mismatched record cannot be built.
    ///
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct NewTransaction {
        card_scheme: String,
        status: StatusEntry,
        timestamp: NaiveDateTime,
    }

    impl NewTransaction {
        pub fn new(card_scheme: impl Into<String>, status: StatusEntry, timestamp: NaiveDateTime) -> Self {
            Self {
                card_scheme: card_scheme.into(),
                status,
                timestamp,
            }
        }

        pub fn card_scheme(&self) -> &str {
            &self.card_scheme
        }

        pub fn status(&self) -> &StatusEntry {
            &self.status
        }

        pub fn timestamp(&self) -> NaiveDateTime {
            self.timestamp
        }

        /// `YYYYMMDD` copy of the timestamp.
        pub fn transaction_date(&self) -> String {
            self.timestamp.format(DATE_FORMAT).to_string()
        }

        /// `HHMMSS` copy of the timestamp.
        pub fn transaction_time(&self) -> String {
            self.timestamp.format(TIME_FORMAT).to_string()
        }
    }
}

pub mod catalog {
    use super::transactions::NewTransaction;
    use chrono::NaiveDateTime;
    use serde::Serialize;
    use thiserror::Error;

    #[derive(Debug, Error, PartialEq, Eq)]
    pub enum CatalogError {
        #[error("unknown status code {0:?}")]
        UnknownStatusCode(String),
    }

    /// Status code that marks an approved transaction.
    pub const APPROVED_CODE: &str = "0000";

    pub const DEFAULT_SCHEMES: &[&str] = &["Visa", "MasterCard"];

    pub const DEFAULT_STATUSES: &[(&str, &str)] = &[
        ("0000", "approved"),
        ("0001", "invalid card status"),
        ("0002", "invalid card expiry date"),
        ("0004", "invalid CVV2"),
    ];

    /// A `(code, description)` pair from the status lookup table.
    ///
    /// Fields are private: entries are only created by [`Catalog::new`] or
    /// read back from the store, never assembled by callers.
    ///
    #[derive(Serialize, Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct StatusEntry {
        code: String,
        description: String,
    }

    impl StatusEntry {
        pub(crate) fn from_stored(code: String, description: String) -> Self {
            Self { code, description }
        }

        pub fn code(&self) -> &str {
            &self.code
        }

        pub fn description(&self) -> &str {
            &self.description
        }
    }

    /// Static configuration for generated and reported transactions.
    ///
    /// Built once at startup and shared read-only between the producer and
    /// the query engine.
    ///
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Catalog {
        schemes: Vec<String>,
        statuses: Vec<StatusEntry>,
    }

    impl Default for Catalog {
        fn default() -> Self {
            Self::new(DEFAULT_SCHEMES.iter().copied(), DEFAULT_STATUSES.iter().copied())
        }
    }

    impl Catalog {
        /// Builds a catalog from scheme names and `(code, description)` pairs.
        ///
        /// Duplicate schemes are dropped; a repeated code keeps its first
        /// description so every code maps to exactly one description.
        ///
        pub fn new<'a>(
            schemes: impl IntoIterator<Item = &'a str>,
            statuses: impl IntoIterator<Item = (&'a str, &'a str)>,
        ) -> Self {
            let mut catalog = Self {
                schemes: Vec::new(),
                statuses: Vec::new(),
            };
            for scheme in schemes {
                if !catalog.schemes.iter().any(|s| s == scheme) {
                    catalog.schemes.push(scheme.to_string());
                }
            }
            for (code, description) in statuses {
                if catalog.status(code).is_none() {
                    catalog.statuses.push(StatusEntry {
                        code: code.to_string(),
                        description: description.to_string(),
                    });
                }
            }
            catalog
        }

        pub fn schemes(&self) -> &[String] {
            &self.schemes
        }

        pub fn statuses(&self) -> &[StatusEntry] {
            &self.statuses
        }

        pub fn status(&self, code: &str) -> Option<&StatusEntry> {
            self.statuses.iter().find(|s| s.code == code)
        }

        pub fn contains(&self, entry: &StatusEntry) -> bool {
            self.statuses.contains(entry)
        }

        /// Builds a [`NewTransaction`] with the description paired to `code`.
        ///
        pub fn record(
            &self,
            card_scheme: impl Into<String>,
            code: &str,
            timestamp: NaiveDateTime,
        ) -> Result<NewTransaction, CatalogError> {
            let status = self
                .status(code)
                .ok_or_else(|| CatalogError::UnknownStatusCode(code.to_string()))?;
            Ok(NewTransaction::new(card_scheme, status.clone(), timestamp))
        }
    }

}
