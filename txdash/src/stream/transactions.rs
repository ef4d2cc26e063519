use std::ops::RangeInclusive;
use std::sync::Arc;

use rand::Rng;

use crate::core::config::ConfigError;
use crate::domain::prelude::*;
use crate::store::{queries, StorageError, Store};

/// Default number of transactions generated per tick.
pub const DEFAULT_BATCH_SIZE: RangeInclusive<usize> = 1..=5;

/// Generates batches of plausible card transactions and appends them to the
/// store.
///
/// Every record samples its scheme and status pair independently and
/// uniformly from the catalog, and is stamped with the current local time.
///
pub struct Producer {
    store: Arc<Store>,
    catalog: Arc<Catalog>,
    batch_size: RangeInclusive<usize>,
}

impl Producer {
    pub fn new(
        store: Arc<Store>,
        catalog: Arc<Catalog>,
        batch_size: RangeInclusive<usize>,
    ) -> Result<Self, ConfigError> {
        if batch_size.is_empty() || *batch_size.start() == 0 {
            return Err(ConfigError::InvalidBatchRange {
                min: *batch_size.start(),
                max: *batch_size.end(),
            });
        }
        if catalog.schemes().is_empty() || catalog.statuses().is_empty() {
            return Err(ConfigError::EmptyCatalog);
        }
        Ok(Self {
            store,
            catalog,
            batch_size,
        })
    }

    /// Generates and stores one batch using the thread-local RNG.
    ///
    pub fn produce_once(&self) -> Result<Vec<i64>, StorageError> {
        self.produce_once_with(&mut rand::rng())
    }

    /// Generates and stores one batch, returning the new ids.
    ///
    /// The batch is appended atomically; on error nothing from it is stored.
    ///
    pub fn produce_once_with<R: Rng>(&self, rng: &mut R) -> Result<Vec<i64>, StorageError> {
        let size = rng.random_range(self.batch_size.clone());
        let batch: Vec<NewTransaction> = (0..size).map(|_| self.generate(rng)).collect();

        let ids = queries::append_batch(&self.store, &batch)?;
        tracing::info!(count = ids.len(), "ingested transactions");
        Ok(ids)
    }

    // `new` rejects an empty catalog, so both indexes are in bounds.
    fn generate<R: Rng>(&self, rng: &mut R) -> NewTransaction {
        let schemes = self.catalog.schemes();
        let statuses = self.catalog.statuses();
        let scheme = &schemes[rng.random_range(0..schemes.len())];
        let status = &statuses[rng.random_range(0..statuses.len())];

        NewTransaction::new(scheme.clone(), status.clone(), chrono::Local::now().naive_local())
    }
}
