use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{Error, StoreError};
use crate::models::{Product, ProductRequest, Storage};
use crate::store::Store;

const STORAGE_LOOKUP_TIMEOUT: Duration = Duration::from_secs(2);
const RESOLUTION_TIMEOUT: Duration = Duration::from_secs(3);
const PERSISTENCE_TIMEOUT: Duration = Duration::from_secs(3);
const OPERATION_TIMEOUT: Duration = Duration::from_secs(6);

/// Runs one store call under its own deadline. An expired deadline drops the
/// store future and surfaces as a timeout, never as a silent retry.
async fn bounded<T>(
    label: &'static str,
    limit: Duration,
    call: impl Future<Output = Result<T, StoreError>>,
) -> Result<T, Error> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result.map_err(Error::from),
        Err(_) => Err(Error::Timeout(label, limit)),
    }
}

/// Finds the single storage a reservation will be written against.
pub struct StorageSelector {
    store: Arc<dyn Store>,
}

impl StorageSelector {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// "No eligible storage" and "storage row without an id" are distinct
    /// outcomes, and neither is a store fault.
    pub async fn find_available(&self) -> Result<(i32, Storage), Error> {
        let storage = bounded(
            "storage lookup",
            STORAGE_LOOKUP_TIMEOUT,
            self.store.find_available_storage(),
        )
        .await?
        .ok_or(Error::NoStorageAvailable)?;

        let id = storage.id.ok_or(Error::NilStorageId)?;
        debug!(id, name = %storage.name, "selected storage");
        Ok((id, storage))
    }
}

/// What a batched lookup made of the requested codes.
#[derive(Debug, Default)]
pub struct Resolution {
    pub products: Vec<Product>,
    /// Requested codes the catalog knows nothing about.
    pub missing: Vec<String>,
}

/// Turns requested product codes into full catalog records.
pub struct ProductResolver {
    store: Arc<dyn Store>,
}

impl ProductResolver {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// One batched lookup for the whole set. Individually missing codes are
    /// tracked per item; only transport/protocol failures abort the batch.
    pub async fn resolve(&self, requests: &[ProductRequest]) -> Result<Resolution, Error> {
        let codes: Vec<String> = requests.iter().map(|r| r.code.clone()).collect();

        let products = bounded(
            "product resolution",
            RESOLUTION_TIMEOUT,
            self.store.find_products_by_code(&codes),
        )
        .await?
        .ok_or(Error::NilProducts)?;

        if products.is_empty() {
            return Err(Error::EmptyProducts);
        }

        let missing: Vec<String> = codes
            .into_iter()
            .filter(|code| !products.iter().any(|p| &p.code == code))
            .collect();
        if !missing.is_empty() {
            warn!(?missing, "requested codes unknown to the catalog");
        }

        Ok(Resolution { products, missing })
    }
}

/// Resolved products a finished operation vouches for, plus the codes it had
/// to leave behind.
#[derive(Debug, Default)]
pub struct Outcome {
    pub products: Vec<Product>,
    pub missing: Vec<String>,
}

/// Composes storage selection, resolution and the persistence batch into one
/// reservation or exemption call, terminal on the first failure.
pub struct Orchestrator {
    selector: StorageSelector,
    resolver: ProductResolver,
    store: Arc<dyn Store>,
}

impl Orchestrator {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            selector: StorageSelector::new(store.clone()),
            resolver: ProductResolver::new(store.clone()),
            store,
        }
    }

    pub async fn reserve(&self, requests: &[ProductRequest]) -> Result<Outcome, Error> {
        match tokio::time::timeout(OPERATION_TIMEOUT, self.reserve_inner(requests)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout("reservation", OPERATION_TIMEOUT)),
        }
    }

    async fn reserve_inner(&self, requests: &[ProductRequest]) -> Result<Outcome, Error> {
        let (storage_id, storage) = self.selector.find_available().await?;
        let resolution = self.resolver.resolve(requests).await?;

        let batch = bounded(
            "reservation insert",
            PERSISTENCE_TIMEOUT,
            self.store.reserve_products(storage_id, &resolution.products),
        )
        .await?;

        // Rows hitting the uniqueness constraint were already reserved;
        // re-reserving is idempotent, not an error.
        if !batch.conflicted.is_empty() {
            warn!(
                already_reserved = ?batch.conflicted,
                storage = %storage.name,
                "skipped duplicate reservation rows"
            );
        }
        info!(
            inserted = batch.inserted.len(),
            storage_id, "reservation persisted"
        );

        Ok(Outcome {
            products: resolution.products,
            missing: resolution.missing,
        })
    }

    pub async fn exempt(&self, requests: &[ProductRequest]) -> Result<Outcome, Error> {
        match tokio::time::timeout(OPERATION_TIMEOUT, self.exempt_inner(requests)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout("exemption", OPERATION_TIMEOUT)),
        }
    }

    async fn exempt_inner(&self, requests: &[ProductRequest]) -> Result<Outcome, Error> {
        let resolution = self.resolver.resolve(requests).await?;

        let deleted = bounded(
            "reservation delete",
            PERSISTENCE_TIMEOUT,
            self.store.exempt_products(&resolution.products),
        )
        .await?;

        // Deleting zero rows means nothing was reserved in the first place;
        // the exemption still counts as processed.
        info!(deleted, "exemption persisted");

        Ok(Outcome {
            products: resolution.products,
            missing: resolution.missing,
        })
    }

    /// Products currently held on one storage, for the receiving report.
    pub async fn remaining_on_storage(&self, storage_id: i32) -> Result<Vec<Product>, Error> {
        bounded(
            "receiving lookup",
            RESOLUTION_TIMEOUT,
            self.store.products_on_storage(storage_id),
        )
        .await
    }
}
