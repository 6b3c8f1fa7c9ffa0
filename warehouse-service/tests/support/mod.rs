use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;

use warehouse_service::api::{create_router, AppState};
use warehouse_service::error::StoreError;
use warehouse_service::models::{Product, Storage};
use warehouse_service::registry::ProductRegistry;
use warehouse_service::services::Orchestrator;
use warehouse_service::store::{BatchInsert, Store};

/// Configurable catalog stand-in for black-box tests.
#[derive(Default)]
pub struct MockStore {
    pub storage: Option<Storage>,
    pub catalog: Vec<Product>,
    pub conflicted_ids: Vec<i32>,
    pub deleted_rows: u64,
}

#[async_trait]
impl Store for MockStore {
    async fn find_available_storage(&self) -> Result<Option<Storage>, StoreError> {
        Ok(self.storage.clone())
    }

    async fn find_products_by_code(
        &self,
        codes: &[String],
    ) -> Result<Option<Vec<Product>>, StoreError> {
        Ok(Some(
            self.catalog
                .iter()
                .filter(|p| codes.contains(&p.code))
                .cloned()
                .collect(),
        ))
    }

    async fn reserve_products(
        &self,
        _storage_id: i32,
        products: &[Product],
    ) -> Result<BatchInsert, StoreError> {
        Ok(BatchInsert {
            inserted: products
                .iter()
                .map(|p| p.id)
                .filter(|id| !self.conflicted_ids.contains(id))
                .collect(),
            conflicted: self.conflicted_ids.clone(),
        })
    }

    async fn exempt_products(&self, _products: &[Product]) -> Result<u64, StoreError> {
        Ok(self.deleted_rows)
    }

    async fn products_on_storage(&self, _storage_id: i32) -> Result<Vec<Product>, StoreError> {
        Ok(self.catalog.clone())
    }
}

pub struct TestServer {
    pub base_url: String,
    pub registry: Arc<ProductRegistry>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    /// Builds the production router around a mock store and binds it to an
    /// ephemeral port.
    pub async fn spawn(store: MockStore) -> Self {
        let registry = Arc::new(ProductRegistry::new());
        let state = AppState {
            registry: registry.clone(),
            orchestrator: Arc::new(Orchestrator::new(Arc::new(store))),
        };
        let app = create_router(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().expect("listener has a local addr");
        let base_url = format!("http://{addr}");

        let handle = tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .expect("test server crashed");
        });

        Self {
            base_url,
            registry,
            handle,
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub fn product(id: i32, code: &str) -> Product {
    Product {
        id,
        code: code.to_string(),
        name: format!("product-{id}"),
        size: 2,
        count: 5,
    }
}

pub fn available_storage(id: i32) -> Storage {
    Storage {
        id: Some(id),
        name: "dock-a".to_string(),
        available: true,
    }
}
