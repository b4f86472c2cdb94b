//! # Reference Data Repositories
//!
//! Clients, products and price-list markup rules. The backend owns these
//! collections; the device keeps a mirror that each download replaces.
//!
//! ```text
//! remote select ──► mirror(records) ──► replace_all (synced = true)
//!                        │
//!                        └── fetch failed? never called, mirror untouched
//! ```

use preventa_core::{Client, PriceListMarkupRule, Product};
use tracing::debug;

use crate::error::DbResult;
use crate::store::LocalStore;

// =============================================================================
// Clients
// =============================================================================

/// Repository for the client mirror.
#[derive(Debug, Clone)]
pub struct ClientRepository {
    store: LocalStore,
}

impl ClientRepository {
    pub fn new(store: LocalStore) -> Self {
        ClientRepository { store }
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Client>> {
        self.store.get(id).await
    }

    /// Looks a client up by its business code.
    pub async fn get_by_code(&self, code: &str) -> DbResult<Option<Client>> {
        self.store.get_unique("code", code).await
    }

    /// Lists clients in visit order; clients without a rank go last, by name.
    pub async fn list(&self) -> DbResult<Vec<Client>> {
        let mut clients: Vec<Client> = self.store.get_all().await?;
        clients.sort_by(|a, b| {
            (a.route_rank.is_none(), a.route_rank, &a.name)
                .cmp(&(b.route_rank.is_none(), b.route_rank, &b.name))
        });
        Ok(clients)
    }

    /// Case-insensitive search over name and code.
    pub async fn search(&self, query: &str) -> DbResult<Vec<Client>> {
        let needle = query.trim().to_lowercase();
        let clients = self.list().await?;
        if needle.is_empty() {
            return Ok(clients);
        }
        Ok(clients
            .into_iter()
            .filter(|c| {
                c.name.to_lowercase().contains(&needle) || c.code.to_lowercase().contains(&needle)
            })
            .collect())
    }

    pub async fn count(&self) -> DbResult<u64> {
        self.store.count::<Client>().await
    }

    /// Replaces the whole mirror with a downloaded set.
    pub async fn mirror(&self, mut clients: Vec<Client>) -> DbResult<usize> {
        for client in &mut clients {
            client.synced = true;
        }
        self.store.replace_all(&clients).await?;
        debug!(count = clients.len(), "Clients mirrored");
        Ok(clients.len())
    }
}

// =============================================================================
// Products
// =============================================================================

/// Repository for the product mirror.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    store: LocalStore,
}

impl ProductRepository {
    pub fn new(store: LocalStore) -> Self {
        ProductRepository { store }
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Product>> {
        self.store.get(id).await
    }

    /// Looks a product up by its business code.
    pub async fn get_by_code(&self, code: &str) -> DbResult<Option<Product>> {
        self.store.get_unique("code", code).await
    }

    /// Lists products by name.
    pub async fn list(&self) -> DbResult<Vec<Product>> {
        let mut products: Vec<Product> = self.store.get_all().await?;
        products.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(products)
    }

    pub async fn by_category(&self, category: &str) -> DbResult<Vec<Product>> {
        self.store.get_by_index("category", category).await
    }

    /// Case-insensitive search over name and code.
    pub async fn search(&self, query: &str, limit: usize) -> DbResult<Vec<Product>> {
        let needle = query.trim().to_lowercase();
        let products = self.list().await?;
        Ok(products
            .into_iter()
            .filter(|p| {
                needle.is_empty()
                    || p.name.to_lowercase().contains(&needle)
                    || p.code.to_lowercase().contains(&needle)
            })
            .take(limit)
            .collect())
    }

    pub async fn count(&self) -> DbResult<u64> {
        self.store.count::<Product>().await
    }

    /// Replaces the whole mirror with a downloaded set.
    pub async fn mirror(&self, mut products: Vec<Product>) -> DbResult<usize> {
        for product in &mut products {
            product.synced = true;
        }
        self.store.replace_all(&products).await?;
        debug!(count = products.len(), "Products mirrored");
        Ok(products.len())
    }
}

// =============================================================================
// Markup Rules
// =============================================================================

/// Repository for price-list markup rules.
#[derive(Debug, Clone)]
pub struct MarkupRuleRepository {
    store: LocalStore,
}

impl MarkupRuleRepository {
    pub fn new(store: LocalStore) -> Self {
        MarkupRuleRepository { store }
    }

    /// Rules of one price list, in download order.
    pub async fn for_price_list(&self, price_list_id: &str) -> DbResult<Vec<PriceListMarkupRule>> {
        self.store.get_by_index("price_list_id", price_list_id).await
    }

    pub async fn count(&self) -> DbResult<u64> {
        self.store.count::<PriceListMarkupRule>().await
    }

    /// Replaces every stored rule with a downloaded set.
    pub async fn mirror(&self, rules: Vec<PriceListMarkupRule>) -> DbResult<usize> {
        self.store.replace_all(&rules).await?;
        debug!(count = rules.len(), "Markup rules mirrored");
        Ok(rules.len())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
