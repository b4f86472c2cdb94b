//! # Product Catalog
//!
//! Products priced for a specific client: the client's price list selects
//! the markup rules, the Pricing Resolver does the rest.

use preventa_core::pricing::{price_product, price_products, PricedProduct};
use preventa_core::{Client, CoreError, Money, PriceListMarkupRule, Product};

use crate::error::DbResult;
use crate::store::LocalStore;

#[derive(Debug, Clone)]
pub struct ProductCatalog {
    store: LocalStore,
}

impl ProductCatalog {
    pub fn new(store: LocalStore) -> Self {
        ProductCatalog { store }
    }

    /// Markup rules that apply to a client. A client without a price list
    /// gets none.
    pub async fn rules_for(&self, client: &Client) -> DbResult<Vec<PriceListMarkupRule>> {
        match client.price_list_id.as_deref() {
            Some(list) => self.store.get_by_index("price_list_id", list).await,
            None => Ok(Vec::new()),
        }
    }

    /// Every product with its price for the given client, sorted by name.
    pub async fn for_client(&self, client_id: &str) -> DbResult<Vec<PricedProduct>> {
        let client: Client = self.store.require("Client", client_id).await?;
        let rules = self.rules_for(&client).await?;

        let mut products: Vec<Product> = self.store.get_all().await?;
        products.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(price_products(products, &rules)?)
    }

    /// Price of one product for one client.
    pub async fn price_for(&self, client_id: &str, product_id: &str) -> DbResult<Money> {
        let client: Client = self.store.require("Client", client_id).await?;
        let product: Product = self
            .store
            .get(product_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Product", product_id))?;
        let rules = self.rules_for(&client).await?;

        Ok(price_product(&product, &rules)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{client, markup, product};
    use crate::{Database, DbConfig};

    #[tokio::test]
    async fn test_prices_follow_client_price_list() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let mut mayorista = client("c1", "CLI-1", "Mayorista");
        mayorista.price_list_id = Some("lp-may".into());
        let minorista = client("c2", "CLI-2", "Minorista");
        db.clients().mirror(vec![mayorista, minorista]).await.unwrap();

        let mut yerba = product("p1", "YER-1", 100);
        yerba.brand_id = Some("b-yerba".into());
        db.products().mirror(vec![yerba]).await.unwrap();

        db.markups()
            .mirror(vec![
                markup("r1", "lp-may", Some("b-yerba"), None, 20),
                markup("r2", "lp-otra", Some("b-yerba"), None, 90),
            ])
            .await
            .unwrap();

        let catalog = db.catalog();
        assert_eq!(catalog.price_for("c1", "p1").await.unwrap(), Money::from_units(120));
        assert_eq!(catalog.price_for("c2", "p1").await.unwrap(), Money::from_units(100));

        let priced = catalog.for_client("c1").await.unwrap();
        assert_eq!(priced.len(), 1);
        assert_eq!(priced[0].price, Money::from_units(120));
    }

    #[tokio::test]
    async fn test_unknown_client() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let err = db.catalog().for_client("nope").await.unwrap_err();
        assert!(err.is_not_found());
    }
}
