//! # Collections
//!
//! [`Record`] implementations for every domain type kept on the device.
//!
//! ```text
//! collection          indexes                                   unique
//! ──────────────────  ────────────────────────────────────────  ──────────────
//! clients             name, synced, route_rank                  code
//! products            name, category, synced                    code
//! price_list_markups  price_list_id, brand_id, product_type_id
//! orders              client_id, status, synced, created_at
//! collections         client_id, synced, created_at
//! route_sheets        user_id, date, status, synced
//! route_stops         route_sheet_id, order_id, status, synced
//! stop_payments       stop_id, synced
//! stop_returns        stop_id, synced
//! reconciliations     synced                                    route_sheet_id
//! ```

use preventa_core::{
    Client, Collection, Order, PriceListMarkupRule, Product, Reconciliation, RouteSheet,
    RouteStop, StopPayment, StopReturn,
};

use crate::store::{IndexValue, Record, SyncTracked};

/// Implements [`SyncTracked`] over a `synced: bool` field.
macro_rules! sync_tracked {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl SyncTracked for $ty {
                fn is_synced(&self) -> bool {
                    self.synced
                }

                fn set_synced(&mut self, synced: bool) {
                    self.synced = synced;
                }
            }
        )+
    };
}

fn text(value: &str) -> IndexValue {
    IndexValue::Text(value.to_string())
}

fn push_opt(values: &mut Vec<(&'static str, IndexValue)>, attribute: &'static str, value: Option<IndexValue>) {
    if let Some(value) = value {
        values.push((attribute, value));
    }
}

impl Record for Client {
    const COLLECTION: &'static str = "clients";
    const INDEXES: &'static [&'static str] = &["name", "synced", "route_rank"];
    const UNIQUE_INDEXES: &'static [&'static str] = &["code"];

    fn id(&self) -> &str {
        &self.id
    }

    fn index_values(&self) -> Vec<(&'static str, IndexValue)> {
        let mut values = vec![
            ("code", text(&self.code)),
            ("name", text(&self.name)),
            ("synced", self.synced.into()),
        ];
        push_opt(&mut values, "route_rank", self.route_rank.map(IndexValue::Int));
        values
    }
}

impl Record for Product {
    const COLLECTION: &'static str = "products";
    const INDEXES: &'static [&'static str] = &["name", "category", "synced"];
    const UNIQUE_INDEXES: &'static [&'static str] = &["code"];

    fn id(&self) -> &str {
        &self.id
    }

    fn index_values(&self) -> Vec<(&'static str, IndexValue)> {
        let mut values = vec![
            ("code", text(&self.code)),
            ("name", text(&self.name)),
            ("synced", self.synced.into()),
        ];
        push_opt(&mut values, "category", self.category.as_deref().map(text));
        values
    }
}

impl Record for PriceListMarkupRule {
    const COLLECTION: &'static str = "price_list_markups";
    const INDEXES: &'static [&'static str] = &["price_list_id", "brand_id", "product_type_id"];

    fn id(&self) -> &str {
        &self.id
    }

    fn index_values(&self) -> Vec<(&'static str, IndexValue)> {
        let mut values = vec![("price_list_id", text(&self.price_list_id))];
        push_opt(&mut values, "brand_id", self.brand_id.as_deref().map(text));
        push_opt(&mut values, "product_type_id", self.product_type_id.as_deref().map(text));
        values
    }
}

impl Record for Order {
    const COLLECTION: &'static str = "orders";
    const INDEXES: &'static [&'static str] = &["client_id", "status", "synced", "created_at"];

    fn id(&self) -> &str {
        &self.id
    }

    fn index_values(&self) -> Vec<(&'static str, IndexValue)> {
        vec![
            ("client_id", text(&self.client_id)),
            ("status", text(self.status.as_str())),
            ("synced", self.synced.into()),
            ("created_at", self.created_at.to_rfc3339().into()),
        ]
    }
}

impl Record for Collection {
    const COLLECTION: &'static str = "collections";
    const INDEXES: &'static [&'static str] = &["client_id", "synced", "created_at"];

    fn id(&self) -> &str {
        &self.id
    }

    fn index_values(&self) -> Vec<(&'static str, IndexValue)> {
        vec![
            ("client_id", text(&self.client_id)),
            ("synced", self.synced.into()),
            ("created_at", self.created_at.to_rfc3339().into()),
        ]
    }
}

impl Record for RouteSheet {
    const COLLECTION: &'static str = "route_sheets";
    const INDEXES: &'static [&'static str] = &["user_id", "date", "status", "synced"];

    fn id(&self) -> &str {
        &self.id
    }

    fn index_values(&self) -> Vec<(&'static str, IndexValue)> {
        vec![
            ("user_id", text(&self.user_id)),
            ("date", self.date.to_string().into()),
            ("status", text(self.status.as_str())),
            ("synced", self.synced.into()),
        ]
    }
}

impl Record for RouteStop {
    const COLLECTION: &'static str = "route_stops";
    const INDEXES: &'static [&'static str] = &["route_sheet_id", "order_id", "status", "synced"];

    fn id(&self) -> &str {
        &self.id
    }

    fn index_values(&self) -> Vec<(&'static str, IndexValue)> {
        vec![
            ("route_sheet_id", text(&self.route_sheet_id)),
            ("order_id", text(&self.order_id)),
            ("status", text(self.status.as_str())),
            ("synced", self.synced.into()),
        ]
    }
}

impl Record for StopPayment {
    const COLLECTION: &'static str = "stop_payments";
    const INDEXES: &'static [&'static str] = &["stop_id", "synced"];

    fn id(&self) -> &str {
        &self.id
    }

    fn index_values(&self) -> Vec<(&'static str, IndexValue)> {
        vec![("stop_id", text(&self.stop_id)), ("synced", self.synced.into())]
    }
}

impl Record for StopReturn {
    const COLLECTION: &'static str = "stop_returns";
    const INDEXES: &'static [&'static str] = &["stop_id", "synced"];

    fn id(&self) -> &str {
        &self.id
    }

    fn index_values(&self) -> Vec<(&'static str, IndexValue)> {
        vec![("stop_id", text(&self.stop_id)), ("synced", self.synced.into())]
    }
}

impl Record for Reconciliation {
    const COLLECTION: &'static str = "reconciliations";
    const INDEXES: &'static [&'static str] = &["synced"];
    const UNIQUE_INDEXES: &'static [&'static str] = &["route_sheet_id"];

    fn id(&self) -> &str {
        &self.id
    }

    fn index_values(&self) -> Vec<(&'static str, IndexValue)> {
        vec![
            ("route_sheet_id", text(&self.route_sheet_id)),
            ("synced", self.synced.into()),
        ]
    }
}

sync_tracked!(
    Client,
    Product,
    Order,
    Collection,
    RouteSheet,
    RouteStop,
    StopPayment,
    StopReturn,
    Reconciliation,
);
