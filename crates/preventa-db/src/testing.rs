//! Fixtures shared by the repository tests.

use chrono::{NaiveDate, Utc};
use preventa_core::{
    Client, DeliveryStatus, Money, Order, OrderLine, OrderStatus, PriceListMarkupRule, Product,
    RouteSheet, RouteSheetStatus, RouteStop,
};
use rust_decimal::Decimal;

use crate::Database;

pub fn client(id: &str, code: &str, name: &str) -> Client {
    Client {
        id: id.into(),
        code: code.into(),
        name: name.into(),
        address: None,
        phone: None,
        email: None,
        credit_limit: Money::zero(),
        balance: Money::zero(),
        fiscal_condition: None,
        price_list_id: None,
        latitude: None,
        longitude: None,
        route_rank: None,
        synced: true,
        updated_at: Utc::now(),
    }
}

pub fn product(id: &str, code: &str, cost: i64) -> Product {
    Product {
        id: id.into(),
        code: code.into(),
        name: format!("Producto {code}"),
        description: None,
        cost_price: Money::from_units(cost),
        sale_price: Money::from_units(cost),
        stock: 10,
        category: None,
        brand_id: None,
        product_type_id: None,
        image_url: None,
        synced: true,
        updated_at: Utc::now(),
    }
}

pub fn markup(
    id: &str,
    price_list_id: &str,
    brand_id: Option<&str>,
    product_type_id: Option<&str>,
    percentage: i64,
) -> PriceListMarkupRule {
    PriceListMarkupRule {
        id: id.into(),
        price_list_id: price_list_id.into(),
        brand_id: brand_id.map(str::to_string),
        product_type_id: product_type_id.map(str::to_string),
        percentage: Decimal::from(percentage),
    }
}

pub fn route_sheet(id: &str, user_id: &str) -> RouteSheet {
    RouteSheet {
        id: id.into(),
        user_id: user_id.into(),
        date: NaiveDate::from_ymd_opt(2024, 5, 10).expect("valid date"),
        status: RouteSheetStatus::Pending,
        notes: None,
        started_at: None,
        completed_at: None,
        synced: true,
    }
}

/// An order with one line whose subtotal is the whole total.
pub fn order_with_total(id: &str, total: &str) -> Order {
    let price: Money = total.parse().expect("valid amount");
    Order {
        id: id.into(),
        client_id: "c1".into(),
        client_name: "Kiosco".into(),
        lines: vec![OrderLine::new(format!("{id}-l1"), "p1", "Producto", 1, price).unwrap()],
        total: price,
        status: OrderStatus::Processed,
        notes: None,
        created_at: Utc::now(),
        synced: true,
    }
}

pub struct RouteFixture {
    pub sheet_id: String,
    pub stop_ids: Vec<String>,
    pub order_ids: Vec<String>,
}

/// Stores sheet `hr-1` for `driver-1` with one pending stop per order total.
pub async fn route_fixture(db: &Database, totals: &[&str]) -> RouteFixture {
    let sheet = route_sheet("hr-1", "driver-1");
    let mut stops = Vec::new();
    let mut orders = Vec::new();

    for (i, total) in totals.iter().enumerate() {
        let order = order_with_total(&format!("o-{i}"), total);
        stops.push(RouteStop {
            id: format!("s-{i}"),
            route_sheet_id: sheet.id.clone(),
            order_id: order.id.clone(),
            rank: i as i64 + 1,
            status: DeliveryStatus::Pending,
            arrived_at: None,
            departed_at: None,
            signature_ref: None,
            photo_ref: None,
            notes: None,
            synced: true,
        });
        orders.push(order);
    }

    let fixture = RouteFixture {
        sheet_id: sheet.id.clone(),
        stop_ids: stops.iter().map(|s| s.id.clone()).collect(),
        order_ids: orders.iter().map(|o| o.id.clone()).collect(),
    };

    db.routes()
        .insert_if_absent(sheet, stops, orders)
        .await
        .expect("fixture inserted");

    fixture
}
