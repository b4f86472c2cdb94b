//! # Seed Data Generator
//!
//! Populates a Local Store with development data.
//!
//! ## Usage
//! ```bash
//! # 200 products, 40 clients (default)
//! cargo run -p preventa-db --bin seed
//!
//! # Custom amounts and database
//! cargo run -p preventa-db --bin seed -- --count 1000 --clients 120 --db ./data/preventa.db
//!
//! # Also create today's route sheet for a driver
//! cargo run -p preventa-db --bin seed -- --driver chofer-01
//! ```
//!
//! ## Generated Data
//! - Products across the usual almacén categories, each with a brand and a
//!   product type, cost between 150.00 and 4150.00
//! - Clients split between two price lists (`lp-mayorista`, `lp-minorista`)
//! - Markup rules: per brand on the wholesale list, per type on the retail list
//! - With `--driver`: a pending route sheet with one order per stop
//!
//! Values are derived from the item index, so two runs produce the same data.

use chrono::Utc;
use preventa_core::order::OrderDraft;
use preventa_core::pricing::price_product;
use preventa_core::{
    Client, CoreError, DeliveryStatus, Money, OrderStatus, PriceListMarkupRule, Product, RouteSheet, RouteSheetStatus,
    RouteStop,
};
use preventa_db::{Database, DbConfig};
use rust_decimal::Decimal;
use std::env;
use uuid::Uuid;

/// Product categories with their catalog names.
const CATEGORIES: &[(&str, &[&str])] = &[
    (
        "ALM",
        &[
            "Yerba Mate",
            "Azúcar",
            "Harina 000",
            "Arroz Largo Fino",
            "Fideos Spaghetti",
            "Fideos Mostachol",
            "Aceite Girasol",
            "Puré de Tomate",
            "Lentejas",
            "Polenta",
        ],
    ),
    (
        "BEB",
        &[
            "Agua Mineral",
            "Gaseosa Cola",
            "Gaseosa Lima",
            "Jugo en Polvo",
            "Soda Sifón",
            "Agua Saborizada",
            "Cerveza Rubia",
            "Vino Tinto",
        ],
    ),
    (
        "LIM",
        &[
            "Lavandina",
            "Detergente",
            "Jabón en Polvo",
            "Suavizante",
            "Limpiador de Pisos",
            "Esponja",
        ],
    ),
    (
        "GOL",
        &[
            "Galletitas Dulces",
            "Galletitas de Agua",
            "Alfajor Triple",
            "Caramelos",
            "Chicles",
            "Chocolate con Leche",
        ],
    ),
];

/// Package variants
const SIZES: &[&str] = &["500g", "1kg", "1.5L", "2.25L", "x6", "x12"];

const BRANDS: &[&str] = &["b-norte", "b-sur", "b-litoral", "b-cuyo"];

const PRICE_LISTS: &[&str] = &["lp-mayorista", "lp-minorista"];

const STREETS: &[&str] = &["San Martín", "Belgrano", "Rivadavia", "Mitre", "Sarmiento", "Urquiza"];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut count: usize = 200;
    let mut clients: usize = 40;
    let mut db_path = String::from("./preventa_dev.db");
    let mut driver: Option<String> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--count" | "-c" => {
                if i + 1 < args.len() {
                    count = args[i + 1].parse().unwrap_or(200);
                    i += 1;
                }
            }
            "--clients" => {
                if i + 1 < args.len() {
                    clients = args[i + 1].parse().unwrap_or(40);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--driver" => {
                if i + 1 < args.len() {
                    driver = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Preventa Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --count <N>      Number of products to generate (default: 200)");
                println!("      --clients <N>    Number of clients to generate (default: 40)");
                println!("  -d, --db <PATH>      Database file path (default: ./preventa_dev.db)");
                println!("      --driver <USER>  Also create today's route sheet for this user");
                println!("  -h, --help           Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 Preventa Seed Data Generator");
    println!("===============================");
    println!("Database: {}", db_path);
    println!("Products: {}", count);
    println!("Clients:  {}", clients);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;

    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let existing = db.products().count().await?;
    if existing > 0 {
        println!("⚠ Database already has {} products", existing);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    let start = std::time::Instant::now();

    let products = generate_products(count)?;
    db.products().mirror(products.clone()).await?;
    println!("✓ Generated {} products", products.len());

    let client_list: Vec<Client> = (0..clients).map(generate_client).collect();
    db.clients().mirror(client_list.clone()).await?;
    println!("✓ Generated {} clients", client_list.len());

    let rules = generate_rules();
    db.markups().mirror(rules.clone()).await?;
    println!("✓ Generated {} markup rules", rules.len());

    if let Some(user_id) = driver {
        let stops = seed_route(&db, &user_id, &client_list, &products, &rules).await?;
        println!("✓ Created today's route sheet for {} with {} stops", user_id, stops);
    }

    println!();
    println!("✓ Seed complete in {:?}", start.elapsed());

    Ok(())
}

/// Generates products in category order until `count` is reached.
fn generate_products(count: usize) -> Result<Vec<Product>, CoreError> {
    let now = Utc::now();
    let mut products = Vec::with_capacity(count);

    'outer: for (category_idx, (category, names)) in CATEGORIES.iter().enumerate() {
        for (name_idx, name) in names.iter().enumerate() {
            for (size_idx, size) in SIZES.iter().enumerate() {
                if products.len() >= count {
                    break 'outer;
                }
                let seed = category_idx * 1000 + name_idx * 20 + size_idx;

                // Cost 150.00 - 4150.00
                let cost = Money::new(15_000 + ((seed * 7919) % 400_000) as i64, 2);

                products.push(Product {
                    id: Uuid::new_v4().to_string(),
                    code: format!("{}-{:05}", category, seed),
                    name: format!("{} {}", name, size),
                    description: None,
                    cost_price: cost,
                    sale_price: cost.apply_markup(Decimal::from(35))?.round_to_cents(),
                    stock: (seed % 250) as i64,
                    category: Some(category.to_string()),
                    brand_id: Some(BRANDS[seed % BRANDS.len()].to_string()),
                    product_type_id: Some(format!("t-{}", category.to_lowercase())),
                    image_url: None,
                    synced: true,
                    updated_at: now,
                });
            }
        }
    }

    Ok(products)
}

fn generate_client(seed: usize) -> Client {
    let street = STREETS[seed % STREETS.len()];
    Client {
        id: Uuid::new_v4().to_string(),
        code: format!("CLI-{:04}", seed + 1),
        name: format!("Almacén {} {}", street, seed + 1),
        address: Some(format!("{} {}", street, 100 + seed * 13)),
        phone: Some(format!("+54 11 4{:03}-{:04}", seed % 1000, (seed * 37) % 10_000)),
        email: None,
        credit_limit: Money::from_units(50_000 + (seed as i64 % 10) * 10_000),
        balance: Money::zero(),
        fiscal_condition: Some(if seed % 3 == 0 { "responsable_inscripto" } else { "monotributo" }.to_string()),
        price_list_id: Some(PRICE_LISTS[seed % PRICE_LISTS.len()].to_string()),
        latitude: Some(-34.60 - (seed % 50) as f64 * 0.001),
        longitude: Some(-58.38 - (seed % 70) as f64 * 0.001),
        route_rank: Some(seed as i64 + 1),
        synced: true,
        updated_at: Utc::now(),
    }
}

fn generate_rules() -> Vec<PriceListMarkupRule> {
    let mut rules: Vec<PriceListMarkupRule> = BRANDS
        .iter()
        .enumerate()
        .map(|(i, brand)| PriceListMarkupRule {
            id: Uuid::new_v4().to_string(),
            price_list_id: "lp-mayorista".to_string(),
            brand_id: Some(brand.to_string()),
            product_type_id: None,
            percentage: Decimal::from(15 + i as i64 * 5),
        })
        .collect();

    rules.extend(CATEGORIES.iter().enumerate().map(|(i, (category, _))| PriceListMarkupRule {
        id: Uuid::new_v4().to_string(),
        price_list_id: "lp-minorista".to_string(),
        brand_id: None,
        product_type_id: Some(format!("t-{}", category.to_lowercase())),
        percentage: Decimal::from(40 + i as i64 * 5),
    }));

    rules
}

/// Creates a pending route sheet for today with one order per stop.
async fn seed_route(
    db: &Database,
    user_id: &str,
    clients: &[Client],
    products: &[Product],
    rules: &[PriceListMarkupRule],
) -> Result<usize, Box<dyn std::error::Error>> {
    let now = Utc::now();
    let sheet = RouteSheet {
        id: Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        date: now.date_naive(),
        status: RouteSheetStatus::Pending,
        notes: None,
        started_at: None,
        completed_at: None,
        synced: true,
    };

    let mut stops = Vec::new();
    let mut orders = Vec::new();

    for (rank, client) in clients.iter().take(8).enumerate() {
        let client_rules: Vec<PriceListMarkupRule> = rules
            .iter()
            .filter(|r| Some(&r.price_list_id) == client.price_list_id.as_ref())
            .cloned()
            .collect();

        let mut draft = OrderDraft::new();
        for product in products.iter().skip(rank * 3).take(3) {
            let price = price_product(product, &client_rules)?.round_to_cents();
            draft.add(product, price, 1 + (rank as i64 % 4))?;
        }
        if draft.is_empty() {
            break;
        }

        let mut order = draft.into_order(client, None, now)?;
        order.status = OrderStatus::Processed;
        stops.push(RouteStop {
            id: Uuid::new_v4().to_string(),
            route_sheet_id: sheet.id.clone(),
            order_id: order.id.clone(),
            rank: rank as i64 + 1,
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

    let count = stops.len();
    db.routes().insert_if_absent(sheet, stops, orders).await?;
    Ok(count)
}
