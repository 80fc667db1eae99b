//! # Seed Data Generator
//!
//! Populates a development database with a small grocery catalog, clients
//! and a supplier.
//!
//! ## Usage
//! ```bash
//! cargo run -p kassa-db --bin seed
//! cargo run -p kassa-db --bin seed -- --db ./data/kassa.db
//! RUST_LOG=debug cargo run -p kassa-db --bin seed
//! ```
//!
//! Products are created with opening stock and no stock moves, the same as
//! products created through the catalog service.

use chrono::Utc;
use kassa_core::{Category, Client, Money, Product, Quantity, Supplier};
use kassa_db::{
    CategoryRepository, ClientRepository, Database, DbConfig, ProductRepository,
    SupplierRepository,
};
use std::env;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// (category, [(name, unit, buy so'm, sell so'm, stock units)])
const CATALOG: &[(&str, &[(&str, &str, i64, i64, i64)])] = &[
    (
        "Non mahsulotlari",
        &[
            ("Non (patir)", "pcs", 3_000, 4_000, 60),
            ("Obi non", "pcs", 2_500, 3_500, 80),
            ("Lavash", "pcs", 4_000, 5_500, 40),
        ],
    ),
    (
        "Sut mahsulotlari",
        &[
            ("Sut 1L", "pcs", 9_000, 11_000, 30),
            ("Qatiq 0.5L", "pcs", 6_000, 7_500, 25),
            ("Tvorog", "kg", 28_000, 34_000, 12),
            ("Saryog' 200g", "pcs", 18_000, 22_000, 15),
        ],
    ),
    (
        "Bakaleya",
        &[
            ("Guruch (lazer)", "kg", 16_000, 19_000, 100),
            ("Shakar", "kg", 11_000, 13_000, 80),
            ("Un 1-nav", "kg", 6_500, 8_000, 120),
            ("Paxta yog'i 1L", "pcs", 19_000, 23_000, 40),
            ("Tuz", "pcs", 2_000, 3_000, 4),
        ],
    ),
    (
        "Ichimliklar",
        &[
            ("Coca-Cola 1L", "pcs", 8_500, 10_500, 48),
            ("Hydrolife 1.5L", "pcs", 3_000, 4_000, 96),
            ("Choy (ko'k) 100g", "pcs", 9_000, 12_000, 20),
        ],
    ),
];

const CLIENTS: &[(&str, &str)] = &[
    ("Bobur Karimov", "+998 90 123 45 67"),
    ("Malika Yusupova", "+998 91 234 56 78"),
    ("Sardor Aliyev", "+998 93 345 67 89"),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = env::args().collect();
    let mut db_path = String::from("./kassa_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Kassa POS Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file path (default: ./kassa_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    info!(path = %db_path, "Seeding database");
    let db = Database::new(DbConfig::new(&db_path)).await?;

    let existing = db.products().count().await?;
    if existing > 0 {
        warn!(existing, "Database already has products, skipping seed");
        return Ok(());
    }

    let start = std::time::Instant::now();
    let now = Utc::now();
    let mut tx = db.begin().await?;
    let mut products = 0usize;

    for (category_name, items) in CATALOG {
        let category = Category {
            id: Uuid::new_v4().to_string(),
            name: category_name.to_string(),
            created_at: now,
        };
        CategoryRepository::insert(&mut tx, &category).await?;

        for (idx, (name, unit, buy, sell, stock)) in items.iter().enumerate() {
            let product = Product {
                id: Uuid::new_v4().to_string(),
                name: name.to_string(),
                barcode: Some(format!("478{:04}{:06}", products, idx)),
                buy_price_tiyin: Money::from_som(*buy).tiyin(),
                sell_price_tiyin: Money::from_som(*sell).tiyin(),
                stock_milli: Quantity::from_units(*stock).milli(),
                unit: unit.to_string(),
                category_id: Some(category.id.clone()),
                is_favorite: idx == 0,
                is_archived: false,
                created_at: now,
                updated_at: now,
            };
            ProductRepository::insert(&mut tx, &product).await?;
            products += 1;
        }
    }

    for (name, phone) in CLIENTS {
        let client = Client {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            phone: Some(phone.to_string()),
            balance_tiyin: 0,
            bonus_balance_tiyin: 0,
            debt_due_date: None,
            created_at: now,
            updated_at: now,
        };
        ClientRepository::insert(&mut tx, &client).await?;
    }

    let supplier = Supplier {
        id: Uuid::new_v4().to_string(),
        name: "Ulgurji Savdo MChJ".to_string(),
        phone: Some("+998 71 200 00 00".to_string()),
        balance_tiyin: 0,
        created_at: now,
    };
    SupplierRepository::insert(&mut tx, &supplier).await?;

    tx.commit().await?;

    info!(
        products,
        clients = CLIENTS.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Seed complete"
    );

    let low = db.products().low_stock(Quantity::from_units(5)).await?;
    info!(count = low.len(), "Products below the default low-stock threshold");

    db.close().await;
    Ok(())
}
