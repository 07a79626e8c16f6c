//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{ConnectOptions, Connection};
use std::path::{Path, PathBuf};

pub const RETAIL_SCHEMA: &str = r#"
CREATE TABLE Categories (
    CategoryID INTEGER PRIMARY KEY,
    CategoryName TEXT NOT NULL
);
CREATE TABLE Products (
    ProductID INTEGER PRIMARY KEY,
    ProductName TEXT NOT NULL,
    CategoryID INTEGER REFERENCES Categories(CategoryID),
    UnitPrice REAL NOT NULL,
    Discontinued INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE Orders (
    OrderID INTEGER PRIMARY KEY,
    OrderDate TEXT NOT NULL
);
CREATE TABLE "Order Details" (
    OrderID INTEGER REFERENCES Orders(OrderID),
    ProductID INTEGER REFERENCES Products(ProductID),
    UnitPrice REAL NOT NULL,
    Quantity INTEGER NOT NULL,
    Discount REAL NOT NULL DEFAULT 0
);
INSERT INTO Categories VALUES (1, 'Beverages'), (2, 'Condiments');
INSERT INTO Products VALUES
    (1, 'Chai', 1, 18.0, 0),
    (2, 'Chang', 1, 19.0, 0),
    (3, 'Aniseed Syrup', 2, 10.0, 0);
INSERT INTO Orders VALUES (10248, '1997-06-04'), (10249, '1997-06-20');
INSERT INTO "Order Details" VALUES
    (10248, 1, 18.0, 10, 0.0),
    (10248, 3, 10.0, 5, 0.0),
    (10249, 2, 19.0, 12, 0.1);
"#;

/// Create a small retail database at `dir/retail.sqlite`.
pub async fn create_retail_db(dir: &Path) -> PathBuf {
    let path = dir.join("retail.sqlite");
    let mut conn = SqliteConnectOptions::new()
        .filename(&path)
        .create_if_missing(true)
        .connect()
        .await
        .unwrap();
    sqlx::raw_sql(RETAIL_SCHEMA).execute(&mut conn).await.unwrap();
    conn.close().await.unwrap();
    path
}
