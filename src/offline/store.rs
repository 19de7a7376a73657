//! SQLite cache the till works from while the server is out of reach.
//!
//! Catalog rows (products with this till's stock, locations) are replaced on
//! every pull. Records the till creates (sales, movements, transfers, stock
//! takes) are kept as JSON with a sync status until the server settles them.

use std::collections::HashMap;

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use strum::{AsRefStr, Display, EnumString};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::ApiError;
use crate::model::location::Location;
use crate::model::product::Product;
use crate::model::sale::PaymentMethod;
use crate::model::stock::MovementType;
use crate::model::sync::{
    SyncKind, SyncMovement, SyncSale, SyncStockTake, SyncStockTakeItem, SyncTransfer,
    SyncTransferItem,
};
use crate::service::cart::{CartLine, SaleHeader, build_sale, quote, receipt_number, settle};
use crate::service::inventory::{merge_counts, movement_deltas};
use crate::service::pos_report::{
    DateRange, PaymentMethodRow, SalesSummary, payment_methods, sales_summary,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("local database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt local record: {0}")]
    Corrupt(#[from] serde_json::Error),

    /// The till refused the input, e.g. an empty cart or short cash.
    #[error("{0}")]
    Invalid(#[from] ApiError),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum LocalStatus {
    Pending,
    Synced,
    Failed,
}

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS products (
        id             INTEGER PRIMARY KEY,
        sku            TEXT NOT NULL,
        name           TEXT NOT NULL,
        description    TEXT NOT NULL DEFAULT '',
        category       TEXT NOT NULL DEFAULT '',
        barcode        TEXT,
        cost_price     REAL NOT NULL,
        selling_price  REAL NOT NULL,
        taxable        INTEGER NOT NULL,
        reorder_level  INTEGER NOT NULL,
        is_active      INTEGER NOT NULL,
        stock_quantity INTEGER NOT NULL,
        updated_at     TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_products_sku ON products (sku)",
    "CREATE INDEX IF NOT EXISTS idx_products_barcode ON products (barcode)",
    r#"
    CREATE TABLE IF NOT EXISTS locations (
        id            INTEGER PRIMARY KEY,
        name          TEXT NOT NULL,
        code          TEXT NOT NULL,
        location_type TEXT NOT NULL,
        address       TEXT NOT NULL DEFAULT '',
        is_active     INTEGER NOT NULL,
        updated_at    TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS sync_state (
        key   TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )
    "#,
];

/// Every locally created record lives in a table of this shape.
fn record_table_ddl(table: &str) -> String {
    format!(
        r#"
        CREATE TABLE IF NOT EXISTS {table} (
            seq         INTEGER PRIMARY KEY AUTOINCREMENT,
            uuid        TEXT NOT NULL UNIQUE,
            payload     TEXT NOT NULL,
            sync_status TEXT NOT NULL DEFAULT 'pending',
            sync_error  TEXT,
            created_at  TEXT NOT NULL
        )
        "#
    )
}

fn table(kind: SyncKind) -> &'static str {
    match kind {
        SyncKind::Sale => "sales",
        SyncKind::Movement => "stock_movements",
        SyncKind::Transfer => "stock_transfers",
        SyncKind::StockTake => "stock_takes",
    }
}

/// A record the till creates offline and later pushes.
pub trait LocalRecord: Serialize + DeserializeOwned + Send + Sync {
    const KIND: SyncKind;

    /// `pos_transaction_id` for sales, `uuid` for everything else.
    fn local_id(&self) -> &str;
    fn created_at(&self) -> NaiveDateTime;
}

impl LocalRecord for SyncSale {
    const KIND: SyncKind = SyncKind::Sale;
    fn local_id(&self) -> &str {
        &self.pos_transaction_id
    }
    fn created_at(&self) -> NaiveDateTime {
        self.created_at
    }
}

impl LocalRecord for SyncMovement {
    const KIND: SyncKind = SyncKind::Movement;
    fn local_id(&self) -> &str {
        &self.uuid
    }
    fn created_at(&self) -> NaiveDateTime {
        self.created_at
    }
}

impl LocalRecord for SyncTransfer {
    const KIND: SyncKind = SyncKind::Transfer;
    fn local_id(&self) -> &str {
        &self.uuid
    }
    fn created_at(&self) -> NaiveDateTime {
        self.created_at
    }
}

impl LocalRecord for SyncStockTake {
    const KIND: SyncKind = SyncKind::StockTake;
    fn local_id(&self) -> &str {
        &self.uuid
    }
    fn created_at(&self) -> NaiveDateTime {
        self.created_at
    }
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: i64,
    sku: String,
    name: String,
    description: String,
    category: String,
    barcode: Option<String>,
    cost_price: f64,
    selling_price: f64,
    taxable: bool,
    reorder_level: i64,
    is_active: bool,
    stock_quantity: i64,
    updated_at: DateTime<Utc>,
}

impl From<ProductRow> for Product {
    fn from(r: ProductRow) -> Self {
        Product {
            id: r.id as u64,
            sku: r.sku,
            name: r.name,
            description: r.description,
            category: r.category,
            barcode: r.barcode,
            cost_price: r.cost_price,
            selling_price: r.selling_price,
            taxable: r.taxable,
            reorder_level: r.reorder_level,
            is_active: r.is_active,
            stock_quantity: r.stock_quantity,
            updated_at: r.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct LocationRow {
    id: i64,
    name: String,
    code: String,
    location_type: String,
    address: String,
    is_active: bool,
    updated_at: DateTime<Utc>,
}

impl From<LocationRow> for Location {
    fn from(r: LocationRow) -> Self {
        Location {
            id: r.id as u64,
            name: r.name,
            code: r.code,
            location_type: r.location_type,
            address: r.address,
            is_active: r.is_active,
            updated_at: r.updated_at,
        }
    }
}

const PRODUCT_COLUMNS: &str = "id, sku, name, description, category, barcode, cost_price, \
    selling_price, taxable, reorder_level, is_active, stock_quantity, updated_at";

/// Cart line as the cashier enters it; prices come from the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct TillLine {
    pub product_id: u64,
    pub quantity: i64,
    pub discount: f64,
}

#[derive(Debug, Clone)]
pub struct NewSale {
    pub staff_id: u64,
    pub staff_name: String,
    pub customer_id: Option<u64>,
    pub payment_method: PaymentMethod,
    pub tendered: Option<f64>,
    pub notes: String,
    pub lines: Vec<TillLine>,
}

#[derive(Debug, Clone)]
pub struct NewLocalMovement {
    pub product_id: u64,
    pub movement_type: MovementType,
    pub from_location_id: Option<u64>,
    pub to_location_id: Option<u64>,
    pub quantity: i64,
    pub unit_cost: f64,
    pub reference: String,
    pub reason: String,
}

/// SQLite-backed till cache.
#[derive(Clone)]
pub struct LocalStore {
    pool: SqlitePool,
    location_id: u64,
}

impl LocalStore {
    /// Opens (creating if needed) the cache for the till at `location_id`.
    ///
    /// A single connection that never expires: SQLite serialises writers
    /// anyway, and `sqlite::memory:` databases die with their connection.
    pub async fn open(url: &str, location_id: u64) -> StoreResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect(url)
            .await?;

        for ddl in SCHEMA {
            sqlx::query(ddl).execute(&pool).await?;
        }
        for kind in SyncKind::ALL {
            sqlx::query(&record_table_ddl(table(kind))).execute(&pool).await?;
        }

        debug!(url, location_id, "Local store ready");
        Ok(Self { pool, location_id })
    }

    pub fn location_id(&self) -> u64 {
        self.location_id
    }

    /// Replaces cached rows with the server's. Stock still owed to the
    /// server by pending records is taken off again, so the shelf count the
    /// cashier sees stays right until the push lands.
    pub async fn upsert_products(&self, products: &[Product]) -> StoreResult<()> {
        let pending = self.pending_deltas().await?;
        let mut tx = self.pool.begin().await?;
        for p in products {
            let owed = pending.get(&p.id).copied().unwrap_or(0);
            sqlx::query(
                r#"
                INSERT INTO products (id, sku, name, description, category, barcode, cost_price,
                    selling_price, taxable, reorder_level, is_active, stock_quantity, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    sku = excluded.sku,
                    name = excluded.name,
                    description = excluded.description,
                    category = excluded.category,
                    barcode = excluded.barcode,
                    cost_price = excluded.cost_price,
                    selling_price = excluded.selling_price,
                    taxable = excluded.taxable,
                    reorder_level = excluded.reorder_level,
                    is_active = excluded.is_active,
                    stock_quantity = excluded.stock_quantity,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(p.id as i64)
            .bind(&p.sku)
            .bind(&p.name)
            .bind(&p.description)
            .bind(&p.category)
            .bind(&p.barcode)
            .bind(p.cost_price)
            .bind(p.selling_price)
            .bind(p.taxable)
            .bind(p.reorder_level)
            .bind(p.is_active)
            .bind(p.stock_quantity + owed)
            .bind(p.updated_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn upsert_locations(&self, locations: &[Location]) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        for l in locations {
            sqlx::query(
                r#"
                INSERT INTO locations (id, name, code, location_type, address, is_active, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    code = excluded.code,
                    location_type = excluded.location_type,
                    address = excluded.address,
                    is_active = excluded.is_active,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(l.id as i64)
            .bind(&l.name)
            .bind(&l.code)
            .bind(&l.location_type)
            .bind(&l.address)
            .bind(l.is_active)
            .bind(l.updated_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Active products, by name.
    pub async fn list_products(&self) -> StoreResult<Vec<Product>> {
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE is_active = 1 ORDER BY name"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Product::from).collect())
    }

    pub async fn list_locations(&self) -> StoreResult<Vec<Location>> {
        let rows = sqlx::query_as::<_, LocationRow>(
            "SELECT id, name, code, location_type, address, is_active, updated_at \
             FROM locations ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Location::from).collect())
    }

    /// Scanner lookup by SKU or barcode.
    pub async fn find_product(&self, code: &str) -> StoreResult<Option<Product>> {
        let code = code.trim();
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products \
             WHERE is_active = 1 AND (sku = ? OR barcode = ?) LIMIT 1"
        ))
        .bind(code)
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Product::from))
    }

    async fn product(&self, product_id: u64) -> StoreResult<Product> {
        sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?"
        ))
        .bind(product_id as i64)
        .fetch_optional(&self.pool)
        .await?
        .map(Product::from)
        .ok_or_else(|| ApiError::not_found(&format!("Product {product_id}")).into())
    }

    async fn insert_record<T: LocalRecord>(
        &self,
        conn: &mut sqlx::SqliteConnection,
        record: &T,
    ) -> StoreResult<()> {
        sqlx::query(&format!(
            "INSERT INTO {} (uuid, payload, sync_status, created_at) VALUES (?, ?, 'pending', ?)",
            table(T::KIND)
        ))
        .bind(record.local_id())
        .bind(serde_json::to_string(record)?)
        .bind(record.created_at())
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    async fn adjust_stock(
        conn: &mut sqlx::SqliteConnection,
        product_id: u64,
        delta: i64,
    ) -> StoreResult<()> {
        sqlx::query("UPDATE products SET stock_quantity = stock_quantity + ? WHERE id = ?")
            .bind(delta)
            .bind(product_id as i64)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// Rings a sale up against the cached catalog and keeps it pending.
    ///
    /// Stock is allowed to go negative: the goods already left the shop.
    pub async fn record_sale(&self, sale: NewSale, vat_rate: f64) -> StoreResult<SyncSale> {
        let mut lines = Vec::with_capacity(sale.lines.len());
        for line in &sale.lines {
            let product = self.product(line.product_id).await?;
            lines.push(CartLine::priced(&product, line.quantity, line.discount));
        }
        let quote = quote(&lines, vat_rate)?;
        let settlement = settle(sale.payment_method, quote.total, sale.tendered)?;

        let now = Local::now();
        let record = build_sale(
            SaleHeader {
                pos_transaction_id: Uuid::new_v4().to_string(),
                receipt_number: receipt_number(now.timestamp_millis()),
                location_id: self.location_id,
                customer_id: sale.customer_id,
                staff_id: sale.staff_id,
                staff_name: sale.staff_name,
                payment_method: sale.payment_method,
                notes: sale.notes,
                created_at: now.naive_local(),
            },
            &quote,
            settlement,
        );

        let mut tx = self.pool.begin().await?;
        self.insert_record(&mut tx, &record).await?;
        for item in &record.items {
            Self::adjust_stock(&mut tx, item.product_id, -item.quantity).await?;
        }
        tx.commit().await?;

        for line in &lines {
            if let Ok(p) = self.product(line.product_id).await
                && p.stock_quantity < 0
            {
                warn!(sku = %p.sku, stock = p.stock_quantity, "Offline sale took stock below zero");
            }
        }

        debug!(receipt = %record.receipt_number, total = record.total_amount, "Offline sale recorded");
        Ok(record)
    }

    /// Records a movement and applies whatever part of it touches this till.
    pub async fn record_movement(&self, m: NewLocalMovement) -> StoreResult<SyncMovement> {
        if m.movement_type == MovementType::Sale {
            return Err(ApiError::validation("Sales are recorded through checkout").into());
        }
        let deltas = movement_deltas(m.movement_type, m.from_location_id, m.to_location_id, m.quantity)?;
        self.product(m.product_id).await?;

        let record = SyncMovement {
            uuid: Uuid::new_v4().to_string(),
            product_id: m.product_id,
            movement_type: m.movement_type,
            from_location_id: m.from_location_id,
            to_location_id: m.to_location_id,
            quantity: m.quantity,
            unit_cost: m.unit_cost,
            reference: m.reference,
            reason: m.reason,
            created_at: Local::now().naive_local(),
        };

        let mut tx = self.pool.begin().await?;
        self.insert_record(&mut tx, &record).await?;
        for (location_id, delta) in deltas {
            if location_id == self.location_id {
                Self::adjust_stock(&mut tx, record.product_id, delta).await?;
            }
        }
        tx.commit().await?;
        Ok(record)
    }

    /// Requests stock from this till to another location. The server
    /// creates it pending, so local stock only moves once it is dispatched
    /// and pulled back.
    pub async fn record_transfer(
        &self,
        to_location_id: u64,
        items: Vec<SyncTransferItem>,
        notes: String,
    ) -> StoreResult<SyncTransfer> {
        if to_location_id == self.location_id {
            return Err(ApiError::validation("Source and destination locations must differ").into());
        }
        if items.is_empty() || items.iter().any(|i| i.quantity <= 0) {
            return Err(ApiError::validation("Transfer needs items with positive quantities").into());
        }

        let record = SyncTransfer {
            uuid: Uuid::new_v4().to_string(),
            from_location_id: self.location_id,
            to_location_id,
            notes,
            created_at: Local::now().naive_local(),
            items,
        };
        let mut conn = self.pool.acquire().await?;
        self.insert_record(&mut conn, &record).await?;
        Ok(record)
    }

    /// Counts shelves against the cache and sets local stock to what was
    /// counted. `counts` is `(product_id, physical_quantity)`.
    pub async fn record_stock_take(
        &self,
        counts: &[(u64, i64)],
        notes: String,
    ) -> StoreResult<SyncStockTake> {
        if counts.is_empty() {
            return Err(ApiError::validation("Stock take needs at least one count").into());
        }
        let counts = merge_counts(counts)?;
        let mut items = Vec::with_capacity(counts.len());
        for (product_id, physical) in counts {
            let product = self.product(product_id).await?;
            items.push(SyncStockTakeItem {
                product_id,
                system_quantity: product.stock_quantity,
                physical_quantity: physical,
                unit_cost: product.cost_price,
            });
        }

        let record = SyncStockTake {
            uuid: Uuid::new_v4().to_string(),
            location_id: self.location_id,
            notes,
            created_at: Local::now().naive_local(),
            items,
        };

        let mut tx = self.pool.begin().await?;
        self.insert_record(&mut tx, &record).await?;
        for item in &record.items {
            sqlx::query("UPDATE products SET stock_quantity = ? WHERE id = ?")
                .bind(item.physical_quantity)
                .bind(item.product_id as i64)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(record)
    }

    /// Pending records of one kind, oldest first.
    pub async fn pending<T: LocalRecord>(&self) -> StoreResult<Vec<T>> {
        let payloads: Vec<(String,)> = sqlx::query_as(&format!(
            "SELECT payload FROM {} WHERE sync_status = 'pending' ORDER BY seq",
            table(T::KIND)
        ))
        .fetch_all(&self.pool)
        .await?;
        payloads
            .into_iter()
            .map(|(payload,)| Ok(serde_json::from_str(&payload)?))
            .collect()
    }

    pub async fn pending_sales(&self) -> StoreResult<Vec<SyncSale>> {
        self.pending().await
    }

    pub async fn pending_movements(&self) -> StoreResult<Vec<SyncMovement>> {
        self.pending().await
    }

    pub async fn pending_transfers(&self) -> StoreResult<Vec<SyncTransfer>> {
        self.pending().await
    }

    pub async fn pending_stock_takes(&self) -> StoreResult<Vec<SyncStockTake>> {
        self.pending().await
    }

    pub async fn count_by_status(&self, kind: SyncKind, status: LocalStatus) -> StoreResult<i64> {
        Ok(sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM {} WHERE sync_status = ?",
            table(kind)
        ))
        .bind(status.as_ref())
        .fetch_one(&self.pool)
        .await?)
    }

    pub async fn mark_synced(&self, kind: SyncKind, ids: &[String]) -> StoreResult<u64> {
        let mut tx = self.pool.begin().await?;
        let mut updated = 0;
        for id in ids {
            updated += sqlx::query(&format!(
                "UPDATE {} SET sync_status = 'synced', sync_error = NULL WHERE uuid = ?",
                table(kind)
            ))
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }
        tx.commit().await?;
        Ok(updated)
    }

    pub async fn mark_failed(&self, kind: SyncKind, id: &str, error: &str) -> StoreResult<()> {
        sqlx::query(&format!(
            "UPDATE {} SET sync_status = 'failed', sync_error = ? WHERE uuid = ?",
            table(kind)
        ))
        .bind(error)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Failed records go back to pending, e.g. after a product was fixed
    /// upstream.
    pub async fn retry_failed(&self, kind: SyncKind) -> StoreResult<u64> {
        Ok(sqlx::query(&format!(
            "UPDATE {} SET sync_status = 'pending', sync_error = NULL WHERE sync_status = 'failed'",
            table(kind)
        ))
        .execute(&self.pool)
        .await?
        .rows_affected())
    }

    pub async fn last_pull_at(&self) -> StoreResult<Option<DateTime<Utc>>> {
        let value: Option<(String,)> =
            sqlx::query_as("SELECT value FROM sync_state WHERE key = 'last_pull_at'")
                .fetch_optional(&self.pool)
                .await?;
        Ok(value.and_then(|(v,)| DateTime::parse_from_rfc3339(&v).ok().map(|t| t.with_timezone(&Utc))))
    }

    pub async fn set_last_pull_at(&self, at: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO sync_state (key, value) VALUES ('last_pull_at', ?) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Stock this till has taken or added that the server has not seen yet,
    /// per product.
    async fn pending_deltas(&self) -> StoreResult<HashMap<u64, i64>> {
        let mut deltas: HashMap<u64, i64> = HashMap::new();
        for sale in self.pending_sales().await? {
            for item in sale.items {
                *deltas.entry(item.product_id).or_default() -= item.quantity;
            }
        }
        for m in self.pending_movements().await? {
            let Ok(moves) = movement_deltas(m.movement_type, m.from_location_id, m.to_location_id, m.quantity)
            else {
                continue;
            };
            for (location_id, delta) in moves {
                if location_id == self.location_id {
                    *deltas.entry(m.product_id).or_default() += delta;
                }
            }
        }
        Ok(deltas)
    }

    /// Every cached sale, synced or not, rung up within `range`.
    pub async fn sales_in(&self, range: &DateRange) -> StoreResult<Vec<SyncSale>> {
        let from = range.from.and_hms_opt(0, 0, 0).unwrap_or_default();
        let to = range
            .to
            .succ_opt()
            .unwrap_or(NaiveDate::MAX)
            .and_hms_opt(0, 0, 0)
            .unwrap_or_default();
        let payloads: Vec<(String,)> = sqlx::query_as(
            "SELECT payload FROM sales WHERE created_at >= ? AND created_at < ? ORDER BY seq",
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        payloads
            .into_iter()
            .map(|(payload,)| Ok(serde_json::from_str(&payload)?))
            .collect()
    }

    /// Till-side daily figures, available without the server.
    pub async fn sales_summary(&self, range: &DateRange) -> StoreResult<SalesSummary> {
        Ok(sales_summary(&self.sales_in(range).await?))
    }

    pub async fn payment_breakdown(&self, range: &DateRange) -> StoreResult<Vec<PaymentMethodRow>> {
        Ok(payment_methods(&self.sales_in(range).await?))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn product(id: u64, sku: &str, price: f64, stock: i64) -> Product {
        Product {
            id,
            sku: sku.into(),
            name: format!("Product {sku}"),
            description: String::new(),
            category: "Beverages".into(),
            barcode: Some(format!("600{id}")),
            cost_price: price / 2.0,
            selling_price: price,
            taxable: true,
            reorder_level: 5,
            is_active: true,
            stock_quantity: stock,
            updated_at: Utc::now(),
        }
    }

    pub(crate) async fn seeded_store() -> LocalStore {
        let store = LocalStore::open("sqlite::memory:", 1).await.unwrap();
        store
            .upsert_products(&[product(1, "COLA", 10.0, 20), product(2, "BREAD", 20.0, 5)])
            .await
            .unwrap();
        store
    }

    pub(crate) fn cash_sale(lines: Vec<TillLine>, tendered: f64) -> NewSale {
        NewSale {
            staff_id: 5,
            staff_name: "mary".into(),
            customer_id: None,
            payment_method: PaymentMethod::Cash,
            tendered: Some(tendered),
            notes: String::new(),
            lines,
        }
    }

    fn line(product_id: u64, quantity: i64) -> TillLine {
        TillLine { product_id, quantity, discount: 0.0 }
    }

    #[tokio::test]
    async fn lookup_by_sku_or_barcode() {
        let store = seeded_store().await;
        assert_eq!(store.find_product("COLA").await.unwrap().unwrap().id, 1);
        assert_eq!(store.find_product("6002").await.unwrap().unwrap().id, 2);
        assert!(store.find_product("NOPE").await.unwrap().is_none());
        assert_eq!(store.list_products().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn sale_is_pending_and_takes_local_stock() {
        let store = seeded_store().await;
        let sale = store
            .record_sale(cash_sale(vec![line(1, 3)], 50.0), 0.165)
            .await
            .unwrap();

        assert_eq!(sale.subtotal, 30.0);
        assert_eq!(sale.tax_amount, 4.95);
        assert_eq!(sale.total_amount, 34.95);
        assert_eq!(sale.change_amount, 15.05);
        assert_eq!(sale.location_id, 1);

        let pending = store.pending_sales().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].pos_transaction_id, sale.pos_transaction_id);
        assert_eq!(pending[0].items.len(), 1);
        assert_eq!(store.find_product("COLA").await.unwrap().unwrap().stock_quantity, 17);

        store
            .mark_synced(SyncKind::Sale, &[sale.pos_transaction_id.clone()])
            .await
            .unwrap();
        assert!(store.pending_sales().await.unwrap().is_empty());
        assert_eq!(
            store.count_by_status(SyncKind::Sale, LocalStatus::Synced).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn short_cash_is_refused_and_nothing_is_kept() {
        let store = seeded_store().await;
        let err = store
            .record_sale(cash_sale(vec![line(2, 1)], 5.0), 0.165)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Invalid(ApiError::Validation(_))));
        assert!(store.pending_sales().await.unwrap().is_empty());
        assert_eq!(store.find_product("BREAD").await.unwrap().unwrap().stock_quantity, 5);
    }

    #[tokio::test]
    async fn pull_reapplies_pending_sales() {
        let store = seeded_store().await;
        store
            .record_sale(cash_sale(vec![line(1, 4)], 100.0), 0.165)
            .await
            .unwrap();

        // Server has not seen the sale yet and still reports 20
        store.upsert_products(&[product(1, "COLA", 12.0, 20)]).await.unwrap();
        let cola = store.find_product("COLA").await.unwrap().unwrap();
        assert_eq!(cola.stock_quantity, 16);
        assert_eq!(cola.selling_price, 12.0);
    }

    #[tokio::test]
    async fn failed_records_carry_the_error() {
        let store = seeded_store().await;
        let movement = store
            .record_movement(NewLocalMovement {
                product_id: 2,
                movement_type: MovementType::StockIn,
                from_location_id: None,
                to_location_id: Some(1),
                quantity: 10,
                unit_cost: 8.0,
                reference: "GRN-7".into(),
                reason: String::new(),
            })
            .await
            .unwrap();
        assert_eq!(store.find_product("BREAD").await.unwrap().unwrap().stock_quantity, 15);

        store
            .mark_failed(SyncKind::Movement, &movement.uuid, "Product 2 not found")
            .await
            .unwrap();
        assert!(store.pending_movements().await.unwrap().is_empty());
        assert_eq!(store.retry_failed(SyncKind::Movement).await.unwrap(), 1);
        assert_eq!(store.pending_movements().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn stock_take_snapshots_cached_quantity() {
        let store = seeded_store().await;
        let take = store.record_stock_take(&[(2, 3)], String::new()).await.unwrap();
        assert_eq!(take.items[0].system_quantity, 5);
        assert_eq!(take.items[0].physical_quantity, 3);
        assert_eq!(store.find_product("BREAD").await.unwrap().unwrap().stock_quantity, 3);
    }

    #[tokio::test]
    async fn stock_take_sums_a_product_counted_twice() {
        let store = seeded_store().await;
        let take = store
            .record_stock_take(&[(2, 3), (1, 18), (2, 4)], String::new())
            .await
            .unwrap();
        assert_eq!(take.items.len(), 2);
        let bread = take.items.iter().find(|i| i.product_id == 2).unwrap();
        assert_eq!(bread.physical_quantity, 7);
        assert_eq!(store.find_product("BREAD").await.unwrap().unwrap().stock_quantity, 7);
    }

    #[tokio::test]
    async fn last_pull_round_trips() {
        let store = seeded_store().await;
        assert!(store.last_pull_at().await.unwrap().is_none());
        let at = DateTime::parse_from_rfc3339("2026-03-01T10:00:00Z").unwrap().with_timezone(&Utc);
        store.set_last_pull_at(at).await.unwrap();
        assert_eq!(store.last_pull_at().await.unwrap(), Some(at));
    }

    #[tokio::test]
    async fn local_summary_counts_todays_sales() {
        let store = seeded_store().await;
        store
            .record_sale(cash_sale(vec![line(1, 1)], 20.0), 0.165)
            .await
            .unwrap();
        let today = Local::now().date_naive();
        let summary = store
            .sales_summary(&DateRange { from: today, to: today })
            .await
            .unwrap();
        assert_eq!(summary.transaction_count, 1);
    }
}
