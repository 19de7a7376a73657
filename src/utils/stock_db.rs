//! Stock ledger writes shared by checkout, movements, transfers, stock takes
//! and till sync. Every function runs on the caller's connection so it can
//! take part in the caller's transaction.

use chrono::NaiveDateTime;
use sqlx::MySqlConnection;
use tracing::warn;

use crate::error::{ApiError, ApiResult};
use crate::model::stock::MovementType;
use crate::model::sync::SyncSale;
use crate::service::inventory::movement_deltas;
use crate::service::round2;
use crate::utils::ledger_db::post_sale;

/// Quantity at a location, row-locked for the rest of the transaction.
pub async fn locked_quantity(
    conn: &mut MySqlConnection,
    location_id: u64,
    product_id: u64,
) -> Result<i64, sqlx::Error> {
    let qty = sqlx::query_scalar::<_, i64>(
        "SELECT quantity FROM location_stock WHERE location_id = ? AND product_id = ? FOR UPDATE",
    )
    .bind(location_id)
    .bind(product_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(qty.unwrap_or(0))
}

pub async fn add_stock(
    conn: &mut MySqlConnection,
    location_id: u64,
    product_id: u64,
    delta: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO location_stock (location_id, product_id, quantity)
        VALUES (?, ?, ?)
        ON DUPLICATE KEY UPDATE quantity = quantity + VALUES(quantity)
        "#,
    )
    .bind(location_id)
    .bind(product_id)
    .bind(delta)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn set_stock(
    conn: &mut MySqlConnection,
    location_id: u64,
    product_id: u64,
    quantity: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO location_stock (location_id, product_id, quantity)
        VALUES (?, ?, ?)
        ON DUPLICATE KEY UPDATE quantity = VALUES(quantity)
        "#,
    )
    .bind(location_id)
    .bind(product_id)
    .bind(quantity)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Takes `quantity` out of a location, failing when it would go negative.
pub async fn remove_stock(
    conn: &mut MySqlConnection,
    location_id: u64,
    product_id: u64,
    quantity: i64,
    label: &str,
) -> ApiResult<()> {
    let available = locked_quantity(conn, location_id, product_id).await?;
    if available < quantity {
        return Err(ApiError::conflict(format!(
            "Insufficient stock for {label}: {available} available, {quantity} requested"
        )));
    }
    add_stock(conn, location_id, product_id, -quantity).await?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct NewMovement<'a> {
    pub uuid: Option<&'a str>,
    pub product_id: u64,
    pub movement_type: MovementType,
    pub from_location_id: Option<u64>,
    pub to_location_id: Option<u64>,
    pub quantity: i64,
    pub unit_cost: f64,
    pub reference: &'a str,
    pub reason: &'a str,
    pub created_by: Option<u64>,
    pub created_at: NaiveDateTime,
}

/// Writes the movement row only; stock is the caller's business.
pub async fn record_movement(
    conn: &mut MySqlConnection,
    m: &NewMovement<'_>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO stock_movements
        (uuid, product_id, movement_type, from_location_id, to_location_id,
         quantity, unit_cost, total_value, reference, reason, created_by, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(m.uuid)
    .bind(m.product_id)
    .bind(m.movement_type.as_ref())
    .bind(m.from_location_id)
    .bind(m.to_location_id)
    .bind(m.quantity)
    .bind(m.unit_cost)
    .bind(round2(m.quantity as f64 * m.unit_cost))
    .bind(m.reference)
    .bind(m.reason)
    .bind(m.created_by)
    .bind(m.created_at)
    .execute(&mut *conn)
    .await?;
    Ok(result.last_insert_id())
}

/// Validates a movement, applies its stock deltas and records it.
pub async fn apply_movement(
    conn: &mut MySqlConnection,
    m: &NewMovement<'_>,
    allow_negative: bool,
) -> ApiResult<u64> {
    let deltas = movement_deltas(m.movement_type, m.from_location_id, m.to_location_id, m.quantity)?;
    for (location_id, delta) in deltas {
        if delta < 0 && !allow_negative {
            let label = format!("product {} at location {}", m.product_id, location_id);
            remove_stock(conn, location_id, m.product_id, -delta, &label).await?;
        } else {
            add_stock(conn, location_id, m.product_id, delta).await?;
        }
    }
    Ok(record_movement(conn, m).await?)
}

/// Inserts a sale with its items, takes the stock, records one `sale`
/// movement per line and posts the total to the ledger.
///
/// With `allow_negative` (till sync) shortfalls are logged, not refused: the
/// goods already left the shop.
pub async fn insert_sale(
    conn: &mut MySqlConnection,
    sale: &SyncSale,
    created_by: Option<u64>,
    allow_negative: bool,
) -> ApiResult<u64> {
    let result = sqlx::query(
        r#"
        INSERT INTO sales
        (receipt_number, pos_transaction_id, location_id, customer_id, staff_id, staff_name,
         subtotal, discount_amount, tax_amount, total_amount, paid_amount, change_amount,
         payment_method, status, notes, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'completed', ?, ?)
        "#,
    )
    .bind(&sale.receipt_number)
    .bind(&sale.pos_transaction_id)
    .bind(sale.location_id)
    .bind(sale.customer_id)
    .bind(sale.staff_id)
    .bind(&sale.staff_name)
    .bind(sale.subtotal)
    .bind(sale.discount_amount)
    .bind(sale.tax_amount)
    .bind(sale.total_amount)
    .bind(sale.paid_amount)
    .bind(sale.change_amount)
    .bind(sale.payment_method.as_ref())
    .bind(&sale.notes)
    .bind(sale.created_at)
    .execute(&mut *conn)
    .await?;

    let sale_id = result.last_insert_id();

    for item in &sale.items {
        if item.quantity <= 0 {
            return Err(ApiError::validation(format!(
                "Quantity for {} must be greater than zero",
                item.sku
            )));
        }

        sqlx::query(
            r#"
            INSERT INTO sale_items
            (sale_id, product_id, product_name, sku, category, quantity, unit_price,
             cost_price, discount_amount, tax_amount, total_price)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(sale_id)
        .bind(item.product_id)
        .bind(&item.product_name)
        .bind(&item.sku)
        .bind(&item.category)
        .bind(item.quantity)
        .bind(item.unit_price)
        .bind(item.cost_price)
        .bind(item.discount_amount)
        .bind(item.tax_amount)
        .bind(item.total_price)
        .execute(&mut *conn)
        .await?;

        let available = locked_quantity(conn, sale.location_id, item.product_id).await?;
        if available < item.quantity {
            if !allow_negative {
                return Err(ApiError::conflict(format!(
                    "Insufficient stock for SKU {}",
                    item.sku
                )));
            }
            warn!(
                sku = %item.sku,
                location_id = sale.location_id,
                available,
                sold = item.quantity,
                "Synced sale takes stock negative"
            );
        }
        add_stock(conn, sale.location_id, item.product_id, -item.quantity).await?;

        record_movement(
            conn,
            &NewMovement {
                uuid: None,
                product_id: item.product_id,
                movement_type: MovementType::Sale,
                from_location_id: Some(sale.location_id),
                to_location_id: None,
                quantity: item.quantity,
                unit_cost: item.cost_price,
                reference: &sale.receipt_number,
                reason: "",
                created_by,
                created_at: sale.created_at,
            },
        )
        .await?;
    }

    post_sale(conn, sale, created_by).await?;
    Ok(sale_id)
}
