//! General ledger writes. Like `stock_db`, everything runs on the caller's
//! connection so postings commit or roll back with the business record.

use chrono::NaiveDate;
use sqlx::MySqlConnection;
use tracing::debug;

use crate::error::ApiResult;
use crate::model::sync::SyncSale;
use crate::service::accounting::{
    CASH_ACCOUNT_CODE, JournalLineInput, SALES_REVENUE_CODE, balance_lines, sale_lines,
};

pub struct NewEntry<'a> {
    pub entry_date: NaiveDate,
    pub description: &'a str,
    pub reference: &'a str,
    pub location_id: Option<u64>,
    pub created_by: Option<u64>,
}

/// Writes a balanced entry with its lines. Unknown accounts fail on the
/// foreign key and come back as validation errors.
pub async fn insert_entry(
    conn: &mut MySqlConnection,
    entry: &NewEntry<'_>,
    lines: &[JournalLineInput],
) -> ApiResult<u64> {
    balance_lines(lines)?;

    let result = sqlx::query(
        r#"
        INSERT INTO journal_entries (entry_date, description, reference, location_id, created_by)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(entry.entry_date)
    .bind(entry.description)
    .bind(entry.reference)
    .bind(entry.location_id)
    .bind(entry.created_by)
    .execute(&mut *conn)
    .await?;
    let entry_id = result.last_insert_id();

    for line in lines {
        sqlx::query(
            "INSERT INTO ledger_lines (entry_id, account_id, debit, credit) VALUES (?, ?, ?, ?)",
        )
        .bind(entry_id)
        .bind(line.account_id)
        .bind(line.debit)
        .bind(line.credit)
        .execute(&mut *conn)
        .await?;
    }

    Ok(entry_id)
}

pub async fn account_id_by_code(
    conn: &mut MySqlConnection,
    code: &str,
) -> Result<Option<u64>, sqlx::Error> {
    sqlx::query_scalar::<_, u64>("SELECT id FROM accounts WHERE code = ?")
        .bind(code)
        .fetch_optional(&mut *conn)
        .await
}

/// Posts a sale to the ledger. Skipped until the cash and revenue accounts
/// exist.
pub async fn post_sale(
    conn: &mut MySqlConnection,
    sale: &SyncSale,
    created_by: Option<u64>,
) -> ApiResult<Option<u64>> {
    let cash = account_id_by_code(conn, CASH_ACCOUNT_CODE).await?;
    let revenue = account_id_by_code(conn, SALES_REVENUE_CODE).await?;
    let (Some(cash), Some(revenue)) = (cash, revenue) else {
        debug!(receipt = %sale.receipt_number, "No chart of accounts, sale not posted");
        return Ok(None);
    };
    if sale.total_amount <= 0.0 {
        return Ok(None);
    }

    let description = format!("Sale {}", sale.receipt_number);
    let entry_id = insert_entry(
        conn,
        &NewEntry {
            entry_date: sale.created_at.date(),
            description: &description,
            reference: &sale.receipt_number,
            location_id: Some(sale.location_id),
            created_by,
        },
        &sale_lines(cash, revenue, sale.total_amount),
    )
    .await?;
    Ok(Some(entry_id))
}
