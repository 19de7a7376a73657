use std::collections::HashMap;

use actix_web::{HttpResponse, web};
use chrono::{Local, NaiveDate};
use serde::Deserialize;
use serde_json::json;
use sqlx::{MySqlConnection, MySqlPool};
use tracing::info;
use utoipa::{IntoParams, ToSchema};

use crate::{
    auth::auth::AuthUser,
    error::{ApiError, ApiResult},
    model::accounting::{
        Account, AccountType, Industry, JournalEntry, JournalEntryWithLines, LedgerLine,
    },
    service::accounting::{
        AccountTotals, JournalLineInput, TrialBalance, balance_lines, chart_template,
        creates_cycle, trial_balance,
    },
    utils::{
        db_utils::{PageRequest, SqlFilter, fetch_page},
        ledger_db::{NewEntry, insert_entry},
    },
};

const ACCOUNT_COLUMNS: &str = "id, code, name, account_type, parent_id";
const ENTRY_COLUMNS: &str =
    "id, entry_date, description, reference, location_id, created_by, created_at";

#[derive(Deserialize, ToSchema)]
pub struct CreateAccount {
    #[schema(example = "1100")]
    pub code: String,
    #[schema(example = "Mobile Money")]
    pub name: String,
    pub account_type: AccountType,
    pub parent_id: Option<u64>,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateAccount {
    pub name: Option<String>,
    pub parent_id: Option<u64>,
}

#[derive(Deserialize, ToSchema)]
pub struct SetupChart {
    pub industry: Industry,
}

#[derive(Deserialize, IntoParams)]
pub struct AccountQuery {
    pub account_type: Option<AccountType>,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateJournalEntry {
    #[schema(value_type = Option<String>, format = "date")]
    pub entry_date: Option<NaiveDate>,
    pub description: String,
    #[serde(default)]
    pub reference: String,
    pub location_id: Option<u64>,
    pub lines: Vec<JournalLineInput>,
}

#[derive(Deserialize, IntoParams)]
pub struct EntryQuery {
    #[param(value_type = Option<String>, format = "date")]
    pub from: Option<NaiveDate>,
    #[param(value_type = Option<String>, format = "date")]
    pub to: Option<NaiveDate>,
    pub account_id: Option<u64>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl EntryQuery {
    fn to_filter(&self) -> SqlFilter {
        let mut filter = SqlFilter::new();
        filter.and_between("entry_date", self.from, self.to);
        if let Some(account_id) = self.account_id {
            filter.and(
                "id IN (SELECT entry_id FROM ledger_lines WHERE account_id = ?)",
                account_id,
            );
        }
        filter
    }
}

async fn fetch_account(conn: &mut MySqlConnection, account_id: u64) -> ApiResult<Account> {
    sqlx::query_as::<_, Account>(&format!(
        "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?"
    ))
    .bind(account_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| ApiError::not_found("Account"))
}

#[utoipa::path(
    post,
    path = "/api/accounting/accounts",
    request_body = CreateAccount,
    responses(
        (status = 201, description = "Account created", body = Object, example = json!({
            "message": "Account created", "id": 5
        })),
        (status = 409, description = "Account code already exists")
    ),
    security(("bearer_auth" = [])),
    tag = "Accounting"
)]
pub async fn create_account(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateAccount>,
) -> ApiResult<HttpResponse> {
    auth.require_manager()?;

    let code = payload.code.trim();
    if code.is_empty() || payload.name.trim().is_empty() {
        return Err(ApiError::validation("Account code and name are required"));
    }

    let result = sqlx::query(
        "INSERT INTO accounts (code, name, account_type, parent_id) VALUES (?, ?, ?, ?)",
    )
    .bind(code)
    .bind(payload.name.trim())
    .bind(payload.account_type.as_ref())
    .bind(payload.parent_id)
    .execute(pool.get_ref())
    .await
    .map_err(|e| match ApiError::from(e) {
        ApiError::Conflict(_) => ApiError::conflict("Account code already exists"),
        other => other,
    })?;

    info!(code, "Account created");
    Ok(HttpResponse::Created().json(json!({
        "message": "Account created",
        "id": result.last_insert_id()
    })))
}

#[utoipa::path(
    get,
    path = "/api/accounting/accounts",
    params(AccountQuery),
    responses((status = 200, description = "Chart of accounts by code", body = [Account])),
    security(("bearer_auth" = [])),
    tag = "Accounting"
)]
pub async fn list_accounts(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<AccountQuery>,
) -> ApiResult<HttpResponse> {
    auth.require_manager()?;

    let accounts = match query.account_type {
        Some(t) => {
            sqlx::query_as::<_, Account>(&format!(
                "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE account_type = ? ORDER BY code"
            ))
            .bind(t.as_ref())
            .fetch_all(pool.get_ref())
            .await?
        }
        None => {
            sqlx::query_as::<_, Account>(&format!(
                "SELECT {ACCOUNT_COLUMNS} FROM accounts ORDER BY code"
            ))
            .fetch_all(pool.get_ref())
            .await?
        }
    };

    Ok(HttpResponse::Ok().json(accounts))
}

#[utoipa::path(
    get,
    path = "/api/accounting/accounts/{account_id}",
    params(("account_id" = u64, Path, description = "Account ID")),
    responses(
        (status = 200, description = "Account", body = Account),
        (status = 404, description = "Account not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Accounting"
)]
pub async fn get_account(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_manager()?;
    let mut conn = pool.acquire().await?;
    Ok(HttpResponse::Ok().json(fetch_account(&mut conn, path.into_inner()).await?))
}

/// Renames an account or moves it under another parent. Codes and types are
/// fixed once lines may point at them.
#[utoipa::path(
    put,
    path = "/api/accounting/accounts/{account_id}",
    params(("account_id" = u64, Path, description = "Account ID")),
    request_body = UpdateAccount,
    responses(
        (status = 200, description = "Account updated"),
        (status = 400, description = "Parent would create a loop")
    ),
    security(("bearer_auth" = [])),
    tag = "Accounting"
)]
pub async fn update_account(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<UpdateAccount>,
) -> ApiResult<HttpResponse> {
    auth.require_manager()?;
    let account_id = path.into_inner();

    let mut tx = pool.begin().await?;
    let account = fetch_account(&mut *tx, account_id).await?;

    let name = match payload.name.as_deref().map(str::trim) {
        Some("") => return Err(ApiError::validation("Account name cannot be empty")),
        Some(name) => name.to_string(),
        None => account.name,
    };

    if let Some(parent_id) = payload.parent_id {
        let parents: HashMap<u64, Option<u64>> =
            sqlx::query_as::<_, (u64, Option<u64>)>("SELECT id, parent_id FROM accounts")
                .fetch_all(&mut *tx)
                .await?
                .into_iter()
                .collect();
        if !parents.contains_key(&parent_id) {
            return Err(ApiError::not_found("Parent account"));
        }
        if creates_cycle(account_id, parent_id, &parents) {
            return Err(ApiError::validation("An account cannot sit under itself"));
        }
    }

    sqlx::query("UPDATE accounts SET name = ?, parent_id = ? WHERE id = ?")
        .bind(&name)
        .bind(payload.parent_id.or(account.parent_id))
        .bind(account_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    Ok(HttpResponse::Ok().json(json!({ "message": "Account updated" })))
}

/// Seeds the starter chart for an industry. Codes that already exist are left
/// alone, so the call can be repeated.
#[utoipa::path(
    post,
    path = "/api/accounting/accounts/setup",
    request_body = SetupChart,
    responses((status = 200, description = "Chart seeded", body = Object, example = json!({
        "message": "Chart of accounts ready", "created": 4
    }))),
    security(("bearer_auth" = [])),
    tag = "Accounting"
)]
pub async fn setup_chart(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<SetupChart>,
) -> ApiResult<HttpResponse> {
    auth.require_admin()?;

    let mut tx = pool.begin().await?;
    let mut created = 0;
    for (code, name, account_type) in chart_template(payload.industry) {
        created += sqlx::query(
            "INSERT IGNORE INTO accounts (code, name, account_type) VALUES (?, ?, ?)",
        )
        .bind(*code)
        .bind(*name)
        .bind(account_type.as_ref())
        .execute(&mut *tx)
        .await?
        .rows_affected();
    }
    tx.commit().await?;

    info!(industry = %payload.industry, created, "Chart of accounts seeded");
    Ok(HttpResponse::Ok().json(json!({
        "message": "Chart of accounts ready",
        "created": created
    })))
}

#[utoipa::path(
    get,
    path = "/api/accounting/accounts/trial-balance",
    responses((status = 200, description = "Debit, credit and balance per account",
        body = TrialBalance)),
    security(("bearer_auth" = [])),
    tag = "Accounting"
)]
pub async fn get_trial_balance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
) -> ApiResult<HttpResponse> {
    auth.require_manager()?;

    let rows = sqlx::query_as::<_, (u64, String, String, String, f64, f64)>(
        r#"
        SELECT a.id, a.code, a.name, a.account_type,
               COALESCE(SUM(l.debit), 0),
               COALESCE(SUM(l.credit), 0)
        FROM accounts a
        LEFT JOIN ledger_lines l ON l.account_id = a.id
        GROUP BY a.id, a.code, a.name, a.account_type
        "#,
    )
    .fetch_all(pool.get_ref())
    .await?;

    let accounts = rows
        .into_iter()
        .map(|(account_id, code, name, account_type, debit, credit)| AccountTotals {
            account_id,
            code,
            name,
            account_type,
            debit,
            credit,
        })
        .collect();

    Ok(HttpResponse::Ok().json(trial_balance(accounts)))
}

#[utoipa::path(
    post,
    path = "/api/accounting/entries",
    request_body = CreateJournalEntry,
    responses(
        (status = 201, description = "Entry posted", body = Object, example = json!({
            "message": "Journal entry posted", "id": 12, "total": 250.0
        })),
        (status = 400, description = "Entry does not balance or names an unknown account")
    ),
    security(("bearer_auth" = [])),
    tag = "Accounting"
)]
pub async fn create_entry(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateJournalEntry>,
) -> ApiResult<HttpResponse> {
    auth.require_manager()?;

    let description = payload.description.trim();
    if description.is_empty() {
        return Err(ApiError::validation("Description is required"));
    }
    let total = balance_lines(&payload.lines)?;

    let mut tx = pool.begin().await?;
    let entry_id = insert_entry(
        &mut *tx,
        &NewEntry {
            entry_date: payload.entry_date.unwrap_or_else(|| Local::now().date_naive()),
            description,
            reference: payload.reference.trim(),
            location_id: payload.location_id,
            created_by: Some(auth.user_id),
        },
        &payload.lines,
    )
    .await?;
    tx.commit().await?;

    info!(entry_id, total, "Journal entry posted");
    Ok(HttpResponse::Created().json(json!({
        "message": "Journal entry posted",
        "id": entry_id,
        "total": total
    })))
}

#[utoipa::path(
    get,
    path = "/api/accounting/entries",
    params(EntryQuery),
    responses((status = 200, description = "Paginated journal entries, newest first")),
    security(("bearer_auth" = [])),
    tag = "Accounting"
)]
pub async fn list_entries(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<EntryQuery>,
) -> ApiResult<HttpResponse> {
    auth.require_manager()?;

    let page = fetch_page::<JournalEntry>(
        pool.get_ref(),
        ENTRY_COLUMNS,
        "FROM journal_entries",
        &query.to_filter(),
        "entry_date DESC, id DESC",
        PageRequest::new(query.page, query.per_page),
    )
    .await?;

    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    get,
    path = "/api/accounting/entries/{entry_id}",
    params(("entry_id" = u64, Path, description = "Journal entry ID")),
    responses(
        (status = 200, description = "Entry with its lines", body = JournalEntryWithLines),
        (status = 404, description = "Journal entry not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Accounting"
)]
pub async fn get_entry(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_manager()?;
    let entry_id = path.into_inner();

    let entry = sqlx::query_as::<_, JournalEntry>(&format!(
        "SELECT {ENTRY_COLUMNS} FROM journal_entries WHERE id = ?"
    ))
    .bind(entry_id)
    .fetch_optional(pool.get_ref())
    .await?
    .ok_or_else(|| ApiError::not_found("Journal entry"))?;

    let lines = sqlx::query_as::<_, LedgerLine>(
        "SELECT id, entry_id, account_id, debit, credit FROM ledger_lines WHERE entry_id = ? ORDER BY id",
    )
    .bind(entry_id)
    .fetch_all(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(JournalEntryWithLines { entry, lines }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_filter_by_account_uses_its_lines() {
        let query = EntryQuery {
            from: NaiveDate::from_ymd_opt(2026, 1, 1),
            to: None,
            account_id: Some(4),
            page: None,
            per_page: None,
        };
        let filter = query.to_filter();
        assert_eq!(
            filter.where_clause(),
            "WHERE entry_date >= ? AND id IN (SELECT entry_id FROM ledger_lines WHERE account_id = ?)"
        );
        assert_eq!(filter.values().len(), 2);
    }

    #[test]
    fn entry_lines_default_the_missing_side() {
        let payload: CreateJournalEntry = serde_json::from_value(json!({
            "description": "Owner top-up",
            "lines": [
                {"account_id": 1, "debit": 500.0},
                {"account_id": 7, "credit": 500.0}
            ]
        }))
        .unwrap();
        assert_eq!(payload.lines[0].credit, 0.0);
        assert_eq!(payload.lines[1].debit, 0.0);
        assert!(payload.reference.is_empty());
    }
}
