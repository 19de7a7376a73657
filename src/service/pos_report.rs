//! Till and stock aggregates behind the POS report pages and the dashboard.
//!
//! Aggregates work over [`SaleRecord`] so the server (over `sales` rows) and
//! the offline till (over its cached sales) compute identical figures.

use std::collections::{BTreeMap, HashMap};

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::{ApiError, ApiResult};
use crate::model::product::Product;
use crate::model::sale::{PaymentMethod, Sale, SaleItem, SaleStatus};
use crate::model::stock::StockMovement;
use crate::model::sync::SyncSale;
use crate::service::export::CsvRow;
use crate::service::{percentage, round2};

pub trait SaleRecord {
    fn total_amount(&self) -> f64;
    fn tax_amount(&self) -> f64;
    fn discount_amount(&self) -> f64;
    fn paid_amount(&self) -> f64;
    fn change_amount(&self) -> f64;
    fn payment_method(&self) -> &str;
    fn staff_name(&self) -> &str;
    fn status(&self) -> &str;
    fn created_at(&self) -> NaiveDateTime;

    /// Completed sales, including ones partially returned, count towards
    /// revenue.
    fn is_settled(&self) -> bool {
        self.status() == SaleStatus::Completed.as_ref()
            || self.status() == SaleStatus::PartialReturn.as_ref()
    }
}

impl SaleRecord for Sale {
    fn total_amount(&self) -> f64 {
        self.total_amount
    }
    fn tax_amount(&self) -> f64 {
        self.tax_amount
    }
    fn discount_amount(&self) -> f64 {
        self.discount_amount
    }
    fn paid_amount(&self) -> f64 {
        self.paid_amount
    }
    fn change_amount(&self) -> f64 {
        self.change_amount
    }
    fn payment_method(&self) -> &str {
        &self.payment_method
    }
    fn staff_name(&self) -> &str {
        &self.staff_name
    }
    fn status(&self) -> &str {
        &self.status
    }
    fn created_at(&self) -> NaiveDateTime {
        self.created_at
    }
}

/// Till sales are always completed when rung up.
impl SaleRecord for SyncSale {
    fn total_amount(&self) -> f64 {
        self.total_amount
    }
    fn tax_amount(&self) -> f64 {
        self.tax_amount
    }
    fn discount_amount(&self) -> f64 {
        self.discount_amount
    }
    fn paid_amount(&self) -> f64 {
        self.paid_amount
    }
    fn change_amount(&self) -> f64 {
        self.change_amount
    }
    fn payment_method(&self) -> &str {
        self.payment_method.as_ref()
    }
    fn staff_name(&self) -> &str {
        &self.staff_name
    }
    fn status(&self) -> &str {
        SaleStatus::Completed.as_ref()
    }
    fn created_at(&self) -> NaiveDateTime {
        self.created_at
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    Today,
    Week,
    Month,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct DateRange {
    #[schema(value_type = String, format = "date")]
    pub from: NaiveDate,
    #[schema(value_type = String, format = "date")]
    pub to: NaiveDate,
}

impl DateRange {
    pub fn contains(&self, at: NaiveDateTime) -> bool {
        let day = at.date();
        day >= self.from && day <= self.to
    }

    pub fn days(&self) -> i64 {
        (self.to - self.from).num_days() + 1
    }
}

/// An explicit `from`/`to` wins over `period`; with neither, today.
pub fn resolve_range(
    period: Option<Period>,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    today: NaiveDate,
) -> ApiResult<DateRange> {
    let range = match (from, to, period) {
        (Some(from), Some(to), _) => DateRange { from, to },
        (Some(from), None, _) => DateRange { from, to: today },
        (None, Some(to), _) => DateRange { from: to, to },
        (None, None, Some(Period::Week)) => DateRange { from: today - Duration::days(6), to: today },
        (None, None, Some(Period::Month)) => DateRange { from: today - Duration::days(29), to: today },
        (None, None, _) => DateRange { from: today, to: today },
    };
    if range.to < range.from {
        return Err(ApiError::validation("'from' must not be after 'to'"));
    }
    Ok(range)
}

/// Longest look-back window a report accepts, about ten years.
pub const MAX_LOOKBACK_DAYS: i64 = 3650;

/// Start of a window reaching `days` back from `now`.
pub fn lookback_start(now: NaiveDateTime, days: i64) -> ApiResult<NaiveDateTime> {
    if !(1..=MAX_LOOKBACK_DAYS).contains(&days) {
        return Err(ApiError::validation(format!(
            "days must be between 1 and {MAX_LOOKBACK_DAYS}"
        )));
    }
    now.checked_sub_signed(Duration::days(days))
        .ok_or_else(|| ApiError::validation("days reaches past the earliest date"))
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, ToSchema)]
pub struct SalesSummary {
    pub total_sales: f64,
    pub transaction_count: i64,
    pub average_transaction: f64,
    pub total_tax: f64,
    pub total_discount: f64,
    pub by_payment_method: BTreeMap<String, f64>,
}

pub fn sales_summary<S: SaleRecord>(sales: &[S]) -> SalesSummary {
    let settled: Vec<&S> = sales.iter().filter(|s| s.is_settled()).collect();
    let total: f64 = settled.iter().map(|s| s.total_amount()).sum();
    let count = settled.len() as i64;

    let mut by_payment_method = BTreeMap::new();
    for s in &settled {
        *by_payment_method
            .entry(s.payment_method().to_string())
            .or_insert(0.0) += s.total_amount();
    }
    for v in by_payment_method.values_mut() {
        *v = round2(*v);
    }

    SalesSummary {
        total_sales: round2(total),
        transaction_count: count,
        average_transaction: if count == 0 { 0.0 } else { round2(total / count as f64) },
        total_tax: round2(settled.iter().map(|s| s.tax_amount()).sum()),
        total_discount: round2(settled.iter().map(|s| s.discount_amount()).sum()),
        by_payment_method,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct PaymentMethodRow {
    pub method: String,
    pub count: i64,
    pub total: f64,
    pub share: f64,
}

/// Sorted by total, largest first.
pub fn payment_methods<S: SaleRecord>(sales: &[S]) -> Vec<PaymentMethodRow> {
    let mut groups: HashMap<&str, (i64, f64)> = HashMap::new();
    let mut grand = 0.0;
    for s in sales.iter().filter(|s| s.is_settled()) {
        let entry = groups.entry(s.payment_method()).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += s.total_amount();
        grand += s.total_amount();
    }

    let mut rows: Vec<PaymentMethodRow> = groups
        .into_iter()
        .map(|(method, (count, total))| PaymentMethodRow {
            method: method.to_string(),
            count,
            total: round2(total),
            share: percentage(total, grand),
        })
        .collect();
    rows.sort_by(|a, b| b.total.total_cmp(&a.total).then_with(|| a.method.cmp(&b.method)));
    rows
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct StaffSales {
    pub staff_name: String,
    pub transactions: i64,
    pub total: f64,
}

pub fn sales_by_staff<S: SaleRecord>(sales: &[S]) -> Vec<StaffSales> {
    let mut groups: HashMap<&str, (i64, f64)> = HashMap::new();
    for s in sales.iter().filter(|s| s.is_settled()) {
        let entry = groups.entry(s.staff_name()).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += s.total_amount();
    }
    let mut rows: Vec<StaffSales> = groups
        .into_iter()
        .map(|(staff_name, (transactions, total))| StaffSales {
            staff_name: staff_name.to_string(),
            transactions,
            total: round2(total),
        })
        .collect();
    rows.sort_by(|a, b| b.total.total_cmp(&a.total).then_with(|| a.staff_name.cmp(&b.staff_name)));
    rows
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct CategorySales {
    pub category: String,
    pub quantity: i64,
    pub total: f64,
}

pub fn sales_by_category(items: &[SaleItem]) -> Vec<CategorySales> {
    let mut groups: HashMap<&str, (i64, f64)> = HashMap::new();
    for item in items {
        let name = if item.category.is_empty() { "Uncategorised" } else { &item.category };
        let entry = groups.entry(name).or_insert((0, 0.0));
        entry.0 += item.quantity;
        entry.1 += item.total_price;
    }
    let mut rows: Vec<CategorySales> = groups
        .into_iter()
        .map(|(category, (quantity, total))| CategorySales {
            category: category.to_string(),
            quantity,
            total: round2(total),
        })
        .collect();
    rows.sort_by(|a, b| b.total.total_cmp(&a.total).then_with(|| a.category.cmp(&b.category)));
    rows
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct TopProduct {
    pub product_id: u64,
    pub sku: String,
    pub name: String,
    pub quantity: i64,
    pub revenue: f64,
}

pub fn top_products(items: &[SaleItem], limit: usize) -> Vec<TopProduct> {
    let mut groups: HashMap<u64, TopProduct> = HashMap::new();
    for item in items {
        let entry = groups.entry(item.product_id).or_insert_with(|| TopProduct {
            product_id: item.product_id,
            sku: item.sku.clone(),
            name: item.product_name.clone(),
            quantity: 0,
            revenue: 0.0,
        });
        entry.quantity += item.quantity;
        entry.revenue += item.total_price;
    }
    let mut rows: Vec<TopProduct> = groups
        .into_values()
        .map(|mut p| {
            p.revenue = round2(p.revenue);
            p
        })
        .collect();
    rows.sort_by(|a, b| b.quantity.cmp(&a.quantity).then_with(|| a.product_id.cmp(&b.product_id)));
    rows.truncate(limit);
    rows
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct SlowMover {
    pub product_id: u64,
    pub sku: String,
    pub name: String,
    pub stock_quantity: i64,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub last_sold_at: Option<NaiveDateTime>,
}

/// Active products not sold since `since`. `last_sold` maps product id to
/// its most recent sale, at any time.
pub fn slow_moving(
    products: &[Product],
    last_sold: &HashMap<u64, NaiveDateTime>,
    since: NaiveDateTime,
) -> Vec<SlowMover> {
    products
        .iter()
        .filter(|p| p.is_active)
        .filter(|p| last_sold.get(&p.id).is_none_or(|at| *at < since))
        .map(|p| SlowMover {
            product_id: p.id,
            sku: p.sku.clone(),
            name: p.name.clone(),
            stock_quantity: p.stock_quantity,
            last_sold_at: last_sold.get(&p.id).copied(),
        })
        .collect()
}

pub fn low_stock(products: &[Product]) -> Vec<Product> {
    products
        .iter()
        .filter(|p| p.is_active && p.is_low_stock())
        .cloned()
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum StockSort {
    #[default]
    Name,
    Quantity,
    Value,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StockLevels {
    pub product_count: i64,
    pub total_quantity: i64,
    /// At cost price
    pub total_value: f64,
    /// 0 < quantity <= reorder level
    pub low_stock_items: i64,
    pub out_of_stock: i64,
    pub items: Vec<Product>,
}

pub fn stock_levels(products: &[Product], category: Option<&str>, sort: StockSort) -> StockLevels {
    let mut items: Vec<Product> = products
        .iter()
        .filter(|p| category.is_none_or(|c| p.category.eq_ignore_ascii_case(c)))
        .cloned()
        .collect();

    let value = |p: &Product| p.stock_quantity as f64 * p.cost_price;
    match sort {
        StockSort::Name => items.sort_by(|a, b| a.name.cmp(&b.name)),
        StockSort::Quantity => items.sort_by(|a, b| b.stock_quantity.cmp(&a.stock_quantity)),
        StockSort::Value => items.sort_by(|a, b| value(b).total_cmp(&value(a))),
    }

    StockLevels {
        product_count: items.len() as i64,
        total_quantity: items.iter().map(|p| p.stock_quantity).sum(),
        total_value: round2(items.iter().map(value).sum()),
        low_stock_items: items
            .iter()
            .filter(|p| p.stock_quantity > 0 && p.stock_quantity <= p.reorder_level)
            .count() as i64,
        out_of_stock: items.iter().filter(|p| p.stock_quantity <= 0).count() as i64,
        items,
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, ToSchema)]
pub struct MovementTotals {
    pub total_in: i64,
    pub total_out: i64,
    pub net: i64,
}

/// Quantities moved into and out of `location`, or of any location.
pub fn movement_totals(movements: &[StockMovement], location: Option<u64>) -> MovementTotals {
    let matches = |side: Option<u64>| match (side, location) {
        (Some(_), None) => true,
        (Some(s), Some(l)) => s == l,
        (None, _) => false,
    };
    let total_in = movements
        .iter()
        .filter(|m| matches(m.to_location_id))
        .map(|m| m.quantity)
        .sum();
    let total_out = movements
        .iter()
        .filter(|m| matches(m.from_location_id))
        .map(|m| m.quantity)
        .sum();
    MovementTotals {
        total_in,
        total_out,
        net: total_in - total_out,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct VatDay {
    #[schema(value_type = String, format = "date")]
    pub date: NaiveDate,
    pub taxable_sales: f64,
    pub vat: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct VatReport {
    pub vat_rate: f64,
    pub taxable_sales: f64,
    pub vat_collected: f64,
    pub net_of_vat: f64,
    pub days: Vec<VatDay>,
}

pub fn vat_report<S: SaleRecord>(sales: &[S], vat_rate: f64) -> VatReport {
    let mut days: BTreeMap<NaiveDate, (f64, f64)> = BTreeMap::new();
    for s in sales.iter().filter(|s| s.is_settled() && s.tax_amount() > 0.0) {
        let entry = days.entry(s.created_at().date()).or_insert((0.0, 0.0));
        entry.0 += s.total_amount();
        entry.1 += s.tax_amount();
    }
    let taxable: f64 = days.values().map(|d| d.0).sum();
    let vat: f64 = days.values().map(|d| d.1).sum();
    VatReport {
        vat_rate,
        taxable_sales: round2(taxable),
        vat_collected: round2(vat),
        net_of_vat: round2(taxable - vat),
        days: days
            .into_iter()
            .map(|(date, (sales, vat))| VatDay {
                date,
                taxable_sales: round2(sales),
                vat: round2(vat),
            })
            .collect(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ProfitLoss {
    pub revenue: f64,
    pub cost_of_goods: f64,
    pub gross_profit: f64,
    pub margin: f64,
}

/// `items` must belong to the same `sales`.
pub fn profit_loss<S: SaleRecord>(sales: &[S], items: &[SaleItem]) -> ProfitLoss {
    let revenue: f64 = sales
        .iter()
        .filter(|s| s.is_settled())
        .map(|s| s.total_amount())
        .sum();
    let cogs: f64 = items.iter().map(|i| i.cost_price * i.quantity as f64).sum();
    let profit = revenue - cogs;
    ProfitLoss {
        revenue: round2(revenue),
        cost_of_goods: round2(cogs),
        gross_profit: round2(profit),
        margin: percentage(profit, revenue),
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, ToSchema)]
pub struct DiscountsReturns {
    pub discounted_sales: i64,
    pub total_discount: f64,
    pub returned_sales: i64,
    pub returned_value: f64,
}

pub fn discounts_returns(sales: &[Sale], items: &[SaleItem]) -> DiscountsReturns {
    let discounted: Vec<&Sale> = sales.iter().filter(|s| s.discount_amount > 0.0).collect();
    let returned = sales
        .iter()
        .filter(|s| {
            s.status == SaleStatus::Returned.as_ref() || s.status == SaleStatus::PartialReturn.as_ref()
        })
        .count() as i64;
    let returned_value: f64 = items
        .iter()
        .filter(|i| i.returned_quantity > 0 && i.quantity > 0)
        .map(|i| i.total_price / i.quantity as f64 * i.returned_quantity as f64)
        .sum();
    DiscountsReturns {
        discounted_sales: discounted.len() as i64,
        total_discount: round2(discounted.iter().map(|s| s.discount_amount).sum()),
        returned_sales: returned,
        returned_value: round2(returned_value),
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, ToSchema)]
pub struct CashRegister {
    pub opening_balance: f64,
    pub cash_sales: f64,
    pub cash_transactions: i64,
    pub cash_received: f64,
    pub change_given: f64,
    pub cash_paid_out: f64,
    /// opening + received - change - paid out
    pub expected_in_drawer: f64,
}

pub fn cash_register<S: SaleRecord>(sales: &[S], opening_balance: f64, paid_out: f64) -> CashRegister {
    let cash: Vec<&S> = sales
        .iter()
        .filter(|s| s.is_settled() && s.payment_method() == PaymentMethod::Cash.as_ref())
        .collect();
    let received: f64 = cash.iter().map(|s| s.paid_amount()).sum();
    let change: f64 = cash.iter().map(|s| s.change_amount()).sum();
    CashRegister {
        opening_balance: round2(opening_balance),
        cash_sales: round2(cash.iter().map(|s| s.total_amount()).sum()),
        cash_transactions: cash.len() as i64,
        cash_received: round2(received),
        change_given: round2(change),
        cash_paid_out: round2(paid_out),
        expected_in_drawer: round2(opening_balance + received - change - paid_out),
    }
}

/// actual - expected
pub fn variance(actual: f64, expected: f64) -> f64 {
    round2(actual - expected)
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct TrendPoint {
    #[schema(value_type = String, format = "date")]
    pub date: NaiveDate,
    pub total: f64,
    pub count: i64,
}

/// One point per day for the `days` days ending `today`, zero-filled.
/// The window is capped at [`MAX_LOOKBACK_DAYS`].
pub fn sales_trend<S: SaleRecord>(sales: &[S], days: i64, today: NaiveDate) -> Vec<TrendPoint> {
    let days = days.clamp(1, MAX_LOOKBACK_DAYS);
    let mut points: BTreeMap<NaiveDate, (f64, i64)> = (0..days)
        .filter_map(|back| today.checked_sub_signed(Duration::days(back)))
        .map(|date| (date, (0.0, 0)))
        .collect();
    for s in sales.iter().filter(|s| s.is_settled()) {
        if let Some(point) = points.get_mut(&s.created_at().date()) {
            point.0 += s.total_amount();
            point.1 += 1;
        }
    }
    points
        .into_iter()
        .map(|(date, (total, count))| TrendPoint {
            date,
            total: round2(total),
            count,
        })
        .collect()
}

impl CsvRow for PaymentMethodRow {
    fn columns() -> &'static [&'static str] {
        &["method", "count", "total", "share"]
    }
    fn cells(&self) -> Vec<String> {
        vec![
            self.method.clone(),
            self.count.to_string(),
            self.total.to_string(),
            self.share.to_string(),
        ]
    }
}

impl CsvRow for StaffSales {
    fn columns() -> &'static [&'static str] {
        &["staff_name", "transactions", "total"]
    }
    fn cells(&self) -> Vec<String> {
        vec![self.staff_name.clone(), self.transactions.to_string(), self.total.to_string()]
    }
}

impl CsvRow for CategorySales {
    fn columns() -> &'static [&'static str] {
        &["category", "quantity", "total"]
    }
    fn cells(&self) -> Vec<String> {
        vec![self.category.clone(), self.quantity.to_string(), self.total.to_string()]
    }
}

impl CsvRow for TopProduct {
    fn columns() -> &'static [&'static str] {
        &["product_id", "sku", "name", "quantity", "revenue"]
    }
    fn cells(&self) -> Vec<String> {
        vec![
            self.product_id.to_string(),
            self.sku.clone(),
            self.name.clone(),
            self.quantity.to_string(),
            self.revenue.to_string(),
        ]
    }
}

impl CsvRow for SlowMover {
    fn columns() -> &'static [&'static str] {
        &["product_id", "sku", "name", "stock_quantity", "last_sold_at"]
    }
    fn cells(&self) -> Vec<String> {
        vec![
            self.product_id.to_string(),
            self.sku.clone(),
            self.name.clone(),
            self.stock_quantity.to_string(),
            self.last_sold_at.map(|t| t.to_string()).unwrap_or_default(),
        ]
    }
}

impl CsvRow for Product {
    fn columns() -> &'static [&'static str] {
        &["id", "sku", "name", "category", "stock_quantity", "reorder_level", "cost_price", "selling_price"]
    }
    fn cells(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            self.sku.clone(),
            self.name.clone(),
            self.category.clone(),
            self.stock_quantity.to_string(),
            self.reorder_level.to_string(),
            self.cost_price.to_string(),
            self.selling_price.to_string(),
        ]
    }
}

impl CsvRow for StockMovement {
    fn columns() -> &'static [&'static str] {
        &["id", "created_at", "product_id", "movement_type", "from_location_id", "to_location_id", "quantity", "total_value", "reference"]
    }
    fn cells(&self) -> Vec<String> {
        let side = |l: Option<u64>| l.map(|v| v.to_string()).unwrap_or_default();
        vec![
            self.id.to_string(),
            self.created_at.to_string(),
            self.product_id.to_string(),
            self.movement_type.clone(),
            side(self.from_location_id),
            side(self.to_location_id),
            self.quantity.to_string(),
            self.total_value.to_string(),
            self.reference.clone(),
        ]
    }
}

impl CsvRow for VatDay {
    fn columns() -> &'static [&'static str] {
        &["date", "taxable_sales", "vat"]
    }
    fn cells(&self) -> Vec<String> {
        vec![self.date.to_string(), self.taxable_sales.to_string(), self.vat.to_string()]
    }
}

impl CsvRow for TrendPoint {
    fn columns() -> &'static [&'static str] {
        &["date", "total", "count"]
    }
    fn cells(&self) -> Vec<String> {
        vec![self.date.to_string(), self.total.to_string(), self.count.to_string()]
    }
}

impl CsvRow for Sale {
    fn columns() -> &'static [&'static str] {
        &["receipt_number", "created_at", "staff_name", "payment_method", "status", "subtotal", "discount_amount", "tax_amount", "total_amount"]
    }
    fn cells(&self) -> Vec<String> {
        vec![
            self.receipt_number.clone(),
            self.created_at.to_string(),
            self.staff_name.clone(),
            self.payment_method.clone(),
            self.status.clone(),
            self.subtotal.to_string(),
            self.discount_amount.to_string(),
            self.tax_amount.to_string(),
            self.total_amount.to_string(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 4, d).unwrap()
    }

    fn sale(total: f64, method: PaymentMethod, staff: &str, status: SaleStatus, d: u32) -> Sale {
        Sale {
            id: 1,
            receipt_number: "RCP1".into(),
            pos_transaction_id: None,
            location_id: 1,
            customer_id: None,
            staff_id: 1,
            staff_name: staff.into(),
            subtotal: total,
            discount_amount: 0.0,
            tax_amount: round2(total * 0.1),
            total_amount: total,
            paid_amount: if method == PaymentMethod::Cash { total + 50.0 } else { total },
            change_amount: if method == PaymentMethod::Cash { 50.0 } else { 0.0 },
            payment_method: method.to_string(),
            status: status.to_string(),
            notes: String::new(),
            created_at: day(d).and_hms_opt(10, 0, 0).unwrap(),
        }
    }

    fn item(product_id: u64, category: &str, qty: i64, total: f64, cost: f64) -> SaleItem {
        SaleItem {
            id: 1,
            sale_id: 1,
            product_id,
            product_name: format!("P{product_id}"),
            sku: format!("SKU{product_id}"),
            category: category.into(),
            quantity: qty,
            returned_quantity: 0,
            unit_price: total / qty as f64,
            cost_price: cost,
            discount_amount: 0.0,
            tax_amount: 0.0,
            total_price: total,
        }
    }

    fn product(id: u64, qty: i64, reorder: i64, cost: f64) -> Product {
        Product {
            id,
            sku: format!("SKU{id}"),
            name: format!("Product {id}"),
            description: String::new(),
            category: if id % 2 == 0 { "Even".into() } else { "Odd".into() },
            barcode: None,
            cost_price: cost,
            selling_price: cost * 2.0,
            taxable: true,
            reorder_level: reorder,
            is_active: true,
            stock_quantity: qty,
            updated_at: Utc::now(),
        }
    }

    fn sample_sales() -> Vec<Sale> {
        vec![
            sale(100.0, PaymentMethod::Cash, "Ann", SaleStatus::Completed, 10),
            sale(300.0, PaymentMethod::Card, "Ben", SaleStatus::Completed, 10),
            sale(100.0, PaymentMethod::Cash, "Ann", SaleStatus::Completed, 11),
            sale(999.0, PaymentMethod::Card, "Ben", SaleStatus::Cancelled, 11),
        ]
    }

    #[test]
    fn periods_resolve_to_inclusive_ranges() {
        let today = day(30);
        let week = resolve_range(Some(Period::Week), None, None, today).unwrap();
        assert_eq!(week.days(), 7);
        assert_eq!(week.from, day(24));
        let month = resolve_range(Some(Period::Month), None, None, today).unwrap();
        assert_eq!(month.days(), 30);
        let explicit = resolve_range(Some(Period::Week), Some(day(1)), Some(day(2)), today).unwrap();
        assert_eq!(explicit.from, day(1));
        assert!(resolve_range(None, Some(day(5)), Some(day(1)), today).is_err());
        assert_eq!(resolve_range(None, None, None, today).unwrap().days(), 1);
    }

    #[test]
    fn summary_ignores_cancelled_sales() {
        let summary = sales_summary(&sample_sales());
        assert_eq!(summary.transaction_count, 3);
        assert_eq!(summary.total_sales, 500.0);
        assert_eq!(summary.average_transaction, 166.67);
        assert_eq!(summary.by_payment_method["cash"], 200.0);
    }

    #[test]
    fn empty_summary_has_zero_average() {
        let summary = sales_summary::<Sale>(&[]);
        assert_eq!(summary.average_transaction, 0.0);
    }

    #[test]
    fn payment_methods_sorted_with_shares() {
        let rows = payment_methods(&sample_sales());
        assert_eq!(rows[0].method, "card");
        assert_eq!(rows[0].share, 60.0);
        assert_eq!(rows[1].count, 2);
    }

    #[test]
    fn staff_and_category_rankings() {
        let staff = sales_by_staff(&sample_sales());
        assert_eq!(staff[0].staff_name, "Ben");
        assert_eq!(staff[1].transactions, 2);

        let items = vec![
            item(1, "Drinks", 2, 20.0, 5.0),
            item(2, "Bakery", 1, 50.0, 20.0),
            item(1, "Drinks", 3, 40.0, 5.0),
        ];
        let categories = sales_by_category(&items);
        assert_eq!(categories[0].category, "Drinks");
        assert_eq!(categories[0].quantity, 5);
        assert_eq!(categories[0].total, 60.0);
        assert_eq!(categories[1].category, "Bakery");

        let top = top_products(&items, 1);
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].product_id, 1);
        assert_eq!(top[0].revenue, 60.0);
    }

    #[test]
    fn lookback_is_bounded() {
        let now = NaiveDate::from_ymd_opt(2026, 3, 31).unwrap().and_hms_opt(12, 0, 0).unwrap();
        assert_eq!(
            lookback_start(now, 30).unwrap(),
            NaiveDate::from_ymd_opt(2026, 3, 1).unwrap().and_hms_opt(12, 0, 0).unwrap()
        );
        assert!(lookback_start(now, MAX_LOOKBACK_DAYS).is_ok());
        assert!(lookback_start(now, 0).is_err());
        assert!(lookback_start(now, MAX_LOOKBACK_DAYS + 1).is_err());
        assert!(lookback_start(now, i64::MAX).is_err());
        assert!(lookback_start(NaiveDateTime::MIN, 1).is_err());
    }

    #[test]
    fn trend_window_is_capped() {
        let today = NaiveDate::from_ymd_opt(2026, 3, 31).unwrap();
        assert_eq!(sales_trend::<Sale>(&[], i64::MAX, today).len(), MAX_LOOKBACK_DAYS as usize);
        assert_eq!(sales_trend::<Sale>(&[], 5, NaiveDate::MIN).len(), 1);
    }

    #[test]
    fn category_ties_fall_back_to_name() {
        let items = vec![item(1, "Drinks", 2, 50.0, 5.0), item(2, "Bakery", 1, 50.0, 20.0)];
        let categories = sales_by_category(&items);
        assert_eq!(categories[0].category, "Bakery");
        assert_eq!(categories[1].category, "Drinks");
    }

    #[test]
    fn profit_and_margin() {
        let sales = vec![sale(200.0, PaymentMethod::Card, "Ann", SaleStatus::Completed, 10)];
        let items = vec![item(1, "Drinks", 4, 200.0, 30.0)];
        let pl = profit_loss(&sales, &items);
        assert_eq!(pl.cost_of_goods, 120.0);
        assert_eq!(pl.gross_profit, 80.0);
        assert_eq!(pl.margin, 40.0);
        assert_eq!(profit_loss::<Sale>(&[], &[]).margin, 0.0);
    }

    #[test]
    fn cash_register_expectation() {
        let register = cash_register(&sample_sales(), 1000.0, 25.0);
        assert_eq!(register.cash_sales, 200.0);
        assert_eq!(register.cash_received, 300.0);
        assert_eq!(register.change_given, 100.0);
        assert_eq!(register.expected_in_drawer, 1175.0);
        assert_eq!(variance(1170.0, register.expected_in_drawer), -5.0);
    }

    #[test]
    fn stock_levels_classify_items() {
        let products = vec![product(1, 0, 5, 10.0), product(2, 3, 5, 10.0), product(3, 40, 5, 2.0)];
        let levels = stock_levels(&products, None, StockSort::Value);
        assert_eq!(levels.total_quantity, 43);
        assert_eq!(levels.total_value, 110.0);
        assert_eq!(levels.low_stock_items, 1);
        assert_eq!(levels.out_of_stock, 1);
        assert_eq!(levels.items[0].id, 3);

        let odd = stock_levels(&products, Some("odd"), StockSort::Name);
        assert_eq!(odd.product_count, 2);
        assert_eq!(low_stock(&products).len(), 2);
    }

    #[test]
    fn slow_movers_include_never_sold() {
        let products = vec![product(1, 5, 1, 1.0), product(2, 5, 1, 1.0), product(3, 5, 1, 1.0)];
        let since = day(10).and_hms_opt(0, 0, 0).unwrap();
        let mut last = HashMap::new();
        last.insert(1, day(12).and_hms_opt(9, 0, 0).unwrap());
        last.insert(2, day(2).and_hms_opt(9, 0, 0).unwrap());
        let slow = slow_moving(&products, &last, since);
        let ids: Vec<u64> = slow.iter().map(|s| s.product_id).collect();
        assert_eq!(ids, vec![2, 3]);
        assert!(slow[1].last_sold_at.is_none());
    }

    #[test]
    fn trend_is_zero_filled() {
        let trend = sales_trend(&sample_sales(), 3, day(11));
        assert_eq!(trend.len(), 3);
        assert_eq!(trend[0].total, 0.0);
        assert_eq!(trend[1].total, 400.0);
        assert_eq!(trend[2].count, 1);
    }

    #[test]
    fn vat_groups_by_day() {
        let report = vat_report(&sample_sales(), 0.1);
        assert_eq!(report.days.len(), 2);
        assert_eq!(report.taxable_sales, 500.0);
        assert_eq!(report.vat_collected, 50.0);
        assert_eq!(report.net_of_vat, 450.0);
    }
}
