//! Till arithmetic shared by the `/pos` endpoints and the offline agent.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::{ApiError, ApiResult};
use crate::model::product::Product;
use crate::model::sale::PaymentMethod;
use crate::model::sync::{SyncSale, SyncSaleItem};
use crate::service::round2;

/// One cart line: a product snapshot plus quantity and line discount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CartLine {
    pub product_id: u64,
    #[serde(default)]
    pub sku: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub category: String,
    pub unit_price: f64,
    #[serde(default)]
    pub cost_price: f64,
    #[serde(default = "default_taxable")]
    pub taxable: bool,
    pub quantity: i64,
    #[serde(default)]
    pub discount: f64,
}

fn default_taxable() -> bool {
    true
}

impl CartLine {
    /// A line priced from the catalog row, never from what the till sent.
    pub fn priced(product: &Product, quantity: i64, discount: f64) -> Self {
        Self {
            product_id: product.id,
            sku: product.sku.clone(),
            name: product.name.clone(),
            category: product.category.clone(),
            unit_price: product.selling_price,
            cost_price: product.cost_price,
            taxable: product.taxable,
            quantity,
            discount,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct QuotedLine {
    #[serde(flatten)]
    pub line: CartLine,
    pub gross: f64,
    pub net: f64,
    pub tax: f64,
    /// net + tax
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Quote {
    pub lines: Vec<QuotedLine>,
    pub item_count: i64,
    pub subtotal: f64,
    pub discount_total: f64,
    pub tax_total: f64,
    pub total: f64,
}

pub fn quote(lines: &[CartLine], vat_rate: f64) -> ApiResult<Quote> {
    if lines.is_empty() {
        return Err(ApiError::validation("Cart is empty"));
    }

    let mut quoted = Vec::with_capacity(lines.len());
    for line in lines {
        if line.quantity <= 0 {
            return Err(ApiError::validation(format!(
                "Quantity for {} must be greater than zero",
                label(line)
            )));
        }
        if line.unit_price < 0.0 || line.discount < 0.0 {
            return Err(ApiError::validation(format!(
                "Price and discount for {} cannot be negative",
                label(line)
            )));
        }

        let gross = round2(line.unit_price * line.quantity as f64);
        if line.discount > gross {
            return Err(ApiError::validation(format!(
                "Discount for {} exceeds the line amount",
                label(line)
            )));
        }
        let net = round2(gross - line.discount);
        let tax = if line.taxable { round2(net * vat_rate) } else { 0.0 };

        quoted.push(QuotedLine {
            line: line.clone(),
            gross,
            net,
            tax,
            total: round2(net + tax),
        });
    }

    let subtotal = round2(quoted.iter().map(|l| l.gross).sum());
    let discount_total = round2(quoted.iter().map(|l| l.line.discount).sum());
    let tax_total = round2(quoted.iter().map(|l| l.tax).sum());

    Ok(Quote {
        item_count: quoted.iter().map(|l| l.line.quantity).sum(),
        total: round2(subtotal - discount_total + tax_total),
        lines: quoted,
        subtotal,
        discount_total,
        tax_total,
    })
}

fn label(line: &CartLine) -> String {
    if line.sku.is_empty() {
        format!("product {}", line.product_id)
    } else {
        line.sku.clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, ToSchema)]
pub struct Settlement {
    pub paid: f64,
    pub change: f64,
}

/// Cash must cover the total and yields change; every other method is
/// settled for exactly the total.
pub fn settle(method: PaymentMethod, total: f64, tendered: Option<f64>) -> ApiResult<Settlement> {
    match method {
        PaymentMethod::Cash => {
            let paid = tendered.ok_or_else(|| ApiError::validation("Cash tendered is required"))?;
            if paid < total {
                return Err(ApiError::validation(format!(
                    "Insufficient cash: tendered {paid:.2}, total {total:.2}"
                )));
            }
            Ok(Settlement {
                paid: round2(paid),
                change: round2(paid - total),
            })
        }
        _ => Ok(Settlement {
            paid: total,
            change: 0.0,
        }),
    }
}

/// Who rang a sale up, where, and how it was paid.
#[derive(Debug, Clone)]
pub struct SaleHeader {
    pub pos_transaction_id: String,
    pub receipt_number: String,
    pub location_id: u64,
    pub customer_id: Option<u64>,
    pub staff_id: u64,
    pub staff_name: String,
    pub payment_method: PaymentMethod,
    pub notes: String,
    pub created_at: NaiveDateTime,
}

/// The sale record both checkout paths persist: the server directly, the
/// offline till first into its cache and later through sync.
pub fn build_sale(header: SaleHeader, quote: &Quote, settlement: Settlement) -> SyncSale {
    SyncSale {
        pos_transaction_id: header.pos_transaction_id,
        receipt_number: header.receipt_number,
        location_id: header.location_id,
        customer_id: header.customer_id,
        staff_id: header.staff_id,
        staff_name: header.staff_name,
        subtotal: quote.subtotal,
        discount_amount: quote.discount_total,
        tax_amount: quote.tax_total,
        total_amount: quote.total,
        paid_amount: settlement.paid,
        change_amount: settlement.change,
        payment_method: header.payment_method,
        notes: header.notes,
        created_at: header.created_at,
        items: quote
            .lines
            .iter()
            .map(|q| SyncSaleItem {
                product_id: q.line.product_id,
                sku: q.line.sku.clone(),
                product_name: q.line.name.clone(),
                category: q.line.category.clone(),
                quantity: q.line.quantity,
                unit_price: q.line.unit_price,
                cost_price: q.line.cost_price,
                discount_amount: q.line.discount,
                tax_amount: q.tax,
                total_price: q.total,
            })
            .collect(),
    }
}

/// `RCP` followed by epoch millis.
pub fn receipt_number(epoch_millis: i64) -> String {
    format!("RCP{epoch_millis}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(price: f64, qty: i64, discount: f64, taxable: bool) -> CartLine {
        CartLine {
            product_id: 1,
            sku: "SKU-1".into(),
            name: "Sugar 1kg".into(),
            category: "Groceries".into(),
            unit_price: price,
            cost_price: price * 0.7,
            taxable,
            quantity: qty,
            discount,
        }
    }

    #[test]
    fn totals_for_known_cart() {
        let cart = vec![
            line(1000.0, 2, 0.0, true),
            line(500.0, 1, 100.0, true),
            line(250.0, 4, 0.0, false),
        ];
        let q = quote(&cart, 0.165).unwrap();
        assert_eq!(q.subtotal, 3500.0);
        assert_eq!(q.discount_total, 100.0);
        // (2000 + 400) * 0.165
        assert_eq!(q.tax_total, 396.0);
        assert_eq!(q.total, 3796.0);
        assert_eq!(q.item_count, 7);
        assert_eq!(q.lines[2].tax, 0.0);
        assert_eq!(q.lines[1].net, 400.0);
    }

    #[test]
    fn tax_is_applied_per_line() {
        let q = quote(&[line(10.0, 3, 0.0, true)], 0.165).unwrap();
        assert_eq!(q.tax_total, 4.95);
        assert_eq!(q.total, 34.95);
    }

    #[test]
    fn invalid_carts_are_rejected() {
        assert!(quote(&[], 0.165).is_err());
        assert!(quote(&[line(10.0, 0, 0.0, true)], 0.165).is_err());
        assert!(quote(&[line(10.0, 1, 11.0, true)], 0.165).is_err());
        assert!(quote(&[line(-1.0, 1, 0.0, true)], 0.165).is_err());
    }

    #[test]
    fn cash_returns_change() {
        let s = settle(PaymentMethod::Cash, 3796.0, Some(4000.0)).unwrap();
        assert_eq!(s.change, 204.0);
        assert_eq!(s.paid, 4000.0);
    }

    #[test]
    fn insufficient_cash_is_rejected() {
        assert!(settle(PaymentMethod::Cash, 100.0, Some(99.99)).is_err());
        assert!(settle(PaymentMethod::Cash, 100.0, None).is_err());
    }

    #[test]
    fn card_is_settled_exactly() {
        let s = settle(PaymentMethod::Card, 120.5, Some(500.0)).unwrap();
        assert_eq!(s, Settlement { paid: 120.5, change: 0.0 });
    }

    #[test]
    fn receipt_prefix() {
        assert_eq!(receipt_number(1_767_254_400_000), "RCP1767254400000");
    }
}
