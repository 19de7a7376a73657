use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::{ApiError, ApiResult};
use crate::model::invoice::{Invoice, InvoiceStatus};
use crate::model::quotation::QuotationStatus;
use crate::service::{percentage, round2};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DocumentLineInput {
    pub product_id: u64,
    pub quantity: i64,
    pub unit_price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct DocumentTotals {
    /// Line totals in input order
    pub line_totals: Vec<f64>,
    pub subtotal: f64,
    pub tax_total: f64,
    pub total_amount: f64,
}

/// line = qty * price, tax on the subtotal.
pub fn document_totals(lines: &[DocumentLineInput], vat_rate: f64) -> ApiResult<DocumentTotals> {
    if lines.is_empty() {
        return Err(ApiError::validation("At least one line is required"));
    }
    let mut line_totals = Vec::with_capacity(lines.len());
    for line in lines {
        if line.quantity <= 0 {
            return Err(ApiError::validation("Line quantity must be greater than zero"));
        }
        if line.unit_price < 0.0 {
            return Err(ApiError::validation("Line price cannot be negative"));
        }
        line_totals.push(round2(line.quantity as f64 * line.unit_price));
    }
    let subtotal = round2(line_totals.iter().sum());
    let tax_total = round2(subtotal * vat_rate);
    Ok(DocumentTotals {
        line_totals,
        subtotal,
        tax_total,
        total_amount: round2(subtotal + tax_total),
    })
}

pub fn ensure_dates(date: NaiveDate, later: NaiveDate, label: &str) -> ApiResult<()> {
    if later < date {
        return Err(ApiError::validation(format!("{label} cannot be before the document date")));
    }
    Ok(())
}

/// draft -> sent -> accepted | declined, accepted -> converted
pub fn next_quotation_status(
    current: QuotationStatus,
    target: QuotationStatus,
) -> ApiResult<QuotationStatus> {
    use QuotationStatus as Q;
    match (current, target) {
        (Q::Draft, Q::Sent)
        | (Q::Sent, Q::Accepted)
        | (Q::Sent, Q::Declined)
        | (Q::Accepted, Q::Converted) => Ok(target),
        _ => Err(ApiError::validation(format!(
            "Cannot move a {current} quotation to {target}"
        ))),
    }
}

/// New `(amount_paid, status)` after a payment.
pub fn apply_payment(invoice: &Invoice, amount: f64) -> ApiResult<(f64, InvoiceStatus)> {
    let status: InvoiceStatus = invoice
        .status
        .parse()
        .map_err(|_| ApiError::validation(format!("Unknown invoice status {}", invoice.status)))?;
    if !matches!(status, InvoiceStatus::Sent | InvoiceStatus::Overdue) {
        return Err(ApiError::validation(format!(
            "Payments can only be recorded on sent or overdue invoices, this one is {status}"
        )));
    }
    if amount <= 0.0 {
        return Err(ApiError::validation("Payment amount must be greater than zero"));
    }
    let outstanding = round2(invoice.outstanding());
    if amount > outstanding {
        return Err(ApiError::validation(format!(
            "Payment {amount:.2} exceeds outstanding balance {outstanding:.2}"
        )));
    }
    let paid = round2(invoice.amount_paid + amount);
    let status = if paid >= invoice.total_amount { InvoiceStatus::Paid } else { status };
    Ok((paid, status))
}

pub fn is_overdue(invoice: &Invoice, today: NaiveDate) -> bool {
    invoice.status == InvoiceStatus::Sent.as_ref() && invoice.due_date < today
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct InvoiceTotals {
    pub invoiced: f64,
    pub paid: f64,
    pub outstanding: f64,
    pub overdue_count: i64,
}

pub fn invoice_totals(invoices: &[Invoice], today: NaiveDate) -> InvoiceTotals {
    let live: Vec<&Invoice> = invoices
        .iter()
        .filter(|i| i.status != InvoiceStatus::Cancelled.as_ref())
        .collect();
    InvoiceTotals {
        invoiced: round2(live.iter().map(|i| i.total_amount).sum()),
        paid: round2(live.iter().map(|i| i.amount_paid).sum()),
        outstanding: round2(live.iter().map(|i| i.outstanding()).sum()),
        overdue_count: live
            .iter()
            .filter(|i| i.status == InvoiceStatus::Overdue.as_ref() || is_overdue(i, today))
            .count() as i64,
    }
}

/// converted / total * 100
pub fn conversion_rate(statuses: &[String]) -> f64 {
    let converted = statuses
        .iter()
        .filter(|s| *s == QuotationStatus::Converted.as_ref())
        .count();
    percentage(converted as f64, statuses.len() as f64)
}

pub fn count_by<'a>(values: impl Iterator<Item = &'a str>) -> BTreeMap<String, i64> {
    let mut counts = BTreeMap::new();
    for v in values {
        *counts.entry(v.to_string()).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invoice(total: f64, paid: f64, status: InvoiceStatus, due_day: u32) -> Invoice {
        Invoice {
            id: 1,
            invoice_number: "INV-1".into(),
            customer_id: 1,
            location_id: 1,
            quotation_id: None,
            date: NaiveDate::from_ymd_opt(2026, 6, 1).unwrap(),
            due_date: NaiveDate::from_ymd_opt(2026, 6, due_day).unwrap(),
            subtotal: total,
            tax_total: 0.0,
            total_amount: total,
            amount_paid: paid,
            status: status.to_string(),
        }
    }

    #[test]
    fn document_totals_tax_the_subtotal() {
        let totals = document_totals(
            &[
                DocumentLineInput { product_id: 1, quantity: 2, unit_price: 150.0 },
                DocumentLineInput { product_id: 2, quantity: 1, unit_price: 100.0 },
            ],
            0.165,
        )
        .unwrap();
        assert_eq!(totals.line_totals, vec![300.0, 100.0]);
        assert_eq!(totals.subtotal, 400.0);
        assert_eq!(totals.tax_total, 66.0);
        assert_eq!(totals.total_amount, 466.0);
        assert!(document_totals(&[], 0.165).is_err());
    }

    #[test]
    fn quotation_flow() {
        use QuotationStatus as Q;
        assert!(next_quotation_status(Q::Draft, Q::Sent).is_ok());
        assert!(next_quotation_status(Q::Sent, Q::Declined).is_ok());
        assert!(next_quotation_status(Q::Accepted, Q::Converted).is_ok());
        assert!(next_quotation_status(Q::Draft, Q::Converted).is_err());
        assert!(next_quotation_status(Q::Declined, Q::Accepted).is_err());
    }

    #[test]
    fn payments_move_invoice_to_paid() {
        let inv = invoice(500.0, 200.0, InvoiceStatus::Sent, 30);
        assert_eq!(apply_payment(&inv, 100.0).unwrap(), (300.0, InvoiceStatus::Sent));
        assert_eq!(apply_payment(&inv, 300.0).unwrap(), (500.0, InvoiceStatus::Paid));
        assert!(apply_payment(&inv, 300.01).is_err());
        assert!(apply_payment(&inv, 0.0).is_err());
        assert!(apply_payment(&invoice(500.0, 0.0, InvoiceStatus::Draft, 30), 10.0).is_err());
    }

    #[test]
    fn totals_and_overdue() {
        let today = NaiveDate::from_ymd_opt(2026, 6, 15).unwrap();
        let invoices = vec![
            invoice(500.0, 500.0, InvoiceStatus::Paid, 10),
            invoice(300.0, 0.0, InvoiceStatus::Sent, 10),
            invoice(200.0, 50.0, InvoiceStatus::Sent, 20),
            invoice(999.0, 0.0, InvoiceStatus::Cancelled, 1),
        ];
        let totals = invoice_totals(&invoices, today);
        assert_eq!(totals.invoiced, 1000.0);
        assert_eq!(totals.outstanding, 450.0);
        assert_eq!(totals.overdue_count, 1);
    }

    #[test]
    fn conversion_rate_over_all_quotations() {
        let statuses: Vec<String> = ["converted", "sent", "declined", "converted"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(conversion_rate(&statuses), 50.0);
        assert_eq!(conversion_rate(&[]), 0.0);
    }
}
