use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::{ApiError, ApiResult};
use crate::model::accounting::{AccountType, Industry};
use crate::service::round2;

/// Cash/bank account debited by every sale.
pub const CASH_ACCOUNT_CODE: &str = "1000";
/// Revenue account credited by every sale.
pub const SALES_REVENUE_CODE: &str = "4000";

const BALANCE_TOLERANCE: f64 = 0.001;

pub fn chart_template(industry: Industry) -> &'static [(&'static str, &'static str, AccountType)] {
    match industry {
        Industry::Retail => &[
            ("1000", "Cash on Hand", AccountType::Asset),
            ("1200", "Inventory", AccountType::Asset),
            ("4000", "Retail Sales", AccountType::Revenue),
            ("5000", "Cost of Goods Sold", AccountType::Expense),
        ],
        Industry::Service => &[
            ("1000", "Bank Account", AccountType::Asset),
            ("4000", "Service Revenue", AccountType::Revenue),
            ("5100", "Labor Costs", AccountType::Expense),
        ],
        Industry::Pharmacy => &[
            ("1000", "Main Register", AccountType::Asset),
            ("1200", "Medical Supplies Inventory", AccountType::Asset),
            ("4000", "Prescription Sales", AccountType::Revenue),
            ("5000", "Procurement Costs", AccountType::Expense),
        ],
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct JournalLineInput {
    pub account_id: u64,
    #[serde(default)]
    pub debit: f64,
    #[serde(default)]
    pub credit: f64,
}

/// Checks a journal entry and returns its total.
///
/// Each line moves money on exactly one side, amounts are non-negative, and
/// debits must equal credits.
pub fn balance_lines(lines: &[JournalLineInput]) -> ApiResult<f64> {
    if lines.len() < 2 {
        return Err(ApiError::validation("A journal entry needs at least two lines"));
    }
    for line in lines {
        if !line.debit.is_finite() || !line.credit.is_finite() {
            return Err(ApiError::validation("Amounts must be numbers"));
        }
        if line.debit < 0.0 || line.credit < 0.0 {
            return Err(ApiError::validation("Amounts cannot be negative"));
        }
        if (line.debit > 0.0) == (line.credit > 0.0) {
            return Err(ApiError::validation(
                "Each line must have either a debit or a credit",
            ));
        }
    }
    let debits = round2(lines.iter().map(|l| l.debit).sum());
    let credits = round2(lines.iter().map(|l| l.credit).sum());
    if (debits - credits).abs() > BALANCE_TOLERANCE {
        return Err(ApiError::validation(format!(
            "Debits ({debits:.2}) and credits ({credits:.2}) must be equal"
        )));
    }
    Ok(debits)
}

/// Dr cash, Cr sales revenue for the sale total.
pub fn sale_lines(cash_account: u64, revenue_account: u64, total: f64) -> Vec<JournalLineInput> {
    let total = round2(total);
    vec![
        JournalLineInput {
            account_id: cash_account,
            debit: total,
            credit: 0.0,
        },
        JournalLineInput {
            account_id: revenue_account,
            debit: 0.0,
            credit: total,
        },
    ]
}

/// Would making `parent_id` the parent of `account_id` close a loop?
pub fn creates_cycle(
    account_id: u64,
    parent_id: u64,
    parent_of: &HashMap<u64, Option<u64>>,
) -> bool {
    let mut current = Some(parent_id);
    let mut steps = 0;
    while let Some(id) = current {
        if id == account_id || steps > parent_of.len() {
            return true;
        }
        current = parent_of.get(&id).copied().flatten();
        steps += 1;
    }
    false
}

/// Summed ledger lines for one account.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountTotals {
    pub account_id: u64,
    pub code: String,
    pub name: String,
    pub account_type: String,
    pub debit: f64,
    pub credit: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct TrialBalanceRow {
    pub account_id: u64,
    pub code: String,
    pub name: String,
    pub account_type: String,
    pub debit: f64,
    pub credit: f64,
    /// debit - credit
    pub balance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct TrialBalance {
    pub rows: Vec<TrialBalanceRow>,
    pub total_debit: f64,
    pub total_credit: f64,
    pub balanced: bool,
}

pub fn trial_balance(mut accounts: Vec<AccountTotals>) -> TrialBalance {
    accounts.sort_by(|a, b| a.code.cmp(&b.code));
    let rows: Vec<TrialBalanceRow> = accounts
        .into_iter()
        .map(|a| TrialBalanceRow {
            balance: round2(a.debit - a.credit),
            debit: round2(a.debit),
            credit: round2(a.credit),
            account_id: a.account_id,
            code: a.code,
            name: a.name,
            account_type: a.account_type,
        })
        .collect();
    let total_debit = round2(rows.iter().map(|r| r.debit).sum());
    let total_credit = round2(rows.iter().map(|r| r.credit).sum());
    TrialBalance {
        balanced: (total_debit - total_credit).abs() <= BALANCE_TOLERANCE,
        rows,
        total_debit,
        total_credit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(account_id: u64, debit: f64, credit: f64) -> JournalLineInput {
        JournalLineInput {
            account_id,
            debit,
            credit,
        }
    }

    fn totals(code: &str, debit: f64, credit: f64) -> AccountTotals {
        AccountTotals {
            account_id: code.parse().unwrap(),
            code: code.into(),
            name: format!("Account {code}"),
            account_type: "asset".into(),
            debit,
            credit,
        }
    }

    #[test]
    fn balanced_entry_returns_its_total() {
        let lines = [line(1, 70.25, 0.0), line(2, 29.75, 0.0), line(3, 0.0, 100.0)];
        assert_eq!(balance_lines(&lines).unwrap(), 100.0);
    }

    #[test]
    fn unbalanced_entry_is_refused() {
        let err = balance_lines(&[line(1, 100.0, 0.0), line(2, 0.0, 99.0)]).unwrap_err();
        assert!(matches!(err, ApiError::Validation(m) if m.contains("must be equal")));
    }

    #[test]
    fn malformed_lines_are_refused() {
        assert!(balance_lines(&[line(1, 10.0, 0.0)]).is_err());
        assert!(balance_lines(&[line(1, 10.0, 10.0), line(2, 0.0, 0.0)]).is_err());
        assert!(balance_lines(&[line(1, -5.0, 0.0), line(2, 0.0, -5.0)]).is_err());
        assert!(balance_lines(&[line(1, f64::NAN, 0.0), line(2, 0.0, 1.0)]).is_err());
    }

    #[test]
    fn sale_debits_cash_and_credits_revenue() {
        let lines = sale_lines(1, 4, 116.499);
        assert_eq!(lines, vec![line(1, 116.5, 0.0), line(4, 0.0, 116.5)]);
        assert_eq!(balance_lines(&lines).unwrap(), 116.5);
    }

    #[test]
    fn every_chart_has_cash_and_revenue() {
        for industry in [Industry::Retail, Industry::Service, Industry::Pharmacy] {
            let chart = chart_template(industry);
            assert!(chart
                .iter()
                .any(|(code, _, t)| *code == CASH_ACCOUNT_CODE && *t == AccountType::Asset));
            assert!(chart
                .iter()
                .any(|(code, _, t)| *code == SALES_REVENUE_CODE && *t == AccountType::Revenue));
        }
    }

    #[test]
    fn parent_loops_are_detected() {
        // 3 -> 2 -> 1
        let parent_of = HashMap::from([(1, None), (2, Some(1)), (3, Some(2)), (4, None)]);
        assert!(creates_cycle(1, 3, &parent_of));
        assert!(creates_cycle(2, 2, &parent_of));
        assert!(!creates_cycle(4, 3, &parent_of));
        assert!(!creates_cycle(3, 4, &parent_of));
    }

    #[test]
    fn trial_balance_sorts_by_code_and_checks_totals() {
        let report = trial_balance(vec![totals("4000", 0.0, 150.0), totals("1000", 150.0, 0.0)]);
        assert_eq!(report.rows[0].code, "1000");
        assert_eq!(report.rows[0].balance, 150.0);
        assert_eq!(report.rows[1].balance, -150.0);
        assert_eq!(report.total_debit, 150.0);
        assert!(report.balanced);

        assert!(!trial_balance(vec![totals("1000", 10.0, 0.0)]).balanced);
    }
}
