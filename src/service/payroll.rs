use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::config::Policy;
use crate::error::{ApiError, ApiResult};
use crate::model::employee::SalaryType;
use crate::model::payroll::{PayrollSlip, PayrollStatus};
use crate::service::round2;

/// Earnings derived from salary terms and the hours clocked in a period.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct PayrollCalculation {
    pub salary_type: SalaryType,
    pub hourly_rate: f64,
    pub days_worked: i32,
    pub hours_worked: f64,
    pub overtime_hours: f64,
    pub basic_salary: f64,
    pub overtime_pay: f64,
    pub gross_salary: f64,
}

/// `daily_hours` holds the hours of every completed attendance day in the
/// period.
pub fn calculate(
    salary: f64,
    salary_type: SalaryType,
    daily_hours: &[f64],
    policy: &Policy,
) -> ApiResult<PayrollCalculation> {
    if salary < 0.0 {
        return Err(ApiError::validation("Salary cannot be negative"));
    }
    if daily_hours.iter().any(|h| *h < 0.0) {
        return Err(ApiError::validation("Worked hours cannot be negative"));
    }

    let days_worked = daily_hours.len() as i32;
    let hours_worked: f64 = daily_hours.iter().sum();
    let overtime_hours: f64 = daily_hours
        .iter()
        .map(|h| (h - policy.standard_daily_hours).max(0.0))
        .sum();

    let (basic_salary, hourly_rate) = match salary_type {
        SalaryType::Monthly => (salary, salary / policy.monthly_hours),
        SalaryType::Hourly => (salary * hours_worked, salary),
        SalaryType::Daily => (
            salary * days_worked as f64,
            salary / policy.standard_daily_hours,
        ),
    };

    let overtime_pay = overtime_hours * hourly_rate * policy.overtime_multiplier;

    Ok(PayrollCalculation {
        salary_type,
        hourly_rate: round2(hourly_rate),
        days_worked,
        hours_worked: round2(hours_worked),
        overtime_hours: round2(overtime_hours),
        basic_salary: round2(basic_salary),
        overtime_pay: round2(overtime_pay),
        gross_salary: round2(basic_salary + overtime_pay),
    })
}

/// The editable money components of a payslip.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PayslipComponents {
    pub basic_salary: f64,
    pub overtime_pay: f64,
    pub bonuses: f64,
    pub allowances: f64,
    pub insurance: f64,
    pub other_deductions: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, ToSchema)]
pub struct PayslipTotals {
    pub gross_salary: f64,
    pub tax: f64,
    pub total_deductions: f64,
    pub net_salary: f64,
}

/// gross = basic + overtime + bonuses + allowances, tax on gross,
/// net = gross - (tax + insurance + other).
pub fn payslip_totals(c: &PayslipComponents, tax_rate: f64) -> ApiResult<PayslipTotals> {
    let parts = [
        c.basic_salary,
        c.overtime_pay,
        c.bonuses,
        c.allowances,
        c.insurance,
        c.other_deductions,
    ];
    if parts.iter().any(|v| *v < 0.0 || !v.is_finite()) {
        return Err(ApiError::validation("Payslip amounts must be non-negative numbers"));
    }

    let gross = round2(c.basic_salary + c.overtime_pay + c.bonuses + c.allowances);
    let tax = round2(gross * tax_rate);
    let total_deductions = round2(tax + c.insurance + c.other_deductions);

    Ok(PayslipTotals {
        gross_salary: gross,
        tax,
        total_deductions,
        net_salary: round2(gross - total_deductions),
    })
}

pub fn ensure_editable(status: &str) -> ApiResult<()> {
    if status == PayrollStatus::Paid.as_ref() {
        return Err(ApiError::validation("A paid payslip cannot be edited"));
    }
    Ok(())
}

pub fn ensure_payable(status: &str) -> ApiResult<()> {
    if status != PayrollStatus::Processed.as_ref() {
        return Err(ApiError::validation(format!(
            "Only processed payslips can be marked paid, this one is {status}"
        )));
    }
    Ok(())
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, ToSchema)]
pub struct PayrollSummary {
    pub slip_count: i64,
    pub total_gross: f64,
    pub total_net: f64,
    pub total_deductions: f64,
    pub total_overtime_pay: f64,
    pub total_bonuses: f64,
    pub paid_count: i64,
    pub pending_count: i64,
    /// Department name to net pay
    pub net_by_department: BTreeMap<String, f64>,
}

/// `slips` pairs every payslip with its employee's department name.
pub fn summarize(slips: &[(PayrollSlip, String)]) -> PayrollSummary {
    let mut summary = PayrollSummary {
        slip_count: slips.len() as i64,
        ..Default::default()
    };

    for (slip, department) in slips {
        summary.total_gross += slip.gross_salary;
        summary.total_net += slip.net_salary;
        summary.total_deductions += slip.total_deductions();
        summary.total_overtime_pay += slip.overtime_pay;
        summary.total_bonuses += slip.bonuses;
        if slip.status == PayrollStatus::Paid.as_ref() {
            summary.paid_count += 1;
        } else {
            summary.pending_count += 1;
        }
        *summary
            .net_by_department
            .entry(department.clone())
            .or_insert(0.0) += slip.net_salary;
    }

    summary.total_gross = round2(summary.total_gross);
    summary.total_net = round2(summary.total_net);
    summary.total_deductions = round2(summary.total_deductions);
    summary.total_overtime_pay = round2(summary.total_overtime_pay);
    summary.total_bonuses = round2(summary.total_bonuses);
    for v in summary.net_by_department.values_mut() {
        *v = round2(*v);
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};

    fn slip(gross: f64, net: f64, status: PayrollStatus) -> PayrollSlip {
        PayrollSlip {
            id: 1,
            employee_id: 1,
            period_start: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            period_end: NaiveDate::from_ymd_opt(2026, 1, 31).unwrap(),
            basic_salary: gross,
            overtime_pay: 0.0,
            bonuses: 0.0,
            allowances: 0.0,
            tax: gross - net,
            insurance: 0.0,
            other_deductions: 0.0,
            gross_salary: gross,
            net_salary: net,
            days_worked: 20,
            hours_worked: 160.0,
            overtime_hours: 0.0,
            status: status.to_string(),
            payment_date: None,
            payment_method: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn monthly_salary_pays_overtime_at_one_and_a_half() {
        let policy = Policy::default();
        let calc = calculate(160_000.0, SalaryType::Monthly, &[8.0, 10.0, 9.0], &policy).unwrap();
        assert_eq!(calc.basic_salary, 160_000.0);
        assert_eq!(calc.hourly_rate, 1000.0);
        assert_eq!(calc.overtime_hours, 3.0);
        assert_eq!(calc.overtime_pay, 4500.0);
        assert_eq!(calc.gross_salary, 164_500.0);
        assert_eq!(calc.days_worked, 3);
    }

    #[test]
    fn hourly_salary_multiplies_hours() {
        let policy = Policy::default();
        let calc = calculate(500.0, SalaryType::Hourly, &[8.0, 9.0], &policy).unwrap();
        assert_eq!(calc.basic_salary, 8500.0);
        assert_eq!(calc.overtime_pay, 750.0);
    }

    #[test]
    fn daily_salary_multiplies_days() {
        let policy = Policy::default();
        let calc = calculate(8000.0, SalaryType::Daily, &[8.0, 8.0, 12.0], &policy).unwrap();
        assert_eq!(calc.basic_salary, 24_000.0);
        assert_eq!(calc.hourly_rate, 1000.0);
        assert_eq!(calc.overtime_pay, 6000.0);
    }

    #[test]
    fn no_attendance_means_no_overtime() {
        let calc = calculate(1000.0, SalaryType::Monthly, &[], &Policy::default()).unwrap();
        assert_eq!(calc.gross_salary, 1000.0);
        assert_eq!(calc.days_worked, 0);
    }

    #[test]
    fn net_is_gross_minus_deductions() {
        let components = PayslipComponents {
            basic_salary: 100_000.0,
            overtime_pay: 5000.0,
            bonuses: 3000.0,
            allowances: 2000.0,
            insurance: 1500.0,
            other_deductions: 500.0,
        };
        let totals = payslip_totals(&components, 0.15).unwrap();
        assert_eq!(totals.gross_salary, 110_000.0);
        assert_eq!(totals.tax, 16_500.0);
        assert_eq!(totals.total_deductions, 18_500.0);
        assert_eq!(totals.net_salary, totals.gross_salary - totals.total_deductions);
    }

    #[test]
    fn negative_components_are_rejected() {
        let components = PayslipComponents {
            bonuses: -1.0,
            ..Default::default()
        };
        assert!(payslip_totals(&components, 0.15).is_err());
    }

    #[test]
    fn status_guards() {
        assert!(ensure_editable("paid").is_err());
        assert!(ensure_editable("processed").is_ok());
        assert!(ensure_payable("processed").is_ok());
        assert!(ensure_payable("draft").is_err());
    }

    #[test]
    fn summary_groups_by_department() {
        let slips = vec![
            (slip(1000.0, 850.0, PayrollStatus::Paid), "Sales".to_string()),
            (slip(2000.0, 1700.0, PayrollStatus::Processed), "Sales".to_string()),
            (slip(500.0, 425.0, PayrollStatus::Processed), "Stores".to_string()),
        ];
        let summary = summarize(&slips);
        assert_eq!(summary.total_gross, 3500.0);
        assert_eq!(summary.total_net, 2975.0);
        assert_eq!(summary.total_deductions, 525.0);
        assert_eq!(summary.paid_count, 1);
        assert_eq!(summary.pending_count, 2);
        assert_eq!(summary.net_by_department["Sales"], 2550.0);
    }
}
