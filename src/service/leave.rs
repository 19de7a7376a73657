use chrono::NaiveDate;
use serde::Serialize;
use utoipa::ToSchema;

use crate::config::Policy;
use crate::error::{ApiError, ApiResult};
use crate::model::leave_request::{LeaveRequest, LeaveStatus, LeaveType};
use crate::service::percentage;

/// Calendar days from start to end, both included.
pub fn inclusive_days(start: NaiveDate, end: NaiveDate) -> ApiResult<i32> {
    if end < start {
        return Err(ApiError::validation("End date cannot be before start date"));
    }
    Ok((end - start).num_days() as i32 + 1)
}

/// Employee column holding the balance a leave type draws from, if any.
pub fn balance_column(leave_type: LeaveType) -> Option<&'static str> {
    match leave_type {
        LeaveType::Annual => Some("annual_leave_balance"),
        LeaveType::Sick => Some("sick_leave_balance"),
        _ => None,
    }
}

pub fn check_balance(leave_type: LeaveType, balance: i32, days: i32) -> ApiResult<()> {
    if balance_column(leave_type).is_some() && balance < days {
        return Err(ApiError::validation(format!(
            "Insufficient {leave_type} leave balance"
        )));
    }
    Ok(())
}

pub fn ensure_pending(status: &str) -> ApiResult<()> {
    if status != LeaveStatus::Pending.as_ref() {
        return Err(ApiError::validation(format!(
            "Only pending requests can be changed, this one is {status}"
        )));
    }
    Ok(())
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, ToSchema)]
pub struct LeaveStats {
    pub total: i64,
    pub pending: i64,
    pub approved: i64,
    pub rejected: i64,
    pub cancelled: i64,
    pub total_days: i64,
    pub approved_days: i64,
    /// approved / total * 100
    pub approval_rate: f64,
}

pub fn leave_stats(requests: &[LeaveRequest]) -> LeaveStats {
    let mut stats = LeaveStats {
        total: requests.len() as i64,
        ..Default::default()
    };
    for r in requests {
        stats.total_days += r.days_requested as i64;
        match r.status.parse::<LeaveStatus>() {
            Ok(LeaveStatus::Pending) => stats.pending += 1,
            Ok(LeaveStatus::Approved) => {
                stats.approved += 1;
                stats.approved_days += r.days_requested as i64;
            }
            Ok(LeaveStatus::Rejected) => stats.rejected += 1,
            Ok(LeaveStatus::Cancelled) => stats.cancelled += 1,
            Err(_) => {}
        }
    }
    stats.approval_rate = percentage(stats.approved as f64, stats.total as f64);
    stats
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct LeaveBalance {
    pub leave_type: LeaveType,
    pub allotment: i32,
    pub used: i32,
    pub remaining: i32,
}

/// Remaining = allotment - approved days, per balance-tracked type.
pub fn leave_balances(policy: &Policy, requests: &[LeaveRequest]) -> Vec<LeaveBalance> {
    [
        (LeaveType::Annual, policy.annual_leave_allotment),
        (LeaveType::Sick, policy.sick_leave_allotment),
    ]
    .into_iter()
    .map(|(leave_type, allotment)| {
        let used = requests
            .iter()
            .filter(|r| r.status == LeaveStatus::Approved.as_ref())
            .filter(|r| r.leave_type == leave_type.as_ref())
            .map(|r| r.days_requested)
            .sum();
        LeaveBalance {
            leave_type,
            allotment,
            used,
            remaining: allotment - used,
        }
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 5, day).unwrap()
    }

    fn request(leave_type: LeaveType, status: LeaveStatus, days: i32) -> LeaveRequest {
        LeaveRequest {
            id: 1,
            employee_id: 4,
            leave_type: leave_type.to_string(),
            start_date: d(1),
            end_date: d(days as u32),
            days_requested: days,
            status: status.to_string(),
            reason: "family".into(),
            rejection_reason: None,
            approved_by: None,
            approved_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn days_are_inclusive() {
        assert_eq!(inclusive_days(d(4), d(4)).unwrap(), 1);
        assert_eq!(inclusive_days(d(4), d(8)).unwrap(), 5);
        assert!(inclusive_days(d(8), d(4)).is_err());
    }

    #[test]
    fn only_tracked_types_need_balance() {
        assert!(check_balance(LeaveType::Annual, 2, 3).is_err());
        assert!(check_balance(LeaveType::Sick, 3, 3).is_ok());
        assert!(check_balance(LeaveType::Unpaid, 0, 30).is_ok());
        let err = check_balance(LeaveType::Annual, 0, 1).unwrap_err();
        assert_eq!(err.to_string(), "Insufficient annual leave balance");
    }

    #[test]
    fn remaining_is_allotment_minus_approved() {
        let policy = Policy::default();
        let requests = vec![
            request(LeaveType::Annual, LeaveStatus::Approved, 5),
            request(LeaveType::Annual, LeaveStatus::Pending, 3),
            request(LeaveType::Sick, LeaveStatus::Approved, 2),
            request(LeaveType::Annual, LeaveStatus::Rejected, 4),
        ];
        let balances = leave_balances(&policy, &requests);
        assert_eq!(balances[0].used, 5);
        assert_eq!(balances[0].remaining, 16);
        assert_eq!(balances[1].remaining, 8);
    }

    #[test]
    fn stats_count_by_status() {
        let requests = vec![
            request(LeaveType::Annual, LeaveStatus::Approved, 5),
            request(LeaveType::Sick, LeaveStatus::Pending, 1),
            request(LeaveType::Annual, LeaveStatus::Rejected, 2),
            request(LeaveType::Annual, LeaveStatus::Approved, 3),
        ];
        let stats = leave_stats(&requests);
        assert_eq!(stats.approved, 2);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.total_days, 11);
        assert_eq!(stats.approved_days, 8);
        assert_eq!(stats.approval_rate, 50.0);
    }

    #[test]
    fn pending_guard() {
        assert!(ensure_pending("pending").is_ok());
        assert!(ensure_pending("approved").is_err());
    }
}
