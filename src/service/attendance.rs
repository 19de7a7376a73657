use chrono::{NaiveDateTime, NaiveTime};
use serde::Serialize;
use utoipa::ToSchema;

use crate::error::{ApiError, ApiResult};
use crate::model::attendance::{Attendance, AttendanceStatus};
use crate::service::{percentage, round2};

/// Status for a clock-in: late strictly after the policy cut-off.
pub fn status_for_clock_in(clock_in: NaiveTime, late_after: NaiveTime) -> AttendanceStatus {
    if clock_in > late_after {
        AttendanceStatus::Late
    } else {
        AttendanceStatus::Present
    }
}

/// Hours between clock-in and clock-out, two decimals.
pub fn worked_hours(clock_in: NaiveDateTime, clock_out: NaiveDateTime) -> ApiResult<f64> {
    if clock_out < clock_in {
        return Err(ApiError::validation("Clock-out cannot be before clock-in"));
    }
    let seconds = (clock_out - clock_in).num_seconds() as f64;
    Ok(round2(seconds / 3600.0))
}

pub fn overtime_hours(hours: f64, standard_daily_hours: f64) -> f64 {
    round2((hours - standard_daily_hours).max(0.0))
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, ToSchema)]
pub struct StatusShare {
    pub count: i64,
    pub percentage: f64,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, ToSchema)]
pub struct AttendanceSummary {
    pub total: i64,
    pub present: StatusShare,
    pub absent: StatusShare,
    pub late: StatusShare,
    pub half_day: StatusShare,
    pub leave: StatusShare,
    /// present / total * 100
    pub attendance_rate: f64,
    pub average_hours: f64,
    pub total_hours: f64,
    pub total_overtime: f64,
}

pub fn summarize(records: &[Attendance]) -> AttendanceSummary {
    let total = records.len() as i64;
    let count = |status: AttendanceStatus| {
        records.iter().filter(|r| r.status == status.as_ref()).count() as i64
    };
    let share = |status: AttendanceStatus| {
        let n = count(status);
        StatusShare {
            count: n,
            percentage: percentage(n as f64, total as f64),
        }
    };

    let hours: Vec<f64> = records.iter().filter_map(|r| r.hours_worked).collect();
    let total_hours: f64 = hours.iter().sum();
    let average_hours = if hours.is_empty() {
        0.0
    } else {
        round2(total_hours / hours.len() as f64)
    };

    let present = share(AttendanceStatus::Present);

    AttendanceSummary {
        total,
        attendance_rate: present.percentage,
        present,
        absent: share(AttendanceStatus::Absent),
        late: share(AttendanceStatus::Late),
        half_day: share(AttendanceStatus::HalfDay),
        leave: share(AttendanceStatus::Leave),
        average_hours,
        total_hours: round2(total_hours),
        total_overtime: round2(records.iter().map(|r| r.overtime_hours).sum()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn record(status: AttendanceStatus, hours: Option<f64>, overtime: f64) -> Attendance {
        Attendance {
            id: 1,
            employee_id: 1,
            date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            clock_in: None,
            clock_out: None,
            status: status.to_string(),
            hours_worked: hours,
            overtime_hours: overtime,
            notes: String::new(),
        }
    }

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 2).unwrap().and_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn late_only_after_cut_off() {
        let cut_off = NaiveTime::from_hms_opt(9, 15, 0).unwrap();
        assert_eq!(
            status_for_clock_in(NaiveTime::from_hms_opt(9, 15, 0).unwrap(), cut_off),
            AttendanceStatus::Present
        );
        assert_eq!(
            status_for_clock_in(NaiveTime::from_hms_opt(9, 16, 0).unwrap(), cut_off),
            AttendanceStatus::Late
        );
    }

    #[test]
    fn hours_and_overtime() {
        let hours = worked_hours(at(8, 0), at(18, 30)).unwrap();
        assert_eq!(hours, 10.5);
        assert_eq!(overtime_hours(hours, 8.0), 2.5);
        assert_eq!(overtime_hours(6.0, 8.0), 0.0);
        assert!(worked_hours(at(12, 0), at(8, 0)).is_err());
    }

    #[test]
    fn attendance_rate_uses_present_over_total() {
        let records = vec![
            record(AttendanceStatus::Present, Some(8.0), 0.0),
            record(AttendanceStatus::Present, Some(9.0), 1.0),
            record(AttendanceStatus::Late, Some(7.0), 0.0),
            record(AttendanceStatus::Absent, None, 0.0),
        ];
        let summary = summarize(&records);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.present.count, 2);
        assert_eq!(summary.attendance_rate, 50.0);
        assert_eq!(summary.absent.percentage, 25.0);
        assert_eq!(summary.average_hours, 8.0);
        assert_eq!(summary.total_hours, 24.0);
        assert_eq!(summary.total_overtime, 1.0);
    }

    #[test]
    fn empty_input_reports_zeroes() {
        let summary = summarize(&[]);
        assert_eq!(summary.attendance_rate, 0.0);
        assert_eq!(summary.average_hours, 0.0);
        assert_eq!(summary.total, 0);
    }
}
