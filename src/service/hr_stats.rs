use std::collections::BTreeMap;

use serde::Serialize;
use utoipa::ToSchema;

use crate::error::{ApiError, ApiResult};
use crate::model::benefit::Benefit;
use crate::model::employee::{Employee, EmployeeStatus};
use crate::model::performance::{PerformanceReview, ReviewStatus};
use crate::model::training::{TrainingProgram, TrainingStatus};
use crate::service::export::CsvRow;
use crate::service::{percentage, round2};

pub const TOP_PERFORMER_RATING: f64 = 4.5;
pub const NEEDS_IMPROVEMENT_RATING: f64 = 3.0;

/// Mean of the five ratings; each must be 1..=5.
pub fn overall_rating(ratings: &[i32; 5]) -> ApiResult<f64> {
    if ratings.iter().any(|r| !(1..=5).contains(r)) {
        return Err(ApiError::validation("Ratings must be between 1 and 5"));
    }
    Ok(round2(ratings.iter().sum::<i32>() as f64 / 5.0))
}

/// draft -> submitted -> acknowledged
pub fn next_review_status(current: &str, target: ReviewStatus) -> ApiResult<ReviewStatus> {
    let current: ReviewStatus = current
        .parse()
        .map_err(|_| ApiError::validation(format!("Unknown review status {current}")))?;
    match (current, target) {
        (ReviewStatus::Draft, ReviewStatus::Submitted)
        | (ReviewStatus::Submitted, ReviewStatus::Acknowledged) => Ok(target),
        _ => Err(ApiError::validation(format!(
            "Cannot move a {current} review to {target}"
        ))),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct RatingBucket {
    pub rating: u8,
    pub count: i64,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct PerformanceStats {
    pub total_reviews: i64,
    pub average_rating: f64,
    pub top_performers: i64,
    pub needs_improvement: i64,
    pub distribution: Vec<RatingBucket>,
}

pub fn performance_stats(reviews: &[PerformanceReview]) -> PerformanceStats {
    let total = reviews.len() as i64;
    let sum: f64 = reviews.iter().map(|r| r.overall_rating).sum();

    let distribution = (1..=5u8)
        .map(|bucket| {
            let count = reviews
                .iter()
                .filter(|r| (r.overall_rating.floor() as i64).clamp(1, 5) == bucket as i64)
                .count() as i64;
            RatingBucket {
                rating: bucket,
                count,
                percentage: percentage(count as f64, total as f64),
            }
        })
        .collect();

    PerformanceStats {
        total_reviews: total,
        average_rating: if total == 0 { 0.0 } else { round2(sum / total as f64) },
        top_performers: reviews
            .iter()
            .filter(|r| r.overall_rating >= TOP_PERFORMER_RATING)
            .count() as i64,
        needs_improvement: reviews
            .iter()
            .filter(|r| r.overall_rating < NEEDS_IMPROVEMENT_RATING)
            .count() as i64,
        distribution,
    }
}

pub fn ensure_capacity(program: &TrainingProgram) -> ApiResult<()> {
    if program.current_participants >= program.max_participants {
        return Err(ApiError::conflict("Training program is full"));
    }
    if matches!(
        program.status.parse::<TrainingStatus>(),
        Ok(TrainingStatus::Completed | TrainingStatus::Cancelled)
    ) {
        return Err(ApiError::validation("Training program is closed for enrolment"));
    }
    Ok(())
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, ToSchema)]
pub struct TrainingStats {
    pub total_programs: i64,
    pub active: i64,
    pub upcoming: i64,
    pub completed: i64,
    pub total_participants: i64,
    pub total_cost: f64,
    pub completion_rate: f64,
}

pub fn training_stats(programs: &[TrainingProgram]) -> TrainingStats {
    let count = |s: TrainingStatus| programs.iter().filter(|p| p.status == s.as_ref()).count() as i64;
    let total = programs.len() as i64;
    let completed = count(TrainingStatus::Completed);
    TrainingStats {
        total_programs: total,
        active: count(TrainingStatus::Active),
        upcoming: count(TrainingStatus::Upcoming),
        completed,
        total_participants: programs.iter().map(|p| p.current_participants as i64).sum(),
        total_cost: round2(programs.iter().map(|p| p.cost).sum()),
        completion_rate: percentage(completed as f64, total as f64),
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, ToSchema)]
pub struct BenefitStats {
    pub active: i64,
    pub total_enrolled: i64,
    pub average_employer_contribution: f64,
}

pub fn benefit_stats(benefits: &[Benefit]) -> BenefitStats {
    let active: Vec<&Benefit> = benefits.iter().filter(|b| b.status == "active").collect();
    let avg = if active.is_empty() {
        0.0
    } else {
        round2(active.iter().map(|b| b.employer_contribution).sum::<f64>() / active.len() as f64)
    };
    BenefitStats {
        active: active.len() as i64,
        total_enrolled: benefits.iter().map(|b| b.enrolled as i64).sum(),
        average_employer_contribution: avg,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct DepartmentHeadcount {
    pub department: String,
    pub headcount: i64,
    pub average_salary: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct HeadcountReport {
    pub total: i64,
    pub active: i64,
    pub by_department: Vec<DepartmentHeadcount>,
    pub by_status: BTreeMap<String, i64>,
    pub by_employment_type: BTreeMap<String, i64>,
}

/// `employees` pairs each employee with its department name ("Unassigned"
/// when it has none).
pub fn headcount_report(employees: &[(Employee, String)]) -> HeadcountReport {
    let mut departments: BTreeMap<String, (i64, f64)> = BTreeMap::new();
    let mut by_status = BTreeMap::new();
    let mut by_employment_type = BTreeMap::new();

    for (employee, department) in employees {
        let entry = departments.entry(department.clone()).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += employee.salary;
        *by_status.entry(employee.status.clone()).or_insert(0) += 1;
        *by_employment_type
            .entry(employee.employment_type.clone())
            .or_insert(0) += 1;
    }

    HeadcountReport {
        total: employees.len() as i64,
        active: employees
            .iter()
            .filter(|(e, _)| e.status == EmployeeStatus::Active.as_ref())
            .count() as i64,
        by_department: departments
            .into_iter()
            .map(|(department, (headcount, salary))| DepartmentHeadcount {
                department,
                headcount,
                average_salary: round2(salary / headcount as f64),
            })
            .collect(),
        by_status,
        by_employment_type,
    }
}

impl CsvRow for DepartmentHeadcount {
    fn columns() -> &'static [&'static str] {
        &["department", "headcount", "average_salary"]
    }

    fn cells(&self) -> Vec<String> {
        vec![
            self.department.clone(),
            self.headcount.to_string(),
            self.average_salary.to_string(),
        ]
    }
}

pub fn average_salary(employees: &[(Employee, String)]) -> f64 {
    if employees.is_empty() {
        return 0.0;
    }
    round2(employees.iter().map(|(e, _)| e.salary).sum::<f64>() / employees.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};

    fn review(rating: f64) -> PerformanceReview {
        PerformanceReview {
            id: 1,
            employee_id: 1,
            reviewer_id: None,
            period_start: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            period_end: NaiveDate::from_ymd_opt(2026, 6, 30).unwrap(),
            quality_of_work: 3,
            productivity: 3,
            communication: 3,
            teamwork: 3,
            punctuality: 3,
            overall_rating: rating,
            strengths: String::new(),
            improvements: String::new(),
            goals: String::new(),
            status: "draft".into(),
            created_at: Utc::now(),
        }
    }

    fn employee(status: &str, salary: f64) -> Employee {
        Employee {
            id: 1,
            employee_code: "EMP-1".into(),
            first_name: "Tiya".into(),
            last_name: "Banda".into(),
            email: "t@example.com".into(),
            phone: None,
            department_id: None,
            position_id: None,
            location_id: None,
            hire_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            probation_end_date: None,
            salary,
            salary_type: "monthly".into(),
            employment_type: "full_time".into(),
            status: status.into(),
            annual_leave_balance: 21,
            sick_leave_balance: 10,
        }
    }

    #[test]
    fn overall_is_the_mean() {
        assert_eq!(overall_rating(&[5, 4, 4, 3, 5]).unwrap(), 4.2);
        assert!(overall_rating(&[0, 4, 4, 3, 5]).is_err());
        assert!(overall_rating(&[6, 4, 4, 3, 5]).is_err());
    }

    #[test]
    fn review_workflow_is_ordered() {
        assert_eq!(
            next_review_status("draft", ReviewStatus::Submitted).unwrap(),
            ReviewStatus::Submitted
        );
        assert!(next_review_status("draft", ReviewStatus::Acknowledged).is_err());
        assert!(next_review_status("acknowledged", ReviewStatus::Submitted).is_err());
    }

    #[test]
    fn performance_distribution() {
        let reviews = vec![review(4.6), review(4.2), review(2.4), review(3.0)];
        let stats = performance_stats(&reviews);
        assert_eq!(stats.top_performers, 1);
        assert_eq!(stats.needs_improvement, 1);
        assert_eq!(stats.average_rating, 3.55);
        assert_eq!(stats.distribution[3].count, 2);
        assert_eq!(stats.distribution[3].percentage, 50.0);
        assert_eq!(stats.distribution[1].count, 1);
    }

    #[test]
    fn headcount_groups_and_filters() {
        let employees = vec![
            (employee("active", 1000.0), "Sales".to_string()),
            (employee("active", 3000.0), "Sales".to_string()),
            (employee("probation", 500.0), "Stores".to_string()),
        ];
        let report = headcount_report(&employees);
        assert_eq!(report.total, 3);
        assert_eq!(report.active, 2);
        assert_eq!(report.by_department[0].department, "Sales");
        assert_eq!(report.by_department[0].average_salary, 2000.0);
        assert_eq!(report.by_status["probation"], 1);
        assert_eq!(average_salary(&employees), 1500.0);
    }

    fn program(status: &str, current: i32, max: i32, cost: f64) -> TrainingProgram {
        TrainingProgram {
            id: 1,
            title: "Food safety".into(),
            category: "compliance".into(),
            start_date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2026, 3, 5).unwrap(),
            max_participants: max,
            current_participants: current,
            cost,
            status: status.into(),
        }
    }

    fn benefit(status: &str, employer: f64, enrolled: i32) -> Benefit {
        Benefit {
            id: 1,
            name: "Health cover".into(),
            benefit_type: "health".into(),
            provider: "Acme Mutual".into(),
            employer_contribution: employer,
            employee_contribution: 100.0 - employer,
            enrolled,
            status: status.into(),
        }
    }

    #[test]
    fn full_or_closed_programs_refuse_enrolment() {
        assert!(ensure_capacity(&program("upcoming", 9, 10, 0.0)).is_ok());
        assert!(matches!(
            ensure_capacity(&program("active", 10, 10, 0.0)),
            Err(ApiError::Conflict(_))
        ));
        assert!(matches!(
            ensure_capacity(&program("completed", 2, 10, 0.0)),
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            ensure_capacity(&program("cancelled", 0, 10, 0.0)),
            Err(ApiError::Validation(_))
        ));
    }

    #[test]
    fn training_completion_rate() {
        let programs = vec![
            program("completed", 10, 10, 500.0),
            program("active", 4, 10, 250.5),
            program("upcoming", 0, 8, 100.0),
        ];
        let stats = training_stats(&programs);
        assert_eq!(stats.total_programs, 3);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.active, 1);
        assert_eq!(stats.upcoming, 1);
        assert_eq!(stats.total_participants, 14);
        assert_eq!(stats.total_cost, 850.5);
        assert_eq!(stats.completion_rate, 33.33);

        assert_eq!(training_stats(&[]), TrainingStats::default());
    }

    #[test]
    fn employer_average_covers_active_benefits_only() {
        let benefits = vec![
            benefit("active", 80.0, 12),
            benefit("active", 50.0, 3),
            benefit("inactive", 10.0, 5),
        ];
        let stats = benefit_stats(&benefits);
        assert_eq!(stats.active, 2);
        assert_eq!(stats.total_enrolled, 20);
        assert_eq!(stats.average_employer_contribution, 65.0);

        let none = benefit_stats(&[benefit("inactive", 90.0, 1)]);
        assert_eq!(none.active, 0);
        assert_eq!(none.average_employer_contribution, 0.0);
    }
}
