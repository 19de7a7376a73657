use anyhow::{Context, Result};
use chrono::NaiveTime;
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;

/// Business rules shared by payroll, attendance, leave and the till.
#[derive(Clone, Debug)]
pub struct Policy {
    pub vat_rate: f64,
    pub payroll_tax_rate: f64,
    pub standard_daily_hours: f64,
    pub monthly_hours: f64,
    pub overtime_multiplier: f64,
    pub annual_leave_allotment: i32,
    pub sick_leave_allotment: i32,
    pub late_after: NaiveTime,
    pub slow_moving_days: i64,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            vat_rate: 0.165,
            payroll_tax_rate: 0.15,
            standard_daily_hours: 8.0,
            monthly_hours: 160.0,
            overtime_multiplier: 1.5,
            annual_leave_allotment: 21,
            sick_leave_allotment: 10,
            late_after: NaiveTime::from_hms_opt(9, 15, 0).unwrap_or_default(),
            slow_moving_days: 30,
        }
    }
}

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub server_addr: String,
    pub access_token_ttl: usize,
    pub refresh_token_ttl: usize,

    // Rate limiting
    pub rate_login_per_min: u32,
    pub rate_register_per_min: u32,
    pub rate_refresh_per_min: u32,
    pub rate_protected_per_min: u32,

    pub api_prefix: String,
    pub log_level: String,

    pub policy: Policy,
}

fn required(key: &str) -> Result<String> {
    env::var(key).with_context(|| format!("{key} must be set"))
}

fn parsed<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{key} is invalid: {e}")),
        Err(_) => Ok(default),
    }
}

impl Policy {
    pub fn from_env() -> Result<Self> {
        let defaults = Policy::default();
        let late_after = match env::var("LATE_AFTER") {
            Ok(raw) => NaiveTime::parse_from_str(raw.trim(), "%H:%M")
                .with_context(|| format!("LATE_AFTER must be HH:MM, got {raw}"))?,
            Err(_) => defaults.late_after,
        };

        Ok(Self {
            vat_rate: parsed("VAT_RATE", defaults.vat_rate)?,
            payroll_tax_rate: parsed("PAYROLL_TAX_RATE", defaults.payroll_tax_rate)?,
            standard_daily_hours: parsed("STANDARD_DAILY_HOURS", defaults.standard_daily_hours)?,
            monthly_hours: parsed("MONTHLY_HOURS", defaults.monthly_hours)?,
            overtime_multiplier: parsed("OVERTIME_MULTIPLIER", defaults.overtime_multiplier)?,
            annual_leave_allotment: parsed(
                "ANNUAL_LEAVE_ALLOTMENT",
                defaults.annual_leave_allotment,
            )?,
            sick_leave_allotment: parsed("SICK_LEAVE_ALLOTMENT", defaults.sick_leave_allotment)?,
            late_after,
            slow_moving_days: parsed("SLOW_MOVING_DAYS", defaults.slow_moving_days)?,
        })
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        Ok(Self {
            server_addr: required("SERVER_ADDR")?,
            database_url: required("DATABASE_URL")?,
            jwt_secret: required("JWT_SECRET")?,
            access_token_ttl: parsed("ACCESS_TOKEN_TTL", 900)?, // 15 min
            refresh_token_ttl: parsed("REFRESH_TOKEN_TTL", 604_800)?, // 7 days

            rate_login_per_min: parsed("RATE_LOGIN_PER_MIN", 60)?,
            rate_register_per_min: parsed("RATE_REGISTER_PER_MIN", 30)?,
            rate_refresh_per_min: parsed("RATE_REFRESH_PER_MIN", 30)?,
            rate_protected_per_min: parsed("RATE_PROTECTED_PER_MIN", 1000)?,

            api_prefix: env::var("API_PREFIX").unwrap_or_else(|_| "/api".to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "debug".to_string()),

            policy: Policy::from_env()?,
        })
    }
}

/// Settings for the offline till agent.
#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub api_url: String,
    pub api_token: String,
    pub location_id: u64,
    pub cache_url: String,
    pub sync_interval_secs: u64,
    pub device_name: String,
    pub log_level: String,
    pub vat_rate: f64,
}

impl AgentConfig {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        Ok(Self {
            api_url: required("POS_API_URL")?.trim_end_matches('/').to_string(),
            api_token: required("POS_API_TOKEN")?,
            location_id: required("POS_LOCATION_ID")?
                .parse()
                .context("POS_LOCATION_ID must be a number")?,
            cache_url: env::var("POS_CACHE_URL")
                .unwrap_or_else(|_| "sqlite://pos-cache.db?mode=rwc".to_string()),
            sync_interval_secs: parsed("POS_SYNC_INTERVAL_SECS", 30)?,
            device_name: env::var("POS_DEVICE_NAME").unwrap_or_else(|_| "till-1".to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            vat_rate: parsed("VAT_RATE", Policy::default().vat_rate)?,
        })
    }
}

#[cfg(test)]
impl Config {
    pub(crate) fn for_tests() -> Self {
        Self {
            database_url: String::new(),
            jwt_secret: "test-secret".into(),
            server_addr: "127.0.0.1:0".into(),
            access_token_ttl: 900,
            refresh_token_ttl: 3600,
            rate_login_per_min: 60,
            rate_register_per_min: 60,
            rate_refresh_per_min: 60,
            rate_protected_per_min: 1000,
            api_prefix: "/api".into(),
            log_level: "debug".into(),
            policy: Policy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_matches_till_rates() {
        let policy = Policy::default();
        assert_eq!(policy.vat_rate, 0.165);
        assert_eq!(policy.annual_leave_allotment, 21);
        assert_eq!(policy.late_after, NaiveTime::from_hms_opt(9, 15, 0).unwrap());
    }

    #[test]
    fn parsed_falls_back_to_default_when_unset() {
        let value: u32 = parsed("ERP_TEST_SURELY_UNSET_VARIABLE", 42).unwrap();
        assert_eq!(value, 42);
    }
}
