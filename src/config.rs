use std::env;
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::NaiveTime;
use dotenvy::dotenv;

use crate::model::leave::LedgerMode;
use crate::model::schedule::{EffectiveSchedule, MONDAY_TO_FRIDAY};
use crate::utils::geo::Geofence;

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub server_addr: String,
    pub access_token_ttl: usize,
    pub refresh_token_ttl: usize,

    // Rate limiting
    pub rate_login_per_min: u32,
    pub rate_refresh_per_min: u32,
    pub rate_protected_per_min: u32,

    pub api_prefix: String,
    pub login_url: String,

    pub attendance: AttendanceSettings,
    pub ledger_mode: LedgerMode,

    /// First HR login, created at startup when no account has that username.
    pub bootstrap_hr: Option<(String, String)>,
}

/// Fallbacks for employees without a bound schedule or active policy, plus
/// the optional workplace geofence.
#[derive(Debug, Clone)]
pub struct AttendanceSettings {
    pub default_scheduled_hours: f64,
    pub default_start: NaiveTime,
    pub default_end: NaiveTime,
    pub default_grace_minutes: u32,
    pub geofence: Option<Geofence>,
}

impl Default for AttendanceSettings {
    fn default() -> Self {
        Self {
            default_scheduled_hours: 8.0,
            default_start: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or_default(),
            default_end: NaiveTime::from_hms_opt(17, 0, 0).unwrap_or_default(),
            default_grace_minutes: 15,
            geofence: None,
        }
    }
}

fn required(key: &str) -> Result<String> {
    env::var(key).with_context(|| format!("{key} must be set"))
}

fn parsed_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} has an invalid value: {raw}")),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        Ok(Self {
            server_addr: required("SERVER_ADDR")?,
            database_url: required("DATABASE_URL")?,
            jwt_secret: required("JWT_SECRET")?,
            access_token_ttl: parsed_or("ACCESS_TOKEN_TTL", 900)?, // default 15 min
            refresh_token_ttl: parsed_or("REFRESH_TOKEN_TTL", 604_800)?, // default 7 days

            rate_login_per_min: parsed_or("RATE_LOGIN_PER_MIN", 60)?,
            rate_refresh_per_min: parsed_or("RATE_REFRESH_PER_MIN", 30)?,
            rate_protected_per_min: parsed_or("RATE_PROTECTED_PER_MIN", 1000)?,

            api_prefix: env::var("API_PREFIX").unwrap_or_else(|_| "/api".to_string()),
            login_url: env::var("LOGIN_URL")
                .unwrap_or_else(|_| "http://localhost:5173/login".to_string()),

            attendance: AttendanceSettings::from_env()?,
            ledger_mode: if parsed_or("LEAVE_RESERVE_ON_SUBMIT", false)? {
                LedgerMode::ReserveOnSubmit
            } else {
                LedgerMode::OnApproval
            },
            bootstrap_hr: match (env::var("HR_BOOTSTRAP_USERNAME"), env::var("HR_BOOTSTRAP_PASSWORD")) {
                (Ok(username), Ok(password)) => Some((username, password)),
                _ => None,
            },
        })
    }
}

impl AttendanceSettings {
    /// Shift used when an employee has neither a bound schedule nor an
    /// active policy.
    pub fn fallback_schedule(&self) -> EffectiveSchedule {
        EffectiveSchedule {
            start: self.default_start,
            end: self.default_end,
            late_grace_minutes: self.default_grace_minutes,
            early_grace_minutes: self.default_grace_minutes,
            scheduled_hours: self.default_scheduled_hours,
            working_days: MONDAY_TO_FRIDAY,
        }
    }

    fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let geofence = if parsed_or("GEOFENCE_ENABLED", false)? {
            Some(Geofence {
                latitude: parsed_or("WORKPLACE_LATITUDE", 0.0)?,
                longitude: parsed_or("WORKPLACE_LONGITUDE", 0.0)?,
                allowed_radius_meters: parsed_or("ALLOWED_RADIUS_METERS", 100.0)?,
            })
        } else {
            None
        };

        Ok(Self {
            default_scheduled_hours: parsed_or(
                "DEFAULT_SCHEDULED_HOURS",
                defaults.default_scheduled_hours,
            )?,
            default_start: parsed_or("DEFAULT_WORK_START", defaults.default_start)?,
            default_end: parsed_or("DEFAULT_WORK_END", defaults.default_end)?,
            default_grace_minutes: parsed_or(
                "DEFAULT_GRACE_MINUTES",
                defaults.default_grace_minutes,
            )?,
            geofence,
        })
    }
}
