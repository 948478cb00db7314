use std::{env, fmt::Display, str::FromStr};

use anyhow::{bail, Result};
use tracing::info;

use crate::domain::rules::EligibilityPolicy;

/// Runtime configuration, loaded from the environment.
///
/// The admin credential pair is the single source of truth for login checks;
/// the password has no default.
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub cors_origin: String,
    pub admin_username: String,
    pub admin_password: String,
    pub eligibility_policy: EligibilityPolicy,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        let admin_password = match env::var("ADMIN_PASSWORD") {
            Ok(v) if !v.trim().is_empty() => v,
            _ => bail!("ADMIN_PASSWORD must be set"),
        };

        let eligibility_policy = match env::var("ELIGIBILITY_POLICY") {
            Ok(v) => match v.parse::<EligibilityPolicy>() {
                Ok(policy) => policy,
                Err(e) => bail!("Invalid ELIGIBILITY_POLICY: {e}"),
            },
            Err(_) => EligibilityPolicy::default(),
        };

        Ok(Self {
            port: try_load("PORT", "5000"),
            database_url: try_load("DATABASE_URL", "sqlite:vaccination_portal.db"),
            cors_origin: try_load("CORS_ORIGIN", "http://localhost:3000"),
            admin_username: try_load("ADMIN_USERNAME", "admin"),
            admin_password,
            eligibility_policy,
        })
    }
}

fn try_load<T: FromStr>(key: &str, default: &str) -> T
where
    T::Err: Display,
{
    env::var(key)
        .unwrap_or_else(|_| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .unwrap_or_else(|e| panic!("Invalid {key} value: {e}"))
}
