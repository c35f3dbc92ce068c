use std::net::SocketAddr;
use std::str::FromStr;

use crate::models::MinorUnits;
use crate::services::billing_service::DEFAULT_SEGMENT_COST;

/// Which ledger backend to run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Postgres,
    Memory,
}

impl FromStr for StoreKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgres" => Ok(StoreKind::Postgres),
            "memory" => Ok(StoreKind::Memory),
            other => Err(format!(
                "Invalid LEDGER_STORE: {}. Must be 'postgres' or 'memory'",
                other
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub store: StoreKind,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub bind_addr: SocketAddr,
    pub sms_segment_cost: MinorUnits,
    pub reconciliation_schedule: String,
    pub reconciliation_auto_repair: bool,
    pub job_scheduler_enabled: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store: StoreKind::Postgres,
            database_url: None,
            database_max_connections: 10,
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            sms_segment_cost: DEFAULT_SEGMENT_COST,
            reconciliation_schedule: "0 20 * * * *".to_string(),
            reconciliation_auto_repair: false,
            job_scheduler_enabled: true,
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> Result<T, String> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| format!("Invalid value for {}: {:?}", key, raw)),
        Err(_) => Ok(default),
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, String> {
        let defaults = Self::default();
        Ok(Self {
            store: env_or("LEDGER_STORE", defaults.store)?,
            database_url: std::env::var("DATABASE_URL").ok(),
            database_max_connections: env_or("DATABASE_MAX_CONNECTIONS", defaults.database_max_connections)?,
            bind_addr: env_or("BIND_ADDR", defaults.bind_addr)?,
            sms_segment_cost: env_or("SMS_SEGMENT_COST_MINOR", defaults.sms_segment_cost)?,
            reconciliation_schedule: std::env::var("RECONCILIATION_SCHEDULE")
                .unwrap_or(defaults.reconciliation_schedule),
            reconciliation_auto_repair: env_or("RECONCILIATION_AUTO_REPAIR", defaults.reconciliation_auto_repair)?,
            job_scheduler_enabled: env_or("JOB_SCHEDULER_ENABLED", defaults.job_scheduler_enabled)?,
        })
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.store == StoreKind::Postgres && self.database_url.is_none() {
            return Err("LEDGER_STORE is postgres but DATABASE_URL is not set".to_string());
        }
        if self.database_max_connections == 0 {
            return Err("DATABASE_MAX_CONNECTIONS must be at least 1".to_string());
        }
        if self.sms_segment_cost <= 0 {
            return Err(format!(
                "SMS_SEGMENT_COST_MINOR must be positive, got {}",
                self.sms_segment_cost
            ));
        }
        if self.job_scheduler_enabled && self.reconciliation_schedule.trim().is_empty() {
            return Err("RECONCILIATION_SCHEDULE must not be empty".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_kind_parses_case_insensitively() {
        assert_eq!("Memory".parse::<StoreKind>().unwrap(), StoreKind::Memory);
        assert_eq!("postgres".parse::<StoreKind>().unwrap(), StoreKind::Postgres);
        assert!("redis".parse::<StoreKind>().is_err());
    }

    #[test]
    fn test_postgres_requires_database_url() {
        let config = AppConfig::default();
        assert!(config.validate().is_err());

        let config = AppConfig {
            database_url: Some("postgres://localhost/smsdash".to_string()),
            ..AppConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_memory_store_needs_no_database() {
        let config = AppConfig {
            store: StoreKind::Memory,
            ..AppConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_segment_cost_must_be_positive() {
        let config = AppConfig {
            store: StoreKind::Memory,
            sms_segment_cost: 0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
