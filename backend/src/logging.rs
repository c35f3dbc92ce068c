use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use url::Url;

pub type LoggingError = Box<dyn std::error::Error + Send + Sync>;

const DEFAULT_FILTER: &str = "info,sqlx=warn";

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub service_name: String,
    pub environment: String,
    pub filter: String,
    /// Loki push endpoint; `None` logs to the console only.
    pub loki_url: Option<String>,
}

impl LoggingConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. `LOKI_URL` only counts when `LOKI_ENABLED` is true.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let loki_enabled = lookup("LOKI_ENABLED")
            .and_then(|raw| raw.trim().parse().ok())
            .unwrap_or(false);
        Self {
            service_name: lookup("SERVICE_NAME").unwrap_or_else(|| "smsdash-ledger".to_string()),
            environment: lookup("ENVIRONMENT").unwrap_or_else(|| "development".to_string()),
            filter: lookup("RUST_LOG").unwrap_or_else(|| DEFAULT_FILTER.to_string()),
            loki_url: if loki_enabled {
                Some(lookup("LOKI_URL").unwrap_or_default())
            } else {
                None
            },
        }
    }

    pub fn env_filter(&self) -> Result<EnvFilter, LoggingError> {
        EnvFilter::try_new(&self.filter)
            .map_err(|e| format!("Invalid RUST_LOG directive {:?}: {}", self.filter, e).into())
    }

    pub fn loki_endpoint(&self) -> Result<Option<Url>, LoggingError> {
        match self.loki_url.as_deref().map(str::trim) {
            None => Ok(None),
            Some("") => Err("LOKI_ENABLED is true but LOKI_URL is not set".into()),
            Some(raw) => Url::parse(raw)
                .map(Some)
                .map_err(|e| format!("Invalid LOKI_URL {:?}: {}", raw, e).into()),
        }
    }

    pub fn validate(&self) -> Result<(), LoggingError> {
        self.env_filter()?;
        self.loki_endpoint()?;
        Ok(())
    }
}

pub fn init_logging(config: LoggingConfig) -> Result<(), LoggingError> {
    let filter = config.env_filter()?;
    let endpoint = config.loki_endpoint()?;

    match endpoint {
        #[cfg(feature = "loki")]
        Some(url) => init_with_loki(&config, filter, url),
        #[cfg(not(feature = "loki"))]
        Some(url) => {
            init_console_only(&config, filter)?;
            tracing::warn!("LOKI_URL {} ignored: built without the loki feature", url);
            Ok(())
        }
        None => init_console_only(&config, filter),
    }
}

fn init_console_only(config: &LoggingConfig, filter: EnvFilter) -> Result<(), LoggingError> {
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    tracing::info!(
        "Ledger logging to console for {} ({})",
        config.service_name, config.environment
    );
    Ok(())
}

#[cfg(feature = "loki")]
fn init_with_loki(config: &LoggingConfig, filter: EnvFilter, url: Url) -> Result<(), LoggingError> {
    let (loki_layer, task) = tracing_loki::builder()
        .label("service", &config.service_name)?
        .label("environment", &config.environment)?
        .build_url(url.clone())?;

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(loki_layer)
        .try_init()?;
    tokio::spawn(task);

    tracing::info!(
        "Ledger logging to console and Loki at {} for {} ({})",
        url, config.service_name, config.environment
    );
    Ok(())
}
