use {
    std::{env, path::PathBuf, str::FromStr, time::Duration},
    thiserror::Error,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} is invalid: {value:?}")]
    Invalid { name: &'static str, value: String },

    #[error("{0} and {1} must be set together")]
    Incomplete(&'static str, &'static str),
}

#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub db_max_connections: u32,
    pub payment_methods_path: PathBuf,
    pub gateway_timeout: Duration,
    pub request_timeout: Duration,
    pub reprocess_interval: Duration,
    pub stripe: Option<StripeConfig>,
    pub sandbox_webhook_secret: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let database_url = var("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let stripe = match (var("STRIPE_SECRET_KEY"), var("STRIPE_WEBHOOK_SECRET")) {
            (Some(secret_key), Some(webhook_secret)) => Some(StripeConfig {
                secret_key,
                webhook_secret,
            }),
            (None, None) => None,
            _ => {
                return Err(ConfigError::Incomplete(
                    "STRIPE_SECRET_KEY",
                    "STRIPE_WEBHOOK_SECRET",
                ));
            }
        };

        Ok(Self {
            database_url,
            bind_addr: var("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".into()),
            db_max_connections: parse_or(&var, "DB_MAX_CONNECTIONS", 20)?,
            payment_methods_path: var("PAYMENT_METHODS_PATH")
                .unwrap_or_else(|| "config/payment_methods.json".into())
                .into(),
            gateway_timeout: Duration::from_secs(parse_or(&var, "GATEWAY_TIMEOUT_SECS", 15)?),
            request_timeout: Duration::from_secs(parse_or(&var, "REQUEST_TIMEOUT_SECS", 30)?),
            reprocess_interval: Duration::from_secs(parse_or(
                &var,
                "WEBHOOK_REPROCESS_INTERVAL_SECS",
                30,
            )?),
            stripe,
            sandbox_webhook_secret: var("SANDBOX_WEBHOOK_SECRET"),
        })
    }
}

fn parse_or<T: FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match var(name) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}
