use crate::error::{Error, Result};
use crate::services::scoring_service::AggregationPolicy;
use dotenvy::dotenv;
use std::env;
use std::sync::OnceLock;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_address: String,
    pub database_url: String,
    pub jwt_secret: String,
    pub public_rps: u32,
    pub api_rps: u32,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub event_webhook_url: Option<String>,
    pub event_webhook_secret: Option<String>,
    pub mcq_pool_min_size: usize,
    pub coding_pool_min_size: usize,
    pub aggregation_policy: AggregationPolicy,
}

pub static CONFIG: OnceLock<Config> = OnceLock::new();

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        Ok(Self {
            server_address: get_env("SERVER_ADDRESS")?,
            database_url: get_env("DATABASE_URL")?,
            jwt_secret: get_env("JWT_SECRET")?,
            public_rps: get_env_parse("PUBLIC_RPS")?,
            api_rps: get_env_parse("API_RPS")?,
            openai_api_key: get_env_opt("OPENAI_API_KEY"),
            openai_model: get_env_opt("OPENAI_MODEL").unwrap_or_else(|| "gpt-4o".to_string()),
            event_webhook_url: get_env_opt("EVENT_WEBHOOK_URL"),
            event_webhook_secret: get_env_opt("EVENT_WEBHOOK_SECRET"),
            mcq_pool_min_size: get_env_parse_or("MCQ_POOL_MIN_SIZE", 50)?,
            coding_pool_min_size: get_env_parse_or("CODING_POOL_MIN_SIZE", 5)?,
            aggregation_policy: get_env_parse_or("AGGREGATION_POLICY", AggregationPolicy::default())?,
        })
    }
}

fn get_env(name: &str) -> Result<String> {
    env::var(name).map_err(|_| Error::Config(format!("Missing environment variable: {}", name)))
}

fn get_env_opt(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn get_env_parse<T>(name: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = get_env(name)?;
    raw.parse()
        .map_err(|e| Error::Config(format!("Invalid value for {}: {}", name, e)))
}

fn get_env_parse_or<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match get_env_opt(name) {
        Some(_) => get_env_parse(name),
        None => Ok(default),
    }
}

pub fn init_config() -> Result<()> {
    let config = Config::from_env()?;
    CONFIG
        .set(config)
        .map_err(|_| Error::Config("Configuration has already been initialized".to_string()))?;
    Ok(())
}

pub fn get_config() -> Result<&'static Config> {
    if let Some(config) = CONFIG.get() {
        return Ok(config);
    }
    let config = Config::from_env()?;
    Ok(CONFIG.get_or_init(|| config))
}
