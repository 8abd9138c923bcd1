use serde::Deserialize;
use std::fs;

#[derive(Debug, Clone, Deserialize)]
pub struct MongoConfig {
    pub uri: String,
    pub database: String,
    #[serde(default = "default_collection")]
    pub collection: String,
    pub app_name: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub operation_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub mongodb: MongoConfig,
    pub metrics: Option<MetricsConfig>,
}

fn default_collection() -> String {
    "readings".to_string()
}

fn default_timeout_ms() -> u64 {
    10_000
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        use std::env;

        let path = env::var("ANOMALY_CONFIG").unwrap_or_else(|_| "anomaly-config.toml".to_string());
        let contents = fs::read_to_string(&path)?;
        let mut cfg: AppConfig = toml::from_str(&contents)?;

        // Credentials usually arrive via the environment, not the config file.
        if let Ok(uri) = env::var("MONGODB_URI") {
            cfg.mongodb.uri = uri;
        }

        Ok(cfg)
    }
}
