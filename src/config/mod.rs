use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::Client as DynamoDbClient;
use aws_sdk_ssm::Client as SsmClient;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Prefix shared by every configuration environment variable, e.g. `PETS_PORT`
pub const ENV_PREFIX: &str = "PETS";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading error: {message}")]
    LoadError { message: String },

    #[error("Parameter not found: {name}")]
    ParameterNotFound { name: String },

    #[error("AWS SDK error: {source}")]
    AwsSdk {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Validation error: {message}")]
    ValidationError { message: String },

    #[error("Environment variable missing: {name}")]
    MissingEnvironmentVariable { name: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub aws: AwsConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_timeout")]
    pub request_timeout_seconds: u64,
    #[serde(default = "default_max_request_size")]
    pub max_request_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_pets_table")]
    pub pets_table_name: String,
    #[serde(default = "default_region")]
    pub region: String,
    /// Endpoint override, e.g. `http://localhost:8000` for DynamoDB Local
    #[serde(default)]
    pub dynamodb_endpoint: Option<String>,
    /// Provision the table and its indexes at startup when missing
    #[serde(default)]
    pub auto_create_table: bool,
}

#[derive(Clone, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub jwt_secret: Option<String>,
    /// SSM parameter holding the signing secret, used when `jwt_secret` is unset
    #[serde(default)]
    pub jwt_secret_parameter: Option<String>,
    #[serde(default = "default_jwt_leeway_seconds")]
    pub jwt_leeway_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct AwsConfig {
    pub region: String,
    pub dynamodb_client: DynamoDbClient,
    pub parameter_store: Arc<ParameterStoreConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_service_version")]
    pub service_version: String,
    /// OpenTelemetry export is enabled only when this is set
    #[serde(default)]
    pub otlp_endpoint: Option<String>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub enable_json_logging: bool,
}

pub struct ParameterStoreConfig {
    ssm_client: SsmClient,
    cache: Arc<RwLock<HashMap<String, (String, Instant)>>>,
    cache_ttl: Duration,
}

impl std::fmt::Debug for ParameterStoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParameterStoreConfig")
            .field("cache_ttl", &self.cache_ttl)
            .field("cache_size", &"<runtime>")
            .finish()
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &self.jwt_secret.as_ref().map(|_| "<redacted>"))
            .field("jwt_secret_parameter", &self.jwt_secret_parameter)
            .field("jwt_leeway_seconds", &self.jwt_leeway_seconds)
            .finish()
    }
}

impl Config {
    pub async fn from_environment() -> Result<Self, ConfigError> {
        info!("Loading configuration from environment");

        let server = ServerConfig::from_env()?;
        let database = DatabaseConfig::from_env()?;
        let auth = AuthConfig::from_env()?;
        let observability = ObservabilityConfig::from_env()?;

        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(database.region.clone()))
            .load()
            .await;

        let mut dynamodb_config = aws_sdk_dynamodb::config::Builder::from(&sdk_config);
        if let Some(endpoint) = &database.dynamodb_endpoint {
            info!("Using DynamoDB endpoint override: {}", endpoint);
            dynamodb_config = dynamodb_config.endpoint_url(endpoint);
        }
        let dynamodb_client = DynamoDbClient::from_conf(dynamodb_config.build());

        let parameter_store = Arc::new(ParameterStoreConfig::new(
            SsmClient::new(&sdk_config),
            Duration::from_secs(5 * 60),
        ));

        let aws = AwsConfig {
            region: database.region.clone(),
            dynamodb_client,
            parameter_store,
        };

        let config = Config {
            server,
            database,
            auth,
            aws,
            observability,
        };

        config.validate()?;

        info!("Configuration loaded successfully");
        debug!("Configuration: {:?}", config);

        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::ValidationError {
                message: "Server port cannot be 0".to_string(),
            });
        }

        if self.server.request_timeout_seconds == 0 {
            return Err(ConfigError::ValidationError {
                message: "Request timeout cannot be 0".to_string(),
            });
        }

        if self.server.max_request_size == 0 {
            return Err(ConfigError::ValidationError {
                message: "Max request size cannot be 0".to_string(),
            });
        }

        if self.database.pets_table_name.trim().is_empty() {
            return Err(ConfigError::ValidationError {
                message: "Pets table name cannot be empty".to_string(),
            });
        }

        self.auth.validate()
    }

    /// Resolve the token signing secret, consulting Parameter Store when needed
    pub async fn jwt_secret(&self) -> Result<String, ConfigError> {
        self.auth.resolve_secret(&self.aws.parameter_store).await
    }
}

/// Deserialize one configuration section from the given environment source
fn load_section<T: DeserializeOwned>(
    section: &str,
    source: config::Environment,
) -> Result<T, ConfigError> {
    let settings = config::Config::builder()
        .add_source(source)
        .build()
        .map_err(|e| ConfigError::LoadError {
            message: format!("Failed to load {} config: {}", section, e),
        })?;

    settings
        .try_deserialize()
        .map_err(|e| ConfigError::LoadError {
            message: format!("Failed to deserialize {} config: {}", section, e),
        })
}

fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
}

impl ServerConfig {
    fn from_env() -> Result<Self, ConfigError> {
        load_section("server", environment())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl DatabaseConfig {
    fn from_env() -> Result<Self, ConfigError> {
        load_section("database", environment())
    }
}

impl AuthConfig {
    fn from_env() -> Result<Self, ConfigError> {
        load_section("auth", environment())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let has_secret = self.jwt_secret.as_deref().is_some_and(|s| !s.is_empty());
        let has_parameter = self
            .jwt_secret_parameter
            .as_deref()
            .is_some_and(|s| !s.is_empty());

        if !has_secret && !has_parameter {
            return Err(ConfigError::MissingEnvironmentVariable {
                name: format!("{}_JWT_SECRET", ENV_PREFIX),
            });
        }

        Ok(())
    }

    async fn resolve_secret(&self, store: &ParameterStoreConfig) -> Result<String, ConfigError> {
        if let Some(secret) = self.jwt_secret.as_deref().filter(|s| !s.is_empty()) {
            return Ok(secret.to_string());
        }

        match self.jwt_secret_parameter.as_deref().filter(|s| !s.is_empty()) {
            Some(name) => {
                info!("Loading JWT secret from Parameter Store: {}", name);
                store.get_parameter(name).await
            }
            None => Err(ConfigError::MissingEnvironmentVariable {
                name: format!("{}_JWT_SECRET", ENV_PREFIX),
            }),
        }
    }
}

impl ObservabilityConfig {
    fn from_env() -> Result<Self, ConfigError> {
        load_section("observability", environment())
    }
}

impl ParameterStoreConfig {
    pub fn new(ssm_client: SsmClient, cache_ttl: Duration) -> Self {
        Self {
            ssm_client,
            cache: Arc::new(RwLock::new(HashMap::new())),
            cache_ttl,
        }
    }

    pub async fn get_parameter(&self, name: &str) -> Result<String, ConfigError> {
        debug!("Getting parameter: {}", name);

        {
            let cache = self.cache.read().await;
            if let Some((value, timestamp)) = cache.get(name) {
                if timestamp.elapsed() < self.cache_ttl {
                    debug!("Parameter found in cache: {}", name);
                    return Ok(value.clone());
                }
                debug!("Parameter cache expired: {}", name);
            }
        }

        debug!("Fetching parameter from AWS SSM: {}", name);
        let result = self
            .ssm_client
            .get_parameter()
            .name(name)
            .with_decryption(true)
            .send()
            .await
            .map_err(|e| ConfigError::AwsSdk {
                source: Box::new(e),
            })?;

        let value = result
            .parameter()
            .and_then(|p| p.value())
            .ok_or_else(|| ConfigError::ParameterNotFound {
                name: name.to_string(),
            })?
            .to_string();

        {
            let mut cache = self.cache.write().await;
            cache.insert(name.to_string(), (value.clone(), Instant::now()));
        }

        debug!("Parameter retrieved and cached: {}", name);
        Ok(value)
    }

    pub async fn cache_size(&self) -> usize {
        self.cache.read().await.len()
    }
}

// Default value functions
pub(crate) fn default_host() -> String {
    "0.0.0.0".to_string()
}

pub(crate) fn default_port() -> u16 {
    8080
}

pub(crate) fn default_timeout() -> u64 {
    30
}

pub(crate) fn default_max_request_size() -> usize {
    1024 * 1024 // 1MB
}

pub(crate) fn default_pets_table() -> String {
    "Pets".to_string()
}

pub(crate) fn default_region() -> String {
    "us-west-2".to_string()
}

pub(crate) fn default_jwt_leeway_seconds() -> u64 {
    30
}

pub(crate) fn default_service_name() -> String {
    env!("CARGO_PKG_NAME").to_string()
}

pub(crate) fn default_service_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

pub(crate) fn default_log_level() -> String {
    "info".to_string()
}
