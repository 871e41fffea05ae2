use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::call_state::CALL_STATE_TTL_SECS;
use crate::phone::{PhoneNormalizer, DEFAULT_REGION};
use crate::pricing::PriceList;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub call_state: CallStateConfig,
    pub idempotency: IdempotencyConfig,
    pub pricing: PriceList,
    pub phone: PhoneConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
    pub enable_test_tools: bool,
}

#[derive(Clone, Debug)]
pub struct CallStateConfig {
    pub ttl_secs: u64,
    pub backend: CallStateBackend,
}

#[derive(Clone, Debug)]
pub struct IdempotencyConfig {
    pub retention_days: u32,
    /// Zero disables the in-process sweep.
    pub sweep_interval_secs: u64,
}

#[derive(Clone, Debug)]
pub struct PhoneConfig {
    /// ISO 3166 region national numbers are read in, e.g. `KE`.
    pub default_region: String,
}

impl PhoneConfig {
    pub fn normalizer(&self) -> Result<PhoneNormalizer, ConfigError> {
        PhoneNormalizer::for_region(&self.default_region).map_err(|error| {
            ConfigError::Validation(format!("phone.default_region is invalid: {error}"))
        })
    }
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStateBackend {
    Memory,
    Database,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub bind_address: Option<String>,
    pub port: Option<u16>,
    pub call_state_backend: Option<CallStateBackend>,
    pub enable_test_tools: Option<bool>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://protogas.db?mode=rwc".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "0.0.0.0".to_string(),
                port: 8000,
                graceful_shutdown_secs: 15,
                enable_test_tools: false,
            },
            call_state: CallStateConfig {
                ttl_secs: CALL_STATE_TTL_SECS,
                backend: CallStateBackend::Memory,
            },
            idempotency: IdempotencyConfig { retention_days: 30, sweep_interval_secs: 3600 },
            pricing: PriceList::default(),
            phone: PhoneConfig { default_region: format!("{DEFAULT_REGION:?}") },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for CallStateBackend {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "database" => Ok(Self::Database),
            other => Err(ConfigError::Validation(format!(
                "unsupported call state backend `{other}` (expected memory|database)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("protogas.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
            if let Some(enable_test_tools) = server.enable_test_tools {
                self.server.enable_test_tools = enable_test_tools;
            }
        }

        if let Some(call_state) = patch.call_state {
            if let Some(ttl_secs) = call_state.ttl_secs {
                self.call_state.ttl_secs = ttl_secs;
            }
            if let Some(backend) = call_state.backend {
                self.call_state.backend = backend;
            }
        }

        if let Some(idempotency) = patch.idempotency {
            if let Some(retention_days) = idempotency.retention_days {
                self.idempotency.retention_days = retention_days;
            }
            if let Some(sweep_interval_secs) = idempotency.sweep_interval_secs {
                self.idempotency.sweep_interval_secs = sweep_interval_secs;
            }
        }

        if let Some(pricing) = patch.pricing {
            if let Some(cylinder_6kg) = pricing.cylinder_6kg {
                self.pricing.cylinder_6kg = cylinder_6kg;
            }
            if let Some(cylinder_13kg) = pricing.cylinder_13kg {
                self.pricing.cylinder_13kg = cylinder_13kg;
            }
            if let Some(currency) = pricing.currency {
                self.pricing.currency = currency;
            }
            if let Some(max_quantity) = pricing.max_quantity {
                self.pricing.max_quantity = max_quantity;
            }
        }

        if let Some(phone) = patch.phone {
            if let Some(default_region) = phone.default_region {
                self.phone.default_region = default_region;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("PROTOGAS_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("PROTOGAS_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("PROTOGAS_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("PROTOGAS_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("PROTOGAS_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("PROTOGAS_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("PROTOGAS_SERVER_PORT") {
            self.server.port = parse_u16("PROTOGAS_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("PROTOGAS_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("PROTOGAS_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }
        if let Some(value) = read_env("PROTOGAS_SERVER_ENABLE_TEST_TOOLS") {
            self.server.enable_test_tools =
                parse_bool("PROTOGAS_SERVER_ENABLE_TEST_TOOLS", &value)?;
        }

        if let Some(value) = read_env("PROTOGAS_CALL_STATE_TTL_SECS") {
            self.call_state.ttl_secs = parse_u64("PROTOGAS_CALL_STATE_TTL_SECS", &value)?;
        }
        if let Some(value) = read_env("PROTOGAS_CALL_STATE_BACKEND") {
            self.call_state.backend = value.parse()?;
        }

        if let Some(value) = read_env("PROTOGAS_IDEMPOTENCY_RETENTION_DAYS") {
            self.idempotency.retention_days =
                parse_u32("PROTOGAS_IDEMPOTENCY_RETENTION_DAYS", &value)?;
        }
        if let Some(value) = read_env("PROTOGAS_IDEMPOTENCY_SWEEP_INTERVAL_SECS") {
            self.idempotency.sweep_interval_secs =
                parse_u64("PROTOGAS_IDEMPOTENCY_SWEEP_INTERVAL_SECS", &value)?;
        }

        if let Some(value) = read_env("PROTOGAS_PRICING_CYLINDER_6KG") {
            self.pricing.cylinder_6kg = parse_decimal("PROTOGAS_PRICING_CYLINDER_6KG", &value)?;
        }
        if let Some(value) = read_env("PROTOGAS_PRICING_CYLINDER_13KG") {
            self.pricing.cylinder_13kg = parse_decimal("PROTOGAS_PRICING_CYLINDER_13KG", &value)?;
        }
        if let Some(value) = read_env("PROTOGAS_PRICING_CURRENCY") {
            self.pricing.currency = value;
        }
        if let Some(value) = read_env("PROTOGAS_PRICING_MAX_QUANTITY") {
            self.pricing.max_quantity = parse_u32("PROTOGAS_PRICING_MAX_QUANTITY", &value)?;
        }

        if let Some(value) = read_env("PROTOGAS_PHONE_DEFAULT_REGION") {
            self.phone.default_region = value;
        }

        let log_level =
            read_env("PROTOGAS_LOGGING_LEVEL").or_else(|| read_env("PROTOGAS_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("PROTOGAS_LOGGING_FORMAT").or_else(|| read_env("PROTOGAS_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(bind_address) = overrides.bind_address {
            self.server.bind_address = bind_address;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(backend) = overrides.call_state_backend {
            self.call_state.backend = backend;
        }
        if let Some(enable_test_tools) = overrides.enable_test_tools {
            self.server.enable_test_tools = enable_test_tools;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_server(&self.server)?;
        validate_call_state(&self.call_state)?;
        validate_pricing(&self.pricing)?;
        validate_phone(&self.phone)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("protogas.toml"), PathBuf::from("config/protogas.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_call_state(call_state: &CallStateConfig) -> Result<(), ConfigError> {
    if call_state.ttl_secs == 0 || call_state.ttl_secs > 86_400 {
        return Err(ConfigError::Validation(
            "call_state.ttl_secs must be in range 1..=86400".to_string(),
        ));
    }

    Ok(())
}

fn validate_pricing(pricing: &PriceList) -> Result<(), ConfigError> {
    if pricing.cylinder_6kg <= Decimal::ZERO || pricing.cylinder_13kg <= Decimal::ZERO {
        return Err(ConfigError::Validation(
            "pricing.cylinder_6kg and pricing.cylinder_13kg must be positive".to_string(),
        ));
    }

    if pricing.currency.trim().is_empty() {
        return Err(ConfigError::Validation("pricing.currency must not be empty".to_string()));
    }

    if pricing.max_quantity == 0 {
        return Err(ConfigError::Validation(
            "pricing.max_quantity must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_phone(phone: &PhoneConfig) -> Result<(), ConfigError> {
    phone.normalizer().map(|_| ())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_decimal(key: &str, value: &str) -> Result<Decimal, ConfigError> {
    value.trim().parse::<Decimal>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    server: Option<ServerPatch>,
    call_state: Option<CallStatePatch>,
    idempotency: Option<IdempotencyPatch>,
    pricing: Option<PricingPatch>,
    phone: Option<PhonePatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
    enable_test_tools: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct CallStatePatch {
    ttl_secs: Option<u64>,
    backend: Option<CallStateBackend>,
}

#[derive(Debug, Default, Deserialize)]
struct IdempotencyPatch {
    retention_days: Option<u32>,
    sweep_interval_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct PricingPatch {
    cylinder_6kg: Option<Decimal>,
    cylinder_13kg: Option<Decimal>,
    currency: Option<String>,
    max_quantity: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct PhonePatch {
    default_region: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use rust_decimal::Decimal;
    use tempfile::TempDir;

    use super::{AppConfig, CallStateBackend, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_validate_without_file_or_env() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.server.port == 8000, "default port should be 8000")?;
        ensure(config.call_state.ttl_secs == 600, "default call state ttl should be ten minutes")?;
        ensure(config.pricing.max_quantity == 10, "default max quantity should be 10")?;
        ensure(!config.server.enable_test_tools, "test tools should be disabled by default")?;
        ensure(
            matches!(config.logging.format, LogFormat::Compact),
            "default logging format should be compact",
        )
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_PROTOGAS_DB_PATH", "sqlite://interpolated.db");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("protogas.toml");
            fs::write(
                &path,
                r#"
[database]
url = "${TEST_PROTOGAS_DB_PATH}"

[pricing]
cylinder_6kg = 1350
cylinder_13kg = "2950.50"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://interpolated.db",
                "database url should be loaded from environment",
            )?;
            ensure(
                config.pricing.cylinder_6kg == Decimal::from(1350),
                "integer price should be read from file",
            )?;
            ensure(
                config.pricing.cylinder_13kg == Decimal::new(295_050, 2),
                "string price should be read from file",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_PROTOGAS_DB_PATH"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("PROTOGAS_LOG_LEVEL", "warn");
        env::set_var("PROTOGAS_LOG_FORMAT", "json");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Json),
                "json logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["PROTOGAS_LOG_LEVEL", "PROTOGAS_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("PROTOGAS_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("PROTOGAS_CALL_STATE_BACKEND", "database");
        env::set_var("PROTOGAS_SERVER_PORT", "9100");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("protogas.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[server]
port = 9000
enable_test_tools = true

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(config.server.port == 9100, "env port should win over file")?;
            ensure(config.server.enable_test_tools, "file flag should win over default")?;
            ensure(
                config.call_state.backend == CallStateBackend::Database,
                "env backend should win over default",
            )?;
            Ok(())
        })();

        clear_vars(&[
            "PROTOGAS_DATABASE_URL",
            "PROTOGAS_CALL_STATE_BACKEND",
            "PROTOGAS_SERVER_PORT",
        ]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("PROTOGAS_DATABASE_URL", "postgres://localhost/protogas");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("database.url")
            );
            ensure(has_message, "validation failure should mention database.url")
        })();

        clear_vars(&["PROTOGAS_DATABASE_URL"]);
        result
    }

    #[test]
    fn invalid_numeric_env_override_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("PROTOGAS_PRICING_MAX_QUANTITY", "ten");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => return Err("expected env override failure".to_string()),
                Err(error) => error,
            };
            ensure(
                matches!(
                    error,
                    ConfigError::InvalidEnvOverride { ref key, .. }
                        if key == "PROTOGAS_PRICING_MAX_QUANTITY"
                ),
                "error should name the offending variable",
            )
        })();

        clear_vars(&["PROTOGAS_PRICING_MAX_QUANTITY"]);
        result
    }

    #[test]
    fn phone_region_must_be_a_known_code() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("PROTOGAS_PHONE_DEFAULT_REGION", "tz");
        let accepted = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("lowercase region should load: {err}"));

        env::set_var("PROTOGAS_PHONE_DEFAULT_REGION", "Kenya");
        let rejected = AppConfig::load(LoadOptions::default());
        clear_vars(&["PROTOGAS_PHONE_DEFAULT_REGION"]);

        let normalizer = accepted?.phone.normalizer().map_err(|err| err.to_string())?;
        ensure(
            normalizer.normalize("0712345678").as_deref() == Ok("+255712345678"),
            "configured region should drive national numbers",
        )?;
        ensure(
            matches!(
                rejected,
                Err(ConfigError::Validation(ref message)) if message.contains("phone.default_region")
            ),
            "unknown region should fail validation",
        )
    }
}
