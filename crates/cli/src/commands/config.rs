use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use protogas_core::config::{AppConfig, LoadOptions};
use toml::Value;

struct Field {
    key: &'static str,
    env_keys: &'static [&'static str],
    value: String,
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in fields(&config) {
        let source = field_source(
            field.key,
            field.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(format!("- {} = {} (source: {source})", field.key, field.value));
    }

    lines.join("\n")
}

fn field(key: &'static str, env_keys: &'static [&'static str], value: String) -> Field {
    Field { key, env_keys, value }
}

fn fields(config: &AppConfig) -> Vec<Field> {
    vec![
        field("database.url", &["PROTOGAS_DATABASE_URL"], config.database.url.clone()),
        field(
            "database.max_connections",
            &["PROTOGAS_DATABASE_MAX_CONNECTIONS"],
            config.database.max_connections.to_string(),
        ),
        field(
            "database.timeout_secs",
            &["PROTOGAS_DATABASE_TIMEOUT_SECS"],
            config.database.timeout_secs.to_string(),
        ),
        field(
            "server.bind_address",
            &["PROTOGAS_SERVER_BIND_ADDRESS"],
            config.server.bind_address.clone(),
        ),
        field("server.port", &["PROTOGAS_SERVER_PORT"], config.server.port.to_string()),
        field(
            "server.graceful_shutdown_secs",
            &["PROTOGAS_SERVER_GRACEFUL_SHUTDOWN_SECS"],
            config.server.graceful_shutdown_secs.to_string(),
        ),
        field(
            "server.enable_test_tools",
            &["PROTOGAS_SERVER_ENABLE_TEST_TOOLS"],
            config.server.enable_test_tools.to_string(),
        ),
        field(
            "call_state.ttl_secs",
            &["PROTOGAS_CALL_STATE_TTL_SECS"],
            config.call_state.ttl_secs.to_string(),
        ),
        field(
            "call_state.backend",
            &["PROTOGAS_CALL_STATE_BACKEND"],
            format!("{:?}", config.call_state.backend),
        ),
        field(
            "idempotency.retention_days",
            &["PROTOGAS_IDEMPOTENCY_RETENTION_DAYS"],
            config.idempotency.retention_days.to_string(),
        ),
        field(
            "idempotency.sweep_interval_secs",
            &["PROTOGAS_IDEMPOTENCY_SWEEP_INTERVAL_SECS"],
            config.idempotency.sweep_interval_secs.to_string(),
        ),
        field(
            "pricing.cylinder_6kg",
            &["PROTOGAS_PRICING_CYLINDER_6KG"],
            config.pricing.format_amount(config.pricing.cylinder_6kg),
        ),
        field(
            "pricing.cylinder_13kg",
            &["PROTOGAS_PRICING_CYLINDER_13KG"],
            config.pricing.format_amount(config.pricing.cylinder_13kg),
        ),
        field(
            "pricing.max_quantity",
            &["PROTOGAS_PRICING_MAX_QUANTITY"],
            config.pricing.max_quantity.to_string(),
        ),
        field(
            "phone.default_region",
            &["PROTOGAS_PHONE_DEFAULT_REGION"],
            config.phone.default_region.clone(),
        ),
        field(
            "logging.level",
            &["PROTOGAS_LOGGING_LEVEL", "PROTOGAS_LOG_LEVEL"],
            config.logging.level.clone(),
        ),
        field(
            "logging.format",
            &["PROTOGAS_LOGGING_FORMAT", "PROTOGAS_LOG_FORMAT"],
            format!("{:?}", config.logging.format),
        ),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("protogas.toml"), PathBuf::from("config/protogas.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}
