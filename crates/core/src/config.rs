use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub agents: AgentsConfig,
    pub chat: ChatConfig,
    pub llm: LlmConfig,
    pub crm: CrmConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct AgentsConfig {
    pub dir: PathBuf,
    pub post_escalation: PostEscalationPolicy,
}

#[derive(Clone, Debug)]
pub struct ChatConfig {
    pub max_message_chars: usize,
    pub history_limit: u32,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub intent_model: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl LlmConfig {
    /// Whether the generative tier can be constructed at all. A missing API
    /// key is not a startup error; the pipeline runs keyword-only.
    pub fn generative_available(&self) -> bool {
        match self.provider {
            LlmProvider::OpenAi => self
                .api_key
                .as_ref()
                .map(|key| !key.expose_secret().trim().is_empty())
                .unwrap_or(false),
            LlmProvider::Ollama => {
                self.base_url.as_ref().map(|url| !url.trim().is_empty()).unwrap_or(false)
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct CrmConfig {
    pub webhook_url: Option<String>,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub widget_dir: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    OpenAi,
    Ollama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

/// Behavior for a message arriving after the conversation was escalated:
/// keep answering (observed default) or reject the turn with a client error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostEscalationPolicy {
    Answer,
    Reject,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub agents_dir: Option<PathBuf>,
    pub bind_address: Option<String>,
    pub port: Option<u16>,
    pub log_level: Option<String>,
    pub llm_model: Option<String>,
    pub crm_webhook_url: Option<String>,
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
                url: "sqlite://nouma.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            agents: AgentsConfig {
                dir: PathBuf::from("agents"),
                post_escalation: PostEscalationPolicy::Answer,
            },
            chat: ChatConfig { max_message_chars: 2000, history_limit: 10 },
            llm: LlmConfig {
                provider: LlmProvider::OpenAi,
                api_key: None,
                base_url: None,
                model: "gpt-4o-mini".to_string(),
                intent_model: "gpt-4o-mini".to_string(),
                max_tokens: 500,
                temperature: 0.7,
                timeout_secs: 15,
                max_retries: 2,
            },
            crm: CrmConfig { webhook_url: None },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 3000,
                widget_dir: None,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|ollama)"
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

impl std::str::FromStr for PostEscalationPolicy {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "answer" => Ok(Self::Answer),
            "reject" => Ok(Self::Reject),
            other => Err(ConfigError::Validation(format!(
                "unsupported post-escalation policy `{other}` (expected answer|reject)"
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
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("nouma.toml"));
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

        if let Some(agents) = patch.agents {
            if let Some(dir) = agents.dir {
                self.agents.dir = dir;
            }
            if let Some(post_escalation) = agents.post_escalation {
                self.agents.post_escalation = post_escalation;
            }
        }

        if let Some(chat) = patch.chat {
            if let Some(max_message_chars) = chat.max_message_chars {
                self.chat.max_message_chars = max_message_chars;
            }
            if let Some(history_limit) = chat.history_limit {
                self.chat.history_limit = history_limit;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(intent_model) = llm.intent_model {
                self.llm.intent_model = intent_model;
            }
            if let Some(max_tokens) = llm.max_tokens {
                self.llm.max_tokens = max_tokens;
            }
            if let Some(temperature) = llm.temperature {
                self.llm.temperature = temperature;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = llm.max_retries {
                self.llm.max_retries = max_retries;
            }
        }

        if let Some(crm) = patch.crm {
            if let Some(webhook_url) = crm.webhook_url {
                self.crm.webhook_url = Some(webhook_url);
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(widget_dir) = server.widget_dir {
                self.server.widget_dir = Some(widget_dir);
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
        if let Some(value) = read_env("NOUMA_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("NOUMA_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("NOUMA_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("NOUMA_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("NOUMA_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("NOUMA_AGENTS_DIR") {
            self.agents.dir = PathBuf::from(value);
        }
        if let Some(value) = read_env("NOUMA_AGENTS_POST_ESCALATION") {
            self.agents.post_escalation = value.parse()?;
        }

        if let Some(value) = read_env("NOUMA_CHAT_MAX_MESSAGE_CHARS") {
            self.chat.max_message_chars =
                parse_u32("NOUMA_CHAT_MAX_MESSAGE_CHARS", &value)? as usize;
        }
        if let Some(value) = read_env("NOUMA_CHAT_HISTORY_LIMIT") {
            self.chat.history_limit = parse_u32("NOUMA_CHAT_HISTORY_LIMIT", &value)?;
        }

        if let Some(value) = read_env("NOUMA_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("NOUMA_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("NOUMA_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("NOUMA_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("NOUMA_LLM_INTENT_MODEL") {
            self.llm.intent_model = value;
        }
        if let Some(value) = read_env("NOUMA_LLM_MAX_TOKENS") {
            self.llm.max_tokens = parse_u32("NOUMA_LLM_MAX_TOKENS", &value)?;
        }
        if let Some(value) = read_env("NOUMA_LLM_TEMPERATURE") {
            self.llm.temperature = parse_f64("NOUMA_LLM_TEMPERATURE", &value)?;
        }
        if let Some(value) = read_env("NOUMA_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("NOUMA_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("NOUMA_LLM_MAX_RETRIES") {
            self.llm.max_retries = parse_u32("NOUMA_LLM_MAX_RETRIES", &value)?;
        }

        if let Some(value) = read_env("NOUMA_CRM_WEBHOOK_URL") {
            self.crm.webhook_url = Some(value);
        }

        if let Some(value) = read_env("NOUMA_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("NOUMA_SERVER_PORT") {
            self.server.port = parse_u16("NOUMA_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("NOUMA_SERVER_WIDGET_DIR") {
            self.server.widget_dir = Some(PathBuf::from(value));
        }

        let log_level = read_env("NOUMA_LOGGING_LEVEL").or_else(|| read_env("NOUMA_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format = read_env("NOUMA_LOGGING_FORMAT").or_else(|| read_env("NOUMA_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(agents_dir) = overrides.agents_dir {
            self.agents.dir = agents_dir;
        }
        if let Some(bind_address) = overrides.bind_address {
            self.server.bind_address = bind_address;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(crm_webhook_url) = overrides.crm_webhook_url {
            self.crm.webhook_url = Some(crm_webhook_url);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_chat(&self.chat)?;
        validate_llm(&self.llm)?;
        validate_crm(&self.crm)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("nouma.toml"), PathBuf::from("config/nouma.toml")]
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

fn validate_chat(chat: &ChatConfig) -> Result<(), ConfigError> {
    if chat.max_message_chars == 0 || chat.max_message_chars > 10_000 {
        return Err(ConfigError::Validation(
            "chat.max_message_chars must be in range 1..=10000".to_string(),
        ));
    }

    if chat.history_limit == 0 || chat.history_limit > 50 {
        return Err(ConfigError::Validation(
            "chat.history_limit must be in range 1..=50".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if !(0.0..=2.0).contains(&llm.temperature) {
        return Err(ConfigError::Validation(
            "llm.temperature must be in range 0.0..=2.0".to_string(),
        ));
    }

    // An openai provider without an api key is allowed: the generative tier
    // is disabled and the keyword generators carry every turn.
    if llm.provider == LlmProvider::Ollama {
        let missing = llm.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
        if missing {
            return Err(ConfigError::Validation(
                "llm.base_url is required for ollama provider".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_crm(crm: &CrmConfig) -> Result<(), ConfigError> {
    if let Some(webhook_url) = &crm.webhook_url {
        if !webhook_url.starts_with("http://") && !webhook_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "crm.webhook_url must start with http:// or https://".to_string(),
            ));
        }
    }

    Ok(())
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

fn parse_f64(key: &str, value: &str) -> Result<f64, ConfigError> {
    value.parse::<f64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    agents: Option<AgentsPatch>,
    chat: Option<ChatPatch>,
    llm: Option<LlmPatch>,
    crm: Option<CrmPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct AgentsPatch {
    dir: Option<PathBuf>,
    post_escalation: Option<PostEscalationPolicy>,
}

#[derive(Debug, Default, Deserialize)]
struct ChatPatch {
    max_message_chars: Option<usize>,
    history_limit: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    intent_model: Option<String>,
    max_tokens: Option<u32>,
    temperature: Option<f64>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct CrmPatch {
    webhook_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    widget_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
