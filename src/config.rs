use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    /// IANA or Windows zone name; the system zone is used when unset.
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub extra_context: Vec<String>,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub user_data: UserData,
    #[serde(default)]
    pub assistant: AssistantConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub mail: MailConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_file")]
    pub file: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            file: default_db_file(),
        }
    }
}

fn default_db_file() -> PathBuf {
    PathBuf::from("spark.db")
}

/// Information about the people the summaries are written for.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct UserData {
    #[serde(default, rename(serialize = "Names"))]
    pub names: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AssistantConfig {
    #[serde(default = "default_assistant_name")]
    pub name: String,
    #[serde(default = "default_assistant_style")]
    pub style: String,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            name: default_assistant_name(),
            style: default_assistant_style(),
        }
    }
}

fn default_assistant_name() -> String {
    "Spark".to_string()
}

fn default_assistant_style() -> String {
    "Assume the persona of a classic, highly professional English butler. \
     You are unflappable, discreet, impeccably polite and always composed. \
     Your language is formal, slightly traditional and precise. \
     Avoid breaking character or indicating you are an AI."
        .to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(rename = "type", default = "default_llm_type")]
    pub kind: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Base URL override, mostly for self-hosted or proxied providers.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            kind: default_llm_type(),
            model: None,
            api_key: None,
            url: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_llm_type() -> String {
    "gemini".to_string()
}
fn default_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct MailConfig {
    /// Print the message instead of delivering it.
    #[serde(default)]
    pub preview: bool,
    #[serde(default)]
    pub bcc: Option<String>,
    #[serde(default)]
    pub from: MailFrom,
    #[serde(default)]
    pub server: MailServer,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct MailFrom {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub address: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MailServer {
    #[serde(default)]
    pub address: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub password: String,
}

impl Default for MailServer {
    fn default() -> Self {
        Self {
            address: String::new(),
            port: default_smtp_port(),
            user_name: String::new(),
            password: String::new(),
        }
    }
}

fn default_smtp_port() -> u16 {
    587
}

pub const LLM_TYPES: &[&str] = &["gemini", "openai", "ollama"];

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if !LLM_TYPES.contains(&config.llm.kind.as_str()) {
        anyhow::bail!(
            "Unknown llm type: '{}'. Must be gemini, openai, or ollama.",
            config.llm.kind
        );
    }

    if config.llm.timeout_secs == 0 {
        anyhow::bail!("llm.timeout_secs must be > 0");
    }

    if config.assistant.name.trim().is_empty() {
        config.assistant.name = default_assistant_name();
    }

    config.database.file = resolve_relative(path, &config.database.file)?;

    Ok(config)
}

/// Resolve `file` against the directory holding the config file, leaving
/// absolute paths untouched.
fn resolve_relative(config_path: &Path, file: &Path) -> Result<PathBuf> {
    if file.is_absolute() {
        return Ok(file.to_path_buf());
    }

    let config_path = std::path::absolute(config_path)
        .with_context(|| format!("Failed to resolve {}", config_path.display()))?;
    let dir = config_path.parent().unwrap_or_else(|| Path::new("."));
    Ok(dir.join(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("spark.toml");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_defaults() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "");
        let config = load_config(&path).unwrap();

        assert_eq!(config.database.file, dir.path().join("spark.db"));
        assert_eq!(config.assistant.name, "Spark");
        assert_eq!(config.llm.kind, "gemini");
        assert_eq!(config.llm.timeout_secs, 120);
        assert_eq!(config.mail.server.port, 587);
        assert!(!config.mail.preview);
        assert!(config.timezone.is_none());
    }

    #[test]
    fn test_full_config() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"
timezone = "Europe/Brussels"
extra_context = ["We have a dog called Rex"]

[database]
file = "/var/lib/spark/spark.db"

[user_data]
names = ["Alice", "Bob"]

[assistant]
name = "Jeeves"

[llm]
type = "openai"
model = "gpt-4o-mini"
api_key = "sk-test"

[mail]
preview = true
bcc = "archive@example.com"

[mail.from]
name = "Jeeves"
address = "jeeves@example.com"

[mail.server]
address = "smtp.example.com"
port = 465
user_name = "jeeves"
password = "secret"
"#,
        );
        let config = load_config(&path).unwrap();

        assert_eq!(config.timezone.as_deref(), Some("Europe/Brussels"));
        assert_eq!(config.extra_context.len(), 1);
        assert_eq!(config.database.file, PathBuf::from("/var/lib/spark/spark.db"));
        assert_eq!(config.user_data.names, vec!["Alice", "Bob"]);
        assert_eq!(config.assistant.name, "Jeeves");
        assert_eq!(config.llm.kind, "openai");
        assert_eq!(config.llm.model.as_deref(), Some("gpt-4o-mini"));
        assert!(config.mail.preview);
        assert_eq!(config.mail.server.port, 465);
        assert_eq!(config.mail.from.address, "jeeves@example.com");
    }

    #[test]
    fn test_relative_db_path_follows_config_dir() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "[database]\nfile = \"data/spark.db\"\n");
        let config = load_config(&path).unwrap();
        assert_eq!(config.database.file, dir.path().join("data/spark.db"));
    }

    #[test]
    fn test_unknown_llm_type_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "[llm]\ntype = \"claude-local\"\n");
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("Unknown llm type"));
    }

    #[test]
    fn test_missing_file_is_error() {
        let dir = TempDir::new().unwrap();
        let err = load_config(&dir.path().join("nope.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
