use anyhow::{Context, Result};
use prism_core::providers::{anthropic, google, openai};
use prism_core::{ProviderSettings, SYSTEM_INSTRUCTION, Selector};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Built-in settings used when no config file exists
pub const DEFAULT_CONFIG: &str = include_str!("../../../config/default.toml");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrismConfig {
    /// System instruction sent with every prompt
    #[serde(default = "default_system_instruction")]
    pub system_instruction: String,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

fn default_system_instruction() -> String {
    SYSTEM_INSTRUCTION.to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub openai: ProviderConfig,
    #[serde(default)]
    pub anthropic: ProviderConfig,
    #[serde(default)]
    pub google: ProviderConfig,
}

impl ProvidersConfig {
    pub fn get(&self, selector: Selector) -> &ProviderConfig {
        match selector {
            Selector::Gpt => &self.openai,
            Selector::Claude => &self.anthropic,
            Selector::Gemini => &self.google,
        }
    }
}

/// One vendor's section. Unset fields fall back to the adapter's defaults.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &mask_secret(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_host")]
    pub host: String,
    #[serde(default = "default_gateway_port")]
    pub port: u16,
    /// Listen on all interfaces instead of loopback
    #[serde(default)]
    pub share: bool,
}

fn default_gateway_host() -> String {
    "127.0.0.1".to_string()
}

fn default_gateway_port() -> u16 {
    7860
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_gateway_host(),
            port: default_gateway_port(),
            share: false,
        }
    }
}

impl GatewayConfig {
    /// Resolve the listen address, applying command-line overrides
    pub fn bind_addr(&self, share: bool, port: Option<u16>) -> Result<SocketAddr> {
        let host = if share || self.share {
            "0.0.0.0"
        } else {
            self.host.as_str()
        };
        let port = port.unwrap_or(self.port);
        format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("Invalid gateway address {}:{}", host, port))
    }
}

/// Mask a secret for display: first three and last three characters kept
fn mask_secret(s: &str) -> String {
    if s.is_empty() {
        return "(not set)".to_string();
    }
    let chars: Vec<char> = s.chars().collect();
    if chars.len() <= 8 {
        return "***".to_string();
    }
    let head: String = chars[..3].iter().collect();
    let tail: String = chars[chars.len() - 3..].iter().collect();
    format!("{}...{}", head, tail)
}

/// Get the config directory path
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".prism")
}

impl PrismConfig {
    /// Load settings from `custom_path`, then `~/.prism/config.toml`, then the built-in default
    pub fn load(custom_path: &Option<PathBuf>) -> Result<Self> {
        if let Some(path) = custom_path {
            return Self::load_file(path);
        }

        let path = config_dir().join("config.toml");
        if path.exists() {
            Self::load_file(&path)
        } else {
            debug!("No config at {}, using built-in defaults", path.display());
            Self::from_toml(DEFAULT_CONFIG, "built-in defaults")
        }
    }

    fn load_file(path: &Path) -> Result<Self> {
        // Refuse files group or other can read; they usually hold keys
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Ok(metadata) = std::fs::metadata(path) {
                let mode = metadata.permissions().mode();
                if mode & 0o077 != 0 {
                    return Err(anyhow::anyhow!(
                        "Config file {:?} has overly permissive permissions ({:o}). \
                         It may contain secrets. Fix with: chmod 600 {:?}",
                        path,
                        mode & 0o777,
                        path
                    ));
                }
            }
        }

        let content = std::fs::read_to_string(path).with_context(|| {
            format!(
                "Failed to read config at {}. Run `prism init` first.",
                path.display()
            )
        })?;
        Self::from_toml(&content, &path.display().to_string())
    }

    /// Parse TOML text, expanding allowlisted `${VAR}` references first
    pub fn from_toml(content: &str, origin: &str) -> Result<Self> {
        let expanded = expand_env_vars(content);
        let config: Self = toml::from_str(&expanded)
            .with_context(|| format!("Failed to parse config from {}", origin))?;

        // Keys written literally into the file, not pulled from the environment
        if let Ok(raw) = toml::from_str::<Self>(content) {
            for selector in Selector::ALL {
                let key = &raw.providers.get(selector).api_key;
                if !key.is_empty() && !key.contains("${") {
                    warn!(
                        "{} API key is hardcoded in config. For security, use environment variables: api_key = \"${{{}}}\"",
                        selector.provider(),
                        key_env_var(selector)
                    );
                }
            }
        }

        Ok(config)
    }

    /// Adapter settings for `selector`, defaults filled in
    pub fn provider_settings(&self, selector: Selector) -> ProviderSettings {
        let entry = self.providers.get(selector);
        let (base_url, model) = match selector {
            Selector::Gpt => (openai::DEFAULT_BASE_URL, openai::DEFAULT_MODEL),
            Selector::Claude => (anthropic::DEFAULT_BASE_URL, anthropic::DEFAULT_MODEL),
            Selector::Gemini => (google::DEFAULT_BASE_URL, google::DEFAULT_MODEL),
        };
        ProviderSettings {
            api_key: entry.api_key.clone(),
            base_url: entry
                .base_url
                .clone()
                .unwrap_or_else(|| base_url.to_string()),
            model: entry.model.clone().unwrap_or_else(|| model.to_string()),
            max_tokens: entry.max_tokens,
            temperature: entry.temperature,
        }
    }

    /// Copy safe to print: every API key masked
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        for entry in [
            &mut copy.providers.openai,
            &mut copy.providers.anthropic,
            &mut copy.providers.google,
        ] {
            entry.api_key = mask_secret(&entry.api_key);
        }
        copy
    }
}

/// Environment variable conventionally holding the key for `selector`
pub fn key_env_var(selector: Selector) -> &'static str {
    match selector {
        Selector::Gpt => "OPENAI_API_KEY",
        Selector::Claude => "ANTHROPIC_API_KEY",
        Selector::Gemini => "GEMINI_API_KEY",
    }
}

/// Only these variables may be expanded from `${VAR}` in the config
const ALLOWED_ENV_VARS: &[&str] = &[
    "OPENAI_API_KEY",
    "ANTHROPIC_API_KEY",
    "GEMINI_API_KEY",
    "HOME",
    "USER",
];

fn expand_env_vars(s: &str) -> String {
    expand_with(s, |name| std::env::var(name).ok())
}

/// Replace allowlisted `${VAR}` references using `lookup`; unset variables become empty
fn expand_with(s: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut result = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        let Some(len) = rest[start..].find('}') else {
            break;
        };
        let var_name = &rest[start + 2..start + len];
        result.push_str(&rest[..start]);
        if ALLOWED_ENV_VARS.contains(&var_name) {
            result.push_str(&lookup(var_name).unwrap_or_default());
        } else {
            warn!(
                "Skipping expansion of unrecognized env var '{}' in config (not in allowlist)",
                var_name
            );
            result.push_str(&rest[start..start + len + 1]);
        }
        rest = &rest[start + len + 1..];
    }
    result.push_str(rest);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(name: &str) -> Option<String> {
        match name {
            "OPENAI_API_KEY" => Some("sk-test-openai".to_string()),
            "HOME" => Some("/home/prism".to_string()),
            _ => None,
        }
    }

    #[test]
    fn test_expand_allowlisted_vars() {
        let out = expand_with("key = \"${OPENAI_API_KEY}\" dir = \"${HOME}/x\"", lookup);
        assert_eq!(out, "key = \"sk-test-openai\" dir = \"/home/prism/x\"");
    }

    #[test]
    fn test_expand_unset_var_is_empty() {
        assert_eq!(expand_with("k = \"${GEMINI_API_KEY}\"", lookup), "k = \"\"");
    }

    #[test]
    fn test_expand_leaves_unknown_vars() {
        assert_eq!(expand_with("${AWS_SECRET}", lookup), "${AWS_SECRET}");
        assert_eq!(expand_with("open ${HOME", lookup), "open ${HOME");
    }

    #[test]
    fn test_default_config_parses() {
        let cfg: PrismConfig = toml::from_str(DEFAULT_CONFIG).unwrap();
        assert_eq!(cfg.system_instruction, SYSTEM_INSTRUCTION);
        assert_eq!(cfg.gateway.port, 7860);
        assert!(!cfg.gateway.share);
        assert!(cfg.providers.openai.api_key.contains("${OPENAI_API_KEY}"));
    }

    #[test]
    fn test_empty_config_uses_adapter_defaults() {
        let cfg = PrismConfig::from_toml("", "test").unwrap();
        let claude = cfg.provider_settings(Selector::Claude);
        assert_eq!(claude.base_url, anthropic::DEFAULT_BASE_URL);
        assert_eq!(claude.model, anthropic::DEFAULT_MODEL);
        assert!(claude.api_key.is_empty());
        let gemini = cfg.provider_settings(Selector::Gemini);
        assert_eq!(gemini.model, google::DEFAULT_MODEL);
    }

    #[test]
    fn test_provider_overrides() {
        let cfg = PrismConfig::from_toml(
            r#"
            [providers.openai]
            api_key = "sk-literal-key-123"
            base_url = "http://localhost:9999"
            model = "gpt-4o"
            max_tokens = 512
            temperature = 0.2
            "#,
            "test",
        )
        .unwrap();
        let gpt = cfg.provider_settings(Selector::Gpt);
        assert_eq!(gpt.base_url, "http://localhost:9999");
        assert_eq!(gpt.model, "gpt-4o");
        assert_eq!(gpt.max_tokens, Some(512));
        assert_eq!(gpt.temperature, Some(0.2));
    }

    #[test]
    fn test_bind_addr() {
        let gateway = GatewayConfig::default();
        assert_eq!(gateway.bind_addr(false, None).unwrap().to_string(), "127.0.0.1:7860");
        assert_eq!(gateway.bind_addr(true, Some(8080)).unwrap().to_string(), "0.0.0.0:8080");

        let bad = GatewayConfig {
            host: "not a host".to_string(),
            ..GatewayConfig::default()
        };
        assert!(bad.bind_addr(false, None).is_err());
    }

    #[test]
    fn test_mask_secret() {
        assert_eq!(mask_secret(""), "(not set)");
        assert_eq!(mask_secret("short"), "***");
        assert_eq!(mask_secret("sk-ant-abcdef123456"), "sk-...456");
    }

    #[test]
    fn test_debug_and_redacted_hide_keys() {
        let mut cfg = PrismConfig::from_toml("", "test").unwrap();
        cfg.providers.google.api_key = "AIzaSyVerySecretValue".to_string();
        assert!(!format!("{:?}", cfg).contains("VerySecret"));
        let printed = toml::to_string_pretty(&cfg.redacted()).unwrap();
        assert!(!printed.contains("VerySecret"));
        assert!(printed.contains("AIz...lue"));
    }

    #[test]
    fn test_dotenv_file_supplies_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(
            &path,
            "# local keys\nGEMINI_API_KEY=AIza-from-dotenv\nANTHROPIC_API_KEY=\"sk-ant-quoted\"\n",
        )
        .unwrap();
        let vars: HashMap<String, String> = dotenvy::from_path_iter(&path)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        let expanded = expand_with(DEFAULT_CONFIG, |name| vars.get(name).cloned());
        let cfg = PrismConfig::from_toml(&expanded, ".env test").unwrap();
        assert_eq!(cfg.provider_settings(Selector::Gemini).api_key, "AIza-from-dotenv");
        assert_eq!(cfg.provider_settings(Selector::Claude).api_key, "sk-ant-quoted");
        assert_eq!(cfg.provider_settings(Selector::Gpt).api_key, "");
    }

    #[test]
    fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[gateway]\nport = 9000\nshare = true").unwrap();
        let cfg = PrismConfig::load(&Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.gateway.port, 9000);
        assert!(cfg.gateway.share);
    }

    #[test]
    fn test_load_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = PrismConfig::load(&Some(dir.path().join("absent.toml"))).unwrap_err();
        assert!(err.to_string().contains("prism init"));
    }

    #[test]
    fn test_load_invalid_toml_fails() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[gateway\nport = ").unwrap();
        assert!(PrismConfig::load(&Some(file.path().to_path_buf())).is_err());
    }
}
