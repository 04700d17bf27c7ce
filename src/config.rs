use std::{fs, path::Path};

use once_cell::sync::Lazy;
use rand::{distr::Alphanumeric, rng, Rng};
use serde::{Deserialize, Serialize};

// --- LLM BACKEND CONFIG ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_llm_max_tokens")]
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            timeout_secs: default_llm_timeout_secs(),
            max_tokens: default_llm_max_tokens(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Default)]
#[serde(deny_unknown_fields)]
pub struct PartialLlmConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub timeout_secs: Option<u64>,
    pub max_tokens: Option<u32>,
}

impl PartialLlmConfig {
    fn merge_into(self, final_config: &mut LlmConfig) {
        if let Some(api_key) = self.api_key {
            final_config.api_key = api_key;
        }
        if let Some(base_url) = self.base_url {
            final_config.base_url = base_url;
        }
        if let Some(model) = self.model {
            final_config.model = model;
        }
        if let Some(timeout_secs) = self.timeout_secs {
            final_config.timeout_secs = timeout_secs;
        }
        if let Some(max_tokens) = self.max_tokens {
            final_config.max_tokens = max_tokens;
        }
    }
}

fn default_llm_base_url() -> String {
    "https://api.together.xyz/v1".to_string()
}

fn default_llm_model() -> String {
    "meta-llama/Meta-Llama-3.1-70B-Instruct-Turbo".to_string()
}

fn default_llm_timeout_secs() -> u64 {
    60
}

fn default_llm_max_tokens() -> u32 {
    1500
}

// Used for deserializing user-provided config files where all fields are optional.
#[derive(Debug, Deserialize, Serialize, Default)]
#[serde(deny_unknown_fields)]
pub struct PartialConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub base_path: Option<String>,
    pub password_salt: Option<String>,
    pub jwt_secret: Option<String>,
    pub db_url: Option<String>,
    pub log_level: Option<String>,
    pub llm: Option<PartialLlmConfig>,
}

impl PartialConfig {
    /// Merges the fields of this partial config into a final config, overwriting existing values.
    fn merge_into(self, final_config: &mut FinalConfig) {
        if let Some(host) = self.host {
            final_config.host = host;
        }
        if let Some(port) = self.port {
            final_config.port = port;
        }
        if let Some(base_path) = self.base_path {
            final_config.base_path = base_path;
        }
        if let Some(password_salt) = self.password_salt {
            final_config.password_salt = password_salt;
        }
        if let Some(jwt_secret) = self.jwt_secret {
            final_config.jwt_secret = jwt_secret;
        }
        if let Some(db_url) = self.db_url {
            final_config.db_url = db_url;
        }
        if let Some(log_level) = self.log_level {
            final_config.log_level = log_level;
        }
        if let Some(llm) = self.llm {
            llm.merge_into(&mut final_config.llm);
        }
    }
}

// The fully resolved configuration used by the application.
// This is also the format for the default configuration file.
#[derive(Debug, Deserialize, Serialize)]
pub struct FinalConfig {
    pub host: String,
    pub port: u16,
    pub base_path: String,
    pub password_salt: String,
    pub jwt_secret: String,
    pub db_url: String,
    pub log_level: String,
    pub llm: LlmConfig,
}

fn generate_random_string(len: usize) -> String {
    rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

fn get_env_var<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn get_config_from_env() -> PartialConfig {
    PartialConfig {
        host: get_env_var("HOST"),
        port: get_env_var("PORT"),
        base_path: get_env_var("BASE_PATH"),
        password_salt: get_env_var("PASSWORD_SALT"),
        jwt_secret: get_env_var("JWT_SECRET"),
        db_url: get_env_var("DB_URL"),
        log_level: get_env_var("LOG_LEVEL"),
        llm: {
            let llm = PartialLlmConfig {
                api_key: get_env_var("LLM_API_KEY"),
                base_url: get_env_var("LLM_BASE_URL"),
                model: get_env_var("LLM_MODEL"),
                timeout_secs: get_env_var("LLM_TIMEOUT_SECS"),
                max_tokens: get_env_var("LLM_MAX_TOKENS"),
            };
            if llm.api_key.is_none()
                && llm.base_url.is_none()
                && llm.model.is_none()
                && llm.timeout_secs.is_none()
                && llm.max_tokens.is_none()
            {
                None
            } else {
                Some(llm)
            }
        },
    }
}

pub static CONFIG: Lazy<FinalConfig> = Lazy::new(|| {
    let default_config_path = Path::new("config.default.yaml");
    let user_config_path = Path::new("config.yaml");

    // Create a FinalConfig with programmatic defaults.
    let mut effective_default_config = FinalConfig {
        host: "0.0.0.0".to_string(),
        port: 8000,
        base_path: "/api/v1".to_string(),
        password_salt: generate_random_string(48),
        jwt_secret: generate_random_string(48),
        db_url: "./storage/sqlite.db".to_string(),
        log_level: "info".to_string(),
        llm: LlmConfig::default(),
    };

    // If a default config file exists, load it as partial and merge it over the programmatic defaults.
    if default_config_path.exists() {
        if let Ok(config_str) = fs::read_to_string(default_config_path) {
            let file_defaults: PartialConfig =
                serde_yaml::from_str(&config_str).unwrap_or_else(|e| {
                    panic!(
                        "Failed to parse default configuration file at {:?}: {}",
                        default_config_path, e
                    )
                });

            file_defaults.merge_into(&mut effective_default_config);
        }
    }

    // Write the (potentially updated) defaults back to the file so generated
    // secrets survive a restart and new fields show up in the file.
    let yaml_str = serde_yaml::to_string(&effective_default_config).unwrap();
    fs::write(default_config_path, yaml_str)
        .unwrap_or_else(|err| panic!("Failed to write default configuration file: {}", err));

    // Start with the effective defaults.
    let mut final_config = effective_default_config;

    // Load the user's config if it exists. It's optional and overrides the defaults.
    if user_config_path.exists() {
        if let Ok(config_str) = fs::read_to_string(user_config_path) {
            let user_config: PartialConfig =
                serde_yaml::from_str(&config_str).unwrap_or_else(|e| {
                    panic!(
                        "Failed to parse user configuration file at {:?}: {}",
                        user_config_path, e
                    )
                });

            user_config.merge_into(&mut final_config);
        }
    }

    // Load config from environment variables, which have the highest priority.
    get_config_from_env().merge_into(&mut final_config);

    final_config
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_merge_overrides_only_present_fields() {
        let mut final_config = FinalConfig {
            host: "0.0.0.0".to_string(),
            port: 8000,
            base_path: "/api/v1".to_string(),
            password_salt: "salt".to_string(),
            jwt_secret: "secret".to_string(),
            db_url: "./storage/sqlite.db".to_string(),
            log_level: "info".to_string(),
            llm: LlmConfig::default(),
        };

        let partial: PartialConfig =
            serde_yaml::from_str("port: 9000\nllm:\n  model: test-model\n").unwrap();
        partial.merge_into(&mut final_config);

        assert_eq!(final_config.port, 9000);
        assert_eq!(final_config.llm.model, "test-model");
        // Untouched fields keep their defaults.
        assert_eq!(final_config.host, "0.0.0.0");
        assert_eq!(final_config.llm.timeout_secs, 60);
    }

    #[test]
    fn partial_config_round_trips_through_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "port: 9100\nlog_level: debug\n").unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let parsed: PartialConfig = serde_yaml::from_str(&content).unwrap();
        assert_eq!(parsed.port, Some(9100));
        assert_eq!(parsed.log_level.as_deref(), Some("debug"));
        assert!(parsed.llm.is_none());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let parsed: Result<PartialConfig, _> = serde_yaml::from_str("bogus_field: 1\n");
        assert!(parsed.is_err());
    }
}
