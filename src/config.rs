//! Runtime settings.
//!
//! Loaded from `~/.remodel/config.toml` when present, then overridden from the environment.
//! The resolved value is passed down explicitly; nothing here is global.
use eyre::{Result, eyre};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Anthropic,
    OpenAi,
    DeepSeek,
    Google,
    DeepInfra,
}

impl Provider {
    pub const ALL: [Provider; 5] = [
        Provider::Anthropic,
        Provider::OpenAi,
        Provider::DeepSeek,
        Provider::Google,
        Provider::DeepInfra,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Provider::Anthropic => "anthropic",
            Provider::OpenAi => "openai",
            Provider::DeepSeek => "deepseek",
            Provider::Google => "google",
            Provider::DeepInfra => "deepinfra",
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            Provider::Anthropic => "claude-3-5-sonnet-20241022",
            Provider::OpenAi => "gpt-4o",
            Provider::DeepSeek => "deepseek-chat",
            Provider::Google => "gemini-2.5-pro-exp-03-25",
            Provider::DeepInfra => "Qwen/Qwen2.5-Coder-32B-Instruct",
        }
    }

    pub fn base_url(self) -> &'static str {
        match self {
            Provider::Anthropic => "https://api.anthropic.com",
            Provider::OpenAi => "https://api.openai.com/v1",
            Provider::DeepSeek => "https://api.deepseek.com/v1",
            Provider::Google => "https://generativelanguage.googleapis.com/v1beta/openai",
            Provider::DeepInfra => "https://api.deepinfra.com/v1/openai",
        }
    }

    /// Environment variable holding the API key.
    pub fn key_var(self) -> &'static str {
        match self {
            Provider::Anthropic => "ANTHROPIC_API_KEY",
            Provider::OpenAi => "OPENAI_API_KEY",
            Provider::DeepSeek => "DEEPSEEK_API_KEY",
            Provider::Google => "GEMINI_API_KEY",
            Provider::DeepInfra => "DEEPINFRA_API_KEY",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Provider::ALL
            .into_iter()
            .find(|p| p.name() == wanted)
            .ok_or_else(|| {
                let known: Vec<&str> = Provider::ALL.iter().map(|p| p.name()).collect();
                format!("unknown provider {s:?}; expected one of {}", known.join(", "))
            })
    }
}

/// One model binding: who to call and with what credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelConfig {
    pub provider: Provider,
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}

/// Knobs of a single orchestration run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Hard cap on tool-calling rounds.
    pub max_steps: usize,
    /// Whether to ask the model to pick between base and complex bindings.
    pub classify: bool,
    /// How many trailing history messages the preliminary response sees.
    pub history_window: usize,
    /// Characters per text frame when emitting a whole turn at once.
    pub chunk_chars: usize,
    pub classify_max_tokens: u32,
    pub preliminary_max_tokens: u32,
    pub concluding_max_tokens: u32,
    pub agent_max_tokens: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_steps: 7,
            classify: true,
            history_window: 10,
            chunk_chars: 20,
            classify_max_tokens: 100,
            preliminary_max_tokens: 300,
            concluding_max_tokens: 200,
            agent_max_tokens: 4096,
        }
    }
}

/// Shape of `config.toml`. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct ConfigFile {
    owner: Option<String>,
    provider: Option<Provider>,
    model: Option<String>,
    base_url: Option<String>,
    complex_provider: Option<Provider>,
    complex_model: Option<String>,
    complex_base_url: Option<String>,
    max_steps: Option<usize>,
    classify: Option<bool>,
    history_window: Option<usize>,
    chunk_size: Option<usize>,
    formatter: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    /// State directory: socket, config and project store live here.
    pub home: PathBuf,
    /// Default owner for projects created from this machine.
    pub owner: String,
    pub base: ModelConfig,
    pub complex: ModelConfig,
    pub engine: EngineConfig,
    /// External formatter argv; empty means the built-in normalizer.
    pub formatter: Vec<String>,
}

impl Settings {
    /// Resolve from the process environment and the config file under the state directory.
    pub fn load() -> Result<Self> {
        let env = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        let home = default_home(&env);
        let path = home.join("config.toml");
        let file = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| eyre!("failed to read {}: {e}", path.display()))?;
            toml::from_str(&contents)
                .map_err(|e| eyre!("invalid config at {}: {e}", path.display()))?
        } else {
            ConfigFile::default()
        };
        let settings = Self::resolve(home, file, &env)?;
        tracing::debug!(
            home = %settings.home.display(),
            base = %settings.base.provider,
            complex = %settings.complex.provider,
            max_steps = settings.engine.max_steps,
            "config: resolved"
        );
        Ok(settings)
    }

    /// Parse a config file body and apply overrides from `env`.
    pub fn from_parts(
        home: PathBuf,
        config_toml: &str,
        env: &dyn Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let file: ConfigFile = toml::from_str(config_toml).map_err(|e| eyre!("invalid config: {e}"))?;
        Self::resolve(home, file, env)
    }

    fn resolve(home: PathBuf, file: ConfigFile, env: &dyn Fn(&str) -> Option<String>) -> Result<Self> {
        let parse_provider = |var: &str| -> Result<Option<Provider>> {
            env(var)
                .map(|v| v.parse::<Provider>().map_err(|e| eyre!("{var}: {e}")))
                .transpose()
        };

        let base_provider = parse_provider("REMODEL_PROVIDER")?
            .or(file.provider)
            .unwrap_or(Provider::Anthropic);
        let base_model = env("REMODEL_MODEL")
            .or(file.model)
            .unwrap_or_else(|| base_provider.default_model().to_string());

        let complex_provider = parse_provider("REMODEL_COMPLEX_PROVIDER")?
            .or(file.complex_provider)
            .unwrap_or(Provider::Anthropic);
        let complex_model = env("REMODEL_COMPLEX_MODEL")
            .or(file.complex_model)
            .unwrap_or_else(|| match complex_provider {
                Provider::Anthropic => "claude-3-7-sonnet-20250219".to_string(),
                other => other.default_model().to_string(),
            });

        let mut engine = EngineConfig::default();
        if let Some(steps) = env("REMODEL_MAX_STEPS") {
            engine.max_steps = steps
                .trim()
                .parse()
                .map_err(|e| eyre!("REMODEL_MAX_STEPS: {e}"))?;
        } else if let Some(steps) = file.max_steps {
            engine.max_steps = steps;
        }
        if engine.max_steps == 0 {
            return Err(eyre!("max-steps must be at least 1"));
        }
        if let Some(classify) = file.classify {
            engine.classify = classify;
        }
        if let Some(window) = file.history_window {
            engine.history_window = window;
        }
        if let Some(chunk) = file.chunk_size {
            engine.chunk_chars = chunk.max(1);
        }

        let formatter = match env("REMODEL_FORMATTER") {
            Some(argv) => argv.split_whitespace().map(str::to_string).collect(),
            None => file.formatter.unwrap_or_default(),
        };

        let owner = file
            .owner
            .or_else(|| env("USER"))
            .unwrap_or_else(|| "local".to_string());

        Ok(Settings {
            home,
            owner,
            base: ModelConfig {
                provider: base_provider,
                model: base_model,
                api_key: env(base_provider.key_var()),
                base_url: file.base_url,
            },
            complex: ModelConfig {
                provider: complex_provider,
                model: complex_model,
                api_key: env(complex_provider.key_var()),
                base_url: file.complex_base_url,
            },
            engine,
            formatter,
        })
    }

    /// UNIX socket the hub listens on.
    pub fn socket_path(&self) -> PathBuf {
        self.home.join("socket")
    }

    pub fn projects_dir(&self) -> PathBuf {
        self.home.join("projects")
    }
}

/// `REMODEL_HOME`, else `~/.remodel`.
fn default_home(env: &dyn Fn(&str) -> Option<String>) -> PathBuf {
    if let Some(home) = env("REMODEL_HOME") {
        return PathBuf::from(home);
    }
    let home = env("HOME").unwrap_or_else(|| String::from("."));
    Path::new(&home).join(".remodel")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_file_or_env() {
        let s = Settings::from_parts(PathBuf::from("/tmp/r"), "", &env_of(&[])).unwrap();
        assert_eq!(s.base.provider, Provider::Anthropic);
        assert_eq!(s.base.model, "claude-3-5-sonnet-20241022");
        assert_eq!(s.complex.model, "claude-3-7-sonnet-20250219");
        assert_eq!(s.engine, EngineConfig::default());
        assert!(s.base.api_key.is_none());
        assert!(s.formatter.is_empty());
        assert_eq!(s.socket_path(), PathBuf::from("/tmp/r/socket"));
    }

    #[test]
    fn env_beats_file() {
        let file = r#"
            provider = "openai"
            max-steps = 3
            formatter = ["prettier", "--stdin-filepath", "{path}"]
        "#;
        let env = env_of(&[
            ("REMODEL_PROVIDER", "deepseek"),
            ("REMODEL_MAX_STEPS", "5"),
            ("DEEPSEEK_API_KEY", "sk-test"),
        ]);
        let s = Settings::from_parts(PathBuf::from("/h"), file, &env).unwrap();
        assert_eq!(s.base.provider, Provider::DeepSeek);
        assert_eq!(s.base.model, "deepseek-chat");
        assert_eq!(s.base.api_key.as_deref(), Some("sk-test"));
        assert_eq!(s.engine.max_steps, 5);
        assert_eq!(s.formatter.len(), 3);
    }

    #[test]
    fn rejects_unknown_provider_and_zero_steps() {
        let bad = Settings::from_parts(
            PathBuf::from("/h"),
            "",
            &env_of(&[("REMODEL_PROVIDER", "acme")]),
        );
        assert!(bad.is_err());
        assert!(Settings::from_parts(PathBuf::from("/h"), "max-steps = 0", &env_of(&[])).is_err());
        assert!(Settings::from_parts(PathBuf::from("/h"), "colour = 1", &env_of(&[])).is_err());
    }

    #[test]
    fn provider_names_round_trip() {
        for p in Provider::ALL {
            assert_eq!(p.name().parse::<Provider>().unwrap(), p);
        }
        assert_eq!("OpenAI".parse::<Provider>().unwrap(), Provider::OpenAi);
    }
}
