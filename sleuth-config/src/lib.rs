//! Loader for workspace configuration with YAML + environment overlays.
//!
//! Precedence, lowest first: built-in defaults, the YAML file(s), inline YAML,
//! then `SLEUTH__`-prefixed environment variables (`__` separates nesting, so
//! `SLEUTH__SEARCH__NUM_RESULTS=3` overrides `search.num_results`). After the
//! merge every string value goes through `${VAR}` expansion.
//!
//! API keys that are absent from every source fall back to the conventional
//! provider variables: `GEMINI_API_KEY`, `GROQ_API_KEY` and `EXA_API_KEY`.
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use serde_json::Value;
use sleuth_common::observability::LogFormat;
use std::path::{Path, PathBuf};

const MAXIMUM_ENV_EXPANSION_DEPTH: usize = 8;

pub const DEFAULT_AGENT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_GUARD_MODEL: &str = "meta-llama/llama-prompt-guard-2-86m";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SleuthConfig {
    pub version: Option<String>,
    pub agent: AgentConfig,
    pub guard: GuardConfig,
    pub search: SearchConfig,
    pub crawler: CrawlerConfig,
    pub logging: LoggingConfig,
}

/// The reasoning model that drives the tool loop.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub model: String,
    pub api_key: Option<String>,
    pub endpoint: String,
    pub temperature: Option<f32>,
    pub max_iterations: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_AGENT_MODEL.into(),
            api_key: env_key("GEMINI_API_KEY"),
            endpoint: "https://generativelanguage.googleapis.com/v1beta/".into(),
            temperature: None,
            max_iterations: 8,
        }
    }
}

/// The classifier that screens prompts and fetched pages.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    pub model: String,
    pub api_key: Option<String>,
    pub endpoint: String,
    pub threshold: f64,
    pub chunk_chars: usize,
    pub max_chunks: usize,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_GUARD_MODEL.into(),
            api_key: env_key("GROQ_API_KEY"),
            endpoint: "https://api.groq.com/openai/v1/".into(),
            threshold: 0.6,
            chunk_chars: 2000,
            max_chunks: 8,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub api_key: Option<String>,
    pub endpoint: String,
    pub num_results: u32,
    /// One of `auto`, `neural`, `keyword`; validated when the client is built.
    pub search_type: String,
    pub category: Option<String>,
    pub include_domains: Vec<String>,
    pub exclude_domains: Vec<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key: env_key("EXA_API_KEY"),
            endpoint: "https://api.exa.ai".into(),
            num_results: 5,
            search_type: "auto".into(),
            category: None,
            include_domains: Vec::new(),
            exclude_domains: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    pub user_agent: String,
    pub timeout_secs: u64,
    pub content_filter: Option<String>,
    pub max_page_chars: usize,
    /// Drop link-heavy and very short Markdown blocks before cleaning.
    pub pruning: bool,
    pub min_block_words: usize,
    pub max_link_density: f64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            user_agent: "AI-Research-Assistant/1.0".into(),
            timeout_secs: 30,
            content_filter: None,
            max_page_chars: 12_000,
            pruning: true,
            min_block_words: 3,
            max_link_density: 0.5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
    pub level: String,
    pub dir: Option<PathBuf>,
    pub file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Text,
            level: "info".into(),
            dir: None,
            file: false,
        }
    }
}

fn env_key(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Project-local config file, read from the working directory.
pub const LOCAL_CONFIG_FILE: &str = "sleuth.yaml";

/// `~/.config/sleuth/sleuth.yaml` (platform equivalent), if a config dir exists.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("sleuth").join("sleuth.yaml"))
}

/// Expand `$VAR`/`${VAR}` until the text stops changing. An unknown
/// variable stops expansion and leaves the text as it was.
fn expand_str(raw: &str) -> String {
    let mut cur = raw.to_string();
    for _ in 0..MAXIMUM_ENV_EXPANSION_DEPTH {
        let next = match shellexpand::env(&cur) {
            Ok(expanded) => expanded.into_owned(),
            Err(_) => break,
        };
        if next == cur {
            break;
        }
        cur = next;
    }
    cur
}

fn expand_env_in_value(v: &mut Value) {
    match v {
        Value::String(s) if s.contains('$') => *s = expand_str(s),
        Value::Array(items) => items.iter_mut().for_each(expand_env_in_value),
        Value::Object(map) => map.values_mut().for_each(expand_env_in_value),
        _ => {}
    }
}

/// An unresolved `${VAR}` in a key slot means the variable was unset; treat it
/// as missing so the provider fallback applies.
fn drop_unresolved_keys(v: &mut Value) {
    if let Value::Object(obj) = v {
        obj.retain(|k, val| {
            !(k == "api_key" && val.as_str().is_some_and(|s| s.contains("${")))
        });
        obj.values_mut().for_each(drop_unresolved_keys);
    }
}

/// Builder hides the `config` crate wiring (YAML + env overrides).
pub struct SleuthConfigLoader {
    builder: config::ConfigBuilder<config::builder::DefaultState>,
    env: Environment,
}

impl Default for SleuthConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl SleuthConfigLoader {
    /// Start from defaults; `SLEUTH__` environment overrides are applied last.
    ///
    /// ```
    /// use sleuth_config::SleuthConfigLoader;
    ///
    /// let config = SleuthConfigLoader::new()
    ///     .with_yaml_str("version: '1'\nsearch:\n  num_results: 7")
    ///     .load()
    ///     .expect("valid config");
    ///
    /// assert_eq!(config.version.as_deref(), Some("1"));
    /// assert_eq!(config.search.num_results, 7);
    /// assert_eq!(config.guard.threshold, 0.6);
    /// ```
    pub fn new() -> Self {
        let env = Environment::with_prefix("SLEUTH")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("search.include_domains")
            .with_list_parse_key("search.exclude_domains");
        Self {
            builder: Config::builder(),
            env,
        }
    }

    /// Attach a YAML/TOML/JSON file; the `config` crate infers format by suffix.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(true));
        self
    }

    /// Like [`Self::with_file`], but a missing file is skipped.
    pub fn with_optional_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(false));
        self
    }

    /// The user-level file from [`default_config_path`], then `./sleuth.yaml`
    /// on top. Both are optional.
    pub fn with_default_files(self) -> Self {
        let loader = match default_config_path() {
            Some(user) => self.with_optional_file(user),
            None => self,
        };
        loader.with_optional_file(LOCAL_CONFIG_FILE)
    }

    /// Allow tests/CLI to merge inline YAML snippets.
    pub fn with_yaml_str(mut self, yaml: &str) -> Self {
        self.builder = self
            .builder
            .add_source(File::from_str(yaml, config::FileFormat::Yaml));
        self
    }

    /// Consume the builder and deserialize the merged sources into strongly typed config.
    ///
    /// ```
    /// use sleuth_common::observability::LogFormat;
    /// use sleuth_config::SleuthConfigLoader;
    ///
    /// let config = SleuthConfigLoader::new()
    ///     .with_yaml_str(r#"
    /// agent:
    ///   model: "gemini-2.5-pro"
    ///   max_iterations: 4
    /// logging:
    ///   format: json
    /// "#)
    ///     .load()
    ///     .expect("valid configuration");
    ///
    /// assert_eq!(config.agent.model, "gemini-2.5-pro");
    /// assert_eq!(config.agent.max_iterations, 4);
    /// assert_eq!(config.logging.format, LogFormat::Json);
    /// assert_eq!(config.search.search_type, "auto");
    /// ```
    pub fn load(self) -> Result<SleuthConfig, ConfigError> {
        let cfg = self.builder.add_source(self.env).build()?;

        let mut v: Value = cfg.try_deserialize()?;
        expand_env_in_value(&mut v);
        drop_unresolved_keys(&mut v);

        let typed: SleuthConfig =
            serde_json::from_value(v).map_err(|e| ConfigError::Message(e.to_string()))?;

        Ok(typed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keys_and_domains_expand_anywhere_in_the_tree() {
        temp_env::with_vars(
            [("SLEUTH_TEST_EXA", Some("exa-123")), ("SLEUTH_TEST_SITE", Some("arxiv.org"))],
            || {
                let mut v = json!({
                    "search": {
                        "api_key": "${SLEUTH_TEST_EXA}",
                        "include_domains": ["$SLEUTH_TEST_SITE", "nature.com"],
                        "num_results": 5
                    },
                    "crawler": { "content_filter": null }
                });
                expand_env_in_value(&mut v);
                assert_eq!(v["search"]["api_key"], json!("exa-123"));
                assert_eq!(v["search"]["include_domains"], json!(["arxiv.org", "nature.com"]));
                assert_eq!(v["search"]["num_results"], json!(5));
                assert_eq!(v["crawler"]["content_filter"], Value::Null);
            },
        );
    }

    #[test]
    fn expansion_chains_stop_on_cycles_and_unknowns() {
        temp_env::with_vars(
            [
                ("SLEUTH_TEST_HOST", Some("api.exa.ai")),
                ("SLEUTH_TEST_BASE", Some("https://${SLEUTH_TEST_HOST}")),
                ("SLEUTH_TEST_LOOP_A", Some("${SLEUTH_TEST_LOOP_B}")),
                ("SLEUTH_TEST_LOOP_B", Some("${SLEUTH_TEST_LOOP_A}")),
                ("SLEUTH_TEST_UNSET", None),
            ],
            || {
                assert_eq!(expand_str("${SLEUTH_TEST_BASE}/search"), "https://api.exa.ai/search");
                assert_eq!(expand_str("key-${SLEUTH_TEST_UNSET}"), "key-${SLEUTH_TEST_UNSET}");

                let looped = expand_str("x=${SLEUTH_TEST_LOOP_A}");
                assert!(looped.starts_with("x=${"), "{looped}");
            },
        );
    }

    #[test]
    fn unresolved_api_keys_are_dropped() {
        let mut v = json!({
            "search": { "api_key": "${SLEUTH_TEST_MISSING}", "num_results": 3 },
            "agent": { "api_key": "literal" }
        });
        drop_unresolved_keys(&mut v);
        assert_eq!(v["search"].get("api_key"), None);
        assert_eq!(v["search"]["num_results"], json!(3));
        assert_eq!(v["agent"]["api_key"], json!("literal"));
    }

    #[test]
    fn empty_document_yields_defaults() {
        let cfg: SleuthConfig = serde_json::from_value(json!({})).unwrap();
        assert_eq!(cfg.agent.model, DEFAULT_AGENT_MODEL);
        assert_eq!(cfg.guard.model, DEFAULT_GUARD_MODEL);
        assert_eq!(cfg.guard.threshold, 0.6);
        assert_eq!(cfg.search.num_results, 5);
        assert_eq!(cfg.crawler.timeout_secs, 30);
        assert_eq!(cfg.crawler.user_agent, "AI-Research-Assistant/1.0");
        assert!(!cfg.logging.file);
    }
}
