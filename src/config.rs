//! Client configuration.

use std::env;
use std::fs;

use anyhow::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneBotConfig {
    /// Backend base URL; must be https unless `allow_http` is set. Checked
    /// at call time, so a config without it still loads.
    #[serde(default)]
    pub backend_url: String,

    #[serde(default = "default_lang")]
    pub default_lang: String,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,

    /// Escape hatch for loopback/dev backends; production configs leave it
    /// off.
    #[serde(default)]
    pub allow_http: bool,

    #[serde(default = "default_token_file")]
    pub token_file: String,

    #[serde(default = "default_transcripts_dir")]
    pub transcripts_dir: String,
}

fn default_lang() -> String {
    "english".to_string()
}

fn default_timeout_ms() -> u64 {
    12_000
}

fn default_min_interval_ms() -> u64 {
    800
}

fn default_token_file() -> String {
    "scene_tokens.json".to_string()
}

fn default_transcripts_dir() -> String {
    "transcripts".to_string()
}

impl SceneBotConfig {
    /// Load configuration from a YAML or JSON/JSON-LD file, picked by
    /// extension. `${VAR}` references are replaced from the environment;
    /// unknown variables are left in place.
    pub fn load(path: &str) -> Result<Self> {
        let content = read_text_lenient(path)?;
        let content = substitute_env_vars(&content);

        let path_lower = path.to_lowercase();
        let config = if path_lower.ends_with(".json") || path_lower.ends_with(".jsonld") {
            serde_json::from_str(&content)?
        } else {
            serde_yaml::from_str(&content)?
        };
        Ok(config)
    }

    /// Build a configuration purely from `SCENE_*` environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            backend_url: env::var("SCENE_BACKEND_URL").unwrap_or(defaults.backend_url),
            default_lang: env::var("SCENE_LANG").unwrap_or(defaults.default_lang),
            timeout_ms: env::var("SCENE_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.timeout_ms),
            min_interval_ms: env::var("SCENE_MIN_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.min_interval_ms),
            allow_http: env::var("SCENE_ALLOW_HTTP")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(defaults.allow_http),
            token_file: env::var("SCENE_TOKEN_FILE").unwrap_or(defaults.token_file),
            transcripts_dir: env::var("SCENE_TRANSCRIPTS_DIR").unwrap_or(defaults.transcripts_dir),
        }
    }

    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.timeout_ms)
    }

    pub fn min_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.min_interval_ms)
    }
}

impl Default for SceneBotConfig {
    fn default() -> Self {
        Self {
            backend_url: String::new(),
            default_lang: default_lang(),
            timeout_ms: default_timeout_ms(),
            min_interval_ms: default_min_interval_ms(),
            allow_http: false,
            token_file: default_token_file(),
            transcripts_dir: default_transcripts_dir(),
        }
    }
}

/// Read a config file, stripping a UTF-8 BOM and decoding GBK as a fallback
/// for files saved by legacy editors.
fn read_text_lenient(path: &str) -> Result<String> {
    let mut bytes = fs::read(path)?;
    if bytes.starts_with(&[0xEF, 0xBB, 0xBF]) {
        bytes.drain(0..3);
    }

    match String::from_utf8(bytes) {
        Ok(text) => Ok(text),
        Err(e) => {
            let (cow, _, _) = encoding_rs::GBK.decode(e.as_bytes());
            Ok(cow.into_owned())
        }
    }
}

/// Replace `${VAR_NAME}` references with environment values.
fn substitute_env_vars(content: &str) -> String {
    let pattern = Regex::new(r"\$\{(\w+)\}").unwrap();
    pattern
        .replace_all(content, |caps: &regex::Captures| {
            let var_name = caps.get(1).unwrap().as_str();
            env::var(var_name).unwrap_or_else(|_| caps.get(0).unwrap().as_str().to_string())
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn yaml_load_fills_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("scene.yaml");
        fs::write(&path, "backend_url: https://api.scene.example\n").expect("write");

        let config = SceneBotConfig::load(path.to_str().unwrap()).expect("load");
        assert_eq!(config.backend_url, "https://api.scene.example");
        assert_eq!(config.default_lang, "english");
        assert_eq!(config.timeout_ms, 12_000);
        assert_eq!(config.min_interval_ms, 800);
        assert!(!config.allow_http);
    }

    #[test]
    fn json_load_is_picked_by_extension() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("scene.json");
        fs::write(
            &path,
            r#"{"backend_url": "https://api.scene.example", "timeout_ms": 3000}"#,
        )
        .expect("write");

        let config = SceneBotConfig::load(path.to_str().unwrap()).expect("load");
        assert_eq!(config.timeout_ms, 3000);
    }

    #[test]
    fn env_references_are_substituted() {
        std::env::set_var("SCENE_TEST_SUB_HOST", "api.scene.example");
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("scene.yaml");
        fs::write(
            &path,
            "backend_url: https://${SCENE_TEST_SUB_HOST}\ndefault_lang: ${SCENE_TEST_SUB_MISSING}\n",
        )
        .expect("write");

        let config = SceneBotConfig::load(path.to_str().unwrap()).expect("load");
        assert_eq!(config.backend_url, "https://api.scene.example");
        // Unknown variables stay literal.
        assert_eq!(config.default_lang, "${SCENE_TEST_SUB_MISSING}");
        std::env::remove_var("SCENE_TEST_SUB_HOST");
    }

    #[test]
    fn bom_is_stripped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("scene.yaml");
        let mut file = fs::File::create(&path).expect("create");
        file.write_all(&[0xEF, 0xBB, 0xBF]).expect("bom");
        file.write_all(b"backend_url: https://api.scene.example\n")
            .expect("body");
        drop(file);

        let config = SceneBotConfig::load(path.to_str().unwrap()).expect("load");
        assert_eq!(config.backend_url, "https://api.scene.example");
    }
}
