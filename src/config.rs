use anyhow::Context;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

pub const CONFIG_ENV: &str = "ADMISSIOND_CONFIG";
pub const LOG_ENV: &str = "ADMISSIOND_LOG";

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub busy_timeout_ms: u64,
    pub default_credential: String,
    pub hash_iterations: u32,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5_000,
            default_credential: "12345".to_string(),
            hash_iterations: 10_000,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let mut cfg = match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        cfg.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.to_string_lossy()))?;
        Self::from_toml(&text)
            .with_context(|| format!("invalid config {}", path.to_string_lossy()))
    }

    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<()> {
        if let Some(v) = lookup("ADMISSIOND_BUSY_TIMEOUT_MS") {
            self.busy_timeout_ms = v
                .trim()
                .parse()
                .with_context(|| format!("ADMISSIOND_BUSY_TIMEOUT_MS is not a number: {v}"))?;
        }
        if let Some(v) = lookup("ADMISSIOND_HASH_ITERATIONS") {
            self.hash_iterations = v
                .trim()
                .parse()
                .with_context(|| format!("ADMISSIOND_HASH_ITERATIONS is not a number: {v}"))?;
        }
        if let Some(v) = lookup("ADMISSIOND_DEFAULT_CREDENTIAL") {
            if !v.trim().is_empty() {
                self.default_credential = v.trim().to_string();
            }
        }
        if self.hash_iterations == 0 {
            anyhow::bail!("hash_iterations must be at least 1");
        }
        Ok(())
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg = Config::from_toml("hash_iterations = 50\n").expect("parse");
        assert_eq!(cfg.hash_iterations, 50);
        assert_eq!(cfg.default_credential, "12345");
        assert_eq!(cfg.busy_timeout(), Duration::from_millis(5_000));
    }

    #[test]
    fn env_overrides_win_over_file_values() {
        let mut cfg = Config::from_toml("busy_timeout_ms = 10\n").expect("parse");
        let env: HashMap<&str, &str> = [
            ("ADMISSIOND_BUSY_TIMEOUT_MS", "250"),
            ("ADMISSIOND_DEFAULT_CREDENTIAL", " changeme "),
        ]
        .into_iter()
        .collect();
        cfg.apply_overrides(|k| env.get(k).map(|v| v.to_string()))
            .expect("overrides");
        assert_eq!(cfg.busy_timeout_ms, 250);
        assert_eq!(cfg.default_credential, "changeme");
    }

    #[test]
    fn zero_iterations_rejected() {
        let mut cfg = Config::default();
        let err = cfg
            .apply_overrides(|k| (k == "ADMISSIOND_HASH_ITERATIONS").then(|| "0".to_string()))
            .expect_err("zero iterations");
        assert!(err.to_string().contains("hash_iterations"));
    }

    #[test]
    fn wrong_value_type_is_rejected() {
        assert!(Config::from_toml("busy_timeout_ms = \"soon\"\n").is_err());
    }
}
