//! Application configuration: `config.yml` with code defaults.
//!
//! Unknown keys are a configuration error, not silently ignored. CLI flags
//! override file values at the call sites that care.

use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Result, ScoutError};
use crate::extractors::ocr::OcrConfig;
use crate::models::{ConfidenceLevel, DiscoveryOptions, ExtractorKind};
use crate::validator::{ValidationLevel, ValidatorConfig};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub ocr: OcrSection,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            discovery: DiscoveryConfig::default(),
            validation: ValidationConfig::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
            ocr: OcrSection::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DiscoveryConfig {
    pub enable_crawling: bool,
    pub enable_validation: bool,
    /// Extraction families; `ocr` and `pdf` are opt-in.
    pub methods: Vec<String>,
    pub confidence_threshold: String,
    pub language: String,
    pub cultural_context: String,
    pub max_depth: u32,
    pub timeout_seconds: u64,
    pub rate_limit_seconds: f64,
    pub respect_robots: bool,
    pub user_agent: String,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        DiscoveryConfig {
            enable_crawling: true,
            enable_validation: true,
            methods: vec![
                "email".to_string(),
                "phone".to_string(),
                "form".to_string(),
                "social_media".to_string(),
            ],
            confidence_threshold: "low".to_string(),
            language: "de".to_string(),
            cultural_context: "german".to_string(),
            max_depth: 2,
            timeout_seconds: 30,
            rate_limit_seconds: 1.0,
            respect_robots: true,
            user_agent: "ContactScout/1.0 (+https://github.com/contact-scout)".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ValidationConfig {
    pub level: String,
    pub enable_dns: bool,
    pub enable_smtp: bool,
    pub dns_servers: Vec<String>,
    pub dns_timeout_seconds: u64,
    pub smtp_timeout_seconds: u64,
    pub smtp_sender: String,
    pub rate_limit_seconds: f64,
    pub http_timeout_seconds: u64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        ValidationConfig {
            level: "standard".to_string(),
            enable_dns: true,
            enable_smtp: false,
            dns_servers: vec![
                "8.8.8.8".to_string(),
                "8.8.4.4".to_string(),
                "1.1.1.1".to_string(),
            ],
            dns_timeout_seconds: 5,
            smtp_timeout_seconds: 5,
            smtp_sender: "validation@contact-scout.local".to_string(),
            rate_limit_seconds: 1.0,
            http_timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    pub database_path: String,
    pub retention_days: i64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            database_path: "data/contacts.db".to_string(),
            retention_days: 180,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OcrSection {
    pub languages: Vec<String>,
    pub tesseract_command: String,
}

impl Default for OcrSection {
    fn default() -> Self {
        OcrSection {
            languages: vec!["deu".to_string(), "eng".to_string()],
            tesseract_command: "tesseract".to_string(),
        }
    }
}

pub async fn load_config(path: &str) -> Result<Config> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => {
            let config: Config = serde_yaml::from_str(&content)
                .map_err(|e| ScoutError::Config(format!("invalid {}: {}", path, e)))?;
            Ok(config)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("{} not found, using defaults", path);
            Ok(Config::default())
        }
        Err(e) => Err(e.into()),
    }
}

impl Config {
    pub fn discovery_options(&self) -> Result<DiscoveryOptions> {
        let mut methods: HashSet<ExtractorKind> = HashSet::new();
        for name in &self.discovery.methods {
            let kind = ExtractorKind::from_str(name).map_err(ScoutError::Config)?;
            methods.insert(kind);
        }
        let confidence_threshold = ConfidenceLevel::from_str(&self.discovery.confidence_threshold)
            .map_err(ScoutError::Config)?;

        Ok(DiscoveryOptions {
            enable_crawling: self.discovery.enable_crawling,
            enable_validation: self.discovery.enable_validation,
            methods,
            confidence_threshold,
            language: self.discovery.language.clone(),
            cultural_context: self.discovery.cultural_context.clone(),
            max_depth: self.discovery.max_depth,
            timeout: Duration::from_secs(self.discovery.timeout_seconds),
            rate_limit: Duration::from_secs_f64(self.discovery.rate_limit_seconds),
            respect_robots: self.discovery.respect_robots,
            user_agent: self.discovery.user_agent.clone(),
        })
    }

    pub fn validator_config(&self) -> ValidatorConfig {
        ValidatorConfig {
            enable_dns: self.validation.enable_dns,
            enable_smtp: self.validation.enable_smtp,
            rate_limit: Duration::from_secs_f64(self.validation.rate_limit_seconds),
            dns_servers: self.validation.dns_servers.clone(),
            dns_timeout: Duration::from_secs(self.validation.dns_timeout_seconds),
            smtp_timeout: Duration::from_secs(self.validation.smtp_timeout_seconds),
            smtp_sender: self.validation.smtp_sender.clone(),
            http_timeout: Duration::from_secs(self.validation.http_timeout_seconds),
            user_agent: self.discovery.user_agent.clone(),
        }
    }

    pub fn validation_level(&self) -> Result<ValidationLevel> {
        ValidationLevel::from_str(&self.validation.level).map_err(ScoutError::Config)
    }

    pub fn ocr_config(&self) -> OcrConfig {
        OcrConfig {
            languages: self.ocr.languages.clone(),
            tesseract_command: self.ocr.tesseract_command.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_converts_to_options() {
        let config = Config::default();
        let options = config.discovery_options().unwrap();
        assert!(options.enable_crawling);
        assert_eq!(options.max_depth, 2);
        assert_eq!(options.methods.len(), 4);
        assert!(!options.methods.contains(&ExtractorKind::Ocr));
        assert_eq!(options.confidence_threshold, ConfidenceLevel::Low);
    }

    #[test]
    fn yaml_roundtrip_with_overrides() {
        let yaml = r#"
discovery:
  enable_crawling: false
  enable_validation: true
  methods: [email, phone, ocr]
  confidence_threshold: medium
  language: de
  cultural_context: german
  max_depth: 1
  timeout_seconds: 10
  rate_limit_seconds: 0.5
  respect_robots: true
  user_agent: "TestAgent/1.0"
validation:
  level: comprehensive
  enable_dns: true
  enable_smtp: true
  dns_servers: ["9.9.9.9"]
  dns_timeout_seconds: 3
  smtp_timeout_seconds: 4
  smtp_sender: "probe@test.local"
  rate_limit_seconds: 2.0
  http_timeout_seconds: 8
storage:
  database_path: "/tmp/x.db"
  retention_days: 30
logging:
  level: debug
ocr:
  languages: [deu]
  tesseract_command: tesseract
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        let options = config.discovery_options().unwrap();
        assert!(!options.enable_crawling);
        assert!(options.methods.contains(&ExtractorKind::Ocr));
        assert_eq!(options.confidence_threshold, ConfidenceLevel::Medium);
        assert_eq!(options.rate_limit, Duration::from_millis(500));

        assert_eq!(config.validation_level().unwrap(), ValidationLevel::Comprehensive);
        let vc = config.validator_config();
        assert!(vc.enable_smtp);
        assert_eq!(vc.dns_servers, vec!["9.9.9.9".to_string()]);
        assert_eq!(config.storage.retention_days, 30);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let yaml = r#"
discovery:
  enable_crawling: true
  enable_validation: true
  methods: [email]
  confidence_threshold: low
  language: de
  cultural_context: german
  max_depth: 2
  timeout_seconds: 30
  rate_limit_seconds: 1.0
  respect_robots: true
  user_agent: "X"
  no_such_option: true
"#;
        assert!(serde_yaml::from_str::<Config>(yaml).is_err());
    }

    #[test]
    fn unknown_method_name_is_an_error() {
        let mut config = Config::default();
        config.discovery.methods.push("telepathy".to_string());
        assert!(config.discovery_options().is_err());
    }
}
