use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::error::KiraError;

pub const DEFAULT_CONFIG_FILE: &str = "kira-cu.json";

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub output_root: Utf8PathBuf,
    pub gene_text_root: Utf8PathBuf,
    pub genome_text_root: Utf8PathBuf,
    pub replicon_base_url: String,
    pub catalog_base_url: String,
    pub requests_per_second: u32,
    pub fetch_workers: usize,
    pub processing_workers: Option<usize>,
    pub gene_retry_ceiling: u32,
    pub empty_body_retries: u32,
    pub empty_body_backoff_ms: u64,
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_root: Utf8PathBuf::from("Results"),
            gene_text_root: Utf8PathBuf::from("Gene"),
            genome_text_root: Utf8PathBuf::from("Genome"),
            replicon_base_url: "http://hsbiti.fr:8080/replicons".to_string(),
            catalog_base_url: "https://ftp.ncbi.nlm.nih.gov/genomes/GENOME_REPORTS".to_string(),
            requests_per_second: 2,
            fetch_workers: 12,
            processing_workers: None,
            gene_retry_ceiling: 5,
            empty_body_retries: 3,
            empty_body_backoff_ms: 500,
            request_timeout_secs: 60,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), KiraError> {
        if self.requests_per_second == 0 {
            return Err(KiraError::InvalidConfig(
                "requests_per_second must be at least 1".to_string(),
            ));
        }
        if self.fetch_workers == 0 {
            return Err(KiraError::InvalidConfig(
                "fetch_workers must be at least 1".to_string(),
            ));
        }
        if self.processing_workers == Some(0) {
            return Err(KiraError::InvalidConfig(
                "processing_workers must be at least 1".to_string(),
            ));
        }
        if self.gene_retry_ceiling == 0 {
            return Err(KiraError::InvalidConfig(
                "gene_retry_ceiling must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn processing_workers(&self) -> usize {
        self.processing_workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn empty_body_backoff(&self) -> Duration {
        Duration::from_millis(self.empty_body_backoff_ms)
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<Config, KiraError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if !config_path.exists() {
            if path.is_some() {
                return Err(KiraError::ConfigRead(config_path));
            }
            let config = Config::default();
            config.validate()?;
            return Ok(config);
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| KiraError::ConfigRead(config_path.clone()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Config, KiraError> {
        let config: Config =
            serde_json::from_str(content).map_err(|err| KiraError::ConfigParse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let config = ConfigLoader::parse(r#"{ "output_root": "out", "fetch_workers": 4 }"#).unwrap();
        assert_eq!(config.output_root, Utf8PathBuf::from("out"));
        assert_eq!(config.fetch_workers, 4);
        assert_eq!(config.requests_per_second, 2);
        assert_eq!(config.gene_retry_ceiling, 5);
        assert_eq!(config.gene_text_root, Utf8PathBuf::from("Gene"));
    }

    #[test]
    fn zero_rate_is_rejected() {
        let err = ConfigLoader::parse(r#"{ "requests_per_second": 0 }"#).unwrap_err();
        assert_matches!(err, KiraError::InvalidConfig(_));
    }

    #[test]
    fn explicit_missing_path_is_an_error() {
        let err = ConfigLoader::resolve(Some("/definitely/not/here/kira-cu.json")).unwrap_err();
        assert_matches!(err, KiraError::ConfigRead(_));
    }
}
