use std::{env, path::PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tokio::fs;
use tracing::info;

const DEFAULT_CONFIG_PATH: &str = "config/app.yaml";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub working_dir: String,
    pub storage: StorageConfig,
    pub upload: UploadConfig,
    pub ingestion: IngestionConfig,
    pub llm: LlmConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 5000,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub namespace: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            namespace: "documents".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub max_bytes: usize,
    pub allowed_extensions: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            allowed_extensions: ["pdf", "txt", "csv", "xlsx", "xls"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    /// Run OCR on image-only pages during structure-aware conversion.
    pub use_ocr: bool,
    /// Also OCR when the text layer only covers part of the document.
    pub force_ocr: bool,
    pub ocr_language: String,
    pub render_dpi: u32,
    pub pdftoppm_cmd: String,
    pub tesseract_cmd: String,
    pub temp_dir: Option<PathBuf>,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            use_ocr: true,
            force_ocr: false,
            ocr_language: "eng".into(),
            render_dpi: 200,
            pdftoppm_cmd: "pdftoppm".into(),
            tesseract_cmd: "tesseract".into(),
            temp_dir: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,
    pub base_url: String,
    pub max_context_tokens: usize,
    pub max_response_tokens: u32,
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".into(),
            base_url: "https://api.openai.com".into(),
            max_context_tokens: 8000,
            max_response_tokens: 1000,
            temperature: 0.3,
        }
    }
}

/// Optional shared-key check on the document endpoints. `/health` stays open.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub enabled: bool,
    pub header: String,
    /// Falls back to the `API_KEY` environment variable when unset.
    pub api_key: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            header: "X-API-Key".into(),
            api_key: None,
        }
    }
}

impl AppConfig {
    pub fn working_dir(&self) -> PathBuf {
        if self.working_dir.trim().is_empty() {
            PathBuf::from("data")
        } else {
            PathBuf::from(&self.working_dir)
        }
    }

    pub fn is_allowed_extension(&self, ext: &str) -> bool {
        self.upload
            .allowed_extensions
            .iter()
            .any(|allowed| allowed.trim_start_matches('.').eq_ignore_ascii_case(ext))
    }
}

pub async fn load_config() -> Result<AppConfig> {
    let path = config_path();
    let contents = fs::read_to_string(&path)
        .await
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    let config = parse_config(&contents)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    info!(path = %path.display(), "Configuration loaded from disk");
    Ok(config)
}

pub fn parse_config(contents: &str) -> Result<AppConfig> {
    let config: AppConfig = serde_yaml::from_str(contents)?;
    Ok(config)
}

fn config_path() -> PathBuf {
    env::var("APP_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let config = parse_config("server:\n  host: 127.0.0.1\n  port: 8080\n").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.upload.max_bytes, 16 * 1024 * 1024);
        assert!(config.ingestion.use_ocr);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.llm.max_context_tokens, 8000);
        assert!(!config.auth.enabled);
        assert_eq!(config.auth.header, "X-API-Key");
    }

    #[test]
    fn auth_section_parses() {
        let config = parse_config("auth:\n  enabled: true\n  api_key: s3cret\n").unwrap();
        assert!(config.auth.enabled);
        assert_eq!(config.auth.api_key.as_deref(), Some("s3cret"));
        assert_eq!(config.auth.header, "X-API-Key");
    }

    #[test]
    fn extensions_match_without_dot_or_case() {
        let config = parse_config("upload:\n  allowed_extensions: [\".PDF\", csv]\n").unwrap();
        assert!(config.is_allowed_extension("pdf"));
        assert!(config.is_allowed_extension("CSV"));
        assert!(!config.is_allowed_extension("xlsx"));
    }

    #[test]
    fn storage_backend_parses_lowercase() {
        let config = parse_config("storage:\n  backend: json\n  namespace: prod\n").unwrap();
        assert_eq!(config.storage.backend, StorageBackend::Json);
        assert_eq!(config.storage.namespace, "prod");
    }
}
