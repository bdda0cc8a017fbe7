//! Startup configuration for the service.
//!
//! Settings load from an optional `config` file plus `TEXTLIFT`-prefixed
//! environment variables (e.g. `TEXTLIFT__AUTH__TOKEN`). Everything here is
//! fixed for the lifetime of the process.

use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ServiceError, ServiceResult};

/// Static configuration that cannot be changed at runtime
#[derive(Debug, Clone, Deserialize)]
pub struct StaticConfig {
    #[serde(default = "default_server")]
    pub server: ServerConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default = "default_ocr")]
    pub ocr: OcrConfig,

    #[serde(default = "default_limits")]
    pub limits: LimitsConfig,

    #[serde(default = "default_cache")]
    pub cache: CacheConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

/// Request authentication
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    /// Shared secret compared against the `x-app-token` request header.
    /// There is no built-in default; startup fails when this is unset.
    #[serde(default)]
    pub token: String,
}

/// Defaults for the OCR pipeline. Most of these can be overridden
/// per-request via query parameters on `POST /ocr`.
#[derive(Debug, Clone, Deserialize)]
pub struct OcrConfig {
    /// Default tesseract language(s), e.g. "eng" or "eng+spa".
    #[serde(default = "default_language")]
    pub language: String,

    /// Worker count passed to ocrmypdf. Kept at 1 so per-request resource
    /// usage stays predictable under concurrent load.
    #[serde(default = "default_jobs")]
    pub jobs: u32,

    /// ocrmypdf optimization level. 0 skips the extra compression work.
    #[serde(default)]
    pub optimize: u8,

    /// Per-page tesseract timeout handed to ocrmypdf as a guardrail for
    /// pathological inputs.
    #[serde(default = "default_tesseract_timeout")]
    pub tesseract_timeout_secs: u64,

    /// Watchdog for the whole ocrmypdf invocation; expiry kills the child.
    #[serde(default = "default_run_timeout")]
    pub run_timeout_secs: u64,

    /// Default OCR engine mode (0-3). 1 = LSTM-only is usually fast and
    /// accurate.
    #[serde(default = "default_tesseract_oem")]
    pub tesseract_oem: Option<u8>,

    /// Default page segmentation mode (0-13). 6 often speeds up uniform
    /// pages.
    #[serde(default = "default_tesseract_psm")]
    pub tesseract_psm: Option<u8>,

    /// Skip OCR entirely when every page already carries enough text.
    #[serde(default = "default_true")]
    pub only_ocr_if_needed: bool,

    /// Minimum stripped characters for a page to count as having text.
    #[serde(default = "default_min_chars")]
    pub min_chars_per_page: u32,

    /// Re-OCR pages even when they already have a text layer.
    #[serde(default)]
    pub force_ocr: bool,

    /// Let ocrmypdf auto-rotate pages.
    #[serde(default)]
    pub rotate_pages: bool,

    /// Stage the processed PDF for `GET /download/{token}`.
    #[serde(default = "default_true")]
    pub keep_searchable_pdf: bool,
}

impl OcrConfig {
    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }
}

/// Upload limits
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

/// Download cache configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Directory processed PDFs are staged in while awaiting download.
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,

    /// How long a staged PDF stays resolvable before eviction.
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,

    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl StaticConfig {
    /// Reject configurations that must not reach serving.
    pub fn validate(&self) -> ServiceResult<()> {
        if self.auth.token.trim().is_empty() {
            return Err(ServiceError::Config {
                message: "auth.token must be set (TEXTLIFT__AUTH__TOKEN)".to_string(),
            });
        }
        if self.ocr.jobs == 0 {
            return Err(ServiceError::Config {
                message: "ocr.jobs must be at least 1".to_string(),
            });
        }
        if let Some(oem) = self.ocr.tesseract_oem
            && oem > 3
        {
            return Err(ServiceError::Config {
                message: format!("ocr.tesseract_oem must be 0-3, got {oem}"),
            });
        }
        if let Some(psm) = self.ocr.tesseract_psm
            && psm > 13
        {
            return Err(ServiceError::Config {
                message: format!("ocr.tesseract_psm must be 0-13, got {psm}"),
            });
        }
        if self.cache.sweep_interval_secs == 0 {
            return Err(ServiceError::Config {
                message: "cache.sweep_interval_secs must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Load static configuration from file and env vars
pub fn load() -> ServiceResult<StaticConfig> {
    Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(
            Environment::with_prefix("TEXTLIFT")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .map_err(|e| ServiceError::Config {
            message: format!("Failed to build config: {}", e),
        })?
        .try_deserialize()
        .map_err(|e| ServiceError::Config {
            message: format!("Failed to deserialize config: {}", e),
        })
}

// ==================== Default Value Functions ====================

pub(crate) fn default_server() -> ServerConfig {
    ServerConfig {
        host: default_host(),
        port: default_port(),
    }
}

pub(crate) fn default_host() -> String {
    "0.0.0.0".to_string()
}

pub(crate) fn default_port() -> u16 {
    8080
}

pub(crate) fn default_ocr() -> OcrConfig {
    OcrConfig {
        language: default_language(),
        jobs: default_jobs(),
        optimize: 0,
        tesseract_timeout_secs: default_tesseract_timeout(),
        run_timeout_secs: default_run_timeout(),
        tesseract_oem: default_tesseract_oem(),
        tesseract_psm: default_tesseract_psm(),
        only_ocr_if_needed: true,
        min_chars_per_page: default_min_chars(),
        force_ocr: false,
        rotate_pages: false,
        keep_searchable_pdf: true,
    }
}

pub(crate) fn default_language() -> String {
    "eng".to_string()
}

pub(crate) fn default_jobs() -> u32 {
    1
}

pub(crate) fn default_tesseract_timeout() -> u64 {
    120
}

pub(crate) fn default_run_timeout() -> u64 {
    600
}

pub(crate) fn default_tesseract_oem() -> Option<u8> {
    Some(1)
}

pub(crate) fn default_tesseract_psm() -> Option<u8> {
    Some(6)
}

pub(crate) fn default_min_chars() -> u32 {
    8
}

pub(crate) fn default_true() -> bool {
    true
}

pub(crate) fn default_limits() -> LimitsConfig {
    LimitsConfig {
        max_upload_bytes: default_max_upload_bytes(),
    }
}

pub(crate) fn default_max_upload_bytes() -> usize {
    50 * 1024 * 1024
}

pub(crate) fn default_cache() -> CacheConfig {
    CacheConfig {
        dir: default_cache_dir(),
        ttl_secs: default_cache_ttl(),
        sweep_interval_secs: default_sweep_interval(),
    }
}

pub(crate) fn default_cache_dir() -> PathBuf {
    PathBuf::from("./cache")
}

pub(crate) fn default_cache_ttl() -> u64 {
    3600
}

pub(crate) fn default_sweep_interval() -> u64 {
    300
}
