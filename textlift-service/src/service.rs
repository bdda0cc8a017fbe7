//! Request-processing pipeline: preflight, OCR, extraction, staging.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use crate::cache::DownloadCache;
use crate::config::StaticConfig;
use crate::error::ServiceResult;
use crate::ocr::{self, OcrOptions};
use crate::pdftools::{CommandLineToolkit, PdfToolkit};
use crate::preflight;

/// Outcome of one processed upload.
#[derive(Debug)]
pub struct ProcessOutcome {
    /// Extracted text, possibly empty.
    pub text: String,
    /// True when the preflight scan found the document already searchable
    /// and the OCR pipeline was bypassed.
    pub skipped_ocr: bool,
    /// Download token for the staged searchable PDF, when staging is on.
    pub download_token: Option<String>,
}

/// Main service coordinator
pub struct OcrService {
    pub config: StaticConfig,
    pub cache: DownloadCache,
    toolkit: Arc<dyn PdfToolkit>,
}

impl OcrService {
    pub fn new(config: StaticConfig) -> ServiceResult<Self> {
        let cache = DownloadCache::new(config.cache.dir.clone(), config.cache.ttl())?;
        Ok(Self {
            config,
            cache,
            toolkit: Arc::new(CommandLineToolkit),
        })
    }

    #[cfg(test)]
    pub(crate) fn with_toolkit(
        config: StaticConfig,
        toolkit: Arc<dyn PdfToolkit>,
    ) -> ServiceResult<Self> {
        let cache = DownloadCache::new(config.cache.dir.clone(), config.cache.ttl())?;
        Ok(Self {
            config,
            cache,
            toolkit,
        })
    }

    /// Run one uploaded document through the full pipeline.
    ///
    /// The scoped working directory lives exactly as long as this call;
    /// dropping the `TempDir` removes it on every exit path. The staged
    /// copy for download is taken before the drop.
    pub async fn process(&self, pdf_bytes: &[u8], opts: &OcrOptions) -> ServiceResult<ProcessOutcome> {
        let work = tempfile::Builder::new().prefix("ocr_").tempdir()?;
        let input = work.path().join("in.pdf");
        let output = work.path().join("out.pdf");
        let sidecar = work.path().join("text.txt");

        tokio::fs::write(&input, pdf_bytes).await?;
        debug!(bytes = pdf_bytes.len(), "Wrote upload to working directory");

        let skipped_ocr = self.try_skip_ocr(opts, &input, &output).await?;
        if !skipped_ocr {
            ocr::run(&self.config.ocr, opts, &input, &output, &sidecar).await?;
        }

        let text = ocr::extract_text(self.toolkit.as_ref(), &output, &sidecar).await;

        let download_token = if opts.keep_searchable_pdf {
            Some(self.cache.store(&output)?)
        } else {
            None
        };

        info!(
            skipped_ocr,
            text_chars = text.chars().count(),
            staged = download_token.is_some(),
            "Request processed"
        );

        Ok(ProcessOutcome {
            text,
            skipped_ocr,
            download_token,
        })
    }

    /// Preflight: when enabled and the document is already fully
    /// searchable, duplicate the input verbatim to the output location and
    /// bypass the orchestrator entirely.
    async fn try_skip_ocr(
        &self,
        opts: &OcrOptions,
        input: &Path,
        output: &Path,
    ) -> ServiceResult<bool> {
        if opts.force_ocr || !opts.only_ocr_if_needed {
            return Ok(false);
        }

        if preflight::needs_ocr(self.toolkit.as_ref(), input, opts.min_chars_per_page).await {
            return Ok(false);
        }

        tokio::fs::copy(input, output).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        AuthConfig, CacheConfig, StaticConfig, default_limits, default_ocr, default_server,
    };
    use crate::error::ServiceError;
    use crate::pdftools::{FakeToolkit, PageCount};

    fn test_config(cache_dir: &Path) -> StaticConfig {
        StaticConfig {
            server: default_server(),
            auth: AuthConfig {
                token: "secret".to_string(),
            },
            ocr: default_ocr(),
            limits: default_limits(),
            cache: CacheConfig {
                dir: cache_dir.to_path_buf(),
                ttl_secs: 3600,
                sweep_interval_secs: 300,
            },
        }
    }

    fn options() -> OcrOptions {
        OcrOptions {
            language: "eng".to_string(),
            pages: None,
            tesseract_oem: Some(1),
            tesseract_psm: Some(6),
            only_ocr_if_needed: true,
            min_chars_per_page: 8,
            force_ocr: false,
            rotate_pages: false,
            keep_searchable_pdf: true,
        }
    }

    #[tokio::test]
    async fn test_searchable_document_skips_ocr_and_stages_identical_copy() {
        let cache_dir = tempfile::tempdir().unwrap();

        // One page with a healthy text layer: preflight says no OCR needed.
        let mut toolkit = FakeToolkit::new(
            PageCount::Known(1),
            vec![Some("This page carries fifty characters of real text...".to_string())],
        );
        toolkit.document_text = Some("This page carries fifty characters of real text...".to_string());

        let service =
            OcrService::with_toolkit(test_config(cache_dir.path()), Arc::new(toolkit)).unwrap();

        let upload = b"%PDF-1.4 pretend upload bytes";
        let outcome = service.process(upload, &options()).await.unwrap();

        assert!(outcome.skipped_ocr);
        assert_eq!(
            outcome.text,
            "This page carries fifty characters of real text..."
        );

        // The staged download is byte-identical to the input.
        let token = outcome.download_token.unwrap();
        let staged = service.cache.resolve(&token).unwrap();
        assert_eq!(std::fs::read(&staged).unwrap(), upload);
    }

    #[tokio::test]
    async fn test_keep_pdf_disabled_stages_nothing() {
        let cache_dir = tempfile::tempdir().unwrap();

        let mut toolkit = FakeToolkit::new(
            PageCount::Known(1),
            vec![Some("Plenty of text on this page already.".to_string())],
        );
        toolkit.document_text = Some("Plenty of text on this page already.".to_string());

        let service =
            OcrService::with_toolkit(test_config(cache_dir.path()), Arc::new(toolkit)).unwrap();

        let mut opts = options();
        opts.keep_searchable_pdf = false;
        let outcome = service.process(b"%PDF-1.4", &opts).await.unwrap();

        assert!(outcome.download_token.is_none());
        assert!(service.cache.is_empty());
    }

    #[tokio::test]
    async fn test_force_ocr_failure_surfaces_as_external_tool_error() {
        let cache_dir = tempfile::tempdir().unwrap();
        let toolkit = FakeToolkit::new(PageCount::Known(1), vec![]);
        let service =
            OcrService::with_toolkit(test_config(cache_dir.path()), Arc::new(toolkit)).unwrap();

        let mut opts = options();
        opts.force_ocr = true;

        // Garbage input: whether ocrmypdf is installed (rejects it) or not
        // (spawn fails), the run surfaces as an ExternalTool failure.
        let err = service.process(b"not a pdf", &opts).await.unwrap_err();
        assert!(matches!(err, ServiceError::ExternalTool { tool, .. } if tool == "ocrmypdf"));
        assert!(service.cache.is_empty());
    }
}
