//! Construction and execution of the external OCR pipeline.
//!
//! The heavy lifting belongs to `ocrmypdf`; this module only assembles its
//! argument list, runs it under a watchdog, and pulls the recognized text
//! back out of the result.

use std::ffi::OsString;
use std::path::Path;

use tokio::process::Command;
use tracing::{info, warn};

use crate::config::OcrConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::pdftools::{PdfToolkit, run_tool};

/// Per-request OCR options, resolved from configured defaults plus any
/// query-parameter overrides. Immutable for the lifetime of one request.
#[derive(Debug, Clone)]
pub struct OcrOptions {
    /// tesseract language(s), e.g. "eng" or "eng+spa".
    pub language: String,
    /// Page range restriction, e.g. "1-2" or "1,3,5". `None` means all.
    pub pages: Option<String>,
    /// OCR engine mode (0-3).
    pub tesseract_oem: Option<u8>,
    /// Page segmentation mode (0-13).
    pub tesseract_psm: Option<u8>,
    /// Run the preflight scan and skip OCR when every page has text.
    pub only_ocr_if_needed: bool,
    /// Threshold for the preflight per-page text probe.
    pub min_chars_per_page: u32,
    /// Re-OCR pages even when they already have a text layer.
    pub force_ocr: bool,
    /// Let ocrmypdf auto-rotate pages.
    pub rotate_pages: bool,
    /// Stage the processed PDF for later download.
    pub keep_searchable_pdf: bool,
}

impl OcrOptions {
    /// Echo value for the response's `pages` field.
    pub fn pages_echo(&self) -> String {
        self.pages.clone().unwrap_or_else(|| "all".to_string())
    }
}

/// Assemble the ocrmypdf argument list.
///
/// Always a structured argument vector; user-controlled values like the
/// language and page spec never pass through a shell.
fn build_args(
    cfg: &OcrConfig,
    opts: &OcrOptions,
    input: &Path,
    output: &Path,
    sidecar: &Path,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "--optimize".into(),
        cfg.optimize.to_string().into(),
        "--language".into(),
        opts.language.clone().into(),
        "--jobs".into(),
        cfg.jobs.to_string().into(),
        "--tesseract-timeout".into(),
        cfg.tesseract_timeout_secs.to_string().into(),
        "--sidecar".into(),
        sidecar.as_os_str().to_os_string(),
    ];

    if let Some(oem) = opts.tesseract_oem {
        args.push("--tesseract-oem".into());
        args.push(oem.to_string().into());
    }
    if let Some(psm) = opts.tesseract_psm {
        args.push("--tesseract-pagesegmode".into());
        args.push(psm.to_string().into());
    }
    if let Some(pages) = &opts.pages {
        args.push("--pages".into());
        args.push(pages.clone().into());
    }

    if opts.force_ocr {
        args.push("--force-ocr".into());
    } else {
        // Leave pages that already carry a text layer alone instead of
        // aborting the whole run on them.
        args.push("--skip-text".into());
    }
    if opts.rotate_pages {
        args.push("--rotate-pages".into());
    }

    args.push(input.as_os_str().to_os_string());
    args.push(output.as_os_str().to_os_string());
    args
}

/// Run ocrmypdf over `input`, producing `output` and the sidecar text file.
///
/// The invocation is bounded by the configured watchdog timeout; expiry
/// kills the child and surfaces like any other tool failure. Failures are
/// never retried.
pub async fn run(
    cfg: &OcrConfig,
    opts: &OcrOptions,
    input: &Path,
    output: &Path,
    sidecar: &Path,
) -> ServiceResult<()> {
    let args = build_args(cfg, opts, input, output, sidecar);

    info!(
        lang = %opts.language,
        pages = %opts.pages_echo(),
        force = opts.force_ocr,
        "Running ocrmypdf"
    );

    let mut cmd = Command::new("ocrmypdf");
    cmd.args(&args).kill_on_drop(true);

    match tokio::time::timeout(cfg.run_timeout(), run_tool("ocrmypdf", &mut cmd)).await {
        Ok(result) => result.map(drop),
        Err(_) => {
            warn!(timeout_secs = cfg.run_timeout_secs, "ocrmypdf timed out");
            Err(ServiceError::external(
                "ocrmypdf",
                format!("timed out after {}s", cfg.run_timeout_secs),
            ))
        }
    }
}

/// Pull the final text for the response.
///
/// Extracting from the processed PDF captures both pre-existing and newly
/// recognized text in one pass; the OCR sidecar is the fallback when that
/// yields nothing. An empty result is not a failure.
pub async fn extract_text(toolkit: &dyn PdfToolkit, processed: &Path, sidecar: &Path) -> String {
    if let Some(text) = toolkit.document_text(processed).await
        && !text.trim().is_empty()
    {
        return text;
    }

    match tokio::fs::read(sidecar).await {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(_) => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_ocr;
    use crate::pdftools::{FakeToolkit, PageCount};

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

    fn args_for(opts: &OcrOptions) -> Vec<OsString> {
        build_args(
            &default_ocr(),
            opts,
            Path::new("/work/in.pdf"),
            Path::new("/work/out.pdf"),
            Path::new("/work/text.txt"),
        )
    }

    fn contains_pair(args: &[OsString], flag: &str, value: &str) -> bool {
        args.windows(2)
            .any(|pair| pair[0] == OsString::from(flag) && pair[1] == OsString::from(value))
    }

    #[test]
    fn test_default_args() {
        let args = args_for(&options());
        assert_eq!(args[0], OsString::from("--optimize"));
        assert_eq!(args[1], OsString::from("0"));
        assert!(contains_pair(&args, "--language", "eng"));
        assert!(contains_pair(&args, "--jobs", "1"));
        assert!(contains_pair(&args, "--tesseract-timeout", "120"));
        assert!(contains_pair(&args, "--sidecar", "/work/text.txt"));
        assert!(contains_pair(&args, "--tesseract-oem", "1"));
        assert!(contains_pair(&args, "--tesseract-pagesegmode", "6"));
        assert!(args.contains(&OsString::from("--skip-text")));
        assert!(!args.contains(&OsString::from("--force-ocr")));
        assert!(!args.contains(&OsString::from("--rotate-pages")));
        assert!(!args.contains(&OsString::from("--pages")));
        // Input then output, last.
        assert_eq!(args[args.len() - 2], OsString::from("/work/in.pdf"));
        assert_eq!(args[args.len() - 1], OsString::from("/work/out.pdf"));
    }

    #[test]
    fn test_force_ocr_replaces_skip_text() {
        let mut opts = options();
        opts.force_ocr = true;
        let args = args_for(&opts);
        assert!(args.contains(&OsString::from("--force-ocr")));
        assert!(!args.contains(&OsString::from("--skip-text")));
    }

    #[test]
    fn test_page_range_and_rotation() {
        let mut opts = options();
        opts.pages = Some("1-2".to_string());
        opts.rotate_pages = true;
        let args = args_for(&opts);
        assert!(contains_pair(&args, "--pages", "1-2"));
        assert!(args.contains(&OsString::from("--rotate-pages")));
    }

    #[test]
    fn test_unset_modes_omit_flags() {
        let mut opts = options();
        opts.tesseract_oem = None;
        opts.tesseract_psm = None;
        let args = args_for(&opts);
        assert!(!args.contains(&OsString::from("--tesseract-oem")));
        assert!(!args.contains(&OsString::from("--tesseract-pagesegmode")));
    }

    #[test]
    fn test_pages_echo() {
        assert_eq!(options().pages_echo(), "all");
        let mut opts = options();
        opts.pages = Some("1,3,5".to_string());
        assert_eq!(opts.pages_echo(), "1,3,5");
    }

    #[tokio::test]
    async fn test_extract_text_prefers_pdf_text_layer() {
        let work = tempfile::tempdir().unwrap();
        let sidecar = work.path().join("text.txt");
        std::fs::write(&sidecar, "sidecar text").unwrap();

        let mut toolkit = FakeToolkit::new(PageCount::Known(1), vec![]);
        toolkit.document_text = Some("text layer".to_string());

        let text = extract_text(&toolkit, Path::new("out.pdf"), &sidecar).await;
        assert_eq!(text, "text layer");
    }

    #[tokio::test]
    async fn test_extract_text_falls_back_to_sidecar() {
        let work = tempfile::tempdir().unwrap();
        let sidecar = work.path().join("text.txt");
        std::fs::write(&sidecar, "recognized by tesseract").unwrap();

        // Whitespace-only text layer does not count.
        let mut toolkit = FakeToolkit::new(PageCount::Known(1), vec![]);
        toolkit.document_text = Some("  \n ".to_string());

        let text = extract_text(&toolkit, Path::new("out.pdf"), &sidecar).await;
        assert_eq!(text, "recognized by tesseract");
    }

    #[tokio::test]
    async fn test_extract_text_empty_when_both_sources_missing() {
        let work = tempfile::tempdir().unwrap();
        let toolkit = FakeToolkit::new(PageCount::Known(1), vec![]);

        let text = extract_text(
            &toolkit,
            Path::new("out.pdf"),
            &work.path().join("missing.txt"),
        )
        .await;
        assert_eq!(text, "");
    }
}
