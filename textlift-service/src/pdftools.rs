//! Wrappers around the external PDF introspection and extraction tools.
//!
//! Everything here shells out to `qpdf`, `pdfinfo`, and `pdftotext` with
//! structured argument lists. The tools are reached through the
//! [`PdfToolkit`] trait so callers can be exercised without the binaries
//! installed.

use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::{ServiceError, ServiceResult};

/// Outcome of page-count detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageCount {
    Known(u32),
    /// Neither detection tool produced a positive count.
    Unknown,
}

/// External PDF tooling consumed through its command-line interface.
#[async_trait]
pub trait PdfToolkit: Send + Sync {
    /// Total pages, when either introspection tool can report it.
    async fn page_count(&self, pdf: &Path) -> PageCount;

    /// Text layer of a single 1-based page. `None` when the probe fails.
    async fn page_text(&self, pdf: &Path, page: u32) -> Option<String>;

    /// Text layer of the whole document. `None` when extraction fails.
    async fn document_text(&self, pdf: &Path) -> Option<String>;
}

/// Run an external tool and return its stdout.
///
/// A non-zero exit becomes an [`ServiceError::ExternalTool`] carrying the
/// combined stdout and stderr as diagnostic detail.
pub(crate) async fn run_tool(tool: &'static str, cmd: &mut Command) -> ServiceResult<String> {
    debug!(tool, "Running external tool");

    let output = cmd
        .output()
        .await
        .map_err(|e| ServiceError::external(tool, format!("failed to launch: {e}")))?;

    if !output.status.success() {
        let mut detail = String::from_utf8_lossy(&output.stdout).into_owned();
        detail.push_str(&String::from_utf8_lossy(&output.stderr));
        return Err(ServiceError::external(tool, detail));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// The real toolkit: `qpdf` and `pdfinfo` for page counts, `pdftotext` for
/// text layers.
pub struct CommandLineToolkit;

#[async_trait]
impl PdfToolkit for CommandLineToolkit {
    async fn page_count(&self, pdf: &Path) -> PageCount {
        // Primary: qpdf prints the bare page count.
        let mut qpdf = Command::new("qpdf");
        qpdf.arg("--show-npages").arg(pdf);
        if let Ok(out) = run_tool("qpdf", &mut qpdf).await
            && let Ok(n) = out.trim().parse::<u32>()
            && n > 0
        {
            return PageCount::Known(n);
        }

        // Fallback: the "Pages:" line of pdfinfo.
        let mut pdfinfo = Command::new("pdfinfo");
        pdfinfo.arg(pdf);
        if let Ok(out) = run_tool("pdfinfo", &mut pdfinfo).await
            && let Some(n) = parse_pdfinfo_pages(&out)
            && n > 0
        {
            return PageCount::Known(n);
        }

        PageCount::Unknown
    }

    async fn page_text(&self, pdf: &Path, page: u32) -> Option<String> {
        let page = page.to_string();
        let mut cmd = Command::new("pdftotext");
        cmd.args(["-layout", "-nopgbrk", "-f", &page, "-l", &page])
            .arg(pdf)
            .arg("-");
        run_tool("pdftotext", &mut cmd).await.ok()
    }

    async fn document_text(&self, pdf: &Path) -> Option<String> {
        let mut cmd = Command::new("pdftotext");
        cmd.args(["-layout", "-nopgbrk"]).arg(pdf).arg("-");
        run_tool("pdftotext", &mut cmd).await.ok()
    }
}

/// Parse the page count out of `pdfinfo` output.
fn parse_pdfinfo_pages(info: &str) -> Option<u32> {
    for line in info.lines() {
        if let Some((key, value)) = line.split_once(':')
            && key.trim().eq_ignore_ascii_case("pages")
        {
            return value.trim().parse().ok();
        }
    }
    None
}

/// Scripted toolkit for exercising the preflight analyzer and request
/// pipeline without poppler/qpdf installed.
#[cfg(test)]
pub(crate) struct FakeToolkit {
    pub page_count: PageCount,
    /// Probe results indexed by page - 1; `None` simulates a probe failure.
    pub pages: Vec<Option<String>>,
    pub document_text: Option<String>,
    /// Pages probed, in order.
    pub probed: std::sync::Mutex<Vec<u32>>,
}

#[cfg(test)]
impl FakeToolkit {
    pub fn new(page_count: PageCount, pages: Vec<Option<String>>) -> Self {
        Self {
            page_count,
            pages,
            document_text: None,
            probed: std::sync::Mutex::new(Vec::new()),
        }
    }
}

#[cfg(test)]
#[async_trait]
impl PdfToolkit for FakeToolkit {
    async fn page_count(&self, _pdf: &Path) -> PageCount {
        self.page_count
    }

    async fn page_text(&self, _pdf: &Path, page: u32) -> Option<String> {
        self.probed.lock().unwrap().push(page);
        self.pages.get(page as usize - 1).cloned().flatten()
    }

    async fn document_text(&self, _pdf: &Path) -> Option<String> {
        self.document_text.clone()
    }
}
