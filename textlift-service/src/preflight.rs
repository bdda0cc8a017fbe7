//! Decides whether an uploaded PDF actually needs OCR.
//!
//! Uncertainty always biases toward running OCR: an unknown page count or
//! a failed probe must never produce a false "already searchable" verdict.

use std::path::Path;

use tracing::{debug, info};

use crate::pdftools::{PageCount, PdfToolkit};

/// Report whether any page of `pdf` falls below the text-presence threshold.
///
/// Pages are probed in order and the first page with insufficient text
/// short-circuits the scan; the verdict is equivalent to requiring every
/// page to pass.
pub async fn needs_ocr(toolkit: &dyn PdfToolkit, pdf: &Path, min_chars_per_page: u32) -> bool {
    let total = match toolkit.page_count(pdf).await {
        PageCount::Known(n) => n,
        PageCount::Unknown => {
            info!("Page count unavailable, assuming OCR is needed");
            return true;
        }
    };

    for page in 1..=total {
        // A failed probe counts as a textless page, not a request failure.
        let chars = match toolkit.page_text(pdf, page).await {
            Some(text) => text.trim().chars().count(),
            None => 0,
        };

        if chars < min_chars_per_page as usize {
            debug!(page, chars, "Page below text threshold, OCR needed");
            return true;
        }
    }

    info!(pages = total, "Every page already carries text, skipping OCR");
    false
}
