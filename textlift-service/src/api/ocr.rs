//! Upload endpoint: accept a PDF, decide on OCR, return extracted text.

use axum::{
    Json,
    extract::{Multipart, Query, State},
    http::HeaderMap,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::{AuthConfig, OcrConfig};
use crate::error::{ServiceError, ServiceResult};
use crate::ocr::OcrOptions;

use super::AppState;

/// Query parameters for `POST /ocr`. Unset values fall back to the
/// configured defaults.
#[derive(Debug, Default, Deserialize)]
pub struct OcrParams {
    /// tesseract language(s), e.g. "eng" or "eng+spa".
    pub lang: Option<String>,
    /// e.g. "1-2" or "1,3,5".
    pub pages: Option<String>,
    /// Tesseract OCR Engine Mode (0-3).
    pub tesseract_oem: Option<u8>,
    /// Tesseract Page Segmentation Mode (0-13).
    pub tesseract_psm: Option<u8>,
    /// Skip OCR entirely if every page already has text.
    pub only_ocr_if_needed: Option<bool>,
    /// Threshold to decide a page has text (0-200).
    pub min_chars_per_page: Option<u32>,
    pub force_ocr: Option<bool>,
    pub rotate_pages: Option<bool>,
    /// Stage the processed PDF for `GET /download/{token}`.
    pub keep_pdf: Option<bool>,
}

impl OcrParams {
    /// Resolve query overrides against configured defaults, validating the
    /// bounded knobs.
    fn into_options(self, defaults: &OcrConfig) -> ServiceResult<OcrOptions> {
        if let Some(oem) = self.tesseract_oem
            && oem > 3
        {
            return Err(ServiceError::invalid(format!(
                "tesseract_oem must be 0-3, got {oem}"
            )));
        }
        if let Some(psm) = self.tesseract_psm
            && psm > 13
        {
            return Err(ServiceError::invalid(format!(
                "tesseract_psm must be 0-13, got {psm}"
            )));
        }
        if let Some(min_chars) = self.min_chars_per_page
            && min_chars > 200
        {
            return Err(ServiceError::invalid(format!(
                "min_chars_per_page must be 0-200, got {min_chars}"
            )));
        }

        Ok(OcrOptions {
            language: self.lang.unwrap_or_else(|| defaults.language.clone()),
            pages: self.pages,
            tesseract_oem: self.tesseract_oem.or(defaults.tesseract_oem),
            tesseract_psm: self.tesseract_psm.or(defaults.tesseract_psm),
            only_ocr_if_needed: self
                .only_ocr_if_needed
                .unwrap_or(defaults.only_ocr_if_needed),
            min_chars_per_page: self
                .min_chars_per_page
                .unwrap_or(defaults.min_chars_per_page),
            force_ocr: self.force_ocr.unwrap_or(defaults.force_ocr),
            rotate_pages: self.rotate_pages.unwrap_or(defaults.rotate_pages),
            keep_searchable_pdf: self.keep_pdf.unwrap_or(defaults.keep_searchable_pdf),
        })
    }
}

/// Response for a processed upload
#[derive(Serialize)]
pub struct OcrResponse {
    pub ok: bool,
    pub pages: String,
    pub lang: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub searchable_pdf: Option<String>,
}

/// Process an uploaded PDF
pub async fn ocr_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<OcrParams>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<OcrResponse>, ServiceError> {
    // Reject before touching the body: an unauthorized request performs no
    // file writes and launches no external processes.
    authorize(&headers, &state.service.config.auth)?;

    let opts = params.into_options(&state.service.config.ocr)?;

    let mut file_data: Option<Vec<u8>> = None;
    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or("").to_string();
        if name == "file" {
            let data = field
                .bytes()
                .await
                .map_err(|e| ServiceError::invalid(e.to_string()))?;
            file_data = Some(data.to_vec());
        }
    }

    let data = file_data.ok_or_else(|| ServiceError::invalid("no file provided"))?;

    let outcome = state.service.process(&data, &opts).await?;

    Ok(Json(OcrResponse {
        ok: true,
        pages: opts.pages_echo(),
        lang: opts.language.clone(),
        text: outcome.text,
        searchable_pdf: outcome
            .download_token
            .map(|token| format!("/download/{token}")),
    }))
}

/// Compare the `x-app-token` header against the configured secret.
fn authorize(headers: &HeaderMap, auth: &AuthConfig) -> ServiceResult<()> {
    let provided = headers
        .get("x-app-token")
        .and_then(|value| value.to_str().ok());

    if provided != Some(auth.token.as_str()) {
        return Err(ServiceError::Unauthorized);
    }
    Ok(())
}
