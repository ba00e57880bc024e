//! Common API utilities and shared types
//!
//! Pagination envelope, page links and request body helpers used by every
//! list endpoint.

use axum::extract::rejection::JsonRejection;
use axum::http::Uri;
use axum::Json;
use serde::{Deserialize, Deserializer, Serialize};

use crate::api::middleware::ApiError;
use crate::models::{ListParams, PagedResult};

// ============================================================================
// Pagination
// ============================================================================

/// Paginated list envelope
#[derive(Debug, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub count: i64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub page: u32,
    pub results: Vec<T>,
}

impl<T> Paginated<T> {
    /// Wrap a page, linking neighbours relative to the request URI
    pub fn from_page(page: PagedResult<T>, base: &str, uri: &Uri) -> Self {
        let next = page
            .has_next()
            .then(|| page_link(base, uri, page.page + 1));
        let previous = page
            .has_prev()
            .then(|| page_link(base, uri, page.page - 1));

        Self {
            count: page.total,
            next,
            previous,
            page: page.page,
            results: page.items,
        }
    }
}

/// Absolute URL of another page of the same listing
///
/// Page 1 is linked without a `page` parameter.
pub fn page_link(base: &str, uri: &Uri, page: u32) -> String {
    let mut params: Vec<String> = uri
        .query()
        .unwrap_or_default()
        .split('&')
        .filter(|p| !p.is_empty() && *p != "page" && !p.starts_with("page="))
        .map(String::from)
        .collect();
    if page > 1 {
        params.push(format!("page={}", page));
    }

    if params.is_empty() {
        format!("{}{}", base, uri.path())
    } else {
        format!("{}{}?{}", base, uri.path(), params.join("&"))
    }
}

/// Parse the `page` query parameter; anything but a positive integer is 404
pub fn parse_page(page: Option<&str>, page_size: u32) -> Result<ListParams, ApiError> {
    let page = match page {
        None | Some("") => 1,
        Some(raw) => match raw.parse::<u32>() {
            Ok(n) if n >= 1 => n,
            _ => return Err(ApiError::not_found("Invalid page.")),
        },
    };
    Ok(ListParams::new(page, page_size))
}

/// Query string carrying only a page number
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
}

// ============================================================================
// Request bodies
// ============================================================================

/// Unwrap a JSON body, turning extractor rejections into validation errors
pub fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(value)| value)
        .map_err(|rejection| ApiError::validation_error(rejection.body_text()))
}

/// Distinguish an absent field (`None`) from an explicit `null` (`Some(None)`)
pub fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
