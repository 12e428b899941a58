//! Embedded pages and the response builders that serve them.

use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::time::Duration;

use crate::config::ServerConfig;

/// Value of the `Server` header and the `${VERSION}` placeholder.
pub const SERVER_SOFTWARE: &str = concat!("SmsGateway/", env!("CARGO_PKG_VERSION"));

const PAGE_TEMPLATE: &str = include_str!("templates/page.html");
const FORM_TEMPLATE: &str = include_str!("templates/sms_sender.html");
const STYLESHEET: &str = include_str!("templates/sms_sender.css");

const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn http_date(at: DateTime<Utc>) -> String {
    at.format(HTTP_DATE_FORMAT).to_string()
}

/// Quoted SHA-256 of the served bytes.
pub fn etag(body: &str) -> String {
    format!("\"{:x}\"", Sha256::digest(body.as_bytes()))
}

/// Status page with the escaped title and message.
pub fn render_page(config: &ServerConfig, title: &str, message: &str) -> String {
    PAGE_TEMPLATE
        .replace("${TITLE}", &escape_html(title))
        .replace("${MESSAGE}", &escape_html(message))
        .replace("${STYLESHEET}", &config.stylesheet_path)
        .replace("${FORM}", &config.form_path)
        .replace("${VERSION}", SERVER_SOFTWARE)
        .replace('\t', "")
}

/// Submission form pointing back at `server` (the request's `Host`).
pub fn render_form(config: &ServerConfig, server: &str) -> String {
    FORM_TEMPLATE
        .replace("${SERVER}", server)
        .replace("${STYLESHEET}", &config.stylesheet_path)
        .replace("${SUBMIT}", &config.submit_path)
        .replace("${VERSION}", SERVER_SOFTWARE)
        .replace('\t', "")
}

pub fn render_stylesheet() -> String {
    STYLESHEET.replace('\t', "")
}

pub fn status_page(config: &ServerConfig, status: StatusCode, title: &str, message: &str) -> Response {
    let body = render_page(config, title, message);
    (
        status,
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        body,
    )
        .into_response()
}

pub fn redirect(status: StatusCode, location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => (status, [(header::LOCATION, value)]).into_response(),
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

/// A cacheable static asset: the form or the stylesheet.
pub struct Asset {
    pub body: String,
    pub content_type: &'static str,
    pub etag: String,
    pub last_modified: String,
}

impl Asset {
    pub fn new(body: String, content_type: &'static str, modified: DateTime<Utc>) -> Self {
        Self {
            etag: etag(&body),
            last_modified: http_date(modified),
            body,
            content_type,
        }
    }

    /// The client already holds this version.
    pub fn is_fresh(&self, request: &HeaderMap) -> bool {
        let matches = |name: header::HeaderName, expected: &str| {
            request
                .get(name)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| v.trim() == expected)
        };
        matches(header::IF_NONE_MATCH, &self.etag)
            || matches(header::IF_MODIFIED_SINCE, &self.last_modified)
    }

    /// 304 when fresh, otherwise 200 with the caching headers.
    pub fn respond(self, request: &HeaderMap, max_age: Duration) -> Response {
        let cache_control = format!("max-age={}", max_age.as_secs());
        if self.is_fresh(request) {
            return (
                StatusCode::NOT_MODIFIED,
                [
                    (header::ETAG, self.etag),
                    (header::CACHE_CONTROL, cache_control),
                ],
            )
                .into_response();
        }
        let expires = chrono::Duration::from_std(max_age)
            .ok()
            .and_then(|age| Utc::now().checked_add_signed(age))
            .unwrap_or_else(Utc::now);
        (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, self.content_type.to_string()),
                (header::ETAG, self.etag),
                (header::LAST_MODIFIED, self.last_modified),
                (header::EXPIRES, http_date(expires)),
                (header::CACHE_CONTROL, cache_control),
            ],
            self.body,
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn page_escapes_title_and_message() {
        let html = render_page(&ServerConfig::default(), "<b>", "a & \"b\"");
        assert!(html.contains("<title>&lt;b&gt;</title>"));
        assert!(html.contains("a &amp; &quot;b&quot;"));
        assert!(html.contains(SERVER_SOFTWARE));
        assert!(!html.contains('\t'));
    }

    #[test]
    fn form_points_at_request_host() {
        let html = render_form(&ServerConfig::default(), "gateway.local:8080");
        assert!(html.contains("action=\"http://gateway.local:8080/send_message\""));
        assert!(!html.contains("${"));
    }

    #[test]
    fn http_date_is_rfc_1123() {
        let at = Utc.with_ymd_and_hms(2010, 1, 18, 17, 10, 2).unwrap();
        assert_eq!(http_date(at), "Mon, 18 Jan 2010 17:10:02 GMT");
    }

    #[test]
    fn fresh_by_etag_or_date() {
        let asset = Asset::new("body".into(), "text/css", Utc::now());
        let mut headers = HeaderMap::new();
        assert!(!asset.is_fresh(&headers));
        headers.insert(header::IF_NONE_MATCH, HeaderValue::from_str(&asset.etag).unwrap());
        assert!(asset.is_fresh(&headers));

        let mut headers = HeaderMap::new();
        headers.insert(
            header::IF_MODIFIED_SINCE,
            HeaderValue::from_str(&asset.last_modified).unwrap(),
        );
        assert!(asset.is_fresh(&headers));
    }
}
