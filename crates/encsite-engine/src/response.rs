//! Responses the engine synthesizes
//!
//! Error bodies are JSON so a page script can tell an engine refusal from a
//! host error page.

use bytes::Bytes;
use http::header::{CACHE_CONTROL, CONTENT_TYPE, LOCATION};
use http::{HeaderValue, Response, StatusCode};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
    path: &'a str,
}

/// 200 with decrypted, injected markup
pub fn markup(html: String, cache_control: &HeaderValue) -> Response<Bytes> {
    ok(
        Bytes::from(html),
        HeaderValue::from_static("text/html; charset=utf-8"),
        cache_control,
    )
}

/// 200 with decrypted bytes of any other content type
pub fn asset(body: Vec<u8>, mime: &'static str, cache_control: &HeaderValue) -> Response<Bytes> {
    ok(Bytes::from(body), HeaderValue::from_static(mime), cache_control)
}

pub fn not_found(path: &str) -> Response<Bytes> {
    error(
        StatusCode::NOT_FOUND,
        "not_found",
        format!("File not found: {path}"),
        path,
    )
}

pub fn forbidden(path: &str) -> Response<Bytes> {
    error(
        StatusCode::FORBIDDEN,
        "forbidden",
        format!("Decryption failed: {path}"),
        path,
    )
}

/// 302 to an already validated location
pub fn redirect(location: &HeaderValue) -> Response<Bytes> {
    let mut resp = Response::new(Bytes::new());
    *resp.status_mut() = StatusCode::FOUND;
    resp.headers_mut().insert(LOCATION, location.clone());
    resp
}

fn ok(body: Bytes, content_type: HeaderValue, cache_control: &HeaderValue) -> Response<Bytes> {
    let mut resp = Response::new(body);
    resp.headers_mut().insert(CONTENT_TYPE, content_type);
    resp.headers_mut()
        .insert(CACHE_CONTROL, cache_control.clone());
    resp
}

fn error(status: StatusCode, kind: &str, message: String, path: &str) -> Response<Bytes> {
    let body = serde_json::to_vec(&ErrorBody {
        error: kind,
        message,
        path,
    })
    .unwrap_or_default();

    let mut resp = Response::new(Bytes::from(body));
    *resp.status_mut() = status;
    resp.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    resp
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markup_headers() {
        let cache = HeaderValue::from_static("public, max-age=3600");
        let resp = markup("<html></html>".into(), &cache);
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[CONTENT_TYPE], "text/html; charset=utf-8");
        assert_eq!(resp.headers()[CACHE_CONTROL], "public, max-age=3600");
        assert_eq!(resp.body().as_ref(), b"<html></html>");
    }

    #[test]
    fn error_bodies_are_json() {
        let resp = not_found("/missing.css");
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(body["error"], "not_found");
        assert_eq!(body["path"], "/missing.css");

        let resp = forbidden("/a.png");
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        let body: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(body["error"], "forbidden");
        assert!(resp.headers().get(CACHE_CONTROL).is_none());
    }

    #[test]
    fn redirect_has_location() {
        let loc = HeaderValue::from_static("https://site.example/index.html");
        let resp = redirect(&loc);
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(resp.headers()[LOCATION], "https://site.example/index.html");
        assert!(resp.body().is_empty());
    }
}
