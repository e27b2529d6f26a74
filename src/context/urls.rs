//! Canonical URL and return-to heuristics.

use crate::http::Request;
use url::{Url, form_urlencoded};

/// Paths where sending the user back after auth would loop.
const AUTH_PATHS: &[&str] = &["/login", "/join", "/signup", "/logout", "/forgot-password"];

/// Query keys that only carry tracking information.
fn is_tracking_param(key: &str) -> bool {
    key.starts_with("utm_") || matches!(key, "_event" | "_source")
}

/// Re-encode `query` without tracking parameters; `None` if nothing is left.
fn strip_tracking(query: &str) -> Option<String> {
    let kept: Vec<(String, String)> = form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .filter(|(k, _)| !is_tracking_param(k))
        .collect();
    if kept.is_empty() {
        return None;
    }
    Some(
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(kept)
            .finish(),
    )
}

/// Canonical form of `current`: tracking parameters and fragment removed.
pub fn canonical_url(current: &Url) -> Url {
    let mut url = current.clone();
    url.set_fragment(None);
    let query = url.query().and_then(strip_tracking);
    url.set_query(query.as_deref());
    url
}

/// Where to send the user after login/signup started from this request.
pub fn return_to(req: &Request) -> String {
    let path = req.path();
    let path = if path.is_empty() { "/" } else { path };
    if AUTH_PATHS.contains(&path.trim_end_matches('/')) {
        return "/".to_owned();
    }

    match req.raw_query().and_then(strip_tracking) {
        Some(query) => format!("{path}?{query}"),
        None => path.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_strips_tracking_and_fragment() {
        let url = Url::parse("https://example.com/repo/x?utm_source=tw&tab=files&_event=1#L10").unwrap();
        assert_eq!(canonical_url(&url).as_str(), "https://example.com/repo/x?tab=files");
    }

    #[test]
    fn test_canonical_drops_empty_query() {
        let url = Url::parse("https://example.com/?utm_campaign=x").unwrap();
        assert_eq!(canonical_url(&url).as_str(), "https://example.com/");
    }

    #[test]
    fn test_canonical_keeps_clean_url() {
        let url = Url::parse("https://example.com/a/b?q=1").unwrap();
        assert_eq!(canonical_url(&url), url);
    }

    #[test]
    fn test_return_to_auth_pages() {
        for path in ["/login", "/join?x=1", "/signup/", "/logout", "/forgot-password"] {
            assert_eq!(return_to(&Request::get(path)), "/", "{path}");
        }
    }

    #[test]
    fn test_return_to_strips_tracking() {
        let req = Request::get("/repo/x?utm_medium=email&tab=files");
        assert_eq!(return_to(&req), "/repo/x?tab=files");

        let req = Request::get("/repo/x?utm_medium=email");
        assert_eq!(return_to(&req), "/repo/x");
    }

    #[test]
    fn test_return_to_plain() {
        assert_eq!(return_to(&Request::get("/")), "/");
        assert_eq!(return_to(&Request::get("")), "/");
        assert_eq!(return_to(&Request::get("/a?b=c")), "/a?b=c");
    }
}
