//! External collaborators consulted while building the common context.
//!
//! Each concern is a small trait so hosts can plug in their own session
//! store, CSRF issuer, user lookup, tracer and flag storage. The default
//! implementations here are enough for an anonymous, cookie-based host.

use crate::http::Request;
use parking_lot::RwLock;
use rand::Rng;
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

/// Cookie holding the session identifier.
pub const SESSION_COOKIE: &str = "session";

/// Cookie holding the CSRF token.
pub const CSRF_COOKIE: &str = "csrf_token";

const CSRF_TOKEN_LEN: usize = 32;

// ============================================================================
// Data
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub id: String,
    pub user_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub uid: u64,
    pub login: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailAddr {
    pub email: String,
    pub verified: bool,
    pub primary: bool,
}

// ============================================================================
// Sessions
// ============================================================================

#[derive(Debug, Error)]
pub enum SessionError {
    /// No session present. Callers treat this as an anonymous request.
    #[error("no session")]
    NoSession,

    #[error("session store: {0}")]
    Store(String),
}

pub trait SessionStore: Send + Sync {
    fn read_session(&self, req: &Request) -> Result<Session, SessionError>;
}

/// Sessions kept in process memory, keyed by the session cookie.
#[derive(Debug, Default)]
pub struct MemorySessions {
    sessions: RwLock<FxHashMap<String, Session>>,
}

impl MemorySessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session: Session) {
        self.sessions.write().insert(session.id.clone(), session);
    }

    pub fn remove(&self, id: &str) {
        self.sessions.write().remove(id);
    }
}

impl SessionStore for MemorySessions {
    fn read_session(&self, req: &Request) -> Result<Session, SessionError> {
        let id = req.cookie(SESSION_COOKIE).ok_or(SessionError::NoSession)?;
        self.sessions
            .read()
            .get(id)
            .cloned()
            .ok_or(SessionError::NoSession)
    }
}

// ============================================================================
// CSRF
// ============================================================================

pub trait CsrfIssuer: Send + Sync {
    fn token(&self, req: &Request) -> String;
}

/// Double-submit cookie tokens: reuse the request's cookie, else mint one.
///
/// A minted token only round-trips if the host also sends it back as the
/// [`CSRF_COOKIE`] cookie; the bundled server does this in `Site::handle`.
#[derive(Debug, Default, Clone, Copy)]
pub struct CookieCsrf;

impl CsrfIssuer for CookieCsrf {
    fn token(&self, req: &Request) -> String {
        match req.cookie(CSRF_COOKIE) {
            Some(token) if !token.is_empty() => token.to_owned(),
            _ => new_csrf_token(),
        }
    }
}

// ============================================================================
// Users
// ============================================================================

pub trait UserResolver: Send + Sync {
    /// Authenticated user for this request, if any.
    fn current_user(&self, req: &Request) -> Option<User>;

    /// Email addresses of `user`.
    fn emails(&self, _user: &User) -> Vec<EmailAddr> {
        Vec::new()
    }
}

/// Every request is anonymous.
#[derive(Debug, Default, Clone, Copy)]
pub struct Anonymous;

impl UserResolver for Anonymous {
    fn current_user(&self, _req: &Request) -> Option<User> {
        None
    }
}

// ============================================================================
// Tracing
// ============================================================================

pub trait SpanExtractor: Send + Sync {
    fn span_id(&self, req: &Request) -> Option<String>;
}

/// Reads the parent-id of a W3C `traceparent` header
/// (`version-traceid-parentid-flags`).
#[derive(Debug, Default, Clone, Copy)]
pub struct Traceparent;

impl SpanExtractor for Traceparent {
    fn span_id(&self, req: &Request) -> Option<String> {
        let header = req.headers.get("traceparent")?;
        let mut parts = header.trim().split('-');
        let (_version, trace, span, _flags) = (parts.next()?, parts.next()?, parts.next()?, parts.next()?);

        let is_hex = |s: &str| s.bytes().all(|b| b.is_ascii_hexdigit());
        let valid = trace.len() == 32 && span.len() == 16 && is_hex(trace) && is_hex(span);
        (valid && span.bytes().any(|b| b != b'0')).then(|| span.to_ascii_lowercase())
    }
}

// ============================================================================
// Feature flags
// ============================================================================

pub trait FeatureFlags: Send + Sync {
    fn snapshot(&self) -> BTreeMap<String, bool>;
}

impl FeatureFlags for BTreeMap<String, bool> {
    fn snapshot(&self) -> BTreeMap<String, bool> {
        self.clone()
    }
}

/// Fresh random CSRF token.
pub fn new_csrf_token() -> String {
    random_string(CSRF_TOKEN_LEN)
}

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Fixed-length alphanumeric string from the thread RNG.
pub(crate) fn random_string(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| char::from(ALPHABET[rng.gen_range(0..ALPHABET.len())]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sessions() {
        let store = MemorySessions::new();
        store.insert(Session {
            id: "abc".into(),
            user_id: Some(7),
        });

        let req = Request::get("/").with_header("Cookie", "session=abc");
        assert_eq!(store.read_session(&req).unwrap().user_id, Some(7));

        let unknown = Request::get("/").with_header("Cookie", "session=zzz");
        assert!(matches!(store.read_session(&unknown), Err(SessionError::NoSession)));

        let none = Request::get("/");
        assert!(matches!(store.read_session(&none), Err(SessionError::NoSession)));

        store.remove("abc");
        assert!(matches!(store.read_session(&req), Err(SessionError::NoSession)));
    }

    #[test]
    fn test_cookie_csrf_reuses_cookie() {
        let req = Request::get("/").with_header("Cookie", "csrf_token=tok123");
        assert_eq!(CookieCsrf.token(&req), "tok123");
    }

    #[test]
    fn test_cookie_csrf_mints_token() {
        let req = Request::get("/");
        let a = CookieCsrf.token(&req);
        let b = CookieCsrf.token(&req);
        assert_eq!(a.len(), CSRF_TOKEN_LEN);
        assert_ne!(a, b);
    }

    #[test]
    fn test_traceparent() {
        let req = Request::get("/").with_header(
            "traceparent",
            "00-4bf92f3577b34da6a3ce929d0e0e4736-00F067AA0BA902B7-01",
        );
        assert_eq!(Traceparent.span_id(&req).as_deref(), Some("00f067aa0ba902b7"));
    }

    #[test]
    fn test_traceparent_invalid() {
        for value in [
            "garbage",
            "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa-01",
            "00-4bf92f3577b34da6a3ce929d0e0e4736-0000000000000000-01",
            "00-zzf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01",
        ] {
            let req = Request::get("/").with_header("traceparent", value);
            assert_eq!(Traceparent.span_id(&req), None, "{value}");
        }
        assert_eq!(Traceparent.span_id(&Request::get("/")), None);
    }

    #[test]
    fn test_random_string() {
        let s = random_string(6);
        assert_eq!(s.len(), 6);
        assert!(s.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
