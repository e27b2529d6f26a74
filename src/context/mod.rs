//! Per-request common context injected into every rendered page.
//!
//! [`ContextBuilder::build`] composes the request with the collaborators in
//! [`collab`] and returns a fresh [`CommonContext`]. Only one value is carried
//! over from whatever the caller placed on the page beforehand: the
//! `hide_motd` display flag (plus a caller-supplied canonical URL, which is
//! used instead of the derived one).

pub mod collab;
mod urls;

pub use collab::{
    Anonymous, CookieCsrf, CsrfIssuer, EmailAddr, FeatureFlags, MemorySessions, Session,
    SessionError, SessionStore, SpanExtractor, Traceparent, User, UserResolver, CSRF_COOKIE,
    new_csrf_token,
};
pub use urls::{canonical_url, return_to};

use crate::http::Request;
use serde::Serialize;
use std::{collections::BTreeMap, sync::Arc};
use url::Url;

/// Length of the error correlation ID.
pub const ERROR_ID_LEN: usize = 6;

/// Fields available at the top level of every page rendered by the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CommonContext {
    /// The request's `Host` header.
    pub request_host: String,

    pub session: Option<Session>,
    pub csrf_token: String,

    pub current_user: Option<User>,
    pub user_emails: Vec<EmailAddr>,

    pub current_route: String,
    pub current_route_vars: BTreeMap<String, String>,
    pub current_uri: String,
    pub current_url: Option<Url>,
    pub current_query: BTreeMap<String, Vec<String>>,
    pub current_span_id: Option<String>,

    /// Name of the template being rendered (e.g. `repo/main.html`).
    pub template_name: String,

    pub app_url: Option<Url>,
    pub canonical_url: Option<Url>,
    pub host_name: String,

    /// Show debugging info on the rendered page.
    pub debug: bool,

    /// Page to return to after a login or signup started here.
    pub return_to: String,

    /// Hide links to external sites (issue tracker, homepage).
    pub disable_external_links: bool,

    pub features: BTreeMap<String, bool>,

    /// Correlates this error page with its log entry. Empty unless the page carries an error.
    pub error_id: String,

    /// Cache-Control value for requests made by the page's scripts.
    pub cache_control: String,

    /// Hide the message of the day. Preserved from the caller's value.
    pub hide_motd: bool,

    /// Hide the search bar in the navigation.
    pub hide_search: bool,
}

/// Outbound cache directive derived from the inbound `Cache-Control` header.
///
/// Substring match, not a header grammar: `no-cache` or `max-age=0` anywhere
/// yields `"no-cache"`, anything else yields `""`.
pub fn cache_control_directive(header: Option<&str>) -> &'static str {
    match header {
        Some(cc) if cc.contains("no-cache") || cc.contains("max-age=0") => "no-cache",
        _ => "",
    }
}

/// Fresh random correlation ID.
pub fn new_error_id() -> String {
    collab::random_string(ERROR_ID_LEN)
}

/// Builds [`CommonContext`] values from requests.
#[derive(Clone)]
pub struct ContextBuilder {
    app_url: Url,
    host_name: String,
    debug: bool,
    disable_external_links: bool,
    sessions: Arc<dyn SessionStore>,
    csrf: Arc<dyn CsrfIssuer>,
    users: Arc<dyn UserResolver>,
    spans: Arc<dyn SpanExtractor>,
    features: Arc<dyn FeatureFlags>,
}

impl ContextBuilder {
    /// Builder with anonymous users, in-memory sessions, cookie CSRF tokens,
    /// `traceparent` spans and no feature flags.
    pub fn new(app_url: Url) -> Self {
        Self {
            app_url,
            host_name: String::new(),
            debug: false,
            disable_external_links: false,
            sessions: Arc::new(MemorySessions::new()),
            csrf: Arc::new(CookieCsrf),
            users: Arc::new(Anonymous),
            spans: Arc::new(Traceparent),
            features: Arc::new(BTreeMap::new()),
        }
    }

    pub fn host_name(mut self, host_name: impl Into<String>) -> Self {
        self.host_name = host_name.into();
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn disable_external_links(mut self, disable: bool) -> Self {
        self.disable_external_links = disable;
        self
    }

    pub fn sessions(mut self, sessions: Arc<dyn SessionStore>) -> Self {
        self.sessions = sessions;
        self
    }

    pub fn csrf(mut self, csrf: Arc<dyn CsrfIssuer>) -> Self {
        self.csrf = csrf;
        self
    }

    pub fn users(mut self, users: Arc<dyn UserResolver>) -> Self {
        self.users = users;
        self
    }

    pub fn spans(mut self, spans: Arc<dyn SpanExtractor>) -> Self {
        self.spans = spans;
        self
    }

    pub fn features(mut self, features: Arc<dyn FeatureFlags>) -> Self {
        self.features = features;
        self
    }

    pub fn app_url(&self) -> &Url {
        &self.app_url
    }

    /// Authenticated user, for callers that need it outside the context.
    pub fn current_user(&self, req: &Request) -> Option<User> {
        self.users.current_user(req)
    }

    /// Build the context for rendering `template_name`.
    ///
    /// `existing` is whatever the caller had on the page; only `hide_motd`
    /// and a pre-set `canonical_url` are taken from it. `has_error` controls
    /// whether a correlation ID is generated.
    ///
    /// # Errors
    ///
    /// Session store failures other than [`SessionError::NoSession`].
    pub fn build(
        &self,
        req: &Request,
        template_name: &str,
        existing: &CommonContext,
        has_error: bool,
    ) -> Result<CommonContext, SessionError> {
        let session = match self.sessions.read_session(req) {
            Ok(session) => Some(session),
            Err(SessionError::NoSession) => None,
            Err(err) => return Err(err),
        };

        let current_url = self.app_url.join(&req.uri).ok();
        let canonical = existing
            .canonical_url
            .clone()
            .or_else(|| current_url.as_ref().map(canonical_url));

        let current_user = self.users.current_user(req);
        let user_emails = current_user
            .as_ref()
            .map(|user| self.users.emails(user))
            .unwrap_or_default();

        let (current_route, current_route_vars) = req
            .route
            .clone()
            .map(|r| (r.name, r.vars))
            .unwrap_or_default();

        Ok(CommonContext {
            request_host: req.host.clone(),
            session,
            csrf_token: self.csrf.token(req),
            current_user,
            user_emails,
            current_route,
            current_route_vars,
            current_uri: req.uri.clone(),
            current_url,
            current_query: req.query(),
            current_span_id: self.spans.span_id(req),
            template_name: template_name.to_owned(),
            app_url: Some(self.app_url.clone()),
            canonical_url: canonical,
            host_name: self.host_name.clone(),
            debug: self.debug,
            return_to: return_to(req),
            disable_external_links: self.disable_external_links,
            features: self.features.snapshot(),
            error_id: if has_error { new_error_id() } else { String::new() },
            cache_control: cache_control_directive(req.headers.get("cache-control")).to_owned(),
            hide_motd: existing.hide_motd,
            hide_search: false,
        })
    }
}

impl std::fmt::Debug for ContextBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextBuilder")
            .field("app_url", &self.app_url.as_str())
            .field("host_name", &self.host_name)
            .field("debug", &self.debug)
            .field("disable_external_links", &self.disable_external_links)
            .finish_non_exhaustive()
    }
}
