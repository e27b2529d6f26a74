//! Analytics side effects of rendering a page.

use crate::{context::User, http::Request, log};
use serde::Serialize;

/// One application-level event per `exec` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AppEvent {
    /// Always `"app"` for pipeline events.
    pub kind: String,
    /// Application base URL.
    pub service: String,
    /// Template name.
    pub method: String,
    /// Response status as a string.
    pub result: String,
    /// Request URI.
    pub url: String,
    pub uid: Option<u64>,
    /// `ErrorID:<id> Msg:<error>` when the page reported an error.
    pub message: Option<String>,
}

impl AppEvent {
    pub fn new(service: impl Into<String>, method: impl Into<String>, status: u16, url: impl Into<String>) -> Self {
        Self {
            kind: "app".to_owned(),
            service: service.into(),
            method: method.into(),
            result: status.to_string(),
            url: url.into(),
            uid: None,
            message: None,
        }
    }
}

/// Sink for analytics events and page views.
pub trait EventLog: Send + Sync {
    fn log_event(&self, event: &AppEvent);
    fn log_page_view(&self, user: Option<&User>, req: &Request);
}

/// Writes events to the terminal log, app events as one JSON object per line.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEvents;

impl EventLog for LogEvents {
    fn log_event(&self, event: &AppEvent) {
        match serde_json::to_string(event) {
            Ok(json) => log!("event"; "{json}"),
            Err(err) => log!("error"; "encode event for {}: {err}", event.method),
        }
    }

    fn log_page_view(&self, user: Option<&User>, req: &Request) {
        let who = user.map_or("anonymous", |u| u.login.as_str());
        log!("event"; "view {} {} by {}", req.method, req.uri, who);
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoEvents;

impl EventLog for NoEvents {
    fn log_event(&self, _event: &AppEvent) {}
    fn log_page_view(&self, _user: Option<&User>, _req: &Request) {}
}
