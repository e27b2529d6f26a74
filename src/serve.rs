//! HTTP host built on `tiny_http`.
//!
//! - Maps request paths onto `[[serve.routes]]` (`:var` segments become
//!   route variables) and renders the route's template with [`Renderer::exec`]
//! - Turns recoverable render failures into the configured error page
//! - Serves every request on its own thread
//! - Reloads templates on change (via `watch` module)
//! - Graceful shutdown on Ctrl+C
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐        ┌──────────────────┐
//! │   Accept Loop    │        │  Watcher Thread  │
//! │  (main thread)   │        │ (template root)  │
//! └────────┬─────────┘        └────────┬─────────┘
//!          │ spawn per request          │
//!          ▼                            ▼
//!    Site::handle ── Renderer::exec ── Registry ◄── Registry::load
//! ```

use crate::{
    config::{AppConfig, RouteConfig, ServeConfig},
    context::{CSRF_COOKIE, CommonContext, ContextBuilder, new_csrf_token},
    http::{Headers, Request, RouteMatch, reason_phrase},
    log,
    page_data,
    render::{BufferedResponse, RenderError, Renderer, ResponseBuffer, ResponseSink},
    template::Registry,
    watch::watch_templates_blocking,
};
use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use std::{
    collections::BTreeMap,
    io::{self, Cursor, Write},
    net::{IpAddr, SocketAddr},
    sync::Arc,
    thread,
};
use thiserror::Error;
use tiny_http::{Header, Response, Server, StatusCode};

/// Try binding to port, retry with incremented port if in use
const MAX_PORT_RETRIES: u16 = 10;

// ============================================================================
// Routing
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Var(String),
}

/// A compiled `[[serve.routes]]` entry.
#[derive(Debug, Clone)]
struct Route {
    segments: Vec<Segment>,
    name: String,
    template: String,
    data: BTreeMap<String, toml::Value>,
}

fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

impl Route {
    fn new(config: &RouteConfig) -> Self {
        let segments = split_path(&config.path)
            .map(|seg| match seg.strip_prefix(':') {
                Some(var) => Segment::Var(var.to_owned()),
                None => Segment::Literal(seg.to_owned()),
            })
            .collect();

        Self {
            segments,
            name: config.name.clone(),
            template: config.template.clone(),
            data: config.data.clone(),
        }
    }

    /// Route variables if `path` matches this pattern.
    fn matches(&self, path: &str) -> Option<BTreeMap<String, String>> {
        let parts: Vec<_> = split_path(path).collect();
        if parts.len() != self.segments.len() {
            return None;
        }

        let mut vars = BTreeMap::new();
        for (segment, part) in self.segments.iter().zip(parts) {
            let part = urlencoding::decode(part).ok()?;
            match segment {
                Segment::Literal(lit) if *lit == part => {}
                Segment::Literal(_) => return None,
                Segment::Var(name) => {
                    vars.insert(name.clone(), part.into_owned());
                }
            }
        }
        Some(vars)
    }
}

// ============================================================================
// Page Data
// ============================================================================

/// Page data for configured routes: the common context plus the route's
/// static `data` table at the top level.
#[derive(Debug, Default, Serialize)]
pub struct RoutePage {
    pub common: CommonContext,
    #[serde(flatten)]
    pub data: BTreeMap<String, toml::Value>,
}
page_data!(RoutePage);

/// Why a request ended on the error page.
#[derive(Debug, Error)]
pub enum ServeError {
    #[error("no route for {0}")]
    NoRoute(String),

    #[error(transparent)]
    Render(#[from] RenderError),
}

impl ServeError {
    pub fn status(&self) -> u16 {
        match self {
            Self::NoRoute(_) => 404,
            Self::Render(err) => err.status(),
        }
    }
}

/// Page data for the error template. Carries the error so the pipeline
/// assigns a correlation ID.
#[derive(Debug, Default, Serialize)]
pub struct ErrorPage {
    pub common: CommonContext,
    pub status: u16,
    pub reason: &'static str,
    pub message: String,
    #[serde(skip)]
    pub err: Option<ServeError>,
}
page_data!(ErrorPage, error = err);

impl ErrorPage {
    fn new(err: ServeError) -> Self {
        let status = err.status();
        Self {
            status,
            reason: reason_phrase(status),
            message: err.to_string(),
            err: Some(err),
            ..Self::default()
        }
    }
}

// ============================================================================
// Site
// ============================================================================

/// Everything a request handler needs: the renderer, routes and error page.
#[derive(Debug)]
pub struct Site {
    renderer: Renderer,
    routes: Vec<Route>,
    error_template: Option<String>,
}

impl Site {
    pub fn new(renderer: Renderer, serve: &ServeConfig) -> Self {
        Self {
            renderer,
            routes: serve.routes.iter().map(Route::new).collect(),
            error_template: serve.error_template.clone(),
        }
    }

    /// First route whose pattern matches `path`.
    fn route(&self, path: &str) -> Option<(&Route, RouteMatch)> {
        self.routes.iter().find_map(|route| {
            let vars = route.matches(path)?;
            Some((
                route,
                RouteMatch {
                    name: route.name.clone(),
                    vars,
                },
            ))
        })
    }

    /// Render the response for `req` into `sink`.
    pub fn handle(&self, req: Request, sink: &mut dyn ResponseSink) -> io::Result<()> {
        let (req, headers) = csrf_cookie(req);
        let Some((route, matched)) = self.route(req.path()) else {
            let path = req.path().to_owned();
            return self.fail(&req, sink, &headers, ServeError::NoRoute(path));
        };

        let req = req.with_route(matched);
        let mut page = RoutePage {
            data: route.data.clone(),
            ..RoutePage::default()
        };

        match self
            .renderer
            .exec(&req, sink, &route.template, 200, &headers, Some(&mut page))
        {
            Ok(()) => Ok(()),
            Err(RenderError::Sink(err)) => Err(err),
            Err(err) => self.fail(&req, sink, &headers, err.into()),
        }
    }

    /// Send the error page for `err`. The sink has received nothing yet.
    fn fail(
        &self,
        req: &Request,
        sink: &mut dyn ResponseSink,
        headers: &Headers,
        err: ServeError,
    ) -> io::Result<()> {
        let status = err.status();
        log!("error"; "{} {}: {}", req.method, req.uri, err);

        if let Some(template) = &self.error_template {
            let mut page = ErrorPage::new(err);
            match self
                .renderer
                .exec(req, sink, template, status, headers, Some(&mut page))
            {
                Ok(()) => return Ok(()),
                Err(RenderError::Sink(err)) => return Err(err),
                Err(err) => log!("error"; "error page {template}: {err}"),
            }
        }

        plain_error(status)?.write_to(sink)
    }
}

/// Mint the CSRF cookie on a first visit.
///
/// The token is added to the request so the rendered page carries the same
/// value the `Set-Cookie` header in the returned headers hands the browser.
fn csrf_cookie(req: Request) -> (Request, Headers) {
    let mut headers = Headers::new();
    if req.cookie(CSRF_COOKIE).is_some_and(|token| !token.is_empty()) {
        return (req, headers);
    }

    let token = new_csrf_token();
    headers.append(
        "Set-Cookie",
        format!("{CSRF_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax"),
    );
    (req.with_cookie(CSRF_COOKIE, &token), headers)
}

/// Text fallback when no error template is configured or it failed.
fn plain_error(status: u16) -> io::Result<ResponseBuffer> {
    let mut buffer = ResponseBuffer::new();
    buffer
        .headers_mut()
        .set("Content-Type", "text/plain; charset=utf-8");
    buffer.write_header(status);
    write!(buffer, "{} {}", status, reason_phrase(status))?;
    Ok(buffer)
}

// ============================================================================
// tiny_http Glue
// ============================================================================

fn to_request(request: &tiny_http::Request) -> Request {
    let headers: Headers = request
        .headers()
        .iter()
        .map(|h| (h.field.as_str().as_str(), h.value.as_str()))
        .collect();

    Request {
        method: request.method().to_string(),
        uri: request.url().to_owned(),
        host: headers.get("host").unwrap_or_default().to_owned(),
        headers,
        route: None,
    }
}

/// Responds to a `tiny_http` request with the flushed response.
pub struct TinyHttpSink {
    request: Option<tiny_http::Request>,
}

impl TinyHttpSink {
    pub fn new(request: tiny_http::Request) -> Self {
        Self {
            request: Some(request),
        }
    }
}

impl ResponseSink for TinyHttpSink {
    fn flush_response(&mut self, response: BufferedResponse) -> io::Result<()> {
        let request = self
            .request
            .take()
            .ok_or_else(|| io::Error::other("response already sent"))?;

        let headers = wire_headers(&response.headers);
        let length = response.body.len();

        request.respond(Response::new(
            StatusCode(response.status),
            headers,
            Cursor::new(response.body),
            Some(length),
            None,
        ))
    }
}

/// Convert headers for `tiny_http`, which only accepts ASCII.
///
/// `Content-Length` is dropped since `tiny_http` derives it from the body.
fn wire_headers(headers: &Headers) -> Vec<Header> {
    headers
        .iter()
        .filter(|(name, _)| !name.eq_ignore_ascii_case("content-length"))
        .filter_map(|(name, value)| match Header::from_bytes(name, value) {
            Ok(header) => Some(header),
            Err(()) => {
                log!("serve"; "dropping invalid header `{name}: {value}`");
                None
            }
        })
        .collect()
}

fn handle_request(request: tiny_http::Request, site: &Site) {
    let req = to_request(&request);
    let mut sink = TinyHttpSink::new(request);
    if let Err(e) = site.handle(req, &mut sink) {
        log!("serve"; "request error: {e}");
    }
}

// ============================================================================
// Server Entry Point
// ============================================================================

/// Build the renderer from `config` over an already loaded `registry`.
pub fn build_site(config: &AppConfig, registry: Arc<Registry>) -> Result<Site> {
    let context = ContextBuilder::new(config.app_url()?)
        .host_name(config.site.host_name.clone())
        .debug(config.site.debug)
        .disable_external_links(config.site.disable_external_links)
        .features(Arc::new(config.features.clone()));

    Ok(Site::new(Renderer::new(registry, context), &config.serve))
}

/// Serve until Ctrl+C, reloading templates on change when `[serve.watch]` is set.
pub fn serve_site(config: &'static AppConfig, registry: Arc<Registry>) -> Result<()> {
    let interface: IpAddr = config
        .serve
        .interface
        .parse()
        .with_context(|| format!("Invalid interface `{}`", config.serve.interface))?;

    let (server, addr) = try_bind_port(interface, config.serve.port, MAX_PORT_RETRIES)?;
    let server = Arc::new(server);

    let server_for_signal = Arc::clone(&server);
    ctrlc::set_handler(move || {
        log!("serve"; "shutting down...");
        server_for_signal.unblock();
    })
    .context("Failed to set Ctrl+C handler")?;

    if config.serve.watch {
        let registry = Arc::clone(&registry);
        thread::spawn(move || {
            if let Err(err) = watch_templates_blocking(&config.templates.root, &registry) {
                log!("watch"; "{err:#}");
            }
        });
    }

    let site = Arc::new(build_site(config, registry)?);
    log!("serve"; "http://{}", addr);

    for request in server.incoming_requests() {
        let site = Arc::clone(&site);
        thread::spawn(move || handle_request(request, &site));
    }

    Ok(())
}

/// Try to bind to a port, retrying with incremented port numbers if in use.
fn try_bind_port(interface: IpAddr, base_port: u16, max_retries: u16) -> Result<(Server, SocketAddr)> {
    let mut last_err = None;
    for offset in 0..max_retries {
        let port = base_port.saturating_add(offset);
        let addr = SocketAddr::new(interface, port);

        match Server::http(addr) {
            Ok(server) => {
                if offset > 0 {
                    log!("serve"; "port {} in use, using {} instead", base_port, port);
                }
                return Ok((server, addr));
            }
            Err(e) => last_err = Some(e),
        }
    }

    Err(anyhow!(
        "Failed to bind after {} attempts (ports {}-{}): {}",
        max_retries,
        base_port,
        base_port.saturating_add(max_retries.saturating_sub(1)),
        last_err.map_or_else(|| "no attempt made".to_owned(), |e| e.to_string())
    ))
}
