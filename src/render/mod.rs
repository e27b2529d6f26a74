//! Request rendering: inject context, execute into a buffer, flush once.
//!
//! # Pipeline
//!
//! ```text
//! exec(req, sink, name, status, headers, data)
//!     │
//!     ├── data? ── ContextBuilder::build ── set_common      (session failure → Err)
//!     ├── EventLog: app event + page view
//!     ├── ResponseBuffer: headers, default Content-Type, status
//!     ├── 304? ── flush status + headers, done
//!     ├── Registry::get(name)                                (miss → Err, nothing sent)
//!     ├── CompiledTemplate::render into the buffer           (failure → Err, nothing sent)
//!     └── flush buffer to sink in one call
//! ```
//!
//! A caller sees either the whole page with the requested status or an
//! error with zero bytes sent.

pub mod buffer;
pub mod events;

pub use buffer::{BufferedResponse, CollectSink, ResponseBuffer, ResponseSink, WireSink};
pub use events::{AppEvent, EventLog, LogEvents, NoEvents};

use crate::{
    context::{ContextBuilder, SessionError},
    http::{DEFAULT_CONTENT_TYPE, Headers, NOT_MODIFIED, Request},
    page::PageData,
    template::Registry,
};
use minijinja::{Value, context};
use std::{
    any::Any,
    io::{self, Write},
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};
use thiserror::Error;

/// Failure while executing a compiled unit.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error(transparent)]
    Template(#[from] minijinja::Error),

    #[error("template helper panicked: {0}")]
    Panic(String),
}

/// Recoverable render failures. In every case nothing reached the sink.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("template {0} not found")]
    LookupMiss(String),

    #[error("execute template {name}")]
    Execution {
        name: String,
        #[source]
        source: ExecError,
    },

    #[error("read session")]
    Session(#[from] SessionError),

    #[error("write response")]
    Sink(#[from] io::Error),
}

impl RenderError {
    /// Status a host should use for the error page it renders instead.
    pub fn status(&self) -> u16 {
        match self {
            Self::LookupMiss(_) => 404,
            _ => 500,
        }
    }
}

/// The render entry point, shared by every request handler.
pub struct Renderer {
    registry: Arc<Registry>,
    context: ContextBuilder,
    events: Arc<dyn EventLog>,
}

impl Renderer {
    pub fn new(registry: Arc<Registry>, context: ContextBuilder) -> Self {
        Self {
            registry,
            context,
            events: Arc::new(LogEvents),
        }
    }

    pub fn with_events(mut self, events: Arc<dyn EventLog>) -> Self {
        self.events = events;
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn context(&self) -> &ContextBuilder {
        &self.context
    }

    /// Render template `name` with `data` and flush it to `sink`.
    ///
    /// When `data` is present its common context is rebuilt from `req`
    /// first. On `Err` the sink has received nothing.
    pub fn exec<D: PageData>(
        &self,
        req: &Request,
        sink: &mut dyn ResponseSink,
        name: &str,
        status: u16,
        headers: &Headers,
        mut data: Option<&mut D>,
    ) -> Result<(), RenderError> {
        let current_user = self.context.current_user(req);
        let mut event = AppEvent::new(self.context.app_url().as_str(), name, status, &req.uri);
        event.uid = current_user.as_ref().map(|u| u.uid);

        if let Some(page) = data.as_deref_mut() {
            let common = self
                .context
                .build(req, name, page.common(), page.error().is_some())?;
            if let Some(err) = page.error() {
                event.message = Some(format!("ErrorID:{} Msg:{}", common.error_id, err));
            }
            page.set_common(common);
        }

        self.events.log_event(&event);
        self.events.log_page_view(current_user.as_ref(), req);

        let mut buffer = ResponseBuffer::new();
        for (key, value) in headers.iter() {
            buffer.headers_mut().append(key, value);
        }
        if buffer.headers().get("content-type").is_none_or(str::is_empty) {
            buffer.headers_mut().set("Content-Type", DEFAULT_CONTENT_TYPE);
        }
        buffer.write_header(status);

        if status == NOT_MODIFIED {
            return Ok(buffer.write_to(sink)?);
        }

        let unit = self
            .registry
            .get(name)
            .ok_or_else(|| RenderError::LookupMiss(name.to_owned()))?;

        let ctx = data
            .as_deref()
            .map_or_else(|| context! {}, Value::from_serialize);
        let rendered = panic::catch_unwind(AssertUnwindSafe(|| unit.render(ctx)))
            .map_err(|payload| ExecError::Panic(panic_message(payload.as_ref())))
            .and_then(|result| result.map_err(ExecError::from))
            .map_err(|source| RenderError::Execution {
                name: name.to_owned(),
                source,
            })?;

        buffer.write_all(rendered.as_bytes())?;
        Ok(buffer.write_to(sink)?)
    }
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("registry", &self.registry)
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        asset::MemorySource,
        context::{CommonContext, Session, SessionStore, User, UserResolver},
        page_data,
        template::{Helpers, TemplateGroup},
    };
    use minijinja::Error as TemplateError;
    use parking_lot::Mutex;
    use serde::Serialize;
    use url::Url;

    // ------------------------------------------------------------------------
    // Fixtures
    // ------------------------------------------------------------------------

    #[derive(Serialize, Default)]
    struct HomePage {
        common: CommonContext,
        title: String,
    }
    page_data!(HomePage);

    #[derive(Debug, thiserror::Error)]
    #[error("backend unavailable")]
    struct Backend;

    #[derive(Serialize, Default)]
    struct FailedPage {
        common: CommonContext,
        #[serde(skip)]
        err: Option<Backend>,
    }
    page_data!(FailedPage, error = err);

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<AppEvent>>,
        views: Mutex<Vec<String>>,
    }

    impl EventLog for Recorder {
        fn log_event(&self, event: &AppEvent) {
            self.events.lock().push(event.clone());
        }

        fn log_page_view(&self, _user: Option<&User>, req: &Request) {
            self.views.lock().push(req.uri.clone());
        }
    }

    struct BrokenStore;

    impl SessionStore for BrokenStore {
        fn read_session(&self, _req: &Request) -> Result<Session, SessionError> {
            Err(SessionError::Store("disk on fire".into()))
        }
    }

    struct Bob;

    impl UserResolver for Bob {
        fn current_user(&self, _req: &Request) -> Option<User> {
            Some(User {
                uid: 9,
                login: "bob".into(),
                name: None,
            })
        }
    }

    fn root(body: &str) -> String {
        format!("{{% macro ROOT() %}}{body}{{% endmacro %}}")
    }

    fn registry() -> Arc<Registry> {
        let source = MemorySource::new()
            .with(
                "page/home.html",
                root("<h1>{{ title }}</h1>{% if common.hide_motd %}{% else %}<p>motd</p>{% endif %}{{ footer() }}"),
            )
            .with("page/boom.html", root("before {{ explode() }} after"))
            .with("page/fails.html", root("before {{ refuse() }} after"))
            .with("page/error.html", root("error {{ common.error_id }}"))
            .with("page/plain.html", root("plain [{{ title }}]"))
            .with("layout/footer.html", "{% macro footer() %}<footer>{{ common.csrf_token }}</footer>{% endmacro %}");

        let helpers = Helpers::new()
            .with("explode", |_| panic!("helper exploded"))
            .with("refuse", |_| {
                Err(TemplateError::new(
                    minijinja::ErrorKind::InvalidOperation,
                    "refused",
                ))
            });

        let groups = vec![
            TemplateGroup::new("pages")
                .set(["page/home.html"])
                .set(["page/boom.html"])
                .set(["page/fails.html"])
                .set(["page/error.html"])
                .set(["page/plain.html"])
                .layout(["layout/footer.html"]),
        ];
        let registry = Registry::new(Arc::new(source), helpers, groups);
        registry.load().unwrap();
        Arc::new(registry)
    }

    fn renderer() -> (Renderer, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let context = ContextBuilder::new(Url::parse("https://app.example.com/").unwrap());
        let renderer = Renderer::new(registry(), context).with_events(recorder.clone());
        (renderer, recorder)
    }

    fn request() -> Request {
        Request::get("/").with_host("app.example.com").with_header("Cookie", "csrf_token=tok")
    }

    // ------------------------------------------------------------------------
    // Tests
    // ------------------------------------------------------------------------

    #[test]
    fn test_render_home_page() {
        let (renderer, recorder) = renderer();
        let mut sink = CollectSink::new();
        let mut page = HomePage {
            title: "Home".into(),
            ..HomePage::default()
        };

        renderer
            .exec(&request(), &mut sink, "page/home.html", 200, &Headers::new(), Some(&mut page))
            .unwrap();

        let response = sink.last().unwrap();
        assert_eq!(sink.responses.len(), 1);
        assert_eq!(response.status, 200);
        assert_eq!(response.headers.get("content-type"), Some("text/html; charset=utf-8"));
        assert_eq!(
            String::from_utf8_lossy(&response.body),
            "<h1>Home</h1><p>motd</p><footer>tok</footer>"
        );

        assert_eq!(page.common.template_name, "page/home.html");
        assert_eq!(page.common.request_host, "app.example.com");

        let events = recorder.events.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].method, "page/home.html");
        assert_eq!(events[0].result, "200");
        assert_eq!(events[0].service, "https://app.example.com/");
        assert_eq!(recorder.views.lock().len(), 1);
    }

    #[test]
    fn test_wire_sink_receives_whole_page() {
        let (renderer, _) = renderer();
        let mut sink = WireSink::new(Vec::new());
        let mut page = HomePage::default();

        renderer
            .exec(&request(), &mut sink, "page/home.html", 200, &Headers::new(), Some(&mut page))
            .unwrap();

        let wire = String::from_utf8(sink.into_inner()).unwrap();
        assert!(wire.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(wire.contains("Content-Type: text/html; charset=utf-8\r\n"));
        assert!(wire.ends_with("<footer>tok</footer>"));
    }

    #[test]
    fn test_supplied_headers_kept() {
        let (renderer, _) = renderer();
        let mut sink = CollectSink::new();
        let headers: Headers = [("Content-Type", "text/plain"), ("X-Frame-Options", "DENY")]
            .into_iter()
            .collect();

        renderer
            .exec(&request(), &mut sink, "page/home.html", 201, &headers, Some(&mut HomePage::default()))
            .unwrap();

        let response = sink.last().unwrap();
        assert_eq!(response.status, 201);
        assert_eq!(response.headers.get("content-type"), Some("text/plain"));
        assert_eq!(response.headers.get("x-frame-options"), Some("DENY"));
    }

    #[test]
    fn test_lookup_miss_sends_nothing() {
        let (renderer, recorder) = renderer();
        let mut sink = WireSink::new(Vec::new());

        let err = renderer
            .exec(&request(), &mut sink, "page/nope.html", 200, &Headers::new(), Some(&mut HomePage::default()))
            .unwrap_err();

        assert!(matches!(err, RenderError::LookupMiss(ref n) if n == "page/nope.html"));
        assert_eq!(err.status(), 404);
        assert!(sink.get_ref().is_empty());
        // Events are recorded before the lookup.
        assert_eq!(recorder.events.lock().len(), 1);
    }

    #[test]
    fn test_not_modified_skips_execution() {
        let (renderer, _) = renderer();
        let mut sink = CollectSink::new();

        // Unknown template and a panicking one: neither is looked at for 304.
        for name in ["page/nope.html", "page/boom.html"] {
            renderer
                .exec(&request(), &mut sink, name, NOT_MODIFIED, &Headers::new(), Some(&mut HomePage::default()))
                .unwrap();
        }

        assert_eq!(sink.responses.len(), 2);
        for response in &sink.responses {
            assert_eq!(response.status, 304);
            assert!(response.body.is_empty());
            assert!(response.headers.contains("content-type"));
        }
    }

    #[test]
    fn test_helper_panic_sends_nothing() {
        let (renderer, _) = renderer();
        let mut sink = WireSink::new(Vec::new());

        let err = renderer
            .exec(&request(), &mut sink, "page/boom.html", 200, &Headers::new(), Some(&mut HomePage::default()))
            .unwrap_err();

        match err {
            RenderError::Execution { name, source: ExecError::Panic(msg) } => {
                assert_eq!(name, "page/boom.html");
                assert!(msg.contains("helper exploded"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(sink.get_ref().is_empty());
    }

    #[test]
    fn test_helper_error_sends_nothing() {
        let (renderer, _) = renderer();
        let mut sink = WireSink::new(Vec::new());

        let err = renderer
            .exec(&request(), &mut sink, "page/fails.html", 200, &Headers::new(), Some(&mut HomePage::default()))
            .unwrap_err();

        assert!(matches!(
            err,
            RenderError::Execution { source: ExecError::Template(_), .. }
        ));
        assert_eq!(err.status(), 500);
        assert!(sink.get_ref().is_empty());
    }

    #[test]
    fn test_hide_motd_preserved_rest_recomputed() {
        let (renderer, _) = renderer();
        let mut sink = CollectSink::new();
        let mut page = HomePage {
            common: CommonContext {
                hide_motd: true,
                hide_search: true,
                csrf_token: "forged".into(),
                request_host: "evil.example.com".into(),
                template_name: "other.html".into(),
                cache_control: "whatever".into(),
                error_id: "abcdef".into(),
                debug: true,
                ..CommonContext::default()
            },
            title: "T".into(),
        };

        renderer
            .exec(&request(), &mut sink, "page/home.html", 200, &Headers::new(), Some(&mut page))
            .unwrap();

        let common = &page.common;
        assert!(common.hide_motd);
        assert!(!common.hide_search);
        assert!(!common.debug);
        assert_eq!(common.csrf_token, "tok");
        assert_eq!(common.request_host, "app.example.com");
        assert_eq!(common.template_name, "page/home.html");
        assert_eq!(common.cache_control, "");
        assert_eq!(common.error_id, "");

        // The template saw the preserved flag.
        let body = String::from_utf8_lossy(&sink.last().unwrap().body).into_owned();
        assert!(!body.contains("motd"));
    }

    #[test]
    fn test_error_page_gets_correlation_id() {
        let (renderer, recorder) = renderer();
        let mut sink = CollectSink::new();
        let mut page = FailedPage {
            err: Some(Backend),
            ..FailedPage::default()
        };

        renderer
            .exec(&request(), &mut sink, "page/error.html", 500, &Headers::new(), Some(&mut page))
            .unwrap();

        let id = page.common.error_id.clone();
        assert_eq!(id.len(), crate::context::ERROR_ID_LEN);
        assert_eq!(
            String::from_utf8_lossy(&sink.last().unwrap().body),
            format!("error {id}")
        );

        let events = recorder.events.lock();
        assert_eq!(
            events[0].message.as_deref(),
            Some(format!("ErrorID:{id} Msg:backend unavailable").as_str())
        );
        assert_eq!(events[0].result, "500");
    }

    #[test]
    fn test_session_failure_aborts() {
        let recorder = Arc::new(Recorder::default());
        let context = ContextBuilder::new(Url::parse("https://app.example.com/").unwrap())
            .sessions(Arc::new(BrokenStore));
        let renderer = Renderer::new(registry(), context).with_events(recorder.clone());
        let mut sink = WireSink::new(Vec::new());
        let mut page = HomePage::default();

        let err = renderer
            .exec(&request(), &mut sink, "page/home.html", 200, &Headers::new(), Some(&mut page))
            .unwrap_err();

        assert!(matches!(err, RenderError::Session(SessionError::Store(_))));
        assert!(sink.get_ref().is_empty());
        assert!(recorder.events.lock().is_empty());
        // No partial context was injected.
        assert_eq!(page.common, CommonContext::default());
    }

    #[test]
    fn test_no_page_data() {
        let (renderer, _) = renderer();
        let mut sink = CollectSink::new();

        renderer
            .exec::<HomePage>(&request(), &mut sink, "page/plain.html", 200, &Headers::new(), None)
            .unwrap();

        assert_eq!(sink.last().unwrap().body, b"plain []");
    }

    #[test]
    fn test_event_carries_user() {
        let recorder = Arc::new(Recorder::default());
        let context = ContextBuilder::new(Url::parse("https://app.example.com/").unwrap())
            .users(Arc::new(Bob));
        let renderer = Renderer::new(registry(), context).with_events(recorder.clone());
        let mut page = HomePage::default();

        renderer
            .exec(&request(), &mut CollectSink::new(), "page/home.html", 200, &Headers::new(), Some(&mut page))
            .unwrap();

        assert_eq!(recorder.events.lock()[0].uid, Some(9));
        assert_eq!(page.common.current_user.map(|u| u.uid), Some(9));
    }

    #[test]
    fn test_concurrent_renders_during_reload() {
        let (renderer, _) = renderer();
        let renderer = Arc::new(renderer);

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for _ in 0..5 {
                    renderer.registry().load().unwrap();
                }
            });
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..20 {
                        let mut sink = CollectSink::new();
                        renderer
                            .exec(&request(), &mut sink, "page/home.html", 200, &Headers::new(), Some(&mut HomePage::default()))
                            .unwrap();
                        assert_eq!(sink.responses.len(), 1);
                    }
                });
            }
        });
    }

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(boxed.as_ref()), "static");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(boxed.as_ref()), "owned");
        let boxed: Box<dyn Any + Send> = Box::new(1_u8);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic");
    }
}
