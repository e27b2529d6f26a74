//! In-memory response buffering and the sink it is flushed to.

use crate::http::{Headers, reason_phrase};
use std::io::{self, Write};

/// A complete response: status line, headers and body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BufferedResponse {
    pub status: u16,
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl BufferedResponse {
    /// `HTTP/1.1` wire form with a `Content-Length` header.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.body.len() + 256);
        let reason = reason_phrase(self.status);
        out.extend_from_slice(format!("HTTP/1.1 {} {}\r\n", self.status, reason).as_bytes());
        for (name, value) in self.headers.iter() {
            if name.eq_ignore_ascii_case("content-length") {
                continue;
            }
            out.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
        }
        out.extend_from_slice(format!("Content-Length: {}\r\n\r\n", self.body.len()).as_bytes());
        out.extend_from_slice(&self.body);
        out
    }
}

/// Response assembled in memory so that a failure part way through
/// rendering leaves the real sink untouched.
#[derive(Debug, Default)]
pub struct ResponseBuffer {
    status: Option<u16>,
    headers: Headers,
    body: Vec<u8>,
}

impl ResponseBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    /// Record the status line. Only the first call takes effect.
    pub fn write_header(&mut self, status: u16) {
        self.status.get_or_insert(status);
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn into_response(self) -> BufferedResponse {
        BufferedResponse {
            status: self.status.unwrap_or(200),
            headers: self.headers,
            body: self.body,
        }
    }

    /// Hand everything buffered to `sink` in one call.
    pub fn write_to(self, sink: &mut dyn ResponseSink) -> io::Result<()> {
        sink.flush_response(self.into_response())
    }
}

impl Write for ResponseBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_header(200);
        self.body.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Destination of a fully rendered response.
pub trait ResponseSink {
    fn flush_response(&mut self, response: BufferedResponse) -> io::Result<()>;
}

/// Writes the HTTP/1.1 wire form to any byte writer with a single `write_all`.
#[derive(Debug)]
pub struct WireSink<W: Write> {
    inner: W,
}

impl<W: Write> WireSink<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> ResponseSink for WireSink<W> {
    fn flush_response(&mut self, response: BufferedResponse) -> io::Result<()> {
        self.inner.write_all(&response.to_bytes())?;
        self.inner.flush()
    }
}

/// Keeps every flushed response; used by hosts that forward responses
/// themselves and by tests.
#[derive(Debug, Default)]
pub struct CollectSink {
    pub responses: Vec<BufferedResponse>,
}

impl CollectSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<&BufferedResponse> {
        self.responses.last()
    }
}

impl ResponseSink for CollectSink {
    fn flush_response(&mut self, response: BufferedResponse) -> io::Result<()> {
        self.responses.push(response);
        Ok(())
    }
}
