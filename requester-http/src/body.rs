//! Materialized request bodies.

use bytes::{Buf, Bytes};
use futures::Stream;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::io::{self, Read};
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::{RequestError, Result};

/// Size of the chunks pulled from reader-backed sections.
const CHUNK_SIZE: usize = 8 * 1024;

/// Body of a built request.
///
/// A body is either empty, a single buffer, or a chain of sections where
/// some sections are read lazily from a caller-supplied reader. Reading the
/// body (through [`Read`] or [`Body::into_stream`]) consumes it.
pub struct Body {
    kind: Kind,
}

enum Kind {
    Empty,
    Bytes(Bytes),
    Sections(VecDeque<Section>),
}

pub(crate) enum Section {
    Bytes(Bytes),
    Reader(Box<dyn Read + Send>),
}

impl Body {
    /// An empty body.
    pub fn empty() -> Self {
        Self { kind: Kind::Empty }
    }

    pub(crate) fn from_sections(sections: VecDeque<Section>) -> Self {
        Self {
            kind: Kind::Sections(sections),
        }
    }

    /// Check if the body carries no content.
    pub fn is_empty(&self) -> bool {
        match &self.kind {
            Kind::Empty => true,
            Kind::Bytes(bytes) => bytes.is_empty(),
            Kind::Sections(_) => false,
        }
    }

    /// The buffered content, if the body is not streamed.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match &self.kind {
            Kind::Empty => Some(&[]),
            Kind::Bytes(bytes) => Some(bytes),
            Kind::Sections(_) => None,
        }
    }

    /// Check if any part of the body is read lazily.
    pub fn is_streaming(&self) -> bool {
        match &self.kind {
            Kind::Sections(sections) => sections
                .iter()
                .any(|section| matches!(section, Section::Reader(_))),
            _ => false,
        }
    }

    /// Total length, when it is known without reading.
    pub fn content_length(&self) -> Option<u64> {
        match &self.kind {
            Kind::Empty => Some(0),
            Kind::Bytes(bytes) => Some(bytes.len() as u64),
            Kind::Sections(sections) => sections.iter().try_fold(0u64, |total, section| match section {
                Section::Bytes(bytes) => Some(total + bytes.len() as u64),
                Section::Reader(_) => None,
            }),
        }
    }

    /// Convert into a stream of chunks.
    pub fn into_stream(self) -> BodyStream {
        BodyStream {
            body: Mutex::new(self),
        }
    }

    /// Read the whole body into memory.
    ///
    /// A failing attached reader is reported as [`RequestError::Encoding`].
    pub fn into_bytes(mut self) -> Result<Bytes> {
        match std::mem::replace(&mut self.kind, Kind::Empty) {
            Kind::Empty => Ok(Bytes::new()),
            Kind::Bytes(bytes) => Ok(bytes),
            sections => {
                self.kind = sections;
                let mut buf = Vec::new();
                self.read_to_end(&mut buf).map_err(read_failure)?;
                Ok(Bytes::from(buf))
            }
        }
    }

    /// Take the content without reading, or give the body back if some
    /// section is backed by a reader.
    pub fn try_into_bytes(self) -> std::result::Result<Bytes, Body> {
        match self.kind {
            Kind::Empty => Ok(Bytes::new()),
            Kind::Bytes(bytes) => Ok(bytes),
            Kind::Sections(sections) => {
                if sections.iter().any(|s| matches!(s, Section::Reader(_))) {
                    return Err(Self::from_sections(sections));
                }
                let mut buf = Vec::new();
                for section in sections {
                    if let Section::Bytes(bytes) = section {
                        buf.extend_from_slice(&bytes);
                    }
                }
                Ok(Bytes::from(buf))
            }
        }
    }

    fn next_chunk(&mut self) -> io::Result<Option<Bytes>> {
        match &mut self.kind {
            Kind::Empty => Ok(None),
            Kind::Bytes(bytes) => {
                let chunk = std::mem::take(bytes);
                self.kind = Kind::Empty;
                Ok((!chunk.is_empty()).then_some(chunk))
            }
            Kind::Sections(sections) => loop {
                let Some(front) = sections.front_mut() else {
                    return Ok(None);
                };
                match front {
                    Section::Bytes(bytes) => {
                        let chunk = std::mem::take(bytes);
                        sections.pop_front();
                        if !chunk.is_empty() {
                            return Ok(Some(chunk));
                        }
                    }
                    Section::Reader(reader) => {
                        let mut buf = vec![0u8; CHUNK_SIZE];
                        let n = match reader.read(&mut buf) {
                            Ok(n) => n,
                            Err(e) => {
                                // the stream ends after the first failure
                                sections.clear();
                                return Err(ContentReadError::wrap(e));
                            }
                        };
                        if n == 0 {
                            sections.pop_front();
                            continue;
                        }
                        buf.truncate(n);
                        return Ok(Some(Bytes::from(buf)));
                    }
                }
            },
        }
    }
}

impl Default for Body {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Self {
            kind: Kind::Bytes(bytes),
        }
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Bytes::from(bytes).into()
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Bytes::from(text).into()
    }
}

impl Read for Body {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        match &mut self.kind {
            Kind::Empty => Ok(0),
            Kind::Bytes(bytes) => Ok(copy_out(bytes, buf)),
            Kind::Sections(sections) => loop {
                let Some(front) = sections.front_mut() else {
                    return Ok(0);
                };
                let n = match front {
                    Section::Bytes(bytes) => copy_out(bytes, buf),
                    Section::Reader(reader) => reader.read(buf).map_err(ContentReadError::wrap)?,
                };
                if n > 0 {
                    return Ok(n);
                }
                sections.pop_front();
            },
        }
    }
}

/// Failure of a caller-supplied reader while the body was read.
#[derive(Debug, thiserror::Error)]
#[error("cannot read attached content: {0}")]
pub(crate) struct ContentReadError(#[source] io::Error);

impl ContentReadError {
    fn wrap(error: io::Error) -> io::Error {
        io::Error::other(Self(error))
    }
}

/// Find a reader failure anywhere in the source chain of `error`.
pub(crate) fn content_read_error<'a>(
    error: &'a (dyn std::error::Error + 'static),
) -> Option<&'a ContentReadError> {
    let mut current = Some(error);
    while let Some(e) = current {
        if let Some(found) = e.downcast_ref::<ContentReadError>() {
            return Some(found);
        }
        // io::Error hides its payload from `source`
        if let Some(io) = e.downcast_ref::<io::Error>()
            && let Some(found) = io.get_ref().and_then(|inner| inner.downcast_ref::<ContentReadError>())
        {
            return Some(found);
        }
        current = e.source();
    }
    None
}

fn read_failure(error: io::Error) -> RequestError {
    match content_read_error(&error) {
        Some(failure) => RequestError::encoding(failure.to_string()),
        None => RequestError::Io(error),
    }
}

fn copy_out(bytes: &mut Bytes, buf: &mut [u8]) -> usize {
    let n = bytes.len().min(buf.len());
    buf[..n].copy_from_slice(&bytes[..n]);
    bytes.advance(n);
    n
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            Kind::Empty => f.write_str("Body::Empty"),
            Kind::Bytes(bytes) => f.debug_tuple("Body::Bytes").field(&bytes.len()).finish(),
            Kind::Sections(sections) => f
                .debug_struct("Body::Sections")
                .field("sections", &sections.len())
                .field("content_length", &self.content_length())
                .finish(),
        }
    }
}

/// Stream of body chunks, handed to the transport.
///
/// Reader-backed sections are read synchronously, one chunk per poll, on
/// whichever thread polls the stream. A reader that blocks for long (a slow
/// pipe or network share) stalls that executor thread; attach such content as
/// bytes, or use a multi-threaded runtime.
pub struct BodyStream {
    body: Mutex<Body>,
}

impl Stream for BodyStream {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let body = self.get_mut().body.get_mut();
        Poll::Ready(body.next_chunk().transpose())
    }
}
