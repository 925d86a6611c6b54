//! Form body encoding: URL-encoded fields and multipart uploads.

use bytes::Bytes;
use std::collections::VecDeque;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;

use crate::body::{Body, Section};
use crate::encode::FormValues;
use crate::{RequestError, Result};

/// Content type of URL-encoded form bodies.
pub const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// Content type of files without an explicit or guessable type.
const OCTET_STREAM: &str = "application/octet-stream";

/// Number of random bytes behind a multipart boundary.
const BOUNDARY_BYTES: usize = 30;

/// Where the content of an attached file comes from.
pub enum FileSource {
    /// In-memory content.
    Bytes(Bytes),
    /// Content pulled lazily while the body is sent.
    Reader(Box<dyn Read + Send>),
    /// A file opened when the request is materialized.
    Path(PathBuf),
}

impl fmt::Debug for FileSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            Self::Reader(_) => f.write_str("Reader"),
            Self::Path(path) => f.debug_tuple("Path").field(path).finish(),
        }
    }
}

/// A file attached to a multipart form.
#[derive(Debug)]
pub struct FormFile {
    field: String,
    file_name: String,
    content_type: Option<String>,
    source: FileSource,
}

impl FormFile {
    /// Attach in-memory content.
    pub fn from_bytes(
        field: impl Into<String>,
        file_name: impl Into<String>,
        content: impl Into<Bytes>,
    ) -> Self {
        Self {
            field: field.into(),
            file_name: file_name.into(),
            content_type: None,
            source: FileSource::Bytes(content.into()),
        }
    }

    /// Attach content read from `reader` while the request body is sent.
    pub fn from_reader<R>(field: impl Into<String>, file_name: impl Into<String>, reader: R) -> Self
    where
        R: Read + Send + 'static,
    {
        Self {
            field: field.into(),
            file_name: file_name.into(),
            content_type: None,
            source: FileSource::Reader(Box::new(reader)),
        }
    }

    /// Attach a file from disk. The file name and content type are derived
    /// from the path.
    pub fn from_path(field: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let content_type = mime_guess::from_path(&path)
            .first()
            .map(|mime| mime.essence_str().to_string());
        Self {
            field: field.into(),
            file_name,
            content_type,
            source: FileSource::Path(path),
        }
    }

    /// Override the part's content type.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Form field name.
    pub fn field(&self) -> &str {
        &self.field
    }

    /// File name sent with the part.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Content type sent with the part.
    pub fn content_type(&self) -> &str {
        self.content_type.as_deref().unwrap_or(OCTET_STREAM)
    }

    /// Content source.
    pub fn source(&self) -> &FileSource {
        &self.source
    }

    fn into_section(self) -> Result<Section> {
        match self.source {
            FileSource::Bytes(bytes) => Ok(Section::Bytes(bytes)),
            FileSource::Reader(reader) => Ok(Section::Reader(reader)),
            FileSource::Path(path) => {
                let file = File::open(&path).map_err(|e| {
                    RequestError::encoding(format!("cannot read {}: {e}", path.display()))
                })?;
                Ok(Section::Reader(Box::new(file)))
            }
        }
    }
}

/// Encode form fields and files into a body and its content type.
///
/// Without files the body is URL-encoded. With files it is
/// `multipart/form-data`: fields first, in key order, then files in the
/// order they were attached.
pub fn encode_form(fields: FormValues, files: Vec<FormFile>) -> Result<(String, Body)> {
    if files.is_empty() {
        let encoded = fields.to_urlencoded()?;
        return Ok((FORM_URLENCODED.to_string(), Body::from(encoded)));
    }

    let boundary = generate_boundary();
    let mut writer = MultipartWriter::new(&boundary);
    for (name, value) in fields.pairs() {
        writer.field(name, value);
    }
    for file in files {
        writer.file(file)?;
    }

    let content_type = format!("multipart/form-data; boundary={boundary}");
    Ok((content_type, writer.finish()))
}

/// Extract the boundary parameter of a multipart content type.
pub fn multipart_boundary(content_type: &str) -> Option<&str> {
    content_type
        .split(';')
        .map(str::trim)
        .find_map(|param| param.strip_prefix("boundary="))
        .map(|boundary| boundary.trim_matches('"'))
}

fn generate_boundary() -> String {
    let bytes: [u8; BOUNDARY_BYTES] = rand::random();
    hex::encode(bytes)
}

/// Builds the section chain of a multipart body.
struct MultipartWriter<'a> {
    boundary: &'a str,
    sections: VecDeque<Section>,
    pending: String,
    parts: usize,
}

impl<'a> MultipartWriter<'a> {
    fn new(boundary: &'a str) -> Self {
        Self {
            boundary,
            sections: VecDeque::new(),
            pending: String::new(),
            parts: 0,
        }
    }

    fn start_part(&mut self) {
        if self.parts > 0 {
            self.pending.push_str("\r\n");
        }
        self.pending.push_str("--");
        self.pending.push_str(self.boundary);
        self.pending.push_str("\r\n");
        self.parts += 1;
    }

    fn field(&mut self, name: &str, value: &str) {
        self.start_part();
        self.pending.push_str(&format!(
            "Content-Disposition: form-data; name=\"{}\"\r\n\r\n",
            escape_quotes(name)
        ));
        self.pending.push_str(value);
    }

    fn file(&mut self, file: FormFile) -> Result<()> {
        self.start_part();
        self.pending.push_str(&format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
            escape_quotes(&file.field),
            escape_quotes(&file.file_name)
        ));
        self.pending
            .push_str(&format!("Content-Type: {}\r\n\r\n", file.content_type()));
        let section = file.into_section()?;
        self.flush();
        self.sections.push_back(section);
        Ok(())
    }

    fn flush(&mut self) {
        if !self.pending.is_empty() {
            let text = std::mem::take(&mut self.pending);
            self.sections.push_back(Section::Bytes(Bytes::from(text)));
        }
    }

    fn finish(mut self) -> Body {
        self.pending.push_str("\r\n--");
        self.pending.push_str(self.boundary);
        self.pending.push_str("--\r\n");
        self.flush();
        Body::from_sections(self.sections)
    }
}

fn escape_quotes(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
