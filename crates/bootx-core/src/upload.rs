//! Multipart file uploads.
//!
//! The transport hands over a fully buffered body, so parsing runs over a
//! single in-memory chunk. [`Context::upload`](crate::Context::upload) reads
//! one file field; the [`DefaultBinder`](crate::DefaultBinder) uses
//! [`form_fields`] to bind the text fields of the same body.

use std::convert::Infallible;
use std::path::Path;

use bytes::{Bytes, BytesMut};
use http::StatusCode;
use multer::Multipart;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::error::BindError;

pub const MIME_MULTIPART: &str = "multipart/form-data";

pub const SIZE_KB: u64 = 1024;
pub const SIZE_MB: u64 = 1024 * SIZE_KB;
pub const SIZE_GB: u64 = 1024 * SIZE_MB;

/// A rejected upload.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("request is not multipart/form-data")]
    NotMultipart,

    #[error("malformed multipart body: {0}")]
    Malformed(#[from] multer::Error),

    #[error("missing file field `{0}`")]
    MissingFile(String),

    #[error("file exceeds the upload limit of {limit} bytes")]
    TooLarge { limit: u64 },

    #[error("file type `{extension}` is not allowed")]
    ExtensionNotAllowed { extension: String },
}

impl UploadError {
    pub fn status(&self) -> StatusCode {
        match self {
            UploadError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            UploadError::ExtensionNotAllowed { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

/// Which field to read and what to accept from it.
#[derive(Debug, Clone)]
pub struct UploadOptions {
    form_key: String,
    max_size: Option<u64>,
    extensions: Vec<String>,
}

impl UploadOptions {
    pub fn new(form_key: impl Into<String>) -> Self {
        Self {
            form_key: form_key.into(),
            max_size: None,
            extensions: Vec::new(),
        }
    }

    /// Upper bound on the file size in bytes. Unbounded by default.
    pub fn max_size(mut self, bytes: u64) -> Self {
        self.max_size = Some(bytes);
        self
    }

    /// Accepts files ending in `extension`, with or without the leading dot.
    ///
    /// With no extension allowed, every file type is accepted.
    pub fn allow_extension(mut self, extension: impl AsRef<str>) -> Self {
        let extension = extension.as_ref().trim().to_ascii_lowercase();
        self.extensions.push(if extension.starts_with('.') {
            extension
        } else {
            format!(".{extension}")
        });
        self
    }

    pub fn allow_extensions<I, S>(self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        extensions
            .into_iter()
            .fold(self, |options, ext| options.allow_extension(ext))
    }

    pub fn form_key(&self) -> &str {
        &self.form_key
    }

    fn allows(&self, extension: &str) -> bool {
        self.extensions.is_empty() || self.extensions.iter().any(|e| e == extension)
    }
}

/// One file read from a multipart body.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub form_key: String,
    pub file_name: String,
    /// Lowercased, with the leading dot; empty when the name has none.
    pub extension: String,
    pub content_type: Option<String>,
    data: Bytes,
}

impl UploadedFile {
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// The whole file content.
    pub fn read_all(&self) -> Bytes {
        self.data.clone()
    }

    pub fn into_bytes(self) -> Bytes {
        self.data
    }
}

fn extension_of(file_name: &str) -> String {
    Path::new(file_name)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_ascii_lowercase()))
        .unwrap_or_default()
}

fn multipart(body: Bytes, content_type: Option<&str>) -> Result<Multipart<'static>, UploadError> {
    let content_type = content_type.ok_or(UploadError::NotMultipart)?;
    let boundary = multer::parse_boundary(content_type).map_err(|_| UploadError::NotMultipart)?;
    let stream = futures::stream::once(async move { Ok::<_, Infallible>(body) });
    Ok(Multipart::new(stream, boundary))
}

/// Reads the file field named by `options` from a buffered multipart body.
pub async fn read_upload(
    body: Bytes,
    content_type: Option<&str>,
    options: &UploadOptions,
) -> Result<UploadedFile, UploadError> {
    let mut multipart = multipart(body, content_type)?;
    while let Some(mut field) = multipart.next_field().await? {
        if field.name() != Some(options.form_key.as_str()) {
            continue;
        }
        let file_name = field.file_name().map(str::trim).unwrap_or_default().to_string();
        if file_name.is_empty() {
            return Err(UploadError::MissingFile(options.form_key.clone()));
        }
        let extension = extension_of(&file_name);
        if !options.allows(&extension) {
            return Err(UploadError::ExtensionNotAllowed { extension });
        }
        let content_type = field.content_type().map(ToString::to_string);

        let mut data = BytesMut::new();
        while let Some(chunk) = field.chunk().await? {
            data.extend_from_slice(&chunk);
            if let Some(limit) = options.max_size
                && data.len() as u64 > limit
            {
                return Err(UploadError::TooLarge { limit });
            }
        }
        return Ok(UploadedFile {
            form_key: options.form_key.clone(),
            file_name,
            extension,
            content_type,
            data: data.freeze(),
        });
    }
    Err(UploadError::MissingFile(options.form_key.clone()))
}

/// The text fields of a buffered multipart body. File fields are skipped.
pub fn form_fields(body: Bytes, content_type: &str) -> Result<Map<String, Value>, BindError> {
    let mut multipart = multipart(body, Some(content_type))
        .map_err(|err| BindError::Multipart(err.to_string()))?;
    futures::executor::block_on(async move {
        let mut form = Map::new();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|err| BindError::Multipart(err.to_string()))?
        {
            if field.file_name().is_some() {
                continue;
            }
            let Some(name) = field.name().map(str::to_owned) else {
                continue;
            };
            let text = field
                .text()
                .await
                .map_err(|err| BindError::Multipart(err.to_string()))?;
            form.insert(name, Value::String(text));
        }
        Ok(form)
    })
}
