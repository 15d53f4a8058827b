// src/upload.rs

use crate::error::{BillError, Result};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Minimum number of non-whitespace characters we expect from a
/// "real" text PDF. Below this threshold we treat it as scanned.
const MIN_TEXT_CHARS: usize = 30;

/// The file types a bill can be uploaded as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MimeType {
    Pdf,
    Png,
    Jpeg,
}

impl MimeType {
    pub fn as_str(self) -> &'static str {
        match self {
            MimeType::Pdf => "application/pdf",
            MimeType::Png => "image/png",
            MimeType::Jpeg => "image/jpeg",
        }
    }

    pub fn parse(mime: &str) -> Result<Self> {
        match mime.trim().to_ascii_lowercase().as_str() {
            "application/pdf" => Ok(MimeType::Pdf),
            "image/png" => Ok(MimeType::Png),
            "image/jpeg" | "image/jpg" => Ok(MimeType::Jpeg),
            other => Err(BillError::UnsupportedMedia(format!(
                "{other} (expected a PDF, PNG or JPEG)"
            ))),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("pdf") => Ok(MimeType::Pdf),
            Some("png") => Ok(MimeType::Png),
            Some("jpg" | "jpeg") => Ok(MimeType::Jpeg),
            _ => Err(BillError::UnsupportedMedia(format!(
                "{} (expected .pdf, .png, .jpg or .jpeg)",
                path.display()
            ))),
        }
    }

    pub fn is_image(self) -> bool {
        !matches!(self, MimeType::Pdf)
    }
}

/// An uploaded bill: raw bytes plus their declared type.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub mime: MimeType,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(file_name: impl Into<String>, declared_mime: &str, bytes: Vec<u8>) -> Result<Self> {
        let file_name = file_name.into();
        let mime = MimeType::parse(declared_mime)?;
        if bytes.is_empty() {
            return Err(BillError::UnsupportedMedia(format!("{file_name} is empty")));
        }
        Ok(Self { file_name, mime, bytes })
    }

    /// Read a bill from disk, taking its type from the file extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let mime = MimeType::from_path(path)?;
        let bytes = fs::read(path)?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        info!(file = %file_name, mime = mime.as_str(), bytes = bytes.len(), "Loaded upload");
        Self::new(file_name, mime.as_str(), bytes)
    }

    /// Text layer of a PDF upload, for models that only take images and text.
    /// Scanned PDFs have no usable text layer and are rejected.
    pub fn pdf_text(&self) -> Result<String> {
        if self.mime != MimeType::Pdf {
            return Err(BillError::UnsupportedMedia(format!(
                "{} is not a PDF",
                self.file_name
            )));
        }

        let text = pdf_extract::extract_text_from_mem(&self.bytes).map_err(|e| {
            warn!(error = %e, file = %self.file_name, "pdf-extract failed");
            BillError::UnsupportedMedia(format!("{}: unreadable PDF: {e}", self.file_name))
        })?;

        let meaningful = text.chars().filter(|c| !c.is_whitespace()).count();
        if meaningful < MIN_TEXT_CHARS {
            info!(chars = meaningful, "Extracted text too short, treating as scanned");
            return Err(BillError::UnsupportedMedia(format!(
                "{} looks like a scanned PDF; use an image or the gemini provider",
                self.file_name
            )));
        }

        info!(chars = meaningful, "Text extracted from PDF");
        Ok(text)
    }
}
