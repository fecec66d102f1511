//! Extension-based document classification.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Closed set of document categories the readers understand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DocumentCategory {
    /// Portable Document Format.
    Pdf,
    /// Legacy PowerPoint.
    Ppt,
    /// Office Open XML presentation.
    Pptx,
    /// Legacy Word document.
    Doc,
    /// Office Open XML word document.
    Docx,
    /// PNG image.
    Png,
    /// JPEG image.
    Jpg,
    /// Legacy Excel workbook.
    Xls,
    /// Office Open XML workbook.
    Xlsx,
    /// Comma separated values.
    Csv,
    /// Markdown text.
    Md,
    /// HTML page.
    Html,
    /// Plain text.
    Txt,
}

const MIME_TABLE: [(&str, DocumentCategory); 13] = [
    ("application/pdf", DocumentCategory::Pdf),
    ("application/vnd.ms-powerpoint", DocumentCategory::Ppt),
    (
        "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        DocumentCategory::Pptx,
    ),
    ("application/msword", DocumentCategory::Doc),
    (
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        DocumentCategory::Docx,
    ),
    ("image/png", DocumentCategory::Png),
    ("image/jpeg", DocumentCategory::Jpg),
    ("application/vnd.ms-excel", DocumentCategory::Xls),
    (
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        DocumentCategory::Xlsx,
    ),
    ("text/csv", DocumentCategory::Csv),
    ("text/markdown", DocumentCategory::Md),
    ("text/html", DocumentCategory::Html),
    ("text/plain", DocumentCategory::Txt),
];

impl DocumentCategory {
    /// Every supported category, in table order.
    pub const ALL: [Self; 13] = [
        Self::Pdf,
        Self::Ppt,
        Self::Pptx,
        Self::Doc,
        Self::Docx,
        Self::Png,
        Self::Jpg,
        Self::Xls,
        Self::Xlsx,
        Self::Csv,
        Self::Md,
        Self::Html,
        Self::Txt,
    ];

    /// Exact MIME lookup against the supported table.
    pub fn from_mime(mime: &str) -> Option<Self> {
        MIME_TABLE
            .iter()
            .find(|(candidate, _)| candidate.eq_ignore_ascii_case(mime))
            .map(|(_, category)| *category)
    }

    /// Canonical MIME type for the category.
    pub fn mime_type(self) -> &'static str {
        MIME_TABLE
            .iter()
            .find(|(_, category)| *category == self)
            .map(|(mime, _)| *mime)
            .unwrap_or("application/octet-stream")
    }

    /// Upper-case label used in payloads and logs.
    pub fn label(self) -> &'static str {
        match self {
            Self::Pdf => "PDF",
            Self::Ppt => "PPT",
            Self::Pptx => "PPTX",
            Self::Doc => "DOC",
            Self::Docx => "DOCX",
            Self::Png => "PNG",
            Self::Jpg => "JPG",
            Self::Xls => "XLS",
            Self::Xlsx => "XLSX",
            Self::Csv => "CSV",
            Self::Md => "MD",
            Self::Html => "HTML",
            Self::Txt => "TXT",
        }
    }
}

impl fmt::Display for DocumentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Guess a MIME type from the file extension alone.
///
/// Markdown is pinned to `text/markdown` because platform tables disagree on it.
pub fn guess_mime_type(path: &Path) -> Option<String> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    if matches!(extension.as_str(), "md" | "markdown") {
        return Some("text/markdown".to_string());
    }
    let guess = mime_guess::from_ext(&extension);
    guess
        .iter_raw()
        .find(|mime| DocumentCategory::from_mime(mime).is_some())
        .or_else(|| guess.first_raw())
        .map(str::to_string)
}

/// Classify a file by extension; `None` means the file is unsupported.
pub fn detect_category(path: &Path) -> Option<DocumentCategory> {
    let mime = guess_mime_type(path)?;
    let category = DocumentCategory::from_mime(&mime);
    tracing::debug!(path = %path.display(), %mime, category = ?category, "Detected file type");
    category
}
