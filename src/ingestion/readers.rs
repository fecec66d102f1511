//! Format-specific loaders and the category-to-routine dispatch table.

use super::convert::{OcrEngine, OfficeConverter};
use super::detect::{DocumentCategory, guess_mime_type};
use super::splitter::RecursiveCharacterSplitter;
use super::types::{ChunkMetadata, ReaderError, TextChunk, TextRecord};
use std::io::Read;
use std::path::{Path, PathBuf};

/// Loading strategy selected for a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderRoutine {
    /// Per-page PDF text.
    Pdf,
    /// Per-slide text; legacy decks are converted to PDF first.
    Presentation,
    /// Converted to PDF, then read per page.
    WordDocument,
    /// OCR over the whole image.
    Image,
    /// One record per worksheet.
    Spreadsheet,
    /// One record of `header: value` rows.
    Csv,
    /// Rendered markdown text.
    Markdown,
    /// Visible HTML body text.
    Html,
    /// Raw UTF-8 text.
    Text,
}

impl ReaderRoutine {
    /// Routine for every supported category.
    pub fn for_category(category: DocumentCategory) -> Self {
        match category {
            DocumentCategory::Pdf => Self::Pdf,
            DocumentCategory::Ppt | DocumentCategory::Pptx => Self::Presentation,
            DocumentCategory::Doc | DocumentCategory::Docx => Self::WordDocument,
            DocumentCategory::Png | DocumentCategory::Jpg => Self::Image,
            DocumentCategory::Xls | DocumentCategory::Xlsx => Self::Spreadsheet,
            DocumentCategory::Csv => Self::Csv,
            DocumentCategory::Md => Self::Markdown,
            DocumentCategory::Html => Self::Html,
            DocumentCategory::Txt => Self::Text,
        }
    }
}

/// Reads files of any supported category and splits them into chunks.
#[derive(Debug, Clone)]
pub struct DocumentReaders {
    splitter: RecursiveCharacterSplitter,
    converter: OfficeConverter,
    ocr: OcrEngine,
}

impl DocumentReaders {
    /// Assemble the readers from their collaborators.
    pub fn new(
        splitter: RecursiveCharacterSplitter,
        converter: OfficeConverter,
        ocr: OcrEngine,
    ) -> Self {
        Self {
            splitter,
            converter,
            ocr,
        }
    }

    /// Resolve the routine for a detected category, rejecting unsupported files up front.
    pub fn dispatch(
        &self,
        category: Option<DocumentCategory>,
        path: &Path,
    ) -> Result<(DocumentCategory, ReaderRoutine), ReaderError> {
        let category = category.ok_or_else(|| ReaderError::Unsupported {
            path: path.to_path_buf(),
            mime: guess_mime_type(path),
        })?;
        Ok((category, ReaderRoutine::for_category(category)))
    }

    /// Load `path` with the routine for `category` and split the result.
    pub async fn read(
        &self,
        category: Option<DocumentCategory>,
        path: &Path,
    ) -> Result<Vec<TextChunk>, ReaderError> {
        let (category, routine) = self.dispatch(category, path)?;
        self.read_dispatched(category, routine, path).await
    }

    /// Load `path` with an already resolved routine and split the result.
    pub async fn read_dispatched(
        &self,
        category: DocumentCategory,
        routine: ReaderRoutine,
        path: &Path,
    ) -> Result<Vec<TextChunk>, ReaderError> {
        tracing::debug!(path = %path.display(), %category, ?routine, "Reading document");
        let records = self.load(routine, category, path).await?;
        Ok(self.splitter.split_records(&records))
    }

    async fn load(
        &self,
        routine: ReaderRoutine,
        category: DocumentCategory,
        path: &Path,
    ) -> Result<Vec<TextRecord>, ReaderError> {
        match routine {
            ReaderRoutine::Pdf => self.load_pdf(path, path, category).await,
            ReaderRoutine::Presentation if category == DocumentCategory::Pptx => {
                run_blocking(path, category, load_pptx).await
            }
            ReaderRoutine::Presentation | ReaderRoutine::WordDocument => {
                self.load_converted(path, category).await
            }
            ReaderRoutine::Image => {
                let text = self
                    .ocr
                    .image_to_text(path)
                    .await
                    .map_err(ReaderError::Ocr)?;
                Ok(vec![TextRecord::new(
                    text,
                    ChunkMetadata::new(path, None, category),
                )])
            }
            ReaderRoutine::Spreadsheet => run_blocking(path, category, load_spreadsheet).await,
            ReaderRoutine::Csv => run_blocking(path, category, load_csv).await,
            ReaderRoutine::Markdown => run_blocking(path, category, load_markdown).await,
            ReaderRoutine::Html => run_blocking(path, category, load_html).await,
            ReaderRoutine::Text => run_blocking(path, category, load_text).await,
        }
    }

    async fn load_converted(
        &self,
        path: &Path,
        category: DocumentCategory,
    ) -> Result<Vec<TextRecord>, ReaderError> {
        let converted = self.converter.convert_to_pdf(path).await?;
        self.load_pdf(converted.path(), path, category).await
    }

    /// One record per page of `pdf`, attributed to `source`.
    ///
    /// Pages that reference image XObjects are rasterized and OCRed, and the recognized text is
    /// appended to the page text. OCR failure is fatal only for pages without extractable text.
    async fn load_pdf(
        &self,
        pdf: &Path,
        source: &Path,
        category: DocumentCategory,
    ) -> Result<Vec<TextRecord>, ReaderError> {
        let pages = run_blocking(pdf, category, |path, _| read_pdf_pages(path)).await?;
        let mut records = Vec::with_capacity(pages.len());
        for (index, page) in pages.into_iter().enumerate() {
            let mut text = page.text;
            if page.has_images {
                match self.ocr.pdf_page_to_text(pdf, page.number).await {
                    Ok(recognized) => append_text(&mut text, &recognized),
                    Err(err) if !text.trim().is_empty() => {
                        tracing::warn!(
                            path = %source.display(),
                            page = page.number,
                            error = %err,
                            "Image OCR failed; keeping extracted page text"
                        );
                    }
                    Err(err) => return Err(ReaderError::Ocr(err)),
                }
            }
            records.push(TextRecord::new(
                text,
                ChunkMetadata::new(source, Some(index as u32), category),
            ));
        }
        Ok(records)
    }
}

async fn run_blocking<F, T>(
    path: &Path,
    category: DocumentCategory,
    loader: F,
) -> Result<T, ReaderError>
where
    F: FnOnce(&Path, DocumentCategory) -> Result<T, ReaderError> + Send + 'static,
    T: Send + 'static,
{
    let owned: PathBuf = path.to_path_buf();
    tokio::task::spawn_blocking(move || loader(&owned, category))
        .await
        .map_err(|err| ReaderError::Task {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?
}

fn read_string(path: &Path) -> Result<String, ReaderError> {
    let bytes = std::fs::read(path).map_err(|err| ReaderError::io(path, err))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn load_text(path: &Path, category: DocumentCategory) -> Result<Vec<TextRecord>, ReaderError> {
    let text = read_string(path)?;
    Ok(vec![TextRecord::new(
        text,
        ChunkMetadata::new(path, None, category),
    )])
}

fn append_text(text: &mut String, extra: &str) {
    let extra = extra.trim();
    if extra.is_empty() {
        return;
    }
    if !text.trim().is_empty() {
        text.push_str("\n\n");
    }
    text.push_str(extra);
}

/// Text of one PDF page plus whether it draws images.
#[derive(Debug)]
struct PdfPage {
    /// 1-based page number.
    number: u32,
    text: String,
    has_images: bool,
}

/// Per-page text; falls back to whole-document extraction when per-page parsing fails.
fn read_pdf_pages(path: &Path) -> Result<Vec<PdfPage>, ReaderError> {
    match extract_pdf_pages(path) {
        Ok(pages) => Ok(pages),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "Per-page PDF extraction failed; using whole-document extraction");
            let text = pdf_extract::extract_text(path)
                .map_err(|err| ReaderError::parse("pdf", path, err))?;
            Ok(vec![PdfPage {
                number: 1,
                text,
                has_images: false,
            }])
        }
    }
}

fn extract_pdf_pages(path: &Path) -> Result<Vec<PdfPage>, lopdf::Error> {
    let document = lopdf::Document::load(path)?;
    document
        .get_pages()
        .into_iter()
        .map(|(number, page_id)| -> Result<PdfPage, lopdf::Error> {
            Ok(PdfPage {
                number,
                text: document.extract_text(&[number])?,
                has_images: page_has_images(&document, page_id),
            })
        })
        .collect()
}

/// Whether the page's own or inherited resources hold an image XObject.
fn page_has_images(document: &lopdf::Document, page_id: lopdf::ObjectId) -> bool {
    let Ok((own, inherited)) = document.get_page_resources(page_id) else {
        return false;
    };
    own.into_iter()
        .chain(
            inherited
                .into_iter()
                .filter_map(|id| document.get_dictionary(id).ok()),
        )
        .filter_map(|resources| document.get_dict_in_dict(resources, b"XObject").ok())
        .flat_map(|xobjects| xobjects.iter())
        .filter_map(|(_, object)| document.dereference(object).ok())
        .filter_map(|(_, object)| object.as_stream().ok())
        .any(|stream| {
            stream
                .dict
                .get(b"Subtype")
                .and_then(lopdf::Object::as_name)
                .is_ok_and(|name| name == b"Image")
        })
}

/// One record per slide, in slide-number order.
fn load_pptx(path: &Path, category: DocumentCategory) -> Result<Vec<TextRecord>, ReaderError> {
    let file = std::fs::File::open(path).map_err(|err| ReaderError::io(path, err))?;
    let mut archive =
        zip::ZipArchive::new(file).map_err(|err| ReaderError::parse("pptx", path, err))?;

    let mut slides: Vec<(u32, String)> = archive
        .file_names()
        .filter_map(|name| slide_number(name).map(|number| (number, name.to_string())))
        .collect();
    slides.sort_by_key(|(number, _)| *number);

    let mut records = Vec::with_capacity(slides.len());
    for (index, (_, name)) in slides.iter().enumerate() {
        let mut xml = String::new();
        archive
            .by_name(name)
            .map_err(|err| ReaderError::parse("pptx", path, err))?
            .read_to_string(&mut xml)
            .map_err(|err| ReaderError::io(path, err))?;
        let text = slide_text(&xml).map_err(|err| ReaderError::parse("pptx", path, err))?;
        records.push(TextRecord::new(
            text,
            ChunkMetadata::new(path, Some(index as u32), category),
        ));
    }
    Ok(records)
}

fn slide_number(name: &str) -> Option<u32> {
    name.strip_prefix("ppt/slides/slide")?
        .strip_suffix(".xml")?
        .parse()
        .ok()
}

fn slide_text(xml: &str) -> Result<String, quick_xml::Error> {
    use quick_xml::events::Event;

    let mut reader = quick_xml::Reader::from_str(xml);
    let mut text = String::new();
    let mut in_run = false;
    loop {
        match reader.read_event()? {
            Event::Start(tag) if tag.name().as_ref() == b"a:t" => in_run = true,
            Event::End(tag) => match tag.name().as_ref() {
                b"a:t" => in_run = false,
                b"a:p" => text.push('\n'),
                _ => {}
            },
            Event::Text(run) if in_run => text.push_str(&run.unescape()?),
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(text.trim_end().to_string())
}

/// One tab-separated record per worksheet.
fn load_spreadsheet(
    path: &Path,
    category: DocumentCategory,
) -> Result<Vec<TextRecord>, ReaderError> {
    use calamine::Reader;

    let mut workbook = calamine::open_workbook_auto(path)
        .map_err(|err| ReaderError::parse("spreadsheet", path, err))?;
    let sheet_names = workbook.sheet_names().to_vec();

    let mut records = Vec::with_capacity(sheet_names.len());
    for (index, name) in sheet_names.iter().enumerate() {
        let range = workbook
            .worksheet_range(name)
            .map_err(|err| ReaderError::parse("spreadsheet", path, err))?;
        let text = range
            .rows()
            .map(|row| {
                row.iter()
                    .map(|cell| cell.to_string())
                    .collect::<Vec<_>>()
                    .join("\t")
            })
            .collect::<Vec<_>>()
            .join("\n");
        records.push(TextRecord::new(
            text,
            ChunkMetadata::new(path, Some(index as u32), category),
        ));
    }
    Ok(records)
}

/// Single record with one `header: value, ...` line per row.
fn load_csv(path: &Path, category: DocumentCategory) -> Result<Vec<TextRecord>, ReaderError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|err| ReaderError::parse("csv", path, err))?;
    let headers = reader
        .headers()
        .map_err(|err| ReaderError::parse("csv", path, err))?
        .clone();

    let mut lines = Vec::new();
    for row in reader.records() {
        let row = row.map_err(|err| ReaderError::parse("csv", path, err))?;
        let line = headers
            .iter()
            .zip(row.iter())
            .map(|(header, value)| format!("{}: {}", header.trim(), value.trim()))
            .collect::<Vec<_>>()
            .join(", ");
        lines.push(line);
    }
    Ok(vec![TextRecord::new(
        lines.join("\n"),
        ChunkMetadata::new(path, None, category),
    )])
}

fn load_markdown(path: &Path, category: DocumentCategory) -> Result<Vec<TextRecord>, ReaderError> {
    use pulldown_cmark::{Event, Parser, TagEnd};

    let source = read_string(path)?;
    let mut text = String::new();
    for event in Parser::new(&source) {
        match event {
            Event::Text(value) | Event::Code(value) => text.push_str(&value),
            Event::SoftBreak | Event::HardBreak => text.push('\n'),
            Event::End(TagEnd::Paragraph)
            | Event::End(TagEnd::Heading(_))
            | Event::End(TagEnd::Item)
            | Event::End(TagEnd::CodeBlock) => text.push_str("\n\n"),
            _ => {}
        }
    }
    Ok(vec![TextRecord::new(
        text.trim_end(),
        ChunkMetadata::new(path, None, category),
    )])
}

fn load_html(path: &Path, category: DocumentCategory) -> Result<Vec<TextRecord>, ReaderError> {
    let source = read_string(path)?;
    let document = scraper::Html::parse_document(&source);

    let mut lines = Vec::new();
    for node in document.tree.root().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor.value().as_element().is_some_and(|element| {
                matches!(element.name(), "script" | "style" | "noscript" | "head")
            })
        });
        let trimmed = text.trim();
        if !hidden && !trimmed.is_empty() {
            lines.push(trimmed.to_string());
        }
    }
    Ok(vec![TextRecord::new(
        lines.join("\n"),
        ChunkMetadata::new(path, None, category),
    )])
}
