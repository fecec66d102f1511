//! External converter and OCR subprocesses.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tempfile::TempDir;
use thiserror::Error;
use tokio::process::Command;

/// Failures from external tools. Kept distinct from parse failures so callers can tell them apart.
#[derive(Debug, Error)]
pub enum ConversionError {
    /// Executable could not be started.
    #[error("failed to launch {program}: {source}")]
    Launch {
        /// Program we attempted to run.
        program: String,
        /// Spawn failure.
        #[source]
        source: std::io::Error,
    },
    /// Waiting on the child process failed.
    #[error("failed while waiting for {program}: {source}")]
    Wait {
        /// Program being waited on.
        program: String,
        /// Wait failure.
        #[source]
        source: std::io::Error,
    },
    /// Process exited unsuccessfully.
    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        /// Program that failed.
        program: String,
        /// Exit status rendered for display.
        status: String,
        /// Captured standard error, trimmed.
        stderr: String,
    },
    /// Process exceeded the configured time limit and was killed.
    #[error("{program} timed out after {}s", timeout.as_secs_f32())]
    TimedOut {
        /// Program that timed out.
        program: String,
        /// Limit that was exceeded.
        timeout: Duration,
    },
    /// Tool reported success but produced no output file.
    #[error("external tool produced no output at {0}")]
    MissingOutput(PathBuf),
    /// Scratch directory for tool output could not be created.
    #[error("failed to create scratch directory: {0}")]
    Scratch(#[source] std::io::Error),
}

/// Executable plus an optional time limit.
#[derive(Debug, Clone)]
struct ExternalTool {
    program: String,
    timeout: Option<Duration>,
}

impl ExternalTool {
    /// Run the tool to completion and return its standard output.
    async fn run(&self, args: Vec<OsString>) -> Result<Vec<u8>, ConversionError> {
        let mut command = Command::new(&self.program);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!(program = %self.program, ?args, "Launching external tool");
        let child = command.spawn().map_err(|source| ConversionError::Launch {
            program: self.program.clone(),
            source,
        })?;

        // Dropping the wait future on timeout drops the child, which kills it.
        let waited = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| ConversionError::TimedOut {
                    program: self.program.clone(),
                    timeout: limit,
                })?,
            None => child.wait_with_output().await,
        };
        let output = waited.map_err(|source| ConversionError::Wait {
            program: self.program.clone(),
            source,
        })?;

        if !output.status.success() {
            return Err(ConversionError::Failed {
                program: self.program.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output.stdout)
    }
}

/// PDF produced by the converter. The scratch directory is deleted on drop.
#[derive(Debug)]
pub struct ConvertedPdf {
    _dir: TempDir,
    path: PathBuf,
}

impl ConvertedPdf {
    /// Location of the converted PDF.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Headless office suite used to turn DOC, DOCX and PPT files into PDF.
#[derive(Debug, Clone)]
pub struct OfficeConverter {
    tool: ExternalTool,
}

impl OfficeConverter {
    /// Build a converter around `program`.
    pub fn new(program: impl Into<String>, timeout: Option<Duration>) -> Self {
        Self {
            tool: ExternalTool {
                program: program.into(),
                timeout,
            },
        }
    }

    /// Convert `source` into a PDF inside a private scratch directory.
    pub async fn convert_to_pdf(&self, source: &Path) -> Result<ConvertedPdf, ConversionError> {
        let dir = scratch_dir("docqa-convert-")?;
        let args = vec![
            OsString::from("--headless"),
            OsString::from("--convert-to"),
            OsString::from("pdf"),
            OsString::from("--outdir"),
            dir.path().as_os_str().to_owned(),
            source.as_os_str().to_owned(),
        ];
        self.tool.run(args).await?;

        let stem = source
            .file_stem()
            .map(|stem| stem.to_os_string())
            .unwrap_or_else(|| OsString::from("document"));
        let mut file_name = stem;
        file_name.push(".pdf");
        let path = dir.path().join(file_name);
        if !path.is_file() {
            return Err(ConversionError::MissingOutput(path));
        }
        tracing::debug!(source = %source.display(), pdf = %path.display(), "Converted document to PDF");
        Ok(ConvertedPdf { _dir: dir, path })
    }
}

fn scratch_dir(prefix: &str) -> Result<TempDir, ConversionError> {
    tempfile::Builder::new()
        .prefix(prefix)
        .tempdir()
        .map_err(ConversionError::Scratch)
}

/// OCR engine invoked as `<program> <image> stdout`.
///
/// PDF pages are first rendered to PNG by a poppler-style rasterizer
/// (`<rasterizer> -png -r 300 -f N -l N -singlefile <pdf> <prefix>`).
#[derive(Debug, Clone)]
pub struct OcrEngine {
    tool: ExternalTool,
    rasterizer: ExternalTool,
}

impl OcrEngine {
    /// Build an OCR runner around `program`, rendering PDF pages with `rasterizer`.
    pub fn new(
        program: impl Into<String>,
        rasterizer: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            tool: ExternalTool {
                program: program.into(),
                timeout,
            },
            rasterizer: ExternalTool {
                program: rasterizer.into(),
                timeout,
            },
        }
    }

    /// Extract text from an image file.
    pub async fn image_to_text(&self, image: &Path) -> Result<String, ConversionError> {
        let stdout = self
            .tool
            .run(vec![image.as_os_str().to_owned(), OsString::from("stdout")])
            .await?;
        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }

    /// Render page `page_number` (1-based) of `pdf` and extract its text.
    pub async fn pdf_page_to_text(
        &self,
        pdf: &Path,
        page_number: u32,
    ) -> Result<String, ConversionError> {
        let dir = scratch_dir("docqa-ocr-")?;
        let prefix = dir.path().join("page");
        let page = OsString::from(page_number.to_string());
        let args = vec![
            OsString::from("-png"),
            OsString::from("-r"),
            OsString::from("300"),
            OsString::from("-f"),
            page.clone(),
            OsString::from("-l"),
            page,
            OsString::from("-singlefile"),
            pdf.as_os_str().to_owned(),
            prefix.as_os_str().to_owned(),
        ];
        self.rasterizer.run(args).await?;

        let image = prefix.with_extension("png");
        if !image.is_file() {
            return Err(ConversionError::MissingOutput(image));
        }
        tracing::debug!(pdf = %pdf.display(), page = page_number, "Rasterized PDF page for OCR");
        self.image_to_text(&image).await
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[tokio::test]
    async fn converter_failure_is_reported() {
        let source = tempfile::NamedTempFile::new().unwrap();
        let converter = OfficeConverter::new("false", None);
        let err = converter.convert_to_pdf(source.path()).await.unwrap_err();
        assert!(matches!(err, ConversionError::Failed { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn missing_converter_fails_to_launch() {
        let source = tempfile::NamedTempFile::new().unwrap();
        let converter = OfficeConverter::new("/nonexistent/docqa-soffice", None);
        let err = converter.convert_to_pdf(source.path()).await.unwrap_err();
        assert!(matches!(err, ConversionError::Launch { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn slow_converter_times_out() {
        let tools = tempfile::tempdir().unwrap();
        let script = write_script(tools.path(), "slow.sh", "sleep 5");
        let source = tempfile::NamedTempFile::new().unwrap();
        let converter = OfficeConverter::new(
            script.display().to_string(),
            Some(Duration::from_millis(200)),
        );
        let err = converter.convert_to_pdf(source.path()).await.unwrap_err();
        assert!(matches!(err, ConversionError::TimedOut { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn converted_pdf_is_removed_on_drop() {
        let tools = tempfile::tempdir().unwrap();
        let script = write_script(
            tools.path(),
            "convert.sh",
            r#"name=$(basename "$6"); printf '%s' "pdf" > "$5/${name%.*}.pdf""#,
        );
        let inputs = tempfile::tempdir().unwrap();
        let source = inputs.path().join("letter.docx");
        std::fs::write(&source, b"docx").unwrap();

        let converter = OfficeConverter::new(script.display().to_string(), None);
        let converted = converter.convert_to_pdf(&source).await.unwrap();
        let path = converted.path().to_path_buf();
        assert!(path.ends_with("letter.pdf"));
        assert!(path.is_file());

        drop(converted);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn ocr_returns_stdout() {
        let tools = tempfile::tempdir().unwrap();
        let script = write_script(tools.path(), "ocr.sh", r#"echo "recognized from $1""#);
        let engine = OcrEngine::new(script.display().to_string(), "false", None);
        let text = engine.image_to_text(Path::new("scan.png")).await.unwrap();
        assert_eq!(text.trim(), "recognized from scan.png");
    }

    #[tokio::test]
    async fn pdf_pages_are_rasterized_before_ocr() {
        let tools = tempfile::tempdir().unwrap();
        let rasterizer = write_script(
            tools.path(),
            "raster.sh",
            r#"for last; do :; done; printf 'page %s' "$5" > "$last.png""#,
        );
        let ocr = write_script(tools.path(), "ocr.sh", r#"cat "$1""#);
        let engine = OcrEngine::new(
            ocr.display().to_string(),
            rasterizer.display().to_string(),
            None,
        );
        let text = engine
            .pdf_page_to_text(Path::new("scan.pdf"), 3)
            .await
            .unwrap();
        assert_eq!(text, "page 3");
    }

    #[tokio::test]
    async fn rasterizer_without_output_is_reported() {
        let engine = OcrEngine::new("false", "true", None);
        let err = engine
            .pdf_page_to_text(Path::new("scan.pdf"), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, ConversionError::MissingOutput(_)), "{err:?}");
    }
}
