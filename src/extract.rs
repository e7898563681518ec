//! OCR text extraction for scanned PDFs and images.
//!
//! The OCR engine and the PDF rasterizer are external programs hidden behind
//! the [`OcrEngine`] and [`PageRasterizer`] traits. [`OcrExtractor`] combines
//! them: PDFs are rasterized page by page and each page is recognized
//! independently, so one unreadable page costs only that page's text.
//! Images get a single OCR pass.
//!
//! Everything here is blocking; the pipeline calls it from
//! `tokio::task::spawn_blocking`.

use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, warn};

use crate::config::OcrConfig;
use crate::models::FileKind;

/// Whole-file extraction failure. Per-page OCR errors never surface here.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("cannot open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("PDF rasterization failed: {0}")]
    Rasterize(String),
    #[error("OCR failed: {0}")]
    Ocr(#[from] OcrError),
    #[error("extraction task failed: {0}")]
    Task(String),
}

/// Failure of a single OCR invocation (one page or one image).
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct OcrError(pub String);

/// Recognizes text in a single raster image.
pub trait OcrEngine: Send + Sync {
    /// Returns recognized lines in reading order.
    fn recognize(&self, image: &Path) -> Result<Vec<String>, OcrError>;
}

/// Renders each page of a PDF into an image file inside `out_dir`.
pub trait PageRasterizer: Send + Sync {
    /// Returns page images in page order.
    fn rasterize(&self, pdf: &Path, dpi: u32, out_dir: &Path) -> Result<Vec<PathBuf>, ExtractError>;
}

/// File-level extraction used by the ingestion pipeline.
pub trait TextExtractor: Send + Sync {
    /// Returns the accumulated text, possibly empty.
    fn extract(&self, path: &Path, kind: FileKind) -> Result<String, ExtractError>;
}

pub struct OcrExtractor {
    engine: Box<dyn OcrEngine>,
    rasterizer: Box<dyn PageRasterizer>,
    dpi: u32,
}

impl OcrExtractor {
    pub fn new(engine: Box<dyn OcrEngine>, rasterizer: Box<dyn PageRasterizer>, dpi: u32) -> Self {
        Self {
            engine,
            rasterizer,
            dpi,
        }
    }

    /// tesseract + pdftoppm, as configured in `[ocr]`.
    pub fn from_config(config: &OcrConfig) -> Self {
        Self::new(
            Box::new(TesseractCli::new(&config.tesseract_cmd, &config.language)),
            Box::new(PdftoppmCli::new(&config.pdftoppm_cmd)),
            config.dpi,
        )
    }

    fn extract_pdf(&self, path: &Path) -> Result<String, ExtractError> {
        let scratch = tempfile::TempDir::new().map_err(|e| ExtractError::Task(e.to_string()))?;
        let pages = self.rasterizer.rasterize(path, self.dpi, scratch.path())?;
        debug!("Rasterized {} into {} pages", path.display(), pages.len());

        let mut lines = Vec::new();
        for (i, page) in pages.iter().enumerate() {
            match self.engine.recognize(page) {
                Ok(page_lines) => lines.extend(page_lines),
                Err(e) => {
                    warn!("OCR error on page {} of {}: {}", i + 1, path.display(), e);
                }
            }
        }
        Ok(join_lines(&lines))
    }

    fn extract_image(&self, path: &Path) -> Result<String, ExtractError> {
        let lines = self.engine.recognize(path)?;
        Ok(join_lines(&lines))
    }
}

impl TextExtractor for OcrExtractor {
    fn extract(&self, path: &Path, kind: FileKind) -> Result<String, ExtractError> {
        // Fail early with a clear error when the file vanished or is unreadable.
        std::fs::File::open(path).map_err(|source| ExtractError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        match kind {
            FileKind::Pdf => self.extract_pdf(path),
            FileKind::Image => self.extract_image(path),
        }
    }
}

/// Joins recognized lines with single spaces, dropping blank lines.
fn join_lines(lines: &[String]) -> String {
    lines
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

// ============ tesseract ============

/// Runs `tesseract <image> stdout -l <language>` and reads lines from stdout.
pub struct TesseractCli {
    program: String,
    language: String,
}

impl TesseractCli {
    pub fn new(program: &str, language: &str) -> Self {
        Self {
            program: program.to_string(),
            language: language.to_string(),
        }
    }
}

impl OcrEngine for TesseractCli {
    fn recognize(&self, image: &Path) -> Result<Vec<String>, OcrError> {
        let output = Command::new(&self.program)
            .arg(image)
            .arg("stdout")
            .arg("-l")
            .arg(&self.language)
            .output()
            .map_err(|e| OcrError(format!("failed to run {}: {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }
}

// ============ pdftoppm ============

/// Runs `pdftoppm -r <dpi> -png <pdf> <out_dir>/page`, producing `page-N.png` per page.
pub struct PdftoppmCli {
    program: String,
}

impl PdftoppmCli {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
        }
    }
}

impl PageRasterizer for PdftoppmCli {
    fn rasterize(&self, pdf: &Path, dpi: u32, out_dir: &Path) -> Result<Vec<PathBuf>, ExtractError> {
        let output = Command::new(&self.program)
            .arg("-r")
            .arg(dpi.to_string())
            .arg("-png")
            .arg(pdf)
            .arg(out_dir.join("page"))
            .output()
            .map_err(|e| ExtractError::Rasterize(format!("failed to run {}: {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractError::Rasterize(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        let entries = std::fs::read_dir(out_dir)
            .map_err(|e| ExtractError::Rasterize(e.to_string()))?;
        let mut pages: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| page_number(p).is_some())
            .collect();
        sort_pages(&mut pages);
        Ok(pages)
    }
}

/// Page number from `page-7.png` or zero-padded `page-007.png`.
fn page_number(path: &Path) -> Option<u32> {
    let stem = path.file_stem()?.to_str()?;
    if path.extension()?.to_str()? != "png" {
        return None;
    }
    stem.strip_prefix("page-")?.parse().ok()
}

fn sort_pages(pages: &mut [PathBuf]) {
    pages.sort_by_key(|p| page_number(p).unwrap_or(u32::MAX));
}
