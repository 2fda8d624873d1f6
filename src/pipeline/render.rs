//! PDF rasterisation: render the pages that hold tables to `pages/page_N.png`.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async contexts.
//! `tokio::task::spawn_blocking` moves the work onto a dedicated thread pool
//! thread designed for blocking operations, preventing the Tokio worker
//! threads from stalling during CPU-heavy rendering.
//!
//! ## Resolution
//!
//! Pages are rendered at `dpi / 72` times their point size. The default of 72
//! gives one pixel per PDF point, which is what the normalised table
//! coordinates are later scaled against; any other DPI works equally since
//! the crop stage scales by the actual image size.

use crate::config::PipelineConfig;
use crate::error::Table2MdError;
use crate::layout::WorkspaceLayout;
use crate::output::{RenderSummary, RenderedPage};
use crate::progress::{Reporter, Stage};
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

use super::input::validate_pdf;
use super::parse::ParsedDocument;

/// Options for a render call, detached from the config so they can move into
/// the blocking task.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub dpi: u32,
    pub password: Option<String>,
    pub pdfium_lib_path: Option<PathBuf>,
}

impl RenderOptions {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            dpi: config.dpi,
            password: config.password.clone(),
            pdfium_lib_path: config.pdfium_lib_path.clone(),
        }
    }
}

/// Render every page of `pdf` that holds a table (and passes
/// `config.pages`) to `pages/page_N.png`.
pub async fn render_table_pages(
    pdf: &Path,
    doc: &ParsedDocument,
    config: &PipelineConfig,
) -> Result<RenderSummary, Table2MdError> {
    let start = Instant::now();
    let pdf = validate_pdf(pdf)?;
    let pages = config.pages.filter(&doc.table_pages());
    let reporter = Reporter::new(config.progress_callback.as_ref(), Stage::Render);
    reporter.start(pages.len());

    if pages.is_empty() {
        info!("No table pages to render");
        reporter.finish(0, 0);
        return Ok(RenderSummary::default());
    }

    let rendered = render_pages(&pdf, &pages, &config.layout, RenderOptions::from_config(config))
        .await
        .inspect_err(|e| reporter.error(&pdf.display().to_string(), &e.to_string()))?;
    for page in &rendered {
        reporter.complete(&super::files::file_name(&page.path));
    }
    reporter.finish(rendered.len(), pages.len());

    info!("Rendered {}/{} table pages at {} dpi", rendered.len(), pages.len(), config.dpi);
    Ok(RenderSummary {
        pages: rendered,
        duration_ms: start.elapsed().as_millis() as u64,
    })
}

/// Render 1-indexed `pages` of `pdf_path` into `layout.pages_dir()`.
///
/// Pages past the end of the document are skipped with a warning.
pub async fn render_pages(
    pdf_path: &Path,
    pages: &[usize],
    layout: &WorkspaceLayout,
    options: RenderOptions,
) -> Result<Vec<RenderedPage>, Table2MdError> {
    let path = pdf_path.to_path_buf();
    let pages = pages.to_vec();
    let layout = layout.clone();

    tokio::task::spawn_blocking(move || render_pages_blocking(&path, &pages, &layout, &options))
        .await
        .map_err(|e| Table2MdError::Internal(format!("Render task panicked: {}", e)))?
}

/// Bind pdfium: explicit library path, then next to the working directory,
/// then the system library.
pub fn bind_pdfium(lib_path: Option<&Path>) -> Result<Pdfium, Table2MdError> {
    if let Some(path) = lib_path {
        let bindings = Pdfium::bind_to_library(path).map_err(|e| {
            Table2MdError::PdfiumBindingFailed(format!("{}: {:?}", path.display(), e))
        })?;
        return Ok(Pdfium::new(bindings));
    }

    let bindings = Pdfium::bind_to_library(&Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| Pdfium::bind_to_system_library())
        .map_err(|e| Table2MdError::PdfiumBindingFailed(format!("{:?}", e)))?;
    Ok(Pdfium::new(bindings))
}

fn render_pages_blocking(
    pdf_path: &Path,
    pages: &[usize],
    layout: &WorkspaceLayout,
    options: &RenderOptions,
) -> Result<Vec<RenderedPage>, Table2MdError> {
    let pdfium = bind_pdfium(options.pdfium_lib_path.as_deref())?;
    let password = options.password.as_deref();

    let document = pdfium.load_pdf_from_file(pdf_path, password).map_err(|e| {
        let err_str = format!("{:?}", e);
        if err_str.contains("Password") || err_str.contains("password") {
            if password.is_some() {
                Table2MdError::WrongPassword {
                    path: pdf_path.to_path_buf(),
                }
            } else {
                Table2MdError::PasswordRequired {
                    path: pdf_path.to_path_buf(),
                }
            }
        } else {
            Table2MdError::CorruptPdf {
                path: pdf_path.to_path_buf(),
                detail: err_str,
            }
        }
    })?;

    let doc_pages = document.pages();
    let total_pages = doc_pages.len() as usize;
    info!("PDF loaded: {} pages, rendering {}", total_pages, pages.len());

    let render_config = PdfRenderConfig::new().scale_page_by_factor(options.dpi as f32 / 72.0);

    let mut results = Vec::with_capacity(pages.len());

    for &page_num in pages {
        if page_num == 0 || page_num > total_pages {
            warn!(
                "Skipping page {} (out of range, total={})",
                page_num, total_pages
            );
            continue;
        }

        let page = doc_pages
            .get((page_num - 1) as u16)
            .map_err(|e| Table2MdError::RasterisationFailed {
                page: page_num,
                detail: format!("{:?}", e),
            })?;

        let bitmap = page.render_with_config(&render_config).map_err(|e| {
            Table2MdError::RasterisationFailed {
                page: page_num,
                detail: format!("{:?}", e),
            }
        })?;

        let image = bitmap.as_image();
        let path = layout.page_image(page_num);
        super::files::save_png(&path, &image)?;
        debug!(
            "Rendered page {} → {}x{} px, {}",
            page_num,
            image.width(),
            image.height(),
            path.display()
        );

        results.push(RenderedPage {
            page: page_num,
            path,
            width: image.width(),
            height: image.height(),
        });
    }

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_missing_library_fails_to_bind() {
        let err = bind_pdfium(Some(Path::new("/nonexistent/libpdfium.so")))
            .err()
            .unwrap();
        assert!(matches!(err, Table2MdError::PdfiumBindingFailed(_)));
        assert!(err.to_string().contains("/nonexistent/libpdfium.so"));
    }
}
