//! Cropping: cut each table region out of its rendered page image.
//!
//! Page images are read from `pages/` in natural order and matched to table
//! regions by the page number in their file name, so pages rendered by an
//! earlier run (or by another tool) are picked up as long as they follow the
//! `page_N.png` naming.

use crate::error::{Table2MdError, TableError};
use crate::layout::{crop_stem, WorkspaceLayout};
use crate::output::{CropResult, CropSummary};
use crate::progress::{ProgressCallback, Reporter, Stage};
use crate::reconstruct::{to_pixel_rect, PixelRect};
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::files::{file_name, list_images, open_image, page_number_from_name, save_png};
use super::parse::{ParsedDocument, TableRegion};

/// Outline colour and width of the annotated page copies.
const OUTLINE: Rgb<u8> = Rgb([255, 0, 0]);
const OUTLINE_WIDTH: u32 = 2;

/// Crop every table of `doc` from the page images in `layout.pages_dir()`.
///
/// Fatal only when the pages directory cannot be listed; a region that fails
/// to crop is recorded as [`TableError::CropFailed`].
pub fn crop_tables(
    doc: &ParsedDocument,
    layout: &WorkspaceLayout,
    annotate: bool,
    progress: Option<&ProgressCallback>,
) -> Result<CropSummary, Table2MdError> {
    let start = Instant::now();
    let reporter = Reporter::new(progress, Stage::Crop);
    let regions = doc.table_regions();
    let images = list_images(&layout.pages_dir())?;

    reporter.start(regions.len());
    let mut summary = CropSummary::default();

    for image_path in images {
        let name = file_name(&image_path);
        let Some(page) = page_number_from_name(&name) else {
            warn!("Skipping {}: no page number in name", name);
            continue;
        };
        let page_regions: Vec<&TableRegion> = regions.iter().filter(|r| r.page == page).collect();
        if page_regions.is_empty() {
            continue;
        }

        let image = match open_image(&image_path) {
            Ok(img) => DynamicImage::ImageRgb8(img.to_rgb8()),
            Err(e) => {
                warn!("Page {}: {}", page, e);
                for region in page_regions {
                    let result = failed(region, None, e.to_string());
                    reporter.error(&result.name, &e.to_string());
                    summary.tables.push(result);
                }
                continue;
            }
        };
        summary.pages_processed += 1;

        let results = crop_page(&image, &page_regions, layout);
        for result in &results {
            match &result.error {
                None => reporter.complete(&result.name),
                Some(e) => reporter.error(&result.name, &e.to_string()),
            }
        }

        if annotate {
            let rects: Vec<PixelRect> = results.iter().filter_map(|r| r.rect).collect();
            let annotated = annotate_page(&image, &rects);
            let path = layout.annotated_dir().join(&name);
            if let Err(e) = save_png(&path, &DynamicImage::ImageRgb8(annotated)) {
                warn!("Page {}: annotated copy not written: {}", page, e);
            }
        }

        summary.tables.extend(results);
    }

    // Regions whose page was never rendered still get a result.
    for region in &regions {
        let seen = summary
            .tables
            .iter()
            .any(|t| t.page == region.page && t.index == region.index);
        if !seen {
            let result = failed(region, None, "no rendered page image".into());
            reporter.error(&result.name, "no rendered page image");
            summary.tables.push(result);
        }
    }

    summary.duration_ms = start.elapsed().as_millis() as u64;
    reporter.finish(summary.succeeded(), regions.len());
    info!(
        "Cropped {}/{} tables from {} pages",
        summary.succeeded(),
        regions.len(),
        summary.pages_processed
    );
    Ok(summary)
}

/// Crop `regions` (all on the page `image` shows) into `layout.crops_dir()`.
pub fn crop_page(
    image: &DynamicImage,
    regions: &[&TableRegion],
    layout: &WorkspaceLayout,
) -> Vec<CropResult> {
    regions
        .iter()
        .map(|region| crop_region(image, region, layout))
        .collect()
}

fn crop_region(image: &DynamicImage, region: &TableRegion, layout: &WorkspaceLayout) -> CropResult {
    let rect = match to_pixel_rect(&region.bbox, image.width(), image.height()) {
        Ok(rect) => rect,
        Err(e) => return failed(region, None, e.to_string()),
    };
    if rect.is_empty() {
        return failed(region, Some(rect), format!("empty rectangle {}", rect));
    }

    let path = layout.crop_image(region.page, region.index);
    let cropped = image.crop_imm(rect.x_min, rect.y_min, rect.width(), rect.height());
    if let Err(e) = save_png(&path, &cropped) {
        return failed(region, Some(rect), e.to_string());
    }

    debug!(
        "Page {} table {}: {} → {}",
        region.page,
        region.index,
        rect,
        path.display()
    );
    CropResult {
        page: region.page,
        index: region.index,
        name: crop_stem(region.page, region.index),
        rect: Some(rect),
        path: Some(path),
        error: None,
    }
}

fn failed(region: &TableRegion, rect: Option<PixelRect>, detail: String) -> CropResult {
    let name = crop_stem(region.page, region.index);
    warn!("{}: {}", name, detail);
    CropResult {
        page: region.page,
        index: region.index,
        error: Some(TableError::CropFailed {
            table: name.clone(),
            detail,
        }),
        name,
        rect,
        path: None,
    }
}

/// A copy of `image` with each rectangle outlined.
pub fn annotate_page(image: &DynamicImage, rects: &[PixelRect]) -> RgbImage {
    let mut canvas = image.to_rgb8();

    for rect in rects {
        for t in 0..OUTLINE_WIDTH {
            let w = rect.width().saturating_sub(2 * t);
            let h = rect.height().saturating_sub(2 * t);
            if w == 0 || h == 0 {
                break;
            }
            let outline = Rect::at((rect.x_min + t) as i32, (rect.y_min + t) as i32).of_size(w, h);
            draw_hollow_rect_mut(&mut canvas, outline, OUTLINE);
        }
    }

    canvas
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconstruct::NormalizedPoint;

    fn region(page: usize, index: usize, pts: &[(f64, f64)]) -> TableRegion {
        TableRegion {
            page,
            index,
            bbox: pts.iter().map(|&(x, y)| NormalizedPoint::new(x, y)).collect(),
        }
    }

    fn white(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([255, 255, 255])))
    }

    #[test]
    fn crops_to_pixel_rect() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = WorkspaceLayout::new(tmp.path());
        let r = region(3, 1, &[(0.1, 0.2), (0.5, 0.2), (0.5, 0.6), (0.1, 0.6)]);

        let results = crop_page(&white(200, 100), &[&r], &layout);

        assert_eq!(results.len(), 1);
        let result = &results[0];
        assert!(result.error.is_none());
        assert_eq!(result.name, "page_3_table_1");
        let saved = image::open(result.path.as_ref().unwrap()).unwrap();
        assert_eq!((saved.width(), saved.height()), (80, 40));
    }

    #[test]
    fn zero_area_region_is_a_table_error() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = WorkspaceLayout::new(tmp.path());
        let r = region(1, 1, &[(0.3, 0.3), (0.3, 0.6)]);

        let results = crop_page(&white(100, 100), &[&r], &layout);

        assert!(matches!(results[0].error, Some(TableError::CropFailed { .. })));
        assert!(results[0].path.is_none());
    }

    #[test]
    fn empty_bbox_is_a_table_error() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = WorkspaceLayout::new(tmp.path());
        let r = region(1, 2, &[]);

        let results = crop_page(&white(10, 10), &[&r], &layout);

        assert!(results[0].rect.is_none());
        assert!(matches!(results[0].error, Some(TableError::CropFailed { .. })));
    }

    #[test]
    fn annotation_outlines_rectangle() {
        let rect = PixelRect {
            x_min: 2,
            y_min: 2,
            x_max: 8,
            y_max: 8,
        };
        let out = annotate_page(&white(10, 10), &[rect]);

        assert_eq!(*out.get_pixel(2, 2), OUTLINE);
        assert_eq!(*out.get_pixel(3, 5), OUTLINE);
        assert_eq!(*out.get_pixel(7, 5), OUTLINE);
        assert_eq!(*out.get_pixel(5, 5), Rgb([255, 255, 255]));
        assert_eq!(*out.get_pixel(0, 0), Rgb([255, 255, 255]));
    }

    #[test]
    fn annotation_skips_degenerate_rectangle() {
        let rect = PixelRect {
            x_min: 4,
            y_min: 4,
            x_max: 4,
            y_max: 9,
        };
        let out = annotate_page(&white(10, 10), &[rect]);
        assert!(out.pixels().all(|p| *p == Rgb([255, 255, 255])));
    }
}
