//! Page rasterization
//!
//! A page is scaled uniformly to fit the target box, rendered through
//! MuPDF and composited onto a white canvas of exactly the requested size.

use image::{imageops, Rgba, RgbaImage};
use mupdf::{Colorspace, Matrix, Page, Pixmap};

use crate::document::{DocumentError, DocumentResult, PageSize, RenderedPage};

const BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Render `page` centered on a `width x height` canvas
pub fn render_fit(
    page: &Page,
    page_index: usize,
    width: u32,
    height: u32,
) -> DocumentResult<RenderedPage> {
    if width == 0 || height == 0 {
        return Err(DocumentError::Render(format!(
            "empty target size {width}x{height}"
        )));
    }

    let bounds = page.bounds()?;
    let size = PageSize::new(bounds.x1 - bounds.x0, bounds.y1 - bounds.y0);
    let scale = size.fit_scale(width, height);

    let matrix = Matrix::new_scale(scale, scale);
    let pixmap = page.to_pixmap(&matrix, &Colorspace::device_rgb(), true, true)?;
    let rendered = pixmap_to_rgba(&pixmap)?;

    let mut canvas = RgbaImage::from_pixel(width, height, BACKGROUND);
    let x = (i64::from(width) - i64::from(rendered.width())) / 2;
    let y = (i64::from(height) - i64::from(rendered.height())) / 2;
    imageops::overlay(&mut canvas, &rendered, x.max(0), y.max(0));

    Ok(RenderedPage {
        page_index,
        image: canvas,
    })
}

/// Copy pixmap samples into an RGBA buffer
fn pixmap_to_rgba(pixmap: &Pixmap) -> DocumentResult<RgbaImage> {
    let width = pixmap.width() as u32;
    let height = pixmap.height() as u32;
    let n = pixmap.n() as usize;
    let samples = pixmap.samples();

    if n < 3 {
        return Err(DocumentError::Render(format!(
            "unexpected pixmap with {n} components"
        )));
    }

    let mut rgba = Vec::with_capacity(width as usize * height as usize * 4);
    for pixel in samples.chunks_exact(n).take(width as usize * height as usize) {
        let alpha = if n >= 4 { pixel[3] } else { 255 };
        rgba.extend_from_slice(&[pixel[0], pixel[1], pixel[2], alpha]);
    }

    RgbaImage::from_raw(width, height, rgba)
        .ok_or_else(|| DocumentError::Render("pixmap smaller than its dimensions".to_string()))
}
