//! Frame annotation: detection boxes with in-box labels, then region outlines.
//!
//! Label geometry uses a fixed-width approximation (`chars * font_size` wide,
//! `font_size` tall) rather than measured glyph extents, so layout is
//! deterministic and independent of the font actually loaded.

use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use anyhow::{anyhow, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;

use crate::detect::Detection;
use crate::region::{BoundingBox, RegionRegistry};

/// Offset of the label's top-left corner from the box's top-left corner.
pub const LABEL_INSET: f32 = 5.0;

pub const DEFAULT_FONT_SIZE: f32 = 30.0;
pub const DEFAULT_LINE_WIDTH: u32 = 2;
pub const DEFAULT_DETECTION_OUTLINE: [u8; 3] = [255, 0, 0];

#[derive(Clone, Debug, PartialEq)]
pub struct AnnotationStyle {
    pub font_size: f32,
    /// Outline thickness in pixels, drawn inward from the box edge.
    pub line_width: u32,
    pub detection_outline: [u8; 3],
    pub label_background: [u8; 3],
    pub label_text: [u8; 3],
}

impl Default for AnnotationStyle {
    fn default() -> Self {
        Self {
            font_size: DEFAULT_FONT_SIZE,
            line_width: DEFAULT_LINE_WIDTH,
            detection_outline: DEFAULT_DETECTION_OUTLINE,
            label_background: [0, 0, 0],
            label_text: [255, 255, 255],
        }
    }
}

/// Where a label's background lands, in image pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LabelLayout {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl LabelLayout {
    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }
}

/// `"<label> <confidence>"` with two decimals, e.g. `cat 0.87`.
pub fn label_text(detection: &Detection) -> String {
    format!("{} {:.2}", detection.label, detection.confidence)
}

/// Place a label inside `bbox`.
///
/// Starts `LABEL_INSET` pixels in from the top-left corner. A label that would
/// cross the right (bottom) edge is shifted left (up) until its right (bottom)
/// edge sits on the box edge. Labels larger than the box therefore start
/// outside its left/top edge.
pub fn layout_label(label: &str, bbox: &BoundingBox, font_size: f32) -> LabelLayout {
    let width = label.chars().count() as f32 * font_size;
    let height = font_size;

    let mut x = bbox.xmin + LABEL_INSET;
    let mut y = bbox.ymin + LABEL_INSET;
    if x + width > bbox.xmax {
        x = bbox.xmax - width;
    }
    if y + height > bbox.ymax {
        y = bbox.ymax - height;
    }

    LabelLayout {
        x,
        y,
        width,
        height,
    }
}

/// Load a TrueType/OpenType font for label text.
pub fn load_font(path: &Path) -> Result<FontArc> {
    let bytes = std::fs::read(path)
        .map_err(|e| anyhow!("failed to read font {}: {}", path.display(), e))?;
    FontArc::try_from_vec(bytes).map_err(|e| anyhow!("invalid font {}: {}", path.display(), e))
}

/// Renders detections and regions onto a copy of the input frame.
#[derive(Clone)]
pub struct FrameAnnotator {
    style: AnnotationStyle,
    font: Option<FontArc>,
}

impl FrameAnnotator {
    pub fn new(style: AnnotationStyle) -> Self {
        Self { style, font: None }
    }

    /// Without a font, label backgrounds are drawn but glyphs are skipped.
    pub fn with_font(mut self, font: FontArc) -> Self {
        self.font = Some(font);
        self
    }

    /// Draw every detection (box, label background, label text) and then every
    /// region outline. `image` is left untouched; the result is a new buffer.
    pub fn annotate(
        &self,
        image: &RgbImage,
        detections: &[Detection],
        regions: &RegionRegistry,
    ) -> RgbImage {
        let mut canvas = image.clone();
        let bounds = canvas.dimensions();

        for detection in detections {
            draw_outline(
                &mut canvas,
                &detection.bbox,
                self.style.line_width,
                Rgb(self.style.detection_outline),
            );

            let label = label_text(detection);
            let layout = layout_label(&label, &detection.bbox, self.style.font_size);
            let corners = (layout.x, layout.y, layout.right(), layout.bottom());
            if let Some(rect) = span_rect(corners, bounds, 1) {
                draw_filled_rect_mut(&mut canvas, rect, Rgb(self.style.label_background));
            }
            if !label_on_canvas(&layout, bounds) {
                continue;
            }
            if let Some(font) = &self.font {
                draw_text_mut(
                    &mut canvas,
                    Rgb(self.style.label_text),
                    layout.x.round() as i32,
                    layout.y.round() as i32,
                    PxScale::from(self.style.font_size),
                    font,
                    &label,
                );
            }
        }

        for region in regions.iter() {
            draw_outline(
                &mut canvas,
                region.bbox(),
                self.style.line_width,
                Rgb(region.outline()),
            );
        }

        canvas
    }
}

impl Default for FrameAnnotator {
    fn default() -> Self {
        Self::new(AnnotationStyle::default())
    }
}

/// Pixel rectangle covering `(x0, y0)..=(x1, y1)`, both corners inclusive.
///
/// Corners are clamped to the canvas grown by `margin` pixels on every side,
/// so edges that fall outside stay outside and the rect never exceeds the
/// canvas by more than the margin.
fn span_rect(
    (x0, y0, x1, y1): (f32, f32, f32, f32),
    (width, height): (u32, u32),
    margin: u32,
) -> Option<Rect> {
    let margin = i64::from(margin);
    let clamp_x = |v: f32| (v.round() as i64).clamp(-margin, i64::from(width) + margin - 1);
    let clamp_y = |v: f32| (v.round() as i64).clamp(-margin, i64::from(height) + margin - 1);

    let (left, right) = (clamp_x(x0), clamp_x(x1));
    let (top, bottom) = (clamp_y(y0), clamp_y(y1));
    if right < left || bottom < top {
        return None;
    }
    let rect_width = u32::try_from(right - left + 1).ok()?;
    let rect_height = u32::try_from(bottom - top + 1).ok()?;
    Some(
        Rect::at(i32::try_from(left).ok()?, i32::try_from(top).ok()?)
            .of_size(rect_width, rect_height),
    )
}

/// True when some part of the label lands on the canvas.
fn label_on_canvas(layout: &LabelLayout, (width, height): (u32, u32)) -> bool {
    layout.right() >= 0.0
        && layout.bottom() >= 0.0
        && layout.x < width as f32
        && layout.y < height as f32
}

fn draw_outline(canvas: &mut RgbImage, bbox: &BoundingBox, line_width: u32, color: Rgb<u8>) {
    let line_width = line_width.max(1);
    let corners = (bbox.xmin, bbox.ymin, bbox.xmax, bbox.ymax);
    let Some(outer) = span_rect(corners, canvas.dimensions(), line_width) else {
        return;
    };
    for i in 0..line_width as i32 {
        let w = outer.width() as i32 - 2 * i;
        let h = outer.height() as i32 - 2 * i;
        if w <= 0 || h <= 0 {
            break;
        }
        let ring = Rect::at(outer.left() + i, outer.top() + i).of_size(w as u32, h as u32);
        draw_hollow_rect_mut(canvas, ring, color);
    }
}
