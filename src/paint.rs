use std::collections::HashMap;

use resvg::usvg;
use tiny_skia::{
    Color, FillRule, FilterQuality, LineCap, Paint, PathBuilder, Pixmap, PixmapMut, PixmapPaint,
    Stroke, Transform,
};
use tracing::debug;

use crate::config::{BORDER_WIDTH, CAPTION_FONT_SIZE, CORNER_RADIUS, Palette, Rgba};
use crate::frame::{Element, Frame};
use crate::types::{Rect, WindowId};

/// Renders frames into a premultiplied RGBA pixmap.
pub struct Painter {
    palette: Palette,
    text_options: usvg::Options<'static>,
    images: HashMap<WindowId, Pixmap>,
}

impl Painter {
    pub fn new(palette: Palette) -> Self {
        let mut text_options = usvg::Options::default();
        text_options.fontdb_mut().load_system_fonts();
        Self {
            palette,
            text_options,
            images: HashMap::new(),
        }
    }

    pub fn set_palette(&mut self, palette: Palette) {
        self.palette = palette;
    }

    /// Forget decoded thumbnails; the next paint decodes them again.
    pub fn clear_images(&mut self) {
        self.images.clear();
    }

    /// `scale` maps surface-local logical pixels to buffer pixels.
    pub fn paint(&mut self, frame: &Frame, pixmap: &mut PixmapMut<'_>, scale: f32) {
        pixmap.fill(Color::TRANSPARENT);
        let transform = Transform::from_scale(scale, scale);
        for element in &frame.elements {
            match element {
                Element::Backdrop { rect } => self.backdrop(pixmap, *rect, transform),
                Element::Highlight { rect } => {
                    fill_rounded(pixmap, *rect, CORNER_RADIUS, self.palette.highlight, transform)
                }
                Element::Image {
                    window_id,
                    rect,
                    encoded,
                } => self.image(pixmap, *window_id, *rect, encoded, transform),
                Element::Caption { rect, text } => self.caption(pixmap, *rect, text, transform),
                Element::CloseButton { rect, hovered } => {
                    self.close_button(pixmap, *rect, *hovered, transform)
                }
            }
        }
    }

    fn backdrop(&self, pixmap: &mut PixmapMut<'_>, rect: Rect, transform: Transform) {
        fill_rounded(pixmap, rect, CORNER_RADIUS, self.palette.border, transform);
        let inset = BORDER_WIDTH as f64;
        let inner = Rect::new(
            rect.x + inset,
            rect.y + inset,
            (rect.width - inset * 2.0).max(0.0),
            (rect.height - inset * 2.0).max(0.0),
        );
        fill_rounded(
            pixmap,
            inner,
            (CORNER_RADIUS - BORDER_WIDTH).max(0.0),
            self.palette.background,
            transform,
        );
    }

    fn image(
        &mut self,
        pixmap: &mut PixmapMut<'_>,
        window_id: WindowId,
        rect: Rect,
        encoded: &[u8],
        transform: Transform,
    ) {
        if !self.images.contains_key(&window_id) {
            let Some(decoded) = decode_bmp(encoded) else {
                debug!(event = "paint.image.decode_failed", window_id);
                return;
            };
            self.images.insert(window_id, decoded);
        }
        let Some(image) = self.images.get(&window_id) else {
            return;
        };
        if image.width() == 0 || image.height() == 0 {
            return;
        }
        let sx = rect.width as f32 / image.width() as f32;
        let sy = rect.height as f32 / image.height() as f32;
        let placement = transform.pre_concat(Transform::from_row(
            sx,
            0.0,
            0.0,
            sy,
            rect.x as f32,
            rect.y as f32,
        ));
        let paint = PixmapPaint {
            quality: FilterQuality::Bilinear,
            ..PixmapPaint::default()
        };
        pixmap.draw_pixmap(0, 0, image.as_ref(), &paint, placement, None);
    }

    fn caption(&self, pixmap: &mut PixmapMut<'_>, rect: Rect, text: &str, transform: Transform) {
        let svg = caption_svg(rect, text, self.palette.caption);
        let tree = match usvg::Tree::from_str(&svg, &self.text_options) {
            Ok(tree) => tree,
            Err(e) => {
                debug!(event = "paint.caption.parse_failed", error = %e);
                return;
            }
        };
        let placement = transform.pre_translate(rect.x as f32, rect.y as f32);
        resvg::render(&tree, placement, pixmap);
    }

    fn close_button(
        &self,
        pixmap: &mut PixmapMut<'_>,
        rect: Rect,
        hovered: bool,
        transform: Transform,
    ) {
        let fill = if hovered {
            self.palette.close_hover
        } else {
            self.palette.close
        };
        let radius = (rect.width.min(rect.height) / 2.0) as f32;
        fill_rounded(pixmap, rect, radius, fill, transform);

        let inset = rect.width * 0.3;
        let mut pb = PathBuilder::new();
        pb.move_to((rect.x + inset) as f32, (rect.y + inset) as f32);
        pb.line_to((rect.right() - inset) as f32, (rect.bottom() - inset) as f32);
        pb.move_to((rect.right() - inset) as f32, (rect.y + inset) as f32);
        pb.line_to((rect.x + inset) as f32, (rect.bottom() - inset) as f32);
        let Some(cross) = pb.finish() else {
            return;
        };
        let stroke = Stroke {
            width: 1.5,
            line_cap: LineCap::Round,
            ..Stroke::default()
        };
        pixmap.stroke_path(&cross, &solid(self.palette.caption), &stroke, transform, None);
    }
}

fn solid(color: Rgba) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color(Color::from_rgba8(color.r, color.g, color.b, color.a));
    paint.anti_alias = true;
    paint
}

fn fill_rounded(
    pixmap: &mut PixmapMut<'_>,
    rect: Rect,
    radius: f32,
    color: Rgba,
    transform: Transform,
) {
    let Some(path) = rounded_rect_path(
        rect.x as f32,
        rect.y as f32,
        rect.width as f32,
        rect.height as f32,
        radius,
    ) else {
        return;
    };
    pixmap.fill_path(&path, &solid(color), FillRule::Winding, transform, None);
}

fn decode_bmp(encoded: &[u8]) -> Option<Pixmap> {
    let decoded = image::load_from_memory_with_format(encoded, image::ImageFormat::Bmp).ok()?;
    let rgba = decoded.to_rgba8();
    let size = tiny_skia::IntSize::from_wh(rgba.width(), rgba.height())?;
    let mut data = rgba.into_raw();
    premultiply(&mut data);
    Pixmap::from_vec(data, size)
}

fn premultiply(rgba: &mut [u8]) {
    for pixel in rgba.chunks_exact_mut(4) {
        let a = pixel[3] as u16;
        if a == 255 {
            continue;
        }
        for channel in &mut pixel[..3] {
            *channel = ((*channel as u16 * a + 127) / 255) as u8;
        }
    }
}

/// Widest caption, in characters, that fits `width` at the caption size.
fn caption_limit(width: f64) -> usize {
    let average_glyph = CAPTION_FONT_SIZE as f64 * 0.55;
    (width / average_glyph).floor().max(1.0) as usize
}

fn ellipsize(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut out: String = text.chars().take(limit.saturating_sub(1)).collect();
    out.push('…');
    out
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c if c.is_control() => {}
            c => out.push(c),
        }
    }
    out
}

fn caption_svg(rect: Rect, text: &str, color: Rgba) -> String {
    let text = escape_xml(&ellipsize(text, caption_limit(rect.width)));
    let baseline = (rect.height + CAPTION_FONT_SIZE as f64) / 2.0 - 2.0;
    format!(
        r##"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}"><text x="2" y="{baseline}" font-family="sans-serif" font-size="{size}" fill="#{r:02x}{g:02x}{b:02x}" fill-opacity="{opacity:.3}">{text}</text></svg>"##,
        w = rect.width.max(1.0),
        h = rect.height.max(1.0),
        size = CAPTION_FONT_SIZE,
        r = color.r,
        g = color.g,
        b = color.b,
        opacity = color.a as f32 / 255.0,
    )
}

/// tiny-skia writes RGBA; `wl_shm` ARGB8888 is BGRA in memory.
pub fn swizzle_rgba_to_bgra(bytes: &mut [u8]) {
    for pixel in bytes.chunks_exact_mut(4) {
        pixel.swap(0, 2);
    }
}

fn rounded_rect_path(x: f32, y: f32, width: f32, height: f32, radius: f32) -> Option<tiny_skia::Path> {
    let r = radius.min(width / 2.0).min(height / 2.0).max(0.0);
    let mut pb = PathBuilder::new();
    pb.move_to(x + r, y);
    pb.line_to(x + width - r, y);
    pb.quad_to(x + width, y, x + width, y + r);
    pb.line_to(x + width, y + height - r);
    pb.quad_to(x + width, y + height, x + width - r, y + height);
    pb.line_to(x + r, y + height);
    pb.quad_to(x, y + height, x, y + height - r);
    pb.line_to(x, y + r);
    pb.quad_to(x, y, x + r, y);
    pb.close();
    pb.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;
    use crate::config::Theme;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn palette() -> Palette {
        Theme::default().palette().unwrap()
    }

    fn painter() -> Painter {
        Painter {
            palette: palette(),
            text_options: usvg::Options::default(),
            images: HashMap::new(),
        }
    }

    fn pixel(pixmap: &Pixmap, x: u32, y: u32) -> [u8; 4] {
        let p = pixmap.pixel(x, y).unwrap().demultiply();
        [p.red(), p.green(), p.blue(), p.alpha()]
    }

    #[test]
    fn test_swizzle_swaps_red_and_blue() {
        let mut bytes = vec![1, 2, 3, 4, 5, 6, 7, 8];
        swizzle_rgba_to_bgra(&mut bytes);
        assert_eq!(bytes, vec![3, 2, 1, 4, 7, 6, 5, 8]);
    }

    #[test]
    fn test_escape_xml() {
        assert_eq!(escape_xml("a<b> & \"c\"\n"), "a&lt;b&gt; &amp; &quot;c&quot;");
    }

    #[test]
    fn test_ellipsize_long_captions() {
        assert_eq!(ellipsize("short", 10), "short");
        assert_eq!(ellipsize("a rather long title", 8), "a rathe…");
    }

    #[test]
    fn test_caption_svg_carries_color() {
        let svg = caption_svg(
            Rect::new(0.0, 0.0, 180.0, 20.0),
            "Tom & Jerry",
            Rgba {
                r: 0xff,
                g: 0x80,
                b: 0x00,
                a: 0xff,
            },
        );
        assert!(svg.contains("fill=\"#ff8000\""));
        assert!(svg.contains("Tom &amp; Jerry"));
        assert!(usvg::Tree::from_str(&svg, &usvg::Options::default()).is_ok());
    }

    #[test]
    fn test_premultiply() {
        let mut px = vec![200, 100, 50, 128, 10, 20, 30, 255];
        premultiply(&mut px);
        assert_eq!(px, vec![100, 50, 25, 128, 10, 20, 30, 255]);
    }

    #[test]
    fn test_backdrop_paints_border_and_background() {
        let frame = Frame {
            surface: Rect::new(0.0, 0.0, 40.0, 40.0),
            elements: vec![Element::Backdrop {
                rect: Rect::new(0.0, 0.0, 40.0, 40.0),
            }],
            hover_index: None,
            close_hover_index: None,
        };
        let mut pixmap = Pixmap::new(40, 40).unwrap();
        painter().paint(&frame, &mut pixmap.as_mut(), 1.0);

        // translucent black over the white border fill
        let center = pixel(&pixmap, 20, 20);
        assert_eq!(center[3], 0xff);
        assert!((45..=57).contains(&center[0]), "got {center:?}");
        assert_eq!(pixel(&pixmap, 20, 0), [0xff, 0xff, 0xff, 0xff]);
        // rounded corner stays clear
        assert_eq!(pixel(&pixmap, 0, 0)[3], 0);
    }

    #[test]
    fn test_thumbnail_image_is_drawn_and_cached() {
        let mut bgra = Vec::new();
        for _ in 0..(4 * 4) {
            bgra.extend_from_slice(&[0x00, 0x00, 0xff, 0xff]);
        }
        let encoded: Arc<[u8]> = codec::encode(&bgra, 4, 4).unwrap().into();
        let frame = Frame {
            surface: Rect::new(0.0, 0.0, 16.0, 16.0),
            elements: vec![Element::Image {
                window_id: 9,
                rect: Rect::new(0.0, 0.0, 16.0, 16.0),
                encoded,
            }],
            hover_index: None,
            close_hover_index: None,
        };
        let mut painter = painter();
        let mut pixmap = Pixmap::new(16, 16).unwrap();
        painter.paint(&frame, &mut pixmap.as_mut(), 1.0);

        assert_eq!(pixel(&pixmap, 8, 8), [0xff, 0x00, 0x00, 0xff]);
        assert!(painter.images.contains_key(&9));
        painter.clear_images();
        assert!(painter.images.is_empty());
    }

    #[test]
    fn test_garbage_image_bytes_are_skipped() {
        let frame = Frame {
            surface: Rect::new(0.0, 0.0, 8.0, 8.0),
            elements: vec![Element::Image {
                window_id: 1,
                rect: Rect::new(0.0, 0.0, 8.0, 8.0),
                encoded: Arc::from(vec![1u8, 2, 3]),
            }],
            hover_index: None,
            close_hover_index: None,
        };
        let mut painter = painter();
        let mut pixmap = Pixmap::new(8, 8).unwrap();
        painter.paint(&frame, &mut pixmap.as_mut(), 1.0);
        assert!(painter.images.is_empty());
        assert_eq!(pixel(&pixmap, 4, 4)[3], 0);
    }

    #[test]
    fn test_close_button_uses_hover_color() {
        let rect = Rect::new(0.0, 0.0, 16.0, 16.0);
        let frame = |hovered| Frame {
            surface: rect,
            elements: vec![Element::CloseButton { rect, hovered }],
            hover_index: None,
            close_hover_index: None,
        };
        let mut pixmap = Pixmap::new(16, 16).unwrap();
        painter().paint(&frame(true), &mut pixmap.as_mut(), 1.0);
        let hovered = pixel(&pixmap, 8, 2);
        painter().paint(&frame(false), &mut pixmap.as_mut(), 1.0);
        let normal = pixel(&pixmap, 8, 2);
        assert_eq!(hovered, [0xdd, 0x44, 0x44, 0xff]);
        assert_ne!(hovered, normal);
    }
}
