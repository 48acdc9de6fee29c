use std::sync::Arc;

use crate::geometry::PreviewLayout;
use crate::types::{Rect, Thumbnail, WindowId};

/// One drawable piece of the preview surface. Rects are surface-local.
#[derive(Clone, Debug, PartialEq)]
pub enum Element {
    Backdrop { rect: Rect },
    Highlight { rect: Rect },
    Image {
        window_id: WindowId,
        rect: Rect,
        encoded: Arc<[u8]>,
    },
    Caption { rect: Rect, text: String },
    CloseButton { rect: Rect, hovered: bool },
}

/// Everything the renderer needs for one paint of the preview surface.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    /// Screen-space bounds of the surface.
    pub surface: Rect,
    pub elements: Vec<Element>,
    pub hover_index: Option<usize>,
    pub close_hover_index: Option<usize>,
}

impl Frame {
    pub fn build(
        layout: &PreviewLayout,
        thumbnails: &[Thumbnail],
        hover_index: Option<usize>,
        close_hover_index: Option<usize>,
    ) -> Self {
        let mut elements = Vec::with_capacity(1 + thumbnails.len() * 3 + 1);
        elements.push(Element::Backdrop {
            rect: layout.local_bounds(),
        });
        if let Some(rects) = hover_index.and_then(|i| layout.thumbnails.get(i)) {
            elements.push(Element::Highlight { rect: rects.slot });
        }
        for (index, (thumbnail, rects)) in thumbnails.iter().zip(&layout.thumbnails).enumerate() {
            let rect = layout
                .image_rect(index, thumbnail.pixel_width, thumbnail.pixel_height)
                .unwrap_or(rects.image);
            elements.push(Element::Image {
                window_id: thumbnail.window_id,
                rect,
                encoded: thumbnail.encoded.clone(),
            });
            elements.push(Element::Caption {
                rect: rects.caption,
                text: thumbnail.display_name.clone(),
            });
            elements.push(Element::CloseButton {
                rect: rects.close,
                hovered: close_hover_index == Some(index),
            });
        }
        Self {
            surface: layout.surface,
            elements,
            hover_index,
            close_hover_index,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::layout;
    use crate::types::{FitMode, Orientation};
    use pretty_assertions::assert_eq;

    fn thumbnail(id: WindowId) -> Thumbnail {
        Thumbnail {
            window_id: id,
            display_name: format!("win {id}"),
            pixel_width: 400,
            pixel_height: 100,
            encoded: Arc::from(vec![0u8; 4]),
        }
    }

    #[test]
    fn test_frame_elements_per_thumbnail() {
        let layout = layout(
            Orientation::Bottom,
            FitMode::Fit,
            Rect::new(500.0, 900.0, 60.0, 60.0),
            2,
        );
        let frame = Frame::build(&layout, &[thumbnail(1), thumbnail(2)], Some(1), Some(1));

        assert!(matches!(frame.elements[0], Element::Backdrop { .. }));
        assert_eq!(
            frame.elements[1],
            Element::Highlight {
                rect: layout.thumbnails[1].slot
            }
        );
        let captions: Vec<&str> = frame
            .elements
            .iter()
            .filter_map(|e| match e {
                Element::Caption { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(captions, vec!["win 1", "win 2"]);
        let hovered: Vec<bool> = frame
            .elements
            .iter()
            .filter_map(|e| match e {
                Element::CloseButton { hovered, .. } => Some(*hovered),
                _ => None,
            })
            .collect();
        assert_eq!(hovered, vec![false, true]);
    }

    #[test]
    fn test_frame_without_hover_has_no_highlight() {
        let layout = layout(
            Orientation::Left,
            FitMode::Fill,
            Rect::new(0.0, 300.0, 48.0, 48.0),
            1,
        );
        let frame = Frame::build(&layout, &[thumbnail(9)], None, None);
        assert!(
            !frame
                .elements
                .iter()
                .any(|e| matches!(e, Element::Highlight { .. }))
        );
        assert_eq!(frame.surface, layout.surface);
    }
}
