//! Placement of the preview surface and the thumbnails inside it.
//!
//! Everything here is a pure function of its inputs. The surface rect is in
//! screen coordinates; thumbnail rects are relative to the surface origin,
//! which is also the space local pointer events arrive in.

use crate::config::{
    BORDER_MARGIN, CAPTION_HEIGHT, CELL_GAP, CLOSE_SIZE, DOCK_MARGIN, IMAGE_HEIGHT, IMAGE_WIDTH,
    SIDE_MARGIN,
};
use crate::types::{FitMode, Orientation, Point, Rect};

pub const CELL_WIDTH: f64 = IMAGE_WIDTH;
pub const CELL_HEIGHT: f64 = CAPTION_HEIGHT + IMAGE_HEIGHT;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ThumbnailRects {
    /// Cell plus its surrounding gap; the hover highlight area.
    pub slot: Rect,
    pub cell: Rect,
    pub caption: Rect,
    /// Bounds the captured image is placed into.
    pub image: Rect,
    pub close: Rect,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PreviewLayout {
    pub orientation: Orientation,
    pub fit: FitMode,
    pub surface: Rect,
    pub thumbnails: Vec<ThumbnailRects>,
}

const fn slot_pitch(orientation: Orientation) -> f64 {
    match orientation {
        Orientation::Bottom => CELL_WIDTH + CELL_GAP * 2.0,
        Orientation::Left | Orientation::Right => CELL_HEIGHT + CELL_GAP * 2.0,
    }
}

fn thumbnail_rects(orientation: Orientation, index: usize) -> ThumbnailRects {
    let offset = index as f64 * slot_pitch(orientation);
    let (slot_x, slot_y) = match orientation {
        Orientation::Bottom => (BORDER_MARGIN + offset, BORDER_MARGIN),
        Orientation::Left | Orientation::Right => (BORDER_MARGIN, BORDER_MARGIN + offset),
    };
    let slot = Rect::new(
        slot_x,
        slot_y,
        CELL_WIDTH + CELL_GAP * 2.0,
        CELL_HEIGHT + CELL_GAP * 2.0,
    );
    let cell = Rect::new(slot.x + CELL_GAP, slot.y + CELL_GAP, CELL_WIDTH, CELL_HEIGHT);
    let close = Rect::new(
        cell.right() - CLOSE_SIZE,
        cell.y + (CAPTION_HEIGHT - CLOSE_SIZE) / 2.0,
        CLOSE_SIZE,
        CLOSE_SIZE,
    );
    let caption = Rect::new(
        cell.x,
        cell.y,
        (CELL_WIDTH - CLOSE_SIZE - 4.0).max(0.0),
        CAPTION_HEIGHT,
    );
    let image = Rect::new(cell.x, cell.y + CAPTION_HEIGHT, IMAGE_WIDTH, IMAGE_HEIGHT);
    ThumbnailRects {
        slot,
        cell,
        caption,
        image,
        close,
    }
}

/// Lay out `count` thumbnails next to the hovered dock item.
pub fn layout(orientation: Orientation, fit: FitMode, dock_item: Rect, count: usize) -> PreviewLayout {
    let extent = count as f64 * slot_pitch(orientation);
    let (width, height) = match orientation {
        Orientation::Bottom => (extent, CELL_HEIGHT + CELL_GAP * 2.0),
        Orientation::Left | Orientation::Right => (CELL_WIDTH + CELL_GAP * 2.0, extent),
    };
    let width = width + BORDER_MARGIN * 2.0;
    let height = height + BORDER_MARGIN * 2.0;

    let anchor = dock_item.center();
    let (x, y) = match orientation {
        Orientation::Bottom => (anchor.x - width / 2.0, dock_item.y - DOCK_MARGIN - height),
        Orientation::Left => (dock_item.right() + SIDE_MARGIN, anchor.y - height / 2.0),
        Orientation::Right => (dock_item.x - SIDE_MARGIN - width, anchor.y - height / 2.0),
    };

    PreviewLayout {
        orientation,
        fit,
        surface: Rect::new(x, y, width, height),
        thumbnails: (0..count).map(|i| thumbnail_rects(orientation, i)).collect(),
    }
}

/// Where an image of `width`×`height` pixels is drawn inside `bounds`.
pub fn place_image(fit: FitMode, bounds: Rect, width: u32, height: u32) -> Rect {
    if fit == FitMode::Fill || width == 0 || height == 0 {
        return bounds;
    }
    let (w, h) = (width as f64, height as f64);
    let by_width = bounds.width / w;
    let by_height = bounds.height / h;

    let mut scale = if w >= h { by_width } else { by_height };
    // Near-square captures can overflow the other axis with the first pick.
    if h * scale > bounds.height {
        scale = by_height;
    }
    if w * scale > bounds.width {
        scale = by_width;
    }

    let scaled_w = w * scale;
    let scaled_h = h * scale;
    Rect::new(
        bounds.x + (bounds.width - scaled_w) / 2.0,
        bounds.y + (bounds.height - scaled_h) / 2.0,
        scaled_w,
        scaled_h,
    )
}

impl PreviewLayout {
    pub fn local_bounds(&self) -> Rect {
        Rect::new(0.0, 0.0, self.surface.width, self.surface.height)
    }

    /// Thumbnail under a surface-local point, clamped into range. Points
    /// outside the surface map to `None`.
    pub fn index_at(&self, point: Point) -> Option<usize> {
        if self.thumbnails.is_empty() || !self.local_bounds().contains(point) {
            return None;
        }
        let along = match self.orientation {
            Orientation::Bottom => point.x,
            Orientation::Left | Orientation::Right => point.y,
        };
        let slot = ((along - BORDER_MARGIN) / slot_pitch(self.orientation)).floor();
        if !slot.is_finite() {
            return None;
        }
        let last = self.thumbnails.len() - 1;
        Some(slot.clamp(0.0, last as f64) as usize)
    }

    pub fn close_index_at(&self, point: Point) -> Option<usize> {
        self.index_at(point)
            .filter(|&i| self.thumbnails[i].close.contains(point))
    }

    pub fn image_rect(&self, index: usize, width: u32, height: u32) -> Option<Rect> {
        self.thumbnails
            .get(index)
            .map(|rects| place_image(self.fit, rects.image, width, height))
    }
}
