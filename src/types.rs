use std::sync::Arc;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug)]
pub enum BackendKind {
    Hyprland,
}

pub type WindowId = u64;
pub type Pid = libc::pid_t;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn from_parts(position: Point, size: Size) -> Self {
        Self::new(position.x, position.y, size.width, size.height)
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Half-open containment, so adjacent rects never both claim an edge.
    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.x && point.x < self.right() && point.y >= self.y && point.y < self.bottom()
    }
}

/// Where the dock sits on screen. Decides which way the preview grows.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Bottom,
    Left,
    Right,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitMode {
    #[default]
    Fill,
    Fit,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DockItem {
    pub title: String,
    pub running: bool,
    pub position: Point,
    pub size: Size,
}

impl DockItem {
    pub fn rect(&self) -> Rect {
        Rect::from_parts(self.position, self.size)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct WindowHandle {
    pub id: WindowId,
    pub owner_name: String,
    pub title: String,
    pub pid: Pid,
    /// Window-server layer, when the provider reports one.
    pub layer: Option<i32>,
    pub is_standard: bool,
}

impl WindowHandle {
    /// Caption text; falls back to the owner when the window has no title.
    pub fn display_name(&self) -> &str {
        if self.title.is_empty() {
            &self.owner_name
        } else {
            &self.title
        }
    }
}

#[derive(Clone, Debug)]
pub struct Thumbnail {
    pub window_id: WindowId,
    pub display_name: String,
    pub pixel_width: u32,
    pub pixel_height: u32,
    pub encoded: Arc<[u8]>,
}
