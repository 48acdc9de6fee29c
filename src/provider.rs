use crate::types::{DockItem, Pid, Point, Size, WindowHandle, WindowId};

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Failed to run '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{command}' exited with an error: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("Failed to parse output of '{command}': {message}")]
    Parse { command: String, message: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ElementKind {
    DockItem,
    Other,
}

/// Whatever sits under a screen point.
#[derive(Clone, Debug, PartialEq)]
pub struct ScreenElement {
    pub kind: ElementKind,
    pub title: String,
    pub running: bool,
    pub position: Point,
    pub size: Size,
}

impl ScreenElement {
    pub fn into_dock_item(self) -> Option<DockItem> {
        match self.kind {
            ElementKind::DockItem => Some(DockItem {
                title: self.title,
                running: self.running,
                position: self.position,
                size: self.size,
            }),
            ElementKind::Other => None,
        }
    }
}

/// Raw 32-bit BGRA pixels, top row first.
#[derive(Clone, Debug, PartialEq)]
pub struct CapturedImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WindowAction {
    Raise,
    Close,
}

/// Access to the windowing system.
///
/// Implementations talk to the compositor. Everything above this trait is
/// platform independent.
pub trait Provider {
    fn pointer_position(&self) -> Result<Point, ProviderError>;

    fn element_at_position(&self, point: Point) -> Result<Option<ScreenElement>, ProviderError>;

    /// All windows, in the compositor's enumeration order.
    fn list_windows(&self) -> Result<Vec<WindowHandle>, ProviderError>;

    /// `None` when the window cannot be captured right now.
    fn capture_window_image(&self, window_id: WindowId) -> Option<CapturedImage>;

    fn is_standard_window(&self, pid: Pid, window_id: WindowId) -> bool;

    fn perform_window_action(
        &self,
        pid: Pid,
        window_id: WindowId,
        action: WindowAction,
    ) -> Result<(), ProviderError>;
}
