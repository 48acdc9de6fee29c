use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Deserialize;
use tracing::debug;

use crate::config::{Config, DockSettings};
use crate::provider::{
    CapturedImage, ElementKind, Provider, ProviderError, ScreenElement, WindowAction,
};
use crate::types::{Pid, Point, Rect, Size, WindowHandle, WindowId};

#[derive(Clone, Debug, Deserialize)]
struct HyprClient {
    address: Option<String>,
    class: Option<String>,
    #[serde(rename = "initialClass")]
    initial_class: Option<String>,
    title: Option<String>,
    pid: Option<Pid>,
    mapped: Option<bool>,
    hidden: Option<bool>,
    at: Option<[i32; 2]>,
    size: Option<[i32; 2]>,
    workspace: Option<HyprWorkspaceRef>,
}

#[derive(Clone, Debug, Deserialize)]
struct HyprWorkspaceRef {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct HyprMonitor {
    focused: Option<bool>,
    x: Option<i32>,
    y: Option<i32>,
    #[serde(rename = "activeWorkspace")]
    active_workspace: Option<HyprWorkspaceRef>,
    #[serde(rename = "specialWorkspace")]
    special_workspace: Option<HyprWorkspaceRef>,
}

#[derive(Debug, Deserialize)]
struct HyprCursor {
    x: f64,
    y: f64,
}

#[derive(Debug, Deserialize)]
struct HyprLayerOutput {
    levels: HashMap<String, Vec<HyprLayer>>,
}

#[derive(Debug, Deserialize)]
struct HyprLayer {
    x: i32,
    y: i32,
    w: i32,
    h: i32,
    namespace: String,
}

/// A client as we keep it between calls: the public handle plus what the
/// capture path needs.
#[derive(Clone, Debug)]
struct ClientRecord {
    handle: WindowHandle,
    geometry: Rect,
    workspace: Option<i64>,
}

fn parse_hypr_address(value: &str) -> Option<u64> {
    let trimmed = value.trim().trim_start_matches("0x");
    u64::from_str_radix(trimmed, 16).ok()
}

fn client_record(client: HyprClient) -> Option<ClientRecord> {
    let id = parse_hypr_address(client.address.as_deref()?)?;
    let owner_name = client
        .initial_class
        .filter(|c| !c.is_empty())
        .or(client.class)
        .unwrap_or_default();
    let [x, y] = client.at.unwrap_or([0, 0]);
    let [width, height] = client.size.unwrap_or([0, 0]);
    let is_standard = client.mapped != Some(false)
        && client.hidden != Some(true)
        && width > 0
        && height > 0;
    Some(ClientRecord {
        handle: WindowHandle {
            id,
            owner_name,
            title: client.title.unwrap_or_default(),
            pid: client.pid.unwrap_or(-1),
            layer: None,
            is_standard,
        },
        geometry: Rect::new(x as f64, y as f64, width as f64, height as f64),
        workspace: client.workspace.map(|w| w.id),
    })
}

fn hyprctl(program: &Path, args: &[&str]) -> Result<String, ProviderError> {
    let command = format!("hyprctl {}", args.join(" "));
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|source| ProviderError::Spawn {
            command: command.clone(),
            source,
        })?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(ProviderError::CommandFailed { command, stderr });
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

fn hyprctl_json<T: for<'de> Deserialize<'de>>(
    program: &Path,
    args: &[&str],
) -> Result<T, ProviderError> {
    let text = hyprctl(program, args)?;
    serde_json::from_str(&text).map_err(|e| ProviderError::Parse {
        command: format!("hyprctl {}", args.join(" ")),
        message: e.to_string(),
    })
}

/// Screen rect of the `index`th of `count` items packed along the dock.
fn dock_slot(dock: Rect, count: usize, index: usize) -> Rect {
    let n = count as f64;
    if dock.width >= dock.height {
        let step = dock.width / n;
        Rect::new(dock.x + step * index as f64, dock.y, step, dock.height)
    } else {
        let step = dock.height / n;
        Rect::new(dock.x, dock.y + step * index as f64, dock.width, step)
    }
}

fn dock_index_at(dock: Rect, count: usize, point: Point) -> Option<usize> {
    if count == 0 || !dock.contains(point) {
        return None;
    }
    let (offset, extent) = if dock.width >= dock.height {
        (point.x - dock.x, dock.width)
    } else {
        (point.y - dock.y, dock.height)
    };
    let index = (offset / (extent / count as f64)).floor() as usize;
    Some(index.min(count - 1))
}

/// Window provider for Hyprland, driven through `hyprctl` and `grim`.
pub struct HyprlandBackend {
    dock: DockSettings,
    clients: RefCell<Vec<ClientRecord>>,
    hyprctl: PathBuf,
}

impl HyprlandBackend {
    pub fn new(config: &Config) -> Self {
        Self::with_hyprctl(config, PathBuf::from("hyprctl"))
    }

    fn with_hyprctl(config: &Config, hyprctl: PathBuf) -> Self {
        Self {
            dock: config.dock.clone(),
            clients: RefCell::new(Vec::new()),
            hyprctl,
        }
    }

    pub fn reconfigure(&mut self, config: &Config) {
        self.dock = config.dock.clone();
    }

    /// Top-left corner of the focused monitor in layout coordinates.
    pub fn focused_monitor_origin(&self) -> Result<Point, ProviderError> {
        let monitors = hyprctl_json::<Vec<HyprMonitor>>(&self.hyprctl, &["-j", "monitors"])?;
        let origin = monitors
            .into_iter()
            .find(|m| m.focused.unwrap_or(false))
            .map(|m| Point::new(m.x.unwrap_or(0) as f64, m.y.unwrap_or(0) as f64))
            .unwrap_or_default();
        Ok(origin)
    }

    fn refresh_clients(&self) -> Result<Vec<ClientRecord>, ProviderError> {
        let clients = hyprctl_json::<Vec<HyprClient>>(&self.hyprctl, &["-j", "clients"])?;
        let records: Vec<ClientRecord> = clients.into_iter().filter_map(client_record).collect();
        *self.clients.borrow_mut() = records.clone();
        Ok(records)
    }

    fn find_client(&self, window_id: WindowId) -> Option<ClientRecord> {
        let cached = self
            .clients
            .borrow()
            .iter()
            .find(|c| c.handle.id == window_id)
            .cloned();
        cached.or_else(|| {
            self.refresh_clients()
                .ok()?
                .into_iter()
                .find(|c| c.handle.id == window_id)
        })
    }

    fn dock_rect(&self) -> Result<Option<Rect>, ProviderError> {
        let outputs =
            hyprctl_json::<HashMap<String, HyprLayerOutput>>(&self.hyprctl, &["-j", "layers"])?;
        let rect = outputs
            .into_values()
            .flat_map(|output| output.levels.into_values().flatten())
            .find(|layer| layer.namespace == self.dock.namespace)
            .map(|layer| Rect::new(layer.x as f64, layer.y as f64, layer.w as f64, layer.h as f64));
        Ok(rect)
    }

    fn workspace_visible(&self, workspace: i64) -> Result<bool, ProviderError> {
        let monitors = hyprctl_json::<Vec<HyprMonitor>>(&self.hyprctl, &["-j", "monitors"])?;
        Ok(monitors.iter().any(|m| {
            m.active_workspace.as_ref().is_some_and(|w| w.id == workspace)
                || m.special_workspace.as_ref().is_some_and(|w| w.id == workspace)
        }))
    }
}

fn grim_capture(geometry: Rect) -> Option<CapturedImage> {
    let region = format!(
        "{},{} {}x{}",
        geometry.x as i32, geometry.y as i32, geometry.width as i32, geometry.height as i32
    );
    let output = match Command::new("grim").args(["-g", &region, "-"]).output() {
        Ok(output) => output,
        Err(e) => {
            debug!(event = "backend.grim.spawn_failed", error = %e);
            return None;
        }
    };
    if !output.status.success() {
        debug!(
            event = "backend.grim.failed",
            region,
            stderr = %String::from_utf8_lossy(&output.stderr).trim()
        );
        return None;
    }
    let decoded = image::load_from_memory_with_format(&output.stdout, image::ImageFormat::Png)
        .map_err(|e| debug!(event = "backend.grim.decode_failed", error = %e))
        .ok()?;
    let rgba = decoded.to_rgba8();
    let (width, height) = rgba.dimensions();
    let mut pixels = rgba.into_raw();
    crate::paint::swizzle_rgba_to_bgra(&mut pixels);
    Some(CapturedImage {
        width,
        height,
        pixels,
    })
}

impl Provider for HyprlandBackend {
    fn pointer_position(&self) -> Result<Point, ProviderError> {
        let cursor = hyprctl_json::<HyprCursor>(&self.hyprctl, &["-j", "cursorpos"])?;
        Ok(Point::new(cursor.x, cursor.y))
    }

    fn element_at_position(&self, point: Point) -> Result<Option<ScreenElement>, ProviderError> {
        let Some(dock) = self.dock_rect()? else {
            return Ok(None);
        };
        if !dock.contains(point) {
            return Ok(None);
        }
        let count = self.dock.items.len();
        let Some(index) = dock_index_at(dock, count, point) else {
            return Ok(Some(ScreenElement {
                kind: ElementKind::Other,
                title: self.dock.namespace.clone(),
                running: false,
                position: Point::new(dock.x, dock.y),
                size: Size {
                    width: dock.width,
                    height: dock.height,
                },
            }));
        };

        // Whether the item has windows is settled when the hover is resolved,
        // so the per-tick hit-test stays at a single layers query.
        let title = self.dock.items[index].clone();
        let slot = dock_slot(dock, count, index);
        Ok(Some(ScreenElement {
            kind: ElementKind::DockItem,
            title,
            running: true,
            position: Point::new(slot.x, slot.y),
            size: Size {
                width: slot.width,
                height: slot.height,
            },
        }))
    }

    fn list_windows(&self) -> Result<Vec<WindowHandle>, ProviderError> {
        Ok(self
            .refresh_clients()?
            .into_iter()
            .map(|c| c.handle)
            .collect())
    }

    fn capture_window_image(&self, window_id: WindowId) -> Option<CapturedImage> {
        let client = self.find_client(window_id)?;
        let workspace = client.workspace?;
        match self.workspace_visible(workspace) {
            Ok(true) => {}
            Ok(false) => {
                debug!(event = "backend.capture.offscreen", window_id, workspace);
                return None;
            }
            Err(e) => {
                debug!(event = "backend.capture.monitors_failed", error = %e);
                return None;
            }
        }
        grim_capture(client.geometry)
    }

    fn is_standard_window(&self, _pid: Pid, window_id: WindowId) -> bool {
        self.clients
            .borrow()
            .iter()
            .any(|c| c.handle.id == window_id && c.handle.is_standard)
    }

    fn perform_window_action(
        &self,
        _pid: Pid,
        window_id: WindowId,
        action: WindowAction,
    ) -> Result<(), ProviderError> {
        let dispatcher = match action {
            WindowAction::Raise => "focuswindow",
            WindowAction::Close => "closewindow",
        };
        let addr = format!("address:0x{window_id:x}");
        hyprctl(&self.hyprctl, &["dispatch", dispatcher, &addr])?;
        Ok(())
    }
}
