use anyhow::{Context, Result};
use smithay_client_toolkit::{
    compositor::{CompositorHandler, CompositorState},
    delegate_compositor, delegate_layer, delegate_output, delegate_pointer, delegate_registry,
    delegate_seat, delegate_shm,
    output::{OutputHandler, OutputState},
    registry::{ProvidesRegistryState, RegistryState},
    registry_handlers,
    seat::{
        Capability, SeatHandler, SeatState,
        pointer::{PointerEvent, PointerEventKind, PointerHandler},
    },
    shell::{
        WaylandSurface,
        wlr_layer::{
            Anchor, KeyboardInteractivity, Layer, LayerShell, LayerShellHandler, LayerSurface,
            LayerSurfaceConfigure,
        },
    },
    shm::{Shm, ShmHandler, slot::SlotPool},
};
use tiny_skia::PixmapMut;
use tracing::{debug, warn};
use wayland_client::{
    Connection, EventQueue, QueueHandle,
    globals::registry_queue_init,
    protocol::{wl_output, wl_pointer, wl_seat, wl_shm, wl_surface},
};

use crate::config::Palette;
use crate::frame::Frame;
use crate::paint::{Painter, swizzle_rgba_to_bgra};
use crate::types::Point;

const BTN_LEFT: u32 = 0x110;
const NAMESPACE: &str = "dockpeek";

/// Pointer input on the preview surface, in surface-local coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SurfaceInput {
    Entered,
    Left,
    Motion(Point),
    Press(Point),
    /// The compositor closed the layer surface.
    Closed,
}

/// The preview overlay. The layer surface only exists while a frame is
/// shown; hiding destroys it.
pub struct PreviewSurface {
    registry_state: RegistryState,
    seat_state: SeatState,
    output_state: OutputState,
    compositor: CompositorState,
    layer_shell: LayerShell,
    shm: Shm,
    pool: Option<SlotPool>,
    layer: Option<LayerSurface>,
    pointer: Option<wl_pointer::WlPointer>,
    frame: Option<Frame>,
    buffer_scale: u32,
    configured: bool,
    dirty: bool,
    frame_pending: bool,
    painter: Painter,
    inputs: Vec<SurfaceInput>,
}

impl PreviewSurface {
    pub fn new(conn: &Connection, palette: Palette) -> Result<(Self, EventQueue<Self>)> {
        let (globals, event_queue) = registry_queue_init::<Self>(conn).context("init registry")?;
        let qh = event_queue.handle();

        let compositor =
            CompositorState::bind(&globals, &qh).context("wl_compositor not available")?;
        let layer_shell = LayerShell::bind(&globals, &qh).context("layer shell not available")?;
        let shm = Shm::bind(&globals, &qh).context("wl_shm not available")?;

        let surface = Self {
            registry_state: RegistryState::new(&globals),
            seat_state: SeatState::new(&globals, &qh),
            output_state: OutputState::new(&globals, &qh),
            compositor,
            layer_shell,
            shm,
            pool: None,
            layer: None,
            pointer: None,
            frame: None,
            buffer_scale: 1,
            configured: false,
            dirty: false,
            frame_pending: false,
            painter: Painter::new(palette),
            inputs: Vec::new(),
        };
        Ok((surface, event_queue))
    }

    pub fn set_palette(&mut self, palette: Palette) {
        self.painter.set_palette(palette);
        self.dirty = true;
    }

    /// Map the surface for `frame`, or move and resize it if already mapped.
    /// `origin` is the top-left corner of the output the surface lands on.
    pub fn show(&mut self, frame: Frame, origin: Point, qh: &QueueHandle<Self>) {
        let (width, height) = logical_size(&frame);
        self.painter.clear_images();

        let layer = match self.layer.take() {
            Some(layer) => {
                if resized(self.frame.as_ref(), &frame) {
                    // the old buffer size is stale until the compositor acks the new one
                    self.configured = false;
                    debug!(event = "surface.layer.resized", width, height);
                }
                layer
            }
            None => {
                let surface = self.compositor.create_surface(qh);
                let layer = self.layer_shell.create_layer_surface(
                    qh,
                    surface,
                    Layer::Overlay,
                    Some(NAMESPACE),
                    None,
                );
                layer.set_anchor(Anchor::TOP | Anchor::LEFT);
                layer.set_keyboard_interactivity(KeyboardInteractivity::None);
                layer.set_exclusive_zone(-1);
                if self.buffer_scale > 1 {
                    layer.wl_surface().set_buffer_scale(self.buffer_scale as i32);
                }
                self.configured = false;
                self.frame_pending = false;
                debug!(event = "surface.layer.created", width, height);
                layer
            }
        };
        layer.set_size(width, height);
        let top = (frame.surface.y - origin.y).round() as i32;
        let left = (frame.surface.x - origin.x).round() as i32;
        layer.set_margin(top, 0, 0, left);
        layer.commit();
        self.layer = Some(layer);
        self.frame = Some(frame);
        self.dirty = true;
        self.draw_if_ready(qh);
    }

    pub fn redraw(&mut self, frame: Frame, qh: &QueueHandle<Self>) {
        if self.layer.is_none() {
            return;
        }
        self.frame = Some(frame);
        self.dirty = true;
        self.draw_if_ready(qh);
    }

    pub fn hide(&mut self) {
        if self.layer.take().is_some() {
            debug!(event = "surface.layer.destroyed");
        }
        self.frame = None;
        self.configured = false;
        self.dirty = false;
        self.frame_pending = false;
    }

    pub fn take_inputs(&mut self) -> Vec<SurfaceInput> {
        std::mem::take(&mut self.inputs)
    }

    fn draw_if_ready(&mut self, qh: &QueueHandle<Self>) {
        if self.configured && self.dirty && !self.frame_pending {
            self.draw(qh);
        }
    }

    fn draw(&mut self, qh: &QueueHandle<Self>) {
        let (Some(layer), Some(frame)) = (self.layer.as_ref(), self.frame.as_ref()) else {
            return;
        };
        let (width, height) = logical_size(frame);
        let buffer_width = width * self.buffer_scale;
        let buffer_height = height * self.buffer_scale;
        let stride = buffer_width as i32 * 4;
        let needed = (buffer_width * buffer_height * 4) as usize;

        if self.pool.is_none() {
            match SlotPool::new(needed, &self.shm) {
                Ok(pool) => self.pool = Some(pool),
                Err(e) => {
                    warn!(event = "surface.pool.create_failed", error = %e);
                    return;
                }
            }
        }
        let Some(pool) = self.pool.as_mut() else {
            return;
        };
        if pool.len() < needed {
            if let Err(e) = pool.resize(needed) {
                warn!(event = "surface.pool.resize_failed", error = %e);
                return;
            }
        }

        let (buffer, canvas) = match pool.create_buffer(
            buffer_width as i32,
            buffer_height as i32,
            stride,
            wl_shm::Format::Argb8888,
        ) {
            Ok(created) => created,
            Err(e) => {
                warn!(event = "surface.buffer.create_failed", error = %e);
                return;
            }
        };

        {
            let Some(mut pixmap) = PixmapMut::from_bytes(canvas, buffer_width, buffer_height)
            else {
                warn!(event = "surface.buffer.pixmap_failed", buffer_width, buffer_height);
                return;
            };
            self.painter.paint(frame, &mut pixmap, self.buffer_scale as f32);
        }
        swizzle_rgba_to_bgra(canvas);

        let surface = layer.wl_surface();
        surface.damage_buffer(0, 0, buffer_width as i32, buffer_height as i32);
        surface.frame(qh, surface.clone());
        if let Err(e) = buffer.attach_to(surface) {
            warn!(event = "surface.buffer.attach_failed", error = %e);
            return;
        }
        layer.commit();
        self.dirty = false;
        self.frame_pending = true;
    }
}

fn logical_size(frame: &Frame) -> (u32, u32) {
    (
        frame.surface.width.ceil().max(1.0) as u32,
        frame.surface.height.ceil().max(1.0) as u32,
    )
}

fn resized(previous: Option<&Frame>, next: &Frame) -> bool {
    previous.is_none_or(|previous| logical_size(previous) != logical_size(next))
}

impl CompositorHandler for PreviewSurface {
    fn scale_factor_changed(
        &mut self,
        _conn: &Connection,
        qh: &QueueHandle<Self>,
        surface: &wl_surface::WlSurface,
        new_factor: i32,
    ) {
        let scale = new_factor.max(1) as u32;
        if scale != self.buffer_scale {
            self.buffer_scale = scale;
            surface.set_buffer_scale(scale as i32);
            self.dirty = true;
            self.draw_if_ready(qh);
        }
    }

    fn transform_changed(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _new_transform: wl_output::Transform,
    ) {
    }

    fn frame(
        &mut self,
        _conn: &Connection,
        qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _time: u32,
    ) {
        self.frame_pending = false;
        self.draw_if_ready(qh);
    }

    fn surface_enter(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _output: &wl_output::WlOutput,
    ) {
    }

    fn surface_leave(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _output: &wl_output::WlOutput,
    ) {
    }
}

impl OutputHandler for PreviewSurface {
    fn output_state(&mut self) -> &mut OutputState {
        &mut self.output_state
    }

    fn new_output(&mut self, _conn: &Connection, _qh: &QueueHandle<Self>, _output: wl_output::WlOutput) {}

    fn update_output(&mut self, _conn: &Connection, _qh: &QueueHandle<Self>, _output: wl_output::WlOutput) {}

    fn output_destroyed(&mut self, _conn: &Connection, _qh: &QueueHandle<Self>, _output: wl_output::WlOutput) {}
}

impl LayerShellHandler for PreviewSurface {
    fn closed(&mut self, _conn: &Connection, _qh: &QueueHandle<Self>, _layer: &LayerSurface) {
        debug!(event = "surface.layer.closed_by_compositor");
        self.hide();
        self.inputs.push(SurfaceInput::Closed);
    }

    fn configure(
        &mut self,
        _conn: &Connection,
        qh: &QueueHandle<Self>,
        _layer: &LayerSurface,
        _configure: LayerSurfaceConfigure,
        _serial: u32,
    ) {
        self.configured = true;
        self.dirty = true;
        self.frame_pending = false;
        self.draw_if_ready(qh);
    }
}

impl SeatHandler for PreviewSurface {
    fn seat_state(&mut self) -> &mut SeatState {
        &mut self.seat_state
    }

    fn new_seat(&mut self, _conn: &Connection, _qh: &QueueHandle<Self>, _seat: wl_seat::WlSeat) {}

    fn new_capability(
        &mut self,
        _conn: &Connection,
        qh: &QueueHandle<Self>,
        seat: wl_seat::WlSeat,
        capability: Capability,
    ) {
        if capability == Capability::Pointer && self.pointer.is_none() {
            match self.seat_state.get_pointer(qh, &seat) {
                Ok(pointer) => self.pointer = Some(pointer),
                Err(e) => warn!(event = "surface.seat.pointer_failed", error = %e),
            }
        }
    }

    fn remove_capability(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _seat: wl_seat::WlSeat,
        capability: Capability,
    ) {
        if capability == Capability::Pointer {
            if let Some(pointer) = self.pointer.take() {
                pointer.release();
            }
        }
    }

    fn remove_seat(&mut self, _conn: &Connection, _qh: &QueueHandle<Self>, _seat: wl_seat::WlSeat) {}
}

impl PointerHandler for PreviewSurface {
    fn pointer_frame(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _pointer: &wl_pointer::WlPointer,
        events: &[PointerEvent],
    ) {
        let Some(layer) = self.layer.as_ref() else {
            return;
        };
        for event in events {
            if &event.surface != layer.wl_surface() {
                continue;
            }
            let point = Point::new(event.position.0, event.position.1);
            match event.kind {
                PointerEventKind::Enter { .. } => {
                    self.inputs.push(SurfaceInput::Entered);
                    self.inputs.push(SurfaceInput::Motion(point));
                }
                PointerEventKind::Leave { .. } => self.inputs.push(SurfaceInput::Left),
                PointerEventKind::Motion { .. } => self.inputs.push(SurfaceInput::Motion(point)),
                PointerEventKind::Press { button, .. } if button == BTN_LEFT => {
                    self.inputs.push(SurfaceInput::Press(point));
                }
                _ => {}
            }
        }
    }
}

impl ShmHandler for PreviewSurface {
    fn shm_state(&mut self) -> &mut Shm {
        &mut self.shm
    }
}

delegate_compositor!(PreviewSurface);
delegate_output!(PreviewSurface);
delegate_shm!(PreviewSurface);
delegate_seat!(PreviewSurface);
delegate_pointer!(PreviewSurface);
delegate_layer!(PreviewSurface);
delegate_registry!(PreviewSurface);

impl ProvidesRegistryState for PreviewSurface {
    fn registry(&mut self) -> &mut RegistryState {
        &mut self.registry_state
    }

    registry_handlers![OutputState, SeatState];
}
