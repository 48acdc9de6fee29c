use anyhow::{Context, Result};
use evdev::{Device, InputEventKind, Key};
use smithay_client_toolkit::reexports::{
    calloop::{
        EventLoop, LoopHandle, RegistrationToken,
        channel::{self, Sender},
        timer::{TimeoutAction, Timer},
    },
    calloop_wayland_source::WaylandSource,
};
use std::{
    io::{Read, Write},
    os::unix::net::{UnixListener, UnixStream},
    path::{Path, PathBuf},
    thread,
    time::Duration,
};
use tracing::{debug, error, info, warn};
use wayland_client::{Connection, QueueHandle};

use crate::backend::HyprlandBackend;
use crate::config::{self, Config, POLL_INTERVAL};
use crate::dispatcher::Dispatcher;
use crate::preview::{Effect, TimerId};
use crate::provider::Provider;
use crate::surface::{PreviewSurface, SurfaceInput};
use crate::types::{BackendKind, Point};
use crate::watcher::ConfigWatcher;

const SOCKET_NAME: &str = "dockpeek.sock";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DaemonMsg {
    ButtonPressed,
    ConfigChanged,
    Quit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Command {
    Ping,
    Quit,
}

impl Command {
    fn parse(text: &str) -> Option<Self> {
        match text.trim() {
            "ping" => Some(Command::Ping),
            "quit" => Some(Command::Quit),
            _ => None,
        }
    }
}

struct Daemon {
    config_path: PathBuf,
    config: Config,
    dispatcher: Dispatcher<HyprlandBackend>,
    surface: PreviewSurface,
    qh: QueueHandle<PreviewSurface>,
    handle: LoopHandle<'static, Daemon>,
    hide_timer: Option<(TimerId, RegistrationToken)>,
    running: bool,
}

pub fn run_daemon(backend: BackendKind) -> Result<()> {
    let socket_path = runtime_socket_path(SOCKET_NAME);
    let listener = bind_listener(&socket_path)?;

    let config_path = config::config_path().context("locate config file")?;
    let config = config::load_or_create(&config_path)
        .with_context(|| format!("load {}", config_path.display()))?;
    let palette = config.theme.palette().context("read theme colors")?;

    let provider = match backend {
        BackendKind::Hyprland => HyprlandBackend::new(&config),
    };

    let conn = Connection::connect_to_env().context("connect to Wayland")?;
    let (surface, event_queue) = PreviewSurface::new(&conn, palette)?;
    let qh = event_queue.handle();

    let mut event_loop: EventLoop<'static, Daemon> =
        EventLoop::try_new().context("create event loop")?;
    let handle = event_loop.handle();

    handle
        .insert_source(
            WaylandSource::new(conn, event_queue),
            |_, queue, daemon: &mut Daemon| {
                let dispatched = queue.dispatch_pending(&mut daemon.surface);
                daemon.drain_surface_inputs();
                dispatched
            },
        )
        .map_err(|e| anyhow::anyhow!("insert wayland source: {}", e.error))?;

    handle
        .insert_source(Timer::from_duration(POLL_INTERVAL), |_, _, daemon| {
            daemon.poll();
            TimeoutAction::ToDuration(POLL_INTERVAL)
        })
        .map_err(|e| anyhow::anyhow!("insert poll timer: {}", e.error))?;

    let (tx, rx) = channel::channel::<DaemonMsg>();
    handle
        .insert_source(rx, |event, _, daemon| {
            if let channel::Event::Msg(msg) = event {
                daemon.on_message(msg);
            }
        })
        .map_err(|e| anyhow::anyhow!("insert message channel: {}", e.error))?;

    let socket_tx = tx.clone();
    spawn_socket_listener(listener, move |msg| socket_tx.send(msg).is_ok());
    spawn_evdev_listener(tx.clone());
    let watcher_tx = tx.clone();
    let _watcher = ConfigWatcher::new(&config_path, move || {
        let _ = watcher_tx.send(DaemonMsg::ConfigChanged);
    });

    let mut daemon = Daemon {
        config_path,
        config,
        dispatcher: Dispatcher::new(provider),
        surface,
        qh,
        handle,
        hide_timer: None,
        running: true,
    };

    info!(event = "daemon.started", ?backend, socket = %socket_path.display());
    while daemon.running {
        event_loop
            .dispatch(None, &mut daemon)
            .context("dispatch event loop")?;
    }

    let _ = std::fs::remove_file(&socket_path);
    info!(event = "daemon.stopped");
    Ok(())
}

impl Daemon {
    fn poll(&mut self) {
        let effects = self.dispatcher.poll(&self.config);
        self.apply(effects);
    }

    fn on_message(&mut self, msg: DaemonMsg) {
        match msg {
            DaemonMsg::ButtonPressed => {
                if !self.dispatcher.state().is_visible() {
                    return;
                }
                let point = match self.dispatcher.provider().pointer_position() {
                    Ok(point) => point,
                    Err(e) => {
                        debug!(event = "daemon.click.pointer_failed", error = %e);
                        return;
                    }
                };
                let effects = self.dispatcher.on_global_pointer_down(point, &self.config);
                self.apply(effects);
            }
            DaemonMsg::ConfigChanged => {
                self.config = config::reload(&self.config_path, &self.config);
                self.dispatcher.provider_mut().reconfigure(&self.config);
                if let Ok(palette) = self.config.theme.palette() {
                    self.surface.set_palette(palette);
                }
            }
            DaemonMsg::Quit => {
                info!(event = "daemon.quit_requested");
                self.surface.hide();
                self.running = false;
            }
        }
    }

    fn drain_surface_inputs(&mut self) {
        for input in self.surface.take_inputs() {
            let effects = match input {
                SurfaceInput::Entered => self.dispatcher.on_pointer_entered(&self.config),
                SurfaceInput::Left => self.dispatcher.on_pointer_left(&self.config),
                SurfaceInput::Motion(point) => {
                    self.dispatcher.on_pointer_motion(point, &self.config)
                }
                SurfaceInput::Press(point) => self.dispatcher.on_surface_click(point, &self.config),
                SurfaceInput::Closed => self.dispatcher.on_surface_closed(&self.config),
            };
            self.apply(effects);
        }
    }

    fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Show(frame) => {
                    let origin = self
                        .dispatcher
                        .provider()
                        .focused_monitor_origin()
                        .unwrap_or_else(|e| {
                            warn!(event = "daemon.monitor.origin_failed", error = %e);
                            Point::default()
                        });
                    if let Some(session) = self.dispatcher.state().session() {
                        info!(
                            event = "daemon.preview.shown",
                            owner = session.owner(),
                            pid = session.pid(),
                            windows = session.thumbnails().len()
                        );
                    }
                    self.surface.show(frame, origin, &self.qh);
                }
                Effect::Redraw(frame) => {
                    if let Some(session) = self.dispatcher.state().session() {
                        debug!(
                            event = "daemon.preview.hover_changed",
                            hover = ?session.hover_index(),
                            close_hover = ?session.close_hover_index()
                        );
                    }
                    self.surface.redraw(frame, &self.qh);
                }
                Effect::Hide => self.surface.hide(),
                Effect::ArmHideTimer { timer, delay } => self.arm_hide_timer(timer, delay),
                Effect::CancelHideTimer(timer) => self.cancel_hide_timer(timer),
                Effect::Raise { .. } | Effect::Close { .. } => {
                    debug!(event = "daemon.effect.unexpected", ?effect);
                }
            }
        }
    }

    fn arm_hide_timer(&mut self, timer: TimerId, delay: Duration) {
        if let Some((previous, token)) = self.hide_timer.take() {
            self.handle.remove(token);
            debug!(event = "daemon.timer.replaced", previous, timer);
        }
        let inserted = self
            .handle
            .insert_source(Timer::from_duration(delay), move |_, _, daemon| {
                daemon.hide_timer.take_if(|(id, _)| *id == timer);
                let effects = daemon.dispatcher.on_hide_timer(timer, &daemon.config);
                daemon.apply(effects);
                TimeoutAction::Drop
            });
        match inserted {
            Ok(token) => self.hide_timer = Some((timer, token)),
            Err(e) => error!(event = "daemon.timer.insert_failed", error = %e.error),
        }
    }

    fn cancel_hide_timer(&mut self, timer: TimerId) {
        if let Some((id, token)) = self.hide_timer.take_if(|(id, _)| *id == timer) {
            self.handle.remove(token);
            debug!(event = "daemon.timer.cancelled", timer = id);
        }
    }
}

fn runtime_socket_path(name: &str) -> PathBuf {
    let runtime_dir = std::env::var_os("XDG_RUNTIME_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/tmp"));
    runtime_dir.join(name)
}

fn bind_listener(path: &Path) -> Result<UnixListener> {
    if send_command(path, "ping").is_ok() {
        return Err(anyhow::anyhow!("dockpeek daemon already running"));
    }
    let _ = std::fs::remove_file(path);
    let listener =
        UnixListener::bind(path).with_context(|| format!("bind {}", path.display()))?;
    Ok(listener)
}

fn send_command(path: &Path, command: &str) -> Result<String> {
    let mut stream =
        UnixStream::connect(path).with_context(|| format!("connect {}", path.display()))?;
    stream
        .write_all(command.as_bytes())
        .context("write command")?;
    stream
        .shutdown(std::net::Shutdown::Write)
        .context("finish command")?;
    let mut reply = String::new();
    stream.read_to_string(&mut reply).context("read reply")?;
    Ok(reply)
}

/// Ask a running daemon to exit.
pub fn send_quit() -> Result<()> {
    let reply = send_command(&runtime_socket_path(SOCKET_NAME), "quit")
        .context("no dockpeek daemon is running")?;
    if reply != "ok" {
        return Err(anyhow::anyhow!("unexpected reply from daemon: {reply}"));
    }
    Ok(())
}

/// `forward` returns false once the event loop is gone.
fn spawn_socket_listener(
    listener: UnixListener,
    forward: impl Fn(DaemonMsg) -> bool + Send + 'static,
) {
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else {
                continue;
            };
            let mut buf = [0u8; 32];
            let len = stream.read(&mut buf).unwrap_or(0);
            let text = String::from_utf8_lossy(&buf[..len]);
            match Command::parse(&text) {
                Some(Command::Ping) => {
                    let _ = stream.write_all(b"ok");
                }
                Some(Command::Quit) => {
                    let _ = stream.write_all(b"ok");
                    if !forward(DaemonMsg::Quit) {
                        return;
                    }
                }
                None => {
                    warn!(event = "daemon.socket.unknown_command", command = %text.trim());
                    let _ = stream.write_all(b"unknown command");
                }
            }
        }
    });
}

/// Global clicks have to come from evdev: the compositor only reports
/// pointer buttons to the surface under the pointer.
fn spawn_evdev_listener(tx: Sender<DaemonMsg>) {
    let devices = enumerate_pointers();
    if devices.is_empty() {
        warn!(
            event = "daemon.evdev.no_devices",
            "No readable pointer devices; clicks outside the preview will not dismiss it"
        );
        return;
    }
    for (path, mut device) in devices {
        let tx = tx.clone();
        debug!(event = "daemon.evdev.listening", path = %path.display());
        thread::spawn(move || {
            loop {
                let events = match device.fetch_events() {
                    Ok(events) => events,
                    Err(e) => {
                        warn!(event = "daemon.evdev.read_failed", path = %path.display(), error = %e);
                        return;
                    }
                };
                for ev in events {
                    if let InputEventKind::Key(Key::BTN_LEFT) = ev.kind() {
                        if ev.value() == 1 && tx.send(DaemonMsg::ButtonPressed).is_err() {
                            return;
                        }
                    }
                }
            }
        });
    }
}

fn enumerate_pointers() -> Vec<(PathBuf, Device)> {
    evdev::enumerate()
        .filter(|(_, device)| {
            device
                .supported_keys()
                .is_some_and(|keys| keys.contains(Key::BTN_LEFT))
        })
        .collect()
}
