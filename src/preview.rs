//! Show/hide state of the preview surface.
//!
//! Transitions are pure: `PreviewState::transition` consumes the current
//! state and an event and returns the next state plus the effects the caller
//! must carry out (native window actions, surface updates, timer changes).
//! `PreviewEngine` is the thin owner that threads state and timer ids between
//! calls.

use std::time::Duration;

use tracing::debug;

use crate::config::{HIDE_DELAY, LayoutSettings};
use crate::frame::Frame;
use crate::geometry::{self, PreviewLayout};
use crate::types::{DockItem, Pid, Point, Rect, Thumbnail, WindowId};

pub type TimerId = u64;

#[derive(Clone, Debug)]
pub struct PreviewSession {
    owner: String,
    pid: Pid,
    dock_item: Rect,
    thumbnails: Vec<Thumbnail>,
    layout: PreviewLayout,
    hover_index: Option<usize>,
    close_hover_index: Option<usize>,
    pointer: Option<Point>,
}

impl PreviewSession {
    fn new(
        owner: String,
        pid: Pid,
        dock_item: Rect,
        thumbnails: Vec<Thumbnail>,
        settings: LayoutSettings,
    ) -> Self {
        let layout = geometry::layout(settings.dock, settings.preview, dock_item, thumbnails.len());
        Self {
            owner,
            pid,
            dock_item,
            thumbnails,
            layout,
            hover_index: None,
            close_hover_index: None,
            pointer: None,
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn thumbnails(&self) -> &[Thumbnail] {
        &self.thumbnails
    }

    pub fn layout(&self) -> &PreviewLayout {
        &self.layout
    }

    pub fn hover_index(&self) -> Option<usize> {
        self.hover_index
    }

    pub fn close_hover_index(&self) -> Option<usize> {
        self.close_hover_index
    }

    pub fn frame(&self) -> Frame {
        Frame::build(
            &self.layout,
            &self.thumbnails,
            self.hover_index,
            self.close_hover_index,
        )
    }

    /// Recompute hover indices from the last pointer position. Returns true
    /// when they changed.
    fn track_pointer(&mut self, pointer: Option<Point>) -> bool {
        self.pointer = pointer;
        let hover = pointer.and_then(|p| self.layout.index_at(p));
        let close_hover = pointer.and_then(|p| self.layout.close_index_at(p));
        let changed = hover != self.hover_index || close_hover != self.close_hover_index;
        self.hover_index = hover;
        self.close_hover_index = close_hover;
        changed
    }

    /// Drop one window and lay the rest out again around the same dock item.
    fn remove(&mut self, index: usize) -> Thumbnail {
        let removed = self.thumbnails.remove(index);
        self.layout = geometry::layout(
            self.layout.orientation,
            self.layout.fit,
            self.dock_item,
            self.thumbnails.len(),
        );
        self.track_pointer(self.pointer);
        removed
    }
}

#[derive(Clone, Debug)]
pub enum PreviewState {
    /// Nothing shown. `last_owner` remembers an owner that had nothing to
    /// preview so hovering it again is not re-resolved.
    Idle { last_owner: Option<String> },
    Showing(PreviewSession),
    HidePending {
        session: PreviewSession,
        timer: TimerId,
    },
}

impl Default for PreviewState {
    fn default() -> Self {
        PreviewState::Idle { last_owner: None }
    }
}

/// Outcome of resolving a hovered dock item.
#[derive(Clone, Debug)]
pub enum Resolution {
    Windows {
        pid: Pid,
        dock_item: DockItem,
        thumbnails: Vec<Thumbnail>,
    },
    /// Not running, no eligible windows, or no window could be captured.
    Nothing,
}

#[derive(Clone, Debug)]
pub enum Event {
    HoverItem { owner: String, resolution: Resolution },
    /// The pointer is over the dock item of the owner already tracked.
    HoverTracked,
    HoverOutsideDock,
    PointerEntered,
    PointerLeft,
    /// Pointer motion in surface-local coordinates.
    PointerMoved(Point),
    SurfaceClick(Point),
    /// A click outside the preview that did not land on a dock item.
    DismissClick,
    /// The compositor destroyed the surface on its own.
    SurfaceClosed,
    HideTimerFired(TimerId),
}

#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
    /// Map (or re-map with new geometry) the surface.
    Show(Frame),
    /// Same geometry, new highlight state.
    Redraw(Frame),
    Hide,
    ArmHideTimer { timer: TimerId, delay: Duration },
    CancelHideTimer(TimerId),
    Raise { pid: Pid, window_id: WindowId },
    Close { pid: Pid, window_id: WindowId },
}

fn hide_from(state: PreviewState, effects: &mut Vec<Effect>) -> PreviewState {
    match state {
        PreviewState::Idle { .. } => {}
        PreviewState::Showing(session) => {
            debug!(event = "preview.session.hidden", owner = %session.owner);
            effects.push(Effect::Hide);
        }
        PreviewState::HidePending { session, timer } => {
            debug!(event = "preview.session.hidden", owner = %session.owner);
            effects.push(Effect::CancelHideTimer(timer));
            effects.push(Effect::Hide);
        }
    }
    PreviewState::Idle { last_owner: None }
}

impl PreviewState {
    pub fn session(&self) -> Option<&PreviewSession> {
        match self {
            PreviewState::Idle { .. } => None,
            PreviewState::Showing(session) | PreviewState::HidePending { session, .. } => {
                Some(session)
            }
        }
    }

    pub fn is_visible(&self) -> bool {
        self.session().is_some()
    }

    /// Whether hovering `owner` needs no fresh resolution.
    pub fn tracks(&self, owner: &str) -> bool {
        match self {
            PreviewState::Idle { last_owner } => last_owner.as_deref() == Some(owner),
            _ => self.session().is_some_and(|s| s.owner == owner),
        }
    }

    /// `next_timer` is the id to use if this transition arms a hide timer.
    pub fn transition(
        self,
        event: Event,
        settings: LayoutSettings,
        next_timer: TimerId,
    ) -> (PreviewState, Vec<Effect>) {
        let mut effects = Vec::new();
        let state = match (self, event) {
            (state, Event::HoverItem { owner, resolution }) => {
                let state = match state {
                    PreviewState::HidePending { session, timer } => {
                        effects.push(Effect::CancelHideTimer(timer));
                        PreviewState::Showing(session)
                    }
                    other => other,
                };
                match resolution {
                    Resolution::Windows {
                        pid,
                        dock_item,
                        thumbnails,
                    } if !thumbnails.is_empty() => {
                        let session =
                            PreviewSession::new(owner, pid, dock_item.rect(), thumbnails, settings);
                        debug!(
                            event = "preview.session.shown",
                            owner = %session.owner,
                            count = session.thumbnails.len()
                        );
                        effects.push(Effect::Show(session.frame()));
                        PreviewState::Showing(session)
                    }
                    _ => {
                        hide_from(state, &mut effects);
                        PreviewState::Idle {
                            last_owner: Some(owner),
                        }
                    }
                }
            }
            (PreviewState::HidePending { session, timer }, Event::HoverTracked)
            | (PreviewState::HidePending { session, timer }, Event::PointerEntered) => {
                effects.push(Effect::CancelHideTimer(timer));
                PreviewState::Showing(session)
            }
            (PreviewState::Showing(session), Event::HoverOutsideDock) => {
                effects.push(Effect::ArmHideTimer {
                    timer: next_timer,
                    delay: HIDE_DELAY,
                });
                PreviewState::HidePending {
                    session,
                    timer: next_timer,
                }
            }
            (PreviewState::Idle { .. }, Event::HoverOutsideDock) => {
                PreviewState::Idle { last_owner: None }
            }
            (PreviewState::Showing(mut session), Event::PointerLeft) => {
                if session.track_pointer(None) {
                    effects.push(Effect::Redraw(session.frame()));
                }
                PreviewState::Showing(session)
            }
            (PreviewState::Showing(mut session), Event::PointerMoved(point)) => {
                if session.track_pointer(Some(point)) {
                    effects.push(Effect::Redraw(session.frame()));
                }
                PreviewState::Showing(session)
            }
            (PreviewState::HidePending { mut session, timer }, Event::PointerMoved(point)) => {
                if session.track_pointer(Some(point)) {
                    effects.push(Effect::Redraw(session.frame()));
                }
                PreviewState::HidePending { session, timer }
            }
            (
                state @ (PreviewState::Showing(_) | PreviewState::HidePending { .. }),
                Event::SurfaceClick(point),
            ) => Self::click(state, point, &mut effects),
            (
                state @ (PreviewState::Showing(_) | PreviewState::HidePending { .. }),
                Event::DismissClick | Event::SurfaceClosed,
            ) => hide_from(state, &mut effects),
            (PreviewState::HidePending { session, timer }, Event::HideTimerFired(fired)) => {
                if fired == timer {
                    hide_from(PreviewState::Showing(session), &mut effects)
                } else {
                    debug!(event = "preview.timer.stale", fired, pending = timer);
                    PreviewState::HidePending { session, timer }
                }
            }
            (state, _) => state,
        };
        (state, effects)
    }

    fn click(state: PreviewState, point: Point, effects: &mut Vec<Effect>) -> PreviewState {
        let mut session = match state {
            PreviewState::HidePending { session, timer } => {
                effects.push(Effect::CancelHideTimer(timer));
                session
            }
            PreviewState::Showing(session) => session,
            idle => return idle,
        };

        if let Some(index) = session.layout.close_index_at(point) {
            let removed = session.remove(index);
            debug!(
                event = "preview.window.close_requested",
                owner = %session.owner,
                window_id = removed.window_id
            );
            effects.push(Effect::Close {
                pid: session.pid,
                window_id: removed.window_id,
            });
            if session.thumbnails.is_empty() {
                return hide_from(PreviewState::Showing(session), effects);
            }
            effects.push(Effect::Show(session.frame()));
            return PreviewState::Showing(session);
        }

        match session.layout.index_at(point) {
            Some(index) => {
                let window_id = session.thumbnails[index].window_id;
                debug!(
                    event = "preview.window.raise_requested",
                    owner = %session.owner,
                    window_id
                );
                effects.push(Effect::Raise {
                    pid: session.pid,
                    window_id,
                });
                hide_from(PreviewState::Showing(session), effects)
            }
            None => PreviewState::Showing(session),
        }
    }
}

#[derive(Debug, Default)]
pub struct PreviewEngine {
    state: PreviewState,
    last_timer: TimerId,
}

impl PreviewEngine {
    pub fn state(&self) -> &PreviewState {
        &self.state
    }

    pub fn handle(&mut self, event: Event, settings: LayoutSettings) -> Vec<Effect> {
        let next_timer = self.last_timer + 1;
        let state = std::mem::take(&mut self.state);
        let (state, effects) = state.transition(event, settings, next_timer);
        if effects
            .iter()
            .any(|e| matches!(e, Effect::ArmHideTimer { .. }))
        {
            self.last_timer = next_timer;
        }
        self.state = state;
        effects
    }
}
