//! Turns raw pointer input into preview transitions.
//!
//! Global input comes from the poll timer (moves) and evdev (button presses),
//! local input from the preview surface itself. The dispatcher asks the
//! provider what is under the pointer, resolves dock items to thumbnails,
//! carries out window actions and hands the remaining effects back to the
//! event loop.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::codec;
use crate::config::Config;
use crate::matcher;
use crate::preview::{Effect, Event, PreviewEngine, PreviewState, Resolution, TimerId};
use crate::provider::{Provider, WindowAction};
use crate::types::{DockItem, Pid, Point, Thumbnail, WindowHandle, WindowId};

pub struct Dispatcher<P: Provider> {
    provider: P,
    engine: PreviewEngine,
    last_pointer: Option<Point>,
    pointer_in_surface: bool,
    /// Windows we asked to close that the provider may still list.
    closed: HashSet<WindowId>,
}

impl<P: Provider> Dispatcher<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            engine: PreviewEngine::default(),
            last_pointer: None,
            pointer_in_surface: false,
            closed: HashSet::new(),
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn provider_mut(&mut self) -> &mut P {
        &mut self.provider
    }

    pub fn state(&self) -> &PreviewState {
        self.engine.state()
    }

    /// One tick of the pointer poll.
    pub fn poll(&mut self, config: &Config) -> Vec<Effect> {
        match self.provider.pointer_position() {
            Ok(point) => self.on_global_pointer_move(point, config),
            Err(e) => {
                debug!(event = "core.dispatch.poll_skipped", error = %e);
                Vec::new()
            }
        }
    }

    pub fn on_global_pointer_move(&mut self, point: Point, config: &Config) -> Vec<Effect> {
        if self.last_pointer == Some(point) {
            return Vec::new();
        }
        self.last_pointer = Some(point);
        if self.pointer_in_surface {
            return Vec::new();
        }

        let event = match self.dock_item_at(point) {
            None => Event::HoverOutsideDock,
            Some(item) => {
                let owner = matcher::resolve(&item.title, &config.aliases).to_string();
                if self.engine.state().tracks(&owner) {
                    Event::HoverTracked
                } else {
                    let resolution = self.resolve(&owner, item);
                    Event::HoverItem { owner, resolution }
                }
            }
        };
        self.apply(event, config)
    }

    pub fn on_global_pointer_down(&mut self, point: Point, config: &Config) -> Vec<Effect> {
        let Some(session) = self.engine.state().session() else {
            return Vec::new();
        };
        if self.pointer_in_surface || session.layout().surface.contains(point) {
            return Vec::new();
        }
        if self.dock_item_at(point).is_some() {
            debug!(event = "core.dispatch.dock_click_ignored");
            return Vec::new();
        }
        self.apply(Event::DismissClick, config)
    }

    pub fn on_pointer_entered(&mut self, config: &Config) -> Vec<Effect> {
        self.pointer_in_surface = true;
        self.apply(Event::PointerEntered, config)
    }

    pub fn on_pointer_left(&mut self, config: &Config) -> Vec<Effect> {
        self.pointer_in_surface = false;
        self.apply(Event::PointerLeft, config)
    }

    pub fn on_pointer_motion(&mut self, local: Point, config: &Config) -> Vec<Effect> {
        self.apply(Event::PointerMoved(local), config)
    }

    pub fn on_surface_click(&mut self, local: Point, config: &Config) -> Vec<Effect> {
        self.apply(Event::SurfaceClick(local), config)
    }

    pub fn on_surface_closed(&mut self, config: &Config) -> Vec<Effect> {
        self.pointer_in_surface = false;
        self.apply(Event::SurfaceClosed, config)
    }

    pub fn on_hide_timer(&mut self, timer: TimerId, config: &Config) -> Vec<Effect> {
        self.apply(Event::HideTimerFired(timer), config)
    }

    fn dock_item_at(&self, point: Point) -> Option<DockItem> {
        match self.provider.element_at_position(point) {
            Ok(element) => element.and_then(|e| e.into_dock_item()),
            Err(e) => {
                debug!(event = "core.dispatch.hit_test_failed", error = %e);
                None
            }
        }
    }

    fn resolve(&mut self, owner: &str, item: DockItem) -> Resolution {
        if !item.running {
            debug!(event = "core.dispatch.not_running", owner);
            return Resolution::Nothing;
        }
        let windows = match self.provider.list_windows() {
            Ok(windows) => windows,
            Err(e) => {
                warn!(event = "core.dispatch.list_windows_failed", owner, error = %e);
                return Resolution::Nothing;
            }
        };
        self.closed.retain(|id| windows.iter().any(|w| w.id == *id));

        let windows: Vec<WindowHandle> = matcher::find_windows(owner, &windows)
            .into_iter()
            .filter(|w| !self.closed.contains(&w.id))
            .filter(|w| self.provider.is_standard_window(w.pid, w.id))
            .collect();
        let Some(pid) = windows.first().map(|w| w.pid) else {
            debug!(event = "core.dispatch.no_windows", owner);
            return Resolution::Nothing;
        };

        let thumbnails: Vec<Thumbnail> = windows.iter().filter_map(|w| self.thumbnail(w)).collect();
        if thumbnails.is_empty() {
            return Resolution::Nothing;
        }
        Resolution::Windows {
            pid,
            dock_item: item,
            thumbnails,
        }
    }

    fn thumbnail(&self, window: &WindowHandle) -> Option<Thumbnail> {
        let Some(image) = self.provider.capture_window_image(window.id) else {
            debug!(event = "core.capture.unavailable", window_id = window.id);
            return None;
        };
        match codec::encode(&image.pixels, image.width, image.height) {
            Ok(encoded) => Some(Thumbnail {
                window_id: window.id,
                display_name: window.display_name().to_string(),
                pixel_width: image.width,
                pixel_height: image.height,
                encoded: encoded.into(),
            }),
            Err(e) => {
                warn!(event = "core.capture.encode_failed", window_id = window.id, error = %e);
                None
            }
        }
    }

    fn apply(&mut self, event: Event, config: &Config) -> Vec<Effect> {
        let effects = self.engine.handle(event, config.layout);
        let mut remaining = Vec::with_capacity(effects.len());
        for effect in effects {
            match effect {
                Effect::Raise { pid, window_id } => {
                    self.act(pid, window_id, WindowAction::Raise);
                }
                Effect::Close { pid, window_id } => {
                    self.closed.insert(window_id);
                    self.act(pid, window_id, WindowAction::Close);
                }
                Effect::Hide => {
                    self.pointer_in_surface = false;
                    remaining.push(Effect::Hide);
                }
                other => remaining.push(other),
            }
        }
        remaining
    }

    fn act(&self, pid: Pid, window_id: WindowId, action: WindowAction) {
        match self.provider.perform_window_action(pid, window_id, action) {
            Ok(()) => info!(event = "core.window.action_completed", window_id, ?action),
            Err(e) => warn!(
                event = "core.window.action_failed",
                window_id,
                ?action,
                error = %e
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HIDE_DELAY;
    use crate::provider::{CapturedImage, ElementKind, ProviderError, ScreenElement};
    use crate::types::{Rect, Size};
    use pretty_assertions::assert_eq;
    use std::cell::{Cell, RefCell};

    const DOCK_ITEM: Rect = Rect::new(500.0, 900.0, 60.0, 60.0);

    #[derive(Default)]
    struct FakeProvider {
        pointer: Cell<Point>,
        dock: Vec<(Rect, &'static str, bool)>,
        windows: RefCell<Vec<WindowHandle>>,
        uncapturable: Vec<WindowId>,
        list_calls: Cell<usize>,
        capture_calls: Cell<usize>,
        actions: RefCell<Vec<(WindowId, WindowAction)>>,
    }

    impl FakeProvider {
        fn with_firefox(ids: &[WindowId]) -> Self {
            let windows = ids
                .iter()
                .map(|&id| WindowHandle {
                    id,
                    owner_name: "firefox".to_string(),
                    title: format!("tab {id}"),
                    pid: 77,
                    layer: None,
                    is_standard: true,
                })
                .collect();
            Self {
                dock: vec![
                    (DOCK_ITEM, "firefox", true),
                    (Rect::new(560.0, 900.0, 60.0, 60.0), "gimp", false),
                ],
                windows: RefCell::new(windows),
                ..Self::default()
            }
        }

        fn provider_calls(&self) -> usize {
            self.list_calls.get() + self.capture_calls.get()
        }
    }

    impl Provider for FakeProvider {
        fn pointer_position(&self) -> Result<Point, ProviderError> {
            Ok(self.pointer.get())
        }

        fn element_at_position(&self, point: Point) -> Result<Option<ScreenElement>, ProviderError> {
            Ok(self
                .dock
                .iter()
                .find(|(rect, _, _)| rect.contains(point))
                .map(|(rect, title, running)| ScreenElement {
                    kind: ElementKind::DockItem,
                    title: title.to_string(),
                    running: *running,
                    position: Point::new(rect.x, rect.y),
                    size: Size {
                        width: rect.width,
                        height: rect.height,
                    },
                }))
        }

        fn list_windows(&self) -> Result<Vec<WindowHandle>, ProviderError> {
            self.list_calls.set(self.list_calls.get() + 1);
            Ok(self.windows.borrow().clone())
        }

        fn capture_window_image(&self, window_id: WindowId) -> Option<CapturedImage> {
            self.capture_calls.set(self.capture_calls.get() + 1);
            if self.uncapturable.contains(&window_id) {
                return None;
            }
            Some(CapturedImage {
                width: 4,
                height: 2,
                pixels: vec![0x80; 4 * 4 * 2],
            })
        }

        fn is_standard_window(&self, _pid: Pid, window_id: WindowId) -> bool {
            self.windows
                .borrow()
                .iter()
                .any(|w| w.id == window_id && w.is_standard)
        }

        fn perform_window_action(
            &self,
            _pid: Pid,
            window_id: WindowId,
            action: WindowAction,
        ) -> Result<(), ProviderError> {
            self.actions.borrow_mut().push((window_id, action));
            Ok(())
        }
    }

    fn on_dock() -> Point {
        DOCK_ITEM.center()
    }

    fn off_dock() -> Point {
        Point::new(100.0, 100.0)
    }

    fn shown_ids(dispatcher: &Dispatcher<FakeProvider>) -> Vec<WindowId> {
        dispatcher
            .state()
            .session()
            .map(|s| s.thumbnails().iter().map(|t| t.window_id).collect())
            .unwrap_or_default()
    }

    fn local_close(dispatcher: &Dispatcher<FakeProvider>, index: usize) -> Point {
        dispatcher.state().session().unwrap().layout().thumbnails[index]
            .close
            .center()
    }

    #[test]
    fn test_hover_dock_item_shows_preview() {
        let config = Config::default();
        let mut dispatcher = Dispatcher::new(FakeProvider::with_firefox(&[1, 2]));

        let effects = dispatcher.on_global_pointer_move(on_dock(), &config);
        assert!(matches!(effects.as_slice(), [Effect::Show(_)]));
        assert_eq!(shown_ids(&dispatcher), vec![1, 2]);
        let session = dispatcher.state().session().unwrap();
        assert_eq!(session.pid(), 77);
        assert_eq!(session.thumbnails()[0].display_name, "tab 1");
    }

    #[test]
    fn test_same_owner_rehover_makes_no_provider_calls() {
        let config = Config::default();
        let mut dispatcher = Dispatcher::new(FakeProvider::with_firefox(&[1]));
        dispatcher.on_global_pointer_move(on_dock(), &config);
        let calls = dispatcher.provider().provider_calls();

        let nudged = Point::new(on_dock().x + 3.0, on_dock().y);
        assert!(dispatcher.on_global_pointer_move(nudged, &config).is_empty());
        assert_eq!(dispatcher.provider().provider_calls(), calls);
    }

    #[test]
    fn test_identical_positions_are_deduplicated() {
        let config = Config::default();
        let mut dispatcher = Dispatcher::new(FakeProvider::with_firefox(&[1]));
        dispatcher.on_global_pointer_move(on_dock(), &config);
        dispatcher.on_global_pointer_move(off_dock(), &config);
        assert!(matches!(
            dispatcher.state(),
            PreviewState::HidePending { timer: 1, .. }
        ));

        assert!(dispatcher.on_global_pointer_move(off_dock(), &config).is_empty());
    }

    #[test]
    fn test_poll_reads_provider_pointer() {
        let config = Config::default();
        let provider = FakeProvider::with_firefox(&[1]);
        provider.pointer.set(on_dock());
        let mut dispatcher = Dispatcher::new(provider);
        assert!(matches!(dispatcher.poll(&config).as_slice(), [Effect::Show(_)]));
    }

    #[test]
    fn test_leaving_dock_arms_hide_and_timer_hides() {
        let config = Config::default();
        let mut dispatcher = Dispatcher::new(FakeProvider::with_firefox(&[1]));
        dispatcher.on_global_pointer_move(on_dock(), &config);

        let effects = dispatcher.on_global_pointer_move(off_dock(), &config);
        assert_eq!(
            effects,
            vec![Effect::ArmHideTimer {
                timer: 1,
                delay: HIDE_DELAY
            }]
        );
        assert_eq!(dispatcher.on_hide_timer(1, &config), vec![Effect::Hide]);
        assert!(!dispatcher.state().is_visible());
    }

    #[test]
    fn test_global_moves_ignored_while_pointer_in_surface() {
        let config = Config::default();
        let mut dispatcher = Dispatcher::new(FakeProvider::with_firefox(&[1]));
        dispatcher.on_global_pointer_move(on_dock(), &config);
        dispatcher.on_global_pointer_move(off_dock(), &config);

        let effects = dispatcher.on_pointer_entered(&config);
        assert_eq!(effects, vec![Effect::CancelHideTimer(1)]);
        assert!(
            dispatcher
                .on_global_pointer_move(Point::new(1.0, 1.0), &config)
                .is_empty()
        );

        dispatcher.on_pointer_left(&config);
        let effects = dispatcher.on_global_pointer_move(Point::new(2.0, 2.0), &config);
        assert!(matches!(effects.as_slice(), [Effect::ArmHideTimer { .. }]));
    }

    #[test]
    fn test_closed_surface_lets_same_item_show_again() {
        let config = Config::default();
        let mut dispatcher = Dispatcher::new(FakeProvider::with_firefox(&[1]));
        dispatcher.on_global_pointer_move(on_dock(), &config);
        dispatcher.on_pointer_entered(&config);

        assert_eq!(dispatcher.on_surface_closed(&config), vec![Effect::Hide]);
        assert!(!dispatcher.state().is_visible());

        dispatcher.on_global_pointer_move(off_dock(), &config);
        let effects = dispatcher.on_global_pointer_move(on_dock(), &config);
        assert!(matches!(effects.as_slice(), [Effect::Show(_)]));
        assert!(dispatcher.state().tracks("firefox"));
    }

    #[test]
    fn test_not_running_item_has_nothing_to_preview() {
        let config = Config::default();
        let mut dispatcher = Dispatcher::new(FakeProvider::with_firefox(&[1]));
        dispatcher.on_global_pointer_move(on_dock(), &config);

        let effects = dispatcher.on_global_pointer_move(Point::new(590.0, 930.0), &config);
        assert_eq!(effects, vec![Effect::Hide]);
        assert!(dispatcher.state().tracks("gimp"));
    }

    #[test]
    fn test_failed_capture_drops_only_that_window() {
        let config = Config::default();
        let mut provider = FakeProvider::with_firefox(&[1, 2, 3]);
        provider.uncapturable = vec![2];
        let mut dispatcher = Dispatcher::new(provider);

        dispatcher.on_global_pointer_move(on_dock(), &config);
        assert_eq!(shown_ids(&dispatcher), vec![1, 3]);
    }

    #[test]
    fn test_all_captures_failing_shows_nothing() {
        let config = Config::default();
        let mut provider = FakeProvider::with_firefox(&[1]);
        provider.uncapturable = vec![1];
        let mut dispatcher = Dispatcher::new(provider);

        assert!(dispatcher.on_global_pointer_move(on_dock(), &config).is_empty());
        assert!(!dispatcher.state().is_visible());
    }

    #[test]
    fn test_alias_maps_dock_title_to_owner() {
        let mut config = Config::default();
        config
            .aliases
            .insert("firefox".to_string(), "Firefox Nightly".to_string());
        let provider = FakeProvider::with_firefox(&[1]);
        provider.windows.borrow_mut()[0].owner_name = "Firefox Nightly".to_string();
        let mut dispatcher = Dispatcher::new(provider);

        dispatcher.on_global_pointer_move(on_dock(), &config);
        assert_eq!(dispatcher.state().session().unwrap().owner(), "Firefox Nightly");
    }

    #[test]
    fn test_surface_click_raises_window() {
        let config = Config::default();
        let mut dispatcher = Dispatcher::new(FakeProvider::with_firefox(&[1, 2]));
        dispatcher.on_global_pointer_move(on_dock(), &config);
        dispatcher.on_pointer_entered(&config);

        let image = dispatcher.state().session().unwrap().layout().thumbnails[1]
            .image
            .center();
        let effects = dispatcher.on_surface_click(image, &config);
        assert_eq!(effects, vec![Effect::Hide]);
        assert_eq!(
            *dispatcher.provider().actions.borrow(),
            vec![(2, WindowAction::Raise)]
        );

        // surface is gone, global hover is live again
        dispatcher.on_global_pointer_move(off_dock(), &config);
        let effects = dispatcher.on_global_pointer_move(on_dock(), &config);
        assert!(matches!(effects.as_slice(), [Effect::Show(_)]));
    }

    #[test]
    fn test_closed_window_is_not_resurrected() {
        let config = Config::default();
        let mut dispatcher = Dispatcher::new(FakeProvider::with_firefox(&[1, 2]));
        dispatcher.on_global_pointer_move(on_dock(), &config);
        dispatcher.on_pointer_entered(&config);

        let glyph = local_close(&dispatcher, 0);
        let effects = dispatcher.on_surface_click(glyph, &config);
        assert!(matches!(effects.as_slice(), [Effect::Show(_)]));
        assert_eq!(shown_ids(&dispatcher), vec![2]);
        assert_eq!(
            *dispatcher.provider().actions.borrow(),
            vec![(1, WindowAction::Close)]
        );

        // the compositor still lists window 1 for a while
        dispatcher.on_pointer_left(&config);
        assert!(
            dispatcher
                .on_global_pointer_down(on_dock(), &config)
                .is_empty()
        );
        dispatcher.on_global_pointer_move(off_dock(), &config);
        dispatcher.on_hide_timer(1, &config);
        dispatcher.on_global_pointer_move(on_dock(), &config);
        assert_eq!(shown_ids(&dispatcher), vec![2]);
    }

    #[test]
    fn test_tombstone_pruned_once_window_disappears() {
        let config = Config::default();
        let mut dispatcher = Dispatcher::new(FakeProvider::with_firefox(&[1, 2]));
        dispatcher.on_global_pointer_move(on_dock(), &config);
        dispatcher.on_pointer_entered(&config);
        let glyph = local_close(&dispatcher, 0);
        dispatcher.on_surface_click(glyph, &config);
        assert!(dispatcher.closed.contains(&1));

        dispatcher.provider().windows.borrow_mut().retain(|w| w.id != 1);
        dispatcher.on_pointer_left(&config);
        dispatcher.on_global_pointer_down(off_dock(), &config);
        dispatcher.on_global_pointer_move(off_dock(), &config);
        dispatcher.on_global_pointer_move(on_dock(), &config);
        assert!(dispatcher.closed.is_empty());
        assert_eq!(shown_ids(&dispatcher), vec![2]);
    }

    #[test]
    fn test_closing_last_window_hides() {
        let config = Config::default();
        let mut dispatcher = Dispatcher::new(FakeProvider::with_firefox(&[1]));
        dispatcher.on_global_pointer_move(on_dock(), &config);
        dispatcher.on_pointer_entered(&config);

        let glyph = local_close(&dispatcher, 0);
        assert_eq!(dispatcher.on_surface_click(glyph, &config), vec![Effect::Hide]);
        assert!(dispatcher.state().session().is_none());
    }

    #[test]
    fn test_click_outside_dismisses_but_dock_click_does_not() {
        let config = Config::default();
        let mut dispatcher = Dispatcher::new(FakeProvider::with_firefox(&[1]));
        dispatcher.on_global_pointer_move(on_dock(), &config);

        assert!(
            dispatcher
                .on_global_pointer_down(on_dock(), &config)
                .is_empty()
        );
        let inside = dispatcher.state().session().unwrap().layout().surface.center();
        assert!(dispatcher.on_global_pointer_down(inside, &config).is_empty());
        assert!(dispatcher.state().is_visible());

        assert_eq!(
            dispatcher.on_global_pointer_down(off_dock(), &config),
            vec![Effect::Hide]
        );
    }

    #[test]
    fn test_click_while_idle_is_ignored() {
        let config = Config::default();
        let mut dispatcher = Dispatcher::new(FakeProvider::with_firefox(&[1]));
        assert!(
            dispatcher
                .on_global_pointer_down(off_dock(), &config)
                .is_empty()
        );
        assert_eq!(dispatcher.provider().provider_calls(), 0);
    }
}
