use std::collections::HashMap;

use crate::types::WindowHandle;

/// Providers cut owner names at this many characters.
pub const OWNER_NAME_LIMIT: usize = 30;

/// Some providers report the bundle name (with this suffix) as the owner
/// instead of the display title, e.g. after the app was restarted.
pub const PACKAGED_APP_SUFFIX: &str = ".app";

/// Normalize a dock title to the name the provider uses for the owner.
pub fn resolve<'a>(title: &'a str, aliases: &'a HashMap<String, String>) -> &'a str {
    aliases.get(title).map(String::as_str).unwrap_or(title)
}

fn truncated(name: &str) -> &str {
    match name.char_indices().nth(OWNER_NAME_LIMIT) {
        Some((idx, _)) => &name[..idx],
        None => name,
    }
}

fn owner_matches(owner: &str, name: &str) -> bool {
    if truncated(owner) == truncated(name) {
        return true;
    }
    let packaged = format!("{name}{PACKAGED_APP_SUFFIX}");
    truncated(owner) == truncated(&packaged)
}

fn is_previewable(window: &WindowHandle) -> bool {
    window.is_standard && window.layer.is_none_or(|layer| layer >= 0)
}

/// Windows belonging to `owner`, in provider enumeration order.
///
/// An empty result is not an error: it means there is nothing to preview.
pub fn find_windows(owner: &str, windows: &[WindowHandle]) -> Vec<WindowHandle> {
    windows
        .iter()
        .filter(|w| owner_matches(&w.owner_name, owner))
        .filter(|w| is_previewable(w))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn window(id: u64, owner: &str) -> WindowHandle {
        WindowHandle {
            id,
            owner_name: owner.to_string(),
            title: format!("window {id}"),
            pid: 100,
            layer: Some(0),
            is_standard: true,
        }
    }

    fn ids(windows: &[WindowHandle]) -> Vec<u64> {
        windows.iter().map(|w| w.id).collect()
    }

    #[test]
    fn test_resolve_uses_alias() {
        let mut aliases = HashMap::new();
        aliases.insert("Visual Studio Code".to_string(), "Code".to_string());
        assert_eq!(resolve("Visual Studio Code", &aliases), "Code");
        assert_eq!(resolve("Firefox", &aliases), "Firefox");
    }

    #[test]
    fn test_find_windows_exact_owner() {
        let windows = vec![window(1, "Firefox"), window(2, "kitty"), window(3, "Firefox")];
        assert_eq!(ids(&find_windows("Firefox", &windows)), vec![1, 3]);
    }

    #[test]
    fn test_find_windows_is_case_sensitive() {
        let windows = vec![window(1, "firefox")];
        assert!(find_windows("Firefox", &windows).is_empty());
    }

    #[test]
    fn test_find_windows_compares_first_thirty_chars() {
        let long = "An Application With A Really Long Name";
        let cut: String = long.chars().take(OWNER_NAME_LIMIT).collect();
        let windows = vec![window(1, &cut), window(2, "An Application")];
        assert_eq!(ids(&find_windows(long, &windows)), vec![1]);
    }

    #[test]
    fn test_truncation_counts_characters_not_bytes() {
        let name = "Ünïcödé Äpplïcätïön Wïth Ä Lông Nämé";
        let cut: String = name.chars().take(OWNER_NAME_LIMIT).collect();
        assert_eq!(truncated(name), cut);
    }

    #[test]
    fn test_find_windows_packaged_suffix() {
        let windows = vec![window(1, "Slack.app"), window(2, "Slacker.app")];
        assert_eq!(ids(&find_windows("Slack", &windows)), vec![1]);
    }

    #[test]
    fn test_find_windows_packaged_suffix_cut_by_provider() {
        let name = "Extremely Long Product Title";
        let reported: String = format!("{name}.app").chars().take(OWNER_NAME_LIMIT).collect();
        assert!(!reported.ends_with(PACKAGED_APP_SUFFIX));
        let windows = vec![window(1, &reported), window(2, "Extremely Long")];
        assert_eq!(ids(&find_windows(name, &windows)), vec![1]);
    }

    #[test]
    fn test_find_windows_skips_non_standard_and_overlays() {
        let mut panel = window(2, "Firefox");
        panel.is_standard = false;
        let mut overlay = window(3, "Firefox");
        overlay.layer = Some(-1);
        let mut unknown_layer = window(4, "Firefox");
        unknown_layer.layer = None;
        let windows = vec![window(1, "Firefox"), panel, overlay, unknown_layer];
        assert_eq!(ids(&find_windows("Firefox", &windows)), vec![1, 4]);
    }

    #[test]
    fn test_find_windows_empty_is_valid() {
        assert!(find_windows("Firefox", &[]).is_empty());
    }

    #[test]
    fn test_display_name_falls_back_to_owner() {
        let mut w = window(1, "kitty");
        w.title.clear();
        assert_eq!(w.display_name(), "kitty");
    }
}
