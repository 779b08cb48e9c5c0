//! Focused window title per desktop. Every failure comes back as `None`.

use tracing::debug;

use super::capture;
use crate::shortcut::WindowTitleSource;

/// `_NET_ACTIVE_WINDOW` then `_NET_WM_NAME`, through `xprop`.
pub struct X11Titles;

impl WindowTitleSource for X11Titles {
    fn active_window_title(&self) -> Option<String> {
        let root = capture("xprop", &["-root", "_NET_ACTIVE_WINDOW"])?;
        let id = parse_active_window_id(&root)?;
        let name = capture("xprop", &["-id", &id, "_NET_WM_NAME"])?;
        parse_wm_name(&name)
    }
}

/// `_NET_ACTIVE_WINDOW(WINDOW): window id # 0x3a00007` yields `0x3a00007`.
pub fn parse_active_window_id(output: &str) -> Option<String> {
    let id = output.rsplit('#').next()?.split(',').next()?.trim();
    (id.starts_with("0x") && id != "0x0").then(|| id.to_string())
}

/// `_NET_WM_NAME(UTF8_STRING) = "title"` yields `title`.
pub fn parse_wm_name(output: &str) -> Option<String> {
    let (_, value) = output.split_once(" = ")?;
    let value = value.trim();
    let title = value.strip_prefix('"')?.strip_suffix('"')?;
    Some(title.replace("\\\"", "\"").replace("\\\\", "\\"))
}

pub struct KWinTitles;

impl WindowTitleSource for KWinTitles {
    fn active_window_title(&self) -> Option<String> {
        let id = capture("qdbus", &["org.kde.KWin", "/KWin", "org.kde.KWin.activeWindow"])?;
        if id.is_empty() {
            return None;
        }
        let path = format!("/org/kde/KWin/Window/{}", kwin_window_path_id(&id));
        capture("qdbus", &["org.kde.KWin", &path, "org.kde.KWin.Window.caption"])
            .filter(|title| !title.is_empty())
    }
}

/// KWin answers with a braced UUID; object paths use it without braces or dashes.
pub fn kwin_window_path_id(id: &str) -> String {
    id.trim()
        .trim_start_matches('{')
        .trim_end_matches('}')
        .replace('-', "_")
}

pub struct GnomeShellTitles;

const FOCUS_TITLE_SCRIPT: &str = "global.display.focus_window ? global.display.focus_window.get_title() : ''";

impl GnomeShellTitles {
    fn query() -> zbus::Result<(bool, String)> {
        let conn = zbus::blocking::Connection::session()?;
        let reply = conn.call_method(
            Some("org.gnome.Shell"),
            "/org/gnome/Shell",
            Some("org.gnome.Shell"),
            "Eval",
            &(FOCUS_TITLE_SCRIPT,),
        )?;
        reply.body().deserialize::<(bool, String)>()
    }
}

impl WindowTitleSource for GnomeShellTitles {
    fn active_window_title(&self) -> Option<String> {
        match Self::query() {
            Ok((true, json)) => parse_eval_result(&json),
            Ok((false, message)) => {
                debug!("GNOME Shell refused Eval: {message}");
                None
            }
            Err(e) => {
                debug!("Error getting active GNOME Wayland window title: {e}");
                None
            }
        }
    }
}

/// Eval results are JSON-encoded.
pub fn parse_eval_result(json: &str) -> Option<String> {
    let title: String = serde_json::from_str(json).ok()?;
    (!title.is_empty()).then_some(title)
}

/// First source that knows a title wins.
pub struct TitleChain {
    sources: Vec<Box<dyn WindowTitleSource>>,
}

impl TitleChain {
    pub fn new(sources: Vec<Box<dyn WindowTitleSource>>) -> Self {
        Self { sources }
    }
}

impl WindowTitleSource for TitleChain {
    fn active_window_title(&self) -> Option<String> {
        self.sources
            .iter()
            .find_map(|source| source.active_window_title())
    }
}
