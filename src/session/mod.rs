//! Desktop session detection and the per-session capabilities built on it.

pub mod passthrough;
pub mod window_title;

use std::process::Command;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tracing::{debug, info};

use crate::shortcut::WindowTitleSource;
pub use passthrough::{PassthroughChain, PassthroughToggle};
use window_title::{GnomeShellTitles, KWinTitles, TitleChain, X11Titles};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    X11,
    KdeWayland,
    GnomeWayland,
    /// Wayland under another compositor: try every title source in turn.
    OtherWayland,
}

impl SessionKind {
    pub fn from_env_values(session_type: Option<&str>, desktop: Option<&str>) -> Result<Self> {
        let Some(session_type) = session_type.filter(|s| !s.is_empty()) else {
            bail!("XDG session type is not set");
        };
        if session_type.eq_ignore_ascii_case("x11") {
            return Ok(Self::X11);
        }
        let desktop = desktop.unwrap_or_default().to_ascii_lowercase();
        Ok(if desktop.split(':').any(|d| d == "kde") {
            Self::KdeWayland
        } else if desktop.split(':').any(|d| d == "gnome") {
            Self::GnomeWayland
        } else {
            Self::OtherWayland
        })
    }

    pub fn is_wayland(self) -> bool {
        self != Self::X11
    }
}

/// The connected desktop session. Wayland sessions keep their connection for
/// the keyboard-layout watcher.
pub struct DesktopSession {
    kind: SessionKind,
    wayland: Option<wayland_client::Connection>,
}

impl DesktopSession {
    pub fn connect() -> Result<Self> {
        let session_type = std::env::var("XDG_SESSION_TYPE").ok();
        let desktop = std::env::var("XDG_CURRENT_DESKTOP").ok();
        let kind = SessionKind::from_env_values(session_type.as_deref(), desktop.as_deref())?;

        let wayland = if kind.is_wayland() {
            let conn = wayland_client::Connection::connect_to_env()
                .context("failed to connect to Wayland display")?;
            info!("Wayland session detected and connected ({kind:?})");
            Some(conn)
        } else {
            let x11_display = std::env::var("DISPLAY").unwrap_or_default();
            if x11_display.is_empty() {
                bail!("X11 session without DISPLAY");
            }
            info!("X11 session detected on display {x11_display}");
            None
        };
        Ok(Self { kind, wayland })
    }

    pub fn kind(&self) -> SessionKind {
        self.kind
    }

    pub fn take_wayland(&mut self) -> Option<wayland_client::Connection> {
        self.wayland.take()
    }

    pub fn window_titles(&self) -> Arc<dyn WindowTitleSource> {
        match self.kind {
            SessionKind::X11 => Arc::new(X11Titles),
            SessionKind::KdeWayland => Arc::new(KWinTitles),
            SessionKind::GnomeWayland => Arc::new(GnomeShellTitles),
            SessionKind::OtherWayland => Arc::new(TitleChain::new(vec![
                Box::new(KWinTitles),
                Box::new(GnomeShellTitles),
            ])),
        }
    }
}

/// Runs a tool and returns its trimmed stdout when it exits successfully.
pub(crate) fn capture(program: &str, args: &[&str]) -> Option<String> {
    let output = match Command::new(program).args(args).output() {
        Ok(output) => output,
        Err(e) => {
            debug!("{program} failed to start: {e}");
            return None;
        }
    };
    if !output.status.success() {
        debug!("{program} {args:?} exited with {}", output.status);
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
