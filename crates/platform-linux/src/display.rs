//! X11 window enumeration and display detection.
//!
//! Window lists come from `wmctrl -lGx`, the active window from
//! `xprop -root _NET_ACTIVE_WINDOW`, and the root geometry from
//! `xwininfo -root`. All three are EWMH helpers present on stock X11
//! desktops.

use std::process::Command;

use loopcast_common::error::{LoopcastError, LoopcastResult};
use loopcast_platform_core::{DisplayServer, ScreenRect, WindowInfo};

/// Detect the current display server.
pub fn detect_display_server() -> DisplayServer {
    if std::env::var("WAYLAND_DISPLAY").is_ok() {
        DisplayServer::Wayland
    } else if std::env::var("DISPLAY").is_ok() {
        DisplayServer::X11
    } else {
        DisplayServer::Unknown
    }
}

/// List top-level windows managed by the window manager.
pub fn list_windows() -> LoopcastResult<Vec<WindowInfo>> {
    let stdout = run_tool("wmctrl", &["-lGx"])?;
    let windows: Vec<WindowInfo> = stdout.lines().filter_map(parse_wmctrl_line).collect();
    tracing::debug!(count = windows.len(), "Enumerated windows");
    Ok(windows)
}

/// The window that currently has input focus, if any.
pub fn active_window() -> LoopcastResult<Option<WindowInfo>> {
    let stdout = run_tool("xprop", &["-root", "_NET_ACTIVE_WINDOW"])?;
    let Some(id) = parse_active_window_id(&stdout) else {
        return Ok(None);
    };
    Ok(list_windows()?.into_iter().find(|w| w.id == id))
}

/// Ask the window manager to raise and focus `window_id`.
pub fn activate_window(window_id: u64) -> LoopcastResult<()> {
    let id = format!("{window_id:#x}");
    run_tool("wmctrl", &["-i", "-a", &id]).map(|_| ())
}

/// Geometry of the X11 root window.
pub fn root_geometry() -> LoopcastResult<ScreenRect> {
    let stdout = run_tool("xwininfo", &["-root"])?;
    parse_xwininfo_geometry(&stdout)
        .ok_or_else(|| LoopcastError::capture("could not read root window geometry"))
}

fn run_tool(program: &str, args: &[&str]) -> LoopcastResult<String> {
    let output = Command::new(program).args(args).output().map_err(|e| {
        LoopcastError::target_unavailable(format!("failed to run {program}: {e}"))
    })?;
    if !output.status.success() {
        return Err(LoopcastError::target_unavailable(format!(
            "{program} exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Parse one `wmctrl -lGx` row:
/// `0x03c00003  0 10 40 1280 900 google-chrome.Google-chrome  host  Title`.
pub fn parse_wmctrl_line(line: &str) -> Option<WindowInfo> {
    let mut rest = line.trim_start();
    let mut fields = Vec::with_capacity(8);
    for _ in 0..8 {
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        if end == 0 {
            return None;
        }
        fields.push(&rest[..end]);
        rest = rest[end..].trim_start();
    }
    let title = rest.trim_end().to_string();

    let id = u64::from_str_radix(fields[0].trim_start_matches("0x"), 16).ok()?;
    // Sticky windows report desktop -1; they are still candidates.
    let _desktop: i64 = fields[1].parse().ok()?;
    let x: i32 = fields[2].parse().ok()?;
    let y: i32 = fields[3].parse().ok()?;
    let width: u32 = fields[4].parse().ok()?;
    let height: u32 = fields[5].parse().ok()?;
    let app_id = fields[6]
        .split('.')
        .next()
        .unwrap_or(fields[6])
        .to_ascii_lowercase();

    Some(WindowInfo {
        id,
        app_id,
        title,
        bounds: ScreenRect::new(x, y, width, height),
    })
}

/// Parse `_NET_ACTIVE_WINDOW(WINDOW): window id # 0x3c00003`.
pub fn parse_active_window_id(output: &str) -> Option<u64> {
    let hex = output.rsplit('#').next()?.trim();
    let hex = hex.split([',', ' ']).next()?.trim_start_matches("0x");
    match u64::from_str_radix(hex, 16) {
        Ok(0) | Err(_) => None,
        Ok(id) => Some(id),
    }
}

fn parse_xwininfo_geometry(output: &str) -> Option<ScreenRect> {
    let value = |key: &str| -> Option<u32> {
        output
            .lines()
            .find_map(|line| line.trim().strip_prefix(key))
            .and_then(|v| v.trim().parse().ok())
    };
    Some(ScreenRect::new(0, 0, value("Width:")?, value("Height:")?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wmctrl_row_with_spaces_in_title() {
        let row = "0x03c00003  0 10   40   1280 900  google-chrome.Google-chrome  box GitHub - Google Chrome";
        let window = parse_wmctrl_line(row).unwrap();
        assert_eq!(window.id, 0x03c0_0003);
        assert_eq!(window.app_id, "google-chrome");
        assert_eq!(window.title, "GitHub - Google Chrome");
        assert_eq!(window.bounds, ScreenRect::new(10, 40, 1280, 900));
    }

    #[test]
    fn parses_sticky_window() {
        let row = "0x01200007 -1 0    0    1920 32   xfce4-panel.Xfce4-panel  box xfce4-panel";
        let window = parse_wmctrl_line(row).unwrap();
        assert_eq!(window.app_id, "xfce4-panel");
    }

    #[test]
    fn rejects_truncated_rows() {
        assert!(parse_wmctrl_line("0x01 0 0 0").is_none());
        assert!(parse_wmctrl_line("").is_none());
    }

    #[test]
    fn parses_active_window() {
        assert_eq!(
            parse_active_window_id("_NET_ACTIVE_WINDOW(WINDOW): window id # 0x3c00003\n"),
            Some(0x3c00003)
        );
        assert_eq!(
            parse_active_window_id("_NET_ACTIVE_WINDOW(WINDOW): window id # 0x0"),
            None
        );
    }

    #[test]
    fn parses_root_geometry() {
        let out = "\n  Absolute upper-left X:  0\n  Width: 2560\n  Height: 1440\n  Depth: 24\n";
        assert_eq!(
            parse_xwininfo_geometry(out),
            Some(ScreenRect::new(0, 0, 2560, 1440))
        );
    }
}
