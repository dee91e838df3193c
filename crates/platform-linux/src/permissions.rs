//! Capability detection and guidance for Linux.
//!
//! loopcast shells out to ffmpeg and a few X11 helpers, links GStreamer
//! for the native host, and reads `/dev/input/mice` for the synthetic
//! cursor. `loopcast check` reports which of those are usable.

use std::path::Path;
use std::process::Command;

use crate::display::detect_display_server;

/// A system capability that loopcast may need.
#[derive(Debug, Clone)]
pub struct Capability {
    pub name: String,
    pub description: String,
    pub available: bool,
    pub required: bool,
    pub fix_instructions: Option<String>,
}

/// Check all capabilities and report status.
pub fn check_capabilities(ffmpeg: &Path) -> Vec<Capability> {
    vec![
        check_display_server(),
        check_ffmpeg(ffmpeg),
        check_vp9_encoder(ffmpeg),
        check_tool("wmctrl", "Window enumeration for target selection", "wmctrl"),
        check_tool("xprop", "Active window lookup", "x11-utils"),
        check_tool("xwininfo", "Root window geometry", "x11-utils"),
        check_gstreamer(),
        check_pointer_device(),
    ]
}

fn check_display_server() -> Capability {
    let server = detect_display_server();
    let available = server.supports_window_capture();
    Capability {
        name: "X11 Session".to_string(),
        description: format!("Window capture display server (detected: {server:?})"),
        available,
        required: true,
        fix_instructions: (!available).then(|| {
            "Run inside an X11 session (or XWayland with DISPLAY set)".to_string()
        }),
    }
}

fn check_ffmpeg(ffmpeg: &Path) -> Capability {
    let available = Command::new(ffmpeg)
        .arg("-version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false);
    Capability {
        name: "ffmpeg".to_string(),
        description: "Palette generation and GIF encoding".to_string(),
        available,
        required: true,
        fix_instructions: (!available)
            .then(|| "Install ffmpeg: sudo apt install ffmpeg".to_string()),
    }
}

fn check_vp9_encoder(ffmpeg: &Path) -> Capability {
    let encoders = Command::new(ffmpeg)
        .args(["-hide_banner", "-encoders"])
        .output()
        .map(|o| String::from_utf8_lossy(&o.stdout).into_owned())
        .unwrap_or_default();
    let vp9 = encoders.contains("libvpx-vp9");
    let vp8 = encoders.contains("libvpx ");
    Capability {
        name: "WebM Encoder".to_string(),
        description: format!(
            "Clip encoder (vp9: {}, vp8 fallback: {})",
            yes_no(vp9),
            yes_no(vp8)
        ),
        available: vp9 || vp8,
        required: true,
        fix_instructions: (!(vp9 || vp8))
            .then(|| "Install an ffmpeg build with libvpx enabled".to_string()),
    }
}

fn check_tool(binary: &str, description: &str, package: &str) -> Capability {
    let available = find_in_path(binary);
    Capability {
        name: binary.to_string(),
        description: description.to_string(),
        available,
        required: true,
        fix_instructions: (!available)
            .then(|| format!("Install {binary}: sudo apt install {package}")),
    }
}

fn check_gstreamer() -> Capability {
    let available = find_in_path("gst-inspect-1.0")
        && Command::new("gst-inspect-1.0")
            .arg("ximagesrc")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false);
    Capability {
        name: "GStreamer ximagesrc".to_string(),
        description: "Native host window capture".to_string(),
        available,
        required: false,
        fix_instructions: (!available).then(|| {
            "Install gstreamer1.0-plugins-good, -bad and -ugly".to_string()
        }),
    }
}

/// The pointer backend reads the aggregated mice device.
fn check_pointer_device() -> Capability {
    let available = std::fs::File::open("/dev/input/mice").is_ok();
    Capability {
        name: "Pointer Device Access".to_string(),
        description: "Synthetic cursor position from /dev/input/mice".to_string(),
        available,
        required: false,
        fix_instructions: (!available).then(|| {
            "Add user to input group: sudo usermod -aG input $USER (logout required)".to_string()
        }),
    }
}

fn find_in_path(binary: &str) -> bool {
    std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(binary).is_file()))
        .unwrap_or(false)
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

/// Print a user-friendly capability report.
pub fn print_capability_report(capabilities: &[Capability]) {
    println!("loopcast System Capabilities:");
    println!("{}", "-".repeat(60));

    for cap in capabilities {
        let status = if cap.available {
            "[OK]"
        } else if cap.required {
            "[MISSING - REQUIRED]"
        } else {
            "[MISSING - OPTIONAL]"
        };

        println!("  {} {}: {}", status, cap.name, cap.description);

        if let Some(ref fix) = cap.fix_instructions {
            println!("    Fix: {fix}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_ffmpeg_is_reported_with_fix() {
        let cap = check_ffmpeg(Path::new("/nonexistent/ffmpeg-binary"));
        assert!(!cap.available);
        assert!(cap.required);
        assert!(cap.fix_instructions.is_some());
    }

    #[test]
    fn report_covers_every_dependency() {
        let caps = check_capabilities(Path::new("/nonexistent/ffmpeg-binary"));
        let names: Vec<_> = caps.iter().map(|c| c.name.as_str()).collect();
        for expected in ["ffmpeg", "wmctrl", "xprop", "GStreamer ximagesrc"] {
            assert!(names.contains(&expected), "missing {expected}");
        }
    }
}
