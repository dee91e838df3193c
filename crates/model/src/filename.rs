//! Naming convention for delivered artifacts.
//!
//! `<label>_<Mon><Day>-<Year>-<Hour><Minute><am|pm>.gif`, e.g.
//! `github_Mar7-2026-305pm.gif`.

use chrono::{DateTime, Datelike, TimeZone, Timelike};

/// Label used when no site/application identity is available.
pub const FALLBACK_LABEL: &str = "recording";

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Build the artifact filename for `label` at `when`.
pub fn artifact_filename<Tz: TimeZone>(label: &str, when: &DateTime<Tz>) -> String {
    let label = sanitize_label(label);
    let month = MONTHS[when.month0() as usize];
    let (is_pm, hour12) = when.hour12();
    let suffix = if is_pm { "pm" } else { "am" };
    format!(
        "{label}_{month}{day}-{year}-{hour12}{minute:02}{suffix}.gif",
        day = when.day(),
        year = when.year(),
        minute = when.minute(),
    )
}

/// Reduce a label to filename-safe characters.
///
/// Runs of anything other than ASCII alphanumerics, `-` and `_` collapse
/// into a single `-`; an empty result becomes [`FALLBACK_LABEL`].
pub fn sanitize_label(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_dash = false;
    for ch in raw.trim().chars() {
        if ch.is_ascii_alphanumeric() || ch == '_' || ch == '-' {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(ch);
        } else {
            pending_dash = true;
        }
    }
    let trimmed = out.trim_matches('-');
    if trimmed.is_empty() {
        FALLBACK_LABEL.to_string()
    } else {
        trimmed.chars().take(64).collect()
    }
}
