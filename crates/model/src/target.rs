//! Capture targets and the recordability predicate.
//!
//! A surface is identified by an opaque handle plus either a URL (browser
//! tab) or an application identity (native window). Recordability is
//! recomputed from scratch on every focus/activation change.

use serde::{Deserialize, Serialize};
use url::Url;

/// Opaque handle of a surface (tab id, X11 window id, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SurfaceId(pub u64);

impl std::fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// What a surface shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum SurfaceIdentity {
    /// A web page, identified by its URL.
    Url(String),
    /// A native application window, identified by its application id.
    App(String),
}

/// A surface the coordinator knows about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceRef {
    pub id: SurfaceId,
    pub identity: SurfaceIdentity,
}

impl SurfaceRef {
    pub fn url(id: u64, url: impl Into<String>) -> Self {
        Self {
            id: SurfaceId(id),
            identity: SurfaceIdentity::Url(url.into()),
        }
    }

    pub fn app(id: u64, app_id: impl Into<String>) -> Self {
        Self {
            id: SurfaceId(id),
            identity: SurfaceIdentity::App(app_id.into()),
        }
    }

    /// Label used in the delivered artifact's filename.
    pub fn site_label(&self) -> String {
        match &self.identity {
            SurfaceIdentity::Url(url) => url_host(url)
                .map(|host| site_from_host(&host))
                .map(|site| crate::filename::sanitize_label(&site))
                .unwrap_or_else(|| crate::filename::FALLBACK_LABEL.to_string()),
            SurfaceIdentity::App(app) => crate::filename::sanitize_label(app),
        }
    }
}

/// Rules for [`CaptureTarget::evaluate`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetPolicy {
    /// URL prefixes that are never recordable (`chrome://`, `about:`, ...).
    pub privileged_schemes: Vec<String>,

    /// Application ids that are never recordable.
    pub excluded_apps: Vec<String>,
}

impl TargetPolicy {
    pub fn new(privileged_schemes: Vec<String>, excluded_apps: Vec<String>) -> Self {
        Self {
            privileged_schemes,
            excluded_apps,
        }
    }

    fn is_privileged(&self, identity: &SurfaceIdentity) -> bool {
        match identity {
            SurfaceIdentity::Url(url) => {
                let url = url.trim();
                url.is_empty()
                    || self
                        .privileged_schemes
                        .iter()
                        .any(|scheme| starts_with_ignore_case(url, scheme))
            }
            SurfaceIdentity::App(app) => {
                app.trim().is_empty()
                    || self
                        .excluded_apps
                        .iter()
                        .any(|excluded| excluded.eq_ignore_ascii_case(app))
            }
        }
    }
}

/// The surface selected for recording plus its derived eligibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureTarget {
    pub surface: SurfaceRef,
    pub recordable: bool,
}

impl CaptureTarget {
    /// Evaluate `surface` against the monitor surface and the policy.
    ///
    /// A surface is never recordable when it is the monitor surface or
    /// when its identity matches a privileged scheme or excluded app.
    pub fn evaluate(
        surface: SurfaceRef,
        monitor: Option<SurfaceId>,
        policy: &TargetPolicy,
    ) -> Self {
        let is_monitor = monitor.is_some_and(|m| m == surface.id);
        let recordable = !is_monitor && !policy.is_privileged(&surface.identity);
        Self {
            surface,
            recordable,
        }
    }

    /// Why this target was rejected, if it was.
    pub fn rejection_reason(&self, monitor: Option<SurfaceId>) -> Option<String> {
        if self.recordable {
            return None;
        }
        if monitor.is_some_and(|m| m == self.surface.id) {
            return Some("The control surface cannot record itself".to_string());
        }
        Some(match &self.surface.identity {
            SurfaceIdentity::Url(url) if url.trim().is_empty() => {
                "This surface has no address and cannot be recorded".to_string()
            }
            SurfaceIdentity::Url(url) => format!("Privileged page cannot be recorded: {url}"),
            SurfaceIdentity::App(app) => format!("Application is excluded from recording: {app}"),
        })
    }
}

fn starts_with_ignore_case(haystack: &str, prefix: &str) -> bool {
    haystack.len() >= prefix.len()
        && haystack.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}

/// Host of `url` as a browser reports it: lowercased, with `\` read as `/`.
fn url_host(url: &str) -> Option<String> {
    let parsed = Url::parse(url.trim()).ok()?;
    parsed
        .host_str()
        .filter(|host| !host.is_empty())
        .map(str::to_string)
}

/// `www.github.com` -> `github`, `news.ycombinator.com` -> `news.ycombinator`.
fn site_from_host(host: &str) -> String {
    let host = host.strip_prefix("www.").unwrap_or(host);
    match host.rsplit_once('.') {
        Some((site, tld)) if !site.is_empty() && tld.chars().all(|c| c.is_ascii_alphabetic()) => {
            site.to_string()
        }
        _ => host.to_string(),
    }
}
