//! Open/click tracking rewrite for outgoing email HTML.
//!
//! Every trackable link is replaced by a redirect through
//! `/api/track/click/{id}` and a hidden pixel pointing at
//! `/api/track/open/{id}` is appended. The caller stores one tracking row per
//! returned [`TrackedLink`] plus one for the pixel before the email goes out.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use uuid::Uuid;

static LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<a\s+(?:[^>]*?\s+)?href="([^"]*)"([^>]*)>"#).expect("valid regex")
});

/// Link prefixes that are left untouched.
const UNTRACKED_PREFIXES: &[&str] = &["#", "mailto:", "tel:"];

/// A rewritten link and the URL it redirects to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedLink {
    pub tracking_id: Uuid,
    pub original_url: String,
}

/// Output of [`process_content_for_tracking`].
#[derive(Debug, Clone)]
pub struct TrackedContent {
    pub html: String,
    pub links: Vec<TrackedLink>,
    pub pixel_id: Uuid,
}

/// URL of the open-tracking pixel for `tracking_id`.
pub fn open_url(app_url: &str, tracking_id: Uuid) -> String {
    format!("{}/api/track/open/{tracking_id}", app_url.trim_end_matches('/'))
}

/// URL of the click redirect for `tracking_id`.
pub fn click_url(app_url: &str, tracking_id: Uuid) -> String {
    format!("{}/api/track/click/{tracking_id}", app_url.trim_end_matches('/'))
}

/// Returns `true` if a link with this href should be rewritten.
pub fn is_trackable(href: &str) -> bool {
    !href.is_empty() && !UNTRACKED_PREFIXES.iter().any(|p| href.starts_with(p))
}

/// Rewrite `content` for tracking.
///
/// Links whose href starts with `#`, `mailto:` or `tel:` are kept verbatim.
/// Exactly one pixel is appended regardless of the link count.
pub fn process_content_for_tracking(content: &str, app_url: &str) -> TrackedContent {
    let mut links = Vec::new();

    let rewritten = LINK_RE.replace_all(content, |caps: &Captures<'_>| {
        let whole = &caps[0];
        let href = &caps[1];
        if !is_trackable(href) {
            return whole.to_string();
        }

        let tracking_id = Uuid::new_v4();
        links.push(TrackedLink {
            tracking_id,
            original_url: decode_attribute(href),
        });

        // Keep every other attribute of the anchor, only the href changes.
        let (Some(m), Some(all)) = (caps.get(1), caps.get(0)) else {
            return whole.to_string();
        };
        let start = m.start() - all.start();
        let end = m.end() - all.start();
        format!(
            "{}{}{}",
            &whole[..start],
            click_url(app_url, tracking_id),
            &whole[end..]
        )
    });

    let pixel_id = Uuid::new_v4();
    let html = format!(
        "{rewritten}<img src=\"{}\" width=\"1\" height=\"1\" alt=\"\" style=\"display:none;\" />",
        open_url(app_url, pixel_id)
    );

    TrackedContent {
        html,
        links,
        pixel_id,
    }
}

/// Undo the entity escaping an href picks up from template rendering, so the
/// stored redirect target is the real URL.
fn decode_attribute(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }
    raw.replace("&#x2f;", "/")
        .replace("&#x2F;", "/")
        .replace("&#47;", "/")
        .replace("&#x27;", "'")
        .replace("&#39;", "'")
        .replace("&quot;", "\"")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}
