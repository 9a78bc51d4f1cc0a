//! Status ping (C7, §4.7).
//!
//! A no-op side channel: the only work is validating that `emoji` is
//! exactly one emoji grapheme cluster. The tool host, not this crate, is
//! responsible for turning the validated payload into a live indicator.

use serde::Serialize;
use unicode_segmentation::UnicodeSegmentation;

pub const MAX_MESSAGE_LEN: usize = 40;

#[derive(Debug, Clone, Serialize)]
pub struct StatusResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub fn status_set(emoji: &str, message: &str) -> StatusResult {
    if message.chars().count() > MAX_MESSAGE_LEN {
        return StatusResult::rejected(format!(
            "`message` must be at most {MAX_MESSAGE_LEN} characters."
        ));
    }

    if let Err(reason) = validate_emoji(emoji) {
        return StatusResult::rejected(reason);
    }

    StatusResult {
        success: true,
        emoji: Some(emoji.to_string()),
        message: Some(message.to_string()),
        error: None,
    }
}

impl StatusResult {
    fn rejected(error: impl Into<String>) -> Self {
        Self {
            success: false,
            emoji: None,
            message: None,
            error: Some(error.into()),
        }
    }
}

/// `emoji` must be exactly one grapheme cluster, and that cluster must be
/// classified as an emoji — every codepoint in it Extended_Pictographic or
/// Emoji_Presentation. Rejects multi-cluster strings, plain text, and
/// text+emoji mixes (e.g. a pictograph followed by a variation selector
/// `emojis` doesn't recognize, or a trailing letter).
fn validate_emoji(value: &str) -> Result<(), String> {
    let mut clusters = value.graphemes(true);
    let Some(cluster) = clusters.next() else {
        return Err("`emoji` must not be empty.".to_string());
    };
    if clusters.next().is_some() {
        return Err("`emoji` must be exactly one emoji, not a sequence of characters.".to_string());
    }

    if emojis::get(cluster).is_none() {
        return Err(format!("`{cluster}` is not recognized as an emoji."));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_single_emoji() {
        let result = status_set("🚀", "deploying");
        assert!(result.success);
    }

    #[test]
    fn rejects_plain_text() {
        let result = status_set("ok", "still working");
        assert!(!result.success);
    }

    #[test]
    fn rejects_multi_grapheme_emoji_sequence() {
        // family emoji: multiple codepoints joined by ZWJ form a *single*
        // grapheme cluster, so this one is actually fine; two distinct
        // emoji back to back is not.
        let result = status_set("🚀🔥", "two rockets");
        assert!(!result.success);
    }

    #[test]
    fn rejects_overlong_message() {
        let long = "x".repeat(MAX_MESSAGE_LEN + 1);
        let result = status_set("🚀", &long);
        assert!(!result.success);
    }
}
