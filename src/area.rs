//! The Area data model shared by analysis and rendering.
//!
//! An [`Area`] is a typed, positioned rectangle in the *source image's*
//! pixel space. The analysis pipeline produces them, the external store
//! persists them, and [`crate::html`] renders them. The JSON shape is
//! camelCase with `type` as the discriminator so area lists round-trip
//! through the store unchanged.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque, immutable area identifier.
///
/// New areas get a UUID v4; identifiers read back from the store are kept
/// verbatim whatever their format.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AreaId(String);

impl AreaId {
    /// Create a new unique area ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Borrow the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for AreaId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for AreaId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for AreaId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for AreaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The closed set of area types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AreaKind {
    /// Image crop with no semantic content.
    Slice,
    /// Solid colour band.
    Color,
    /// Externally addressable image (URL in `content`).
    Image,
    /// Paragraph text.
    Text,
    /// Call-to-action button.
    Button,
    /// Blank vertical gap.
    Spacer,
}

impl AreaKind {
    /// Every kind, in declaration order.
    pub const ALL: [AreaKind; 6] = [
        AreaKind::Slice,
        AreaKind::Color,
        AreaKind::Image,
        AreaKind::Text,
        AreaKind::Button,
        AreaKind::Spacer,
    ];

    /// The lowercase wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            AreaKind::Slice => "slice",
            AreaKind::Color => "color",
            AreaKind::Image => "image",
            AreaKind::Text => "text",
            AreaKind::Button => "button",
            AreaKind::Spacer => "spacer",
        }
    }

    /// Parse a wire name, case-insensitively. Returns `None` for anything
    /// outside the closed set.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        AreaKind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
    }
}

impl fmt::Display for AreaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Horizontal text alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    #[default]
    Left,
    Center,
    Right,
    Justify,
}

impl TextAlign {
    pub fn as_str(self) -> &'static str {
        match self {
            TextAlign::Left => "left",
            TextAlign::Center => "center",
            TextAlign::Right => "right",
            TextAlign::Justify => "justify",
        }
    }
}

/// Sparse presentation hints. Absent fields fall back to generator defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AreaStyles {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Font size in pixels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_weight: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_align: Option<TextAlign>,
    /// CSS padding shorthand, e.g. `"12px 24px"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub padding: Option<String>,
    /// CSS length, e.g. `"4px"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub border_radius: Option<String>,
}

impl AreaStyles {
    /// True when no field is set.
    pub fn is_empty(&self) -> bool {
        *self == AreaStyles::default()
    }
}

/// One typed rectangle of the email layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Area {
    /// Generated when missing from input JSON.
    #[serde(default)]
    pub id: AreaId,
    #[serde(rename = "type")]
    pub kind: AreaKind,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub styles: Option<AreaStyles>,
}

impl Area {
    /// Create an area with a fresh ID and no content, link or styles.
    pub fn new(kind: AreaKind, x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            id: AreaId::new(),
            kind,
            x,
            y,
            width,
            height,
            content: None,
            link: None,
            styles: None,
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    pub fn with_styles(mut self, styles: AreaStyles) -> Self {
        self.styles = Some(styles);
        self
    }

    /// Exclusive right edge.
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    /// Styles, or an empty record when none are set.
    pub fn styles_or_default(&self) -> AreaStyles {
        self.styles.clone().unwrap_or_default()
    }

    /// Whether `content` looks like a path or URL rather than a label.
    pub fn content_is_url(&self) -> bool {
        self.content
            .as_deref()
            .is_some_and(|c| c.starts_with('/') || c.starts_with("http"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_parse_is_case_insensitive_and_closed() {
        assert_eq!(AreaKind::parse("TEXT"), Some(AreaKind::Text));
        assert_eq!(AreaKind::parse(" button "), Some(AreaKind::Button));
        assert_eq!(AreaKind::parse("headline"), None);
        assert_eq!(AreaKind::parse(""), None);
    }

    #[test]
    fn area_json_uses_camel_case_and_type_key() {
        let area = Area::new(AreaKind::Button, 0, 10, 600, 48)
            .with_content("Buy now")
            .with_styles(AreaStyles {
                background_color: Some("#007bff".into()),
                border_radius: Some("4px".into()),
                ..Default::default()
            });
        let json = serde_json::to_value(&area).unwrap();
        assert_eq!(json["type"], "button");
        assert_eq!(json["styles"]["backgroundColor"], "#007bff");
        assert_eq!(json["styles"]["borderRadius"], "4px");
        assert!(json.get("link").is_none());
    }

    #[test]
    fn area_reads_store_json() {
        let json = r#"{
            "id": "a-1", "type": "text", "x": 0, "y": 20, "width": 600, "height": 40,
            "content": "Hello", "styles": { "fontSize": 18, "textAlign": "center" }
        }"#;
        let area: Area = serde_json::from_str(json).unwrap();
        assert_eq!(area.id.as_str(), "a-1");
        assert_eq!(area.kind, AreaKind::Text);
        let styles = area.styles.unwrap();
        assert_eq!(styles.font_size, Some(18));
        assert_eq!(styles.text_align, Some(TextAlign::Center));
    }

    #[test]
    fn new_ids_are_unique() {
        assert_ne!(AreaId::new(), AreaId::new());
    }

    #[test]
    fn content_is_url_detection() {
        let a = Area::new(AreaKind::Button, 0, 0, 10, 10).with_content("/uploads/cta.jpg");
        assert!(a.content_is_url());
        let a = Area::new(AreaKind::Button, 0, 0, 10, 10).with_content("https://cdn/x.png");
        assert!(a.content_is_url());
        let a = Area::new(AreaKind::Button, 0, 0, 10, 10).with_content("Shop now");
        assert!(!a.content_is_url());
    }
}
