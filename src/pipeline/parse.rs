//! Response parsing: turn free-form model output into structured values.
//!
//! Vision models are asked for a single JSON value but regularly wrap it in
//! ` ```json ` fences, prefix it with prose ("Sure! Here is…") or append an
//! explanation. Nothing here ever fails: malformed output degrades to empty
//! fields and the caller's defaults take over.
//!
//! ## Steps
//!
//! 1. Strip outer markdown fences.
//! 2. Extract the first balanced top-level JSON object (or array) by bracket
//!    matching, skipping brackets inside string literals.
//! 3. `serde_json` into a loose [`serde_json::Value`]; read known keys
//!    defensively.

use crate::area::AreaKind;
use crate::pipeline::normalize::RawArea;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

// ── Fences ───────────────────────────────────────────────────────────────

static RE_OPEN_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^```[a-z]*\s*").expect("valid regex"));
static RE_CLOSE_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*```\s*$").expect("valid regex"));

/// Remove a leading ` ``` ` / ` ```json ` fence and a trailing ` ``` `.
pub fn strip_code_fences(input: &str) -> String {
    let s = input.trim();
    let s = RE_OPEN_FENCE.replace(s, "");
    RE_CLOSE_FENCE.replace(&s, "").to_string()
}

// ── JSON extraction ──────────────────────────────────────────────────────

/// Return the first balanced `open … close` span in `input`.
///
/// Brackets inside JSON string literals (including escaped quotes) are
/// ignored. An unterminated span yields `None`.
pub fn extract_balanced(input: &str, open: char, close: char) -> Option<&str> {
    let start = input.find(open)?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in input[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            c if c == open => depth += 1,
            c if c == close => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset + ch.len_utf8();
                    return Some(&input[start..end]);
                }
            }
            _ => {}
        }
    }
    None
}

/// First top-level JSON object in `input`, parsed. Empty object on failure.
fn first_object(input: &str) -> serde_json::Map<String, Value> {
    let cleaned = strip_code_fences(input);
    extract_balanced(&cleaned, '{', '}')
        .and_then(|s| serde_json::from_str::<Value>(s).ok())
        .and_then(|v| match v {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .unwrap_or_default()
}

// ── Colours ──────────────────────────────────────────────────────────────

/// Validate a CSS hex colour (`#rgb` or `#rrggbb`) and return it lowercased.
pub fn sanitize_hex_color(input: &str) -> Option<String> {
    let s = input.trim();
    let hex = s.strip_prefix('#')?;
    if (hex.len() == 3 || hex.len() == 6) && hex.chars().all(|c| c.is_ascii_hexdigit()) {
        Some(format!("#{}", hex.to_ascii_lowercase()))
    } else {
        None
    }
}

/// Parse a `#rgb` / `#rrggbb` colour into its channels.
pub fn hex_to_rgb(input: &str) -> Option<(u8, u8, u8)> {
    let s = sanitize_hex_color(input)?;
    let hex = &s[1..];
    let channel = |i: usize, len: usize| {
        let part = &hex[i * len..i * len + len];
        let v = u8::from_str_radix(part, 16).ok()?;
        Some(if len == 1 { v * 17 } else { v })
    };
    let len = hex.len() / 3;
    Some((channel(0, len)?, channel(1, len)?, channel(2, len)?))
}

// ── Block classification ─────────────────────────────────────────────────

/// Types a flat block may be classified as.
const FLAT_KINDS: [AreaKind; 4] = [
    AreaKind::Text,
    AreaKind::Button,
    AreaKind::Color,
    AreaKind::Spacer,
];

/// What the classifier said about one flat block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockClassification {
    pub kind: AreaKind,
    /// Trimmed text content; `None` when absent or blank.
    pub content: Option<String>,
    /// Validated background colour; `None` when absent or invalid.
    pub bg_color: Option<String>,
}

/// Parse a block-classifier response.
///
/// Never fails: a response that is not JSON, lacks `type`, or names a type
/// outside `text | button | color | spacer` is read as a spacer.
pub fn parse_block_classification(raw: &str) -> BlockClassification {
    let obj = first_object(raw);

    let kind = obj
        .get("type")
        .and_then(Value::as_str)
        .and_then(AreaKind::parse)
        .filter(|k| FLAT_KINDS.contains(k))
        .unwrap_or(AreaKind::Spacer);

    let content = obj
        .get("content")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    let bg_color = obj
        .get("bgColor")
        .or_else(|| obj.get("backgroundColor"))
        .and_then(Value::as_str)
        .and_then(sanitize_hex_color);

    BlockClassification {
        kind,
        content,
        bg_color,
    }
}

// ── Whole-image analysis ─────────────────────────────────────────────────

/// Parse a whole-image response into raw areas.
///
/// Accepts a JSON array of area objects or an object holding them under
/// `areas`. Elements that are not objects are skipped. Returns an empty list
/// when nothing parseable is found.
pub fn parse_whole_image_areas(raw: &str) -> Vec<RawArea> {
    let cleaned = strip_code_fences(raw);

    let array_pos = cleaned.find('[');
    let object_pos = cleaned.find('{');
    let items: Vec<Value> = match (array_pos, object_pos) {
        // A bare array comes first.
        (Some(a), o) if o.is_none_or(|o| a < o) => extract_balanced(&cleaned, '[', ']')
            .and_then(|s| serde_json::from_str::<Vec<Value>>(s).ok())
            .unwrap_or_default(),
        (_, Some(_)) => extract_balanced(&cleaned, '{', '}')
            .and_then(|s| serde_json::from_str::<Value>(s).ok())
            .and_then(|v| v.get("areas").cloned())
            .and_then(|v| match v {
                Value::Array(items) => Some(items),
                _ => None,
            })
            .unwrap_or_default(),
        _ => Vec::new(),
    };

    items.iter().filter_map(raw_area_from_value).collect()
}

fn raw_area_from_value(v: &Value) -> Option<RawArea> {
    let obj = v.as_object()?;
    let num = |key: &str| obj.get(key).and_then(number_like);
    let text = |key: &str| obj.get(key).and_then(Value::as_str).map(str::to_string);

    Some(RawArea {
        kind: text("type"),
        x: num("x"),
        y: num("y"),
        width: num("width"),
        height: num("height"),
        content: text("content"),
        link: text("link"),
        bg_color: text("bgColor").or_else(|| text("backgroundColor")),
        styles: None,
    })
}

/// Numbers, or numeric strings like `"120"` / `"120px"`.
fn number_like(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches("px").trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_json_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n[1]\n```  "), "[1]");
        assert_eq!(strip_code_fences("{\"a\":1}"), "{\"a\":1}");
    }

    #[test]
    fn balanced_extraction_ignores_brackets_in_strings() {
        let s = r#"Here: {"content":"a } tricky \" {","type":"text"} and more {"x":1}"#;
        let obj = extract_balanced(s, '{', '}').unwrap();
        assert_eq!(obj, r#"{"content":"a } tricky \" {","type":"text"}"#);
        assert!(extract_balanced("{ never closed", '{', '}').is_none());
        assert!(extract_balanced("no json", '{', '}').is_none());
    }

    #[test]
    fn classification_with_fences_and_prose() {
        let raw = "Sure!\n```json\n{\"type\":\"button\",\"content\":\" Buy now \",\"bgColor\":\"#FF0000\"}\n```\nHope this helps.";
        let c = parse_block_classification(raw);
        assert_eq!(c.kind, AreaKind::Button);
        assert_eq!(c.content.as_deref(), Some("Buy now"));
        assert_eq!(c.bg_color.as_deref(), Some("#ff0000"));
    }

    #[test]
    fn classification_trailing_prose_after_object() {
        let c = parse_block_classification(
            "{\"type\":\"text\",\"content\":\"Hello\"} The block contains a greeting.",
        );
        assert_eq!(c.kind, AreaKind::Text);
        assert_eq!(c.content.as_deref(), Some("Hello"));
    }

    #[test]
    fn classification_unknown_or_missing_type_is_spacer() {
        assert_eq!(
            parse_block_classification("{\"type\":\"headline\"}").kind,
            AreaKind::Spacer
        );
        assert_eq!(
            parse_block_classification("{\"type\":\"slice\"}").kind,
            AreaKind::Spacer
        );
        assert_eq!(parse_block_classification("{}").kind, AreaKind::Spacer);
        let c = parse_block_classification("I cannot see any image.");
        assert_eq!(c.kind, AreaKind::Spacer);
        assert!(c.content.is_none());
        assert!(c.bg_color.is_none());
    }

    #[test]
    fn classification_rejects_invalid_colour() {
        let c = parse_block_classification("{\"type\":\"color\",\"bgColor\":\"red\"}");
        assert_eq!(c.kind, AreaKind::Color);
        assert!(c.bg_color.is_none());
    }

    #[test]
    fn hex_colour_validation() {
        assert_eq!(sanitize_hex_color("#FFF").as_deref(), Some("#fff"));
        assert_eq!(sanitize_hex_color(" #1a2B3c ").as_deref(), Some("#1a2b3c"));
        assert!(sanitize_hex_color("fff").is_none());
        assert!(sanitize_hex_color("#ffff").is_none());
        assert!(sanitize_hex_color("#gggggg").is_none());
        assert!(sanitize_hex_color("#fff;background:url(x)").is_none());
    }

    #[test]
    fn hex_to_rgb_expands_short_form() {
        assert_eq!(hex_to_rgb("#fff"), Some((255, 255, 255)));
        assert_eq!(hex_to_rgb("#808080"), Some((128, 128, 128)));
        assert_eq!(hex_to_rgb("nope"), None);
    }

    #[test]
    fn whole_image_array() {
        let raw = r#"```json
[
  {"type":"text","x":0,"y":"10px","width":600,"height":40,"content":"Hi"},
  "garbage",
  {"type":"banner","x":0,"y":60,"width":600,"height":200}
]
```"#;
        let areas = parse_whole_image_areas(raw);
        assert_eq!(areas.len(), 2);
        assert_eq!(areas[0].kind.as_deref(), Some("text"));
        assert_eq!(areas[0].y, Some(10.0));
        assert_eq!(areas[1].kind.as_deref(), Some("banner"));
    }

    #[test]
    fn whole_image_object_with_areas_key() {
        let raw = r#"{"areas":[{"type":"spacer","x":0,"y":0,"width":600,"height":40}]}"#;
        let areas = parse_whole_image_areas(raw);
        assert_eq!(areas.len(), 1);
        assert_eq!(areas[0].height, Some(40.0));
    }

    #[test]
    fn whole_image_garbage_is_empty() {
        assert!(parse_whole_image_areas("no layout here").is_empty());
        assert!(parse_whole_image_areas("{\"foo\":1}").is_empty());
    }
}
