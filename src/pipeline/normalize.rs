//! Area normalization: coerce, clamp, default, sort and merge.
//!
//! Everything the model says is untrusted. This stage turns raw, possibly
//! nonsensical area descriptions into a list the generator can render
//! without further checks:
//!
//! 1. Unknown or missing `type` → the context fallback ([`KindFallback`]).
//! 2. Missing / non-finite / negative coordinates → 0; fractional → rounded.
//! 3. Rectangles are cut at the image edge. An origin is moved back only
//!    when the remaining size would fall below the minimum floor.
//! 4. Per-type style defaults fill absent style fields.
//! 5. Non-text areas below the floor are discarded.
//! 6. Stable sort by `y`.
//! 7. Adjacent `text` areas within `text_merge_gap` are merged, then text
//!    areas still below the floor are discarded.
//!
//! Running the pass twice gives the same list as running it once.

use crate::area::{Area, AreaKind, AreaStyles, TextAlign};
use crate::pipeline::parse::{hex_to_rgb, sanitize_hex_color};
use tracing::debug;

/// Label used for a button the classifier gave no text for.
pub const DEFAULT_BUTTON_LABEL: &str = "Click here";

const TEXT_FONT_SIZE: u32 = 16;
const TEXT_COLOR: &str = "#333333";
const TEXT_PADDING: &str = "12px 24px";
const BUTTON_BACKGROUND: &str = "#007bff";
const BUTTON_FONT_SIZE: u32 = 16;
const BUTTON_RADIUS: &str = "4px";
const BUTTON_PADDING: &str = "14px 32px";
const COLOR_FILL: &str = "#f0f0f0";

/// An area as described by a classifier, before any validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawArea {
    /// Type name as the model spelled it.
    pub kind: Option<String>,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub content: Option<String>,
    pub link: Option<String>,
    /// Background colour reported by the model or sampled from pixels.
    pub bg_color: Option<String>,
    pub styles: Option<AreaStyles>,
}

impl RawArea {
    /// A raw area with a known type and integer geometry.
    pub fn new(kind: AreaKind, x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            kind: Some(kind.as_str().to_string()),
            x: Some(f64::from(x)),
            y: Some(f64::from(y)),
            width: Some(f64::from(width)),
            height: Some(f64::from(height)),
            ..Default::default()
        }
    }
}

/// Type used when a raw area's type is missing or not recognised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KindFallback {
    /// Per-block classification: an unknown answer is blank space.
    #[default]
    Spacer,
    /// Whole-image classification: an unknown region is kept as a pixel crop.
    Slice,
}

impl KindFallback {
    pub fn kind(self) -> AreaKind {
        match self {
            KindFallback::Spacer => AreaKind::Spacer,
            KindFallback::Slice => AreaKind::Slice,
        }
    }
}

/// Parameters of one normalization pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizeOptions {
    pub image_width: u32,
    pub image_height: u32,
    /// Areas narrower than this are dropped (capped at the image width).
    pub min_width: u32,
    /// Areas shorter than this are dropped (capped at the image height).
    pub min_height: u32,
    pub text_merge_gap: u32,
    pub fallback: KindFallback,
}

impl NormalizeOptions {
    /// Defaults for an image of the given size: 50×36 floor, 25 px text gap.
    pub fn new(image_width: u32, image_height: u32) -> Self {
        Self {
            image_width,
            image_height,
            min_width: 50,
            min_height: 36,
            text_merge_gap: 25,
            fallback: KindFallback::Spacer,
        }
    }

    pub fn with_min_size(mut self, width: u32, height: u32) -> Self {
        self.min_width = width;
        self.min_height = height;
        self
    }

    pub fn with_text_merge_gap(mut self, gap: u32) -> Self {
        self.text_merge_gap = gap;
        self
    }

    pub fn with_fallback(mut self, fallback: KindFallback) -> Self {
        self.fallback = fallback;
        self
    }

    /// Effective minimum size: never larger than the image, never below 1.
    pub fn floor(&self) -> (u32, u32) {
        (
            self.min_width.min(self.image_width).max(1),
            self.min_height.min(self.image_height).max(1),
        )
    }
}

/// Validate raw classifier output into a clean, sorted, merged area list.
pub fn normalize_raw(raws: Vec<RawArea>, opts: &NormalizeOptions) -> Vec<Area> {
    let areas = raws.into_iter().map(|raw| area_from_raw(raw, opts)).collect();
    finish(areas, opts)
}

/// Re-normalize an existing area list (e.g. one read back from the store).
///
/// Identifiers are preserved; geometry is clamped, defaults are filled and
/// text runs are merged exactly as for fresh classifier output.
pub fn normalize_areas(areas: Vec<Area>, opts: &NormalizeOptions) -> Vec<Area> {
    let areas = areas
        .into_iter()
        .map(|mut area| {
            let (x, y, width, height) = fit_rect(
                f64::from(area.x),
                f64::from(area.y),
                f64::from(area.width),
                f64::from(area.height),
                opts,
            );
            area.x = x;
            area.y = y;
            area.width = width;
            area.height = height;
            let styles = area.styles.take().unwrap_or_default();
            area.styles = apply_style_defaults(area.kind, styles, None);
            area.content = default_content(area.kind, area.content.take());
            area.link = clean_link(area.link.take());
            area
        })
        .collect();
    finish(areas, opts)
}

/// Text colour readable on `background`: black on light, white on dark.
///
/// Luminance is `(0.299·R + 0.587·G + 0.114·B) / 255`; `>= 0.5` counts as
/// light. Unparseable input is treated as black.
pub fn contrast_color(background: &str) -> &'static str {
    let (r, g, b) = hex_to_rgb(background).unwrap_or((0, 0, 0));
    let luminance = (0.299 * f64::from(r) + 0.587 * f64::from(g) + 0.114 * f64::from(b)) / 255.0;
    if luminance >= 0.5 {
        "#000000"
    } else {
        "#ffffff"
    }
}

/// Merge each `text` area into the preceding `text` area when the vertical
/// gap between them is at most `max_gap` (overlaps count as gap ≤ 0).
///
/// Input must already be sorted by `y`. Merging produces the union rectangle
/// and joins the contents with a single space, dropping empty pieces. Any
/// other area type in between breaks the chain.
pub fn merge_adjacent_text(areas: Vec<Area>, max_gap: u32) -> Vec<Area> {
    let mut out: Vec<Area> = Vec::with_capacity(areas.len());

    for area in areas {
        if let Some(prev) = out.last_mut() {
            if prev.kind == AreaKind::Text && area.kind == AreaKind::Text {
                let gap = i64::from(area.y) - i64::from(prev.bottom());
                if gap <= i64::from(max_gap) {
                    merge_into(prev, area);
                    continue;
                }
            }
        }
        out.push(area);
    }
    out
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Sort, merge and apply the size floor.
///
/// Undersized text survives until after merging so that a paragraph split
/// into thin lines can still add up to a valid area.
fn finish(areas: Vec<Area>, opts: &NormalizeOptions) -> Vec<Area> {
    let total = areas.len();
    let mut areas: Vec<Area> = areas
        .into_iter()
        .filter(|a| a.kind == AreaKind::Text || meets_floor(a, opts))
        .collect();
    areas.sort_by_key(|a| a.y);

    let mut areas = merge_adjacent_text(areas, opts.text_merge_gap);
    areas.retain(|a| meets_floor(a, opts));
    if areas.len() < total {
        debug!(
            "Normalization reduced {} areas to {} (size floor and text merge)",
            total,
            areas.len()
        );
    }
    areas
}

fn meets_floor(area: &Area, opts: &NormalizeOptions) -> bool {
    let (floor_w, floor_h) = opts.floor();
    area.width >= floor_w && area.height >= floor_h
}

fn area_from_raw(raw: RawArea, opts: &NormalizeOptions) -> Area {
    let kind = raw
        .kind
        .as_deref()
        .and_then(AreaKind::parse)
        .unwrap_or_else(|| opts.fallback.kind());

    let coord = |v: Option<f64>| v.unwrap_or(0.0);
    let (x, y, width, height) = fit_rect(
        coord(raw.x),
        coord(raw.y),
        coord(raw.width),
        coord(raw.height),
        opts,
    );

    let bg_hint = raw.bg_color.as_deref().and_then(sanitize_hex_color);
    let styles = apply_style_defaults(kind, raw.styles.unwrap_or_default(), bg_hint.as_deref());

    let content = raw
        .content
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty());

    let mut area = Area::new(kind, x, y, width, height);
    area.content = default_content(kind, content);
    area.link = clean_link(raw.link);
    area.styles = styles;
    area
}

/// Round a coordinate to a non-negative integer; NaN and ±∞ become 0.
fn to_pixels(v: f64) -> u32 {
    if !v.is_finite() || v <= 0.0 {
        0
    } else if v >= f64::from(u32::MAX) {
        u32::MAX
    } else {
        v.round() as u32
    }
}

/// Fit a rectangle into the image.
///
/// Floor checks happen later; see [`fit_span`].
fn fit_rect(x: f64, y: f64, width: f64, height: f64, opts: &NormalizeOptions) -> (u32, u32, u32, u32) {
    let (floor_w, floor_h) = opts.floor();
    let (x, width) = fit_span(x, width, opts.image_width, floor_w);
    let (y, height) = fit_span(y, height, opts.image_height, floor_h);
    (x, y, width, height)
}

/// Fit one axis: `(start, length)` inside `0..limit`.
///
/// The span is cut at the edge where it starts. A span that reaches the
/// floor but would be cut below it is moved back just enough to keep
/// exactly `floor` pixels. `floor <= limit` holds by [`NormalizeOptions::floor`].
fn fit_span(start: f64, len: f64, limit: u32, floor: u32) -> (u32, u32) {
    let start = to_pixels(start).min(limit);
    let len = to_pixels(len).min(limit);
    let room = limit - start;
    if len <= room {
        (start, len)
    } else if room >= floor || len < floor {
        (start, room)
    } else {
        (limit - floor, floor)
    }
}

fn apply_style_defaults(kind: AreaKind, mut s: AreaStyles, bg_hint: Option<&str>) -> Option<AreaStyles> {
    let existing_bg = s.background_color.as_deref().and_then(sanitize_hex_color);

    match kind {
        AreaKind::Text => {
            s.font_size.get_or_insert(TEXT_FONT_SIZE);
            s.color.get_or_insert_with(|| TEXT_COLOR.to_string());
            s.text_align.get_or_insert(TextAlign::Left);
            s.padding.get_or_insert_with(|| TEXT_PADDING.to_string());
        }
        AreaKind::Button => {
            let bg = existing_bg
                .or_else(|| bg_hint.map(str::to_string))
                .unwrap_or_else(|| BUTTON_BACKGROUND.to_string());
            s.color.get_or_insert_with(|| contrast_color(&bg).to_string());
            s.background_color = Some(bg);
            s.font_size.get_or_insert(BUTTON_FONT_SIZE);
            s.border_radius.get_or_insert_with(|| BUTTON_RADIUS.to_string());
            s.padding.get_or_insert_with(|| BUTTON_PADDING.to_string());
        }
        AreaKind::Color => {
            let bg = existing_bg
                .or_else(|| bg_hint.map(str::to_string))
                .unwrap_or_else(|| COLOR_FILL.to_string());
            s.background_color = Some(bg);
        }
        AreaKind::Slice | AreaKind::Image | AreaKind::Spacer => {}
    }

    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

fn default_content(kind: AreaKind, content: Option<String>) -> Option<String> {
    match kind {
        AreaKind::Button => Some(
            content
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_BUTTON_LABEL.to_string()),
        ),
        AreaKind::Text => Some(content.unwrap_or_default()),
        _ => content,
    }
}

fn clean_link(link: Option<String>) -> Option<String> {
    link.map(|l| l.trim().to_string()).filter(|l| !l.is_empty())
}

fn merge_into(prev: &mut Area, next: Area) {
    let left = prev.x.min(next.x);
    let top = prev.y.min(next.y);
    let right = prev.right().max(next.right());
    let bottom = prev.bottom().max(next.bottom());
    prev.x = left;
    prev.y = top;
    prev.width = right - left;
    prev.height = bottom - top;

    let joined = [prev.content.take(), next.content]
        .into_iter()
        .flatten()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    prev.content = Some(joined);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> NormalizeOptions {
        NormalizeOptions::new(600, 1000)
    }

    fn text(y: u32, h: u32, content: &str) -> Area {
        Area::new(AreaKind::Text, 0, y, 600, h).with_content(content)
    }

    #[test]
    fn contrast_picks_readable_text() {
        assert_eq!(contrast_color("#000000"), "#ffffff");
        assert_eq!(contrast_color("#ffffff"), "#000000");
        assert_eq!(contrast_color("#808080"), "#000000");
        assert_eq!(contrast_color("#007bff"), "#ffffff");
        assert_eq!(contrast_color("not a colour"), "#ffffff");
    }

    #[test]
    fn unknown_type_uses_fallback() {
        let mut raw = RawArea::new(AreaKind::Text, 0, 0, 600, 50);
        raw.kind = Some("headline".into());
        let out = normalize_raw(vec![raw.clone()], &opts());
        assert_eq!(out[0].kind, AreaKind::Spacer);

        let out = normalize_raw(vec![raw], &opts().with_fallback(KindFallback::Slice));
        assert_eq!(out[0].kind, AreaKind::Slice);
    }

    #[test]
    fn coordinates_are_clamped_into_image() {
        let raw = RawArea {
            kind: Some("color".into()),
            x: Some(-20.0),
            y: Some(990.4),
            width: Some(900.0),
            height: Some(60.6),
            ..Default::default()
        };
        let out = normalize_raw(vec![raw], &opts());
        let a = &out[0];
        assert_eq!((a.x, a.width), (0, 600));
        // Only 10 px remain below y=990; the origin moves back to hold 36.
        assert_eq!((a.y, a.height), (964, 36));
        assert_eq!(a.bottom(), 1000);
    }

    #[test]
    fn oversized_area_is_cut_where_it_starts() {
        let raw = RawArea::new(AreaKind::Color, 0, 250, 80, 400);
        let out = normalize_raw(vec![raw], &NormalizeOptions::new(80, 300));
        assert_eq!((out[0].y, out[0].height), (250, 50));

        let wide = RawArea::new(AreaKind::Color, 500, 0, 900, 60);
        let out = normalize_raw(vec![wide], &opts());
        assert_eq!((out[0].x, out[0].width), (500, 100));
    }

    #[test]
    fn clamped_band_keeps_its_place_in_order() {
        let raws = vec![
            RawArea::new(AreaKind::Text, 0, 0, 80, 100),
            RawArea::new(AreaKind::Image, 0, 100, 80, 100),
            RawArea::new(AreaKind::Color, 0, 250, 80, 400),
        ];
        let out = normalize_raw(raws, &NormalizeOptions::new(80, 300));
        let kinds: Vec<AreaKind> = out.iter().map(|a| a.kind).collect();
        assert_eq!(kinds, vec![AreaKind::Text, AreaKind::Image, AreaKind::Color]);
        assert_eq!(out[2].bottom(), 300);
    }

    #[test]
    fn non_finite_and_missing_coordinates_default_to_zero() {
        let raw = RawArea {
            kind: Some("spacer".into()),
            x: Some(f64::NAN),
            y: None,
            width: Some(100.0),
            height: Some(40.0),
            ..Default::default()
        };
        let out = normalize_raw(vec![raw], &opts());
        assert_eq!((out[0].x, out[0].y), (0, 0));
    }

    #[test]
    fn small_areas_are_discarded() {
        let raws = vec![
            RawArea::new(AreaKind::Text, 0, 0, 40, 100),
            RawArea::new(AreaKind::Text, 0, 200, 600, 20),
            RawArea::new(AreaKind::Color, 0, 400, 50, 36),
        ];
        let out = normalize_raw(raws, &opts());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind, AreaKind::Color);
    }

    #[test]
    fn floor_is_capped_by_image_size() {
        let small = NormalizeOptions::new(30, 20);
        assert_eq!(small.floor(), (30, 20));
        let out = normalize_raw(vec![RawArea::new(AreaKind::Spacer, 0, 0, 30, 20)], &small);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn style_defaults_per_type() {
        let mut button = RawArea::new(AreaKind::Button, 0, 0, 600, 50);
        button.bg_color = Some("#ffffff".into());
        let raws = vec![
            RawArea::new(AreaKind::Text, 0, 100, 600, 50),
            button,
            RawArea::new(AreaKind::Color, 0, 200, 600, 50),
        ];
        let out = normalize_raw(raws, &opts());

        let b = out[0].styles.clone().unwrap();
        assert_eq!(b.background_color.as_deref(), Some("#ffffff"));
        assert_eq!(b.color.as_deref(), Some("#000000"));
        assert_eq!(b.border_radius.as_deref(), Some("4px"));
        assert_eq!(out[0].content.as_deref(), Some(DEFAULT_BUTTON_LABEL));

        let t = out[1].styles.clone().unwrap();
        assert_eq!(t.font_size, Some(16));
        assert_eq!(t.color.as_deref(), Some("#333333"));
        assert_eq!(t.text_align, Some(TextAlign::Left));
        assert_eq!(t.padding.as_deref(), Some("12px 24px"));
        assert_eq!(out[1].content.as_deref(), Some(""));

        let c = out[2].styles.clone().unwrap();
        assert_eq!(c.background_color.as_deref(), Some("#f0f0f0"));
    }

    #[test]
    fn button_without_hint_gets_blue_with_white_text() {
        let out = normalize_raw(vec![RawArea::new(AreaKind::Button, 0, 0, 600, 50)], &opts());
        let s = out[0].styles.clone().unwrap();
        assert_eq!(s.background_color.as_deref(), Some("#007bff"));
        assert_eq!(s.color.as_deref(), Some("#ffffff"));
    }

    #[test]
    fn sorts_by_y() {
        let raws = vec![
            RawArea::new(AreaKind::Spacer, 0, 500, 600, 50),
            RawArea::new(AreaKind::Color, 0, 0, 600, 50),
            RawArea::new(AreaKind::Spacer, 0, 200, 600, 50),
        ];
        let ys: Vec<u32> = normalize_raw(raws, &opts()).iter().map(|a| a.y).collect();
        assert_eq!(ys, vec![0, 200, 500]);
    }

    fn raw_text(y: u32, h: u32, content: &str) -> RawArea {
        RawArea {
            content: Some(content.into()),
            ..RawArea::new(AreaKind::Text, 0, y, 600, h)
        }
    }

    #[test]
    fn thin_text_lines_merge_before_the_floor_applies() {
        let out = normalize_raw(vec![raw_text(100, 20, "Hello"), raw_text(125, 15, "world")], &opts());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind, AreaKind::Text);
        assert_eq!((out[0].y, out[0].height), (100, 40));
        assert_eq!(out[0].content.as_deref(), Some("Hello world"));
        assert_eq!(normalize_areas(out.clone(), &opts()), out);
    }

    #[test]
    fn text_lines_beyond_gap_stay_separate() {
        let raws = vec![raw_text(100, 40, "Hello"), raw_text(180, 40, "world")];
        let out = normalize_raw(raws, &opts());
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].content.as_deref(), Some("Hello"));
        assert_eq!(out[1].y, 180);

        // Too thin on their own and too far apart to merge.
        let out = normalize_raw(vec![raw_text(100, 20, "Hello"), raw_text(160, 15, "world")], &opts());
        assert!(out.is_empty());
    }

    #[test]
    fn text_within_gap_merges() {
        let out = merge_adjacent_text(vec![text(0, 40, "Hello"), text(45, 40, "world")], 25);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].content.as_deref(), Some("Hello world"));
        assert_eq!((out[0].y, out[0].height), (0, 85));
    }

    #[test]
    fn text_beyond_gap_stays_separate() {
        let out = merge_adjacent_text(vec![text(0, 40, "Hello"), text(80, 40, "world")], 25);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn overlapping_text_merges_with_max_bottom() {
        let out = merge_adjacent_text(vec![text(0, 100, "outer"), text(10, 20, "inner")], 25);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].height, 100);
    }

    #[test]
    fn other_types_break_the_text_chain() {
        let areas = vec![
            text(0, 40, "a"),
            Area::new(AreaKind::Spacer, 0, 42, 600, 40),
            text(84, 40, "b"),
        ];
        assert_eq!(merge_adjacent_text(areas, 25).len(), 3);
    }

    #[test]
    fn merge_drops_empty_pieces() {
        let out = merge_adjacent_text(vec![text(0, 40, ""), text(40, 40, "Only")], 25);
        assert_eq!(out[0].content.as_deref(), Some("Only"));
    }

    #[test]
    fn normalization_is_idempotent() {
        let raws = vec![
            RawArea::new(AreaKind::Text, 0, 0, 600, 40),
            RawArea::new(AreaKind::Text, 0, 50, 600, 40),
            RawArea::new(AreaKind::Button, 10, 120, 300, 50),
            RawArea {
                kind: Some("mystery".into()),
                x: Some(-5.0),
                y: Some(980.0),
                width: Some(700.0),
                height: Some(80.0),
                ..Default::default()
            },
            RawArea::new(AreaKind::Color, 0, 300, 600, 60),
            RawArea::new(AreaKind::Text, 0, 400, 600, 20),
            RawArea::new(AreaKind::Text, 0, 430, 600, 20),
            RawArea::new(AreaKind::Spacer, 0, 470, 600, 10),
        ];
        let once = normalize_raw(raws, &opts());
        let twice = normalize_areas(once.clone(), &opts());
        assert_eq!(once, twice);
    }

    #[test]
    fn normalize_areas_preserves_ids() {
        let a = text(0, 40, "x");
        let id = a.id.clone();
        let out = normalize_areas(vec![a], &opts());
        assert_eq!(out[0].id, id);
    }
}
