//! One `<tr>` per area.

use super::{escape_attr, escape_html, style_value, to_absolute_url};
use crate::area::{Area, AreaKind};
use crate::config::RenderConfig;
use crate::pipeline::normalize::DEFAULT_BUTTON_LABEL;
use crate::pipeline::parse::sanitize_hex_color;
use std::fmt::Write;
use tracing::debug;

const FONT_STACK: &str = "Arial, Helvetica, sans-serif";

/// Render one area, or `None` when it has nothing to show.
pub fn render_row(area: &Area, config: &RenderConfig) -> Option<String> {
    match area.kind {
        AreaKind::Color => Some(color_row(area)),
        AreaKind::Spacer => Some(spacer_row(area)),
        AreaKind::Text => Some(text_row(area)),
        AreaKind::Button if area.content_is_url() => image_row(area, config),
        AreaKind::Button => Some(button_row(area, config)),
        AreaKind::Image | AreaKind::Slice => {
            let row = image_row(area, config);
            if row.is_none() {
                debug!("Skipping {} area {} without an image URL", area.kind, area.id);
            }
            row
        }
    }
}

fn color_row(area: &Area) -> String {
    let styles = area.styles_or_default();
    let bg = color_or(styles.background_color.as_deref(), "#f0f0f0");
    let h = area.height.max(1);
    format!(
        r#"          <tr>
            <td height="{h}" style="background-color: {bg}; height: {h}px; line-height: 1px; font-size: 1px;"></td>
          </tr>
"#
    )
}

fn spacer_row(area: &Area) -> String {
    let h = area.height.max(1);
    format!(
        r#"          <tr>
            <td height="{h}" style="height: {h}px; line-height: {h}px; font-size: 1px;">&nbsp;</td>
          </tr>
"#
    )
}

fn text_row(area: &Area) -> String {
    let styles = area.styles_or_default();
    let font_size = styles.font_size.unwrap_or(16).max(1);
    let line_height = (f64::from(font_size) * 1.5).round() as u32;
    let color = color_or(styles.color.as_deref(), "#333333");
    let align = styles.text_align.unwrap_or_default().as_str();
    let padding = styles
        .padding
        .as_deref()
        .map(style_value)
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| "10px 20px".to_string());
    let weight = styles
        .font_weight
        .as_deref()
        .map(style_value)
        .filter(|w| !w.is_empty())
        .unwrap_or_else(|| "normal".to_string());
    let content = escape_html(area.content.as_deref().unwrap_or("")).replace('\n', "<br>");

    format!(
        r#"          <tr>
            <td class="mobile-padding mobile-text" align="{align}" style="padding: {padding}; font-family: {FONT_STACK}; font-size: {font_size}px; line-height: {line_height}px; color: {color}; text-align: {align}; font-weight: {weight};">
              {content}
            </td>
          </tr>
"#
    )
}

/// Image row for `image`, resolved `slice` and image-CTA `button` areas.
fn image_row(area: &Area, config: &RenderConfig) -> Option<String> {
    let src = area.content.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
    let src = escape_attr(&to_absolute_url(src, config.base_url.as_deref()));
    let (w, h) = fit_width(area.width, area.height, config.email_width);

    let img = format!(
        r#"<img src="{src}" alt="" width="{w}" height="{h}" class="mobile-full-width" style="display: block; width: 100%; max-width: {w}px; height: auto; border: 0;">"#
    );
    let link = match (area.kind, area.link.as_deref()) {
        (AreaKind::Button, link) => Some(link.unwrap_or("#")),
        (_, Some(link)) if !link.trim().is_empty() => Some(link),
        _ => None,
    };
    let inner = match link {
        Some(href) => format!(
            r#"<a href="{}" target="_blank" style="display: block;">{}</a>"#,
            escape_attr(href),
            img
        ),
        None => img,
    };

    Some(format!(
        r#"          <tr>
            <td align="center" style="padding: 0;">
              {inner}
            </td>
          </tr>
"#
    ))
}

fn button_row(area: &Area, config: &RenderConfig) -> String {
    let styles = area.styles_or_default();
    let bg = color_or(styles.background_color.as_deref(), "#007bff");
    let color = color_or(styles.color.as_deref(), "#ffffff");
    let font_size = styles.font_size.unwrap_or(16).max(1);
    let padding = styles
        .padding
        .as_deref()
        .map(style_value)
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| "12px 30px".to_string());
    let radius = styles
        .border_radius
        .as_deref()
        .map(style_value)
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| "4px".to_string());
    let label_raw = area
        .content
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or(DEFAULT_BUTTON_LABEL);
    let label = escape_html(label_raw);
    let href = escape_attr(area.link.as_deref().filter(|l| !l.trim().is_empty()).unwrap_or("#"));

    // VML geometry: label width estimate plus horizontal padding, capped to
    // the container; height from font size plus vertical padding.
    // Style strings may come from edited area JSON; lengths are untrusted.
    let (pad_v, pad_h) = padding_px(&padding);
    let vml_h = ((f64::from(font_size) * 1.3).round() as u32).saturating_add(pad_v.saturating_mul(2));
    let text_w = (label_raw.chars().count() as f64 * f64::from(font_size) * 0.6).round() as u32;
    let vml_w = text_w
        .saturating_add(pad_h.saturating_mul(2))
        .clamp(80, config.email_width.saturating_sub(40).max(80));
    let arc = (px(&radius).unwrap_or(4).saturating_mul(100) / vml_h.max(1)).min(50);

    let mut row = String::with_capacity(1536);
    let _ = write!(
        row,
        r#"          <tr>
            <td align="center" class="mobile-padding" style="padding: 20px;">
              <!--[if mso]>
              <v:roundrect xmlns:v="urn:schemas-microsoft-com:vml" xmlns:w="urn:schemas-microsoft-com:office:word" href="{href}" style="height:{vml_h}px;v-text-anchor:middle;width:{vml_w}px;" arcsize="{arc}%" stroke="f" fillcolor="{bg}">
                <w:anchorlock/>
                <center style="color:{color};font-family:{FONT_STACK};font-size:{font_size}px;font-weight:bold;">{label}</center>
              </v:roundrect>
              <![endif]-->
              <!--[if !mso]><!-->
              <table role="presentation" border="0" cellspacing="0" cellpadding="0" align="center">
                <tr>
                  <td align="center" bgcolor="{bg}" style="border-radius: {radius}; background-color: {bg};">
                    <a href="{href}" target="_blank" class="mobile-button" style="display: inline-block; padding: {padding}; font-family: {FONT_STACK}; font-size: {font_size}px; color: {color}; text-decoration: none; font-weight: bold; border-radius: {radius};">{label}</a>
                  </td>
                </tr>
              </table>
              <!--<![endif]-->
            </td>
          </tr>
"#
    );
    row
}

// ── Helpers ──────────────────────────────────────────────────────────────

/// A validated colour, or `default`.
fn color_or(value: Option<&str>, default: &str) -> String {
    value
        .and_then(sanitize_hex_color)
        .unwrap_or_else(|| default.to_string())
}

/// Scale `(width, height)` down so the width fits `max_width`.
fn fit_width(width: u32, height: u32, max_width: u32) -> (u32, u32) {
    let (w, h) = (width.max(1), height.max(1));
    if w <= max_width {
        return (w, h);
    }
    let scaled = (f64::from(h) * f64::from(max_width) / f64::from(w)).round() as u32;
    (max_width, scaled.max(1))
}

/// Leading integer of a CSS length like `"4px"`.
fn px(s: &str) -> Option<u32> {
    let digits: String = s.trim().chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// Vertical and horizontal padding in pixels from a CSS shorthand.
fn padding_px(padding: &str) -> (u32, u32) {
    let parts: Vec<u32> = padding.split_whitespace().filter_map(px).collect();
    match parts.as_slice() {
        [all] => (*all, *all),
        [v, h, ..] => (*v, *h),
        [] => (12, 30),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::area::{AreaStyles, TextAlign};

    fn cfg() -> RenderConfig {
        RenderConfig::builder()
            .base_url("https://cdn.example.com/")
            .inline_css(false)
            .build()
            .unwrap()
    }

    #[test]
    fn unresolved_slice_renders_nothing() {
        let area = Area::new(AreaKind::Slice, 0, 0, 600, 200);
        assert!(render_row(&area, &cfg()).is_none());
    }

    #[test]
    fn resolved_slice_renders_scaled_image_against_base_url() {
        let area = Area::new(AreaKind::Slice, 0, 0, 1200, 400).with_content("/uploads/s1.jpg");
        let row = render_row(&area, &cfg()).unwrap();
        assert!(row.contains(r#"src="https://cdn.example.com/uploads/s1.jpg""#));
        assert!(row.contains(r#"width="600" height="200""#));
        assert!(!row.contains("<a "));
    }

    #[test]
    fn linked_image_is_wrapped_in_anchor() {
        let area = Area::new(AreaKind::Image, 0, 0, 300, 100)
            .with_content("https://img/x.png")
            .with_link("https://shop/?a=1&b=2");
        let row = render_row(&area, &cfg()).unwrap();
        assert!(row.contains(r#"<a href="https://shop/?a=1&amp;b=2""#));
        assert!(row.contains(r#"width="300" height="100""#));
    }

    #[test]
    fn text_row_escapes_and_breaks_lines() {
        let area = Area::new(AreaKind::Text, 0, 0, 600, 80)
            .with_content("Hello <you>\nsecond line")
            .with_styles(AreaStyles {
                font_size: Some(20),
                text_align: Some(TextAlign::Center),
                ..Default::default()
            });
        let row = render_row(&area, &cfg()).unwrap();
        assert!(row.contains("Hello &lt;you&gt;<br>second line"));
        assert!(row.contains("font-size: 20px"));
        assert!(row.contains("line-height: 30px"));
        assert!(row.contains("text-align: center"));
        assert!(row.contains("padding: 10px 20px"));
    }

    #[test]
    fn text_row_ignores_injected_colour() {
        let area = Area::new(AreaKind::Text, 0, 0, 600, 80).with_styles(AreaStyles {
            color: Some("red\" onload=\"x".into()),
            ..Default::default()
        });
        let row = render_row(&area, &cfg()).unwrap();
        assert!(row.contains("color: #333333"));
        assert!(!row.contains("onload"));
    }

    #[test]
    fn button_has_vml_and_html_versions() {
        let area = Area::new(AreaKind::Button, 0, 0, 600, 60)
            .with_content("Shop now")
            .with_styles(AreaStyles {
                background_color: Some("#ff6600".into()),
                color: Some("#000000".into()),
                ..Default::default()
            });
        let row = render_row(&area, &cfg()).unwrap();
        assert!(row.contains("<v:roundrect"));
        assert!(row.contains(r##"fillcolor="#ff6600""##));
        assert!(row.contains("<!--[if !mso]><!-->"));
        assert!(row.contains(r##"href="#""##));
        assert_eq!(row.matches("Shop now").count(), 2);
        assert!(row.contains("color: #000000"));
    }

    #[test]
    fn huge_button_lengths_saturate() {
        let area = Area::new(AreaKind::Button, 0, 0, 600, 60)
            .with_content("Go")
            .with_styles(AreaStyles {
                padding: Some("4000000000px 3000000000px".into()),
                border_radius: Some("4294967295px".into()),
                font_size: Some(u32::MAX),
                ..Default::default()
            });
        let row = render_row(&area, &cfg()).unwrap();
        assert!(row.contains("width:560px;"));
        assert!(row.contains(&format!("height:{}px;", u32::MAX)));
        assert!(row.contains(r#"arcsize="1%""#));
    }

    #[test]
    fn button_without_label_uses_default() {
        let area = Area::new(AreaKind::Button, 0, 0, 600, 60);
        let row = render_row(&area, &cfg()).unwrap();
        assert!(row.contains(DEFAULT_BUTTON_LABEL));
        assert!(row.contains("background-color: #007bff"));
    }

    #[test]
    fn image_button_is_linked_image() {
        let area = Area::new(AreaKind::Button, 0, 0, 300, 60)
            .with_content("/uploads/cta.jpg")
            .with_link("https://shop");
        let row = render_row(&area, &cfg()).unwrap();
        assert!(row.contains(r#"<a href="https://shop""#));
        assert!(row.contains("cta.jpg"));
        assert!(!row.contains("v:roundrect"));
    }

    #[test]
    fn color_and_spacer_rows() {
        let color = render_row(&Area::new(AreaKind::Color, 0, 0, 600, 24), &cfg()).unwrap();
        assert!(color.contains("background-color: #f0f0f0; height: 24px"));
        assert!(color.contains("font-size: 1px;\"></td>"));
        assert!(!color.contains("&nbsp;"));
        let spacer = render_row(&Area::new(AreaKind::Spacer, 0, 0, 600, 32), &cfg()).unwrap();
        assert!(spacer.contains("height: 32px; line-height: 32px"));
    }

    #[test]
    fn geometry_helpers() {
        assert_eq!(fit_width(1200, 401, 600), (600, 201));
        assert_eq!(fit_width(300, 50, 600), (300, 50));
        assert_eq!(padding_px("14px 32px"), (14, 32));
        assert_eq!(padding_px("8px"), (8, 8));
        assert_eq!(px("4px"), Some(4));
        assert_eq!(px("auto"), None);
    }
}
