//! Email HTML generation: area list → table-based HTML email.
//!
//! Email clients are a hostile rendering target: Outlook on Windows uses
//! Word's engine (no `max-width`, no `border-radius`, no CSS buttons), many
//! webmail clients strip `<style>` blocks, and mobile clients need media
//! queries. The generator therefore:
//!
//! * lays everything out with nested `role="presentation"` tables;
//! * wraps the fluid container in fixed-width MSO "ghost" tables;
//! * renders buttons twice: a VML `v:roundrect` for Outlook and a
//!   bulletproof table button for everyone else;
//! * inlines the `<style>` rules onto each element with `css-inline`, keeping
//!   the `<style>` block so the mobile media query still applies where
//!   supported.
//!
//! Areas are rendered top to bottom by `y`; the caller's slice is never
//! mutated.

mod rows;

use crate::area::Area;
use crate::config::RenderConfig;
use crate::error::Img2EmailError;
use crate::pipeline::parse::sanitize_hex_color;
use std::fmt::Write;
use std::path::Path;
use tracing::debug;

pub use rows::render_row;

/// Outer page background around the container.
const PAGE_BACKGROUND: &str = "#f4f4f4";

/// Breakpoint of the mobile media query.
const MOBILE_BREAKPOINT: u32 = 620;

/// Renders area lists with one [`RenderConfig`].
#[derive(Debug, Clone, Default)]
pub struct EmailHtmlGenerator {
    config: RenderConfig,
}

impl EmailHtmlGenerator {
    pub fn new(config: RenderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Render `areas` into a complete HTML document.
    pub fn generate(&self, areas: &[Area]) -> Result<String, Img2EmailError> {
        let rows = self.rows(areas);
        debug!("Rendering {} rows from {} areas", rows.len(), areas.len());

        let mut html = String::with_capacity(4096 + rows.iter().map(String::len).sum::<usize>());
        html.push_str(&self.header());
        for row in &rows {
            html.push_str(row);
        }
        html.push_str(&self.footer());

        if self.config.inline_css {
            inline_css(&html)
        } else {
            Ok(html)
        }
    }

    /// Render each area to its `<tr>` markup, ordered by `y`. Areas that
    /// produce no row (an unresolved slice) are skipped.
    pub fn rows(&self, areas: &[Area]) -> Vec<String> {
        let mut sorted: Vec<&Area> = areas.iter().collect();
        sorted.sort_by_key(|a| a.y);
        sorted
            .into_iter()
            .filter_map(|a| render_row(a, &self.config))
            .collect()
    }

    fn header(&self) -> String {
        let c = &self.config;
        let width = c.email_width;
        let background = sanitize_hex_color(&c.background_color).unwrap_or_else(|| "#ffffff".to_string());
        let mut h = String::with_capacity(4096);

        let _ = write!(
            h,
            r#"<!DOCTYPE html>
<html lang="{lang}" xmlns="http://www.w3.org/1999/xhtml" xmlns:v="urn:schemas-microsoft-com:vml" xmlns:o="urn:schemas-microsoft-com:office:office">
<head>
  <meta charset="UTF-8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
  <meta http-equiv="X-UA-Compatible" content="IE=edge">
  <meta name="x-apple-disable-message-reformatting">
  <meta name="format-detection" content="telephone=no, address=no, email=no">
  <title>{title}</title>
  <!--[if mso]>
  <noscript>
    <xml>
      <o:OfficeDocumentSettings>
        <o:PixelsPerInch>96</o:PixelsPerInch>
      </o:OfficeDocumentSettings>
    </xml>
  </noscript>
  <![endif]-->
  <style>
    body {{ margin: 0; padding: 0; background-color: {page}; font-family: Arial, Helvetica, sans-serif; -webkit-text-size-adjust: 100%; -ms-text-size-adjust: 100%; }}
    table {{ border-spacing: 0; border-collapse: collapse; mso-table-lspace: 0pt; mso-table-rspace: 0pt; }}
    img {{ border: 0; display: block; outline: none; text-decoration: none; -ms-interpolation-mode: bicubic; }}
    a {{ text-decoration: none; }}
    .email-container {{ width: 100%; max-width: {width}px; }}
    .mobile-padding {{ padding: 16px 20px; }}
    @media only screen and (max-width: {bp}px) {{
      .email-wrapper {{ padding: 12px 0 !important; }}
      .email-container {{ width: 100% !important; max-width: 100% !important; }}
      .mobile-padding {{ padding: 12px 16px !important; }}
      .mobile-hide {{ display: none !important; }}
      .mobile-full-width {{ width: 100% !important; height: auto !important; }}
      .mobile-text {{ font-size: 15px !important; line-height: 1.5 !important; }}
      .mobile-button {{ display: block !important; width: 100% !important; max-width: 280px !important; margin: 0 auto !important; box-sizing: border-box !important; text-align: center !important; min-height: 44px !important; padding: 14px 24px !important; line-height: 1.3 !important; }}
    }}
  </style>
</head>
<body style="margin: 0; padding: 0; background-color: {page};">
  <table role="presentation" width="100%" border="0" cellspacing="0" cellpadding="0" style="background-color: {page};">
    <tr>
      <td align="center" class="email-wrapper" style="padding: 20px 0;">
        <!--[if mso | IE]>
        <table role="presentation" align="center" width="{width}" border="0" cellspacing="0" cellpadding="0"><tr><td width="{width}">
        <![endif]-->
        <table class="email-container" role="presentation" align="center" width="{width}" border="0" cellspacing="0" cellpadding="0" style="background-color: {bg}; width: 100%; max-width: {width}px;">
"#,
            lang = escape_attr(&c.lang),
            title = escape_html(&c.title),
            page = PAGE_BACKGROUND,
            width = width,
            bp = MOBILE_BREAKPOINT,
            bg = background,
        );
        h
    }

    fn footer(&self) -> String {
        String::from(
            r#"        </table>
        <!--[if mso | IE]>
        </td></tr></table>
        <![endif]-->
      </td>
    </tr>
  </table>
</body>
</html>
"#,
        )
    }
}

/// Render `areas` with `config`.
pub fn generate_email_html(areas: &[Area], config: &RenderConfig) -> Result<String, Img2EmailError> {
    EmailHtmlGenerator::new(config.clone()).generate(areas)
}

/// Render `areas` and write the document atomically (temp file + rename).
pub async fn render_to_file(
    areas: &[Area],
    output_path: impl AsRef<Path>,
    config: &RenderConfig,
) -> Result<usize, Img2EmailError> {
    let html = generate_email_html(areas, config)?;
    let path = output_path.as_ref();
    let write_err = |e| Img2EmailError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let tmp_path = path.with_extension("html.tmp");
    tokio::fs::write(&tmp_path, &html).await.map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;

    Ok(html.len())
}

/// Move `<style>` rules onto elements, keeping the `<style>` block.
pub fn inline_css(html: &str) -> Result<String, Img2EmailError> {
    css_inline::CSSInliner::options()
        .keep_style_tags(true)
        .build()
        .inline(html)
        .map_err(|e| Img2EmailError::CssInlineFailed(e.to_string()))
}

// ── Escaping helpers ─────────────────────────────────────────────────────

/// Escape text content (`& < > "`).
pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Escape an attribute value such as a URL.
pub fn escape_attr(s: &str) -> String {
    s.replace('&', "&amp;").replace('"', "&quot;")
}

/// Strip characters that could close a style declaration or attribute.
pub(crate) fn style_value(s: &str) -> String {
    s.chars()
        .filter(|c| !matches!(c, '"' | ';' | '<' | '>' | '{' | '}'))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Resolve `path` against `base_url`.
///
/// Empty inputs and absolute `http…` URLs are returned unchanged; otherwise
/// the base (without trailing `/`) and path are joined with exactly one `/`.
pub fn to_absolute_url(path: &str, base_url: Option<&str>) -> String {
    let base = base_url.unwrap_or("").trim_end_matches('/');
    if path.is_empty() || base.is_empty() || path.starts_with("http") {
        return path.to_string();
    }
    if path.starts_with('/') {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}", base, path)
    }
}
