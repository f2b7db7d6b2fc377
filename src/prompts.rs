//! Prompts for block classification, whole-image analysis and copywriting.
//!
//! Every prompt lives here so wording changes never touch retry or parsing
//! logic, and unit tests can inspect prompts without a model.

/// System prompt for classifying one flat block.
pub const BLOCK_CLASSIFIER_SYSTEM: &str =
    "You are an email block classifier. Output ONLY a single-line JSON object. No explanation.";

/// User prompt sent with the crop of one flat block.
pub const BLOCK_CLASSIFIER_USER: &str = r##"This is a cropped section of an email on a plain/white background.
Classify it and respond with a single JSON object:
{"type":"text"|"button"|"color"|"spacer", "content":"exact visible text or empty string", "bgColor":"#rrggbb"}

Rules:
- "text": contains readable paragraph text → include ALL visible text in "content"
- "button": contains a CTA/button label → put label in "content", button bg color in "bgColor"
- "color": solid color stripe with no meaningful text → put its color in "bgColor"
- "spacer": blank whitespace → content and bgColor can be empty

Respond with ONLY the JSON object, one line."##;

/// System prompt for whole-image analysis.
pub const WHOLE_IMAGE_SYSTEM: &str =
    "You are an email layout analyst. Output ONLY a JSON array. No explanation, no markdown fences.";

/// User prompt for whole-image analysis. `{width}` and `{height}` are
/// replaced by [`whole_image_prompt`].
const WHOLE_IMAGE_USER: &str = r##"This image is a complete email design, {width}px wide and {height}px tall.
Split it top to bottom into full-width horizontal areas and respond with a JSON array:
[{"type":"slice"|"color"|"image"|"text"|"button"|"spacer", "x":0, "y":<top px>, "width":<px>, "height":<px>, "content":"visible text or empty string", "link":"", "bgColor":"#rrggbb"}]

Rules:
- coordinates are integer pixels of THIS image; areas must not overlap and must stay inside the image
- "text": readable paragraph text → include ALL visible text in "content"
- "button": a call-to-action → label in "content", button colour in "bgColor"
- "color": a solid colour band with no meaningful text → its colour in "bgColor"
- "spacer": blank whitespace
- "slice": photos, logos, illustrations or anything else that must stay an image

Respond with ONLY the JSON array."##;

/// Build the whole-image prompt for an image of the given size.
pub fn whole_image_prompt(width: u32, height: u32) -> String {
    WHOLE_IMAGE_USER
        .replace("{width}", &width.to_string())
        .replace("{height}", &height.to_string())
}

/// System prompt for writing new copy.
pub const SUGGEST_SYSTEM: &str = "You are an email marketing copywriter. Reply with ONLY the text, no quotes, no explanation.";

/// System prompt for rewriting existing copy.
pub const IMPROVE_SYSTEM: &str =
    "You are an email copy editor. Reply with ONLY the rewritten text, no quotes, no explanation.";

/// User prompt asking for paragraph or button copy.
pub fn suggest_prompt(is_button: bool, current_text: Option<&str>, context: Option<&str>) -> String {
    let mut prompt = if is_button {
        String::from("Write a short call-to-action label (2 to 4 words) for an email button.")
    } else {
        String::from("Write a short, engaging paragraph (1 to 3 sentences) for an email.")
    };
    if let Some(ctx) = context.map(str::trim).filter(|c| !c.is_empty()) {
        prompt.push_str(&format!("\nContext: {}", ctx));
    }
    if let Some(cur) = current_text.map(str::trim).filter(|c| !c.is_empty()) {
        prompt.push_str(&format!("\nCurrent text (improve on it): {}", cur));
    }
    prompt
}

/// User prompt asking for a rewrite of `text`, optionally steered by `instruction`.
pub fn improve_prompt(text: &str, instruction: Option<&str>) -> String {
    let mut prompt = format!("Rewrite the following text for email marketing:\n\n{}", text);
    if let Some(instr) = instruction.map(str::trim).filter(|i| !i.is_empty()) {
        prompt.push_str(&format!("\n\nInstruction: {}", instr));
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_prompt_lists_flat_types_only() {
        for t in ["\"text\"", "\"button\"", "\"color\"", "\"spacer\""] {
            assert!(BLOCK_CLASSIFIER_USER.contains(t), "missing {t}");
        }
        assert!(!BLOCK_CLASSIFIER_USER.contains("\"slice\""));
    }

    #[test]
    fn prompts_show_full_json_shape() {
        assert!(BLOCK_CLASSIFIER_USER.contains(r##""bgColor":"#rrggbb"}"##));
        assert!(BLOCK_CLASSIFIER_USER.ends_with("Respond with ONLY the JSON object, one line."));
        let p = whole_image_prompt(10, 10);
        assert!(p.contains(r##""bgColor":"#rrggbb"}]"##));
        assert!(p.ends_with("Respond with ONLY the JSON array."));
    }

    #[test]
    fn whole_image_prompt_has_dimensions() {
        let p = whole_image_prompt(600, 1800);
        assert!(p.contains("600px wide"));
        assert!(p.contains("1800px tall"));
        assert!(!p.contains("{width}"));
    }

    #[test]
    fn suggest_prompt_includes_context_and_current_text() {
        let p = suggest_prompt(true, Some("Buy"), Some("summer sale"));
        assert!(p.contains("call-to-action"));
        assert!(p.contains("summer sale"));
        assert!(p.contains("Buy"));
        let p = suggest_prompt(false, Some("  "), None);
        assert!(!p.contains("Current text"));
    }

    #[test]
    fn improve_prompt_appends_instruction() {
        let p = improve_prompt("hello", None);
        assert!(p.ends_with("hello"));
        assert!(!p.contains("Instruction"));
        assert!(improve_prompt("x", Some("Make it shorter")).ends_with("Instruction: Make it shorter"));
    }
}
