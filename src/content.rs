//! Turning a database record into post text.

use crate::config::FieldNames;
use crate::notion::{FileObject, Page, PropertyValue, RichText};

pub const MAX_POST_LENGTH: usize = 280;
/// Leaves room for the t.co link X appends to posts with media.
pub const MAX_POST_LENGTH_WITH_MEDIA: usize = 270;
const ELLIPSIS: &str = "...";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedContent {
    pub title: String,
    pub body: String,
    pub image_urls: Vec<String>,
}

/// Read the title, body and image properties named by `fields`. A property that
/// is absent or of another type reads as empty.
pub fn extract(page: &Page, fields: &FieldNames) -> ExtractedContent {
    let title = match page.properties.get(&fields.title) {
        Some(PropertyValue::Title { title }) => title.iter().map(RichText::content).collect(),
        _ => String::new(),
    };

    let body = match page.properties.get(&fields.body) {
        Some(PropertyValue::RichText { rich_text }) => rich_text
            .iter()
            .filter(|run| run.kind == "text")
            .map(RichText::content)
            .collect(),
        _ => String::new(),
    };

    let image_urls = match page.properties.get(&fields.image) {
        Some(PropertyValue::Files { files }) => files
            .iter()
            .filter_map(FileObject::url)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    };

    ExtractedContent {
        title,
        body,
        image_urls,
    }
}

/// Render `【title】\nbody`, dropping whichever part is empty, and cut it to the
/// post length limit counted in characters.
pub fn format_post(content: &ExtractedContent) -> String {
    let mut parts = Vec::with_capacity(2);
    if !content.title.is_empty() {
        parts.push(format!("【{}】", content.title));
    }
    if !content.body.is_empty() {
        parts.push(content.body.clone());
    }
    let text = parts.join("\n");

    let limit = if content.image_urls.is_empty() {
        MAX_POST_LENGTH
    } else {
        MAX_POST_LENGTH_WITH_MEDIA
    };
    truncate(text, limit)
}

fn truncate(text: String, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text;
    }
    let mut cut: String = text.chars().take(limit - ELLIPSIS.len()).collect();
    cut.push_str(ELLIPSIS);
    cut
}

/// Human-readable summary of what was extracted from the record.
pub fn describe(content: &ExtractedContent) -> String {
    let rule = "=".repeat(60);
    let mut output = format!("{rule}\nExtracted record\n{rule}\n");

    output.push_str("\nTitle:\n");
    if content.title.is_empty() {
        output.push_str("   (no title)\n");
    } else {
        output.push_str(&format!("   {}\n", content.title));
    }

    output.push_str("\nText:\n");
    if content.body.is_empty() {
        output.push_str("   (no text)\n");
    } else {
        for line in content.body.split('\n') {
            output.push_str(&format!("   {line}\n"));
        }
    }

    output.push_str("\nImage URLs:\n");
    if content.image_urls.is_empty() {
        output.push_str("   (no images)\n");
    } else {
        for (i, url) in content.image_urls.iter().enumerate() {
            output.push_str(&format!("   {}. {url}\n", i + 1));
        }
    }

    output.push_str(&format!("\n{rule}"));
    output
}

/// The text about to be posted, framed with its character count.
pub fn preview(text: &str) -> String {
    let rule = "-".repeat(40);
    format!(
        "Post preview:\n{rule}\n{text}\nCharacters: {}\n{rule}",
        text.chars().count()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn content(title: &str, body: &str, images: &[&str]) -> ExtractedContent {
        ExtractedContent {
            title: title.into(),
            body: body.into(),
            image_urls: images.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn page(properties: serde_json::Value) -> Page {
        serde_json::from_value(json!({"id": "p", "properties": properties})).unwrap()
    }

    #[test]
    fn test_long_body_is_capped_at_280() {
        let body = "x".repeat(300);
        let text = format_post(&content("Hello World", &body, &[]));

        assert!(text.starts_with("【Hello World】\nxxx"));
        assert!(text.ends_with("xx..."));
        assert_eq!(text.chars().count(), 280);
    }

    #[test]
    fn test_cap_is_270_with_image() {
        let body = "y".repeat(300);
        let text = format_post(&content("", &body, &["https://img/a.png"]));
        assert_eq!(text.chars().count(), 270);
        assert_eq!(text, format!("{}...", "y".repeat(267)));
    }

    #[test]
    fn test_body_only_is_passed_through() {
        assert_eq!(format_post(&content("", "short text", &[])), "short text");
    }

    #[test]
    fn test_title_only_has_no_trailing_newline() {
        assert_eq!(format_post(&content("Quiz", "", &[])), "【Quiz】");
    }

    #[test]
    fn test_empty_record_formats_empty() {
        assert_eq!(format_post(&ExtractedContent::default()), "");
    }

    #[test]
    fn test_exact_limit_is_not_truncated() {
        let body = "あ".repeat(280);
        assert_eq!(format_post(&content("", &body, &[])), body);
    }

    #[test]
    fn test_truncation_counts_characters_not_bytes() {
        let body = "日本語".repeat(100);
        let text = format_post(&content("", &body, &[]));
        assert_eq!(text.chars().count(), 280);
        assert!(text.ends_with("..."));
    }

    #[test]
    fn test_extract_reads_named_properties() {
        let page = page(json!({
            "タイトル": {"type": "title", "title": [
                {"type": "text", "text": {"content": "Capital "}},
                {"type": "text", "text": {"content": "cities"}}
            ]},
            "テキスト": {"type": "rich_text", "rich_text": [
                {"type": "text", "text": {"content": "What is the capital of France?"}},
                {"type": "equation", "equation": {"expression": "x"}},
                {"type": "text", "text": {"content": "\nParis"}}
            ]},
            "画像": {"type": "files", "files": [
                {"type": "external", "external": {"url": ""}},
                {"type": "external", "external": {"url": "https://img/paris.jpg"}},
                {"type": "file", "file": {"url": "https://s3/eiffel.png"}}
            ]}
        }));

        let extracted = extract(&page, &FieldNames::default());
        assert_eq!(
            extracted,
            content(
                "Capital cities",
                "What is the capital of France?\nParis",
                &["https://img/paris.jpg", "https://s3/eiffel.png"],
            )
        );
    }

    #[test]
    fn test_extract_ignores_wrong_types_and_missing_fields() {
        let page = page(json!({
            "タイトル": {"type": "rich_text", "rich_text": [
                {"type": "text", "text": {"content": "not a title"}}
            ]},
            "画像": {"type": "url", "url": "https://img/x.png"}
        }));

        assert_eq!(extract(&page, &FieldNames::default()), ExtractedContent::default());
    }

    #[test]
    fn test_extract_uses_configured_names() {
        let page = page(json!({
            "Name": {"type": "title", "title": [{"type": "text", "text": {"content": "Custom"}}]}
        }));
        let fields = FieldNames {
            title: "Name".into(),
            ..FieldNames::default()
        };
        assert_eq!(extract(&page, &fields).title, "Custom");
    }

    #[test]
    fn test_describe_lists_images_and_placeholders() {
        let report = describe(&content("", "line one\nline two", &["https://a", "https://b"]));
        assert!(report.contains("(no title)"));
        assert!(report.contains("   line one\n   line two"));
        assert!(report.contains("   1. https://a\n   2. https://b"));
    }

    #[test]
    fn test_describe_full_layout() {
        let rule = "=".repeat(60);
        let report = describe(&content("Q1", "2 + 2 = ?", &[]));
        assert_eq!(
            report,
            format!(
                "{rule}\nExtracted record\n{rule}\n\
                 \nTitle:\n   Q1\n\
                 \nText:\n   2 + 2 = ?\n\
                 \nImage URLs:\n   (no images)\n\
                 \n{rule}"
            )
        );
    }

    #[test]
    fn test_preview_counts_characters() {
        assert!(preview("【題】").contains("Characters: 3"));
    }
}
