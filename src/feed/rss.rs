//! RSS 2.0 document carrying the presence string as its only item.

use std::fmt::Write as _;

/// Stable identifier for the single item; readers dedupe on title changes.
const ITEM_GUID: &str = "playerwatch-presence";

/// Escape the five XML special characters.
#[must_use]
pub fn xml_escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Render the feed document.
#[must_use]
pub fn render_feed(title: &str, description: &str, presence: &str) -> String {
    let mut doc = String::with_capacity(384 + presence.len());
    doc.push_str("<?xml version=\"1.0\" encoding=\"utf-8\" ?>\n");
    doc.push_str("<rss version=\"2.0\">\n<channel>\n");
    let _ = writeln!(doc, "  <title>{}</title>", xml_escape(title));
    let _ = writeln!(doc, "  <description>{}</description>", xml_escape(description));
    doc.push_str("  <item>\n");
    let _ = writeln!(doc, "    <title>{}</title>", xml_escape(presence));
    let _ = writeln!(doc, "    <guid isPermaLink=\"false\">{ITEM_GUID}</guid>");
    doc.push_str("  </item>\n</channel>\n</rss>\n");
    doc
}
