//! Homepage body inspection: declared charset, decoding and word counts.

use scraper::{Html, Node, Selector};

/// Elements whose text never shows up on the rendered page.
const INVISIBLE_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

/// Extract the charset label from a Content-Type value, lowercased.
///
/// `text/html; charset="UTF-8"` gives `Some("utf-8")`.
pub fn charset_from_content_type(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        if !name.trim().eq_ignore_ascii_case("charset") {
            return None;
        }
        let value = value.trim().trim_matches(|c| c == '"' || c == '\'').trim();
        if value.is_empty() {
            None
        } else {
            Some(value.to_ascii_lowercase())
        }
    })
}

/// Whether a response with this Content-Type should be word-counted.
///
/// A missing Content-Type counts as HTML; homepages that omit it almost
/// always are.
pub fn is_html(content_type: Option<&str>) -> bool {
    match content_type {
        Some(ct) => ct.to_ascii_lowercase().contains("html"),
        None => true,
    }
}

/// Decode a body according to its declared charset.
///
/// A body that declares UTF-8 must be valid UTF-8; anything else is decoded
/// lossily. The error string describes where decoding broke.
pub fn decode_body(bytes: &[u8], charset: Option<&str>) -> Result<String, String> {
    match charset {
        Some("utf-8") | Some("utf8") => String::from_utf8(bytes.to_vec()).map_err(|e| {
            format!(
                "body declared utf-8 but holds invalid byte sequence at offset {}",
                e.utf8_error().valid_up_to()
            )
        }),
        _ => Ok(String::from_utf8_lossy(bytes).into_owned()),
    }
}

/// Count the words a visitor would see in an HTML document's body.
pub fn count_words(html: &str) -> usize {
    let document = Html::parse_document(html);

    let body_selector = Selector::parse("body").ok();
    let root = body_selector
        .as_ref()
        .and_then(|selector| document.select(selector).next())
        .unwrap_or_else(|| document.root_element());

    root.descendants()
        .filter(|node| !node.ancestors().any(|a| is_invisible(a.value())))
        .filter_map(|node| {
            node.value()
                .as_text()
                .map(|text| text.split_whitespace().count())
        })
        .sum()
}

fn is_invisible(node: &Node) -> bool {
    node.as_element()
        .map(|e| INVISIBLE_ELEMENTS.contains(&e.name()))
        .unwrap_or(false)
}
