use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

// Compile regexes once, reuse across calls
static SPAN_OPEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<span\b([^>]*)>").unwrap()
});

static ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([a-zA-Z_:][-a-zA-Z0-9_:.]*)\s*=\s*"([^"]*)""#).unwrap()
});

static BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<p\b[^>]*>.*?</p>|<h[1-6]\b[^>]*>.*?</h[1-6]>").unwrap()
});

static CODE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<pre\b[^>]*>.*?</pre>|<code\b[^>]*>.*?</code>").unwrap()
});

/// A mention of another document found in markup content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub object_id: String,
    pub object_class: String,
    /// Markup of the block that contains the mention, if any.
    pub parent_node: Option<String>,
}

/// Turns markup content into the references it contains.
pub trait ReferenceExtractor: Send + Sync {
    fn extract(&self, content: &str) -> Result<Vec<Reference>>;
}

/// Recognises `<span data-type="reference" data-id=".." data-objectclass="..">`
/// mention nodes. Mentions inside `<pre>` or `<code>` are ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkupReferenceExtractor;

impl ReferenceExtractor for MarkupReferenceExtractor {
    fn extract(&self, content: &str) -> Result<Vec<Reference>> {
        extract_references(content)
    }
}

/// Build a set of byte ranges matched by `re`.
fn ranges_of(re: &Regex, markup: &str) -> Vec<(usize, usize)> {
    re.find_iter(markup).map(|m| (m.start(), m.end())).collect()
}

/// Returns true if the byte offset falls within any of the ranges.
fn is_within(offset: usize, ranges: &[(usize, usize)]) -> bool {
    ranges.iter().any(|&(start, end)| offset >= start && offset < end)
}

fn decode_entities(value: &str) -> String {
    value
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Extract reference mentions from markup in document order.
///
/// A mention without a non-empty `data-id` or `data-objectclass` is malformed and
/// fails the whole extraction.
pub fn extract_references(markup: &str) -> Result<Vec<Reference>> {
    let excluded = ranges_of(&CODE_RE, markup);
    let blocks = ranges_of(&BLOCK_RE, markup);
    let mut references = Vec::new();

    for cap in SPAN_OPEN_RE.captures_iter(markup) {
        let Some(full_match) = cap.get(0) else {
            continue;
        };
        if is_within(full_match.start(), &excluded) {
            continue;
        }

        let mut node_type = None;
        let mut object_id = None;
        let mut object_class = None;
        for attr in ATTR_RE.captures_iter(&cap[1]) {
            let value = decode_entities(&attr[2]);
            match &attr[1] {
                "data-type" => node_type = Some(value),
                "data-id" => object_id = Some(value),
                "data-objectclass" => object_class = Some(value),
                _ => {}
            }
        }

        if node_type.as_deref() != Some("reference") {
            continue;
        }

        let object_id = object_id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| {
                Error::extraction(format!(
                    "reference at byte {} has no data-id",
                    full_match.start()
                ))
            })?;
        let object_class = object_class
            .filter(|class| !class.trim().is_empty())
            .ok_or_else(|| {
                Error::extraction(format!(
                    "reference to {} at byte {} has no data-objectclass",
                    object_id,
                    full_match.start()
                ))
            })?;

        // Innermost block wins: blocks never overlap, so the first hit is it.
        let parent_node = blocks
            .iter()
            .find(|&&(start, end)| full_match.start() >= start && full_match.start() < end)
            .map(|&(start, end)| markup[start..end].to_string());

        references.push(Reference {
            object_id,
            object_class,
            parent_node,
        });
    }

    Ok(references)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mention(id: &str, class: &str, label: &str) -> String {
        format!(
            r#"<span data-type="reference" data-id="{id}" data-objectclass="{class}" data-label="{label}">@{label}</span>"#
        )
    }

    #[test]
    fn extracts_single_reference_with_paragraph() {
        let markup = format!("<p>See {} for details</p>", mention("doc-2", "tracker:class:Issue", "TSK-2"));
        let refs = extract_references(&markup).unwrap();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].object_id, "doc-2");
        assert_eq!(refs[0].object_class, "tracker:class:Issue");
        assert_eq!(refs[0].parent_node.as_deref(), Some(markup.as_str()));
    }

    #[test]
    fn returns_empty_for_plain_markup() {
        let refs = extract_references("<p>nothing to see</p>").unwrap();
        assert!(refs.is_empty());
    }

    #[test]
    fn returns_empty_for_empty_content() {
        assert!(extract_references("").unwrap().is_empty());
    }

    #[test]
    fn keeps_document_order_across_blocks() {
        let first = format!("<p>{}</p>", mention("a", "c:A", "A"));
        let second = format!("<h2>{}</h2>", mention("b", "c:B", "B"));
        let markup = format!("{first}{second}");
        let refs = extract_references(&markup).unwrap();
        let ids: Vec<&str> = refs.iter().map(|r| r.object_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(refs[0].parent_node.as_deref(), Some(first.as_str()));
        assert_eq!(refs[1].parent_node.as_deref(), Some(second.as_str()));
    }

    #[test]
    fn attribute_order_does_not_matter() {
        let markup = r#"<p><span data-objectclass="c:X" data-label="X" data-id="x" data-type="reference">@X</span></p>"#;
        let refs = extract_references(markup).unwrap();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].object_id, "x");
    }

    #[test]
    fn ignores_other_spans() {
        let markup = r#"<p><span data-type="emoji" data-id="smile">:)</span></p>"#;
        assert!(extract_references(markup).unwrap().is_empty());
    }

    #[test]
    fn ignores_references_in_code() {
        let markup = format!(
            "<pre><code>{}</code></pre><p>{}</p>",
            mention("fake", "c:F", "F"),
            mention("real", "c:R", "R")
        );
        let refs = extract_references(&markup).unwrap();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].object_id, "real");
    }

    #[test]
    fn reference_outside_block_has_no_parent() {
        let markup = mention("loose", "c:L", "L");
        let refs = extract_references(&markup).unwrap();
        assert_eq!(refs[0].parent_node, None);
    }

    #[test]
    fn decodes_entities_in_attributes() {
        let markup = r#"<p><span data-type="reference" data-id="a&amp;b" data-objectclass="c:A">@A</span></p>"#;
        let refs = extract_references(markup).unwrap();
        assert_eq!(refs[0].object_id, "a&b");
    }

    #[test]
    fn missing_id_is_an_extraction_error() {
        let markup = r#"<p><span data-type="reference" data-objectclass="c:A">@A</span></p>"#;
        let err = extract_references(markup).unwrap_err();
        assert!(matches!(err, Error::Extraction { .. }), "got {err:?}");
    }

    #[test]
    fn empty_class_is_an_extraction_error() {
        let markup = r#"<p><span data-type="reference" data-id="a" data-objectclass="">@A</span></p>"#;
        let err = extract_references(markup).unwrap_err();
        assert!(matches!(err, Error::Extraction { .. }), "got {err:?}");
    }

    #[test]
    fn extractor_trait_delegates() {
        let markup = format!("<p>{}</p>", mention("doc-9", "c:Doc", "Nine"));
        let refs = MarkupReferenceExtractor.extract(&markup).unwrap();
        assert_eq!(refs.len(), 1);
    }
}
