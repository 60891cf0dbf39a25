//! SVG baking.
//!
//! A baked SVG carries the assertion as the first child of the root element:
//!
//! ```text
//! <svg xmlns="http://www.w3.org/2000/svg" ... xmlns:openbadges="http://openbadges.org">
//!   <openbadges:assertion verify="<JWS>"><![CDATA[<canonical assertion JSON>]]></openbadges:assertion>
//!   ...original content...
//! </svg>
//! ```
//!
//! Renderers ignore elements in unknown namespaces, so the image is
//! unchanged for anything that does not look for the assertion. Only the
//! root start tag is rewritten; the rest of the document is copied verbatim.

use crate::errors::BakeError;
use openbadges_core::{Assertion, Signature};

/// Namespace URI Open Badges uses for baked SVG metadata.
pub const OPENBADGES_NAMESPACE: &str = "http://openbadges.org";

const NAMESPACE_ATTRIBUTE: &str = "xmlns:openbadges";
const ASSERTION_ELEMENT: &str = "openbadges:assertion";
const CDATA_OPEN: &str = "<![CDATA[";
const CDATA_CLOSE: &str = "]]>";
const UTF8_BOM: &str = "\u{feff}";

const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";
const JPEG_MAGIC: &[u8] = b"\xff\xd8\xff";
const GIF_MAGIC: &[u8] = b"GIF8";

/// Carrier formats the baker can write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    /// Scalable Vector Graphics.
    Svg,
}

impl ImageFormat {
    /// Conventional file extension.
    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Svg => "svg",
        }
    }
}

/// Carrier image with the signed assertion embedded. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BakedBadge {
    format: ImageFormat,
    bytes: Vec<u8>,
}

impl BakedBadge {
    /// Format of the carrier.
    pub fn format(&self) -> ImageFormat {
        self.format
    }

    /// Complete artifact bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Assertion material read back from a baked image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedAssertion {
    /// JWS compact serialization from the `verify` attribute.
    pub jws: String,
    /// Assertion JSON from the element body, if present.
    pub json: Option<String>,
}

/// Start tag of an element located in the document.
#[derive(Debug, Clone, Copy)]
struct StartTag<'a> {
    name: &'a str,
    /// Offset of `<`.
    start: usize,
    /// Offset just past the element name.
    name_end: usize,
    /// Offset just past `>`.
    end: usize,
    self_closing: bool,
}

/// Identifies the carrier format from its leading bytes.
pub fn detect_format(carrier: &[u8]) -> Result<ImageFormat, BakeError> {
    parse_svg(carrier).map(|_| ImageFormat::Svg)
}

/// Embeds `assertion` and its `signature` into an SVG carrier.
///
/// # Errors
///
/// - [`BakeError::UnsupportedImageFormat`] if the carrier is not SVG
/// - [`BakeError::BakeFailure`] if the carrier is malformed or already baked,
///   or if `signature` was not produced over `assertion`
pub fn bake(
    carrier: &[u8],
    assertion: &Assertion,
    signature: &Signature,
) -> Result<BakedBadge, BakeError> {
    let (bom, text, root) = parse_svg(carrier)?;

    if text.contains(&format!("<{ASSERTION_ELEMENT}")) {
        return Err(BakeError::BakeFailure(
            "image already carries a baked assertion".to_string(),
        ));
    }

    let covered = signature
        .covers(assertion)
        .map_err(|e| BakeError::BakeFailure(e.to_string()))?;
    if !covered {
        return Err(BakeError::BakeFailure(
            "signature was not produced over this assertion".to_string(),
        ));
    }

    let json = assertion
        .canonical_bytes()
        .map_err(|e| BakeError::BakeFailure(e.to_string()))
        .and_then(|bytes| {
            String::from_utf8(bytes).map_err(|e| BakeError::BakeFailure(e.to_string()))
        })?;
    if json.contains(CDATA_CLOSE) {
        return Err(BakeError::BakeFailure(
            "assertion text contains a CDATA terminator".to_string(),
        ));
    }

    let tag_text = &text[root.start..root.end];
    let namespace_attr = match attribute(tag_text, NAMESPACE_ATTRIBUTE) {
        Some(value) if value == OPENBADGES_NAMESPACE => String::new(),
        Some(value) => {
            return Err(BakeError::BakeFailure(format!(
                "prefix 'openbadges' is already bound to '{value}'"
            )))
        }
        None => format!(" {NAMESPACE_ATTRIBUTE}=\"{OPENBADGES_NAMESPACE}\""),
    };

    let element = format!(
        "<{ASSERTION_ELEMENT} verify=\"{}\">{CDATA_OPEN}{json}{CDATA_CLOSE}</{ASSERTION_ELEMENT}>",
        signature.to_compact()
    );

    // `<svg .../>` becomes `<svg ...>` + assertion + `</svg>`.
    let attrs_end = if root.self_closing {
        text[..root.end - 1]
            .rfind('/')
            .ok_or_else(|| BakeError::BakeFailure("malformed empty root tag".to_string()))?
    } else if has_closing_tag(&text[root.end..], root.name) {
        root.end - 1
    } else {
        return Err(BakeError::BakeFailure(format!(
            "missing closing </{}> tag",
            root.name
        )));
    };

    let mut out = String::with_capacity(carrier.len() + element.len() + namespace_attr.len() + 16);
    out.push_str(bom);
    out.push_str(&text[..root.name_end]);
    out.push_str(text[root.name_end..attrs_end].trim_end());
    out.push_str(&namespace_attr);
    out.push('>');
    out.push_str(&element);
    if root.self_closing {
        out.push_str(&format!("</{}>", root.name));
    }
    out.push_str(&text[root.end..]);

    Ok(BakedBadge {
        format: ImageFormat::Svg,
        bytes: out.into_bytes(),
    })
}

/// Reads the embedded assertion back out of a baked SVG.
pub fn extract(baked: &[u8]) -> Result<EmbeddedAssertion, BakeError> {
    let (_, text, _) = parse_svg(baked)?;

    let start = text
        .find(&format!("<{ASSERTION_ELEMENT}"))
        .ok_or(BakeError::MissingAssertion)?;
    let tag = scan_start_tag(text, start)?;
    let jws = attribute(&text[tag.start..tag.end], "verify")
        .ok_or_else(|| BakeError::BakeFailure("assertion element has no verify attribute".to_string()))?
        .to_string();

    let json = if tag.self_closing {
        None
    } else {
        let close = format!("</{ASSERTION_ELEMENT}>");
        let body_len = text[tag.end..].find(&close).ok_or_else(|| {
            BakeError::BakeFailure(format!("unterminated <{ASSERTION_ELEMENT}> element"))
        })?;
        let body = text[tag.end..tag.end + body_len].trim();
        let body = body
            .strip_prefix(CDATA_OPEN)
            .and_then(|b| b.strip_suffix(CDATA_CLOSE))
            .unwrap_or(body)
            .trim();
        (!body.is_empty()).then(|| body.to_string())
    };

    Ok(EmbeddedAssertion { jws, json })
}

/// Validates the carrier as SVG and locates its root start tag.
fn parse_svg(carrier: &[u8]) -> Result<(&str, &str, StartTag<'_>), BakeError> {
    for (magic, name) in [(PNG_MAGIC, "PNG"), (JPEG_MAGIC, "JPEG"), (GIF_MAGIC, "GIF")] {
        if carrier.starts_with(magic) {
            return Err(BakeError::UnsupportedImageFormat(name.to_string()));
        }
    }

    let text = std::str::from_utf8(carrier)
        .map_err(|_| BakeError::UnsupportedImageFormat("unknown".to_string()))?;
    let (bom, text) = match text.strip_prefix(UTF8_BOM) {
        Some(rest) => (UTF8_BOM, rest),
        None => ("", text),
    };

    let root = find_root(text)?
        .ok_or_else(|| BakeError::UnsupportedImageFormat("unknown".to_string()))?;
    let local_name = root.name.rsplit(':').next().unwrap_or(root.name);
    if local_name != "svg" {
        return Err(BakeError::UnsupportedImageFormat(format!(
            "XML document with root <{}>",
            root.name
        )));
    }

    Ok((bom, text, root))
}

/// Skips the XML prolog (declaration, comments, processing instructions,
/// doctype) and returns the root element's start tag.
fn find_root(text: &str) -> Result<Option<StartTag<'_>>, BakeError> {
    let mut pos = 0;
    loop {
        pos += text[pos..].len() - text[pos..].trim_start().len();
        let rest = &text[pos..];

        if rest.is_empty() {
            return Ok(None);
        } else if rest.starts_with("<?") {
            pos += skip_past(rest, "?>", "processing instruction")?;
        } else if rest.starts_with("<!--") {
            pos += skip_past(rest, "-->", "comment")?;
        } else if rest.starts_with("<!DOCTYPE") {
            pos += skip_doctype(rest)?;
        } else if rest.starts_with('<') {
            return scan_start_tag(text, pos).map(Some);
        } else {
            return Ok(None);
        }
    }
}

fn skip_past(rest: &str, terminator: &str, what: &str) -> Result<usize, BakeError> {
    rest.find(terminator)
        .map(|idx| idx + terminator.len())
        .ok_or_else(|| BakeError::BakeFailure(format!("unterminated {what}")))
}

fn skip_doctype(rest: &str) -> Result<usize, BakeError> {
    let unterminated = || BakeError::BakeFailure("unterminated DOCTYPE".to_string());
    let bytes = rest.as_bytes();
    let mut quote: Option<u8> = None;
    let mut in_subset = false;

    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match (quote, b) {
            (Some(q), _) if b == q => quote = None,
            (Some(_), _) => {}
            (None, b'"') | (None, b'\'') => quote = Some(b),
            // Comments in the internal subset may hold unbalanced quotes.
            (None, b'<') if in_subset && rest[i..].starts_with("<!--") => {
                i += rest[i..].find("-->").ok_or_else(unterminated)? + 2;
            }
            (None, b'[') => in_subset = true,
            (None, b']') => in_subset = false,
            (None, b'>') if !in_subset => return Ok(i + 1),
            _ => {}
        }
        i += 1;
    }
    Err(unterminated())
}

/// Parses the start tag beginning at `start` (which must point at `<`).
fn scan_start_tag(text: &str, start: usize) -> Result<StartTag<'_>, BakeError> {
    let bytes = text.as_bytes();
    let name_start = start + 1;
    let name_len = text[name_start..]
        .find(|c: char| c.is_whitespace() || c == '/' || c == '>')
        .unwrap_or(text.len() - name_start);
    let name_end = name_start + name_len;
    if name_len == 0 {
        return Err(BakeError::BakeFailure("element without a name".to_string()));
    }

    let mut quote: Option<u8> = None;
    for (offset, &b) in bytes[name_end..].iter().enumerate() {
        match (quote, b) {
            (Some(q), _) if b == q => quote = None,
            (Some(_), _) => {}
            (None, b'"') | (None, b'\'') => quote = Some(b),
            (None, b'>') => {
                let gt = name_end + offset;
                let self_closing = text[name_end..gt].trim_end().ends_with('/');
                return Ok(StartTag {
                    name: &text[name_start..name_end],
                    start,
                    name_end,
                    end: gt + 1,
                    self_closing,
                });
            }
            (None, b'<') => break,
            _ => {}
        }
    }

    Err(BakeError::BakeFailure(format!(
        "unterminated <{}> start tag",
        &text[name_start..name_end]
    )))
}

/// Value of attribute `name` within a start tag's text.
fn attribute<'a>(tag: &'a str, name: &str) -> Option<&'a str> {
    let mut rest = tag;
    while let Some(idx) = rest.find(name) {
        let before_ok = rest[..idx]
            .chars()
            .next_back()
            .map_or(false, char::is_whitespace);
        let after = rest[idx + name.len()..].trim_start();
        if before_ok {
            if let Some(after_eq) = after.strip_prefix('=') {
                let after_eq = after_eq.trim_start();
                let quote = after_eq.chars().next()?;
                if quote == '"' || quote == '\'' {
                    let value = &after_eq[1..];
                    return value.find(quote).map(|end| &value[..end]);
                }
            }
        }
        rest = &rest[idx + name.len()..];
    }
    None
}

fn has_closing_tag(after_root: &str, name: &str) -> bool {
    let close = format!("</{name}");
    after_root.rfind(&close).map_or(false, |idx| {
        after_root[idx + close.len()..].trim_start().starts_with('>')
    })
}
