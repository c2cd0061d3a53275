//! Field-markup surgery for `<img>` tags.
//!
//! Fields are HTML fragments. The only mutations the pipeline performs are
//! setting and stripping a `title` attribute on image tags, so this module
//! edits the tag's source text directly: every byte outside the touched
//! attribute is preserved exactly, which keeps apply→remove a byte-identical
//! round trip.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

static IMG_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<img\b[^>]*>").expect("img tag regex"));

// Attribute names must follow whitespace (or a quote closing the previous
// value), otherwise `data-src`/`data-title` would match too: `-` counts as
// a word boundary, so `\b` alone is not enough.
static SRC_ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)[\s"']src\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))"#)
        .expect("src attr regex")
});

static TITLE_ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)\s+title\s*=\s*(?:"[^"]*"|'[^']*'|[^\s>]+)"#).expect("title attr regex")
});

/// Byte ranges of every `<img ...>` tag in the markup, in document order.
pub fn img_tag_ranges(markup: &str) -> Vec<Range<usize>> {
    IMG_TAG_RE.find_iter(markup).map(|m| m.range()).collect()
}

/// The `src` attribute value of a single img tag, exactly as written.
pub fn src_attr(tag: &str) -> Option<&str> {
    let caps = SRC_ATTR_RE.captures(tag)?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .or_else(|| caps.get(3))
        .map(|m| m.as_str())
}

/// Set (or replace) the `title` attribute on a single img tag.
pub fn set_title_attr(tag: &str, text: &str) -> String {
    let attr = format!(" title=\"{}\"", escape_attr(text));
    if TITLE_ATTR_RE.is_match(tag) {
        return TITLE_ATTR_RE.replace(tag, attr.as_str()).into_owned();
    }
    if let Some(stripped) = tag.strip_suffix("/>") {
        format!("{stripped}{attr}/>")
    } else if let Some(stripped) = tag.strip_suffix('>') {
        format!("{stripped}{attr}>")
    } else {
        // Not a well-formed tag; leave untouched.
        tag.to_string()
    }
}

/// Strip the `title` attribute from a single img tag, leaving everything
/// else unchanged. A tag without a title is returned as-is.
pub fn remove_title_attr(tag: &str) -> String {
    TITLE_ATTR_RE.replace_all(tag, "").into_owned()
}

/// Apply a tag transformation to every img tag in the markup whose `src`
/// equals `src` exactly.
pub fn rewrite_tags_with_src(
    markup: &str,
    src: &str,
    rewrite: impl Fn(&str) -> String,
) -> String {
    let mut out = String::with_capacity(markup.len());
    let mut last = 0;
    for range in img_tag_ranges(markup) {
        let tag = &markup[range.clone()];
        out.push_str(&markup[last..range.start]);
        if src_attr(tag) == Some(src) {
            out.push_str(&rewrite(tag));
        } else {
            out.push_str(tag);
        }
        last = range.end;
    }
    out.push_str(&markup[last..]);
    out
}

/// Minimal escaping for a double-quoted HTML attribute value.
pub fn escape_attr(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}
