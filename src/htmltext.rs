use std::sync::LazyLock;

use regex::Regex;

static SCRIPT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)<script\b.*?</script>|<style\b.*?</style>|<head\b.*?</head>|<noscript\b.*?</noscript>|<template\b.*?</template>",
    )
    .unwrap()
});
static COMMENT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap());
static BLOCK_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)</?(p|div|br|li|ul|ol|tr|td|th|table|h[1-6]|section|article|header|footer|nav|dt|dd|dl|blockquote|pre)\b[^>]*>").unwrap()
});
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());
static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t\u{a0}]+").unwrap());

/// Render HTML to normalized text lines: block tags become line breaks, all
/// other tags are dropped, common entities are decoded, each line is trimmed
/// and blank lines are removed. Deterministic, so byte-identical pages always
/// normalize to the same line sequence regardless of when they were fetched.
pub fn to_lines(html: &str) -> Vec<String> {
    let stripped = SCRIPT_RE.replace_all(html, "");
    let stripped = COMMENT_RE.replace_all(&stripped, "");
    let broken = BLOCK_TAG_RE.replace_all(&stripped, "\n");
    let text = TAG_RE.replace_all(&broken, " ");
    let text = decode_entities(&text);

    text.lines()
        .map(|l| WS_RE.replace_all(l, " ").trim().to_string())
        .filter(|l| !l.is_empty())
        .collect()
}

fn decode_entities(s: &str) -> String {
    s.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&nbsp;", " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_tags_and_blanks() {
        let html = "<html><head><title>x</title></head><body>\
                    <h1>DID Core</h1>\n<p>  W3C  Recommendation </p>\
                    <script>var x = 1;</script></body></html>";
        let lines = to_lines(html);
        assert_eq!(lines, vec!["DID Core", "W3C Recommendation"]);
    }

    #[test]
    fn deterministic_for_identical_input() {
        let html = "<p>Publication date : 2023-05-12</p>";
        assert_eq!(to_lines(html), to_lines(html));
    }

    #[test]
    fn whitespace_collapses() {
        let lines = to_lines("<p>a&nbsp;&nbsp;b</p><p>   </p>");
        assert_eq!(lines, vec!["a b"]);
    }

    #[test]
    fn entities_decode() {
        let lines = to_lines("<p>OAuth &amp; OIDC</p>");
        assert_eq!(lines, vec!["OAuth & OIDC"]);
    }
}
