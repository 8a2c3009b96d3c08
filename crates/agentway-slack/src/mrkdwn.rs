// SPDX-FileCopyrightText: 2026 Agentway Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Standard Markdown → Slack mrkdwn translation.
//!
//! The platform has no headings or list syntax and uses single-character
//! emphasis markers, so agent output needs rewriting before delivery.
//! Fenced code blocks are left byte-identical apart from stripping the
//! language tag on the opening fence. The function runs on streamed
//! partial buffers as well as final texts, so an unclosed trailing fence
//! is treated as code.

use std::sync::LazyLock;

use regex::Regex;

static RE_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]*)\]\(([^)\s]+)\)").unwrap());
static RE_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#{1,6} +(.+)$").unwrap());
static RE_BOLD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*\*([^*]+)\*\*").unwrap());
static RE_STRIKE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"~~([^~]+)~~").unwrap());
static RE_HRULE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^(?:-{3,}|\*{3,}|_{3,})$").unwrap());
static RE_BULLET: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^[-*] (.*)$").unwrap());

/// Horizontal-rule replacement glyph.
const HRULE_GLYPH: &str = "———";

/// Convert standard Markdown to the chat platform's mrkdwn dialect.
///
/// Fence-delimited regions pass through untouched except for the language
/// tag on the opening fence. Outside fences the rules run in a fixed
/// order; escaping runs first so later rules may introduce literal `<`
/// for link tokens without collision.
pub fn markdown_to_mrkdwn(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for (i, segment) in text.split("```").enumerate() {
        if i > 0 {
            out.push_str("```");
        }
        if i % 2 == 1 {
            out.push_str(&strip_language_tag(segment));
        } else {
            out.push_str(&convert_segment(segment));
        }
    }
    out
}

/// Drop a language tag from the first line of a fence interior.
fn strip_language_tag(interior: &str) -> String {
    if let Some(newline) = interior.find('\n') {
        let first = &interior[..newline];
        if !first.is_empty()
            && first
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '_' | '#' | '.'))
        {
            return interior[newline..].to_string();
        }
    }
    interior.to_string()
}

/// Escape `&` and `<`, leaving existing `&amp;`/`&lt;`/`&gt;` entities
/// alone so repeated passes over already-translated text are stable.
fn escape_entities(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    let mut rest = segment;
    while let Some(ch) = rest.chars().next() {
        match ch {
            '&' => {
                let tail = &rest[1..];
                if tail.starts_with("amp;") || tail.starts_with("lt;") || tail.starts_with("gt;")
                {
                    out.push('&');
                } else {
                    out.push_str("&amp;");
                }
            }
            '<' => out.push_str("&lt;"),
            c => out.push(c),
        }
        rest = &rest[ch.len_utf8()..];
    }
    out
}

fn convert_segment(segment: &str) -> String {
    // 1. Escape, entity-aware so the pass stays idempotent.
    let s = escape_entities(segment);
    // 2. Links become the platform's <url|label> token.
    let s = RE_LINK.replace_all(&s, "<$2|$1>");
    // 3. Headings have no mrkdwn equivalent; render bold.
    let s = RE_HEADING.replace_all(&s, "*$1*");
    // 4. Bold before any single-asterisk handling.
    let s = RE_BOLD.replace_all(&s, "*$1*");
    let s = RE_STRIKE.replace_all(&s, "~$1~");
    let s = RE_HRULE.replace_all(&s, HRULE_GLYPH);
    let s = RE_BULLET.replace_all(&s, "• $1");
    s.into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_untouched() {
        assert_eq!(markdown_to_mrkdwn("hello world"), "hello world");
    }

    #[test]
    fn escapes_ampersand_and_angle_bracket_first() {
        assert_eq!(markdown_to_mrkdwn("a & b < c"), "a &amp; b &lt; c");
    }

    #[test]
    fn escaping_is_idempotent() {
        let once = markdown_to_mrkdwn("a & b < c");
        assert_eq!(markdown_to_mrkdwn(&once), once);
    }

    #[test]
    fn links_become_url_label_tokens() {
        assert_eq!(
            markdown_to_mrkdwn("see [the docs](https://example.com/x)"),
            "see <https://example.com/x|the docs>"
        );
    }

    #[test]
    fn headings_become_bold_lines() {
        assert_eq!(markdown_to_mrkdwn("# Title"), "*Title*");
        assert_eq!(markdown_to_mrkdwn("###### Deep"), "*Deep*");
        assert_eq!(
            markdown_to_mrkdwn("## Setup\nbody"),
            "*Setup*\nbody"
        );
        // Seven hashes is not a heading.
        assert_eq!(markdown_to_mrkdwn("####### nope"), "####### nope");
    }

    #[test]
    fn bold_collapses_to_single_asterisks() {
        assert_eq!(markdown_to_mrkdwn("this is **bold** text"), "this is *bold* text");
    }

    #[test]
    fn strikethrough_collapses_to_single_tildes() {
        assert_eq!(markdown_to_mrkdwn("~~gone~~"), "~gone~");
    }

    #[test]
    fn horizontal_rules_become_em_dashes() {
        assert_eq!(markdown_to_mrkdwn("above\n---\nbelow"), "above\n———\nbelow");
        assert_eq!(markdown_to_mrkdwn("****"), "———");
        assert_eq!(markdown_to_mrkdwn("___"), "———");
    }

    #[test]
    fn bullets_become_dots() {
        assert_eq!(
            markdown_to_mrkdwn("- one\n- two\n* three"),
            "• one\n• two\n• three"
        );
    }

    #[test]
    fn fence_interior_is_byte_identical() {
        let input = "before\n```\nlet x = a**2 && b < c; // [link](url)\n- item\n```\nafter **bold**";
        let out = markdown_to_mrkdwn(input);
        assert!(out.contains("let x = a**2 && b < c; // [link](url)\n- item\n"));
        assert!(out.ends_with("after *bold*"));
    }

    #[test]
    fn language_tag_is_stripped_from_opening_fence() {
        let input = "```rust\nfn main() {}\n```";
        assert_eq!(markdown_to_mrkdwn(input), "```\nfn main() {}\n```");
    }

    #[test]
    fn code_first_line_without_tag_survives() {
        // `let x = 1` contains spaces, so it is not a language tag.
        let input = "```\nlet x = 1;\n```";
        assert_eq!(markdown_to_mrkdwn(input), input);
        let inline_ish = "```x = [1](2)\n```";
        // A bare `x` first line does parse as a tag and is stripped.
        assert_eq!(markdown_to_mrkdwn("```x\n[a](b)\n```"), "```\n[a](b)\n```");
        // But content with markdown on the first line is untouched.
        assert_eq!(markdown_to_mrkdwn(inline_ish), "```x = [1](2)\n```");
    }

    #[test]
    fn unclosed_trailing_fence_is_treated_as_code() {
        // Streaming responders hand over partial buffers.
        let input = "intro **b**\n```python\nprint(1)";
        let out = markdown_to_mrkdwn(input);
        assert_eq!(out, "intro *b*\n```\nprint(1)");
    }

    #[test]
    fn multiple_fences_alternate_correctly() {
        let input = "**a**\n```\n**code**\n```\n**b**\n```\n**more**\n```\n**c**";
        let out = markdown_to_mrkdwn(input);
        assert_eq!(
            out,
            "*a*\n```\n**code**\n```\n*b*\n```\n**more**\n```\n*c*"
        );
    }

    #[test]
    fn mixed_document_translates() {
        let input = "# Report\n\nresults for [run](http://r/1) & more:\n\n- **ok**: 10\n- ~~failed~~: 0\n\n---\ndone";
        let expected = "*Report*\n\nresults for <http://r/1|run> &amp; more:\n\n• *ok*: 10\n• ~failed~: 0\n\n———\ndone";
        assert_eq!(markdown_to_mrkdwn(input), expected);
    }
}
