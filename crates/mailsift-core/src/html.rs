//! Best-effort text extraction from HTML message bodies.
//!
//! Two passes are provided:
//!
//! - [`extract_main_text`] keeps the readable body of a message: it drops
//!   `<head>`, scripts, styles and page chrome (`<nav>`, `<header>`,
//!   `<footer>`, `<aside>`, `<form>`), narrows to `<article>`/`<main>`/`<body>`
//!   when present, and keeps block structure as line breaks.
//! - [`strip_markup`] is the fallback: every visible text node, joined by
//!   single spaces. Rendering is done by `html2text`, so its light markers
//!   (`#` before headings, `*` around emphasis) may remain.
//!
//! Entity references are decoded after tags are gone, so an escaped `&lt;b&gt;`
//! would read as a tag again; both passes turn such `<` into `‹`.
//! The main pass is not a real HTML parser. Malformed markup degrades to
//! "some text with stray characters", never to a panic.

/// Elements removed together with their content by the main-text pass.
const CHROME_BLOCKS: &[&str] = &[
    "head", "script", "style", "noscript", "template", "title", "nav", "header", "footer",
    "aside", "form", "svg",
];

/// Elements removed together with their content by the fallback pass.
const INVISIBLE_BLOCKS: &[&str] = &["head", "script", "style", "noscript", "template", "svg"];

/// Line width handed to `html2text`; wide enough that long URLs stay whole.
const RENDER_WIDTH: usize = 1000;

/// Elements that start a new line in the main-text pass.
const BLOCK_TAGS: &[&str] = &[
    "p", "div", "br", "tr", "li", "ul", "ol", "h1", "h2", "h3", "h4", "h5", "h6", "table",
    "blockquote", "pre", "section", "article", "main", "hr", "dd", "dt",
];

#[derive(Clone, Copy, PartialEq, Eq)]
enum Layout {
    /// Block tags become line breaks, inline tags vanish.
    Blocks,
    /// Every tag becomes a space.
    Spaces,
}

/// Extract the main readable text of an HTML document.
///
/// Returns an empty string when nothing survives the chrome removal; the
/// caller is expected to fall back to [`strip_markup`] in that case.
pub fn extract_main_text(html: &str) -> String {
    let mut doc = html.to_string();
    for tag in CHROME_BLOCKS {
        doc = remove_tag_block(&doc, tag);
    }
    let scoped = inner_of(&doc, "article")
        .or_else(|| inner_of(&doc, "main"))
        .or_else(|| inner_of(&doc, "body"))
        .unwrap_or(&doc);

    let text = decode_entities(&render(scoped, Layout::Blocks));
    tidy_lines(&defuse_tags(&text))
}

/// Concatenate all visible text nodes, separated by single spaces.
pub fn strip_markup(html: &str) -> String {
    let mut doc = html.to_string();
    for tag in INVISIBLE_BLOCKS {
        doc = remove_tag_block(&doc, tag);
    }
    let text = html2text::from_read(doc.as_bytes(), RENDER_WIDTH)
        .unwrap_or_else(|_| decode_entities(&render(&doc, Layout::Spaces)));
    defuse_tags(&text)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Replace `<` with `‹` wherever the text would otherwise read as a tag:
/// `<` then optional whitespace, an optional `/`, a letter, and a later `>`.
fn defuse_tags(text: &str) -> String {
    let Some(last_gt) = text.rfind('>') else {
        return text.to_string();
    };
    let mut out = String::with_capacity(text.len());
    for (i, c) in text.char_indices() {
        if c == '<' && i < last_gt && opens_tag(&text[i + 1..]) {
            out.push('‹');
        } else {
            out.push(c);
        }
    }
    out
}

fn opens_tag(rest: &str) -> bool {
    let rest = rest.trim_start();
    let rest = rest.strip_prefix('/').unwrap_or(rest);
    rest.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
}

/// Walk the document, dropping tags and comments according to `layout`.
fn render(html: &str, layout: Layout) -> String {
    let mut out = String::with_capacity(html.len());
    let mut rest = html;

    while let Some(lt) = rest.find('<') {
        out.push_str(&rest[..lt]);
        let after = &rest[lt..];

        if after.starts_with("<!--") {
            match after.find("-->") {
                Some(end) => rest = &after[end + 3..],
                None => rest = "",
            }
            continue;
        }

        let looks_like_tag = after[1..]
            .chars()
            .next()
            .map(|c| c.is_ascii_alphabetic() || c == '/' || c == '!' || c == '?')
            .unwrap_or(false);
        if !looks_like_tag {
            out.push('<');
            rest = &after[1..];
            continue;
        }

        let Some(gt) = after.find('>') else {
            // Unterminated tag: drop the remainder.
            rest = "";
            break;
        };
        let name = tag_name(&after[1..gt]);
        match layout {
            Layout::Spaces => out.push(' '),
            Layout::Blocks if BLOCK_TAGS.contains(&name.as_str()) => out.push('\n'),
            Layout::Blocks if name == "td" || name == "th" => out.push(' '),
            Layout::Blocks => {}
        }
        rest = &after[gt + 1..];
    }
    out.push_str(rest);
    out
}

/// Lower-cased element name of a tag body such as `/P` or `a href="x"`.
fn tag_name(tag_body: &str) -> String {
    tag_body
        .trim_start_matches('/')
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase()
}

/// Find `<tag` followed by whitespace, `>` or `/`, at or after `from`.
fn find_open_tag(lower: &str, tag: &str, from: usize) -> Option<usize> {
    let needle = format!("<{}", tag);
    let mut search_from = from;
    while let Some(rel) = lower[search_from..].find(&needle) {
        let start = search_from + rel;
        let next = lower[start + needle.len()..].chars().next();
        match next {
            Some(c) if c == '>' || c == '/' || c.is_whitespace() => return Some(start),
            None => return Some(start),
            _ => search_from = start + needle.len(),
        }
    }
    None
}

/// Remove every `<tag …>…</tag>` block. An unclosed block removes the rest.
fn remove_tag_block(html: &str, tag: &str) -> String {
    // ASCII lowering keeps byte offsets identical to `html`.
    let lower = html.to_ascii_lowercase();
    let close = format!("</{}", tag);
    let mut result = String::with_capacity(html.len());
    let mut pos = 0;

    while let Some(start) = find_open_tag(&lower, tag, pos) {
        result.push_str(&html[pos..start]);
        match lower[start..].find(&close) {
            Some(rel) => {
                let close_start = start + rel;
                pos = lower[close_start..]
                    .find('>')
                    .map(|gt| close_start + gt + 1)
                    .unwrap_or(html.len());
            }
            None => {
                pos = html.len();
                break;
            }
        }
    }
    result.push_str(&html[pos..]);
    result
}

/// Content between `<tag …>` and `</tag>`, if the element exists.
fn inner_of<'a>(html: &'a str, tag: &str) -> Option<&'a str> {
    let lower = html.to_ascii_lowercase();
    let open = find_open_tag(&lower, tag, 0)?;
    let content_start = open + lower[open..].find('>')? + 1;
    let close = format!("</{}", tag);
    let content_end = lower[content_start..]
        .find(&close)
        .map(|rel| content_start + rel)
        .unwrap_or(html.len());
    Some(&html[content_start..content_end])
}

/// Decode named and numeric character references commonly seen in mail.
pub fn decode_entities(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp..];
        let semi = after.char_indices().take(12).find(|(_, c)| *c == ';');
        let decoded = semi.and_then(|(end, _)| decode_entity(&after[1..end]).map(|c| (c, end)));
        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &after[end + 1..];
            }
            None => {
                out.push('&');
                rest = &after[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    if let Some(num) = name.strip_prefix('#') {
        let code = match num.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse::<u32>().ok()?,
        };
        return char::from_u32(code);
    }
    let c = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => ' ',
        "ndash" => '–',
        "mdash" => '—',
        "hellip" => '…',
        "rsquo" => '\'',
        "lsquo" => '\'',
        "rdquo" => '"',
        "ldquo" => '"',
        "copy" => '©',
        "reg" => '®',
        "euro" => '€',
        "uarr" => '↑',
        "darr" => '↓',
        _ => return None,
    };
    Some(c)
}

/// Trim every line and keep at most one blank line between text lines.
fn tidy_lines(text: &str) -> String {
    let mut cleaned = String::with_capacity(text.len());
    let mut prev_was_blank = false;
    for line in text.lines() {
        let trimmed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if trimmed.is_empty() {
            if !prev_was_blank {
                cleaned.push('\n');
                prev_was_blank = true;
            }
        } else {
            cleaned.push_str(&trimmed);
            cleaned.push('\n');
            prev_was_blank = false;
        }
    }
    cleaned.trim().to_string()
}
