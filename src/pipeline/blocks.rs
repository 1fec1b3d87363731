//! Block model: the structured form of a page between extraction and rendering.
//!
//! Pages enter as either PDFium plain text ([`from_text`]) or Markdown
//! returned by the LLM ([`from_markdown`]), and leave through one of the
//! renderers ([`render_markdown`], [`render_html`], [`render_json`]).
//!
//! PDFium text carries no structure, so [`from_text`] works on line shape
//! alone:
//!
//! | Shape | Block |
//! |-------|-------|
//! | ≥ 2 lines indented by 4+ spaces or a tab | [`Block::Code`] |
//! | ≥ 2 lines splitting into the same number (≥ 2) of columns on runs of 2+ spaces | [`Block::Table`] |
//! | short ALL-CAPS line, or `2.1 Title` section numbering | [`Block::Heading`] |
//! | `•`, `-`, `*`, `–` bullets | unordered [`Block::List`] |
//! | `1.` / `1)` numbering | ordered [`Block::List`] |
//! | anything else | [`Block::Paragraph`] |

use crate::config::PageSeparator;
use crate::html::html_escape;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// One structural element of a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "block_type", rename_all = "snake_case")]
pub enum Block {
    Heading { level: u8, text: String },
    Paragraph { text: String },
    List { ordered: bool, items: Vec<String> },
    /// First row is the header.
    Table { rows: Vec<Vec<String>> },
    Code { language: Option<String>, text: String },
    Image { alt: String, src: String },
}

/// The blocks of one page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageBlocks {
    /// 1-indexed page number.
    pub page: usize,
    pub blocks: Vec<Block>,
}

impl PageBlocks {
    pub fn new(page: usize, blocks: Vec<Block>) -> Self {
        Self { page, blocks }
    }
}

/// Image sources referenced by `blocks`, in order.
pub fn image_sources(blocks: &[Block]) -> impl Iterator<Item = &str> {
    blocks.iter().filter_map(|b| match b {
        Block::Image { src, .. } => Some(src.as_str()),
        _ => None,
    })
}

// ── Shared paragraph / list accumulator ──────────────────────────────────

#[derive(Default)]
struct BlockBuilder {
    blocks: Vec<Block>,
    paragraph: String,
    list: Option<(bool, Vec<String>)>,
}

impl BlockBuilder {
    fn flush_paragraph(&mut self) {
        let text = std::mem::take(&mut self.paragraph);
        let text = text.trim();
        if !text.is_empty() {
            self.blocks.push(Block::Paragraph {
                text: text.to_string(),
            });
        }
    }

    fn flush_list(&mut self) {
        if let Some((ordered, items)) = self.list.take() {
            if !items.is_empty() {
                self.blocks.push(Block::List { ordered, items });
            }
        }
    }

    fn flush(&mut self) {
        self.flush_paragraph();
        self.flush_list();
    }

    fn push(&mut self, block: Block) {
        self.flush();
        self.blocks.push(block);
    }

    fn push_paragraph_line(&mut self, line: &str) {
        self.flush_list();
        join_line(&mut self.paragraph, line);
    }

    fn push_list_item(&mut self, ordered: bool, text: &str) {
        self.flush_paragraph();
        match self.list {
            Some((o, ref mut items)) if o == ordered => items.push(text.to_string()),
            _ => {
                self.flush_list();
                self.list = Some((ordered, vec![text.to_string()]));
            }
        }
    }

    /// Append a wrapped line to the last list item. Returns false if no list is open.
    fn extend_list_item(&mut self, line: &str) -> bool {
        match self.list.as_mut().and_then(|(_, items)| items.last_mut()) {
            Some(last) => {
                join_line(last, line);
                true
            }
            None => false,
        }
    }

    fn list_item_open(&self) -> bool {
        self.list
            .as_ref()
            .and_then(|(_, items)| items.last())
            .is_some_and(|last| !ends_sentence(last))
    }

    fn finish(mut self) -> Vec<Block> {
        self.flush();
        self.blocks
    }
}

/// Join a wrapped line onto `buf`, undoing end-of-line hyphenation.
fn join_line(buf: &mut String, line: &str) {
    let line = line.trim();
    if buf.is_empty() {
        buf.push_str(line);
        return;
    }
    let hyphenated = buf.ends_with('-')
        && buf[..buf.len() - 1]
            .chars()
            .next_back()
            .is_some_and(char::is_alphabetic)
        && line.chars().next().is_some_and(char::is_lowercase);
    if hyphenated {
        buf.pop();
    } else {
        buf.push(' ');
    }
    buf.push_str(line);
}

fn ends_sentence(s: &str) -> bool {
    s.trim_end().ends_with(['.', '!', '?', ':'])
}

// ── Plain text → blocks ──────────────────────────────────────────────────

static RE_BULLET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[•◦▪‣●○■□–\-\*]\s+(\S.*)$").unwrap());

static RE_ORDERED: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{1,3}[.)]\s+(\S.*)$").unwrap());

static RE_SECTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,2}(?:\.\d{1,2})*)\s+(\p{Lu}.*)$").unwrap());

static RE_COLUMN_GAP: Lazy<Regex> = Lazy::new(|| Regex::new(r"\t+| {2,}").unwrap());

/// Longest line that may still be a heading.
const MAX_HEADING_CHARS: usize = 80;
const MAX_HEADING_WORDS: usize = 12;

/// Split PDFium page text into blocks.
pub fn from_text(text: &str) -> Vec<Block> {
    let normalised = text.replace("\r\n", "\n").replace('\r', "\n");
    let lines: Vec<&str> = normalised.lines().map(str::trim_end).collect();
    let widest = lines
        .iter()
        .map(|l| l.trim().chars().count())
        .max()
        .unwrap_or(0);

    let mut builder = BlockBuilder::default();
    let mut i = 0;

    while i < lines.len() {
        let raw = lines[i];
        let line = raw.trim();

        if line.is_empty() {
            builder.flush();
            i += 1;
            continue;
        }

        // Indented runs → code
        let end = run_end(&lines, i, is_indented);
        if end - i >= 2 {
            builder.push(Block::Code {
                language: None,
                text: dedent(&lines[i..end]),
            });
            i = end;
            continue;
        }

        // Column-aligned runs → table
        let columns = table_cells(line).len();
        if columns >= 2 {
            let end = run_end(&lines, i, |l| table_cells(l.trim()).len() == columns);
            if end - i >= 2 {
                let rows = lines[i..end]
                    .iter()
                    .map(|l| table_cells(l.trim()))
                    .collect();
                builder.push(Block::Table { rows });
                i = end;
                continue;
            }
        }

        if let Some(level) = heading_level(line) {
            builder.push(Block::Heading {
                level,
                text: line.to_string(),
            });
        } else if let Some(caps) = RE_BULLET.captures(line) {
            builder.push_list_item(false, &caps[1]);
        } else if let Some(caps) = RE_ORDERED.captures(line) {
            builder.push_list_item(true, &caps[1]);
        } else if builder.list_item_open() {
            builder.extend_list_item(line);
        } else {
            builder.push_paragraph_line(line);
            // PDFium rarely emits blank lines; a short line closing a
            // sentence is the usual end of a paragraph.
            if ends_sentence(line) && line.chars().count() * 10 < widest * 8 {
                builder.flush_paragraph();
            }
        }
        i += 1;
    }

    builder.finish()
}

/// First index at or after `start` whose line fails `pred`.
fn run_end(lines: &[&str], start: usize, pred: impl Fn(&str) -> bool) -> usize {
    lines[start..]
        .iter()
        .position(|l| !pred(l))
        .map_or(lines.len(), |p| start + p)
}

fn is_indented(line: &str) -> bool {
    !line.trim().is_empty() && (line.starts_with("    ") || line.starts_with('\t'))
}

fn dedent(lines: &[&str]) -> String {
    let indent = lines
        .iter()
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0);
    lines
        .iter()
        .map(|l| l.get(indent..).unwrap_or("").trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

fn table_cells(line: &str) -> Vec<String> {
    RE_COLUMN_GAP
        .split(line)
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}

fn heading_level(line: &str) -> Option<u8> {
    if line.chars().count() > MAX_HEADING_CHARS
        || line.split_whitespace().count() > MAX_HEADING_WORDS
        || line.ends_with(['.', ',', ';', ':'])
    {
        return None;
    }

    if let Some(caps) = RE_SECTION.captures(line) {
        let depth = caps[1].split('.').count();
        return Some((depth + 1).clamp(2, 4) as u8);
    }

    let letters: Vec<char> = line.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.len() >= 2 && letters.iter().all(|c| c.is_uppercase()) {
        return Some(2);
    }

    None
}

// ── Markdown → blocks ────────────────────────────────────────────────────

static RE_MD_HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(#{1,6})\s+(.*?)\s*#*\s*$").unwrap());

static RE_MD_IMAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^!\[([^\]]*)\]\(([^)\s]+)(?:\s+[^)]*)?\)$").unwrap());

static RE_MD_BULLET: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*[-*+]\s+(\S.*)$").unwrap());

static RE_MD_ORDERED: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*\d+[.)]\s+(\S.*)$").unwrap());

static RE_MD_RULE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:-{3,}|\*{3,}|_{3,})\s*$").unwrap());

static RE_MD_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*```\s*([\w+#.-]*)\s*$").unwrap());

/// Parse Markdown (typically an LLM reply) into blocks.
///
/// Horizontal rules and HTML comments are dropped; page separators are
/// re-inserted by the renderer.
pub fn from_markdown(markdown: &str) -> Vec<Block> {
    let lines: Vec<&str> = markdown.lines().collect();
    let mut builder = BlockBuilder::default();
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        let trimmed = line.trim();

        if let Some(caps) = RE_MD_FENCE.captures(line) {
            let language = Some(caps[1].to_string()).filter(|l| !l.is_empty());
            let close = lines[i + 1..]
                .iter()
                .position(|l| l.trim() == "```")
                .map_or(lines.len(), |p| i + 1 + p);
            builder.push(Block::Code {
                language,
                text: lines[i + 1..close].join("\n"),
            });
            i = close + 1;
            continue;
        }

        if trimmed.is_empty() {
            builder.flush();
        } else if RE_MD_RULE.is_match(line)
            || (trimmed.starts_with("<!--") && trimmed.ends_with("-->"))
        {
            builder.flush();
        } else if let Some(caps) = RE_MD_HEADING.captures(trimmed) {
            builder.push(Block::Heading {
                level: caps[1].len() as u8,
                text: caps[2].to_string(),
            });
        } else if let Some(caps) = RE_MD_IMAGE.captures(trimmed) {
            builder.push(Block::Image {
                alt: caps[1].to_string(),
                src: caps[2].to_string(),
            });
        } else if trimmed.starts_with('|') {
            let end = run_end(&lines, i, |l| l.trim().starts_with('|'));
            let rows: Vec<Vec<String>> = lines[i..end]
                .iter()
                .filter(|l| !is_separator_row(l))
                .map(|l| split_pipe_row(l))
                .collect();
            builder.push(Block::Table { rows });
            i = end;
            continue;
        } else if let Some(caps) = RE_MD_BULLET.captures(line) {
            builder.push_list_item(false, &caps[1]);
        } else if let Some(caps) = RE_MD_ORDERED.captures(line) {
            builder.push_list_item(true, &caps[1]);
        } else if line.starts_with(char::is_whitespace) && builder.extend_list_item(trimmed) {
            // continuation of the previous list item
        } else {
            builder.push_paragraph_line(trimmed);
        }
        i += 1;
    }

    builder.finish()
}

fn is_separator_row(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with('|')
        && trimmed.contains('-')
        && trimmed
            .chars()
            .all(|c| c == '|' || c == '-' || c == ':' || c == ' ')
}

/// Split a `| a | b |` row into cells, honouring `\|` escapes.
fn split_pipe_row(line: &str) -> Vec<String> {
    let inner = line.trim();
    let inner = inner.strip_prefix('|').unwrap_or(inner);
    let inner = inner.strip_suffix('|').unwrap_or(inner);

    let mut cells = Vec::new();
    let mut cell = String::new();
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&'|') => {
                cell.push('|');
                chars.next();
            }
            '|' => cells.push(std::mem::take(&mut cell).trim().to_string()),
            _ => cell.push(c),
        }
    }
    cells.push(cell.trim().to_string());
    cells
}

// ── Renderers ────────────────────────────────────────────────────────────

/// Render one page's blocks as Markdown.
pub fn to_markdown(blocks: &[Block]) -> String {
    blocks
        .iter()
        .map(block_markdown)
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn block_markdown(block: &Block) -> String {
    match block {
        Block::Heading { level, text } => {
            format!("{} {}", "#".repeat((*level).clamp(1, 6) as usize), text)
        }
        Block::Paragraph { text } => text.clone(),
        Block::List { ordered, items } => items
            .iter()
            .enumerate()
            .map(|(n, item)| {
                if *ordered {
                    format!("{}. {}", n + 1, item)
                } else {
                    format!("- {}", item)
                }
            })
            .collect::<Vec<_>>()
            .join("\n"),
        Block::Table { rows } => table_markdown(rows),
        Block::Code { language, text } => {
            format!("```{}\n{}\n```", language.as_deref().unwrap_or(""), text)
        }
        Block::Image { alt, src } => format!("![{}]({})", alt, src),
    }
}

fn table_markdown(rows: &[Vec<String>]) -> String {
    let width = rows.iter().map(Vec::len).max().unwrap_or(0).max(1);
    let render_row = |row: &[String]| -> String {
        let cells: Vec<String> = (0..width)
            .map(|c| row.get(c).map(|s| s.replace('|', "\\|")).unwrap_or_default())
            .collect();
        format!("| {} |", cells.join(" | "))
    };

    let mut out = Vec::with_capacity(rows.len() + 1);
    let header = rows.first().map(Vec::as_slice).unwrap_or(&[]);
    out.push(render_row(header));
    out.push(format!("|{}", " --- |".repeat(width)));
    out.extend(rows.iter().skip(1).map(|r| render_row(r.as_slice())));
    out.join("\n")
}

/// Render all pages as one Markdown document, ending with a newline.
pub fn render_markdown(pages: &[PageBlocks], separator: &PageSeparator) -> String {
    let mut parts: Vec<String> = Vec::with_capacity(pages.len() * 2);
    for (i, page) in pages.iter().enumerate() {
        let body = to_markdown(&page.blocks);
        if i > 0 {
            parts.push(separator.render(page.page));
        }
        parts.push(body);
    }
    let joined = parts.join("");
    format!("{}\n", joined.trim())
}

/// Render all pages as a standalone HTML document.
pub fn render_html(title: &str, pages: &[PageBlocks]) -> String {
    let mut body = String::new();
    for page in pages {
        body.push_str(&format!(
            "<div class=\"page\" data-page=\"{}\">\n",
            page.page
        ));
        for block in &page.blocks {
            body.push_str(&block_html(block));
            body.push('\n');
        }
        body.push_str("</div>\n");
    }

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>{}</title>
</head>
<body>
{}</body>
</html>
"#,
        html_escape(title),
        body
    )
}

fn block_html(block: &Block) -> String {
    match block {
        Block::Heading { level, text } => {
            let l = (*level).clamp(1, 6);
            format!("<h{l}>{}</h{l}>", html_escape(text))
        }
        Block::Paragraph { text } => format!("<p>{}</p>", html_escape(text)),
        Block::List { ordered, items } => {
            let tag = if *ordered { "ol" } else { "ul" };
            let lis: String = items
                .iter()
                .map(|i| format!("<li>{}</li>", html_escape(i)))
                .collect();
            format!("<{tag}>{lis}</{tag}>")
        }
        Block::Table { rows } => {
            let mut html = String::from("<table>");
            for (n, row) in rows.iter().enumerate() {
                let cell_tag = if n == 0 { "th" } else { "td" };
                html.push_str("<tr>");
                for cell in row {
                    html.push_str(&format!("<{cell_tag}>{}</{cell_tag}>", html_escape(cell)));
                }
                html.push_str("</tr>");
            }
            html.push_str("</table>");
            html
        }
        Block::Code { language, text } => match language {
            Some(lang) => format!(
                "<pre><code class=\"language-{}\">{}</code></pre>",
                html_escape(lang),
                html_escape(text)
            ),
            None => format!("<pre><code>{}</code></pre>", html_escape(text)),
        },
        Block::Image { alt, src } => format!(
            "<img src=\"{}\" alt=\"{}\">",
            html_escape(src),
            html_escape(alt)
        ),
    }
}

#[derive(Serialize)]
struct JsonDocument<'a> {
    block_type: &'static str,
    pages: &'a [PageBlocks],
}

/// Render all pages as a pretty-printed JSON block tree.
pub fn render_json(pages: &[PageBlocks]) -> Result<String, serde_json::Error> {
    let mut json = serde_json::to_string_pretty(&JsonDocument {
        block_type: "document",
        pages,
    })?;
    json.push('\n');
    Ok(json)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn para(t: &str) -> Block {
        Block::Paragraph { text: t.into() }
    }

    #[test]
    fn image_sources_in_order() {
        let blocks = vec![
            Block::Image {
                alt: String::new(),
                src: "b.png".into(),
            },
            para("between"),
            Block::Image {
                alt: "fig".into(),
                src: "a.png".into(),
            },
        ];
        assert_eq!(image_sources(&blocks).collect::<Vec<_>>(), ["b.png", "a.png"]);
        assert_eq!(image_sources(&[para("none")]).count(), 0);
    }

    #[test]
    fn text_paragraphs_split_on_blank_lines() {
        let blocks = from_text("First line of text\ncontinues here\n\nSecond paragraph");
        assert_eq!(
            blocks,
            vec![
                para("First line of text continues here"),
                para("Second paragraph")
            ]
        );
    }

    #[test]
    fn text_dehyphenates_wrapped_words() {
        let blocks = from_text("an extra-\nordinary result and more words follow\nhere");
        assert_eq!(blocks, vec![para("an extraordinary result and more words follow here")]);
    }

    #[test]
    fn text_short_sentence_line_ends_paragraph() {
        let text = "This is a long line of running text that fills the column\nand it ends.\nA new paragraph starts here on this line";
        let blocks = from_text(text);
        assert_eq!(blocks.len(), 2);
        assert_eq!(
            blocks[0],
            para("This is a long line of running text that fills the column and it ends.")
        );
    }

    #[test]
    fn text_detects_headings() {
        let blocks = from_text("INTRODUCTION\nSome text\n\n2.1 Related Work\nMore text");
        assert_eq!(
            blocks[0],
            Block::Heading {
                level: 2,
                text: "INTRODUCTION".into()
            }
        );
        assert_eq!(
            blocks[2],
            Block::Heading {
                level: 3,
                text: "2.1 Related Work".into()
            }
        );
    }

    #[test]
    fn text_numbered_items_are_lists_not_headings() {
        let blocks = from_text("1. Install the package\n2. Run the binary");
        assert_eq!(
            blocks,
            vec![Block::List {
                ordered: true,
                items: vec!["Install the package".into(), "Run the binary".into()]
            }]
        );
    }

    #[test]
    fn text_bullets_with_wrapped_item() {
        let blocks = from_text("• first item that wraps\nonto a second line\n• second item");
        assert_eq!(
            blocks,
            vec![Block::List {
                ordered: false,
                items: vec![
                    "first item that wraps onto a second line".into(),
                    "second item".into()
                ]
            }]
        );
    }

    #[test]
    fn text_column_runs_become_tables() {
        let blocks = from_text("Name    Qty    Price\nApple   3      1.20\nPear    5      0.80");
        assert_eq!(
            blocks,
            vec![Block::Table {
                rows: vec![
                    vec!["Name".into(), "Qty".into(), "Price".into()],
                    vec!["Apple".into(), "3".into(), "1.20".into()],
                    vec!["Pear".into(), "5".into(), "0.80".into()],
                ]
            }]
        );
    }

    #[test]
    fn text_indented_runs_become_code() {
        let blocks = from_text("Example:\n    fn main() {\n        run();\n    }");
        assert_eq!(
            blocks[1],
            Block::Code {
                language: None,
                text: "fn main() {\n    run();\n}".into()
            }
        );
    }

    #[test]
    fn markdown_round_structure() {
        let md = "# Title\n\nIntro text\nwraps.\n\n- a\n- b\n\n| H1 | H2 |\n| --- | --- |\n| x | y \\| z |\n\n```rust\nlet x = 1;\n```\n\n![Figure 1](_page_0_Picture_0.png)";
        let blocks = from_markdown(md);
        assert_eq!(
            blocks,
            vec![
                Block::Heading {
                    level: 1,
                    text: "Title".into()
                },
                para("Intro text wraps."),
                Block::List {
                    ordered: false,
                    items: vec!["a".into(), "b".into()]
                },
                Block::Table {
                    rows: vec![
                        vec!["H1".into(), "H2".into()],
                        vec!["x".into(), "y | z".into()]
                    ]
                },
                Block::Code {
                    language: Some("rust".into()),
                    text: "let x = 1;".into()
                },
                Block::Image {
                    alt: "Figure 1".into(),
                    src: "_page_0_Picture_0.png".into()
                },
            ]
        );
    }

    #[test]
    fn markdown_drops_rules_and_comments() {
        let blocks = from_markdown("one\n\n---\n\n<!-- page 2 -->\n\ntwo");
        assert_eq!(blocks, vec![para("one"), para("two")]);
    }

    #[test]
    fn markdown_renderer_reparses_identically() {
        let blocks = vec![
            Block::Heading {
                level: 2,
                text: "Results".into(),
            },
            Block::List {
                ordered: true,
                items: vec!["one".into(), "two".into()],
            },
            Block::Table {
                rows: vec![vec!["a".into(), "b".into()], vec!["1".into(), "2".into()]],
            },
        ];
        assert_eq!(from_markdown(&to_markdown(&blocks)), blocks);
    }

    #[test]
    fn render_markdown_inserts_separators() {
        let pages = vec![
            PageBlocks::new(1, vec![para("one")]),
            PageBlocks::new(2, vec![para("two")]),
        ];
        assert_eq!(
            render_markdown(&pages, &PageSeparator::Comment),
            "one\n\n<!-- page 2 -->\n\ntwo\n"
        );
        assert_eq!(render_markdown(&pages, &PageSeparator::None), "one\n\ntwo\n");
    }

    #[test]
    fn render_html_escapes() {
        let pages = vec![PageBlocks::new(1, vec![para("a < b & c")])];
        let html = render_html("T & T", &pages);
        assert!(html.contains("<title>T &amp; T</title>"));
        assert!(html.contains("<p>a &lt; b &amp; c</p>"));
        assert!(html.contains("data-page=\"1\""));
    }

    #[test]
    fn render_json_tags_blocks() {
        let pages = vec![PageBlocks::new(
            1,
            vec![Block::Heading {
                level: 1,
                text: "T".into(),
            }],
        )];
        let v: serde_json::Value = serde_json::from_str(&render_json(&pages).unwrap()).unwrap();
        assert_eq!(v["block_type"], "document");
        assert_eq!(v["pages"][0]["page"], 1);
        assert_eq!(v["pages"][0]["blocks"][0]["block_type"], "heading");
        assert_eq!(v["pages"][0]["blocks"][0]["level"], 1);
    }
}
