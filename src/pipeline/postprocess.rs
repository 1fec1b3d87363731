//! Post-processing: deterministic cleanup of LLM-refined Markdown.
//!
//! Even a well-prompted model drifts from the requested format. It wraps
//! answers in fences, emits CRLF, breaks tables and invents figures. These
//! rules repair that without touching the content.
//!
//! Rule order matters: fences come off before line endings are normalised
//! so the fence regex sees the raw reply, and image filtering runs before
//! the final-newline pass.

use once_cell::sync::Lazy;
use regex::Regex;

/// Clean an LLM reply for one page.
///
/// `known_images` are the image filenames extracted from that page; image
/// references to them are always kept, while references to anything else
/// that is not an absolute http(s) URL are reduced to their alt text.
///
/// Rules (applied in order):
/// 1. Strip outer Markdown fences
/// 2. Normalise line endings (CRLF → LF)
/// 3. Trim trailing whitespace per line
/// 4. Collapse 3+ consecutive blank lines down to 2
/// 5. Ensure heading lines have a blank line before them
/// 6. Insert a missing GFM separator row after a table header
/// 7. Remove separator rows in table bodies
/// 8. Reduce invented image links to italic captions
/// 9. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 10. End with exactly one newline
pub fn clean_markdown(input: &str, known_images: &[String]) -> String {
    let s = strip_markdown_fences(input);
    let s = normalise_line_endings(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    let s = normalise_heading_spacing(&s);
    let s = fix_broken_tables(&s);
    let s = remove_mid_table_separators(&s);
    let s = remove_invented_images(&s, known_images);
    let s = remove_invisible_chars(&s);
    ensure_final_newline(&s)
}

// ── Rule 1: outer fences ─────────────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:markdown|md)?\r?\n(.*?)\r?\n```\s*$").unwrap());

fn strip_markdown_fences(input: &str) -> String {
    match RE_OUTER_FENCES.captures(input.trim()) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}

// ── Rules 2–4: whitespace ────────────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{4,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n\n").into_owned()
}

// ── Rule 5: heading spacing ──────────────────────────────────────────────

static RE_HEADING_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#{1,6}\s").unwrap());

fn normalise_heading_spacing(input: &str) -> String {
    let mut result = String::with_capacity(input.len() + 64);
    let mut in_code = false;
    for (i, line) in input.lines().enumerate() {
        if line.trim_start().starts_with("```") {
            in_code = !in_code;
        }
        if !in_code && i > 0 && RE_HEADING_LINE.is_match(line) {
            let kept = result.trim_end_matches('\n').len();
            result.truncate(kept);
            result.push_str("\n\n");
        }
        result.push_str(line);
        result.push('\n');
    }
    result
}

// ── Rules 6–7: tables ────────────────────────────────────────────────────

fn is_table_row(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.len() > 2 && trimmed.starts_with('|') && trimmed.ends_with('|')
}

fn is_separator_row(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with('|')
        && trimmed.contains('-')
        && trimmed
            .chars()
            .all(|c| matches!(c, '|' | '-' | ':' | ' '))
}

/// Insert a separator after a table's first row when the model left it out.
fn fix_broken_tables(input: &str) -> String {
    let lines: Vec<&str> = input.lines().collect();
    let mut result: Vec<String> = Vec::with_capacity(lines.len() + 4);

    for (i, line) in lines.iter().enumerate() {
        result.push(line.to_string());

        let starts_table = is_table_row(line)
            && !is_separator_row(line)
            && !(i > 0 && is_table_row(lines[i - 1]));
        if !starts_table {
            continue;
        }

        let next = lines.get(i + 1).copied().unwrap_or("");
        if is_table_row(next) && !is_separator_row(next) {
            let columns = line.trim().matches('|').count().saturating_sub(1).max(1);
            let sep: String = std::iter::once("|")
                .chain(std::iter::repeat_n(" --- |", columns))
                .collect();
            result.push(sep);
        }
    }

    result.join("\n")
}

/// Keep only the separator in position 2 of each table.
fn remove_mid_table_separators(input: &str) -> String {
    let mut result: Vec<&str> = Vec::new();
    let mut row_in_table = 0usize;

    for line in input.lines() {
        if is_table_row(line) {
            row_in_table += 1;
            if is_separator_row(line) && row_in_table != 2 {
                continue;
            }
        } else {
            row_in_table = 0;
        }
        result.push(line);
    }

    result.join("\n")
}

// ── Rule 8: invented images ──────────────────────────────────────────────

static RE_IMAGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"!\[([^\]]*)\]\(([^)]*)\)").unwrap());

const PLACEHOLDER_HOSTS: &[&str] = &[
    "example.com",
    "placeholder.com",
    "via.placeholder.com",
    "dummyimage.com",
    "lorempixel.com",
    "picsum.photos",
    "placehold.it",
];

fn is_credible_image(url: &str, known_images: &[String]) -> bool {
    let u = url.trim();
    if u.is_empty() {
        return false;
    }
    if known_images.iter().any(|k| k == u) {
        return true;
    }
    (u.starts_with("http://") || u.starts_with("https://"))
        && !PLACEHOLDER_HOSTS.iter().any(|h| u.contains(h))
}

fn remove_invented_images(input: &str, known_images: &[String]) -> String {
    RE_IMAGE
        .replace_all(input, |caps: &regex::Captures<'_>| {
            if is_credible_image(&caps[2], known_images) {
                return caps[0].to_string();
            }
            let alt = caps[1].trim();
            if alt.is_empty() {
                String::new()
            } else {
                format!("*{}*", alt)
            }
        })
        .into_owned()
}

// ── Rules 9–10 ───────────────────────────────────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        ['\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}'],
        "",
    )
}

fn ensure_final_newline(input: &str) -> String {
    let trimmed = input.trim_end();
    if trimmed.is_empty() {
        String::from("\n")
    } else {
        format!("{}\n", trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn none() -> Vec<String> {
        Vec::new()
    }

    #[test]
    fn strips_fences_with_and_without_language() {
        assert_eq!(strip_markdown_fences("```markdown\n# Hi\nthere\n```"), "# Hi\nthere");
        assert_eq!(strip_markdown_fences("```\n# Hi\n```\n"), "# Hi");
        assert_eq!(strip_markdown_fences("# Hi\n```\ncode\n```"), "# Hi\n```\ncode\n```");
    }

    #[test]
    fn whitespace_rules() {
        assert_eq!(normalise_line_endings("a\r\nb\rc"), "a\nb\nc");
        assert_eq!(trim_trailing_whitespace("  a   \nb\t"), "  a\nb");
        assert_eq!(collapse_blank_lines("a\n\n\n\n\n\nb"), "a\n\n\nb");
        assert_eq!(ensure_final_newline("x\n\n\n"), "x\n");
        assert_eq!(ensure_final_newline(""), "\n");
    }

    #[test]
    fn heading_gets_blank_line_but_not_inside_code() {
        let out = normalise_heading_spacing("text\n## Section\nbody");
        assert!(out.contains("text\n\n## Section\n"));

        let code = "```bash\n# comment\n```";
        assert_eq!(normalise_heading_spacing(code).trim_end(), code);
    }

    #[test]
    fn table_separator_inserted_once() {
        let out = fix_broken_tables("| A | B |\n| 1 | 2 |\n| 3 | 4 |");
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(is_separator_row(lines[1]));
        assert!(!is_separator_row(lines[3]));
    }

    #[test]
    fn well_formed_table_untouched() {
        let table = "| A | B |\n| --- | --- |\n| 1 | 2 |";
        assert_eq!(fix_broken_tables(table), table);
        assert_eq!(remove_mid_table_separators(table), table);
    }

    #[test]
    fn body_separators_removed() {
        let out = remove_mid_table_separators("| A |\n| --- |\n| 1 |\n| --- |\n| 2 |");
        assert_eq!(out.lines().filter(|l| is_separator_row(l)).count(), 1);
        assert!(out.ends_with("| 2 |"));
    }

    #[test]
    fn known_image_is_kept() {
        let known = vec!["_page_0_Picture_1.png".to_string()];
        let out = remove_invented_images("![Fig](_page_0_Picture_1.png)", &known);
        assert_eq!(out, "![Fig](_page_0_Picture_1.png)");
    }

    #[test]
    fn invented_images_become_captions() {
        assert_eq!(remove_invented_images("![Chart](chart.png)", &none()), "*Chart*");
        assert_eq!(
            remove_invented_images("![](https://example.com/x.png)", &none()),
            ""
        );
        let real = "![Fig](https://arxiv.org/fig1.png)";
        assert_eq!(remove_invented_images(real, &none()), real);
    }

    #[test]
    fn invisible_chars_removed() {
        assert_eq!(remove_invisible_chars("a\u{200B}b\u{FEFF}c\u{00AD}d"), "abcd");
    }

    #[test]
    fn full_pipeline() {
        let known = vec!["_page_2_Picture_0.png".to_string()];
        let input = "```markdown\n# Title\r\n\r\nSome text   \n\n\n\n\n\n## Part\n| A | B |\n| 1 | 2 |\n![Plot](_page_2_Picture_0.png)\n![Fake](fake.png)\n```";
        let out = clean_markdown(input, &known);
        assert!(out.starts_with("# Title\n"));
        assert!(out.ends_with('\n') && !out.ends_with("\n\n"));
        assert!(!out.contains("\n\n\n\n"));
        assert!(out.contains("\n\n## Part\n"));
        assert!(out.contains("| --- | --- |"));
        assert!(out.contains("![Plot](_page_2_Picture_0.png)"));
        assert!(out.contains("*Fake*"));
    }
}
