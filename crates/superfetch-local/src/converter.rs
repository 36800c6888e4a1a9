//! HTML-to-Markdown conversion (spec §4.5).

use ego_tree::NodeRef;
use html_scraper::{ElementRef, Html, Node, Selector};
use url::Url;

const LANG_HINTS: &[(&str, &[&str])] = &[
    ("rust", &["fn ", "let mut ", "impl ", "::new("]),
    ("python", &["def ", "import ", "self.", "elif "]),
    ("typescript", &["interface ", "=>", ": string", "export "]),
    ("javascript", &["function ", "const ", "=>", "document."]),
    ("bash", &["#!/bin/", "$(", "echo "]),
    ("css", &["{", "px;", "color:"]),
    ("html", &["<div", "<span", "</"]),
    ("json", &["{\"", "\":"]),
    ("yaml", &[": \n", "---\n"]),
    ("sql", &["SELECT ", "FROM ", "WHERE "]),
    ("go", &["func ", "package ", ":="]),
];

pub struct ConvertOptions<'a> {
    pub base_url: &'a Url,
}

/// Converts a cleaned HTML fragment (or full document) to GFM-flavored
/// Markdown. Returns the markdown body and, if present, an inferred title.
pub fn convert(html: &str, opts: &ConvertOptions) -> (String, Option<String>) {
    let doc = Html::parse_fragment(html);
    let title = Selector::parse("h1")
        .ok()
        .and_then(|sel| doc.select(&sel).next())
        .map(|e| e.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty());

    let mut out = String::new();
    for child in doc.root_element().children() {
        render_node(child, opts, &mut out);
    }
    let md = post_process(&out);
    (md, title)
}

fn render_node(node: NodeRef<Node>, opts: &ConvertOptions, out: &mut String) {
    if let Some(el) = ElementRef::wrap(node) {
        render_element(&el, opts, out);
    } else if let Some(text) = node.value().as_text() {
        out.push_str(&escape_markdown(text));
    }
}

fn render_children(el: &ElementRef, opts: &ConvertOptions, out: &mut String) {
    for child in el.children() {
        render_node(child, opts, out);
    }
}

fn render_element(el: &ElementRef, opts: &ConvertOptions, out: &mut String) {
    let tag = el.value().name();
    match tag {
        "script" | "style" | "noscript" => {}
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
            let level = tag[1..].parse::<usize>().unwrap_or(1);
            let text: String = el.text().collect::<String>().trim().to_string();
            if !text.is_empty() {
                out.push('\n');
                out.push_str(&"#".repeat(level));
                out.push(' ');
                out.push_str(&escape_markdown(&text));
                out.push('\n');
            }
        }
        "p" => {
            out.push('\n');
            render_children(el, opts, out);
            out.push('\n');
        }
        "br" => out.push_str("  \n"),
        "hr" => out.push_str("\n---\n"),
        "strong" | "b" => {
            out.push_str("**");
            render_children(el, opts, out);
            out.push_str("**");
        }
        "em" | "i" => {
            out.push('_');
            render_children(el, opts, out);
            out.push('_');
        }
        "a" => render_link(el, opts, out),
        "img" => render_image(el, opts, out),
        "pre" => render_pre(el, out),
        "code" => render_inline_code(el, out),
        "ul" | "ol" => render_list(el, opts, out, tag == "ol"),
        "li" => render_children(el, opts, out),
        "blockquote" => render_blockquote(el, opts, out),
        "table" => render_table(el, out),
        "div" if is_admonition(el).is_some() => render_admonition(el, opts, out),
        _ => render_children(el, opts, out),
    }
}

fn render_link(el: &ElementRef, opts: &ConvertOptions, out: &mut String) {
    let text: String = el.text().collect::<String>().trim().to_string();
    let href = el.value().attr("href").unwrap_or("");
    if href.is_empty() || href.starts_with('#') {
        out.push_str(&escape_markdown(&text));
        return;
    }
    let resolved = opts
        .base_url
        .join(href)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string());
    let label = if text.is_empty() { resolved.clone() } else { text };
    out.push('[');
    out.push_str(&escape_markdown(&label));
    out.push_str("](");
    out.push_str(&resolved);
    out.push(')');
}

fn render_image(el: &ElementRef, opts: &ConvertOptions, out: &mut String) {
    let src = el
        .value()
        .attr("src")
        .or_else(|| el.value().attr("data-src"))
        .or_else(|| el.value().attr("data-lazy-src"))
        .or_else(|| el.value().attr("data-original"))
        .or_else(|| {
            el.value()
                .attr("srcset")
                .and_then(|s| s.split(',').next())
                .map(|s| s.trim().split_whitespace().next().unwrap_or(""))
        })
        .unwrap_or("");

    let src = if src.starts_with("data:") {
        "about:blank#inline-image".to_string()
    } else if src.is_empty() {
        "about:blank#missing-image".to_string()
    } else {
        opts.base_url
            .join(src)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| src.to_string())
    };

    let alt = el
        .value()
        .attr("alt")
        .filter(|a| !a.trim().is_empty())
        .map(|a| a.to_string())
        .unwrap_or_else(|| humanize_filename_stem(&src));

    out.push_str("![");
    out.push_str(&escape_markdown(&alt));
    out.push_str("](");
    out.push_str(&src);
    out.push(')');
}

fn humanize_filename_stem(src: &str) -> String {
    let stem = src
        .rsplit('/')
        .next()
        .unwrap_or(src)
        .split('.')
        .next()
        .unwrap_or("image");
    stem.replace(['-', '_'], " ")
}

fn render_pre(el: &ElementRef, out: &mut String) {
    let code_el = Selector::parse("code")
        .ok()
        .and_then(|sel| el.select(&sel).next());
    let content: String = code_el.as_ref().unwrap_or(el).text().collect();
    let lang = code_el
        .as_ref()
        .and_then(|c| detect_language_from_attrs(c))
        .or_else(|| detect_language_from_attrs(el))
        .or_else(|| detect_language_heuristic(&content));

    out.push_str("\n```");
    if let Some(lang) = lang {
        out.push_str(&lang);
    }
    out.push('\n');
    out.push_str(content.trim_end_matches('\n'));
    out.push_str("\n```\n");
}

fn detect_language_from_attrs(el: &ElementRef) -> Option<String> {
    if let Some(data_lang) = el.value().attr("data-language") {
        return Some(data_lang.to_string());
    }
    let class = el.value().attr("class")?;
    for token in class.split_whitespace() {
        for prefix in ["language-", "lang-", "highlight-"] {
            if let Some(lang) = token.strip_prefix(prefix) {
                return Some(lang.to_string());
            }
        }
    }
    None
}

fn detect_language_heuristic(content: &str) -> Option<String> {
    let mut best: Option<(&str, usize)> = None;
    for (lang, hints) in LANG_HINTS {
        let score = hints.iter().filter(|h| content.contains(*h)).count();
        if score > 0 && best.map(|(_, s)| score > s).unwrap_or(true) {
            best = Some((lang, score));
        }
    }
    best.map(|(lang, _)| lang.to_string())
}

fn render_inline_code(el: &ElementRef, out: &mut String) {
    let content: String = el.text().collect();
    let longest_run = longest_backtick_run(&content);
    let delim = "`".repeat(longest_run + 1);
    let pad = if content.starts_with('`') || content.ends_with('`') {
        " "
    } else {
        ""
    };
    out.push_str(&delim);
    out.push_str(pad);
    out.push_str(&content);
    out.push_str(pad);
    out.push_str(&delim);
}

fn longest_backtick_run(s: &str) -> usize {
    let mut max_run = 0;
    let mut run = 0;
    for c in s.chars() {
        if c == '`' {
            run += 1;
            max_run = max_run.max(run);
        } else {
            run = 0;
        }
    }
    max_run
}

fn render_list(el: &ElementRef, opts: &ConvertOptions, out: &mut String, ordered: bool) {
    out.push('\n');
    let li_sel = Selector::parse("li").ok();
    if let Some(sel) = li_sel {
        for (i, li) in el.select(&sel).enumerate() {
            if li
                .parent()
                .and_then(ElementRef::wrap)
                .map(|p| p == *el)
                .unwrap_or(false)
            {
                let marker = if ordered {
                    format!("{}. ", i + 1)
                } else {
                    "- ".to_string()
                };
                out.push_str(&marker);
                let mut item = String::new();
                render_children(&li, opts, &mut item);
                out.push_str(item.trim());
                out.push('\n');
            }
        }
    }
    out.push('\n');
}

fn render_blockquote(el: &ElementRef, opts: &ConvertOptions, out: &mut String) {
    let mut inner = String::new();
    render_children(el, opts, &mut inner);
    out.push('\n');
    for line in inner.trim().lines() {
        out.push_str("> ");
        out.push_str(line);
        out.push('\n');
    }
    out.push('\n');
}

fn is_admonition(el: &ElementRef) -> Option<&'static str> {
    let class = el.value().attr("class")?.to_ascii_lowercase();
    const KINDS: &[&str] = &[
        "note", "tip", "info", "warning", "danger", "caution", "important",
    ];
    KINDS.iter().find(|k| class.contains(*k)).copied()
}

fn render_admonition(el: &ElementRef, opts: &ConvertOptions, out: &mut String) {
    let kind = is_admonition(el).unwrap_or("note").to_ascii_uppercase();
    let mut inner = String::new();
    render_children(el, opts, &mut inner);
    out.push('\n');
    out.push_str(&format!("> [!{kind}]\n"));
    for line in inner.trim().lines() {
        out.push_str("> ");
        out.push_str(line);
        out.push('\n');
    }
    out.push('\n');
}

fn render_table(el: &ElementRef, out: &mut String) {
    let complex = Selector::parse("td[colspan], td[rowspan], th[colspan], th[rowspan]")
        .map(|sel| el.select(&sel).next().is_some())
        .unwrap_or(false);
    if complex {
        out.push('\n');
        out.push_str(&el.html());
        out.push('\n');
        return;
    }

    let row_sel = Selector::parse("tr").unwrap();
    let cell_sel = Selector::parse("th, td").unwrap();
    let rows: Vec<Vec<String>> = el
        .select(&row_sel)
        .map(|tr| {
            tr.select(&cell_sel)
                .map(|c| c.text().collect::<String>().trim().replace('|', "\\|"))
                .collect()
        })
        .filter(|r: &Vec<String>| !r.is_empty())
        .collect();

    if rows.is_empty() {
        return;
    }

    out.push('\n');
    let header = &rows[0];
    out.push_str("| ");
    out.push_str(&header.join(" | "));
    out.push_str(" |\n");
    out.push_str("| ");
    out.push_str(&vec!["---"; header.len()].join(" | "));
    out.push_str(" |\n");
    for row in &rows[1..] {
        out.push_str("| ");
        out.push_str(&row.join(" | "));
        out.push_str(" |\n");
    }
    out.push('\n');
}

fn escape_markdown(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '\\' | '`' | '*' | '_' | '~') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Drops empty headings, collapses blank-line runs, and trims trailing
/// whitespace on each line (spec §4.5 post-processing).
fn post_process(markdown: &str) -> String {
    let mut lines: Vec<&str> = Vec::new();
    for raw in markdown.lines() {
        let line = raw.trim_end();
        let is_empty_heading = line.trim_start().starts_with('#')
            && line.trim_start_matches('#').trim().is_empty();
        if is_empty_heading {
            continue;
        }
        lines.push(line);
    }

    let mut out = String::new();
    let mut blank_run = 0;
    for line in lines {
        if line.is_empty() {
            blank_run += 1;
            if blank_run > 2 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line);
        out.push('\n');
    }
    out.trim().to_string() + "\n"
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(base: &Url) -> ConvertOptions<'_> {
        ConvertOptions { base_url: base }
    }

    #[test]
    fn converts_heading_and_paragraph() {
        let base = Url::parse("https://example.com/").unwrap();
        let (md, _) = convert("<h1>Title</h1><p>Body text.</p>", &opts(&base));
        assert!(md.contains("# Title"));
        assert!(md.contains("Body text."));
    }

    #[test]
    fn fenced_code_detects_rust_language() {
        let base = Url::parse("https://example.com/").unwrap();
        let (md, _) = convert("<pre><code>fn main() { let mut x = 1; }</code></pre>", &opts(&base));
        assert!(md.contains("```rust"));
    }

    #[test]
    fn inline_code_uses_longer_delimiter_than_content() {
        let base = Url::parse("https://example.com/").unwrap();
        let (md, _) = convert("<p>Use <code>a`b</code> here.</p>", &opts(&base));
        assert!(md.contains("``a`b``"));
    }

    #[test]
    fn relative_links_resolve_against_base_url() {
        let base = Url::parse("https://example.com/dir/").unwrap();
        let (md, _) = convert(r#"<a href="page.html">link</a>"#, &opts(&base));
        assert!(md.contains("https://example.com/dir/page.html"));
    }

    #[test]
    fn admonition_div_becomes_gfm_callout() {
        let base = Url::parse("https://example.com/").unwrap();
        let (md, _) = convert(r#"<div class="note">heads up</div>"#, &opts(&base));
        assert!(md.contains("[!NOTE]"));
    }
}
