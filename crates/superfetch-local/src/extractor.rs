//! Readability-style content extraction with a quality gate (spec §4.4).

use html_scraper::{Html, Selector};

const NOISE_TAGS: &[&str] = &[
    "script", "style", "noscript", "iframe", "form", "button", "input", "select", "textarea",
    "nav", "aside", "footer",
];

const PROMO_TOKENS: &[&str] = &[
    "banner",
    "promo",
    "cta",
    "newsletter",
    "cookie",
    "modal",
    "pagination",
    "breadcrumb",
    "consent",
    "subscribe",
    "advert",
    "ads",
    "social-share",
    "sidebar",
];

#[derive(Debug, Clone, Default)]
pub struct ExtractedMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ExtractedArticle {
    /// The cleaned HTML fragment the converter should run on.
    pub html: String,
}

#[derive(Debug, Clone, Default)]
pub struct ExtractionResult {
    pub article: Option<ExtractedArticle>,
    pub metadata: ExtractedMetadata,
}

/// Runs metadata extraction, readability scoring and the quality gate over
/// `html`. Never panics on malformed input; worst case returns
/// `{article: None, metadata: default}` (spec §4.4 failure policy).
///
/// `skip_noise_removal` bypasses the noise-stripping step (script/style/nav/
/// promo-token removal): readability then scores the document as-is, per the
/// `fetch-url` tool's `skipNoiseRemoval` option.
pub fn extract(html: &str, skip_noise_removal: bool) -> ExtractionResult {
    let metadata = extract_metadata(html);
    let stripped = if skip_noise_removal {
        html.to_string()
    } else {
        strip_noise(html)
    };

    let original_len = visible_text_len(&stripped);
    if original_len < 400 {
        return ExtractionResult {
            article: None,
            metadata,
        };
    }

    let original_headings = count_headings(&stripped);
    let original_pre = count_pre(&stripped);

    let Some(candidate) = pick_readable_fragment(&stripped) else {
        return ExtractionResult {
            article: None,
            metadata,
        };
    };

    let candidate_len = visible_text_len(&candidate);
    let candidate_headings = count_headings(&candidate);
    let candidate_pre = count_pre(&candidate);

    let passes_text_ratio =
        original_len < 100 || (candidate_len as f64) >= 0.15 * (original_len as f64);
    let passes_heading_ratio = original_headings == 0
        || (candidate_headings as f64) >= 0.3 * (original_headings as f64);
    let passes_pre_ratio =
        original_pre == 0 || (candidate_pre as f64) >= 0.15 * (original_pre as f64);

    if passes_text_ratio && passes_heading_ratio && passes_pre_ratio {
        ExtractionResult {
            article: Some(ExtractedArticle { html: candidate }),
            metadata,
        }
    } else {
        ExtractionResult {
            article: Some(ExtractedArticle { html: stripped }),
            metadata,
        }
    }
}

fn extract_metadata(html: &str) -> ExtractedMetadata {
    let doc = Html::parse_document(html);
    let title = meta_content(&doc, "og:title")
        .or_else(|| meta_content(&doc, "twitter:title"))
        .or_else(|| {
            Selector::parse("title").ok().and_then(|sel| {
                doc.select(&sel)
                    .next()
                    .map(|e| e.text().collect::<String>().trim().to_string())
                    .filter(|s| !s.is_empty())
            })
        });
    let description =
        meta_content(&doc, "og:description").or_else(|| meta_content(&doc, "twitter:description"));
    ExtractedMetadata { title, description }
}

fn meta_content(doc: &Html, property: &str) -> Option<String> {
    let sel = Selector::parse(&format!(
        "meta[property='{property}'], meta[name='{property}']"
    ))
    .ok()?;
    doc.select(&sel)
        .next()
        .and_then(|e| e.value().attr("content"))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Removes script/style/etc. nodes and elements whose class/id carries a
/// promo token, by serializing only the surviving subtree.
fn strip_noise(html: &str) -> String {
    let doc = Html::parse_document(html);
    let body_sel = Selector::parse("body").ok();
    let root = body_sel
        .as_ref()
        .and_then(|sel| doc.select(sel).next())
        .unwrap_or_else(|| doc.root_element());

    let noise_sel = Selector::parse(&NOISE_TAGS.join(", ")).ok();
    collect_non_noise_html(&root, noise_sel.as_ref())
}

fn collect_non_noise_html(el: &html_scraper::ElementRef, noise: Option<&Selector>) -> String {
    if is_noise_element(el, noise) {
        return String::new();
    }
    let tag = el.value().name();
    let attrs: String = el
        .value()
        .attrs()
        .map(|(k, v)| format!(" {k}=\"{}\"", v.replace('"', "&quot;")))
        .collect();
    let mut inner = String::new();
    for child in el.children() {
        if let Some(child_el) = html_scraper::ElementRef::wrap(child) {
            inner.push_str(&collect_non_noise_html(&child_el, noise));
        } else if let Some(text) = child.value().as_text() {
            inner.push_str(text);
        }
    }
    format!("<{tag}{attrs}>{inner}</{tag}>")
}

fn is_noise_element(el: &html_scraper::ElementRef, noise: Option<&Selector>) -> bool {
    if let Some(sel) = noise {
        if sel.matches(el) {
            return true;
        }
    }
    let class_and_id = format!(
        "{} {}",
        el.value().attr("class").unwrap_or(""),
        el.value().attr("id").unwrap_or("")
    )
    .to_ascii_lowercase();
    PROMO_TOKENS.iter().any(|tok| class_and_id.contains(tok))
}

/// Picks the highest-scoring `article`/`main`/`section`/`div` subtree, biased
/// toward dense non-link text and penalized for link-heavy "nav soup".
fn pick_readable_fragment(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    let sel = Selector::parse("article, main, section, div").ok()?;
    let link_sel = Selector::parse("a").ok();
    let p_sel = Selector::parse("p").ok();

    let mut best_score: i64 = 0;
    let mut best_html: Option<String> = None;

    for (seen, el) in doc.select(&sel).take(20_000).enumerate() {
        let _ = seen;
        let text_chars: usize = el.text().map(|t| t.chars().count()).sum();
        if text_chars < 50 {
            continue;
        }
        let link_chars: usize = link_sel
            .as_ref()
            .map(|s| {
                el.select(s)
                    .map(|a| a.text().map(|t| t.chars().count()).sum::<usize>())
                    .sum()
            })
            .unwrap_or(0);
        let non_link = text_chars.saturating_sub(link_chars);
        let mut score = non_link as i64 - 3 * link_chars as i64;
        match el.value().name() {
            "article" => score += 700,
            "main" => score += 400,
            _ => {}
        }
        if text_chars > 0 {
            let density = link_chars as f64 / text_chars as f64;
            if density >= 0.66 {
                score -= 900;
            } else if density >= 0.5 {
                score -= 500;
            }
        }
        if let Some(s) = p_sel.as_ref() {
            score += 20 * el.select(s).take(50).count().min(10) as i64;
        }
        if non_link < 80 {
            score -= 200;
        }
        if score > best_score {
            best_score = score;
            best_html = Some(el.html());
        }
    }
    best_html
}

fn visible_text_len(html: &str) -> usize {
    let doc = Html::parse_fragment(html);
    doc.root_element().text().map(|t| t.chars().count()).sum()
}

fn count_headings(html: &str) -> usize {
    let doc = Html::parse_fragment(html);
    Selector::parse("h1, h2, h3, h4, h5, h6")
        .map(|sel| doc.select(&sel).count())
        .unwrap_or(0)
}

fn count_pre(html: &str) -> usize {
    let doc = Html::parse_fragment(html);
    Selector::parse("pre")
        .map(|sel| doc.select(&sel).count())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_document_skips_readability() {
        let html = "<html><body><p>short</p></body></html>";
        let result = extract(html, false);
        assert!(result.article.is_none());
    }

    #[test]
    fn og_title_takes_precedence_over_title_tag() {
        let html = r#"<html><head><title>Fallback</title>
            <meta property="og:title" content="Canonical Title"></head>
            <body><article><p>a</p></article></body></html>"#;
        let result = extract(html, false);
        assert_eq!(result.metadata.title.as_deref(), Some("Canonical Title"));
    }

    #[test]
    fn skip_noise_removal_retains_script_tags_in_extracted_article() {
        let html = format!(
            "<html><body><article>{}<script>trackPageview();</script></article></body></html>",
            "word ".repeat(100)
        );
        let kept = extract(&html, true);
        let article = kept.article.expect("long enough to pass the quality gate");
        assert!(article.html.contains("trackPageview"));

        let stripped = extract(&html, false);
        let article = stripped.article.expect("long enough to pass the quality gate");
        assert!(!article.html.contains("trackPageview"));
    }

    #[test]
    fn malformed_html_does_not_panic() {
        let html = "<html><body><div><p>unterminated";
        let _ = extract(html, false);
    }
}
