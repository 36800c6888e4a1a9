//! Metadata block (spec §3 "Metadata Block") emitted as YAML frontmatter.

use serde::Serialize;

#[derive(Debug, Clone, Default, Serialize)]
pub struct MetadataBlock {
    pub title: Option<String>,
    pub description: Option<String>,
    pub author: Option<String>,
    pub url: String,
    /// ISO-8601, e.g. `2026-07-31T00:00:00Z`.
    pub fetched_at: String,
}

impl MetadataBlock {
    /// Render as YAML frontmatter (`---\nkey: value\n---\n\n`). Omits absent fields.
    pub fn to_frontmatter(&self) -> String {
        let mut out = String::from("---\n");
        if let Some(t) = &self.title {
            out.push_str(&format!("title: {}\n", yaml_scalar(t)));
        }
        if let Some(d) = &self.description {
            out.push_str(&format!("description: {}\n", yaml_scalar(d)));
        }
        if let Some(a) = &self.author {
            out.push_str(&format!("author: {}\n", yaml_scalar(a)));
        }
        out.push_str(&format!("url: {}\n", yaml_scalar(&self.url)));
        out.push_str(&format!("fetchedAt: {}\n", yaml_scalar(&self.fetched_at)));
        out.push_str("---\n\n");
        out
    }
}

fn yaml_scalar(s: &str) -> String {
    if s.chars().any(|c| matches!(c, ':' | '#' | '\n' | '"' | '\'')) {
        format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        s.to_string()
    }
}
