//! The `fetch-url` tool handler (spec §6 "Tool contract").
//!
//! `URL Guard -> Fetcher -> Transform Worker Pool -> Content Cache`, then
//! either inline markdown or a `resource_link` when the output is large.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use superfetch_core::cache::CacheKey;
use superfetch_core::fetch::FetchRequest;
use superfetch_core::transform::TransformOptions;

use crate::state::AppState;

const DEFAULT_MAX_INLINE_CHARS: usize = 20_000;
const DEFAULT_MAX_BYTES: u64 = 10 * 1024 * 1024;
const DEFAULT_TIMEOUT_MS: u64 = 15_000;

#[derive(Debug, Deserialize)]
pub struct FetchUrlInput {
    pub url: String,
    #[serde(default)]
    pub skip_noise_removal: bool,
    #[serde(default)]
    pub force_refresh: bool,
    pub max_inline_chars: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct FetchUrlOutput {
    pub url: String,
    pub input_url: String,
    pub resolved_url: String,
    pub title: Option<String>,
    pub markdown: String,
}

/// Runs the full `fetch-url` pipeline. Returns `(structured_content, is_error,
/// resource_link)`.
pub async fn run(state: &Arc<AppState>, input: FetchUrlInput) -> (Value, bool, Option<String>) {
    let max_inline_chars = input.max_inline_chars.unwrap_or(DEFAULT_MAX_INLINE_CHARS);

    let options_digest = options_digest(input.skip_noise_removal);
    let fingerprint_key_url = canonicalize_for_fingerprint(&input.url);
    let fingerprint = superfetch_local::cache::ContentCache::fingerprint(&fingerprint_key_url, &options_digest);
    let cache_key = CacheKey::markdown(fingerprint.clone());

    if !input.force_refresh && state.config.cache_enabled {
        if let Some(entry) = state.cache.get(&cache_key) {
            let markdown = String::from_utf8_lossy(&entry.payload).to_string();
            return build_output(&input.url, &input.url, markdown, None, max_inline_chars, &cache_key);
        }
    }

    let fetch_request = FetchRequest {
        url: input.url.clone(),
        timeout_ms: DEFAULT_TIMEOUT_MS,
        max_bytes: DEFAULT_MAX_BYTES,
        max_redirects: 5,
        user_agent: state.config.user_agent.clone(),
    };

    let fetched = match state.fetcher.fetch(&fetch_request).await {
        Ok(f) => f,
        Err(e) => return (error_payload(&input.url, &e), true, None),
    };

    let html = fetched.text_lossy();
    let transform_options = TransformOptions {
        include_metadata: true,
        skip_noise_removal: input.skip_noise_removal,
    };

    let transform_result = match state
        .worker_pool
        .submit(html, fetched.final_url.clone(), transform_options)
        .await
    {
        Ok(r) => r,
        Err(e) => return (error_payload(&input.url, &e), true, None),
    };

    if state.config.cache_enabled {
        state.cache.insert(
            cache_key.clone(),
            transform_result.markdown.clone().into_bytes(),
            "text/markdown".to_string(),
        );
    }

    build_output(
        &input.url,
        &fetched.final_url,
        transform_result.markdown,
        transform_result.title,
        max_inline_chars,
        &cache_key,
    )
}

fn build_output(
    input_url: &str,
    resolved_url: &str,
    markdown: String,
    title: Option<String>,
    max_inline_chars: usize,
    cache_key: &CacheKey,
) -> (Value, bool, Option<String>) {
    if markdown.chars().count() > max_inline_chars {
        let truncated: String = markdown.chars().take(max_inline_chars).collect();
        let mut payload = json!({
            "url": resolved_url,
            "inputUrl": input_url,
            "resolvedUrl": resolved_url,
            "markdown": truncated,
        });
        if let Some(title) = title {
            payload["title"] = json!(title);
        }
        (payload, false, Some(cache_key.resource_uri()))
    } else {
        let mut payload = json!({
            "url": resolved_url,
            "inputUrl": input_url,
            "resolvedUrl": resolved_url,
            "markdown": markdown,
        });
        if let Some(title) = title {
            payload["title"] = json!(title);
        }
        (payload, false, None)
    }
}

fn error_payload(url: &str, error: &superfetch_core::Error) -> Value {
    json!({
        "url": url,
        "error": error.message(),
        "code": error.code(),
    })
}

fn options_digest(skip_noise_removal: bool) -> String {
    format!("v1:skip_noise={skip_noise_removal}")
}

/// Case-normalizes the host portion of a URL for fingerprint stability
/// (spec §6 "Hostnames and hashes in URLs must be case-normalized").
fn canonicalize_for_fingerprint(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(mut parsed) => {
            let host_lower = parsed.host_str().map(|h| h.to_ascii_lowercase());
            if let Some(host) = host_lower {
                let _ = parsed.set_host(Some(&host));
            }
            parsed.to_string()
        }
        Err(_) => url.to_string(),
    }
}
