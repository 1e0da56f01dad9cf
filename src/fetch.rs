use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use regex::Regex;
use tracing::debug;

use crate::htmltext;

const USER_AGENT: &str =
    "svtrack-bot/1.0 (+https://github.com/svtrack/standards-version-tracker)";
const TIMEOUT: Duration = Duration::from_secs(25);
/// Extra HTML-level redirect hops beyond what reqwest follows itself.
const MAX_HTML_HOPS: usize = 2;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },
}

/// One fetched page, post-redirect.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub final_url: String,
    pub raw: String,
    pub lines: Vec<String>,
    pub last_modified: Option<NaiveDate>,
}

/// The fetch collaborator. Reconciliation only sees this trait, so tests run
/// rows against a map-backed fake instead of the network.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(TIMEOUT)
            .build()?;
        Ok(HttpFetcher { client })
    }

    async fn get_once(&self, url: &str) -> Result<(String, String, Option<NaiveDate>), FetchError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Transport {
                url: url.to_string(),
                source: e,
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let final_url = resp.url().to_string();
        let last_modified = resp
            .headers()
            .get(reqwest::header::LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_http_date);

        let raw = resp.text().await.map_err(|e| FetchError::Transport {
            url: url.to_string(),
            source: e,
        })?;

        Ok((final_url, raw, last_modified))
    }
}

#[async_trait]
impl PageSource for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let mut current = url.to_string();
        let (mut final_url, mut raw, mut last_modified) = self.get_once(&current).await?;

        // HTTP redirects are reqwest's job; some trackers redirect via meta
        // refresh or a JS assignment instead, so chase those a bounded number
        // of times.
        for hop in 0..MAX_HTML_HOPS {
            match html_redirect_target(&final_url, &raw) {
                Some(target) if target != final_url && target != current => {
                    debug!("html redirect hop {}: {} -> {}", hop + 1, final_url, target);
                    current = target.clone();
                    let (u, r, lm) = self.get_once(&target).await?;
                    final_url = u;
                    raw = r;
                    last_modified = lm;
                }
                _ => break,
            }
        }

        let lines = htmltext::to_lines(&raw);
        Ok(FetchedPage {
            final_url,
            raw,
            lines,
            last_modified,
        })
    }
}

static META_REFRESH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<meta[^>]+http-equiv=["']?refresh["']?[^>]+content=["']?[^"']*url\s*=\s*([^"'>\s;]+)"#)
        .unwrap()
});
static JS_LOCATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)window\.location(?:\.href)?\s*=\s*["']([^"']+)["']"#).unwrap()
});
static REDIRECTING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bRedirecting\b").unwrap());
static ANCHOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)<a[^>]+href=["']([^"']+)["']"#).unwrap());
static CANONICAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<link[^>]+rel=["']?canonical["']?[^>]+href=["']([^"']+)["']"#).unwrap()
});

/// Redirect target embedded in the page body, if any: meta refresh, a JS
/// `window.location` assignment, the first anchor of a "Redirecting" stub,
/// or a canonical link that points somewhere else.
fn html_redirect_target(base_url: &str, html: &str) -> Option<String> {
    if let Some(c) = META_REFRESH_RE.captures(html) {
        return Some(resolve(base_url, c[1].trim()));
    }
    if let Some(c) = JS_LOCATION_RE.captures(html) {
        return Some(resolve(base_url, c[1].trim()));
    }
    if REDIRECTING_RE.is_match(html) {
        if let Some(c) = ANCHOR_RE.captures(html) {
            return Some(resolve(base_url, c[1].trim()));
        }
    }
    if let Some(c) = CANONICAL_RE.captures(html) {
        return Some(resolve(base_url, c[1].trim()));
    }
    None
}

/// Minimal relative-reference resolution against an absolute base.
fn resolve(base: &str, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }
    if let Some(rest) = href.strip_prefix("//") {
        let scheme = base.split("://").next().unwrap_or("https");
        return format!("{}://{}", scheme, rest);
    }
    let (scheme_host, path) = split_base(base);
    if href.starts_with('/') {
        return format!("{}{}", scheme_host, href);
    }
    let dir = match path.rfind('/') {
        Some(i) => &path[..=i],
        None => "/",
    };
    format!("{}{}{}", scheme_host, dir, href)
}

fn split_base(base: &str) -> (&str, &str) {
    if let Some(scheme_end) = base.find("://") {
        let after = &base[scheme_end + 3..];
        match after.find('/') {
            Some(i) => base.split_at(scheme_end + 3 + i),
            None => (base, "/"),
        }
    } else {
        (base, "/")
    }
}

fn parse_http_date(s: &str) -> Option<NaiveDate> {
    chrono::DateTime::parse_from_rfc2822(s)
        .ok()
        .map(|dt| dt.date_naive())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_refresh_target() {
        let html = r#"<meta http-equiv="refresh" content="0; url=https://example.org/v2/">"#;
        assert_eq!(
            html_redirect_target("https://example.org/latest/", html),
            Some("https://example.org/v2/".to_string())
        );
    }

    #[test]
    fn js_location_target() {
        let html = r#"<script>window.location.href = "/arf/1.22/";</script>"#;
        assert_eq!(
            html_redirect_target("https://example.org/latest/", html),
            Some("https://example.org/arf/1.22/".to_string())
        );
    }

    #[test]
    fn redirecting_stub_uses_first_anchor() {
        let html = r#"<p>Redirecting</p><a href="../2.7.3/index.html">continue</a>"#;
        assert_eq!(
            html_redirect_target("https://example.org/docs/latest/index.html", html),
            Some("https://example.org/docs/latest/../2.7.3/index.html".to_string())
        );
    }

    #[test]
    fn no_target_in_plain_page() {
        assert_eq!(html_redirect_target("https://x.org/", "<p>hello</p>"), None);
    }

    #[test]
    fn http_date_parses() {
        assert_eq!(
            parse_http_date("Thu, 07 Mar 2024 12:00:00 GMT"),
            NaiveDate::from_ymd_opt(2024, 3, 7)
        );
    }
}
