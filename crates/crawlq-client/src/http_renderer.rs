use std::net::IpAddr;
use std::time::Duration;

use crawlq_core::error::AppError;
use crawlq_core::traits::{Renderer, RendererFactory};
use reqwest::Client;
use reqwest::header::{CACHE_CONTROL, HeaderMap, HeaderValue, PRAGMA};
use url::Url;

use crate::DESKTOP_USER_AGENT;
use crate::simplify::ReaderView;

/// Launches [`HttpRenderer`] sessions that share one connection pool.
///
/// SSRF protection is **enabled** by default: pages on private or reserved
/// addresses are refused. Use [`allow_private_urls`](Self::allow_private_urls)
/// for local development against services on the same machine.
#[derive(Clone)]
pub struct HttpRendererFactory {
    client: Client,
    timeout_secs: u64,
    ssrf_protection: bool,
}

impl HttpRendererFactory {
    pub fn new() -> Result<Self, AppError> {
        Self::with_timeout(Duration::from_secs(30))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, AppError> {
        let mut headers = HeaderMap::new();
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));

        let client = Client::builder()
            .user_agent(DESKTOP_USER_AGENT)
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;

        Ok(Self {
            client,
            timeout_secs: timeout.as_secs(),
            ssrf_protection: true,
        })
    }

    /// Disable SSRF protection, allowing pages on private/reserved IPs.
    pub fn allow_private_urls(mut self) -> Self {
        self.ssrf_protection = false;
        self
    }
}

impl RendererFactory for HttpRendererFactory {
    type Renderer = HttpRenderer;

    async fn launch(&self) -> Result<HttpRenderer, AppError> {
        Ok(HttpRenderer {
            client: self.client.clone(),
            timeout_secs: self.timeout_secs,
            ssrf_protection: self.ssrf_protection,
            reader: ReaderView::new(),
            loaded: None,
        })
    }
}

struct LoadedPage {
    html: String,
    simplify: bool,
}

/// Plain HTTP rendering session.
///
/// Returns the HTML as served, without running scripts. Pages that need
/// JavaScript should go through the `browser` feature's renderer instead.
pub struct HttpRenderer {
    client: Client,
    timeout_secs: u64,
    ssrf_protection: bool,
    reader: ReaderView,
    loaded: Option<LoadedPage>,
}

impl Renderer for HttpRenderer {
    async fn navigate(&mut self, url: &str, simplify: bool) -> Result<(), AppError> {
        self.loaded = None;

        if self.ssrf_protection {
            validate_url(url).await?;
        }

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                AppError::Timeout(self.timeout_secs)
            } else if e.is_connect() {
                AppError::NetworkError(format!("Connection failed: {e}"))
            } else {
                AppError::HttpError(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::HttpError(format!(
                "HTTP {} for {}",
                status.as_u16(),
                url
            )));
        }

        let html = response
            .text()
            .await
            .map_err(|e| AppError::HttpError(format!("Failed to read response body: {e}")))?;

        tracing::debug!(%url, bytes = html.len(), simplify, "Page loaded");
        self.loaded = Some(LoadedPage { html, simplify });
        Ok(())
    }

    async fn capture(&mut self) -> Result<String, AppError> {
        let page = self
            .loaded
            .as_ref()
            .ok_or_else(|| AppError::RenderError("No page loaded".into()))?;

        Ok(if page.simplify {
            self.reader.simplify(&page.html)
        } else {
            page.html.clone()
        })
    }
}

// ---------------------------------------------------------------------------
// SSRF protection
// ---------------------------------------------------------------------------

/// Refuse URLs that point at private or reserved addresses.
///
/// IP literals are checked directly; hostnames are resolved and every
/// resolved address must be public.
async fn validate_url(url: &str) -> Result<(), AppError> {
    let parsed = Url::parse(url).map_err(|e| AppError::HttpError(format!("Invalid URL: {e}")))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(AppError::HttpError(format!(
                "URL scheme '{scheme}' is not allowed (only http/https)"
            )));
        }
    }

    let host = parsed
        .host_str()
        .ok_or_else(|| AppError::HttpError("URL has no host".to_string()))?;

    // IPv6 literals keep their brackets in host_str().
    let literal = host.trim_start_matches('[').trim_end_matches(']');
    if let Ok(ip) = literal.parse::<IpAddr>() {
        if is_private_ip(ip) {
            return Err(AppError::HttpError(format!(
                "SSRF blocked: {host} is a private/reserved IP"
            )));
        }
        return Ok(());
    }

    let port = parsed.port_or_known_default().unwrap_or(80);
    let addrs: Vec<_> = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| AppError::NetworkError(format!("DNS resolution failed for {host}: {e}")))?
        .collect();

    if addrs.is_empty() {
        return Err(AppError::NetworkError(format!(
            "DNS resolution returned no addresses for {host}"
        )));
    }

    if let Some(blocked) = addrs.iter().find(|a| is_private_ip(a.ip())) {
        return Err(AppError::HttpError(format!(
            "SSRF blocked: {host} resolves to private/reserved IP {}",
            blocked.ip()
        )));
    }

    Ok(())
}

fn is_private_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let [a, b, ..] = v4.octets();
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local() // includes cloud metadata 169.254.169.254
                || v4.is_unspecified()
                || v4.is_broadcast()
                || v4.is_documentation()
                || (a == 100 && (b & 0xC0) == 64) // 100.64.0.0/10
        }
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            v6.is_loopback()
                || v6.is_unspecified()
                || (first & 0xFFC0) == 0xFE80 // link-local
                || (first & 0xFE00) == 0xFC00 // unique local
                || v6
                    .to_ipv4_mapped()
                    .is_some_and(|v4| is_private_ip(IpAddr::V4(v4)))
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::Router;
    use axum::http::StatusCode;
    use axum::response::Html;
    use axum::routing::get;

    use super::*;

    const ARTICLE: &str = "<html><head><title>Served</title><script>track()</script></head>\
        <body><nav>menu</nav><article><p>Body text</p></article></body></html>";

    async fn serve() -> String {
        let app = Router::new()
            .route("/page", get(|| async { Html(ARTICLE) }))
            .route("/missing", get(|| async { StatusCode::NOT_FOUND }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{addr}")
    }

    async fn local_session() -> HttpRenderer {
        HttpRendererFactory::new()
            .unwrap()
            .allow_private_urls()
            .launch()
            .await
            .unwrap()
    }

    #[test]
    fn test_private_ipv4() {
        for ip in ["127.0.0.1", "10.0.0.1", "172.16.0.1", "192.168.1.1", "169.254.169.254", "0.0.0.0", "100.64.0.1"] {
            assert!(is_private_ip(ip.parse().unwrap()), "{ip}");
        }
    }

    #[test]
    fn test_public_addresses() {
        for ip in ["8.8.8.8", "1.1.1.1", "93.184.216.34", "2001:4860:4860::8888"] {
            assert!(!is_private_ip(ip.parse().unwrap()), "{ip}");
        }
    }

    #[test]
    fn test_private_ipv6() {
        for ip in ["::1", "::", "fe80::1", "fc00::1", "::ffff:127.0.0.1", "::ffff:169.254.169.254"] {
            assert!(is_private_ip(ip.parse().unwrap()), "{ip}");
        }
    }

    #[tokio::test]
    async fn test_validate_url_rejects_private_literals() {
        for url in ["http://127.0.0.1/admin", "http://169.254.169.254/latest/meta-data/", "http://[::1]:8080/"] {
            let err = validate_url(url).await.unwrap_err();
            assert!(err.to_string().contains("SSRF blocked"), "{url}");
        }
    }

    #[tokio::test]
    async fn test_validate_url_rejects_bad_scheme() {
        let err = validate_url("file:///etc/passwd").await.unwrap_err();
        assert!(err.to_string().contains("not allowed"));
    }

    #[tokio::test]
    async fn test_protected_session_refuses_loopback() {
        let base = serve().await;
        let mut session = HttpRendererFactory::new().unwrap().launch().await.unwrap();
        let err = session.navigate(&format!("{base}/page"), false).await.unwrap_err();
        assert!(err.to_string().contains("SSRF blocked"));
    }

    #[tokio::test]
    async fn test_full_page_capture() {
        let base = serve().await;
        let mut session = local_session().await;

        let html = session.render(&format!("{base}/page"), false).await.unwrap();
        assert_eq!(html, ARTICLE);
    }

    #[tokio::test]
    async fn test_simplified_capture() {
        let base = serve().await;
        let mut session = local_session().await;

        let html = session.render(&format!("{base}/page"), true).await.unwrap();
        assert!(html.contains("<title>Served</title>"));
        assert!(html.contains("<p>Body text</p>"));
        assert!(!html.contains("menu"));
        assert!(!html.contains("track()"));
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let base = serve().await;
        let mut session = local_session().await;

        let err = session.navigate(&format!("{base}/missing"), false).await.unwrap_err();
        assert!(err.to_string().contains("HTTP 404"));
        let err = session.capture().await.unwrap_err();
        assert!(matches!(err, AppError::RenderError(_)));
    }
}
