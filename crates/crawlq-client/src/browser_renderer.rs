use std::path::PathBuf;

use chromiumoxide::cdp::browser_protocol::network::SetCacheDisabledParams;
use chromiumoxide::{Browser, BrowserConfig, Page};
use crawlq_core::error::AppError;
use crawlq_core::traits::{Renderer, RendererFactory};
use futures::StreamExt;
use tokio::task::JoinHandle;

use crate::DESKTOP_USER_AGENT;
use crate::simplify::ReaderView;

/// Starts one headless Chromium per worker.
///
/// Requires a Chromium / Chrome binary. `CHROME_BIN` overrides the lookup;
/// otherwise a few well-known install locations are tried before falling
/// back to `chromiumoxide`'s own search.
#[derive(Debug, Clone, Default)]
pub struct BrowserLauncher {
    executable: Option<PathBuf>,
}

impl BrowserLauncher {
    pub fn new() -> Self {
        Self {
            executable: find_chrome_binary(),
        }
    }

    pub fn with_executable(path: impl Into<PathBuf>) -> Self {
        Self {
            executable: Some(path.into()),
        }
    }
}

impl RendererFactory for BrowserLauncher {
    type Renderer = BrowserRenderer;

    async fn launch(&self) -> Result<BrowserRenderer, AppError> {
        let mut builder = BrowserConfig::builder().no_sandbox().disable_default_args();
        if let Some(bin) = &self.executable {
            tracing::info!("Using Chrome binary: {}", bin.display());
            builder = builder.chrome_executable(bin);
        }

        let config = builder
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--no-first-run")
            .arg("--disk-cache-size=0")
            .arg(format!("--user-agent={DESKTOP_USER_AGENT}"))
            .build()
            .map_err(|e| AppError::RenderError(format!("Browser config error: {e}")))?;

        let (browser, mut events) = Browser::launch(config)
            .await
            .map_err(|e| AppError::RenderError(format!("Failed to launch browser: {e}")))?;

        // The CDP connection only makes progress while its handler is polled.
        let handler = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if let Err(e) = event {
                    tracing::warn!(error = %e, "Browser CDP handler error");
                    break;
                }
            }
        });

        let page = match open_tab(&browser).await {
            Ok(page) => page,
            Err(e) => {
                handler.abort();
                return Err(e);
            }
        };

        Ok(BrowserRenderer {
            browser,
            page,
            handler,
            reader: ReaderView::new(),
            simplify: false,
        })
    }
}

async fn open_tab(browser: &Browser) -> Result<Page, AppError> {
    let page = browser
        .new_page("about:blank")
        .await
        .map_err(|e| AppError::RenderError(format!("Failed to open tab: {e}")))?;
    page.execute(SetCacheDisabledParams::new(true))
        .await
        .map_err(|e| AppError::RenderError(format!("Failed to disable cache: {e}")))?;
    Ok(page)
}

/// Headless-browser session: one Chromium process, one reused tab.
///
/// Scripts run before capture, so single-page apps and lazy-loaded content
/// are returned as the user would see them.
pub struct BrowserRenderer {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    reader: ReaderView,
    simplify: bool,
}

impl Renderer for BrowserRenderer {
    async fn navigate(&mut self, url: &str, simplify: bool) -> Result<(), AppError> {
        self.page
            .goto(url)
            .await
            .map_err(|e| AppError::RenderError(format!("Failed to navigate to {url}: {e}")))?;

        // <body> present is the minimal signal that the page rendered.
        self.page
            .find_element("body")
            .await
            .map_err(|e| AppError::RenderError(format!("Page did not render body: {e}")))?;

        self.simplify = simplify;
        Ok(())
    }

    async fn capture(&mut self) -> Result<String, AppError> {
        let html = self
            .page
            .content()
            .await
            .map_err(|e| AppError::RenderError(format!("Failed to read page content: {e}")))?;

        Ok(if self.simplify {
            self.reader.simplify(&html)
        } else {
            html
        })
    }

    async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            tracing::warn!(error = %e, "Failed to close browser");
        }
        let _ = self.browser.wait().await;
        self.handler.abort();
    }
}

fn find_chrome_binary() -> Option<PathBuf> {
    if let Ok(p) = std::env::var("CHROME_BIN") {
        let path = PathBuf::from(p);
        if path.exists() {
            return Some(path);
        }
    }

    [
        // Snap wrapper strips headless flags; use the real binary inside it.
        "/snap/chromium/current/usr/lib/chromium-browser/chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/google-chrome",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
    ]
    .iter()
    .map(PathBuf::from)
    .find(|p| p.exists())
}
