pub mod http_renderer;
pub mod simplify;
pub mod xpath;

#[cfg(feature = "browser")]
pub mod browser_renderer;

pub use http_renderer::{HttpRenderer, HttpRendererFactory};
pub use simplify::ReaderView;
pub use xpath::XPathExtractor;

#[cfg(feature = "browser")]
pub use browser_renderer::{BrowserLauncher, BrowserRenderer};

/// User agent sent by every renderer session.
pub const DESKTOP_USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:72.0) Gecko/20100101 Firefox/72.0";
