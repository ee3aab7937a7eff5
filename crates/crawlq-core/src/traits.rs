use std::future::Future;

use crate::error::AppError;

/// A page-rendering session (one browser tab, one HTTP client, ...).
///
/// A worker owns exactly one renderer for its whole lifetime, so
/// implementations need not be `Clone` or safe to share across jobs.
pub trait Renderer: Send {
    /// Load `url`. With `simplify` set, the following [`capture`](Self::capture)
    /// goes through the reader-mode rendering path instead of returning the raw page.
    fn navigate(
        &mut self,
        url: &str,
        simplify: bool,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Return the currently loaded page as HTML.
    fn capture(&mut self) -> impl Future<Output = Result<String, AppError>> + Send;

    /// Navigate and capture in one go.
    fn render(
        &mut self,
        url: &str,
        simplify: bool,
    ) -> impl Future<Output = Result<String, AppError>> + Send
    where
        Self: Sized,
    {
        async move {
            self.navigate(url, simplify).await?;
            self.capture().await
        }
    }

    /// Release the session. Called once when the owning worker stops.
    fn close(self) -> impl Future<Output = ()> + Send
    where
        Self: Sized,
    {
        async {}
    }
}

/// Creates one [`Renderer`] session per worker at worker startup.
pub trait RendererFactory: Send + Sync + Clone + 'static {
    type Renderer: Renderer + 'static;

    fn launch(&self) -> impl Future<Output = Result<Self::Renderer, AppError>> + Send;
}

/// Evaluates an extraction expression against a captured page.
pub trait Extractor: Send + Sync + Clone + 'static {
    /// Returns every match of `expression` in `page`, in document order.
    fn extract(&self, page: &str, expression: &str) -> Result<Vec<String>, AppError>;
}
