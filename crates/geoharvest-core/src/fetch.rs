use std::time::{Duration, Instant};

use async_trait::async_trait;
use chromiumoxide::error::CdpError;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use thiserror::Error;
use tracing::debug;

/// CSS selector that marks the page as rendered far enough to harvest.
const RENDER_MARKER: &str = "table";
const MARKER_POLL: Duration = Duration::from_millis(250);

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to launch headless browser: {message}")]
    Launch { message: String },

    #[error("navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("no table element appeared on {url} within {waited_secs}s")]
    MarkerTimeout { url: String, waited_secs: u64 },

    #[error("failed to capture rendered content of {url}: {message}")]
    Render { url: String, message: String },
}

/// Boundary to the rendered-page source. The pipeline only ever sees the
/// final HTML string; how it was produced is this trait's business.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str, render_timeout: Duration) -> Result<String, FetchError>;
}

/// Fetches pages through a short-lived headless Chrome instance, one launch
/// per fetch so a wedged browser cannot poison later cycles.
pub struct BrowserFetcher {
    settle_delay: Duration,
}

impl BrowserFetcher {
    pub fn new(settle_delay: Duration) -> Self {
        Self { settle_delay }
    }

    fn browser_config(&self) -> Result<BrowserConfig, FetchError> {
        BrowserConfig::builder()
            .no_sandbox()
            .window_size(1920, 1080)
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--lang=en-US")
            .build()
            .map_err(|message| FetchError::Launch { message })
    }

    async fn render(
        &self,
        browser: &Browser,
        url: &str,
        render_timeout: Duration,
    ) -> Result<String, FetchError> {
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|err| navigation_error(url, err))?;

        let navigation = async {
            page.goto(url).await?;
            page.wait_for_navigation().await?;
            Ok::<(), CdpError>(())
        };
        match tokio::time::timeout(render_timeout, navigation).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => return Err(navigation_error(url, err)),
            Err(_) => {
                return Err(FetchError::Navigation {
                    url: url.to_string(),
                    message: format!("no response within {}s", render_timeout.as_secs()),
                })
            }
        }

        wait_for_marker(&page, url, render_timeout).await?;

        // Scripts may still be filling the table right after it appears.
        tokio::time::sleep(self.settle_delay).await;

        page.content().await.map_err(|err| FetchError::Render {
            url: url.to_string(),
            message: err.to_string(),
        })
    }
}

#[async_trait]
impl PageFetcher for BrowserFetcher {
    async fn fetch(&self, url: &str, render_timeout: Duration) -> Result<String, FetchError> {
        let config = self.browser_config()?;
        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|err| FetchError::Launch {
                message: err.to_string(),
            })?;

        let cdp_loop = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let outcome = self.render(&browser, url, render_timeout).await;

        match browser.close().await {
            Ok(_) => {
                if let Err(err) = browser.wait().await {
                    debug!("browser did not exit cleanly: {err}");
                }
            }
            // A dead CDP channel means the polite shutdown never reached
            // Chrome; kill the process instead of waiting on it forever.
            Err(err) => {
                debug!("browser close failed, killing the process: {err}");
                if let Some(Err(err)) = browser.kill().await {
                    debug!("browser kill failed: {err}");
                }
            }
        }
        let _ = cdp_loop.await;

        outcome
    }
}

async fn wait_for_marker(page: &Page, url: &str, render_timeout: Duration) -> Result<(), FetchError> {
    let deadline = Instant::now() + render_timeout;
    loop {
        if page.find_element(RENDER_MARKER).await.is_ok() {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(FetchError::MarkerTimeout {
                url: url.to_string(),
                waited_secs: render_timeout.as_secs(),
            });
        }
        tokio::time::sleep(MARKER_POLL).await;
    }
}

fn navigation_error(url: &str, err: CdpError) -> FetchError {
    FetchError::Navigation {
        url: url.to_string(),
        message: err.to_string(),
    }
}
