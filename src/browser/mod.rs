//! Browser session handling behind one narrow capability trait, with two
//! interchangeable backends: a locally launched Chrome and a hosted browser
//! reached over WebDriver.

pub mod remote;
pub mod webdriver;

#[cfg(test)]
pub(crate) mod testing;

use std::time::Duration;

use async_trait::async_trait;

use crate::config::Config;
use crate::error::SyncError;
use crate::locator::Locator;

/// How far a navigation has to get before it counts as done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitUntil {
    /// A new document committed; loading may still be in flight. This is what
    /// lets the scan judge a page by its early DOM instead of waiting out
    /// every slow asset.
    Commit,
    /// The document reported itself fully loaded.
    Settled,
}

/// What one navigation attempt produced.
#[derive(Debug, Clone, Copy, Default)]
pub struct Navigation {
    /// HTTP status of the document response, when the browser exposes one.
    /// WebDriver has no status channel of its own, so this comes off the
    /// page's performance timeline and is absent on browsers that hide it.
    pub status: Option<u16>,
    /// Whether the target got as far as `wait` asked for before the deadline.
    pub committed: bool,
}

/// The slice of browser behavior the scan needs. Everything above this trait
/// is backend-agnostic; everything below it talks a concrete protocol.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Backend label for logs.
    fn name(&self) -> &'static str;

    /// Drive the page to `url`. A missed deadline is an answer, not an
    /// error: it comes back as `committed: false`.
    async fn navigate(
        &self,
        url: &str,
        wait: WaitUntil,
        timeout: Duration,
    ) -> Result<Navigation, SyncError>;

    /// Clear the element and type `text` into it.
    async fn fill(&self, locator: &Locator, text: &str) -> Result<(), SyncError>;

    async fn click(&self, locator: &Locator) -> Result<(), SyncError>;

    /// Whether the first match for `locator` is currently displayed. Absent
    /// elements and read errors both count as not visible.
    async fn is_visible(&self, locator: &Locator) -> bool;

    /// Current value of an editable control, falling back to rendered text
    /// for anything else (or when the value is blank).
    async fn read_value(&self, locator: &Locator) -> Result<String, SyncError>;

    /// Wait until the document reports itself fully loaded, up to `timeout`.
    /// Returns whether it settled in time.
    async fn wait_until_settled(&self, timeout: Duration) -> bool;

    /// Release the session and any owned browser process. Failures are
    /// logged, not returned: teardown also runs on paths that already carry
    /// an error.
    async fn shutdown(&mut self);
}

/// Open a session on whichever backend the configuration selects: the remote
/// endpoint when one is set, a locally spawned chromedriver otherwise.
pub async fn connect(config: &Config) -> Result<Box<dyn PageDriver>, SyncError> {
    let driver: Box<dyn PageDriver> = match &config.remote_webdriver {
        Some(endpoint) => Box::new(remote::RemoteDriver::connect(endpoint, config).await?),
        None => Box::new(webdriver::LocalDriver::launch(config).await?),
    };
    Ok(driver)
}

/// Poll cadence while waiting for a navigation to commit.
pub(crate) const COMMIT_POLL: Duration = Duration::from_millis(100);

/// Poll cadence while waiting for a document to finish loading.
pub(crate) const SETTLE_POLL: Duration = Duration::from_millis(250);

/// After a commit, give the parser this long to put up a DOM before
/// visibility checks run against the fresh page.
pub(crate) const PARSE_BEAT: Duration = Duration::from_secs(1);

/// Pulls the HTTP status of the last document load out of the performance
/// timeline. Chromium fills `responseStatus`; browsers that don't leave it
/// at zero, which maps to "unknown".
pub(crate) const NAVIGATION_STATUS_SCRIPT: &str = r"
    const entries = performance.getEntriesByType('navigation');
    if (!entries.length) return null;
    const status = entries[entries.length - 1].responseStatus;
    return (typeof status === 'number' && status > 0) ? status : null;
";

pub(crate) const READY_STATE_SCRIPT: &str = "return document.readyState;";

/// Marker planted on the current document right before an action that is
/// expected to navigate. A fresh document never carries it, so its
/// disappearance is the document-swap signal; the reported URL alone cannot
/// tell a redirect back to the same address from no navigation at all.
pub(crate) const NAV_MARKER_SCRIPT: &str = "window.__rmaNavPending = true;";

/// True once the marked document is gone (or none was ever marked).
pub(crate) const NAV_MARKER_GONE_SCRIPT: &str = "return window.__rmaNavPending !== true;";

/// Commit decision for one poll round. URL movement still counts on its own
/// for pages where the marker could not be planted.
pub(crate) fn commit_signal(marker_armed: bool, marker_gone: bool, url_moved: bool) -> bool {
    (marker_armed && marker_gone) || url_moved
}

/// Settle decision for one poll round: a marker still present means the
/// document reporting `complete` is the old one, not the page being waited
/// for.
pub(crate) fn settle_signal(marker_gone: bool, ready_complete: bool) -> bool {
    marker_gone && ready_complete
}
