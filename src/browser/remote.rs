//! Remote backend: a hosted browser reached over plain WebDriver through
//! fantoccini. Used when `REMOTE_WEBDRIVER_URL` points at a grid or a
//! container that owns the browser lifecycle.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use fantoccini::elements::Element;
use fantoccini::{Client, ClientBuilder, Locator as WireLocator};
use serde_json::json;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::SyncError;
use crate::locator::{Locator, LocatorKind};

use super::{
    commit_signal, settle_signal, Navigation, PageDriver, WaitUntil, COMMIT_POLL,
    NAVIGATION_STATUS_SCRIPT, NAV_MARKER_GONE_SCRIPT, NAV_MARKER_SCRIPT, PARSE_BEAT,
    READY_STATE_SCRIPT, SETTLE_POLL,
};

pub struct RemoteDriver {
    client: Client,
}

/// This protocol only takes css, xpath and link-text selection, so the
/// richer locator kinds collapse into those.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Selector {
    Css(String),
    XPath(String),
    LinkText(String),
}

pub(crate) fn to_selector(locator: &Locator) -> Selector {
    match locator.kind {
        LocatorKind::Id => Selector::Css(format!("#{}", locator.value)),
        LocatorKind::Name => Selector::Css(format!("[name=\"{}\"]", locator.value)),
        LocatorKind::ClassName => Selector::Css(format!(".{}", locator.value)),
        LocatorKind::Css | LocatorKind::TagName => Selector::Css(locator.value.to_string()),
        LocatorKind::XPath => Selector::XPath(locator.value.to_string()),
        LocatorKind::LinkText => Selector::LinkText(locator.value.to_string()),
        LocatorKind::PartialLinkText => {
            Selector::XPath(format!("//a[contains(., \"{}\")]", locator.value))
        }
    }
}

impl RemoteDriver {
    pub async fn connect(endpoint: &str, config: &Config) -> Result<Self, SyncError> {
        let mut args = vec![
            "--no-sandbox".to_string(),
            "--disable-dev-shm-usage".to_string(),
            "--disable-gpu".to_string(),
            "--window-size=1920,1080".to_string(),
        ];
        if config.headless {
            args.push("--headless=new".to_string());
        }

        let mut caps = serde_json::map::Map::new();
        caps.insert("goog:chromeOptions".to_string(), json!({ "args": args }));
        // Same commit-level navigation contract as the local backend.
        caps.insert("pageLoadStrategy".to_string(), json!("none"));

        info!(%endpoint, "connecting to remote webdriver");
        let client = ClientBuilder::native()
            .capabilities(caps)
            .connect(endpoint)
            .await?;
        info!("remote session established");
        Ok(Self { client })
    }

    async fn find(&self, locator: &Locator) -> Result<Element, SyncError> {
        let selector = to_selector(locator);
        let wire = match &selector {
            Selector::Css(s) => WireLocator::Css(s),
            Selector::XPath(s) => WireLocator::XPath(s),
            Selector::LinkText(s) => WireLocator::LinkText(s),
        };
        Ok(self.client.find(wire).await?)
    }

    async fn current_url_string(&self) -> Option<String> {
        self.client.current_url().await.ok().map(|u| u.to_string())
    }

    async fn ready_state(&self) -> Option<String> {
        let value = self
            .client
            .execute(READY_STATE_SCRIPT, Vec::new())
            .await
            .ok()?;
        value.as_str().map(str::to_owned)
    }

    async fn navigation_status(&self) -> Option<u16> {
        let value = self
            .client
            .execute(NAVIGATION_STATUS_SCRIPT, Vec::new())
            .await
            .ok()?;
        value.as_u64().and_then(|s| u16::try_from(s).ok())
    }

    async fn arm_nav_marker(&self) -> bool {
        self.client
            .execute(NAV_MARKER_SCRIPT, Vec::new())
            .await
            .is_ok()
    }

    async fn nav_marker_gone(&self) -> bool {
        match self.client.execute(NAV_MARKER_GONE_SCRIPT, Vec::new()).await {
            Ok(value) => value.as_bool().unwrap_or(false),
            Err(_) => false,
        }
    }
}

#[async_trait]
impl PageDriver for RemoteDriver {
    fn name(&self) -> &'static str {
        "remote webdriver"
    }

    async fn navigate(
        &self,
        url: &str,
        wait: WaitUntil,
        timeout: Duration,
    ) -> Result<Navigation, SyncError> {
        let deadline = Instant::now() + timeout;
        let marker_armed = self.arm_nav_marker().await;
        let before = self.current_url_string().await;

        match tokio::time::timeout(timeout, self.client.goto(url)).await {
            Ok(result) => result?,
            Err(_) => return Ok(Navigation::default()),
        }

        // Committed once the marked document is gone. The URL check alone
        // would miss a redirect landing back on the address already shown.
        let mut committed = false;
        loop {
            let marker_gone = marker_armed && self.nav_marker_gone().await;
            let now = self.current_url_string().await;
            let url_moved = now.is_some() && now != before;
            if commit_signal(marker_armed, marker_gone, url_moved) {
                committed = true;
                break;
            }
            if Instant::now() >= deadline {
                break;
            }
            sleep(COMMIT_POLL).await;
        }
        if !committed {
            return Ok(Navigation::default());
        }

        match wait {
            WaitUntil::Commit => {
                let beat = (Instant::now() + PARSE_BEAT).min(deadline);
                while Instant::now() < beat {
                    if !matches!(self.ready_state().await.as_deref(), Some("loading")) {
                        break;
                    }
                    sleep(COMMIT_POLL).await;
                }
            }
            WaitUntil::Settled => {
                let mut settled = false;
                while Instant::now() < deadline {
                    if matches!(self.ready_state().await.as_deref(), Some("complete")) {
                        settled = true;
                        break;
                    }
                    sleep(SETTLE_POLL).await;
                }
                if !settled {
                    return Ok(Navigation::default());
                }
            }
        }

        Ok(Navigation {
            status: self.navigation_status().await,
            committed: true,
        })
    }

    async fn fill(&self, locator: &Locator, text: &str) -> Result<(), SyncError> {
        let element = self.find(locator).await?;
        element.clear().await?;
        element.send_keys(text).await?;
        Ok(())
    }

    async fn click(&self, locator: &Locator) -> Result<(), SyncError> {
        let element = self.find(locator).await?;
        // Mark the document first: if the click navigates, settle waits can
        // tell the next document from this one.
        let _ = self.arm_nav_marker().await;
        element.click().await?;
        Ok(())
    }

    async fn is_visible(&self, locator: &Locator) -> bool {
        match self.find(locator).await {
            Ok(element) => element.is_displayed().await.unwrap_or(false),
            Err(_) => false,
        }
    }

    async fn read_value(&self, locator: &Locator) -> Result<String, SyncError> {
        let element = self.find(locator).await?;
        // No tag-name call on this protocol; the element property carries it.
        let tag = element
            .prop("tagName")
            .await?
            .unwrap_or_default()
            .to_lowercase();
        let raw = if matches!(tag.as_str(), "input" | "textarea" | "select") {
            match element.prop("value").await? {
                Some(value) if !value.trim().is_empty() => value,
                _ => element.text().await?,
            }
        } else {
            element.text().await?
        };
        Ok(raw.trim().to_string())
    }

    async fn wait_until_settled(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let marker_gone = self.nav_marker_gone().await;
            let complete = matches!(self.ready_state().await.as_deref(), Some("complete"));
            if settle_signal(marker_gone, complete) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            sleep(SETTLE_POLL).await;
        }
    }

    async fn shutdown(&mut self) {
        // close() consumes its handle; the clone shares the same session.
        if let Err(e) = self.client.clone().close().await {
            warn!("remote session did not close cleanly: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator::Locator;

    #[test]
    fn id_becomes_a_css_hash() {
        let selector = to_selector(&Locator::id("searchButton"));
        assert_eq!(selector, Selector::Css("#searchButton".to_string()));
    }

    #[test]
    fn name_becomes_an_attribute_selector_even_with_brackets() {
        let selector = to_selector(&Locator::name("serial[]"));
        assert_eq!(selector, Selector::Css("[name=\"serial[]\"]".to_string()));
    }

    #[test]
    fn class_becomes_a_css_class() {
        let selector = to_selector(&Locator::new(LocatorKind::ClassName, "order-row"));
        assert_eq!(selector, Selector::Css(".order-row".to_string()));
    }

    #[test]
    fn css_and_tag_pass_through() {
        let css = to_selector(&Locator::new(LocatorKind::Css, "div.order > a"));
        assert_eq!(css, Selector::Css("div.order > a".to_string()));
        let tag = to_selector(&Locator::new(LocatorKind::TagName, "h4"));
        assert_eq!(tag, Selector::Css("h4".to_string()));
    }

    #[test]
    fn xpath_passes_through() {
        let selector = to_selector(&Locator::xpath("//button[@type='submit']"));
        assert_eq!(
            selector,
            Selector::XPath("//button[@type='submit']".to_string())
        );
    }

    #[test]
    fn link_text_stays_native_and_partial_falls_back_to_xpath() {
        let link = to_selector(&Locator::new(LocatorKind::LinkText, "Orders"));
        assert_eq!(link, Selector::LinkText("Orders".to_string()));
        let partial = to_selector(&Locator::new(LocatorKind::PartialLinkText, "Ord"));
        assert_eq!(
            partial,
            Selector::XPath("//a[contains(., \"Ord\")]".to_string())
        );
    }
}
