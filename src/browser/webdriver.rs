//! Local backend: a chromedriver process we spawn ourselves, driven through
//! thirtyfour.

use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thirtyfour::prelude::*;
use thirtyfour::{CapabilitiesHelper, ChromiumLikeCapabilities, PageLoadStrategy};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::SyncError;
use crate::locator::{Locator, LocatorKind};

use super::{
    commit_signal, settle_signal, Navigation, PageDriver, WaitUntil, COMMIT_POLL,
    NAVIGATION_STATUS_SCRIPT, NAV_MARKER_GONE_SCRIPT, NAV_MARKER_SCRIPT, PARSE_BEAT,
    READY_STATE_SCRIPT, SETTLE_POLL,
};

const CONNECT_ATTEMPTS: u32 = 10;
const CONNECT_RETRY: Duration = Duration::from_millis(500);

pub struct LocalDriver {
    driver: WebDriver,
    chromedriver: Option<Child>,
}

impl LocalDriver {
    /// Spawn chromedriver on the configured port and open a session against
    /// it. The process is ours to reap: `shutdown` kills it, and `Drop`
    /// backstops paths that never get there.
    pub async fn launch(config: &Config) -> Result<Self, SyncError> {
        let port = config.chromedriver_port;
        info!(bin = %config.chromedriver_bin, port, "starting chromedriver");
        let mut child = Command::new(&config.chromedriver_bin)
            .arg(format!("--port={port}"))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        let mut caps = DesiredCapabilities::chrome();
        if config.headless {
            caps.add_arg("--headless=new")?;
        }
        caps.add_arg("--no-sandbox")?;
        caps.add_arg("--disable-dev-shm-usage")?;
        caps.add_arg("--disable-gpu")?;
        caps.add_arg("--window-size=1920,1080")?;
        if let Some(binary) = &config.chrome_binary {
            caps.set_binary(binary)?;
        }
        // Navigations return at commit; the scan decides how long to wait.
        caps.set_page_load_strategy(PageLoadStrategy::None)?;

        let endpoint = format!("http://127.0.0.1:{port}");
        let mut attempt = 0;
        let driver = loop {
            match WebDriver::new(&endpoint, caps.clone()).await {
                Ok(driver) => break driver,
                Err(e) if attempt + 1 < CONNECT_ATTEMPTS => {
                    attempt += 1;
                    debug!(attempt, "chromedriver not accepting sessions yet: {e}");
                    sleep(CONNECT_RETRY).await;
                }
                Err(e) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(e.into());
                }
            }
        };
        info!("chrome session established");
        Ok(Self {
            driver,
            chromedriver: Some(child),
        })
    }

    async fn current_url_string(&self) -> Option<String> {
        self.driver.current_url().await.ok().map(|u| u.to_string())
    }

    async fn ready_state(&self) -> Option<String> {
        let ret = self
            .driver
            .execute(READY_STATE_SCRIPT, Vec::new())
            .await
            .ok()?;
        ret.json().as_str().map(str::to_owned)
    }

    async fn navigation_status(&self) -> Option<u16> {
        let ret = self
            .driver
            .execute(NAVIGATION_STATUS_SCRIPT, Vec::new())
            .await
            .ok()?;
        ret.json().as_u64().and_then(|s| u16::try_from(s).ok())
    }

    async fn arm_nav_marker(&self) -> bool {
        self.driver
            .execute(NAV_MARKER_SCRIPT, Vec::new())
            .await
            .is_ok()
    }

    async fn nav_marker_gone(&self) -> bool {
        match self.driver.execute(NAV_MARKER_GONE_SCRIPT, Vec::new()).await {
            Ok(ret) => ret.json().as_bool().unwrap_or(false),
            Err(_) => false,
        }
    }

    async fn find(&self, locator: &Locator) -> Result<WebElement, SyncError> {
        Ok(self.driver.find(to_by(locator)).await?)
    }
}

fn to_by(locator: &Locator) -> By {
    match locator.kind {
        LocatorKind::Id => By::Id(locator.value),
        LocatorKind::Name => By::Name(locator.value),
        LocatorKind::ClassName => By::ClassName(locator.value),
        LocatorKind::XPath => By::XPath(locator.value),
        LocatorKind::Css => By::Css(locator.value),
        LocatorKind::LinkText => By::LinkText(locator.value),
        LocatorKind::PartialLinkText => By::PartialLinkText(locator.value),
        LocatorKind::TagName => By::Tag(locator.value),
    }
}

#[async_trait]
impl PageDriver for LocalDriver {
    fn name(&self) -> &'static str {
        "local chrome"
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

        // Under page-load strategy "none" the goto itself returns fast; the
        // outer timeout guards the webdriver round trip, not the page.
        match tokio::time::timeout(timeout, self.driver.goto(url)).await {
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
                // Short grace so the fresh page has a DOM worth inspecting.
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
        match self.driver.find(to_by(locator)).await {
            Ok(element) => element.is_displayed().await.unwrap_or(false),
            Err(_) => false,
        }
    }

    async fn read_value(&self, locator: &Locator) -> Result<String, SyncError> {
        let element = self.find(locator).await?;
        let tag = element.tag_name().await?.to_lowercase();
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
        if let Err(e) = self.driver.clone().quit().await {
            warn!("browser session did not close cleanly: {e}");
        }
        if let Some(mut child) = self.chromedriver.take() {
            if let Err(e) = child.kill() {
                warn!("could not stop chromedriver: {e}");
            }
            let _ = child.wait();
        }
    }
}

impl Drop for LocalDriver {
    fn drop(&mut self) {
        // Backstop for paths that never reached shutdown().
        if let Some(mut child) = self.chromedriver.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}
