//! A scripted in-memory driver. Navigation outcomes and page contents are
//! declared up front; the scan logic runs against them with no browser.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::config;
use crate::error::SyncError;
use crate::locator::Locator;

use super::{Navigation, PageDriver, WaitUntil};

/// Scripted outcome for navigating to one URL.
#[derive(Debug, Clone, Copy)]
enum NavScript {
    Status(u16),
    TimedOut,
}

pub(crate) struct ScriptedDriver {
    nav: HashMap<String, NavScript>,
    /// url → locator values visible once that page is open.
    pages: HashMap<String, Vec<&'static str>>,
    /// locator value → text the field reads back.
    values: HashMap<&'static str, String>,
    /// locator values whose read errors out.
    broken: Vec<&'static str>,
    /// locator values that become visible after the search button is clicked.
    search_results: Option<Vec<&'static str>>,
    settled: bool,
    visible: Mutex<Vec<&'static str>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl ScriptedDriver {
    pub(crate) fn new() -> Self {
        Self {
            nav: HashMap::new(),
            pages: HashMap::new(),
            values: HashMap::new(),
            broken: Vec::new(),
            search_results: None,
            settled: true,
            visible: Mutex::new(Vec::new()),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub(crate) fn nav_status(mut self, url: &str, status: u16) -> Self {
        self.nav.insert(url.to_string(), NavScript::Status(status));
        self
    }

    pub(crate) fn nav_timeout(mut self, url: &str) -> Self {
        self.nav.insert(url.to_string(), NavScript::TimedOut);
        self
    }

    /// Declare what becomes visible after navigating to `url`.
    pub(crate) fn page(mut self, url: &str, elements: &[&'static str]) -> Self {
        self.pages.insert(url.to_string(), elements.to_vec());
        self
    }

    pub(crate) fn value(mut self, locator_value: &'static str, text: &str) -> Self {
        self.values.insert(locator_value, text.to_string());
        self
    }

    pub(crate) fn broken_field(mut self, locator_value: &'static str) -> Self {
        self.broken.push(locator_value);
        self
    }

    pub(crate) fn search_reveals(mut self, elements: &[&'static str]) -> Self {
        self.search_results = Some(elements.to_vec());
        self
    }

    pub(crate) fn never_settles(mut self) -> Self {
        self.settled = false;
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Handle onto the call log that survives the driver being consumed.
    pub(crate) fn call_log(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.calls)
    }

    pub(crate) fn navigation_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.starts_with("goto "))
            .count()
    }
}

#[async_trait]
impl PageDriver for ScriptedDriver {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn navigate(
        &self,
        url: &str,
        _wait: WaitUntil,
        _timeout: Duration,
    ) -> Result<Navigation, SyncError> {
        self.calls.lock().unwrap().push(format!("goto {url}"));
        match self.nav.get(url) {
            Some(NavScript::TimedOut) => {
                self.visible.lock().unwrap().clear();
                Ok(Navigation {
                    status: None,
                    committed: false,
                })
            }
            Some(NavScript::Status(code)) => {
                *self.visible.lock().unwrap() =
                    self.pages.get(url).cloned().unwrap_or_default();
                Ok(Navigation {
                    status: Some(*code),
                    committed: true,
                })
            }
            None => {
                *self.visible.lock().unwrap() =
                    self.pages.get(url).cloned().unwrap_or_default();
                Ok(Navigation {
                    status: None,
                    committed: true,
                })
            }
        }
    }

    async fn fill(&self, locator: &Locator, text: &str) -> Result<(), SyncError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("fill {} = {text}", locator.value));
        Ok(())
    }

    async fn click(&self, locator: &Locator) -> Result<(), SyncError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("click {}", locator.value));
        if locator.value == config::ORDER_SEARCH_GO.value {
            if let Some(results) = &self.search_results {
                *self.visible.lock().unwrap() = results.clone();
            }
        }
        Ok(())
    }

    async fn is_visible(&self, locator: &Locator) -> bool {
        self.visible.lock().unwrap().contains(&locator.value)
    }

    async fn read_value(&self, locator: &Locator) -> Result<String, SyncError> {
        if self.broken.contains(&locator.value) {
            return Err(SyncError::Io(std::io::Error::other(
                "scripted read failure",
            )));
        }
        Ok(self
            .values
            .get(locator.value)
            .cloned()
            .unwrap_or_default())
    }

    async fn wait_until_settled(&self, _timeout: Duration) -> bool {
        self.settled
    }

    async fn shutdown(&mut self) {
        self.calls.lock().unwrap().push("shutdown".to_string());
    }
}
