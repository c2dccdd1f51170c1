//! Order-page probing. Given an order id, decide whether the CRM has that
//! order, does not have it, or could not be asked, leaving the session on the
//! order page whenever the answer is "it exists".

use tracing::{debug, info};

use crate::browser::{PageDriver, WaitUntil};
use crate::config::{self, Config};
use crate::error::SyncError;

/// The three answers a probe can give. Backend breakage is the only thing
/// reported as an error; everything the CRM can say maps onto one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The order page is open and at least one schema field is visible.
    Found,
    /// The CRM says this order does not exist.
    NotFound,
    /// The page could not be brought up: a timed-out commit, a bounced
    /// session, or no recognizable signal anywhere.
    LoadFailed,
}

/// Detail-URL shapes, tried in order. The CRM has routed order pages
/// differently across versions; the first shape that resolves wins.
const URL_VARIANTS: &[&str] = &["", "view/", "edit/"];

pub async fn probe(
    driver: &dyn PageDriver,
    config: &Config,
    rma: u32,
) -> Result<ProbeOutcome, SyncError> {
    for variant in URL_VARIANTS {
        let url = format!("{}{variant}{rma}", config.order_base_url);
        debug!(%url, "probing");
        let nav = driver
            .navigate(&url, WaitUntil::Commit, config::COMMIT_TIMEOUT)
            .await?;

        // An authoritative 404 settles the question for every variant.
        if nav.status == Some(404) {
            return Ok(ProbeOutcome::NotFound);
        }
        // A commit that never happened points at the CRM or the network, not
        // at the URL shape, so trying more shapes would only stall the scan.
        if !nav.committed {
            return Ok(ProbeOutcome::LoadFailed);
        }
        // Bounced to the sign-in form: the session is gone.
        if driver.is_visible(&config::USERNAME_FIELD).await {
            return Ok(ProbeOutcome::LoadFailed);
        }
        if order_page_visible(driver).await {
            return Ok(ProbeOutcome::Found);
        }
        if driver.is_visible(&config::ORDER_NOT_FOUND).await {
            return Ok(ProbeOutcome::NotFound);
        }
        // No signal either way; try the next shape.
    }

    probe_via_search(driver, config, rma).await
}

/// Positive detection: the order page counts as open once any schema field is
/// visible, so one missing field never hides a whole order.
async fn order_page_visible(driver: &dyn PageDriver) -> bool {
    for field in config::FIELD_SCHEMA {
        if driver.is_visible(&field.locator).await {
            return true;
        }
    }
    false
}

/// Last resort when every URL shape stayed silent: run the id through the
/// CRM's own order search. Driver trouble in here is absorbed into
/// `LoadFailed`; the scan treats it like any other page that would not come
/// up.
async fn probe_via_search(
    driver: &dyn PageDriver,
    config: &Config,
    rma: u32,
) -> Result<ProbeOutcome, SyncError> {
    info!(rma, "url variants inconclusive, trying the order search");

    let _ = driver
        .navigate(
            &config.order_base_url,
            WaitUntil::Settled,
            config::SETTLE_TIMEOUT,
        )
        .await;

    if driver
        .fill(&config::ORDER_SEARCH_FIELD, &rma.to_string())
        .await
        .is_err()
    {
        return Ok(ProbeOutcome::LoadFailed);
    }
    if driver.click(&config::ORDER_SEARCH_GO).await.is_err() {
        return Ok(ProbeOutcome::LoadFailed);
    }
    driver.wait_until_settled(config::SETTLE_TIMEOUT).await;

    if order_page_visible(driver).await {
        return Ok(ProbeOutcome::Found);
    }
    if driver.is_visible(&config::ORDER_NOT_FOUND).await {
        return Ok(ProbeOutcome::NotFound);
    }
    Ok(ProbeOutcome::LoadFailed)
}
