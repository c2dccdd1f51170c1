//! The scan itself: pick a starting id, open a browser session, then walk
//! ids upward through probe → extract → persist until the CRM runs out.

use colored::Colorize;
use tracing::{error, info, warn};

use crate::browser::{self, PageDriver};
use crate::config::{self, Config};
use crate::error::SyncError;
use crate::extract;
use crate::login;
use crate::notion::RecordStore;
use crate::probe::{self, ProbeOutcome};
use crate::report;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Walk ids upward until the CRM reports one missing.
    Full,
    /// Exactly one id, supplied by the operator.
    Single(u32),
}

/// Why a scan stopped where it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The next order id does not exist: the normal end of a scan.
    OrderMissing,
    /// A page would not come up. The scan cannot tell this apart from
    /// end-of-data, but the operator can, so it is reported separately.
    PageUnavailable,
    /// The run finished everything it was asked to do: single mode's one
    /// order, or a scan that reached the last representable id.
    Completed,
}

/// What one run did, for the closing summary.
#[derive(Debug)]
pub struct ScanReport {
    pub started_at: u32,
    pub stopped_at: u32,
    pub synced: u32,
    pub reason: StopReason,
}

/// Next id to probe: one past the store's cursor on a full scan, the
/// operator's pick in single mode.
fn starting_rma(last_known: Option<u32>, mode: Mode) -> u32 {
    match mode {
        Mode::Single(id) => id,
        Mode::Full => last_known.map_or(1, |last| last.saturating_add(1)),
    }
}

pub async fn run(
    config: &Config,
    store: &dyn RecordStore,
    mode: Mode,
) -> Result<ScanReport, SyncError> {
    // The cursor comes first: no point opening a browser when the store is
    // unreachable.
    let last_known = match mode {
        Mode::Full => store.last_known_rma().await?,
        Mode::Single(_) => None,
    };
    let start = starting_rma(last_known, mode);
    report::print_banner(mode, start);

    let driver = browser::connect(config).await?;
    info!(backend = driver.name(), start, "browser session open");
    run_with(driver, store, config, start, mode).await
}

/// Session-owning wrapper around the loop: teardown runs on every exit path,
/// success or not, before the result propagates.
pub(crate) async fn run_with(
    mut driver: Box<dyn PageDriver>,
    store: &dyn RecordStore,
    config: &Config,
    start: u32,
    mode: Mode,
) -> Result<ScanReport, SyncError> {
    let result = scan_loop(driver.as_ref(), store, config, start, mode).await;
    driver.shutdown().await;
    result
}

async fn scan_loop(
    driver: &dyn PageDriver,
    store: &dyn RecordStore,
    config: &Config,
    start: u32,
    mode: Mode,
) -> Result<ScanReport, SyncError> {
    login::login(driver, config).await?;

    let mut current = start;
    let mut synced = 0u32;
    loop {
        println!();
        println!("{}", format!("Processing RMA {current}").bold());
        info!(rma = current, "probing order");

        match probe::probe(driver, config, current).await? {
            ProbeOutcome::NotFound => {
                println!(
                    "{}",
                    format!("RMA {current} does not exist. Stopping here.").yellow()
                );
                info!(rma = current, "order missing, scan complete");
                return Ok(ScanReport {
                    started_at: start,
                    stopped_at: current,
                    synced,
                    reason: StopReason::OrderMissing,
                });
            }
            ProbeOutcome::LoadFailed => {
                println!(
                    "{}",
                    format!("RMA {current}: the page did not load. Stopping here.").yellow()
                );
                warn!(rma = current, "page unavailable, scan stopped");
                return Ok(ScanReport {
                    started_at: start,
                    stopped_at: current,
                    synced,
                    reason: StopReason::PageUnavailable,
                });
            }
            ProbeOutcome::Found => {
                let mut record = extract::extract_fields(driver, config::FIELD_SCHEMA).await;
                // The probe already knows both; the page does not render them.
                record.set(config::FIELD_RMA, Some(current.to_string()));
                record.set(config::FIELD_URL, Some(config.order_url(current)));
                report::print_record(&record);

                match store.persist(&record).await {
                    Ok(()) => {
                        synced += 1;
                        println!("{}", format!("RMA {current} saved to Notion.").green());
                        info!(rma = current, "record created");
                    }
                    Err(e) => {
                        println!("{}", format!("RMA {current}: save failed: {e}").red());
                        error!(rma = current, "persist failed: {e}");
                        // A full scan keeps going past one bad record; in
                        // single mode the failure is the result.
                        if matches!(mode, Mode::Single(_)) {
                            return Err(e);
                        }
                    }
                }
            }
        }

        if matches!(mode, Mode::Single(_)) {
            return Ok(ScanReport {
                started_at: start,
                stopped_at: current,
                synced,
                reason: StopReason::Completed,
            });
        }
        // The id space is finite; a store cursor at the ceiling must not
        // wrap the scan back to order 1.
        current = match current.checked_add(1) {
            Some(next) => next,
            None => {
                return Ok(ScanReport {
                    started_at: start,
                    stopped_at: current,
                    synced,
                    reason: StopReason::Completed,
                });
            }
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::testing::ScriptedDriver;
    use crate::notion::testing::ScriptedStore;
    use crate::notion::{build_properties, RecordStore};

    fn schema_fields() -> Vec<&'static str> {
        config::FIELD_SCHEMA.iter().map(|f| f.locator.value).collect()
    }

    fn technician_locator() -> &'static str {
        config::FIELD_SCHEMA
            .iter()
            .find(|f| f.name == config::FIELD_TECHNICIAN)
            .map(|f| f.locator.value)
            .unwrap()
    }

    #[test]
    fn the_cursor_resumes_one_past_the_store() {
        assert_eq!(starting_rma(Some(2864), Mode::Full), 2865);
        assert_eq!(starting_rma(None, Mode::Full), 1);
        assert_eq!(starting_rma(Some(2864), Mode::Single(10)), 10);
        // A cursor already at the ceiling stays there instead of wrapping.
        assert_eq!(starting_rma(Some(u32::MAX), Mode::Full), u32::MAX);
    }

    #[tokio::test]
    async fn a_full_scan_syncs_until_the_first_missing_order() {
        let config = Config::for_tests();
        let store = ScriptedStore::new(Some(2864));
        let fields = schema_fields();
        let driver = ScriptedDriver::new()
            .page(&config.order_url(2865), &fields)
            .value(fields[0], "Anna Nowak")
            .value(technician_locator(), "Marian (zmiana 1)")
            .nav_status(&config.order_url(2866), 404);

        let start = starting_rma(store.last_known_rma().await.unwrap(), Mode::Full);
        assert_eq!(start, 2865);

        let report = run_with(Box::new(driver), &store, &config, start, Mode::Full)
            .await
            .unwrap();

        assert_eq!(report.synced, 1);
        assert_eq!(report.stopped_at, 2866);
        assert_eq!(report.reason, StopReason::OrderMissing);

        let persisted = store.persisted();
        assert_eq!(persisted.len(), 1);
        assert_eq!(persisted[0].get(config::FIELD_RMA), Some("2865"));
        assert_eq!(
            persisted[0].get(config::FIELD_URL),
            Some(config.order_url(2865).as_str())
        );
        assert_eq!(persisted[0].get(config::FIELD_TECHNICIAN), Some("Marian"));

        // The synced technician lands as Marian's Notion identity.
        let properties = build_properties(&persisted[0]).unwrap();
        assert_eq!(
            properties[config::FIELD_TECHNICIAN]["people"][0]["id"],
            "e9b2da1f-9ee2-4f0b-bf37-dbe991877990"
        );
    }

    #[tokio::test]
    async fn an_empty_store_scans_from_the_first_order() {
        let config = Config::for_tests();
        let store = ScriptedStore::new(None);
        let driver = ScriptedDriver::new().nav_status(&config.order_url(1), 404);

        let start = starting_rma(store.last_known_rma().await.unwrap(), Mode::Full);
        let report = run_with(Box::new(driver), &store, &config, start, Mode::Full)
            .await
            .unwrap();

        assert_eq!(report.started_at, 1);
        assert_eq!(report.synced, 0);
        assert_eq!(report.reason, StopReason::OrderMissing);
    }

    #[tokio::test]
    async fn a_failed_save_does_not_stop_a_full_scan() {
        let config = Config::for_tests();
        let store = ScriptedStore::new(Some(2864)).failing_on(2865);
        let fields = schema_fields();
        let driver = ScriptedDriver::new()
            .page(&config.order_url(2865), &fields)
            .page(&config.order_url(2866), &fields)
            .nav_status(&config.order_url(2867), 404);

        let report = run_with(Box::new(driver), &store, &config, 2865, Mode::Full)
            .await
            .unwrap();

        assert_eq!(report.synced, 1);
        assert_eq!(report.stopped_at, 2867);
        let persisted = store.persisted();
        assert_eq!(persisted.len(), 1);
        assert_eq!(persisted[0].get(config::FIELD_RMA), Some("2866"));
    }

    #[tokio::test]
    async fn a_failed_save_aborts_single_mode() {
        let config = Config::for_tests();
        let store = ScriptedStore::new(None).failing_on(2865);
        let driver = ScriptedDriver::new().page(&config.order_url(2865), &schema_fields());

        let err = run_with(Box::new(driver), &store, &config, 2865, Mode::Single(2865))
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::NotionApi { status: 500, .. }));
    }

    #[tokio::test]
    async fn single_mode_stops_after_its_one_order() {
        let config = Config::for_tests();
        let store = ScriptedStore::new(None);
        let driver = ScriptedDriver::new().page(&config.order_url(2865), &schema_fields());

        let report = run_with(Box::new(driver), &store, &config, 2865, Mode::Single(2865))
            .await
            .unwrap();

        assert_eq!(report.synced, 1);
        assert_eq!(report.reason, StopReason::Completed);
        assert_eq!(store.persisted().len(), 1);
    }

    #[tokio::test]
    async fn a_scan_at_the_id_ceiling_stops_instead_of_wrapping() {
        let config = Config::for_tests();
        let store = ScriptedStore::new(None);
        let driver = ScriptedDriver::new().page(&config.order_url(u32::MAX), &schema_fields());

        let report = run_with(Box::new(driver), &store, &config, u32::MAX, Mode::Full)
            .await
            .unwrap();

        assert_eq!(report.synced, 1);
        assert_eq!(report.stopped_at, u32::MAX);
        assert_eq!(report.reason, StopReason::Completed);
        assert_eq!(store.persisted().len(), 1);
    }

    #[tokio::test]
    async fn a_load_failure_stops_the_scan_with_its_own_reason() {
        let config = Config::for_tests();
        let store = ScriptedStore::new(Some(2864));
        let driver = ScriptedDriver::new().nav_timeout(&config.order_url(2865));

        let report = run_with(Box::new(driver), &store, &config, 2865, Mode::Full)
            .await
            .unwrap();

        assert_eq!(report.synced, 0);
        assert_eq!(report.reason, StopReason::PageUnavailable);
    }

    #[tokio::test]
    async fn rescanning_the_same_window_duplicates_records() {
        // The store grants no idempotence: a stale cursor means the same
        // order lands twice.
        let config = Config::for_tests();
        let store = ScriptedStore::new(Some(2864));
        let fields = schema_fields();

        for _ in 0..2 {
            let driver = ScriptedDriver::new()
                .page(&config.order_url(2865), &fields)
                .nav_status(&config.order_url(2866), 404);
            run_with(Box::new(driver), &store, &config, 2865, Mode::Full)
                .await
                .unwrap();
        }

        let persisted = store.persisted();
        assert_eq!(persisted.len(), 2);
        assert_eq!(persisted[0].get(config::FIELD_RMA), Some("2865"));
        assert_eq!(persisted[1].get(config::FIELD_RMA), Some("2865"));
    }

    #[tokio::test]
    async fn teardown_runs_even_when_sign_in_fails() {
        let config = Config::for_tests();
        let store = ScriptedStore::new(None);
        let driver = ScriptedDriver::new().never_settles();
        let log = driver.call_log();

        let err = run_with(Box::new(driver), &store, &config, 1, Mode::Full)
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::AuthFailed(_)));
        assert!(log.lock().unwrap().contains(&"shutdown".to_string()));
        assert!(store.persisted().is_empty());
    }
}
