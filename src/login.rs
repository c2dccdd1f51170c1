//! CRM sign-in. Anything going wrong here is fatal for the whole run, so
//! every step folds into an authentication failure with its own context.

use tracing::info;

use crate::browser::{PageDriver, WaitUntil};
use crate::config::{self, Config};
use crate::error::SyncError;

pub async fn login(driver: &dyn PageDriver, config: &Config) -> Result<(), SyncError> {
    info!(url = %config.login_url, "signing in to the CRM");

    let nav = driver
        .navigate(&config.login_url, WaitUntil::Settled, config::LOGIN_TIMEOUT)
        .await
        .map_err(|e| SyncError::AuthFailed(format!("login page unreachable: {e}")))?;
    if !nav.committed {
        return Err(SyncError::AuthFailed(
            "login page did not load in time".to_string(),
        ));
    }

    driver
        .fill(&config::USERNAME_FIELD, &config.crm_username)
        .await
        .map_err(|e| SyncError::AuthFailed(format!("username field: {e}")))?;
    driver
        .fill(&config::PASSWORD_FIELD, &config.crm_password)
        .await
        .map_err(|e| SyncError::AuthFailed(format!("password field: {e}")))?;
    driver
        .click(&config::SIGN_IN_BUTTON)
        .await
        .map_err(|e| SyncError::AuthFailed(format!("sign-in button: {e}")))?;

    if !driver.wait_until_settled(config::LOGIN_TIMEOUT).await {
        return Err(SyncError::AuthFailed(
            "page did not settle after submitting credentials".to_string(),
        ));
    }

    info!("signed in");
    Ok(())
}
