//! Runtime configuration and the fixed CRM schema: URLs, form locators, the
//! field table, and the Notion user directory.

use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::SyncError;
use crate::locator::{Field, Locator};

pub const DEFAULT_LOGIN_URL: &str = "https://serwisfixed.gincore.net/auth/login_form";
pub const DEFAULT_ORDER_BASE_URL: &str = "https://serwisfixed.gincore.net/orders/";

// Sign-in form.
pub const USERNAME_FIELD: Locator = Locator::name("login");
pub const PASSWORD_FIELD: Locator = Locator::name("password");
pub const SIGN_IN_BUTTON: Locator = Locator::xpath("//button[contains(text(), 'Sign In')]");

// Order search, used when no detail URL shape resolves.
pub const ORDER_SEARCH_FIELD: Locator = Locator::id("repairOrderSearchInput");
pub const ORDER_SEARCH_GO: Locator = Locator::id("searchButton");

// The CRM's own "no such order" banner.
pub const ORDER_NOT_FOUND: Locator = Locator::xpath("//h4[contains(text(), 'Order not found')]");

// Field names double as Notion property keys, so they stay exactly as the
// database spells them.
pub const FIELD_RMA: &str = "RMA";
pub const FIELD_CLIENT: &str = "Klient";
pub const FIELD_PHONE: &str = "Numer telefonu";
pub const FIELD_MANUFACTURER: &str = "Producent";
pub const FIELD_DEVICE_TYPE: &str = "Typ urządzenia";
pub const FIELD_MODEL: &str = "Model";
pub const FIELD_SERIAL: &str = "Numer Seryjny";
pub const FIELD_NOTES: &str = "Uwagi";
pub const FIELD_DEFECT: &str = "Opis Usterki";
pub const FIELD_CONDITION: &str = "Stan wizualny urządzenia";
pub const FIELD_TECHNICIAN: &str = "Technik";
pub const FIELD_URL: &str = "URL";

/// Everything scraped off an open order page, in read order. RMA and URL are
/// not here: the scan already knows both and stamps them on afterwards.
pub const FIELD_SCHEMA: &[Field] = &[
    Field {
        name: FIELD_CLIENT,
        locator: Locator::xpath("//div[contains(@class, 'order-edit-client')]/a"),
    },
    Field {
        name: FIELD_PHONE,
        locator: Locator::xpath("//div[contains(@class, 'order-edit-client-phone')]/a"),
    },
    Field {
        name: FIELD_MANUFACTURER,
        locator: Locator::name("users_fields[u_producent]"),
    },
    Field {
        name: FIELD_DEVICE_TYPE,
        locator: Locator::name("users_fields[u_typ_urzadzenia]"),
    },
    Field {
        name: FIELD_MODEL,
        locator: Locator::name("categories-goods-value[]"),
    },
    Field {
        name: FIELD_SERIAL,
        locator: Locator::name("serial[]"),
    },
    Field {
        name: FIELD_NOTES,
        locator: Locator::name("users_fields[u_komentarz_do_zlecenia]"),
    },
    Field {
        name: FIELD_DEFECT,
        locator: Locator::name("defect"),
    },
    Field {
        name: FIELD_CONDITION,
        locator: Locator::name("comment"),
    },
    Field {
        name: FIELD_TECHNICIAN,
        locator: Locator::xpath("//select[@name='engineer']/../div/button/span"),
    },
];

/// CRM display name → Notion user id, for people properties.
pub const NOTION_USERS: &[(&str, &str)] = &[
    ("Marian", "e9b2da1f-9ee2-4f0b-bf37-dbe991877990"),
    ("Piotr Urbanek", "7724bbb5-9400-40e3-b08e-11f7ee6ec9f3"),
];

pub const MANAGER_NAME: &str = "Piotr Urbanek";
pub const STATUS_NEW: &str = "Nowe";
pub const PRIORITY_STANDARD: &str = "Standardowy";

/// Notion identity for a CRM display name.
pub fn notion_user_id(name: &str) -> Option<&'static str> {
    NOTION_USERS.iter().find(|(n, _)| *n == name).map(|(_, id)| *id)
}

/// Budget for a navigation to commit a new document. Short on purpose, so a
/// dead CRM fails the scan quickly instead of hanging it.
pub const COMMIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Budget for a page to finish loading where full settlement matters.
pub const SETTLE_TIMEOUT: Duration = Duration::from_secs(8);

/// Budget for the sign-in round trip.
pub const LOGIN_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone)]
pub struct Config {
    pub login_url: String,
    /// Always carries a trailing slash.
    pub order_base_url: String,
    pub crm_username: String,
    pub crm_password: String,
    pub notion_token: String,
    pub notion_database_id: String,
    /// When set, drive a hosted browser at this WebDriver endpoint instead of
    /// launching one locally.
    pub remote_webdriver: Option<String>,
    pub chromedriver_bin: String,
    pub chromedriver_port: u16,
    pub chrome_binary: Option<String>,
    pub headless: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, SyncError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any string-keyed lookup. `from_env` feeds the process
    /// environment; tests feed closures.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, SyncError> {
        let required = |key: &'static str| -> Result<String, SyncError> {
            get(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or(SyncError::ConfigMissing(key))
        };

        let mut order_base_url =
            get("CRM_ORDER_BASE_URL").unwrap_or_else(|| DEFAULT_ORDER_BASE_URL.to_string());
        if !order_base_url.ends_with('/') {
            order_base_url.push('/');
        }

        Ok(Self {
            login_url: get("CRM_LOGIN_URL").unwrap_or_else(|| DEFAULT_LOGIN_URL.to_string()),
            order_base_url,
            crm_username: required("CRM_USERNAME")?,
            crm_password: required("CRM_PASSWORD")?,
            notion_token: required("NOTION_API_TOKEN")?,
            notion_database_id: required("NOTION_DATABASE_ID")?,
            remote_webdriver: get("REMOTE_WEBDRIVER_URL").filter(|v| !v.trim().is_empty()),
            chromedriver_bin: get("CHROMEDRIVER_BIN").unwrap_or_else(|| "chromedriver".to_string()),
            chromedriver_port: get("CHROMEDRIVER_PORT")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(9515),
            chrome_binary: get("CHROME_BINARY").filter(|v| !v.trim().is_empty()),
            headless: get("RMA_SYNC_HEADFUL").map(|v| v.trim() != "1").unwrap_or(true),
        })
    }

    /// Canonical detail URL for an order id.
    pub fn order_url(&self, rma: u32) -> String {
        format!("{}{rma}", self.order_base_url)
    }

    #[cfg(test)]
    pub(crate) fn for_tests() -> Self {
        Self::from_lookup(|key| match key {
            "CRM_USERNAME" => Some("user".to_string()),
            "CRM_PASSWORD" => Some("pass".to_string()),
            "NOTION_API_TOKEN" => Some("secret".to_string()),
            "NOTION_DATABASE_ID" => Some("db-id".to_string()),
            _ => None,
        })
        .unwrap()
    }
}

/// Replace the `CRM_PASSWORD` line of an env file in place, appending one if
/// the file never had it. Every other byte survives untouched, each line's
/// own terminator included.
pub fn update_env_password(path: &Path, new_password: &str) -> std::io::Result<()> {
    let original = fs::read_to_string(path)?;
    let replacement = format!("CRM_PASSWORD=\"{new_password}\"");

    let mut out = String::with_capacity(original.len() + replacement.len() + 2);
    let mut replaced = false;
    let mut rest = original.as_str();
    while !rest.is_empty() {
        let (line, terminator, tail) = split_line(rest);
        if line.trim_start().starts_with("CRM_PASSWORD") {
            out.push_str(&replacement);
            replaced = true;
        } else {
            out.push_str(line);
        }
        out.push_str(terminator);
        rest = tail;
    }
    if !replaced {
        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(&replacement);
        out.push('\n');
    }
    fs::write(path, out)
}

/// One physical line off the front of `text`: the line, its own terminator
/// (`\n`, `\r\n`, or nothing at end of input), and the remainder.
fn split_line(text: &str) -> (&str, &str, &str) {
    match text.find('\n') {
        Some(i) => {
            let tail = &text[i + 1..];
            match text[..i].strip_suffix('\r') {
                Some(line) => (line, "\r\n", tail),
                None => (&text[..i], "\n", tail),
            }
        }
        None => (text, "", ""),
    }
}
