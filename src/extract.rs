//! Schema-driven extraction of one order's fields off an open page.

use tracing::debug;

use crate::browser::PageDriver;
use crate::config;
use crate::locator::Field;

/// One scraped repair order: logical field name → value. Absence is explicit
/// rather than a sentinel string, and insertion order is preserved so output
/// stays stable.
#[derive(Debug, Clone, Default)]
pub struct ExtractedRecord {
    fields: Vec<(&'static str, Option<String>)>,
}

impl ExtractedRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a field. Blank values count as absent.
    pub fn set(&mut self, name: &'static str, value: Option<String>) {
        let value = value.filter(|v| !v.is_empty());
        if let Some(slot) = self.fields.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = value;
        } else {
            self.fields.push((name, value));
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| *n == name)
            .and_then(|(_, v)| v.as_deref())
    }
}

/// Read every schema field from the page the driver currently sits on. A
/// field that cannot be read degrades to absent and never disturbs the rest.
pub async fn extract_fields(driver: &dyn PageDriver, schema: &[Field]) -> ExtractedRecord {
    let mut record = ExtractedRecord::new();
    for field in schema {
        let value = match driver.read_value(&field.locator).await {
            Ok(raw) if field.name == config::FIELD_TECHNICIAN => normalize_technician(&raw),
            Ok(raw) => {
                let trimmed = raw.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            Err(e) => {
                debug!(field = field.name, "field not readable: {e}");
                None
            }
        };
        record.set(field.name, value);
    }
    record
}

/// Technician names come annotated, e.g. `"Marian (zmiana 1)"`. Cut the
/// trailing parenthetical and treat an empty leftover as absent.
pub fn normalize_technician(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let cut = if trimmed.ends_with(')') {
        match trimmed.find('(') {
            Some(open) => trimmed[..open].trim_end(),
            None => trimmed,
        }
    } else {
        trimmed
    };
    (!cut.is_empty()).then(|| cut.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::testing::ScriptedDriver;

    #[test]
    fn workload_suffix_is_stripped() {
        assert_eq!(
            normalize_technician("Jan Kowalski (workload: 3)"),
            Some("Jan Kowalski".to_string())
        );
    }

    #[test]
    fn plain_names_pass_through() {
        assert_eq!(
            normalize_technician("Jan Kowalski"),
            Some("Jan Kowalski".to_string())
        );
    }

    #[test]
    fn a_parenthetical_mid_name_is_left_alone() {
        assert_eq!(
            normalize_technician("Jan (Janek) Kowalski"),
            Some("Jan (Janek) Kowalski".to_string())
        );
    }

    #[test]
    fn empty_and_suffix_only_values_become_absent() {
        assert_eq!(normalize_technician(""), None);
        assert_eq!(normalize_technician("   "), None);
        assert_eq!(normalize_technician("(zmiana 1)"), None);
    }

    #[test]
    fn blank_set_values_read_back_as_absent() {
        let mut record = ExtractedRecord::new();
        record.set(config::FIELD_MODEL, Some(String::new()));
        record.set(config::FIELD_CLIENT, Some("Anna Nowak".to_string()));
        assert_eq!(record.get(config::FIELD_MODEL), None);
        assert_eq!(record.get(config::FIELD_CLIENT), Some("Anna Nowak"));
    }

    #[tokio::test]
    async fn one_broken_field_does_not_disturb_the_others() {
        let client = config::FIELD_SCHEMA[0].locator.value;
        let phone = config::FIELD_SCHEMA[1].locator.value;
        let driver = ScriptedDriver::new()
            .value(client, "Anna Nowak")
            .broken_field(phone)
            .value(config::FIELD_SCHEMA[2].locator.value, "Lenovo");

        let record = extract_fields(&driver, config::FIELD_SCHEMA).await;

        assert_eq!(record.get(config::FIELD_CLIENT), Some("Anna Nowak"));
        assert_eq!(record.get(config::FIELD_PHONE), None);
        assert_eq!(record.get(config::FIELD_MANUFACTURER), Some("Lenovo"));
    }

    #[tokio::test]
    async fn technician_is_normalized_during_extraction() {
        let technician = config::FIELD_SCHEMA
            .iter()
            .find(|f| f.name == config::FIELD_TECHNICIAN)
            .map(|f| f.locator.value)
            .unwrap();
        let driver = ScriptedDriver::new().value(technician, "Marian (zmiana 1)");

        let record = extract_fields(&driver, config::FIELD_SCHEMA).await;

        assert_eq!(record.get(config::FIELD_TECHNICIAN), Some("Marian"));
    }

    #[tokio::test]
    async fn unreadable_pages_still_yield_a_record() {
        let driver = ScriptedDriver::new();
        let record = extract_fields(&driver, config::FIELD_SCHEMA).await;
        for field in config::FIELD_SCHEMA {
            assert_eq!(record.get(field.name), None);
        }
    }
}
