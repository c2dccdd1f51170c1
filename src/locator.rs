//! Element locators, kept backend-neutral so the same schema tables drive
//! both browser backends.

/// How an element should be looked up on a rendered page. Carries the full
/// WebDriver locator vocabulary; the current schema only constructs `Id`,
/// `Name` and `XPath`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(dead_code)]
pub enum LocatorKind {
    Id,
    Name,
    ClassName,
    XPath,
    Css,
    LinkText,
    PartialLinkText,
    TagName,
}

/// One lookup rule, fixed at compile time alongside the rest of the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Locator {
    pub kind: LocatorKind,
    pub value: &'static str,
}

impl Locator {
    pub const fn new(kind: LocatorKind, value: &'static str) -> Self {
        Self { kind, value }
    }

    pub const fn id(value: &'static str) -> Self {
        Self::new(LocatorKind::Id, value)
    }

    pub const fn name(value: &'static str) -> Self {
        Self::new(LocatorKind::Name, value)
    }

    pub const fn xpath(value: &'static str) -> Self {
        Self::new(LocatorKind::XPath, value)
    }
}

/// A row of the extraction schema: the logical field name plus where the CRM
/// renders it.
#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub name: &'static str,
    pub locator: Locator,
}
