//! Collaborators the order core consumes but does not own: the menu catalog
//! and the store settings.

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::errors::ServiceError;
use crate::money::DEFAULT_TAX_RATE;
use crate::services::reports::ReportPeriod;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuItem {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: Decimal,
    #[serde(default)]
    pub category_id: Option<i64>,
    #[serde(default = "default_available")]
    pub available: bool,
}

fn default_available() -> bool {
    true
}

/// Read-only source of categories and menu items.
///
/// Prices returned here are authoritative only at checkout; orders keep their
/// own snapshot afterwards.
#[async_trait]
pub trait CatalogProvider: Send + Sync {
    async fn get_categories(&self) -> Result<Vec<Category>, ServiceError>;

    /// Menu items, optionally restricted to one category.
    async fn get_menu_items(&self, category_id: Option<i64>)
        -> Result<Vec<MenuItem>, ServiceError>;

    async fn get_menu_item(&self, id: i64) -> Result<Option<MenuItem>, ServiceError> {
        Ok(self
            .get_menu_items(None)
            .await?
            .into_iter()
            .find(|item| item.id == id))
    }
}

/// Catalog held in memory, typically loaded from a JSON export of the menu.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    categories: Vec<Category>,
    items: BTreeMap<i64, MenuItem>,
}

#[derive(Deserialize)]
struct CatalogFile {
    #[serde(default)]
    categories: Vec<Category>,
    #[serde(default)]
    menu_items: Vec<MenuItem>,
}

impl InMemoryCatalog {
    pub fn new(categories: Vec<Category>, items: Vec<MenuItem>) -> Self {
        Self {
            categories,
            items: items.into_iter().map(|item| (item.id, item)).collect(),
        }
    }

    /// Parses `{"categories": [...], "menu_items": [...]}`.
    pub fn from_json(json: &str) -> Result<Self, ServiceError> {
        let file: CatalogFile = serde_json::from_str(json).map_err(|e| {
            ServiceError::ExternalServiceError(format!("Invalid catalog document: {}", e))
        })?;
        let catalog = Self::new(file.categories, file.menu_items);
        debug!(
            categories = catalog.categories.len(),
            items = catalog.items.len(),
            "Catalog loaded"
        );
        Ok(catalog)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ServiceError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            warn!(path = %path.display(), error = %e, "Failed to read catalog file");
            ServiceError::ExternalServiceError(format!(
                "Cannot read catalog {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&json)
    }

    pub fn insert(&mut self, item: MenuItem) {
        self.items.insert(item.id, item);
    }

    /// Drops an item; orders that already captured it are unaffected.
    pub fn remove(&mut self, id: i64) -> Option<MenuItem> {
        self.items.remove(&id)
    }
}

#[async_trait]
impl CatalogProvider for InMemoryCatalog {
    async fn get_categories(&self) -> Result<Vec<Category>, ServiceError> {
        Ok(self.categories.clone())
    }

    async fn get_menu_items(
        &self,
        category_id: Option<i64>,
    ) -> Result<Vec<MenuItem>, ServiceError> {
        Ok(self
            .items
            .values()
            .filter(|item| category_id.map_or(true, |c| item.category_id == Some(c)))
            .cloned()
            .collect())
    }

    async fn get_menu_item(&self, id: i64) -> Result<Option<MenuItem>, ServiceError> {
        Ok(self.items.get(&id).cloned())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportDefaults {
    pub period: ReportPeriod,
    pub top_items: usize,
}

impl Default for ReportDefaults {
    fn default() -> Self {
        Self {
            period: ReportPeriod::Daily,
            top_items: 10,
        }
    }
}

pub trait SettingsProvider: Send + Sync {
    /// Configured rate, if any.
    fn tax_rate(&self) -> Option<Decimal>;

    fn effective_tax_rate(&self) -> Decimal {
        self.tax_rate().unwrap_or(DEFAULT_TAX_RATE)
    }

    fn currency_symbol(&self) -> &str {
        "$"
    }

    fn report_defaults(&self) -> ReportDefaults {
        ReportDefaults::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticSettings {
    pub tax_rate: Option<Decimal>,
    pub currency_symbol: String,
    pub report_defaults: ReportDefaults,
}

impl Default for StaticSettings {
    fn default() -> Self {
        Self {
            tax_rate: None,
            currency_symbol: "$".to_string(),
            report_defaults: ReportDefaults::default(),
        }
    }
}

impl StaticSettings {
    pub fn with_tax_rate(tax_rate: Decimal) -> Self {
        Self {
            tax_rate: Some(tax_rate),
            ..Default::default()
        }
    }
}

impl From<&AppConfig> for StaticSettings {
    fn from(cfg: &AppConfig) -> Self {
        let period = ReportPeriod::from_str(&cfg.report_default_period.to_ascii_lowercase())
            .unwrap_or(ReportPeriod::Daily);
        Self {
            tax_rate: cfg.tax_rate_decimal(),
            currency_symbol: cfg.currency_symbol.clone(),
            report_defaults: ReportDefaults {
                period,
                top_items: cfg.report_top_items,
            },
        }
    }
}

impl SettingsProvider for StaticSettings {
    fn tax_rate(&self) -> Option<Decimal> {
        self.tax_rate
    }

    fn currency_symbol(&self) -> &str {
        &self.currency_symbol
    }

    fn report_defaults(&self) -> ReportDefaults {
        self.report_defaults
    }
}
