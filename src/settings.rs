//! Layered settings: defaults, optional `crawler.toml`, `CRAWLER_*` variables,
//! then the conventional database and webhook variables.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::crawl::{CrawlOptions, EmptyPagePolicy};
use crate::venue::FIELDS;

pub const DEFAULT_BASE_URL: &str =
    "https://www.theknot.com/marketplace/wedding-reception-venues-san-diego-ca";
pub const DEFAULT_CONTAINER_SELECTOR: &str = "[class^='info-container']";
pub const DEFAULT_SERVICE_NAME: &str = "venue-crawler";
const DEFAULT_WEBHOOK_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub base_url: String,
    pub container_selector: String,
    pub no_results_marker: String,
    pub max_pages: u32,
    pub page_delay_ms: u64,
    pub empty_page: EmptyPagePolicy,
    pub required_fields: Vec<String>,
    pub csv_path: Option<String>,
    pub spider_api_key: Option<String>,
    pub selectors: FieldSelectors,
    #[serde(default)]
    pub database: DatabaseSettings,
    pub webhook: WebhookSettings,
}

/// CSS selectors applied inside each listing container.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldSelectors {
    pub name: String,
    pub location: String,
    pub price: String,
    pub capacity: String,
    pub rating: String,
    pub reviews: String,
    pub description: String,
}

/// Either a full URL, or discrete parts. The URL wins when both are given.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub name: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookSettings {
    pub url: Option<String>,
    pub service_name: String,
    pub timeout_secs: u64,
}

impl WebhookSettings {
    /// Just the webhook, straight from the variables. Used when the full
    /// settings failed to load but a failure still has to be reported.
    pub fn from_vars(vars: &HashMap<String, String>) -> WebhookSettings {
        WebhookSettings {
            url: vars
                .get("COMPLETION_WEBHOOK_URL")
                .filter(|u| !u.is_empty())
                .cloned(),
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            timeout_secs: DEFAULT_WEBHOOK_TIMEOUT_SECS,
        }
    }
}

impl Settings {
    /// Load from `crawler.toml` (optional) and the process environment.
    pub fn load() -> Result<Settings> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        build(&vars, Some("crawler"))
    }

    /// Same layering, from an explicit variable map and no file.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Settings> {
        build(vars, None)
    }

    pub fn crawl_options(&self) -> CrawlOptions {
        CrawlOptions {
            base_url: self.base_url.clone(),
            max_pages: self.max_pages,
            page_delay: Duration::from_millis(self.page_delay_ms),
            required_fields: self.required_fields.clone(),
            empty_page: self.empty_page,
        }
    }
}

fn build(vars: &HashMap<String, String>, file: Option<&str>) -> Result<Settings> {
    // First match wins, mirroring the PG* / POSTGRES_* fallbacks.
    let pick = |keys: &[&str]| -> Option<String> {
        keys.iter()
            .find_map(|k| vars.get(*k).filter(|v| !v.is_empty()).cloned())
    };

    let mut builder = Config::builder()
        .set_default("base_url", DEFAULT_BASE_URL)?
        .set_default("container_selector", DEFAULT_CONTAINER_SELECTOR)?
        .set_default("no_results_marker", "No Results Found")?
        .set_default("max_pages", 2)?
        .set_default("page_delay_ms", 2000)?
        .set_default("empty_page", "stop")?
        .set_default("required_fields", FIELDS.to_vec())?
        .set_default("selectors.name", "h2")?
        .set_default("selectors.location", "[class*='location']")?
        .set_default("selectors.price", "[class*='price']")?
        .set_default("selectors.capacity", "[class*='capacity']")?
        .set_default("selectors.rating", "[class*='rating']")?
        .set_default("selectors.reviews", "[class*='review']")?
        .set_default("selectors.description", "[class*='description']")?
        .set_default("webhook.service_name", DEFAULT_SERVICE_NAME)?
        .set_default("webhook.timeout_secs", DEFAULT_WEBHOOK_TIMEOUT_SECS as i64)?;

    if let Some(name) = file {
        builder = builder.add_source(File::with_name(name).required(false));
    }

    let port = pick(&["PGPORT"])
        .map(|p| p.parse::<i64>().context("PGPORT is not a number"))
        .transpose()?;

    let settings = builder
        .add_source(
            Environment::with_prefix("CRAWLER")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("required_fields")
                .try_parsing(true)
                .source(Some(vars.clone())),
        )
        .set_override_option("database.url", pick(&["DATABASE_URL"]))?
        .set_override_option("database.user", pick(&["PGUSER", "POSTGRES_USER"]))?
        .set_override_option(
            "database.password",
            pick(&["PGPASSWORD", "POSTGRES_PASSWORD"]),
        )?
        .set_override_option("database.name", pick(&["PGDATABASE", "POSTGRES_DB"]))?
        .set_override_option("database.host", pick(&["PGHOST"]))?
        .set_override_option("database.port", port)?
        .set_override_option("webhook.url", pick(&["COMPLETION_WEBHOOK_URL"]))?
        .set_override_option("spider_api_key", pick(&["SPIDER_API_KEY"]))?
        .build()
        .context("Failed to assemble settings")?;

    settings
        .try_deserialize()
        .context("Invalid crawler settings")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_without_environment() {
        let s = Settings::from_vars(&HashMap::new()).unwrap();
        assert_eq!(s.base_url, DEFAULT_BASE_URL);
        assert_eq!(s.max_pages, 2);
        assert_eq!(s.page_delay_ms, 2000);
        assert_eq!(s.empty_page, EmptyPagePolicy::Stop);
        assert_eq!(s.required_fields.len(), 7);
        assert!(s.database.url.is_none());
        assert!(s.webhook.url.is_none());
        assert_eq!(s.webhook.service_name, DEFAULT_SERVICE_NAME);
    }

    #[test]
    fn prefixed_variables_override_defaults() {
        let s = Settings::from_vars(&vars(&[
            ("CRAWLER_MAX_PAGES", "7"),
            ("CRAWLER_EMPTY_PAGE", "continue"),
            ("CRAWLER_REQUIRED_FIELDS", "name,location"),
            ("CRAWLER_SELECTORS__NAME", ".title"),
        ]))
        .unwrap();
        assert_eq!(s.max_pages, 7);
        assert_eq!(s.empty_page, EmptyPagePolicy::Continue);
        assert_eq!(s.required_fields, ["name", "location"]);
        assert_eq!(s.selectors.name, ".title");
    }

    #[test]
    fn database_variables_fall_back_in_order() {
        let s = Settings::from_vars(&vars(&[
            ("POSTGRES_USER", "pg"),
            ("PGUSER", "crawler"),
            ("POSTGRES_PASSWORD", "secret"),
            ("POSTGRES_DB", "venues"),
            ("PGHOST", "db.internal"),
            ("PGPORT", "6543"),
            ("COMPLETION_WEBHOOK_URL", "https://hooks.test/done"),
        ]))
        .unwrap();
        assert_eq!(s.database.user.as_deref(), Some("crawler"));
        assert_eq!(s.database.password.as_deref(), Some("secret"));
        assert_eq!(s.database.name.as_deref(), Some("venues"));
        assert_eq!(s.database.port, Some(6543));
        assert_eq!(s.webhook.url.as_deref(), Some("https://hooks.test/done"));
    }

    #[test]
    fn bad_port_fails_but_webhook_is_still_readable() {
        let v = vars(&[
            ("PGPORT", "abc"),
            ("COMPLETION_WEBHOOK_URL", "https://hooks.test/done"),
        ]);
        let err = Settings::from_vars(&v).unwrap_err();
        assert!(err.to_string().contains("PGPORT"));

        let hook = WebhookSettings::from_vars(&v);
        assert_eq!(hook.url.as_deref(), Some("https://hooks.test/done"));
        assert_eq!(hook.service_name, DEFAULT_SERVICE_NAME);
        assert_eq!(hook.timeout_secs, 10);
    }

    #[test]
    fn crawl_options_carry_settings() {
        let s = Settings::from_vars(&vars(&[("CRAWLER_PAGE_DELAY_MS", "250")])).unwrap();
        let o = s.crawl_options();
        assert_eq!(o.page_delay, Duration::from_millis(250));
        assert_eq!(o.url_for(1), format!("{}?page=1", DEFAULT_BASE_URL));
    }
}
