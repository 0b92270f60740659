use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use spider_client::shapes::request::{ReturnFormat, ReturnFormatHandling};
use spider_client::{RequestParams, Spider};
use tracing::debug;

use crate::crawl::{PageBatch, PageSource};
use crate::extract::Extractor;
use crate::settings::Settings;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = concat!("venue-crawler/", env!("CARGO_PKG_VERSION"));

/// How listing pages are downloaded.
pub enum Fetcher {
    /// Plain GET of the listing URL.
    Http(reqwest::Client),
    /// Rendered through spider.cloud, for listings built client-side.
    Spider(Spider),
}

impl Fetcher {
    pub fn http() -> Result<Fetcher> {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Fetcher::Http(client))
    }

    pub fn spider(api_key: &str) -> Result<Fetcher> {
        let spider = Spider::new(Some(api_key.to_string()))
            .map_err(|e| anyhow!("Failed to create Spider client: {}", e))?;
        Ok(Fetcher::Spider(spider))
    }

    pub async fn fetch_html(&self, url: &str) -> Result<String> {
        match self {
            Fetcher::Http(client) => {
                let resp = client
                    .get(url)
                    .send()
                    .await
                    .with_context(|| format!("GET {} failed", url))?
                    .error_for_status()?;
                Ok(resp.text().await?)
            }
            Fetcher::Spider(spider) => {
                let params = RequestParams {
                    return_format: Some(ReturnFormatHandling::Single(ReturnFormat::Raw)),
                    ..Default::default()
                };
                let response = spider
                    .scrape_url(url, Some(params), "application/json")
                    .await
                    .map_err(|e| anyhow!("Spider render of {} failed: {}", url, e))?;
                RenderedPage::from_response(response)?.into_html(url)
            }
        }
    }
}

/// One entry of a spider.cloud render response.
#[derive(Debug, Deserialize)]
struct RenderedPage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    status: Option<u16>,
    #[serde(default)]
    error: Option<String>,
}

impl RenderedPage {
    /// The response is a list of rendered pages, sometimes delivered as a
    /// JSON-encoded string. Only the first entry matters for a single URL.
    fn from_response(response: Value) -> Result<RenderedPage> {
        let response = match response {
            Value::String(s) => serde_json::from_str(&s).context("Spider response is not JSON")?,
            other => other,
        };
        let mut pages: Vec<RenderedPage> =
            serde_json::from_value(response).context("Unexpected spider response shape")?;
        if pages.is_empty() {
            bail!("Spider returned no pages");
        }
        Ok(pages.swap_remove(0))
    }

    /// A render that the target answered with a non-2xx status is a failed page.
    fn into_html(self, url: &str) -> Result<String> {
        if let Some(status) = self.status.filter(|s| !(200..300).contains(s)) {
            bail!(
                "{} rendered with status {}{}",
                url,
                status,
                self.error.map(|e| format!(": {}", e)).unwrap_or_default()
            );
        }
        self.content
            .filter(|c| !c.is_empty())
            .ok_or_else(|| anyhow!("No content rendered for {}", url))
    }
}

/// Fetches listing pages and runs the CSS extractor over them.
pub struct CatalogSource {
    fetcher: Fetcher,
    extractor: Extractor,
}

impl CatalogSource {
    pub fn new(fetcher: Fetcher, extractor: Extractor) -> Self {
        CatalogSource { fetcher, extractor }
    }

    /// Spider when an API key is configured, plain HTTP otherwise.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let fetcher = match settings.spider_api_key.as_deref() {
            Some(key) => Fetcher::spider(key)?,
            None => Fetcher::http()?,
        };
        let extractor = Extractor::new(
            &settings.container_selector,
            &settings.selectors,
            &settings.no_results_marker,
        )?;
        Ok(CatalogSource::new(fetcher, extractor))
    }
}

#[async_trait]
impl PageSource for CatalogSource {
    async fn fetch_page(&self, page: u32, url: &str) -> Result<PageBatch> {
        let html = self.fetcher.fetch_html(url).await?;
        let batch = self.extractor.extract(&html);
        debug!(
            "Page {}: {} candidates, end_of_results={}",
            page,
            batch.candidates.len(),
            batch.end_of_results
        );
        Ok(batch)
    }
}
