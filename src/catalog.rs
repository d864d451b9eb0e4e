//! Catalog of platforms and titles scraped from the upstream directory index.
//!
//! The site serves plain index pages: the root lists one directory per
//! platform, each platform page lists one `.zip` per title in a table with
//! `td.link` and `td.size` cells. Markup that no longer matches simply yields
//! fewer (or no) entries.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use scraper::{Html, Selector};

use crate::error::{Error, Result};

static CATEGORY_LINK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("tr > td > a").expect("valid selector"));
static ROW: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").expect("valid selector"));
static ITEM_LINK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("td.link a").expect("valid selector"));
static ITEM_SIZE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("td.size").expect("valid selector"));

/// A platform directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    /// Display name.
    pub title: String,
    /// Absolute URL of the platform's index page.
    pub url: String,
}

/// A downloadable title.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Item {
    /// Display name; unique key across a run.
    pub title: String,
    /// Human-readable size as listed by the server.
    pub size_hint: String,
    /// Absolute URL of the `.zip` archive.
    pub url: String,
}

impl Item {
    /// Creates an item.
    #[must_use]
    pub fn new(
        title: impl Into<String>,
        size_hint: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            size_hint: size_hint.into(),
            url: url.into(),
        }
    }
}

/// Resolves `href` against `base`, falling back to concatenation when `base`
/// is not a valid URL.
fn join_url(base: &str, href: &str) -> String {
    Url::parse(base)
        .and_then(|b| b.join(href))
        .map_or_else(|_| format!("{base}{href}"), String::from)
}

/// Extracts platform directories from the root index page.
#[must_use]
pub fn parse_categories(html: &str, base_url: &str) -> Vec<Category> {
    let doc = Html::parse_document(html);
    doc.select(&CATEGORY_LINK)
        .filter_map(|a| {
            let href = a.value().attr("href")?;
            let title = a.value().attr("title")?;
            if !href.ends_with('/') || href.starts_with("..") {
                return None;
            }
            Some(Category {
                title: title.to_string(),
                url: join_url(base_url, href),
            })
        })
        .collect()
}

/// Extracts `.zip` titles from a platform index page.
#[must_use]
pub fn parse_items(html: &str, category_url: &str) -> Vec<Item> {
    let doc = Html::parse_document(html);
    doc.select(&ROW)
        .filter_map(|row| {
            let link = row.select(&ITEM_LINK).next()?;
            let href = link.value().attr("href")?;
            let title = link.value().attr("title")?;
            if !href.ends_with(".zip") {
                return None;
            }
            let size_hint = row
                .select(&ITEM_SIZE)
                .next()
                .map(|s| s.text().collect::<String>().trim().to_string())
                .unwrap_or_default();
            Some(Item {
                title: title.to_string(),
                size_hint,
                url: join_url(category_url, href),
            })
        })
        .collect()
}

/// Source of categories and titles.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Lists platform directories.
    async fn fetch_categories(&self) -> Result<Vec<Category>>;

    /// Lists the titles of one platform.
    async fn fetch_items(&self, category_url: &str) -> Result<Vec<Item>>;
}

/// Catalog read over HTTP from the upstream index.
#[derive(Debug, Clone)]
pub struct HttpCatalog {
    http: reqwest::Client,
    base_url: String,
}

impl HttpCatalog {
    /// Creates a catalog rooted at `base_url`.
    #[must_use]
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    /// Root index URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_page(&self, url: &str) -> Result<String> {
        log::debug!("Fetching index {url}");
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response.text().await?)
    }
}

#[async_trait]
impl CatalogSource for HttpCatalog {
    async fn fetch_categories(&self) -> Result<Vec<Category>> {
        let html = self.get_page(&self.base_url).await?;
        let categories = parse_categories(&html, &self.base_url);
        log::info!("Found {} categories at {}", categories.len(), self.base_url);
        Ok(categories)
    }

    async fn fetch_items(&self, category_url: &str) -> Result<Vec<Item>> {
        let html = self.get_page(category_url).await?;
        let items = parse_items(&html, category_url);
        log::info!("Found {} titles at {category_url}", items.len());
        Ok(items)
    }
}

/// Builds a configured HTTP client for index and archive requests.
///
/// `timeout` bounds connecting and each individual body read, not the
/// length of a whole transfer.
///
/// # Errors
///
/// Returns an error if the TLS backend cannot be initialised.
pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(timeout)
        .read_timeout(timeout)
        .pool_idle_timeout(Duration::from_secs(60))
        .tcp_keepalive(Duration::from_secs(30))
        .build()
        .map_err(Error::from)
}
