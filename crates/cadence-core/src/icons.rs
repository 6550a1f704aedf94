//! Service icon caching
//!
//! Icons are downloaded once per catalog service after a suggestion for it is
//! approved. Failures are logged and never surface to the caller.

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

use crate::config::IconsConfig;
use crate::db::Database;
use crate::error::Result;
use crate::models::SubscriptionService;

/// Downloaded icon bytes and their content type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Icon {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Remote source of service icons
#[async_trait]
pub trait IconSource: Send + Sync {
    /// Fetch the icon for a domain. `Ok(None)` when the source has nothing.
    async fn fetch_icon(&self, domain: &str) -> Result<Option<Icon>>;
}

/// Brandfetch-style CDN icon source
#[derive(Clone)]
pub struct HttpIconSource {
    http_client: Client,
    config: IconsConfig,
}

impl HttpIconSource {
    pub fn new(config: &IconsConfig) -> Result<Self> {
        let http_client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            http_client,
            config: config.clone(),
        })
    }
}

#[async_trait]
impl IconSource for HttpIconSource {
    async fn fetch_icon(&self, domain: &str) -> Result<Option<Icon>> {
        let Some(url) = self.config.icon_url(domain) else {
            return Ok(None);
        };

        let response = self.http_client.get(&url).send().await?;
        if !response.status().is_success() {
            warn!("Icon request for {} returned {}", domain, response.status());
            return Ok(None);
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/png")
            .to_string();
        let bytes = response.bytes().await?.to_vec();

        Ok(Some(Icon {
            bytes,
            content_type,
        }))
    }
}

/// Download and store a service's icon if it is not cached yet
///
/// Returns true when an icon was stored by this call.
pub async fn cache_service_icon(
    db: &Database,
    source: &dyn IconSource,
    service: &SubscriptionService,
) -> bool {
    if service.icon_cached {
        return false;
    }

    match source.fetch_icon(&service.domain).await {
        Ok(Some(icon)) => match db.store_service_icon(service.id, &icon.bytes, &icon.content_type) {
            Ok(()) => {
                debug!(service = %service.slug, "Cached service icon");
                true
            }
            Err(e) => {
                warn!("Failed to store icon for {}: {}", service.name, e);
                false
            }
        },
        Ok(None) => false,
        Err(e) => {
            warn!("Failed to cache icon for {}: {}", service.name, e);
            false
        }
    }
}
