//! Subscription service catalog operations

use rusqlite::{params, OptionalExtension, Row};
use tracing::info;

use super::Database;
use crate::error::{Error, Result};
use crate::models::{NewSubscriptionService, ServiceCategory, SubscriptionService};
use crate::palette;

use ServiceCategory::*;

/// Catalog seeded by `init`: (name, slug, domain, category)
const DEFAULT_SERVICES: &[(&str, &str, &str, ServiceCategory)] = &[
    ("Netflix", "netflix", "netflix.com", Streaming),
    ("Hulu", "hulu", "hulu.com", Streaming),
    ("Disney+", "disney-plus", "disneyplus.com", Streaming),
    ("HBO Max", "hbo-max", "max.com", Streaming),
    ("Amazon Prime", "amazon-prime", "amazon.com", Streaming),
    ("YouTube Premium", "youtube-premium", "youtube.com", Streaming),
    ("Apple TV+", "apple-tv-plus", "tv.apple.com", Streaming),
    ("Twitch", "twitch", "twitch.tv", Streaming),
    ("Crunchyroll", "crunchyroll", "crunchyroll.com", Streaming),
    ("Spotify", "spotify", "spotify.com", Music),
    ("Apple Music", "apple-music", "music.apple.com", Music),
    ("Tidal", "tidal", "tidal.com", Music),
    ("Adobe Creative Cloud", "adobe-creative-cloud", "adobe.com", Software),
    ("Microsoft 365", "microsoft-365", "microsoft.com", Software),
    ("Slack", "slack", "slack.com", Software),
    ("Notion", "notion", "notion.so", Software),
    ("Figma", "figma", "figma.com", Software),
    ("GitHub", "github", "github.com", Software),
    ("Linear", "linear", "linear.app", Software),
    ("ChatGPT", "chatgpt", "openai.com", Software),
    ("Claude", "claude", "anthropic.com", Software),
    ("Midjourney", "midjourney", "midjourney.com", Software),
    ("Zoom", "zoom", "zoom.us", Software),
    ("Canva", "canva", "canva.com", Software),
    ("Grammarly", "grammarly", "grammarly.com", Software),
    ("Squarespace", "squarespace", "squarespace.com", Software),
    ("PlayStation Plus", "playstation-plus", "playstation.com", Gaming),
    ("Xbox Game Pass", "xbox-game-pass", "xbox.com", Gaming),
    ("Nintendo Switch Online", "nintendo-switch-online", "nintendo.com", Gaming),
    ("Discord Nitro", "discord-nitro", "discord.com", Gaming),
    ("The New York Times", "new-york-times", "nytimes.com", News),
    ("Medium", "medium", "medium.com", News),
    ("Substack", "substack", "substack.com", News),
    ("Patreon", "patreon", "patreon.com", News),
    ("Peloton", "peloton", "onepeloton.com", Fitness),
    ("Strava", "strava", "strava.com", Fitness),
    ("Headspace", "headspace", "headspace.com", Fitness),
    ("Calm", "calm", "calm.com", Fitness),
    ("iCloud", "icloud", "icloud.com", Storage),
    ("Google One", "google-one", "one.google.com", Storage),
    ("Dropbox", "dropbox", "dropbox.com", Storage),
    ("AWS", "aws", "aws.amazon.com", Cloud),
    ("DigitalOcean", "digitalocean", "digitalocean.com", Cloud),
    ("Cloudflare", "cloudflare", "cloudflare.com", Cloud),
    ("Vercel", "vercel", "vercel.com", Cloud),
    ("Heroku", "heroku", "heroku.com", Cloud),
    ("1Password", "1password", "1password.com", Utilities),
    ("LastPass", "lastpass", "lastpass.com", Utilities),
    ("NordVPN", "nordvpn", "nordvpn.com", Utilities),
    ("ExpressVPN", "expressvpn", "expressvpn.com", Utilities),
    ("Surfshark", "surfshark", "surfshark.com", Utilities),
    ("Duolingo", "duolingo", "duolingo.com", Education),
    ("Audible", "audible", "audible.com", Education),
    ("Kindle Unlimited", "kindle-unlimited", "amazon.com", Education),
    ("Skillshare", "skillshare", "skillshare.com", Education),
    ("MasterClass", "masterclass", "masterclass.com", Education),
    ("Udemy", "udemy", "udemy.com", Education),
    ("Coursera", "coursera", "coursera.org", Education),
];

const SERVICE_COLUMNS: &str =
    "id, name, slug, domain, category, color, icon IS NOT NULL";

fn row_to_service(row: &Row) -> rusqlite::Result<SubscriptionService> {
    let category: Option<String> = row.get(4)?;
    Ok(SubscriptionService {
        id: row.get(0)?,
        name: row.get(1)?,
        slug: row.get(2)?,
        domain: row.get(3)?,
        category: category.as_deref().and_then(ServiceCategory::parse),
        color: row.get(5)?,
        icon_cached: row.get(6)?,
    })
}

impl Database {
    /// Add a service to the catalog
    pub fn insert_service(&self, service: &NewSubscriptionService) -> Result<i64> {
        let name = service.name.trim();
        let slug = service.slug.trim();
        let domain = service.domain.trim();
        if name.is_empty() || slug.is_empty() || domain.is_empty() {
            return Err(Error::Validation(
                "service name, slug and domain are required".to_string(),
            ));
        }

        let color = service
            .color
            .clone()
            .unwrap_or_else(|| palette::color_for(slug).to_string());

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO subscription_services (name, slug, domain, category, color) VALUES (?, ?, ?, ?, ?)",
            params![name, slug, domain, service.category.map(|c| c.as_str()), color],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Insert the default catalog, skipping slugs that already exist
    pub fn seed_default_services(&self) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO subscription_services (name, slug, domain, category, color) VALUES (?, ?, ?, ?, ?)",
            )?;
            for (name, slug, domain, category) in DEFAULT_SERVICES {
                inserted += stmt.execute(params![
                    name,
                    slug,
                    domain,
                    category.as_str(),
                    palette::color_for(slug)
                ])?;
            }
        }
        tx.commit()?;

        if inserted > 0 {
            info!("Seeded {} subscription services", inserted);
        }
        Ok(inserted)
    }

    /// Catalog in insertion order (the order matching ties break on)
    pub fn list_services(&self, category: Option<ServiceCategory>) -> Result<Vec<SubscriptionService>> {
        let conn = self.conn()?;
        let services = match category {
            Some(category) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM subscription_services WHERE category = ? ORDER BY id",
                    SERVICE_COLUMNS
                ))?;
                let rows = stmt.query_map(params![category.as_str()], row_to_service)?;
                rows.collect::<std::result::Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM subscription_services ORDER BY id",
                    SERVICE_COLUMNS
                ))?;
                let rows = stmt.query_map([], row_to_service)?;
                rows.collect::<std::result::Result<Vec<_>, _>>()?
            }
        };
        Ok(services)
    }

    /// Case-insensitive name search, alphabetical
    pub fn search_services(&self, query: &str) -> Result<Vec<SubscriptionService>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM subscription_services WHERE LOWER(name) LIKE ? ORDER BY name",
            SERVICE_COLUMNS
        ))?;
        let pattern = format!("%{}%", query.trim().to_lowercase());
        let services = stmt
            .query_map(params![pattern], row_to_service)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(services)
    }

    pub fn get_service(&self, id: i64) -> Result<Option<SubscriptionService>> {
        let conn = self.conn()?;
        let service = conn
            .query_row(
                &format!("SELECT {} FROM subscription_services WHERE id = ?", SERVICE_COLUMNS),
                params![id],
                row_to_service,
            )
            .optional()?;
        Ok(service)
    }

    pub fn get_service_by_slug(&self, slug: &str) -> Result<Option<SubscriptionService>> {
        let conn = self.conn()?;
        let service = conn
            .query_row(
                &format!("SELECT {} FROM subscription_services WHERE slug = ?", SERVICE_COLUMNS),
                params![slug],
                row_to_service,
            )
            .optional()?;
        Ok(service)
    }

    /// Cache a downloaded icon
    pub fn store_service_icon(&self, id: i64, bytes: &[u8], content_type: &str) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE subscription_services SET icon = ?, icon_content_type = ? WHERE id = ?",
            params![bytes, content_type, id],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("subscription service {}", id)));
        }
        Ok(())
    }

    /// Cached icon bytes and content type
    pub fn get_service_icon(&self, id: i64) -> Result<Option<(Vec<u8>, String)>> {
        let conn = self.conn()?;
        let icon = conn
            .query_row(
                "SELECT icon, COALESCE(icon_content_type, 'image/png') FROM subscription_services WHERE id = ? AND icon IS NOT NULL",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(icon)
    }
}
