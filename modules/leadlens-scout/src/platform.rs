//! Per-platform strategy: dataset ids, trigger parameters, and field-mapping
//! tables. One generic pipeline consumes these instead of one pipeline per
//! platform.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{json, Value};

use brightdata_client::TriggerConfig;
use leadlens_common::{Platform, QueuedHandle};

static SNAPCHAT_HANDLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"snapchat\.com/add/([^/?#]+)").unwrap());
static TIKTOK_HANDLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"tiktok\.com/@([\w.\-]+)").unwrap());
static INSTAGRAM_HANDLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"instagram\.com/([^/?#]+)").unwrap());

/// Field-mapping + dataset strategy for one platform. Provider schemas vary
/// per dataset; each logical field carries an ordered fallback list and the
/// extractor takes the first present value.
#[derive(Debug, Clone)]
pub struct PlatformAdapter {
    pub platform: Platform,
    pub search_dataset_id: String,
    pub profile_dataset_id: String,
    pub handle_fields: &'static [&'static str],
    pub bio_fields: &'static [&'static str],
    pub display_name_fields: &'static [&'static str],
    pub followers_fields: &'static [&'static str],
    pub post_id_fields: &'static [&'static str],
    pub profile_url_fields: &'static [&'static str],
}

fn env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

impl PlatformAdapter {
    pub fn for_platform(platform: Platform) -> Self {
        match platform {
            Platform::Instagram => Self {
                platform,
                search_dataset_id: env_or_default(
                    "INSTAGRAM_SEARCH_DATASET_ID",
                    "gd_l1vikfch901nx3by4",
                ),
                profile_dataset_id: env_or_default(
                    "INSTAGRAM_PROFILE_DATASET_ID",
                    "gd_l1vikfnt1wgvvqz95w",
                ),
                handle_fields: &["account", "profile_username", "username", "user_name"],
                bio_fields: &["biography", "bio", "description"],
                display_name_fields: &["full_name", "profile_name", "display_name"],
                followers_fields: &["followers", "followers_count"],
                post_id_fields: &["post_id", "shortcode", "id"],
                profile_url_fields: &["profile_url", "url", "profile_image_link"],
            },
            Platform::TikTok => Self {
                platform,
                search_dataset_id: env_or_default(
                    "TIKTOK_SEARCH_DATASET_ID",
                    "gd_lu702nij2f790tmv9h",
                ),
                profile_dataset_id: env_or_default(
                    "TIKTOK_PROFILE_DATASET_ID",
                    "gd_l1villgoiiidt09ci",
                ),
                handle_fields: &["profile_username", "username", "account", "unique_id"],
                bio_fields: &["profile_biography", "biography", "bio", "description"],
                display_name_fields: &["nickname", "profile_name", "display_name"],
                followers_fields: &["profile_followers", "followers", "followers_count"],
                post_id_fields: &["post_id", "video_id", "id"],
                profile_url_fields: &["profile_url", "url"],
            },
            Platform::Snapchat => Self {
                platform,
                search_dataset_id: env_or_default(
                    "SNAPCHAT_POST_DATASET_ID",
                    "gd_ma0ydx431w6stl16ge",
                ),
                profile_dataset_id: env_or_default(
                    "SNAPCHAT_PROFILE_DATASET_ID",
                    "gd_maxv8l0y12r9y28uus",
                ),
                handle_fields: &["profile_handle", "username", "account"],
                bio_fields: &["bio", "description"],
                display_name_fields: &["display_name", "profile_name"],
                followers_fields: &["subscriber_count", "followers_count", "followers"],
                post_id_fields: &["post_id", "id"],
                profile_url_fields: &["profile_url", "profile_link", "url"],
            },
        }
    }

    /// Trigger parameters for a keyword-discovery snapshot.
    pub fn search_trigger(&self) -> TriggerConfig {
        let config = TriggerConfig::new(&self.search_dataset_id).with_param("type", "discover_new");
        match self.platform {
            Platform::Instagram => config.with_param("discover_by", "user_name"),
            Platform::TikTok => config.with_param("discover_by", "keyword"),
            Platform::Snapchat => config.with_param("discover_by", "search_url"),
        }
    }

    /// Entity descriptors for a keyword-discovery snapshot.
    pub fn search_entities(&self, keyword: &str) -> Vec<Value> {
        match self.platform {
            Platform::Instagram => {
                vec![json!({ "user_name": keyword.replace(' ', "").to_lowercase() })]
            }
            Platform::TikTok => {
                vec![json!({ "search_keyword": keyword, "country": "US" })]
            }
            Platform::Snapchat => {
                let slug = keyword.replace(' ', "").to_lowercase();
                vec![json!({
                    "url": format!("https://www.snapchat.com/explore/{slug}"),
                    "tab": "Users",
                })]
            }
        }
    }

    /// Trigger parameters for a profile-detail snapshot (direct URLs, no
    /// discovery phase).
    pub fn profile_trigger(&self) -> TriggerConfig {
        TriggerConfig::new(&self.profile_dataset_id)
    }

    /// Entity descriptors for a profile-detail snapshot over queued handles.
    pub fn profile_entities(&self, handles: &[QueuedHandle]) -> Vec<Value> {
        handles
            .iter()
            .map(|q| match self.platform {
                Platform::Instagram => json!({ "url": q.profile_url }),
                Platform::TikTok => json!({ "url": q.profile_url, "country": "" }),
                Platform::Snapchat => {
                    json!({ "url": q.profile_url, "collect_all_highlights": false })
                }
            })
            .collect()
    }

    /// Canonical profile URL for a handle discovered without a link.
    pub fn profile_url_for(&self, handle: &str) -> String {
        match self.platform {
            Platform::Instagram => format!("https://www.instagram.com/{handle}/"),
            Platform::TikTok => format!("https://www.tiktok.com/@{handle}"),
            Platform::Snapchat => format!("https://www.snapchat.com/add/{handle}"),
        }
    }

    /// Derive a handle from a profile URL. Used as the last fallback when no
    /// handle field is present in the record.
    pub fn handle_from_url(&self, url: &str) -> Option<String> {
        let captures = match self.platform {
            Platform::Snapchat => SNAPCHAT_HANDLE_RE.captures(url),
            Platform::TikTok => TIKTOK_HANDLE_RE.captures(url),
            Platform::Instagram => INSTAGRAM_HANDLE_RE.captures(url),
        }?;
        let handle = captures.get(1)?.as_str().trim_matches('/');
        if handle.is_empty() {
            None
        } else {
            Some(handle.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapchat_handle_from_add_url() {
        let adapter = PlatformAdapter::for_platform(Platform::Snapchat);
        assert_eq!(
            adapter.handle_from_url("https://www.snapchat.com/add/alice?share_id=x"),
            Some("alice".to_string())
        );
        assert_eq!(adapter.handle_from_url("https://www.snapchat.com/explore/nyc"), None);
    }

    #[test]
    fn tiktok_handle_from_at_url() {
        let adapter = PlatformAdapter::for_platform(Platform::TikTok);
        assert_eq!(
            adapter.handle_from_url("https://www.tiktok.com/@kamil_szymczak/video/749"),
            Some("kamil_szymczak".to_string())
        );
    }

    #[test]
    fn instagram_handle_is_first_path_segment() {
        let adapter = PlatformAdapter::for_platform(Platform::Instagram);
        assert_eq!(
            adapter.handle_from_url("https://www.instagram.com/humansofny/"),
            Some("humansofny".to_string())
        );
    }

    #[test]
    fn snapchat_search_entity_uses_explore_url() {
        let adapter = PlatformAdapter::for_platform(Platform::Snapchat);
        let entities = adapter.search_entities("New York City");
        assert_eq!(entities.len(), 1);
        assert_eq!(
            entities[0]["url"],
            "https://www.snapchat.com/explore/newyorkcity"
        );
        assert_eq!(entities[0]["tab"], "Users");
    }

    #[test]
    fn search_trigger_carries_discovery_params() {
        let adapter = PlatformAdapter::for_platform(Platform::TikTok);
        let config = adapter.search_trigger();
        assert!(config
            .params
            .contains(&("discover_by".to_string(), "keyword".to_string())));
        // Profile-detail triggers run the dataset directly, no discovery.
        assert!(adapter.profile_trigger().params.is_empty());
    }
}
