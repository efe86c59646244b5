//! Field extraction: raw provider records to normalized profiles and posts.
//!
//! Everything here is a pure function over `serde_json::Value`. A record with
//! no derivable natural key yields `None`, never a null-keyed entity.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;
use serde_json::Value;

use leadlens_common::{Post, Profile};

use crate::platform::PlatformAdapter;

/// Permissive RFC-lite email pattern, matching the provider-agnostic scan the
/// collector has always used.
static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").unwrap()
});

/// Phrases that tend to precede a location token in a bio.
const LOCATION_INDICATORS: &[&str] = &[
    "based in",
    "located in",
    "from",
    "living in",
    "📍",
    "🏠",
    "city:",
    "location:",
    "area:",
    "based:",
    "🏙️",
];

const VERIFIED_FIELDS: &[&str] = &["is_verified", "verified"];
const AVATAR_FIELDS: &[&str] = &["avatar_url", "profile_avatar", "profile_image_link", "avatar"];
const TITLE_FIELDS: &[&str] = &["title"];
const DESCRIPTION_FIELDS: &[&str] = &["description", "text", "caption"];
const COMMENT_FIELDS: &[&str] = &["num_comments", "comment_count", "comments_count", "comments"];
const SHARE_FIELDS: &[&str] = &["num_shares", "share_count", "shares_count", "shares"];
const VIEW_FIELDS: &[&str] = &["num_views", "play_count", "views_count", "views"];
const LIKE_FIELDS: &[&str] = &["digg_count", "likes_count", "like_count", "likes"];
const VIDEO_URL_FIELDS: &[&str] = &["video_url", "web_video_url"];
const THUMBNAIL_FIELDS: &[&str] = &["thumbnail_url", "display_url", "thumbnail"];
const POST_URL_FIELDS: &[&str] = &["profile_link", "profile_url"];

/// Extract the set of email addresses found in free text. Order-insensitive,
/// deduplicated, idempotent.
pub fn extract_emails(text: &str) -> Vec<String> {
    let set: BTreeSet<String> = EMAIL_RE
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect();
    set.into_iter().collect()
}

/// Mine candidate search keywords from a bio.
///
/// Two heuristics, unioned: (a) the token following a location indicator,
/// title-cased; (b) any capitalized word that is not a URL or mention. Both
/// are stripped to ASCII letters and kept only when longer than two chars.
pub fn mine_keywords(bio: &str) -> BTreeSet<String> {
    let mut keywords = BTreeSet::new();
    let bio_lower = bio.to_lowercase();

    for indicator in LOCATION_INDICATORS {
        if let Some(idx) = bio_lower.find(indicator) {
            let rest = &bio_lower[idx + indicator.len()..];
            if let Some(next_word) = rest.split_whitespace().next() {
                let cleaned = title_case(&clean_token(next_word));
                if cleaned.len() > 2 {
                    keywords.insert(cleaned);
                }
            }
        }
    }

    for word in bio.split_whitespace() {
        if word.len() > 2
            && word.chars().next().is_some_and(|c| c.is_uppercase())
            && !word.starts_with("http")
            && !word.starts_with("www")
            && !word.starts_with('@')
        {
            let cleaned = clean_token(word);
            if cleaned.len() > 2 {
                keywords.insert(cleaned);
            }
        }
    }

    keywords
}

fn clean_token(token: &str) -> String {
    token.chars().filter(|c| c.is_ascii_alphabetic()).collect()
}

fn title_case(token: &str) -> String {
    let mut chars = token.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(|c| c.to_lowercase())).collect(),
        None => String::new(),
    }
}

/// First present, non-empty string value from an ordered fallback list.
fn first_str<'a>(record: &'a Value, fields: &[&str]) -> Option<&'a str> {
    fields
        .iter()
        .find_map(|f| record.get(f).and_then(Value::as_str).filter(|s| !s.is_empty()))
}

/// Like [`first_str`] but also accepts numeric ids, rendered as strings.
fn first_string_like(record: &Value, fields: &[&str]) -> Option<String> {
    fields.iter().find_map(|f| match record.get(f) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Coerce a follower-like count to an integer. Strings get their non-digit
/// characters stripped first ("1,234" → 1234); still-unparseable values are
/// discarded rather than stored as zero.
pub fn coerce_count(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => {
            let digits: String = s.chars().filter(|c| c.is_ascii_digit()).collect();
            if digits.is_empty() {
                None
            } else {
                digits.parse().ok()
            }
        }
        _ => None,
    }
}

fn first_count(record: &Value, fields: &[&str]) -> Option<i64> {
    fields.iter().find_map(|f| record.get(f).and_then(coerce_count))
}

fn first_bool(record: &Value, fields: &[&str]) -> bool {
    fields
        .iter()
        .find_map(|f| record.get(f).and_then(Value::as_bool))
        .unwrap_or(false)
}

/// Hashtags arrive as plain strings on some datasets and as `{"name": ..}`
/// objects on others.
fn hashtags(record: &Value) -> Vec<String> {
    record
        .get("hashtags")
        .and_then(Value::as_array)
        .map(|tags| {
            tags.iter()
                .filter_map(|t| match t {
                    Value::String(s) => Some(s.clone()),
                    Value::Object(obj) => obj.get("name").and_then(Value::as_str).map(String::from),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

fn derive_handle(adapter: &PlatformAdapter, record: &Value) -> Option<String> {
    if let Some(handle) = first_str(record, adapter.handle_fields) {
        return Some(handle.to_string());
    }
    first_str(record, adapter.profile_url_fields).and_then(|url| adapter.handle_from_url(url))
}

/// Map a raw record to a normalized profile. Returns `None` when no natural
/// key (handle) can be derived.
pub fn extract_profile(
    adapter: &PlatformAdapter,
    record: &Value,
    snapshot_id: &str,
) -> Option<Profile> {
    let handle = derive_handle(adapter, record)?;

    let bio = first_str(record, adapter.bio_fields).map(String::from);
    let bio_text = bio.as_deref().unwrap_or("");
    let emails = extract_emails(bio_text);
    let discovered_keywords: Vec<String> = mine_keywords(bio_text).into_iter().collect();

    Some(Profile {
        platform: adapter.platform,
        handle,
        display_name: first_str(record, adapter.display_name_fields).map(String::from),
        bio,
        emails,
        followers: first_count(record, adapter.followers_fields),
        is_verified: first_bool(record, VERIFIED_FIELDS),
        profile_url: first_str(record, adapter.profile_url_fields).map(String::from),
        avatar_url: first_str(record, AVATAR_FIELDS).map(String::from),
        discovered_keywords,
        snapshot_id: snapshot_id.to_string(),
        extracted_at: Utc::now(),
    })
}

/// Map a raw record to a normalized post. Returns `None` when no post id can
/// be derived.
pub fn extract_post(adapter: &PlatformAdapter, record: &Value, snapshot_id: &str) -> Option<Post> {
    let post_id = first_string_like(record, adapter.post_id_fields)?;

    Some(Post {
        platform: adapter.platform,
        post_id,
        handle: derive_handle(adapter, record),
        title: first_str(record, TITLE_FIELDS).map(String::from),
        description: first_str(record, DESCRIPTION_FIELDS).map(String::from),
        comments: first_count(record, COMMENT_FIELDS),
        shares: first_count(record, SHARE_FIELDS),
        views: first_count(record, VIEW_FIELDS),
        likes: first_count(record, LIKE_FIELDS),
        video_url: first_str(record, VIDEO_URL_FIELDS).map(String::from),
        thumbnail_url: first_str(record, THUMBNAIL_FIELDS).map(String::from),
        hashtags: hashtags(record),
        snapshot_id: snapshot_id.to_string(),
        extracted_at: Utc::now(),
    })
}

/// The profile link attached to a post record, when the provider includes one.
pub fn post_profile_link(record: &Value) -> Option<String> {
    first_str(record, POST_URL_FIELDS).map(String::from)
}
