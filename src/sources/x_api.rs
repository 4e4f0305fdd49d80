//! X (Twitter) Source
//!
//! Recent search through the official X API v2:
//! https://developer.x.com/en/docs/x-api/tweets/search/api-reference/get-tweets-search-recent
//!
//! Authors arrive in `includes.users` and are joined to tweets by `author_id`.
//! The fallback repeats the search with a reduced field set and no time window.

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

use super::{
    clean, endpoint, require_credential, require_query, SourceAdapter, SourceMetadata, SourcePage,
};
use crate::error::AdapterError;
use crate::http_client::SourceHttpClient;
use crate::identity::synthesize_id;
use crate::schemas::{
    ResultDetails, SearchRequest, SearchResult, SourceCategory, SourceId, SourceInfo,
    TweetDetails, TweetMetrics,
};

const SEARCH_PATH: &str = "/2/tweets/search/recent";
/// X rejects `max_results` outside this range
const MIN_RESULTS: u32 = 10;
const MAX_RESULTS: u32 = 100;
const TITLE_CHARS: usize = 100;

// ============================================
// WIRE MODEL
// ============================================

#[derive(Debug, Deserialize)]
struct XSearchResponse {
    #[serde(default)]
    data: Vec<XTweet>,
    includes: Option<XIncludes>,
    meta: Option<XMeta>,
}

#[derive(Debug, Deserialize)]
struct XTweet {
    id: String,
    text: String,
    created_at: Option<String>,
    author_id: Option<String>,
    public_metrics: Option<XPublicMetrics>,
}

#[derive(Debug, Default, Deserialize)]
struct XPublicMetrics {
    #[serde(default)]
    retweet_count: u64,
    #[serde(default)]
    reply_count: u64,
    #[serde(default)]
    like_count: u64,
    impression_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct XIncludes {
    #[serde(default)]
    users: Vec<XUser>,
}

#[derive(Debug, Deserialize)]
struct XUser {
    id: String,
    name: Option<String>,
    username: Option<String>,
    profile_image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct XMeta {
    result_count: Option<u64>,
}

/// Field selection sent with a search
struct FieldSet {
    tweet_fields: &'static str,
    user_fields: &'static str,
}

const FULL_FIELDS: FieldSet = FieldSet {
    tweet_fields: "created_at,public_metrics,author_id,lang",
    user_fields: "name,username,profile_image_url,verified",
};

const REDUCED_FIELDS: FieldSet = FieldSet {
    tweet_fields: "created_at,public_metrics,author_id",
    user_fields: "name,username,profile_image_url",
};

fn search_query(query: &str, language: Option<&str>) -> String {
    match language {
        Some(lang) => format!("{} lang:{}", query, lang),
        None => query.to_string(),
    }
}

fn max_results(page_size: u32) -> u32 {
    page_size.clamp(MIN_RESULTS, MAX_RESULTS)
}

fn title_of(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(TITLE_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

fn map_tweets(response: XSearchResponse) -> SourcePage {
    let users: HashMap<String, XUser> = response
        .includes
        .map(|i| i.users)
        .unwrap_or_default()
        .into_iter()
        .map(|u| (u.id.clone(), u))
        .collect();

    let total = response.meta.and_then(|m| m.result_count);

    let items: Vec<SearchResult> = response
        .data
        .into_iter()
        .enumerate()
        .map(|(index, tweet)| {
            let user = tweet.author_id.as_ref().and_then(|id| users.get(id));
            let handle = user.and_then(|u| clean(u.username.clone()));
            let url = match &handle {
                Some(h) => format!("https://x.com/{}/status/{}", h, tweet.id),
                None => format!("https://x.com/i/web/status/{}", tweet.id),
            };
            let metrics = tweet.public_metrics.map(|m| TweetMetrics {
                likes: m.like_count,
                retweets: m.retweet_count,
                replies: m.reply_count,
                views: m.impression_count,
            });

            SearchResult::new(
                synthesize_id(SourceId::TWITTER, Some(&tweet.id), &url, &tweet.text, index),
                title_of(&tweet.text),
                url,
                SourceInfo::new("X", "https://x.com"),
                ResultDetails::Tweet(TweetDetails {
                    tweet_id: tweet.id.clone(),
                    author_name: user.and_then(|u| clean(u.name.clone())),
                    author_handle: handle,
                    author_profile_image_url: user.and_then(|u| clean(u.profile_image_url.clone())),
                    metrics,
                }),
            )
            .with_description(Some(tweet.text))
            .with_date(tweet.created_at)
            .with_source_id(SourceId::from(SourceId::TWITTER))
        })
        .collect();

    SourcePage::new(items, total)
}

fn metadata(name: &str) -> SourceMetadata {
    SourceMetadata {
        id: SourceId::from(SourceId::TWITTER),
        name: name.to_string(),
        description: "Recent posts on X (last 7 days)".to_string(),
        category: SourceCategory::Social,
        homepage: "https://x.com".to_string(),
        supports_pagination: false,
    }
}

/// Shared request path of both X adapters
async fn search_recent(
    http: &SourceHttpClient,
    base_url: &str,
    bearer_token: &str,
    params: Vec<(&'static str, String)>,
) -> Result<SourcePage, AdapterError> {
    let url = endpoint(base_url, SEARCH_PATH);
    let builder = http.get(&url).query(&params).bearer_auth(bearer_token);
    let response: XSearchResponse = http.get_json(builder).await?;
    Ok(map_tweets(response))
}

fn core_params(request: &SearchRequest, query: &str, fields: &FieldSet) -> Vec<(&'static str, String)> {
    vec![
        ("query", search_query(query, request.language.as_deref())),
        ("max_results", max_results(request.page_size).to_string()),
        ("tweet.fields", fields.tweet_fields.to_string()),
        ("user.fields", fields.user_fields.to_string()),
        ("expansions", "author_id".to_string()),
    ]
}

/// `start_time`/`end_time` for the requested date range
///
/// `end_time` is only sent for ranges that closed before today, since X
/// rejects end times that are not in the past.
fn time_window(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Vec<(&'static str, String)> {
    let mut params = Vec::new();
    if let Some(from) = from.and_then(|d| d.and_hms_opt(0, 0, 0)) {
        params.push(("start_time", format!("{}Z", from.format("%Y-%m-%dT%H:%M:%S"))));
    }
    if let Some(to) = to {
        let today = Utc::now().date_naive();
        if to < today {
            if let Some(end) = (to + Duration::days(1)).and_hms_opt(0, 0, 0) {
                params.push(("end_time", format!("{}Z", end.format("%Y-%m-%dT%H:%M:%S"))));
            }
        }
    }
    params
}

// ============================================
// PRIMARY
// ============================================

pub struct XApiAdapter {
    http: SourceHttpClient,
    base_url: String,
    bearer_token: Option<String>,
    metadata: SourceMetadata,
}

impl XApiAdapter {
    pub fn new(http: SourceHttpClient, base_url: impl Into<String>, bearer_token: Option<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            bearer_token,
            metadata: metadata("X (Twitter)"),
        }
    }
}

#[async_trait]
impl SourceAdapter for XApiAdapter {
    fn metadata(&self) -> &SourceMetadata {
        &self.metadata
    }

    fn is_configured(&self) -> bool {
        self.bearer_token.is_some()
    }

    async fn fetch(&self, request: &SearchRequest) -> Result<SourcePage, AdapterError> {
        let query = require_query(request, SourceId::TWITTER)?;
        let token = require_credential(&self.bearer_token, "TWITTER_BEARER_TOKEN")?;

        let mut params = core_params(request, query, &FULL_FIELDS);
        params.extend(time_window(request.date_from, request.date_to));

        debug!(source = SourceId::TWITTER, "Searching recent posts");
        search_recent(&self.http, &self.base_url, token, params).await
    }
}

// ============================================
// FALLBACK
// ============================================

pub struct XApiFallbackAdapter {
    http: SourceHttpClient,
    base_url: String,
    bearer_token: Option<String>,
    metadata: SourceMetadata,
}

impl XApiFallbackAdapter {
    pub fn new(http: SourceHttpClient, base_url: impl Into<String>, bearer_token: Option<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            bearer_token,
            metadata: metadata("X (Twitter, reduced)"),
        }
    }
}

#[async_trait]
impl SourceAdapter for XApiFallbackAdapter {
    fn metadata(&self) -> &SourceMetadata {
        &self.metadata
    }

    fn is_configured(&self) -> bool {
        self.bearer_token.is_some()
    }

    async fn fetch(&self, request: &SearchRequest) -> Result<SourcePage, AdapterError> {
        let query = require_query(request, SourceId::TWITTER)?;
        let token = require_credential(&self.bearer_token, "TWITTER_BEARER_TOKEN")?;

        let params = core_params(request, query, &REDUCED_FIELDS);
        search_recent(&self.http, &self.base_url, token, params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schemas::ResultType;

    #[test]
    fn test_search_query_language_operator() {
        assert_eq!(search_query("wybory", Some("pl")), "wybory lang:pl");
        assert_eq!(search_query("wybory", None), "wybory");
    }

    #[test]
    fn test_max_results_clamped() {
        assert_eq!(max_results(5), 10);
        assert_eq!(max_results(50), 50);
        assert_eq!(max_results(500), 100);
    }

    #[test]
    fn test_title_truncation_is_char_safe() {
        let text = "ż".repeat(150);
        let title = title_of(&text);
        assert_eq!(title.chars().count(), TITLE_CHARS + 3);
        assert_eq!(title_of("krótki"), "krótki");
    }

    #[test]
    fn test_time_window() {
        let from = NaiveDate::from_ymd_opt(2024, 1, 1);
        let to = NaiveDate::from_ymd_opt(2024, 1, 2);
        let params = time_window(from, to);
        assert_eq!(params[0], ("start_time", "2024-01-01T00:00:00Z".to_string()));
        assert_eq!(params[1], ("end_time", "2024-01-03T00:00:00Z".to_string()));

        let future = Utc::now().date_naive() + Duration::days(3);
        assert!(time_window(None, Some(future)).is_empty());
    }

    #[test]
    fn test_maps_tweets_with_users() {
        let response: XSearchResponse = serde_json::from_value(serde_json::json!({
            "data": [
                {
                    "id": "1790000000000000001",
                    "text": "Debata o wyborach",
                    "created_at": "2024-05-01T12:00:00.000Z",
                    "author_id": "42",
                    "public_metrics": {"retweet_count": 3, "reply_count": 1, "like_count": 10, "quote_count": 0, "impression_count": 900}
                },
                {
                    "id": "1790000000000000002",
                    "text": "Anonymous",
                    "author_id": "7"
                }
            ],
            "includes": {"users": [{"id": "42", "name": "Anna", "username": "anna_pl", "profile_image_url": "https://pbs.twimg.com/a.jpg"}]},
            "meta": {"result_count": 2}
        }))
        .unwrap();

        let page = map_tweets(response);
        assert_eq!(page.total_results, 2);
        let first = &page.items[0];
        assert_eq!(first.result_type(), ResultType::Tweet);
        assert_eq!(first.id, "twitter-1790000000000000001-0");
        assert_eq!(first.url, "https://x.com/anna_pl/status/1790000000000000001");
        match &first.details {
            ResultDetails::Tweet(t) => {
                assert_eq!(t.author_handle.as_deref(), Some("anna_pl"));
                let metrics = t.metrics.as_ref().unwrap();
                assert_eq!(metrics.likes, 10);
                assert_eq!(metrics.views, Some(900));
            }
            other => panic!("unexpected details: {:?}", other),
        }

        let second = &page.items[1];
        assert_eq!(second.url, "https://x.com/i/web/status/1790000000000000002");
        assert!(second.date.is_none());
    }

    #[test]
    fn test_empty_search() {
        let response: XSearchResponse =
            serde_json::from_value(serde_json::json!({"meta": {"result_count": 0}})).unwrap();
        let page = map_tweets(response);
        assert!(page.items.is_empty());
        assert_eq!(page.total_results, 0);
    }
}
