//! Integration Tests for Search Aggregation
//!
//! Uses wiremock to stand in for every upstream provider. The registry is
//! built from `Config` exactly as the binary builds it, with all base URLs
//! pointed at the mock server and a fast retry schedule.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use wygrzeb_search::http_client::ResilientHttpClient;
use wygrzeb_search::schemas::{ResultType, SortBy, SortOrder, SourceId};
use wygrzeb_search::{Aggregator, Config, RawSearchRequest, SearchRequest, SourceRegistry};

const SDG_CONTENTS: &str = "/repos/statisticspoland/sdg-indicators-pl/contents/api/v1";

fn test_config(server: &MockServer) -> Config {
    let uri = server.uri();
    Config {
        newsapi_base_url: uri.clone(),
        google_news_base_url: uri.clone(),
        serpapi_base_url: uri.clone(),
        fact_check_base_url: uri.clone(),
        twitter_base_url: uri.clone(),
        dane_gov_base_url: uri.clone(),
        stat_gov_base_url: uri.clone(),
        sdg_base_url: uri,
        news_api_key: Some("news-key".to_string()),
        twitter_bearer_token: Some("bearer".to_string()),
        max_retries: 2,
        retry_base_delay_ms: 1,
        retry_max_delay_ms: 5,
        source_timeout_ms: 2_000,
        // three timed-out attempts plus backoff fit before the deadline
        source_deadline_ms: 10_000,
        ..Config::default()
    }
}

fn aggregator(config: &Config) -> Aggregator {
    let client = Arc::new(ResilientHttpClient::new(config.http_client_config()).unwrap());
    let registry = SourceRegistry::from_config(config, client);
    Aggregator::new(Arc::new(registry), config.retry_policy())
}

fn articles(count: usize) -> serde_json::Value {
    let items: Vec<serde_json::Value> = (1..=count)
        .map(|i| {
            json!({
                "source": {"name": "Rzeczpospolita"},
                "author": "Redakcja",
                "title": format!("Artykuł {}", i),
                "description": "Opis",
                "url": format!("https://www.rp.pl/kraj/art{}", i),
                "urlToImage": null,
                "publishedAt": format!("2024-03-{:02}T10:00:00Z", i)
            })
        })
        .collect();
    json!({"status": "ok", "totalResults": count, "articles": items})
}

fn datasets(count: usize) -> serde_json::Value {
    let items: Vec<serde_json::Value> = (1..=count)
        .map(|i| {
            json!({
                "id": 100 + i,
                "attributes": {
                    "title": format!("Zbiór {}", i),
                    "notes": "Dane otwarte",
                    "modified": "2024-01-15T08:00:00Z",
                    "formats": ["CSV"]
                }
            })
        })
        .collect();
    json!({"data": items, "meta": {"count": count}})
}

#[tokio::test]
async fn test_partial_failure_keeps_other_sources() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2/everything"))
        .and(query_param("apiKey", "news-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(articles(5)))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/1.4/datasets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(datasets(3)))
        .expect(1)
        .mount(&server)
        .await;

    // three primary attempts plus one fallback call
    Mock::given(method("GET"))
        .and(path("/2/tweets/search/recent"))
        .respond_with(ResponseTemplate::new(503).set_body_string("over capacity"))
        .expect(4)
        .mount(&server)
        .await;

    let config = test_config(&server);
    let request = SearchRequest::new("wybory").with_sources(["newsapi", "dane-gov-pl", "twitter"]);

    let response = aggregator(&config).search(&request).await;

    assert_eq!(response.results.len(), 8);
    assert_eq!(response.total_results, 8);
    assert!(!response.has_more);
    assert_eq!(response.failed_sources, vec![SourceId::from("twitter")]);

    let news = response
        .results
        .iter()
        .filter(|r| r.result_type() == ResultType::News)
        .count();
    let datasets = response
        .results
        .iter()
        .filter(|r| r.result_type() == ResultType::Dataset)
        .count();
    assert_eq!((news, datasets), (5, 3));
}

#[tokio::test]
async fn test_fallback_used_after_primary_exhausted() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2/everything"))
        .and(query_param("apiKey", "news-key"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v2/everything"))
        .and(header("X-Api-Key", "news-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(articles(2)))
        .expect(1)
        .mount(&server)
        .await;

    let config = test_config(&server);
    let request = SearchRequest::new("sejm").with_source("newsapi");

    let response = aggregator(&config).search(&request).await;

    assert_eq!(response.results.len(), 2);
    assert!(response.failed_sources.is_empty());
    assert!(response
        .results
        .iter()
        .all(|r| r.source_id == Some(SourceId::from("newsapi"))));
}

#[tokio::test]
async fn test_fallback_used_after_primary_timeouts() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2/everything"))
        .and(query_param("apiKey", "news-key"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(articles(5))
                .set_delay(Duration::from_secs(3)),
        )
        .expect(3)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v2/everything"))
        .and(header("X-Api-Key", "news-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(articles(2)))
        .expect(1)
        .mount(&server)
        .await;

    let config = Config {
        source_timeout_ms: 300,
        source_deadline_ms: 2_000,
        ..test_config(&server)
    };
    assert!(config.validate().is_ok());
    let request = SearchRequest::new("sejm").with_source("newsapi");

    let response = aggregator(&config).search(&request).await;

    assert_eq!(response.results.len(), 2);
    assert!(response.failed_sources.is_empty());
}

#[tokio::test]
async fn test_auth_error_is_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2/everything"))
        .and(query_param("apiKey", "news-key"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "status": "error",
            "code": "apiKeyInvalid",
            "message": "Your API key is invalid"
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v2/everything"))
        .and(header("X-Api-Key", "news-key"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let config = test_config(&server);
    let request = SearchRequest::new("sejm").with_source("newsapi");

    let response = aggregator(&config).search(&request).await;

    assert!(response.results.is_empty());
    assert_eq!(response.failed_sources, vec![SourceId::from("newsapi")]);
}

#[tokio::test]
async fn test_missing_credentials_make_no_request() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(articles(1)))
        .expect(0)
        .mount(&server)
        .await;

    let config = Config {
        news_api_key: None,
        google_fact_check_api_key: None,
        ..test_config(&server)
    };
    let request = SearchRequest::new("sejm").with_sources(["newsapi", "google-fact-check"]);

    let response = aggregator(&config).search(&request).await;

    assert!(response.results.is_empty());
    assert_eq!(
        response.failed_sources,
        vec![SourceId::from("newsapi"), SourceId::from("google-fact-check")]
    );
}

#[tokio::test]
async fn test_blank_query_contacts_nobody() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let config = test_config(&server);
    let response = aggregator(&config).search(&SearchRequest::new("  ")).await;

    assert!(response.results.is_empty());
    assert_eq!(response.total_results, 0);
    assert!(response.failed_sources.is_empty());
}

#[tokio::test]
async fn test_second_page_of_merged_results() {
    let server = MockServer::start().await;

    // page 2 of 5 needs the first ten items from the source
    Mock::given(method("GET"))
        .and(path("/v2/everything"))
        .and(query_param("page", "1"))
        .and(query_param("pageSize", "10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(articles(8)))
        .expect(1)
        .mount(&server)
        .await;

    let config = test_config(&server);
    let request = SearchRequest::new("sejm")
        .with_source("newsapi")
        .with_page(2, 5);

    let response = aggregator(&config).search(&request).await;

    let titles: Vec<&str> = response.results.iter().map(|r| r.title.as_str()).collect();
    assert_eq!(titles, vec!["Artykuł 6", "Artykuł 7", "Artykuł 8"]);
    assert_eq!(response.page, 2);
    assert_eq!(response.page_size, 5);
    assert!(!response.has_more);
}

#[tokio::test]
async fn test_undated_results_keep_unique_ids() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2/everything"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "ok",
            "totalResults": 2,
            "articles": [
                {"source": {"name": "PAP"}, "title": "Bez daty", "url": "https://pap.pl/a"},
                {"source": {"name": "PAP"}, "title": "Z datą", "url": "https://pap.pl/b",
                 "publishedAt": "2024-05-01T12:00:00Z"}
            ]
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/1.4/datasets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": 7, "attributes": {"title": "Bez daty"}}],
            "meta": {"count": 1}
        })))
        .mount(&server)
        .await;

    let config = test_config(&server);
    let request = SearchRequest::new("dane")
        .with_sources(["newsapi", "dane-gov-pl"])
        .with_sort(SortBy::Date, SortOrder::Desc);

    let response = aggregator(&config).search(&request).await;

    assert_eq!(response.results.len(), 3);
    let ids: HashSet<&str> = response.results.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids.len(), 3);

    // undated items sort as the oldest, in their merged order
    assert_eq!(response.results[0].title, "Z datą");
    assert_eq!(response.results[1].source_id, Some(SourceId::from("newsapi")));
    assert_eq!(response.results[2].source_id, Some(SourceId::from("dane-gov-pl")));
}

#[tokio::test]
async fn test_query_string_request_flow() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/1.4/datasets"))
        .and(query_param("q", "budżet gminy"))
        .and(query_param("lang", "en"))
        .respond_with(ResponseTemplate::new(200).set_body_json(datasets(2)))
        .expect(1)
        .mount(&server)
        .await;

    let config = test_config(&server);
    let raw = RawSearchRequest::from_query_string(
        "query=bud%C5%BCet+gminy&language=en&pageSize=2&enabledSources=dane-gov-pl,bing",
    )
    .unwrap();

    let response = aggregator(&config).search_raw(raw).await.unwrap();

    assert_eq!(response.results.len(), 2);
    assert_eq!(response.page_size, 2);
    assert_eq!(response.failed_sources, vec![SourceId::from("bing")]);
}

#[tokio::test]
async fn test_invalid_query_string_is_rejected() {
    let server = MockServer::start().await;
    let config = test_config(&server);

    let raw = RawSearchRequest::from_query_string("query=sejm&page=0").unwrap();
    assert!(aggregator(&config).search_raw(raw).await.is_err());
}

#[tokio::test]
async fn test_sdg_goal_document() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(format!("{}/globalne/3.json", SDG_CONTENTS)))
        .and(header("Accept", "application/vnd.github.v3.raw"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "3-9-1", "title": "Zanieczyszczenie powietrza", "goal": 3},
            {"id": "3-2-1", "title": "Umieralność dzieci", "goal": 3}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let config = test_config(&server);
    let request = SearchRequest::new("powietrza")
        .with_source("sdg-poland")
        .with_category("3");

    let response = aggregator(&config).search(&request).await;

    assert_eq!(response.results.len(), 1);
    let result = &response.results[0];
    assert_eq!(result.result_type(), ResultType::GovernmentData);
    assert_eq!(result.url, "https://sdg.gov.pl/statistics_glob/3-9-1/");
    assert_eq!(response.total_results, 1);
}

#[tokio::test]
async fn test_github_quota_exhaustion_is_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(format!("{}/globalne/7.json", SDG_CONTENTS)))
        .respond_with(
            ResponseTemplate::new(403)
                .insert_header("x-ratelimit-remaining", "0")
                .set_body_string("API rate limit exceeded"),
        )
        .expect(3)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("{}/globalne_dane.json", SDG_CONTENTS)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "7-1-1", "title": "Dostęp do energii elektrycznej", "goal": 7},
            {"id": "1-1-1", "title": "Energia a ubóstwo", "goal": 1}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let config = test_config(&server);
    let request = SearchRequest::new("energi")
        .with_source("sdg-poland")
        .with_category("7");

    let response = aggregator(&config).search(&request).await;

    assert!(response.failed_sources.is_empty());
    assert_eq!(response.results.len(), 1);
    assert_eq!(response.results[0].title, "Dostęp do energii elektrycznej");
}
