//! Google Fact Check Tools Source
//!
//! https://developers.google.com/fact-check/tools/api/reference/rest/v1alpha1/claims/search
//!
//! The claims endpoint pages with opaque tokens, so only the first page of
//! `pageSize` claims is requested. No fallback route exists.

use async_trait::async_trait;
use serde::Deserialize;

use super::{
    clean, endpoint, require_credential, require_query, SourceAdapter, SourceMetadata, SourcePage,
};
use crate::error::AdapterError;
use crate::http_client::SourceHttpClient;
use crate::identity::{origin_of, synthesize_id};
use crate::schemas::{
    FactCheckDetails, Reliability, ResultDetails, SearchRequest, SearchResult, SourceCategory,
    SourceId, SourceInfo,
};

const DEFAULT_PUBLISHER: &str = "Google Fact Check Tools";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClaimSearchResponse {
    #[serde(default)]
    claims: Vec<Claim>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Claim {
    text: Option<String>,
    claimant: Option<String>,
    claim_date: Option<String>,
    #[serde(default)]
    claim_review: Vec<ClaimReview>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClaimReview {
    publisher: Option<Publisher>,
    url: Option<String>,
    title: Option<String>,
    review_date: Option<String>,
    textual_rating: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Publisher {
    name: Option<String>,
    site: Option<String>,
}

fn map_claims(response: ClaimSearchResponse) -> SourcePage {
    let items: Vec<SearchResult> = response
        .claims
        .into_iter()
        .filter_map(|mut claim| {
            // claims are reviewed at least once; keep the first review
            let review = if claim.claim_review.is_empty() {
                None
            } else {
                Some(claim.claim_review.remove(0))
            };
            let url = review.as_ref().and_then(|r| clean(r.url.clone()))?;
            Some((url, claim, review))
        })
        .enumerate()
        .map(|(index, (url, claim, review))| {
            let (publisher, title, review_date, rating) = match review {
                Some(r) => (r.publisher, r.title, r.review_date, r.textual_rating),
                None => (None, None, None, None),
            };

            let (publisher_name, publisher_site) = match publisher {
                Some(p) => (clean(p.name), clean(p.site)),
                None => (None, None),
            };
            let source_name = publisher_name
                .or_else(|| publisher_site.clone())
                .unwrap_or_else(|| DEFAULT_PUBLISHER.to_string());
            let source_url = publisher_site
                .map(|site| {
                    if site.starts_with("http") {
                        site
                    } else {
                        format!("https://{}", site)
                    }
                })
                .or_else(|| origin_of(&url))
                .unwrap_or_else(|| url.clone());

            let claim_text = clean(claim.text);
            let title = clean(title)
                .or_else(|| claim_text.clone())
                .unwrap_or_else(|| url.clone());
            let review_date = clean(review_date);

            SearchResult::new(
                synthesize_id(SourceId::GOOGLE_FACT_CHECK, None, &url, &title, index),
                title,
                url,
                SourceInfo::new(source_name, source_url).with_reliability(Reliability::High),
                ResultDetails::FactCheck(FactCheckDetails {
                    claimant: clean(claim.claimant),
                    rating: clean(rating),
                    review_date: review_date.clone(),
                }),
            )
            .with_description(claim_text)
            .with_date(review_date.or(claim.claim_date))
            .with_source_id(SourceId::from(SourceId::GOOGLE_FACT_CHECK))
        })
        .collect();

    // the endpoint reports no total
    SourcePage::new(items, None)
}

pub struct FactCheckAdapter {
    http: SourceHttpClient,
    base_url: String,
    api_key: Option<String>,
    metadata: SourceMetadata,
}

impl FactCheckAdapter {
    pub fn new(http: SourceHttpClient, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            api_key,
            metadata: SourceMetadata {
                id: SourceId::from(SourceId::GOOGLE_FACT_CHECK),
                name: "Google Fact Check".to_string(),
                description: "Claim reviews published by fact-checking organisations".to_string(),
                category: SourceCategory::FactCheck,
                homepage: "https://toolbox.google.com/factcheck/explorer".to_string(),
                supports_pagination: false,
            },
        }
    }
}

#[async_trait]
impl SourceAdapter for FactCheckAdapter {
    fn metadata(&self) -> &SourceMetadata {
        &self.metadata
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn fetch(&self, request: &SearchRequest) -> Result<SourcePage, AdapterError> {
        let query = require_query(request, SourceId::GOOGLE_FACT_CHECK)?;
        let api_key = require_credential(&self.api_key, "GOOGLE_FACT_CHECK_API_KEY")?;

        let mut params = vec![
            ("query", query.to_string()),
            ("pageSize", request.page_size.to_string()),
            ("key", api_key.to_string()),
        ];
        if let Some(language) = &request.language {
            params.push(("languageCode", language.clone()));
        }

        let url = endpoint(&self.base_url, "/v1alpha1/claims:search");
        let response: ClaimSearchResponse =
            self.http.get_json(self.http.get(&url).query(&params)).await?;
        Ok(map_claims(response))
    }
}
