use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use super::types::{ContentFormat, FetchedDocument, MemberPage, QueryEnvelope, RevisionRequest};
use super::WikiApi;
use crate::error::ApiError;

const API_ERROR_HEADER: &str = "MediaWiki-API-Error";

type Params = Vec<(&'static str, String)>;

fn embedded_in_params(title: &str, limit: usize, continuation: Option<&str>) -> Params {
    let mut params = vec![
        ("generator", "embeddedin".to_string()),
        ("geititle", title.to_string()),
        ("geilimit", limit.to_string()),
        ("prop", "info".to_string()),
    ];
    if let Some(token) = continuation {
        params.push(("geicontinue", token.to_string()));
    }
    params
}

fn revision_params(ids: &[u64], request: &RevisionRequest) -> Params {
    let joined = ids
        .iter()
        .map(u64::to_string)
        .collect::<Vec<_>>()
        .join("|");
    let mut params = vec![
        ("prop", "revisions".to_string()),
        ("rvprop", "content|ids".to_string()),
        ("pageids", joined),
    ];
    if request.format == ContentFormat::Html {
        params.push(("rvparse", "true".to_string()));
    }
    if request.follow_redirects {
        params.push(("redirects", "true".to_string()));
    }
    params
}

/// Map the `MediaWiki-API-Error` header or an `error` object to `Remote`.
fn check_remote_error(
    header_error: Option<String>,
    envelope: QueryEnvelope,
) -> Result<QueryEnvelope, ApiError> {
    if let Some(code) = header_error {
        let detail = envelope.error.as_ref().and_then(|e| e.info.clone());
        return Err(ApiError::Remote(match detail {
            Some(info) => format!("{} {}", code, info),
            None => code,
        }));
    }
    if let Some(err) = &envelope.error {
        return Err(ApiError::Remote(err.describe()));
    }
    Ok(envelope)
}

/// `api.php` client over reqwest.
pub struct MediaWikiClient {
    http: reqwest::Client,
    api_url: String,
}

impl MediaWikiClient {
    pub fn new(api_url: &str, user_agent: &str) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|source| ApiError::Transport {
                endpoint: api_url.to_string(),
                source,
            })?;
        Ok(Self {
            http,
            api_url: api_url.to_string(),
        })
    }

    /// Issue one `action=query` GET and decode the envelope.
    async fn query(&self, params: &[(&str, String)]) -> Result<QueryEnvelope, ApiError> {
        let transport = |source| ApiError::Transport {
            endpoint: self.api_url.clone(),
            source,
        };

        let response = self
            .http
            .get(&self.api_url)
            .query(&[("action", "query"), ("format", "json"), ("servedby", "true")])
            .query(params)
            .send()
            .await
            .map_err(transport)?
            .error_for_status()
            .map_err(transport)?;

        let header_error = response
            .headers()
            .get(API_ERROR_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await.map_err(transport)?;

        let envelope: QueryEnvelope = serde_json::from_str(&body)
            .map_err(|e| ApiError::decode(&self.api_url, e.to_string()))?;
        let envelope = check_remote_error(header_error, envelope)?;

        debug!(servedby = ?envelope.servedby, "query ok");
        Ok(envelope)
    }
}

#[async_trait]
impl WikiApi for MediaWikiClient {
    async fn embedded_in(
        &self,
        title: &str,
        limit: usize,
        continuation: Option<&str>,
    ) -> Result<MemberPage, ApiError> {
        self.query(&embedded_in_params(title, limit, continuation))
            .await?
            .into_member_page()
            .ok_or_else(|| ApiError::decode(&self.api_url, "embeddedin response has no `query.pages`"))
    }

    async fn fetch_revisions(
        &self,
        ids: &[u64],
        request: &RevisionRequest,
    ) -> Result<Vec<FetchedDocument>, ApiError> {
        self.query(&revision_params(ids, request))
            .await?
            .into_documents(request.redirect_policy, Utc::now())
            .ok_or_else(|| ApiError::decode(&self.api_url, "revisions response has no `query.pages`"))
    }
}
