use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::header::ACCEPT;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{RemoteObject, RemoteStore, SyncConfig};
use crate::error::{ProcessorError, Result};

const API_VERSION: &str = "2022-11-28";
const JSON_MEDIA_TYPE: &str = "application/vnd.github+json";
/// Media type returning the file bytes instead of the JSON envelope
const RAW_MEDIA_TYPE: &str = "application/vnd.github.raw+json";
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Remote store backed by the GitHub repository contents API
pub struct GitHubStore {
    client: Client,
    api_base: String,
    repo: String,
    branch: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct ContentResponse {
    content: Option<String>,
    /// `none` for files over 1 MB, whose content is left out
    encoding: Option<String>,
    sha: String,
}

impl ContentResponse {
    /// Inline bytes, or `None` when the file has to be fetched raw
    fn inline_content(&self) -> Result<Option<Vec<u8>>> {
        if self.encoding.as_deref() == Some("none") {
            return Ok(None);
        }
        match &self.content {
            Some(encoded) => decode_content(encoded).map(Some),
            None => Ok(Some(Vec::new())),
        }
    }
}

#[derive(Debug, Serialize)]
struct PutRequest<'a> {
    message: &'a str,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct PutResponse {
    content: Option<PutContent>,
}

#[derive(Debug, Deserialize)]
struct PutContent {
    sha: String,
}

#[derive(Debug, Serialize)]
struct DeleteRequest<'a> {
    message: &'a str,
    sha: &'a str,
    branch: &'a str,
}

impl GitHubStore {
    pub fn new(config: &SyncConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(concat!("mkv-processor/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            repo: config.repo.clone(),
            branch: config.branch.clone(),
            token: config.token.clone(),
        })
    }

    fn contents_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/contents/{}",
            self.api_base,
            self.repo,
            path.trim_start_matches('/')
        )
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.request_accepting(method, path, JSON_MEDIA_TYPE)
    }

    fn request_accepting(&self, method: Method, path: &str, accept: &str) -> RequestBuilder {
        let url = self.contents_url(path);
        debug!("GitHub {} {} ({})", method, url, accept);
        self.client
            .request(method, url)
            .bearer_auth(&self.token)
            .header(ACCEPT, accept)
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    async fn get_raw(&self, path: &str) -> Result<Vec<u8>> {
        let request = self
            .request_accepting(Method::GET, path, RAW_MEDIA_TYPE)
            .query(&[("ref", self.branch.as_str())]);
        let response = self.send(request, path).await?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn send(&self, request: RequestBuilder, path: &str) -> Result<Response> {
        check_status(request.send().await?, path).await
    }
}

async fn check_status(response: Response, path: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(classify_failure(status, &body, path))
}

/// Map a failed contents API call onto the error taxonomy
fn classify_failure(status: StatusCode, body: &str, path: &str) -> ProcessorError {
    match status {
        StatusCode::CONFLICT => ProcessorError::SyncConflict(path.to_string()),
        // Missing or stale `sha` on an existing file
        StatusCode::UNPROCESSABLE_ENTITY if body.contains("sha") => ProcessorError::SyncConflict(path.to_string()),
        _ => ProcessorError::Sync(format!("GitHub API error {} on {}: {}", status, path, body)),
    }
}

fn decode_content(encoded: &str) -> Result<Vec<u8>> {
    // The API wraps base64 at 60 columns
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD
        .decode(compact)
        .map_err(|e| ProcessorError::Sync(format!("Invalid base64 content: {}", e)))
}

#[async_trait]
impl RemoteStore for GitHubStore {
    async fn get_object(&self, path: &str) -> Result<Option<RemoteObject>> {
        let request = self.request(Method::GET, path).query(&[("ref", self.branch.as_str())]);
        let response = request.send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = check_status(response, path).await?;

        let body: ContentResponse = response.json().await?;
        let content = match body.inline_content()? {
            Some(content) => content,
            None => {
                debug!("{} is too large for inline content, fetching raw", path);
                self.get_raw(path).await?
            }
        };
        Ok(Some(RemoteObject {
            content,
            revision: body.sha,
        }))
    }

    async fn put_object(
        &self,
        path: &str,
        content: Vec<u8>,
        message: &str,
        revision: Option<&str>,
    ) -> Result<String> {
        let payload = PutRequest {
            message,
            content: STANDARD.encode(content),
            branch: &self.branch,
            sha: revision,
        };
        let response = self.send(self.request(Method::PUT, path).json(&payload), path).await?;
        let body: PutResponse = response.json().await?;
        Ok(body.content.map(|c| c.sha).unwrap_or_default())
    }

    async fn delete_object(&self, path: &str, revision: &str, message: &str) -> Result<()> {
        let payload = DeleteRequest {
            message,
            sha: revision,
            branch: &self.branch,
        };
        self.send(self.request(Method::DELETE, path).json(&payload), path).await?;
        Ok(())
    }
}
