use std::time::Duration;

use reqwest::header::ACCEPT;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

pub const DEFAULT_PAGE_SIZE: u32 = 50;

const API_TIMEOUT: Duration = Duration::from_secs(30);
const ERROR_BODY_LIMIT: usize = 500;

#[derive(Debug, Error)]
pub enum PageError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("authentication failed for {url}; check the configured email and API token")]
    Auth { url: String },
    #[error("not found: {url}")]
    NotFound { url: String },
    #[error("rate limited on {url}; wait a moment and try again")]
    RateLimited { url: String },
    #[error("api returned {status} for {url}: {body}")]
    Api {
        status: StatusCode,
        url: String,
        body: String,
    },
    #[error("attachment download returned {status} for {url}")]
    Download { status: StatusCode, url: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorClass {
    Auth,
    NotFound,
    RateLimit,
    Transient,
    Permanent,
}

#[derive(Clone)]
pub struct PageClient {
    http: Client,
    base_url: String,
    email: String,
    api_token: String,
    page_size: u32,
}

impl PageClient {
    pub fn new(
        base_url: &str,
        email: impl Into<String>,
        api_token: impl Into<String>,
    ) -> Result<Self, PageError> {
        // Kept as a string: joining with Url::join would drop a path prefix like "/wiki".
        let base_url = base_url.trim_end_matches('/').to_string();
        Url::parse(&base_url)?;
        Ok(Self {
            http: Client::new(),
            base_url,
            email: email.into(),
            api_token: api_token.into(),
            page_size: DEFAULT_PAGE_SIZE,
        })
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn get_page(&self, id: &str) -> Result<Page, PageError> {
        let mut url = self.endpoint(&format!("/rest/api/content/{id}"))?;
        url.query_pairs_mut()
            .append_pair("expand", "body.storage,version");
        let response = self
            .api_request(Method::GET, url)
            .timeout(API_TIMEOUT)
            .send()
            .await?;
        let payload: PagePayload = Self::handle_response(response).await?;
        Ok(payload.into())
    }

    pub async fn get_child_pages(&self, id: &str) -> Result<Vec<PageRef>, PageError> {
        self.collect_all(&format!("/rest/api/content/{id}/child/page"))
            .await
    }

    pub async fn get_attachments(&self, id: &str) -> Result<Vec<Attachment>, PageError> {
        let items: Vec<AttachmentPayload> = self
            .collect_all(&format!("/rest/api/content/{id}/child/attachment"))
            .await?;
        Ok(items.into_iter().map(Attachment::from).collect())
    }

    pub async fn update_page(
        &self,
        id: &str,
        title: &str,
        html_body: &str,
        current_version: u64,
    ) -> Result<Page, PageError> {
        let url = self.endpoint(&format!("/rest/api/content/{id}"))?;
        let payload = UpdatePayload {
            id,
            kind: "page",
            title,
            version: VersionPayload {
                number: current_version + 1,
            },
            body: UpdateBody {
                storage: UpdateStorage {
                    value: html_body,
                    representation: "storage",
                },
            },
        };
        let response = self
            .api_request(Method::PUT, url)
            .timeout(API_TIMEOUT)
            .json(&payload)
            .send()
            .await?;
        let payload: PagePayload = Self::handle_response(response).await?;
        Ok(payload.into())
    }

    async fn collect_all<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, PageError> {
        let limit = self.page_size;
        let mut start = 0u32;
        let mut items = Vec::new();
        loop {
            let mut url = self.endpoint(path)?;
            url.query_pairs_mut()
                .append_pair("start", &start.to_string())
                .append_pair("limit", &limit.to_string());
            let response = self
                .api_request(Method::GET, url)
                .timeout(API_TIMEOUT)
                .send()
                .await?;
            let page: ResultsPage<T> = Self::handle_response(response).await?;
            let size = page.size.unwrap_or(page.results.len() as u32);
            items.extend(page.results);
            if size < limit {
                break;
            }
            start = start.saturating_add(limit);
        }
        Ok(items)
    }

    pub(crate) fn authed_request(&self, method: Method, url: Url) -> RequestBuilder {
        self.http
            .request(method, url)
            .basic_auth(&self.email, Some(&self.api_token))
    }

    fn api_request(&self, method: Method, url: Url) -> RequestBuilder {
        self.authed_request(method, url)
            .header(ACCEPT, "application/json")
    }

    fn endpoint(&self, path: &str) -> Result<Url, PageError> {
        Ok(Url::parse(&format!("{}{path}", self.base_url))?)
    }

    async fn handle_response<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, PageError> {
        if response.status().is_success() {
            Ok(response.json::<T>().await?)
        } else {
            let status = response.status();
            let url = response.url().to_string();
            let body = response.text().await.unwrap_or_default();
            Err(PageError::from_status(
                status,
                url,
                body.chars().take(ERROR_BODY_LIMIT).collect(),
            ))
        }
    }
}

impl PageError {
    fn from_status(status: StatusCode, url: String, body: String) -> Self {
        match classify_api_status(status) {
            ApiErrorClass::Auth => PageError::Auth { url },
            ApiErrorClass::NotFound => PageError::NotFound { url },
            ApiErrorClass::RateLimit => PageError::RateLimited { url },
            ApiErrorClass::Transient | ApiErrorClass::Permanent => {
                PageError::Api { status, url, body }
            }
        }
    }

    pub fn classification(&self) -> Option<ApiErrorClass> {
        match self {
            PageError::Auth { .. } => Some(ApiErrorClass::Auth),
            PageError::NotFound { .. } => Some(ApiErrorClass::NotFound),
            PageError::RateLimited { .. } => Some(ApiErrorClass::RateLimit),
            PageError::Api { status, .. } | PageError::Download { status, .. } => {
                Some(classify_api_status(*status))
            }
            _ => None,
        }
    }

    /// Bad credentials fail every later request too, so the caller should stop.
    pub fn is_session_fatal(&self) -> bool {
        matches!(self, PageError::Auth { .. })
    }

    /// The same request may succeed on a later run.
    pub fn is_retryable(&self) -> bool {
        match self {
            PageError::Request(err) => err.is_timeout() || err.is_connect(),
            _ => matches!(
                self.classification(),
                Some(ApiErrorClass::RateLimit | ApiErrorClass::Transient)
            ),
        }
    }
}

fn classify_api_status(status: StatusCode) -> ApiErrorClass {
    // 403 is a per-page restriction here; only 401 means the credentials are bad.
    if status == StatusCode::UNAUTHORIZED {
        ApiErrorClass::Auth
    } else if status == StatusCode::NOT_FOUND {
        ApiErrorClass::NotFound
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        ApiErrorClass::RateLimit
    } else if status.is_server_error()
        || matches!(status, StatusCode::REQUEST_TIMEOUT | StatusCode::CONFLICT)
    {
        ApiErrorClass::Transient
    } else {
        ApiErrorClass::Permanent
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub id: String,
    pub title: String,
    pub version: u64,
    /// Storage-format HTML.
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PageRef {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub id: Option<String>,
    pub title: String,
    /// Absolute URL or a path relative to the store's base URL.
    pub download: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResultsPage<T> {
    #[serde(default = "Vec::new")]
    results: Vec<T>,
    #[serde(default)]
    size: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct PagePayload {
    id: String,
    title: String,
    version: VersionPayload,
    #[serde(default)]
    body: Option<BodyPayload>,
}

#[derive(Debug, Deserialize, Serialize)]
struct VersionPayload {
    number: u64,
}

#[derive(Debug, Deserialize)]
struct BodyPayload {
    #[serde(default)]
    storage: Option<StoragePayload>,
}

#[derive(Debug, Deserialize)]
struct StoragePayload {
    #[serde(default)]
    value: String,
}

impl From<PagePayload> for Page {
    fn from(payload: PagePayload) -> Self {
        Self {
            id: payload.id,
            title: payload.title,
            version: payload.version.number,
            body: payload
                .body
                .and_then(|body| body.storage)
                .map(|storage| storage.value)
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AttachmentPayload {
    #[serde(default)]
    id: Option<String>,
    title: String,
    #[serde(rename = "_links", default)]
    links: Option<AttachmentLinks>,
}

#[derive(Debug, Deserialize)]
struct AttachmentLinks {
    #[serde(default)]
    download: Option<String>,
}

impl From<AttachmentPayload> for Attachment {
    fn from(payload: AttachmentPayload) -> Self {
        Self {
            id: payload.id,
            title: payload.title,
            download: payload
                .links
                .and_then(|links| links.download)
                .filter(|href| !href.is_empty()),
        }
    }
}

#[derive(Debug, Serialize)]
struct UpdatePayload<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    kind: &'a str,
    title: &'a str,
    version: VersionPayload,
    body: UpdateBody<'a>,
}

#[derive(Debug, Serialize)]
struct UpdateBody<'a> {
    storage: UpdateStorage<'a>,
}

#[derive(Debug, Serialize)]
struct UpdateStorage<'a> {
    value: &'a str,
    representation: &'a str,
}
