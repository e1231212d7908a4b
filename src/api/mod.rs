use async_trait::async_trait;
use chrono::Duration;
use reqwest::{Client, Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::Config;
use crate::model::{Fields, Package, PackageForm, ParentRef, RemoteItem, SubResource};

pub mod auth;
pub mod model;

use auth::{with_auth_retry, Credentials, Login, SessionStore};
use model::{CarouselUpdate, ErrorBody, LoginRequest, LoginResponse};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("session can no longer be renewed, log in again: {0}")]
    ReloginRequired(String),
    #[error("backend error {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("invalid backend response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid URL: {0}")]
    Url(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        ApiError::Network(err.to_string())
    }
}

/// Sub-resource collection of a parent record on the backend.
#[async_trait]
pub trait RemoteCollection: Send + Sync {
    async fn list(&self, parent: &ParentRef, kind: SubResource) -> Result<Vec<RemoteItem>, ApiError>;

    async fn create(
        &self,
        parent: &ParentRef,
        kind: SubResource,
        fields: &Fields,
    ) -> Result<RemoteItem, ApiError>;

    async fn update(
        &self,
        parent: &ParentRef,
        kind: SubResource,
        item_id: i64,
        fields: &Fields,
    ) -> Result<(), ApiError>;

    async fn delete(&self, parent: &ParentRef, kind: SubResource, item_id: i64) -> Result<(), ApiError>;
}

/// Parent package records.
#[async_trait]
pub trait PackageStore: Send + Sync {
    async fn list_packages(&self) -> Result<Vec<Package>, ApiError>;

    async fn create_package(&self, form: &PackageForm) -> Result<Package, ApiError>;

    async fn update_package(&self, id: i64, form: &PackageForm) -> Result<Package, ApiError>;

    async fn set_carousel(&self, id: i64, promoted: bool, carousel_order: i32) -> Result<(), ApiError>;
}

/// Unauthenticated request builder and executor for the backend.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: Url,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    pub fn new(mut base_url: Url, timeout: std::time::Duration) -> Result<Self, ApiError> {
        // `Url::join` drops the last segment unless the base ends with '/'.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let http = Client::builder()
            .user_agent(concat!("package-editor/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self { http, base_url })
    }

    pub fn from_config(cfg: &Config) -> Result<Self, ApiError> {
        let base_url = Url::parse(&cfg.api.base_url).map_err(|e| ApiError::Url(e.to_string()))?;
        Self::new(base_url, std::time::Duration::from_secs(cfg.api.timeout_seconds))
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.base_url
            .join(path)
            .map_err(|e| ApiError::Url(format!("{}: {}", path, e)))
    }

    fn request<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<&B>,
    ) -> Result<reqwest::Request, ApiError> {
        let mut builder = self
            .http
            .request(method, self.endpoint(path)?)
            .header("Accept", "application/json");
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {}", token));
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }
        Ok(builder.build()?)
    }

    pub fn build_login_request(&self, credentials: &Credentials) -> Result<reqwest::Request, ApiError> {
        let body = LoginRequest {
            username: &credentials.username,
            password: &credentials.password,
        };
        self.request(Method::POST, "admin/login", None, Some(&body))
    }

    pub fn build_list_request(&self, parent: &ParentRef, kind: SubResource) -> Result<reqwest::Request, ApiError> {
        let path = format!("{}/{}/{}", parent.resource, parent.id, kind);
        self.request::<()>(Method::GET, &path, None, None)
    }

    pub fn build_create_request(
        &self,
        token: &str,
        parent: &ParentRef,
        kind: SubResource,
        fields: &Fields,
    ) -> Result<reqwest::Request, ApiError> {
        let path = format!("admin/{}/{}/{}", parent.resource, parent.id, kind);
        self.request(Method::POST, &path, Some(token), Some(fields))
    }

    pub fn build_update_request(
        &self,
        token: &str,
        parent: &ParentRef,
        kind: SubResource,
        item_id: i64,
        fields: &Fields,
    ) -> Result<reqwest::Request, ApiError> {
        let path = format!("admin/{}/{}/{}/{}", parent.resource, parent.id, kind, item_id);
        self.request(Method::PUT, &path, Some(token), Some(fields))
    }

    pub fn build_delete_request(
        &self,
        token: &str,
        parent: &ParentRef,
        kind: SubResource,
        item_id: i64,
    ) -> Result<reqwest::Request, ApiError> {
        let path = format!("admin/{}/{}/{}/{}", parent.resource, parent.id, kind, item_id);
        self.request::<()>(Method::DELETE, &path, Some(token), None)
    }

    pub fn build_list_packages_request(&self) -> Result<reqwest::Request, ApiError> {
        self.request::<()>(Method::GET, "packages", None, None)
    }

    pub fn build_package_write_request<B: Serialize + ?Sized>(
        &self,
        token: &str,
        id: Option<i64>,
        body: &B,
    ) -> Result<reqwest::Request, ApiError> {
        match id {
            Some(id) => self.request(Method::PUT, &format!("admin/packages/{}", id), Some(token), Some(body)),
            None => self.request(Method::POST, "admin/packages", Some(token), Some(body)),
        }
    }

    /// Send a request and return the response body, mapping auth and
    /// non-success statuses onto [`ApiError`].
    pub async fn execute(&self, request: reqwest::Request) -> Result<String, ApiError> {
        let method = request.method().clone();
        let url = request.url().clone();
        debug!(%method, %url, "sending backend request");

        let res = self.http.execute(request).await?;
        let status = res.status();
        response_body(status, &url, res.text().await)
    }

    async fn execute_json<T: DeserializeOwned>(&self, request: reqwest::Request) -> Result<T, ApiError> {
        let body = self.execute(request).await?;
        Ok(serde_json::from_str(&body)?)
    }
}

/// Map a response status and its body read onto the call result. A body
/// that cannot be read only matters when the status is a success.
fn response_body<E: fmt::Display>(status: StatusCode, url: &Url, body: Result<String, E>) -> Result<String, ApiError> {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(ApiError::Unauthorized(error_detail(&body.unwrap_or_default())));
    }
    if !status.is_success() {
        warn!(%url, %status, "backend returned an error");
        return Err(ApiError::Status {
            status,
            body: error_detail(&body.unwrap_or_default()),
        });
    }
    body.map_err(|e| ApiError::Network(format!("failed to read response from {}: {}", url, e)))
}

/// Pull `detail` out of a FastAPI-style error body, falling back to the raw text.
fn error_detail(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody { detail: serde_json::Value::String(s) }) => s,
        Ok(ErrorBody { detail }) => detail.to_string(),
        Err(_) => body.trim().to_string(),
    }
}

#[async_trait]
impl Login for ApiClient {
    async fn login(&self, credentials: &Credentials) -> Result<String, ApiError> {
        let request = self.build_login_request(credentials)?;
        let payload: LoginResponse = self.execute_json(request).await?;
        Ok(payload.access_token)
    }
}

/// Authenticated backend client: every mutating call carries the session
/// token and gets one refresh-and-retry on 401.
pub struct BackendClient {
    api: ApiClient,
    session: SessionStore<ApiClient>,
}

impl fmt::Debug for BackendClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendClient")
            .field("api", &self.api)
            .field("session", &self.session)
            .finish()
    }
}

impl BackendClient {
    pub fn new(api: ApiClient, credentials: Credentials, validity: Duration, renew_before: Duration) -> Self {
        let session = SessionStore::new(api.clone(), credentials, validity, renew_before);
        Self { api, session }
    }

    pub fn from_config(cfg: &Config) -> Result<Self, ApiError> {
        let api = ApiClient::from_config(cfg)?;
        let credentials = Credentials {
            username: cfg.auth.username.clone(),
            password: cfg.auth.password.clone(),
        };
        Ok(Self::new(
            api,
            credentials,
            Duration::minutes(cfg.auth.token_validity_minutes),
            Duration::minutes(cfg.auth.renew_before_minutes),
        ))
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn session(&self) -> &SessionStore<ApiClient> {
        &self.session
    }
}

#[async_trait]
impl RemoteCollection for BackendClient {
    async fn list(&self, parent: &ParentRef, kind: SubResource) -> Result<Vec<RemoteItem>, ApiError> {
        let request = self.api.build_list_request(parent, kind)?;
        self.api.execute_json(request).await
    }

    async fn create(
        &self,
        parent: &ParentRef,
        kind: SubResource,
        fields: &Fields,
    ) -> Result<RemoteItem, ApiError> {
        with_auth_retry(&self.session, |token| async move {
            let request = self.api.build_create_request(&token, parent, kind, fields)?;
            self.api.execute_json(request).await
        })
        .await
    }

    async fn update(
        &self,
        parent: &ParentRef,
        kind: SubResource,
        item_id: i64,
        fields: &Fields,
    ) -> Result<(), ApiError> {
        with_auth_retry(&self.session, |token| async move {
            let request = self.api.build_update_request(&token, parent, kind, item_id, fields)?;
            self.api.execute(request).await.map(|_| ())
        })
        .await
    }

    async fn delete(&self, parent: &ParentRef, kind: SubResource, item_id: i64) -> Result<(), ApiError> {
        with_auth_retry(&self.session, |token| async move {
            let request = self.api.build_delete_request(&token, parent, kind, item_id)?;
            self.api.execute(request).await.map(|_| ())
        })
        .await
    }
}

#[async_trait]
impl PackageStore for BackendClient {
    async fn list_packages(&self) -> Result<Vec<Package>, ApiError> {
        let request = self.api.build_list_packages_request()?;
        self.api.execute_json(request).await
    }

    async fn create_package(&self, form: &PackageForm) -> Result<Package, ApiError> {
        with_auth_retry(&self.session, |token| async move {
            let request = self.api.build_package_write_request(&token, None, form)?;
            self.api.execute_json(request).await
        })
        .await
    }

    async fn update_package(&self, id: i64, form: &PackageForm) -> Result<Package, ApiError> {
        with_auth_retry(&self.session, |token| async move {
            let request = self.api.build_package_write_request(&token, Some(id), form)?;
            self.api.execute_json(request).await
        })
        .await
    }

    async fn set_carousel(&self, id: i64, promoted: bool, carousel_order: i32) -> Result<(), ApiError> {
        let body = CarouselUpdate {
            promoted,
            carousel_order,
        };
        let body = &body;
        with_auth_retry(&self.session, |token| async move {
            let request = self.api.build_package_write_request(&token, Some(id), body)?;
            self.api.execute(request).await.map(|_| ())
        })
        .await
    }
}
