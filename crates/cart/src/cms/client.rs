//! HTTP client for the CMS REST API.
//!
//! Uses `reqwest` for HTTP and caches product snapshots with `moka`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use reqwest::header::AUTHORIZATION;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};
use url::Url;

use cartsync_core::{PersistedCart, ProductId, ProductSnapshot, UserId};

use super::{CmsError, ProductCatalog, UserCartStore};
use crate::auth::AuthUser;
use crate::config::ServerConfig;

/// Maximum number of product snapshots kept in memory.
const PRODUCT_CACHE_CAPACITY: u64 = 1000;

/// How much of an error body to keep in logs and errors.
const ERROR_BODY_LIMIT: usize = 200;

/// Client for the CMS REST API.
///
/// Cheaply cloneable; clones share the HTTP connection pool and the product
/// cache.
#[derive(Clone)]
pub struct CmsClient {
    inner: Arc<CmsClientInner>,
}

struct CmsClientInner {
    client: reqwest::Client,
    base_url: Url,
    api_token: Option<SecretString>,
    products: Cache<ProductId, ProductSnapshot>,
}

/// Body of `GET /api/users/me`.
#[derive(Debug, Deserialize)]
struct MeResponse {
    user: Option<AuthUser>,
}

impl CmsClient {
    /// Create a new CMS client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &ServerConfig) -> Result<Self, CmsError> {
        let products = Cache::builder()
            .max_capacity(PRODUCT_CACHE_CAPACITY)
            .time_to_live(config.product_cache_ttl)
            .build();

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            inner: Arc::new(CmsClientInner {
                client,
                base_url: config.base_url.clone(),
                api_token: config.api_token.clone(),
                products,
            }),
        })
    }

    /// Whether requests carry a user token.
    #[must_use]
    pub fn has_token(&self) -> bool {
        self.inner.api_token.is_some()
    }

    /// Build `{base}/api/{segments...}`, percent-encoding each segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, CmsError> {
        let mut url = self.inner.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| CmsError::InvalidUrl(self.inner.base_url.to_string()))?
            .pop_if_empty()
            .push("api")
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.inner.api_token {
            Some(token) => request.header(AUTHORIZATION, format!("JWT {}", token.expose_secret())),
            None => request,
        }
    }

    /// Send a request and decode a JSON body, mapping HTTP failures.
    async fn send_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        what: &str,
    ) -> Result<T, CmsError> {
        let response = self.authorize(request).send().await?;
        let body = check_status(response, what).await?;

        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %truncate(&body),
                "Failed to parse CMS response"
            );
            CmsError::Parse(e)
        })
    }

    /// Fetch a product by id, bypassing the cache.
    ///
    /// # Errors
    ///
    /// Returns `CmsError::NotFound` on 404, or another `CmsError` if the
    /// request or decoding fails.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn get_product(&self, id: &ProductId) -> Result<ProductSnapshot, CmsError> {
        let url = self.endpoint(&["products", id.as_str()])?;
        self.send_json(self.inner.client.get(url), &format!("product {id}"))
            .await
    }

    /// Replace the `cart` field of a user record.
    ///
    /// # Errors
    ///
    /// Returns `CmsError::Unauthorized` if the token is missing or rejected,
    /// or another `CmsError` if the update fails.
    #[instrument(skip(self, cart), fields(user_id = %user, items = cart.items.len()))]
    pub async fn update_user_cart(
        &self,
        user: &UserId,
        cart: &PersistedCart,
    ) -> Result<(), CmsError> {
        let url = self.endpoint(&["users", user.as_str()])?;
        let request = self
            .inner
            .client
            .patch(url)
            .json(&serde_json::json!({ "cart": cart }));

        let response = self.authorize(request).send().await?;
        check_status(response, &format!("user {user}")).await?;
        debug!("User cart updated");
        Ok(())
    }

    /// The signed-in user and their stored cart, or `None` for a guest.
    ///
    /// # Errors
    ///
    /// Returns `CmsError` if the request or decoding fails.
    #[instrument(skip(self))]
    pub async fn current_user(&self) -> Result<Option<AuthUser>, CmsError> {
        if !self.has_token() {
            return Ok(None);
        }

        let url = self.endpoint(&["users", "me"])?;
        match self
            .send_json::<MeResponse>(self.inner.client.get(url), "current user")
            .await
        {
            Ok(me) => Ok(me.user),
            Err(CmsError::Unauthorized) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl ProductCatalog for CmsClient {
    async fn fetch_product(&self, id: &ProductId) -> Result<ProductSnapshot, CmsError> {
        if let Some(product) = self.inner.products.get(id).await {
            debug!(product_id = %id, "Product cache hit");
            return Ok(product);
        }

        let product = self.get_product(id).await?;
        self.inner
            .products
            .insert(id.clone(), product.clone())
            .await;
        Ok(product)
    }
}

#[async_trait]
impl UserCartStore for CmsClient {
    async fn persist_user_cart(
        &self,
        user: &UserId,
        cart: &PersistedCart,
    ) -> Result<(), CmsError> {
        self.update_user_cart(user, cart).await
    }
}

/// Map non-success statuses to errors and return the body text.
async fn check_status(response: reqwest::Response, what: &str) -> Result<String, CmsError> {
    let status = response.status();

    // Check for rate limiting
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(1);
        return Err(CmsError::RateLimited(retry_after));
    }

    let body = response.text().await?;

    match status {
        s if s.is_success() => Ok(body),
        reqwest::StatusCode::NOT_FOUND => Err(CmsError::NotFound(what.to_string())),
        reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
            Err(CmsError::Unauthorized)
        }
        _ => {
            tracing::error!(
                status = %status,
                body = %truncate(&body),
                "CMS returned non-success status"
            );
            Err(CmsError::Api {
                status: status.as_u16(),
                message: truncate(&body),
            })
        }
    }
}

fn truncate(body: &str) -> String {
    body.chars().take(ERROR_BODY_LIMIT).collect()
}
