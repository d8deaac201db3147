//! REST client for the review API.

use crate::config::ClientConfig;
use crate::error::{parse_retry_after, ApiClientError};
use crate::wire::{routes, ErrorBody, FavoriteRequest, ItemEnvelope, ListEnvelope, PageQuery};
use async_trait::async_trait;
use platter_core::{
    AggregateStats, Comment, CommentDraft, CommentPatch, EngineError, EngineResult, FavoriteAction,
    FavoriteEntry, FavoriteToggle, Identity, Page, Rating, RatingDraft, RatingPatch, ResourceId,
    ResourceKind, ReviewsApi,
};
use reqwest::header::{HeaderName, RETRY_AFTER};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Which configured timeout applies to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
    Read,
    Write,
    Favorite,
}

#[derive(Clone)]
pub struct RestClient {
    client: reqwest::Client,
    base_url: String,
    device_header: HeaderName,
    read_timeout: Duration,
    write_timeout: Duration,
    favorite_timeout: Duration,
}

impl RestClient {
    pub fn new(config: &ClientConfig) -> Result<Self, ApiClientError> {
        let device_header = HeaderName::from_bytes(config.device_header.as_bytes())
            .map_err(|e| ApiClientError::Config(format!("device_header: {}", e)))?;
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            base_url: config.base_url().to_string(),
            device_header,
            read_timeout: config.read_timeout(),
            write_timeout: config.write_timeout(),
            favorite_timeout: config.favorite_timeout(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn timeout_for(&self, class: RequestClass) -> Duration {
        match class {
            RequestClass::Read => self.read_timeout,
            RequestClass::Write => self.write_timeout,
            RequestClass::Favorite => self.favorite_timeout,
        }
    }

    /// Build a request carrying the identity's credentials: the device
    /// header when anonymous, a bearer token when authenticated.
    fn request(
        &self,
        method: Method,
        path: &str,
        identity: Option<&Identity>,
        class: RequestClass,
    ) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let request = self
            .client
            .request(method, url)
            .timeout(self.timeout_for(class));
        match identity {
            Some(Identity::Anonymous { device_id }) => {
                request.header(self.device_header.clone(), device_id.as_str())
            }
            Some(Identity::Authenticated { token, .. }) => request.bearer_auth(token.expose()),
            None => request,
        }
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        identity: Option<&Identity>,
        operation: &str,
        class: RequestClass,
    ) -> EngineResult<Option<T>> {
        let authenticated = identity.is_some_and(Identity::is_authenticated);
        let timeout = self.timeout_for(class);
        let result = async {
            let response = request.send().await?;
            self.parse_response::<T>(response).await
        }
        .await;
        result.map_err(|err| {
            warn!(operation, error = %err, "request failed");
            err.into_engine(authenticated, operation, timeout)
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: Option<&PageQuery>,
        identity: Option<&Identity>,
        operation: &str,
    ) -> EngineResult<T> {
        let mut request = self.request(Method::GET, path, identity, RequestClass::Read);
        if let Some(query) = query {
            request = request.query(query);
        }
        debug!(path, operation, "GET");
        self.send(request, identity, operation, RequestClass::Read)
            .await?
            .ok_or_else(|| empty_body(operation))
    }

    async fn send_json<T, B>(
        &self,
        method: Method,
        path: &str,
        body: &B,
        identity: &Identity,
        operation: &str,
        class: RequestClass,
    ) -> EngineResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        debug!(path, operation, %method, "sending");
        let request = self.request(method, path, Some(identity), class).json(body);
        self.send(request, Some(identity), operation, class)
            .await?
            .ok_or_else(|| empty_body(operation))
    }

    async fn parse_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<Option<T>, ApiClientError> {
        let status = response.status();
        if status.is_success() {
            if status == StatusCode::NO_CONTENT {
                return Ok(None);
            }
            let bytes = response.bytes().await?;
            if bytes.is_empty() {
                return Ok(None);
            }
            Ok(Some(serde_json::from_slice::<T>(&bytes)?))
        } else {
            let retry_after_secs = parse_retry_after(
                response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok()),
            );
            let text = response.text().await?;
            Err(ApiClientError::Status {
                status: status.as_u16(),
                message: ErrorBody::message_from(&text),
                retry_after_secs,
            })
        }
    }
}

fn empty_body(operation: &str) -> EngineError {
    EngineError::Server {
        status: 204,
        message: format!("empty response to {}", operation),
    }
}

#[async_trait]
impl ReviewsApi for RestClient {
    async fn list_ratings(
        &self,
        identity: &Identity,
        kind: ResourceKind,
        resource_id: &ResourceId,
        page: u32,
        limit: u32,
    ) -> EngineResult<Page<Rating>> {
        let envelope: ListEnvelope<Rating> = self
            .get_json(
                &routes::ratings(kind, resource_id),
                Some(&PageQuery { page, limit }),
                Some(identity),
                "list ratings",
            )
            .await?;
        Ok(envelope.into())
    }

    async fn list_comments(
        &self,
        identity: &Identity,
        kind: ResourceKind,
        resource_id: &ResourceId,
        page: u32,
        limit: u32,
    ) -> EngineResult<Page<Comment>> {
        let envelope: ListEnvelope<Comment> = self
            .get_json(
                &routes::comments(kind, resource_id),
                Some(&PageQuery { page, limit }),
                Some(identity),
                "list comments",
            )
            .await?;
        Ok(envelope.into())
    }

    async fn create_rating(
        &self,
        identity: &Identity,
        kind: ResourceKind,
        resource_id: &ResourceId,
        draft: &RatingDraft,
    ) -> EngineResult<Rating> {
        let path = routes::rate(kind, resource_id, !identity.is_authenticated());
        let envelope: ItemEnvelope<Rating> = self
            .send_json(Method::POST, &path, draft, identity, "create rating", RequestClass::Write)
            .await?;
        Ok(envelope.into_inner())
    }

    async fn create_comment(
        &self,
        identity: &Identity,
        kind: ResourceKind,
        resource_id: &ResourceId,
        draft: &CommentDraft,
    ) -> EngineResult<Comment> {
        let path = routes::comment(kind, resource_id, !identity.is_authenticated());
        let envelope: ItemEnvelope<Comment> = self
            .send_json(Method::POST, &path, draft, identity, "create comment", RequestClass::Write)
            .await?;
        Ok(envelope.into_inner())
    }

    async fn update_rating(
        &self,
        identity: &Identity,
        kind: ResourceKind,
        rating_id: &str,
        patch: &RatingPatch,
    ) -> EngineResult<Rating> {
        let envelope: ItemEnvelope<Rating> = self
            .send_json(
                Method::PUT,
                &routes::rating_item(kind, rating_id),
                patch,
                identity,
                "update rating",
                RequestClass::Write,
            )
            .await?;
        Ok(envelope.into_inner())
    }

    async fn delete_rating(
        &self,
        identity: &Identity,
        kind: ResourceKind,
        rating_id: &str,
    ) -> EngineResult<()> {
        let request = self.request(
            Method::DELETE,
            &routes::rating_item(kind, rating_id),
            Some(identity),
            RequestClass::Write,
        );
        self.send::<serde_json::Value>(request, Some(identity), "delete rating", RequestClass::Write)
            .await?;
        Ok(())
    }

    async fn update_comment(
        &self,
        identity: &Identity,
        kind: ResourceKind,
        comment_id: &str,
        patch: &CommentPatch,
    ) -> EngineResult<Comment> {
        let envelope: ItemEnvelope<Comment> = self
            .send_json(
                Method::PUT,
                &routes::comment_item(kind, comment_id),
                patch,
                identity,
                "update comment",
                RequestClass::Write,
            )
            .await?;
        Ok(envelope.into_inner())
    }

    async fn delete_comment(
        &self,
        identity: &Identity,
        kind: ResourceKind,
        comment_id: &str,
    ) -> EngineResult<()> {
        let request = self.request(
            Method::DELETE,
            &routes::comment_item(kind, comment_id),
            Some(identity),
            RequestClass::Write,
        );
        self.send::<serde_json::Value>(request, Some(identity), "delete comment", RequestClass::Write)
            .await?;
        Ok(())
    }

    async fn toggle_favorite(
        &self,
        identity: &Identity,
        kind: ResourceKind,
        resource_id: &ResourceId,
        action: FavoriteAction,
    ) -> EngineResult<FavoriteToggle> {
        let path = routes::favorite(kind, resource_id, !identity.is_authenticated());
        let envelope: ItemEnvelope<FavoriteToggle> = self
            .send_json(
                Method::POST,
                &path,
                &FavoriteRequest { action },
                identity,
                "toggle favorite",
                RequestClass::Favorite,
            )
            .await?;
        Ok(envelope.into_inner())
    }

    async fn list_favorites(
        &self,
        identity: &Identity,
        page: u32,
        limit: u32,
    ) -> EngineResult<Page<FavoriteEntry>> {
        let request = self
            .request(Method::GET, &routes::favorites(), Some(identity), RequestClass::Favorite)
            .query(&PageQuery { page, limit });
        let envelope: ListEnvelope<FavoriteEntry> = self
            .send(request, Some(identity), "list favorites", RequestClass::Favorite)
            .await?
            .ok_or_else(|| empty_body("list favorites"))?;
        Ok(envelope.into())
    }

    async fn get_stats(
        &self,
        kind: ResourceKind,
        resource_id: &ResourceId,
    ) -> EngineResult<AggregateStats> {
        let envelope: ItemEnvelope<AggregateStats> = self
            .get_json(&routes::stats(kind, resource_id), None, None, "get stats")
            .await?;
        Ok(envelope.into_inner())
    }
}
