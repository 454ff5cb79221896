//! Remote item collection access. One attempt per call, no caching.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use shared::{
    domain::{Item, ItemId, ItemName},
    error::ApiError,
    protocol::{
        CreateItemRequest, CreateItemResponse, ListItemsResponse, UpdateItemRequest, ITEMS_PATH,
    },
};
use tracing::{debug, warn};
use url::Url;

use crate::error::SyncError;

#[async_trait]
pub trait RemoteGateway: Send + Sync {
    async fn list(&self) -> Result<Vec<Item>, SyncError>;
    async fn create(&self, name: &ItemName) -> Result<Item, SyncError>;
    async fn set_checked(&self, id: &ItemId, checked: bool) -> Result<(), SyncError>;
    async fn delete(&self, id: &ItemId) -> Result<(), SyncError>;
}

/// JSON-over-HTTP gateway for the `/api/items` resource.
#[derive(Clone)]
pub struct HttpGateway {
    http: Client,
    items_url: Url,
}

impl HttpGateway {
    pub fn new(server_url: &str) -> Result<Self, SyncError> {
        Self::with_client(Client::new(), server_url)
    }

    /// A zero timeout leaves the transport without one.
    pub fn with_timeout(server_url: &str, timeout: Duration) -> Result<Self, SyncError> {
        let mut builder = Client::builder();
        if !timeout.is_zero() {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|err| SyncError::Network(err.to_string()))?;
        Self::with_client(http, server_url)
    }

    pub fn with_client(http: Client, server_url: &str) -> Result<Self, SyncError> {
        let mut base = Url::parse(server_url.trim())
            .map_err(|err| SyncError::Validation(format!("invalid server url '{server_url}': {err}")))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let items_url = base
            .join(ITEMS_PATH)
            .map_err(|err| SyncError::Validation(format!("invalid server url '{server_url}': {err}")))?;
        Ok(Self { http, items_url })
    }

    pub fn items_url(&self) -> &Url {
        &self.items_url
    }

    fn item_url(&self, id: &ItemId) -> Result<Url, SyncError> {
        let mut url = self.items_url.clone();
        url.path_segments_mut()
            .map_err(|_| SyncError::Validation(format!("server url cannot carry item id {id}")))?
            .push(id.as_str());
        Ok(url)
    }
}

#[async_trait]
impl RemoteGateway for HttpGateway {
    async fn list(&self) -> Result<Vec<Item>, SyncError> {
        let res = self
            .http
            .get(self.items_url.clone())
            .send()
            .await
            .map_err(transport_error)?;
        let body: ListItemsResponse = check_status(res).await?.json().await.map_err(decode_error)?;
        let mut items = Vec::with_capacity(body.items.len());
        for listed in body.items {
            let id = listed.id.clone();
            match Item::try_from(listed) {
                Ok(item) => items.push(item),
                Err(err) => warn!(%id, %err, "skipping listed item"),
            }
        }
        debug!(count = items.len(), "listed items");
        Ok(items)
    }

    async fn create(&self, name: &ItemName) -> Result<Item, SyncError> {
        let res = self
            .http
            .post(self.items_url.clone())
            .json(&CreateItemRequest { name: name.clone() })
            .send()
            .await
            .map_err(transport_error)?;
        let body: CreateItemResponse =
            check_status(res).await?.json().await.map_err(decode_error)?;
        debug!(id = %body.id, "created item");
        Ok(body.into_item(name.clone()))
    }

    async fn set_checked(&self, id: &ItemId, checked: bool) -> Result<(), SyncError> {
        let res = self
            .http
            .patch(self.item_url(id)?)
            .json(&UpdateItemRequest::checked(checked))
            .send()
            .await
            .map_err(transport_error)?;
        check_status(res).await?;
        Ok(())
    }

    async fn delete(&self, id: &ItemId) -> Result<(), SyncError> {
        let res = self
            .http
            .delete(self.item_url(id)?)
            .send()
            .await
            .map_err(transport_error)?;
        check_status(res).await?;
        Ok(())
    }
}

async fn check_status(res: Response) -> Result<Response, SyncError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let message = res.json::<ApiError>().await.ok().map(|body| body.error);
    Err(match status {
        StatusCode::NOT_FOUND => {
            SyncError::NotFound(message.unwrap_or_else(|| "item not found".to_string()))
        }
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            SyncError::Validation(message.unwrap_or_else(|| "request rejected".to_string()))
        }
        _ => SyncError::Server {
            status: status.as_u16(),
            message,
        },
    })
}

fn transport_error(err: reqwest::Error) -> SyncError {
    SyncError::Network(err.to_string())
}

fn decode_error(err: reqwest::Error) -> SyncError {
    if err.is_decode() {
        SyncError::InvalidResponse(err.to_string())
    } else {
        SyncError::Network(err.to_string())
    }
}

#[cfg(test)]
#[path = "tests/gateway_tests.rs"]
mod tests;
