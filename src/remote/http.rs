//! reqwest-backed [`RemoteGateway`].

use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;

use super::gateway::RemoteGateway;
use super::{Collection, HealthInfo, ListPage, ListQuery, LockState, RemoteError, ServerUrl};

/// Per-phase timeouts. Kept short so a hung network cannot wedge a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatewayTimeouts {
    pub connect: Duration,
    pub read: Duration,
    pub request: Duration,
}

impl Default for GatewayTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(5),
            read: Duration::from_secs(5),
            request: Duration::from_secs(8),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: reqwest::Client,
    api_key: Option<String>,
}

impl HttpGateway {
    pub fn new(timeouts: GatewayTimeouts, api_key: Option<String>) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeouts.connect)
            .read_timeout(timeouts.read)
            .timeout(timeouts.request)
            .build()
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        Ok(Self { client, api_key })
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Response, RemoteError> {
        self.authorize(request)
            .send()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))
    }
}

/// Turns a non-2xx answer into [`RemoteError::Server`].
async fn check(response: Response) -> Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(RemoteError::Server {
        status: status.as_u16(),
        message,
    })
}

async fn read_json(response: Response) -> Result<Value, RemoteError> {
    response.json::<Value>().await.map_err(|e| {
        if e.is_timeout() {
            RemoteError::Network(e.to_string())
        } else {
            RemoteError::Decode(e.to_string())
        }
    })
}

fn decode_lock(value: Value) -> Result<LockState, RemoteError> {
    serde_json::from_value(value).map_err(|e| RemoteError::Decode(e.to_string()))
}

fn entity_path(collection: Collection, id: i64) -> String {
    format!("{}/{}", collection.path(), id)
}

fn lock_path(entity_id: i64) -> String {
    format!("locks/{}", entity_id)
}

#[async_trait]
impl RemoteGateway for HttpGateway {
    async fn health(&self, base: &ServerUrl) -> Result<HealthInfo, RemoteError> {
        let response = self.send(self.client.get(base.join("health"))).await?;
        let value = read_json(check(response).await?).await?;
        serde_json::from_value(value).map_err(|e| RemoteError::Decode(e.to_string()))
    }

    async fn list(
        &self,
        base: &ServerUrl,
        collection: Collection,
        query: &ListQuery,
    ) -> Result<ListPage, RemoteError> {
        let request = self
            .client
            .get(base.join(collection.path()))
            .query(&query.to_pairs());
        let response = self.send(request).await?;
        ListPage::from_value(read_json(check(response).await?).await?)
    }

    async fn get(
        &self,
        base: &ServerUrl,
        collection: Collection,
        id: i64,
    ) -> Result<Option<Value>, RemoteError> {
        let response = self
            .send(self.client.get(base.join(&entity_path(collection, id))))
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(read_json(check(response).await?).await?))
    }

    async fn create(
        &self,
        base: &ServerUrl,
        collection: Collection,
        body: &Value,
    ) -> Result<Value, RemoteError> {
        let response = self
            .send(self.client.post(base.join(collection.path())).json(body))
            .await?;
        read_json(check(response).await?).await
    }

    async fn update(
        &self,
        base: &ServerUrl,
        collection: Collection,
        id: i64,
        body: &Value,
    ) -> Result<Value, RemoteError> {
        let response = self
            .send(
                self.client
                    .put(base.join(&entity_path(collection, id)))
                    .json(body),
            )
            .await?;
        read_json(check(response).await?).await
    }

    async fn delete(
        &self,
        base: &ServerUrl,
        collection: Collection,
        id: i64,
    ) -> Result<(), RemoteError> {
        let response = self
            .send(self.client.delete(base.join(&entity_path(collection, id))))
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        check(response).await.map(|_| ())
    }

    async fn lock_query(
        &self,
        base: &ServerUrl,
        entity_id: i64,
    ) -> Result<LockState, RemoteError> {
        let response = self
            .send(self.client.get(base.join(&lock_path(entity_id))))
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(LockState::unlocked());
        }
        decode_lock(read_json(check(response).await?).await?)
    }

    async fn lock_acquire(
        &self,
        base: &ServerUrl,
        entity_id: i64,
        holder_device: &str,
    ) -> Result<LockState, RemoteError> {
        let request = self
            .client
            .post(base.join(&lock_path(entity_id)))
            .json(&json!({ "device_id": holder_device }));
        let response = self.send(request).await?;
        if response.status() == StatusCode::CONFLICT {
            let current = read_json(response).await.and_then(decode_lock)?;
            return Err(RemoteError::Conflict(current));
        }
        decode_lock(read_json(check(response).await?).await?)
    }

    async fn lock_release(
        &self,
        base: &ServerUrl,
        entity_id: i64,
        holder_device: &str,
    ) -> Result<(), RemoteError> {
        let request = self
            .client
            .delete(base.join(&lock_path(entity_id)))
            .query(&[("device_id", holder_device)]);
        let response = self.send(request).await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(()),
            StatusCode::CONFLICT => {
                let current = read_json(response).await.and_then(decode_lock)?;
                Err(RemoteError::Conflict(current))
            }
            _ => check(response).await.map(|_| ()),
        }
    }
}
