//! REST adapter for the remote build and release service.

use super::{
    ArtifactSource, BuildTrigger, EntityQuery, EntityRegistry, GroupBuildHandle,
    GroupBuildRequest, GroupBuildStatus, Milestone, MilestoneState, PromotionReceipt,
    PromotionRequest, ReleaseService, RemoteEntity, RemoteError,
};
use crate::core::{ArtifactRef, ComponentBuild};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

/// HTTP client implementing every remote contract against one base URL.
#[derive(Debug, Clone)]
pub struct RestClient {
    client: Client,
    base_url: Url,
}

impl RestClient {
    /// Builds a client for the service at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError::Transport` if the URL is invalid or the client
    /// cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RemoteError> {
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        let base_url = Url::parse(&normalized).map_err(|err| RemoteError::Transport(err.to_string()))?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| RemoteError::Transport(err.to_string()))?;
        Ok(Self { client, base_url })
    }

    fn url(&self, path: &str) -> Result<Url, RemoteError> {
        self.base_url
            .join(path)
            .map_err(|err| RemoteError::Transport(err.to_string()))
    }

    async fn get_json<T: DeserializeOwned>(&self, entity: &str, path: &str) -> Result<T, RemoteError> {
        debug!(path, "GET");
        let resp = self
            .client
            .get(self.url(path)?)
            .send()
            .await
            .map_err(|err| RemoteError::Transport(err.to_string()))?;
        Self::decode_response(entity, path, resp).await
    }

    async fn get_json_query<T: DeserializeOwned>(
        &self,
        entity: &str,
        path: &str,
        query: &EntityQuery,
    ) -> Result<T, RemoteError> {
        debug!(path, ?query, "GET");
        let resp = self
            .client
            .get(self.url(path)?)
            .query(&query.fields)
            .send()
            .await
            .map_err(|err| RemoteError::Transport(err.to_string()))?;
        Self::decode_response(entity, path, resp).await
    }

    async fn send_json<B, T>(
        &self,
        method: reqwest::Method,
        entity: &str,
        path: &str,
        body: &B,
    ) -> Result<T, RemoteError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        debug!(path, %method, "request");
        let resp = self
            .client
            .request(method, self.url(path)?)
            .json(body)
            .send()
            .await
            .map_err(|err| RemoteError::Transport(err.to_string()))?;
        Self::decode_response(entity, path, resp).await
    }

    async fn decode_response<T: DeserializeOwned>(
        entity: &str,
        path: &str,
        resp: Response,
    ) -> Result<T, RemoteError> {
        let status = resp.status();
        if status.is_success() {
            return resp
                .json::<T>()
                .await
                .map_err(|err| RemoteError::Transport(err.to_string()));
        }
        let reason = resp
            .text()
            .await
            .unwrap_or_else(|err| format!("response body error: {err}"));
        match status {
            StatusCode::NOT_FOUND => Err(RemoteError::not_found(entity, path)),
            StatusCode::CONFLICT => Err(RemoteError::conflict(entity, reason)),
            _ => Err(RemoteError::Rejected {
                status: status.as_u16(),
                message: reason,
            }),
        }
    }
}

fn not_found_as_none<T>(result: Result<T, RemoteError>) -> Result<Option<T>, RemoteError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(RemoteError::NotFound { .. }) => Ok(None),
        Err(err) => Err(err),
    }
}

#[async_trait]
impl<E: RemoteEntity> EntityRegistry<E> for RestClient {
    async fn create(&self, entity: E) -> Result<E, RemoteError> {
        let kind = E::KIND;
        self.send_json(reqwest::Method::POST, &kind.to_string(), kind.path(), &entity)
            .await
    }

    async fn get(&self, id: &str) -> Result<Option<E>, RemoteError> {
        let kind = E::KIND;
        let path = format!("{}/{id}", kind.path());
        not_found_as_none(self.get_json(&kind.to_string(), &path).await)
    }

    async fn list(&self, query: &EntityQuery) -> Result<Vec<E>, RemoteError> {
        let kind = E::KIND;
        self.get_json_query(&kind.to_string(), kind.path(), query).await
    }

    async fn update(&self, entity: E) -> Result<E, RemoteError> {
        let kind = E::KIND;
        let path = format!("{}/{}", kind.path(), entity.id());
        self.send_json(reqwest::Method::PUT, &kind.to_string(), &path, &entity)
            .await
    }
}

#[async_trait]
impl BuildTrigger for RestClient {
    async fn latest_build(
        &self,
        _component: &str,
        config_id: &str,
    ) -> Result<Option<ComponentBuild>, RemoteError> {
        let path = format!("build-configs/{config_id}/latest-build");
        not_found_as_none(self.get_json("build", &path).await)
    }

    async fn submit_group_build(
        &self,
        request: &GroupBuildRequest,
    ) -> Result<GroupBuildHandle, RemoteError> {
        let path = format!("group-configs/{}/builds", request.group_config_id);
        self.send_json(reqwest::Method::POST, "group build", &path, request)
            .await
    }

    async fn status(&self, handle: &GroupBuildHandle) -> Result<GroupBuildStatus, RemoteError> {
        self.get_json("group build", &format!("group-builds/{}", handle.id))
            .await
    }
}

#[async_trait]
impl ReleaseService for RestClient {
    async fn milestone_state(&self, milestone_id: &str) -> Result<MilestoneState, RemoteError> {
        let milestone: Milestone = self
            .get_json("milestone", &format!("product-milestones/{milestone_id}"))
            .await?;
        Ok(if milestone.closed {
            MilestoneState::Closed
        } else {
            MilestoneState::Open
        })
    }

    async fn promotion(&self, milestone_id: &str) -> Result<Option<PromotionReceipt>, RemoteError> {
        let path = format!("product-milestones/{milestone_id}/promotion");
        not_found_as_none(self.get_json("promotion", &path).await)
    }

    async fn promote(&self, request: &PromotionRequest) -> Result<PromotionReceipt, RemoteError> {
        let path = format!("product-milestones/{}/promote", request.milestone_id);
        self.send_json(reqwest::Method::POST, "milestone", &path, request)
            .await
    }

    async fn close_milestone(&self, milestone_id: &str) -> Result<(), RemoteError> {
        let path = format!("product-milestones/{milestone_id}/close");
        let _: serde_json::Value = self
            .send_json(reqwest::Method::POST, "milestone", &path, &serde_json::json!({}))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ArtifactSource for RestClient {
    async fn repository_artifacts(
        &self,
        build: &ComponentBuild,
    ) -> Result<Vec<ArtifactRef>, RemoteError> {
        self.get_json("build", &format!("builds/{}/repository-artifacts", build.build_id))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_is_normalized() {
        let client = RestClient::new("http://localhost:8080/api", Duration::from_secs(5)).unwrap();
        assert_eq!(
            client.url("products").unwrap().as_str(),
            "http://localhost:8080/api/products"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            RestClient::new("not a url", Duration::from_secs(5)),
            Err(RemoteError::Transport(_))
        ));
    }

    #[test]
    fn test_not_found_as_none() {
        let missing: Result<u8, RemoteError> = Err(RemoteError::not_found("build", "1"));
        assert_eq!(not_found_as_none(missing).unwrap(), None);
        let failed: Result<u8, RemoteError> = Err(RemoteError::Transport("down".to_string()));
        assert!(not_found_as_none(failed).is_err());
    }
}
