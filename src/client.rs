//! HTTP client for the provisioning API, used by the command line.

use crate::api::ErrorResponse;
use crate::core::{ProvisionerError, Result};
use crate::model::{
    Cluster, ClusterInstallation, CreateClusterRequest, CreateInstallationRequest,
    CreateMigrationRequest, Installation, Migration, UnlockRequest, UnlockResponse,
};
use reqwest::{Method, RequestBuilder, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct ProvisionerClient {
    base_url: String,
    http: reqwest::Client,
}

impl ProvisionerClient {
    pub fn new(server: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            base_url: server.trim_end_matches('/').to_string(),
            http,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http.request(method, format!("{}/api{}", self.base_url, path))
    }

    async fn send<T: DeserializeOwned>(builder: RequestBuilder) -> Result<T> {
        let response = check(builder.send().await?).await?;
        Ok(response.json().await?)
    }

    async fn send_json<B: Serialize, T: DeserializeOwned>(
        builder: RequestBuilder,
        body: &B,
    ) -> Result<T> {
        Self::send(builder.json(body)).await
    }

    pub async fn create_cluster(&self, request: &CreateClusterRequest) -> Result<Cluster> {
        Self::send_json(self.request(Method::POST, "/clusters"), request).await
    }

    pub async fn get_clusters(&self) -> Result<Vec<Cluster>> {
        Self::send(self.request(Method::GET, "/clusters")).await
    }

    pub async fn create_installation(
        &self,
        request: &CreateInstallationRequest,
    ) -> Result<Installation> {
        Self::send_json(self.request(Method::POST, "/installations"), request).await
    }

    pub async fn get_installations(&self) -> Result<Vec<Installation>> {
        Self::send(self.request(Method::GET, "/installations")).await
    }

    pub async fn get_cluster_installations(
        &self,
        installation_id: &str,
    ) -> Result<Vec<ClusterInstallation>> {
        Self::send(
            self.request(Method::GET, "/cluster_installations")
                .query(&[("installation_id", installation_id)]),
        )
        .await
    }

    pub async fn create_migration(&self, request: &CreateMigrationRequest) -> Result<Migration> {
        Self::send_json(self.request(Method::POST, "/migrations"), request).await
    }

    pub async fn get_migrations(&self) -> Result<Vec<Migration>> {
        Self::send(self.request(Method::GET, "/migrations")).await
    }

    pub async fn get_migration(&self, id: &str) -> Result<Migration> {
        Self::send(self.request(Method::GET, &format!("/migrations/{id}"))).await
    }

    pub async fn delete_migration(&self, id: &str) -> Result<()> {
        let builder = self.request(Method::DELETE, &format!("/migrations/{id}"));
        check(builder.send().await?).await?;
        Ok(())
    }

    pub async fn unlock_migration(&self, id: &str, request: &UnlockRequest) -> Result<bool> {
        let response: UnlockResponse = Self::send_json(
            self.request(Method::POST, &format!("/migrations/{id}/unlock")),
            request,
        )
        .await?;
        Ok(response.unlocked)
    }
}

/// Turns non-success responses into errors carrying the server's message.
async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorResponse>(&text)
        .map(|body| body.error)
        .unwrap_or(text);
    Err(ProvisionerError::Api {
        status: status.as_u16(),
        message,
    })
}
