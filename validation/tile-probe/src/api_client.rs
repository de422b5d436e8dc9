//! REST client for the volume backend: login, volume listing, `info` and
//! the admin endpoints.

use crate::error::{ProbeError, ProbeResult};
use crate::session::Session;
use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use volume_common::{
    LoginResponse, MemoryStatus, MessageResponse, VolumeInfo, VolumeList, VolumeSummary,
};

#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Exchange credentials for a session.
    pub async fn login(&self, username: &str, password: &str) -> ProbeResult<Session> {
        let endpoint = format!("{}/api/v1/auth/token", self.base_url);
        let response = self
            .client
            .post(&endpoint)
            .form(&[("username", username), ("password", password)])
            .send()
            .await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(ProbeError::Unauthorized(format!(
                "invalid credentials for '{}'",
                username
            )));
        }
        let login: LoginResponse = decode(&endpoint, response).await?;
        let session = Session::from_login(login);
        tracing::info!(login_id = %session.login_id(), role = %session.role(), "Logged in");
        Ok(session)
    }

    /// List converted volumes visible to the session.
    pub async fn list_volumes(&self, session: &Session) -> ProbeResult<Vec<VolumeSummary>> {
        let endpoint = format!("{}/api/volumes", self.base_url);
        let response = self
            .client
            .get(&endpoint)
            .header(AUTHORIZATION, session.bearer())
            .send()
            .await?;

        reject_session(session, &endpoint, response.status())?;
        let list: VolumeList = decode(&endpoint, response).await?;
        if list.count != list.volumes.len() {
            tracing::warn!(
                count = list.count,
                listed = list.volumes.len(),
                "Volume count does not match listing"
            );
        }
        Ok(list.volumes)
    }

    /// Fetch the precomputed `info` document of a volume under `mount`.
    pub async fn volume_info(&self, mount: &str, volume: &str) -> ProbeResult<VolumeInfo> {
        let endpoint = format!("{}/{}/info", mount.trim_end_matches('/'), volume);
        let response = self.client.get(&endpoint).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(ProbeError::VolumeNotFound(volume.to_string()));
        }
        let info: VolumeInfo = decode(&endpoint, response).await?;
        info.validate()?;
        Ok(info)
    }

    /// Server memory and cache usage.
    pub async fn memory_status(&self, session: &Session) -> ProbeResult<MemoryStatus> {
        let endpoint = format!("{}/api/v1/memory-status", self.base_url);
        let response = self
            .client
            .get(&endpoint)
            .header(AUTHORIZATION, session.bearer())
            .send()
            .await?;

        reject_session(session, &endpoint, response.status())?;
        decode(&endpoint, response).await
    }

    /// Delete a converted volume. The backend only allows this for admins and
    /// removes the data in the background.
    pub async fn delete_volume(&self, session: &Session, volume: &str) -> ProbeResult<String> {
        let mut url = reqwest::Url::parse(&format!("{}/api/volumes", self.base_url))
            .map_err(|e| ProbeError::InvalidUrl(format!("{}: {}", self.base_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| ProbeError::InvalidUrl(self.base_url.clone()))?
            .push(volume);
        let endpoint = url.to_string();

        let response = self
            .client
            .delete(url)
            .header(AUTHORIZATION, session.bearer())
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(ProbeError::VolumeNotFound(volume.to_string()));
        }
        reject_session(session, &endpoint, response.status())?;
        let ack: MessageResponse = decode(&endpoint, response).await?;
        tracing::info!(volume, login_id = %session.login_id(), "Volume deletion requested");
        Ok(ack.message)
    }
}

fn reject_session(session: &Session, endpoint: &str, status: StatusCode) -> ProbeResult<()> {
    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        return Err(ProbeError::Unauthorized(format!(
            "session for '{}' rejected by {}",
            session.login_id(),
            endpoint
        )));
    }
    Ok(())
}

async fn decode<T: DeserializeOwned>(endpoint: &str, response: reqwest::Response) -> ProbeResult<T> {
    let status = response.status();
    if !status.is_success() {
        return Err(ProbeError::UnexpectedStatus {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
        });
    }
    let body = response.bytes().await?;
    serde_json::from_slice(&body).map_err(|e| ProbeError::Schema {
        endpoint: endpoint.to_string(),
        message: e.to_string(),
    })
}
