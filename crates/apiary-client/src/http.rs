//! Platform REST client.
//!
//! Every call is non-blocking and returns-or-fails on its own; callers decide
//! what a failure means (reconciliation skips and retries, batch operations
//! record the item as failed).

use apiary_core::config::PlatformConfig;
use apiary_core::error::{ApiaryError, Result};
use apiary_core::traits::Platform;
use apiary_core::types::{
    AttachmentAction, MembershipRef, MessageRef, OutgoingMessage, PersonRef, RoomRef,
    WebhookRef, WebhookRequest,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

/// List endpoints wrap their results in an `items` array.
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: DeserializeOwned"))]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

/// reqwest-backed [`Platform`] implementation.
pub struct HttpPlatform {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpPlatform {
    pub fn new(config: &PlatformConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        debug!("platform GET {url}");
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| ApiaryError::Platform(format!("GET {path} failed: {e}")))?;
        Self::parse(path, resp).await
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T> {
        let url = self.url(path);
        debug!("platform POST {url}");
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await
            .map_err(|e| ApiaryError::Platform(format!("POST {path} failed: {e}")))?;
        Self::parse(path, resp).await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let url = self.url(path);
        debug!("platform DELETE {url}");
        let resp = self
            .client
            .delete(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| ApiaryError::Platform(format!("DELETE {path} failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiaryError::Platform(format!(
                "DELETE {path} failed (HTTP {status}): {body}"
            )));
        }
        Ok(())
    }

    async fn parse<T: DeserializeOwned>(path: &str, resp: reqwest::Response) -> Result<T> {
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| ApiaryError::Platform(format!("{path}: failed to read body: {e}")))?;

        if !status.is_success() {
            return Err(ApiaryError::Platform(format!(
                "{path} failed (HTTP {status}): {body}"
            )));
        }

        serde_json::from_str(&body)
            .map_err(|e| ApiaryError::Platform(format!("{path}: failed to parse response: {e}")))
    }
}

#[async_trait]
impl Platform for HttpPlatform {
    async fn me(&self) -> Result<PersonRef> {
        self.get_json("/people/me").await
    }

    async fn person(&self, id: &str) -> Result<PersonRef> {
        self.get_json(&format!("/people/{id}")).await
    }

    async fn room(&self, id: &str) -> Result<RoomRef> {
        self.get_json(&format!("/rooms/{id}")).await
    }

    async fn rooms(&self) -> Result<Vec<RoomRef>> {
        let list: ListResponse<RoomRef> = self.get_json("/rooms").await?;
        Ok(list.items)
    }

    async fn delete_room(&self, id: &str) -> Result<()> {
        self.delete(&format!("/rooms/{id}")).await
    }

    async fn membership(&self, id: &str) -> Result<MembershipRef> {
        self.get_json(&format!("/memberships/{id}")).await
    }

    async fn memberships(&self, room_id: &str) -> Result<Vec<MembershipRef>> {
        let list: ListResponse<MembershipRef> =
            self.get_json(&format!("/memberships?roomId={room_id}")).await?;
        Ok(list.items)
    }

    async fn add_membership(&self, room_id: &str, email: &str) -> Result<MembershipRef> {
        self.post_json(
            "/memberships",
            &json!({ "roomId": room_id, "personEmail": email }),
        )
        .await
    }

    async fn delete_membership(&self, id: &str) -> Result<()> {
        self.delete(&format!("/memberships/{id}")).await
    }

    async fn message(&self, id: &str) -> Result<MessageRef> {
        self.get_json(&format!("/messages/{id}")).await
    }

    async fn send_to_room(&self, room_id: &str, message: &OutgoingMessage) -> Result<MessageRef> {
        let mut body = serde_json::to_value(message)?;
        body["roomId"] = json!(room_id);
        self.post_json("/messages", &body).await
    }

    async fn send_to_person(&self, email: &str, message: &OutgoingMessage) -> Result<MessageRef> {
        let mut body = serde_json::to_value(message)?;
        body["toPersonEmail"] = json!(email);
        self.post_json("/messages", &body).await
    }

    async fn webhooks(&self) -> Result<Vec<WebhookRef>> {
        let list: ListResponse<WebhookRef> = self.get_json("/webhooks").await?;
        Ok(list.items)
    }

    async fn create_webhook(&self, request: &WebhookRequest) -> Result<WebhookRef> {
        let body = serde_json::to_value(request)?;
        self.post_json("/webhooks", &body).await
    }

    async fn delete_webhook(&self, id: &str) -> Result<()> {
        self.delete(&format!("/webhooks/{id}")).await
    }

    async fn attachment_action(&self, id: &str) -> Result<AttachmentAction> {
        self.get_json(&format!("/attachment/actions/{id}")).await
    }

    async fn content(&self, url: &str) -> Result<Vec<u8>> {
        let resp = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| ApiaryError::Platform(format!("content fetch failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ApiaryError::Platform(format!(
                "content fetch failed (HTTP {status})"
            )));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| ApiaryError::Platform(format!("content read failed: {e}")))?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_join_strips_trailing_slash() {
        let platform = HttpPlatform::new(&PlatformConfig {
            base_url: "https://api.example.com/v1/".into(),
            token: "t".into(),
        });
        assert_eq!(
            platform.url("/rooms/abc"),
            "https://api.example.com/v1/rooms/abc"
        );
    }

    #[test]
    fn test_list_response_tolerates_missing_items() {
        let list: ListResponse<RoomRef> = serde_json::from_str("{}").unwrap();
        assert!(list.items.is_empty());
    }
}
