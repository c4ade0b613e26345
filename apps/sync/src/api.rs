/// API client — the single point of entry for all remote profile store calls.
///
/// ARCHITECTURAL RULE: no other module may issue HTTP requests against the
/// profile store directly. All traffic MUST go through this module so that
/// bearer auth, status classification, and the update-verb fallback stay in
/// one place.
use reqwest::{Client, Method};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::errors::ApiError;

#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: String,
}

impl ApiClient {
    pub fn new(base_url: &str, token: &str, timeout_secs: u64) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(timeout_secs))
                .build()
                .expect("Failed to build HTTP client"),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    /// Fetches a collection or record as JSON.
    pub async fn get_json<R: DeserializeOwned>(&self, path: &str) -> Result<R, ApiError> {
        let response = self
            .client
            .get(self.url(path))
            .bearer_auth(&self.token)
            .send()
            .await?;
        let body = Self::require_success(response).await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Fetches JSON with query parameters (typeahead lookups).
    pub async fn get_json_query<R: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<R, ApiError> {
        let response = self
            .client
            .get(self.url(path))
            .query(query)
            .bearer_auth(&self.token)
            .send()
            .await?;
        let body = Self::require_success(response).await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Creates a record; returns the server's representation of it.
    pub async fn post_json<T: Serialize, R: DeserializeOwned>(
        &self,
        path: &str,
        payload: &T,
    ) -> Result<R, ApiError> {
        let response = self
            .client
            .post(self.url(path))
            .bearer_auth(&self.token)
            .json(payload)
            .send()
            .await?;
        let body = Self::require_success(response).await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Updates a record. Primary verb is PUT; if the server rejects it as
    /// unsupported (404/405), retries once with PATCH before giving up.
    pub async fn update_json<T: Serialize>(&self, path: &str, payload: &T) -> Result<(), ApiError> {
        match self.send_update(Method::PUT, path, payload).await {
            Err(e) if matches!(e, ApiError::Unsupported { .. }) => {
                warn!("PUT {} unsupported, falling back to PATCH", path);
                self.send_update(Method::PATCH, path, payload).await
            }
            other => other,
        }
    }

    /// Deletes a record. Callers decide whether 404/405 counts as converged
    /// (`ApiError::is_already_gone`).
    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        let response = self
            .client
            .delete(self.url(path))
            .bearer_auth(&self.token)
            .send()
            .await?;
        Self::require_success(response).await?;
        Ok(())
    }

    async fn send_update<T: Serialize>(
        &self,
        method: Method,
        path: &str,
        payload: &T,
    ) -> Result<(), ApiError> {
        let response = self
            .client
            .request(method.clone(), self.url(path))
            .bearer_auth(&self.token)
            .json(payload)
            .send()
            .await?;
        debug!("{method} {path} -> {}", response.status());
        Self::require_success(response).await?;
        Ok(())
    }

    /// Splits a response into its body on success, or a classified error.
    async fn require_success(response: reqwest::Response) -> Result<String, ApiError> {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if status.is_success() {
            Ok(body)
        } else {
            Err(ApiError::from_status(status.as_u16(), &body))
        }
    }

    fn url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn test_join_url_normalizes_slashes() {
        assert_eq!(
            join_url("https://api.example.org/", "/profile/education"),
            "https://api.example.org/profile/education"
        );
        assert_eq!(
            join_url("https://api.example.org", "profile/education/E1"),
            "https://api.example.org/profile/education/E1"
        );
    }

    /// Minimal HTTP/1.1 responder: one request per connection, response
    /// chosen by request method. Returns the request heads it saw.
    async fn serve(
        listener: TcpListener,
        connections: usize,
        respond: fn(&str) -> (u16, &'static str),
    ) -> Vec<String> {
        let mut seen = Vec::new();
        for _ in 0..connections {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            let (head, body_start) = loop {
                let n = socket.read(&mut chunk).await.unwrap();
                assert!(n > 0, "client closed before sending a full request");
                buf.extend_from_slice(&chunk[..n]);
                if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                    break (String::from_utf8_lossy(&buf[..pos]).to_string(), pos + 4);
                }
            };
            let content_length = head
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    if name.eq_ignore_ascii_case("content-length") {
                        value.trim().parse::<usize>().ok()
                    } else {
                        None
                    }
                })
                .unwrap_or(0);
            while buf.len() - body_start < content_length {
                let n = socket.read(&mut chunk).await.unwrap();
                assert!(n > 0, "client closed mid-body");
                buf.extend_from_slice(&chunk[..n]);
            }
            let method = head.split_whitespace().next().unwrap_or("").to_string();
            let (status, body) = respond(&method);
            let reason = match status {
                200 => "OK",
                204 => "No Content",
                401 => "Unauthorized",
                404 => "Not Found",
                405 => "Method Not Allowed",
                _ => "Error",
            };
            let response = format!(
                "HTTP/1.1 {status} {reason}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            seen.push(head);
        }
        seen
    }

    async fn client_against(
        respond: fn(&str) -> (u16, &'static str),
        connections: usize,
    ) -> (ApiClient, tokio::task::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(serve(listener, connections, respond));
        (ApiClient::new(&format!("http://{addr}"), "tok", 5), server)
    }

    #[tokio::test]
    async fn test_update_falls_back_to_patch_when_put_unsupported() {
        let (client, server) = client_against(
            |method| match method {
                "PUT" => (405, ""),
                "PATCH" => (204, ""),
                _ => (500, ""),
            },
            2,
        )
        .await;

        client
            .update_json("profile/education/E1", &serde_json::json!({"school": "MIT"}))
            .await
            .unwrap();

        let seen = server.await.unwrap();
        assert!(seen[0].starts_with("PUT /profile/education/E1"));
        assert!(seen[1].starts_with("PATCH /profile/education/E1"));
        assert!(seen[0].to_lowercase().contains("authorization: bearer tok"));
    }

    #[tokio::test]
    async fn test_update_gives_up_when_both_verbs_rejected() {
        let (client, server) = client_against(|_| (405, ""), 2).await;

        let err = client
            .update_json("profile/education/E1", &serde_json::json!({}))
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::Unsupported { status: 405 }));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_classifies_missing_record_as_already_gone() {
        let (client, server) = client_against(|_| (404, r#"{"message":"gone"}"#), 1).await;

        let err = client.delete("profile/education/E9").await.unwrap_err();
        assert!(err.is_already_gone());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_get_json_parses_collection() {
        let (client, server) =
            client_against(|_| (200, r#"[{"id":"E1","school":"MIT","degree":"BSc"}]"#), 1).await;

        let records: Vec<serde_json::Value> = client.get_json("profile/education").await.unwrap();
        assert_eq!(records[0]["id"], "E1");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_401_classifies_as_unauthorized() {
        let (client, server) = client_against(|_| (401, ""), 1).await;

        let err = client
            .get_json::<serde_json::Value>("profile/education")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized));
        server.await.unwrap();
    }
}
