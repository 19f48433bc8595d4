use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, trace};

use crate::function::config::ForwarderConfig;
use crate::function::errors::ForwardError;
use crate::security::token::AccessToken;

pub const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";
pub const NAME_HEADER: &str = "name";

/// Status and body of the backend's answer, relayed as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamResponse {
    pub status: u16,
    pub body: String,
}

/// POSTs to the backend trigger behind API Management.
#[derive(Debug, Clone)]
pub struct ApimClient {
    target_url: String,
    subscription_key: String,
    timeout: Option<Duration>,
    http_client: Client,
}

impl ApimClient {
    pub fn new(config: &ForwarderConfig, http_client: Client) -> Self {
        Self {
            target_url: config.target_url(),
            subscription_key: config.subscription_key.clone(),
            timeout: config.apim_timeout,
            http_client,
        }
    }

    pub fn target_url(&self) -> &str {
        &self.target_url
    }

    fn build_headers(&self, token: &AccessToken, name: Option<&str>) -> Result<HeaderMap, ForwardError> {
        let mut headers = HeaderMap::new();

        let mut bearer = HeaderValue::from_str(&format!("Bearer {}", token.secret()))
            .map_err(|_| ForwardError::InvalidHeader("authorization"))?;
        bearer.set_sensitive(true);
        headers.insert(AUTHORIZATION, bearer);

        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let mut key = HeaderValue::from_str(&self.subscription_key)
            .map_err(|_| ForwardError::InvalidHeader("subscription key"))?;
        key.set_sensitive(true);
        headers.insert(HeaderName::from_static("ocp-apim-subscription-key"), key);

        if let Some(name) = name {
            let value =
                HeaderValue::from_str(name).map_err(|_| ForwardError::InvalidHeader("name"))?;
            headers.insert(HeaderName::from_static(NAME_HEADER), value);
        }

        Ok(headers)
    }

    /// Send the bodiless POST and collect the backend's status and text.
    pub async fn forward(
        &self,
        token: &AccessToken,
        name: Option<&str>,
    ) -> Result<UpstreamResponse, ForwardError> {
        let headers = self.build_headers(token, name)?;

        trace!(
            url = %self.target_url,
            has_name = name.is_some(),
            "sending backend request"
        );

        let mut request = self.http_client.post(&self.target_url).headers(headers);
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await.map_err(ForwardError::from_transport)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(ForwardError::from_transport)?;

        debug!(status, body_len = body.len(), "backend responded");
        Ok(UpstreamResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::settings::Settings;
    use mockito::{Matcher, Server};

    const PATH: &str = "/fa_adtest_backend/fa_adtest_backend_trigger";

    fn client_for(base_url: &str, timeout: Option<&str>) -> ApimClient {
        let mut pairs = vec![
            ("BACKEND_CLIENT_ID", "api://backend".to_string()),
            ("TENANT_ID", "tenant".to_string()),
            ("APIM_NAME", "contoso-apim".to_string()),
            ("BACKEND_NAME", "fa_adtest_backend".to_string()),
            ("APIM_SUBSCRIPTION_KEY", "sub-key".to_string()),
            ("APIM_BASE_URL", base_url.to_string()),
            ("FUNCTION_AUTH_LEVEL", "anonymous".to_string()),
        ];
        if let Some(t) = timeout {
            pairs.push(("APIM_TIMEOUT_SECS", t.to_string()));
        }
        let config = ForwarderConfig::from_settings(&Settings::from_pairs(pairs)).unwrap();
        ApimClient::new(&config, Client::new())
    }

    #[tokio::test]
    async fn forward_sends_expected_headers() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", PATH)
            .match_header("Authorization", Matcher::Exact("Bearer backend-token".into()))
            .match_header("Content-Type", Matcher::Exact("application/json".into()))
            .match_header(SUBSCRIPTION_KEY_HEADER, Matcher::Exact("sub-key".into()))
            .match_header(NAME_HEADER, Matcher::Exact("test".into()))
            .match_body(Matcher::Exact(String::new()))
            .with_status(200)
            .with_body("ok")
            .create_async()
            .await;

        let client = client_for(&server.url(), None);
        let token = AccessToken::expiring_in("backend-token", 3600);
        let upstream = client.forward(&token, Some("test")).await.unwrap();

        assert_eq!(upstream, UpstreamResponse { status: 200, body: "ok".into() });
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn forward_omits_absent_name() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", PATH)
            .match_header(NAME_HEADER, Matcher::Missing)
            .with_status(404)
            .with_body("not here")
            .create_async()
            .await;

        let client = client_for(&server.url(), None);
        let token = AccessToken::expiring_in("t", 3600);
        let upstream = client.forward(&token, None).await.unwrap();

        assert_eq!(upstream.status, 404);
        assert_eq!(upstream.body, "not here");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn forward_keeps_empty_name() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", PATH)
            .match_header(NAME_HEADER, Matcher::Exact(String::new()))
            .with_status(200)
            .create_async()
            .await;

        let client = client_for(&server.url(), None);
        let token = AccessToken::expiring_in("t", 3600);
        client.forward(&token, Some("")).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn forward_rejects_unrepresentable_name() {
        let client = client_for("http://127.0.0.1:9", None);
        let token = AccessToken::expiring_in("t", 3600);
        let err = client.forward(&token, Some("line\nbreak")).await.unwrap_err();
        assert!(matches!(err, ForwardError::InvalidHeader("name")));
    }

    #[tokio::test]
    async fn forward_unreachable_gateway() {
        // Port 9 (discard) is not listening on test hosts.
        let client = client_for("http://127.0.0.1:9", None);
        let token = AccessToken::expiring_in("t", 3600);
        let err = client.forward(&token, None).await.unwrap_err();
        assert!(matches!(err, ForwardError::UpstreamUnavailable(_)));
        assert_eq!(err.status(), axum::http::StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn forward_slow_gateway_times_out() {
        // Accepts the connection and never answers.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let silent = tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let client = client_for(&format!("http://{}", addr), Some("1"));
        let token = AccessToken::expiring_in("t", 3600);
        let started = std::time::Instant::now();
        let err = client.forward(&token, Some("test")).await.unwrap_err();

        assert!(matches!(err, ForwardError::UpstreamTimeout));
        assert_eq!(err.status(), axum::http::StatusCode::GATEWAY_TIMEOUT);
        assert!(started.elapsed() < Duration::from_secs(10));
        silent.abort();
    }
}
