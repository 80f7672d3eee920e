use anyhow::{Context, Result, bail};
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, de::DeserializeOwned};
use shared::{
    config::server::Config,
    models::{
        HistoryQuery, Identity, InteractionRequest, Message, Notification, PublicProfile,
        RecentMessagesResponse, SeenResponse, SendMessageRequest,
    },
};
use url::Url;

/// Problem document returned by the server for failed requests.
#[derive(Debug, Deserialize)]
struct Problem {
    code: String,
    message: String,
}

/// Thin HTTP client for the Beacon API. Every request carries the caller's
/// identity in the configured header.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    api_base: Url,
    identity: Identity,
    identity_header: String,
}

impl ApiClient {
    /// # Errors
    /// Returns an error if `server` is not a valid base URL.
    pub fn new(server: &str, identity: Identity, identity_header: &str) -> Result<Self> {
        let mut base = Url::parse(server).context("invalid server URL")?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let api_base = base.join("api/").context("invalid API base")?;

        Ok(Self {
            http: Client::new(),
            api_base,
            identity,
            identity_header: identity_header.to_string(),
        })
    }

    /// Resolves the server URL: explicit flag, then the configured public
    /// URL, then the configured port on localhost.
    #[must_use]
    pub fn server_url(explicit: Option<&str>, config: &Config) -> String {
        if let Some(server) = explicit {
            return server.to_string();
        }
        config.server.public_base_url.as_ref().map_or_else(
            || format!("http://localhost:{}", config.server.port),
            ToString::to_string,
        )
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.api_base
            .join(path)
            .with_context(|| format!("invalid endpoint '{path}'"))
    }

    fn request(&self, method: reqwest::Method, path: &str) -> Result<RequestBuilder> {
        Ok(self
            .http
            .request(method, self.endpoint(path)?)
            .header(self.identity_header.as_str(), self.identity.as_str()))
    }

    async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> Result<T> {
        let response = request
            .send()
            .await
            .with_context(|| format!("failed to {what}"))?;
        let response = check(response, what).await?;
        response
            .json()
            .await
            .with_context(|| format!("unexpected response while trying to {what}"))
    }

    /// # Errors
    /// Returns the server's problem message on rejection.
    pub async fn send(&self, request: &SendMessageRequest) -> Result<Message> {
        let builder = self.request(reqwest::Method::POST, "messages")?.json(request);
        self.execute(builder, "send message").await
    }

    /// # Errors
    /// Returns the server's problem message on rejection.
    pub async fn history(&self, peer: &Identity, query: HistoryQuery) -> Result<Vec<Message>> {
        let mut builder =
            self.request(reqwest::Method::GET, &format!("conversations/{peer}/messages"))?;
        if let Some(page) = query.page {
            builder = builder.query(&[("page", page)]);
        }
        if let Some(limit) = query.limit {
            builder = builder.query(&[("limit", limit)]);
        }
        self.execute(builder, "fetch history").await
    }

    /// # Errors
    /// Returns the server's problem message on rejection.
    pub async fn recent(&self) -> Result<Vec<Message>> {
        let builder = self.request(reqwest::Method::GET, "messages/recent")?;
        let response: RecentMessagesResponse =
            self.execute(builder, "fetch recent messages").await?;
        Ok(response.messages)
    }

    /// # Errors
    /// Returns the server's problem message on rejection.
    pub async fn mark_conversation_seen(&self, peer: &Identity) -> Result<u64> {
        let builder =
            self.request(reqwest::Method::POST, &format!("conversations/{peer}/seen"))?;
        let response: SeenResponse = self.execute(builder, "mark conversation seen").await?;
        Ok(response.updated)
    }

    /// # Errors
    /// Returns the server's problem message on rejection.
    pub async fn notifications(&self) -> Result<Vec<Notification>> {
        let builder = self.request(reqwest::Method::GET, "notifications")?;
        self.execute(builder, "fetch notifications").await
    }

    /// # Errors
    /// Returns the server's problem message on rejection.
    pub async fn interact(&self, request: &InteractionRequest) -> Result<Notification> {
        let builder = self
            .request(reqwest::Method::POST, "interactions")?
            .json(request);
        self.execute(builder, "send interaction").await
    }

    /// # Errors
    /// Returns the server's problem message on rejection.
    pub async fn profile(&self, identity: &Identity) -> Result<PublicProfile> {
        let builder = self.request(reqwest::Method::GET, &format!("profiles/{identity}"))?;
        self.execute(builder, "fetch profile").await
    }

    /// Opens the push stream. The returned response body is the event stream.
    ///
    /// # Errors
    /// Returns an error if the connection fails or the server rejects it.
    pub async fn open_stream(&self) -> Result<Response> {
        let response = self
            .request(reqwest::Method::GET, "stream")?
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await
            .context("failed to open stream")?;
        check(response, "open stream").await
    }
}

async fn check(response: Response, what: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    match serde_json::from_str::<Problem>(&body) {
        Ok(problem) => bail!(
            "could not {what}: {} ({} {})",
            problem.message,
            status.as_u16(),
            problem.code
        ),
        Err(_) => bail!("could not {what}: {status} {body}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_base_keeps_path_prefix() {
        let client = ApiClient::new("http://example.test/beacon", "alice".into(), "x-id").unwrap();
        assert_eq!(
            client.endpoint("messages").unwrap().as_str(),
            "http://example.test/beacon/api/messages"
        );

        let root = ApiClient::new("http://example.test", "alice".into(), "x-id").unwrap();
        assert_eq!(
            root.endpoint("conversations/bob/messages").unwrap().as_str(),
            "http://example.test/api/conversations/bob/messages"
        );
    }

    #[test]
    fn invalid_server_url_is_rejected() {
        assert!(ApiClient::new("not a url", "alice".into(), "x-id").is_err());
    }

    #[test]
    fn server_url_prefers_flag_then_config() {
        let mut config = Config::default();
        config.server.port = 9100;
        assert_eq!(ApiClient::server_url(None, &config), "http://localhost:9100");
        assert_eq!(
            ApiClient::server_url(Some("http://beacon.test"), &config),
            "http://beacon.test"
        );

        config.server.public_base_url = Some(Url::parse("https://chat.example/").unwrap());
        assert_eq!(ApiClient::server_url(None, &config), "https://chat.example/");
    }
}
