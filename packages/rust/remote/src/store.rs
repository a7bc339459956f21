//! REST remote object store with basic auth, plus the parent/child link webhook.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use coursepress_core::services::{LinkOutcome, CheckResult, RemoteStore};
use coursepress_shared::{
    ApiKey, CollectionsConfig, NodeKind, PublishError, RemoteConfig, RemoteCredentials,
    RemoteObject, Result,
};

use crate::http;

/// Path of the link webhook under the base URL when none is configured.
const DEFAULT_LINK_PATH: &str = "coursepress/v1/link";

/// Publication status sent with every created object.
const PUBLISH_STATUS: &str = "publish";

/// HTTP client for the remote store.
pub struct HttpRemoteStore {
    client: Client,
    base_url: String,
    api_root: String,
    link_url: String,
    collections: CollectionsConfig,
    username: String,
    password: ApiKey,
}

#[derive(Debug, Serialize)]
struct CreateBody<'a> {
    title: &'a str,
    content: &'a str,
    status: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct CreatedObject {
    id: serde_json::Value,
    #[serde(default)]
    link: String,
}

#[derive(Debug, Serialize)]
struct LinkBody<'a> {
    parent_id: &'a str,
    child_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct LinkResponse {
    #[serde(default = "default_true")]
    success: bool,
    #[serde(default)]
    error: Option<String>,
}

fn default_true() -> bool {
    true
}

impl HttpRemoteStore {
    pub fn new(config: &RemoteConfig, credentials: &RemoteCredentials) -> Result<Self> {
        let base_url = http::parse_base_url(&config.base_url, "[remote].base_url")?;
        let link_url = match &config.link_webhook_url {
            Some(url) => http::parse_base_url(url, "[remote].link_webhook_url")?,
            None => http::join(&base_url, &[DEFAULT_LINK_PATH]),
        };

        Ok(Self {
            client: http::build_client(config.timeout_secs)?,
            base_url,
            api_root: config.api_root.clone(),
            link_url,
            collections: config.collections.clone(),
            username: credentials.username.clone(),
            password: credentials.password.clone(),
        })
    }

    fn collection_url(&self, collection: &str) -> String {
        http::join(&self.base_url, &[&self.api_root, collection])
    }

    fn collection_for(&self, kind: NodeKind) -> &str {
        match kind {
            NodeKind::Root => &self.collections.root,
            NodeKind::Chapter => &self.collections.chapter,
            NodeKind::Topic => &self.collections.topic,
            NodeKind::Lesson => &self.collections.lesson,
        }
    }

    fn authed(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request.basic_auth(&self.username, Some(self.password.expose()))
    }

    /// GET `url` and report whether it answered with 2xx.
    async fn check_get(&self, url: &str, authenticated: bool) -> CheckResult {
        let mut request = self.client.get(url);
        if authenticated {
            request = self.authed(request);
        }
        match request.send().await {
            Ok(response) if response.status().is_success() => CheckResult::ok(),
            Ok(response) => {
                CheckResult::failed(format!("{url}: {}", http::status_message(response).await))
            }
            Err(e) => CheckResult::failed(format!("{url}: {e}")),
        }
    }

    #[instrument(skip_all, fields(kind = kind.as_str(), title = %title))]
    async fn create(
        &self,
        kind: NodeKind,
        title: &str,
        body_html: &str,
        parent_id: Option<&str>,
    ) -> Result<RemoteObject> {
        let url = self.collection_url(self.collection_for(kind));
        let body = CreateBody {
            title,
            content: body_html,
            status: PUBLISH_STATUS,
            parent: parent_id,
        };

        let response = self
            .authed(self.client.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| PublishError::Network(format!("{url}: {e}")))?;

        if !response.status().is_success() {
            return Err(PublishError::Remote(format!(
                "{url}: {}",
                http::status_message(response).await
            )));
        }

        let created: CreatedObject = response
            .json()
            .await
            .map_err(|e| PublishError::Remote(format!("{url}: malformed create response: {e}")))?;

        let id = match created.id {
            serde_json::Value::String(s) => s,
            serde_json::Value::Number(n) => n.to_string(),
            _ => String::new(),
        };
        debug!(%id, link = %created.link, "remote object created");
        Ok(RemoteObject {
            id,
            url: created.link,
        })
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn validate_connection(&self) -> CheckResult {
        match self.client.get(&self.base_url).send().await {
            Ok(response) if !response.status().is_server_error() => CheckResult::ok(),
            Ok(response) => CheckResult::failed(format!(
                "{}: {}",
                self.base_url,
                http::status_message(response).await
            )),
            Err(e) => CheckResult::failed(format!("cannot reach {}: {e}", self.base_url)),
        }
    }

    async fn check_api_surface(&self) -> CheckResult {
        let url = http::join(&self.base_url, &[&self.api_root]);
        self.check_get(&url, false).await
    }

    async fn verify_credentials(&self) -> CheckResult {
        let url = http::join(&self.base_url, &[&self.api_root, "users/me"]);
        self.check_get(&url, true).await
    }

    async fn create_root(&self, title: &str, body_html: &str) -> Result<RemoteObject> {
        self.create(NodeKind::Root, title, body_html, None).await
    }

    async fn create_child(
        &self,
        kind: NodeKind,
        title: &str,
        body_html: &str,
        parent_id: &str,
    ) -> Result<RemoteObject> {
        self.create(kind, title, body_html, Some(parent_id)).await
    }

    async fn link_parent_child(&self, parent_id: &str, child_id: &str) -> LinkOutcome {
        let body = LinkBody {
            parent_id,
            child_id,
        };
        let response = match self
            .authed(self.client.post(&self.link_url))
            .json(&body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(parent_id, child_id, error = %e, "link webhook unreachable");
                return LinkOutcome::failed(format!("{}: {e}", self.link_url));
            }
        };

        if !response.status().is_success() {
            return LinkOutcome::failed(http::status_message(response).await);
        }

        // An empty or non-JSON 2xx body counts as success.
        let text = response.text().await.unwrap_or_default();
        let parsed: LinkResponse = serde_json::from_str(&text).unwrap_or(LinkResponse {
            success: true,
            error: None,
        });
        if parsed.success {
            LinkOutcome::linked()
        } else {
            LinkOutcome::failed(
                parsed
                    .error
                    .unwrap_or_else(|| "link webhook reported failure".to_string()),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store_for(server: &MockServer) -> HttpRemoteStore {
        let config = RemoteConfig {
            base_url: server.uri(),
            username: "editor".into(),
            ..Default::default()
        };
        let credentials = RemoteCredentials {
            username: "editor".into(),
            password: ApiKey::new("app-password"),
        };
        HttpRemoteStore::new(&config, &credentials).unwrap()
    }

    // base64("editor:app-password")
    const BASIC_AUTH: &str = "Basic ZWRpdG9yOmFwcC1wYXNzd29yZA==";

    #[tokio::test]
    async fn preflight_checks_hit_distinct_endpoints() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/wp/v2"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/wp/v2/users/me"))
            .and(header("authorization", BASIC_AUTH))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": 1})))
            .mount(&server)
            .await;

        let store = store_for(&server);
        assert!(store.validate_connection().await.ok);
        assert!(store.check_api_surface().await.ok);
        assert!(store.verify_credentials().await.ok);
    }

    #[tokio::test]
    async fn missing_api_surface_and_bad_credentials_fail() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/wp/v2"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/wp/v2/users/me"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid password"))
            .mount(&server)
            .await;

        let store = store_for(&server);
        let surface = store.check_api_surface().await;
        assert!(!surface.ok);
        assert!(surface.error.unwrap().contains("404"));

        let creds = store.verify_credentials().await;
        assert!(!creds.ok);
        assert!(creds.error.unwrap().contains("invalid password"));
    }

    #[tokio::test]
    async fn unreachable_store_fails_reachability() {
        let config = RemoteConfig {
            base_url: "http://127.0.0.1:9".into(),
            username: "editor".into(),
            ..Default::default()
        };
        let credentials = RemoteCredentials {
            username: "editor".into(),
            password: ApiKey::new("pw"),
        };
        let store = HttpRemoteStore::new(&config, &credentials).unwrap();
        let result = store.validate_connection().await;
        assert!(!result.ok);
        assert!(result.error.unwrap().contains("cannot reach"));
    }

    #[tokio::test]
    async fn create_child_posts_to_level_collection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/wp/v2/lessons"))
            .and(header("authorization", BASIC_AUTH))
            .and(body_json(serde_json::json!({
                "title": "Moves",
                "content": "<p>body</p>",
                "status": "publish",
                "parent": "41"
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "id": 42,
                "link": "https://cms.test/lessons/moves"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let store = store_for(&server);
        let created = store
            .create_child(NodeKind::Lesson, "Moves", "<p>body</p>", "41")
            .await
            .unwrap();
        assert_eq!(created.id, "42");
        assert_eq!(created.url, "https://cms.test/lessons/moves");
    }

    #[tokio::test]
    async fn create_root_omits_parent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/wp/v2/books"))
            .and(body_json(serde_json::json!({
                "title": "Practical Rust",
                "content": "<p>Preface</p>",
                "status": "publish"
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "id": "book-1",
                "link": "https://cms.test/books/practical-rust"
            })))
            .mount(&server)
            .await;

        let store = store_for(&server);
        let root = store.create_root("Practical Rust", "<p>Preface</p>").await.unwrap();
        assert_eq!(root.id, "book-1");
    }

    #[tokio::test]
    async fn create_failure_is_a_remote_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/wp/v2/chapters"))
            .respond_with(ResponseTemplate::new(500).set_body_string("database gone"))
            .mount(&server)
            .await;

        let store = store_for(&server);
        let err = store
            .create_child(NodeKind::Chapter, "Ownership", "", "1")
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::Remote(ref m) if m.contains("database gone")));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn configured_timeout_bounds_a_slow_create() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/wp/v2/topics"))
            .respond_with(
                ResponseTemplate::new(201)
                    .set_body_json(serde_json::json!({"id": 7, "link": "https://cms.test/t"}))
                    .set_delay(std::time::Duration::from_millis(1500)),
            )
            .mount(&server)
            .await;

        let credentials = RemoteCredentials {
            username: "editor".into(),
            password: ApiKey::new("app-password"),
        };
        let bounded = RemoteConfig {
            base_url: server.uri(),
            timeout_secs: Some(1),
            ..Default::default()
        };
        let err = HttpRemoteStore::new(&bounded, &credentials)
            .unwrap()
            .create_child(NodeKind::Topic, "Moves", "", "1")
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::Network(_)));

        let created = store_for(&server)
            .create_child(NodeKind::Topic, "Moves", "", "1")
            .await
            .unwrap();
        assert_eq!(created.id, "7");
    }

    #[tokio::test]
    async fn link_posts_ids_to_webhook() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/coursepress/v1/link"))
            .and(body_json(serde_json::json!({"parent_id": "1", "child_id": "2"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"success": true})))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = store_for(&server).link_parent_child("1", "2").await;
        assert!(outcome.success);
    }

    #[tokio::test]
    async fn link_failures_never_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/coursepress/v1/link"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": false,
                "error": "child already has a parent"
            })))
            .mount(&server)
            .await;

        let outcome = store_for(&server).link_parent_child("1", "2").await;
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("child already has a parent"));

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;
        let outcome = store_for(&server).link_parent_child("1", "2").await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("502"));
    }
}
