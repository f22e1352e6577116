//! REST client for a realtime-database style status tree.
//!
//! Every node is addressable as `{base}/{path}.json`; `GET` returns the JSON
//! value or `null` when nothing is stored there, `PUT` replaces the node.

use std::time::Duration;

use reqwest::{Client, StatusCode, Url};

use super::{EphemeralStore, StatusValue, STATUS_ROOT};
use crate::config::Secret;
use crate::error::{PresenceError, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct RestEphemeralStore {
    client: Client,
    base_url: Url,
    auth_token: Option<Secret>,
}

impl RestEphemeralStore {
    pub fn new(base_url: impl Into<String>, auth_token: Option<Secret>) -> Result<Self> {
        let base_url = base_url.into();
        let base_url = Url::parse(&base_url)
            .map_err(|e| PresenceError::Config(format!("invalid status tree URL: {}", e)))?;
        if base_url.cannot_be_a_base() {
            return Err(PresenceError::Config(
                "status tree URL cannot hold node paths".to_string(),
            ));
        }
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url,
            auth_token,
        })
    }

    /// `root/key` maps to exactly two path segments under the base.
    ///
    /// The key is percent-encoded as one segment, so `/`, `..`, `?` and `#`
    /// inside it never leave the root node.
    fn node_url(&self, path: &str) -> Result<Url> {
        let path = path.trim_matches('/');
        let mut url = self.base_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                PresenceError::Config("status tree URL cannot hold node paths".to_string())
            })?;
            segments.pop_if_empty();
            match path.split_once('/') {
                Some((root, key)) => {
                    segments.push(root).push(&format!("{}.json", key));
                },
                None => {
                    segments.push(&format!("{}.json", path));
                },
            }
        }
        Ok(url)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> Result<reqwest::RequestBuilder> {
        let builder = self.client.request(method, self.node_url(path)?);
        Ok(match &self.auth_token {
            Some(token) => builder.query(&[("auth", token.expose())]),
            None => builder,
        })
    }
}

/// reqwest errors carry the request URL, which holds the auth token
fn scrub(err: reqwest::Error) -> PresenceError {
    PresenceError::HttpError(err.without_url())
}

fn status_error(path: &str, status: StatusCode) -> PresenceError {
    PresenceError::Transport(format!("status tree returned {} for {}", status, path))
}

impl EphemeralStore for RestEphemeralStore {
    async fn read(&self, path: &str) -> Result<Option<StatusValue>> {
        let response = self
            .request(reqwest::Method::GET, path)?
            .send()
            .await
            .map_err(scrub)?;

        if !response.status().is_success() {
            return Err(status_error(path, response.status()));
        }

        // `null` deserializes to None
        response
            .json::<Option<StatusValue>>()
            .await
            .map_err(scrub)
    }

    async fn write(&self, path: &str, value: StatusValue) -> Result<()> {
        let response = self
            .request(reqwest::Method::PUT, path)?
            .json(&value)
            .send()
            .await
            .map_err(scrub)?;

        if !response.status().is_success() {
            return Err(status_error(path, response.status()));
        }
        Ok(())
    }

    async fn check(&self) -> Result<()> {
        let response = self
            .request(reqwest::Method::GET, STATUS_ROOT)?
            .query(&[("shallow", "true")])
            .send()
            .await
            .map_err(scrub)?;

        if !response.status().is_success() {
            return Err(status_error(STATUS_ROOT, response.status()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::{Path, Query, State},
        http::StatusCode as HttpStatus,
        routing::get,
        Json, Router,
    };
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::RwLock;

    type Tree = Arc<RwLock<HashMap<String, serde_json::Value>>>;

    async fn get_node(
        State(tree): State<Tree>,
        Path(path): Path<String>,
        Query(query): Query<HashMap<String, String>>,
    ) -> std::result::Result<Json<serde_json::Value>, HttpStatus> {
        if query.get("auth").map(String::as_str) != Some("token-1") {
            return Err(HttpStatus::UNAUTHORIZED);
        }
        let key = path.trim_end_matches(".json").to_string();
        let value = tree
            .read()
            .await
            .get(&key)
            .cloned()
            .unwrap_or(serde_json::Value::Null);
        Ok(Json(value))
    }

    async fn put_node(
        State(tree): State<Tree>,
        Path(path): Path<String>,
        Json(body): Json<serde_json::Value>,
    ) -> Json<serde_json::Value> {
        let key = path.trim_end_matches(".json").to_string();
        tree.write().await.insert(key, body.clone());
        Json(body)
    }

    async fn spawn_tree() -> (String, Tree) {
        let tree: Tree = Arc::new(RwLock::new(HashMap::new()));
        let app = Router::new()
            .route("/*path", get(get_node).put(put_node))
            .with_state(tree.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}/", addr), tree)
    }

    #[test]
    fn test_node_url_normalization() {
        let store = RestEphemeralStore::new("https://db.example/", None).unwrap();
        assert_eq!(
            store.node_url("/status/u1").unwrap().as_str(),
            "https://db.example/status/u1.json"
        );
        assert_eq!(
            store.node_url("status").unwrap().as_str(),
            "https://db.example/status.json"
        );
    }

    #[test]
    fn test_node_url_keeps_base_path() {
        let store = RestEphemeralStore::new("https://db.example/tenant-a", None).unwrap();
        assert_eq!(
            store.node_url("status/u1").unwrap().as_str(),
            "https://db.example/tenant-a/status/u1.json"
        );
    }

    #[test]
    fn test_node_url_encodes_key_as_one_segment() {
        let store = RestEphemeralStore::new("https://db.example/", None).unwrap();
        let url = store
            .node_url(&crate::store::status_path("../admin/config?x=1#frag"))
            .unwrap();

        assert_eq!(url.path_segments().unwrap().count(), 2);
        assert!(url.path().starts_with("/status/"));
        assert!(url.query().is_none());
        assert!(url.fragment().is_none());
    }

    #[test]
    fn test_invalid_base_url_is_config_error() {
        assert!(matches!(
            RestEphemeralStore::new("not a url", None),
            Err(PresenceError::Config(_))
        ));
        assert!(matches!(
            RestEphemeralStore::new("mailto:ops@example.com", None),
            Err(PresenceError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_traversal_user_id_stays_under_status() {
        let (url, tree) = spawn_tree().await;
        let store = RestEphemeralStore::new(url, Some(Secret::new("token-1"))).unwrap();
        let value = StatusValue {
            active: true,
            last_seen: 1000,
        };

        store
            .write(&crate::store::status_path("../admin/config"), value)
            .await
            .unwrap();

        let keys: Vec<String> = tree.read().await.keys().cloned().collect();
        assert_eq!(keys.len(), 1);
        assert!(keys[0].starts_with("status/"), "wrote outside status: {:?}", keys);
    }

    #[tokio::test]
    async fn test_read_missing_node_is_none() {
        let (url, _tree) = spawn_tree().await;
        let store = RestEphemeralStore::new(url, Some(Secret::new("token-1"))).unwrap();
        assert!(store.read("status/u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let (url, tree) = spawn_tree().await;
        let store = RestEphemeralStore::new(url, Some(Secret::new("token-1"))).unwrap();
        let value = StatusValue {
            active: true,
            last_seen: 1000,
        };

        store.write("status/u1", value).await.unwrap();

        assert_eq!(store.read("status/u1").await.unwrap(), Some(value));
        assert_eq!(
            tree.read().await.get("status/u1").cloned(),
            Some(serde_json::json!({"active": true, "lastSeen": 1000}))
        );
    }

    #[tokio::test]
    async fn test_rejected_auth_surfaces_without_token() {
        let (url, _tree) = spawn_tree().await;
        let store = RestEphemeralStore::new(url, Some(Secret::new("wrong-token"))).unwrap();

        let err = store.check().await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("401"));
        assert!(!message.contains("wrong-token"));
    }

    #[tokio::test]
    async fn test_unreachable_store_fails_check() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let store =
            RestEphemeralStore::new(format!("http://{}", addr), Some(Secret::new("t"))).unwrap();
        let err = store.check().await.unwrap_err();
        assert!(!err.to_string().contains("auth="));
    }
}
