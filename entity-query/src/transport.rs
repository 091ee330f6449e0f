use std::future::Future;

use crate::{ApiConfig, FetchError, ListRequest};

/// The network seam of every fetch function.
///
/// Implementations own the call and report failures as [`FetchError`]; they never retry.
pub trait ApiTransport {
    /// GET a list endpoint, returning the decoded JSON body of a successful response.
    fn get(
        &self,
        request: &ListRequest,
    ) -> impl Future<Output = Result<serde_json::Value, FetchError>>;

    /// DELETE a single resource, e.g. `/services/3`.
    fn delete(&self, path: &str) -> impl Future<Output = Result<(), FetchError>>;
}

/// [`ApiTransport`] over HTTP with `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(base_url: &str) -> Result<Self, FetchError> {
        Self::from_config(&ApiConfig::new(base_url))
    }

    /// Fails with [`FetchError::Transport`] when the HTTP client can't be built,
    /// e.g. no TLS backend could be initialized.
    pub fn from_config(config: &ApiConfig) -> Result<Self, FetchError> {
        let builder = reqwest::Client::builder();
        #[cfg(not(target_arch = "wasm32"))]
        let builder = builder.timeout(config.timeout());
        let client = builder.build()?;
        Ok(HttpTransport {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response, FetchError> {
        let response = self.authorized(builder).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), %body, "Panel API request failed");
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

impl ApiTransport for HttpTransport {
    async fn get(&self, request: &ListRequest) -> Result<serde_json::Value, FetchError> {
        let response = self
            .send(self.client.get(self.url(&request.path)).query(&request.query))
            .await?;
        Ok(response.json::<serde_json::Value>().await?)
    }

    async fn delete(&self, path: &str) -> Result<(), FetchError> {
        self.send(self.client.delete(self.url(path))).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use axum::{
        Json, Router,
        extract::{Path, Query},
        http::{HeaderMap, StatusCode},
        routing::{delete, get},
    };
    use serde_json::{Value, json};

    use super::*;
    use crate::{EntityEndpoint, EntityQueryProps, FetchEntityResult, Filters, fetch_entities};

    async fn list_hosts(
        Path(inbound_id): Path<u32>,
        Query(params): Query<HashMap<String, String>>,
        headers: HeaderMap,
    ) -> Json<Value> {
        Json(json!({
            "items": [{
                "inbound_id": inbound_id,
                "remark": params.get("remark"),
                "order_by": params.get("order_by"),
                "auth": headers.get("authorization").and_then(|v| v.to_str().ok()),
            }],
            "pages": 1,
        }))
    }

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
        format!("http://{addr}/api/")
    }

    #[tokio::test]
    async fn test_http_round_trip() {
        let base_url = serve(
            Router::new()
                .route("/api/inbounds/{inbound_id}/hosts", get(list_hosts))
                .route("/api/broken", get(|| async { (StatusCode::BAD_GATEWAY, "upstream down") }))
                .route("/api/garbled", get(|| async { "<html>not json</html>" }))
                .route("/api/services/{id}", delete(|| async { StatusCode::NO_CONTENT })),
        )
        .await;
        let transport =
            HttpTransport::from_config(&ApiConfig::new(base_url.clone()).with_token("secret")).unwrap();
        assert_eq!(transport.base_url(), base_url.trim_end_matches('/'));

        const HOSTS: EntityEndpoint = EntityEndpoint::new("hosts", "/inbounds/hosts")
            .nested_under("inbounds")
            .with_primary_filter("remark", "remark");
        let props = EntityQueryProps::new(1, 10).with_filters(Filters::new().with("remark", Some("edge")));
        let key = HOSTS.sidebar_query_key(&props, Some(7.into()));

        let result: FetchEntityResult<Value> = fetch_entities(&transport, &HOSTS, &key).await.unwrap();
        assert_eq!(result.page_count, 1);
        assert_eq!(
            result.entity,
            vec![json!({
                "inbound_id": 7,
                "remark": "edge",
                "order_by": "created_at",
                "auth": "Bearer secret",
            })]
        );

        let broken = ListRequest {
            path: "/broken".to_string(),
            query: Default::default(),
        };
        assert_eq!(
            transport.get(&broken).await,
            Err(FetchError::Status {
                status: 502,
                body: "upstream down".to_string()
            })
        );

        // A successful response that isn't JSON:
        let garbled = ListRequest {
            path: "/garbled".to_string(),
            query: Default::default(),
        };
        assert!(matches!(
            transport.get(&garbled).await,
            Err(FetchError::Malformed(_))
        ));

        transport.delete("/services/3").await.unwrap();
    }

    #[tokio::test]
    async fn test_transport_failure() {
        // Nothing listens on port 9 locally.
        let transport = HttpTransport::new("http://127.0.0.1:9").unwrap();
        let request = ListRequest {
            path: "/services".to_string(),
            query: Default::default(),
        };
        assert!(matches!(
            transport.get(&request).await,
            Err(FetchError::Transport(_))
        ));
    }
}
