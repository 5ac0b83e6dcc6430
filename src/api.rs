//! Team account management API (projects).
//!
//! Unlike model calls these requests are neither retried nor classified: the
//! caller gets the JSON body and the status code back as-is.

use serde_json::Value;

use crate::error::ClientError;
use crate::http::{API_KEY_HEADER, HttpRequest, Method, Transport, endpoint};

pub const MANAGEMENT_BASE_URL: &str = "https://api.banana.dev/v1";

pub struct ProjectsApi<T> {
    transport: T,
    base_url: String,
    api_key: String,
}

impl<T: Transport> ProjectsApi<T> {
    pub fn new(transport: T, api_key: &str) -> Self {
        Self::with_base_url(transport, api_key, MANAGEMENT_BASE_URL)
    }

    pub fn with_base_url(transport: T, api_key: &str, base_url: impl Into<String>) -> Self {
        Self {
            transport,
            base_url: base_url.into(),
            api_key: api_key.trim().to_string(),
        }
    }

    /// All projects under the team account.
    pub async fn list_projects(&self, query: &Value) -> Result<(Value, u16), ClientError> {
        self.call(Method::Get, "projects", query).await
    }

    pub async fn get_project(
        &self,
        project_id: &str,
        query: &Value,
    ) -> Result<(Value, u16), ClientError> {
        self.call(Method::Get, &format!("projects/{}", project_id), query)
            .await
    }

    /// Update a project's settings.
    pub async fn update_project(
        &self,
        project_id: &str,
        settings: &Value,
    ) -> Result<(Value, u16), ClientError> {
        self.call(Method::Put, &format!("projects/{}", project_id), settings)
            .await
    }

    #[tracing::instrument(skip(self, data))]
    async fn call(
        &self,
        method: Method,
        route: &str,
        data: &Value,
    ) -> Result<(Value, u16), ClientError> {
        let mut request = HttpRequest {
            method,
            url: endpoint(&self.base_url, route),
            headers: vec![
                ("Content-Type".to_string(), "application/json".to_string()),
                ("Accept".to_string(), "application/json".to_string()),
                (API_KEY_HEADER.to_string(), self.api_key.clone()),
            ],
            query: Vec::new(),
            body: None,
        };
        match method {
            Method::Get => request.query = query_pairs(data),
            Method::Post | Method::Put => request.body = Some(data.clone()),
        }

        let response = self
            .transport
            .send(&request)
            .await
            .map_err(ClientError::transport)?;
        let body = serde_json::from_str(&response.body).map_err(|_| {
            ClientError::malformed("management API returned invalid JSON")
                .with_response(response.status, response.body.clone())
        })?;
        Ok((body, response.status))
    }
}

/// Flatten a JSON object into query parameters. Strings are sent unquoted.
fn query_pairs(data: &Value) -> Vec<(String, String)> {
    let Some(map) = data.as_object() else {
        return Vec::new();
    };
    map.iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (key.clone(), value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::http::{HttpResponse, MockTransport, ReqwestTransport};
    use mockito::Matcher;
    use serde_json::json;

    #[test]
    fn test_query_pairs() {
        let pairs = query_pairs(&json!({"limit": 5, "name": "sd", "skip": null}));
        assert_eq!(
            pairs,
            vec![
                ("limit".to_string(), "5".to_string()),
                ("name".to_string(), "sd".to_string()),
            ]
        );
        assert!(query_pairs(&json!([1, 2])).is_empty());
    }

    #[tokio::test]
    async fn test_list_projects_sends_query_and_headers() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/projects")
            .match_header("X-BANANA-API-KEY", "key")
            .match_header("Accept", "application/json")
            .match_query(Matcher::UrlEncoded("limit".into(), "2".into()))
            .with_status(200)
            .with_body(r#"{"results": [{"id": "p1"}, {"id": "p2"}]}"#)
            .create_async()
            .await;

        let api = ProjectsApi::with_base_url(
            ReqwestTransport::with_defaults().unwrap(),
            " key ",
            server.url(),
        );
        let (body, status) = api.list_projects(&json!({"limit": 2})).await.unwrap();

        mock.assert_async().await;
        assert_eq!(status, 200);
        assert_eq!(body["results"][1]["id"], "p2");
    }

    #[tokio::test]
    async fn test_update_project_puts_json() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", "/projects/p1")
            .match_body(Matcher::Json(json!({"maxReplicas": 3})))
            .with_status(200)
            .with_body(r#"{"id": "p1", "maxReplicas": 3}"#)
            .create_async()
            .await;

        let api = ProjectsApi::with_base_url(
            ReqwestTransport::with_defaults().unwrap(),
            "key",
            server.url(),
        );
        let (body, status) = api
            .update_project("p1", &json!({"maxReplicas": 3}))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(status, 200);
        assert_eq!(body["maxReplicas"], 3);
    }

    #[tokio::test]
    async fn test_error_status_is_returned_not_raised() {
        let mut transport = MockTransport::new();
        transport
            .expect_send()
            .withf(|req| {
                req.method == Method::Get && req.url == "https://api.banana.dev/v1/projects/nope"
            })
            .times(1)
            .returning(|_| Ok(HttpResponse::new(404, r#"{"message": "not found"}"#)));

        let api = ProjectsApi::new(transport, "key");
        let (body, status) = api.get_project("nope", &json!({})).await.unwrap();

        assert_eq!(status, 404);
        assert_eq!(body["message"], "not found");
    }

    #[tokio::test]
    async fn test_invalid_json_is_malformed() {
        let mut transport = MockTransport::new();
        transport
            .expect_send()
            .times(1)
            .returning(|_| Ok(HttpResponse::new(502, "<html>bad gateway</html>")));

        let api = ProjectsApi::new(transport, "key");
        let err = api.list_projects(&json!({})).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::MalformedResponse);
        assert_eq!(err.status(), Some(502));
    }
}
