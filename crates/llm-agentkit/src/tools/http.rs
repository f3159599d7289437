//! HttpToolRegistry - a [`ToolRegistry`] over plain HTTP endpoints.
//!
//! - `GET {url}/tools` lists tools, either as a bare array or as `{"tools": [...]}`.
//! - `POST {url}/tools/{name}` invokes a tool with the parameters object as body.

use super::{ServerDescriptor, ToolDescriptor, ToolError, ToolRegistry};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use url::Url;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct HttpToolRegistry {
    client: Client,
    timeout: Duration,
}

impl Default for HttpToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpToolRegistry {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Sets the per-request timeout (30 s by default).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_http_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl ToolRegistry for HttpToolRegistry {
    async fn discover(&self, server: &ServerDescriptor) -> Result<Vec<ToolDescriptor>, ToolError> {
        let url = endpoint(server, &["tools"])?;
        debug!(server = %server.name, %url, "Discovering tools");

        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|err| ToolError::discovery(&server.name, err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::discovery(&server.name, format!("status {status}")));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|err| ToolError::discovery(&server.name, format!("invalid body: {err}")))?;
        parse_tool_list(body).map_err(|message| ToolError::discovery(&server.name, message))
    }

    async fn invoke(
        &self,
        server: &ServerDescriptor,
        tool: &str,
        parameters: Value,
    ) -> Result<Value, ToolError> {
        let url = endpoint(server, &["tools", tool])?;
        debug!(server = %server.name, tool, %url, "Invoking tool");

        let response = self
            .client
            .post(url)
            .timeout(self.timeout)
            .json(&parameters)
            .send()
            .await
            .map_err(|err| ToolError::invocation(&server.name, tool, err.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| ToolError::invocation(&server.name, tool, err.to_string()))?;
        if !status.is_success() {
            return Err(ToolError::invocation(
                &server.name,
                tool,
                format!("status {status}: {text}"),
            ));
        }

        Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
    }
}

/// Appends path segments to the server URL.
fn endpoint(server: &ServerDescriptor, segments: &[&str]) -> Result<Url, ToolError> {
    let mut url = server.url.clone();
    url.path_segments_mut()
        .map_err(|_| ToolError::Endpoint {
            server: server.name.clone(),
            message: format!("'{}' cannot carry a path", server.url),
        })?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

fn parse_tool_list(body: Value) -> Result<Vec<ToolDescriptor>, String> {
    let list = match body {
        Value::Array(_) => body,
        Value::Object(mut map) => map
            .remove("tools")
            .ok_or_else(|| "object body without a `tools` field".to_string())?,
        other => return Err(format!("unexpected body: {other}")),
    };
    serde_json::from_value(list).map_err(|err| format!("invalid tool list: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn server(url: &str) -> ServerDescriptor {
        ServerDescriptor::new("search", "Web search", Url::parse(url).unwrap())
    }

    #[test]
    fn test_endpoint_joins_segments() {
        let url = endpoint(&server("http://localhost:9000/api/"), &["tools", "lookup"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:9000/api/tools/lookup");

        let url = endpoint(&server("http://localhost:9000"), &["tools"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:9000/tools");
    }

    #[test]
    fn test_endpoint_escapes_tool_names() {
        let url = endpoint(&server("http://localhost:9000/"), &["tools", "a b/c"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:9000/tools/a%20b%2Fc");
    }

    #[test]
    fn test_endpoint_rejects_opaque_urls() {
        let err = endpoint(&server("mailto:ops@example.com"), &["tools"]).unwrap_err();
        assert!(matches!(err, ToolError::Endpoint { .. }));
    }

    #[test]
    fn test_parse_tool_list_shapes() {
        let bare = parse_tool_list(json!([{ "name": "a" }])).unwrap();
        let wrapped = parse_tool_list(json!({ "tools": [{ "name": "b", "description": "B" }] })).unwrap();

        assert_eq!(bare[0].name, "a");
        assert_eq!(wrapped[0].description, "B");
        assert!(parse_tool_list(json!({ "items": [] })).is_err());
        assert!(parse_tool_list(json!("nope")).is_err());
    }

    #[test]
    fn test_default_timeout() {
        assert_eq!(HttpToolRegistry::new().timeout(), Duration::from_secs(30));
    }
}
