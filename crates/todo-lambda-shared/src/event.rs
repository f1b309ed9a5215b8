//! API Gateway proxy payloads.
//!
//! Both payload shapes are accepted on input: version 1.0 (`httpMethod`,
//! `path`, `multiValueQueryStringParameters`) and version 2.0
//! (`requestContext.http.method`, `rawPath`, `rawQueryString`, `cookies`).
//! Responses are always emitted in the common proxy-integration shape.

use std::collections::{BTreeMap, HashMap};

use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const BASE64: base64::engine::GeneralPurpose = base64::engine::general_purpose::STANDARD;

/// The event was understood as JSON but cannot become a request.
#[derive(Debug, Error)]
pub enum EventError {
    #[error("request body is not valid base64: {0}")]
    InvalidBody(#[from] base64::DecodeError),

    #[error("invalid HTTP method {0:?}")]
    InvalidMethod(String),

    #[error("invalid query string: {0}")]
    InvalidQuery(#[from] serde_urlencoded::de::Error),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayEvent {
    #[serde(default)]
    pub version: Option<String>,

    // Version 1.0
    #[serde(default)]
    pub http_method: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub multi_value_headers: Option<HashMap<String, Vec<String>>>,
    #[serde(default)]
    pub query_string_parameters: Option<HashMap<String, String>>,
    #[serde(default)]
    pub multi_value_query_string_parameters: Option<HashMap<String, Vec<String>>>,

    // Version 2.0
    #[serde(default)]
    pub raw_path: Option<String>,
    #[serde(default)]
    pub raw_query_string: Option<String>,
    #[serde(default)]
    pub cookies: Option<Vec<String>>,

    #[serde(default)]
    pub headers: Option<HashMap<String, String>>,
    #[serde(default)]
    pub request_context: Option<GatewayRequestContext>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub is_base64_encoded: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayRequestContext {
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub http_method: Option<String>,
    #[serde(default)]
    pub http: Option<GatewayHttp>,
}

/// `requestContext.http` in version 2.0 payloads.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayHttp {
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

impl GatewayEvent {
    /// Method as sent by the gateway, uppercased. Defaults to `GET`.
    pub fn method(&self) -> String {
        let http = self.request_context.as_ref().and_then(|rc| rc.http.as_ref());
        http.and_then(|h| non_empty(&h.method))
            .or_else(|| non_empty(&self.http_method))
            .or_else(|| {
                self.request_context
                    .as_ref()
                    .and_then(|rc| non_empty(&rc.http_method))
            })
            .unwrap_or("GET")
            .to_ascii_uppercase()
    }

    /// Raw path, without the query string. Empty when the gateway sent none.
    pub fn path(&self) -> String {
        let http = self.request_context.as_ref().and_then(|rc| rc.http.as_ref());
        non_empty(&self.raw_path)
            .or_else(|| http.and_then(|h| non_empty(&h.path)))
            .or_else(|| non_empty(&self.path))
            .unwrap_or_default()
            .to_string()
    }

    /// Decoded query pairs in gateway order, repeated keys preserved.
    pub fn query_pairs(&self) -> Result<Vec<(String, String)>, EventError> {
        if let Some(raw) = non_empty(&self.raw_query_string) {
            return Ok(serde_urlencoded::from_str(raw)?);
        }

        let mut pairs = Vec::new();
        if let Some(multi) = &self.multi_value_query_string_parameters {
            let mut keys: Vec<&String> = multi.keys().collect();
            keys.sort();
            for key in keys {
                for value in &multi[key] {
                    pairs.push((key.clone(), value.clone()));
                }
            }
        } else if let Some(single) = &self.query_string_parameters {
            let mut entries: Vec<(&String, &String)> = single.iter().collect();
            entries.sort();
            for (key, value) in entries {
                pairs.push((key.clone(), value.clone()));
            }
        }
        Ok(pairs)
    }

    /// Header pairs with lowercased names. Multi-value headers win over their
    /// single-value duplicates; version 2.0 cookies become one `cookie` header.
    pub fn header_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        let multi = self.multi_value_headers.as_ref();

        if let Some(multi) = multi {
            for (name, values) in multi {
                for value in values {
                    pairs.push((name.to_ascii_lowercase(), value.clone()));
                }
            }
        }
        if let Some(headers) = &self.headers {
            for (name, value) in headers {
                let lower = name.to_ascii_lowercase();
                let duplicated = multi
                    .map(|m| m.keys().any(|k| k.eq_ignore_ascii_case(&lower)))
                    .unwrap_or(false);
                if !duplicated {
                    pairs.push((lower, value.clone()));
                }
            }
        }
        if let Some(cookies) = self.cookies.as_ref().filter(|c| !c.is_empty()) {
            pairs.push(("cookie".to_string(), cookies.join("; ")));
        }
        pairs
    }

    /// Request body bytes, base64-decoded when the gateway flagged it.
    pub fn body_bytes(&self) -> Result<Vec<u8>, EventError> {
        match &self.body {
            None => Ok(Vec::new()),
            Some(body) if self.is_base64_encoded => Ok(BASE64.decode(body)?),
            Some(body) => Ok(body.as_bytes().to_vec()),
        }
    }

    /// Request id assigned by the gateway, if any.
    pub fn gateway_request_id(&self) -> Option<&str> {
        self.request_context
            .as_ref()
            .and_then(|rc| non_empty(&rc.request_id))
    }
}

/// Proxy-integration response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayResponse {
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cookies: Vec<String>,
    pub body: String,
    pub is_base64_encoded: bool,
}

/// Content types returned base64-encoded.
pub fn is_binary_content_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence.starts_with("image/")
        || essence == "application/pdf"
        || essence == "application/octet-stream"
}

impl GatewayResponse {
    /// Response without a body.
    pub fn empty(status: u16) -> Self {
        Self {
            status_code: status,
            headers: BTreeMap::new(),
            cookies: Vec::new(),
            body: String::new(),
            is_base64_encoded: false,
        }
    }

    /// JSON response with `Content-Type: application/json` and CORS headers.
    pub fn json<T: Serialize>(status: u16, body: &T) -> Self {
        let body = serde_json::to_string(body).unwrap_or_else(|_| {
            r#"{"error":"Internal server error","message":"Internal server error"}"#.to_string()
        });
        let mut response = Self {
            body,
            ..Self::empty(status)
        };
        response
            .headers
            .insert("content-type".to_string(), "application/json".to_string());
        response.with_cors()
    }

    /// Response carrying raw bytes, base64-encoded when the content type is
    /// binary or the bytes are not UTF-8.
    pub fn from_bytes(status: u16, content_type: Option<&str>, bytes: Vec<u8>) -> Self {
        let binary = content_type.map(is_binary_content_type).unwrap_or(false);
        let (body, is_base64_encoded) = if binary {
            (BASE64.encode(&bytes), true)
        } else {
            match String::from_utf8(bytes) {
                Ok(text) => (text, false),
                Err(err) => (BASE64.encode(err.as_bytes()), true),
            }
        };
        Self {
            body,
            is_base64_encoded,
            ..Self::empty(status)
        }
    }

    /// Add permissive CORS headers, keeping any already present.
    pub fn with_cors(mut self) -> Self {
        for (name, value) in [
            ("access-control-allow-origin", "*"),
            ("access-control-allow-methods", "GET, POST, PUT, DELETE, OPTIONS"),
            (
                "access-control-allow-headers",
                "Content-Type, Authorization, X-Request-Id",
            ),
        ] {
            self.headers
                .entry(name.to_string())
                .or_insert_with(|| value.to_string());
        }
        self
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Parsed JSON body, when it is JSON.
    pub fn json_body(&self) -> Option<serde_json::Value> {
        if self.is_base64_encoded {
            return None;
        }
        serde_json::from_str(&self.body).ok()
    }
}
