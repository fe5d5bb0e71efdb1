//! Request, response, and creation types for sync operations

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::SyncError;

/// A fully described HTTP request, the equivalent of a constructed request
/// object as opposed to a bare URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchRequest {
    pub url: String,
    pub method: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Vec<u8>>,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: "GET".to_string(),
            headers: BTreeMap::new(),
            body: None,
        }
    }

    pub fn with_method(mut self, method: &str) -> Self {
        self.method = method.to_ascii_uppercase();
        self
    }

    /// Header names are stored lowercased.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Build the request a sync will actually send: `input` with `options`
    /// applied on top.
    pub fn from_parts(input: &RequestInput, options: Option<&RequestOptions>) -> Self {
        let mut request = match input {
            RequestInput::Url(url) => FetchRequest::new(url.clone()),
            RequestInput::Request(request) => request.clone(),
        };

        if let Some(options) = options {
            if let Some(method) = &options.method {
                request.method = method.to_ascii_uppercase();
            }
            if let Some(headers) = &options.headers {
                for (name, value) in headers {
                    request
                        .headers
                        .insert(name.to_ascii_lowercase(), value.clone());
                }
            }
            if let Some(body) = &options.body {
                request.body = Some(body.clone().into_bytes());
            }
        }

        request
    }
}

/// What a sync should request: a bare URL or a prepared request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestInput {
    Url(String),
    Request(FetchRequest),
}

impl From<&str> for RequestInput {
    fn from(url: &str) -> Self {
        Self::Url(url.to_string())
    }
}

impl From<String> for RequestInput {
    fn from(url: String) -> Self {
        Self::Url(url)
    }
}

impl From<FetchRequest> for RequestInput {
    fn from(request: FetchRequest) -> Self {
        Self::Request(request)
    }
}

/// Per-call overrides applied on top of the request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RequestOptions {
    pub method: Option<String>,
    pub headers: Option<BTreeMap<String, String>>,
    pub body: Option<String>,
}

/// A response produced by the agent (or by a direct request).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncResponse {
    pub url: String,
    pub status: u16,
    pub status_text: String,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl SyncResponse {
    pub fn new(status: u16) -> Self {
        Self {
            url: String::new(),
            status,
            status_text: String::new(),
            headers: BTreeMap::new(),
            body: Vec::new(),
        }
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// True for 2xx statuses.
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// Everything needed to create one sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSync {
    pub name: Option<String>,
    pub request: RequestInput,
    pub options: Option<RequestOptions>,
}

impl NewSync {
    /// Fire-and-forget sync, not retrievable by name.
    pub fn anonymous(request: impl Into<RequestInput>) -> Self {
        Self {
            name: None,
            request: request.into(),
            options: None,
        }
    }

    pub fn named(name: impl Into<String>, request: impl Into<RequestInput>) -> Self {
        let name = name.into();
        Self {
            name: if name.is_empty() { None } else { Some(name) },
            request: request.into(),
            options: None,
        }
    }

    pub fn with_options(mut self, options: RequestOptions) -> Self {
        self.options = Some(options);
        self
    }

    /// Resolve a positional `(name?, request, options?)` call.
    ///
    /// With two arguments, a text-or-request first argument followed by an
    /// object-like second argument means `(request, options)`; any other pair
    /// means `(name, request)`.
    pub fn from_call_shape(args: Vec<CallArg>) -> Result<Self, SyncError> {
        let mut args = args.into_iter();
        let (name, request, options) = match (args.next(), args.next(), args.next(), args.next()) {
            (Some(request), None, None, None) => (None, request, None),
            (Some(first), Some(second), None, None) => {
                if first.is_request_like() && second.is_object_like() {
                    (None, first, Some(second))
                } else {
                    (Some(first), second, None)
                }
            }
            (Some(name), Some(request), Some(options), None) => {
                (Some(name), request, Some(options))
            }
            (None, ..) => {
                return Err(SyncError::InvalidArguments(
                    "expecting a request".to_string(),
                ))
            }
            _ => {
                return Err(SyncError::InvalidArguments(
                    "expecting at most (name, request, options)".to_string(),
                ))
            }
        };

        let name = match name {
            None | Some(CallArg::Value(serde_json::Value::Null)) => None,
            Some(CallArg::Value(serde_json::Value::String(name))) if name.is_empty() => None,
            Some(CallArg::Value(serde_json::Value::String(name))) => Some(name),
            Some(_) => {
                return Err(SyncError::InvalidArguments(
                    "expecting name to be a string".to_string(),
                ))
            }
        };

        let request = match request {
            CallArg::Value(serde_json::Value::String(url)) => RequestInput::Url(url),
            CallArg::Request(request) => RequestInput::Request(request),
            CallArg::Value(_) => {
                return Err(SyncError::InvalidArguments(
                    "expecting request to be a string or Request".to_string(),
                ))
            }
        };

        // Arrays pass as options but carry no request fields.
        let options = match options {
            None
            | Some(CallArg::Value(serde_json::Value::Null))
            | Some(CallArg::Value(serde_json::Value::Array(_))) => None,
            Some(CallArg::Value(value @ serde_json::Value::Object(_))) => Some(
                serde_json::from_value::<RequestOptions>(value).map_err(|_| {
                    SyncError::InvalidArguments("expecting options to be an object".to_string())
                })?,
            ),
            Some(_) => {
                return Err(SyncError::InvalidArguments(
                    "expecting options to be an object".to_string(),
                ))
            }
        };

        Ok(Self {
            name,
            request,
            options,
        })
    }
}

/// One positional argument of a legacy-shaped create call.
#[derive(Debug, Clone, PartialEq)]
pub enum CallArg {
    Value(serde_json::Value),
    Request(FetchRequest),
}

impl CallArg {
    fn is_request_like(&self) -> bool {
        matches!(
            self,
            CallArg::Request(_) | CallArg::Value(serde_json::Value::String(_))
        )
    }

    fn is_object_like(&self) -> bool {
        matches!(
            self,
            CallArg::Value(
                serde_json::Value::Object(_)
                    | serde_json::Value::Array(_)
                    | serde_json::Value::Null
            )
        )
    }
}

impl From<&str> for CallArg {
    fn from(text: &str) -> Self {
        Self::Value(serde_json::Value::String(text.to_string()))
    }
}

impl From<serde_json::Value> for CallArg {
    fn from(value: serde_json::Value) -> Self {
        Self::Value(value)
    }
}

impl From<FetchRequest> for CallArg {
    fn from(request: FetchRequest) -> Self {
        Self::Request(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_single_argument_is_request() {
        let sync = NewSync::from_call_shape(vec!["/api/items".into()]).unwrap();
        assert_eq!(sync.name, None);
        assert_eq!(sync.request, RequestInput::Url("/api/items".into()));
        assert_eq!(sync.options, None);
    }

    #[test]
    fn test_request_and_options_pair() {
        let sync = NewSync::from_call_shape(vec![
            "/api/items".into(),
            json!({ "method": "post", "body": "{}" }).into(),
        ])
        .unwrap();

        assert_eq!(sync.name, None);
        assert_eq!(sync.request, RequestInput::Url("/api/items".into()));
        let options = sync.options.unwrap();
        assert_eq!(options.method.as_deref(), Some("post"));
        assert_eq!(options.body.as_deref(), Some("{}"));
    }

    #[test]
    fn test_name_and_request_pair() {
        let sync =
            NewSync::from_call_shape(vec!["upload-1".into(), "/api/upload".into()]).unwrap();
        assert_eq!(sync.name.as_deref(), Some("upload-1"));
        assert_eq!(sync.request, RequestInput::Url("/api/upload".into()));
    }

    #[test]
    fn test_request_object_second_is_not_options() {
        let request = FetchRequest::new("/api/upload").with_method("PUT");
        let sync =
            NewSync::from_call_shape(vec!["upload-1".into(), request.clone().into()]).unwrap();
        assert_eq!(sync.name.as_deref(), Some("upload-1"));
        assert_eq!(sync.request, RequestInput::Request(request));
    }

    #[test]
    fn test_three_arguments() {
        let sync = NewSync::from_call_shape(vec![
            "upload-1".into(),
            "/api/upload".into(),
            json!({ "headers": { "X-Token": "abc" } }).into(),
        ])
        .unwrap();
        assert_eq!(sync.name.as_deref(), Some("upload-1"));
        let headers = sync.options.unwrap().headers.unwrap();
        assert_eq!(headers.get("X-Token").map(String::as_str), Some("abc"));
    }

    #[test]
    fn test_invalid_request_rejected() {
        let err = NewSync::from_call_shape(vec![json!(42).into()]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid arguments: expecting request to be a string or Request"
        );
    }

    #[test]
    fn test_invalid_options_rejected() {
        let err = NewSync::from_call_shape(vec![
            "upload-1".into(),
            "/api/upload".into(),
            json!("not-an-object").into(),
        ])
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid arguments: expecting options to be an object"
        );
    }

    #[test]
    fn test_array_options_are_accepted_and_ignored() {
        let sync = NewSync::from_call_shape(vec!["/api/upload".into(), json!([1, 2]).into()])
            .unwrap();
        assert_eq!(sync.name, None);
        assert_eq!(sync.request, RequestInput::Url("/api/upload".into()));
        assert_eq!(sync.options, None);

        let sync = NewSync::from_call_shape(vec![
            "upload-1".into(),
            "/api/upload".into(),
            json!([]).into(),
        ])
        .unwrap();
        assert_eq!(sync.name.as_deref(), Some("upload-1"));
        assert_eq!(sync.options, None);
    }

    #[test]
    fn test_argument_count_bounds() {
        assert!(NewSync::from_call_shape(vec![]).is_err());
        assert!(NewSync::from_call_shape(vec![
            "a".into(),
            "b".into(),
            json!({}).into(),
            json!({}).into(),
        ])
        .is_err());
    }

    #[test]
    fn test_empty_name_is_anonymous() {
        assert_eq!(NewSync::named("", "/x").name, None);
    }

    #[test]
    fn test_options_overlay_request() {
        let input = RequestInput::Request(
            FetchRequest::new("/api/items").with_header("Accept", "text/plain"),
        );
        let options = RequestOptions {
            method: Some("post".into()),
            headers: Some(BTreeMap::from([(
                "Content-Type".to_string(),
                "application/json".to_string(),
            )])),
            body: Some("{\"a\":1}".into()),
        };

        let request = FetchRequest::from_parts(&input, Some(&options));
        assert_eq!(request.method, "POST");
        assert_eq!(request.headers.get("accept").map(String::as_str), Some("text/plain"));
        assert_eq!(
            request.headers.get("content-type").map(String::as_str),
            Some("application/json")
        );
        assert_eq!(request.body.as_deref(), Some(b"{\"a\":1}".as_slice()));
    }

    #[test]
    fn test_response_helpers() {
        let response = SyncResponse::new(201).with_body(r#"{"id":5}"#);
        assert!(response.ok());
        assert_eq!(response.text(), r#"{"id":5}"#);
        let value: serde_json::Value = response.json().unwrap();
        assert_eq!(value["id"], 5);
        assert!(!SyncResponse::new(500).ok());
    }
}
