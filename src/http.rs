//! Request/response model and the transport seam the dispatcher sends through.
//!
//! The dispatcher depends on an HTTP stack only through [`Transport`]. The crate ships
//! [`ReqwestTransport`] behind the default `reqwest` feature; tests and embedding shells supply
//! their own implementations. A transport returns `Ok` for every HTTP response, whatever its
//! status, and `Err` only when no response was received.

// crates.io
#[cfg(feature = "reqwest")] use reqwest::header::CONTENT_TYPE;
// self
use crate::{_prelude::*, config::DispatchOptions, error::TransportError};

/// Boxed future returned by [`Transport::send`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<Response, TransportError>> + 'a + Send>>;

/// Abstraction over HTTP stacks capable of executing one request.
pub trait Transport
where
	Self: 'static + Send + Sync,
{
	/// Sends `request` and resolves with the HTTP response, or a transport failure.
	fn send<'a>(&'a self, request: &'a RequestSpec) -> TransportFuture<'a>;
}

/// HTTP methods understood by the dispatcher.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
	/// `GET`
	#[default]
	Get,
	/// `POST`
	Post,
	/// `PUT`
	Put,
	/// `DELETE`
	Delete,
	/// `PATCH`
	Patch,
	/// `HEAD`
	Head,
	/// `OPTIONS`
	Options,
}
impl Method {
	/// Returns the canonical method token.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Get => "GET",
			Self::Post => "POST",
			Self::Put => "PUT",
			Self::Delete => "DELETE",
			Self::Patch => "PATCH",
			Self::Head => "HEAD",
			Self::Options => "OPTIONS",
		}
	}
}
impl Display for Method {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
#[cfg(feature = "reqwest")]
impl From<Method> for reqwest::Method {
	fn from(method: Method) -> Self {
		match method {
			Method::Get => Self::GET,
			Method::Post => Self::POST,
			Method::Put => Self::PUT,
			Method::Delete => Self::DELETE,
			Method::Patch => Self::PATCH,
			Method::Head => Self::HEAD,
			Method::Options => Self::OPTIONS,
		}
	}
}

/// One logical request. Replays reuse the same value verbatim.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestSpec {
	/// HTTP method.
	pub method: Method,
	/// Absolute URL, or a path resolved against the transport's base URL.
	pub url: String,
	/// Query parameters in insertion order.
	#[serde(default)]
	pub query: Vec<(String, String)>,
	/// Request headers.
	#[serde(default)]
	pub headers: BTreeMap<String, String>,
	/// JSON body.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub body: Option<Value>,
	/// Dispatcher switches for this request.
	#[serde(default)]
	pub options: DispatchOptions,
}
impl RequestSpec {
	/// Creates a request for `method` and `url`.
	pub fn new(method: Method, url: impl Into<String>) -> Self {
		Self { method, url: url.into(), ..Default::default() }
	}

	/// `GET url`.
	pub fn get(url: impl Into<String>) -> Self {
		Self::new(Method::Get, url)
	}

	/// `POST url` with a JSON body.
	pub fn post(url: impl Into<String>, body: Value) -> Self {
		Self::new(Method::Post, url).with_body(body)
	}

	/// `PUT url` with a JSON body.
	pub fn put(url: impl Into<String>, body: Value) -> Self {
		Self::new(Method::Put, url).with_body(body)
	}

	/// `DELETE url`; deletes carry query parameters only.
	pub fn delete(url: impl Into<String>) -> Self {
		Self::new(Method::Delete, url)
	}

	/// Appends a query parameter.
	pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.query.push((key.into(), value.into()));

		self
	}

	/// Sets a header, replacing any previous value.
	pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.insert(name.into(), value.into());

		self
	}

	/// Sets the JSON body.
	pub fn with_body(mut self, body: Value) -> Self {
		self.body = Some(body);

		self
	}

	/// Replaces the dispatcher switches.
	pub fn with_options(mut self, options: DispatchOptions) -> Self {
		self.options = options;

		self
	}

	/// Skips the loading indicator for this request.
	pub fn hide_loading(mut self) -> Self {
		self.options.hide_loading = true;

		self
	}

	/// Suppresses error notifications for this request.
	pub fn hide_error_toast(mut self) -> Self {
		self.options.hide_error_toast = true;

		self
	}

	/// Case-insensitive header lookup.
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers
			.iter()
			.find(|(key, _)| key.eq_ignore_ascii_case(name))
			.map(|(_, value)| value.as_str())
	}
}

/// HTTP response as seen by the dispatcher.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Response {
	/// HTTP status code.
	pub status: u16,
	/// Response headers (lower-case names).
	#[serde(default)]
	pub headers: BTreeMap<String, String>,
	/// Decoded body; `Null` when empty, a JSON string when the body is not JSON.
	pub body: Value,
}
impl Response {
	/// Builds a response without headers.
	pub fn new(status: u16, body: Value) -> Self {
		Self { status, headers: BTreeMap::new(), body }
	}

	/// Returns `true` for 2xx statuses.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}

	/// Business envelope fields carried by the body.
	pub fn envelope(&self) -> Envelope {
		Envelope {
			code: self.body.get("code").and_then(Value::as_i64),
			msg: self.body.get("msg").and_then(Value::as_str).map(str::to_owned),
			message: self.body.get("message").and_then(Value::as_str).map(str::to_owned),
		}
	}

	/// Decodes the whole body into `T`.
	pub fn json<T>(&self) -> Result<T>
	where
		T: serde::de::DeserializeOwned,
	{
		serde_path_to_error::deserialize(&self.body).map_err(|source| Error::Decode { source })
	}

	/// Decodes the `data` field of an enveloped body into `T`.
	pub fn data<T>(&self) -> Result<T>
	where
		T: serde::de::DeserializeOwned,
	{
		let data = self.body.get("data").unwrap_or(&Value::Null);

		serde_path_to_error::deserialize(data).map_err(|source| Error::Decode { source })
	}

	/// Decodes raw body bytes the way transports should: empty → `Null`, invalid JSON → string.
	pub fn decode_body(bytes: &[u8]) -> Value {
		if bytes.is_empty() {
			return Value::Null;
		}

		serde_json::from_slice(bytes)
			.unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
	}
}

/// `{ code?, msg?, message? }` business envelope convention.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Envelope {
	/// Business status code.
	pub code: Option<i64>,
	/// Short server message.
	pub msg: Option<String>,
	/// Long server message.
	pub message: Option<String>,
}
impl Envelope {
	/// First non-empty server message, preferring `msg`.
	pub fn text(&self) -> Option<&str> {
		[self.msg.as_deref(), self.message.as_deref()].into_iter().flatten().find(|s| !s.is_empty())
	}
}

/// Thin wrapper around [`ReqwestClient`] with an optional base URL for relative paths.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransport {
	client: ReqwestClient,
	base_url: Option<Url>,
}
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self { client, base_url: None }
	}

	/// Resolves relative request URLs against `base_url`.
	pub fn with_base_url(mut self, base_url: Url) -> Self {
		self.base_url = Some(base_url);

		self
	}

	/// Base URL used for relative paths, if any.
	pub fn base_url(&self) -> Option<&Url> {
		self.base_url.as_ref()
	}

	fn resolve(&self, raw: &str) -> Result<Url, TransportError> {
		let resolved = match &self.base_url {
			Some(base) => base.join(raw),
			None => Url::parse(raw),
		};

		resolved.map_err(|source| TransportError::InvalidUrl { url: raw.to_owned(), source })
	}
}
#[cfg(feature = "reqwest")]
impl Transport for ReqwestTransport {
	fn send<'a>(&'a self, request: &'a RequestSpec) -> TransportFuture<'a> {
		Box::pin(async move {
			let url = self.resolve(&request.url)?;
			let mut builder = self.client.request(request.method.into(), url);

			if !request.query.is_empty() {
				builder = builder.query(&request.query);
			}
			for (name, value) in &request.headers {
				builder = builder.header(name.as_str(), value.as_str());
			}
			if let Some(body) = &request.body {
				let bytes = serde_json::to_vec(body).map_err(TransportError::Encode)?;

				if request.header(CONTENT_TYPE.as_str()).is_none() {
					builder = builder.header(CONTENT_TYPE, "application/json");
				}

				builder = builder.body(bytes);
			}

			let response = builder.send().await?;
			let status = response.status().as_u16();
			let headers = response
				.headers()
				.iter()
				.filter_map(|(name, value)| {
					value.to_str().ok().map(|value| (name.as_str().to_owned(), value.to_owned()))
				})
				.collect();
			let bytes = response.bytes().await?;

			Ok(Response { status, headers, body: Response::decode_body(&bytes) })
		})
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn envelope_prefers_msg_over_message() {
		let response = Response::new(
			200,
			serde_json::json!({ "code": 500, "msg": "", "message": "quota exceeded" }),
		);
		let envelope = response.envelope();

		assert_eq!(envelope.code, Some(500));
		assert_eq!(envelope.text(), Some("quota exceeded"));
		assert_eq!(Response::new(200, Value::Null).envelope(), Envelope::default());
	}

	#[test]
	fn decode_body_falls_back_to_text() {
		assert_eq!(Response::decode_body(b""), Value::Null);
		assert_eq!(Response::decode_body(br#"{"a":1}"#), serde_json::json!({ "a": 1 }));
		assert_eq!(Response::decode_body(b"<html>"), Value::String("<html>".into()));
	}

	#[test]
	fn data_decoding_reports_paths() {
		#[derive(Debug, Deserialize)]
		struct Profile {
			#[allow(dead_code)]
			name: String,
		}

		let response = Response::new(200, serde_json::json!({ "code": 200, "data": { "name": 7 } }));
		let err = response.data::<Profile>().expect_err("A numeric name must not decode.");

		match err {
			Error::Decode { source } => assert_eq!(source.path().to_string(), "name"),
			other => panic!("Unexpected error variant: {other:?}."),
		}
	}

	#[test]
	fn request_builders_compose() {
		let request = RequestSpec::get("/users")
			.with_query("page", "2")
			.with_header("X-Trace", "abc")
			.hide_loading();

		assert_eq!(request.method, Method::Get);
		assert_eq!(request.query, vec![("page".to_owned(), "2".to_owned())]);
		assert_eq!(request.header("x-trace"), Some("abc"));
		assert!(request.options.hide_loading);
		assert!(!request.options.hide_error_toast);
		assert!(RequestSpec::delete("/users/1").body.is_none());
	}
}
