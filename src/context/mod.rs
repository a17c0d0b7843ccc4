//! Per-request context: path parameters, decoded bodies and typed extensions.
//!
//! Middleware uses [`Extensions`] to hand state to handlers without either
//! side knowing the other's concrete types; the session middleware stores the
//! caller's session there.

use std::{
    any::{Any, TypeId},
    collections::HashMap,
};

use thiserror::Error;

use crate::Request;
use crate::http::form;

/// Type-erased request extensions map.
///
/// Holds at most one value per type. Handlers read what middleware inserted,
/// e.g. `ctx.extensions().get::<CurrentSession>()`.
#[derive(Default)]
pub struct Extensions {
    map: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Extensions {
    /// Create a new empty extensions map
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, replacing any previous value of the same type.
    pub fn insert<T>(&mut self, value: T)
    where
        T: Send + Sync + 'static,
    {
        self.map.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Get a value from the extensions map
    pub fn get<T>(&self) -> Option<&T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T>())
    }
}

/// Path parameters extracted from the matched route
#[derive(Default, Debug, Clone)]
pub struct PathParams {
    map: HashMap<String, String>,
}

impl PathParams {
    /// An empty parameter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a captured segment under its pattern name.
    pub fn insert(&mut self, key: String, value: String) {
        self.map.insert(key, value);
    }

    /// The segment captured as `:key`, or the `wildcard` remainder.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(String::as_str)
    }
}

/// Failure to decode a request body into the shape a handler expects.
#[derive(Debug, Error)]
pub enum BodyError {
    /// The request's `Content-Type` is not the one the handler decodes.
    #[error("expected Content-Type {expected}, got {actual}")]
    UnsupportedMediaType {
        expected: &'static str,
        actual: String,
    },

    /// The body is not valid JSON for the target type.
    #[error("invalid JSON body: {0}")]
    Json(#[from] serde_json::Error),

    #[error("request body is not valid UTF-8")]
    NotUtf8,
}

/// Per-request context handed to route handlers and middleware.
///
/// Owns the parsed [`Request`], the path parameters captured by the router,
/// and the [`Extensions`] middleware filled in on the way.
pub struct Context {
    request: Request,
    params: PathParams,
    extensions: Extensions,
}

impl Context {
    /// Create a new context from a request
    pub fn new(request: Request) -> Self {
        Self::with_params(request, PathParams::new())
    }

    /// Create a context carrying the parameters captured by the router.
    pub fn with_params(request: Request, params: PathParams) -> Self {
        Self {
            request,
            params,
            extensions: Extensions::new(),
        }
    }

    /// The parsed request.
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Parameters captured by the matched route.
    pub fn params(&self) -> &PathParams {
        &self.params
    }

    pub(crate) fn set_params(&mut self, params: PathParams) {
        self.params = params;
    }

    /// Values attached by middleware.
    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    /// Mutable access for middleware attaching values.
    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    /// Decodes a JSON request body.
    ///
    /// # Errors
    ///
    /// - [`BodyError::UnsupportedMediaType`] unless `Content-Type` is
    ///   `application/json` (parameters such as `charset` are ignored).
    /// - [`BodyError::Json`] if the body does not deserialize into `T`.
    ///
    /// # Examples
    ///
    /// ```
    /// use serde::Deserialize;
    /// use wellbeing_chat::Request;
    /// use wellbeing_chat::context::Context;
    ///
    /// #[derive(Deserialize)]
    /// struct Update {
    ///     system_prompt: String,
    /// }
    ///
    /// let raw = b"PUT /api/prompt HTTP/1.1\r\nContent-Type: application/json\r\nContent-Length: 24\r\n\r\n{\"system_prompt\":\"Calm\"}";
    /// let ctx = Context::new(Request::parse(raw).unwrap().0);
    /// let update: Update = ctx.json().unwrap();
    /// assert_eq!(update.system_prompt, "Calm");
    /// ```
    pub fn json<T>(&self) -> Result<T, BodyError>
    where
        T: serde::de::DeserializeOwned,
    {
        self.expect_media_type("application/json")?;
        Ok(serde_json::from_slice(self.request.body())?)
    }

    /// Decodes an `application/x-www-form-urlencoded` request body.
    ///
    /// Repeated keys keep the last value.
    ///
    /// # Errors
    ///
    /// [`BodyError::UnsupportedMediaType`] for any other content type, and
    /// [`BodyError::NotUtf8`] if the raw body is not UTF-8.
    pub fn form(&self) -> Result<HashMap<String, String>, BodyError> {
        self.expect_media_type("application/x-www-form-urlencoded")?;
        let body = std::str::from_utf8(self.request.body()).map_err(|_| BodyError::NotUtf8)?;
        Ok(form::parse(body))
    }

    fn expect_media_type(&self, expected: &'static str) -> Result<(), BodyError> {
        match self.request.headers().media_type() {
            Some(actual) if actual == expected => Ok(()),
            actual => Err(BodyError::UnsupportedMediaType {
                expected,
                actual: actual.unwrap_or_else(|| "none".to_owned()),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    fn ctx(raw: &str) -> Context {
        let (req, _) = Request::parse(raw.as_bytes()).unwrap();
        Context::new(req)
    }

    #[derive(Debug, Deserialize)]
    struct Body {
        message: String,
    }

    #[test]
    fn extensions_round_trip_by_type() {
        let mut ext = Extensions::new();
        ext.insert(7_u32);
        ext.insert("seven");
        ext.insert(8_u32);
        assert_eq!(ext.get::<u32>(), Some(&8));
        assert_eq!(ext.get::<&str>(), Some(&"seven"));
        assert!(ext.get::<u64>().is_none());
    }

    #[test]
    fn json_body_decodes() {
        let c = ctx(
            "POST /api/chat HTTP/1.1\r\nContent-Type: application/json\r\nContent-Length: 16\r\n\r\n{\"message\":\"hi\"}",
        );
        let body: Body = c.json().unwrap();
        assert_eq!(body.message, "hi");
    }

    #[test]
    fn json_requires_content_type() {
        let c = ctx("POST /api/chat HTTP/1.1\r\nContent-Length: 2\r\n\r\n{}");
        assert!(matches!(
            c.json::<serde_json::Value>(),
            Err(BodyError::UnsupportedMediaType { .. })
        ));
    }

    #[test]
    fn form_body_decodes() {
        let c = ctx(
            "POST / HTTP/1.1\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: 13\r\n\r\nmessage=hi+yo",
        );
        let form = c.form().unwrap();
        assert_eq!(form.get("message").map(String::as_str), Some("hi yo"));
    }
}
