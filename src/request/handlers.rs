//! Ready-made handlers for text and JSON payloads.

use std::marker::PhantomData;

use encoding_rs::{Encoding, WINDOWS_1252};
use serde::de::DeserializeOwned;

use crate::cache::headers::{parse_cache_headers, parse_charset, DEFAULT_CHARSET};
use crate::cache::CacheEntry;

use super::error::RequestError;
use super::handler::RequestHandler;
use super::response::NetworkResponse;

/// Decodes the body as text using the charset from `Content-Type`.
pub struct StringRequest<F, E> {
    on_response: F,
    on_error: E,
}

impl<F, E> StringRequest<F, E>
where
    F: Fn(String) + Send + Sync + 'static,
    E: Fn(RequestError) + Send + Sync + 'static,
{
    pub fn new(on_response: F, on_error: E) -> Self {
        Self { on_response, on_error }
    }
}

/// Decode `data` in the charset named by a WHATWG encoding label.
/// Unknown labels fall back to windows-1252; malformed sequences become
/// U+FFFD.
pub fn decode_text(data: &[u8], charset: &str) -> String {
    let encoding = Encoding::for_label(charset.trim().as_bytes()).unwrap_or(WINDOWS_1252);
    let (text, _) = encoding.decode_without_bom_handling(data);
    text.into_owned()
}

impl<F, E> RequestHandler for StringRequest<F, E>
where
    F: Fn(String) + Send + Sync + 'static,
    E: Fn(RequestError) + Send + Sync + 'static,
{
    type Output = String;

    fn parse_network_response(
        &self,
        response: &NetworkResponse,
    ) -> Result<(String, Option<CacheEntry>), RequestError> {
        let charset = parse_charset(&response.headers, DEFAULT_CHARSET);
        let text = decode_text(&response.data, &charset);
        Ok((text, parse_cache_headers(response)))
    }

    fn deliver_response(&self, output: String) {
        (self.on_response)(output);
    }

    fn deliver_error(&self, error: RequestError) {
        (self.on_error)(error);
    }
}

/// Deserializes a JSON body into `T`.
pub struct JsonRequest<T, F, E> {
    on_response: F,
    on_error: E,
    _marker: PhantomData<fn() -> T>,
}

impl<T, F, E> JsonRequest<T, F, E>
where
    T: DeserializeOwned + Send + 'static,
    F: Fn(T) + Send + Sync + 'static,
    E: Fn(RequestError) + Send + Sync + 'static,
{
    pub fn new(on_response: F, on_error: E) -> Self {
        Self { on_response, on_error, _marker: PhantomData }
    }
}

impl<T, F, E> RequestHandler for JsonRequest<T, F, E>
where
    T: DeserializeOwned + Send + 'static,
    F: Fn(T) + Send + Sync + 'static,
    E: Fn(RequestError) + Send + Sync + 'static,
{
    type Output = T;

    fn parse_network_response(
        &self,
        response: &NetworkResponse,
    ) -> Result<(T, Option<CacheEntry>), RequestError> {
        let value = serde_json::from_slice(&response.data)
            .map_err(|e| RequestError::Parse(e.to_string()))?;
        Ok((value, parse_cache_headers(response)))
    }

    fn deliver_response(&self, output: T) {
        (self.on_response)(output);
    }

    fn deliver_error(&self, error: RequestError) {
        (self.on_error)(error);
    }
}
