//! Metadata serialization and the wire records shared by the replay store
//! and the state snapshot.
//!
//! Request metadata and item values are arbitrary user types, so persisting
//! them needs a codec that can name a type on the wire and find its way back
//! to a concrete Rust type on decode. [`MetaCodec`] is that interface;
//! [`TaggedCodec`] is the standard implementation, a registry keyed by a
//! caller-chosen tag with MessagePack payloads. Types that are not registered
//! cannot round-trip: encoding them fails, and decoding an unknown tag fails,
//! which callers treat as "start from scratch" for snapshots and "cache miss"
//! for replay entries.

use std::any::TypeId;
use std::collections::HashMap;

use http::{HeaderMap, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ScavengeError;
use crate::item::{Item, Record};
use crate::request::Request;
use crate::response::Response;

/// Serializes single metadata elements.
///
/// `encode` may return an empty buffer to signal that the element should not
/// be persisted at all; callers skip such elements.
pub trait MetaCodec: Send + Sync {
    fn encode(&self, value: &dyn Record) -> Result<Vec<u8>, ScavengeError>;
    fn decode(&self, bytes: &[u8]) -> Result<Box<dyn Record>, ScavengeError>;
}

type EncodeFn = Box<dyn Fn(&dyn Record) -> Result<Vec<u8>, ScavengeError> + Send + Sync>;
type DecodeFn = Box<dyn Fn(&[u8]) -> Result<Box<dyn Record>, ScavengeError> + Send + Sync>;

/// A [`MetaCodec`] backed by a tag registry.
///
/// Register every type you expect to appear in request metadata or item
/// values that should survive suspend/resume or filesystem replay:
///
/// ```rust,ignore
/// let codec = TaggedCodec::new()
///     .register::<Depth>("depth")
///     .register::<PageKind>("page_kind");
/// ```
#[derive(Default)]
pub struct TaggedCodec {
    encoders: HashMap<TypeId, (String, EncodeFn)>,
    decoders: HashMap<String, DecodeFn>,
}

impl TaggedCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `T` under `tag`. The tag is the wire name; changing it
    /// invalidates previously persisted data.
    pub fn register<T>(mut self, tag: &str) -> Self
    where
        T: Record + Serialize + DeserializeOwned + Clone,
    {
        let encode_tag = tag.to_string();
        let encode: EncodeFn = Box::new(move |value: &dyn Record| {
            let concrete = value
                .as_any()
                .downcast_ref::<T>()
                .ok_or_else(|| ScavengeError::Codec("encoder/type mismatch".into()))?;
            rmp_serde::to_vec(concrete)
                .map_err(|err| ScavengeError::Codec(format!("encode '{encode_tag}': {err}")))
        });
        self.encoders
            .insert(TypeId::of::<T>(), (tag.to_string(), encode));

        let decode_tag = tag.to_string();
        let decode: DecodeFn = Box::new(move |bytes: &[u8]| {
            let concrete: T = rmp_serde::from_slice(bytes)
                .map_err(|err| ScavengeError::Codec(format!("decode '{decode_tag}': {err}")))?;
            Ok(Box::new(concrete) as Box<dyn Record>)
        });
        self.decoders.insert(tag.to_string(), decode);
        self
    }

    /// Registers `T` as transient: it never gets persisted, and its presence
    /// in a metadata bag does not make encoding fail.
    pub fn register_transient<T: Record>(mut self) -> Self {
        let encode: EncodeFn = Box::new(|_| Ok(Vec::new()));
        self.encoders
            .insert(TypeId::of::<T>(), (String::new(), encode));
        self
    }
}

#[derive(Serialize, Deserialize)]
struct TaggedValue {
    tag: String,
    payload: Vec<u8>,
}

impl MetaCodec for TaggedCodec {
    fn encode(&self, value: &dyn Record) -> Result<Vec<u8>, ScavengeError> {
        let type_id = value.as_any().type_id();
        let (tag, encode) = self.encoders.get(&type_id).ok_or_else(|| {
            ScavengeError::Codec(format!("unregistered metadata type: {value:?}"))
        })?;
        let payload = encode(value)?;
        if payload.is_empty() && tag.is_empty() {
            return Ok(Vec::new());
        }
        rmp_serde::to_vec(&TaggedValue {
            tag: tag.clone(),
            payload,
        })
        .map_err(|err| ScavengeError::Codec(format!("encode tagged value: {err}")))
    }

    fn decode(&self, bytes: &[u8]) -> Result<Box<dyn Record>, ScavengeError> {
        let tagged: TaggedValue = rmp_serde::from_slice(bytes)
            .map_err(|err| ScavengeError::Codec(format!("decode tagged value: {err}")))?;
        let decode = self
            .decoders
            .get(&tagged.tag)
            .ok_or_else(|| ScavengeError::Codec(format!("unknown metadata tag '{}'", tagged.tag)))?;
        decode(&tagged.payload)
    }
}

/// Wire form of a [`Request`], with metadata already passed through a
/// [`MetaCodec`].
#[derive(Serialize, Deserialize)]
pub(crate) struct RequestRecord {
    method: String,
    url: String,
    headers: Vec<(String, Vec<u8>)>,
    body: Vec<u8>,
    stream_response: bool,
    meta: Vec<Vec<u8>>,
}

impl RequestRecord {
    pub(crate) fn from_request(
        req: &Request,
        codec: &dyn MetaCodec,
    ) -> Result<Self, ScavengeError> {
        let mut meta = Vec::new();
        for value in req.meta_values() {
            let bytes = codec.encode(value.as_ref())?;
            if bytes.is_empty() {
                continue;
            }
            meta.push(bytes);
        }
        Ok(Self {
            method: req.method.to_string(),
            url: req.url.to_string(),
            headers: encode_headers(&req.headers),
            body: req.body.clone(),
            stream_response: req.stream_response,
            meta,
        })
    }

    pub(crate) fn into_request(self, codec: &dyn MetaCodec) -> Result<Request, ScavengeError> {
        let method = Method::from_bytes(self.method.as_bytes())
            .map_err(|err| ScavengeError::Codec(format!("decode method: {err}")))?;
        let url = Url::parse(&self.url)
            .map_err(|err| ScavengeError::Codec(format!("decode url: {err}")))?;
        let mut req = Request::new(method, url);
        req.headers = decode_headers(&self.headers)?;
        req.body = self.body;
        req.stream_response = self.stream_response;
        for bytes in &self.meta {
            req.push_meta_boxed(codec.decode(bytes)?);
        }
        Ok(req)
    }
}

/// Wire form of a [`Response`] as persisted by the filesystem replay store.
#[derive(Serialize, Deserialize)]
pub(crate) struct ResponseRecord {
    status: u16,
    request: RequestRecord,
    url: String,
    headers: Vec<(String, Vec<u8>)>,
    body: Vec<u8>,
}

impl ResponseRecord {
    pub(crate) fn from_response(
        res: &Response,
        codec: &dyn MetaCodec,
    ) -> Result<Self, ScavengeError> {
        Ok(Self {
            status: res.status().as_u16(),
            request: RequestRecord::from_request(res.request(), codec)?,
            url: res.url().to_string(),
            headers: encode_headers(res.headers()),
            body: res.body().to_vec(),
        })
    }

    pub(crate) fn into_response(self, codec: &dyn MetaCodec) -> Result<Response, ScavengeError> {
        let request = self.request.into_request(codec)?;
        let status = StatusCode::from_u16(self.status)
            .map_err(|err| ScavengeError::Codec(format!("decode status: {err}")))?;
        let url = Url::parse(&self.url)
            .map_err(|err| ScavengeError::Codec(format!("decode url: {err}")))?;
        let headers = decode_headers(&self.headers)?;
        Ok(Response::new(request, status, url, headers, self.body))
    }
}

/// Wire form of an [`Item`].
#[derive(Serialize, Deserialize)]
pub(crate) struct ItemRecord {
    values: Vec<Vec<u8>>,
}

impl ItemRecord {
    pub(crate) fn from_item(item: &Item, codec: &dyn MetaCodec) -> Result<Self, ScavengeError> {
        let mut values = Vec::new();
        for value in item.iter() {
            let bytes = codec.encode(value)?;
            if bytes.is_empty() {
                continue;
            }
            values.push(bytes);
        }
        Ok(Self { values })
    }

    pub(crate) fn into_item(self, codec: &dyn MetaCodec) -> Result<Item, ScavengeError> {
        let mut values = Vec::with_capacity(self.values.len());
        for bytes in &self.values {
            values.push(codec.decode(bytes)?);
        }
        Ok(Item::from_values(values))
    }
}

fn encode_headers(headers: &HeaderMap) -> Vec<(String, Vec<u8>)> {
    headers
        .iter()
        .map(|(name, value)| (name.as_str().to_string(), value.as_bytes().to_vec()))
        .collect()
}

fn decode_headers(entries: &[(String, Vec<u8>)]) -> Result<HeaderMap, ScavengeError> {
    let mut headers = HeaderMap::new();
    for (name, value) in entries {
        let name = http::header::HeaderName::from_bytes(name.as_bytes())
            .map_err(|err| ScavengeError::Codec(format!("decode header name: {err}")))?;
        let value = http::header::HeaderValue::from_bytes(value)
            .map_err(|err| ScavengeError::Codec(format!("decode header value: {err}")))?;
        headers.append(name, value);
    }
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Depth(u32);

    #[derive(Debug, Clone)]
    struct Scratch;

    #[test]
    fn registered_types_round_trip() {
        let codec = TaggedCodec::new().register::<Depth>("depth");
        let bytes = codec.encode(&Depth(7)).unwrap();
        let decoded = codec.decode(&bytes).unwrap();
        assert_eq!(decoded.as_any().downcast_ref::<Depth>(), Some(&Depth(7)));
    }

    #[test]
    fn unregistered_types_fail_both_ways() {
        let codec = TaggedCodec::new();
        assert!(codec.encode(&Depth(1)).is_err());

        let other = TaggedCodec::new().register::<Depth>("depth");
        let bytes = other.encode(&Depth(1)).unwrap();
        assert!(codec.decode(&bytes).is_err());
    }

    #[test]
    fn transient_types_encode_to_nothing() {
        let codec = TaggedCodec::new().register_transient::<Scratch>();
        assert!(codec.encode(&Scratch).unwrap().is_empty());
    }

    #[test]
    fn request_record_round_trips_metadata_and_headers() {
        let codec = TaggedCodec::new().register::<Depth>("depth");

        let mut req = Request::get(Url::parse("https://example.com/a?x=1").unwrap());
        req.set_header(http::header::ACCEPT, "text/html");
        req.headers.append(
            http::header::ACCEPT_ENCODING,
            http::header::HeaderValue::from_static("gzip"),
        );
        req.add_meta(Depth(3));
        req.body = b"payload".to_vec();

        let record = RequestRecord::from_request(&req, &codec).unwrap();
        let bytes = rmp_serde::to_vec(&record).unwrap();
        let decoded: RequestRecord = rmp_serde::from_slice(&bytes).unwrap();
        let restored = decoded.into_request(&codec).unwrap();

        assert_eq!(restored.method, Method::GET);
        assert_eq!(restored.url.as_str(), "https://example.com/a?x=1");
        assert_eq!(restored.headers.get(http::header::ACCEPT).unwrap(), "text/html");
        assert_eq!(restored.body, b"payload");
        assert_eq!(restored.meta::<Depth>(), Some(&Depth(3)));
    }

    #[test]
    fn item_record_round_trips() {
        let codec = TaggedCodec::new().register::<Depth>("depth");
        let item = Item::of(Depth(1)).add(Depth(2));

        let record = ItemRecord::from_item(&item, &codec).unwrap();
        let restored = record.into_item(&codec).unwrap();

        assert_eq!(restored.len(), 2);
        assert_eq!(restored.get::<Depth>(), Some(&Depth(1)));
    }
}
