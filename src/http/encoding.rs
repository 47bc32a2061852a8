//! Content-encoding codecs.
//!
//! # Responsibilities
//! - Decode request bodies sent with `Content-Encoding: gzip | compress`
//! - Pick the response encoding from `Accept-Encoding`
//!
//! # Design Decisions
//! - Bodies are fully buffered, so codecs work on byte slices
//! - `compress` is served by the zlib format
//! - Identity never goes through a codec
//! - Negotiation takes the first listed encoding that has a codec, ignoring
//!   q-values

use std::collections::HashMap;
use std::fmt;
use std::io::{self, Read, Write};
use std::sync::Arc;

use flate2::read::{GzDecoder, ZlibDecoder};
use flate2::write::{GzEncoder, ZlibEncoder};
use flate2::Compression;

pub const IDENTITY: &str = "identity";
pub const GZIP: &str = "gzip";
pub const COMPRESS: &str = "compress";

/// One byte-level transfer encoding.
pub trait BodyCodec: Send + Sync {
    /// Token used in `Content-Encoding`.
    fn name(&self) -> &'static str;
    fn encode(&self, input: &[u8]) -> io::Result<Vec<u8>>;
    fn decode(&self, input: &[u8]) -> io::Result<Vec<u8>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GzipCodec;

impl BodyCodec for GzipCodec {
    fn name(&self) -> &'static str {
        GZIP
    }

    fn encode(&self, input: &[u8]) -> io::Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(input)?;
        encoder.finish()
    }

    fn decode(&self, input: &[u8]) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        GzDecoder::new(input).read_to_end(&mut out)?;
        Ok(out)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CompressCodec;

impl BodyCodec for CompressCodec {
    fn name(&self) -> &'static str {
        COMPRESS
    }

    fn encode(&self, input: &[u8]) -> io::Result<Vec<u8>> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(input)?;
        encoder.finish()
    }

    fn decode(&self, input: &[u8]) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        ZlibDecoder::new(input).read_to_end(&mut out)?;
        Ok(out)
    }
}

/// Encoding chosen for one response.
#[derive(Clone)]
pub enum Negotiated {
    Identity,
    Codec(Arc<dyn BodyCodec>),
}

impl Negotiated {
    pub fn name(&self) -> &'static str {
        match self {
            Negotiated::Identity => IDENTITY,
            Negotiated::Codec(codec) => codec.name(),
        }
    }

    pub fn encode(&self, body: Vec<u8>) -> io::Result<Vec<u8>> {
        match self {
            Negotiated::Identity => Ok(body),
            Negotiated::Codec(codec) => codec.encode(&body),
        }
    }
}

impl fmt::Debug for Negotiated {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Codecs keyed by encoding token.
#[derive(Clone)]
pub struct CodecRegistry {
    codecs: HashMap<&'static str, Arc<dyn BodyCodec>>,
}

impl CodecRegistry {
    /// Registry with no codecs: everything is identity.
    pub fn empty() -> Self {
        Self { codecs: HashMap::new() }
    }

    pub fn register(&mut self, codec: Arc<dyn BodyCodec>) {
        self.codecs.insert(codec.name(), codec);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn BodyCodec>> {
        self.codecs.get(name.trim().to_ascii_lowercase().as_str()).cloned()
    }

    /// Choose the response encoding from `Accept-Encoding` header values.
    pub fn negotiate<'a, I>(&self, accept_encoding: I) -> Negotiated
    where
        I: IntoIterator<Item = &'a str>,
    {
        accept_encoding
            .into_iter()
            .flat_map(|value| value.split(','))
            .map(|entry| entry.split(';').next().unwrap_or_default().trim())
            .filter(|token| token.eq_ignore_ascii_case(GZIP) || token.eq_ignore_ascii_case(COMPRESS))
            .find_map(|token| self.get(token))
            .map(Negotiated::Codec)
            .unwrap_or(Negotiated::Identity)
    }

    /// Decode a request body according to its `Content-Encoding`. Unknown
    /// encodings pass the body through untouched.
    pub fn decode(&self, content_encoding: Option<&str>, body: &[u8]) -> io::Result<Vec<u8>> {
        match content_encoding.and_then(|name| self.get(name)) {
            Some(codec) => codec.decode(body),
            None => Ok(body.to_vec()),
        }
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(GzipCodec));
        registry.register(Arc::new(CompressCodec));
        registry
    }
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecRegistry")
            .field("codecs", &self.codecs.keys().collect::<Vec<_>>())
            .finish()
    }
}
