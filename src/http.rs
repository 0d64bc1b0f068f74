//! HTTP client abstraction for size probes and body streaming.
//!
//! The engine never talks to `reqwest` directly; everything goes through
//! the [`HttpClient`] trait so tests can inject a mock transport and so the
//! two operations the engine needs (metadata-only probe, streaming body
//! read) are explicit in the seam.

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::{FutureExt, StreamExt, TryStreamExt};

use crate::{Error, Result};

/// A lazily-produced sequence of body bytes.
///
/// Streams are single-pass and non-restartable; consumers pull chunks with
/// backpressure and drop the stream to abandon the transfer.
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// Trait for the HTTP operations the engine performs.
///
/// Methods return boxed futures so the trait stays object-safe; the engine
/// holds clients as `Arc<dyn HttpClient>`.
pub trait HttpClient: Send + Sync {
    /// Issues a metadata-only probe for `url` and returns its body size.
    ///
    /// Returns `Ok(None)` when the server answered successfully but did not
    /// advertise a length. Errors indicate transport failure or a
    /// non-success status; callers decide whether that is fatal (for the
    /// size cache it never is).
    fn content_length(&self, url: &str) -> BoxFuture<'_, Result<Option<u64>>>;

    /// Issues a body read for `url` and returns its byte stream.
    ///
    /// The request is in flight once the future resolves; the stream yields
    /// chunks as the network produces them.
    fn fetch(&self, url: &str) -> BoxFuture<'_, Result<ByteStream>>;
}

/// Production [`HttpClient`] backed by `reqwest`.
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Creates a client with a 30-second request timeout.
    pub fn new() -> Result<Self> {
        Self::with_timeout(30)
    }

    /// Creates a client with a custom request timeout.
    ///
    /// The timeout covers connection establishment and headers, not the
    /// whole body transfer; large streamed bodies must not be cut short by
    /// a wall-clock limit.
    pub fn with_timeout(timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| Error::SinkInvalid(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

impl HttpClient for ReqwestClient {
    fn content_length(&self, url: &str) -> BoxFuture<'_, Result<Option<u64>>> {
        let request = self.client.head(url);
        let url = url.to_string();
        async move {
            let response = request.send().await.map_err(|e| Error::http(&url, e))?;
            if !response.status().is_success() {
                return Err(Error::http(&url, format!("HTTP {}", response.status())));
            }
            let length = response
                .headers()
                .get(reqwest::header::CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            Ok(length)
        }
        .boxed()
    }

    fn fetch(&self, url: &str) -> BoxFuture<'_, Result<ByteStream>> {
        let request = self.client.get(url);
        let url = url.to_string();
        async move {
            let response = request.send().await.map_err(|e| Error::http(&url, e))?;
            if !response.status().is_success() {
                return Err(Error::http(&url, format!("HTTP {}", response.status())));
            }
            let stream = response
                .bytes_stream()
                .map_err(move |e| Error::http(&url, e));
            Ok(stream.boxed() as ByteStream)
        }
        .boxed()
    }
}

#[cfg(test)]
pub(crate) mod mock {
    //! In-memory transport for unit tests.

    #![allow(dead_code)] // each test module uses a subset of the fixtures

    use std::collections::{HashMap, HashSet};

    use super::*;

    /// Mock transport serving canned bodies, with per-URL failure modes.
    #[derive(Default)]
    pub struct MockHttpClient {
        bodies: HashMap<String, Vec<u8>>,
        /// URLs whose probe fails (transport error).
        failing_probes: HashSet<String>,
        /// URLs that answer probes without a content-length.
        lengthless: HashSet<String>,
        /// URLs whose body stream errors after this many bytes.
        truncated: HashMap<String, usize>,
        /// Chunk size used when streaming bodies.
        chunk_size: usize,
    }

    impl MockHttpClient {
        pub fn new() -> Self {
            Self {
                chunk_size: 8,
                ..Self::default()
            }
        }

        pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
            self.chunk_size = chunk_size;
            self
        }

        pub fn body(mut self, url: &str, body: impl Into<Vec<u8>>) -> Self {
            self.bodies.insert(url.to_string(), body.into());
            self
        }

        /// Registers a URL whose probe succeeds with the given size but
        /// whose body is never fetched (size-only fixture).
        pub fn sized(mut self, url: &str, size: usize) -> Self {
            self.bodies.insert(url.to_string(), vec![0u8; size]);
            self
        }

        pub fn failing_probe(mut self, url: &str) -> Self {
            self.failing_probes.insert(url.to_string());
            self
        }

        pub fn lengthless(mut self, url: &str) -> Self {
            self.lengthless.insert(url.to_string());
            self
        }

        /// Makes the body stream for `url` fail after `after` bytes.
        pub fn truncated(mut self, url: &str, after: usize) -> Self {
            self.truncated.insert(url.to_string(), after);
            self
        }
    }

    impl HttpClient for MockHttpClient {
        fn content_length(&self, url: &str) -> BoxFuture<'_, Result<Option<u64>>> {
            let result = if self.failing_probes.contains(url) {
                Err(Error::http(url, "connection refused"))
            } else if self.lengthless.contains(url) {
                Ok(None)
            } else {
                match self.bodies.get(url) {
                    Some(body) => Ok(Some(body.len() as u64)),
                    None => Err(Error::http(url, "HTTP 404 Not Found")),
                }
            };
            async move { result }.boxed()
        }

        fn fetch(&self, url: &str) -> BoxFuture<'_, Result<ByteStream>> {
            let body = self.bodies.get(url).cloned();
            let truncate_at = self.truncated.get(url).copied();
            let chunk_size = self.chunk_size.max(1);
            let url = url.to_string();
            async move {
                let body = body.ok_or_else(|| Error::http(&url, "HTTP 404 Not Found"))?;
                let served = match truncate_at {
                    Some(n) => body[..n.min(body.len())].to_vec(),
                    None => body,
                };
                let mut chunks: Vec<Result<Bytes>> = served
                    .chunks(chunk_size)
                    .map(|c| Ok(Bytes::copy_from_slice(c)))
                    .collect();
                if truncate_at.is_some() {
                    chunks.push(Err(Error::http(&url, "connection reset mid-body")));
                }
                Ok(futures::stream::iter(chunks).boxed() as ByteStream)
            }
            .boxed()
        }
    }

    #[tokio::test]
    async fn test_mock_roundtrip() {
        let mock = MockHttpClient::new().body("http://x/a", b"hello".to_vec());
        assert_eq!(mock.content_length("http://x/a").await.unwrap(), Some(5));

        let stream = mock.fetch("http://x/a").await.unwrap();
        let collected: Vec<_> = stream.try_collect::<Vec<_>>().await.unwrap();
        let joined: Vec<u8> = collected.iter().flat_map(|b| b.to_vec()).collect();
        assert_eq!(joined, b"hello");
    }

    #[tokio::test]
    async fn test_mock_missing_url_errors() {
        let mock = MockHttpClient::new();
        assert!(mock.content_length("http://x/missing").await.is_err());
        assert!(mock.fetch("http://x/missing").await.is_err());
    }

    #[tokio::test]
    async fn test_mock_truncated_body_errors_mid_stream() {
        let mock = MockHttpClient::new().body("http://x/a", vec![1u8; 32]).truncated("http://x/a", 16);
        let stream = mock.fetch("http://x/a").await.unwrap();
        let items: Vec<_> = stream.collect::<Vec<_>>().await;
        assert!(items.last().unwrap().is_err());
        let delivered: usize = items
            .iter()
            .filter_map(|r| r.as_ref().ok().map(|b| b.len()))
            .sum();
        assert_eq!(delivered, 16);
    }
}
