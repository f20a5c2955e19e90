//! Body plumbing between hyper and the streaming ports
//!
//! Two adapters bridge hyper bodies and `AsyncRead`: [`BodyReader`]
//! turns an incoming request body into the reader the upload use case
//! streams from (cancellation drops the reader and aborts the blob
//! write), and [`ReaderBody`] turns a blob reader into a streaming
//! response body for downloads.

use std::pin::Pin;
use std::task::{Context, Poll};

use http_body_util::BodyExt;
use hyper::body::{Body, Bytes, Frame, Incoming};
use tokio::io::{AsyncRead, ReadBuf};

use wexhub_core::ports::blob_store::BlobReader;

/// Boxed response body used by every handler
///
/// Unsync because blob readers are `Send` trait objects without a `Sync`
/// bound; hyper only needs `Send` here.
pub type HttpBody = http_body_util::combinators::UnsyncBoxBody<Bytes, std::io::Error>;

/// A buffered body from owned bytes
pub fn full(bytes: impl Into<Bytes>) -> HttpBody {
    http_body_util::Full::new(bytes.into())
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// An empty body
pub fn empty() -> HttpBody {
    full(Bytes::new())
}

/// `AsyncRead` over an incoming hyper body
pub struct BodyReader {
    body: Incoming,
    leftover: Bytes,
}

impl BodyReader {
    pub fn new(body: Incoming) -> Self {
        Self {
            body,
            leftover: Bytes::new(),
        }
    }

    /// Boxes the reader for the blob port
    pub fn into_blob_reader(self) -> BlobReader {
        Box::new(self)
    }
}

impl AsyncRead for BodyReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        loop {
            if !self.leftover.is_empty() {
                let n = self.leftover.len().min(buf.remaining());
                buf.put_slice(&self.leftover[..n]);
                let leftover = self.leftover.split_off(n);
                self.leftover = leftover;
                return Poll::Ready(Ok(()));
            }
            match Pin::new(&mut self.body).poll_frame(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(None) => return Poll::Ready(Ok(())),
                Poll::Ready(Some(Ok(frame))) => {
                    // Trailer frames carry no data; keep polling
                    if let Ok(data) = frame.into_data() {
                        self.leftover = data;
                    }
                }
                Poll::Ready(Some(Err(e))) => {
                    return Poll::Ready(Err(std::io::Error::other(e)));
                }
            }
        }
    }
}

/// Streaming response body over a blob reader
pub struct ReaderBody {
    reader: BlobReader,
}

impl ReaderBody {
    pub fn new(reader: BlobReader) -> Self {
        Self { reader }
    }

    pub fn boxed(self) -> HttpBody {
        BodyExt::boxed_unsync(self)
    }
}

impl Body for ReaderBody {
    type Data = Bytes;
    type Error = std::io::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let mut chunk = [0u8; 16 * 1024];
        let mut read_buf = ReadBuf::new(&mut chunk);
        match Pin::new(&mut self.reader).poll_read(cx, &mut read_buf) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Err(e)) => Poll::Ready(Some(Err(e))),
            Poll::Ready(Ok(())) => {
                let filled = read_buf.filled();
                if filled.is_empty() {
                    Poll::Ready(None)
                } else {
                    Poll::Ready(Some(Ok(Frame::data(Bytes::copy_from_slice(filled)))))
                }
            }
        }
    }
}

/// Reads a whole request body, refusing anything over `limit` bytes
pub async fn read_limited(body: Incoming, limit: usize) -> Result<Bytes, ReadBodyError> {
    if let Some(declared) = body.size_hint().exact() {
        if declared as usize > limit {
            return Err(ReadBodyError::TooLarge);
        }
    }
    let mut collected = Vec::new();
    let mut body = body;
    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(|e| ReadBodyError::Io(e.to_string()))?;
        if let Ok(data) = frame.into_data() {
            if collected.len() + data.len() > limit {
                return Err(ReadBodyError::TooLarge);
            }
            collected.extend_from_slice(&data);
        }
    }
    Ok(Bytes::from(collected))
}

/// Why a buffered body read was refused
#[derive(Debug)]
pub enum ReadBodyError {
    TooLarge,
    Io(String),
}

/// Extracts the `file` field from a multipart/form-data payload
///
/// A deliberately small parser: it handles the single-file uploads this
/// API receives, not arbitrary nested multipart.
pub fn multipart_file(content_type: &str, body: &[u8]) -> Option<Vec<u8>> {
    let boundary = content_type
        .split(';')
        .map(str::trim)
        .find_map(|part| part.strip_prefix("boundary="))?
        .trim_matches('"');
    let delimiter = format!("--{boundary}");

    let text_window = |start: usize| &body[start..];
    let mut cursor = 0usize;
    while let Some(rel) = find_bytes(text_window(cursor), delimiter.as_bytes()) {
        let part_start = cursor + rel + delimiter.len();
        if body[part_start..].starts_with(b"--") {
            break; // closing delimiter
        }
        // Part headers end at the first blank line
        let headers_end = find_bytes(&body[part_start..], b"\r\n\r\n")?;
        let headers =
            String::from_utf8_lossy(&body[part_start..part_start + headers_end]).to_lowercase();
        let content_start = part_start + headers_end + 4;
        let content_end =
            content_start + find_bytes(&body[content_start..], delimiter.as_bytes())?;
        if headers.contains("name=\"file\"") {
            // Strip the trailing CRLF before the next delimiter
            let content = &body[content_start..content_end];
            let content = content.strip_suffix(b"\r\n").unwrap_or(content);
            return Some(content.to_vec());
        }
        cursor = content_end;
    }
    None
}

fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
