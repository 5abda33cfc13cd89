//! Listing, download and upload against an acquired [`Session`].
//!
//! Design notes:
//! - downloads force a single sequential write stream, see [`SequentialWriter`]
//! - uploads peek 512 bytes for content-type sniffing and replay them, the
//!   store always receives the full source stream
//! - every store round-trip runs under the shared bounded retry policy

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use anyhow::anyhow;
use bytes::{BufMut, BytesMut};
use http::header::{HeaderMap, HeaderValue, CONTENT_DISPOSITION};
use s3::serde_types::Part;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};

use crate::error::{BoxError, TransferError};
use crate::path::ObjectPath;
use crate::retry::{with_retry, RetryPolicy};
use crate::session::Session;
use crate::sniff;

/// Hard ceiling on multipart part count.
pub const MAX_PARTS: u32 = 10_000;
/// Smallest part size the store accepts for non-final parts.
pub const MIN_PART_SIZE: u64 = 5 * 1024 * 1024;

/// Part size that keeps an upload of `total_size` bytes under [`MAX_PARTS`]
/// parts, never below [`MIN_PART_SIZE`].
pub fn part_size_for(total_size: u64) -> u64 {
    total_size.div_ceil(MAX_PARTS as u64).max(MIN_PART_SIZE)
}

/// Tuning knobs for [`Session::upload`].
#[derive(Debug, Clone)]
pub struct UploadOptions {
    /// Explicit part size in bytes; derived from `size_hint` when unset.
    /// Values below [`MIN_PART_SIZE`] are raised to the floor.
    pub part_size: Option<u64>,
    /// Maximum number of parts the upload may produce.
    pub max_parts: u32,
    /// Expected source size, feeds the part-size derivation.
    pub size_hint: Option<u64>,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            part_size: None,
            max_parts: MAX_PARTS,
            size_hint: None,
        }
    }
}

impl UploadOptions {
    fn effective_part_size(&self) -> u64 {
        self.part_size
            .unwrap_or_else(|| part_size_for(self.size_hint.unwrap_or(0)))
            .max(MIN_PART_SIZE)
    }
}

impl Session {
    /// Enumerate all object keys under `path`, relative to the queried prefix.
    ///
    /// Pages are requested with continuation tokens until the store reports
    /// no more remain; store order is preserved and keys are not
    /// deduplicated. The whole enumeration shares the bounded retry
    /// discipline of the other operations and restarts from the first page
    /// on a retry.
    pub async fn list_keys(&self, path: &str) -> Result<Vec<String>, TransferError> {
        let parsed = ObjectPath::parse(path)?;
        let bucket = self
            .bucket(&parsed.bucket)
            .map_err(|e| storage_error("list", &parsed.bucket, &parsed.key, e))?;
        let policy = RetryPolicy::default();

        let bucket_ref = &bucket;
        let prefix = parsed.key.as_str();
        with_retry(&policy, "list objects", move |attempt| async move {
            tracing::debug!(
                "attempt {} to list s3://{}/{}",
                attempt,
                bucket_ref.name(),
                prefix
            );

            let mut keys = Vec::new();
            let mut token: Option<String> = None;
            loop {
                let (page, code) = bucket_ref
                    .list_page(prefix.to_string(), None, token, None, None)
                    .await?;
                if code != 200 {
                    return Err(anyhow!("list page returned HTTP {}", code).into());
                }

                for object in page.contents {
                    keys.push(relative_key(prefix, &object.key));
                }

                if !page.is_truncated {
                    break;
                }
                token = page.next_continuation_token;
                if token.is_none() {
                    break;
                }
            }
            Ok::<_, BoxError>(keys)
        })
        .await
        .map_err(|e| storage_error("list", &parsed.bucket, &parsed.key, e))
    }

    /// Stream one object into `sink`.
    ///
    /// Bounded retry loop; a retried attempt restarts the object from the
    /// beginning and writes into the same sink. All writes pass through a
    /// [`SequentialWriter`], which pins the transfer to a single in-order
    /// byte stream: the sink is only required to support sequential appends,
    /// never positional writes, so parallel segment fetching stays off.
    pub async fn download<W>(&self, path: &str, sink: &mut W) -> Result<(), TransferError>
    where
        W: AsyncWrite + Send + Unpin + ?Sized,
    {
        let parsed = ObjectPath::parse(path)?;
        let bucket = self
            .bucket(&parsed.bucket)
            .map_err(|e| storage_error("get", &parsed.bucket, &parsed.key, e))?;
        let policy = RetryPolicy::default();

        let mut attempt = 0;
        loop {
            attempt += 1;
            tracing::debug!(
                "attempt {} to download s3://{}/{}",
                attempt,
                parsed.bucket,
                parsed.key
            );

            let mut writer = SequentialWriter::new(&mut *sink);
            let failure: BoxError = match bucket
                .get_object_to_writer(&parsed.key, &mut writer)
                .await
            {
                Ok(200) => {
                    tracing::debug!(
                        "downloaded {} bytes from s3://{}/{}",
                        writer.bytes_written(),
                        parsed.bucket,
                        parsed.key
                    );
                    return Ok(());
                }
                Ok(code) => anyhow!("get object returned HTTP {}", code).into(),
                Err(err) => err.into(),
            };

            if attempt >= policy.attempts {
                return Err(storage_error("get", &parsed.bucket, &parsed.key, failure));
            }
            let pause = policy.backoff(attempt);
            tracing::warn!(
                "download attempt {} failed: {} (retrying in {:?})",
                attempt,
                failure,
                pause
            );
            tokio::time::sleep(pause).await;
        }
    }

    /// Stream `source` into a single object at `to_path`.
    ///
    /// When `to_path` names only a bucket, the destination key defaults to
    /// the base filename of `from_hint`. Up to 512 bytes are peeked once to
    /// classify the content type; the peeked prefix is replayed into the
    /// first part, so the store receives the full stream. The object is
    /// tagged with the sniffed content type and a fixed content disposition
    /// of `attachment`.
    ///
    /// A generic byte source cannot be rewound, so the bounded retry policy
    /// applies per store round-trip (initiate, each part put, complete)
    /// rather than to a whole-stream replay. A terminal failure aborts the
    /// multipart upload; no partially uploaded object becomes visible.
    pub async fn upload<R>(
        &self,
        to_path: &str,
        from_hint: &str,
        source: &mut R,
        options: &UploadOptions,
    ) -> Result<(), TransferError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let parsed = ObjectPath::parse(to_path)?;
        let key = destination_key(&parsed, from_hint)?;

        let mut prefix = peek_prefix(source).await.map_err(TransferError::Read)?;
        let content_type = classify(&prefix, from_hint);
        let part_size = options.effective_part_size();

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_DISPOSITION, HeaderValue::from_static("attachment"));
        let bucket = self
            .bucket(&parsed.bucket)
            .and_then(|b| b.with_extra_headers(headers).map_err(BoxError::from))
            .map_err(|e| storage_error("put", &parsed.bucket, &key, e))?;

        tracing::debug!(
            "uploading s3://{}/{} as {} ({} byte parts)",
            parsed.bucket,
            key,
            content_type,
            part_size
        );

        let policy = RetryPolicy::default();
        let bucket_ref = &bucket;
        let key_ref = key.as_str();
        let content_type_ref = content_type.as_str();

        let init = with_retry(&policy, "initiate multipart upload", move |attempt| {
            async move {
                tracing::debug!("attempt {} to initiate upload of {}", attempt, key_ref);
                bucket_ref
                    .initiate_multipart_upload(key_ref, content_type_ref)
                    .await
                    .map_err(BoxError::from)
            }
        })
        .await
        .map_err(|e| storage_error("put", &parsed.bucket, &key, e))?;

        let upload_id = init.upload_id;
        let upload_id_ref = upload_id.as_str();

        let mut parts: Vec<Part> = Vec::new();
        let streamed = loop {
            let chunk = match fill_part(source, &mut prefix, part_size as usize).await {
                Ok(chunk) => chunk,
                Err(err) => break Err(TransferError::Read(err)),
            };
            // An empty first chunk still becomes a part: an empty source
            // must produce an (empty) object.
            if chunk.is_empty() && !parts.is_empty() {
                break Ok(());
            }

            let part_number = parts.len() as u32 + 1;
            if part_number > options.max_parts {
                break Err(storage_error(
                    "put",
                    &parsed.bucket,
                    &key,
                    anyhow!(
                        "source exceeds {} parts at {} bytes per part",
                        options.max_parts,
                        part_size
                    ),
                ));
            }
            let last = (chunk.len() as u64) < part_size;

            let chunk_ref = &chunk;
            let put = with_retry(&policy, "put part", move |attempt| async move {
                tracing::debug!(
                    "attempt {} to put part {} of {} ({} bytes)",
                    attempt,
                    part_number,
                    key_ref,
                    chunk_ref.len()
                );
                bucket_ref
                    .put_multipart_chunk(
                        chunk_ref.to_vec(),
                        key_ref,
                        part_number,
                        upload_id_ref,
                        content_type_ref,
                    )
                    .await
                    .map_err(BoxError::from)
            })
            .await;

            match put {
                Ok(part) => parts.push(part),
                Err(err) => break Err(storage_error("put", &parsed.bucket, &key, err)),
            }
            if last {
                break Ok(());
            }
        };

        if let Err(err) = streamed {
            let _ = bucket.abort_upload(&key, &upload_id).await;
            return Err(err);
        }

        let parts_ref = &parts;
        let completed = with_retry(&policy, "complete multipart upload", move |attempt| {
            async move {
                tracing::debug!("attempt {} to complete upload of {}", attempt, key_ref);
                let response = bucket_ref
                    .complete_multipart_upload(key_ref, upload_id_ref, parts_ref.clone())
                    .await
                    .map_err(BoxError::from)?;
                // The store can reject the assembly even after every part
                // landed.
                if !(200..300).contains(&response.status_code()) {
                    return Err(anyhow!(
                        "complete multipart upload returned HTTP {}",
                        response.status_code()
                    )
                    .into());
                }
                Ok::<_, BoxError>(())
            }
        })
        .await;

        if let Err(err) = completed {
            let _ = bucket.abort_upload(&key, &upload_id).await;
            return Err(storage_error("put", &parsed.bucket, &key, err));
        }

        tracing::debug!(
            "uploaded s3://{}/{} in {} part(s)",
            parsed.bucket,
            key,
            parts.len()
        );
        Ok(())
    }
}

/// Resolve the destination key for an upload: an explicit key wins, a
/// bucket-only path falls back to the base filename of the source hint.
fn destination_key(path: &ObjectPath, from_hint: &str) -> Result<String, TransferError> {
    if !path.key.is_empty() {
        return Ok(path.key.clone());
    }
    std::path::Path::new(from_hint)
        .file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| TransferError::InvalidPath(from_hint.to_string()))
}

/// Strip the queried prefix (first occurrence) from a stored key, yielding a
/// path relative to the queried directory.
fn relative_key(prefix: &str, key: &str) -> String {
    key.strip_prefix(prefix).unwrap_or(key).to_string()
}

fn storage_error(
    op: &'static str,
    bucket: &str,
    key: &str,
    source: impl Into<BoxError>,
) -> TransferError {
    TransferError::Storage {
        op,
        bucket: bucket.to_string(),
        key: key.to_string(),
        source: source.into(),
    }
}

/// Sniff a content type from the peeked bytes; when the window is
/// inconclusive, fall back to an extension-based guess from the source hint.
fn classify(peeked: &[u8], from_hint: &str) -> String {
    let sniffed = sniff::detect_content_type(peeked);
    if sniffed == "application/octet-stream" {
        if let Some(guess) = mime_guess::from_path(from_hint).first() {
            return guess.essence_str().to_string();
        }
    }
    sniffed.to_string()
}

/// Read up to [`sniff::SNIFF_WINDOW`] bytes from `source` without losing
/// them: the caller hands the buffer to [`fill_part`], which replays it
/// ahead of the remaining stream. End of stream is not an error.
async fn peek_prefix<R>(source: &mut R) -> io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut buf = vec![0u8; sniff::SNIFF_WINDOW];
    let mut filled = 0;
    while filled < buf.len() {
        let n = source.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    buf.truncate(filled);
    Ok(buf)
}

/// Assemble the next upload part: replayed peek bytes first, then the
/// source, until `part_size` bytes or end of stream.
async fn fill_part<R>(
    source: &mut R,
    prefix: &mut Vec<u8>,
    part_size: usize,
) -> io::Result<BytesMut>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut chunk = BytesMut::with_capacity(part_size);
    if !prefix.is_empty() {
        let take = prefix.len().min(part_size);
        chunk.extend_from_slice(&prefix[..take]);
        prefix.drain(..take);
    }

    while chunk.len() < part_size {
        let remaining = part_size - chunk.len();
        let n = source.read_buf(&mut (&mut chunk).limit(remaining)).await?;
        if n == 0 {
            break;
        }
    }
    Ok(chunk)
}

/// Serializes object bytes into one in-order write stream.
///
/// The storage client is pointed at this wrapper instead of the caller's
/// sink directly: sinks are only required to support sequential appends,
/// so out-of-order positional writes must never reach them. Keeping the
/// download single-streamed is a correctness constraint, not a tuning
/// decision.
pub struct SequentialWriter<W> {
    inner: W,
    written: u64,
}

impl<W> SequentialWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, written: 0 }
    }

    /// Bytes delivered to the sink so far.
    pub fn bytes_written(&self) -> u64 {
        self.written
    }
}

impl<W: AsyncWrite + Unpin> AsyncWrite for SequentialWriter<W> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_write(cx, buf) {
            Poll::Ready(Ok(n)) => {
                this.written += n as u64;
                Poll::Ready(Ok(n))
            }
            other => other,
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}
