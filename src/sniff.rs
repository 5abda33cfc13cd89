//! Content-type detection from a leading byte window.
//!
//! Matches well-known magic numbers over at most the first 512 bytes of a
//! stream, then falls back to a text-or-binary heuristic. The window is small
//! enough to peek without buffering the stream.

/// Number of leading bytes the sniffer considers.
pub const SNIFF_WINDOW: usize = 512;

const SIGNATURES: &[(&[u8], &str)] = &[
    (b"%PDF-", "application/pdf"),
    (&[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a], "image/png"),
    (&[0xff, 0xd8, 0xff], "image/jpeg"),
    (b"GIF87a", "image/gif"),
    (b"GIF89a", "image/gif"),
    (b"PK\x03\x04", "application/zip"),
    (&[0x1f, 0x8b], "application/gzip"),
    (b"OggS", "application/ogg"),
    (b"%!PS-", "application/postscript"),
];

/// Classify a byte sample. Only the first [`SNIFF_WINDOW`] bytes are
/// considered; anything unrecognized and non-textual is
/// `application/octet-stream`.
pub fn detect_content_type(data: &[u8]) -> &'static str {
    let window = &data[..data.len().min(SNIFF_WINDOW)];

    for (magic, mime) in SIGNATURES {
        if window.starts_with(magic) {
            return mime;
        }
    }

    if looks_textual(window) {
        "text/plain; charset=utf-8"
    } else {
        "application/octet-stream"
    }
}

/// A window is textual when it is valid UTF-8 (a trailing partial code point
/// is tolerated, the window may cut one in half) and contains no control
/// bytes other than whitespace.
fn looks_textual(window: &[u8]) -> bool {
    let text = match std::str::from_utf8(window) {
        Ok(text) => text,
        Err(err) if err.error_len().is_none() => {
            match std::str::from_utf8(&window[..err.valid_up_to()]) {
                Ok(text) => text,
                Err(_) => return false,
            }
        }
        Err(_) => return false,
    };
    !text.chars().any(|c| c.is_control() && !c.is_whitespace())
}
