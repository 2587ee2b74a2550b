//! MD5 digests and ETag interpretation
//!
//! S3 reports the hex MD5 of the body as the ETag of a single-part upload
//! stored without KMS encryption. Multipart uploads report
//! `<md5-of-part-md5s>-<parts>` instead, which cannot be reproduced from
//! the file alone, so those ETags are treated as unusable.

use crate::error::{IoResultExt, Result, SyncError};
use md5::{Digest, Md5};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

const BUFFER_SIZE: usize = 256 * 1024;

/// Compute the lowercase hex MD5 of a file
pub fn md5_file(path: &Path) -> Result<String> {
    let file = File::open(path).with_path(path)?;
    let mut reader = BufReader::with_capacity(BUFFER_SIZE, file);
    let mut hasher = Md5::new();
    let mut buffer = vec![0u8; BUFFER_SIZE];

    loop {
        let bytes_read = reader
            .read(&mut buffer)
            .map_err(|e| SyncError::io(path, e))?;

        if bytes_read == 0 {
            break;
        }

        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Compute the lowercase hex MD5 of data in memory
pub fn md5_bytes(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

/// Extract a comparable MD5 from an ETag, if it is one
///
/// Accepts quoted or bare values and weak validators (`W/"..."`).
/// Returns `None` for multipart ETags and anything that is not 32 hex digits.
pub fn etag_md5(etag: &str) -> Option<String> {
    let value = etag.trim();
    let value = value.strip_prefix("W/").unwrap_or(value);
    let value = value.trim_matches('"');

    if value.len() != 32 || !value.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }

    Some(value.to_ascii_lowercase())
}

/// Whether an ETag describes a multipart upload
pub fn is_multipart_etag(etag: &str) -> bool {
    etag.trim_matches('"').contains('-')
}
