//! Content digest module
//!
//! Computes MD5 digests of local files and interprets S3 ETags so that
//! unchanged objects can be recognized without re-uploading them.

mod etag;

pub use etag::*;
