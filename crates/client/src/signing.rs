//! Request signing for the event-stream handshake.
//!
//! The server matches `sign` against the MD5 hex digest of
//! `"{secret_id}:{secret_key}"`. The digest is a shared-secret check, not a
//! cryptographic signature, but the algorithm and input format are fixed by
//! the wire protocol.

use md5::{Digest, Md5};
use url::Url;

use sk_domain::config::Credentials;
use sk_domain::error::{Error, Result};

/// Lowercase hex MD5 of `"{id}:{secret}"`.
pub fn sign(id: &str, secret: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(id.as_bytes());
    hasher.update(b":");
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Append `secret_id` and `sign` query parameters to `base_url`.
pub fn build_stream_url(base_url: &str, id: &str, signature: &str) -> Result<Url> {
    let mut url = Url::parse(base_url)
        .map_err(|e| Error::Config(format!("invalid base URL {base_url:?}: {e}")))?;
    url.query_pairs_mut()
        .append_pair("secret_id", id)
        .append_pair("sign", signature);
    Ok(url)
}

/// Sign `credentials` and build the stream URL in one step.
pub fn signed_stream_url(base_url: &str, credentials: &Credentials) -> Result<Url> {
    let signature = sign(&credentials.secret_id, &credentials.secret_key);
    build_stream_url(base_url, &credentials.secret_id, &signature)
}
