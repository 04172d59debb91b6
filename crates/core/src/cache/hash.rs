//! Content-addressed cache key generation.

use sha2::{Digest, Sha256};

/// Canonical header serialization: lower-cased names, sorted, one `name:value` per line.
pub fn canonical_headers<'a, I>(headers: I) -> String
where
    I: IntoIterator<Item = (&'a String, &'a String)>,
{
    let mut pairs: Vec<(String, &str)> = headers
        .into_iter()
        .map(|(k, v)| (k.trim().to_lowercase(), v.as_str()))
        .collect();
    pairs.sort();
    pairs
        .iter()
        .map(|(k, v)| format!("{k}:{v}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Compute the cache key for a URL requested with the given headers.
pub fn compute_cache_key<'a, I>(url: &str, headers: I) -> String
where
    I: IntoIterator<Item = (&'a String, &'a String)>,
{
    let mut hasher = Sha256::new();
    hasher.update(b"url:");
    hasher.update(url.as_bytes());
    hasher.update(b"\n");
    hasher.update(canonical_headers(headers).as_bytes());
    hex::encode(hasher.finalize())
}

/// Short hex digest used to name evidence artifacts.
pub fn short_digest(text: &str) -> String {
    let digest = hex::encode(Sha256::digest(text.as_bytes()));
    digest[..12].to_string()
}
