//! Content-addressed entry identity.
//!
//! The fingerprint (stored as `remote_id`) is what makes repeated syncs of an
//! unchanged feed idempotent: it depends only on the entry's instant and
//! summary, never on metadata or on the zone the date was written in.

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use chrono::{DateTime, TimeZone};
use sha2::{Digest, Sha512};

/// `base64url(SHA-512("{unix seconds UTC}\n{summary}"))`.
pub fn fingerprint<Tz: TimeZone>(date: &DateTime<Tz>, summary: &str) -> String {
    let mut hasher = Sha512::new();
    hasher.update(format!("{}\n{}", date.timestamp(), summary).as_bytes());
    URL_SAFE.encode(hasher.finalize())
}
