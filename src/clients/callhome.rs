//! New version check.
//!
//! A GET carrying the running version, the platform name and an installation
//! fingerprint; the body of the answer is the latest released version.

use crate::engine::WebEngine;
use crate::error::{Error, Result};
use crate::query::Query;
use crate::types::Reply;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use url::Url;

/// Default version check endpoint
pub const DEFAULT_URL: &str = "http://ensisoft.com/callhome.php";

/// What the client reports about itself
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Installation {
    /// Running version, dotted numeric (e.g. "3.4.1")
    pub version: String,
    /// Platform name
    pub platform: String,
    /// Opaque installation fingerprint
    pub fingerprint: String,
}

/// Result of a version check
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateCheck {
    /// Version the check was made for
    pub current: String,
    /// Latest version reported by the server
    pub latest: String,
    /// Returns true if `latest` is newer than `current`
    pub has_new_version: bool,
}

/// Build the version check query
pub fn build_query(url: &Url, installation: &Installation) -> Query {
    Query::new(url.clone())
        .with_field("version", &installation.version)
        .with_field("platform", &installation.platform)
        .with_field("fingerprint", &installation.fingerprint)
}

/// Interpret the server's reply for an installation running `current`
pub fn parse_reply(current: &str, reply: &Reply) -> Result<UpdateCheck> {
    if !reply.is_success() {
        return Err(Error::Other(format!(
            "checking for new version failed: {}",
            reply.status
        )));
    }

    let latest: String = reply
        .text()
        .chars()
        .filter(|c| *c != '\r' && *c != '\n')
        .collect();
    if latest.is_empty() {
        return Err(Error::InvalidResponse("empty version string".to_string()));
    }

    let has_new_version = is_newer_version(current, &latest);
    tracing::debug!(%latest, has_new_version, "version check complete");
    Ok(UpdateCheck {
        current: current.to_string(),
        latest,
        has_new_version,
    })
}

/// Returns true if `latest` is a later dotted version than `current`
///
/// Components are compared numerically, missing components count as zero
/// ("1.2" == "1.2.0"). A component that is not a number compares as zero.
pub fn is_newer_version(current: &str, latest: &str) -> bool {
    compare_versions(latest, current) == Ordering::Greater
}

fn compare_versions(a: &str, b: &str) -> Ordering {
    let parse = |v: &str| -> Vec<u64> {
        v.trim()
            .split('.')
            .map(|part| part.trim().parse().unwrap_or(0))
            .collect()
    };
    let (a, b) = (parse(a), parse(b));
    let len = a.len().max(b.len());
    for i in 0..len {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        match x.cmp(&y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

/// Ask `url` whether a newer version than `installation.version` exists
pub async fn check_for_update(
    engine: &WebEngine,
    url: &Url,
    installation: &Installation,
) -> Result<UpdateCheck> {
    tracing::debug!(platform = %installation.platform, "calling home");
    let reply = engine.fetch(build_query(url, installation)).await?;
    parse_reply(&installation.version, &reply)
}
