//! User feedback, bug reports and license requests.
//!
//! Everything the user typed travels as query string fields; an optional file
//! (a log, a screenshot) is uploaded as the multipart attachment. The script
//! answers with a single integer status code in the response body.

use crate::engine::WebEngine;
use crate::error::Result;
use crate::query::Query;
use crate::types::{Reply, ReplyStatus};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use url::Url;

/// Default feedback endpoint
pub const DEFAULT_URL: &str = "http://www.ensisoft.com/feedback.php";

/// How the user feels about the application
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feeling {
    /// :)
    Positive,
    /// :|
    Neutral,
    /// :(
    Negative,
}

/// What kind of message is being sent
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackKind {
    /// General feedback with a sentiment
    Feedback(Feeling),
    /// Bug report
    BugReport,
    /// Feature request
    FeatureRequest,
    /// License request
    LicenseRequest,
}

impl FeedbackKind {
    /// Value of the `type` field understood by the server
    pub fn legacy_code(&self) -> &'static str {
        match self {
            FeedbackKind::Feedback(Feeling::Negative) => "1",
            FeedbackKind::Feedback(Feeling::Positive) => "2",
            FeedbackKind::Feedback(Feeling::Neutral) => "3",
            FeedbackKind::BugReport => "4",
            FeedbackKind::FeatureRequest => "5",
            FeedbackKind::LicenseRequest => "6",
        }
    }
}

/// A message composed by the user
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackMessage {
    /// Message kind
    pub kind: FeedbackKind,
    /// Sender name (required by the server)
    pub name: String,
    /// Reply address, may be empty
    #[serde(default)]
    pub email: String,
    /// Sender country, may be empty
    #[serde(default)]
    pub country: String,
    /// Application version
    pub version: String,
    /// Platform name
    pub platform: String,
    /// Message body (required by the server)
    pub text: String,
    /// File to upload with the message
    #[serde(default)]
    pub attachment: Option<PathBuf>,
}

/// Outcome of sending a feedback message
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FeedbackResponse {
    /// The message was recorded
    Success,
    /// The server throttled this host for sending too often
    TooFrequent,
    /// The server's database could not be reached
    DatabaseUnavailable,
    /// The server failed to store the message
    DatabaseError,
    /// The server could not send its notification mail
    EmailUnavailable,
    /// The message never reached the server (or the engine gave up on it)
    NetworkError(ReplyStatus),
    /// The server answered with something other than a known status code
    InvalidResponse(String),
}

impl FeedbackResponse {
    /// Map a server status code
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(FeedbackResponse::Success),
            1 => Some(FeedbackResponse::TooFrequent),
            2 => Some(FeedbackResponse::DatabaseUnavailable),
            3 => Some(FeedbackResponse::DatabaseError),
            4 => Some(FeedbackResponse::EmailUnavailable),
            _ => None,
        }
    }

    /// Returns true if the message was recorded
    pub fn is_success(&self) -> bool {
        matches!(self, FeedbackResponse::Success)
    }
}

/// Build the query for `message`, reading its attachment from disk
///
/// Fails with [`Error::Io`](crate::Error::Io) if the attachment cannot be
/// read.
pub async fn build_query(url: &Url, message: &FeedbackMessage) -> Result<Query> {
    let mut query = Query::new(url.clone())
        .with_field("name", &message.name)
        .with_field("email", &message.email)
        .with_field("country", &message.country)
        .with_field("version", &message.version)
        .with_field("platform", &message.platform)
        .with_field("text", &message.text)
        .with_field("type", message.kind.legacy_code());

    if let Some(path) = &message.attachment {
        let data = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        tracing::debug!(path = %path.display(), bytes = data.len(), "attaching file to feedback");
        query = query.with_attachment(name, data);
    }
    Ok(query)
}

/// Interpret the server's reply
pub fn parse_response(reply: &Reply) -> FeedbackResponse {
    if !reply.is_success() {
        tracing::warn!(status = %reply.status, "feedback was not delivered");
        return FeedbackResponse::NetworkError(reply.status.clone());
    }

    let body = reply.text();
    let body = body.trim();
    match body.parse::<i64>().ok().and_then(FeedbackResponse::from_code) {
        Some(response) => {
            tracing::debug!(code = body, "feedback response");
            response
        }
        None => FeedbackResponse::InvalidResponse(body.to_string()),
    }
}

/// Send `message` to `url` through `engine` and wait for the server's answer
pub async fn send(engine: &WebEngine, url: &Url, message: &FeedbackMessage) -> Result<FeedbackResponse> {
    let query = build_query(url, message).await?;
    let reply = engine.fetch(query).await?;
    Ok(parse_response(&reply))
}
