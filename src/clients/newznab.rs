//! Newznab indexer API calls and import of the curated server list.
//!
//! Account checks (`t=caps`) and registration (`t=register`) answer with
//! small XML documents; failures come back as an `<error code=".."/>` root
//! element instead.

use crate::engine::WebEngine;
use crate::error::{Error, Result};
use crate::query::Query;
use crate::types::{Reply, ReplyStatus};
use quick_xml::events::{BytesStart, Event as XmlEvent};
use quick_xml::reader::Reader;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use url::Url;

/// Default server list endpoint
pub const DEFAULT_IMPORT_URL: &str = "http://www.ensisoft.com/import.php";

/// Credentials for one Newznab indexer
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Indexer address; `/api/` is appended when it has no path
    pub api_url: String,
    /// API key (may be empty when registering)
    #[serde(default)]
    pub apikey: String,
    /// Email address used for registration
    #[serde(default)]
    pub email: String,
}

/// What an indexer reported about itself or about a new account
///
/// Account checks fill the server fields, registration fills the account
/// fields.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostInfo {
    /// Server tag line
    pub strapline: String,
    /// Server contact address
    pub email: String,
    /// Server software version
    pub version: String,
    /// Registered user name
    pub username: String,
    /// Registered password
    pub password: String,
    /// API key of the registered account
    pub apikey: String,
    /// User id of the registered account
    pub userid: String,
}

/// Why a Newznab API call failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NewznabError {
    /// The request never produced a usable HTTP response
    #[error("{0}")]
    Network(ReplyStatus),

    /// The body is not the XML document the call expects
    #[error("there was an error reading the response data, perhaps this host is not a Newznab provider?")]
    InvalidResponse,

    /// Error code 100
    #[error("incorrect credentials")]
    IncorrectCredentials,

    /// Error code 101
    #[error("account suspended")]
    AccountSuspended,

    /// Error code 102
    #[error("no permission")]
    NoPermission,

    /// Any other error code, with the server's description
    #[error("{description} (code {code})")]
    Api {
        /// Error code as sent by the server
        code: String,
        /// Server-provided description
        description: String,
    },
}

impl NewznabError {
    fn from_error_element(attributes: &HashMap<String, String>) -> Self {
        let code = attributes.get("code").cloned().unwrap_or_default();
        match code.trim().parse::<u32>() {
            Ok(100) => NewznabError::IncorrectCredentials,
            Ok(101) => NewznabError::AccountSuspended,
            Ok(102) => NewznabError::NoPermission,
            _ => NewznabError::Api {
                code,
                description: attributes.get("description").cloned().unwrap_or_default(),
            },
        }
    }
}

/// Normalise an indexer address into its API endpoint
///
/// A bare host gets `/api/`; an address with any other path is used as is.
///
/// ```
/// use usenet_webquery::clients::newznab::make_api_url;
///
/// let url = make_api_url("https://indexer.example").unwrap();
/// assert_eq!(url.as_str(), "https://indexer.example/api/");
/// ```
pub fn make_api_url(host: &str) -> Result<Url> {
    let mut url = Url::parse(host)?;
    if url.path().is_empty() || url.path() == "/" {
        url.set_path("/api/");
    }
    Ok(url)
}

/// Build the account check query (`t=caps`)
pub fn caps_query(account: &Account) -> Result<Query> {
    Ok(Query::new(make_api_url(&account.api_url)?)
        .with_field("apikey", &account.apikey)
        .with_field("t", "caps"))
}

/// Build the account registration query (`t=register`)
pub fn register_query(account: &Account) -> Result<Query> {
    Ok(Query::new(make_api_url(&account.api_url)?)
        .with_field("apikey", &account.apikey)
        .with_field("t", "register")
        .with_field("email", &account.email))
}

/// An element with its attributes
struct Element {
    name: String,
    attributes: HashMap<String, String>,
}

/// The root element and its direct children
struct Document {
    root: Element,
    children: Vec<Element>,
}

impl Document {
    fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|e| e.name == name)
    }
}

fn element(start: &BytesStart<'_>) -> Option<Element> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut attributes = HashMap::new();
    for attribute in start.attributes() {
        let attribute = attribute.ok()?;
        let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
        let value = attribute.unescape_value().ok()?.into_owned();
        attributes.insert(key, value);
    }
    Some(Element { name, attributes })
}

/// Parse the top two levels of an XML document; None if it is not XML
fn parse_document(xml: &str) -> Option<Document> {
    let mut reader = Reader::from_str(xml);
    let mut depth = 0usize;
    let mut root = None;
    let mut children = Vec::new();

    loop {
        let (start, opens) = match reader.read_event() {
            Ok(XmlEvent::Start(start)) => (start, true),
            Ok(XmlEvent::Empty(start)) => (start, false),
            Ok(XmlEvent::End(_)) => {
                depth = depth.saturating_sub(1);
                continue;
            }
            Ok(XmlEvent::Eof) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!(error = %e, "malformed XML response");
                return None;
            }
        };

        let element = element(&start)?;
        match depth {
            0 if root.is_none() => root = Some(element),
            1 => children.push(element),
            _ => {}
        }
        if opens {
            depth += 1;
        }
    }

    root.map(|root| Document { root, children })
}

/// Check the reply and parse its document, mapping `<error>` roots
fn parse_api_reply(reply: &Reply) -> std::result::Result<Document, NewznabError> {
    if !reply.is_success() {
        return Err(NewznabError::Network(reply.status.clone()));
    }
    let document = parse_document(&reply.text()).ok_or(NewznabError::InvalidResponse)?;
    if document.root.name == "error" {
        return Err(NewznabError::from_error_element(&document.root.attributes));
    }
    Ok(document)
}

fn attribute(element: &Element, name: &str) -> String {
    element.attributes.get(name).cloned().unwrap_or_default()
}

/// Interpret a `t=caps` reply
pub fn parse_caps(reply: &Reply) -> std::result::Result<HostInfo, NewznabError> {
    let document = parse_api_reply(reply)?;
    let Some(server) = document.child("server") else {
        return Ok(HostInfo::default());
    };
    Ok(HostInfo {
        strapline: attribute(server, "strapline"),
        email: attribute(server, "email"),
        version: attribute(server, "version"),
        ..Default::default()
    })
}

/// Interpret a `t=register` reply
pub fn parse_register(reply: &Reply) -> std::result::Result<HostInfo, NewznabError> {
    let document = parse_api_reply(reply)?;
    if document.root.name != "register" {
        return Err(NewznabError::InvalidResponse);
    }
    let register = &document.root;
    Ok(HostInfo {
        username: attribute(register, "username"),
        password: attribute(register, "password"),
        apikey: attribute(register, "apikey"),
        userid: attribute(register, "userid"),
        ..Default::default()
    })
}

/// Check that `account` can talk to its indexer and fetch the server details
pub async fn test_account(engine: &WebEngine, account: &Account) -> Result<HostInfo> {
    let reply = engine.fetch(caps_query(account)?).await?;
    let info = parse_caps(&reply).inspect_err(|e| {
        tracing::warn!(api_url = %account.api_url, error = %e, "newznab account check failed");
    })?;
    tracing::debug!(api_url = %account.api_url, version = %info.version, "newznab account ok");
    Ok(info)
}

/// Register a new account with the indexer at `account.api_url`
pub async fn register_account(engine: &WebEngine, account: &Account) -> Result<HostInfo> {
    let reply = engine.fetch(register_query(account)?).await?;
    let info = parse_register(&reply).inspect_err(|e| {
        tracing::warn!(api_url = %account.api_url, error = %e, "newznab registration failed");
    })?;
    tracing::info!(api_url = %account.api_url, username = %info.username, "registered newznab account");
    Ok(info)
}

/// Extract server URLs from a server list body
///
/// One server per line; only the first tab-separated field of a line is
/// used, and only if it is an http(s) URL. Blank lines are skipped.
pub fn parse_server_list(body: &str) -> Vec<String> {
    body.split('\n')
        .filter_map(|line| line.split('\t').find(|field| !field.is_empty()))
        .map(|host| host.trim_end_matches('\r'))
        .filter(|host| host.starts_with("http://") || host.starts_with("https://"))
        .map(str::to_string)
        .collect()
}

/// Build the server list query
pub fn import_query(url: &Url) -> Query {
    Query::new(url.clone())
}

/// Fetch and parse the server list from `url`
pub async fn import_server_list(engine: &WebEngine, url: &Url) -> Result<Vec<String>> {
    let reply = engine.fetch(import_query(url)).await?;
    if !reply.is_success() {
        return Err(Error::Other(format!(
            "server list import failed: {}",
            reply.status
        )));
    }

    let hosts = parse_server_list(&reply.text());
    tracing::info!(count = hosts.len(), "imported newznab server list");
    Ok(hosts)
}
