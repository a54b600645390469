//! Media locator parsing and normalization.
//!
//! A raw media URI is one of:
//! - an inline `data:` URI (base64 or percent-encoded payload)
//! - an `ipfs://` or `ar://` locator, rewritten onto an HTTP gateway
//! - a plain `http(s)://` URL
//!
//! Remote locators carry the [`OriginKey`] used for admission control.

use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

use crate::error::{Error, Result};
use crate::media_kind::MediaKind;

/// Synthetic origin key shared by every IPFS gateway.
pub const IPFS_ORIGIN: &str = "ipfs";

/// Synthetic origin key shared by every Arweave gateway.
pub const ARWEAVE_ORIGIN: &str = "arweave";

const KNOWN_IPFS_HOSTS: &[&str] = &[
    "ipfs.io",
    "dweb.link",
    "cloudflare-ipfs.com",
    "gateway.pinata.cloud",
    "nftstorage.link",
    "w3s.link",
];

const KNOWN_IPFS_HOST_SUFFIXES: &[&str] = &[
    ".mypinata.cloud",
    ".ipfs.dweb.link",
    ".ipfs.nftstorage.link",
    ".ipfs.w3s.link",
];

const KNOWN_ARWEAVE_HOSTS: &[&str] = &["arweave.net", "ar-io.net"];

/// HTTP gateways used to resolve content-addressed locators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gateways {
    /// Base URL for `ipfs://` locators
    #[serde(default = "default_ipfs_gateway")]
    pub ipfs: String,
    /// Base URL for `ar://` locators
    #[serde(default = "default_arweave_gateway")]
    pub arweave: String,
}

fn default_ipfs_gateway() -> String {
    "https://ipfs.io".to_string()
}

fn default_arweave_gateway() -> String {
    "https://arweave.net".to_string()
}

impl Default for Gateways {
    fn default() -> Self {
        Self {
            ipfs: default_ipfs_gateway(),
            arweave: default_arweave_gateway(),
        }
    }
}

impl Gateways {
    fn host_of(base: &str) -> Option<String> {
        Url::parse(base)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
    }

    /// Maps a host to its admission-control origin key.
    pub fn origin_for_host(&self, host: &str) -> OriginKey {
        let host = host.to_ascii_lowercase();

        let configured_ipfs = Self::host_of(&self.ipfs);
        if KNOWN_IPFS_HOSTS.contains(&host.as_str())
            || KNOWN_IPFS_HOST_SUFFIXES.iter().any(|s| host.ends_with(s))
            || configured_ipfs.as_deref() == Some(host.as_str())
        {
            return OriginKey::new(IPFS_ORIGIN);
        }

        let configured_arweave = Self::host_of(&self.arweave);
        if KNOWN_ARWEAVE_HOSTS.contains(&host.as_str())
            || host.ends_with(".arweave.net")
            || configured_arweave.as_deref() == Some(host.as_str())
        {
            return OriginKey::new(ARWEAVE_ORIGIN);
        }

        OriginKey::new(host)
    }
}

/// Admission-control key: a hostname or a synthetic gateway identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OriginKey(String);

impl OriginKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is one of the synthetic gateway origins.
    pub fn is_gateway(&self) -> bool {
        self.0 == IPFS_ORIGIN || self.0 == ARWEAVE_ORIGIN
    }
}

impl fmt::Display for OriginKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Decoded inline payload from a `data:` URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineMedia {
    pub mime: Option<String>,
    pub bytes: Vec<u8>,
}

/// Normalized remote locator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteMedia {
    pub url: Url,
    pub origin: OriginKey,
}

impl RemoteMedia {
    /// Media kind implied by the URL path extension, if any.
    pub fn extension_kind(&self) -> Option<MediaKind> {
        let segment = self.url.path_segments()?.next_back()?;
        let (_, ext) = segment.rsplit_once('.')?;
        MediaKind::from_extension(ext)
    }
}

/// Where an item's bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaSource {
    Inline(InlineMedia),
    Remote(RemoteMedia),
}

impl MediaSource {
    /// Media kind hinted by the locator itself (data URI MIME or URL extension).
    pub fn locator_kind(&self) -> Option<MediaKind> {
        match self {
            Self::Inline(inline) => inline.mime.as_deref().and_then(MediaKind::from_declared),
            Self::Remote(remote) => remote.extension_kind(),
        }
    }
}

/// Parses a raw locator into a [`MediaSource`].
///
/// Inline payloads larger than `inline_cap` bytes fail with
/// [`Error::Oversize`] before they are fully decoded where possible.
pub fn resolve_source(raw: &str, gateways: &Gateways, inline_cap: usize) -> Result<MediaSource> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(Error::input("empty media locator"));
    }

    if let Some(body) = strip_scheme(raw, "data:") {
        return decode_data_uri(body, inline_cap).map(MediaSource::Inline);
    }

    let url = normalize_remote(raw, gateways)?;
    let host = url
        .host_str()
        .ok_or_else(|| Error::input(format!("locator has no host: {raw}")))?;
    let origin = gateways.origin_for_host(host);

    Ok(MediaSource::Remote(RemoteMedia { url, origin }))
}

/// Rewrites `ipfs://` and `ar://` locators onto HTTP gateways.
pub fn normalize_remote(raw: &str, gateways: &Gateways) -> Result<Url> {
    let rewritten = if let Some(rest) = strip_scheme(raw, "ipfs://") {
        let rest = rest.trim_start_matches('/');
        let rest = rest.strip_prefix("ipfs/").unwrap_or(rest);
        format!("{}/ipfs/{}", gateways.ipfs.trim_end_matches('/'), rest)
    } else if let Some(rest) = strip_scheme(raw, "ar://") {
        format!("{}/{}", gateways.arweave.trim_end_matches('/'), rest.trim_start_matches('/'))
    } else {
        raw.to_string()
    };

    let url = Url::parse(&rewritten)
        .map_err(|e| Error::input(format!("invalid media locator {raw}: {e}")))?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(Error::input(format!("unsupported locator scheme: {other}"))),
    }
}

fn strip_scheme<'a>(raw: &'a str, scheme: &str) -> Option<&'a str> {
    let head = raw.get(..scheme.len())?;
    head.eq_ignore_ascii_case(scheme)
        .then(|| &raw[scheme.len()..])
}

fn decode_data_uri(body: &str, inline_cap: usize) -> Result<InlineMedia> {
    let (header, payload) = body
        .split_once(',')
        .ok_or_else(|| Error::input("data URI without payload separator"))?;

    let mut params = header.split(';');
    let mime = params
        .next()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(|m| m.to_ascii_lowercase());
    let is_base64 = params.any(|p| p.trim().eq_ignore_ascii_case("base64"));

    let bytes = if is_base64 {
        let compact: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        let estimated = compact.len() / 4 * 3;
        if estimated > inline_cap {
            return Err(Error::oversize(estimated, inline_cap));
        }
        base64::engine::general_purpose::STANDARD
            .decode(compact.trim_end_matches('=').to_string() + padding(&compact))
            .map_err(|e| Error::input(format!("invalid base64 payload: {e}")))?
    } else {
        urlencoding::decode_binary(payload.as_bytes()).into_owned()
    };

    if bytes.len() > inline_cap {
        return Err(Error::oversize(bytes.len(), inline_cap));
    }
    if bytes.is_empty() {
        return Err(Error::input("empty inline payload"));
    }

    Ok(InlineMedia { mime, bytes })
}

/// Padding that restores a canonical base64 length.
fn padding(compact: &str) -> &'static str {
    match compact.trim_end_matches('=').len() % 4 {
        2 => "==",
        3 => "=",
        _ => "",
    }
}
