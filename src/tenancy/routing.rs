use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const MAX_HOST_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;
const MAX_PATH_PREFIX_LEN: usize = 63;
const MAX_HEADER_LEN: usize = 128;
const MAX_CLAIM_LEN: usize = 256;

/// Which part of a request a routing key is read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingKeyKind {
    Host,
    PathPrefix,
    Header,
    Claim,
}

impl RoutingKeyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoutingKeyKind::Host => "host",
            RoutingKeyKind::PathPrefix => "path",
            RoutingKeyKind::Header => "header",
            RoutingKeyKind::Claim => "claim",
        }
    }
}

impl fmt::Display for RoutingKeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoutingKeyKind {
    type Err = RoutingKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "host" => Ok(RoutingKeyKind::Host),
            "path" | "path_prefix" => Ok(RoutingKeyKind::PathPrefix),
            "header" => Ok(RoutingKeyKind::Header),
            "claim" => Ok(RoutingKeyKind::Claim),
            other => Err(RoutingKeyError::UnknownKind(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingKeyError {
    #[error("{0} routing key is empty")]
    Empty(RoutingKeyKind),

    #[error("{kind} routing key exceeds {max} characters")]
    TooLong { kind: RoutingKeyKind, max: usize },

    #[error("{kind} routing key contains invalid character {ch:?}")]
    InvalidCharacter { kind: RoutingKeyKind, ch: char },

    #[error("wildcard hostnames are not accepted as routing keys")]
    Wildcard,

    #[error("IP literals are not accepted as host routing keys")]
    IpLiteral,

    #[error("invalid hostname label: {0:?}")]
    InvalidLabel(String),

    #[error("hostname must contain at least two labels")]
    MissingDomain,

    #[error("invalid port in host: {0:?}")]
    InvalidPort(String),

    #[error("unknown routing key kind: {0}")]
    UnknownKind(String),

    #[error("routing key must be written as kind:value, got {0:?}")]
    Malformed(String),
}

/// An address-like input that identifies a tenant.
///
/// Values are canonicalised and validated on construction; there is no way
/// to build an unvalidated key, so every key held by the registry or the
/// resolution cache satisfies the format rules below.
///
/// - host: lowercase DNS name, no wildcard, no IP literal, port stripped
/// - path: a single path segment `[a-z0-9][a-z0-9_-]*`
/// - header: `[A-Za-z0-9._-]+`
/// - claim: printable, no whitespace
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RoutingKey {
    Host(String),
    PathPrefix(String),
    Header(String),
    Claim(String),
}

impl RoutingKey {
    pub fn host(raw: &str) -> Result<Self, RoutingKeyError> {
        normalize_host(raw).map(RoutingKey::Host)
    }

    /// Accepts `acme`, `/acme` or `/acme/` (a single segment).
    pub fn path_prefix(raw: &str) -> Result<Self, RoutingKeyError> {
        let kind = RoutingKeyKind::PathPrefix;
        let segment = raw.trim().trim_start_matches('/').trim_end_matches('/');
        if segment.is_empty() {
            return Err(RoutingKeyError::Empty(kind));
        }
        if segment.len() > MAX_PATH_PREFIX_LEN {
            return Err(RoutingKeyError::TooLong { kind, max: MAX_PATH_PREFIX_LEN });
        }
        let segment = segment.to_ascii_lowercase();
        for (i, ch) in segment.chars().enumerate() {
            let ok = ch.is_ascii_lowercase() || ch.is_ascii_digit() || (i > 0 && (ch == '-' || ch == '_'));
            if !ok {
                return Err(RoutingKeyError::InvalidCharacter { kind, ch });
            }
        }
        Ok(RoutingKey::PathPrefix(segment))
    }

    pub fn header(raw: &str) -> Result<Self, RoutingKeyError> {
        let kind = RoutingKeyKind::Header;
        let value = raw.trim();
        check_length(kind, value, MAX_HEADER_LEN)?;
        if let Some(ch) = value
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
        {
            return Err(RoutingKeyError::InvalidCharacter { kind, ch });
        }
        Ok(RoutingKey::Header(value.to_string()))
    }

    pub fn claim(raw: &str) -> Result<Self, RoutingKeyError> {
        let kind = RoutingKeyKind::Claim;
        check_length(kind, raw, MAX_CLAIM_LEN)?;
        if let Some(ch) = raw.chars().find(|c| c.is_whitespace() || c.is_control()) {
            return Err(RoutingKeyError::InvalidCharacter { kind, ch });
        }
        Ok(RoutingKey::Claim(raw.to_string()))
    }

    pub fn parse(kind: RoutingKeyKind, raw: &str) -> Result<Self, RoutingKeyError> {
        match kind {
            RoutingKeyKind::Host => Self::host(raw),
            RoutingKeyKind::PathPrefix => Self::path_prefix(raw),
            RoutingKeyKind::Header => Self::header(raw),
            RoutingKeyKind::Claim => Self::claim(raw),
        }
    }

    pub fn kind(&self) -> RoutingKeyKind {
        match self {
            RoutingKey::Host(_) => RoutingKeyKind::Host,
            RoutingKey::PathPrefix(_) => RoutingKeyKind::PathPrefix,
            RoutingKey::Header(_) => RoutingKeyKind::Header,
            RoutingKey::Claim(_) => RoutingKeyKind::Claim,
        }
    }

    pub fn value(&self) -> &str {
        match self {
            RoutingKey::Host(v)
            | RoutingKey::PathPrefix(v)
            | RoutingKey::Header(v)
            | RoutingKey::Claim(v) => v,
        }
    }

    /// Form written to audit logs. Claim values are identity material, so
    /// only a SHA-256 fingerprint of them is logged.
    pub fn audit_repr(&self) -> String {
        match self {
            RoutingKey::Claim(v) => {
                let digest = Sha256::digest(v.as_bytes());
                let hex = format!("{:x}", digest);
                format!("claim:sha256:{}", &hex[..16])
            }
            other => other.to_string(),
        }
    }
}

impl fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.value())
    }
}

impl FromStr for RoutingKey {
    type Err = RoutingKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, value) = s
            .split_once(':')
            .ok_or_else(|| RoutingKeyError::Malformed(s.to_string()))?;
        RoutingKey::parse(kind.trim().parse()?, value)
    }
}

impl TryFrom<String> for RoutingKey {
    type Error = RoutingKeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RoutingKey> for String {
    fn from(key: RoutingKey) -> Self {
        key.to_string()
    }
}

fn check_length(kind: RoutingKeyKind, value: &str, max: usize) -> Result<(), RoutingKeyError> {
    if value.is_empty() {
        return Err(RoutingKeyError::Empty(kind));
    }
    if value.len() > max {
        return Err(RoutingKeyError::TooLong { kind, max });
    }
    Ok(())
}

fn normalize_host(raw: &str) -> Result<String, RoutingKeyError> {
    let kind = RoutingKeyKind::Host;
    let trimmed = raw.trim();
    if trimmed.starts_with('[') {
        return Err(RoutingKeyError::IpLiteral);
    }

    let without_port = match trimmed.split_once(':') {
        Some((host, port)) => {
            if port.is_empty() || !port.chars().all(|c| c.is_ascii_digit()) {
                return Err(RoutingKeyError::InvalidPort(port.to_string()));
            }
            host
        }
        None => trimmed,
    };

    let host = without_port.trim_end_matches('.').to_ascii_lowercase();
    check_length(kind, &host, MAX_HOST_LEN)?;
    if host.contains('*') {
        return Err(RoutingKeyError::Wildcard);
    }

    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() < 2 {
        return Err(RoutingKeyError::MissingDomain);
    }
    for label in &labels {
        let valid = !label.is_empty()
            && label.len() <= MAX_LABEL_LEN
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
        if !valid {
            return Err(RoutingKeyError::InvalidLabel(label.to_string()));
        }
    }

    // A numeric final label means an IPv4 literal such as 10.0.0.1
    if labels
        .last()
        .map(|l| l.chars().all(|c| c.is_ascii_digit()))
        .unwrap_or(false)
    {
        return Err(RoutingKeyError::IpLiteral);
    }

    Ok(host)
}
