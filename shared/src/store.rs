//! Shared-store paths, claim records and the commands the sync engine emits.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::colors::Color;

/// Claimed cells, keyed by `"{x}-{y}"`.
pub const PIXELS: &str = "pixels";
/// Presence markers, `cityPlayers/{region}/{clientId} = true`.
pub const CITY_PLAYERS: &str = "cityPlayers";
/// Last paint per authenticated user, `paintTimes/{userId} = epochMillis`.
pub const PAINT_TIMES: &str = "paintTimes";

/// Key of the placeholder object the store replaces with its own clock.
pub const SERVER_VALUE_KEY: &str = ".sv";
pub const SERVER_TIMESTAMP: &str = "timestamp";

/// `{".sv": "timestamp"}`.
pub fn server_timestamp() -> Value {
    let mut map = serde_json::Map::new();
    map.insert(
        SERVER_VALUE_KEY.to_string(),
        Value::String(SERVER_TIMESTAMP.to_string()),
    );
    Value::Object(map)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    Empty,
    InvalidSegment(String),
}

impl fmt::Display for PathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty store path"),
            Self::InvalidSegment(s) => write!(f, "invalid path segment {s:?}"),
        }
    }
}

/// A validated slash-separated store path. The root is the empty path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct StorePath(Vec<String>);

impl StorePath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Parse `a/b/c`. Leading and trailing slashes are ignored.
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        let trimmed = raw.trim_matches('/');
        if trimmed.is_empty() {
            return Ok(Self::root());
        }
        let segments = trimmed
            .split('/')
            .map(|s| {
                if valid_segment(s) {
                    Ok(s.to_string())
                } else {
                    Err(PathError::InvalidSegment(s.to_string()))
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self(segments))
    }

    /// Like [`parse`](Self::parse) but refuses the root.
    pub fn parse_non_root(raw: &str) -> Result<Self, PathError> {
        let path = Self::parse(raw)?;
        if path.is_root() {
            return Err(PathError::Empty);
        }
        Ok(path)
    }

    pub fn child(&self, segment: impl Into<String>) -> Result<Self, PathError> {
        let segment = segment.into();
        if !valid_segment(&segment) {
            return Err(PathError::InvalidSegment(segment));
        }
        let mut segments = self.0.clone();
        segments.push(segment);
        Ok(Self(segments))
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// True when `self` equals `other` or lies above it.
    pub fn is_prefix_of(&self, other: &StorePath) -> bool {
        other.0.len() >= self.0.len() && other.0[..self.0.len()] == self.0[..]
    }

    /// True when a change at one path can alter the value seen at the other.
    pub fn overlaps(&self, other: &StorePath) -> bool {
        self.is_prefix_of(other) || other.is_prefix_of(self)
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("/"))
    }
}

fn valid_segment(s: &str) -> bool {
    !s.is_empty() && !s.contains(['.', '#', '$', '[', ']', '/'])
}

/// Grid cell address, serialized as `"{x}-{y}"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GridKey {
    pub x: u32,
    pub y: u32,
}

impl GridKey {
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    pub fn path(&self) -> StorePath {
        StorePath(vec![PIXELS.to_string(), self.to_string()])
    }
}

impl fmt::Display for GridKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.x, self.y)
    }
}

impl FromStr for GridKey {
    type Err = ();

    /// Strict: two unsigned decimal integers joined by one `-`, without
    /// leading zeros, so every cell has exactly one key.
    fn from_str(s: &str) -> Result<Self, ()> {
        let (x, y) = s.split_once('-').ok_or(())?;
        let digits = |p: &str| {
            !p.is_empty()
                && p.bytes().all(|b| b.is_ascii_digit())
                && (p.len() == 1 || !p.starts_with('0'))
        };
        if !digits(x) || !digits(y) {
            return Err(());
        }
        Ok(Self {
            x: x.parse().map_err(|_| ())?,
            y: y.parse().map_err(|_| ())?,
        })
    }
}

/// Either a resolved epoch-millis value or the unresolved server sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Timestamp {
    Millis(i64),
    Pending {
        #[serde(rename = ".sv")]
        sv: String,
    },
}

impl Timestamp {
    pub fn server() -> Self {
        Self::Pending {
            sv: SERVER_TIMESTAMP.to_string(),
        }
    }

    pub fn millis(&self) -> Option<i64> {
        match self {
            Self::Millis(ms) => Some(*ms),
            Self::Pending { .. } => None,
        }
    }
}

/// One claimed cell as stored at `pixels/{x}-{y}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimRecord {
    pub color: Color,
    #[serde(alias = "by")]
    pub claimed_by_region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_by_user: Option<String>,
    #[serde(default, alias = "t", skip_serializing_if = "Option::is_none")]
    pub server_timestamp: Option<Timestamp>,
}

impl ClaimRecord {
    pub fn new(color: Color, region: impl Into<String>, user: Option<String>) -> Self {
        Self {
            color,
            claimed_by_region: region.into(),
            claimed_by_user: user,
            server_timestamp: Some(Timestamp::server()),
        }
    }

    /// JSON body for a store write.
    pub fn to_wire(&self) -> Value {
        let mut map = serde_json::Map::new();
        map.insert("color".to_string(), Value::String(self.color.to_hex()));
        map.insert(
            "claimedByRegion".to_string(),
            Value::String(self.claimed_by_region.clone()),
        );
        if let Some(user) = &self.claimed_by_user {
            map.insert("claimedByUser".to_string(), Value::String(user.clone()));
        }
        let timestamp = match &self.server_timestamp {
            Some(Timestamp::Millis(ms)) => Value::from(*ms),
            Some(Timestamp::Pending { .. }) | None => server_timestamp(),
        };
        map.insert("serverTimestamp".to_string(), timestamp);
        Value::Object(map)
    }
}

/// Result of decoding a `pixels` snapshot.
#[derive(Debug, Default, PartialEq)]
pub struct ClaimSnapshot {
    pub claims: BTreeMap<GridKey, ClaimRecord>,
    /// Entries whose key or body could not be decoded.
    pub malformed: usize,
}

/// Decode the value seen at `pixels`. `null` and non-objects decode to no claims.
pub fn decode_claims(value: &Value) -> ClaimSnapshot {
    let mut snapshot = ClaimSnapshot::default();
    let Some(entries) = value.as_object() else {
        return snapshot;
    };
    for (key, body) in entries {
        let Ok(key) = key.parse::<GridKey>() else {
            snapshot.malformed += 1;
            continue;
        };
        match ClaimRecord::deserialize(body) {
            Ok(record) => {
                snapshot.claims.insert(key, record);
            }
            Err(_) => snapshot.malformed += 1,
        }
    }
    snapshot
}

/// Count sessions per region from the value seen at `cityPlayers`.
pub fn presence_counts(value: &Value) -> BTreeMap<String, usize> {
    let Some(regions) = value.as_object() else {
        return BTreeMap::new();
    };
    regions
        .iter()
        .filter_map(|(region, clients)| {
            let n = clients.as_object().map_or(0, |c| c.len());
            (n > 0).then(|| (region.clone(), n))
        })
        .collect()
}

/// A write the client must forward to the shared store.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreCommand {
    Write { path: StorePath, value: Value },
    Remove { path: StorePath },
    RemoveOnDisconnect { path: StorePath },
}

impl StoreCommand {
    pub fn path(&self) -> &StorePath {
        match self {
            Self::Write { path, .. } | Self::Remove { path } | Self::RemoveOnDisconnect { path } => {
                path
            }
        }
    }
}

pub fn presence_root() -> StorePath {
    StorePath(vec![CITY_PLAYERS.to_string()])
}

pub fn presence_path(region: &str, client_id: &str) -> Result<StorePath, PathError> {
    presence_root()
        .child(region)?
        .child(client_id)
}

pub fn paint_time_path(user: &str) -> Result<StorePath, PathError> {
    StorePath(vec![PAINT_TIMES.to_string()]).child(user)
}

pub fn pixels_path() -> StorePath {
    StorePath(vec![PIXELS.to_string()])
}
