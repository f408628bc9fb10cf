//! Offer sets: the feature map exchanged during the session handshake.
//!
//! Offers travel inside `init`, the server's `rsp` to it, and `go`, one per
//! line as `name[=value]`. The `relp_version` offer must be present in both
//! directions; `window_size` and `commands` tune the session; unknown names
//! are carried but ignored, so newer peers can talk to older ones.

use bytes::{BufMut, Bytes, BytesMut};
use std::collections::BTreeMap;
use thiserror::Error;

/// The protocol version this implementation speaks.
pub const RELP_VERSION: &str = "1";

/// Offer names defined by the protocol.
pub const OFFER_RELP_VERSION: &str = "relp_version";
pub const OFFER_WINDOW_SIZE: &str = "window_size";
pub const OFFER_COMMANDS: &str = "commands";

/// Field limits from the offer grammar (`FEATURENAME` / `VALUE`).
pub const MAX_NAME_LEN: usize = 32;
pub const MAX_VALUE_LEN: usize = 255;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OfferError {
    #[error("offer line carries no feature name")]
    EmptyName,

    #[error("offer name '{0}' exceeds {MAX_NAME_LEN} octets")]
    NameTooLong(String),

    #[error("value of offer '{0}' exceeds {MAX_VALUE_LEN} octets")]
    ValueTooLong(String),

    #[error("offer data is not valid UTF-8")]
    NotUtf8,
}

/// An ordered feature-name -> optional-value map.
///
/// Ordered so that encoding is deterministic; the wire does not care.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OfferSet {
    entries: BTreeMap<String, Option<String>>,
}

impl OfferSet {
    pub fn new() -> OfferSet {
        OfferSet::default()
    }

    /// The offer set this implementation announces during handshake. The
    /// command list is kept sorted, the normal form `intersect` produces.
    pub fn standard(window_size: u32, commands: &[&str]) -> OfferSet {
        let mut commands: Vec<&str> = commands.to_vec();
        commands.sort_unstable();
        let mut set = OfferSet::new();
        set.insert(OFFER_RELP_VERSION, Some(RELP_VERSION))
            .expect("fits the grammar");
        set.insert(OFFER_WINDOW_SIZE, Some(&window_size.to_string()))
            .expect("fits the grammar");
        set.insert(OFFER_COMMANDS, Some(&commands.join(",")))
            .expect("fits the grammar");
        set
    }

    pub fn insert(&mut self, name: &str, value: Option<&str>) -> Result<(), OfferError> {
        if name.is_empty() {
            return Err(OfferError::EmptyName);
        }
        if name.len() > MAX_NAME_LEN {
            return Err(OfferError::NameTooLong(name.to_string()));
        }
        if let Some(value) = value {
            if value.len() > MAX_VALUE_LEN {
                return Err(OfferError::ValueTooLong(name.to_string()));
            }
        }
        self.entries
            .insert(name.to_string(), value.map(str::to_string));
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// The value of an offer, if the offer is present and carries one.
    pub fn value(&self, name: &str) -> Option<&str> {
        self.entries.get(name).and_then(|v| v.as_deref())
    }

    pub fn relp_version(&self) -> Option<&str> {
        self.value(OFFER_RELP_VERSION)
    }

    /// The negotiable window size, when offered with a numeric value.
    pub fn window_size(&self) -> Option<u32> {
        self.value(OFFER_WINDOW_SIZE).and_then(|v| v.parse().ok())
    }

    /// The comma-separated command list, when offered.
    pub fn commands(&self) -> Vec<&str> {
        self.value(OFFER_COMMANDS)
            .map(|csv| csv.split(',').filter(|c| !c.is_empty()).collect())
            .unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_deref()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse newline-terminated `name[=value]` lines. Blank lines are
    /// skipped; unknown names are kept so callers can ignore them by policy
    /// rather than by parse failure.
    pub fn decode(data: &[u8]) -> Result<OfferSet, OfferError> {
        let text = std::str::from_utf8(data).map_err(|_| OfferError::NotUtf8)?;
        let mut set = OfferSet::new();
        for line in text.split('\n') {
            if line.is_empty() {
                continue;
            }
            match line.split_once('=') {
                Some((name, value)) => set.insert(name, Some(value))?,
                None => set.insert(line, None)?,
            }
        }
        Ok(set)
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        for (name, value) in self.iter() {
            dst.put_slice(name.as_bytes());
            if let Some(value) = value {
                dst.put_u8(b'=');
                dst.put_slice(value.as_bytes());
            }
            dst.put_u8(b'\n');
        }
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut dst = BytesMut::new();
        self.encode(&mut dst);
        dst.freeze()
    }

    /// The feature set both sides agree on.
    ///
    /// Offers present on both sides survive. Equal values are kept;
    /// `window_size` resolves to the numeric minimum and `commands` to the
    /// intersection of the two command lists; any other value conflict drops
    /// the offer, so the operation stays commutative and associative.
    pub fn intersect(&self, other: &OfferSet) -> OfferSet {
        let mut out = OfferSet::new();
        for (name, mine) in self.iter() {
            let Some(theirs) = lookup(other, name) else {
                continue;
            };
            let merged = match name {
                OFFER_WINDOW_SIZE => merge_window(mine, theirs),
                OFFER_COMMANDS => merge_commands(mine, theirs),
                _ => match (mine, theirs) {
                    (None, None) => Some(None),
                    (Some(a), Some(b)) if a == b => Some(Some(a.to_string())),
                    _ => None,
                },
            };
            if let Some(value) = merged {
                out.entries.insert(name.to_string(), value);
            }
        }
        out
    }
}

fn lookup<'a>(set: &'a OfferSet, name: &str) -> Option<Option<&'a str>> {
    set.entries.get(name).map(|v| v.as_deref())
}

fn merge_window(mine: Option<&str>, theirs: Option<&str>) -> Option<Option<String>> {
    match (
        mine.and_then(|v| v.parse::<u32>().ok()),
        theirs.and_then(|v| v.parse::<u32>().ok()),
    ) {
        (Some(a), Some(b)) => Some(Some(a.min(b).to_string())),
        _ => None,
    }
}

fn merge_commands(mine: Option<&str>, theirs: Option<&str>) -> Option<Option<String>> {
    let (mine, theirs) = (mine?, theirs?);
    let theirs: Vec<&str> = theirs.split(',').collect();
    let mut common: Vec<&str> = Vec::new();
    for cmd in mine.split(',') {
        if !cmd.is_empty() && theirs.contains(&cmd) && !common.contains(&cmd) {
            common.push(cmd);
        }
    }
    if common.is_empty() {
        None
    } else {
        // sorted so the merge commutes regardless of either side's order
        common.sort_unstable();
        Some(Some(common.join(",")))
    }
}
