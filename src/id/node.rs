use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::part::{decode_part, parse_decimal, unparse_part, IdPart};
use super::IdParseError;

/// Identifier of an uncommitted transaction as embedded in node-revision ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TxnId(String);

impl TxnId {
    pub fn new(id: impl Into<String>) -> Result<Self, IdParseError> {
        let id = id.into();
        if id.is_empty() || id.contains('.') {
            return Err(IdParseError::BadTxnId(id));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TxnId {
    type Error = IdParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TxnId> for String {
    fn from(value: TxnId) -> Self {
        value.0
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Location {
    Transaction(TxnId),
    Committed { revision: u64, item: u64 },
}

/// Node-revision id: `<node>.<copy>.r<rev>/<item>` or `<node>.<copy>.t<txn>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId {
    node_id: IdPart,
    copy_id: IdPart,
    location: Location,
}

/// Outcome of [`compare`]. Not an ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdRelation {
    Equal,
    Related,
    Unrelated,
}

impl NodeId {
    pub fn in_txn(node_id: IdPart, copy_id: IdPart, txn_id: TxnId) -> Self {
        Self {
            node_id,
            copy_id,
            location: Location::Transaction(txn_id),
        }
    }

    /// Id of the root directory inside transaction `txn_id`.
    pub fn txn_root(txn_id: TxnId) -> Self {
        Self::in_txn(IdPart::ROOT, IdPart::ROOT, txn_id)
    }

    pub fn committed(node_id: IdPart, copy_id: IdPart, revision: u64, item: u64) -> Self {
        Self {
            node_id,
            copy_id,
            location: Location::Committed { revision, item },
        }
    }

    pub fn node_id(&self) -> &IdPart {
        &self.node_id
    }

    pub fn copy_id(&self) -> &IdPart {
        &self.copy_id
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn txn_id(&self) -> Option<&str> {
        match &self.location {
            Location::Transaction(txn) => Some(txn.as_str()),
            Location::Committed { .. } => None,
        }
    }

    pub fn revision(&self) -> Option<u64> {
        match self.location {
            Location::Committed { revision, .. } => Some(revision),
            Location::Transaction(_) => None,
        }
    }

    pub fn item(&self) -> u64 {
        match self.location {
            Location::Committed { item, .. } => item,
            Location::Transaction(_) => 0,
        }
    }

    pub fn is_txn(&self) -> bool {
        matches!(self.location, Location::Transaction(_))
    }
}

pub fn parse(text: &str) -> Result<NodeId, IdParseError> {
    let mut fields = text.split('.');
    let (Some(node), Some(copy), Some(loc), None) =
        (fields.next(), fields.next(), fields.next(), fields.next())
    else {
        return Err(IdParseError::FieldCount(text.to_string()));
    };

    let node_id = decode_part(node)?;
    let copy_id = decode_part(copy)?;

    let location = if let Some(rest) = loc.strip_prefix('r') {
        let (revision, item) = rest
            .split_once('/')
            .ok_or_else(|| IdParseError::BadLocation(loc.to_string()))?;
        Location::Committed {
            revision: parse_decimal(revision)?,
            item: parse_decimal(item)?,
        }
    } else if let Some(txn) = loc.strip_prefix('t') {
        Location::Transaction(TxnId::new(txn)?)
    } else {
        return Err(IdParseError::BadLocation(loc.to_string()));
    };

    Ok(NodeId {
        node_id,
        copy_id,
        location,
    })
}

pub fn unparse(id: &NodeId) -> String {
    let parts = format!(
        "{}.{}.",
        unparse_part(&id.node_id),
        unparse_part(&id.copy_id)
    );
    match &id.location {
        Location::Committed { revision, item } => format!("{parts}r{revision}/{item}"),
        Location::Transaction(txn) => format!("{parts}t{txn}"),
    }
}

pub fn equal(a: &NodeId, b: &NodeId) -> bool {
    a == b
}

/// Whether `a` and `b` name revisions of the same node lineage.
pub fn related(a: &NodeId, b: &NodeId) -> bool {
    if a == b {
        return true;
    }

    // Parts allocated in different transactions can never be related.
    if a.node_id.is_txn() {
        if let (Some(ta), Some(tb)) = (a.txn_id(), b.txn_id()) {
            if ta != tb {
                return false;
            }
        }
    }

    a.node_id == b.node_id
}

pub fn compare(a: &NodeId, b: &NodeId) -> IdRelation {
    if equal(a, b) {
        IdRelation::Equal
    } else if related(a, b) {
        IdRelation::Related
    } else {
        IdRelation::Unrelated
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&unparse(self))
    }
}

impl FromStr for NodeId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s)
    }
}
