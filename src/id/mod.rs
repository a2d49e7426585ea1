//! Node-revision identifiers used by the revision store.
//!
//! An id names one revision of a node together with the copy it belongs to,
//! and either the transaction it was created in or the committed
//! (revision, item) pair where it is stored. The textual form is persisted in
//! on-disk records and must stay stable.

use thiserror::Error;

pub mod node;
pub mod part;
pub mod transport;

pub use node::{compare, equal, parse, related, unparse, IdRelation, Location, NodeId, TxnId};
pub use part::{decode_part, from_base36, to_base36, unparse_part, IdPart};
pub use transport::{deserialize, serialize};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdParseError {
    #[error("malformed node-revision id '{0}': expected three '.'-separated fields")]
    FieldCount(String),
    #[error("malformed id part '{0}': missing base-36 number")]
    MissingNumber(String),
    #[error("malformed id part '{0}': number does not fit in 64 bits")]
    NumberOverflow(String),
    #[error("malformed id part '{0}': unexpected trailing characters")]
    TrailingData(String),
    #[error("malformed decimal '{0}' in node-revision id")]
    BadDecimal(String),
    #[error("malformed location '{0}': expected 'r<rev>/<item>' or 't<txn>'")]
    BadLocation(String),
    #[error("invalid transaction id '{0}'")]
    BadTxnId(String),
}
