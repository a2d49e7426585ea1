//! Compact binary form of [`NodeId`] for cache transport.

use std::io::{Read, Write};

use super::NodeId;
use crate::{Error, Result};

/// Write `id` to `writer`. An absent id is written as a one-byte sentinel.
pub fn serialize<W: Write>(id: Option<&NodeId>, writer: W) -> Result<()> {
    bincode::serialize_into(writer, &id).map_err(Error::from)?;
    Ok(())
}

/// Read an id previously written by [`serialize`].
pub fn deserialize<R: Read>(reader: R) -> Result<Option<NodeId>> {
    let id: Option<NodeId> = bincode::deserialize_from(reader).map_err(Error::from)?;
    Ok(id)
}
