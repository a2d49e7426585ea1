//! Implementation of `wcadm id` subcommand.

use clap::Args;
use serde::Serialize;

use super::OutputFormat;
use crate::{
    id::{self, NodeId},
    Error, Result,
};

#[derive(Debug, Clone, Args, Default)]
pub struct IdArgs {
    /// Node-revision identifier, e.g. `1.0.r3/10` or `_a.0.tMYTXN`
    pub id: Option<String>,

    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct IdReport {
    pub canonical: String,
    pub node_id: String,
    pub copy_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub txn_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision: Option<u64>,
    pub item: u64,
}

impl From<&NodeId> for IdReport {
    fn from(node: &NodeId) -> Self {
        Self {
            canonical: id::unparse(node),
            node_id: id::unparse_part(node.node_id()),
            copy_id: id::unparse_part(node.copy_id()),
            txn_id: node.txn_id().map(str::to_string),
            revision: node.revision(),
            item: node.item(),
        }
    }
}

pub fn execute(args: IdArgs) -> Result<()> {
    let text = args.id.ok_or_else(|| Error::Cli("id is required".into()))?;
    let node = id::parse(&text).map_err(Error::from)?;
    let report = IdReport::from(&node);

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => {
            println!("id:       {}", report.canonical);
            println!("node:     {}", report.node_id);
            println!("copy:     {}", report.copy_id);
            match (&report.txn_id, report.revision) {
                (Some(txn), _) => println!("txn:      {txn}"),
                (None, Some(revision)) => {
                    println!("revision: {revision}");
                    println!("item:     {}", report.item);
                }
                (None, None) => {}
            }
        }
    }
    Ok(())
}
