pub mod abi;
pub mod compiler;
pub mod contract;
pub mod gateway;
pub mod provider;
pub mod utils;

use alloy::dyn_abi::DynSolValue;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ClientResult;

pub use alloy::rpc::types::{
    Block, Filter, Log, Transaction, TransactionReceipt, TransactionRequest,
};

/// Identifier the node assigned to an installed filter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterId(String);

impl FilterId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FilterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    Log,
    PendingTransaction,
    NewBlock,
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterKind::Log => f.write_str("log"),
            FilterKind::PendingTransaction => f.write_str("pending_transaction"),
            FilterKind::NewBlock => f.write_str("new_block"),
        }
    }
}

/// A filter installed on the remote node. The poll cursor lives server-side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterHandle {
    pub id: FilterId,
    pub kind: FilterKind,
}

impl FilterHandle {
    pub fn new(id: FilterId, kind: FilterKind) -> Self {
        Self { id, kind }
    }
}

/// A log decoded against a contract event ABI.
#[derive(Debug, Clone, PartialEq)]
pub struct ContractEvent {
    pub name: String,
    pub log: Log,
    /// Decoded parameters in the event's declared order.
    pub values: Vec<DynSolValue>,
}

impl ContractEvent {
    pub fn values_json(&self) -> ClientResult<serde_json::Value> {
        self.values
            .iter()
            .map(abi::dyn_sol_value_to_json)
            .collect::<ClientResult<Vec<_>>>()
            .map(serde_json::Value::Array)
    }
}
