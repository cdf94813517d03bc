//! Facade over the remote node's JSON-RPC surface.
//!
//! One method per remote operation. Implementations must turn every
//! transport or decoding fault into [`crate::error::ClientError::RemoteCall`]; nothing
//! else escapes this boundary. No retries happen here.

use alloy::primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;

use super::{Block, Filter, FilterId, Log, Transaction, TransactionReceipt, TransactionRequest};
use crate::error::ClientResult;

#[async_trait]
pub trait RpcGateway: Send + Sync {
    /// Block tags (`latest`, `pending`, or a number) are passed through unvalidated.
    async fn get_balance(&self, address: Address, tag: &str) -> ClientResult<U256>;

    async fn accounts(&self) -> ClientResult<Vec<Address>>;

    async fn block_number(&self) -> ClientResult<u64>;

    async fn coinbase(&self) -> ClientResult<Address>;

    async fn get_transaction_count(&self, address: Address, tag: &str) -> ClientResult<u64>;

    async fn get_transaction_by_hash(&self, hash: B256) -> ClientResult<Option<Transaction>>;

    async fn get_transaction_receipt(&self, hash: B256) -> ClientResult<Option<TransactionReceipt>>;

    async fn get_block_by_number(&self, tag: &str, full: bool) -> ClientResult<Option<Block>>;

    /// Returns the transaction hash; any rejection by the node is a remote failure.
    ///
    /// Hashes are typed 32-byte `B256` values, not the node's raw string. A
    /// short value such as `0xabc123` cannot be represented as-is: callers
    /// holding one compare against it left-padded to 32 bytes, and a node
    /// answering with fewer than 32 bytes is a remote failure.
    async fn send_transaction(&self, request: &TransactionRequest) -> ClientResult<B256>;

    /// Same hash typing as [`RpcGateway::send_transaction`].
    async fn send_raw_transaction(&self, encoded: &str) -> ClientResult<B256>;

    async fn call(&self, request: &TransactionRequest, tag: &str) -> ClientResult<Bytes>;

    async fn new_filter(&self, filter: &Filter) -> ClientResult<FilterId>;

    async fn new_pending_transaction_filter(&self) -> ClientResult<FilterId>;

    async fn new_block_filter(&self) -> ClientResult<FilterId>;

    async fn uninstall_filter(&self, id: &FilterId) -> ClientResult<bool>;

    /// Changes since the last poll of a log filter.
    async fn get_filter_changes_logs(&self, id: &FilterId) -> ClientResult<Vec<Log>>;

    /// Changes since the last poll of a pending-transaction or block filter.
    async fn get_filter_changes_hashes(&self, id: &FilterId) -> ClientResult<Vec<B256>>;

    async fn get_filter_logs(&self, id: &FilterId) -> ClientResult<Vec<Log>>;

    async fn unlock_account(&self, account: Address, passphrase: &str) -> ClientResult<bool>;

    async fn miner_start(&self) -> ClientResult<bool>;

    async fn miner_stop(&self) -> ClientResult<bool>;

    async fn miner_set_etherbase(&self, coinbase: Address) -> ClientResult<bool>;
}
