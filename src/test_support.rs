//! Scripted in-memory collaborators for unit tests.

use alloy::primitives::{address, Address, Bytes, LogData, B256, U256};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{ClientError, ClientResult};
use crate::ethereum::compiler::SolidityCompiler;
use crate::ethereum::gateway::RpcGateway;
use crate::ethereum::{
    Block, Filter, FilterId, Log, Transaction, TransactionReceipt, TransactionRequest,
};

pub const CONTRACT: Address = address!("bb9bc244d798123fde783fcc1c72d3bb8c189413");

/// Poll `condition` until it holds, failing the test after five seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// A log at `CONTRACT` with the given topics and data.
pub fn log_with(topics: Vec<B256>, data: Vec<u8>) -> Log {
    Log {
        inner: alloy::primitives::Log {
            address: CONTRACT,
            data: LogData::new_unchecked(topics, data.into()),
        },
        ..Default::default()
    }
}

#[derive(Default)]
pub struct MockGateway {
    log_batches: Mutex<VecDeque<ClientResult<Vec<Log>>>>,
    hash_batches: Mutex<VecDeque<ClientResult<Vec<B256>>>>,
    filter_logs: Mutex<Vec<Log>>,
    send_result: Mutex<Option<ClientResult<B256>>>,
    call_output: Mutex<Bytes>,
    poll_delay: Duration,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub polls_started: AtomicUsize,
    pub polls_finished: AtomicUsize,
    pub installed: AtomicUsize,
    pub uninstalled: Mutex<Vec<FilterId>>,
    pub sent: Mutex<Vec<TransactionRequest>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_poll_delay(mut self, delay: Duration) -> Self {
        self.poll_delay = delay;
        self
    }

    /// Queue poll results; once exhausted every poll returns an empty batch.
    pub fn with_log_batches(self, batches: Vec<ClientResult<Vec<Log>>>) -> Self {
        *self.log_batches.lock().unwrap() = batches.into();
        self
    }

    pub fn with_hash_batches(self, batches: Vec<ClientResult<Vec<B256>>>) -> Self {
        *self.hash_batches.lock().unwrap() = batches.into();
        self
    }

    pub fn with_filter_logs(self, logs: Vec<Log>) -> Self {
        *self.filter_logs.lock().unwrap() = logs;
        self
    }

    pub fn with_send_result(self, result: ClientResult<B256>) -> Self {
        *self.send_result.lock().unwrap() = Some(result);
        self
    }

    pub fn with_call_output(self, output: Vec<u8>) -> Self {
        *self.call_output.lock().unwrap() = output.into();
        self
    }

    pub fn polls(&self) -> usize {
        self.polls_started.load(Ordering::SeqCst)
    }

    pub fn uninstalled(&self) -> Vec<FilterId> {
        self.uninstalled.lock().unwrap().clone()
    }

    /// Requests passed to `send_transaction`, oldest first.
    pub fn sent_requests(&self) -> Vec<TransactionRequest> {
        self.sent.lock().unwrap().clone()
    }

    async fn poll<T>(
        &self,
        batches: &Mutex<VecDeque<ClientResult<Vec<T>>>>,
    ) -> ClientResult<Vec<T>> {
        self.polls_started.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.poll_delay.is_zero() {
            tokio::time::sleep(self.poll_delay).await;
        }
        let next = batches.lock().unwrap().pop_front();

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.polls_finished.fetch_add(1, Ordering::SeqCst);
        next.unwrap_or_else(|| Ok(Vec::new()))
    }

    fn install(&self) -> FilterId {
        let n = self.installed.fetch_add(1, Ordering::SeqCst) + 1;
        FilterId::new(format!("0x{:x}", n))
    }
}

fn unscripted<T>(method: &str) -> ClientResult<T> {
    Err(ClientError::remote(method, "not scripted"))
}

#[async_trait]
impl RpcGateway for MockGateway {
    async fn get_balance(&self, _address: Address, _tag: &str) -> ClientResult<U256> {
        Ok(U256::from(1_000u64))
    }

    async fn accounts(&self) -> ClientResult<Vec<Address>> {
        Ok(vec![CONTRACT])
    }

    async fn block_number(&self) -> ClientResult<u64> {
        Ok(42)
    }

    async fn coinbase(&self) -> ClientResult<Address> {
        Ok(CONTRACT)
    }

    async fn get_transaction_count(&self, _address: Address, _tag: &str) -> ClientResult<u64> {
        Ok(3)
    }

    async fn get_transaction_by_hash(&self, _hash: B256) -> ClientResult<Option<Transaction>> {
        Ok(None)
    }

    async fn get_transaction_receipt(
        &self,
        _hash: B256,
    ) -> ClientResult<Option<TransactionReceipt>> {
        Ok(None)
    }

    async fn get_block_by_number(&self, _tag: &str, _full: bool) -> ClientResult<Option<Block>> {
        Ok(None)
    }

    async fn send_transaction(&self, request: &TransactionRequest) -> ClientResult<B256> {
        self.sent.lock().unwrap().push(request.clone());
        self.send_result
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| unscripted("eth_sendTransaction"))
    }

    async fn send_raw_transaction(&self, _encoded: &str) -> ClientResult<B256> {
        self.send_result
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| unscripted("eth_sendRawTransaction"))
    }

    async fn call(&self, _request: &TransactionRequest, _tag: &str) -> ClientResult<Bytes> {
        Ok(self.call_output.lock().unwrap().clone())
    }

    async fn new_filter(&self, _filter: &Filter) -> ClientResult<FilterId> {
        Ok(self.install())
    }

    async fn new_pending_transaction_filter(&self) -> ClientResult<FilterId> {
        Ok(self.install())
    }

    async fn new_block_filter(&self) -> ClientResult<FilterId> {
        Ok(self.install())
    }

    async fn uninstall_filter(&self, id: &FilterId) -> ClientResult<bool> {
        self.uninstalled.lock().unwrap().push(id.clone());
        Ok(true)
    }

    async fn get_filter_changes_logs(&self, _id: &FilterId) -> ClientResult<Vec<Log>> {
        self.poll(&self.log_batches).await
    }

    async fn get_filter_changes_hashes(&self, _id: &FilterId) -> ClientResult<Vec<B256>> {
        self.poll(&self.hash_batches).await
    }

    async fn get_filter_logs(&self, _id: &FilterId) -> ClientResult<Vec<Log>> {
        Ok(self.filter_logs.lock().unwrap().clone())
    }

    async fn unlock_account(&self, _account: Address, _passphrase: &str) -> ClientResult<bool> {
        Ok(true)
    }

    async fn miner_start(&self) -> ClientResult<bool> {
        Ok(true)
    }

    async fn miner_stop(&self) -> ClientResult<bool> {
        Ok(true)
    }

    async fn miner_set_etherbase(&self, _coinbase: Address) -> ClientResult<bool> {
        unscripted("miner_setEtherbase")
    }
}

/// Compiler returning canned output instead of spawning a process.
pub struct StubCompiler {
    output: Result<String, String>,
}

impl StubCompiler {
    pub fn output(raw: &str) -> Self {
        Self {
            output: Ok(raw.to_string()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            output: Err(message.to_string()),
        }
    }

    /// Valid output for a contract named `DAO`.
    pub fn dao() -> Self {
        let raw = serde_json::json!({
            "contracts": {
                "<stdin>:DAO": {
                    "abi": [{
                        "type": "function",
                        "name": "balanceOf",
                        "inputs": [{"name": "owner", "type": "address"}],
                        "outputs": [{"name": "", "type": "uint256"}],
                        "stateMutability": "view"
                    }, {
                        "type": "constructor",
                        "inputs": [{"name": "quorum", "type": "uint256"}],
                        "stateMutability": "nonpayable"
                    }, {
                        "type": "event",
                        "name": "Transfer",
                        "inputs": [
                            {"name": "from", "type": "address", "indexed": true},
                            {"name": "to", "type": "address", "indexed": true},
                            {"name": "value", "type": "uint256", "indexed": false}
                        ],
                        "anonymous": false
                    }],
                    "bin": "60606040"
                }
            },
            "version": "0.8.24"
        });
        Self::output(&raw.to_string())
    }
}

#[async_trait]
impl SolidityCompiler for StubCompiler {
    async fn run(&self, _source: &str) -> io::Result<String> {
        self.output
            .clone()
            .map_err(|message| io::Error::new(io::ErrorKind::Other, message))
    }
}
