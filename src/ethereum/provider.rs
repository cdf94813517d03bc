use alloy::{
    primitives::{Address, Bytes, B256, U256, U64},
    providers::{Provider, ProviderBuilder, RootProvider},
    rpc::json_rpc::{RpcParam, RpcReturn},
    transports::http::{Client, Http},
};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::borrow::Cow;
use tracing::{debug, warn};

use super::gateway::RpcGateway;
use super::{
    utils, Block, Filter, FilterId, Log, Transaction, TransactionReceipt, TransactionRequest,
};
use crate::config::{Config, NetworkConfig};
use crate::error::{ClientError, ClientResult};

/// [`RpcGateway`] backed by an alloy HTTP provider.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    provider: RootProvider<Http<Client>>,
    rpc_url: String,
}

impl HttpGateway {
    pub fn connect(rpc_url: &str) -> Result<Self> {
        let url = rpc_url
            .parse()
            .map_err(|e| anyhow!("Invalid RPC URL '{}': {}", rpc_url, e))?;
        let provider = ProviderBuilder::new().on_http(url);

        Ok(Self {
            provider,
            rpc_url: rpc_url.to_string(),
        })
    }

    /// Connect to a configured network, falling back to the default one.
    pub fn for_network(config: &Config, network: Option<&str>) -> Result<Self> {
        let network_config = Self::network_config(config, network)?;
        Self::connect(&network_config.rpc_url)
    }

    pub(crate) fn network_config<'a>(
        config: &'a Config,
        network: Option<&str>,
    ) -> Result<&'a NetworkConfig> {
        let network_name = network.unwrap_or(&config.default_network);
        let available: Vec<String> = config.networks.keys().cloned().collect();
        utils::validate_network(network_name, &available)?;
        config
            .networks
            .get(network_name)
            .ok_or_else(|| anyhow!("Network '{}' not configured", network_name))
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    async fn request<P, R>(&self, method: &'static str, params: P) -> ClientResult<R>
    where
        P: RpcParam,
        R: RpcReturn,
    {
        debug!(method, rpc_url = %self.rpc_url, "Remote call");
        self.provider
            .raw_request::<P, R>(Cow::Borrowed(method), params)
            .await
            .map_err(|e| {
                warn!(method, "Remote call failed: {}", e);
                ClientError::remote(method, utils::interpret_rpc_error(&e.to_string()))
            })
    }
}

/// Filter ids are opaque; some nodes hand out numbers instead of hex strings.
fn filter_id_from(raw: Value) -> FilterId {
    match raw {
        Value::String(id) => FilterId::new(id),
        other => FilterId::new(other.to_string()),
    }
}

/// Miner control methods answer `true` on older nodes and `null` on newer ones.
fn acknowledged(method: &'static str, raw: Value) -> ClientResult<bool> {
    match raw {
        Value::Bool(accepted) => Ok(accepted),
        Value::Null => Ok(true),
        other => Err(ClientError::remote(
            method,
            format!("unexpected response {}", other),
        )),
    }
}

#[async_trait]
impl RpcGateway for HttpGateway {
    async fn get_balance(&self, address: Address, tag: &str) -> ClientResult<U256> {
        self.request("eth_getBalance", (address, tag.to_string()))
            .await
    }

    async fn accounts(&self) -> ClientResult<Vec<Address>> {
        self.request("eth_accounts", ()).await
    }

    async fn block_number(&self) -> ClientResult<u64> {
        let number: U64 = self.request("eth_blockNumber", ()).await?;
        Ok(number.to::<u64>())
    }

    async fn coinbase(&self) -> ClientResult<Address> {
        self.request("eth_coinbase", ()).await
    }

    async fn get_transaction_count(&self, address: Address, tag: &str) -> ClientResult<u64> {
        let count: U64 = self
            .request("eth_getTransactionCount", (address, tag.to_string()))
            .await?;
        Ok(count.to::<u64>())
    }

    async fn get_transaction_by_hash(&self, hash: B256) -> ClientResult<Option<Transaction>> {
        self.request("eth_getTransactionByHash", (hash,)).await
    }

    async fn get_transaction_receipt(
        &self,
        hash: B256,
    ) -> ClientResult<Option<TransactionReceipt>> {
        self.request("eth_getTransactionReceipt", (hash,)).await
    }

    async fn get_block_by_number(&self, tag: &str, full: bool) -> ClientResult<Option<Block>> {
        self.request("eth_getBlockByNumber", (tag.to_string(), full))
            .await
    }

    async fn send_transaction(&self, request: &TransactionRequest) -> ClientResult<B256> {
        self.request("eth_sendTransaction", (request.clone(),))
            .await
    }

    async fn send_raw_transaction(&self, encoded: &str) -> ClientResult<B256> {
        self.request("eth_sendRawTransaction", (encoded.to_string(),))
            .await
    }

    async fn call(&self, request: &TransactionRequest, tag: &str) -> ClientResult<Bytes> {
        self.request("eth_call", (request.clone(), tag.to_string()))
            .await
    }

    async fn new_filter(&self, filter: &Filter) -> ClientResult<FilterId> {
        let raw: Value = self.request("eth_newFilter", (filter.clone(),)).await?;
        Ok(filter_id_from(raw))
    }

    async fn new_pending_transaction_filter(&self) -> ClientResult<FilterId> {
        let raw: Value = self
            .request("eth_newPendingTransactionFilter", ())
            .await?;
        Ok(filter_id_from(raw))
    }

    async fn new_block_filter(&self) -> ClientResult<FilterId> {
        let raw: Value = self.request("eth_newBlockFilter", ()).await?;
        Ok(filter_id_from(raw))
    }

    async fn uninstall_filter(&self, id: &FilterId) -> ClientResult<bool> {
        self.request("eth_uninstallFilter", (id.as_str().to_string(),))
            .await
    }

    async fn get_filter_changes_logs(&self, id: &FilterId) -> ClientResult<Vec<Log>> {
        self.request("eth_getFilterChanges", (id.as_str().to_string(),))
            .await
    }

    async fn get_filter_changes_hashes(&self, id: &FilterId) -> ClientResult<Vec<B256>> {
        self.request("eth_getFilterChanges", (id.as_str().to_string(),))
            .await
    }

    async fn get_filter_logs(&self, id: &FilterId) -> ClientResult<Vec<Log>> {
        self.request("eth_getFilterLogs", (id.as_str().to_string(),))
            .await
    }

    async fn unlock_account(&self, account: Address, passphrase: &str) -> ClientResult<bool> {
        self.request(
            "personal_unlockAccount",
            (account, passphrase.to_string(), Option::<u64>::None),
        )
        .await
    }

    async fn miner_start(&self) -> ClientResult<bool> {
        let raw: Value = self.request("miner_start", ()).await?;
        acknowledged("miner_start", raw)
    }

    async fn miner_stop(&self) -> ClientResult<bool> {
        let raw: Value = self.request("miner_stop", ()).await?;
        acknowledged("miner_stop", raw)
    }

    async fn miner_set_etherbase(&self, coinbase: Address) -> ClientResult<bool> {
        self.request("miner_setEtherbase", (coinbase,)).await
    }
}
