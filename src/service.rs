//! Client API: every remote operation runs on the worker pool and reports
//! its outcome as a [`Response`].

use alloy::{
    dyn_abi::DynSolValue,
    json_abi::Event,
    network::TransactionBuilder,
    primitives::{Address, B256, U256},
};
use anyhow::Result;
use futures::future::{BoxFuture, FutureExt};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{CompilerConfig, Config, GasConfig, WatchConfig};
use crate::error::{ClientError, ClientResult};
use crate::ethereum::abi::{self, ContractCall};
use crate::ethereum::compiler::{CompileOutput, CompilePipeline, SolcProcess, SolidityCompiler};
use crate::ethereum::contract::Contract;
use crate::ethereum::gateway::RpcGateway;
use crate::ethereum::provider::HttpGateway;
use crate::ethereum::{
    Block, ContractEvent, Filter, FilterHandle, FilterId, FilterKind, Log, Transaction,
    TransactionReceipt, TransactionRequest,
};
use crate::executor::{Executor, Pending};
use crate::response::Response;
use crate::watch::FilterWatch;

pub const LATEST: &str = "latest";

pub struct EthereumService {
    gateway: Arc<dyn RpcGateway>,
    executor: Arc<Executor>,
    compiler: CompilePipeline,
    poll_interval: Duration,
    gas: Option<GasConfig>,
}

impl EthereumService {
    /// Start a worker pool of `pool_size` around `gateway`.
    pub fn open(gateway: Arc<dyn RpcGateway>, pool_size: usize) -> Self {
        let compiler = SolcProcess::from_config(&CompilerConfig::default());
        Self {
            gateway,
            executor: Arc::new(Executor::open(pool_size)),
            compiler: CompilePipeline::new(Arc::new(compiler)),
            poll_interval: WatchConfig::default().poll_interval(),
            gas: None,
        }
    }

    /// Connect to a configured network over HTTP.
    pub fn from_config(config: &Config, network: Option<&str>) -> Result<Self> {
        let network_config = HttpGateway::network_config(config, network)?;
        let gateway = HttpGateway::connect(&network_config.rpc_url)?;
        info!(
            rpc_url = %gateway.rpc_url(),
            chain_id = network_config.chain_id,
            "Connecting service"
        );

        Ok(Self::open(Arc::new(gateway), config.executor.pool_size)
            .with_compiler(Arc::new(SolcProcess::from_config(&config.compiler)))
            .with_poll_interval(config.watch.poll_interval())
            .with_gas_defaults(network_config.gas.clone()))
    }

    pub fn with_compiler(mut self, compiler: Arc<dyn SolidityCompiler>) -> Self {
        self.compiler = CompilePipeline::new(compiler);
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Gas limit and price applied to outgoing contract transactions that
    /// do not set their own.
    pub fn with_gas_defaults(mut self, gas: GasConfig) -> Self {
        self.gas = Some(gas);
        self
    }

    pub fn gateway(&self) -> &Arc<dyn RpcGateway> {
        &self.gateway
    }

    pub fn executor(&self) -> &Arc<Executor> {
        &self.executor
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Stop accepting work and wait for accepted work to finish. Running
    /// watches fail on their next tick; cancel them first to uninstall
    /// their filters.
    pub async fn close(&self) {
        self.executor.close().await;
    }

    /// Run `work` against the gateway on the worker pool.
    pub fn submit<T, F, Fut>(&self, work: F) -> Pending<T>
    where
        T: Send + 'static,
        F: FnOnce(Arc<dyn RpcGateway>) -> Fut,
        Fut: Future<Output = ClientResult<T>> + Send + 'static,
    {
        self.executor.submit(work(self.gateway.clone()))
    }

    /// Like [`submit`](Self::submit) but hands the outcome to `callback`.
    pub fn submit_with<T, F, Fut, C>(&self, work: F, callback: C)
    where
        T: Send + 'static,
        F: FnOnce(Arc<dyn RpcGateway>) -> Fut,
        Fut: Future<Output = ClientResult<T>> + Send + 'static,
        C: FnOnce(Response<T>) + Send + 'static,
    {
        self.executor.submit_with(work(self.gateway.clone()), callback)
    }

    pub fn get_balance(&self, address: Address, tag: &str) -> Pending<U256> {
        let tag = tag.to_string();
        self.submit(move |gateway| async move { gateway.get_balance(address, &tag).await })
    }

    pub fn get_transaction_count(&self, address: Address, tag: &str) -> Pending<u64> {
        let tag = tag.to_string();
        self.submit(move |gateway| async move {
            gateway.get_transaction_count(address, &tag).await
        })
    }

    pub fn get_block_number(&self) -> Pending<u64> {
        self.submit(|gateway| async move { gateway.block_number().await })
    }

    pub fn get_accounts(&self) -> Pending<Vec<Address>> {
        self.submit(|gateway| async move { gateway.accounts().await })
    }

    pub fn get_coinbase(&self) -> Pending<Address> {
        self.submit(|gateway| async move { gateway.coinbase().await })
    }

    pub fn get_transaction(&self, hash: B256) -> Pending<Option<Transaction>> {
        self.submit(move |gateway| async move { gateway.get_transaction_by_hash(hash).await })
    }

    pub fn get_transaction_receipt(&self, hash: B256) -> Pending<Option<TransactionReceipt>> {
        self.submit(move |gateway| async move { gateway.get_transaction_receipt(hash).await })
    }

    pub fn get_block_by_number(&self, tag: &str, full: bool) -> Pending<Option<Block>> {
        let tag = tag.to_string();
        self.submit(move |gateway| async move { gateway.get_block_by_number(&tag, full).await })
    }

    pub fn send_transaction(&self, request: TransactionRequest) -> Pending<B256> {
        self.submit(move |gateway| async move { gateway.send_transaction(&request).await })
    }

    pub fn send_raw_transaction(&self, encoded: impl Into<String>) -> Pending<B256> {
        let encoded = encoded.into();
        self.submit(move |gateway| async move { gateway.send_raw_transaction(&encoded).await })
    }

    /// Send a contract call as a transaction.
    pub fn send_call(&self, call: &ContractCall) -> Pending<B256> {
        let mut request = call.to_request();
        if let Some(gas) = &self.gas {
            if call.gas.is_none() {
                request = request.with_gas_limit(gas.default_gas_limit);
            }
            if let (None, Some(price)) = (call.gas_price, gas.gas_price) {
                request = request.with_gas_price(u128::from(price));
            }
        }
        debug!(function = %call.function().name, to = %call.to(), "Sending contract transaction");
        self.send_transaction(request)
    }

    /// Read-only `eth_call` returning the decoded output values.
    pub fn make_call(&self, call: &ContractCall, tag: &str) -> Pending<Vec<DynSolValue>> {
        let call = call.clone();
        let tag = tag.to_string();
        self.submit(move |gateway| async move {
            let output = gateway.call(&call.to_request(), &tag).await?;
            call.decode_output(&output)
        })
    }

    pub fn compile_solidity(&self, source: impl Into<String>) -> Pending<CompileOutput> {
        let compiler = self.compiler.clone();
        let source = source.into();
        self.executor
            .submit(async move { compiler.compile(&source).await })
    }

    pub fn unlock_account(&self, account: Address, passphrase: impl Into<String>) -> Pending<bool> {
        let passphrase = passphrase.into();
        self.submit(move |gateway| async move {
            gateway.unlock_account(account, &passphrase).await
        })
    }

    pub fn miner_start(&self) -> Pending<bool> {
        self.submit(|gateway| async move { gateway.miner_start().await })
    }

    pub fn miner_stop(&self) -> Pending<bool> {
        self.submit(|gateway| async move { gateway.miner_stop().await })
    }

    pub fn miner_set_etherbase(&self, coinbase: Address) -> Pending<bool> {
        self.submit(move |gateway| async move { gateway.miner_set_etherbase(coinbase).await })
    }

    pub fn new_log_filter(&self, filter: Filter) -> Pending<FilterHandle> {
        self.submit(move |gateway| async move {
            let id = gateway.new_filter(&filter).await?;
            Ok(FilterHandle::new(id, FilterKind::Log))
        })
    }

    pub fn new_pending_transaction_filter(&self) -> Pending<FilterHandle> {
        self.submit(|gateway| async move {
            let id = gateway.new_pending_transaction_filter().await?;
            Ok(FilterHandle::new(id, FilterKind::PendingTransaction))
        })
    }

    pub fn new_block_filter(&self) -> Pending<FilterHandle> {
        self.submit(|gateway| async move {
            let id = gateway.new_block_filter().await?;
            Ok(FilterHandle::new(id, FilterKind::NewBlock))
        })
    }

    pub fn uninstall_filter(&self, id: FilterId) -> Pending<bool> {
        self.submit(move |gateway| async move { gateway.uninstall_filter(&id).await })
    }

    /// All logs matching an installed filter, not only changes.
    pub fn get_filter_logs(&self, id: FilterId) -> Pending<Vec<Log>> {
        self.submit(move |gateway| async move { gateway.get_filter_logs(&id).await })
    }

    /// One-shot query of every `event` log the contract emitted. The temporary
    /// filter is uninstalled whether or not the query succeeds.
    pub fn get_events(&self, contract: &Contract, event: &str) -> Pending<Vec<ContractEvent>> {
        let resolved = contract
            .event(event)
            .cloned()
            .and_then(|abi| Ok((abi, contract.event_filter(event)?)));

        self.submit(move |gateway| async move {
            let (event, filter) = resolved?;
            let id = gateway.new_filter(&filter).await?;
            let logs = gateway.get_filter_logs(&id).await;

            if let Err(e) = gateway.uninstall_filter(&id).await {
                warn!(filter_id = %id, "Failed to uninstall temporary filter: {}", e);
            }
            Ok(decode_logs(&event, logs?))
        })
    }

    /// Install a log filter and deliver every non-empty batch of new logs.
    pub async fn watch_logs<C>(&self, filter: Filter, callback: C) -> Response<FilterWatch>
    where
        C: FnMut(Response<Vec<Log>>) + Send + 'static,
    {
        let installed = self.new_log_filter(filter).await;
        let gateway = self.gateway.clone();
        self.start_watch(
            installed,
            move |id: FilterId| {
                let gateway = gateway.clone();
                async move { gateway.get_filter_changes_logs(&id).await }
            },
            callback,
        )
    }

    /// Watch `event` on `contract`, delivering decoded events. Logs that do
    /// not decode against the event ABI are dropped.
    pub async fn watch_events<C>(
        &self,
        contract: &Contract,
        event: &str,
        callback: C,
    ) -> Response<FilterWatch>
    where
        C: FnMut(Response<Vec<ContractEvent>>) + Send + 'static,
    {
        let (event, filter) = match contract.event(event) {
            Ok(abi) => match contract.event_filter(event) {
                Ok(filter) => (Arc::new(abi.clone()), filter),
                Err(e) => return Response::failure(e),
            },
            Err(e) => return Response::failure(e),
        };

        let installed = self.new_log_filter(filter).await;
        let gateway = self.gateway.clone();
        self.start_watch(
            installed,
            move |id: FilterId| {
                let gateway = gateway.clone();
                let event = event.clone();
                async move {
                    let logs = gateway.get_filter_changes_logs(&id).await?;
                    Ok(decode_logs(&event, logs))
                }
            },
            callback,
        )
    }

    /// Deliver hashes of transactions entering the node's pending pool.
    pub async fn watch_pending_transactions<C>(&self, callback: C) -> Response<FilterWatch>
    where
        C: FnMut(Response<Vec<B256>>) + Send + 'static,
    {
        let installed = self.new_pending_transaction_filter().await;
        self.start_watch(installed, self.hash_poller(), callback)
    }

    /// Deliver hashes of newly imported blocks.
    pub async fn watch_blocks<C>(&self, callback: C) -> Response<FilterWatch>
    where
        C: FnMut(Response<Vec<B256>>) + Send + 'static,
    {
        let installed = self.new_block_filter().await;
        self.start_watch(installed, self.hash_poller(), callback)
    }

    fn hash_poller(
        &self,
    ) -> impl Fn(FilterId) -> BoxFuture<'static, ClientResult<Vec<B256>>> + Send + 'static {
        let gateway = self.gateway.clone();
        move |id: FilterId| {
            let gateway = gateway.clone();
            async move { gateway.get_filter_changes_hashes(&id).await }.boxed()
        }
    }

    fn start_watch<E, P, Fut, C>(
        &self,
        installed: Response<FilterHandle>,
        poll: P,
        callback: C,
    ) -> Response<FilterWatch>
    where
        E: Send + 'static,
        P: Fn(FilterId) -> Fut + Send + 'static,
        Fut: Future<Output = ClientResult<Vec<E>>> + Send + 'static,
        C: FnMut(Response<Vec<E>>) + Send + 'static,
    {
        installed.map(|handle| {
            FilterWatch::start(
                self.executor.clone(),
                self.gateway.clone(),
                handle,
                self.poll_interval,
                poll,
                callback,
            )
        })
    }
}

fn decode_logs(event: &Event, logs: Vec<Log>) -> Vec<ContractEvent> {
    logs.iter()
        .filter_map(|log| match abi::decode_event(event, log) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                warn!(event = %event.name, "Skipping undecodable log: {}", e);
                None
            }
        })
        .collect()
}

impl std::fmt::Debug for EthereumService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EthereumService")
            .field("executor", &self.executor)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}
