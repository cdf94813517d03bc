use alloy::{
    dyn_abi::JsonAbiExt,
    json_abi::{Event, Function, JsonAbi},
    network::TransactionBuilder,
    primitives::{Address, Bytes},
};
use serde_json::Value;
use tracing::debug;

use super::abi::{self, ContractCall};
use super::compiler::{CompileOutput, CompiledContract};
use super::{utils, ContractEvent, Filter, Log, TransactionRequest};
use crate::error::{ClientError, ClientResult};

/// Deploys one compiled contract and binds ABIs to deployed addresses.
#[derive(Debug, Clone)]
pub struct ContractFactory {
    name: String,
    abi: JsonAbi,
    bytecode: Bytes,
}

impl ContractFactory {
    pub fn new(compiled: &CompiledContract) -> Self {
        Self {
            name: compiled.name.clone(),
            abi: compiled.abi.clone(),
            bytecode: compiled.bytecode.clone(),
        }
    }

    /// Look a contract up by name in a compile result.
    pub fn from_compiled(output: &CompileOutput, name: &str) -> ClientResult<Self> {
        let compiled = output.get(name).ok_or_else(|| {
            let available: Vec<&str> = output.names().collect();
            ClientError::encoding(format!(
                "Contract '{}' not found in compile output. Available contracts: {}",
                name,
                available.join(", ")
            ))
        })?;
        Ok(Self::new(compiled))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn abi(&self) -> &JsonAbi {
        &self.abi
    }

    pub fn bytecode(&self) -> &Bytes {
        &self.bytecode
    }

    /// Creation transaction: bytecode followed by the encoded constructor arguments.
    pub fn deploy_transaction(
        &self,
        from: Address,
        args: &Value,
    ) -> ClientResult<TransactionRequest> {
        if self.bytecode.is_empty() {
            return Err(ClientError::encoding(format!(
                "Contract '{}' has no bytecode to deploy",
                self.name
            )));
        }

        let mut code = self.bytecode.to_vec();
        match &self.abi.constructor {
            Some(constructor) => {
                let values = abi::json_to_params("constructor", &constructor.inputs, args)?;
                let encoded = constructor.abi_encode_input(&values).map_err(|e| {
                    ClientError::encoding(format!("Failed to encode constructor arguments: {}", e))
                })?;
                code.extend_from_slice(&encoded);
            }
            None if args.is_null() || args.as_array().is_some_and(|a| a.is_empty()) => {}
            None => {
                return Err(ClientError::encoding(format!(
                    "Contract '{}' has no constructor but arguments were given",
                    self.name
                )));
            }
        }

        debug!(contract = %self.name, code_len = code.len(), "Built deployment transaction");
        Ok(TransactionRequest::default()
            .from(from)
            .with_deploy_code(code))
    }

    /// Bind the ABI to an already deployed instance.
    pub fn at(&self, address: Address) -> Contract {
        Contract::new(self.name.clone(), address, self.abi.clone())
    }
}

/// A deployed contract: address plus ABI.
#[derive(Debug, Clone)]
pub struct Contract {
    name: String,
    address: Address,
    abi: JsonAbi,
}

impl Contract {
    pub fn new(name: impl Into<String>, address: Address, abi: JsonAbi) -> Self {
        Self {
            name: name.into(),
            address,
            abi,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn abi(&self) -> &JsonAbi {
        &self.abi
    }

    pub fn function(&self, name: &str) -> ClientResult<&Function> {
        utils::validate_identifier(name)
            .map_err(|e| ClientError::encoding(format!("Invalid function name: {}", e)))?;

        self.abi.functions().find(|f| f.name == name).ok_or_else(|| {
            let available: Vec<String> = self.abi.functions().map(|f| f.name.clone()).collect();
            if available.is_empty() {
                ClientError::encoding(format!(
                    "Function '{}' not found. The contract ABI contains no functions.",
                    name
                ))
            } else {
                ClientError::encoding(format!(
                    "Function '{}' not found in contract ABI. Available functions: {}",
                    name,
                    available.join(", ")
                ))
            }
        })
    }

    pub fn event(&self, name: &str) -> ClientResult<&Event> {
        utils::validate_identifier(name)
            .map_err(|e| ClientError::encoding(format!("Invalid event name: {}", e)))?;

        self.abi.events().find(|e| e.name == name).ok_or_else(|| {
            let available: Vec<String> = self.abi.events().map(|e| e.name.clone()).collect();
            ClientError::encoding(format!(
                "Event '{}' not found in contract ABI. Available events: {}",
                name,
                available.join(", ")
            ))
        })
    }

    /// Call to `function` with JSON arguments. Sender, gas and value are left
    /// for the caller to set.
    pub fn call(&self, function: &str, params: &Value) -> ClientResult<ContractCall> {
        let function = self.function(function)?;
        ContractCall::from_json(function.clone(), self.address, params)
    }

    /// Log filter matching `event` emitted by this contract.
    pub fn event_filter(&self, event: &str) -> ClientResult<Filter> {
        let event = self.event(event)?;
        Ok(Filter::new()
            .address(self.address)
            .event_signature(event.selector()))
    }

    pub fn decode_event(&self, event: &str, log: &Log) -> ClientResult<ContractEvent> {
        abi::decode_event(self.event(event)?, log)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ethereum::compiler::CompilePipeline;
    use crate::test_support::{log_with, StubCompiler, CONTRACT};
    use alloy::dyn_abi::DynSolValue;
    use alloy::primitives::{address, U256};
    use serde_json::json;
    use std::sync::Arc;

    const DEPLOYER: Address = address!("e382dcaabf70dbce10dfcaecf0ac3b78184f6e65");

    async fn dao_factory() -> ContractFactory {
        let output = CompilePipeline::new(Arc::new(StubCompiler::dao()))
            .compile("contract DAO {}")
            .await
            .unwrap();
        ContractFactory::from_compiled(&output, "DAO").unwrap()
    }

    #[tokio::test]
    async fn test_from_compiled_lists_available_contracts() {
        let output = CompilePipeline::new(Arc::new(StubCompiler::dao()))
            .compile("contract DAO {}")
            .await
            .unwrap();
        let err = ContractFactory::from_compiled(&output, "Token").unwrap_err();
        assert!(err.to_string().contains("Available contracts: DAO"));
    }

    #[tokio::test]
    async fn test_deploy_transaction_appends_constructor_arguments() {
        let factory = dao_factory().await;
        let request = factory.deploy_transaction(DEPLOYER, &json!([3])).unwrap();

        let code = request.input.input().unwrap();
        assert_eq!(&code[..4], &[0x60, 0x60, 0x60, 0x40]);
        assert_eq!(
            &code[4..],
            &DynSolValue::Uint(U256::from(3u64), 256).abi_encode()[..]
        );
        assert_eq!(request.from, Some(DEPLOYER));
        assert!(request.to.is_some_and(|kind| kind.is_create()));

        assert!(factory.deploy_transaction(DEPLOYER, &json!([])).is_err());
    }

    #[tokio::test]
    async fn test_call_encodes_named_function() {
        let contract = dao_factory().await.at(CONTRACT);
        let call = contract
            .call("balanceOf", &json!(["0xe382dcaabf70dbce10dfcaecf0ac3b78184f6e65"]))
            .unwrap();

        assert_eq!(call.to(), CONTRACT);
        assert_eq!(call.function().name, "balanceOf");
        assert!(call.from.is_none());

        let err = contract.call("withdraw", &json!([])).unwrap_err();
        assert!(err.to_string().contains("Available functions: balanceOf"));
        assert!(contract.call("bad name", &json!([])).is_err());
    }

    #[tokio::test]
    async fn test_event_filter_and_decoding() {
        let contract = dao_factory().await.at(CONTRACT);
        let selector = contract.event("Transfer").unwrap().selector();

        let filter = contract.event_filter("Transfer").unwrap();
        assert!(filter.address.matches(&CONTRACT));
        assert!(filter.topics[0].matches(&selector));

        let log = log_with(
            vec![selector, DEPLOYER.into_word(), CONTRACT.into_word()],
            DynSolValue::Uint(U256::from(9u64), 256).abi_encode(),
        );
        let event = contract.decode_event("Transfer", &log).unwrap();
        assert_eq!(event.values[2], DynSolValue::Uint(U256::from(9u64), 256));
        assert!(contract.event_filter("Approval").is_err());
    }
}
