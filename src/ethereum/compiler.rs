//! Solidity compilation through an external `solc` process.

use alloy::{json_abi::JsonAbi, primitives::Bytes};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::CompilerConfig;
use crate::error::{ClientError, ClientResult};

/// Produces combined-JSON compiler output for a piece of source text.
#[async_trait]
pub trait SolidityCompiler: Send + Sync {
    async fn run(&self, source: &str) -> io::Result<String>;
}

/// Invokes `solc --combined-json <outputs> -` with the source on stdin.
#[derive(Debug, Clone)]
pub struct SolcProcess {
    path: PathBuf,
    combined_json: String,
}

impl SolcProcess {
    pub fn new(path: impl Into<PathBuf>, combined_json: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            combined_json: combined_json.into(),
        }
    }

    pub fn from_config(config: &CompilerConfig) -> Self {
        Self::new(&config.solc_path, &config.combined_json)
    }
}

#[async_trait]
impl SolidityCompiler for SolcProcess {
    async fn run(&self, source: &str) -> io::Result<String> {
        debug!(solc = %self.path.display(), outputs = %self.combined_json, "Invoking compiler");
        let mut child = Command::new(&self.path)
            .arg("--combined-json")
            .arg(&self.combined_json)
            .arg("-")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(source.as_bytes()).await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!(
                    "solc exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ));
        }

        String::from_utf8(output.stdout)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledContract {
    pub name: String,
    pub abi: JsonAbi,
    pub bytecode: Bytes,
    /// The source text this contract was compiled from.
    pub source: String,
}

/// Contracts produced by one compiler invocation, keyed by contract name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompileOutput {
    contracts: BTreeMap<String, CompiledContract>,
}

impl CompileOutput {
    pub fn get(&self, name: &str) -> Option<&CompiledContract> {
        self.contracts.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.contracts.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.contracts.keys().map(String::as_str)
    }

    pub fn contracts(&self) -> impl Iterator<Item = &CompiledContract> {
        self.contracts.values()
    }

    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }
}

/// Compiler invocation followed by output parsing; both must succeed.
#[derive(Clone)]
pub struct CompilePipeline {
    compiler: Arc<dyn SolidityCompiler>,
}

impl CompilePipeline {
    pub fn new(compiler: Arc<dyn SolidityCompiler>) -> Self {
        Self { compiler }
    }

    pub async fn compile(&self, source: &str) -> ClientResult<CompileOutput> {
        let raw = self.compiler.run(source).await.map_err(|e| {
            warn!("Compiler invocation failed: {}", e);
            ClientError::compile(format!("Compiler invocation failed: {}", e), source)
        })?;

        let output = parse_combined_json(&raw, source)?;
        debug!(contracts = output.len(), "Compiled source");
        Ok(output)
    }
}

#[derive(Debug, Deserialize)]
struct CombinedJson {
    contracts: HashMap<String, RawContract>,
}

#[derive(Debug, Deserialize)]
struct RawContract {
    #[serde(default)]
    abi: Option<Value>,
    /// Legacy name for the ABI in older compiler releases.
    #[serde(default)]
    interface: Option<Value>,
    #[serde(default)]
    bin: Option<String>,
}

/// Parse `solc --combined-json` output into a name-keyed mapping.
pub fn parse_combined_json(raw: &str, source: &str) -> ClientResult<CompileOutput> {
    let fail = |reason: String| {
        warn!("Unparseable compiler output: {}", reason);
        ClientError::compile(reason, source)
    };

    let combined: CombinedJson = serde_json::from_str(raw)
        .map_err(|e| fail(format!("Invalid compiler output: {}", e)))?;

    if combined.contracts.is_empty() {
        return Err(fail("Compiler output contains no contracts".to_string()));
    }

    let mut contracts = BTreeMap::new();
    for (key, raw_contract) in combined.contracts {
        // keys look like "<stdin>:DAO"
        let name = key.rsplit(':').next().unwrap_or(&key).to_string();

        let abi_value = raw_contract
            .abi
            .or(raw_contract.interface)
            .ok_or_else(|| fail(format!("Contract '{}' has no ABI", name)))?;
        let abi: JsonAbi = match abi_value {
            Value::String(text) => serde_json::from_str(&text),
            other => serde_json::from_value(other),
        }
        .map_err(|e| fail(format!("Invalid ABI for contract '{}': {}", name, e)))?;

        let bin = raw_contract.bin.unwrap_or_default();
        let bytecode = hex::decode(bin.trim_start_matches("0x"))
            .map(Bytes::from)
            .map_err(|e| fail(format!("Invalid bytecode for contract '{}': {}", name, e)))?;

        contracts.insert(
            name.clone(),
            CompiledContract {
                name,
                abi,
                bytecode,
                source: source.to_string(),
            },
        );
    }

    Ok(CompileOutput { contracts })
}
