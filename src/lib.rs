//! Asynchronous orchestration over an Ethereum JSON-RPC node: pooled remote
//! calls with uniform [`Response`] reporting, polling filter watches, contract
//! call building and Solidity compilation.

pub mod config;
pub mod error;
pub mod ethereum;
pub mod executor;
pub mod response;
pub mod service;
pub mod watch;

#[cfg(test)]
mod test_support;

pub use config::Config;
pub use error::{ClientError, ClientResult};
pub use executor::{Executor, Pending};
pub use response::Response;
pub use service::EthereumService;
pub use watch::{FilterWatch, WatchState};
