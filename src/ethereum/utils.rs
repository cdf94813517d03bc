use alloy::primitives::{Address, U256};
use anyhow::{anyhow, Result};
use std::str::FromStr;

/// Validates and normalizes an Ethereum address
pub fn validate_address(address: &str) -> Result<Address> {
    let address = address.trim();

    if address.is_empty() {
        return Err(anyhow!("Address cannot be empty"));
    }

    let hex_part = address
        .strip_prefix("0x")
        .or_else(|| address.strip_prefix("0X"))
        .ok_or_else(|| {
            anyhow!(
                "Invalid address format: '{}'. Ethereum addresses must start with '0x'",
                address
            )
        })?;

    if hex_part.len() != 40 {
        return Err(anyhow!(
            "Invalid address length: '{}'. Expected 0x followed by 40 hex characters",
            address
        ));
    }

    if !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(anyhow!(
            "Invalid address format: '{}'. Contains non-hexadecimal characters",
            address
        ));
    }

    Address::from_str(address)
        .map_err(|e| anyhow!("Invalid Ethereum address: '{}'. Error: {}", address, e))
}

/// Validates network name
pub fn validate_network(network: &str, available_networks: &[String]) -> Result<()> {
    if network.is_empty() {
        return Err(anyhow!("Network name cannot be empty"));
    }

    if !available_networks.iter().any(|n| n == network) {
        let mut names = available_networks.to_vec();
        names.sort();
        return Err(anyhow!(
            "Unknown network: '{}'. Available networks: {}",
            network,
            names.join(", ")
        ));
    }

    Ok(())
}

/// Validates a Solidity identifier used as a function or event name
pub fn validate_identifier(name: &str) -> Result<()> {
    let first = name
        .chars()
        .next()
        .ok_or_else(|| anyhow!("Name cannot be empty"))?;

    if !first.is_ascii_alphabetic() && first != '_' && first != '$' {
        return Err(anyhow!(
            "Invalid name: '{}'. Names must start with a letter, '_' or '$'",
            name
        ));
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
    {
        return Err(anyhow!(
            "Invalid name: '{}'. Names can only contain letters, numbers, '_' and '$'",
            name
        ));
    }

    Ok(())
}

/// Parses a wei amount given either as decimal or as `0x` prefixed hex
pub fn parse_quantity(value_str: &str) -> Result<U256> {
    let value_str = value_str.trim();
    if value_str.is_empty() {
        return Err(anyhow!("Value cannot be empty"));
    }

    match value_str
        .strip_prefix("0x")
        .or_else(|| value_str.strip_prefix("0X"))
    {
        Some(hex_digits) => U256::from_str_radix(hex_digits, 16)
            .map_err(|_| anyhow!("Invalid hexadecimal value: '{}'", value_str)),
        None => U256::from_str_radix(value_str, 10).map_err(|_| {
            anyhow!(
                "Invalid numeric value: '{}'. Use decimal format or '0x' prefixed hex",
                value_str
            )
        }),
    }
}

/// Rewords common node errors; the result is the reason carried by a remote call failure
pub fn interpret_rpc_error(error: &str) -> String {
    let lower = error.to_lowercase();
    if lower.contains("execution reverted") {
        format!("Execution reverted: {}", error)
    } else if lower.contains("insufficient funds") {
        "Insufficient funds to cover value and gas".to_string()
    } else if lower.contains("nonce too low") {
        "Nonce too low: a transaction with this nonce was already mined".to_string()
    } else if lower.contains("replacement transaction underpriced") {
        "Gas price too low to replace the pending transaction".to_string()
    } else if lower.contains("filter not found") {
        "Filter not found: it was uninstalled or expired on the node".to_string()
    } else if lower.contains("unknown account") || lower.contains("authentication needed") {
        "Account is locked or unknown to the node".to_string()
    } else if lower.contains("connection refused") || lower.contains("network unreachable") {
        format!("Cannot connect to RPC endpoint: {}", error)
    } else if lower.contains("timeout") || lower.contains("timed out") {
        "Request to the RPC endpoint timed out".to_string()
    } else if lower.contains("method not found") {
        "Method not supported by this RPC endpoint".to_string()
    } else {
        error.to_string()
    }
}
