//! Building contract calls from ABI descriptors and decoding what comes back.

use alloy::{
    dyn_abi::{DynSolType, DynSolValue, EventExt, FunctionExt, JsonAbiExt, Specifier, Word},
    json_abi::{Event, Function, Param},
    network::TransactionBuilder,
    primitives::{Address, Bytes, I256, U256},
};
use serde_json::Value;
use std::str::FromStr;

use super::{ContractEvent, Log, TransactionRequest};
use crate::error::{ClientError, ClientResult};

pub const SELECTOR_LEN: usize = 4;

/// An outgoing call to a contract function.
///
/// `data` is always derived from the function descriptor and arguments. The
/// sender, gas, gas price and value are independent of the descriptor and
/// must be set by the caller before the call is submitted.
#[derive(Debug, Clone, PartialEq)]
pub struct ContractCall {
    function: Function,
    to: Address,
    data: Bytes,
    pub from: Option<Address>,
    pub gas: Option<u64>,
    pub gas_price: Option<u128>,
    pub value: Option<U256>,
}

impl ContractCall {
    pub fn new(function: Function, to: Address, args: &[DynSolValue]) -> ClientResult<Self> {
        let data = encode_call(&function, args)?;
        Ok(Self {
            function,
            to,
            data,
            from: None,
            gas: None,
            gas_price: None,
            value: None,
        })
    }

    /// Build a call from JSON arguments, positional (array) or named (object).
    pub fn from_json(function: Function, to: Address, params: &Value) -> ClientResult<Self> {
        let args = json_to_args(&function, params)?;
        Self::new(function, to, &args)
    }

    pub fn with_from(mut self, from: Address) -> Self {
        self.from = Some(from);
        self
    }

    pub fn with_gas(mut self, gas: u64) -> Self {
        self.gas = Some(gas);
        self
    }

    pub fn with_gas_price(mut self, gas_price: u128) -> Self {
        self.gas_price = Some(gas_price);
        self
    }

    pub fn with_value(mut self, value: U256) -> Self {
        self.value = Some(value);
        self
    }

    pub fn function(&self) -> &Function {
        &self.function
    }

    pub fn to(&self) -> Address {
        self.to
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Request usable both for `eth_call` and `eth_sendTransaction`.
    pub fn to_request(&self) -> TransactionRequest {
        let mut request = TransactionRequest::default()
            .to(self.to)
            .input(self.data.clone().into());

        if let Some(from) = self.from {
            request = request.from(from);
        }
        if let Some(value) = self.value {
            request = request.value(value);
        }
        if let Some(gas) = self.gas {
            request = request.with_gas_limit(gas);
        }
        if let Some(gas_price) = self.gas_price {
            request = request.with_gas_price(gas_price);
        }
        request
    }

    pub fn decode_output(&self, output: &[u8]) -> ClientResult<Vec<DynSolValue>> {
        decode_output(&self.function, output)
    }
}

/// Selector followed by the ABI-encoded arguments.
pub fn encode_call(function: &Function, args: &[DynSolValue]) -> ClientResult<Bytes> {
    if args.len() != function.inputs.len() {
        return Err(ClientError::encoding(format!(
            "Parameter count mismatch for function '{}': expected {} parameters, got {}. \
             Expected parameters: [{}]",
            function.name,
            function.inputs.len(),
            args.len(),
            describe_params(&function.inputs)
        )));
    }

    for (i, (param, arg)) in function.inputs.iter().zip(args).enumerate() {
        let expected = resolve(param)?;
        if !expected.matches(arg) {
            return Err(ClientError::encoding(format!(
                "Invalid parameter #{} ('{}'): expected '{}', got {:?}",
                i + 1,
                param.name,
                param.ty,
                arg
            )));
        }
        check_range(arg).map_err(|reason| {
            ClientError::encoding(format!(
                "Invalid parameter #{} ('{}' of type '{}'): {}",
                i + 1,
                param.name,
                param.ty,
                reason
            ))
        })?;
    }

    function
        .abi_encode_input(args)
        .map(Bytes::from)
        .map_err(|e| ClientError::encoding(format!("Failed to encode function inputs: {}", e)))
}

/// Values must fit their declared width; `matches` only compares types.
fn check_range(value: &DynSolValue) -> Result<(), String> {
    match value {
        DynSolValue::Uint(n, bits) if n.bit_len() > *bits => {
            Err(format!("value {} does not fit in uint{}", n, bits))
        }
        DynSolValue::Int(n, bits) if !int_fits(*n, *bits) => {
            Err(format!("value {} does not fit in int{}", n, bits))
        }
        DynSolValue::FixedBytes(word, size)
            if word[(*size).min(32)..].iter().any(|b| *b != 0) =>
        {
            Err(format!("value {} does not fit in bytes{}", word, size))
        }
        DynSolValue::Array(items)
        | DynSolValue::FixedArray(items)
        | DynSolValue::Tuple(items) => items.iter().try_for_each(check_range),
        _ => Ok(()),
    }
}

fn int_fits(n: I256, bits: usize) -> bool {
    if bits >= 256 {
        return true;
    }
    // intN covers [-2^(N-1), 2^(N-1))
    let bound = I256::from_raw(U256::from(1u8) << (bits - 1));
    n >= -bound && n < bound
}

/// Decode raw call output positionally against the declared output types.
pub fn decode_output(function: &Function, output: &[u8]) -> ClientResult<Vec<DynSolValue>> {
    if output.is_empty() && !function.outputs.is_empty() {
        return Err(ClientError::encoding(format!(
            "Empty output for function '{}' which declares {} return values",
            function.name,
            function.outputs.len()
        )));
    }

    function
        .abi_decode_output(output, false)
        .map_err(|e| ClientError::encoding(format!("Failed to decode output: {}", e)))
}

pub fn decode_output_hex(function: &Function, output: &str) -> ClientResult<Vec<DynSolValue>> {
    let bytes = hex::decode(output.trim_start_matches("0x"))
        .map_err(|_| ClientError::encoding(format!("Invalid hex output: {}", output)))?;
    decode_output(function, &bytes)
}

/// Recover the arguments from call data produced by [`encode_call`].
pub fn decode_call_data(function: &Function, data: &[u8]) -> ClientResult<Vec<DynSolValue>> {
    if data.len() < SELECTOR_LEN || data[..SELECTOR_LEN] != function.selector()[..] {
        return Err(ClientError::encoding(format!(
            "Call data does not start with the selector of '{}'",
            function.signature()
        )));
    }

    function
        .abi_decode_input(&data[SELECTOR_LEN..], false)
        .map_err(|e| ClientError::encoding(format!("Failed to decode call data: {}", e)))
}

/// Decode a log against an event ABI, returning values in declared order.
pub fn decode_event(event: &Event, log: &Log) -> ClientResult<ContractEvent> {
    let decoded = event.decode_log(log.data(), true).map_err(|e| {
        ClientError::encoding(format!("Failed to decode event '{}': {}", event.name, e))
    })?;

    let mut indexed = decoded.indexed.into_iter();
    let mut body = decoded.body.into_iter();
    let values = event
        .inputs
        .iter()
        .map(|input| {
            if input.indexed {
                indexed.next()
            } else {
                body.next()
            }
        })
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| {
            ClientError::encoding(format!(
                "Log does not carry every parameter of event '{}'",
                event.name
            ))
        })?;

    Ok(ContractEvent {
        name: event.name.clone(),
        log: log.clone(),
        values,
    })
}

fn resolve(param: &Param) -> ClientResult<DynSolType> {
    param.resolve().map_err(|e| {
        ClientError::encoding(format!(
            "Unsupported type '{}' for '{}': {}",
            param.ty, param.name, e
        ))
    })
}

fn describe_params(params: &[Param]) -> String {
    params
        .iter()
        .map(|p| format!("{} {}", p.ty, p.name))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Convert JSON call parameters into ABI values for `function`'s inputs.
pub fn json_to_args(function: &Function, params: &Value) -> ClientResult<Vec<DynSolValue>> {
    json_to_params(&function.name, &function.inputs, params)
}

/// Positional (array) or named (object) JSON values for a parameter list.
/// `null` is accepted when there are no parameters.
pub fn json_to_params(
    name: &str,
    inputs: &[Param],
    params: &Value,
) -> ClientResult<Vec<DynSolValue>> {
    match params {
        Value::Array(values) => {
            if values.len() != inputs.len() {
                return Err(ClientError::encoding(format!(
                    "Parameter count mismatch for '{}': expected {} parameters, got {}. \
                     Expected parameters: [{}]",
                    name,
                    inputs.len(),
                    values.len(),
                    describe_params(inputs)
                )));
            }

            inputs
                .iter()
                .zip(values)
                .enumerate()
                .map(|(i, (input, value))| {
                    let ty = resolve(input)?;
                    json_to_dyn_sol_value(value, &ty).map_err(|e| {
                        ClientError::encoding(format!(
                            "Invalid parameter #{} ('{}' of type '{}'): {}",
                            i + 1,
                            input.name,
                            input.ty,
                            e
                        ))
                    })
                })
                .collect()
        }
        Value::Object(named) => inputs
            .iter()
            .map(|input| {
                let value = named.get(&input.name).ok_or_else(|| {
                    ClientError::encoding(format!(
                        "Missing required parameter '{}' of type '{}' for '{}'",
                        input.name, input.ty, name
                    ))
                })?;
                let ty = resolve(input)?;
                json_to_dyn_sol_value(value, &ty).map_err(|e| {
                    ClientError::encoding(format!(
                        "Invalid parameter '{}' of type '{}': {}",
                        input.name, input.ty, e
                    ))
                })
            })
            .collect(),
        Value::Null if inputs.is_empty() => Ok(Vec::new()),
        other => Err(ClientError::encoding(format!(
            "Invalid parameter format for '{}'. Expected an array or an object of [{}], got {}",
            name,
            describe_params(inputs),
            other
        ))),
    }
}

/// Convert a JSON value into the ABI value of the given type
pub fn json_to_dyn_sol_value(value: &Value, ty: &DynSolType) -> ClientResult<DynSolValue> {
    match ty {
        DynSolType::Address => {
            let s = value
                .as_str()
                .ok_or_else(|| ClientError::encoding("Address must be a string"))?;
            Address::from_str(s)
                .map(DynSolValue::Address)
                .map_err(|e| ClientError::encoding(format!("Invalid address '{}': {}", s, e)))
        }
        DynSolType::Bool => value
            .as_bool()
            .map(DynSolValue::Bool)
            .ok_or_else(|| ClientError::encoding("Bool parameter must be a boolean")),
        DynSolType::String => value
            .as_str()
            .map(|s| DynSolValue::String(s.to_string()))
            .ok_or_else(|| ClientError::encoding("String parameter must be a string")),
        DynSolType::Uint(bits) => {
            let n = match value {
                Value::Number(n) => n
                    .as_u64()
                    .map(U256::from)
                    .ok_or_else(|| ClientError::encoding(format!("Invalid uint value: {}", n)))?,
                Value::String(s) => match s.strip_prefix("0x") {
                    Some(hex_digits) => U256::from_str_radix(hex_digits, 16),
                    None => U256::from_str_radix(s, 10),
                }
                .map_err(|_| ClientError::encoding(format!("Invalid uint string: {}", s)))?,
                _ => return Err(ClientError::encoding("Uint must be a number or string")),
            };
            if n.bit_len() > *bits {
                return Err(ClientError::encoding(format!(
                    "Value {} does not fit in uint{}",
                    n, bits
                )));
            }
            Ok(DynSolValue::Uint(n, *bits))
        }
        DynSolType::Int(bits) => {
            let s = match value {
                Value::Number(n) => n.to_string(),
                Value::String(s) => s.clone(),
                _ => return Err(ClientError::encoding("Int must be a number or string")),
            };
            let parsed = if s.trim_start_matches('-').starts_with("0x") {
                I256::from_hex_str(&s)
            } else {
                I256::from_dec_str(&s)
            };
            let n = parsed
                .map_err(|_| ClientError::encoding(format!("Invalid int value: {}", s)))?;
            if !int_fits(n, *bits) {
                return Err(ClientError::encoding(format!(
                    "Value {} does not fit in int{}",
                    n, bits
                )));
            }
            Ok(DynSolValue::Int(n, *bits))
        }
        DynSolType::FixedBytes(size) => {
            let hex_str = value
                .as_str()
                .ok_or_else(|| ClientError::encoding("Bytes must be a hex string"))?;
            let bytes = hex::decode(hex_str.trim_start_matches("0x"))
                .map_err(|_| ClientError::encoding(format!("Invalid hex string: {}", hex_str)))?;
            if bytes.len() > *size {
                return Err(ClientError::encoding(format!(
                    "{} bytes given for bytes{}",
                    bytes.len(),
                    size
                )));
            }

            let mut word_bytes = [0u8; 32];
            word_bytes[..bytes.len()].copy_from_slice(&bytes);
            Ok(DynSolValue::FixedBytes(Word::from(word_bytes), *size))
        }
        DynSolType::Bytes => {
            let hex_str = value
                .as_str()
                .ok_or_else(|| ClientError::encoding("Bytes must be a hex string"))?;
            hex::decode(hex_str.trim_start_matches("0x"))
                .map(DynSolValue::Bytes)
                .map_err(|_| ClientError::encoding(format!("Invalid hex string: {}", hex_str)))
        }
        DynSolType::Array(inner) => {
            let items = value
                .as_array()
                .ok_or_else(|| ClientError::encoding("Array parameter must be an array"))?;
            items
                .iter()
                .map(|item| json_to_dyn_sol_value(item, inner))
                .collect::<ClientResult<Vec<_>>>()
                .map(DynSolValue::Array)
        }
        DynSolType::FixedArray(inner, len) => {
            let items = value
                .as_array()
                .ok_or_else(|| ClientError::encoding("Array parameter must be an array"))?;
            if items.len() != *len {
                return Err(ClientError::encoding(format!(
                    "Expected {} elements, got {}",
                    len,
                    items.len()
                )));
            }
            items
                .iter()
                .map(|item| json_to_dyn_sol_value(item, inner))
                .collect::<ClientResult<Vec<_>>>()
                .map(DynSolValue::FixedArray)
        }
        DynSolType::Tuple(types) => {
            let items = value
                .as_array()
                .ok_or_else(|| ClientError::encoding("Tuple parameter must be an array"))?;
            if items.len() != types.len() {
                return Err(ClientError::encoding(format!(
                    "Expected a tuple of {} elements, got {}",
                    types.len(),
                    items.len()
                )));
            }
            items
                .iter()
                .zip(types)
                .map(|(item, ty)| json_to_dyn_sol_value(item, ty))
                .collect::<ClientResult<Vec<_>>>()
                .map(DynSolValue::Tuple)
        }
        other => Err(ClientError::encoding(format!(
            "Unsupported Solidity type: {}",
            other
        ))),
    }
}

/// Convert decoded values to JSON; a single value is returned unwrapped
pub fn dyn_sol_values_to_json(values: &[DynSolValue]) -> ClientResult<Value> {
    match values {
        [single] => dyn_sol_value_to_json(single),
        _ => values
            .iter()
            .map(dyn_sol_value_to_json)
            .collect::<ClientResult<Vec<_>>>()
            .map(Value::Array),
    }
}

pub fn dyn_sol_value_to_json(value: &DynSolValue) -> ClientResult<Value> {
    match value {
        DynSolValue::Address(addr) => Ok(Value::String(addr.to_checksum(None))),
        DynSolValue::Uint(n, _) => Ok(Value::String(n.to_string())),
        DynSolValue::Int(n, _) => Ok(Value::String(n.to_string())),
        DynSolValue::Bool(b) => Ok(Value::Bool(*b)),
        DynSolValue::String(s) => Ok(Value::String(s.clone())),
        DynSolValue::Bytes(bytes) => Ok(Value::String(format!("0x{}", hex::encode(bytes)))),
        DynSolValue::FixedBytes(word, size) => Ok(Value::String(format!(
            "0x{}",
            hex::encode(&word[..*size])
        ))),
        DynSolValue::Array(items) | DynSolValue::FixedArray(items) | DynSolValue::Tuple(items) => {
            items
                .iter()
                .map(dyn_sol_value_to_json)
                .collect::<ClientResult<Vec<_>>>()
                .map(Value::Array)
        }
        other => Err(ClientError::encoding(format!(
            "Unsupported value type: {:?}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{address, LogData, B256};
    use serde_json::json;

    fn echo() -> Function {
        Function::parse(
            "function echo(address who, uint256 amount, string memo) \
             returns (address, uint256, string)",
        )
        .unwrap()
    }

    const TARGET: Address = address!("bb9bc244d798123fde783fcc1c72d3bb8c189413");
    const HOLDER: Address = address!("e382dcaabf70dbce10dfcaecf0ac3b78184f6e65");

    #[test]
    fn test_encoded_call_round_trips_through_mirrored_outputs() {
        let function = echo();
        let args = vec![
            DynSolValue::Address(HOLDER),
            DynSolValue::Uint(U256::from(1_000u64), 256),
            DynSolValue::String("dao".to_string()),
        ];

        let call = ContractCall::new(function.clone(), TARGET, &args).unwrap();
        assert_eq!(&call.data()[..SELECTOR_LEN], &function.selector()[..]);

        // outputs mirror inputs, so the argument section decodes as output
        let decoded = call.decode_output(&call.data()[SELECTOR_LEN..]).unwrap();
        assert_eq!(decoded, args);
        assert_eq!(decode_call_data(&function, call.data()).unwrap(), args);
    }

    #[test]
    fn test_argument_count_mismatch() {
        let err = encode_call(&echo(), &[DynSolValue::Address(HOLDER)]).unwrap_err();
        assert!(matches!(err, ClientError::CallEncoding(_)));
        assert!(err.to_string().contains("expected 3 parameters, got 1"));
    }

    #[test]
    fn test_argument_type_mismatch() {
        let args = vec![
            DynSolValue::Bool(true),
            DynSolValue::Uint(U256::from(1u64), 256),
            DynSolValue::String(String::new()),
        ];
        let err = encode_call(&echo(), &args).unwrap_err();
        assert!(matches!(err, ClientError::CallEncoding(_)));
    }

    #[test]
    fn test_out_of_range_values_are_rejected() {
        let narrow = Function::parse("function set(uint8 small, int8 signed)").unwrap();

        let too_wide = [
            DynSolValue::Uint(U256::from(300u64), 8),
            DynSolValue::Int(I256::ZERO, 8),
        ];
        let err = encode_call(&narrow, &too_wide).unwrap_err();
        assert!(matches!(err, ClientError::CallEncoding(_)));
        assert!(err.to_string().contains("does not fit in uint8"));

        let too_negative = [
            DynSolValue::Uint(U256::from(255u64), 8),
            DynSolValue::Int(I256::try_from(-129i64).unwrap(), 8),
        ];
        assert!(encode_call(&narrow, &too_negative).is_err());

        let edges = [
            DynSolValue::Uint(U256::from(255u64), 8),
            DynSolValue::Int(I256::try_from(-128i64).unwrap(), 8),
        ];
        assert!(encode_call(&narrow, &edges).is_ok());

        let batch = Function::parse("function batch(uint8[] amounts)").unwrap();
        let nested = [DynSolValue::Array(vec![
            DynSolValue::Uint(U256::from(1u64), 8),
            DynSolValue::Uint(U256::from(256u64), 8),
        ])];
        assert!(encode_call(&batch, &nested).is_err());
    }

    #[test]
    fn test_json_int_is_range_checked_and_accepts_hex() {
        let function = Function::parse("function set(int8 delta)").unwrap();

        assert!(json_to_args(&function, &json!([300])).is_err());
        assert!(json_to_args(&function, &json!(["-129"])).is_err());
        assert_eq!(
            json_to_args(&function, &json!(["0x7f"])).unwrap(),
            vec![DynSolValue::Int(I256::try_from(127i64).unwrap(), 8)]
        );
        assert_eq!(
            json_to_args(&function, &json!([-128])).unwrap(),
            vec![DynSolValue::Int(I256::try_from(-128i64).unwrap(), 8)]
        );
    }

    #[test]
    fn test_json_arguments_positional_and_named() {
        let function = Function::parse("function transfer(address to, uint8 amount)").unwrap();
        let positional = json_to_args(
            &function,
            &json!(["0xe382dcaabf70dbce10dfcaecf0ac3b78184f6e65", 7]),
        )
        .unwrap();
        let named = json_to_args(
            &function,
            &json!({"to": "0xe382dcaabf70dbce10dfcaecf0ac3b78184f6e65", "amount": "0x07"}),
        )
        .unwrap();
        assert_eq!(positional, named);
        assert_eq!(positional[1], DynSolValue::Uint(U256::from(7u64), 8));

        let to = "0xe382dcaabf70dbce10dfcaecf0ac3b78184f6e65";
        assert!(json_to_args(&function, &json!([to, 300])).is_err());
        assert!(json_to_args(&function, &json!({ "to": to })).is_err());
        assert!(json_to_args(&function, &json!("nope")).is_err());
    }

    #[test]
    fn test_call_fields_are_independent_of_descriptor() {
        let function = Function::parse("function ping()").unwrap();
        let call = ContractCall::new(function, TARGET, &[])
            .unwrap()
            .with_from(HOLDER)
            .with_gas(90_000)
            .with_gas_price(1_000_000_000)
            .with_value(U256::from(5u64));

        let request = call.to_request();
        assert_eq!(request.from, Some(HOLDER));
        assert_eq!(request.gas, Some(90_000));
        assert_eq!(request.gas_price, Some(1_000_000_000));
        assert_eq!(request.value, Some(U256::from(5u64)));
        assert_eq!(request.input.input(), Some(call.data()));
    }

    #[test]
    fn test_decode_output_hex() {
        let function = Function::parse("function balanceOf(address) returns (uint256)").unwrap();
        let encoded = DynSolValue::Uint(U256::from(42u64), 256).abi_encode();
        let values =
            decode_output_hex(&function, &format!("0x{}", hex::encode(encoded))).unwrap();
        assert_eq!(values, vec![DynSolValue::Uint(U256::from(42u64), 256)]);
        assert_eq!(dyn_sol_values_to_json(&values).unwrap(), json!("42"));

        assert!(decode_output_hex(&function, "0x").is_err());
        assert!(decode_output_hex(&function, "0xzz").is_err());
    }

    #[test]
    fn test_decode_event_orders_indexed_and_body() {
        let event =
            Event::parse("event Transfer(address indexed from, address indexed to, uint256 value)")
                .unwrap();
        let topics: Vec<B256> = vec![event.selector(), HOLDER.into_word(), TARGET.into_word()];
        let data = DynSolValue::Uint(U256::from(5u64), 256).abi_encode();
        let log = Log {
            inner: alloy::primitives::Log {
                address: TARGET,
                data: LogData::new_unchecked(topics, data.into()),
            },
            ..Default::default()
        };

        let decoded = decode_event(&event, &log).unwrap();
        assert_eq!(decoded.name, "Transfer");
        assert_eq!(
            decoded.values,
            vec![
                DynSolValue::Address(HOLDER),
                DynSolValue::Address(TARGET),
                DynSolValue::Uint(U256::from(5u64), 256),
            ]
        );

        let unrelated =
            Event::parse("event Approval(address indexed owner, uint256 value)").unwrap();
        assert!(decode_event(&unrelated, &log).is_err());
    }
}
