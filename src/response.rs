use serde::ser::{Serialize, SerializeStruct, Serializer};

use crate::error::ClientError;

/// Uniform outcome of every asynchronous client operation.
///
/// Exactly one of value or error is present, so the success flag can never
/// disagree with the payload. A response is immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Response<T> {
    outcome: Result<T, ClientError>,
}

impl<T> Response<T> {
    pub fn success(value: T) -> Self {
        Self { outcome: Ok(value) }
    }

    pub fn failure(error: ClientError) -> Self {
        Self {
            outcome: Err(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn value(&self) -> Option<&T> {
        self.outcome.as_ref().ok()
    }

    pub fn error(&self) -> Option<&ClientError> {
        self.outcome.as_ref().err()
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Response<U> {
        Response {
            outcome: self.outcome.map(f),
        }
    }

    pub fn into_result(self) -> Result<T, ClientError> {
        self.outcome
    }
}

impl<T> From<Result<T, ClientError>> for Response<T> {
    fn from(outcome: Result<T, ClientError>) -> Self {
        Self { outcome }
    }
}

impl<T: Serialize> Serialize for Response<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Response", 3)?;
        state.serialize_field("success", &self.is_success())?;
        state.serialize_field("value", &self.value())?;
        state.serialize_field(
            "error",
            &self.error().map(|e| {
                serde_json::json!({
                    "kind": e.kind(),
                    "message": e.to_string(),
                })
            }),
        )?;
        state.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_and_failure_are_exclusive() {
        let ok: Response<u64> = Response::success(7);
        assert!(ok.is_success());
        assert_eq!(ok.value(), Some(&7));
        assert!(ok.error().is_none());

        let failed: Response<u64> = Response::failure(ClientError::ExecutorClosed);
        assert!(!failed.is_success());
        assert!(failed.value().is_none());
        assert_eq!(failed.error(), Some(&ClientError::ExecutorClosed));
    }

    #[test]
    fn test_serialized_shape() {
        let ok = Response::success("0xabc".to_string());
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["value"], "0xabc");
        assert!(json["error"].is_null());

        let failed: Response<String> =
            Response::failure(ClientError::remote("eth_sendRawTransaction", "nonce too low"));
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["success"], false);
        assert!(json["value"].is_null());
        assert_eq!(json["error"]["kind"], "remote_call");
    }
}
