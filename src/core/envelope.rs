//! Issuer Envelope
//!
//! Decoding of identity endpoint responses. Feishu answers either with
//! `{code, msg, data: {...}}` or with the token fields flattened next to
//! `code` and `msg`.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};

use super::transport::HttpResponse;
use crate::error::{AuthError, AuthResult, ProtocolError};

/// Raw issuer response envelope.
#[derive(Debug, Deserialize)]
pub struct IssuerEnvelope {
    /// Zero on success. Absent is treated as success.
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

impl IssuerEnvelope {
    /// The payload object: `data` when it is a non-empty object, the flat fields otherwise.
    pub fn into_payload(self) -> Value {
        match self.data {
            Some(Value::Object(data)) if !data.is_empty() => Value::Object(data),
            _ => Value::Object(self.rest),
        }
    }
}

/// Decode an issuer response into `T`.
///
/// `reject` builds the domain error from an issuer code and message; it is used for
/// non-zero codes, error statuses without a JSON body and payloads missing fields.
pub(crate) fn decode_issuer_payload<T, F>(response: &HttpResponse, reject: F) -> AuthResult<T>
where
    T: DeserializeOwned,
    F: Fn(i64, String) -> AuthError,
{
    let envelope: IssuerEnvelope = match serde_json::from_str(&response.body) {
        Ok(envelope) => envelope,
        Err(e) if response.is_success() => {
            return Err(AuthError::Protocol(ProtocolError::InvalidJson {
                message: e.to_string(),
            }))
        }
        Err(_) => {
            return Err(reject(
                response.status as i64,
                format!("HTTP {} {}", response.status, response.status_text)
                    .trim_end()
                    .to_string(),
            ))
        }
    };

    if envelope.code != 0 {
        let message = if envelope.msg.is_empty() {
            format!("issuer returned code {}", envelope.code)
        } else {
            envelope.msg
        };
        return Err(reject(envelope.code, message));
    }

    serde_json::from_value(envelope.into_payload())
        .map_err(|e| reject(0, format!("malformed response: {}", e)))
}
