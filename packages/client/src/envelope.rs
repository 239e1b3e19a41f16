//! Response envelope decoding.
//!
//! Every xbus response is wrapped as `{ok, error?, result?}`. The wire shape
//! is decoded into [`RawEnvelope`] and then folded into a [`Reply`], which
//! only admits the legal combinations:
//!
//! | status | ok    | error   | result  | outcome                    |
//! |--------|-------|---------|---------|----------------------------|
//! | non-2xx| any   | any     | any     | `Error::Status`            |
//! | 2xx    | false | some    | any     | `Reply::Failure`           |
//! | 2xx    | false | none    | any     | `Reply::Failure(UNKNOWN)`  |
//! | 2xx    | true  | some    | any     | `Error::Protocol`          |
//! | 2xx    | true  | none    | none    | `Error::Protocol` if a result is required |
//! | 2xx    | true  | none    | some    | `Reply::Success`           |

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{Error, Result, ServerError};
use crate::types::Response;

const UNKNOWN_ERROR_CODE: &str = "UNKNOWN";

/// The envelope exactly as it appears on the wire.
#[derive(Debug, Deserialize)]
pub struct RawEnvelope<T> {
    pub ok: bool,
    #[serde(default)]
    pub error: Option<ServerError>,
    #[serde(default = "Option::default")]
    pub result: Option<T>,
}

/// A decoded envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply<T> {
    Success(T),
    Failure(ServerError),
}

impl<T> Reply<T> {
    /// Turn a failure into `Error::Domain`.
    pub fn into_result(self) -> Result<T> {
        match self {
            Reply::Success(value) => Ok(value),
            Reply::Failure(error) => Err(Error::Domain(error)),
        }
    }
}

impl<T> RawEnvelope<T> {
    fn into_reply(self, result_required: bool) -> Result<Reply<Option<T>>> {
        match (self.ok, self.error) {
            (false, Some(error)) => Ok(Reply::Failure(error)),
            (false, None) => Ok(Reply::Failure(ServerError::new(
                UNKNOWN_ERROR_CODE,
                "server reported failure without an error",
            ))),
            (true, Some(error)) => Err(Error::protocol(format!(
                "envelope is ok but carries an error ({})",
                error
            ))),
            (true, None) => {
                if result_required && self.result.is_none() {
                    return Err(Error::protocol("envelope is ok but has no result"));
                }
                Ok(Reply::Success(self.result))
            }
        }
    }
}

fn check_status(response: &Response) -> Result<()> {
    if response.is_success() {
        Ok(())
    } else {
        Err(Error::Status {
            status: response.status,
            body: response.body.clone(),
        })
    }
}

fn parse<T: DeserializeOwned>(response: &Response) -> Result<RawEnvelope<T>> {
    serde_json::from_str(&response.body).map_err(|e| {
        log::warn!("undecodable envelope: {}", e);
        Error::protocol(format!("malformed envelope: {}", e))
    })
}

/// Decode a response whose call declares a result payload.
pub fn decode<T: DeserializeOwned>(response: &Response) -> Result<Reply<T>> {
    check_status(response)?;
    match parse::<T>(response)?.into_reply(true)? {
        Reply::Success(Some(value)) => Ok(Reply::Success(value)),
        Reply::Success(None) => Err(Error::protocol("envelope is ok but has no result")),
        Reply::Failure(error) => Ok(Reply::Failure(error)),
    }
}

/// Decode a response whose result may legitimately be missing or `null`.
///
/// Watches use this: the server answers an expired long-poll with an empty
/// result.
pub fn decode_optional<T: DeserializeOwned>(response: &Response) -> Result<Reply<Option<T>>> {
    check_status(response)?;
    parse::<T>(response)?.into_reply(false)
}

/// Decode a response for a call that has no result. Any payload is ignored.
pub fn decode_empty(response: &Response) -> Result<Reply<()>> {
    check_status(response)?;
    match parse::<serde::de::IgnoredAny>(response)?.into_reply(false)? {
        Reply::Success(_) => Ok(Reply::Success(())),
        Reply::Failure(error) => Ok(Reply::Failure(error)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Payload {
        revision: i64,
    }

    fn ok(body: &str) -> Response {
        Response::new(200, body)
    }

    #[test]
    fn success_with_result() {
        let reply = decode::<Payload>(&ok(r#"{"ok":true,"result":{"revision":4}}"#)).unwrap();
        assert_eq!(reply, Reply::Success(Payload { revision: 4 }));
    }

    #[test]
    fn failure_carries_server_error() {
        let reply = decode::<Payload>(&ok(
            r#"{"ok":false,"error":{"code":"NOT_FOUND","message":"no such key"}}"#,
        ))
        .unwrap();
        assert_eq!(
            reply,
            Reply::Failure(ServerError::new("NOT_FOUND", "no such key"))
        );
        assert!(reply.into_result().unwrap_err().is_not_found());
    }

    #[test]
    fn failure_without_error_object_is_unknown() {
        let reply = decode_empty(&ok(r#"{"ok":false}"#)).unwrap();
        match reply {
            Reply::Failure(e) => assert_eq!(e.code, "UNKNOWN"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn ok_without_result_is_protocol_error() {
        let err = decode::<Payload>(&ok(r#"{"ok":true}"#)).unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));

        let err = decode::<Payload>(&ok(r#"{"ok":true,"result":null}"#)).unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));
    }

    #[test]
    fn ok_with_error_is_protocol_error() {
        let err = decode_empty(&ok(
            r#"{"ok":true,"error":{"code":"SYSTEM_ERROR","message":"?"}}"#,
        ))
        .unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));
    }

    #[test]
    fn non_success_status_keeps_raw_body() {
        let err = decode_empty(&Response::new(502, "upstream down")).unwrap_err();
        match err {
            Error::Status { status, body } => {
                assert_eq!(status, 502);
                assert_eq!(body, "upstream down");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn garbage_body_is_protocol_error() {
        let err = decode_empty(&ok("<html>")).unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));
    }

    #[test]
    fn empty_call_ignores_result() {
        let reply = decode_empty(&ok(r#"{"ok":true,"result":{"revision":9}}"#)).unwrap();
        assert_eq!(reply, Reply::Success(()));
    }

    #[test]
    fn optional_result_may_be_null() {
        let reply = decode_optional::<Payload>(&ok(r#"{"ok":true,"result":null}"#)).unwrap();
        assert_eq!(reply, Reply::Success(None));
    }

    #[test]
    fn malformed_result_is_protocol_error() {
        let err = decode::<Payload>(&ok(r#"{"ok":true,"result":{"revision":"x"}}"#)).unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));
    }
}
