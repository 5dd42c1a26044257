//! Envelope type and the streaming JSON codec used on every connection.
//!
//! Each envelope is written as one JSON object in a single write and read back with a
//! `serde_json` stream deserializer, which stops at the closing brace so the next
//! envelope on the same connection is left untouched. Objects delimit themselves, so no
//! separator is written; a trailing byte left unread would turn the peer's close into a
//! reset and could discard a reply still in flight.
use std::io::{self, Read, Write};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum_macros::{Display, EnumString};

use crate::error::ServiceError;
use crate::result::Result;

/// Envelope kinds and their wire names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
pub enum MessageType {
    /// Client → broker: register this connection under `topic`.
    #[serde(rename = "SUBSCRIBE")]
    #[strum(serialize = "SUBSCRIBE")]
    Subscribe,
    /// Client → broker: broadcast `payload` to `topic`.
    #[serde(rename = "PUBLISH")]
    #[strum(serialize = "PUBLISH")]
    Publish,
    /// Client → service: ask for the current quote.
    #[serde(rename = "REQ_QUOTE")]
    #[strum(serialize = "REQ_QUOTE")]
    RequestQuote,
    /// Client → service: ask for transaction history.
    #[serde(rename = "REQ_HIST")]
    #[strum(serialize = "REQ_HIST")]
    RequestHistory,
    /// Service → client: payload is a `Quote`.
    #[serde(rename = "RESP_QUOTE")]
    #[strum(serialize = "RESP_QUOTE")]
    RespQuote,
    /// Service → client: payload is a sequence of `Transaction`.
    #[serde(rename = "RESP_HIST")]
    #[strum(serialize = "RESP_HIST")]
    RespHistory,
    /// Service → client: payload is a human-readable message.
    #[serde(rename = "ERROR")]
    #[strum(serialize = "ERROR")]
    Error,
}

/// One self-describing message on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Message kind.
    #[serde(rename = "type")]
    pub kind: MessageType,
    /// Topic, present for `SUBSCRIBE` and `PUBLISH`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    /// Embedded value whose schema depends on `kind`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl Envelope {
    /// Creates an envelope without topic or payload (requests).
    pub fn new(kind: MessageType) -> Self {
        Envelope {
            kind,
            topic: None,
            payload: None,
        }
    }

    /// Creates an envelope carrying `data` encoded as its payload.
    pub fn with_payload<T: Serialize>(kind: MessageType, data: &T) -> Result<Self> {
        Ok(Envelope {
            kind,
            topic: None,
            payload: Some(serde_json::to_value(data)?),
        })
    }

    /// Creates a `SUBSCRIBE` envelope for `topic`.
    pub fn subscribe(topic: &str) -> Self {
        Envelope {
            kind: MessageType::Subscribe,
            topic: Some(topic.to_string()),
            payload: None,
        }
    }

    /// Creates a `PUBLISH` envelope for `topic`.
    pub fn publish(topic: &str, payload: Value) -> Self {
        Envelope {
            kind: MessageType::Publish,
            topic: Some(topic.to_string()),
            payload: Some(payload),
        }
    }

    /// Creates an `ERROR` envelope carrying `message`.
    pub fn error(message: impl Into<String>) -> Self {
        Envelope {
            kind: MessageType::Error,
            topic: None,
            payload: Some(Value::String(message.into())),
        }
    }

    /// Decodes the payload into `T`. A missing payload decodes as JSON `null`.
    pub fn decode_payload<T: DeserializeOwned>(&self) -> Result<T> {
        let value = self.payload.clone().unwrap_or(Value::Null);
        Ok(serde_json::from_value(value)?)
    }

    /// Checks that this envelope is a reply of type `expected`.
    ///
    /// An `ERROR` reply becomes `ServiceError::Remote` with the carried message.
    pub fn expect(self, expected: MessageType) -> Result<Self> {
        if self.kind == MessageType::Error {
            let message = match &self.payload {
                Some(Value::String(text)) => text.clone(),
                Some(other) => other.to_string(),
                None => String::from("unknown error"),
            };
            return Err(ServiceError::Remote(message));
        }
        if self.kind != expected {
            return Err(ServiceError::UnexpectedMessage {
                expected: expected.to_string(),
                got: self.kind.to_string(),
            });
        }
        Ok(self)
    }
}

/// Encodes `value` as one JSON frame.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

/// Writes `value` as one JSON frame and flushes.
pub fn write_json<W: Write, T: Serialize>(mut writer: W, value: &T) -> Result<()> {
    let buf = encode(value)?;
    writer.write_all(&buf)?;
    writer.flush()?;
    Ok(())
}

/// Reads exactly one JSON value from `reader`.
///
/// End of stream before a value maps to `ConnectionClosed`, transport failures to `Io`,
/// and anything that is not valid JSON for `T` to `MalformedPayload`.
pub fn read_json<R: Read, T: DeserializeOwned>(reader: R) -> Result<T> {
    let mut stream = serde_json::Deserializer::from_reader(reader).into_iter::<T>();
    match stream.next() {
        None => Err(ServiceError::ConnectionClosed),
        Some(Ok(value)) => Ok(value),
        Some(Err(e)) if e.is_eof() => Err(ServiceError::ConnectionClosed),
        Some(Err(e)) if e.is_io() => Err(ServiceError::Io(io::Error::from(e))),
        Some(Err(e)) => Err(ServiceError::MalformedPayload(e)),
    }
}

/// Sends one envelope.
pub fn send<W: Write>(writer: W, envelope: &Envelope) -> Result<()> {
    write_json(writer, envelope)
}

/// Receives one envelope.
pub fn receive<R: Read>(reader: R) -> Result<Envelope> {
    read_json(reader)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Quote, Transaction};
    use chrono::Utc;
    use std::io::Cursor;

    fn all_kinds() -> Vec<Envelope> {
        let quote = Quote::now("PETR4", 23.40);
        let history = vec![Transaction {
            id: "Shard-A-0".into(),
            symbol: "PETR4".into(),
            price: 20.0,
            quantity: 100,
            timestamp: Utc::now(),
        }];
        vec![
            Envelope::subscribe("PETR4"),
            Envelope::publish("PETR4", serde_json::to_value(&quote).unwrap()),
            Envelope::new(MessageType::RequestQuote),
            Envelope::new(MessageType::RequestHistory),
            Envelope::with_payload(MessageType::RespQuote, &quote).unwrap(),
            Envelope::with_payload(MessageType::RespHistory, &history).unwrap(),
            Envelope::error("upstream unavailable"),
        ]
    }

    #[test]
    fn every_kind_survives_a_stream() {
        let sent = all_kinds();
        let mut wire = Vec::new();
        for envelope in &sent {
            send(&mut wire, envelope).unwrap();
        }

        let mut reader = Cursor::new(wire);
        for expected in &sent {
            let got = receive(&mut reader).unwrap();
            assert_eq!(&got, expected);
        }
        assert!(matches!(receive(&mut reader), Err(ServiceError::ConnectionClosed)));
    }

    #[test]
    fn wire_names_match_protocol() {
        let json = serde_json::to_string(&Envelope::new(MessageType::RequestHistory)).unwrap();
        assert_eq!(json, r#"{"type":"REQ_HIST"}"#);
        assert_eq!("RESP_QUOTE".parse::<MessageType>().unwrap(), MessageType::RespQuote);
    }

    #[test]
    fn garbage_is_malformed() {
        let mut reader = Cursor::new(b"THIS IS NOT JSON\n".to_vec());
        let err = receive(&mut reader).unwrap_err();
        assert!(matches!(err, ServiceError::MalformedPayload(_)), "got {err:?}");
    }

    #[test]
    fn truncated_envelope_is_closed_connection() {
        let mut reader = Cursor::new(br#"{"type":"PUBL"#.to_vec());
        assert!(matches!(receive(&mut reader), Err(ServiceError::ConnectionClosed)));
    }

    #[test]
    fn error_reply_becomes_remote() {
        let err = Envelope::error("circuit breaker is OPEN")
            .expect(MessageType::RespQuote)
            .unwrap_err();
        assert_eq!(err.to_string(), "circuit breaker is OPEN");
    }

    #[test]
    fn wrong_reply_kind_is_rejected() {
        let err = Envelope::new(MessageType::RequestQuote)
            .expect(MessageType::RespHistory)
            .unwrap_err();
        assert!(matches!(err, ServiceError::UnexpectedMessage { .. }));
    }
}
