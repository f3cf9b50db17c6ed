//! WRP message types and wire formats

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::codec::CodecError;

/// Wire format used by encoders and decoders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(try_from = "String", into = "String")]
pub enum Format {
    /// Binary MessagePack encoding
    #[default]
    Msgpack,
    /// Text JSON encoding
    Json,
}

impl Format {
    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Msgpack => "msgpack",
            Format::Json => "json",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Format {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "msgpack" => Ok(Format::Msgpack),
            "json" => Ok(Format::Json),
            _ => Err(CodecError::UnknownFormat(s.to_string())),
        }
    }
}

impl TryFrom<String> for Format {
    type Error = CodecError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Format> for String {
    fn from(format: Format) -> Self {
        format.as_str().to_string()
    }
}

/// WRP message type, carried on the wire as its numeric code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(try_from = "u8", into = "u8")]
pub enum MessageType {
    Auth,
    SimpleRequestResponse,
    #[default]
    SimpleEvent,
    Create,
    Retrieve,
    Update,
    Delete,
    ServiceRegistration,
    ServiceAlive,
    Unknown,
}

impl MessageType {
    pub fn code(&self) -> u8 {
        match self {
            MessageType::Auth => 2,
            MessageType::SimpleRequestResponse => 3,
            MessageType::SimpleEvent => 4,
            MessageType::Create => 5,
            MessageType::Retrieve => 6,
            MessageType::Update => 7,
            MessageType::Delete => 8,
            MessageType::ServiceRegistration => 9,
            MessageType::ServiceAlive => 10,
            MessageType::Unknown => 11,
        }
    }
}

impl TryFrom<u8> for MessageType {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            2 => Ok(MessageType::Auth),
            3 => Ok(MessageType::SimpleRequestResponse),
            4 => Ok(MessageType::SimpleEvent),
            5 => Ok(MessageType::Create),
            6 => Ok(MessageType::Retrieve),
            7 => Ok(MessageType::Update),
            8 => Ok(MessageType::Delete),
            9 => Ok(MessageType::ServiceRegistration),
            10 => Ok(MessageType::ServiceAlive),
            11 => Ok(MessageType::Unknown),
            other => Err(format!("invalid message type: {}", other)),
        }
    }
}

impl From<MessageType> for u8 {
    fn from(message_type: MessageType) -> Self {
        message_type.code()
    }
}

/// A WRP message
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "msg_type", default)]
    pub message_type: MessageType,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source: String,
    #[serde(rename = "dest", default, skip_serializing_if = "String::is_empty")]
    pub destination: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty", with = "payload")]
    pub payload: Vec<u8>,
}

impl Message {
    /// Create a simple event from `source` to `destination`
    pub fn simple_event(
        source: impl Into<String>,
        destination: impl Into<String>,
        payload: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            message_type: MessageType::SimpleEvent,
            source: source.into(),
            destination: destination.into(),
            payload: payload.into(),
            ..Self::default()
        }
    }

    pub fn with_transaction_uuid(mut self, transaction_uuid: impl Into<String>) -> Self {
        self.transaction_uuid = Some(transaction_uuid.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_header(mut self, header: impl Into<String>) -> Self {
        self.headers.push(header.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Payload bytes: raw `bin` for binary formats, base64 text for human readable ones
mod payload {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::de::{self, SeqAccess, Visitor};
    use serde::{Deserialize, Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if serializer.is_human_readable() {
            serializer.serialize_str(&STANDARD.encode(bytes))
        } else {
            serializer.serialize_bytes(bytes)
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        if deserializer.is_human_readable() {
            let encoded = String::deserialize(deserializer)?;
            STANDARD.decode(encoded).map_err(de::Error::custom)
        } else {
            deserializer.deserialize_byte_buf(BytesVisitor)
        }
    }

    struct BytesVisitor;

    impl<'de> Visitor<'de> for BytesVisitor {
        type Value = Vec<u8>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a byte array")
        }

        fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
            Ok(v.to_vec())
        }

        fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<Self::Value, E> {
            Ok(v)
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            Ok(v.as_bytes().to_vec())
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
        where
            A: SeqAccess<'de>,
        {
            let mut bytes = Vec::with_capacity(seq.size_hint().unwrap_or(0));
            while let Some(byte) = seq.next_element::<u8>()? {
                bytes.push(byte);
            }
            Ok(bytes)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_parse() {
        assert_eq!("msgpack".parse::<Format>().unwrap(), Format::Msgpack);
        assert_eq!("JSON".parse::<Format>().unwrap(), Format::Json);

        let err = "xml".parse::<Format>().unwrap_err();
        assert!(matches!(err, CodecError::UnknownFormat(ref tag) if tag == "xml"));
    }

    #[test]
    fn test_format_display() {
        assert_eq!(Format::Msgpack.to_string(), "msgpack");
        assert_eq!(Format::Json.to_string(), "json");
    }

    #[test]
    fn test_message_type_codes() {
        assert_eq!(MessageType::SimpleEvent.code(), 4);
        assert_eq!(MessageType::try_from(3), Ok(MessageType::SimpleRequestResponse));
        assert!(MessageType::try_from(1).is_err());
        assert!(MessageType::try_from(12).is_err());
    }

    #[test]
    fn test_message_json_shape() {
        let message = Message::simple_event("mac:112233445566", "event:device-status", "hi");
        let value = serde_json::to_value(&message).unwrap();

        assert_eq!(value["msg_type"], 4);
        assert_eq!(value["source"], "mac:112233445566");
        assert_eq!(value["dest"], "event:device-status");
        assert_eq!(value["payload"], "aGk=");
        assert!(value.get("transaction_uuid").is_none());
        assert!(value.get("headers").is_none());
    }

    #[test]
    fn test_message_rejects_invalid_type() {
        let result = serde_json::from_str::<Message>(r#"{"msg_type": 99}"#);
        assert!(result.is_err());
    }
}
