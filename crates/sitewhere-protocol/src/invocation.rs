//! Named-operation payloads for the custom command channel.
//!
//! A named invocation is a delimited [`CommandInvocation`] optionally
//! followed by a delimited [`Originator`]:
//!
//! ```text
//! +-------------+---------------------------+-------------+------------------+
//! | len (varint)| CommandInvocation         | len (varint)| Originator       |
//! |             | name, arguments[]         | (optional)  | event_id         |
//! +-------------+---------------------------+-------------+------------------+
//! ```
//!
//! Arguments are tagged values, so the receiver can match them against a
//! registered signature without any schema beyond the operation name.

use std::fmt;

use prost::{Message, Oneof};

use crate::envelope::{EnvelopeReader, encode_delimited};
use crate::error::{ProtocolError, ProtocolResult};

#[derive(Clone, PartialEq, Message)]
pub struct CommandInvocation {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(message, repeated, tag = "2")]
    pub arguments: Vec<Argument>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Argument {
    #[prost(oneof = "ArgumentValue", tags = "1, 2, 3, 4, 5")]
    pub value: Option<ArgumentValue>,
}

/// A single typed argument value.
#[derive(Clone, PartialEq, Oneof)]
pub enum ArgumentValue {
    #[prost(string, tag = "1")]
    Text(String),
    #[prost(sint64, tag = "2")]
    Integer(i64),
    #[prost(double, tag = "3")]
    Number(f64),
    #[prost(bool, tag = "4")]
    Flag(bool),
    #[prost(bytes = "vec", tag = "5")]
    Bytes(Vec<u8>),
}

/// Reference to the event that triggered an invocation.
#[derive(Clone, PartialEq, Message)]
pub struct Originator {
    #[prost(string, tag = "1")]
    pub event_id: String,
}

/// Type tag of an [`ArgumentValue`], used to build command signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ArgKind {
    Text,
    Integer,
    Number,
    Flag,
    Bytes,
}

impl fmt::Display for ArgKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Text => "text",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Flag => "flag",
            Self::Bytes => "bytes",
        };
        f.write_str(name)
    }
}

impl ArgumentValue {
    pub fn kind(&self) -> ArgKind {
        match self {
            Self::Text(_) => ArgKind::Text,
            Self::Integer(_) => ArgKind::Integer,
            Self::Number(_) => ArgKind::Number,
            Self::Flag(_) => ArgKind::Flag,
            Self::Bytes(_) => ArgKind::Bytes,
        }
    }
}

impl From<&str> for ArgumentValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ArgumentValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for ArgumentValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for ArgumentValue {
    fn from(value: i32) -> Self {
        Self::Integer(value.into())
    }
}

impl From<f64> for ArgumentValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<bool> for ArgumentValue {
    fn from(value: bool) -> Self {
        Self::Flag(value)
    }
}

impl From<Vec<u8>> for ArgumentValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

/// A decoded named invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub name: String,
    pub arguments: Vec<ArgumentValue>,
    pub originator: Option<String>,
}

impl Invocation {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: Vec::new(),
            originator: None,
        }
    }

    /// Appends an argument.
    pub fn arg(mut self, value: impl Into<ArgumentValue>) -> Self {
        self.arguments.push(value.into());
        self
    }

    /// Sets the originating event id.
    pub fn with_originator(mut self, event_id: impl Into<String>) -> Self {
        self.originator = Some(event_id.into());
        self
    }

    /// Argument kinds in call order.
    pub fn kinds(&self) -> Vec<ArgKind> {
        self.arguments.iter().map(ArgumentValue::kind).collect()
    }

    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        let invocation = CommandInvocation {
            name: self.name.clone(),
            arguments: self
                .arguments
                .iter()
                .cloned()
                .map(|value| Argument { value: Some(value) })
                .collect(),
        };

        let mut buf = Vec::with_capacity(invocation.encoded_len() + 32);
        encode_delimited(&invocation, &mut buf)?;
        if let Some(event_id) = &self.originator {
            encode_delimited(
                &Originator {
                    event_id: event_id.clone(),
                },
                &mut buf,
            )?;
        }
        Ok(buf)
    }

    /// Decodes an invocation, rejecting arguments without a value and any
    /// bytes after the optional originator.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        let mut reader = EnvelopeReader::new(bytes);
        let invocation: CommandInvocation = reader.read_delimited()?;
        if invocation.name.is_empty() {
            return Err(ProtocolError::invalid_field("name", "must not be empty"));
        }

        let arguments = invocation
            .arguments
            .into_iter()
            .enumerate()
            .map(|(index, argument)| {
                argument.value.ok_or_else(|| {
                    ProtocolError::invalid_field(
                        "argument",
                        format!("argument {} has no value", index),
                    )
                })
            })
            .collect::<ProtocolResult<Vec<_>>>()?;

        let originator = if reader.is_empty() {
            None
        } else {
            let originator: Originator = reader.read_delimited()?;
            Some(originator.event_id)
        };

        if !reader.is_empty() {
            return Err(ProtocolError::TrailingBytes(reader.remaining().len()));
        }

        Ok(Self {
            name: invocation.name,
            arguments,
            originator,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invocation_with_originator() {
        let call = Invocation::new("changeBackground")
            .arg("#ff0000")
            .with_originator("evt-42");
        let decoded = Invocation::decode(&call.encode().unwrap()).unwrap();
        assert_eq!(decoded, call);
        assert_eq!(decoded.kinds(), vec![ArgKind::Text]);
    }

    #[test]
    fn invocation_without_originator() {
        let call = Invocation::new("setLevels")
            .arg(-7i64)
            .arg(2.5)
            .arg(true)
            .arg(vec![0u8, 1, 2]);
        let decoded = Invocation::decode(&call.encode().unwrap()).unwrap();
        assert_eq!(decoded.originator, None);
        assert_eq!(
            decoded.kinds(),
            vec![ArgKind::Integer, ArgKind::Number, ArgKind::Flag, ArgKind::Bytes]
        );
        assert_eq!(decoded.arguments[0], ArgumentValue::Integer(-7));
    }

    #[test]
    fn missing_argument_value_rejected() {
        let invocation = CommandInvocation {
            name: "ping".into(),
            arguments: vec![Argument { value: None }],
        };
        let mut buf = Vec::new();
        encode_delimited(&invocation, &mut buf).unwrap();

        let err = Invocation::decode(&buf).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::InvalidField {
                field: "argument",
                ..
            }
        ));
    }

    #[test]
    fn trailing_bytes_rejected() {
        let mut buf = Invocation::new("ping").with_originator("e").encode().unwrap();
        buf.extend_from_slice(&[0x00, 0x00]);
        let err = Invocation::decode(&buf).unwrap_err();
        assert!(matches!(err, ProtocolError::TrailingBytes(2)));
    }

    #[test]
    fn empty_name_rejected() {
        let buf = Invocation::new("").encode().unwrap();
        assert!(Invocation::decode(&buf).is_err());
    }
}
