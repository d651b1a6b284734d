//! Session-level log writing.

use std::collections::HashMap;
use std::io::Write;

use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use tracing::debug;

use super::TokenWriter;
use crate::config::WriterOptions;
use crate::error::{Error, Result};
use crate::token::{
    DefaultParameter, DefaultTypes, Dropout, FileHeader, FlagBits, Format, Information, KeyValue,
    LogLevel, LoggedData, LoggedString, Parameter, ParameterValue, Subscription, Token, TokenKind,
};
use crate::value::ValueNode;

/// Writes a log in terms of message names instead of message ids.
///
/// Subscriptions get increasing message ids, keyed by message name and
/// instance id.
#[derive(Debug)]
pub struct LogRecorder<W> {
    writer: TokenWriter<W>,
    subscriptions: HashMap<(String, u8), u16>,
    next_msg_id: u16,
}

impl<W: Write> LogRecorder<W> {
    /// Start a log stamped with `timestamp`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the header cannot be written.
    pub fn start(inner: W, timestamp: DateTime<Utc>, options: WriterOptions) -> Result<Self> {
        let mut header = FileHeader::from_datetime(timestamp);
        header.version = options.header_version;

        let mut writer = TokenWriter::with_options(inner, options);
        writer.write_header(header, FlagBits::default())?;
        debug!("Started log at {}", timestamp);
        Ok(Self {
            writer,
            subscriptions: HashMap::new(),
            next_msg_id: 0,
        })
    }

    /// Start a log stamped with the current time.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the header cannot be written.
    pub fn start_now(inner: W, options: WriterOptions) -> Result<Self> {
        Self::start(inner, Utc::now(), options)
    }

    /// Define a message format.
    ///
    /// # Errors
    ///
    /// Fails once data has been written.
    pub fn define_format(&mut self, format: Format) -> Result<()> {
        self.writer.append(&format.into())
    }

    /// Define the default value of a parameter.
    ///
    /// # Errors
    ///
    /// Fails for an invalid name.
    pub fn define_default_parameter(
        &mut self,
        name: &str,
        value: ParameterValue,
        default_types: DefaultTypes,
    ) -> Result<()> {
        let token = DefaultParameter::new(name, value, default_types)?;
        self.writer.append(&token.into())
    }

    /// Write the current value of a parameter.
    ///
    /// # Errors
    ///
    /// Fails for an invalid name.
    pub fn write_parameter(&mut self, name: &str, value: ParameterValue) -> Result<()> {
        self.writer.append(&Parameter::new(name, value)?.into())
    }

    /// Write a string information entry.
    ///
    /// # Errors
    ///
    /// Fails for an invalid name.
    pub fn write_information(&mut self, name: &str, value: &str) -> Result<()> {
        let entry = KeyValue::string(name, value)?;
        self.writer.append(&Information { entry }.into())
    }

    /// Subscribe to a message instance and return its message id.
    ///
    /// Subscribing again to the same instance returns the existing id
    /// without writing anything.
    ///
    /// # Errors
    ///
    /// Fails for an invalid message name or when all ids are taken.
    pub fn subscribe(&mut self, message_name: &str, multi_id: u8) -> Result<u16> {
        let key = (message_name.to_string(), multi_id);
        if let Some(&msg_id) = self.subscriptions.get(&key) {
            return Ok(msg_id);
        }
        let msg_id = self.next_msg_id;
        let next = msg_id.checked_add(1).ok_or_else(|| {
            Error::malformed(TokenKind::Subscription, "all message ids are in use")
        })?;
        let token = Subscription::new(msg_id, message_name, multi_id)?;
        self.writer.append(&token.into())?;
        self.next_msg_id = next;
        self.subscriptions.insert(key, msg_id);
        debug!(
            "Subscribed '{}' instance {} as msg_id {}",
            message_name, multi_id, msg_id
        );
        Ok(msg_id)
    }

    /// The message id of a subscribed instance.
    #[must_use]
    pub fn message_id(&self, message_name: &str, multi_id: u8) -> Option<u16> {
        self.subscriptions
            .get(&(message_name.to_string(), multi_id))
            .copied()
    }

    /// Write a serialized message instance.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownSubscription`] if the instance was never
    /// subscribed.
    pub fn write_data(
        &mut self,
        message_name: &str,
        multi_id: u8,
        data: impl Into<Bytes>,
    ) -> Result<()> {
        let msg_id =
            self.message_id(message_name, multi_id)
                .ok_or_else(|| Error::UnknownSubscription {
                    message_name: message_name.to_string(),
                    multi_id,
                })?;
        self.writer.append(&LoggedData::new(msg_id, data).into())
    }

    /// Serialize a value tree and write it as a message instance.
    ///
    /// # Errors
    ///
    /// See [`LogRecorder::write_data`].
    pub fn write_value(&mut self, message_name: &str, multi_id: u8, value: &ValueNode) -> Result<()> {
        let mut buf = BytesMut::with_capacity(value.byte_size());
        value.encode(&mut buf);
        self.write_data(message_name, multi_id, buf.freeze())
    }

    /// Write a log message.
    ///
    /// # Errors
    ///
    /// Returns an I/O error of the sink.
    pub fn write_logged_string(
        &mut self,
        level: LogLevel,
        timestamp: u64,
        message: impl Into<Bytes>,
    ) -> Result<()> {
        let token = LoggedString::new(level, timestamp, message);
        self.writer.append(&token.into())
    }

    /// Record that messages were lost for `duration_ms`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error of the sink.
    pub fn write_dropout(&mut self, duration_ms: u16) -> Result<()> {
        self.writer.append(&Dropout { duration_ms }.into())
    }

    /// Append any other token.
    ///
    /// # Errors
    ///
    /// See [`TokenWriter::append`].
    pub fn append(&mut self, token: &Token) -> Result<()> {
        self.writer.append(token)
    }

    /// Flush the sink.
    ///
    /// # Errors
    ///
    /// Returns an error if the sink fails to flush.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()
    }

    /// The underlying token writer.
    pub fn writer(&self) -> &TokenWriter<W> {
        &self.writer
    }

    /// Unwrap the sink.
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}
