//! `ulog` - Decoder and encoder for ULog binary flight logs
//!
//! This library reads and writes the token stream of a ULog file: a 16-byte
//! header followed by definition and data frames. The reader recovers from
//! corrupted data sections by scanning for synchronization frames, and
//! logged data is decoded into dynamic value trees built from the formats
//! found in the log.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod reader;
pub mod token;
pub mod value;
pub mod writer;

pub use config::{Config, ReaderOptions, WriterOptions};
pub use error::{Error, Result};
pub use logging::init_logging;
pub use reader::{read_all, ReaderState, SequenceReader, StreamReader, TokenReader};
pub use token::{Section, Token, TokenKind};
pub use value::{LogSchema, ValueNode};
pub use writer::{LogRecorder, SharedTokenWriter, TokenWriter, WriterState};
