//! Token dumps and log statistics printed by the CLI.

use std::collections::BTreeMap;
use std::io::Write;

use serde::Serialize;
use serde_json::json;
use tracing::warn;

use crate::error::Result;
use crate::reader::{ByteSource, TokenReader};
use crate::token::{Token, TokenKind};
use crate::value::LogSchema;

/// Print one line per token and return the number of tokens.
///
/// With `json`, each line is a JSON object, and logged data carries its
/// decoded value tree when the schema allows it.
///
/// # Errors
///
/// Returns the first error of the reader or of `out`.
pub fn dump<S, W>(reader: &mut TokenReader<S>, out: &mut W, json: bool) -> Result<u64>
where
    S: ByteSource,
    W: Write,
{
    let mut schema = LogSchema::new();
    let mut count = 0;
    loop {
        let offset = reader.offset();
        let Some(token) = reader.read_token()? else {
            break;
        };
        schema.observe(&token);
        count += 1;
        if json {
            let line = json_line(&mut schema, offset, &token);
            writeln!(out, "{}", serde_json::to_string(&line)?)?;
        } else {
            writeln!(
                out,
                "{offset:>10}  {:<18} {:<16} {token}",
                token.kind().to_string(),
                token.section().to_string()
            )?;
        }
    }
    report_trailing(reader);
    Ok(count)
}

fn json_line(schema: &mut LogSchema, offset: u64, token: &Token) -> serde_json::Value {
    let mut line = json!({
        "offset": offset,
        "kind": token.kind(),
        "section": token.section(),
        "summary": token.to_string(),
    });
    if let Token::LoggedData(data) = token {
        line["message"] = json!(schema.message_name(data.msg_id));
        match schema.decode(data) {
            Ok(value) => line["value"] = json!(value),
            Err(err) => line["error"] = json!(err.to_string()),
        }
    }
    line
}

fn report_trailing<S: ByteSource>(reader: &TokenReader<S>) {
    let trailing = reader.source().available();
    if trailing > 0 {
        warn!(
            "{} trailing bytes at offset {} do not form a complete token",
            trailing,
            reader.offset()
        );
    }
}

/// Token counts of one log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LogStats {
    /// Header version.
    pub version: Option<u8>,
    /// Header timestamp in microseconds.
    pub timestamp: Option<u64>,
    /// Tokens read, synthetic synchronization tokens included.
    pub tokens: u64,
    /// Tokens per kind.
    pub by_kind: BTreeMap<TokenKind, u64>,
    /// Bytes consumed.
    pub bytes_read: u64,
    /// Bytes dropped while resynchronizing.
    pub skipped_bytes: u64,
    /// Completed resynchronizations.
    pub resyncs: u64,
    /// Bytes left over that did not form a token.
    pub trailing_bytes: usize,
}

impl LogStats {
    /// Read `reader` to the end and count what it yields.
    ///
    /// # Errors
    ///
    /// Returns the first error of the reader.
    pub fn collect<S: ByteSource>(reader: &mut TokenReader<S>) -> Result<Self> {
        let mut stats = Self::default();
        while let Some(token) = reader.read_token()? {
            if let Token::FileHeader(header) = &token {
                stats.version = Some(header.version);
                stats.timestamp = Some(header.timestamp);
            }
            stats.tokens += 1;
            *stats.by_kind.entry(token.kind()).or_default() += 1;
        }
        report_trailing(reader);
        stats.bytes_read = reader.offset();
        stats.skipped_bytes = reader.skipped_bytes();
        stats.resyncs = reader.resync_count();
        stats.trailing_bytes = reader.source().available();
        Ok(stats)
    }

    /// Count of one kind.
    #[must_use]
    pub fn count(&self, kind: TokenKind) -> u64 {
        self.by_kind.get(&kind).copied().unwrap_or(0)
    }

    /// Print a plain-text report.
    ///
    /// # Errors
    ///
    /// Returns an error if `out` fails.
    pub fn write_text<W: Write>(&self, out: &mut W) -> Result<()> {
        writeln!(out, "Log Statistics")?;
        writeln!(out, "==============")?;
        if let Some(version) = self.version {
            writeln!(out, "  Version:          {version}")?;
        }
        if let Some(timestamp) = self.timestamp {
            writeln!(out, "  Timestamp (us):   {timestamp}")?;
        }
        writeln!(out, "  Tokens:           {}", self.tokens)?;
        writeln!(out, "  Bytes read:       {}", self.bytes_read)?;
        writeln!(out, "  Resyncs:          {}", self.resyncs)?;
        writeln!(out, "  Skipped bytes:    {}", self.skipped_bytes)?;
        writeln!(out, "  Trailing bytes:   {}", self.trailing_bytes)?;
        writeln!(out)?;
        writeln!(out, "[Tokens by kind]")?;
        for (kind, count) in &self.by_kind {
            writeln!(out, "  {:<20}{count}", kind.to_string())?;
        }
        Ok(())
    }
}
