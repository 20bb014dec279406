//! Text form of strategies.
//!
//! A line reads `seq, timestamp, user: Name("p0", "p1", ...)`. Parameters are double-quoted with
//! backslash escapes for `\`, `"` and line breaks (`\n`, `\r`), and at least two slots are always written so that old readers
//! with a fixed two-parameter grammar keep working. An encrypted line is `+` followed by the token of
//! the whole plaintext line. Blank lines and lines starting with `#` carry nothing.

use std::iter::Peekable;
use std::str::Chars;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::trace;

use crate::crypto::{Cryptograph, NoCryptograph};
use crate::error::CoreError;
use crate::strategy::{Strategy, StrategyRegistry};

pub const ENCRYPTED_PREFIX: char = '+';
pub const COMMENT_PREFIX: char = '#';
const MIN_WRITTEN_PARAMS: usize = 2;
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f%:z";

const IDENTITY_PATTERN: &str = r"[\w\-.+]+@(?:[\w-]+\.)+[\w-]{2,}";

static HEADER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"^([1-9][0-9]*), (\d{{4}}-\d{{2}}-\d{{2}}[ T]\d{{2}}:\d{{2}}:\d{{2}}(?:\.\d+)?(?:[+-]\d{{2}}:\d{{2}}|Z)), ({IDENTITY_PATTERN}): ([A-Za-z]+)\((.*)\)$"
    ))
    .expect("valid strategy line regex")
});

static IDENTITY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!("^{IDENTITY_PATTERN}$")).expect("valid identity regex"));

/// Whether `user` can stand as the acting user of a line, i.e. looks like an email address.
pub fn is_identity(user: &str) -> bool {
    IDENTITY_RE.is_match(user)
}

/// The canonical plaintext line of `strategy`, never encrypted.
pub fn plaintext(strategy: &Strategy) -> String {
    let mut params: Vec<String> = strategy.params().iter().map(|p| quote(p)).collect();
    while params.len() < MIN_WRITTEN_PARAMS {
        params.push(quote(""));
    }
    format!(
        "{}, {}, {}: {}({})",
        strategy.seq(),
        strategy.when().format(TIMESTAMP_FORMAT),
        strategy.user(),
        strategy.kind().name(),
        params.join(", ")
    )
}

fn quote(raw: &str) -> String {
    let mut quoted = String::with_capacity(raw.len() + 2);
    quoted.push('"');
    for c in raw.chars() {
        match c {
            '\\' => quoted.push_str("\\\\"),
            '"' => quoted.push_str("\\\""),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            other => quoted.push(other),
        }
    }
    quoted.push('"');
    quoted
}

/// Scans `"a", "b\"c"` into its unescaped parameters.
fn parse_params(body: &str) -> Result<Vec<String>, CoreError> {
    let mut params = Vec::new();
    let mut chars = body.chars().peekable();

    skip_spaces(&mut chars);
    if chars.peek().is_none() {
        return Ok(params);
    }
    loop {
        skip_spaces(&mut chars);
        if chars.next() != Some('"') {
            return Err(CoreError::Decode(format!("expected a quoted parameter in ({body})")));
        }
        let mut param = String::new();
        loop {
            match chars.next() {
                Some('\\') => match chars.next() {
                    Some('n') => param.push('\n'),
                    Some('r') => param.push('\r'),
                    Some(escaped) => param.push(escaped),
                    None => return Err(CoreError::Decode(format!("dangling escape in ({body})"))),
                },
                Some('"') => break,
                Some(c) => param.push(c),
                None => return Err(CoreError::Decode(format!("unterminated parameter in ({body})"))),
            }
        }
        params.push(param);
        skip_spaces(&mut chars);
        match chars.next() {
            None => return Ok(params),
            Some(',') => continue,
            Some(other) => {
                return Err(CoreError::Decode(format!(
                    "unexpected {other:?} after parameter in ({body})"
                )));
            }
        }
    }
}

fn skip_spaces(chars: &mut Peekable<Chars<'_>>) {
    while chars.next_if(|c| c.is_whitespace()).is_some() {}
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, CoreError> {
    DateTime::parse_from_rfc3339(&raw.replacen(' ', "T", 1))
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| CoreError::Decode(format!("bad timestamp {raw:?}: {e}")))
}

/// Encodes and decodes strategies against a registry of known names, encrypting through `crypto`.
#[derive(Clone)]
pub struct Codec {
    registry: Arc<StrategyRegistry>,
    crypto: Arc<dyn Cryptograph>,
}

impl Codec {
    pub fn new(registry: Arc<StrategyRegistry>, crypto: Arc<dyn Cryptograph>) -> Self {
        Self { registry, crypto }
    }

    /// A codec that never encrypts.
    pub fn plain(registry: Arc<StrategyRegistry>) -> Self {
        Self::new(registry, Arc::new(NoCryptograph))
    }

    /// The same registry without encryption, for plaintext copies of an encrypted log.
    pub fn without_encryption(&self) -> Self {
        Self::plain(Arc::clone(&self.registry))
    }

    pub fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    pub fn crypto(&self) -> &Arc<dyn Cryptograph> {
        &self.crypto
    }

    pub fn encode(&self, strategy: &Strategy) -> Result<String, CoreError> {
        let line = plaintext(strategy);
        if strategy.encryptable() && self.crypto.is_enabled()? {
            Ok(format!("{ENCRYPTED_PREFIX}{}", self.crypto.encrypt(&line)?))
        } else {
            Ok(line)
        }
    }

    /// `Ok(None)` for blank and comment lines.
    pub fn decode(&self, line: &str) -> Result<Option<Strategy>, CoreError> {
        let line = line.trim();
        if line.is_empty() || line.starts_with(COMMENT_PREFIX) {
            trace!(line, "skipping blank or comment line");
            return Ok(None);
        }
        let decrypted;
        let line = match line.strip_prefix(ENCRYPTED_PREFIX) {
            Some(token) => {
                decrypted = self.crypto.decrypt(token)?;
                decrypted.trim()
            }
            None => line,
        };

        let caps = HEADER_RE
            .captures(line)
            .ok_or_else(|| CoreError::Decode(format!("malformed line: {line}")))?;
        let seq: u64 = caps[1]
            .parse()
            .map_err(|e| CoreError::Decode(format!("bad sequence {:?}: {e}", &caps[1])))?;
        let when = parse_timestamp(&caps[2])?;
        let kind = self.registry.resolve(&caps[4])?;
        let params = parse_params(&caps[5])?;
        let strategy = Strategy::new(seq, when, &caps[3], kind, params)
            .map_err(|e| CoreError::Decode(format!("{e} in line: {line}")))?;
        Ok(Some(strategy))
    }
}
