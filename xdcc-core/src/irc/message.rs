//! Minimal RFC 1459 line codec.
//!
//! Only the message shapes this client consumes are modeled: an optional
//! `:prefix`, a command (word or three-digit numeric), middle parameters, and
//! an optional `:trailing` parameter.

use crate::irc::IrcError;

/// A parsed IRC protocol line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Message origin (`nick!user@host` or a server name), without the `:`.
    pub prefix: Option<String>,
    /// Command word or numeric reply code, uppercased as received.
    pub command: String,
    /// All parameters, trailing last (without its `:`).
    pub params: Vec<String>,
}

impl Message {
    /// Parses one CR-LF-stripped protocol line.
    ///
    /// # Errors
    ///
    /// Returns [`IrcError::Protocol`] when the line has no command.
    pub fn parse(line: &str) -> Result<Self, IrcError> {
        let mut rest = line.trim_end_matches(['\r', '\n']);

        let prefix = if let Some(tail) = rest.strip_prefix(':') {
            let (prefix, tail) = tail
                .split_once(' ')
                .ok_or_else(|| IrcError::protocol(format!("prefix without command: {line}")))?;
            rest = tail;
            Some(prefix.to_string())
        } else {
            None
        };

        let mut params = Vec::new();
        let command = match rest.split_once(' ') {
            Some((command, tail)) => {
                let mut tail = tail;
                loop {
                    if let Some(trailing) = tail.strip_prefix(':') {
                        params.push(trailing.to_string());
                        break;
                    }
                    match tail.split_once(' ') {
                        Some((param, next)) => {
                            if !param.is_empty() {
                                params.push(param.to_string());
                            }
                            tail = next;
                        }
                        None => {
                            if !tail.is_empty() {
                                params.push(tail.to_string());
                            }
                            break;
                        }
                    }
                }
                command
            }
            None => rest,
        };

        if command.is_empty() {
            return Err(IrcError::protocol(format!("empty command: {line}")));
        }

        Ok(Self {
            prefix,
            command: command.to_string(),
            params,
        })
    }

    /// The nick part of the prefix, if the prefix is a `nick!user@host`.
    #[must_use]
    pub fn source_nick(&self) -> Option<&str> {
        let prefix = self.prefix.as_deref()?;
        Some(prefix.split('!').next().unwrap_or(prefix))
    }

    /// Last parameter, conventionally the message text.
    #[must_use]
    pub fn trailing(&self) -> Option<&str> {
        self.params.last().map(String::as_str)
    }
}
