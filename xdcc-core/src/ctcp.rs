//! CTCP codec for the XDCC convention.
//!
//! Requests are plain PRIVMSG bodies (`xdcc send #<slot>`); responses arrive
//! as CTCP payloads delimited by `\x01`. The only response carrying data is
//! `DCC SEND`, which advertises the peer address (an IPv4 address encoded as
//! a base-10 unsigned 32-bit integer), port, and file size.

use std::fmt;
use std::net::Ipv4Addr;

use thiserror::Error;

/// Delimiter wrapping CTCP payloads inside PRIVMSG text.
pub const CTCP_DELIMITER: char = '\x01';

/// Number of arguments a DCC SEND payload must carry.
const SEND_ARGS: usize = 4;

/// Errors from parsing a CTCP payload.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CtcpError {
    /// The payload's command token is not one we understand.
    #[error("unknown CTCP command: {command}")]
    UnknownCommand {
        /// The unrecognized command token.
        command: String,
    },

    /// The payload named a known command but its arguments are unusable.
    #[error("malformed CTCP payload: {reason}")]
    Malformed {
        /// What was wrong with the arguments.
        reason: String,
    },
}

impl CtcpError {
    fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }
}

/// The XDCC SEND request for one slot.
///
/// Rendered exactly as the bots expect it: `xdcc send #<slot>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendRequest {
    pub slot: u32,
}

impl fmt::Display for SendRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "xdcc send #{}", self.slot)
    }
}

/// A parsed DCC SEND offer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DccOffer {
    /// File name as advertised by the peer. Untrusted input; callers must
    /// reduce it to a bare basename before touching the filesystem.
    pub file_name: String,
    /// Peer address, decoded from the big-endian u32 on the wire.
    pub peer_ip: Ipv4Addr,
    /// Peer data port (1-65535).
    pub peer_port: u16,
    /// Advertised file size in bytes.
    pub file_size: u64,
}

/// A recognized CTCP payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CtcpMessage {
    /// A DCC SEND offer.
    Send(DccOffer),
    /// A VERSION probe; acknowledged as a no-op.
    Version,
}

impl CtcpMessage {
    /// Parses a CTCP payload, with or without its `\x01` delimiters.
    ///
    /// # Errors
    ///
    /// [`CtcpError::UnknownCommand`] for an unrecognized command token,
    /// [`CtcpError::Malformed`] for a known command with a bad argument list.
    pub fn parse(payload: &str) -> Result<Self, CtcpError> {
        let text = payload.trim_matches(CTCP_DELIMITER).trim();

        let (command, args) = match text.split_once(char::is_whitespace) {
            Some((command, args)) => (command, args.trim_start()),
            None => (text, ""),
        };

        match command {
            "SEND" => parse_send(args).map(Self::Send),
            "DCC" => {
                // Some bots send the full "DCC SEND ..." form.
                match args.split_once(char::is_whitespace) {
                    Some(("SEND", rest)) => parse_send(rest.trim_start()).map(Self::Send),
                    _ => Err(CtcpError::UnknownCommand {
                        command: format!("DCC {}", args.split_whitespace().next().unwrap_or("")),
                    }),
                }
            }
            "VERSION" => Ok(Self::Version),
            other => Err(CtcpError::UnknownCommand {
                command: other.to_string(),
            }),
        }
    }
}

/// Decodes a big-endian u32 into dotted-quad IPv4.
#[must_use]
pub fn decode_ipv4(n: u32) -> Ipv4Addr {
    Ipv4Addr::from(n.to_be_bytes())
}

fn parse_send(args: &str) -> Result<DccOffer, CtcpError> {
    let (file_name, rest) = split_file_name(args)?;

    let fields: Vec<&str> = rest.split_whitespace().collect();
    if fields.len() != SEND_ARGS - 1 {
        return Err(CtcpError::malformed(format!(
            "expected {SEND_ARGS} arguments, got {}",
            fields.len() + 1
        )));
    }

    let ip_u32: u32 = fields[0]
        .parse()
        .map_err(|_| CtcpError::malformed(format!("bad address: {}", fields[0])))?;
    let peer_port: u16 = fields[1]
        .parse()
        .map_err(|_| CtcpError::malformed(format!("bad port: {}", fields[1])))?;
    if peer_port == 0 {
        return Err(CtcpError::malformed("port must be non-zero"));
    }
    let file_size: u64 = fields[2]
        .parse()
        .map_err(|_| CtcpError::malformed(format!("bad file size: {}", fields[2])))?;

    Ok(DccOffer {
        file_name,
        peer_ip: decode_ipv4(ip_u32),
        peer_port,
        file_size,
    })
}

/// Splits the file-name argument off a SEND argument list.
///
/// Names are a single whitespace-free token, optionally wrapped in double
/// quotes (in which case they may contain spaces).
fn split_file_name(args: &str) -> Result<(String, &str), CtcpError> {
    if let Some(quoted) = args.strip_prefix('"') {
        let end = quoted
            .find('"')
            .ok_or_else(|| CtcpError::malformed("unterminated quoted file name"))?;
        return Ok((quoted[..end].to_string(), &quoted[end + 1..]));
    }

    match args.split_once(char::is_whitespace) {
        Some((name, rest)) if !name.is_empty() => Ok((name.to_string(), rest)),
        _ => Err(CtcpError::malformed("missing file name")),
    }
}
