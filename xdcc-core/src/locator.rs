//! IRC file locators: parsing and rendering of `irc://` URLs.
//!
//! A locator addresses one numbered file slot offered by a bot in a channel
//! on an IRC network: `irc://<network>/<channel>/<bot>/<slot>`. The channel
//! `#` prefix is optional on input and always present on the parsed value and
//! in rendered output.

use std::fmt;

use thiserror::Error;

/// Number of path segments expected after the `irc://` scheme.
const LOCATOR_FIELDS: usize = 4;

/// Error for malformed `irc://` URLs.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LocatorError {
    /// The input is not a well-formed `irc://network/channel/bot/slot` URL.
    #[error("invalid IRC url: {input}")]
    InvalidUrl {
        /// The rejected input string.
        input: String,
    },
}

impl LocatorError {
    fn invalid(input: impl Into<String>) -> Self {
        Self::InvalidUrl {
            input: input.into(),
        }
    }
}

/// An immutable address of one downloadable file slot.
///
/// Equality and hashing cover all four fields; the locator doubles as the
/// deduplication key for search results.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileLocator {
    /// IRC network host, optionally `host:port`.
    pub network: String,
    /// Channel name, always `#`-prefixed.
    pub channel: String,
    /// Nick of the bot serving the file.
    pub user_name: String,
    /// Slot index in the bot's offer list.
    pub slot: u32,
}

/// The bot a locator points at, without the slot.
///
/// Used as the aggregation key when scheduling transfers so that requests to
/// the same bot are serialized on one IRC presence.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BotIdentity {
    pub network: String,
    pub channel: String,
    pub user_name: String,
}

impl FileLocator {
    /// Parses an `irc://<network>/<channel>/<bot>/<slot>` URL.
    ///
    /// The slot may carry a leading `#` (stripped before numeric parsing).
    /// A channel without a `#` prefix is normalized to `#<channel>`.
    ///
    /// # Errors
    ///
    /// Returns [`LocatorError::InvalidUrl`] on a wrong scheme, a segment
    /// count other than four, an empty segment, or a non-numeric slot.
    pub fn parse(input: &str) -> Result<Self, LocatorError> {
        let rest = input
            .strip_prefix("irc://")
            .ok_or_else(|| LocatorError::invalid(input))?;

        let fields: Vec<&str> = rest.split('/').collect();
        if fields.len() != LOCATOR_FIELDS || fields.iter().any(|f| f.is_empty()) {
            return Err(LocatorError::invalid(input));
        }

        let slot = parse_slot(fields[3]).ok_or_else(|| LocatorError::invalid(input))?;

        let channel = if fields[1].starts_with('#') {
            fields[1].to_string()
        } else {
            format!("#{}", fields[1])
        };

        Ok(Self {
            network: fields[0].to_string(),
            channel,
            user_name: fields[2].to_string(),
            slot,
        })
    }

    /// The bot identity this locator addresses.
    #[must_use]
    pub fn bot(&self) -> BotIdentity {
        BotIdentity {
            network: self.network.clone(),
            channel: self.channel.clone(),
            user_name: self.user_name.clone(),
        }
    }

    /// Network host without any `:port` suffix.
    #[must_use]
    pub fn host(&self) -> &str {
        self.network.split(':').next().unwrap_or(&self.network)
    }
}

fn parse_slot(field: &str) -> Option<u32> {
    field.strip_prefix('#').unwrap_or(field).parse().ok()
}

impl fmt::Display for FileLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "irc://{}/{}/{}/{}",
            self.network, self.channel, self.user_name, self.slot
        )
    }
}
