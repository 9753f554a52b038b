//! Error types shared by the codec, the cycler and the signalling client.
//!
//! Everything here is `Copy` and carries only fixed-size data, so errors can
//! be logged and passed between tasks without `alloc`.

use core::fmt;

use crate::radio::CommandKind;

/// A tag payload could not be turned into key material.
///
/// Always recoverable: the cycler skips the tag and moves on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DecodeError {
    /// The base64 text is longer than a 38-byte payload can encode.
    TooLong(usize),
    /// The text is not valid padded base64.
    InvalidBase64,
    /// The text decoded to the wrong number of bytes.
    WrongLength(usize),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooLong(len) => write!(f, "payload text too long ({len} chars)"),
            Self::InvalidBase64 => f.write_str("payload is not valid base64"),
            Self::WrongLength(len) => write!(f, "payload decoded to {len} bytes, expected 38"),
        }
    }
}

/// The radio diverged from the cycler's model of it.
///
/// Treated as fatal: `Cycler::run` returns it and the firmware resets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RadioError {
    /// The driver refused to accept the command.
    Rejected(CommandKind),
    /// The command was accepted but its completion reported a failure status.
    Failed { command: CommandKind, status: u8 },
    /// A completion arrived for a command other than the one in flight.
    OutOfSequence {
        expected: CommandKind,
        received: CommandKind,
    },
}

impl fmt::Display for RadioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected(command) => write!(f, "driver rejected {command:?}"),
            Self::Failed { command, status } => {
                write!(f, "{command:?} completed with status 0x{status:02x}")
            }
            Self::OutOfSequence { expected, received } => {
                write!(f, "expected completion of {expected:?}, got {received:?}")
            }
        }
    }
}

/// A poll of the signalling endpoint produced no usable tag list.
///
/// The downloader logs it and leaves the current store untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FetchError {
    /// DNS lookup failed or returned no IPv4 address.
    Dns,
    /// TCP connect, write or read failed or timed out.
    Network,
    /// The request line did not fit the request buffer.
    RequestTooLong,
    /// The response is not an HTTP/1.x response with a body.
    MalformedResponse,
    /// The server answered with a non-2xx status.
    HttpStatus(u16),
    /// The response filled the receive buffer before the connection closed.
    ResponseTooLarge,
    /// The body is not a JSON array of tag objects.
    Parse,
    /// The server sent more tags than the store can hold.
    TooManyTags,
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dns => f.write_str("DNS lookup failed"),
            Self::Network => f.write_str("network error"),
            Self::RequestTooLong => f.write_str("request does not fit the buffer"),
            Self::MalformedResponse => f.write_str("malformed HTTP response"),
            Self::HttpStatus(code) => write!(f, "HTTP status {code}"),
            Self::ResponseTooLarge => f.write_str("response exceeds the receive buffer"),
            Self::Parse => f.write_str("response body is not a tag list"),
            Self::TooManyTags => f.write_str("response holds more tags than the store"),
        }
    }
}

/// Build-time configuration that does not describe a usable endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Only plain `http://` URLs are supported.
    UnsupportedScheme,
    /// The URL has no host part.
    MissingHost,
    /// The port is not a number in `1..=65535`.
    InvalidPort,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedScheme => f.write_str("endpoint URL must start with http://"),
            Self::MissingHost => f.write_str("endpoint URL has no host"),
            Self::InvalidPort => f.write_str("endpoint URL has an invalid port"),
        }
    }
}
