//! Client side of the signalling endpoint.
//!
//! One poll is a plain HTTP/1.1 `GET` with `Connection: close`:
//!
//! ```text
//! GET /api/v1/airtag/?valid=true&num=10&offset=true HTTP/1.1
//! ```
//!
//! The server answers with a JSON array of tag objects. Only `id`, `data` and
//! `valid` are read; `valid_from`, `valid_to` and `valid_for` are skipped.

use core::fmt::{self, Write as _};

use embassy_sync::blocking_mutex::raw::RawMutex;
use embedded_io_async::{Read, Write};
use heapless::{String, Vec};
use serde::de::{Deserializer, SeqAccess, Visitor};
use serde::Deserialize;

use crate::error::{ConfigError, FetchError};
use crate::store::TagStore;
use crate::tag::TagRecord;

/// Request line plus headers.
pub const REQUEST_LEN: usize = 256;

/// Where to fetch tags from, split out of an `http://host[:port]/path` URL.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Endpoint<'a> {
    pub host: &'a str,
    pub port: u16,
    pub path: &'a str,
}

impl<'a> Endpoint<'a> {
    pub fn parse(url: &'a str) -> Result<Self, ConfigError> {
        let rest = url
            .strip_prefix("http://")
            .ok_or(ConfigError::UnsupportedScheme)?;
        let (authority, path) = match rest.find('/') {
            Some(i) => rest.split_at(i),
            None => (rest, "/"),
        };
        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => {
                let port: u16 = port.parse().map_err(|_| ConfigError::InvalidPort)?;
                if port == 0 {
                    return Err(ConfigError::InvalidPort);
                }
                (host, port)
            }
            None => (authority, 80),
        };
        if host.is_empty() {
            return Err(ConfigError::MissingHost);
        }
        Ok(Self { host, port, path })
    }
}

/// Query parameters understood by the signalling server.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct QueryOptions {
    /// Only return tags whose validity window contains "now".
    pub valid_only: bool,
    /// Maximum number of tags per response.
    pub num: usize,
    /// Let the server advance through its table between requests.
    pub rotate: bool,
}

/// Render the `GET` request for one poll.
pub fn build_request(
    endpoint: &Endpoint<'_>,
    query: &QueryOptions,
) -> Result<String<REQUEST_LEN>, FetchError> {
    let mut req: String<REQUEST_LEN> = String::new();
    write!(
        req,
        "GET {}?valid={}&num={}&offset={} HTTP/1.1\r\n\
         Host: {}\r\n\
         Accept: application/json\r\n\
         Connection: close\r\n\r\n",
        endpoint.path, query.valid_only, query.num, query.rotate, endpoint.host
    )
    .map_err(|_| FetchError::RequestTooLong)?;
    Ok(req)
}

/// Status code of an `HTTP/1.x` status line.
pub fn parse_http_status(buf: &[u8]) -> Option<u16> {
    if buf.len() < 12 || !buf.starts_with(b"HTTP/1.") {
        return None;
    }
    let space = buf.iter().position(|&b| b == b' ')?;
    let digits = buf.get(space + 1..space + 4)?;
    let mut code = 0u16;
    for &d in digits {
        if !d.is_ascii_digit() {
            return None;
        }
        code = code * 10 + (d - b'0') as u16;
    }
    Some(code)
}

/// Check the status line and return the body of a complete response.
pub fn response_body(response: &[u8]) -> Result<&[u8], FetchError> {
    let code = parse_http_status(response).ok_or(FetchError::MalformedResponse)?;
    if !(200..300).contains(&code) {
        return Err(FetchError::HttpStatus(code));
    }
    let header_end = response
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .ok_or(FetchError::MalformedResponse)?;
    Ok(&response[header_end + 4..])
}

/// Parse a JSON tag list holding at most `N` records.
pub fn parse_tags<const N: usize>(body: &[u8]) -> Result<Vec<TagRecord, N>, FetchError> {
    let (list, _) =
        serde_json_core::from_slice::<TagList<N>>(body).map_err(|_| FetchError::Parse)?;
    if list.overflow {
        return Err(FetchError::TooManyTags);
    }
    Ok(list.records)
}

/// Parse a complete HTTP response into tag records.
pub fn parse_response<const N: usize>(response: &[u8]) -> Result<Vec<TagRecord, N>, FetchError> {
    parse_tags(response_body(response)?)
}

/// Send `request` over an open connection and read the response until the
/// server closes it. Returns the number of bytes stored in `buf`.
pub async fn exchange<T>(socket: &mut T, request: &[u8], buf: &mut [u8]) -> Result<usize, FetchError>
where
    T: Read + Write,
{
    socket
        .write_all(request)
        .await
        .map_err(|_| FetchError::Network)?;
    socket.flush().await.map_err(|_| FetchError::Network)?;

    let mut len = 0;
    loop {
        if len == buf.len() {
            return Err(FetchError::ResponseTooLarge);
        }
        match socket.read(&mut buf[len..]).await {
            Ok(0) => return Ok(len),
            Ok(n) => len += n,
            Err(_) => return Err(FetchError::Network),
        }
    }
}

/// Run one poll over `socket` and swap the result into `store`.
///
/// On any error the store keeps its current tags. Returns the number of tags
/// now stored.
pub async fn refresh<T, M, const N: usize>(
    socket: &mut T,
    request: &[u8],
    buf: &mut [u8],
    store: &TagStore<M, N>,
) -> Result<usize, FetchError>
where
    T: Read + Write,
    M: RawMutex,
{
    let len = exchange(socket, request, buf).await?;
    let records: Vec<TagRecord, N> = parse_response(&buf[..len])?;
    for record in records.iter() {
        info!("{}", record);
    }
    let count = records.len();
    store.replace(records)?;
    Ok(count)
}

/// Array visitor that keeps parsing past `N` records so an oversized
/// response can be told apart from a malformed one.
struct TagList<const N: usize> {
    records: Vec<TagRecord, N>,
    overflow: bool,
}

impl<'de, const N: usize> Deserialize<'de> for TagList<N> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_seq(TagListVisitor::<N>)
    }
}

struct TagListVisitor<const N: usize>;

impl<'de, const N: usize> Visitor<'de> for TagListVisitor<N> {
    type Value = TagList<N>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an array of tag objects")
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut records = Vec::new();
        let mut overflow = false;
        while let Some(record) = seq.next_element::<TagRecord>()? {
            if records.push(record).is_err() {
                overflow = true;
            }
        }
        Ok(TagList { records, overflow })
    }
}
