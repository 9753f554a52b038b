//! Periodic download of the tag list from the signalling endpoint.

use airtag_relay::config::{DOWNLOAD_INTERVAL_MS, ENDPOINT_URL, HTTP_BUFFER_SIZE};
use airtag_relay::signalling::{self, Endpoint, QueryOptions, REQUEST_LEN};
use airtag_relay::FetchError;
use defmt::{info, warn};
use embassy_net::dns::DnsQueryType;
use embassy_net::tcp::TcpSocket;
use embassy_net::Stack;
use embassy_time::{with_timeout, Duration, Timer};
use heapless::String;

use crate::{fatal, Fatal, RelayStore};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const SOCKET_TIMEOUT: Duration = Duration::from_secs(10);

#[embassy_executor::task]
pub async fn downloader_task(stack: Stack<'static>, store: &'static RelayStore) {
    let endpoint = match Endpoint::parse(ENDPOINT_URL) {
        Ok(endpoint) => endpoint,
        Err(err) => fatal(Fatal::Endpoint(err)),
    };
    let request = match signalling::build_request(&endpoint, &QueryOptions::from_build_config()) {
        Ok(request) => request,
        Err(err) => fatal(Fatal::Request(err)),
    };
    info!(
        "downloader: polling {}:{}{} every {} ms",
        endpoint.host, endpoint.port, endpoint.path, DOWNLOAD_INTERVAL_MS
    );

    let mut rx_buf = [0u8; 1024];
    let mut tx_buf = [0u8; REQUEST_LEN];
    let mut response = [0u8; HTTP_BUFFER_SIZE];

    loop {
        let result = poll(
            stack,
            &endpoint,
            &request,
            &mut rx_buf,
            &mut tx_buf,
            &mut response,
            store,
        )
        .await;
        match result {
            Ok(count) => info!("downloader: {} tags stored", count),
            // Keep advertising whatever we had.
            Err(err) => warn!("downloader: poll failed: {}", err),
        }
        Timer::after_millis(DOWNLOAD_INTERVAL_MS as u64).await;
    }
}

async fn poll(
    stack: Stack<'static>,
    endpoint: &Endpoint<'_>,
    request: &String<REQUEST_LEN>,
    rx_buf: &mut [u8],
    tx_buf: &mut [u8],
    response: &mut [u8],
    store: &RelayStore,
) -> Result<usize, FetchError> {
    let addrs = stack
        .dns_query(endpoint.host, DnsQueryType::A)
        .await
        .map_err(|_| FetchError::Dns)?;
    let addr = *addrs.first().ok_or(FetchError::Dns)?;

    let mut socket = TcpSocket::new(stack, rx_buf, tx_buf);
    socket.set_timeout(Some(SOCKET_TIMEOUT));
    with_timeout(CONNECT_TIMEOUT, socket.connect((addr, endpoint.port)))
        .await
        .map_err(|_| FetchError::Network)?
        .map_err(|_| FetchError::Network)?;

    let result = signalling::refresh(&mut socket, request.as_bytes(), response, store).await;
    socket.close();
    result
}
