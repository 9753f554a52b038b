//! End-to-end: signalling response -> tag store -> cycler -> radio commands.

use core::convert::Infallible;

use airtag_relay::config::CyclerConfig;
use airtag_relay::findmy::Beacon;
use airtag_relay::radio::AdvParams;
use airtag_relay::signalling::{self, Endpoint, QueryOptions};
use airtag_relay::{
    ChannelRadio, CommandKind, Completion, CompletionSignal, CycleState, Cycler, FetchError,
    RadioCommand, RadioError, TagStore,
};
use embassy_futures::block_on;
use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_time::Duration;
use embedded_hal_async::delay::DelayNs;

type Store = TagStore<CriticalSectionRawMutex, 10>;

const TAG_ASCENDING: &str = "AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8gISIjJCU=";
const TAG_ONES: &str = "//////////////////////////////////////////////////8=";

/// Response as produced by the signalling server for `?valid=true&num=10`.
fn server_response(status: &str) -> Vec<u8> {
    let body = format!(
        r#"[{{"data": "{TAG_ASCENDING}", "id": 1, "valid": true, "valid_for": "0:10:00", "valid_from": "2024-05-01T10:00:00", "valid_to": "2024-05-01T10:10:00"}}, {{"data": "{TAG_ONES}", "id": 2, "valid": false, "valid_for": "0:00:00", "valid_from": "2024-05-01T09:00:00", "valid_to": "2024-05-01T09:00:00"}}]"#
    );
    format!(
        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}",
        body.len()
    )
    .into_bytes()
}

struct Socket {
    response: Vec<u8>,
    pos: usize,
    request: Vec<u8>,
}

impl Socket {
    fn new(response: Vec<u8>) -> Self {
        Self {
            response,
            pos: 0,
            request: Vec::new(),
        }
    }
}

impl embedded_io_async::ErrorType for Socket {
    type Error = Infallible;
}

impl embedded_io_async::Read for Socket {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Infallible> {
        let n = buf.len().min(64).min(self.response.len() - self.pos);
        buf[..n].copy_from_slice(&self.response[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

impl embedded_io_async::Write for Socket {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Infallible> {
        self.request.extend_from_slice(buf);
        Ok(buf.len())
    }
}

/// Every delay elapses at once.
struct Instant;

impl DelayNs for Instant {
    async fn delay_ns(&mut self, _ns: u32) {}
}

fn download(store: &Store, status: &str) -> Result<usize, FetchError> {
    let endpoint = Endpoint::parse("http://10.0.0.2:5000/api/v1/airtag/").unwrap();
    let query = QueryOptions {
        valid_only: true,
        num: 10,
        rotate: false,
    };
    let request = signalling::build_request(&endpoint, &query).unwrap();
    let mut socket = Socket::new(server_response(status));
    let mut buf = [0u8; 2048];
    let result = block_on(signalling::refresh(
        &mut socket,
        request.as_bytes(),
        &mut buf,
        store,
    ));
    assert!(socket
        .request
        .starts_with(b"GET /api/v1/airtag/?valid=true&num=10&offset=false HTTP/1.1\r\n"));
    result
}

/// Drive the cycler against a channel-fed driver until `limit` commands have
/// been executed. `status` picks the HCI status for each command.
fn relay(
    store: &Store,
    limit: usize,
    status: impl Fn(&RadioCommand) -> u8,
) -> (Vec<RadioCommand>, Option<RadioError>) {
    let commands: Channel<CriticalSectionRawMutex, RadioCommand, 1> = Channel::new();
    let completion: CompletionSignal<CriticalSectionRawMutex> = CompletionSignal::new();
    let mut log = Vec::new();

    let mut cycler = Cycler::new(
        store,
        &completion,
        ChannelRadio::new(&commands),
        Instant,
        CyclerConfig {
            adv_params: AdvParams::from_interval_ms(100),
            dwell: Duration::from_millis(2_000),
            idle_poll: Duration::from_millis(1_000),
            completion_timeout: None,
        },
    );

    let driver = async {
        while log.len() < limit {
            let command = commands.receive().await;
            completion.signal(Completion::failure(command.kind(), status(&command)));
            log.push(command);
        }
    };

    let fatal = match block_on(select(cycler.run(), driver)) {
        Either::First(err) => Some(err),
        Either::Second(()) => None,
    };
    (log, fatal)
}

#[test]
fn downloaded_tags_are_advertised_in_turn() {
    let store = Store::new(10);
    assert_eq!(download(&store, "200 OK"), Ok(2));

    let (log, fatal) = relay(&store, 8, |_| 0);
    assert_eq!(fatal, None);

    let first = Beacon::from_text(TAG_ASCENDING).unwrap();
    let second = Beacon::from_text(TAG_ONES).unwrap();
    assert_eq!(first.address, [0xc5, 0x04, 0x03, 0x02, 0x01, 0x00]);

    let start = RadioCommand::StartAdvertising(AdvParams::from_interval_ms(100));
    assert_eq!(
        log,
        [
            RadioCommand::SetAddress(first.address),
            RadioCommand::SetPayload(first.payload),
            start,
            RadioCommand::StopAdvertising,
            RadioCommand::SetAddress(second.address),
            RadioCommand::SetPayload(second.payload),
            start,
            RadioCommand::StopAdvertising,
        ]
    );
}

#[test]
fn failed_download_keeps_advertising_previous_tags() {
    let store = Store::new(10);
    assert_eq!(download(&store, "200 OK"), Ok(2));
    assert_eq!(
        download(&store, "500 INTERNAL SERVER ERROR"),
        Err(FetchError::HttpStatus(500))
    );
    assert_eq!(store.count(), 2);

    let (log, fatal) = relay(&store, 4, |_| 0);
    assert_eq!(fatal, None);
    assert_eq!(log[0].kind(), CommandKind::SetAddress);
    assert_eq!(log.len(), 4);
}

#[test]
fn controller_error_stops_the_relay() {
    let store = Store::new(10);
    assert_eq!(download(&store, "200 OK"), Ok(2));

    // Command disallowed (0x0c) on the first advertising enable.
    let (log, fatal) = relay(&store, 16, |command| match command {
        RadioCommand::StartAdvertising(_) => 0x0c,
        _ => 0,
    });

    assert_eq!(
        fatal,
        Some(RadioError::Failed {
            command: CommandKind::StartAdvertising,
            status: 0x0c,
        })
    );
    assert_eq!(log.len(), 3);
}

#[test]
fn empty_server_list_leaves_radio_idle() {
    let store = Store::new(10);
    let completion: CompletionSignal<CriticalSectionRawMutex> = CompletionSignal::new();
    let commands: Channel<CriticalSectionRawMutex, RadioCommand, 1> = Channel::new();
    let mut cycler = Cycler::new(
        &store,
        &completion,
        ChannelRadio::new(&commands),
        Instant,
        CyclerConfig::default(),
    );

    for _ in 0..50 {
        assert_eq!(block_on(cycler.step()), Ok(CycleState::Idle));
    }
    assert!(commands.try_receive().is_err());
}
