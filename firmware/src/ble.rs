//! HCI side of the radio contract.
//!
//! The cycler hands GAP commands over `RADIO_COMMANDS`; this task runs each
//! one on the CYW43 Bluetooth core and posts the outcome on
//! `RADIO_COMPLETION`. The trouble-host runner owns the HCI transport and
//! resolves command-complete events, so `Stack::command` returns only after
//! the controller has answered.

use airtag_relay::radio::{
    hci_address_bytes, AdvParams, Completion, CompletionSignal, OwnAddressType,
    RadioCommand,
};
use bt_hci::cmd::le::{LeSetAdvData, LeSetAdvEnable, LeSetAdvParams, LeSetRandomAddr};
use bt_hci::param::{AddrKind, AdvChannelMap, AdvFilterPolicy, AdvKind, BdAddr};
use cyw43::bluetooth::BtDriver;
use defmt::{debug, error, warn, Debug2Format};
use embassy_executor::task;
use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use trouble_host::prelude::*;

use crate::Fatal;

pub type BleController = ExternalController<BtDriver<'static>, 10>;

/// HCI "Unspecified Error". The host layer does not hand back the
/// controller's own status code.
const STATUS_UNSPECIFIED: u8 = 0x1f;

#[task]
pub async fn ble_task(
    controller: BleController,
    commands: &'static Channel<CriticalSectionRawMutex, RadioCommand, 1>,
    completion: &'static CompletionSignal<CriticalSectionRawMutex>,
) {
    let mut resources: HostResources<DefaultPacketPool, 1, 1> = HostResources::new();
    let stack = trouble_host::new(controller, &mut resources);
    let Host { mut runner, .. } = stack.build();

    // Not gated on the runner's controller setup (reset + event masks). The
    // first command arrives only once the store holds tags, which takes a
    // WiFi join, a DHCP lease and a finished download, and setup is over by
    // then. Anything that submits commands earlier must wait for it.
    let driver = async {
        loop {
            let command = commands.receive().await;
            let kind = command.kind();
            let done = match execute(&stack, command).await {
                Ok(()) => Completion::success(kind),
                Err(status) => Completion::failure(kind, status),
            };
            debug!("ble: {} -> status {}", kind, done.status);
            completion.signal(done);
        }
    };

    match select(runner.run(), driver).await {
        Either::First(Err(err)) => {
            error!("ble: host runner failed: {}", Debug2Format(&err));
        }
        _ => error!("ble: host runner stopped"),
    }
    crate::fatal(Fatal::BleHost)
}

async fn execute(
    stack: &Stack<'_, BleController, DefaultPacketPool>,
    command: RadioCommand,
) -> Result<(), u8> {
    let kind = command.kind();
    let result = match command {
        RadioCommand::SetAddress(address) => {
            let address = BdAddr::new(hci_address_bytes(&address));
            stack.command(LeSetRandomAddr::new(address)).await
        }
        RadioCommand::SetPayload(payload) => {
            stack
                .command(LeSetAdvData::new(payload.len() as u8, payload))
                .await
        }
        RadioCommand::StartAdvertising(params) => {
            match stack.command(adv_params(&params)).await {
                Ok(()) => stack.command(LeSetAdvEnable::new(true)).await,
                Err(err) => Err(err),
            }
        }
        RadioCommand::StopAdvertising => stack.command(LeSetAdvEnable::new(false)).await,
    };

    result.map_err(|err| {
        warn!("ble: {} rejected: {}", kind, Debug2Format(&err));
        STATUS_UNSPECIFIED
    })
}

/// Non-connectable undirected advertising. `channel_map` is not forwarded:
/// the relay always uses all three primary channels.
fn adv_params(params: &AdvParams) -> LeSetAdvParams {
    let own_addr_kind = match params.own_address_type {
        OwnAddressType::Public => AddrKind::PUBLIC,
        OwnAddressType::Random => AddrKind::RANDOM,
    };
    LeSetAdvParams::new(
        bt_hci::param::Duration::from_u16(params.interval_min),
        bt_hci::param::Duration::from_u16(params.interval_max),
        AdvKind::AdvNonconnInd,
        own_addr_kind,
        AddrKind::PUBLIC,
        BdAddr::default(),
        AdvChannelMap::ALL,
        AdvFilterPolicy::default(),
    )
}
