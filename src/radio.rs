//! Command/completion contract between the cycler and the BLE radio driver.
//!
//! The cycler submits one [`RadioCommand`] at a time and then waits on a
//! shared `Signal` until the driver posts the matching [`Completion`]. The
//! controller does not accept pipelined GAP commands, so there is never more
//! than one command in flight.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;

use crate::error::RadioError;
use crate::findmy::{AdvertisementPayload, BleAddress};

/// Advertising on channels 37, 38 and 39.
pub const CHANNEL_MAP_ALL: u8 = 0x07;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OwnAddressType {
    Public,
    Random,
}

/// Parameters for legacy non-connectable advertising.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AdvParams {
    /// Units of 0.625ms.
    pub interval_min: u16,
    /// Units of 0.625ms.
    pub interval_max: u16,
    pub channel_map: u8,
    pub own_address_type: OwnAddressType,
}

impl AdvParams {
    /// Fixed advertising interval, advertised from the static random address.
    pub const fn from_interval_ms(interval_ms: u32) -> Self {
        let units = interval_to_units(interval_ms);
        Self {
            interval_min: units,
            interval_max: units,
            channel_map: CHANNEL_MAP_ALL,
            own_address_type: OwnAddressType::Random,
        }
    }
}

/// Convert milliseconds to 0.625ms advertising units, clamped to the range the
/// controller accepts (20ms .. 10.24s).
pub const fn interval_to_units(interval_ms: u32) -> u16 {
    const MIN_UNITS: u32 = 0x0020;
    const MAX_UNITS: u32 = 0x4000;

    let units = interval_ms.saturating_mul(8) / 5;
    if units < MIN_UNITS {
        MIN_UNITS as u16
    } else if units > MAX_UNITS {
        MAX_UNITS as u16
    } else {
        units as u16
    }
}

/// HCI carries device addresses least significant byte first; `BleAddress`
/// is kept in display order.
pub fn hci_address_bytes(address: &BleAddress) -> [u8; 6] {
    let mut bytes = *address;
    bytes.reverse();
    bytes
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RadioCommand {
    SetAddress(BleAddress),
    SetPayload(AdvertisementPayload),
    StartAdvertising(AdvParams),
    StopAdvertising,
}

impl RadioCommand {
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::SetAddress(_) => CommandKind::SetAddress,
            Self::SetPayload(_) => CommandKind::SetPayload,
            Self::StartAdvertising(_) => CommandKind::StartAdvertising,
            Self::StopAdvertising => CommandKind::StopAdvertising,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommandKind {
    SetAddress,
    SetPayload,
    StartAdvertising,
    StopAdvertising,
}

/// Posted by the driver once per command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Completion {
    pub command: CommandKind,
    /// HCI status code, `0` on success.
    pub status: u8,
}

impl Completion {
    pub const fn success(command: CommandKind) -> Self {
        Self { command, status: 0 }
    }

    pub const fn failure(command: CommandKind, status: u8) -> Self {
        Self { command, status }
    }

    /// Check this completion against the command the cycler is waiting for.
    pub fn expect(self, expected: CommandKind) -> Result<(), RadioError> {
        if self.command != expected {
            return Err(RadioError::OutOfSequence {
                expected,
                received: self.command,
            });
        }
        if self.status != 0 {
            return Err(RadioError::Failed {
                command: self.command,
                status: self.status,
            });
        }
        Ok(())
    }
}

/// Completion handshake shared between the driver and the cycler.
pub type CompletionSignal<M> = Signal<M, Completion>;

/// Accepts GAP commands for asynchronous execution.
///
/// `submit` only queues the command. The outcome arrives later as a
/// [`Completion`] on the signal the driver was set up with.
pub trait RadioDriver {
    fn submit(&mut self, command: RadioCommand) -> Result<(), RadioError>;
}

impl<T: RadioDriver + ?Sized> RadioDriver for &mut T {
    fn submit(&mut self, command: RadioCommand) -> Result<(), RadioError> {
        T::submit(self, command)
    }
}

/// Hands commands to a driver task through a one-slot channel.
pub struct ChannelRadio<'a, M: RawMutex> {
    commands: &'a Channel<M, RadioCommand, 1>,
}

impl<'a, M: RawMutex> ChannelRadio<'a, M> {
    pub const fn new(commands: &'a Channel<M, RadioCommand, 1>) -> Self {
        Self { commands }
    }
}

impl<M: RawMutex> RadioDriver for ChannelRadio<'_, M> {
    fn submit(&mut self, command: RadioCommand) -> Result<(), RadioError> {
        // A full slot means the driver never consumed the previous command.
        self.commands
            .try_send(command)
            .map_err(|_| RadioError::Rejected(command.kind()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

    #[test]
    fn test_interval_to_units() {
        assert_eq!(interval_to_units(100), 160);
        assert_eq!(interval_to_units(20), 32);
        assert_eq!(interval_to_units(2000), 3200);
        // Clamped
        assert_eq!(interval_to_units(0), 0x20);
        assert_eq!(interval_to_units(60_000), 0x4000);
    }

    #[test]
    fn test_adv_params() {
        let params = AdvParams::from_interval_ms(100);
        assert_eq!(params.interval_min, 160);
        assert_eq!(params.interval_max, 160);
        assert_eq!(params.channel_map, CHANNEL_MAP_ALL);
        assert_eq!(params.own_address_type, OwnAddressType::Random);
    }

    #[test]
    fn test_hci_address_bytes() {
        let address = [0xc5, 0x04, 0x03, 0x02, 0x01, 0x00];
        assert_eq!(
            hci_address_bytes(&address),
            [0x00, 0x01, 0x02, 0x03, 0x04, 0xc5]
        );
    }

    #[test]
    fn test_completion_expect() {
        let done = Completion::success(CommandKind::SetPayload);
        assert_eq!(done.expect(CommandKind::SetPayload), Ok(()));
        assert_eq!(
            done.expect(CommandKind::SetAddress),
            Err(RadioError::OutOfSequence {
                expected: CommandKind::SetAddress,
                received: CommandKind::SetPayload,
            })
        );

        let failed = Completion::failure(CommandKind::StartAdvertising, 0x0c);
        assert_eq!(
            failed.expect(CommandKind::StartAdvertising),
            Err(RadioError::Failed {
                command: CommandKind::StartAdvertising,
                status: 0x0c,
            })
        );
    }

    #[test]
    fn test_channel_radio_holds_one_command() {
        let commands: Channel<CriticalSectionRawMutex, RadioCommand, 1> = Channel::new();
        let mut radio = ChannelRadio::new(&commands);

        assert_eq!(radio.submit(RadioCommand::StopAdvertising), Ok(()));
        assert_eq!(
            radio.submit(RadioCommand::SetAddress([0xc0, 0, 0, 0, 0, 0])),
            Err(RadioError::Rejected(CommandKind::SetAddress))
        );

        assert!(matches!(
            commands.try_receive(),
            Ok(RadioCommand::StopAdvertising)
        ));
        assert_eq!(radio.submit(RadioCommand::StopAdvertising), Ok(()));
    }
}
