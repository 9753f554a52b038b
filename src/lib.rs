//! Core logic of the AirTag relay.
//!
//! The relay downloads offline-finding advertisement keys from a signalling
//! server and re-broadcasts them one after another over BLE, each under its
//! own random static address. Everything in this crate is hardware
//! independent and runs on the host under `cargo test`; the Pico W binary in
//! `firmware/` supplies the WiFi socket, the HCI radio driver and the clock.
//!
//! Data flow:
//!
//! ```text
//! signalling::refresh ──> TagStore ──> Cycler ──> RadioDriver ──> controller
//!                                         ^                          │
//!                                         └──── CompletionSignal ────┘
//! ```

#![cfg_attr(not(test), no_std)]

// This mod MUST go first, so that the others see its macros.
#[macro_use]
mod fmt;

pub mod config;
pub mod cycler;
pub mod error;
pub mod findmy;
pub mod radio;
pub mod signalling;
pub mod store;
pub mod tag;

pub use cycler::{CycleState, Cycler};
pub use error::{ConfigError, DecodeError, FetchError, RadioError};
pub use findmy::Beacon;
pub use radio::{ChannelRadio, CommandKind, Completion, CompletionSignal, RadioCommand, RadioDriver};
pub use store::TagStore;
pub use tag::TagRecord;
