//! Advertisement cycler: rotates through the tag store and walks the radio
//! through address, payload, start, dwell and stop for each tag.
//!
//! ```text
//! Idle ──(tags present)──> SelectTag ──> SetAddress ──> SetPayload
//!   ^                         │  ^                           │
//!   └──────(store empty)──────┘  │                           v
//!                                └── StopAdvertising <── Advertising
//! ```
//!
//! Every radio command is followed by a wait on the completion signal, so
//! commands never overlap. A command whose completion times out is still
//! waited for before the next one is submitted. The tag store is only locked inside
//! `TagStore::snapshot`/`with_exclusive_access`, never across a wait.

use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::Duration;
use embedded_hal_async::delay::DelayNs;

use crate::config::CyclerConfig;
use crate::error::RadioError;
use crate::findmy::Beacon;
use crate::radio::{CommandKind, Completion, CompletionSignal, RadioCommand, RadioDriver};
use crate::store::TagStore;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CycleState {
    /// Nothing to advertise; re-check the store every idle-poll interval.
    Idle,
    SelectTag,
    SetAddress,
    SetPayload,
    /// Start advertising and hold it for the dwell time.
    Advertising,
    StopAdvertising,
}

/// The tag currently being put on air.
#[derive(Clone, Copy, Debug)]
struct OnAir {
    id: u32,
    beacon: Beacon,
}

pub struct Cycler<'a, M, R, D, const N: usize>
where
    M: RawMutex,
    R: RadioDriver,
    D: DelayNs,
{
    store: &'a TagStore<M, N>,
    completion: &'a CompletionSignal<M>,
    radio: R,
    delay: D,
    config: CyclerConfig,
    state: CycleState,
    index: usize,
    on_air: Option<OnAir>,
    /// Consecutive tags that failed to decode.
    skipped: usize,
    /// Timed-out command whose completion has not arrived yet.
    abandoned: Option<CommandKind>,
}

impl<'a, M, R, D, const N: usize> Cycler<'a, M, R, D, N>
where
    M: RawMutex,
    R: RadioDriver,
    D: DelayNs,
{
    pub fn new(
        store: &'a TagStore<M, N>,
        completion: &'a CompletionSignal<M>,
        radio: R,
        delay: D,
        config: CyclerConfig,
    ) -> Self {
        Self {
            store,
            completion,
            radio,
            delay,
            config,
            state: CycleState::Idle,
            index: 0,
            on_air: None,
            skipped: 0,
            abandoned: None,
        }
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    /// Position of the next (or current) tag in the store.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Cycle until the radio fails. Only returns on a fatal error.
    pub async fn run(&mut self) -> RadioError {
        loop {
            if let Err(err) = self.step().await {
                error!("cycler: radio failure in {}: {}", self.state, err);
                return err;
            }
        }
    }

    /// Perform the action of the current state and move to the next one.
    pub async fn step(&mut self) -> Result<CycleState, RadioError> {
        let next = match self.state {
            CycleState::Idle => self.idle().await,
            CycleState::SelectTag => self.select_tag().await,
            CycleState::SetAddress => match self.on_air {
                Some(tag) => {
                    let command = RadioCommand::SetAddress(tag.beacon.address);
                    if self.command(command).await? {
                        CycleState::SetPayload
                    } else {
                        self.skip_tag()
                    }
                }
                None => CycleState::SelectTag,
            },
            CycleState::SetPayload => match self.on_air {
                Some(tag) => {
                    let command = RadioCommand::SetPayload(tag.beacon.payload);
                    if self.command(command).await? {
                        CycleState::Advertising
                    } else {
                        self.skip_tag()
                    }
                }
                None => CycleState::SelectTag,
            },
            CycleState::Advertising => {
                let command = RadioCommand::StartAdvertising(self.config.adv_params);
                if self.command(command).await? {
                    if let Some(tag) = self.on_air {
                        debug!("cycler: tag {} on air", tag.id);
                    }
                    self.sleep(self.config.dwell).await;
                }
                // The controller may be advertising even if the start timed out.
                CycleState::StopAdvertising
            }
            CycleState::StopAdvertising => {
                self.command(RadioCommand::StopAdvertising).await?;
                if self.on_air.take().is_some() {
                    self.advance();
                }
                CycleState::SelectTag
            }
        };
        self.state = next;
        Ok(next)
    }

    async fn idle(&mut self) -> CycleState {
        if self.store.count() == 0 {
            self.sleep(self.config.idle_poll).await;
            CycleState::Idle
        } else {
            info!("cycler: tags available, starting rotation");
            CycleState::SelectTag
        }
    }

    async fn select_tag(&mut self) -> CycleState {
        let Some((index, record)) = self.store.snapshot(self.index) else {
            info!("cycler: tag store empty, idling");
            self.index = 0;
            self.skipped = 0;
            return CycleState::Idle;
        };
        self.index = index;

        match record.beacon() {
            Ok(beacon) => {
                self.skipped = 0;
                debug!(
                    "cycler: tag {} -> addr {:02x}",
                    record.id, beacon.address
                );
                self.on_air = Some(OnAir {
                    id: record.id,
                    beacon,
                });
                CycleState::SetAddress
            }
            Err(err) => {
                warn!(
                    "cycler: cannot extract advertisement from tag {} ({}), skipping",
                    record.id, err
                );
                self.advance();
                self.skipped += 1;
                // Every stored tag is broken: wait for the next download
                // instead of spinning.
                if self.skipped >= self.store.count() {
                    self.skipped = 0;
                    self.sleep(self.config.idle_poll).await;
                }
                CycleState::SelectTag
            }
        }
    }

    /// Submit one command and wait for its completion.
    ///
    /// Returns `false` if a completion timeout is configured and expires. The
    /// command is then remembered as abandoned, and its late completion is
    /// awaited before anything else is submitted.
    async fn command(&mut self, command: RadioCommand) -> Result<bool, RadioError> {
        self.settle().await?;

        let kind = command.kind();
        self.completion.reset();
        self.radio.submit(command)?;

        match self.wait_completion().await {
            Some(completion) => {
                completion.expect(kind)?;
                Ok(true)
            }
            None => {
                warn!("cycler: no completion for {} in time", kind);
                self.abandoned = Some(kind);
                Ok(false)
            }
        }
    }

    /// Wait out the abandoned command, if any, and discard its completion.
    async fn settle(&mut self) -> Result<(), RadioError> {
        let Some(kind) = self.abandoned else {
            return Ok(());
        };
        loop {
            match self.wait_completion().await {
                Some(late) => {
                    self.abandoned = None;
                    debug!("cycler: discarding late {} (status {})", late.command, late.status);
                    if late.command != kind {
                        return Err(RadioError::OutOfSequence {
                            expected: kind,
                            received: late.command,
                        });
                    }
                    return Ok(());
                }
                None => warn!("cycler: {} still outstanding", kind),
            }
        }
    }

    async fn wait_completion(&mut self) -> Option<Completion> {
        match self.config.completion_timeout {
            None => Some(self.completion.wait().await),
            Some(timeout) => {
                match select(self.completion.wait(), self.delay.delay_ms(millis(timeout))).await {
                    Either::First(completion) => Some(completion),
                    Either::Second(()) => None,
                }
            }
        }
    }

    /// Give up on the current tag and move to the next one.
    fn skip_tag(&mut self) -> CycleState {
        if self.on_air.take().is_some() {
            self.advance();
        }
        CycleState::SelectTag
    }

    /// Move the rotation pointer to the next tag, modulo the current count.
    fn advance(&mut self) {
        let index = self.index;
        self.index = self.store.with_exclusive_access(|table| {
            if table.is_empty() {
                0
            } else {
                (index + 1) % table.count()
            }
        });
    }

    async fn sleep(&mut self, duration: Duration) {
        self.delay.delay_ms(millis(duration)).await;
    }
}

fn millis(duration: Duration) -> u32 {
    u32::try_from(duration.as_millis()).unwrap_or(u32::MAX)
}
