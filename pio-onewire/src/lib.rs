#![cfg_attr(not(test), no_std)]
#![deny(missing_docs)]

/*! # PIO 1-Wire
 *
 * A 1-Wire bus master running on a programmable I/O (PIO) coprocessor block.
 *
 * The coprocessor generates every reset pulse and time slot of the standard speed
 * waveform by itself; the host only exchanges FIFO words with it. The bus primitives,
 * ROM search and device selection are exposed through the traits of [`embedded_onewire`].
 *
 * The PIO block is reached through the [`PioBlock`] trait, which also carries the
 * [`SlotArena`] bookkeeping of its state machines and instruction memory.
 *
 * ```ignore
 * let mut bus = PioOneWireBuilder::new(2).with_direction_pin(3).build(pio, delay)?;
 * bus.search_reset();
 * while let Some(rom) = bus.next()? {
 *     bus.select(&rom)?;
 * }
 * let (pio, delay) = bus.release();
 * ```
 */

pub use embedded_onewire::{
    OneWire, OneWireAsync, OneWireEngine, OneWireEngineAsync, OneWireError, OneWireResult,
    OneWireSearch, OneWireSearchKind, RomCode,
};
mod engine;
mod error;
mod onewire;
mod onewire_async;
pub mod program;
mod slots;
mod traits;

use engine::PioEngine;
pub use engine::{OneWirePins, PioStatus, clock_divider};
pub use error::PioError;
pub use slots::{GPIO_WINDOW, INSTRUCTION_WORDS, ProgramSpace, STATE_MACHINES, SlotArena, StateMachine};
pub use traits::{PioBlock, Pull, StateMachineConfig};

/// Default interval between two polls of the state machine, in nanoseconds.
pub const DEFAULT_POLL_NS: u32 = 1_000;

/// A 1-Wire bus master on a PIO state machine.
///
/// Takes ownership of a PIO block (implementing [`PioBlock`]) and a timer object
/// implementing the [`DelayNs`](embedded_hal::delay::DelayNs) trait, used to pace
/// the polling of the state machine.
pub struct PioOneWire<P: PioBlock, D> {
    pub(crate) engine: PioEngine<P>,
    pub(crate) delay: D,
    pub(crate) poll_ns: u32,
    pub(crate) search: OneWireSearch,
}

/// An asynchronous 1-Wire bus master on a PIO state machine.
///
/// Like [`PioOneWire`], with the poll interval awaited on an
/// [`embedded_hal_async::delay::DelayNs`] timer.
pub struct PioOneWireAsync<P: PioBlock, D> {
    pub(crate) engine: PioEngine<P>,
    pub(crate) delay: D,
    pub(crate) poll_ns: u32,
    pub(crate) search: OneWireSearch,
}

/// Builder for a [`PioOneWire`] or [`PioOneWireAsync`] bus master.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PioOneWireBuilder {
    pins: OneWirePins,
    threshold: u8,
    poll_ns: u32,
}

impl PioOneWireBuilder {
    /// Starts the configuration of a bus master on the data GPIO `pin`.
    pub fn new(pin: u8) -> Self {
        PioOneWireBuilder {
            pins: OneWirePins {
                data: pin,
                dir: None,
            },
            threshold: 8,
            poll_ns: DEFAULT_POLL_NS,
        }
    }

    /// Drive the direction pin of an external bus buffer with GPIO `pin`.
    pub fn with_direction_pin(mut self, pin: u8) -> Self {
        self.pins.dir = Some(pin);
        self
    }

    /// Sets the batch width of bulk transfers, in bits.
    ///
    /// See [`PioOneWire::set_fifo_threshold`]. Checked when building.
    pub fn with_fifo_threshold(mut self, bits: u8) -> Self {
        self.threshold = bits;
        self
    }

    /// Sets the time waited between two polls of the state machine.
    pub fn with_poll_interval_ns(mut self, ns: u32) -> Self {
        self.poll_ns = ns;
        self
    }

    /// Loads the timing program into `pio` and starts it.
    ///
    /// On error the PIO block is dropped with its arena untouched; pass `&mut pio`
    /// to keep it.
    pub fn build<P: PioBlock, D: embedded_hal::delay::DelayNs>(
        self,
        pio: P,
        delay: D,
    ) -> Result<PioOneWire<P, D>, PioError> {
        Ok(PioOneWire {
            engine: PioEngine::init(pio, self.pins, self.threshold)?,
            delay,
            poll_ns: self.poll_ns,
            search: OneWireSearch::new(),
        })
    }

    /// Loads the timing program into `pio` and starts it, for asynchronous use.
    pub fn build_async<P: PioBlock, D: embedded_hal_async::delay::DelayNs>(
        self,
        pio: P,
        delay: D,
    ) -> Result<PioOneWireAsync<P, D>, PioError> {
        Ok(PioOneWireAsync {
            engine: PioEngine::init(pio, self.pins, self.threshold)?,
            delay,
            poll_ns: self.poll_ns,
            search: OneWireSearch::new(),
        })
    }
}
