//! # onewire-sim
//!
//! A simulated PIO block and 1-Wire bus for running [`pio_onewire`] on a host.
//!
//! [`SimPio`] implements [`PioBlock`](pio_onewire::PioBlock) on top of a [`SimBus`],
//! a wired-AND line with [`SimDevice`] slaves that answer the ROM layer of the protocol.

mod bus;
mod device;
mod pio;

pub use bus::SimBus;
pub use device::SimDevice;
pub use pio::{FIFO_DEPTH, SimPio};
