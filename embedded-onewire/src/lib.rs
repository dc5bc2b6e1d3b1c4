#![cfg_attr(not(test), no_std)]
#![deny(missing_docs)]
//! # embedded-onewire
//! A no-std implementation of the 1-Wire protocol.
//!
//! This crate provides a trait-based interface for 1-Wire bus masters, allowing the protocol to run on
//! anything from a bridge chip to a programmable I/O coprocessor.
//! [OneWire] defines the bus primitives: reset with presence detection, byte and bit transfers,
//! the search triplet and strong pull-up power delivery. [OneWireAsync] is the same contract for
//! async environments, and [OneWireEngine] and [OneWireEngineAsync] add enumeration on top for engines that carry their own search state.
//!
//! The [OneWireSearch] state machine implements the ROM search algorithm, and [OneWireCrc] the
//! Dallas/Maxim CRC-8 used to validate ROM codes and data blocks.

mod consts;
mod error;
mod search;
mod search_async;
mod traits;
mod traits_async;
mod utils;
pub use consts::*;
pub use error::OneWireError;
pub use search::{OneWireSearch, OneWireSearchKind, SearchState};
pub use traits::{OneWire, OneWireEngine, OneWireStatus};
pub use traits_async::{OneWireAsync, OneWireEngineAsync};
pub use utils::OneWireCrc;

/// Error type for 1-Wire operations.
pub type OneWireResult<T, E> = Result<T, OneWireError<E>>;

/// A 64-bit 1-Wire ROM code in wire order.
///
/// | Byte | Description |
/// |------|-------------|
/// | 0 | Family code (e.g., 0x28 for DS18B20) |
/// | 1-6 | Serial number, least significant byte first |
/// | 7 | CRC-8 (`0b1_0001_1001` poly) of bytes 0-6 |
pub type RomCode = [u8; 8];
