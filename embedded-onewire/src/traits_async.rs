#![allow(async_fn_in_trait)]
use crate::{
    OneWireCrc, OneWireError, OneWireResult, OneWireSearchKind, OneWireStatus, RomCode,
    consts::{ONEWIRE_MATCH_ROM_CMD, ONEWIRE_READ_ROM_CMD, ONEWIRE_SKIP_ROM_CMD},
    traits::triplet_direction,
};

/// Trait for asynchronous 1-Wire communication.
/// This is the async counterpart of [OneWire](crate::OneWire); see there for the semantics of each operation.
pub trait OneWireAsync {
    /// The status type returned by the reset operation.
    /// This type must implement the [OneWireStatus] trait.
    type Status: OneWireStatus;
    /// The error type returned by the operations of this trait.
    /// This type is used to indicate errors in the underlying hardware or communication.
    type BusError;

    /// Resets the 1-Wire bus and returns the status of the bus.
    ///
    /// # Errors
    /// This method returns an error if the underlying hardware fails.
    async fn reset(&mut self) -> OneWireResult<Self::Status, Self::BusError>;

    /// Writes a byte to the 1-Wire bus.
    ///
    /// # Errors
    /// This method returns an error if the write operation fails.
    async fn write_byte(&mut self, byte: u8) -> OneWireResult<(), Self::BusError>;

    /// Reads a byte from the 1-Wire bus.
    ///
    /// # Errors
    /// This method returns an error if the read operation fails.
    async fn read_byte(&mut self) -> OneWireResult<u8, Self::BusError>;

    /// Writes a single bit to the 1-Wire bus.
    ///
    /// # Errors
    /// This method returns an error if the write operation fails.
    async fn write_bit(&mut self, bit: bool) -> OneWireResult<(), Self::BusError>;

    /// Reads a single bit from the 1-Wire bus.
    ///
    /// # Errors
    /// This method returns an error if the read operation fails.
    async fn read_bit(&mut self) -> OneWireResult<bool, Self::BusError>;

    /// Writes a sequence of bytes.
    async fn write_bytes(&mut self, bytes: &[u8]) -> OneWireResult<(), Self::BusError> {
        for &b in bytes {
            self.write_byte(b).await?;
        }
        Ok(())
    }

    /// Fills `buf` with bytes read from the bus.
    async fn read_bytes(&mut self, buf: &mut [u8]) -> OneWireResult<(), Self::BusError> {
        for b in buf.iter_mut() {
            *b = self.read_byte().await?;
        }
        Ok(())
    }

    /// Generates the two read slots and one write slot of a search step.
    /// See [OneWire::read_triplet](crate::OneWire::read_triplet).
    async fn read_triplet(
        &mut self,
        direction: bool,
    ) -> OneWireResult<(bool, bool, bool), Self::BusError> {
        let id_bit = self.read_bit().await?;
        let complement_bit = self.read_bit().await?;
        let taken = triplet_direction(id_bit, complement_bit, direction);
        self.write_bit(taken).await?;
        Ok((id_bit, complement_bit, taken))
    }

    /// Writes a byte and leaves the strong pull-up engaged.
    async fn write_byte_power(&mut self, _byte: u8) -> OneWireResult<(), Self::BusError> {
        Err(OneWireError::Unimplemented)
    }

    /// Releases the strong pull-up.
    async fn end_power(&mut self) -> OneWireResult<(), Self::BusError> {
        Err(OneWireError::Unimplemented)
    }

    /// Addresses one device, or every device when `rom` is [`None`].
    /// Returns `Ok(false)` if no device answered the reset.
    async fn address(&mut self, rom: Option<&RomCode>) -> OneWireResult<bool, Self::BusError> {
        if !self.reset().await?.presence() {
            return Ok(false);
        }
        match rom {
            Some(rom) => {
                self.write_byte(ONEWIRE_MATCH_ROM_CMD).await?;
                self.write_bytes(rom).await?;
            }
            None => self.write_byte(ONEWIRE_SKIP_ROM_CMD).await?,
        }
        Ok(true)
    }

    /// Reads the ROM code of the only device on the bus.
    async fn read_rom(&mut self) -> OneWireResult<Option<RomCode>, Self::BusError> {
        if !self.reset().await?.presence() {
            return Ok(None);
        }
        self.write_byte(ONEWIRE_READ_ROM_CMD).await?;
        let mut rom = [0u8; 8];
        self.read_bytes(&mut rom).await?;
        if !OneWireCrc::validate(&rom) || rom[0] == 0 {
            return Err(OneWireError::InvalidRomCrc);
        }
        Ok(Some(rom))
    }
}

/// Async counterpart of [OneWireEngine](crate::OneWireEngine).
pub trait OneWireEngineAsync: OneWireAsync {
    /// Forget the discrepancy bookkeeping so that the next search starts over.
    fn search_reset(&mut self);

    /// Run one search pass. See [OneWireSearch::search_async](crate::OneWireSearch::search_async).
    async fn search(
        &mut self,
        kind: OneWireSearchKind,
    ) -> OneWireResult<Option<RomCode>, Self::BusError>;

    /// Find the first device on the bus.
    async fn first(&mut self) -> OneWireResult<Option<RomCode>, Self::BusError> {
        self.search_reset();
        self.search(OneWireSearchKind::Normal).await
    }

    /// Find the next device on the bus, continuing from the previous pass.
    async fn next(&mut self) -> OneWireResult<Option<RomCode>, Self::BusError> {
        self.search(OneWireSearchKind::Normal).await
    }

    /// Address exactly one device. Returns `Ok(false)` if no device answered the reset.
    async fn select(&mut self, rom: &RomCode) -> OneWireResult<bool, Self::BusError> {
        self.address(Some(rom)).await
    }
}
