use crate::{
    OneWireCrc, OneWireError, OneWireResult, OneWireSearchKind, RomCode,
    consts::{ONEWIRE_MATCH_ROM_CMD, ONEWIRE_READ_ROM_CMD, ONEWIRE_SKIP_ROM_CMD},
};

/// Status reported by a bus master after a 1-Wire reset.
pub trait OneWireStatus {
    /// At least one device pulled the line low during the presence window.
    fn presence(&self) -> bool;

    /// The line was found shorted during the reset cycle.
    fn shortcircuit(&self) -> bool {
        false
    }

    /// Logic level of the line, if the bus master can sample it.
    fn logic_level(&self) -> Option<bool> {
        None
    }

    /// Whether the strong pull-up is engaged, if the bus master can deliver power.
    fn power(&self) -> Option<bool> {
        None
    }
}

/// Trait for 1-Wire communication.
/// This trait defines the basic operations required for 1-Wire communication, such as resetting the bus,
/// writing and reading bytes, and writing and reading bits.
///
/// Implementations are not reentrant: every operation must complete before the next one is issued.
pub trait OneWire {
    /// The status type returned by the reset operation.
    /// This type must implement the [OneWireStatus] trait.
    type Status: OneWireStatus;
    /// The error type returned by the operations of this trait.
    /// This type is used to indicate errors in the underlying hardware or communication.
    type BusError;

    /// Resets the 1-Wire bus and returns the status of the bus.
    ///
    /// A bus without devices is not an error: check [OneWireStatus::presence] on the result.
    ///
    /// # Errors
    /// This method returns an error if the underlying hardware fails.
    fn reset(&mut self) -> OneWireResult<Self::Status, Self::BusError>;

    /// Writes a byte to the 1-Wire bus, least significant bit first.
    ///
    /// # Errors
    /// This method returns an error if the write operation fails.
    fn write_byte(&mut self, byte: u8) -> OneWireResult<(), Self::BusError>;

    /// Reads a byte from the 1-Wire bus, least significant bit first.
    ///
    /// # Errors
    /// This method returns an error if the read operation fails.
    fn read_byte(&mut self) -> OneWireResult<u8, Self::BusError>;

    /// Writes a single bit to the 1-Wire bus.
    ///
    /// # Errors
    /// This method returns an error if the write operation fails.
    fn write_bit(&mut self, bit: bool) -> OneWireResult<(), Self::BusError>;

    /// Reads a single bit from the 1-Wire bus.
    ///
    /// # Errors
    /// This method returns an error if the read operation fails.
    fn read_bit(&mut self) -> OneWireResult<bool, Self::BusError>;

    /// Writes a sequence of bytes. Bus masters able to batch transfers override this.
    fn write_bytes(&mut self, bytes: &[u8]) -> OneWireResult<(), Self::BusError> {
        for &b in bytes {
            self.write_byte(b)?;
        }
        Ok(())
    }

    /// Fills `buf` with bytes read from the bus.
    fn read_bytes(&mut self, buf: &mut [u8]) -> OneWireResult<(), Self::BusError> {
        for b in buf.iter_mut() {
            *b = self.read_byte()?;
        }
        Ok(())
    }

    /// Generates three time slots used by one step of the
    /// [1-Wire search algorithm](https://www.analog.com/en/resources/app-notes/1wire-search-algorithm.html):
    /// two read time slots and one write time slot.
    ///
    /// The first read samples the id bit of every participating device, the second
    /// its complement. If both reads are 0 the written bit is `direction`.
    /// If the reads are 0 and 1 (or 1 and 0), the written bit is the id bit.
    /// If the reads are both 1 (nobody answered), a 1 is written.
    ///
    /// # Returns
    /// `(id_bit, complement_bit, direction_taken)`.
    fn read_triplet(&mut self, direction: bool) -> OneWireResult<(bool, bool, bool), Self::BusError> {
        let id_bit = self.read_bit()?;
        let complement_bit = self.read_bit()?;
        let taken = triplet_direction(id_bit, complement_bit, direction);
        self.write_bit(taken)?;
        Ok((id_bit, complement_bit, taken))
    }

    /// Writes a byte and leaves the line actively driven high afterwards, to power a
    /// device through a conversion or EEPROM write.
    ///
    /// Must be followed by [OneWire::end_power] before any other bus operation.
    fn write_byte_power(&mut self, _byte: u8) -> OneWireResult<(), Self::BusError> {
        Err(OneWireError::Unimplemented)
    }

    /// Returns the line to open-drain operation after [OneWire::write_byte_power].
    fn end_power(&mut self) -> OneWireResult<(), Self::BusError> {
        Err(OneWireError::Unimplemented)
    }

    /// Addresses devices on the 1-Wire bus.
    /// The first [`OneWire::read_byte`], [`OneWire::read_bit`], [`OneWire::write_byte`], [`OneWire::write_bit`] operation should be preceded by this method to address devices on the bus.
    /// Note: A [`OneWire::read_byte`] or [`OneWire::read_bit`] call will return garbage data if this method is called without specifying a ROM address on a bus with multiple devices.
    /// # Arguments
    /// * `rom` - The ROM address of the device to address. Pass [`None`] to skip ROM addressing and address all devices on the bus.
    ///
    /// # Returns
    /// `Ok(false)` if no device answered the reset, in which case nothing else is sent.
    fn address(&mut self, rom: Option<&RomCode>) -> OneWireResult<bool, Self::BusError> {
        if !self.reset()?.presence() {
            return Ok(false);
        }
        match rom {
            Some(rom) => {
                self.write_byte(ONEWIRE_MATCH_ROM_CMD)?;
                self.write_bytes(rom)?;
            }
            None => self.write_byte(ONEWIRE_SKIP_ROM_CMD)?,
        }
        Ok(true)
    }

    /// Reads the ROM code of the only device on the bus.
    ///
    /// Returns `Ok(None)` if no device answered the reset, and [OneWireError::InvalidRomCrc]
    /// if the code does not check out, which is what happens with more than one device present.
    fn read_rom(&mut self) -> OneWireResult<Option<RomCode>, Self::BusError> {
        if !self.reset()?.presence() {
            return Ok(None);
        }
        self.write_byte(ONEWIRE_READ_ROM_CMD)?;
        let mut rom = [0u8; 8];
        self.read_bytes(&mut rom)?;
        if !OneWireCrc::validate(&rom) || rom[0] == 0 {
            return Err(OneWireError::InvalidRomCrc);
        }
        Ok(Some(rom))
    }
}

/// A 1-Wire bus engine that carries its own enumeration state.
///
/// This is the capability set a mode dispatcher needs: bus primitives from [OneWire]
/// plus device search and selection, without knowledge of the concrete engine.
pub trait OneWireEngine: OneWire {
    /// Forget the discrepancy bookkeeping so that the next search starts over.
    fn search_reset(&mut self);

    /// Run one search pass. See [OneWireSearch::search](crate::OneWireSearch::search).
    fn search(&mut self, kind: OneWireSearchKind) -> OneWireResult<Option<RomCode>, Self::BusError>;

    /// Find the first device on the bus.
    fn first(&mut self) -> OneWireResult<Option<RomCode>, Self::BusError> {
        self.search_reset();
        self.search(OneWireSearchKind::Normal)
    }

    /// Find the next device on the bus, continuing from the previous pass.
    fn next(&mut self) -> OneWireResult<Option<RomCode>, Self::BusError> {
        self.search(OneWireSearchKind::Normal)
    }

    /// Address exactly one device. Returns `Ok(false)` if no device answered the reset.
    fn select(&mut self, rom: &RomCode) -> OneWireResult<bool, Self::BusError> {
        self.address(Some(rom))
    }
}

pub(crate) fn triplet_direction(id_bit: bool, complement_bit: bool, direction: bool) -> bool {
    match (id_bit, complement_bit) {
        (false, false) => direction,
        (true, true) => true,
        (id_bit, _) => id_bit,
    }
}
