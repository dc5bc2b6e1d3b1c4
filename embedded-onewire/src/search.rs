use crate::{
    OneWire, OneWireStatus, RomCode,
    consts::{ONEWIRE_CONDITIONAL_SEARCH_CMD, ONEWIRE_SEARCH_CMD},
    error::OneWireError,
    utils::OneWireCrc,
};

/// State of the ROM search algorithm.
///
/// The search state is owned by whoever drives the bus (usually the bus engine itself)
/// and carries the discrepancy bookkeeping from one pass to the next, so that repeated
/// calls to [next](OneWireSearch::next) walk the binary tree of ROM codes exactly once.
///
/// # Bit numbering
/// Discrepancies are reported as search bit numbers counted from 1, as in the Maxim
/// application note: bit 1 is the least significant bit of the family code, bit 64 the
/// most significant bit of the CRC byte, and 0 means "none". A collision at 0-based ROM
/// bit `n` is therefore reported as `n + 1`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct OneWireSearch {
    rom: RomCode,
    last_discrepancy: u8,
    last_family_discrepancy: u8,
    last_device: bool,
    crc: OneWireCrc,
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Type of search performed using [`OneWireSearch`].
pub enum OneWireSearchKind {
    /// Normal search
    Normal = ONEWIRE_SEARCH_CMD,
    /// Search only for devices with alarm
    Alarmed = ONEWIRE_CONDITIONAL_SEARCH_CMD,
}

/// Where an enumeration stands.
///
/// Derived from [last_discrepancy](OneWireSearch::last_discrepancy) (1-based, 0 if none)
/// and [last_device](OneWireSearch::last_device).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchState {
    /// No branch is pending; the next pass starts from the root.
    Idle,
    /// At least one branch of the ROM tree is left to explore.
    Searching,
    /// The last device has been found.
    Exhausted,
}

impl OneWireSearch {
    /// Creates a fresh search state.
    pub const fn new() -> Self {
        Self {
            rom: [0; 8],
            last_discrepancy: 0,
            last_family_discrepancy: 0,
            last_device: false,
            crc: OneWireCrc::new(),
        }
    }

    /// The last ROM code found (or being verified).
    pub fn rom(&self) -> RomCode {
        self.rom
    }

    /// Search bit number (1-64) of the last branch deferred by the previous pass, 0 if none.
    ///
    /// This is one more than the 0-based index of the ROM bit where the devices disagreed.
    pub fn last_discrepancy(&self) -> u8 {
        self.last_discrepancy
    }

    /// Like [last_discrepancy](OneWireSearch::last_discrepancy), restricted to the family code (bits 1-8).
    pub fn last_family_discrepancy(&self) -> u8 {
        self.last_family_discrepancy
    }

    /// `true` once the last device of the enumeration has been returned.
    pub fn last_device(&self) -> bool {
        self.last_device
    }

    /// Current state of the enumeration.
    pub fn state(&self) -> SearchState {
        if self.last_device {
            SearchState::Exhausted
        } else if self.last_discrepancy != 0 {
            SearchState::Searching
        } else {
            SearchState::Idle
        }
    }

    /// Resets the search state. The last ROM code is kept.
    pub fn reset(&mut self) {
        self.last_device = false;
        self.last_discrepancy = 0;
        self.last_family_discrepancy = 0;
    }

    /// Sets up the next search to find the first device of `family`, if any.
    ///
    /// The pass returns the first device whose family code is at least `family`;
    /// check the family code of the result.
    pub fn target_setup(&mut self, family: u8) {
        self.rom = [family, 0, 0, 0, 0, 0, 0, 0];
        self.last_discrepancy = 64;
        self.last_family_discrepancy = 0;
        self.last_device = false;
    }

    /// Sets up the next search to skip every remaining device of the current family.
    pub fn family_skip_setup(&mut self) {
        self.last_discrepancy = self.last_family_discrepancy;
        self.last_family_discrepancy = 0;
        if self.last_discrepancy == 0 {
            self.last_device = true;
        }
    }

    /// Direction to try at `id_bit_number` if devices disagree there.
    ///
    /// Below the last discrepancy the previous path is repeated, at the last
    /// discrepancy the deferred 1-branch is taken, above it the 0-branch.
    pub(crate) fn preferred_direction(&self, id_bit_number: u8) -> bool {
        if id_bit_number < self.last_discrepancy {
            rom_bit(&self.rom, id_bit_number)
        } else {
            id_bit_number == self.last_discrepancy
        }
    }

    /// Sets up a pass that follows `rom` down the tree.
    pub(crate) fn verify_setup(&mut self, rom: &RomCode) {
        self.target_setup(rom[0]);
        self.rom = *rom;
    }

    pub(crate) fn begin_pass(&mut self) {
        self.crc = OneWireCrc::new();
    }

    /// Records the outcome of one triplet. Returns `false` if nobody answered.
    pub(crate) fn record(
        &mut self,
        id_bit_number: u8,
        (id_bit, complement_bit, direction): (bool, bool, bool),
        last_zero: &mut u8,
    ) -> bool {
        if id_bit && complement_bit {
            return false;
        }
        if !id_bit && !complement_bit && !direction {
            *last_zero = id_bit_number;
            if *last_zero < 9 {
                self.last_family_discrepancy = *last_zero;
            }
        }
        let idx = ((id_bit_number - 1) / 8) as usize;
        let mask = 1u8 << ((id_bit_number - 1) % 8);
        if direction {
            self.rom[idx] |= mask;
        } else {
            self.rom[idx] &= !mask;
        }
        if id_bit_number % 8 == 0 {
            self.crc.update(self.rom[idx]);
        }
        true
    }

    /// Validates a completed pass and updates the bookkeeping for the next one.
    pub(crate) fn finish_pass<E>(
        &mut self,
        last_zero: u8,
    ) -> Result<Option<RomCode>, OneWireError<E>> {
        if self.crc.value() != 0 {
            self.reset();
            return Err(OneWireError::InvalidRomCrc);
        }
        if self.rom[0] == 0 {
            self.reset();
            return Err(OneWireError::ShortCircuit);
        }
        self.last_discrepancy = last_zero;
        self.last_device = last_zero == 0;
        Ok(Some(self.rom))
    }
}

impl OneWireSearch {
    /// Runs one pass of the [1-Wire search algorithm](https://www.analog.com/en/resources/app-notes/1wire-search-algorithm.html).
    /// Calling this method repeatedly finds every device on the bus, in ascending order of
    /// their ROM codes read least significant bit first.
    ///
    /// # Returns
    /// - `Ok(Some(rom))` with the ROM code of the device found.
    /// - `Ok(None)` if the enumeration is exhausted or no device answered the reset.
    ///   The search state is reset, so the next call starts over.
    ///
    /// # Errors
    /// - [OneWireError::SearchAborted] if no device answered a search slot.
    /// - [OneWireError::InvalidRomCrc] if the ROM code found fails its CRC.
    /// - [OneWireError::ShortCircuit] if the family code found is zero.
    ///
    /// In every error case the search state is reset as well.
    pub fn search<T: OneWire>(
        &mut self,
        onewire: &mut T,
        kind: OneWireSearchKind,
    ) -> Result<Option<RomCode>, OneWireError<T::BusError>> {
        if self.last_device {
            self.reset();
            return Ok(None);
        }
        if !onewire.reset()?.presence() {
            self.reset();
            return Ok(None);
        }
        onewire.write_byte(kind as u8)?;
        self.begin_pass();
        let mut last_zero = 0;
        for id_bit_number in 1..=64 {
            let triplet = onewire.read_triplet(self.preferred_direction(id_bit_number))?;
            if !self.record(id_bit_number, triplet, &mut last_zero) {
                self.reset();
                return Err(OneWireError::SearchAborted);
            }
        }
        self.finish_pass(last_zero)
    }

    /// Finds the first device on the bus.
    pub fn first<T: OneWire>(
        &mut self,
        onewire: &mut T,
    ) -> Result<Option<RomCode>, OneWireError<T::BusError>> {
        self.reset();
        self.search(onewire, OneWireSearchKind::Normal)
    }

    /// Finds the next device on the bus.
    #[allow(clippy::should_implement_trait)]
    pub fn next<T: OneWire>(
        &mut self,
        onewire: &mut T,
    ) -> Result<Option<RomCode>, OneWireError<T::BusError>> {
        self.search(onewire, OneWireSearchKind::Normal)
    }

    /// Verifies if the device with the given ROM code is present on the 1-Wire bus.
    ///
    /// The search state is left as it was before the call.
    pub fn verify<T: OneWire>(
        &mut self,
        onewire: &mut T,
        rom: &RomCode,
    ) -> Result<bool, OneWireError<T::BusError>> {
        let saved = *self;
        self.verify_setup(rom);
        let res = self.search(onewire, OneWireSearchKind::Normal);
        *self = saved;
        match res {
            Ok(found) => Ok(found.as_ref() == Some(rom)),
            Err(OneWireError::SearchAborted | OneWireError::InvalidRomCrc | OneWireError::ShortCircuit) => {
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}

pub(crate) fn rom_bit(rom: &RomCode, id_bit_number: u8) -> bool {
    let n = id_bit_number - 1;
    rom[(n / 8) as usize] & (1 << (n % 8)) != 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{OneWireResult, OneWireStatus};
    use std::vec::Vec;

    struct Present(bool);

    impl OneWireStatus for Present {
        fn presence(&self) -> bool {
            self.0
        }
    }

    /// A bit-level bus model: devices answer search slots through a wired-AND line.
    struct Bus {
        devices: Vec<RomCode>,
        active: Vec<bool>,
        bit: u8,
        phase: u8,
        resets: usize,
    }

    impl Bus {
        fn new(devices: &[RomCode]) -> Self {
            Self {
                devices: devices.to_vec(),
                active: Vec::new(),
                bit: 1,
                phase: 0,
                resets: 0,
            }
        }

        fn line(&self, complement: bool) -> bool {
            self.devices
                .iter()
                .zip(self.active.iter())
                .filter(|(_, active)| **active)
                .all(|(rom, _)| rom_bit(rom, self.bit) != complement)
        }
    }

    impl OneWire for Bus {
        type Status = Present;
        type BusError = ();

        fn reset(&mut self) -> OneWireResult<Present, ()> {
            self.resets += 1;
            self.active = std::vec![true; self.devices.len()];
            self.bit = 1;
            self.phase = 0;
            Ok(Present(!self.devices.is_empty()))
        }

        fn write_byte(&mut self, byte: u8) -> OneWireResult<(), ()> {
            assert_eq!(byte, ONEWIRE_SEARCH_CMD);
            Ok(())
        }

        fn read_byte(&mut self) -> OneWireResult<u8, ()> {
            unreachable!()
        }

        fn write_bit(&mut self, bit: bool) -> OneWireResult<(), ()> {
            assert_eq!(self.phase, 2);
            for (rom, active) in self.devices.iter().zip(self.active.iter_mut()) {
                if rom_bit(rom, self.bit) != bit {
                    *active = false;
                }
            }
            self.phase = 0;
            self.bit += 1;
            Ok(())
        }

        fn read_bit(&mut self) -> OneWireResult<bool, ()> {
            let value = self.line(self.phase == 1);
            self.phase += 1;
            Ok(value)
        }
    }

    fn rom(family: u8, serial: u8) -> RomCode {
        let mut rom = [family, serial, 0, 0, 0, 0, 0, 0];
        rom[7] = OneWireCrc::compute(&rom[..7]);
        rom
    }

    fn enumerate(bus: &mut Bus, search: &mut OneWireSearch) -> Vec<RomCode> {
        let mut found = Vec::new();
        let mut next = search.first(bus).unwrap();
        while let Some(rom) = next {
            found.push(rom);
            next = search.next(bus).unwrap();
        }
        found
    }

    #[test]
    fn triplet_direction_rules() {
        use crate::traits::triplet_direction;
        assert!(!triplet_direction(false, false, false));
        assert!(triplet_direction(false, false, true));
        assert!(!triplet_direction(false, true, true));
        assert!(triplet_direction(true, false, false));
        assert!(triplet_direction(true, true, false));
    }

    #[test]
    fn preferred_direction_follows_previous_path() {
        let mut search = OneWireSearch::new();
        search.rom = [0b0000_0101, 0, 0, 0, 0, 0, 0, 0];
        search.last_discrepancy = 5;
        assert!(search.preferred_direction(1));
        assert!(!search.preferred_direction(2));
        assert!(search.preferred_direction(3));
        assert!(!search.preferred_direction(4));
        assert!(search.preferred_direction(5));
        assert!(!search.preferred_direction(6));
    }

    #[test]
    fn fresh_search_takes_zero_branch_at_bit_one() {
        let search = OneWireSearch::new();
        assert!(!search.preferred_direction(1));
    }

    #[test]
    fn empty_bus_reports_not_found() {
        let mut bus = Bus::new(&[]);
        let mut search = OneWireSearch::new();
        assert_eq!(search.first(&mut bus), Ok(None));
        assert!(!search.last_device());
        assert_eq!(search.state(), SearchState::Idle);
    }

    #[test]
    fn single_device() {
        let dev = rom(0x28, 0x11);
        let mut bus = Bus::new(&[dev]);
        let mut search = OneWireSearch::new();
        assert_eq!(search.first(&mut bus), Ok(Some(dev)));
        assert!(search.last_device());
        assert_eq!(search.state(), SearchState::Exhausted);
        let resets = bus.resets;
        assert_eq!(search.next(&mut bus), Ok(None));
        assert_eq!(bus.resets, resets);
        assert_eq!(search.state(), SearchState::Idle);
    }

    #[test]
    fn discrepancy_in_family_code() {
        // 0x28 and 0x2c first differ at bit 3 (0-based bit 2).
        let low = rom(0x28, 0x01);
        let high = rom(0x2c, 0x01);
        let mut bus = Bus::new(&[high, low]);
        let mut search = OneWireSearch::new();
        assert_eq!(search.first(&mut bus), Ok(Some(low)));
        assert_eq!(search.last_discrepancy(), 3);
        assert_eq!(search.last_family_discrepancy(), 3);
        assert!(!search.last_device());
        assert_eq!(search.next(&mut bus), Ok(Some(high)));
        assert!(search.last_device());
        assert_eq!(search.next(&mut bus), Ok(None));
    }

    #[test]
    fn bad_crc_resets_the_enumeration() {
        let good = rom(0x28, 0x01);
        let mut bad = rom(0x2c, 0x01);
        bad[7] ^= 1;
        let mut bus = Bus::new(&[bad, good]);
        let mut search = OneWireSearch::new();
        assert_eq!(search.first(&mut bus), Ok(Some(good)));
        assert_eq!(search.state(), SearchState::Searching);
        assert_eq!(search.next(&mut bus), Err(OneWireError::InvalidRomCrc));
        assert_eq!(search.state(), SearchState::Idle);
        assert_eq!(search.last_discrepancy(), 0);
        assert_eq!(search.last_family_discrepancy(), 0);
        // starts over from the root
        assert_eq!(search.next(&mut bus), Ok(Some(good)));
    }

    #[test]
    fn enumerates_every_device_once_in_order() {
        let mut devices: Vec<RomCode> = (0..20u8)
            .map(|i| rom(0x10 + (i % 3), i.wrapping_mul(37)))
            .collect();
        let mut bus = Bus::new(&devices);
        let mut search = OneWireSearch::new();
        let found = enumerate(&mut bus, &mut search);
        devices.sort_by_key(|r| u64::from_le_bytes(*r).reverse_bits());
        assert_eq!(found, devices);
    }

    #[test]
    fn first_is_repeatable() {
        let mut bus = Bus::new(&[rom(0x28, 1), rom(0x28, 2), rom(0x3b, 9)]);
        let mut search = OneWireSearch::new();
        let a = search.first(&mut bus).unwrap();
        search.reset();
        let b = search.first(&mut bus).unwrap();
        assert!(a.is_some());
        assert_eq!(a, b);
    }

    #[test]
    fn family_skip_and_target() {
        let devices = [rom(0x28, 1), rom(0x28, 2), rom(0x3b, 3)];
        let mut bus = Bus::new(&devices);
        let mut search = OneWireSearch::new();
        let first = search.first(&mut bus).unwrap().unwrap();
        assert_eq!(first[0], 0x28);
        search.family_skip_setup();
        let next = search.next(&mut bus).unwrap().unwrap();
        assert_eq!(next[0], 0x3b);

        search.target_setup(0x3b);
        let target = search.next(&mut bus).unwrap().unwrap();
        assert_eq!(target, devices[2]);
    }

    #[test]
    fn verify_keeps_state() {
        let devices = [rom(0x28, 1), rom(0x28, 2)];
        let mut bus = Bus::new(&devices);
        let mut search = OneWireSearch::new();
        search.first(&mut bus).unwrap();
        let before = search;
        assert_eq!(search.verify(&mut bus, &devices[1]), Ok(true));
        assert_eq!(search.verify(&mut bus, &rom(0x28, 3)), Ok(false));
        assert_eq!(search, before);
    }
}
