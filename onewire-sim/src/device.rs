use embedded_onewire::{
    ONEWIRE_CONDITIONAL_SEARCH_CMD, ONEWIRE_MATCH_ROM_CMD, ONEWIRE_READ_ROM_CMD,
    ONEWIRE_SEARCH_CMD, ONEWIRE_SKIP_ROM_CMD, OneWireCrc, RomCode,
};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Phase {
    /// Deselected until the next reset.
    Idle,
    RomCommand,
    /// `step` 0 sends the ROM bit, 1 its complement, 2 receives the master's choice.
    Search { bit: u8, step: u8 },
    Match { bit: u8 },
    ReadRom { bit: u8 },
    Function,
    Respond { data: Vec<u8>, bit: usize },
}

/// A 1-Wire slave on the simulated bus.
///
/// The device answers the ROM layer (search, conditional search, match, skip and
/// read ROM). Once selected it logs every function byte it receives, and answers
/// a byte registered with [`with_response`](SimDevice::with_response) by
/// transmitting the response on the following read slots.
#[derive(Debug, Clone)]
pub struct SimDevice {
    rom: RomCode,
    alarm: bool,
    silent: bool,
    stuck_low: bool,
    responses: BTreeMap<u8, Vec<u8>>,
    received: Vec<u8>,
    phase: Phase,
    shift: u8,
    count: u8,
}

impl SimDevice {
    /// A device with the given ROM code, used as is.
    pub fn new(rom: RomCode) -> Self {
        SimDevice {
            rom,
            alarm: false,
            silent: false,
            stuck_low: false,
            responses: BTreeMap::new(),
            received: Vec::new(),
            phase: Phase::Idle,
            shift: 0,
            count: 0,
        }
    }

    /// A device with a valid ROM code made of `family` and `serial`.
    pub fn with_serial(family: u8, serial: [u8; 6]) -> Self {
        let mut rom = [0; 8];
        rom[0] = family;
        rom[1..7].copy_from_slice(&serial);
        rom[7] = OneWireCrc::compute(&rom[..7]);
        Self::new(rom)
    }

    /// A device of `family` with a random serial number.
    pub fn random(family: u8) -> Self {
        Self::with_serial(family, rand::random())
    }

    /// Sets the alarm flag, which makes the device answer conditional searches.
    pub fn with_alarm(mut self, alarm: bool) -> Self {
        self.alarm = alarm;
        self
    }

    /// Answers resets but ignores the search commands.
    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    /// Holds the line low permanently, like a shorted bus.
    pub fn stuck_low(mut self) -> Self {
        self.stuck_low = true;
        self
    }

    /// Transmits `data` after receiving the function byte `command`.
    pub fn with_response(mut self, command: u8, data: &[u8]) -> Self {
        self.responses.insert(command, data.to_vec());
        self
    }

    /// ROM code of the device.
    pub fn rom(&self) -> RomCode {
        self.rom
    }

    /// Whether the alarm flag is set.
    pub fn alarm(&self) -> bool {
        self.alarm
    }

    /// Function bytes received while selected.
    pub fn received(&self) -> &[u8] {
        &self.received
    }

    /// Whether the device is selected for function commands.
    pub fn selected(&self) -> bool {
        matches!(self.phase, Phase::Function | Phase::Respond { .. })
    }

    fn rom_bit(&self, bit: u8) -> bool {
        self.rom[bit as usize / 8] & (1 << (bit % 8)) != 0
    }

    /// Reset pulse. Returns whether the device sends a presence pulse.
    pub(crate) fn reset(&mut self) -> bool {
        self.phase = Phase::RomCommand;
        self.shift = 0;
        self.count = 0;
        true
    }

    /// Level the device leaves on the line during the current slot: `false` pulls it low.
    pub(crate) fn drive(&self) -> bool {
        if self.stuck_low {
            return false;
        }
        match &self.phase {
            Phase::Search { bit, step: 0 } => self.rom_bit(*bit),
            Phase::Search { bit, step: 1 } => !self.rom_bit(*bit),
            Phase::ReadRom { bit } => self.rom_bit(*bit),
            Phase::Respond { data, bit } => data[bit / 8] & (1 << (bit % 8)) != 0,
            _ => true,
        }
    }

    /// Samples the line at the end of a slot.
    pub(crate) fn sample(&mut self, line: bool) {
        match &mut self.phase {
            Phase::Idle => {}
            Phase::RomCommand => {
                if let Some(cmd) = self.receive(line) {
                    self.phase = self.rom_command(cmd);
                }
            }
            Phase::Search { step, .. } if *step < 2 => *step += 1,
            Phase::Search { bit, .. } => {
                let bit = *bit;
                self.phase = if line != self.rom_bit(bit) {
                    Phase::Idle
                } else if bit == 63 {
                    Phase::Function
                } else {
                    Phase::Search {
                        bit: bit + 1,
                        step: 0,
                    }
                };
            }
            Phase::Match { bit } => {
                let bit = *bit;
                self.phase = if line != self.rom_bit(bit) {
                    Phase::Idle
                } else if bit == 63 {
                    Phase::Function
                } else {
                    Phase::Match { bit: bit + 1 }
                };
            }
            Phase::ReadRom { bit } => {
                *bit += 1;
                if *bit == 64 {
                    self.phase = Phase::Function;
                }
            }
            Phase::Function => {
                if let Some(byte) = self.receive(line) {
                    self.received.push(byte);
                    if let Some(data) = self.responses.get(&byte).filter(|d| !d.is_empty()) {
                        self.phase = Phase::Respond {
                            data: data.clone(),
                            bit: 0,
                        };
                    }
                }
            }
            Phase::Respond { data, bit } => {
                *bit += 1;
                if *bit == data.len() * 8 {
                    self.phase = Phase::Function;
                }
            }
        }
    }

    fn receive(&mut self, line: bool) -> Option<u8> {
        self.shift = (self.shift >> 1) | ((line as u8) << 7);
        self.count += 1;
        if self.count == 8 {
            self.count = 0;
            Some(self.shift)
        } else {
            None
        }
    }

    fn rom_command(&self, cmd: u8) -> Phase {
        match cmd {
            ONEWIRE_SEARCH_CMD if !self.silent => Phase::Search { bit: 0, step: 0 },
            ONEWIRE_CONDITIONAL_SEARCH_CMD if !self.silent && self.alarm => {
                Phase::Search { bit: 0, step: 0 }
            }
            ONEWIRE_MATCH_ROM_CMD => Phase::Match { bit: 0 },
            ONEWIRE_SKIP_ROM_CMD => Phase::Function,
            ONEWIRE_READ_ROM_CMD => Phase::ReadRom { bit: 0 },
            _ => Phase::Idle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn send(dev: &mut SimDevice, byte: u8) {
        for i in 0..8 {
            dev.sample(byte & (1 << i) != 0);
        }
    }

    #[test]
    fn valid_rom_from_serial() {
        let dev = SimDevice::with_serial(0x28, [1, 2, 3, 4, 5, 6]);
        assert!(OneWireCrc::validate(&dev.rom()));
        assert_eq!(dev.rom()[0], 0x28);
    }

    #[test]
    fn skip_rom_selects() {
        let mut dev = SimDevice::random(0x28);
        assert!(dev.reset());
        send(&mut dev, ONEWIRE_SKIP_ROM_CMD);
        assert!(dev.selected());
        send(&mut dev, 0x44);
        assert_eq!(dev.received(), [0x44]);
    }

    #[test]
    fn match_rom_mismatch_deselects() {
        let mut dev = SimDevice::with_serial(0x28, [1, 2, 3, 4, 5, 6]);
        let mut other = dev.rom();
        other[3] ^= 0x10;
        dev.reset();
        send(&mut dev, ONEWIRE_MATCH_ROM_CMD);
        for b in other {
            send(&mut dev, b);
        }
        assert!(!dev.selected());
    }

    #[test]
    fn search_drives_bit_and_complement() {
        let mut dev = SimDevice::new([0x01, 0, 0, 0, 0, 0, 0, 0x3d]);
        dev.reset();
        send(&mut dev, ONEWIRE_SEARCH_CMD);
        assert!(dev.drive());
        dev.sample(true);
        assert!(!dev.drive());
        dev.sample(false);
        dev.sample(true);
        assert!(!dev.drive());
        dev.sample(false);
        assert!(dev.drive());
        dev.sample(true);
        // master picks 1 where the device has 0
        dev.sample(true);
        assert!(dev.drive());
        assert!(!dev.selected());
    }

    #[test]
    fn conditional_search_needs_alarm() {
        let mut quiet = SimDevice::random(0x28);
        quiet.reset();
        send(&mut quiet, ONEWIRE_CONDITIONAL_SEARCH_CMD);
        quiet.sample(true);
        assert!(quiet.drive());
        assert!(!quiet.selected());
    }

    #[test]
    fn stuck_low_always_pulls() {
        let mut dev = SimDevice::random(0x28).stuck_low();
        dev.reset();
        assert!(!dev.drive());
    }
}
