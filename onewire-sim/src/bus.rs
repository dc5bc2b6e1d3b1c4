use crate::SimDevice;
use embedded_onewire::RomCode;

/// An open-drain 1-Wire line shared by simulated devices.
///
/// The line is a wired-AND: it reads high only when the master and every
/// device release it.
#[derive(Debug, Default, Clone)]
pub struct SimBus {
    devices: Vec<SimDevice>,
    resets: usize,
    slots: usize,
    powered: bool,
    power_cycles: usize,
    powered_slots: usize,
    frames: Vec<Vec<bool>>,
}

impl SimBus {
    /// A bus with the given devices attached.
    pub fn new(devices: impl IntoIterator<Item = SimDevice>) -> Self {
        SimBus {
            devices: devices.into_iter().collect(),
            ..Default::default()
        }
    }

    /// Attaches one more device.
    pub fn attach(&mut self, device: SimDevice) {
        self.devices.push(device);
    }

    /// Devices on the bus.
    pub fn devices(&self) -> &[SimDevice] {
        &self.devices
    }

    /// The device with the given ROM code.
    pub fn device(&self, rom: &RomCode) -> Option<&SimDevice> {
        self.devices.iter().find(|d| d.rom() == *rom)
    }

    /// Number of reset pulses seen.
    pub fn resets(&self) -> usize {
        self.resets
    }

    /// Number of time slots seen.
    pub fn slots(&self) -> usize {
        self.slots
    }

    /// Whether the master drives the line high through the strong pull-up.
    pub fn powered(&self) -> bool {
        self.powered
    }

    /// Number of times the strong pull-up was engaged.
    pub fn power_cycles(&self) -> usize {
        self.power_cycles
    }

    /// Number of time slots run while the strong pull-up was engaged.
    pub fn powered_slots(&self) -> usize {
        self.powered_slots
    }

    /// Bytes written by the master since the last reset, reads counting as `0xff`.
    pub fn last_frame(&self) -> Vec<u8> {
        self.frames.last().map(|bits| pack(bits)).unwrap_or_default()
    }

    pub(crate) fn set_powered(&mut self, powered: bool) {
        if powered != self.powered {
            log::debug!("strong pull-up {}", if powered { "on" } else { "off" });
            if powered {
                self.power_cycles += 1;
            }
        }
        self.powered = powered;
    }

    /// Runs a reset and presence detect cycle. Returns the line level in the presence window.
    pub(crate) fn reset(&mut self) -> bool {
        self.resets += 1;
        self.frames.push(Vec::new());
        let mut line = true;
        for dev in self.devices.iter_mut() {
            line &= !dev.reset();
        }
        line && self.devices.iter().all(SimDevice::drive)
    }

    /// Runs one time slot. The master releases the line early for a `1`
    /// and holds it low for a `0`. Returns the line level at the sampling point.
    pub(crate) fn slot(&mut self, master: bool) -> bool {
        if self.powered {
            log::warn!("time slot while the strong pull-up is engaged");
            self.powered_slots += 1;
        }
        self.slots += 1;
        if let Some(frame) = self.frames.last_mut() {
            frame.push(master);
        }
        let line = master && self.devices.iter().all(SimDevice::drive);
        for dev in self.devices.iter_mut() {
            dev.sample(line);
        }
        line
    }
}

fn pack(bits: &[bool]) -> Vec<u8> {
    bits.chunks_exact(8)
        .map(|byte| {
            byte.iter()
                .rev()
                .fold(0u8, |acc, &bit| (acc << 1) | bit as u8)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_bus_has_no_presence() {
        let mut bus = SimBus::default();
        assert!(bus.reset());
        assert!(bus.slot(true));
        assert_eq!(bus.resets(), 1);
    }

    #[test]
    fn wired_and() {
        let mut bus = SimBus::new([SimDevice::random(0x28), SimDevice::random(0x10).stuck_low()]);
        assert!(!bus.reset());
        assert!(!bus.slot(true));
    }

    #[test]
    fn frames_pack_lsb_first() {
        let mut bus = SimBus::default();
        bus.reset();
        for i in 0..8 {
            bus.slot(0xcc & (1 << i) != 0);
        }
        bus.slot(true);
        assert_eq!(bus.last_frame(), [0xcc]);
        assert_eq!(bus.slots(), 9);
    }
}
