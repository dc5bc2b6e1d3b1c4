use crate::{
    PioBlock, PioError, ProgramSpace, Pull, StateMachine, StateMachineConfig,
    program::{self, FETCH_BIT, PROGRAM, RESET_BUS, TICK_HZ, WRAP, WRAP_TARGET},
};
use bitfield_struct::bitfield;
use embedded_onewire::OneWireStatus;
use fixed::types::{U24F8, U48F16};

/// GPIOs used by a 1-Wire engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OneWirePins {
    /// The open-drain 1-Wire data line.
    pub data: u8,
    /// Direction control of an external bus buffer, if the line is buffered.
    ///
    /// Without a buffer the engine switches the data pin between output-low
    /// and input.
    pub dir: Option<u8>,
}

/// Bus status after a 1-Wire reset.
#[bitfield(u8)]
pub struct PioStatus {
    /// The line was low while sampled in the presence window.
    pub presence_detect: bool,
    /// The strong pull-up was engaged.
    pub power_active: bool,
    #[bits(6)]
    __: u8,
}

impl OneWireStatus for PioStatus {
    fn presence(&self) -> bool {
        self.presence_detect()
    }

    fn power(&self) -> Option<bool> {
        Some(self.power_active())
    }
}

/// Divider bringing `clock_hz` down to the program tick.
///
/// The divider register holds 16 integer and 8 fractional bits, so the
/// integer part must lie in `1..=0xffff`.
pub fn clock_divider(clock_hz: u32) -> Result<U24F8, PioError> {
    let ratio = U48F16::from_num(clock_hz) / U48F16::from_num(TICK_HZ);
    match ratio.checked_to_num::<U24F8>() {
        Some(div) if div >= U24F8::ONE && div.to_num::<u32>() <= 0xffff => Ok(div),
        _ => Err(PioError::InvalidClockDivider),
    }
}

/// Checks a bulk FIFO threshold: 0 for full words, otherwise whole bytes up to 32 bits.
pub(crate) fn check_threshold(bits: u8) -> Result<u8, PioError> {
    match bits {
        0 | 32 => Ok(32),
        8 | 16 | 24 => Ok(bits),
        _ => Err(PioError::InvalidThreshold(bits)),
    }
}

/// Extracts the `bits` sampled slots from a word pushed by the program.
pub(crate) fn sampled(word: u32, bits: u8) -> u32 {
    if bits >= 32 { word } else { word >> (32 - bits) }
}

/// Ownership of one state machine running the timing program.
///
/// Non-blocking register level operations; the transfer layers add the waiting.
pub(crate) struct PioEngine<P: PioBlock> {
    pio: P,
    sm: StateMachine,
    space: ProgramSpace,
    pins: OneWirePins,
    config: StateMachineConfig,
    /// Bulk transfer width in bits.
    pub(crate) batch: u8,
    pub(crate) power: bool,
}

impl<P: PioBlock> PioEngine<P> {
    pub(crate) fn init(mut pio: P, pins: OneWirePins, batch: u8) -> Result<Self, PioError> {
        let batch = check_threshold(batch)?;
        for pin in core::iter::once(pins.data).chain(pins.dir) {
            if !pio.resources().covers(pin) {
                return Err(PioError::PinOutOfRange(pin));
            }
        }
        let clock_divider = clock_divider(pio.clock_hz())?;

        let sm = pio.resources().claim()?;
        let space = match pio.resources().allocate(PROGRAM.len() as u8) {
            Ok(space) => space,
            Err(e) => {
                pio.resources().release(sm);
                return Err(e);
            }
        };
        // pads are only touched once the block is ours
        pio.set_pull(pins.data, Pull::None);
        let offset = space.offset();
        for (addr, word) in (offset..).zip(program::relocated(offset)) {
            pio.write_instruction(addr, word);
        }

        pio.attach_pin(pins.data);
        pio.set_pindir(&sm, pins.data, false);
        if let Some(dir) = pins.dir {
            pio.attach_pin(dir);
            pio.set_pindir(&sm, dir, true);
        }
        let config = StateMachineConfig {
            clock_divider,
            wrap_target: offset + WRAP_TARGET,
            wrap: offset + WRAP,
            side_set_base: pins.dir.unwrap_or(pins.data),
            side_set_pindirs: pins.dir.is_none(),
            set_base: pins.data,
            in_base: pins.data,
            threshold: 8,
        };
        let mut engine = PioEngine {
            pio,
            sm,
            space,
            pins,
            config,
            batch,
            power: false,
        };
        engine.start();
        log::debug!(
            "1-Wire engine on GPIO {} (dir {:?}): state machine {}, program at {}, divider {}",
            pins.data,
            pins.dir,
            engine.sm.index(),
            offset,
            clock_divider
        );
        Ok(engine)
    }

    /// Loads the cached configuration and starts fresh at `FETCH_BIT` with the data latch low.
    fn start(&mut self) {
        self.pio.set_enabled(&self.sm, false);
        self.pio.configure(&self.sm, &self.config);
        self.pio.clear_fifos(&self.sm);
        self.pio.restart(&self.sm);
        self.pio.exec(&self.sm, program::set_latch(false, false));
        self.pio
            .exec(&self.sm, program::jump(self.space.offset() + FETCH_BIT));
        self.pio.set_enabled(&self.sm, true);
    }

    pub(crate) fn release(self) -> P {
        let PioEngine {
            mut pio,
            sm,
            space,
            pins,
            ..
        } = self;
        pio.set_enabled(&sm, false);
        pio.set_pindir(&sm, pins.data, false);
        log::debug!(
            "1-Wire engine on GPIO {} released state machine {}",
            pins.data,
            sm.index()
        );
        pio.resources().free(space);
        pio.resources().release(sm);
        pio
    }

    pub(crate) fn pins(&self) -> OneWirePins {
        self.pins
    }

    pub(crate) fn is_idle(&self) -> bool {
        self.pio.pc(&self.sm) == self.space.offset() + FETCH_BIT
    }

    /// Current autopush/autopull threshold in bits.
    pub(crate) fn threshold(&self) -> u8 {
        match self.config.threshold {
            0 => 32,
            bits => bits,
        }
    }

    /// Changes the autopush/autopull threshold. The state machine must be idle.
    pub(crate) fn retune(&mut self, bits: u8) {
        if self.threshold() == bits {
            return;
        }
        self.config.threshold = bits % 32;
        self.start();
        log::trace!("1-Wire FIFO threshold set to {bits} bits");
    }

    pub(crate) fn start_reset(&mut self) {
        self.pio
            .exec(&self.sm, program::jump(self.space.offset() + RESET_BUS));
    }

    pub(crate) fn try_put(&mut self, word: u32) -> bool {
        if self.pio.tx_full(&self.sm) {
            return false;
        }
        self.pio.put(&self.sm, word);
        true
    }

    pub(crate) fn try_get(&mut self) -> Option<u32> {
        if self.pio.rx_empty(&self.sm) {
            None
        } else {
            Some(self.pio.get(&self.sm))
        }
    }

    /// Stops the program and drives the line high. The state machine must be idle.
    pub(crate) fn power_on(&mut self) {
        self.pio.set_enabled(&self.sm, false);
        self.pio.exec(&self.sm, program::set_latch(true, false));
        self.pio.exec(&self.sm, program::set_direction(true, true));
        self.power = true;
    }

    pub(crate) fn power_off(&mut self) {
        self.pio.exec(&self.sm, program::set_direction(false, false));
        self.pio.exec(&self.sm, program::set_latch(false, false));
        self.pio.set_enabled(&self.sm, true);
        self.power = false;
    }
}
