use crate::{SlotArena, StateMachine};
use fixed::types::U24F8;

/// Pull resistor setting of a GPIO.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Pull {
    /// No internal pull. The 1-Wire line relies on its external pull-up.
    #[default]
    None,
    /// Internal pull-up.
    Up,
    /// Internal pull-down.
    Down,
}

/// Configuration of one state machine, as loaded by [`PioBlock::configure`].
///
/// Addresses are absolute instruction memory addresses, pins are GPIO numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateMachineConfig {
    /// System clock cycles per program cycle.
    pub clock_divider: U24F8,
    /// Where execution continues after `wrap`.
    pub wrap_target: u8,
    /// Last instruction before wrapping.
    pub wrap: u8,
    /// Pin driven by the side-set bit.
    pub side_set_base: u8,
    /// The side-set bit drives the pin direction instead of its level.
    pub side_set_pindirs: bool,
    /// Pin targeted by `set pins` and `set pindirs`.
    pub set_base: u8,
    /// Pin sampled by `in pins` and `mov isr, pins`.
    pub in_base: u8,
    /// Autopull and autopush threshold in bits, 0 meaning 32.
    pub threshold: u8,
}

/// Access to the registers of one PIO block.
///
/// The block owns the [`SlotArena`] recording which of its state machines and
/// instruction words are in use. Every state machine operation takes the
/// [`StateMachine`] token claimed from that arena.
pub trait PioBlock {
    /// Shared resource bookkeeping of the block.
    fn resources(&mut self) -> &mut SlotArena;

    /// Frequency of the clock feeding the block, in Hz.
    fn clock_hz(&self) -> u32;

    /// Writes one word of instruction memory.
    fn write_instruction(&mut self, address: u8, word: u16);

    /// Sets the pull resistor of a GPIO.
    fn set_pull(&mut self, pin: u8, pull: Pull);

    /// Hands a GPIO over to the block.
    fn attach_pin(&mut self, pin: u8);

    /// Sets the direction of a GPIO from a state machine.
    fn set_pindir(&mut self, sm: &StateMachine, pin: u8, output: bool);

    /// Loads a configuration. The state machine must be disabled.
    fn configure(&mut self, sm: &StateMachine, config: &StateMachineConfig);

    /// Starts or stops a state machine.
    fn set_enabled(&mut self, sm: &StateMachine, enabled: bool);

    /// Clears the internal state of a state machine: shift registers, counters and delays.
    fn restart(&mut self, sm: &StateMachine);

    /// Discards the content of both FIFOs.
    fn clear_fifos(&mut self, sm: &StateMachine);

    /// Executes one instruction immediately, as if fetched.
    fn exec(&mut self, sm: &StateMachine, instruction: u16);

    /// Absolute address of the instruction being executed.
    fn pc(&self, sm: &StateMachine) -> u8;

    /// Whether the TX FIFO is full.
    fn tx_full(&self, sm: &StateMachine) -> bool;

    /// Pushes a word to the TX FIFO.
    fn put(&mut self, sm: &StateMachine, word: u32);

    /// Whether the RX FIFO is empty.
    fn rx_empty(&self, sm: &StateMachine) -> bool;

    /// Pops a word from the RX FIFO.
    fn get(&mut self, sm: &StateMachine) -> u32;
}

impl<T: PioBlock + ?Sized> PioBlock for &mut T {
    fn resources(&mut self) -> &mut SlotArena {
        T::resources(self)
    }

    fn clock_hz(&self) -> u32 {
        T::clock_hz(self)
    }

    fn write_instruction(&mut self, address: u8, word: u16) {
        T::write_instruction(self, address, word)
    }

    fn set_pull(&mut self, pin: u8, pull: Pull) {
        T::set_pull(self, pin, pull)
    }

    fn attach_pin(&mut self, pin: u8) {
        T::attach_pin(self, pin)
    }

    fn set_pindir(&mut self, sm: &StateMachine, pin: u8, output: bool) {
        T::set_pindir(self, sm, pin, output)
    }

    fn configure(&mut self, sm: &StateMachine, config: &StateMachineConfig) {
        T::configure(self, sm, config)
    }

    fn set_enabled(&mut self, sm: &StateMachine, enabled: bool) {
        T::set_enabled(self, sm, enabled)
    }

    fn restart(&mut self, sm: &StateMachine) {
        T::restart(self, sm)
    }

    fn clear_fifos(&mut self, sm: &StateMachine) {
        T::clear_fifos(self, sm)
    }

    fn exec(&mut self, sm: &StateMachine, instruction: u16) {
        T::exec(self, sm, instruction)
    }

    fn pc(&self, sm: &StateMachine) -> u8 {
        T::pc(self, sm)
    }

    fn tx_full(&self, sm: &StateMachine) -> bool {
        T::tx_full(self, sm)
    }

    fn put(&mut self, sm: &StateMachine, word: u32) {
        T::put(self, sm, word)
    }

    fn rx_empty(&self, sm: &StateMachine) -> bool {
        T::rx_empty(self, sm)
    }

    fn get(&mut self, sm: &StateMachine) -> u32 {
        T::get(self, sm)
    }
}
