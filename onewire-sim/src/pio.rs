use crate::SimBus;
use pio_onewire::{
    INSTRUCTION_WORDS, PioBlock, Pull, STATE_MACHINES, SlotArena, StateMachine,
    StateMachineConfig,
    program::{
        self, DEST_X, FETCH_BIT, Instruction, OP_JMP, OP_SET, PROGRAM, RESET_BUS, SET_PINDIRS,
        SET_PINS, WRAP_TARGET,
    },
};
use std::collections::{BTreeMap, VecDeque};

/// Depth of each FIFO of a state machine.
pub const FIFO_DEPTH: usize = 4;

#[derive(Debug, Default, Clone)]
struct Machine {
    config: Option<StateMachineConfig>,
    enabled: bool,
    pc: u8,
    tx: VecDeque<u32>,
    rx: VecDeque<u32>,
    tx_overflow: bool,
}

impl Machine {
    /// Address of the loaded 1-Wire program.
    fn offset(&self) -> Option<u8> {
        self.config.map(|cfg| cfg.wrap_target - WRAP_TARGET)
    }

    fn bits_per_word(&self) -> u8 {
        match self.config.map(|cfg| cfg.threshold) {
            Some(0) | None => 32,
            Some(bits) => bits,
        }
    }
}

/// A PIO block running the 1-Wire timing program against a [`SimBus`].
///
/// Instead of stepping through the program cycle by cycle, the block runs each
/// entry point to completion: a forced jump to the reset routine performs a
/// reset cycle and pushes the presence word, and every word pulled at the bit
/// loop runs its time slots and pushes the sampled bits. Forced `set`
/// instructions drive the data pin, which is how the strong pull-up is engaged.
#[derive(Debug, Clone)]
pub struct SimPio {
    arena: SlotArena,
    clock_hz: u32,
    memory: [u16; INSTRUCTION_WORDS as usize],
    pulls: BTreeMap<u8, Pull>,
    attached: Vec<u8>,
    pindirs: BTreeMap<u8, bool>,
    levels: BTreeMap<u8, bool>,
    machines: [Machine; STATE_MACHINES as usize],
    bus: SimBus,
}

impl SimPio {
    /// A block clocked at 125 MHz, with everything free, driving `bus`.
    pub fn new(bus: SimBus) -> Self {
        SimPio {
            arena: SlotArena::new(),
            clock_hz: 125_000_000,
            memory: [0; INSTRUCTION_WORDS as usize],
            pulls: BTreeMap::new(),
            attached: Vec::new(),
            pindirs: BTreeMap::new(),
            levels: BTreeMap::new(),
            machines: Default::default(),
            bus,
        }
    }

    /// Sets the system clock frequency.
    pub fn with_clock_hz(mut self, hz: u32) -> Self {
        self.clock_hz = hz;
        self
    }

    /// Replaces the resource bookkeeping, e.g. to move the GPIO window or
    /// pretend other programs are loaded.
    pub fn with_arena(mut self, arena: SlotArena) -> Self {
        self.arena = arena;
        self
    }

    /// The simulated bus.
    pub fn bus(&self) -> &SimBus {
        &self.bus
    }

    /// Mutable access to the simulated bus.
    pub fn bus_mut(&mut self) -> &mut SimBus {
        &mut self.bus
    }

    /// Resource bookkeeping of the block.
    pub fn arena(&self) -> &SlotArena {
        &self.arena
    }

    /// Pull resistor setting of a GPIO, if it was ever set.
    pub fn pull(&self, pin: u8) -> Option<Pull> {
        self.pulls.get(&pin).copied()
    }

    /// Whether a GPIO was handed over to the block.
    pub fn is_attached(&self, pin: u8) -> bool {
        self.attached.contains(&pin)
    }

    /// Whether a GPIO is an output.
    pub fn is_output(&self, pin: u8) -> bool {
        self.pindirs.get(&pin).copied().unwrap_or(false)
    }

    /// Output level of a GPIO.
    pub fn level(&self, pin: u8) -> bool {
        self.levels.get(&pin).copied().unwrap_or(false)
    }

    /// Configuration of a state machine, if loaded.
    pub fn config(&self, sm: u8) -> Option<StateMachineConfig> {
        self.machines[sm as usize].config
    }

    /// Whether a state machine is running.
    pub fn is_enabled(&self, sm: u8) -> bool {
        self.machines[sm as usize].enabled
    }

    /// Whether a word was pushed to a full TX FIFO.
    pub fn tx_overflow(&self, sm: u8) -> bool {
        self.machines[sm as usize].tx_overflow
    }

    /// Whether the 1-Wire program sits in instruction memory at `offset`, relocated.
    pub fn program_loaded(&self, offset: u8) -> bool {
        program::relocated(offset)
            .zip(&self.memory[offset as usize..])
            .filter(|(expected, word)| expected == *word)
            .count()
            == PROGRAM.len()
    }

    /// Whether the master actively drives the data line high.
    fn strong_pullup(&self, cfg: &StateMachineConfig) -> bool {
        let data = cfg.set_base;
        let enabled = cfg.side_set_pindirs || self.level(cfg.side_set_base);
        enabled && self.is_output(data) && self.level(data)
    }

    fn side_set(&mut self, cfg: &StateMachineConfig, value: bool) {
        if cfg.side_set_pindirs {
            self.pindirs.insert(cfg.side_set_base, value);
        } else {
            self.levels.insert(cfg.side_set_base, value);
        }
    }

    fn reset_cycle(&mut self, idx: usize) {
        let line = self.bus.reset();
        let machine = &mut self.machines[idx];
        if machine.rx.len() < FIFO_DEPTH {
            machine.rx.push_back(line as u32);
        } else {
            log::warn!("state machine {idx}: RX FIFO full, presence word dropped");
        }
    }

    /// Runs every queued word the bit loop can take.
    fn run(&mut self, idx: usize) {
        let Some(fetch) = self.machines[idx].offset().map(|o| o + FETCH_BIT) else {
            return;
        };
        loop {
            let machine = &mut self.machines[idx];
            if !machine.enabled || machine.pc != fetch || machine.rx.len() >= FIFO_DEPTH {
                return;
            }
            let Some(word) = machine.tx.pop_front() else {
                return;
            };
            let bits = machine.bits_per_word();
            let mut isr = 0u32;
            for i in 0..bits {
                let bit = word & (1 << i) != 0;
                let sampled = self.bus.slot(bit) && bit;
                isr = (isr >> 1) | ((sampled as u32) << 31);
            }
            self.machines[idx].rx.push_back(isr);
        }
    }
}

impl PioBlock for SimPio {
    fn resources(&mut self) -> &mut SlotArena {
        &mut self.arena
    }

    fn clock_hz(&self) -> u32 {
        self.clock_hz
    }

    fn write_instruction(&mut self, address: u8, word: u16) {
        self.memory[address as usize] = word;
    }

    fn set_pull(&mut self, pin: u8, pull: Pull) {
        self.pulls.insert(pin, pull);
    }

    fn attach_pin(&mut self, pin: u8) {
        if !self.attached.contains(&pin) {
            self.attached.push(pin);
        }
    }

    fn set_pindir(&mut self, _sm: &StateMachine, pin: u8, output: bool) {
        self.pindirs.insert(pin, output);
    }

    fn configure(&mut self, sm: &StateMachine, config: &StateMachineConfig) {
        let machine = &mut self.machines[sm.index() as usize];
        if machine.enabled {
            log::warn!("state machine {} configured while running", sm.index());
        }
        machine.config = Some(*config);
    }

    fn set_enabled(&mut self, sm: &StateMachine, enabled: bool) {
        self.machines[sm.index() as usize].enabled = enabled;
        self.run(sm.index() as usize);
    }

    fn restart(&mut self, _sm: &StateMachine) {}

    fn clear_fifos(&mut self, sm: &StateMachine) {
        let machine = &mut self.machines[sm.index() as usize];
        machine.tx.clear();
        machine.rx.clear();
    }

    fn exec(&mut self, sm: &StateMachine, instruction: u16) {
        let idx = sm.index() as usize;
        let instr = Instruction::from_bits(instruction);
        let Some(cfg) = self.machines[idx].config else {
            log::warn!("state machine {idx}: exec {instruction:#06x} before configuration");
            return;
        };
        self.side_set(&cfg, instr.side());
        match (instr.opcode(), instr.kind()) {
            (OP_JMP, _) => {
                let target = instr.index();
                self.machines[idx].pc = target;
                if Some(target) == self.machines[idx].offset().map(|o| o + RESET_BUS) {
                    self.reset_cycle(idx);
                    self.machines[idx].pc = target + FETCH_BIT - RESET_BUS;
                }
            }
            (OP_SET, SET_PINS) => {
                self.levels.insert(cfg.set_base, instr.index() & 1 != 0);
            }
            (OP_SET, SET_PINDIRS) => {
                self.pindirs.insert(cfg.set_base, instr.index() & 1 != 0);
            }
            (OP_SET, DEST_X) => {}
            _ => log::warn!("state machine {idx}: unsupported exec {instruction:#06x}"),
        }
        let powered = self.strong_pullup(&cfg);
        self.bus.set_powered(powered);
        self.run(idx);
    }

    fn pc(&self, sm: &StateMachine) -> u8 {
        self.machines[sm.index() as usize].pc
    }

    fn tx_full(&self, sm: &StateMachine) -> bool {
        self.machines[sm.index() as usize].tx.len() >= FIFO_DEPTH
    }

    fn put(&mut self, sm: &StateMachine, word: u32) {
        let idx = sm.index() as usize;
        let machine = &mut self.machines[idx];
        if machine.tx.len() >= FIFO_DEPTH {
            machine.tx_overflow = true;
            return;
        }
        machine.tx.push_back(word);
        self.run(idx);
    }

    fn rx_empty(&self, sm: &StateMachine) -> bool {
        self.machines[sm.index() as usize].rx.is_empty()
    }

    fn get(&mut self, sm: &StateMachine) -> u32 {
        let idx = sm.index() as usize;
        let word = self.machines[idx].rx.pop_front().unwrap_or(0);
        self.run(idx);
        word
    }
}
