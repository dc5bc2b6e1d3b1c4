use crate::PioError;

/// Number of state machines in a PIO block.
pub const STATE_MACHINES: u8 = 4;
/// Number of instruction words in a PIO block.
pub const INSTRUCTION_WORDS: u8 = 32;
/// Number of GPIOs a PIO block can reach, starting at its GPIO base.
pub const GPIO_WINDOW: u8 = 32;

/// An exclusively claimed state machine.
///
/// The token is not `Clone`: whoever holds it is the only driver of the state machine,
/// and handing it back to [`SlotArena::release`] consumes it.
#[derive(Debug, PartialEq, Eq)]
pub struct StateMachine(u8);

impl StateMachine {
    /// Index of the state machine within its PIO block.
    pub fn index(&self) -> u8 {
        self.0
    }
}

/// A range of instruction memory holding a loaded program.
#[derive(Debug, PartialEq, Eq)]
pub struct ProgramSpace {
    offset: u8,
    len: u8,
}

impl ProgramSpace {
    /// Address of the first instruction.
    pub fn offset(&self) -> u8 {
        self.offset
    }

    /// Number of instruction words.
    pub fn len(&self) -> u8 {
        self.len
    }

    /// Whether the range is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn mask(&self) -> u32 {
        span_mask(self.offset, self.len)
    }
}

fn span_mask(offset: u8, len: u8) -> u32 {
    let bits = if len >= 32 { u32::MAX } else { (1u32 << len) - 1 };
    bits << offset
}

/// Bookkeeping of the shared resources of one PIO block: its state machines
/// and its instruction memory.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SlotArena {
    claimed: u8,
    used: u32,
    gpio_base: u8,
}

impl SlotArena {
    /// An arena with everything free, for a block whose GPIO window starts at 0.
    pub const fn new() -> Self {
        SlotArena {
            claimed: 0,
            used: 0,
            gpio_base: 0,
        }
    }

    /// Sets the first GPIO reachable from the block.
    pub const fn with_gpio_base(mut self, base: u8) -> Self {
        self.gpio_base = base;
        self
    }

    /// First GPIO reachable from the block.
    pub fn gpio_base(&self) -> u8 {
        self.gpio_base
    }

    /// Whether `pin` can be driven by this block.
    pub fn covers(&self, pin: u8) -> bool {
        pin >= self.gpio_base && pin - self.gpio_base < GPIO_WINDOW
    }

    /// Claims the lowest free state machine.
    pub fn claim(&mut self) -> Result<StateMachine, PioError> {
        let index = (0..STATE_MACHINES)
            .find(|i| self.claimed & (1 << i) == 0)
            .ok_or(PioError::NoFreeStateMachine)?;
        self.claimed |= 1 << index;
        Ok(StateMachine(index))
    }

    /// Returns a state machine to the pool.
    pub fn release(&mut self, sm: StateMachine) {
        self.claimed &= !(1 << sm.0);
    }

    /// Number of state machines currently claimed.
    pub fn claimed(&self) -> u32 {
        self.claimed.count_ones()
    }

    /// Reserves `len` consecutive instruction words at the lowest free offset.
    pub fn allocate(&mut self, len: u8) -> Result<ProgramSpace, PioError> {
        if len == 0 || len > INSTRUCTION_WORDS {
            return Err(PioError::NoProgramSpace);
        }
        let offset = (0..=INSTRUCTION_WORDS - len)
            .find(|&offset| self.used & span_mask(offset, len) == 0)
            .ok_or(PioError::NoProgramSpace)?;
        let space = ProgramSpace { offset, len };
        self.used |= space.mask();
        Ok(space)
    }

    /// Frees a program range.
    pub fn free(&mut self, space: ProgramSpace) {
        self.used &= !space.mask();
    }

    /// Number of instruction words currently in use.
    pub fn used_words(&self) -> u32 {
        self.used.count_ones()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claims_lowest_free_state_machine() {
        let mut arena = SlotArena::new();
        let sms: [StateMachine; 4] = core::array::from_fn(|_| arena.claim().unwrap());
        assert_eq!(sms.iter().map(StateMachine::index).collect::<Vec<_>>(), [0, 1, 2, 3]);
        assert_eq!(arena.claim(), Err(PioError::NoFreeStateMachine));
        let [_, second, ..] = sms;
        arena.release(second);
        assert_eq!(arena.claim().unwrap().index(), 1);
    }

    #[test]
    fn allocates_lowest_free_offset() {
        let mut arena = SlotArena::new();
        let a = arena.allocate(4).unwrap();
        let b = arena.allocate(23).unwrap();
        assert_eq!((a.offset(), b.offset()), (0, 4));
        assert_eq!(arena.allocate(23), Err(PioError::NoProgramSpace));
        arena.free(a);
        let c = arena.allocate(5).unwrap();
        assert_eq!(c.offset(), 27);
        let d = arena.allocate(4).unwrap();
        assert_eq!(d.offset(), 0);
        assert_eq!(arena.used_words(), 32);
    }

    #[test]
    fn full_memory_program() {
        let mut arena = SlotArena::new();
        let all = arena.allocate(32).unwrap();
        assert_eq!(all.offset(), 0);
        assert_eq!(arena.allocate(1), Err(PioError::NoProgramSpace));
        arena.free(all);
        assert_eq!(arena.used_words(), 0);
        assert_eq!(arena.allocate(0), Err(PioError::NoProgramSpace));
        assert_eq!(arena.allocate(33), Err(PioError::NoProgramSpace));
    }

    #[test]
    fn gpio_window() {
        let arena = SlotArena::new().with_gpio_base(16);
        assert!(!arena.covers(15));
        assert!(arena.covers(16));
        assert!(arena.covers(47));
        assert!(!arena.covers(48));
    }
}
