use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Errors raised while bringing up or reconfiguring a PIO 1-Wire engine.
pub enum PioError {
    /// All state machines of the PIO block are claimed.
    NoFreeStateMachine,
    /// The program does not fit in the free instruction memory.
    NoProgramSpace,
    /// The pin is outside of the GPIO window of the PIO block.
    PinOutOfRange(u8),
    /// The system clock cannot be divided down to the 1 µs program tick.
    InvalidClockDivider,
    /// The FIFO threshold is not 0 or a multiple of 8 up to 32.
    InvalidThreshold(u8),
}

impl fmt::Display for PioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PioError::NoFreeStateMachine => write!(f, "no free PIO state machine"),
            PioError::NoProgramSpace => write!(f, "not enough PIO instruction memory"),
            PioError::PinOutOfRange(pin) => write!(f, "GPIO {pin} is not reachable from this PIO block"),
            PioError::InvalidClockDivider => write!(f, "system clock cannot produce a 1 MHz program tick"),
            PioError::InvalidThreshold(bits) => write!(f, "invalid FIFO threshold {bits}"),
        }
    }
}

impl core::error::Error for PioError {}
