use core::fmt::{self, Display};

/// One wire communication error type.
#[derive(Debug, PartialEq, Eq)]
pub enum OneWireError<E> {
    /// Encapsulates the error type from the underlying hardware.
    Other(E),
    /// Indicates that no device is present on the bus.
    NoDevicePresent,
    /// The bus was held low for a whole search pass, yielding a zero family code.
    ShortCircuit,
    /// Indicates that the operation is not implemented by this bus master,
    /// such as strong pull-up power delivery.
    Unimplemented,
    /// CRC of a data block read from a device is invalid.
    InvalidCrc,
    /// Computed CRC of the ROM is invalid.
    InvalidRomCrc,
    /// No device answered a search time slot midway through a search pass.
    SearchAborted,
}

impl<E> From<E> for OneWireError<E> {
    fn from(other: E) -> Self {
        Self::Other(other)
    }
}

impl<E: Display> Display for OneWireError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OneWireError::Other(e) => write!(f, "bus error: {}", e),
            OneWireError::NoDevicePresent => write!(f, "no device present"),
            OneWireError::ShortCircuit => write!(f, "bus held low during search"),
            OneWireError::Unimplemented => write!(f, "operation not supported by this bus master"),
            OneWireError::InvalidCrc => write!(f, "data block CRC mismatch"),
            OneWireError::InvalidRomCrc => write!(f, "ROM code CRC mismatch"),
            OneWireError::SearchAborted => write!(f, "no device answered during search"),
        }
    }
}

impl<E: fmt::Debug + Display> core::error::Error for OneWireError<E> {}
