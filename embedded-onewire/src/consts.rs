//! ROM command constants for 1-Wire communication.

/// Command to match a specific ROM address.
pub const ONEWIRE_MATCH_ROM_CMD: u8 = 0x55;

/// Command to skip ROM addressing and talk to every device on the bus.
pub const ONEWIRE_SKIP_ROM_CMD: u8 = 0xcc;

/// Command to read the ROM code of the only device on the bus.
///
/// All devices answer at once, so on a multidrop bus the result is the
/// wired-AND of every code and fails its CRC check.
pub const ONEWIRE_READ_ROM_CMD: u8 = 0x33;

/// Command to search for devices on the 1-Wire bus.
pub const ONEWIRE_SEARCH_CMD: u8 = 0xf0;

/// Command to search for devices in alarm state on the 1-Wire bus.
pub const ONEWIRE_CONDITIONAL_SEARCH_CMD: u8 = 0xec;
