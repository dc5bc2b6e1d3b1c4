#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
/// Calculate CRC-8 used in 1-Wire communications.
///
/// Dallas/Maxim polynomial `x^8 + x^5 + x^4 + 1` (`0x8c` reflected), shifted
/// least significant bit first, with no final XOR. Folding a block that ends
/// with its own CRC yields zero.
pub struct OneWireCrc(u8);

const POLY: u8 = 0x8c;

#[cfg(feature = "crc-table")]
static CRC_TABLE: [u8; 256] = {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        table[i] = OneWireCrc::update_bitwise(0, i as u8);
        i += 1;
    }
    table
};

impl OneWireCrc {
    /// Create a CRC accumulator starting at zero.
    pub const fn new() -> Self {
        Self(0)
    }

    /// Get the current CRC value
    pub fn value(&self) -> u8 {
        self.0
    }

    /// Update the CRC with the incoming byte.
    pub fn update(&mut self, byte: u8) {
        self.0 = Self::update_byte(self.0, byte);
    }

    /// Fold one byte into an accumulator and return the new accumulator.
    #[cfg(feature = "crc-table")]
    pub fn update_byte(crc: u8, byte: u8) -> u8 {
        CRC_TABLE[(crc ^ byte) as usize]
    }

    /// Fold one byte into an accumulator and return the new accumulator.
    #[cfg(not(feature = "crc-table"))]
    pub fn update_byte(crc: u8, byte: u8) -> u8 {
        Self::update_bitwise(crc, byte)
    }

    const fn update_bitwise(crc: u8, byte: u8) -> u8 {
        let mut crc = crc;
        let mut byte = byte;
        let mut bit = 0;
        while bit < 8 {
            let mix = (crc ^ byte) & 0x01;
            crc >>= 1;
            if mix != 0 {
                crc ^= POLY;
            }
            byte >>= 1;
            bit += 1;
        }
        crc
    }

    /// Compute the CRC of a sequence of bytes, starting from zero.
    pub fn compute(sequence: &[u8]) -> u8 {
        sequence
            .iter()
            .fold(0, |crc, &byte| Self::update_byte(crc, byte))
    }

    /// Validate a sequence of bytes where the last byte is the 1-Wire CRC of
    /// the previous bytes.
    pub fn validate(sequence: &[u8]) -> bool {
        Self::compute(sequence) == 0
    }
}
