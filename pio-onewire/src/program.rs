//! The 1-Wire timing program run by the coprocessor.
//!
//! One cycle is one microsecond. The program has two entry points:
//!
//! | Label | Waveform |
//! |-------|----------|
//! | [`RESET_BUS`] | 480 µs low, release, sample presence 70 µs later, 487 µs high |
//! | [`FETCH_BIT`] | one time slot per bit pulled from the TX FIFO, LSB first |
//!
//! A `1` bit is a write-1/read slot: 3 µs low, released, line sampled at 13 µs.
//! A `0` bit is a write-0 slot: 63 µs low. Both slots take at least 63 µs
//! and shift one bit into the ISR (`0` for a write-0 slot), so every FIFO word
//! written comes back as a word of sampled bits once the autopush threshold is reached.
//!
//! The reset routine reads the line with `mov isr, pins` and pushes by hand,
//! so its result word does not depend on the autopush threshold: bit 0 is the
//! line level during the presence window.
//!
//! The single side-set bit drives the external buffer direction pin, or when there
//! is no buffer, the direction of the data pin itself. `set pindirs` always targets
//! the data pin, whose output latch stays at 0 outside of strong pull-up.

use bitfield_struct::bitfield;

/// Coprocessor cycles per second: one cycle is one microsecond.
pub const TICK_HZ: u32 = 1_000_000;

/// Entry point of the reset and presence detect routine.
pub const RESET_BUS: u8 = 0;
/// Entry point of the bit loop. The state machine stalls here while the TX FIFO is empty.
pub const FETCH_BIT: u8 = 11;
/// Wrap target, relative to the program start.
pub const WRAP_TARGET: u8 = FETCH_BIT;
/// Last instruction before wrapping, relative to the program start.
pub const WRAP: u8 = 22;

const RESET_LOW: u8 = 2;
const PRESENCE_WAIT: u8 = 5;
const RESET_TAIL: u8 = 9;
const ONE_TAIL: u8 = 17;
const SEND_0: u8 = 19;
const ZERO_LOW: u8 = 20;

/// A PIO instruction word.
///
/// The 5-bit delay/side-set field is split for a program using exactly one
/// mandatory side-set bit.
#[bitfield(u16)]
#[derive(PartialEq, Eq)]
pub struct Instruction {
    /// Jump address, bit count, SET data, or MOV operation and source.
    #[bits(5)]
    pub index: u8,
    /// Jump condition, IN source, OUT/SET/MOV destination, or PUSH/PULL flags.
    #[bits(3)]
    pub kind: u8,
    /// Extra cycles to wait after the instruction.
    #[bits(4)]
    pub delay: u8,
    /// Side-set value asserted when the instruction starts.
    pub side: bool,
    /// Instruction class.
    #[bits(3)]
    pub opcode: u8,
}

/// `jmp`
pub const OP_JMP: u8 = 0b000;
/// `in`
pub const OP_IN: u8 = 0b010;
/// `out`
pub const OP_OUT: u8 = 0b011;
/// `push` / `pull`
pub const OP_PUSH_PULL: u8 = 0b100;
/// `mov`
pub const OP_MOV: u8 = 0b101;
/// `set`
pub const OP_SET: u8 = 0b111;

/// Unconditional jump.
pub const JMP_ALWAYS: u8 = 0b000;
/// Jump if X is zero.
pub const JMP_NOT_X: u8 = 0b001;
/// Jump if X is non-zero, then decrement X.
pub const JMP_X_DEC: u8 = 0b010;

/// IN/MOV source: input pins.
pub const SRC_PINS: u8 = 0b000;
/// IN source: zeroes.
pub const SRC_NULL: u8 = 0b011;

/// SET destination: output latches.
pub const SET_PINS: u8 = 0b000;
/// OUT/SET destination: scratch register X.
pub const DEST_X: u8 = 0b001;
/// SET destination: pin directions.
pub const SET_PINDIRS: u8 = 0b100;
/// MOV destination: input shift register.
pub const MOV_ISR: u8 = 0b110;

/// PUSH/PULL flags for a blocking `push`.
pub const PUSH_BLOCK: u8 = 0b001;

const fn encode(opcode: u8, kind: u8, index: u8, side: bool, delay: u8) -> u16 {
    ((opcode as u16) << 13)
        | ((side as u16) << 12)
        | ((delay as u16) << 8)
        | ((kind as u16) << 5)
        | index as u16
}

const fn jmp(cond: u8, target: u8, side: bool, delay: u8) -> u16 {
    encode(OP_JMP, cond, target, side, delay)
}

const fn set(dest: u8, value: u8, side: bool, delay: u8) -> u16 {
    encode(OP_SET, dest, value, side, delay)
}

const fn shift_in(src: u8, bits: u8, side: bool, delay: u8) -> u16 {
    encode(OP_IN, src, bits, side, delay)
}

const fn shift_out(dest: u8, bits: u8, side: bool, delay: u8) -> u16 {
    encode(OP_OUT, dest, bits, side, delay)
}

const fn mov(dest: u8, src: u8, side: bool, delay: u8) -> u16 {
    encode(OP_MOV, dest, src, side, delay)
}

const fn push(side: bool, delay: u8) -> u16 {
    encode(OP_PUSH_PULL, PUSH_BLOCK, 0, side, delay)
}

const LOW: bool = true;
const HIGH: bool = false;

/// The program, assembled for offset 0.
pub const PROGRAM: [u16; 23] = [
    // reset_bus:
    set(SET_PINDIRS, 1, LOW, 15),
    set(DEST_X, 27, LOW, 15),
    jmp(JMP_X_DEC, RESET_LOW, LOW, 15),
    set(SET_PINDIRS, 0, HIGH, 15),
    set(DEST_X, 2, HIGH, 5),
    jmp(JMP_X_DEC, PRESENCE_WAIT, HIGH, 15),
    mov(MOV_ISR, SRC_PINS, HIGH, 15),
    push(HIGH, 15),
    set(DEST_X, 22, HIGH, 15),
    jmp(JMP_X_DEC, RESET_TAIL, HIGH, 15),
    jmp(JMP_ALWAYS, FETCH_BIT, HIGH, 0),
    // fetch_bit:
    shift_out(DEST_X, 1, HIGH, 0),
    set(SET_PINDIRS, 1, LOW, 1),
    jmp(JMP_NOT_X, SEND_0, LOW, 0),
    // send_1:
    set(SET_PINDIRS, 0, HIGH, 9),
    shift_in(SRC_PINS, 1, HIGH, 15),
    set(DEST_X, 1, HIGH, 15),
    jmp(JMP_X_DEC, ONE_TAIL, HIGH, 7),
    jmp(JMP_ALWAYS, FETCH_BIT, HIGH, 1),
    // send_0:
    set(DEST_X, 3, LOW, 15),
    jmp(JMP_X_DEC, ZERO_LOW, LOW, 10),
    set(SET_PINDIRS, 0, HIGH, 1),
    shift_in(SRC_NULL, 1, HIGH, 1),
];

/// Relocate an instruction word for a program loaded at `offset`.
pub fn relocate(word: u16, offset: u8) -> u16 {
    let instr = Instruction::from_bits(word);
    if instr.opcode() == OP_JMP {
        instr.with_index(instr.index() + offset).into_bits()
    } else {
        word
    }
}

/// The program, relocated for `offset`.
pub fn relocated(offset: u8) -> impl Iterator<Item = u16> {
    PROGRAM.iter().map(move |&word| relocate(word, offset))
}

/// Forced unconditional jump to an absolute address.
pub const fn jump(address: u8) -> u16 {
    jmp(JMP_ALWAYS, address, HIGH, 0)
}

/// Forced `set pins` on the data pin output latch.
pub const fn set_latch(level: bool, side: bool) -> u16 {
    set(SET_PINS, level as u8, side, 0)
}

/// Forced `set pindirs` on the data pin.
pub const fn set_direction(output: bool, side: bool) -> u16 {
    set(SET_PINDIRS, output as u8, side, 0)
}
