//! Binary-coded decimal helpers for the DS3231 time and alarm registers.
//!
//! Each register stores a two digit decimal value with the tens digit in the
//! high nibble and the units digit in the low nibble. Flag bits sharing a
//! register (mask bits, DY/DT, century) must be stripped before decoding.

/// Decodes a two digit BCD byte.
pub const fn decode(value: u8) -> u8 {
    (value >> 4) * 10 + (value & 0x0F)
}

/// Encodes a value in `0..=99` as two BCD digits.
pub const fn encode(value: u8) -> u8 {
    ((value / 10) << 4) | (value % 10)
}
