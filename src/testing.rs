//! In-memory DS3231 register file for tests that care about chip state
//! rather than the exact bus transactions.

use embedded_hal::i2c::{ErrorKind, ErrorType, I2c, NoAcknowledgeSource, Operation};

use crate::DEFAULT_ADDRESS;

/// Number of registers on the DS3231 (0x00..=0x12).
pub const REGISTER_COUNT: usize = 0x13;

/// A DS3231 answering on [`DEFAULT_ADDRESS`] with an auto-incrementing
/// register pointer.
#[derive(Debug, Clone)]
pub struct RegisterFile {
    pub regs: [u8; REGISTER_COUNT],
    pointer: usize,
    /// Fail every transaction, as an unplugged module would.
    pub offline: bool,
}

impl RegisterFile {
    pub fn new() -> Self {
        Self::with(&[])
    }

    /// A register file with the given `(register, value)` pairs preset.
    pub fn with(values: &[(u8, u8)]) -> Self {
        let mut regs = [0; REGISTER_COUNT];
        for &(register, value) in values {
            regs[usize::from(register)] = value;
        }
        Self {
            regs,
            pointer: 0,
            offline: false,
        }
    }

    pub fn reg(&self, register: crate::RegAddr) -> u8 {
        self.regs[register as usize]
    }
}

impl ErrorType for RegisterFile {
    type Error = ErrorKind;
}

impl I2c for RegisterFile {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        if self.offline || address != DEFAULT_ADDRESS {
            return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
        }
        for operation in operations {
            match operation {
                Operation::Write(bytes) => {
                    if let Some((register, data)) = bytes.split_first() {
                        self.pointer = usize::from(*register) % REGISTER_COUNT;
                        for byte in data {
                            self.regs[self.pointer] = *byte;
                            self.pointer = (self.pointer + 1) % REGISTER_COUNT;
                        }
                    }
                }
                Operation::Read(buffer) => {
                    for byte in buffer.iter_mut() {
                        *byte = self.regs[self.pointer];
                        self.pointer = (self.pointer + 1) % REGISTER_COUNT;
                    }
                }
            }
        }
        Ok(())
    }
}
