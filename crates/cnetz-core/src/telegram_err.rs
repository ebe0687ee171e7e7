#[derive(Debug, PartialEq, Eq)]
pub enum TelegramParseErr {
    InvalidOpcode { expected: u64, found: u64 },
    UnknownOpcode { found: u64 },
    BufferEnded { field: Option<&'static str> },
    InvalidValue { field: &'static str, value: u64 },
    InvalidDigit { nibble: u8 },
}

/// Checks whether an opcode value matches the expected one.
/// If not, returns TelegramParseErr::InvalidOpcode.
#[macro_export]
macro_rules! expect_opcode {
    ($value:expr, $expected:expr) => {{
        let raw_expected = $expected.into_raw();
        if $value == raw_expected {
            Ok(())
        } else {
            Err($crate::telegram_err::TelegramParseErr::InvalidOpcode {
                expected: raw_expected,
                found: $value,
            })
        }
    }};
}
