pub mod auth;
pub mod broadcast;
pub mod call_setup;
pub mod registration;
pub mod release;
pub mod traffic;

pub use auth::*;
pub use broadcast::*;
pub use call_setup::*;
pub use registration::*;
pub use release::*;
pub use traffic::*;

/// Telegram carrying nothing but the addressed subscriber identity.
/// Layout: opcode (6), futln (24), filler (40).
macro_rules! addressed_pdu {
    ($(#[$doc:meta])* $name:ident, $opcode:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $name {
            pub futln: cnetz_core::Futln,
        }

        impl $name {
            pub fn from_bitbuf(
                buffer: &mut cnetz_core::BitBuffer,
            ) -> Result<Self, cnetz_core::TelegramParseErr> {
                let opcode = buffer.read_field(6, "opcode")?;
                cnetz_core::expect_opcode!(opcode, $opcode)?;
                let futln = cnetz_core::Futln::from_bits(buffer.read_field(24, "futln")?);
                Ok(Self { futln })
            }

            pub fn to_bitbuf(&self, buffer: &mut cnetz_core::BitBuffer) {
                buffer.write_bits($opcode.into_raw(), 6);
                buffer.write_bits(self.futln.to_bits(), 24);
                let filler = buffer.get_len_remaining();
                buffer.write_zeroes(filler);
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, concat!(stringify!($name), " {{ futln: {} }}"), self.futln)
            }
        }
    };
}

/// Telegram carrying the subscriber identity plus a release/reject cause.
/// Layout: opcode (6), futln (24), cause (6), filler (34).
macro_rules! addressed_cause_pdu {
    ($(#[$doc:meta])* $name:ident, $opcode:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $name {
            pub futln: cnetz_core::Futln,
            pub cause: cnetz_core::Cause,
        }

        impl $name {
            pub fn from_bitbuf(
                buffer: &mut cnetz_core::BitBuffer,
            ) -> Result<Self, cnetz_core::TelegramParseErr> {
                let opcode = buffer.read_field(6, "opcode")?;
                cnetz_core::expect_opcode!(opcode, $opcode)?;
                let futln = cnetz_core::Futln::from_bits(buffer.read_field(24, "futln")?);
                let val = buffer.read_field(6, "cause")?;
                let cause = cnetz_core::Cause::try_from(val)
                    .map_err(|value| cnetz_core::TelegramParseErr::InvalidValue { field: "cause", value })?;
                Ok(Self { futln, cause })
            }

            pub fn to_bitbuf(&self, buffer: &mut cnetz_core::BitBuffer) {
                buffer.write_bits($opcode.into_raw(), 6);
                buffer.write_bits(self.futln.to_bits(), 24);
                buffer.write_bits(self.cause.into_raw(), 6);
                let filler = buffer.get_len_remaining();
                buffer.write_zeroes(filler);
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(
                    f,
                    concat!(stringify!($name), " {{ futln: {} cause: {} }}"),
                    self.futln, self.cause
                )
            }
        }
    };
}

/// Uplink random-access telegram opening a registration, roaming update or
/// outgoing call. Two field layouts exist: the plain one, and the auth
/// variant appending a 16-bit card code when the auth capability bit is set.
/// Layout: opcode (6), futln (24), cell_code (5), chip_card (1),
/// extended_band (1), auth (1), [card_code (16)], filler (32 or 16).
macro_rules! access_request_pdu {
    ($(#[$doc:meta])* $name:ident, $opcode:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub struct $name {
            pub futln: cnetz_core::Futln,
            pub cell_code: u8,
            /// Subscriber set holds a smart card
            pub chip_card: bool,
            /// Subscriber set supports the extended frequency range
            pub extended_band: bool,
            /// Present iff the auth capability bit is set (auth field layout)
            pub card_code: Option<u16>,
        }

        impl $name {
            pub fn from_bitbuf(
                buffer: &mut cnetz_core::BitBuffer,
            ) -> Result<Self, cnetz_core::TelegramParseErr> {
                let opcode = buffer.read_field(6, "opcode")?;
                cnetz_core::expect_opcode!(opcode, $opcode)?;
                let futln = cnetz_core::Futln::from_bits(buffer.read_field(24, "futln")?);
                let cell_code = buffer.read_field(5, "cell_code")? as u8;
                let chip_card = buffer.read_field(1, "chip_card")? != 0;
                let extended_band = buffer.read_field(1, "extended_band")? != 0;
                let auth = buffer.read_field(1, "auth")? != 0;
                let card_code = if auth {
                    Some(buffer.read_field(16, "card_code")? as u16)
                } else {
                    None
                };
                Ok(Self { futln, cell_code, chip_card, extended_band, card_code })
            }

            pub fn to_bitbuf(&self, buffer: &mut cnetz_core::BitBuffer) {
                buffer.write_bits($opcode.into_raw(), 6);
                buffer.write_bits(self.futln.to_bits(), 24);
                buffer.write_bits(self.cell_code as u64, 5);
                buffer.write_bits(self.chip_card as u64, 1);
                buffer.write_bits(self.extended_band as u64, 1);
                buffer.write_bits(self.card_code.is_some() as u64, 1);
                if let Some(code) = self.card_code {
                    buffer.write_bits(code as u64, 16);
                }
                let filler = buffer.get_len_remaining();
                buffer.write_zeroes(filler);
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(
                    f,
                    concat!(
                        stringify!($name),
                        " {{ futln: {} cell_code: {} chip_card: {} extended_band: {} card_code: {:?} }}"
                    ),
                    self.futln, self.cell_code, self.chip_card, self.extended_band, self.card_code
                )
            }
        }
    };
}

/// Downlink quittance carrying identity and the answering cell.
/// Layout: opcode (6), futln (24), cell_code (5), filler (35).
macro_rules! cell_ack_pdu {
    ($(#[$doc:meta])* $name:ident, $opcode:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $name {
            pub futln: cnetz_core::Futln,
            pub cell_code: u8,
        }

        impl $name {
            pub fn from_bitbuf(
                buffer: &mut cnetz_core::BitBuffer,
            ) -> Result<Self, cnetz_core::TelegramParseErr> {
                let opcode = buffer.read_field(6, "opcode")?;
                cnetz_core::expect_opcode!(opcode, $opcode)?;
                let futln = cnetz_core::Futln::from_bits(buffer.read_field(24, "futln")?);
                let cell_code = buffer.read_field(5, "cell_code")? as u8;
                Ok(Self { futln, cell_code })
            }

            pub fn to_bitbuf(&self, buffer: &mut cnetz_core::BitBuffer) {
                buffer.write_bits($opcode.into_raw(), 6);
                buffer.write_bits(self.futln.to_bits(), 24);
                buffer.write_bits(self.cell_code as u64, 5);
                let filler = buffer.get_len_remaining();
                buffer.write_zeroes(filler);
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(
                    f,
                    concat!(stringify!($name), " {{ futln: {} cell_code: {} }}"),
                    self.futln, self.cell_code
                )
            }
        }
    };
}

pub(crate) use {access_request_pdu, addressed_cause_pdu, addressed_pdu, cell_ack_pdu};
