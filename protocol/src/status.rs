//! Status codes and small shared enums carried in wire payloads.
//!
//! Ground: `examples/allanbatista-mu-rust/protocol/src/header.rs`'s
//! `ResultCode`-style enums, generalized to the full error-kind catalogue
//! spec §7 enumerates.

use crate::error::CodecError;

macro_rules! status_enum {
    ($name:ident { $($variant:ident = $value:expr),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            #[must_use]
            pub fn to_u8(self) -> u8 {
                match self {
                    $(Self::$variant => $value),+
                }
            }

            pub fn from_u8(v: u8) -> Result<Self, CodecError> {
                match v {
                    $($value => Ok(Self::$variant),)+
                    other => Err(CodecError::InvalidDiscriminant(other as u32, stringify!($name))),
                }
            }
        }
    };
}

status_enum!(ErrorKind {
    Ok = 0,
    NoLogin = 1,
    InvalidArgument = 2,
    Failure = 3,
    ServerFull = 4,
    Banned = 5,
    InvalidVersion = 6,
    InvalidTime = 7,
    ExistsUsername = 8,
    ExistsEmail = 9,
    ExistsCharName = 10,
    CaptchaWrong = 11,
    InvalidHairstyle = 12,
    InvalidHaircolor = 13,
    InvalidGender = 14,
    InvalidSlot = 15,
    TooManyChars = 16,
    AttributesOutOfRange = 17,
    AttributesTooHigh = 18,
    AttributesTooLow = 19,
    EmailExists = 20,
    InsufficientRights = 21,
    TimeOut = 22,
    AdministrativeLogoff = 23,
    PasswordBad = 24,
    PasswordOk = 25,
    DataVersionOk = 26,
    DataVersionOutdated = 27,
});

status_enum!(AccessLevel {
    Player = 0,
    Gm = 1,
    Banned = 2,
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_roundtrips() {
        for kind in [ErrorKind::Ok, ErrorKind::Banned, ErrorKind::DataVersionOutdated] {
            assert_eq!(ErrorKind::from_u8(kind.to_u8()).unwrap(), kind);
        }
    }

    #[test]
    fn unknown_discriminant_is_an_error() {
        assert!(ErrorKind::from_u8(255).is_err());
    }
}
