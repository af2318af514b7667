// SPDX-License-Identifier: Apache-2.0

use std::str::FromStr;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("invalid utf-8 sequence: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("byte {byte:#04x} at offset {offset} is not ascii")]
    NotAscii { byte: u8, offset: usize },
}

/// Character encoding for raw record bytes.
///
/// `Nop` signals that the input is unstructured: no decoding, no line
/// semantics - the splitter falls back to passthrough chunking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Encoding {
    #[default]
    Utf8,
    Ascii,
    Nop,
}

impl Encoding {
    pub fn is_nop(&self) -> bool {
        matches!(self, Encoding::Nop)
    }

    /// Decode a token into a record body.
    pub fn decode(&self, bytes: &[u8]) -> Result<String, DecodeError> {
        match self {
            Encoding::Utf8 => Ok(std::str::from_utf8(bytes)?.to_string()),
            Encoding::Ascii => {
                if let Some(offset) = bytes.iter().position(|b| !b.is_ascii()) {
                    return Err(DecodeError::NotAscii {
                        byte: bytes[offset],
                        offset,
                    });
                }
                // Safe: all-ascii is valid utf-8
                Ok(String::from_utf8_lossy(bytes).into_owned())
            }
            Encoding::Nop => Ok(String::from_utf8_lossy(bytes).into_owned()),
        }
    }
}

impl FromStr for Encoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "utf8" | "utf-8" => Ok(Encoding::Utf8),
            "ascii" | "us-ascii" => Ok(Encoding::Ascii),
            "nop" => Ok(Encoding::Nop),
            other => Err(format!("unsupported encoding `{other}`")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf8_decode() {
        assert_eq!(Encoding::Utf8.decode("héllo".as_bytes()).unwrap(), "héllo");
        assert!(Encoding::Utf8.decode(&[0xff, 0xfe]).is_err());
    }

    #[test]
    fn test_ascii_decode() {
        assert_eq!(Encoding::Ascii.decode(b"hello").unwrap(), "hello");
        let err = Encoding::Ascii.decode("héllo".as_bytes()).unwrap_err();
        assert!(matches!(err, DecodeError::NotAscii { offset: 1, .. }));
    }

    #[test]
    fn test_nop_never_fails() {
        assert_eq!(Encoding::Nop.decode(&[0xff, b'a']).unwrap(), "\u{fffd}a");
    }

    #[test]
    fn test_parse() {
        assert_eq!("utf-8".parse::<Encoding>().unwrap(), Encoding::Utf8);
        assert_eq!("NOP".parse::<Encoding>().unwrap(), Encoding::Nop);
        assert!("latin1".parse::<Encoding>().is_err());
    }
}
