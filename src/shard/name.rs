//! Record names: 160-bit identifiers written as 40 hex characters.

use crate::error::{Result, ShardError};

/// Raw record name length in bytes
pub const RAW_NAME_LEN: usize = 20;

/// Decode a 40-character hex name
pub fn parse_hex_name(hex_name: &str) -> Result<[u8; RAW_NAME_LEN]> {
    if hex_name.len() != RAW_NAME_LEN * 2 {
        return Err(ShardError::InvalidName(format!(
            "{:?}: expected {} hex characters, got {}",
            hex_name,
            RAW_NAME_LEN * 2,
            hex_name.len()
        )));
    }
    let mut raw = [0u8; RAW_NAME_LEN];
    hex::decode_to_slice(hex_name, &mut raw)
        .map_err(|e| ShardError::InvalidName(format!("{:?}: {}", hex_name, e)))?;
    Ok(raw)
}

/// Lowercase hex encoding of a raw name
pub fn hex_name(raw: &[u8; RAW_NAME_LEN]) -> String {
    hex::encode(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let name = "0615f6b1c0de00000000000000000000deadbeef";
        let raw = parse_hex_name(name).unwrap();
        assert_eq!(raw[0], 0x06);
        assert_eq!(raw[19], 0xef);
        assert_eq!(hex_name(&raw), name);
    }

    #[test]
    fn test_uppercase_accepted() {
        let raw = parse_hex_name("ABCDEF0000000000000000000000000000000001").unwrap();
        assert_eq!(raw[0], 0xab);
    }

    #[test]
    fn test_invalid_names() {
        for bad in ["", "abc", "zz15f6b1c0de00000000000000000000deadbeef", "0615f6b1c0de00000000000000000000deadbeef00"] {
            let err = parse_hex_name(bad).unwrap_err();
            assert!(matches!(err, ShardError::InvalidName(_)), "{}", bad);
        }
    }
}
