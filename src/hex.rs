// Hex encoding used by the HTTP oracle wire format.
use crate::error::HexError;

pub fn bytes_to_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .fold(String::with_capacity(bytes.len() * 2), |s, hb| s + &hb)
}

pub fn hex_to_bytes(hex: &str) -> Result<Vec<u8>, HexError> {
    if hex.len() % 2 != 0 {
        return Err(HexError::OddLength(hex.len()));
    }
    let chars: Vec<char> = hex.chars().collect();
    chars.chunks(2).map(hex_pair_to_byte).collect()
}

fn hex_pair_to_byte(pair: &[char]) -> Result<u8, HexError> {
    let digits = pair.iter().collect::<String>();
    if !pair.iter().all(char::is_ascii_hexdigit) {
        return Err(HexError::InvalidDigit(digits));
    }
    u8::from_str_radix(&digits, 16).map_err(|_| HexError::InvalidDigit(digits))
}
