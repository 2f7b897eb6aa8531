//! CRC-8 used by the DPA UART interface.
//!
//! Dallas/Maxim polynomial (x^8 + x^5 + x^4 + 1) in reflected form `0x8C`,
//! initial value `0xFF`.

/// Initial CRC value.
pub const CRC8_INIT: u8 = 0xFF;

const POLY_REFLECTED: u8 = 0x8C;

/// Update `crc` with one byte.
pub fn crc8_update(crc: u8, byte: u8) -> u8 {
    let mut crc = crc ^ byte;
    for _ in 0..8 {
        crc = if crc & 0x01 != 0 {
            (crc >> 1) ^ POLY_REFLECTED
        } else {
            crc >> 1
        };
    }
    crc
}

/// CRC-8 over `data`.
pub fn crc8(data: &[u8]) -> u8 {
    data.iter().fold(CRC8_INIT, |crc, b| crc8_update(crc, *b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty() {
        assert_eq!(crc8(&[]), CRC8_INIT);
    }

    #[test]
    fn test_appending_crc_yields_zero() {
        let data = [0x00, 0x00, 0x02, 0x00, 0xFF, 0xFF];
        let crc = crc8(&data);
        let mut framed = data.to_vec();
        framed.push(crc);
        assert_eq!(crc8_update(crc8(&data), crc), 0);
        assert_eq!(framed.iter().fold(CRC8_INIT, |c, b| crc8_update(c, *b)), 0);
    }

    #[test]
    fn test_detects_single_bit_flip() {
        let data = [0x12, 0x34, 0x56];
        let mut flipped = data;
        flipped[1] ^= 0x01;
        assert_ne!(crc8(&data), crc8(&flipped));
    }
}
