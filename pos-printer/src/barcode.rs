//! EAN-13 helpers shared by the label builders

use crate::error::{PrintError, PrintResult};

/// Modules in an EAN-13 symbol (guards included)
pub const EAN13_MODULES: u32 = 95;

const L_CODES: [&str; 10] = [
    "0001101", "0011001", "0010011", "0111101", "0100011", "0110001", "0101111", "0111011",
    "0110111", "0001011",
];
const G_CODES: [&str; 10] = [
    "0100111", "0110011", "0011011", "0100001", "0011101", "0111001", "0000101", "0010001",
    "0001001", "0010111",
];
const R_CODES: [&str; 10] = [
    "1110010", "1100110", "1101100", "1000010", "1011100", "1001110", "1010000", "1000100",
    "1001000", "1110100",
];
// L/G selection for the left half, indexed by the first digit
const PARITY: [&str; 10] = [
    "LLLLLL", "LLGLGG", "LLGGLG", "LLGGGL", "LGLLGG", "LGGLLG", "LGGGLL", "LGLGLG", "LGLGGL",
    "LGGLGL",
];

/// Check digit for 12 data digits (weights 1, 3, 1, … from the left)
pub fn check_digit(digits: &[u8; 12]) -> u8 {
    let sum: u32 = digits
        .iter()
        .enumerate()
        .map(|(i, d)| *d as u32 * if i % 2 == 0 { 1 } else { 3 })
        .sum();
    ((10 - sum % 10) % 10) as u8
}

/// Strip non-digits; 12 digits get a check digit, 13 pass unchanged
pub fn normalize_ean13(raw: &str) -> PrintResult<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    match digits.len() {
        13 => Ok(digits),
        12 => {
            let mut data = [0u8; 12];
            for (slot, b) in data.iter_mut().zip(digits.bytes()) {
                *slot = b - b'0';
            }
            Ok(format!("{}{}", digits, check_digit(&data)))
        }
        n => Err(PrintError::InvalidBarcode(format!(
            "expected 12 or 13 digits, got {} in {:?}",
            n, raw
        ))),
    }
}

/// Module pattern of a 13-digit code; `true` = bar
pub fn ean13_modules(code: &str) -> PrintResult<Vec<bool>> {
    let digits: Vec<usize> = code
        .chars()
        .map(|c| c.to_digit(10).map(|d| d as usize))
        .collect::<Option<_>>()
        .filter(|d: &Vec<usize>| d.len() == 13)
        .ok_or_else(|| PrintError::InvalidBarcode(format!("not 13 digits: {:?}", code)))?;

    let mut pattern = String::with_capacity(EAN13_MODULES as usize);
    pattern.push_str("101");
    for (i, parity) in PARITY[digits[0]].chars().enumerate() {
        let d = digits[i + 1];
        pattern.push_str(if parity == 'L' { L_CODES[d] } else { G_CODES[d] });
    }
    pattern.push_str("01010");
    for d in &digits[7..] {
        pattern.push_str(R_CODES[*d]);
    }
    pattern.push_str("101");

    Ok(pattern.chars().map(|c| c == '1').collect())
}

/// Modules a printer will draw for `code`, used for centering
pub fn estimated_modules(code: &str) -> u32 {
    match code.len() {
        13 | 12 => EAN13_MODULES,
        8 => 67,
        n => 11 * n as u32 + 35,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_digit() {
        assert_eq!(normalize_ean13("400638133393").unwrap(), "4006381333931");
        assert_eq!(normalize_ean13("4600000000000").unwrap(), "4600000000000");
        assert_eq!(normalize_ean13("460-12345-678 9").unwrap(), "4601234567893");
    }

    #[test]
    fn test_invalid_length() {
        for raw in ["", "12345", "12345678901234", "abc"] {
            assert!(matches!(
                normalize_ean13(raw),
                Err(PrintError::InvalidBarcode(_))
            ));
        }
    }

    #[test]
    fn test_modules() {
        let modules = ean13_modules("4006381333931").unwrap();
        assert_eq!(modules.len(), EAN13_MODULES as usize);
        // start, centre and end guards
        assert_eq!(&modules[..3], &[true, false, true]);
        assert_eq!(&modules[45..50], &[false, true, false, true, false]);
        assert_eq!(&modules[92..], &[true, false, true]);
        // first digit 4 -> LGLLGG; second digit 0 in L code
        let second: Vec<bool> = "0001101".chars().map(|c| c == '1').collect();
        assert_eq!(&modules[3..10], second.as_slice());

        assert!(ean13_modules("12345").is_err());
    }

    #[test]
    fn test_estimated_modules() {
        assert_eq!(estimated_modules("4006381333931"), 95);
        assert_eq!(estimated_modules("400638133393"), 95);
        assert_eq!(estimated_modules("12345670"), 67);
        assert_eq!(estimated_modules("12345"), 90);
    }
}
