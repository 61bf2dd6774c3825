//! Cyrillic code pages for thermal printer firmware
//!
//! Receipt and label printers sold in CIS markets ship without Unicode
//! support. Text is sent as single-byte CP866 or CP1251.
//!
//! The encoder is deliberately narrow: ASCII, the Russian alphabet, Ё/ё and
//! the № sign. Everything else becomes `?` so output is always printable.

use std::borrow::Cow;

/// Replacement byte for unmapped characters
pub const UNMAPPED: u8 = 0x3F;

/// Supported printer code pages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Codepage {
    /// DOS Cyrillic (IBM866)
    Cp866,
    /// Windows Cyrillic
    #[default]
    Cp1251,
}

impl Codepage {
    /// Map an ESC/POS `ESC t n` table number to the encoder it selects
    ///
    /// Firmware vendors disagree on numbering; 17/18/59/66 are PC866 on the
    /// common Xprinter/Epson clones, 22/73 are WPC1251. Unknown tables fall
    /// back to CP1251.
    pub fn from_escpos_table(n: u8) -> Self {
        match n {
            17 | 18 | 59 | 66 => Codepage::Cp866,
            22 | 73 => Codepage::Cp1251,
            _ => Codepage::Cp1251,
        }
    }

    /// Encode text into this code page (total, never fails)
    pub fn encode(self, text: &str) -> Vec<u8> {
        encode(text, self)
    }

    /// Decode printer bytes back to text, for previews and logs
    pub fn decode(self, bytes: &[u8]) -> Cow<'_, str> {
        let (text, _, _) = self.encoding().decode(bytes);
        text
    }

    /// TSPL `CODEPAGE` argument
    pub fn tspl_name(self) -> &'static str {
        match self {
            Codepage::Cp866 => "866",
            Codepage::Cp1251 => "1251",
        }
    }

    fn encoding(self) -> &'static encoding_rs::Encoding {
        match self {
            Codepage::Cp866 => encoding_rs::IBM866,
            Codepage::Cp1251 => encoding_rs::WINDOWS_1251,
        }
    }
}

/// Encode `text` into single-byte `codepage` output
pub fn encode(text: &str, codepage: Codepage) -> Vec<u8> {
    let map = match codepage {
        Codepage::Cp866 => map_cp866,
        Codepage::Cp1251 => map_cp1251,
    };
    text.chars().map(map).collect()
}

fn map_cp866(c: char) -> u8 {
    let cp = c as u32;
    match cp {
        0x00..=0x7F => cp as u8,
        // А-Я
        0x0410..=0x042F => (0x80 + (cp - 0x0410)) as u8,
        // а-п
        0x0430..=0x043F => (0xA0 + (cp - 0x0430)) as u8,
        // р-я
        0x0440..=0x044F => (0xE0 + (cp - 0x0440)) as u8,
        0x0401 => 0xF0,
        0x0451 => 0xF1,
        0x2116 => 0xFC,
        _ => UNMAPPED,
    }
}

fn map_cp1251(c: char) -> u8 {
    let cp = c as u32;
    match cp {
        0x00..=0x7F => cp as u8,
        0x0410..=0x042F => (0xC0 + (cp - 0x0410)) as u8,
        0x0430..=0x044F => (0xE0 + (cp - 0x0430)) as u8,
        0x0401 => 0xA8,
        0x0451 => 0xB8,
        0x2116 => 0xB9,
        _ => UNMAPPED,
    }
}
