//! Standard Type 1 Helvetica faces: WinAnsi encoding and glyph widths

/// Built-in font faces used by the report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Font {
    Regular,
    Bold,
    Oblique,
}

impl Font {
    pub const ALL: [Font; 3] = [Font::Regular, Font::Bold, Font::Oblique];

    /// Name in the page resource dictionary
    #[must_use]
    pub const fn resource_name(self) -> &'static str {
        match self {
            Font::Regular => "F1",
            Font::Bold => "F2",
            Font::Oblique => "F3",
        }
    }

    #[must_use]
    pub const fn base_font(self) -> &'static str {
        match self {
            Font::Regular => "Helvetica",
            Font::Bold => "Helvetica-Bold",
            Font::Oblique => "Helvetica-Oblique",
        }
    }

    /// Advance width of a WinAnsi code in thousandths of the font size
    #[must_use]
    pub fn glyph_width(self, code: u8) -> u16 {
        let table = match self {
            // Oblique shares the upright metrics
            Font::Regular | Font::Oblique => &HELVETICA_ASCII,
            Font::Bold => &HELVETICA_BOLD_ASCII,
        };
        match code {
            32..=126 => table[usize::from(code - 32)],
            0x85 | 0x97 => 1000,
            0x95 => 350,
            0x96 => 556,
            0x91 | 0x92 => {
                if self == Font::Bold {
                    278
                } else {
                    222
                }
            }
            0x93 | 0x94 => {
                if self == Font::Bold {
                    500
                } else {
                    333
                }
            }
            0xA0 => 278,
            // Accented Latin-1 letters are close to the average lowercase advance
            _ => 556,
        }
    }

    /// Width of encoded text at `size` points
    #[must_use]
    pub fn text_width(self, encoded: &[u8], size: f32) -> f32 {
        let units: u32 = encoded.iter().map(|&b| u32::from(self.glyph_width(b))).sum();
        units as f32 * size / 1000.0
    }

    /// Width of `text` at `size` points, after WinAnsi encoding
    #[must_use]
    pub fn str_width(self, text: &str, size: f32) -> f32 {
        self.text_width(&encode_win_ansi(text), size)
    }
}

/// Widths of codes 32..=126 for Helvetica
const HELVETICA_ASCII: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' ' - '/'
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, // '0' - '?'
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, // '@' - 'O'
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556, // 'P' - '_'
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, // '`' - 'o'
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584, // 'p' - '~'
];

/// Widths of codes 32..=126 for Helvetica-Bold
const HELVETICA_BOLD_ASCII: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278, // ' ' - '/'
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611, // '0' - '?'
    975, 722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778, // '@' - 'O'
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 333, 278, 333, 584, 556, // 'P' - '_'
    333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611, // '`' - 'o'
    611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584, // 'p' - '~'
];

/// WinAnsi code for `ch`, if it has one
#[must_use]
pub fn win_ansi_code(ch: char) -> Option<u8> {
    let code = match ch {
        ' '..='~' | '\u{A0}'..='\u{FF}' => return u8::try_from(u32::from(ch)).ok(),
        '\t' => b' ',
        '€' => 0x80,
        '‚' => 0x82,
        'ƒ' => 0x83,
        '„' => 0x84,
        '…' => 0x85,
        '†' => 0x86,
        '‡' => 0x87,
        'ˆ' => 0x88,
        '‰' => 0x89,
        'Š' => 0x8A,
        '‹' => 0x8B,
        'Œ' => 0x8C,
        'Ž' => 0x8E,
        '‘' => 0x91,
        '’' => 0x92,
        '“' => 0x93,
        '”' => 0x94,
        '•' => 0x95,
        '–' => 0x96,
        '—' => 0x97,
        '˜' => 0x98,
        '™' => 0x99,
        'š' => 0x9A,
        '›' => 0x9B,
        'œ' => 0x9C,
        'ž' => 0x9E,
        'Ÿ' => 0x9F,
        _ => return None,
    };
    Some(code)
}

/// Encode text for a WinAnsi font; unmappable characters become `?`
#[must_use]
pub fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|ch| win_ansi_code(ch).unwrap_or(b'?'))
        .collect()
}
