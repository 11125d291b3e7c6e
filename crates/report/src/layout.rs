//! Line breaking with font metrics

use crate::fonts::Font;

/// Break `text` into lines no wider than `max_width` points
///
/// Words are separated by whitespace and explicit newlines start a new line.
/// A single word wider than the line is split between characters.
#[must_use]
pub fn wrap_text(text: &str, font: Font, size: f32, max_width: f32) -> Vec<String> {
    let space = font.str_width(" ", size);
    let mut lines = Vec::new();

    for paragraph in text.split('\n') {
        let mut line = String::new();
        let mut line_width = 0.0f32;

        for word in paragraph.split_whitespace() {
            let word_width = font.str_width(word, size);

            if !line.is_empty() && line_width + space + word_width <= max_width {
                line.push(' ');
                line.push_str(word);
                line_width += space + word_width;
                continue;
            }

            if !line.is_empty() {
                lines.push(std::mem::take(&mut line));
            }

            if word_width <= max_width {
                line.push_str(word);
                line_width = word_width;
            } else {
                let mut pieces = split_word(word, font, size, max_width);
                // Last piece stays open so following words can join it
                let last = pieces.pop().unwrap_or_default();
                lines.extend(pieces);
                line_width = font.str_width(&last, size);
                line = last;
            }
        }

        lines.push(line);
    }

    // Drop trailing blank lines left by a final newline
    while lines.len() > 1 && lines.last().is_some_and(String::is_empty) {
        lines.pop();
    }
    lines
}

fn split_word(word: &str, font: Font, size: f32, max_width: f32) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut piece = String::new();
    let mut width = 0.0f32;

    for ch in word.chars() {
        let mut buf = [0u8; 4];
        let ch_width = font.str_width(ch.encode_utf8(&mut buf), size);
        if !piece.is_empty() && width + ch_width > max_width {
            pieces.push(std::mem::take(&mut piece));
            width = 0.0;
        }
        piece.push(ch);
        width += ch_width;
    }

    pieces.push(piece);
    pieces
}
