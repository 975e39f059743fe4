//! Terminal display width helpers.
//!
//! ANSI-aware width calculation so preview padding stays aligned when widget
//! labels carry colour codes.

/// Compute the display width of a string after stripping ANSI escapes.
pub fn display_width(text: &str) -> usize {
    let clean = strip_ansi_escapes::strip(text);
    let clean_str = String::from_utf8_lossy(&clean);
    unicode_width::UnicodeWidthStr::width(&*clean_str)
}

/// Pad with spaces or truncate so the line occupies exactly `width` columns.
pub fn fit_to_width(line: &mut String, width: usize) {
    let mut display = display_width(line);
    while display > width {
        line.pop();
        display = display_width(line);
    }
    while display < width {
        line.push(' ');
        display += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignores_ansi_and_counts_wide_chars() {
        assert_eq!(display_width("\x1b[31mred\x1b[0m"), 3);
        assert_eq!(display_width("天気"), 4);
    }

    #[test]
    fn fits_lines_both_ways() {
        let mut short = "ab".to_string();
        fit_to_width(&mut short, 4);
        assert_eq!(short, "ab  ");

        let mut long = "abcdef".to_string();
        fit_to_width(&mut long, 3);
        assert_eq!(long, "abc");

        let mut wide = "a天".to_string();
        fit_to_width(&mut wide, 2);
        assert_eq!(wide, "a ");
    }
}
