use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthStr;

/// Display width in terminal cells
pub fn display_width(s: &str) -> usize {
    UnicodeWidthStr::width(s)
}

/// Truncate a string to fit within `max_cells` terminal cells, appending `…` if truncated.
pub fn truncate_to_width(s: &str, max_cells: usize) -> String {
    if max_cells == 0 {
        return String::new();
    }
    if display_width(s) <= max_cells {
        return s.to_string();
    }
    if max_cells == 1 {
        return "\u{2026}".to_string();
    }
    let budget = max_cells - 1; // reserve 1 cell for '…'
    let mut width = 0;
    let mut result = String::new();
    for grapheme in s.graphemes(true) {
        let gw = UnicodeWidthStr::width(grapheme);
        if width + gw > budget {
            break;
        }
        width += gw;
        result.push_str(grapheme);
    }
    result.push('\u{2026}');
    result
}

/// Left-align `s` in a column of `cells` terminal cells, truncating if needed
pub fn pad_right(s: &str, cells: usize) -> String {
    let fitted = truncate_to_width(s, cells);
    let pad = cells.saturating_sub(display_width(&fitted));
    format!("{}{}", fitted, " ".repeat(pad))
}

/// Right-align `s` in a column of `cells` terminal cells, truncating if needed
pub fn pad_left(s: &str, cells: usize) -> String {
    let fitted = truncate_to_width(s, cells);
    let pad = cells.saturating_sub(display_width(&fitted));
    format!("{}{}", " ".repeat(pad), fitted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_width_ascii() {
        assert_eq!(display_width("CW-01"), 5);
    }

    #[test]
    fn display_width_umlaut_and_cjk() {
        assert_eq!(display_width("Fassade Süd"), 11);
        assert_eq!(display_width("幕墙"), 4);
    }

    #[test]
    fn truncate_fits() {
        assert_eq!(truncate_to_width("Curtain wall", 20), "Curtain wall");
    }

    #[test]
    fn truncate_appends_ellipsis() {
        assert_eq!(truncate_to_width("Curtain wall east", 8), "Curtain\u{2026}");
        assert_eq!(truncate_to_width("abc", 1), "\u{2026}");
        assert_eq!(truncate_to_width("abc", 0), "");
    }

    #[test]
    fn truncate_does_not_split_wide_chars() {
        // 3 cells before the ellipsis hold one 2-cell char, not two
        assert_eq!(truncate_to_width("幕墙幕", 4), "幕\u{2026}");
    }

    #[test]
    fn pad_aligns_by_cells() {
        assert_eq!(pad_right("Süd", 5), "Süd  ");
        assert_eq!(pad_left("7.5", 5), "  7.5");
        assert_eq!(pad_right("abcdefgh", 4), "abc\u{2026}");
    }
}
