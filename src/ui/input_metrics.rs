use unicode_width::UnicodeWidthChar;

pub fn char_width(ch: char) -> usize {
    UnicodeWidthChar::width(ch).unwrap_or(0)
}

pub fn display_width(text: &str) -> usize {
    text.chars().map(char_width).sum()
}

pub fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    index = index.min(text.len());
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

/// Greedy character wrap plus caret placement in one pass. `caret_byte` is
/// clamped to the nearest char boundary on its left; the returned position
/// is (row, column) in display cells within the wrapped lines.
pub struct WrappedInput {
    pub lines: Vec<String>,
    pub caret_row: usize,
    pub caret_col: usize,
}

pub fn wrap_with_caret(text: &str, caret_byte: usize, width: usize) -> WrappedInput {
    let width = width.max(1);
    let caret_byte = floor_char_boundary(text, caret_byte);

    let mut lines = vec![String::new()];
    let mut col = 0usize;
    let mut caret_row = 0usize;
    let mut caret_col = 0usize;
    let mut caret_placed = false;

    for (index, ch) in text.char_indices() {
        if index >= caret_byte && !caret_placed {
            caret_row = lines.len() - 1;
            caret_col = col;
            caret_placed = true;
        }

        if ch == '\r' {
            continue;
        }
        if ch == '\n' {
            lines.push(String::new());
            col = 0;
            continue;
        }

        let w = char_width(ch);
        if col + w > width && col > 0 {
            lines.push(String::new());
            col = 0;
        }
        lines.last_mut().expect("lines is never empty").push(ch);
        col += w;
    }

    if !caret_placed {
        caret_row = lines.len() - 1;
        caret_col = col;
    }
    if caret_col >= width {
        caret_row += 1;
        caret_col = 0;
    }

    WrappedInput {
        lines,
        caret_row,
        caret_col,
    }
}

pub fn wrap_to_width(text: &str, width: usize) -> Vec<String> {
    wrap_with_caret(text, text.len(), width).lines
}

/// Clips `text` to at most `max_width` display cells, never splitting a
/// character.
pub fn clip_to_width(text: &str, max_width: usize) -> String {
    let mut out = String::new();
    let mut used = 0usize;
    for ch in text.chars() {
        let w = char_width(ch);
        if used + w > max_width {
            break;
        }
        out.push(ch);
        used += w;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_respects_width_and_newlines() {
        let wrapped = wrap_to_width("abcd\nefghij", 4);
        assert_eq!(wrapped, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn test_caret_tracks_wrapping() {
        let result = wrap_with_caret("abcdef", 5, 4);
        assert_eq!(result.caret_row, 1);
        assert_eq!(result.caret_col, 1);
    }

    #[test]
    fn test_caret_at_end_of_full_line_moves_down() {
        let result = wrap_with_caret("abcd", 4, 4);
        assert_eq!(result.caret_row, 1);
        assert_eq!(result.caret_col, 0);
    }

    #[test]
    fn test_wide_characters_count_double() {
        assert_eq!(display_width("中文"), 4);
        let wrapped = wrap_to_width("中文中", 4);
        assert_eq!(wrapped, vec!["中文", "中"]);
    }

    #[test]
    fn test_clip_never_splits_a_character() {
        assert_eq!(clip_to_width("a中b", 2), "a");
        assert_eq!(clip_to_width("a中b", 3), "a中");
    }

    #[test]
    fn test_floor_char_boundary() {
        let text = "中";
        assert_eq!(floor_char_boundary(text, 1), 0);
        assert_eq!(floor_char_boundary(text, 99), text.len());
    }
}
