//! Name normalization for titles and author names.

const ANNOTATION_PAIRS: &[(char, char)] = &[
    ('【', '】'),
    ('【', '】'),
    ('【', '】'),
    ('[', ']'),
    ('{', '}'),
    ('<', '>'),
    ('［', '］'),
    ('｛', '｝'),
    ('〔', '〕'),
    ('＜', '＞'),
];

const ROUND_BRACKET_PAIRS: &[(char, char)] = &[('(', ')'), ('（', '）')];

/// Everything from the first of these (when not leading) is decoration.
const DECORATION_MARKERS: &[char] = &['@', '＠', '～', '〜', '─', '…', '、', '。'];

/// Characters that separate a main title from its sub title.
const TITLE_SEPARATORS: &[char] = &['～', '〜', '－', '（'];

#[derive(Debug, Clone, Copy)]
pub struct NameOptions {
    /// Cut everything from the first decoration marker.
    pub truncate_decorations: bool,
    /// Strip bracket-delimited annotations.
    pub strip_annotations: bool,
    /// Also strip round brackets (only with `strip_annotations`).
    pub strip_round_brackets: bool,
}

impl NameOptions {
    pub const AUTHOR: Self = Self {
        truncate_decorations: true,
        strip_annotations: true,
        strip_round_brackets: false,
    };

    pub const TITLE: Self = Self {
        truncate_decorations: false,
        strip_annotations: true,
        strip_round_brackets: true,
    };
}

impl Default for NameOptions {
    fn default() -> Self {
        Self::AUTHOR
    }
}

pub fn normalized_name(name: &str, options: NameOptions) -> String {
    if name.is_empty() {
        return String::new();
    }

    let mut chars: Vec<char> = name.chars().collect();
    let original_len = chars.len();

    if options.strip_annotations {
        for &(open, close) in ANNOTATION_PAIRS {
            remove_first_pair(&mut chars, open, close, original_len);
        }
        if options.strip_round_brackets {
            for &(open, close) in ROUND_BRACKET_PAIRS {
                remove_first_pair(&mut chars, open, close, original_len);
            }
        }
    }

    if options.truncate_decorations {
        for marker in DECORATION_MARKERS {
            if let Some(pos) = chars.iter().position(|c| c == marker)
                && pos > 0
            {
                chars.truncate(pos);
            }
        }
    }

    collapse_ideographic_spaces(&chars.into_iter().collect::<String>())
}

/// Replaces ideographic spaces with ASCII spaces and trims.
pub fn collapse_ideographic_spaces(text: &str) -> String {
    text.replace('\u{3000}', " ").trim().to_owned()
}

// A pair spanning the whole original name is kept, otherwise the name would vanish.
fn remove_first_pair(chars: &mut Vec<char>, open: char, close: char, original_len: usize) {
    let Some(start) = chars.iter().position(|&c| c == open) else {
        return;
    };
    let Some(end) = chars.iter().position(|&c| c == close) else {
        return;
    };
    if end > start && end - start + 1 < original_len {
        chars.drain(start..=end);
    }
}

/// Splits a title into main and sub title.
///
/// A separator counts only when it occurs after the first character and appears
/// again later in the title (`本編～副題～`). The sub title keeps its separator.
pub fn split_title(title: &str) -> (&str, &str) {
    for separator in TITLE_SEPARATORS {
        let Some(first) = title.find(*separator) else {
            continue;
        };
        let Some(last) = title.rfind(*separator) else {
            continue;
        };
        if first > 0 && last > first {
            return (&title[..first], &title[first..]);
        }
    }
    (title, "")
}
