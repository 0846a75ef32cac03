use crate::render::surface::DrawSurface;

const ELLIPSIS: char = '\u{2026}';

/// Line-breaking strategy for text blocks.
///
/// Scripts without inter-word spaces (Chinese, Japanese) need character breaks; space-delimited
/// scripts read better broken at words. `Auto` mixes both inside one string.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WrapStrategy {
    /// Break between any two characters.
    Char,
    /// Break at whitespace; words wider than a line fall back to character breaks.
    Word,
    /// Every CJK character is its own break unit; other runs break at whitespace.
    #[default]
    Auto,
}

#[derive(Debug)]
struct Unit {
    text: String,
    space_before: bool,
}

/// Wrap `text` into lines no wider than `max_width`, measuring at `size` on `surface`.
pub fn wrap_on_surface(
    surface: &mut dyn DrawSurface,
    text: &str,
    size: f64,
    max_width: f64,
    strategy: WrapStrategy,
) -> Vec<String> {
    wrap_text(text, max_width, strategy, |s| surface.measure_text(s, size))
}

/// Greedy line wrapping against an arbitrary width measure.
///
/// Explicit newlines always break. Every produced line holds at least one character, so a glyph
/// wider than `max_width` still makes progress. Whitespace at the start of a wrapped line is
/// dropped.
pub fn wrap_text(
    text: &str,
    max_width: f64,
    strategy: WrapStrategy,
    mut measure: impl FnMut(&str) -> f64,
) -> Vec<String> {
    let mut lines = Vec::new();
    if text.trim().is_empty() {
        return lines;
    }

    for paragraph in text.trim().lines() {
        let units = tokenize(paragraph, strategy);
        if units.is_empty() {
            lines.push(String::new());
            continue;
        }

        let mut line = String::new();
        for unit in units {
            if !line.is_empty() {
                let mut candidate = line.clone();
                if unit.space_before {
                    candidate.push(' ');
                }
                candidate.push_str(&unit.text);
                if measure(&candidate) <= max_width {
                    line = candidate;
                    continue;
                }
                lines.push(std::mem::take(&mut line).trim_end().to_owned());
            }

            if unit.text.trim().is_empty() {
                continue;
            }
            if measure(&unit.text) <= max_width {
                line = unit.text;
                continue;
            }
            let mut pieces = break_chars(&unit.text, max_width, &mut measure);
            line = pieces.pop().unwrap_or_default();
            lines.extend(pieces);
        }
        if !line.is_empty() {
            lines.push(line.trim_end().to_owned());
        }
    }

    lines
}

/// Cap `lines` at `max_lines`, ending the last kept line with an ellipsis that still fits.
pub fn truncate_lines(
    mut lines: Vec<String>,
    max_lines: usize,
    max_width: f64,
    mut measure: impl FnMut(&str) -> f64,
) -> Vec<String> {
    if lines.len() <= max_lines {
        return lines;
    }
    lines.truncate(max_lines.max(1));
    if let Some(last) = lines.last_mut() {
        let mut base = last.trim_end().to_owned();
        loop {
            let candidate = format!("{base}{ELLIPSIS}");
            if base.is_empty() || measure(&candidate) <= max_width {
                *last = candidate;
                break;
            }
            base.pop();
            base = base.trim_end().to_owned();
        }
    }
    lines
}

fn break_chars(
    word: &str,
    max_width: f64,
    measure: &mut impl FnMut(&str) -> f64,
) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    for c in word.chars() {
        current.push(c);
        if current.chars().count() > 1 && measure(&current) > max_width {
            current.pop();
            out.push(std::mem::take(&mut current));
            current.push(c);
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

fn tokenize(paragraph: &str, strategy: WrapStrategy) -> Vec<Unit> {
    match strategy {
        WrapStrategy::Char => paragraph
            .chars()
            .map(|c| Unit {
                text: c.to_string(),
                space_before: false,
            })
            .collect(),
        WrapStrategy::Word => paragraph
            .split_whitespace()
            .enumerate()
            .map(|(i, w)| Unit {
                text: w.to_owned(),
                space_before: i > 0,
            })
            .collect(),
        WrapStrategy::Auto => tokenize_mixed(paragraph),
    }
}

fn tokenize_mixed(paragraph: &str) -> Vec<Unit> {
    let mut units = Vec::new();
    let mut word = String::new();
    let mut pending_space = false;

    let flush = |word: &mut String, units: &mut Vec<Unit>, pending_space: &mut bool| {
        if !word.is_empty() {
            units.push(Unit {
                text: std::mem::take(word),
                space_before: *pending_space && !units.is_empty(),
            });
            *pending_space = false;
        }
    };

    for c in paragraph.chars() {
        if c.is_whitespace() {
            flush(&mut word, &mut units, &mut pending_space);
            pending_space = true;
        } else if is_cjk(c) {
            flush(&mut word, &mut units, &mut pending_space);
            units.push(Unit {
                text: c.to_string(),
                space_before: pending_space && !units.is_empty(),
            });
            pending_space = false;
        } else {
            word.push(c);
        }
    }
    flush(&mut word, &mut units, &mut pending_space);
    units
}

/// Characters from scripts written without spaces between words.
pub fn is_cjk(c: char) -> bool {
    matches!(
        c as u32,
        0x3000..=0x303F // CJK symbols and punctuation
            | 0x3040..=0x309F // Hiragana
            | 0x30A0..=0x30FF // Katakana
            | 0x3400..=0x4DBF
            | 0x4E00..=0x9FFF
            | 0xF900..=0xFAFF
            | 0xFF00..=0xFFEF // full-width forms
            | 0x20000..=0x2FFFF
    )
}

#[cfg(test)]
#[path = "../../tests/unit/render/text.rs"]
mod tests;
