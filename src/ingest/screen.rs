//! Content screen for processable CSVs.
//!
//! Files that would break downstream parsing or storage are moved to the
//! not-processed list before any validator runs:
//! - bytes that are not valid UTF-8
//! - null bytes and control characters (tab, LF and CR are allowed)
//! - a BOM anywhere but the very start of the file
//! - problematic whitespace and invisible format characters
//! - Unicode non-characters

use std::fs;
use std::path::PathBuf;

use super::classify::{display_name, Classification, NotProcessedFile};

const UTF8_BOM: char = '\u{FEFF}';

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum CharIssue {
    NullByte,
    Control,
    MisplacedBom,
    Whitespace,
    Format,
    NonCharacter,
}

impl CharIssue {
    fn label(&self) -> &'static str {
        match self {
            Self::NullByte => "Null bytes (0x00)",
            Self::Control => "Control characters",
            Self::MisplacedBom => "BOM character in middle of content",
            Self::Whitespace => "Problematic whitespace",
            Self::Format => "Invisible format characters",
            Self::NonCharacter => "Unicode non-characters",
        }
    }

    fn of(c: char) -> Option<Self> {
        match c {
            '\0' => Some(Self::NullByte),
            '\t' | '\n' | '\r' => None,
            '\u{01}'..='\u{1F}' | '\u{7F}'..='\u{9F}' => Some(Self::Control),
            UTF8_BOM => Some(Self::MisplacedBom),
            '\u{A0}' | '\u{1680}' | '\u{2000}'..='\u{200A}' | '\u{2028}' | '\u{2029}'
            | '\u{202F}' | '\u{205F}' | '\u{3000}' => Some(Self::Whitespace),
            '\u{AD}' | '\u{200B}'..='\u{200F}' | '\u{202A}'..='\u{202E}'
            | '\u{2060}'..='\u{2064}' => Some(Self::Format),
            '\u{FDD0}'..='\u{FDEF}' => Some(Self::NonCharacter),
            c if (c as u32) & 0xFFFE == 0xFFFE => Some(Self::NonCharacter),
            _ => None,
        }
    }
}

/// Short Unicode name of a flagged character.
fn char_name(c: char) -> &'static str {
    const C0: [&str; 32] = [
        "NULL",
        "START OF HEADING",
        "START OF TEXT",
        "END OF TEXT",
        "END OF TRANSMISSION",
        "ENQUIRY",
        "ACKNOWLEDGE",
        "BELL",
        "BACKSPACE",
        "CHARACTER TABULATION",
        "LINE FEED",
        "LINE TABULATION",
        "FORM FEED",
        "CARRIAGE RETURN",
        "SHIFT OUT",
        "SHIFT IN",
        "DATA LINK ESCAPE",
        "DEVICE CONTROL ONE",
        "DEVICE CONTROL TWO",
        "DEVICE CONTROL THREE",
        "DEVICE CONTROL FOUR",
        "NEGATIVE ACKNOWLEDGE",
        "SYNCHRONOUS IDLE",
        "END OF TRANSMISSION BLOCK",
        "CANCEL",
        "END OF MEDIUM",
        "SUBSTITUTE",
        "ESCAPE",
        "INFORMATION SEPARATOR FOUR",
        "INFORMATION SEPARATOR THREE",
        "INFORMATION SEPARATOR TWO",
        "INFORMATION SEPARATOR ONE",
    ];

    match c {
        '\u{0}'..='\u{1F}' => C0[c as usize],
        '\u{7F}' => "DELETE",
        '\u{80}'..='\u{9F}' => "C1 CONTROL",
        '\u{A0}' => "NO-BREAK SPACE",
        '\u{AD}' => "SOFT HYPHEN",
        '\u{1680}' => "OGHAM SPACE MARK",
        '\u{2000}'..='\u{200A}' => "SPACE",
        '\u{200B}' => "ZERO WIDTH SPACE",
        '\u{200C}' => "ZERO WIDTH NON-JOINER",
        '\u{200D}' => "ZERO WIDTH JOINER",
        '\u{200E}' => "LEFT-TO-RIGHT MARK",
        '\u{200F}' => "RIGHT-TO-LEFT MARK",
        '\u{2028}' => "LINE SEPARATOR",
        '\u{2029}' => "PARAGRAPH SEPARATOR",
        '\u{202A}'..='\u{202E}' => "BIDI FORMATTING",
        '\u{202F}' => "NARROW NO-BREAK SPACE",
        '\u{205F}' => "MEDIUM MATHEMATICAL SPACE",
        '\u{2060}' => "WORD JOINER",
        '\u{2061}'..='\u{2064}' => "INVISIBLE OPERATOR",
        '\u{3000}' => "IDEOGRAPHIC SPACE",
        UTF8_BOM => "ZERO WIDTH NO-BREAK SPACE",
        _ => "NONCHARACTER",
    }
}

/// Inspect file content. `Err` carries the rejection reason.
pub fn inspect_content(bytes: &[u8]) -> Result<(), String> {
    let text = match std::str::from_utf8(bytes) {
        Ok(t) => t,
        Err(e) => {
            return Err(format!(
                "File is not valid UTF-8:\n  - Invalid byte sequence at byte offset {}",
                e.valid_up_to()
            ))
        }
    };

    // A leading BOM is allowed
    let body = text.strip_prefix(UTF8_BOM).unwrap_or(text);

    // First occurrence of each issue, in category order
    let mut found: Vec<(CharIssue, char, usize)> = Vec::new();
    for (position, c) in body.chars().enumerate() {
        if let Some(issue) = CharIssue::of(c) {
            if !found.iter().any(|(seen, _, _)| *seen == issue) {
                found.push((issue, c, position));
            }
        }
    }

    if found.is_empty() {
        return Ok(());
    }
    found.sort_by_key(|(issue, _, _)| *issue);

    let mut reason = String::from("File contains invalid characters:");
    for (issue, c, position) in found {
        reason.push_str(&format!(
            "\n  - {}: U+{:04X} ({}) at position {}",
            issue.label(),
            c as u32,
            char_name(c),
            position
        ));
    }
    Err(reason)
}

/// Move processable files whose content fails inspection to the not-processed list.
/// Unreadable files are moved as well.
pub fn screen(classification: Classification) -> Classification {
    let Classification {
        processable,
        mut not_processed,
    } = classification;

    let mut accepted: Vec<PathBuf> = Vec::with_capacity(processable.len());
    for path in processable {
        let name = display_name(&path);
        let verdict = fs::read(&path)
            .map_err(|e| format!("File could not be read: {e}"))
            .and_then(|bytes| inspect_content(&bytes));

        match verdict {
            Ok(()) => accepted.push(path),
            Err(reason) => {
                tracing::warn!(file = %name, reason = %reason, "CSV rejected by content screen");
                not_processed.push(NotProcessedFile::new(name, reason));
            }
        }
    }

    not_processed.sort_by(|a, b| a.file_name.cmp(&b.file_name));
    Classification {
        processable: accepted,
        not_processed,
    }
}
