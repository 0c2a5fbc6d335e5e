//! Quote-aware token view over a single message
//!
//! A [`TokenView`] is a cursor into the text of one invocation. Words are
//! separated by whitespace; a word that starts with an opening quote runs to
//! the matching closing quote and may contain whitespace. There is no escape
//! syntax.
//!
//! Every read records where it started, so the most recent read can be
//! rolled back with [`TokenView::undo`]. Optional and union parameters rely
//! on this to try a token without consuming it.

use crate::error::{CmdResult, CommandError};

/// Opening and closing quote pairs recognised by the tokenizer
///
/// The ASCII apostrophe is not a quote so that words like "don't" stay intact.
pub const QUOTE_PAIRS: &[(char, char)] = &[
    ('"', '"'),
    ('\u{201c}', '\u{201d}'), // “ ”
    ('\u{201e}', '\u{201d}'), // „ ”
    ('\u{00ab}', '\u{00bb}'), // « »
    ('\u{300c}', '\u{300d}'), // 「 」
    ('\u{300e}', '\u{300f}'), // 『 』
];

fn closing_quote(open: char) -> Option<char> {
    QUOTE_PAIRS
        .iter()
        .find(|(o, _)| *o == open)
        .map(|(_, c)| *c)
}

fn is_quote(ch: char) -> bool {
    QUOTE_PAIRS.iter().any(|(o, c)| *o == ch || *c == ch)
}

/// Cursor over the text of one invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenView {
    buffer: String,
    /// Byte offset of the cursor, always on a char boundary
    index: usize,
    /// Cursor position before the most recent read
    previous: usize,
}

impl TokenView {
    /// Create a view positioned at the start of `buffer`
    pub fn new(buffer: impl Into<String>) -> Self {
        Self {
            buffer: buffer.into(),
            index: 0,
            previous: 0,
        }
    }

    /// The full text being read
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// Current byte offset
    pub fn position(&self) -> usize {
        self.index
    }

    /// Text from the cursor to the end
    pub fn remaining(&self) -> &str {
        &self.buffer[self.index..]
    }

    /// True when nothing is left to read
    pub fn eof(&self) -> bool {
        self.index >= self.buffer.len()
    }

    /// Advance past any whitespace; returns whether anything was skipped
    pub fn skip_whitespace(&mut self) -> bool {
        let rest = self.remaining();
        let skipped = rest.len() - rest.trim_start().len();
        self.index += skipped;
        skipped > 0
    }

    /// Consume `prefix` if the remaining text starts with it
    pub fn skip_string(&mut self, prefix: &str) -> bool {
        if self.remaining().starts_with(prefix) {
            self.previous = self.index;
            self.index += prefix.len();
            true
        } else {
            false
        }
    }

    /// Read a run of non-whitespace characters, ignoring quotes
    pub fn read_word(&mut self) -> Option<String> {
        if self.eof() {
            return None;
        }
        self.previous = self.index;
        let rest = self.remaining();
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        let word = rest[..end].to_string();
        self.index += end;
        Some(word)
    }

    /// Read one word, honouring quotes
    ///
    /// Returns `Ok(None)` at end of input. On error the cursor is left where
    /// the read began, so [`undo`](Self::undo) is a no-op.
    pub fn read_quoted_word(&mut self) -> CmdResult<Option<String>> {
        if self.eof() {
            return Ok(None);
        }
        let start = self.index;
        self.previous = start;
        let rest = self.remaining();
        let mut chars = rest.char_indices();
        let first = match chars.next() {
            Some((_, c)) => c,
            None => return Ok(None),
        };

        let (word, consumed) = match closing_quote(first) {
            Some(close) => {
                let body_start = first.len_utf8();
                let close_at = rest[body_start..]
                    .find(close)
                    .map(|i| i + body_start)
                    .ok_or(CommandError::UnterminatedQuote {
                        expected: close,
                        position: start,
                    })?;
                let after = close_at + close.len_utf8();
                if let Some(next) = rest[after..].chars().next() {
                    if !next.is_whitespace() {
                        return Err(CommandError::InvalidEndOfQuotedString {
                            found: next,
                            position: start + after,
                        });
                    }
                }
                (rest[body_start..close_at].to_string(), after)
            }
            None => {
                let mut end = rest.len();
                for (i, ch) in rest.char_indices() {
                    if ch.is_whitespace() {
                        end = i;
                        break;
                    }
                    if is_quote(ch) {
                        return Err(CommandError::UnexpectedQuote {
                            quote: ch,
                            position: start + i,
                        });
                    }
                }
                (rest[..end].to_string(), end)
            }
        };

        self.index = start + consumed;
        Ok(Some(word))
    }

    /// Consume everything that is left, verbatim
    pub fn read_rest(&mut self) -> String {
        self.previous = self.index;
        let rest = self.remaining().to_string();
        self.index = self.buffer.len();
        rest
    }

    /// Roll the cursor back to where the most recent read started
    pub fn undo(&mut self) {
        self.index = self.previous;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(text: &str) -> CmdResult<Vec<String>> {
        let mut view = TokenView::new(text);
        let mut out = Vec::new();
        loop {
            view.skip_whitespace();
            match view.read_quoted_word()? {
                Some(w) => out.push(w),
                None => return Ok(out),
            }
        }
    }

    #[test]
    fn test_plain_words() {
        assert_eq!(words("a bb  ccc").unwrap(), ["a", "bb", "ccc"]);
        assert_eq!(words("   ").unwrap(), Vec::<String>::new());
    }

    #[test]
    fn test_quoted_word_keeps_spaces() {
        assert_eq!(words(r#""hello world" x"#).unwrap(), ["hello world", "x"]);
        assert_eq!(words("\u{201c}smart quotes\u{201d}").unwrap(), ["smart quotes"]);
        assert_eq!(words("\u{00ab}guillemets ok\u{00bb} y").unwrap(), ["guillemets ok", "y"]);
        assert_eq!(words(r#""""#).unwrap(), [""]);
    }

    #[test]
    fn test_apostrophe_is_not_a_quote() {
        assert_eq!(words("don't stop").unwrap(), ["don't", "stop"]);
    }

    #[test]
    fn test_unexpected_quote() {
        let err = words(r#"ab"c"#).unwrap_err();
        assert!(matches!(err, CommandError::UnexpectedQuote { quote: '"', position: 2 }));
    }

    #[test]
    fn test_unterminated_quote() {
        let err = words(r#"x "abc"#).unwrap_err();
        assert!(matches!(err, CommandError::UnterminatedQuote { expected: '"', position: 2 }));
    }

    #[test]
    fn test_invalid_end_of_quoted_string() {
        let err = words(r#""abc"d"#).unwrap_err();
        assert!(matches!(err, CommandError::InvalidEndOfQuotedString { found: 'd', .. }));
    }

    #[test]
    fn test_undo_restores_position() {
        for text in ["one two", r#""a b" c"#, "x", "\u{300c}q\u{300d} z"] {
            let mut view = TokenView::new(text);
            let before = view.position();
            view.read_quoted_word().unwrap();
            view.undo();
            assert_eq!(view.position(), before, "text {text:?}");
        }
    }

    #[test]
    fn test_undo_then_reread_gives_same_token() {
        for text in ["one two", r#""a b" c"#, "\u{300c}q r\u{300d} z", "h\u{e9}llo w"] {
            let mut view = TokenView::new(text);
            let first = view.read_quoted_word().unwrap();
            view.undo();
            assert_eq!(view.read_quoted_word().unwrap(), first, "text {text:?}");

            let mut view = TokenView::new(text);
            let first = view.read_word();
            view.undo();
            assert_eq!(view.read_word(), first, "text {text:?}");
        }
    }

    #[test]
    fn test_quoted_word_cursor_lands_after_close() {
        let bodies = ["", "plain", "two words", "h\u{e9}llo w\u{f6}rld", "\u{65e5}\u{672c} \u{8a9e}", "don't"];
        for &(open, close) in QUOTE_PAIRS {
            for body in bodies {
                let text = format!("{open}{body}{close} rest");
                let mut view = TokenView::new(text.as_str());
                assert_eq!(view.read_quoted_word().unwrap().as_deref(), Some(body));
                let expected = open.len_utf8() + body.len() + close.len_utf8();
                assert_eq!(view.position(), expected, "text {text:?}");
                assert_eq!(view.remaining(), " rest");
            }
        }
    }

    #[test]
    fn test_failed_read_leaves_cursor() {
        let mut view = TokenView::new(r#"ok "broken"#);
        view.read_word();
        view.skip_whitespace();
        let at = view.position();
        assert!(view.read_quoted_word().is_err());
        assert_eq!(view.position(), at);
        view.undo();
        assert_eq!(view.position(), at);
    }

    #[test]
    fn test_read_word_ignores_quotes() {
        let mut view = TokenView::new(r#"a"b c"#);
        assert_eq!(view.read_word().as_deref(), Some(r#"a"b"#));
        assert_eq!(view.remaining(), " c");
    }

    #[test]
    fn test_read_rest_is_verbatim() {
        let mut view = TokenView::new(r#"cmd  "quoted" and   more "#);
        view.read_word();
        view.skip_whitespace();
        assert_eq!(view.read_rest(), r#""quoted" and   more "#);
        assert!(view.eof());
        view.undo();
        assert_eq!(view.remaining(), r#""quoted" and   more "#);
    }

    #[test]
    fn test_skip_string() {
        let mut view = TokenView::new("!!ping");
        assert!(view.skip_string("!!"));
        assert!(!view.skip_string("?"));
        assert_eq!(view.read_word().as_deref(), Some("ping"));
    }
}
