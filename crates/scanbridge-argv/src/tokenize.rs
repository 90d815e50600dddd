//! Command-line tokenizer.

use thiserror::Error;

/// Error returned by [`tokenize`] on an unterminated quoted string.
///
/// The tokens recognized up to the failure point, including the open
/// partial token, are kept so that auto-completion can still work with
/// a half-typed line.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unterminated string")]
pub struct TokenizeError {
    /// Best-effort tokens recognized before the failure.
    pub tokens: Vec<String>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum State {
    Space,
    Word,
    Quote,
    QuoteBs,
    Hex1,
    Hex2,
    Oct1,
    Oct2,
}

/// Splits a command line string into separate arguments.
///
/// Arguments are separated by whitespace outside of double quotes:
///
/// ```text
/// param1 param2 param3          -> ["param1", "param2", "param3"]
/// param1 "param 2" "param3"     -> ["param1", "param 2", "param3"]
/// param1 hel"lo wo"rld          -> ["param1", "hello world"]
/// ```
///
/// Inside a quoted string the C-style escapes `\a \b \f \n \r \t \v`,
/// octal `\N`, `\NN`, `\NNN` and hexadecimal `\xHH` are recognized.
/// Any other escaped character stands for itself.
///
/// An unterminated quoted string fails with [`TokenizeError`], which
/// still carries the tokens recognized so far.
pub fn tokenize(line: &str) -> Result<Vec<String>, TokenizeError> {
    let mut state = State::Space;
    let mut token = String::new();
    let mut acc: u32 = 0;
    let mut tokens = Vec::new();

    for c in line.chars() {
        match state {
            State::Space | State::Word => {
                if c == '"' {
                    state = State::Quote;
                } else if c.is_whitespace() {
                    if state != State::Space {
                        tokens.push(std::mem::take(&mut token));
                        state = State::Space;
                    }
                } else {
                    state = State::Word;
                    token.push(c);
                }
            }

            State::Quote => {
                if c == '\\' {
                    state = State::QuoteBs;
                } else if c == '"' {
                    state = State::Word;
                } else {
                    token.push(c);
                }
            }

            State::QuoteBs => {
                state = State::Quote;
                match c {
                    'x' | 'X' => {
                        acc = 0;
                        state = State::Hex1;
                    }
                    '0'..='7' => {
                        acc = c as u32 - '0' as u32;
                        state = State::Oct1;
                    }
                    'a' => token.push('\x07'),
                    'b' => token.push('\x08'),
                    'f' => token.push('\x0c'),
                    'n' => token.push('\n'),
                    'r' => token.push('\r'),
                    't' => token.push('\t'),
                    'v' => token.push('\x0b'),
                    other => token.push(other),
                }
            }

            State::Hex1 | State::Hex2 => {
                if let Some(n) = c.to_digit(16) {
                    acc = (acc << 4) | n;
                    if state == State::Hex1 {
                        state = State::Hex2;
                    } else {
                        push_byte(&mut token, acc);
                        state = State::Quote;
                    }
                } else {
                    push_byte(&mut token, acc);
                    if c == '"' {
                        state = State::Word;
                    } else {
                        token.push(c);
                        state = State::Quote;
                    }
                }
            }

            State::Oct1 | State::Oct2 => {
                if let Some(n) = c.to_digit(8) {
                    acc = (acc << 3) | n;
                    if state == State::Oct1 {
                        state = State::Oct2;
                    } else {
                        push_byte(&mut token, acc);
                        state = State::Quote;
                    }
                } else {
                    push_byte(&mut token, acc);
                    if c == '"' {
                        state = State::Word;
                    } else {
                        token.push(c);
                        state = State::Quote;
                    }
                }
            }
        }
    }

    match state {
        State::Space => Ok(tokens),
        State::Word => {
            tokens.push(token);
            Ok(tokens)
        }
        _ => {
            // Open quote at end of line. Keep what we have.
            tokens.push(token);
            Err(TokenizeError { tokens })
        }
    }
}

fn push_byte(token: &mut String, acc: u32) {
    token.push((acc & 0xff) as u8 as char);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(line: &str) -> Vec<String> {
        tokenize(line).unwrap()
    }

    #[test]
    fn test_plain_words() {
        assert_eq!(ok("param1 param2 param3"), ["param1", "param2", "param3"]);
        assert_eq!(ok("  spaced   out  "), ["spaced", "out"]);
        assert_eq!(ok(""), Vec::<String>::new());
        assert_eq!(ok("   "), Vec::<String>::new());
    }

    #[test]
    fn test_quotes() {
        assert_eq!(ok(r#"param1 "param 2" "param3""#), ["param1", "param 2", "param3"]);
        assert_eq!(ok(r#"hel"lo wo"rld"#), ["hello world"]);
        assert_eq!(ok(r#""""#), [""]);
    }

    #[test]
    fn test_escapes() {
        assert_eq!(ok(r#""a\tb""#), ["a\tb"]);
        assert_eq!(ok(r#""a\nb""#), ["a\nb"]);
        assert_eq!(ok(r#""bell\a""#), ["bell\x07"]);
        assert_eq!(ok(r#""\"quoted\"""#), ["\"quoted\""]);
    }

    #[test]
    fn test_hex_escapes() {
        assert_eq!(ok(r#""\x41""#), ["A"]);
        assert_eq!(ok(r#""\x41B""#), ["AB"]);
        // Single hex digit terminated by a non-hex character
        assert_eq!(ok(r#""\x4!""#), ["\x04!"]);
    }

    #[test]
    fn test_octal_escapes() {
        assert_eq!(ok(r#""\101""#), ["A"]);
        assert_eq!(ok(r#""\0""#), ["\0"]);
        assert_eq!(ok(r#""\12x""#), ["\nx"]);
    }

    #[test]
    fn test_unterminated_keeps_tokens() {
        let err = tokenize(r#"cmd arg "unfinis"#).unwrap_err();
        assert_eq!(err.to_string(), "unterminated string");
        assert_eq!(err.tokens, ["cmd", "arg", "unfinis"]);

        let err = tokenize(r#"cmd ""#).unwrap_err();
        assert_eq!(err.tokens, ["cmd", ""]);
    }

    #[test]
    fn test_totality_over_odd_inputs() {
        // Any input either tokenizes or fails with the unterminated
        // error, never panics.
        for line in ["\\", "\"\\", "\"\\x", "\"\\7", "a\"b", "\u{1f5a8}\u{fe0f} print"] {
            match tokenize(line) {
                Ok(tokens) => assert!(tokens.len() <= line.len()),
                Err(err) => assert_eq!(err.to_string(), "unterminated string"),
            }
        }
    }
}
