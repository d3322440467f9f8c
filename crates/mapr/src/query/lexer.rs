//! Splits query text into tokens.
//!
//! Whitespace and commas separate tokens. Double quotes delimit literal
//! strings, backticks delimit barewords that would otherwise be keywords.
//! Commas inside parentheses belong to the token.

use crate::error::QueryError;

/// How a token was written.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TokenKind {
    /// Plain word; may be a keyword.
    Bare,
    /// `` `word` ``; never a keyword.
    Backtick,
    /// `"text"`; a literal string.
    Quoted,
}

/// One lexical token.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Token {
    /// Token text without quotes.
    pub text: String,
    /// How it was quoted.
    pub kind: TokenKind,
}

impl Token {
    /// Whether this is the bare keyword `word` (case-insensitive).
    pub fn is_keyword(&self, word: &str) -> bool {
        self.kind == TokenKind::Bare && self.text.eq_ignore_ascii_case(word)
    }
}

/// Tokenises `query`.
pub fn tokenize(query: &str) -> Result<Vec<Token>, QueryError> {
    let mut tokens = Vec::new();
    let mut chars = query.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() || c == ',' {
            chars.next();
            continue;
        }

        if c == '"' || c == '`' {
            chars.next();
            let mut text = String::new();
            let mut closed = false;
            for next in chars.by_ref() {
                if next == c {
                    closed = true;
                    break;
                }
                text.push(next);
            }
            if !closed {
                return Err(QueryError::Unterminated(if c == '"' {
                    "double quote"
                } else {
                    "backtick"
                }));
            }
            let kind = if c == '"' {
                TokenKind::Quoted
            } else {
                TokenKind::Backtick
            };
            tokens.push(Token { text, kind });
            continue;
        }

        let mut text = String::new();
        let mut depth = 0usize;
        while let Some(&next) = chars.peek() {
            if depth == 0 && (next.is_whitespace() || next == ',') {
                break;
            }
            match next {
                '(' => depth += 1,
                ')' => depth = depth.saturating_sub(1),
                _ => {}
            }
            text.push(next);
            chars.next();
        }
        tokens.push(Token {
            text,
            kind: TokenKind::Bare,
        });
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(query: &str) -> Vec<String> {
        tokenize(query).unwrap().into_iter().map(|t| t.text).collect()
    }

    #[test]
    fn commas_are_whitespace() {
        assert_eq!(
            texts("select count($line),last($time) from STATS"),
            ["select", "count($line)", "last($time)", "from", "STATS"]
        );
    }

    #[test]
    fn quotes_and_backticks() {
        let tokens = tokenize(r#"where `from` eq "a b, c""#).unwrap();
        assert_eq!(tokens[1].text, "from");
        assert_eq!(tokens[1].kind, TokenKind::Backtick);
        assert!(!tokens[1].is_keyword("from"));
        assert_eq!(tokens[3].text, "a b, c");
        assert_eq!(tokens[3].kind, TokenKind::Quoted);
    }

    #[test]
    fn nested_calls_stay_one_token() {
        assert_eq!(
            texts("set $x = md5sum(maskdigits($line))"),
            ["set", "$x", "=", "md5sum(maskdigits($line))"]
        );
    }

    #[test]
    fn unterminated_quote_is_an_error() {
        assert_eq!(
            tokenize("where a eq \"open"),
            Err(QueryError::Unterminated("double quote"))
        );
    }

    #[test]
    fn keywords_are_case_insensitive() {
        let tokens = tokenize("SeLeCt").unwrap();
        assert!(tokens[0].is_keyword("select"));
    }
}
