//! Tokenizer for the textual scene-description language.
//!
//! Turns a byte stream into a lazy sequence of [`Token`]s with
//! line/column positions. The tokenizer never fails: comments are
//! dropped, unknown characters are skipped, and the stream always
//! ends with exactly one [`TokenKind::Eof`].
//!
//! # Token kinds
//!
//! - identifiers (`def`, `Xform`, `faceVertexCounts`, ...)
//! - integers and floats (optional sign, decimal point, `e|E` exponent)
//! - quoted strings with `\n \r \t \\ \"` escapes
//! - asset paths between `@ ... @` (no escapes)
//! - prim paths between `< ... >`
//! - the punctuators `( ) [ ] { } = , : .`
//!
//! `#` starts a comment that runs to end of line; this also swallows
//! the `#usda 1.0` header, so the parser never sees it.

use std::str::Chars;

/// A single lexed token with its source position.
#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// 1-based source line.
    pub line: u32,
    /// 1-based column of the token's first character.
    pub col: u32,
}

/// The kinds of token produced by the tokenizer.
#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    /// Identifier: letters, digits, `_`; must not start with a digit.
    Ident(String),
    /// Integer literal.
    Int(i64),
    /// Float literal (decimal point and/or exponent).
    Float(f64),
    /// Double-quoted string with escapes resolved.
    Str(String),
    /// Asset path between `@` markers, verbatim.
    Asset(String),
    /// Prim path between `<` and `>`, verbatim.
    PathRef(String),

    LParen,   // (
    RParen,   // )
    LBracket, // [
    RBracket, // ]
    LBrace,   // {
    RBrace,   // }
    Equals,   // =
    Comma,    // ,
    Colon,    // :
    Dot,      // .

    /// End of input. Produced exactly once at exhaustion.
    Eof,
}

impl TokenKind {
    /// Identifier text, if this is an identifier.
    pub fn as_ident(&self) -> Option<&str> {
        match self {
            TokenKind::Ident(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

/// Streaming tokenizer. Restartable from the start only.
pub struct Tokenizer<'a> {
    chars: Chars<'a>,
    peek: Option<char>,
    line: u32,
    col: u32,
}

impl<'a> Tokenizer<'a> {
    /// Create a tokenizer over the full source text.
    pub fn new(src: &'a str) -> Self {
        let mut chars = src.chars();
        let peek = chars.next();
        Self {
            chars,
            peek,
            line: 1,
            col: 1,
        }
    }

    fn bump(&mut self) -> Option<char> {
        let cur = self.peek;
        self.peek = self.chars.next();
        if let Some(c) = cur {
            if c == '\n' {
                self.line += 1;
                self.col = 1;
            } else {
                self.col += 1;
            }
        }
        cur
    }

    fn skip_ws_and_comments(&mut self) {
        loop {
            match self.peek {
                Some(c) if c == ' ' || c == '\t' || c == '\r' || c == '\n' => {
                    self.bump();
                }
                Some('#') => {
                    // Comment to end of line; never yielded.
                    while !matches!(self.peek, None | Some('\n')) {
                        self.bump();
                    }
                }
                _ => break,
            }
        }
    }

    /// Produce the next token. Returns `Eof` at exhaustion.
    pub fn next_token(&mut self) -> Token {
        loop {
            self.skip_ws_and_comments();

            let (line, col) = (self.line, self.col);
            let c = match self.bump() {
                Some(c) => c,
                None => {
                    return Token {
                        kind: TokenKind::Eof,
                        line,
                        col,
                    }
                }
            };

            let kind = match c {
                '(' => TokenKind::LParen,
                ')' => TokenKind::RParen,
                '[' => TokenKind::LBracket,
                ']' => TokenKind::RBracket,
                '{' => TokenKind::LBrace,
                '}' => TokenKind::RBrace,
                '=' => TokenKind::Equals,
                ',' => TokenKind::Comma,
                ':' => TokenKind::Colon,

                '"' => self.lex_string(),
                '@' => self.lex_delimited('@', TokenKind::Asset),
                '<' => self.lex_delimited('>', TokenKind::PathRef),

                '.' => {
                    if matches!(self.peek, Some(p) if p.is_ascii_digit()) {
                        self.lex_number('.')
                    } else {
                        TokenKind::Dot
                    }
                }

                c if c.is_ascii_digit() => self.lex_number(c),
                '-' | '+' => {
                    if matches!(self.peek, Some(p) if p.is_ascii_digit() || p == '.') {
                        self.lex_number(c)
                    } else {
                        // Stray sign: advance without yielding.
                        continue;
                    }
                }

                c if c.is_alphabetic() || c == '_' => self.lex_ident(c),

                // Unknown character: advance one position, no token.
                _ => continue,
            };

            return Token { kind, line, col };
        }
    }

    fn lex_ident(&mut self, first: char) -> TokenKind {
        let mut s = String::new();
        s.push(first);
        while let Some(p) = self.peek {
            if p.is_alphanumeric() || p == '_' {
                s.push(self.bump().unwrap());
            } else {
                break;
            }
        }
        TokenKind::Ident(s)
    }

    fn lex_string(&mut self) -> TokenKind {
        let mut s = String::new();
        while let Some(c) = self.bump() {
            match c {
                '"' => break,
                '\\' => match self.bump() {
                    Some('n') => s.push('\n'),
                    Some('r') => s.push('\r'),
                    Some('t') => s.push('\t'),
                    Some('\\') => s.push('\\'),
                    Some('"') => s.push('"'),
                    Some(other) => s.push(other),
                    None => break,
                },
                _ => s.push(c),
            }
        }
        TokenKind::Str(s)
    }

    /// Lex the body of an `@ ... @` or `< ... >` token (no escapes).
    fn lex_delimited(&mut self, closer: char, make: fn(String) -> TokenKind) -> TokenKind {
        let mut s = String::new();
        while let Some(c) = self.bump() {
            if c == closer {
                break;
            }
            s.push(c);
        }
        make(s)
    }

    fn lex_number(&mut self, first: char) -> TokenKind {
        let mut s = String::new();
        s.push(first);
        let mut has_point = first == '.';
        let mut has_exp = false;

        while let Some(p) = self.peek {
            match p {
                '0'..='9' => {
                    s.push(self.bump().unwrap());
                }
                '.' if !has_point && !has_exp => {
                    has_point = true;
                    s.push(self.bump().unwrap());
                }
                'e' | 'E' if !has_exp => {
                    has_exp = true;
                    s.push(self.bump().unwrap());
                    if matches!(self.peek, Some('+') | Some('-')) {
                        s.push(self.bump().unwrap());
                    }
                }
                _ => break,
            }
        }

        if has_point || has_exp {
            TokenKind::Float(s.parse().unwrap_or(0.0))
        } else {
            // Fall back to float on i64 overflow rather than dropping
            // the value.
            match s.parse::<i64>() {
                Ok(v) => TokenKind::Int(v),
                Err(_) => TokenKind::Float(s.parse().unwrap_or(0.0)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        let mut t = Tokenizer::new(src);
        let mut out = Vec::new();
        loop {
            let tok = t.next_token();
            let eof = tok.kind == TokenKind::Eof;
            out.push(tok.kind);
            if eof {
                break;
            }
        }
        out
    }

    #[test]
    fn test_punctuators_and_idents() {
        let got = kinds("def Mesh \"m\" { }");
        assert_eq!(
            got,
            vec![
                TokenKind::Ident("def".into()),
                TokenKind::Ident("Mesh".into()),
                TokenKind::Str("m".into()),
                TokenKind::LBrace,
                TokenKind::RBrace,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_numbers() {
        let got = kinds("1 -2 3.5 -0.25 1e3 2.5E-2 .75");
        assert_eq!(
            got,
            vec![
                TokenKind::Int(1),
                TokenKind::Int(-2),
                TokenKind::Float(3.5),
                TokenKind::Float(-0.25),
                TokenKind::Float(1000.0),
                TokenKind::Float(0.025),
                TokenKind::Float(0.75),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        let got = kinds(r#""a\tb\"c\\d""#);
        assert_eq!(got, vec![TokenKind::Str("a\tb\"c\\d".into()), TokenKind::Eof]);
    }

    #[test]
    fn test_asset_and_prim_paths() {
        let got = kinds("@./props/chair.usda@</Chair/Geom>");
        assert_eq!(
            got,
            vec![
                TokenKind::Asset("./props/chair.usda".into()),
                TokenKind::PathRef("/Chair/Geom".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_comments_and_header_are_dropped() {
        let got = kinds("#usda 1.0\n# a comment\ndef # trailing\n");
        assert_eq!(got, vec![TokenKind::Ident("def".into()), TokenKind::Eof]);
    }

    #[test]
    fn test_positions() {
        let mut t = Tokenizer::new("def\n  over");
        let a = t.next_token();
        assert_eq!((a.line, a.col), (1, 1));
        let b = t.next_token();
        assert_eq!((b.line, b.col), (2, 3));
    }

    #[test]
    fn test_unknown_chars_are_skipped() {
        let got = kinds("def ; ! over");
        assert_eq!(
            got,
            vec![
                TokenKind::Ident("def".into()),
                TokenKind::Ident("over".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_namespaced_attribute_tokens() {
        let got = kinds("xformOp:translate");
        assert_eq!(
            got,
            vec![
                TokenKind::Ident("xformOp".into()),
                TokenKind::Colon,
                TokenKind::Ident("translate".into()),
                TokenKind::Eof,
            ]
        );
    }
}
