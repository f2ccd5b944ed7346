//! Tokenization of C source text.
//!
//! The lexer turns raw source text into a token stream and records
//! the source position of every token so that later stages can attach
//! `file:line` addresses to the terms they generate.
//! Preprocessor lines, comments and whitespace are skipped.

use crate::prelude::*;

/// A single token together with its position in the source file.
///
/// Lines and columns are 1-based.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Token {
    /// The kind of the token including its payload for identifiers and literals.
    pub kind: TokenKind,
    /// The line the token starts on.
    pub line: u64,
    /// The column the token starts on.
    pub column: u64,
}

/// The kinds of tokens that the accepted C subset is built from.
///
/// Keywords are not distinguished from other identifiers by the lexer.
/// The parser matches them by name where the grammar expects them.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum TokenKind {
    /// An identifier or keyword.
    Ident(String),
    /// A decimal integer literal.
    Number(i64),
    /// A string literal without the surrounding quotes.
    Str(String),
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `{`
    LBrace,
    /// `}`
    RBrace,
    /// `[`
    LBracket,
    /// `]`
    RBracket,
    /// `;`
    Semicolon,
    /// `,`
    Comma,
    /// `.`
    Dot,
    /// `->`
    Arrow,
    /// `*`
    Star,
    /// `/`
    Slash,
    /// `%`
    Percent,
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `++`
    PlusPlus,
    /// `--`
    MinusMinus,
    /// `<`
    Less,
    /// `<=`
    LessEqual,
    /// `>`
    Greater,
    /// `>=`
    GreaterEqual,
    /// `==`
    EqualEqual,
    /// `!=`
    NotEqual,
    /// `&&`
    LogicalAnd,
    /// `||`
    LogicalOr,
    /// `&`
    Ampersand,
    /// `!`
    Bang,
    /// `=`
    Assign,
}

impl Token {
    fn new(kind: TokenKind, line: u64, column: u64) -> Token {
        Token { kind, line, column }
    }
}

/// Split the given source text into tokens.
///
/// Whitespace and comments (both `//` and `/* */`) are discarded.
/// Preprocessor directives, i.e. lines starting with `#`,
/// are skipped up to the end of the line.
/// Unknown characters generate an error naming their position.
pub fn lex(source: &str) -> Result<Vec<Token>, Error> {
    let mut tokens = Vec::new();
    let mut chars = source.chars().peekable();
    let mut line: u64 = 1;
    let mut column: u64 = 1;

    // Advances past one char and keeps the position counters in sync.
    macro_rules! bump {
        () => {{
            let ch = chars.next();
            match ch {
                Some('\n') => {
                    line += 1;
                    column = 1;
                }
                Some(_) => column += 1,
                None => (),
            }
            ch
        }};
    }

    while let Some(&ch) = chars.peek() {
        let (token_line, token_column) = (line, column);
        match ch {
            _ if ch.is_whitespace() => {
                bump!();
            }
            '#' => {
                while let Some(&ch) = chars.peek() {
                    if ch == '\n' {
                        break;
                    }
                    bump!();
                }
            }
            '/' => {
                bump!();
                match chars.peek() {
                    Some('/') => {
                        while let Some(&ch) = chars.peek() {
                            if ch == '\n' {
                                break;
                            }
                            bump!();
                        }
                    }
                    Some('*') => {
                        bump!();
                        let mut closed = false;
                        while let Some(ch) = bump!() {
                            if ch == '*' && chars.peek() == Some(&'/') {
                                bump!();
                                closed = true;
                                break;
                            }
                        }
                        if !closed {
                            return Err(anyhow!(
                                "Unterminated comment starting at line {token_line}"
                            ));
                        }
                    }
                    _ => tokens.push(Token::new(TokenKind::Slash, token_line, token_column)),
                }
            }
            _ if ch.is_ascii_alphabetic() || ch == '_' => {
                let mut name = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_ascii_alphanumeric() || ch == '_' {
                        name.push(ch);
                        bump!();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::new(TokenKind::Ident(name), token_line, token_column));
            }
            _ if ch.is_ascii_digit() => {
                let mut digits = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_ascii_digit() {
                        digits.push(ch);
                        bump!();
                    } else {
                        break;
                    }
                }
                let value: i64 = digits.parse().map_err(|_| {
                    anyhow!("Integer literal out of range at line {token_line}")
                })?;
                tokens.push(Token::new(
                    TokenKind::Number(value),
                    token_line,
                    token_column,
                ));
            }
            '"' => {
                bump!();
                let mut content = String::new();
                let mut closed = false;
                while let Some(ch) = bump!() {
                    match ch {
                        '"' => {
                            closed = true;
                            break;
                        }
                        '\\' => {
                            // Escapes are kept verbatim. The analyses never
                            // look inside string contents.
                            content.push('\\');
                            if let Some(escaped) = bump!() {
                                content.push(escaped);
                            }
                        }
                        _ => content.push(ch),
                    }
                }
                if !closed {
                    return Err(anyhow!(
                        "Unterminated string literal starting at line {token_line}"
                    ));
                }
                tokens.push(Token::new(TokenKind::Str(content), token_line, token_column));
            }
            _ => {
                bump!();
                let kind = match ch {
                    '(' => TokenKind::LParen,
                    ')' => TokenKind::RParen,
                    '{' => TokenKind::LBrace,
                    '}' => TokenKind::RBrace,
                    '[' => TokenKind::LBracket,
                    ']' => TokenKind::RBracket,
                    ';' => TokenKind::Semicolon,
                    ',' => TokenKind::Comma,
                    '.' => TokenKind::Dot,
                    '*' => TokenKind::Star,
                    '%' => TokenKind::Percent,
                    '+' => {
                        if chars.peek() == Some(&'+') {
                            bump!();
                            TokenKind::PlusPlus
                        } else {
                            TokenKind::Plus
                        }
                    }
                    '-' => match chars.peek() {
                        Some('-') => {
                            bump!();
                            TokenKind::MinusMinus
                        }
                        Some('>') => {
                            bump!();
                            TokenKind::Arrow
                        }
                        _ => TokenKind::Minus,
                    },
                    '<' => {
                        if chars.peek() == Some(&'=') {
                            bump!();
                            TokenKind::LessEqual
                        } else {
                            TokenKind::Less
                        }
                    }
                    '>' => {
                        if chars.peek() == Some(&'=') {
                            bump!();
                            TokenKind::GreaterEqual
                        } else {
                            TokenKind::Greater
                        }
                    }
                    '=' => {
                        if chars.peek() == Some(&'=') {
                            bump!();
                            TokenKind::EqualEqual
                        } else {
                            TokenKind::Assign
                        }
                    }
                    '!' => {
                        if chars.peek() == Some(&'=') {
                            bump!();
                            TokenKind::NotEqual
                        } else {
                            TokenKind::Bang
                        }
                    }
                    '&' => {
                        if chars.peek() == Some(&'&') {
                            bump!();
                            TokenKind::LogicalAnd
                        } else {
                            TokenKind::Ampersand
                        }
                    }
                    '|' => {
                        if chars.peek() == Some(&'|') {
                            bump!();
                            TokenKind::LogicalOr
                        } else {
                            return Err(anyhow!(
                                "Unsupported character '|' at line {token_line} column {token_column}"
                            ));
                        }
                    }
                    _ => {
                        return Err(anyhow!(
                            "Unsupported character '{ch}' at line {token_line} column {token_column}"
                        ))
                    }
                };
                tokens.push(Token::new(kind, token_line, token_column));
            }
        }
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        lex(source)
            .unwrap()
            .into_iter()
            .map(|token| token.kind)
            .collect()
    }

    #[test]
    fn punctuation_and_identifiers() {
        use TokenKind::*;
        assert_eq!(
            kinds("int bs = read(fd, buffer, 5);"),
            vec![
                Ident("int".to_string()),
                Ident("bs".to_string()),
                Assign,
                Ident("read".to_string()),
                LParen,
                Ident("fd".to_string()),
                Comma,
                Ident("buffer".to_string()),
                Comma,
                Number(5),
                RParen,
                Semicolon,
            ]
        );
    }

    #[test]
    fn two_char_operators_are_not_split() {
        use TokenKind::*;
        assert_eq!(
            kinds("a->b <= c == d != e && f || !g ++h --i"),
            vec![
                Ident("a".to_string()),
                Arrow,
                Ident("b".to_string()),
                LessEqual,
                Ident("c".to_string()),
                EqualEqual,
                Ident("d".to_string()),
                NotEqual,
                Ident("e".to_string()),
                LogicalAnd,
                Ident("f".to_string()),
                LogicalOr,
                Bang,
                Ident("g".to_string()),
                PlusPlus,
                Ident("h".to_string()),
                MinusMinus,
                Ident("i".to_string()),
            ]
        );
    }

    #[test]
    fn comments_and_preprocessor_lines_are_skipped() {
        let source = r#"
            #include <stdio.h>
            // a line comment
            int /* inline */ x;
            /* a comment
               spanning lines */
            "#;
        assert_eq!(
            kinds(source),
            vec![
                TokenKind::Ident("int".to_string()),
                TokenKind::Ident("x".to_string()),
                TokenKind::Semicolon,
            ]
        );
    }

    #[test]
    fn token_positions_are_recorded() {
        let tokens = lex("int x;\n  x = 5;").unwrap();
        assert_eq!((tokens[0].line, tokens[0].column), (1, 1));
        assert_eq!((tokens[3].line, tokens[3].column), (2, 3));
        assert_eq!((tokens[5].line, tokens[5].column), (2, 7));
    }

    #[test]
    fn unterminated_comment_is_an_error() {
        assert!(lex("int x; /* no end").is_err());
        assert!(lex("char* s = \"no end").is_err());
    }
}
