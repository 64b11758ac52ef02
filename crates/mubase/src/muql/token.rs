//! MUQL tokenizer.
//!
//! Tokens carry their byte position so parse errors can point at the
//! offending spot. Two lexical rules are load-bearing for the security
//! contract:
//!
//! - A bare `;` outside a quoted string literal is rejected here, before
//!   any parsing happens. Stacked statements never reach the planner.
//! - Everything inside a quoted literal (including `;`, `--`, SQL
//!   keywords) is collected verbatim as an opaque value.

use crate::error::{Error, Result};

/// One lexed token.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// What was lexed.
    pub kind: TokenKind,
    /// Byte offset into the query text.
    pub position: usize,
}

/// Token payloads.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// A keyword, identifier, or bare value (`SELECT`, `name`, `mod:a.py`).
    Word(String),
    /// A quoted string literal, quotes stripped, content verbatim.
    Str(String),
    /// An unsigned numeric literal, kept as text until planning.
    Number(String),
    /// A single punctuation character: `=`, `>`, `<`, `(`, `)`, `,`, `*`.
    Symbol(char),
}

fn is_word_start(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Word continuation covers the characters that appear in node ids and
/// file paths, so `mod:a.py` and `src/auth.py` lex as single words.
fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '.' | ':' | '/' | '-')
}

/// Lex a query into tokens.
pub fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(position, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '\'' | '"' => {
                chars.next();
                let quote = c;
                let mut value = String::new();
                let mut closed = false;
                for (_, inner) in chars.by_ref() {
                    if inner == quote {
                        closed = true;
                        break;
                    }
                    value.push(inner);
                }
                if !closed {
                    return Err(Error::Syntax {
                        message: "unterminated string literal".to_string(),
                        position,
                    });
                }
                tokens.push(Token {
                    kind: TokenKind::Str(value),
                    position,
                });
            }
            ';' => {
                return Err(Error::Syntax {
                    message: "statement separator ';' is not allowed".to_string(),
                    position,
                });
            }
            '=' | '>' | '<' | '(' | ')' | ',' | '*' => {
                chars.next();
                tokens.push(Token {
                    kind: TokenKind::Symbol(c),
                    position,
                });
            }
            c if c.is_ascii_digit() => {
                let mut text = String::new();
                while let Some(&(_, d)) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        text.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token {
                    kind: TokenKind::Number(text),
                    position,
                });
            }
            c if is_word_start(c) => {
                let mut text = String::new();
                while let Some(&(_, w)) = chars.peek() {
                    if is_word_char(w) {
                        text.push(w);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token {
                    kind: TokenKind::Word(text),
                    position,
                });
            }
            other => {
                return Err(Error::Syntax {
                    message: format!("unexpected character '{other}'"),
                    position,
                });
            }
        }
    }

    Ok(tokens)
}
