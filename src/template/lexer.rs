//! Lexer for template files using logos

use logos::Logos;

/// Byte range in template text
pub type Span = std::ops::Range<usize>;

#[derive(Logos, Debug, Clone, PartialEq)]
pub enum Token {
    /// `${name}` reference; carries the variable name
    #[regex(r"\$\{[^{}$ \t\r\n]+\}", |lex| {
        let s = lex.slice();
        s[2..s.len() - 1].to_string()
    })]
    Var(String),

    /// `$$`, written out as a single `$`
    #[token("$$")]
    EscapedDollar,

    /// A `$` that does not start a reference
    #[token("$")]
    Dollar,

    /// Literal text
    #[regex(r"[^$]+")]
    Text,
}

/// Lex template text into tokens with spans.
///
/// Every byte of the input is covered by some token, so unrecognised input
/// is passed through as [`Token::Text`].
pub fn lex(input: &str) -> impl Iterator<Item = (Token, Span)> + '_ {
    Token::lexer(input)
        .spanned()
        .map(|(tok, span)| (tok.unwrap_or(Token::Text), span))
}
