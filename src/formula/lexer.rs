//! Formula lexer using chumsky.

use chumsky::prelude::*;

/// A token of the formula language.
#[derive(Debug, Clone, PartialEq)]
pub enum Token<'src> {
    /// `[...]` reference; the payload excludes the brackets.
    FieldRef(&'src str),
    Ident(&'src str),
    Integer(&'src str),
    Float(&'src str),
    Str(&'src str),
    /// `#...#` date or datetime literal; the payload excludes the hashes.
    DateLit(&'src str),

    // Keywords (case-insensitive)
    True,
    False,
    Null,
    And,
    Or,
    Not,

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,

    // Punctuation
    LParen,
    RParen,
    Comma,
}

impl<'src> std::fmt::Display for Token<'src> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::FieldRef(s) => write!(f, "[{}]", s),
            Token::Ident(s) | Token::Integer(s) | Token::Float(s) => write!(f, "{}", s),
            Token::Str(s) => write!(f, "\"{}\"", s),
            Token::DateLit(s) => write!(f, "#{}#", s),
            Token::True => write!(f, "TRUE"),
            Token::False => write!(f, "FALSE"),
            Token::Null => write!(f, "NULL"),
            Token::And => write!(f, "AND"),
            Token::Or => write!(f, "OR"),
            Token::Not => write!(f, "NOT"),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::Percent => write!(f, "%"),
            Token::Eq => write!(f, "="),
            Token::Ne => write!(f, "!="),
            Token::Lt => write!(f, "<"),
            Token::Lte => write!(f, "<="),
            Token::Gt => write!(f, ">"),
            Token::Gte => write!(f, ">="),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::Comma => write!(f, ","),
        }
    }
}

fn keyword_or_ident(s: &str) -> Token<'_> {
    match s.to_ascii_uppercase().as_str() {
        "TRUE" => Token::True,
        "FALSE" => Token::False,
        "NULL" => Token::Null,
        "AND" => Token::And,
        "OR" => Token::Or,
        "NOT" => Token::Not,
        _ => Token::Ident(s),
    }
}

/// Create the lexer for formula text.
pub fn lexer<'src>(
) -> impl Parser<'src, &'src str, Vec<(Token<'src>, SimpleSpan)>, extra::Err<Rich<'src, char>>> {
    let field_ref = just('[')
        .ignore_then(none_of(']').repeated().to_slice())
        .then_ignore(just(']'))
        .map(Token::FieldRef);

    let double_quoted = just('"')
        .ignore_then(none_of('"').repeated().to_slice())
        .then_ignore(just('"'))
        .map(Token::Str);

    let single_quoted = just('\'')
        .ignore_then(none_of('\'').repeated().to_slice())
        .then_ignore(just('\''))
        .map(Token::Str);

    let date_lit = just('#')
        .ignore_then(none_of('#').repeated().to_slice())
        .then_ignore(just('#'))
        .map(Token::DateLit);

    let number = text::digits(10)
        .then(just('.').then(text::digits(10)).or_not())
        .to_slice()
        .map(|s: &str| {
            if s.contains('.') {
                Token::Float(s)
            } else {
                Token::Integer(s)
            }
        });

    let ident = text::ident().map(keyword_or_ident);

    // Multi-char operators first
    let symbol = choice((
        just("<=").to(Token::Lte),
        just(">=").to(Token::Gte),
        just("!=").to(Token::Ne),
        just("<>").to(Token::Ne),
        just('<').to(Token::Lt),
        just('>').to(Token::Gt),
        just('=').to(Token::Eq),
        just('+').to(Token::Plus),
        just('-').to(Token::Minus),
        just('*').to(Token::Star),
        just('/').to(Token::Slash),
        just('%').to(Token::Percent),
        just('(').to(Token::LParen),
        just(')').to(Token::RParen),
        just(',').to(Token::Comma),
    ));

    let token = choice((
        field_ref,
        double_quoted,
        single_quoted,
        date_lit,
        number,
        ident,
        symbol,
    ))
    .map_with(|tok, e| (tok, e.span()));

    token.padded().repeated().collect().padded().then_ignore(end())
}
