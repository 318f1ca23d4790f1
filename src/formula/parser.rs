//! Formula parser using chumsky.
//!
//! Precedence, loosest first:
//!
//! ```text
//! OR
//! AND
//! =  !=  <>  <  <=  >  >=
//! +  -
//! *  /  %
//! -x  NOT x
//! literal | [field] | NAME(args) | ( expr )
//! ```

use chumsky::input::ValueInput;
use chumsky::prelude::*;

use super::ast::{BinaryOp, Expr, Literal, Span, UnaryOp};
use super::lexer::Token;

fn to_span(span: SimpleSpan) -> Span {
    span.start..span.end
}

fn binary(lhs: Expr, (op, rhs): (BinaryOp, Expr)) -> Expr {
    Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}

/// Create the expression parser over a token stream.
pub fn parser<'tokens, 'src: 'tokens, I>(
) -> impl Parser<'tokens, I, Expr, extra::Err<Rich<'tokens, Token<'src>, SimpleSpan>>>
where
    I: ValueInput<'tokens, Token = Token<'src>, Span = SimpleSpan>,
{
    recursive(|expr| {
        let literal = select! {
            Token::Integer(s) => Literal::Integer(s.to_string()),
            Token::Float(s) => Literal::Float(s.to_string()),
            Token::Str(s) => Literal::String(s.to_string()),
            Token::DateLit(s) => {
                if s.trim().contains(' ') {
                    Literal::Datetime(s.trim().to_string())
                } else {
                    Literal::Date(s.trim().to_string())
                }
            },
            Token::True => Literal::Boolean(true),
            Token::False => Literal::Boolean(false),
            Token::Null => Literal::Null,
        }
        .map(Expr::Literal)
        .labelled("literal");

        let field = select! {
            Token::FieldRef(s) => s.to_string(),
        }
        .map_with(|key, e| Expr::Field {
            key,
            span: to_span(e.span()),
        })
        .labelled("field reference");

        let ident = select! {
            Token::Ident(s) => s.to_string(),
        }
        .labelled("function name");

        let call = ident
            .then(
                expr.clone()
                    .separated_by(just(Token::Comma))
                    .collect::<Vec<_>>()
                    .delimited_by(just(Token::LParen), just(Token::RParen)),
            )
            .map_with(|(name, args), e| Expr::Call {
                name,
                args,
                span: to_span(e.span()),
            });

        let atom = choice((
            literal,
            field,
            call,
            expr.delimited_by(just(Token::LParen), just(Token::RParen)),
        ));

        let unary = choice((
            just(Token::Minus).to(UnaryOp::Neg),
            just(Token::Not).to(UnaryOp::Not),
        ))
        .repeated()
        .foldr(atom, |op, expr| Expr::Unary {
            op,
            expr: Box::new(expr),
        })
        .boxed();

        let product = unary.clone().foldl(
            choice((
                just(Token::Star).to(BinaryOp::Mul),
                just(Token::Slash).to(BinaryOp::Div),
                just(Token::Percent).to(BinaryOp::Mod),
            ))
            .then(unary)
            .repeated(),
            binary,
        );

        let sum = product.clone().foldl(
            choice((
                just(Token::Plus).to(BinaryOp::Add),
                just(Token::Minus).to(BinaryOp::Sub),
            ))
            .then(product)
            .repeated(),
            binary,
        );

        let comparison = sum.clone().foldl(
            choice((
                just(Token::Eq).to(BinaryOp::Eq),
                just(Token::Ne).to(BinaryOp::Ne),
                just(Token::Lte).to(BinaryOp::Lte),
                just(Token::Gte).to(BinaryOp::Gte),
                just(Token::Lt).to(BinaryOp::Lt),
                just(Token::Gt).to(BinaryOp::Gt),
            ))
            .then(sum)
            .repeated(),
            binary,
        );

        let conjunction = comparison.clone().foldl(
            just(Token::And).to(BinaryOp::And).then(comparison).repeated(),
            binary,
        );

        conjunction
            .clone()
            .foldl(
                just(Token::Or).to(BinaryOp::Or).then(conjunction).repeated(),
                binary,
            )
            .boxed()
    })
    .then_ignore(end())
}
