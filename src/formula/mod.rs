//! Formula service seam and the reference formula compiler.
//!
//! The validator talks to formulas only through [`FormulaService`]. The
//! crate ships [`FormulaCompiler`], a self-contained implementation over a
//! small expression language:
//!
//! ```text
//! source ──► [lexer] ──► tokens ──► [parser] ──► Expr ──► [typing] ──► DerivedAttributes
//!                                                   │
//!                                                   └──► referenced field ids
//! ```

pub mod ast;
pub mod compiler;
pub mod lexer;
pub mod parser;

use std::collections::{BTreeMap, BTreeSet};

use chumsky::error::Rich;
use chumsky::input::Input;
use chumsky::span::SimpleSpan;
use chumsky::Parser as _;
use thiserror::Error;

pub use ast::Expr;
pub use compiler::FormulaCompiler;

use crate::model::codes::{self, Code};
use crate::model::{
    AvatarRelation, ComponentError, Dataset, Field, FieldType, SourceAvatar, UserDataType,
};

/// A problem found while compiling a formula.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct FormulaError {
    pub code: Code,
    pub message: String,
    /// 1-based `(row, column)` of the offending token.
    pub position: Option<(usize, usize)>,
    pub token: Option<String>,
}

impl FormulaError {
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            position: None,
            token: None,
        }
    }

    pub fn at(mut self, source: &str, offset: usize) -> Self {
        self.position = Some(row_col(source, offset));
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn to_component_error(&self) -> ComponentError {
        let mut error = ComponentError::new(self.code, self.message.clone());
        if let Some((row, column)) = self.position {
            error = error.with_detail("row", row).with_detail("column", column);
        }
        if let Some(token) = &self.token {
            error = error.with_detail("token", token.clone());
        }
        error
    }
}

/// Convert a byte offset into a 1-based `(row, column)`.
fn row_col(source: &str, offset: usize) -> (usize, usize) {
    let prefix = source.get(..offset.min(source.len())).unwrap_or(source);
    let row = prefix.matches('\n').count() + 1;
    let column = prefix
        .rsplit('\n')
        .next()
        .map(|line| line.chars().count())
        .unwrap_or(0)
        + 1;
    (row, column)
}

/// Type information the formula service derives for a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DerivedAttributes {
    pub initial_data_type: UserDataType,
    pub data_type: UserDataType,
    pub has_auto_aggregation: bool,
    pub field_type: FieldType,
}

/// Compiles formulas, reports their errors, and tracks what they reference.
///
/// Implementations may cache per-field compilation results; the validator
/// calls [`FormulaService::uncache_field`] whenever a field's inputs change.
pub trait FormulaService: Send {
    fn register_field(&mut self, field: &Field);

    fn unregister_field(&mut self, field: &Field);

    fn update_field(&mut self, field: &Field);

    fn uncache_field(&mut self, field_id: &str);

    fn register_avatar(&mut self, _avatar: &SourceAvatar) {}

    fn unregister_avatar(&mut self, _avatar_id: &str) {}

    /// Infer types and aggregation for `field` against the current dataset.
    fn derive(&mut self, ds: &Dataset, field: &Field) -> DerivedAttributes;

    fn get_field_errors(&mut self, ds: &Dataset, field: &Field) -> Vec<FormulaError>;

    /// Ids of the fields `field` references.
    fn get_referenced_fields(&mut self, ds: &Dataset, field: &Field) -> BTreeSet<String>;

    fn compile_relation_formula(
        &mut self,
        ds: &Dataset,
        relation: &AvatarRelation,
    ) -> Vec<FormulaError>;

    fn rename_in_formula(&self, text: &str, key_map: &BTreeMap<String, String>) -> String {
        crate::model::rename_in_formula(text, key_map)
    }
}

/// Parse formula text into an expression.
pub fn parse_formula(source: &str) -> Result<Expr, Vec<FormulaError>> {
    if source.trim().is_empty() {
        return Err(vec![FormulaError::new(codes::FORMULA_PARSE, "formula is empty")]);
    }

    let (tokens, lex_errs) = lexer::lexer().parse(source).into_output_errors();
    if !lex_errs.is_empty() {
        return Err(lex_errs
            .into_iter()
            .map(|e: Rich<'_, char>| {
                let token = e.found().map(|c| c.to_string());
                let error = FormulaError::new(codes::FORMULA_PARSE, e.to_string())
                    .at(source, e.span().start);
                match token {
                    Some(token) => error.with_token(token),
                    None => error,
                }
            })
            .collect());
    }
    let tokens: Vec<(lexer::Token<'_>, SimpleSpan)> = tokens.unwrap_or_default();

    let len = source.len();
    let eoi: SimpleSpan = (len..len).into();
    let token_stream = tokens
        .as_slice()
        .map(eoi, |(tok, span): &(lexer::Token<'_>, SimpleSpan)| (tok, span));

    let (expr, parse_errs) = parser::parser().parse(token_stream).into_output_errors();
    match expr {
        Some(expr) if parse_errs.is_empty() => Ok(expr),
        _ => Err(parse_errs
            .into_iter()
            .map(|e: Rich<'_, lexer::Token<'_>, SimpleSpan>| {
                let token = e.found().map(|t| t.to_string());
                let error = FormulaError::new(codes::FORMULA_PARSE, e.to_string())
                    .at(source, e.span().start);
                match token {
                    Some(token) => error.with_token(token),
                    None => error,
                }
            })
            .collect()),
    }
}
