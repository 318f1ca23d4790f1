//! Reference [`FormulaService`] implementation.
//!
//! Field references resolve by id first and by title second, so the same
//! checker works for `guid_formula` and `formula` text. Referenced fields
//! contribute their already-derived `data_type`; the compiler never recurses
//! into another field's formula, which keeps cyclic formulas finite.

use std::collections::{BTreeMap, BTreeSet};

use once_cell::sync::Lazy;

use super::ast::{BinaryOp, Expr, Literal, UnaryOp};
use super::{parse_formula, DerivedAttributes, FormulaError, FormulaService};
use crate::model::codes;
use crate::model::{
    AggregationFunction, AvatarRelation, CalcSpec, ConditionPart, Dataset, Field, FieldType,
    SchemaColumn, UserDataType,
};

// ============================================================================
// Function table
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct FunctionSig {
    min_args: usize,
    /// `None` means variadic.
    max_args: Option<usize>,
    aggregate: bool,
}

const fn sig(min_args: usize, max_args: Option<usize>, aggregate: bool) -> FunctionSig {
    FunctionSig {
        min_args,
        max_args,
        aggregate,
    }
}

static FUNCTIONS: Lazy<BTreeMap<&'static str, FunctionSig>> = Lazy::new(|| {
    BTreeMap::from([
        // Casts
        ("INT", sig(1, Some(1), false)),
        ("FLOAT", sig(1, Some(1), false)),
        ("STR", sig(1, Some(1), false)),
        ("DATE", sig(1, Some(1), false)),
        ("DATETIME", sig(1, Some(1), false)),
        ("BOOL", sig(1, Some(1), false)),
        // Aggregates
        ("SUM", sig(1, Some(1), true)),
        ("AVG", sig(1, Some(1), true)),
        ("MIN", sig(1, Some(1), true)),
        ("MAX", sig(1, Some(1), true)),
        ("COUNT", sig(0, Some(1), true)),
        ("COUNTD", sig(1, Some(1), true)),
        // Scalars
        ("IF", sig(3, Some(3), false)),
        ("IFNULL", sig(2, Some(2), false)),
        ("CONCAT", sig(1, None, false)),
        ("UPPER", sig(1, Some(1), false)),
        ("LOWER", sig(1, Some(1), false)),
        ("LEN", sig(1, Some(1), false)),
        ("ABS", sig(1, Some(1), false)),
        ("ROUND", sig(1, Some(2), false)),
        ("YEAR", sig(1, Some(1), false)),
        ("MONTH", sig(1, Some(1), false)),
        ("DAY", sig(1, Some(1), false)),
        ("NOW", sig(0, Some(0), false)),
        ("TODAY", sig(0, Some(0), false)),
    ])
});

// ============================================================================
// Typing
// ============================================================================

/// Type of a sub-expression. `ty == None` is the NULL literal, compatible
/// with everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Typed {
    ty: Option<UserDataType>,
    aggregated: bool,
}

impl Typed {
    fn scalar(ty: UserDataType) -> Self {
        Self {
            ty: Some(ty),
            aggregated: false,
        }
    }
}

fn is_string(ty: Option<UserDataType>) -> bool {
    matches!(ty, None | Some(UserDataType::String))
}

fn is_numeric(ty: Option<UserDataType>) -> bool {
    ty.map_or(true, |t| t.is_numeric())
}

fn is_temporal(ty: Option<UserDataType>) -> bool {
    ty.map_or(true, |t| t.is_temporal())
}

fn is_boolean(ty: Option<UserDataType>) -> bool {
    matches!(ty, None | Some(UserDataType::Boolean))
}

/// Whether two types can be compared with each other.
fn comparable(lhs: Option<UserDataType>, rhs: Option<UserDataType>) -> bool {
    match (lhs, rhs) {
        (None, _) | (_, None) => true,
        (Some(l), Some(r)) if l == UserDataType::Unsupported || r == UserDataType::Unsupported => {
            false
        }
        (Some(l), Some(r)) => {
            l == r || (l.is_numeric() && r.is_numeric()) || (l.is_temporal() && r.is_temporal())
        }
    }
}

fn numeric_result(lhs: Option<UserDataType>, rhs: Option<UserDataType>) -> UserDataType {
    match (lhs, rhs) {
        (Some(UserDataType::Float), _) | (_, Some(UserDataType::Float)) => UserDataType::Float,
        _ => UserDataType::Integer,
    }
}

/// Walks an expression, resolving references and inferring types.
struct Typer<'a> {
    ds: &'a Dataset,
    source: &'a str,
    errors: Vec<FormulaError>,
    refs: BTreeSet<String>,
}

impl<'a> Typer<'a> {
    fn new(ds: &'a Dataset, source: &'a str) -> Self {
        Self {
            ds,
            source,
            errors: Vec::new(),
            refs: BTreeSet::new(),
        }
    }

    fn resolve(&self, key: &str) -> Option<&'a Field> {
        self.ds.field(key).or_else(|| self.ds.field_by_title(key))
    }

    fn mismatch(&mut self, message: String, offset: Option<usize>) -> Option<Typed> {
        let mut error = FormulaError::new(codes::FORMULA_TYPE_MISMATCH, message);
        if let Some(offset) = offset {
            error = error.at(self.source, offset);
        }
        self.errors.push(error);
        None
    }

    fn infer(&mut self, expr: &Expr) -> Option<Typed> {
        match expr {
            Expr::Literal(lit) => Some(match lit {
                Literal::Integer(_) => Typed::scalar(UserDataType::Integer),
                Literal::Float(_) => Typed::scalar(UserDataType::Float),
                Literal::String(_) => Typed::scalar(UserDataType::String),
                Literal::Date(_) => Typed::scalar(UserDataType::Date),
                Literal::Datetime(_) => Typed::scalar(UserDataType::Datetime),
                Literal::Boolean(_) => Typed::scalar(UserDataType::Boolean),
                Literal::Null => Typed {
                    ty: None,
                    aggregated: false,
                },
            }),
            Expr::Field { key, span } => match self.resolve(key) {
                Some(field) => {
                    self.refs.insert(field.id.clone());
                    Some(Typed {
                        ty: Some(field.data_type.unwrap_or(UserDataType::Unsupported)),
                        aggregated: field.is_aggregated(),
                    })
                }
                None => {
                    self.errors.push(
                        FormulaError::new(
                            codes::FORMULA_UNKNOWN_FIELD,
                            format!("unknown field: [{}]", key),
                        )
                        .at(self.source, span.start)
                        .with_token(format!("[{}]", key)),
                    );
                    None
                }
            },
            Expr::Unary { op, expr } => {
                let inner = self.infer(expr)?;
                match op {
                    UnaryOp::Neg if is_numeric(inner.ty) => Some(inner),
                    UnaryOp::Not if is_boolean(inner.ty) => Some(Typed {
                        ty: Some(UserDataType::Boolean),
                        ..inner
                    }),
                    UnaryOp::Neg => self.mismatch(
                        format!("cannot negate a value of type {}", display(inner.ty)),
                        None,
                    ),
                    UnaryOp::Not => self.mismatch(
                        format!("NOT expects boolean, got {}", display(inner.ty)),
                        None,
                    ),
                }
            }
            Expr::Binary { op, lhs, rhs } => {
                let l = self.infer(lhs);
                let r = self.infer(rhs);
                let (l, r) = (l?, r?);
                let aggregated = l.aggregated || r.aggregated;
                let ty = self.binary_type(*op, l.ty, r.ty)?;
                Some(Typed { ty, aggregated })
            }
            Expr::Call { name, args, span } => self.infer_call(name, args, span.start),
        }
    }

    fn binary_type(
        &mut self,
        op: BinaryOp,
        l: Option<UserDataType>,
        r: Option<UserDataType>,
    ) -> Option<Option<UserDataType>> {
        use UserDataType as T;

        if op.is_logical() {
            if is_boolean(l) && is_boolean(r) {
                return Some(Some(T::Boolean));
            }
        } else if op.is_comparison() {
            if comparable(l, r) {
                return Some(Some(T::Boolean));
            }
        } else {
            let result = match (op, l, r) {
                (_, None, None) => Some(None),
                (BinaryOp::Add, _, _) if is_string(l) && is_string(r) => Some(Some(T::String)),
                (BinaryOp::Div, _, _) if is_numeric(l) && is_numeric(r) => Some(Some(T::Float)),
                (_, _, _) if is_numeric(l) && is_numeric(r) => Some(Some(numeric_result(l, r))),
                (BinaryOp::Add | BinaryOp::Sub, Some(t), _)
                    if t.is_temporal() && matches!(r, None | Some(T::Integer)) =>
                {
                    Some(Some(t))
                }
                (BinaryOp::Add, _, Some(t))
                    if t.is_temporal() && matches!(l, None | Some(T::Integer)) =>
                {
                    Some(Some(t))
                }
                (BinaryOp::Sub, _, _) if is_temporal(l) && is_temporal(r) => Some(Some(T::Integer)),
                _ => None,
            };
            if result.is_some() {
                return result;
            }
        }

        self.mismatch(
            format!(
                "operator {} is not defined for {} and {}",
                op,
                display(l),
                display(r)
            ),
            None,
        );
        None
    }

    fn infer_call(&mut self, name: &str, args: &[Expr], offset: usize) -> Option<Typed> {
        use UserDataType as T;

        let upper = name.to_ascii_uppercase();
        let Some(sig) = FUNCTIONS.get(upper.as_str()).copied() else {
            self.errors.push(
                FormulaError::new(
                    codes::FORMULA_UNKNOWN_FUNCTION,
                    format!("unknown function: {}", name),
                )
                .at(self.source, offset)
                .with_token(name),
            );
            return None;
        };

        if args.len() < sig.min_args || sig.max_args.is_some_and(|max| args.len() > max) {
            let expected = match sig.max_args {
                Some(max) if max == sig.min_args => format!("{}", max),
                Some(max) => format!("{}..{}", sig.min_args, max),
                None => format!("at least {}", sig.min_args),
            };
            self.errors.push(
                FormulaError::new(
                    codes::FORMULA_ARG_COUNT,
                    format!(
                        "{} expects {} argument(s), got {}",
                        upper,
                        expected,
                        args.len()
                    ),
                )
                .at(self.source, offset)
                .with_token(name),
            );
            return None;
        }

        let typed: Vec<Option<Typed>> = args.iter().map(|arg| self.infer(arg)).collect();
        let typed: Vec<Typed> = typed.into_iter().collect::<Option<_>>()?;
        let tys: Vec<Option<UserDataType>> = typed.iter().map(|t| t.ty).collect();
        let any_aggregated = typed.iter().any(|t| t.aggregated);

        if sig.aggregate && any_aggregated {
            return self.mismatch(
                format!("{} cannot be applied to an aggregated value", upper),
                Some(offset),
            );
        }

        let first = tys.first().copied().flatten();
        let ty = match upper.as_str() {
            "INT" => Some(T::Integer),
            "FLOAT" => Some(T::Float),
            "STR" => Some(T::String),
            "DATE" => Some(T::Date),
            "DATETIME" => Some(T::Datetime),
            "BOOL" => Some(T::Boolean),
            "SUM" | "ABS" if is_numeric(tys[0]) => first,
            "AVG" if is_numeric(tys[0]) => Some(T::Float),
            "MIN" | "MAX" => first,
            "COUNT" | "COUNTD" | "LEN" => Some(T::Integer),
            "IF" if is_boolean(tys[0]) && comparable(tys[1], tys[2]) => tys[1].or(tys[2]),
            "IFNULL" if comparable(tys[0], tys[1]) => tys[0].or(tys[1]),
            "CONCAT" => Some(T::String),
            "UPPER" | "LOWER" if is_string(tys[0]) => Some(T::String),
            "ROUND" if tys.iter().all(|t| is_numeric(*t)) => first,
            "YEAR" | "MONTH" | "DAY" if is_temporal(tys[0]) => Some(T::Integer),
            "NOW" => Some(T::Datetime),
            "TODAY" => Some(T::Date),
            _ => {
                let found: Vec<String> = tys.iter().map(|t| display(*t).to_string()).collect();
                return self.mismatch(
                    format!(
                        "{} is not defined for argument types ({})",
                        upper,
                        found.join(", ")
                    ),
                    Some(offset),
                );
            }
        };

        Some(Typed {
            ty,
            aggregated: sig.aggregate || any_aggregated,
        })
    }
}

fn display(ty: Option<UserDataType>) -> String {
    ty.map(|t| t.to_string()).unwrap_or_else(|| "null".into())
}

fn parameter_type(value: &serde_json::Value) -> UserDataType {
    match value {
        serde_json::Value::Bool(_) => UserDataType::Boolean,
        serde_json::Value::Number(n) if n.is_i64() || n.is_u64() => UserDataType::Integer,
        serde_json::Value::Number(_) => UserDataType::Float,
        serde_json::Value::String(_) => UserDataType::String,
        _ => UserDataType::Unsupported,
    }
}

// ============================================================================
// Compiler
// ============================================================================

#[derive(Debug, Clone)]
struct CachedParse {
    text: String,
    result: Result<Expr, Vec<FormulaError>>,
}

/// Outcome of checking one field.
#[derive(Debug, Default)]
struct Compilation {
    typed: Option<Typed>,
    errors: Vec<FormulaError>,
    refs: BTreeSet<String>,
}

/// Self-contained formula compiler with a per-field parse cache.
#[derive(Debug, Default)]
pub struct FormulaCompiler {
    registered: BTreeSet<String>,
    cache: BTreeMap<String, CachedParse>,
}

impl FormulaCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_registered(&self, field_id: &str) -> bool {
        self.registered.contains(field_id)
    }

    pub fn cached_count(&self) -> usize {
        self.cache.len()
    }

    fn parse_cached(&mut self, field_id: &str, text: &str) -> Result<Expr, Vec<FormulaError>> {
        if let Some(cached) = self.cache.get(field_id) {
            if cached.text == text {
                return cached.result.clone();
            }
        }
        let result = parse_formula(text);
        self.cache.insert(
            field_id.to_string(),
            CachedParse {
                text: text.to_string(),
                result: result.clone(),
            },
        );
        result
    }

    fn compile_field(&mut self, ds: &Dataset, field: &Field) -> Compilation {
        let CalcSpec::Formula {
            formula,
            guid_formula,
        } = &field.calc_spec
        else {
            return Compilation::default();
        };
        let text = if guid_formula.trim().is_empty() {
            formula.as_str()
        } else {
            guid_formula.as_str()
        };

        match self.parse_cached(&field.id, text) {
            Err(errors) => Compilation {
                errors,
                ..Default::default()
            },
            Ok(expr) => {
                let mut typer = Typer::new(ds, text);
                let typed = typer.infer(&expr);
                Compilation {
                    typed: if typer.errors.is_empty() { typed } else { None },
                    errors: typer.errors,
                    refs: typer.refs,
                }
            }
        }
    }

    fn direct_column<'d>(
        ds: &'d Dataset,
        field: &Field,
    ) -> Result<&'d SchemaColumn, Option<FormulaError>> {
        let column = field.source().unwrap_or_default();
        let Some(avatar_id) = field.avatar_id() else {
            return Err(Some(FormulaError::new(
                codes::FIELD_AVATAR_NOT_FOUND,
                "field is not bound to an avatar",
            )));
        };
        let Some(avatar) = ds.avatar(avatar_id) else {
            return Err(Some(FormulaError::new(
                codes::FIELD_AVATAR_NOT_FOUND,
                format!("avatar '{}' not found", avatar_id),
            )));
        };
        let Some(source) = ds.source(&avatar.source_id) else {
            return Err(Some(FormulaError::new(
                codes::DB_SOURCE_NOT_FOUND,
                format!("source '{}' not found", avatar.source_id),
            )));
        };
        // Unknown schema: the source carries the error.
        let Some(schema) = source.raw_schema() else {
            return Err(None);
        };
        schema.iter().find(|c| c.name == column).ok_or_else(|| {
            Some(
                FormulaError::new(
                    codes::FIELD_COLUMN_NOT_FOUND,
                    format!("column '{}' not found in source '{}'", column, source.id),
                )
                .with_token(column),
            )
        })
    }

    fn check_condition_part(
        ds: &Dataset,
        avatar_id: &str,
        part: &ConditionPart,
        errors: &mut Vec<FormulaError>,
    ) {
        if ds.avatar(avatar_id).is_none() {
            errors.push(FormulaError::new(
                codes::RELATION_CONDITION,
                format!("avatar '{}' not found", avatar_id),
            ));
            return;
        }
        let schema = ds.raw_schema_for_avatar(avatar_id);
        let has_column = |name: &str| schema.map_or(true, |cols| cols.iter().any(|c| c.name == name));

        match part {
            ConditionPart::Direct { source } => {
                if !has_column(source) {
                    errors.push(
                        FormulaError::new(
                            codes::RELATION_CONDITION,
                            format!("column '{}' not found for avatar '{}'", source, avatar_id),
                        )
                        .with_token(source.clone()),
                    );
                }
            }
            ConditionPart::ResultField { field_id } => {
                if ds.field(field_id).is_none() {
                    errors.push(FormulaError::new(
                        codes::RELATION_CONDITION,
                        format!("field '{}' not found", field_id),
                    ));
                }
            }
            ConditionPart::Formula { formula } => match parse_formula(formula) {
                Err(parse_errors) => errors.extend(parse_errors.into_iter().map(|e| FormulaError {
                    code: codes::RELATION_CONDITION,
                    ..e
                })),
                Ok(expr) => {
                    for (key, span) in expr.field_keys() {
                        if !has_column(key) {
                            errors.push(
                                FormulaError::new(
                                    codes::RELATION_CONDITION,
                                    format!("column '{}' not found for avatar '{}'", key, avatar_id),
                                )
                                .at(formula, span.start)
                                .with_token(format!("[{}]", key)),
                            );
                        }
                    }
                }
            },
        }
    }
}

impl FormulaService for FormulaCompiler {
    fn register_field(&mut self, field: &Field) {
        self.registered.insert(field.id.clone());
    }

    fn unregister_field(&mut self, field: &Field) {
        self.registered.remove(&field.id);
        self.cache.remove(&field.id);
    }

    fn update_field(&mut self, field: &Field) {
        self.registered.insert(field.id.clone());
        self.cache.remove(&field.id);
    }

    fn uncache_field(&mut self, field_id: &str) {
        self.cache.remove(field_id);
    }

    fn derive(&mut self, ds: &Dataset, field: &Field) -> DerivedAttributes {
        let (initial, auto_aggregation, typeable) = match &field.calc_spec {
            CalcSpec::Direct { .. } => match Self::direct_column(ds, field) {
                Ok(column) => (column.user_type, column.has_auto_aggregation, true),
                Err(_) => (UserDataType::Unsupported, false, true),
            },
            CalcSpec::Parameter { default_value, .. } => {
                (parameter_type(default_value), false, true)
            }
            CalcSpec::Formula { .. } => match self.compile_field(ds, field).typed {
                Some(typed) => (
                    typed.ty.unwrap_or(UserDataType::Unsupported),
                    typed.aggregated,
                    true,
                ),
                None => (UserDataType::Unsupported, false, false),
            },
        };

        let cast = field.cast.unwrap_or(initial);
        let data_type = field.aggregation.result_type(cast);
        let field_type = if !typeable {
            FieldType::Pseudo
        } else if auto_aggregation || field.aggregation != AggregationFunction::None {
            FieldType::Measure
        } else {
            FieldType::Dimension
        };

        DerivedAttributes {
            initial_data_type: initial,
            data_type,
            has_auto_aggregation: auto_aggregation,
            field_type,
        }
    }

    fn get_field_errors(&mut self, ds: &Dataset, field: &Field) -> Vec<FormulaError> {
        match &field.calc_spec {
            CalcSpec::Direct { .. } => match Self::direct_column(ds, field) {
                Err(Some(error)) => vec![error],
                _ => Vec::new(),
            },
            CalcSpec::Formula { .. } => self.compile_field(ds, field).errors,
            CalcSpec::Parameter { .. } => Vec::new(),
        }
    }

    fn get_referenced_fields(&mut self, ds: &Dataset, field: &Field) -> BTreeSet<String> {
        self.compile_field(ds, field).refs
    }

    fn compile_relation_formula(
        &mut self,
        ds: &Dataset,
        relation: &AvatarRelation,
    ) -> Vec<FormulaError> {
        let mut errors = Vec::new();
        for condition in &relation.conditions {
            Self::check_condition_part(ds, &relation.left_avatar_id, &condition.left, &mut errors);
            Self::check_condition_part(
                ds,
                &relation.right_avatar_id,
                &condition.right,
                &mut errors,
            );
        }
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        BinaryCondition, ConnectionRef, DataSourceCollection, DataSourceSpec, SourceAvatar,
    };
    use serde_json::json;

    fn dataset() -> Dataset {
        let mut ds = Dataset::new("ds");
        let mut spec = DataSourceSpec::new("PG_TABLE", Some(ConnectionRef::new("c1")));
        spec.raw_schema = Some(vec![
            SchemaColumn::new("id", "int4", UserDataType::Integer),
            SchemaColumn::new("price", "numeric", UserDataType::Float),
            SchemaColumn::new("name", "text", UserDataType::String),
            SchemaColumn::new("created", "date", UserDataType::Date),
            SchemaColumn::new("total", "int8", UserDataType::Integer).with_auto_aggregation(true),
        ]);
        ds.sources
            .push(DataSourceCollection::new("s1", "orders", spec));
        let mut avatar = SourceAvatar::new("a1", "s1", "orders");
        avatar.is_root = true;
        ds.avatars.push(avatar);

        for (id, column, ty) in [
            ("f_id", "id", UserDataType::Integer),
            ("f_price", "price", UserDataType::Float),
            ("f_name", "name", UserDataType::String),
            ("f_created", "created", UserDataType::Date),
        ] {
            let mut field = Field::new(id, column, CalcSpec::direct(column, Some("a1".into())));
            field.data_type = Some(ty);
            ds.result_schema.push(field);
        }
        ds
    }

    fn formula_field(formula: &str) -> Field {
        Field::new("calc", "Calc", CalcSpec::formula(formula))
    }

    fn derive(formula: &str) -> DerivedAttributes {
        let ds = dataset();
        FormulaCompiler::new().derive(&ds, &formula_field(formula))
    }

    fn error_codes(formula: &str) -> Vec<String> {
        let ds = dataset();
        FormulaCompiler::new()
            .get_field_errors(&ds, &formula_field(formula))
            .iter()
            .map(|e| e.to_component_error().code_str())
            .collect()
    }

    #[test]
    fn test_arithmetic_types() {
        assert_eq!(derive("[id] + 1").initial_data_type, UserDataType::Integer);
        assert_eq!(derive("[id] / 2").initial_data_type, UserDataType::Float);
        assert_eq!(derive("[id] * [price]").initial_data_type, UserDataType::Float);
        assert_eq!(derive("[name] + 'x'").initial_data_type, UserDataType::String);
        assert_eq!(derive("[created] + 1").initial_data_type, UserDataType::Date);
        assert_eq!(
            derive("[created] - #2020-01-01#").initial_data_type,
            UserDataType::Integer
        );
        assert_eq!(derive("[id] > 3 AND NOT FALSE").initial_data_type, UserDataType::Boolean);
    }

    #[test]
    fn test_reference_by_id_or_title() {
        let ds = dataset();
        let mut compiler = FormulaCompiler::new();
        let field = Field::new(
            "calc",
            "Calc",
            CalcSpec::Formula {
                formula: "[price] + [id]".into(),
                guid_formula: "[f_price] + [f_id]".into(),
            },
        );
        let refs = compiler.get_referenced_fields(&ds, &field);
        assert_eq!(refs, BTreeSet::from(["f_id".to_string(), "f_price".to_string()]));

        let by_title = formula_field("[price] + [id]");
        assert_eq!(compiler.get_referenced_fields(&ds, &by_title), refs);
    }

    #[test]
    fn test_aggregation_makes_measure() {
        let attrs = derive("SUM([price])");
        assert!(attrs.has_auto_aggregation);
        assert_eq!(attrs.field_type, FieldType::Measure);
        assert_eq!(derive("COUNT()").initial_data_type, UserDataType::Integer);
        assert_eq!(derive("AVG([id])").initial_data_type, UserDataType::Float);
    }

    #[test]
    fn test_explicit_aggregation_changes_data_type() {
        let ds = dataset();
        let mut field = formula_field("[id]");
        field.aggregation = AggregationFunction::Avg;
        let attrs = FormulaCompiler::new().derive(&ds, &field);
        assert_eq!(attrs.initial_data_type, UserDataType::Integer);
        assert_eq!(attrs.data_type, UserDataType::Float);
        assert_eq!(attrs.field_type, FieldType::Measure);
    }

    #[test]
    fn test_formula_errors() {
        assert_eq!(error_codes("[nope] + 1"), vec!["ERR.DS_API.FORMULA.UNKNOWN_FIELD"]);
        assert_eq!(error_codes("FOO(1)"), vec!["ERR.DS_API.FORMULA.UNKNOWN_FUNCTION"]);
        assert_eq!(error_codes("IF(1, 2)"), vec!["ERR.DS_API.FORMULA.ARG_COUNT"]);
        assert_eq!(error_codes("[name] * 2"), vec!["ERR.DS_API.FORMULA.TYPE_MISMATCH"]);
        assert_eq!(error_codes("SUM(SUM([id]))"), vec!["ERR.DS_API.FORMULA.TYPE_MISMATCH"]);
        assert_eq!(error_codes("1 +"), vec!["ERR.DS_API.FORMULA.PARSE"]);
        assert!(error_codes("IFNULL([price], 0) > 1").is_empty());
    }

    #[test]
    fn test_untypeable_formula_is_pseudo() {
        let attrs = derive("[nope]");
        assert_eq!(attrs.initial_data_type, UserDataType::Unsupported);
        assert_eq!(attrs.field_type, FieldType::Pseudo);
    }

    #[test]
    fn test_unknown_field_position() {
        let ds = dataset();
        let errors = FormulaCompiler::new().get_field_errors(&ds, &formula_field("[id] +\n [x]"));
        assert_eq!(errors[0].position, Some((2, 2)));
        assert_eq!(errors[0].token.as_deref(), Some("[x]"));
    }

    #[test]
    fn test_direct_field_derivation() {
        let mut ds = dataset();
        let mut compiler = FormulaCompiler::new();

        let total = Field::new("t", "total", CalcSpec::direct("total", Some("a1".into())));
        let attrs = compiler.derive(&ds, &total);
        assert_eq!(attrs.initial_data_type, UserDataType::Integer);
        assert!(attrs.has_auto_aggregation);
        assert_eq!(attrs.field_type, FieldType::Measure);

        let missing = Field::new("m", "gone", CalcSpec::direct("gone", Some("a1".into())));
        let errors = compiler.get_field_errors(&ds, &missing);
        assert_eq!(errors[0].code, codes::FIELD_COLUMN_NOT_FOUND);

        ds.sources.clear();
        let errors = compiler.get_field_errors(&ds, &total);
        assert_eq!(errors[0].code, codes::DB_SOURCE_NOT_FOUND);

        let unbound = Field::new("u", "u", CalcSpec::direct("id", None));
        assert_eq!(
            compiler.get_field_errors(&ds, &unbound)[0].code,
            codes::FIELD_AVATAR_NOT_FOUND
        );
    }

    #[test]
    fn test_parameter_type_from_default() {
        let ds = dataset();
        let mut compiler = FormulaCompiler::new();
        let param = Field::new(
            "p",
            "Threshold",
            CalcSpec::Parameter {
                default_value: json!(2.5),
                value_constraint: Default::default(),
            },
        );
        assert_eq!(compiler.derive(&ds, &param).initial_data_type, UserDataType::Float);
        assert!(compiler.get_field_errors(&ds, &param).is_empty());
    }

    #[test]
    fn test_cache_follows_text() {
        let ds = dataset();
        let mut compiler = FormulaCompiler::new();
        let mut field = formula_field("[id] + 1");
        compiler.register_field(&field);
        compiler.derive(&ds, &field);
        assert_eq!(compiler.cached_count(), 1);

        field.calc_spec = CalcSpec::formula("[name]");
        assert_eq!(compiler.derive(&ds, &field).initial_data_type, UserDataType::String);

        compiler.unregister_field(&field);
        assert!(!compiler.is_registered("calc"));
        assert_eq!(compiler.cached_count(), 0);
    }

    #[test]
    fn test_relation_conditions() {
        let mut ds = dataset();
        ds.avatars.push(SourceAvatar::new("a2", "s1", "orders copy"));
        let mut compiler = FormulaCompiler::new();

        let mut relation = AvatarRelation::new("r1", "a1", "a2");
        relation.conditions = vec![BinaryCondition::eq(
            ConditionPart::direct("id"),
            ConditionPart::Formula {
                formula: "[id] + 1".into(),
            },
        )];
        assert!(compiler.compile_relation_formula(&ds, &relation).is_empty());

        relation.conditions = vec![BinaryCondition::eq(
            ConditionPart::direct("missing"),
            ConditionPart::ResultField {
                field_id: "nope".into(),
            },
        )];
        let errors = compiler.compile_relation_formula(&ds, &relation);
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| e.code == codes::RELATION_CONDITION));
    }
}
