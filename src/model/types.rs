//! Enumerations shared across the dataset model.

use serde::{Deserialize, Serialize};

/// User-facing data type of a column or field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserDataType {
    String,
    Integer,
    Float,
    Date,
    Datetime,
    Datetimetz,
    Genericdatetime,
    Boolean,
    Geopoint,
    Geopolygon,
    Uuid,
    Markup,
    Unsupported,
    ArrayStr,
    ArrayInt,
    ArrayFloat,
    TreeStr,
}

impl UserDataType {
    /// Parse a data type from its wire name.
    pub fn from_str(s: &str) -> Option<Self> {
        let ty = match s.to_lowercase().as_str() {
            "string" => UserDataType::String,
            "integer" => UserDataType::Integer,
            "float" => UserDataType::Float,
            "date" => UserDataType::Date,
            "datetime" => UserDataType::Datetime,
            "datetimetz" => UserDataType::Datetimetz,
            "genericdatetime" => UserDataType::Genericdatetime,
            "boolean" => UserDataType::Boolean,
            "geopoint" => UserDataType::Geopoint,
            "geopolygon" => UserDataType::Geopolygon,
            "uuid" => UserDataType::Uuid,
            "markup" => UserDataType::Markup,
            "unsupported" => UserDataType::Unsupported,
            "array_str" => UserDataType::ArrayStr,
            "array_int" => UserDataType::ArrayInt,
            "array_float" => UserDataType::ArrayFloat,
            "tree_str" => UserDataType::TreeStr,
            _ => return None,
        };
        Some(ty)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, UserDataType::Integer | UserDataType::Float)
    }

    pub fn is_temporal(&self) -> bool {
        matches!(
            self,
            UserDataType::Date
                | UserDataType::Datetime
                | UserDataType::Datetimetz
                | UserDataType::Genericdatetime
        )
    }

    pub fn is_array(&self) -> bool {
        matches!(
            self,
            UserDataType::ArrayStr | UserDataType::ArrayInt | UserDataType::ArrayFloat
        )
    }
}

impl std::fmt::Display for UserDataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            UserDataType::String => "string",
            UserDataType::Integer => "integer",
            UserDataType::Float => "float",
            UserDataType::Date => "date",
            UserDataType::Datetime => "datetime",
            UserDataType::Datetimetz => "datetimetz",
            UserDataType::Genericdatetime => "genericdatetime",
            UserDataType::Boolean => "boolean",
            UserDataType::Geopoint => "geopoint",
            UserDataType::Geopolygon => "geopolygon",
            UserDataType::Uuid => "uuid",
            UserDataType::Markup => "markup",
            UserDataType::Unsupported => "unsupported",
            UserDataType::ArrayStr => "array_str",
            UserDataType::ArrayInt => "array_int",
            UserDataType::ArrayFloat => "array_float",
            UserDataType::TreeStr => "tree_str",
        };
        write!(f, "{}", name)
    }
}

/// Role a field plays in a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    #[default]
    Dimension,
    Measure,
    /// The expression could not be typed, so the field cannot take part in queries.
    Pseudo,
}

/// How a field's value is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalcMode {
    Direct,
    Formula,
    Parameter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AggregationFunction {
    #[default]
    None,
    Sum,
    Avg,
    Min,
    Max,
    Count,
    Countunique,
}

impl AggregationFunction {
    /// Result type of applying this aggregation to a value of type `input`.
    pub fn result_type(&self, input: UserDataType) -> UserDataType {
        match self {
            AggregationFunction::None
            | AggregationFunction::Min
            | AggregationFunction::Max
            | AggregationFunction::Sum => input,
            AggregationFunction::Avg => {
                if input.is_numeric() {
                    UserDataType::Float
                } else {
                    input
                }
            }
            AggregationFunction::Count | AggregationFunction::Countunique => UserDataType::Integer,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JoinType {
    #[default]
    Inner,
    Left,
    Right,
    Full,
}

impl std::fmt::Display for JoinType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JoinType::Inner => write!(f, "inner"),
            JoinType::Left => write!(f, "left"),
            JoinType::Right => write!(f, "right"),
            JoinType::Full => write!(f, "full"),
        }
    }
}

/// Comparison operator of a join condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BinaryJoinOperator {
    Gt,
    Lt,
    Gte,
    Lte,
    #[default]
    Eq,
    Ne,
}

/// Operation of a default where-clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WhereClauseOperation {
    Isnull,
    Isnotnull,
    Gt,
    Lt,
    Gte,
    Lte,
    Eq,
    Ne,
    Startswith,
    Istartswith,
    Endswith,
    Iendswith,
    Contains,
    Icontains,
    Notcontains,
    Noticontains,
    Leneq,
    Lenne,
    Lengt,
    Lengte,
    Lenlt,
    Lenlte,
    In,
    Nin,
    Between,
}

impl std::fmt::Display for WhereClauseOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // serde names are the canonical spelling
        let name = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        write!(f, "{}", name)
    }
}

use WhereClauseOperation as Op;

const NULL_OPS: &[Op] = &[Op::Isnull, Op::Isnotnull];

const EQUALITY_OPS: &[Op] = &[Op::Isnull, Op::Isnotnull, Op::Eq, Op::Ne, Op::In, Op::Nin];

const ORDERED_OPS: &[Op] = &[
    Op::Isnull,
    Op::Isnotnull,
    Op::Eq,
    Op::Ne,
    Op::In,
    Op::Nin,
    Op::Gt,
    Op::Lt,
    Op::Gte,
    Op::Lte,
    Op::Between,
];

const STRING_OPS: &[Op] = &[
    Op::Isnull,
    Op::Isnotnull,
    Op::Eq,
    Op::Ne,
    Op::In,
    Op::Nin,
    Op::Gt,
    Op::Lt,
    Op::Gte,
    Op::Lte,
    Op::Between,
    Op::Startswith,
    Op::Istartswith,
    Op::Endswith,
    Op::Iendswith,
    Op::Contains,
    Op::Icontains,
    Op::Notcontains,
    Op::Noticontains,
    Op::Leneq,
    Op::Lenne,
    Op::Lengt,
    Op::Lengte,
    Op::Lenlt,
    Op::Lenlte,
];

const ARRAY_OPS: &[Op] = &[
    Op::Isnull,
    Op::Isnotnull,
    Op::Eq,
    Op::Ne,
    Op::Contains,
    Op::Notcontains,
    Op::Leneq,
    Op::Lenne,
    Op::Lengt,
    Op::Lengte,
    Op::Lenlt,
    Op::Lenlte,
];

/// Where-clause operations a field of the given type can be filtered with.
pub fn filters_by_type(data_type: UserDataType) -> &'static [WhereClauseOperation] {
    match data_type {
        UserDataType::String => STRING_OPS,
        UserDataType::Integer
        | UserDataType::Float
        | UserDataType::Date
        | UserDataType::Datetime
        | UserDataType::Datetimetz
        | UserDataType::Genericdatetime => ORDERED_OPS,
        UserDataType::Boolean | UserDataType::Uuid | UserDataType::Markup => EQUALITY_OPS,
        UserDataType::Geopoint | UserDataType::Geopolygon | UserDataType::TreeStr => EQUALITY_OPS,
        UserDataType::ArrayStr | UserDataType::ArrayInt | UserDataType::ArrayFloat => ARRAY_OPS,
        UserDataType::Unsupported => NULL_OPS,
    }
}

/// Actor class permitted to mutate a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ManagedBy {
    #[default]
    User,
    Feature,
    CompilerRuntime,
}

/// Kind of an addressable dataset component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentType {
    DataSource,
    SourceAvatar,
    AvatarRelation,
    Field,
    ObligatoryFilter,
    ResultSchema,
}

impl std::fmt::Display for ComponentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComponentType::DataSource => write!(f, "data_source"),
            ComponentType::SourceAvatar => write!(f, "source_avatar"),
            ComponentType::AvatarRelation => write!(f, "avatar_relation"),
            ComponentType::Field => write!(f, "field"),
            ComponentType::ObligatoryFilter => write!(f, "obligatory_filter"),
            ComponentType::ResultSchema => write!(f, "result_schema"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ComponentErrorLevel {
    #[default]
    Error,
    Warning,
}

/// Variant of a data source inside its collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSourceRole {
    Origin,
    Sample,
}

/// Ids that no component may take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TopLevelComponentId {
    ResultSchema,
    DataSources,
    SourceAvatars,
    AvatarRelations,
    ObligatoryFilters,
}

impl TopLevelComponentId {
    pub const ALL: [TopLevelComponentId; 5] = [
        TopLevelComponentId::ResultSchema,
        TopLevelComponentId::DataSources,
        TopLevelComponentId::SourceAvatars,
        TopLevelComponentId::AvatarRelations,
        TopLevelComponentId::ObligatoryFilters,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TopLevelComponentId::ResultSchema => "__result_schema__",
            TopLevelComponentId::DataSources => "__data_sources__",
            TopLevelComponentId::SourceAvatars => "__source_avatars__",
            TopLevelComponentId::AvatarRelations => "__avatar_relations__",
            TopLevelComponentId::ObligatoryFilters => "__obligatory_filters__",
        }
    }

    pub fn is_reserved(id: &str) -> bool {
        Self::ALL.iter().any(|top| top.as_str() == id)
    }
}

/// Dataset-level boolean settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetSettingName {
    LoadPreviewByDefault,
    TemplateEnabled,
    DataExportForbidden,
}
