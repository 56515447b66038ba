//! Operator registry
//!
//! Every filter token a path may end with, and the ordering modifiers. The
//! registry is closed: a token that is not listed here is an unknown token.

use serde::Serialize;
use serde_json::Value;

use crate::core::error::GrammarError;
use crate::query::expr::{ColumnRef, Predicate};

/// Filter operator applied to a resolved column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    /// `c = x`, also spelled `eq`
    Exact,
    Gt,
    Lt,
    Gte,
    Lte,
    /// `c IN x`
    In,
    Contains,
    Icontains,
    UnaccentIcontains,
    Iexact,
    UnaccentIexact,
    Startswith,
    Istartswith,
    UnaccentIstartswith,
    Endswith,
    Iendswith,
    UnaccentIendswith,
    /// `true` is `IS NULL`, `false` is `IS NOT NULL`
    Isnull,
    /// `c BETWEEN x[0] AND x[1]`
    Range,
    Year,
    Month,
    Day,
    JsonContainedBy,
    JsonContains,
    JsonHasAll,
    JsonHasAny,
    JsonHasKey,
    /// Trigram similarity, `c % x`
    Similarity,
    /// `c <% x`
    WordSimilarLeft,
    /// `c %> x`
    WordSimilarRight,
    /// `c <<% x`
    StrictWordSimilarLeft,
    /// `c %>> x`
    StrictWordSimilarRight,
}

/// Every accepted operator token, in registry order
pub const OPERATOR_TOKENS: &[&str] = &[
    "eq",
    "exact",
    "gt",
    "lt",
    "gte",
    "lte",
    "in",
    "contains",
    "icontains",
    "unaccent_icontains",
    "iexact",
    "unaccent_iexact",
    "startswith",
    "istartswith",
    "unaccent_istartswith",
    "endswith",
    "iendswith",
    "unaccent_iendswith",
    "isnull",
    "range",
    "year",
    "month",
    "day",
    "json_contained_by",
    "json_contains",
    "json_has_all",
    "json_has_any",
    "json_has_key",
    "similarity",
    "word_similar_left",
    "word_similar_right",
    "strict_word_similar_left",
    "strict_word_similar_right",
];

impl Operator {
    /// Resolve a path token
    pub fn from_token(token: &str) -> Option<Self> {
        let op = match token {
            "eq" | "exact" => Operator::Exact,
            "gt" => Operator::Gt,
            "lt" => Operator::Lt,
            "gte" => Operator::Gte,
            "lte" => Operator::Lte,
            "in" => Operator::In,
            "contains" => Operator::Contains,
            "icontains" => Operator::Icontains,
            "unaccent_icontains" => Operator::UnaccentIcontains,
            "iexact" => Operator::Iexact,
            "unaccent_iexact" => Operator::UnaccentIexact,
            "startswith" => Operator::Startswith,
            "istartswith" => Operator::Istartswith,
            "unaccent_istartswith" => Operator::UnaccentIstartswith,
            "endswith" => Operator::Endswith,
            "iendswith" => Operator::Iendswith,
            "unaccent_iendswith" => Operator::UnaccentIendswith,
            "isnull" => Operator::Isnull,
            "range" => Operator::Range,
            "year" => Operator::Year,
            "month" => Operator::Month,
            "day" => Operator::Day,
            "json_contained_by" => Operator::JsonContainedBy,
            "json_contains" => Operator::JsonContains,
            "json_has_all" => Operator::JsonHasAll,
            "json_has_any" => Operator::JsonHasAny,
            "json_has_key" => Operator::JsonHasKey,
            "similarity" => Operator::Similarity,
            "word_similar_left" => Operator::WordSimilarLeft,
            "word_similar_right" => Operator::WordSimilarRight,
            "strict_word_similar_left" => Operator::StrictWordSimilarLeft,
            "strict_word_similar_right" => Operator::StrictWordSimilarRight,
            _ => return None,
        };
        Some(op)
    }

    /// Canonical token
    pub fn token(&self) -> &'static str {
        match self {
            Operator::Exact => "exact",
            Operator::Gt => "gt",
            Operator::Lt => "lt",
            Operator::Gte => "gte",
            Operator::Lte => "lte",
            Operator::In => "in",
            Operator::Contains => "contains",
            Operator::Icontains => "icontains",
            Operator::UnaccentIcontains => "unaccent_icontains",
            Operator::Iexact => "iexact",
            Operator::UnaccentIexact => "unaccent_iexact",
            Operator::Startswith => "startswith",
            Operator::Istartswith => "istartswith",
            Operator::UnaccentIstartswith => "unaccent_istartswith",
            Operator::Endswith => "endswith",
            Operator::Iendswith => "iendswith",
            Operator::UnaccentIendswith => "unaccent_iendswith",
            Operator::Isnull => "isnull",
            Operator::Range => "range",
            Operator::Year => "year",
            Operator::Month => "month",
            Operator::Day => "day",
            Operator::JsonContainedBy => "json_contained_by",
            Operator::JsonContains => "json_contains",
            Operator::JsonHasAll => "json_has_all",
            Operator::JsonHasAny => "json_has_any",
            Operator::JsonHasKey => "json_has_key",
            Operator::Similarity => "similarity",
            Operator::WordSimilarLeft => "word_similar_left",
            Operator::WordSimilarRight => "word_similar_right",
            Operator::StrictWordSimilarLeft => "strict_word_similar_left",
            Operator::StrictWordSimilarRight => "strict_word_similar_right",
        }
    }

    /// All accepted tokens, for diagnostics
    pub fn tokens() -> Vec<String> {
        OPERATOR_TOKENS.iter().map(|t| t.to_string()).collect()
    }

    /// Build the predicate comparing `column` to `value`.
    ///
    /// The operand shape is checked here so that a malformed value fails at
    /// build time instead of reaching the executor.
    pub fn apply(self, column: ColumnRef, value: Value) -> Result<Predicate, GrammarError> {
        if let Some(expected) = self.operand_mismatch(&value) {
            return Err(GrammarError::InvalidOperand {
                operator: self.token().to_string(),
                expected: expected.to_string(),
                received: value,
                path: column.to_string(),
            });
        }
        Ok(Predicate::Compare {
            column,
            operator: self,
            value,
        })
    }

    fn operand_mismatch(&self, value: &Value) -> Option<&'static str> {
        let ok = match self {
            Operator::Exact | Operator::JsonContainedBy | Operator::JsonContains => true,
            Operator::Gt | Operator::Lt | Operator::Gte | Operator::Lte => {
                !(value.is_array() || value.is_object())
            }
            Operator::In => value.is_array(),
            Operator::Range => value.as_array().is_some_and(|a| a.len() == 2),
            Operator::Isnull => value.is_boolean(),
            Operator::Year | Operator::Month | Operator::Day => value.is_i64() || value.is_u64(),
            Operator::JsonHasAll | Operator::JsonHasAny => value
                .as_array()
                .is_some_and(|a| a.iter().all(Value::is_string)),
            Operator::Contains
            | Operator::Icontains
            | Operator::UnaccentIcontains
            | Operator::Iexact
            | Operator::UnaccentIexact
            | Operator::Startswith
            | Operator::Istartswith
            | Operator::UnaccentIstartswith
            | Operator::Endswith
            | Operator::Iendswith
            | Operator::UnaccentIendswith
            | Operator::JsonHasKey
            | Operator::Similarity
            | Operator::WordSimilarLeft
            | Operator::WordSimilarRight
            | Operator::StrictWordSimilarLeft
            | Operator::StrictWordSimilarRight => value.is_string(),
        };
        if ok {
            return None;
        }
        Some(match self {
            Operator::In => "a list",
            Operator::Range => "a list of two bounds",
            Operator::Isnull => "a boolean",
            Operator::Year | Operator::Month | Operator::Day => "an integer",
            Operator::JsonHasAll | Operator::JsonHasAny => "a list of strings",
            Operator::Gt | Operator::Lt | Operator::Gte | Operator::Lte => "a scalar",
            _ => "a string",
        })
    }
}

/// Transformation applied to a column before it is used as a sort key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderModifier {
    #[default]
    Exact,
    /// `lower(c)`
    Insensitive,
    /// `unaccent(c)`
    Unaccent,
    /// `lower(unaccent(c))`
    Iunaccent,
}

pub const ORDER_MODIFIER_TOKENS: &[&str] = &["exact", "insensitive", "unaccent", "iunaccent"];

impl OrderModifier {
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "exact" => Some(OrderModifier::Exact),
            "insensitive" => Some(OrderModifier::Insensitive),
            "unaccent" => Some(OrderModifier::Unaccent),
            "iunaccent" => Some(OrderModifier::Iunaccent),
            _ => None,
        }
    }

    pub fn token(&self) -> &'static str {
        match self {
            OrderModifier::Exact => "exact",
            OrderModifier::Insensitive => "insensitive",
            OrderModifier::Unaccent => "unaccent",
            OrderModifier::Iunaccent => "iunaccent",
        }
    }

    pub fn tokens() -> Vec<String> {
        ORDER_MODIFIER_TOKENS.iter().map(|t| t.to_string()).collect()
    }

    pub fn lowercases(&self) -> bool {
        matches!(self, OrderModifier::Insensitive | OrderModifier::Iunaccent)
    }

    pub fn unaccents(&self) -> bool {
        matches!(self, OrderModifier::Unaccent | OrderModifier::Iunaccent)
    }
}
