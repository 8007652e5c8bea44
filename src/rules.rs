//! Audience targeting rules for the built-in datafile engine.
use derive_more::From;
use regex::Regex;
use semver::Version;
use serde::{Deserialize, Serialize};

use crate::{AttributeValue, Attributes};

/// A rule matches when all of its conditions match.
#[derive(Debug, Serialize, Deserialize, From)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Rule {
    conditions: Vec<Condition>,
}

impl Rule {
    pub fn eval(&self, attributes: &Attributes) -> bool {
        self.conditions
            .iter()
            .all(|condition| condition.eval(attributes))
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Condition {
    operator: Operator,
    attribute: String,
    value: ConditionValue,
}

impl Condition {
    pub fn eval(&self, attributes: &Attributes) -> bool {
        self.operator
            .eval(attributes.get(&self.attribute), &self.value)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, From)]
#[serde(untagged)]
pub(crate) enum ConditionValue {
    Multiple(Vec<String>),
    Boolean(bool),
    Number(f64),
    String(String),
}

impl From<&str> for ConditionValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub(crate) enum Operator {
    Matches,
    NotMatches,
    Gte,
    Gt,
    Lte,
    Lt,
    OneOf,
    NotOneOf,
    IsNull,
}

impl Operator {
    /// Applies the operator, treating any misconfiguration or type mismatch as no match.
    pub fn eval(self, attribute: Option<&AttributeValue>, value: &ConditionValue) -> bool {
        self.try_eval(attribute, value).unwrap_or(false)
    }

    fn try_eval(self, attribute: Option<&AttributeValue>, value: &ConditionValue) -> Option<bool> {
        match self {
            Self::Matches | Self::NotMatches => {
                let (Some(AttributeValue::String(s)), ConditionValue::String(pattern)) =
                    (attribute, value)
                else {
                    return None;
                };
                let matches = Regex::new(pattern).ok()?.is_match(s);
                Some(matches == (self == Self::Matches))
            }

            Self::OneOf | Self::NotOneOf => {
                let s = match attribute? {
                    AttributeValue::String(s) => s.clone(),
                    AttributeValue::Number(n) => n.to_string(),
                    AttributeValue::Boolean(b) => b.to_string(),
                    AttributeValue::Null => return None,
                };
                let ConditionValue::Multiple(values) = value else {
                    return None;
                };
                let is_one_of = values.iter().any(|v| *v == s);
                Some(is_one_of == (self == Self::OneOf))
            }

            Self::IsNull => {
                let is_null = matches!(attribute, None | Some(AttributeValue::Null));
                match value {
                    ConditionValue::Boolean(expected) => Some(is_null == *expected),
                    _ => None,
                }
            }

            Self::Gte | Self::Gt | Self::Lte | Self::Lt => {
                let ordering = compare_versions(attribute, value)
                    .or_else(|| compare_numbers(attribute, value))?;
                Some(match self {
                    Self::Gt => ordering.is_gt(),
                    Self::Gte => ordering.is_ge(),
                    Self::Lt => ordering.is_lt(),
                    _ => ordering.is_le(),
                })
            }
        }
    }
}

fn compare_versions(
    attribute: Option<&AttributeValue>,
    value: &ConditionValue,
) -> Option<std::cmp::Ordering> {
    let (Some(AttributeValue::String(a)), ConditionValue::String(c)) = (attribute, value) else {
        return None;
    };
    Some(Version::parse(a).ok()?.cmp(&Version::parse(c).ok()?))
}

fn compare_numbers(
    attribute: Option<&AttributeValue>,
    value: &ConditionValue,
) -> Option<std::cmp::Ordering> {
    let condition = match value {
        ConditionValue::Number(n) => *n,
        ConditionValue::String(s) => s.parse().ok()?,
        _ => return None,
    };
    let attribute = match attribute? {
        AttributeValue::Number(n) => *n,
        AttributeValue::String(s) => s.parse().ok()?,
        _ => return None,
    };
    attribute.partial_cmp(&condition)
}
