//! Boolean condition trees evaluated against an [`ExecutionContext`].
//!
//! A [`ConditionGroup`] combines leaf [`Condition`]s and nested groups with
//! AND/OR logic. Evaluation is pure and always terminates.

use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::{resolve_path, ExecutionContext};

/// Field holding the message body with mentions stripped.
pub const MESSAGE_BODY_FIELD: &str = "message.content";
/// Field holding the message body with mentions preserved.
pub const ORIGINAL_BODY_FIELD: &str = "message.originalContent";

const MENTION_MARKER: char = '@';

/// How the children of a group combine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Logic {
    #[default]
    #[serde(rename = "AND", alias = "and")]
    And,
    #[serde(rename = "OR", alias = "or")]
    Or,
}

/// Comparison operator for a leaf condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    #[serde(alias = "equals")]
    Eq,
    #[serde(alias = "not_equals")]
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    Matches,
    NotMatches,
    In,
    NotIn,
    Exists,
    NotExists,
    LengthGte,
    LengthLte,
    LengthEq,
    /// Any operator name this evaluator does not know. Always false.
    #[serde(other)]
    Unknown,
}

impl Operator {
    /// Negated operators fail open (evaluate true) when the comparison does
    /// not apply to the operand types.
    pub fn is_negated(&self) -> bool {
        matches!(
            self,
            Self::Neq | Self::NotContains | Self::NotMatches | Self::NotIn | Self::NotExists
        )
    }
}

/// A single `field OPERATOR value` predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Dotted path into the flattened context view.
    pub field: String,
    pub operator: Operator,
    #[serde(default)]
    pub value: Value,
}

impl Condition {
    pub fn new(field: impl Into<String>, operator: Operator, value: Value) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }
}

/// A child of a group: either a nested group or a leaf condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionNode {
    // Leaf first: every group field has a default, so a leaf would also
    // parse as an empty group.
    Leaf(Condition),
    Group(ConditionGroup),
}

/// AND/OR combination of conditions and nested groups.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConditionGroup {
    #[serde(default)]
    pub logic: Logic,
    #[serde(default)]
    pub conditions: Vec<ConditionNode>,
}

impl ConditionGroup {
    pub fn all(conditions: Vec<ConditionNode>) -> Self {
        Self {
            logic: Logic::And,
            conditions,
        }
    }

    pub fn any(conditions: Vec<ConditionNode>) -> Self {
        Self {
            logic: Logic::Or,
            conditions,
        }
    }

    /// Evaluate this group against a context.
    pub fn evaluate(&self, ctx: &ExecutionContext) -> bool {
        evaluate(self, ctx)
    }
}

impl From<Condition> for ConditionNode {
    fn from(c: Condition) -> Self {
        ConditionNode::Leaf(c)
    }
}

impl From<ConditionGroup> for ConditionNode {
    fn from(g: ConditionGroup) -> Self {
        ConditionNode::Group(g)
    }
}

/// Evaluate a condition tree against the context.
pub fn evaluate(group: &ConditionGroup, ctx: &ExecutionContext) -> bool {
    let view = ctx.view();
    evaluate_group(group, &view)
}

/// Evaluate a condition tree against an already-flattened view.
pub fn evaluate_group(group: &ConditionGroup, view: &Value) -> bool {
    // Vacuous match at every depth.
    if group.conditions.is_empty() {
        return true;
    }
    match group.logic {
        Logic::And => group.conditions.iter().all(|c| evaluate_node(c, view)),
        Logic::Or => group.conditions.iter().any(|c| evaluate_node(c, view)),
    }
}

fn evaluate_node(node: &ConditionNode, view: &Value) -> bool {
    match node {
        ConditionNode::Group(group) => evaluate_group(group, view),
        ConditionNode::Leaf(condition) => evaluate_condition(condition, view),
    }
}

/// Evaluate a single leaf condition.
pub fn evaluate_condition(condition: &Condition, view: &Value) -> bool {
    let op = condition.operator;
    let primary = apply(op, resolve_path(view, &condition.field), &condition.value);

    if condition.field == MESSAGE_BODY_FIELD && mentions(&condition.value) {
        let secondary = apply(op, resolve_path(view, ORIGINAL_BODY_FIELD), &condition.value);
        return if op.is_negated() {
            primary && secondary
        } else {
            primary || secondary
        };
    }

    primary
}

fn mentions(value: &Value) -> bool {
    match value {
        Value::String(s) => s.contains(MENTION_MARKER),
        Value::Array(items) => items.iter().any(mentions),
        _ => false,
    }
}

fn apply(op: Operator, actual: Option<&Value>, expected: &Value) -> bool {
    match op {
        Operator::Eq => values_equal(actual.unwrap_or(&Value::Null), expected),
        Operator::Neq => !values_equal(actual.unwrap_or(&Value::Null), expected),
        Operator::Gt => compare_numbers(actual, expected, |a, b| a > b),
        Operator::Gte => compare_numbers(actual, expected, |a, b| a >= b),
        Operator::Lt => compare_numbers(actual, expected, |a, b| a < b),
        Operator::Lte => compare_numbers(actual, expected, |a, b| a <= b),
        Operator::Contains => contains(actual, expected).unwrap_or(false),
        Operator::NotContains => contains(actual, expected).map_or(true, |found| !found),
        Operator::StartsWith => string_pair(actual, expected)
            .is_some_and(|(a, e)| a.to_lowercase().starts_with(&e.to_lowercase())),
        Operator::EndsWith => string_pair(actual, expected)
            .is_some_and(|(a, e)| a.to_lowercase().ends_with(&e.to_lowercase())),
        Operator::Matches => regex_match(actual, expected).unwrap_or(false),
        Operator::NotMatches => regex_match(actual, expected).map_or(true, |found| !found),
        Operator::In => membership(actual, expected).unwrap_or(false),
        Operator::NotIn => membership(actual, expected).map_or(true, |found| !found),
        Operator::Exists => actual.is_some(),
        Operator::NotExists => actual.is_none(),
        Operator::LengthGte => compare_length(actual, expected, |len, bound| len >= bound),
        Operator::LengthLte => compare_length(actual, expected, |len, bound| len <= bound),
        Operator::LengthEq => compare_length(actual, expected, |len, bound| len == bound),
        Operator::Unknown => false,
    }
}

/// Structural equality, except that numbers compare by value (`1 == 1.0`).
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn compare_numbers(actual: Option<&Value>, expected: &Value, cmp: fn(f64, f64) -> bool) -> bool {
    match (actual.and_then(Value::as_f64), expected.as_f64()) {
        (Some(a), Some(e)) => cmp(a, e),
        _ => false,
    }
}

/// `None` when the operand types do not support containment.
fn contains(actual: Option<&Value>, expected: &Value) -> Option<bool> {
    match (actual?, expected) {
        (Value::String(haystack), Value::String(needle)) => {
            Some(haystack.to_lowercase().contains(&needle.to_lowercase()))
        }
        (Value::Array(items), needle) => Some(items.iter().any(|item| match (item, needle) {
            (Value::String(a), Value::String(b)) => a.to_lowercase() == b.to_lowercase(),
            _ => values_equal(item, needle),
        })),
        _ => None,
    }
}

fn string_pair<'a>(actual: Option<&'a Value>, expected: &'a Value) -> Option<(&'a str, &'a str)> {
    Some((actual?.as_str()?, expected.as_str()?))
}

/// A malformed pattern is a non-match, never an error.
fn regex_match(actual: Option<&Value>, expected: &Value) -> Option<bool> {
    let (text, pattern) = string_pair(actual, expected)?;
    match RegexBuilder::new(pattern).case_insensitive(true).build() {
        Ok(re) => Some(re.is_match(text)),
        Err(_) => Some(false),
    }
}

fn membership(actual: Option<&Value>, expected: &Value) -> Option<bool> {
    let set = expected.as_array()?;
    Some(actual.is_some_and(|a| set.iter().any(|candidate| values_equal(a, candidate))))
}

fn compare_length(actual: Option<&Value>, expected: &Value, cmp: fn(f64, f64) -> bool) -> bool {
    let len = match actual {
        Some(Value::String(s)) => s.chars().count(),
        Some(Value::Array(items)) => items.len(),
        _ => return false,
    };
    expected.as_f64().is_some_and(|bound| cmp(len as f64, bound))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::InboundMessage;
    use serde_json::json;

    fn ctx() -> ExecutionContext {
        let mut ctx = ExecutionContext::new("org_1")
            .with_message(InboundMessage::new("I need a Refund please").with_original("@support I need a Refund please"))
            .with_user(json!({"name": "Ada", "age": 37, "tags": ["VIP", "beta"], "code": "5"}));
        ctx.set("score", json!(0.75));
        ctx
    }

    fn leaf(field: &str, op: Operator, value: Value) -> ConditionNode {
        Condition::new(field, op, value).into()
    }

    fn check(field: &str, op: Operator, value: Value) -> bool {
        ConditionGroup::all(vec![leaf(field, op, value)]).evaluate(&ctx())
    }

    #[test]
    fn test_empty_group_is_true_for_both_logics() {
        let c = ctx();
        assert!(ConditionGroup::all(vec![]).evaluate(&c));
        assert!(ConditionGroup::any(vec![]).evaluate(&c));
    }

    #[test]
    fn test_empty_group_is_true_when_nested() {
        let group = ConditionGroup::all(vec![
            ConditionGroup::any(vec![]).into(),
            leaf("user.name", Operator::Eq, json!("Ada")),
        ]);
        assert!(group.evaluate(&ctx()));
    }

    #[test]
    fn test_and_or_combination() {
        let t = leaf("user.name", Operator::Eq, json!("Ada"));
        let f = leaf("user.name", Operator::Eq, json!("Bob"));
        let c = ctx();

        assert!(ConditionGroup::all(vec![t.clone(), t.clone()]).evaluate(&c));
        assert!(!ConditionGroup::all(vec![t.clone(), f.clone()]).evaluate(&c));
        assert!(ConditionGroup::any(vec![f.clone(), t.clone()]).evaluate(&c));
        assert!(!ConditionGroup::any(vec![f.clone(), f]).evaluate(&c));
    }

    #[test]
    fn test_numeric_comparisons() {
        assert!(check("user.age", Operator::Gt, json!(30)));
        assert!(check("user.age", Operator::Gte, json!(37)));
        assert!(check("user.age", Operator::Lt, json!(40.5)));
        assert!(check("context.score", Operator::Lte, json!(0.75)));
        assert!(check("user.age", Operator::Eq, json!(37.0)));
    }

    #[test]
    fn test_numeric_comparison_rejects_strings() {
        // "5" is a string, 3 is a number.
        assert!(!check("user.code", Operator::Gt, json!(3)));
        assert!(!check("user.code", Operator::Lt, json!(10)));
        assert!(!check("user.missing", Operator::Gt, json!(0)));
    }

    #[test]
    fn test_contains_is_case_insensitive() {
        assert!(check("message.content", Operator::Contains, json!("REFUND")));
        assert!(check("user.tags", Operator::Contains, json!("vip")));
        assert!(!check("user.tags", Operator::Contains, json!("gold")));
        assert!(check("user.tags", Operator::NotContains, json!("gold")));
    }

    #[test]
    fn test_contains_folds_non_ascii_case() {
        let mut c = ctx();
        c.set("cities", json!(["ZÜRICH", "Oslo"]));
        c.set("note", json!("Ship to ZÜRICH"));
        let array = ConditionGroup::all(vec![leaf("context.cities", Operator::Contains, json!("zürich"))]);
        let text = ConditionGroup::all(vec![leaf("context.note", Operator::Contains, json!("zürich"))]);
        assert!(array.evaluate(&c));
        assert!(text.evaluate(&c));
    }

    #[test]
    fn test_not_contains_fails_open_on_type_mismatch() {
        assert!(check("user.age", Operator::NotContains, json!("3")));
        assert!(check("user.missing", Operator::NotContains, json!("x")));
        assert!(!check("user.age", Operator::Contains, json!("3")));
    }

    #[test]
    fn test_starts_and_ends_with() {
        assert!(check("user.name", Operator::StartsWith, json!("ad")));
        assert!(check("user.name", Operator::EndsWith, json!("DA")));
        assert!(!check("user.age", Operator::StartsWith, json!("3")));
    }

    #[test]
    fn test_matches_and_malformed_patterns() {
        assert!(check("message.content", Operator::Matches, json!("^i need .* please$")));
        assert!(!check("message.content", Operator::Matches, json!("([unclosed")));
        assert!(check("message.content", Operator::NotMatches, json!("([unclosed")));
        assert!(check("user.age", Operator::NotMatches, json!("\\d+")));
    }

    #[test]
    fn test_in_and_not_in() {
        assert!(check("user.name", Operator::In, json!(["Ada", "Grace"])));
        assert!(!check("user.name", Operator::In, json!(["Grace"])));
        assert!(check("user.name", Operator::NotIn, json!(["Grace"])));
        assert!(!check("user.name", Operator::In, json!("Ada")));
        assert!(check("user.name", Operator::NotIn, json!("Ada")));
    }

    #[test]
    fn test_exists() {
        assert!(check("user.name", Operator::Exists, Value::Null));
        assert!(check("trigger.kind", Operator::NotExists, Value::Null));
        assert!(!check("conversationId", Operator::Exists, Value::Null));
    }

    #[test]
    fn test_length_operators() {
        assert!(check("user.name", Operator::LengthEq, json!(3)));
        assert!(check("user.tags", Operator::LengthGte, json!(2)));
        assert!(check("user.tags", Operator::LengthLte, json!(2)));
        assert!(!check("user.age", Operator::LengthEq, json!(2)));
    }

    #[test]
    fn test_mention_falls_back_to_original_content() {
        // The stripped body has no mention; the original body does.
        assert!(check("message.content", Operator::Contains, json!("@support")));
        assert!(!check("message.content", Operator::Contains, json!("@sales")));
        assert!(!check("message.content", Operator::NotContains, json!("@support")));
        // Without a mention marker the original body is not consulted.
        assert!(!check("message.content", Operator::Contains, json!("support")));
    }

    #[test]
    fn test_unknown_operator_fails_closed() {
        let group: ConditionGroup = serde_json::from_value(json!({
            "logic": "AND",
            "conditions": [{"field": "user.name", "operator": "sounds_like", "value": "Ada"}]
        }))
        .unwrap();
        assert!(!group.evaluate(&ctx()));
    }

    #[test]
    fn test_deserialize_nested_tree() {
        let group: ConditionGroup = serde_json::from_value(json!({
            "logic": "or",
            "conditions": [
                {"field": "user.name", "operator": "eq", "value": "Bob"},
                {
                    "logic": "AND",
                    "conditions": [
                        {"field": "user.age", "operator": "gte", "value": 18},
                        {"field": "user.tags", "operator": "contains", "value": "beta"}
                    ]
                }
            ]
        }))
        .unwrap();
        assert_eq!(group.logic, Logic::Or);
        assert!(matches!(group.conditions[1], ConditionNode::Group(_)));
        assert!(group.evaluate(&ctx()));
    }
}
