//! Selection-rule evaluation for group-style layouts.
//!
//! The supported grammar is deliberately tiny: the literal tautology `1=1`,
//! the literal contradiction `0=1`, and a single-field equality test against
//! a quoted string or a number. Anything else evaluates to false with a
//! warning; a bad clause must never break classification.

use tracing::warn;

use super::entities::FieldLookup;

const SOURCE: &str = "domain::rules";

#[derive(Debug, Clone, PartialEq)]
enum Rule {
    Always,
    Never,
    Equals { field: String, value: String },
}

/// Evaluate a where clause against one item. Unparseable clauses are false.
pub fn evaluate(clause: &str, item: &dyn FieldLookup) -> bool {
    match parse(clause) {
        Some(Rule::Always) => true,
        Some(Rule::Never) => false,
        Some(Rule::Equals { field, value }) => item
            .field(&field)
            .map(|actual| values_equal(actual.trim(), &value))
            .unwrap_or(false),
        None => {
            warn!(
                target: SOURCE,
                clause,
                "unparseable selection rule; treating as no match"
            );
            false
        }
    }
}

fn parse(clause: &str) -> Option<Rule> {
    let compact: String = clause.chars().filter(|c| !c.is_whitespace()).collect();
    if compact == "1=1" {
        return Some(Rule::Always);
    }
    if compact == "0=1" {
        return Some(Rule::Never);
    }

    let (lhs, rhs) = clause.split_once('=')?;
    let field = lhs.trim();
    if field.is_empty() || !field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }

    let rhs = rhs.trim();
    let value = if let Some(quoted) = rhs.strip_prefix('\'') {
        quoted.strip_suffix('\'')?.to_string()
    } else if rhs.parse::<f64>().is_ok() {
        rhs.to_string()
    } else {
        return None;
    };

    Some(Rule::Equals {
        field: field.to_string(),
        value,
    })
}

/// Equality with numeric coercion: when both sides parse as numbers they are
/// compared numerically, otherwise as exact strings.
fn values_equal(actual: &str, expected: &str) -> bool {
    match (actual.parse::<f64>(), expected.parse::<f64>()) {
        (Ok(a), Ok(b)) => a == b,
        _ => actual == expected,
    }
}
