//! Transition Evaluator

use crate::flow::context::Context;
use crate::flow::model::{Operator, Transition};
use serde_json::Value;

/// Whether `transition` fires against the current context
pub fn should_fire(transition: &Transition, context: &Context) -> bool {
    match transition {
        Transition::To { .. } => true,
        Transition::If {
            operator,
            variable,
            value,
            variable2,
            ..
        } => {
            let Some(operator) = operator else {
                return false;
            };
            let left = lookup(context, variable);
            let right = match (value, variable2) {
                (Some(literal), _) => literal.clone(),
                (None, Some(other)) => lookup(context, other),
                (None, None) => return false,
            };
            compare(operator, &left, &right).unwrap_or(false)
        }
        Transition::Function { .. } => false,
    }
}

fn lookup(context: &Context, path: &str) -> Value {
    context.get_path(path).unwrap_or(Value::Null)
}

/// Apply `operator`; `None` for operators without a meaning
pub fn compare(operator: &Operator, left: &Value, right: &Value) -> Option<bool> {
    match operator {
        Operator::Eq => Some(loose_eq(left, right)),
        Operator::Ne => Some(!loose_eq(left, right)),
        Operator::Unsupported(_) => None,
    }
}

/// Equality where a number matches a string holding the same number, since
/// values scraped from pages arrive as text while flows write literals.
pub fn loose_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => {
            match (s.trim().parse::<f64>(), n.as_f64()) {
                (Ok(a), Some(b)) => a == b,
                _ => false,
            }
        }
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => left == right,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn var_transition(operator: &str) -> Transition {
        Transition::If {
            target: "next".to_string(),
            operator: Some(Operator::from(operator.to_string())),
            variable: "x".to_string(),
            value: None,
            variable2: Some("y".to_string()),
        }
    }

    #[test]
    fn test_to_always_fires() {
        let t = Transition::To { target: "a".to_string() };
        assert!(should_fire(&t, &Context::new()));
    }

    #[test]
    fn test_variable_comparison() {
        let ctx = Context::from_input(&json!({ "x": 1, "y": 1 }));
        assert!(should_fire(&var_transition("="), &ctx));
        assert!(!should_fire(&var_transition("!="), &ctx));

        ctx.set("y", 2);
        assert!(!should_fire(&var_transition("="), &ctx));
        assert!(should_fire(&var_transition("!="), &ctx));
    }

    #[test]
    fn test_literal_comparison_with_nested_path() {
        let ctx = Context::from_input(&json!({ "result": { "status": "ok" } }));
        let t = Transition::If {
            target: "done".to_string(),
            operator: Some(Operator::Eq),
            variable: "result.status".to_string(),
            value: Some(json!("ok")),
            variable2: None,
        };
        assert!(should_fire(&t, &ctx));
    }

    #[test]
    fn test_unsupported_shapes_are_noops() {
        let ctx = Context::from_input(&json!({ "x": 1, "y": 1 }));
        assert!(!should_fire(&var_transition(">"), &ctx));

        let no_operand = Transition::If {
            target: "a".to_string(),
            operator: Some(Operator::Eq),
            variable: "x".to_string(),
            value: None,
            variable2: None,
        };
        assert!(!should_fire(&no_operand, &ctx));

        let function = Transition::Function { target: "a".to_string(), name: None };
        assert!(!should_fire(&function, &ctx));
    }

    #[test]
    fn test_missing_variable_is_null() {
        let ctx = Context::new();
        let t = Transition::If {
            target: "a".to_string(),
            operator: Some(Operator::Ne),
            variable: "missing".to_string(),
            value: Some(json!("anything")),
            variable2: None,
        };
        assert!(should_fire(&t, &ctx));
    }

    #[test]
    fn test_compare_against_null_literal() {
        let t: Transition = serde_json::from_value(json!({
            "type": "if", "target": "a", "variable": "x", "operator": "=", "value": null
        }))
        .unwrap();

        assert!(should_fire(&t, &Context::new()));
        assert!(should_fire(&t, &Context::from_input(&json!({ "x": null }))));
        assert!(!should_fire(&t, &Context::from_input(&json!({ "x": 0 }))));
    }

    #[test]
    fn test_loose_eq() {
        assert!(loose_eq(&json!(5), &json!("5")));
        assert!(loose_eq(&json!(" 5 "), &json!(5.0)));
        assert!(!loose_eq(&json!(5), &json!("five")));
        assert!(loose_eq(&json!({ "a": 1 }), &json!({ "a": 1 })));
        assert!(!loose_eq(&json!(true), &json!("true")));
    }
}
