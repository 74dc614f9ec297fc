//! Calculator tool — evaluates mathematical expressions.
//!
//! Supports `+`, `-`, `*`, `/`, parentheses, unary negation, and decimal
//! numbers. Precedence-climbing parser over the raw input; no
//! dependencies beyond std.

use async_trait::async_trait;
use palaver_core::error::ToolError;
use palaver_core::tool::Tool;

pub struct CalculatorTool;

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "Evaluate a mathematical expression. Supports +, -, *, /, parentheses, and decimal numbers."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "expression": {
                    "type": "string",
                    "description": "The mathematical expression to evaluate, e.g. '(2 + 3) * 4'"
                }
            },
            "required": ["expression"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<String, ToolError> {
        let expr = arguments["expression"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'expression' argument".into()))?;

        let value = evaluate(expr).map_err(|reason| ToolError::ExecutionFailed {
            tool_name: "calculator".into(),
            reason,
        })?;

        // Format nicely: no trailing .0 for integers.
        if value.fract() == 0.0 && value.abs() < 1e15 {
            Ok(format!("{}", value as i64))
        } else {
            Ok(format!("{value}"))
        }
    }
}

// ── Precedence-climbing evaluator ─────────────────────────────────────

/// Evaluate a mathematical expression string.
pub fn evaluate(expr: &str) -> Result<f64, String> {
    let mut parser = Parser {
        chars: expr.chars().collect(),
        pos: 0,
    };
    let value = parser.expression(0)?;
    parser.skip_whitespace();
    if parser.pos < parser.chars.len() {
        return Err(format!(
            "Unexpected character '{}' at position {}",
            parser.chars[parser.pos], parser.pos
        ));
    }
    Ok(value)
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn expression(&mut self, min_precedence: u8) -> Result<f64, String> {
        let mut lhs = self.operand()?;

        loop {
            self.skip_whitespace();
            let Some(op) = self.peek() else { break };
            let precedence = match op {
                '+' | '-' => 1,
                '*' | '/' => 2,
                _ => break,
            };
            if precedence < min_precedence {
                break;
            }
            self.pos += 1;

            let rhs = self.expression(precedence + 1)?;
            lhs = match op {
                '+' => lhs + rhs,
                '-' => lhs - rhs,
                '*' => lhs * rhs,
                '/' => {
                    if rhs == 0.0 {
                        return Err("Division by zero".into());
                    }
                    lhs / rhs
                }
                _ => unreachable!(),
            };
        }

        Ok(lhs)
    }

    fn operand(&mut self) -> Result<f64, String> {
        self.skip_whitespace();
        match self.peek() {
            Some('-') => {
                self.pos += 1;
                Ok(-self.operand()?)
            }
            Some('(') => {
                self.pos += 1;
                let value = self.expression(0)?;
                self.skip_whitespace();
                if self.peek() != Some(')') {
                    return Err("Missing closing parenthesis".into());
                }
                self.pos += 1;
                Ok(value)
            }
            Some(c) if c.is_ascii_digit() || c == '.' => self.number(),
            Some(c) => Err(format!("Unexpected character '{c}' at position {}", self.pos)),
            None => Err("Unexpected end of expression".into()),
        }
    }

    fn number(&mut self) -> Result<f64, String> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || c == '.' {
                self.pos += 1;
            } else {
                break;
            }
        }
        let literal: String = self.chars[start..self.pos].iter().collect();
        literal
            .parse::<f64>()
            .map_err(|_| format!("Invalid number '{literal}'"))
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_arithmetic() {
        assert_eq!(evaluate("2 + 3").unwrap(), 5.0);
        assert_eq!(evaluate("10 - 4").unwrap(), 6.0);
        assert_eq!(evaluate("6 * 7").unwrap(), 42.0);
        assert_eq!(evaluate("15 / 3").unwrap(), 5.0);
    }

    #[test]
    fn precedence_and_parentheses() {
        assert_eq!(evaluate("2 + 3 * 4").unwrap(), 14.0);
        assert_eq!(evaluate("(2 + 3) * 4").unwrap(), 20.0);
        assert_eq!(evaluate("2 * (3 + 4) / 7").unwrap(), 2.0);
    }

    #[test]
    fn unary_negation() {
        assert_eq!(evaluate("-5 + 3").unwrap(), -2.0);
        assert_eq!(evaluate("2 * -3").unwrap(), -6.0);
        assert_eq!(evaluate("-(2 + 3)").unwrap(), -5.0);
    }

    #[test]
    fn decimals() {
        assert_eq!(evaluate("0.5 * 4").unwrap(), 2.0);
        assert_eq!(evaluate("1.5 + 2.25").unwrap(), 3.75);
    }

    #[test]
    fn division_by_zero_rejected() {
        assert!(evaluate("1 / 0").unwrap_err().contains("zero"));
    }

    #[test]
    fn malformed_expressions_rejected() {
        assert!(evaluate("2 +").is_err());
        assert!(evaluate("(2 + 3").is_err());
        assert!(evaluate("2 & 3").is_err());
        assert!(evaluate("").is_err());
    }

    #[tokio::test]
    async fn tool_formats_integers_without_fraction() {
        let tool = CalculatorTool;
        let output = tool
            .execute(serde_json::json!({"expression": "(2 + 3) * 4"}))
            .await
            .unwrap();
        assert_eq!(output, "20");
    }

    #[tokio::test]
    async fn tool_keeps_fractional_results() {
        let tool = CalculatorTool;
        let output = tool
            .execute(serde_json::json!({"expression": "7 / 2"}))
            .await
            .unwrap();
        assert_eq!(output, "3.5");
    }

    #[tokio::test]
    async fn missing_expression_is_invalid_arguments() {
        let tool = CalculatorTool;
        let err = tool.execute(serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn bad_expression_is_execution_failure() {
        let tool = CalculatorTool;
        let err = tool
            .execute(serde_json::json!({"expression": "2 ** 3"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed { .. }));
    }
}
