//! Built-in tools offered to the model during the tool-calling check.
//!
//! Both tools are deterministic so the check can assert on their use
//! without depending on outside services.

use crate::tools::{Tool, ToolError, ToolResult};
use async_trait::async_trait;
use serde_json::{json, Value};

/// Canned weather lookup
#[derive(Debug, Default)]
pub struct WeatherTool;

impl WeatherTool {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Tool for WeatherTool {
    fn name(&self) -> &str {
        "get_weather"
    }

    fn description(&self) -> &str {
        "Get the current weather for a city. Returns temperature, conditions and humidity."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "location": {
                    "type": "string",
                    "description": "City name, optionally with country (e.g. 'Paris, France')",
                    "minLength": 1
                },
                "unit": {
                    "type": "string",
                    "enum": ["celsius", "fahrenheit"],
                    "description": "Temperature unit, defaults to celsius"
                }
            },
            "required": ["location"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, parameters: Value) -> Result<ToolResult, ToolError> {
        let location = parameters
            .get("location")
            .and_then(|l| l.as_str())
            .ok_or_else(|| ToolError::ExecutionFailed {
                message: "location missing after validation".to_string(),
            })?;
        let unit = parameters
            .get("unit")
            .and_then(|u| u.as_str())
            .unwrap_or("celsius");

        let temperature = if unit == "fahrenheit" { 72 } else { 22 };

        tracing::debug!("get_weather({}, {})", location, unit);
        Ok(ToolResult::success(json!({
            "location": location,
            "temperature": temperature,
            "unit": unit,
            "conditions": "sunny",
            "humidity": 40
        })))
    }
}

/// Arithmetic over `+ - * /`, parentheses and unary minus
#[derive(Debug, Default)]
pub struct CalculatorTool;

impl CalculatorTool {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "Evaluate an arithmetic expression. Supports +, -, *, / and parentheses, e.g. '(2+3)*4' or '25*8+17'."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "expression": {
                    "type": "string",
                    "description": "Arithmetic expression to evaluate"
                },
                "precision": {
                    "type": "integer",
                    "minimum": 0,
                    "maximum": 10,
                    "description": "Number of decimal places for the result"
                }
            },
            "required": ["expression"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, parameters: Value) -> Result<ToolResult, ToolError> {
        let expression = parameters
            .get("expression")
            .and_then(|e| e.as_str())
            .unwrap_or_default();
        let precision = parameters
            .get("precision")
            .and_then(|p| p.as_u64())
            .unwrap_or(2) as i32;

        // Bad expressions are the model's mistake, not an execution failure
        match evaluate_expression(expression) {
            Ok(value) => {
                let factor = 10.0_f64.powi(precision);
                Ok(ToolResult::success(json!((value * factor).round() / factor)))
            }
            Err(e) => Ok(ToolResult::error(format!("Failed to evaluate expression: {}", e))),
        }
    }
}

/// Evaluates `expr` with the usual precedence
pub fn evaluate_expression(expr: &str) -> Result<f64, String> {
    let tokens: Vec<char> = expr.chars().filter(|c| !c.is_whitespace()).collect();
    if tokens.is_empty() {
        return Err("empty expression".to_string());
    }

    let mut parser = ExprParser { tokens, pos: 0 };
    let value = parser.sum()?;
    if parser.pos != parser.tokens.len() {
        return Err(format!("unexpected '{}'", parser.tokens[parser.pos]));
    }
    if !value.is_finite() {
        return Err("result is not a finite number".to_string());
    }
    Ok(value)
}

struct ExprParser {
    tokens: Vec<char>,
    pos: usize,
}

impl ExprParser {
    fn peek(&self) -> Option<char> {
        self.tokens.get(self.pos).copied()
    }

    fn sum(&mut self) -> Result<f64, String> {
        let mut value = self.product()?;
        while let Some(op @ ('+' | '-')) = self.peek() {
            self.pos += 1;
            let rhs = self.product()?;
            value = if op == '+' { value + rhs } else { value - rhs };
        }
        Ok(value)
    }

    fn product(&mut self) -> Result<f64, String> {
        let mut value = self.unary()?;
        while let Some(op @ ('*' | '/')) = self.peek() {
            self.pos += 1;
            let rhs = self.unary()?;
            if op == '*' {
                value *= rhs;
            } else if rhs == 0.0 {
                return Err("division by zero".to_string());
            } else {
                value /= rhs;
            }
        }
        Ok(value)
    }

    fn unary(&mut self) -> Result<f64, String> {
        match self.peek() {
            Some('-') => {
                self.pos += 1;
                Ok(-self.unary()?)
            }
            Some('+') => {
                self.pos += 1;
                self.unary()
            }
            _ => self.atom(),
        }
    }

    fn atom(&mut self) -> Result<f64, String> {
        match self.peek() {
            Some('(') => {
                self.pos += 1;
                let value = self.sum()?;
                if self.peek() != Some(')') {
                    return Err("missing closing parenthesis".to_string());
                }
                self.pos += 1;
                Ok(value)
            }
            Some(c) if c.is_ascii_digit() || c == '.' => {
                let start = self.pos;
                while matches!(self.peek(), Some(c) if c.is_ascii_digit() || c == '.') {
                    self.pos += 1;
                }
                let literal: String = self.tokens[start..self.pos].iter().collect();
                literal
                    .parse()
                    .map_err(|_| format!("invalid number '{}'", literal))
            }
            Some(c) => Err(format!("unexpected '{}'", c)),
            None => Err("missing operand".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evaluate_expression_precedence() {
        assert_eq!(evaluate_expression("2+3*4").unwrap(), 14.0);
        assert_eq!(evaluate_expression("(2+3)*4").unwrap(), 20.0);
        assert_eq!(evaluate_expression("25 * 8 + 17").unwrap(), 217.0);
        assert_eq!(evaluate_expression("10-4-3").unwrap(), 3.0);
        assert_eq!(evaluate_expression("-3+5").unwrap(), 2.0);
        assert_eq!(evaluate_expression("100/4/5").unwrap(), 5.0);
        assert_eq!(evaluate_expression("1.5*2").unwrap(), 3.0);
    }

    #[test]
    fn test_evaluate_expression_errors() {
        assert!(evaluate_expression("").is_err());
        assert!(evaluate_expression("1/0").is_err());
        assert!(evaluate_expression("(1+2").is_err());
        assert!(evaluate_expression("2+").is_err());
        assert!(evaluate_expression("sqrt(4)").is_err());
        assert!(evaluate_expression("1.2.3").is_err());
    }

    #[tokio::test]
    async fn test_weather_tool_units() {
        let tool = WeatherTool::new();
        let celsius = tool.execute(json!({"location": "Paris"})).await.unwrap();
        assert_eq!(celsius.content["temperature"], 22);
        assert_eq!(celsius.content["unit"], "celsius");

        let fahrenheit = tool
            .execute(json!({"location": "Boston", "unit": "fahrenheit"}))
            .await
            .unwrap();
        assert_eq!(fahrenheit.content["temperature"], 72);
        assert_eq!(fahrenheit.content["location"], "Boston");
    }

    #[tokio::test]
    async fn test_calculator_tool_precision_and_errors() {
        let tool = CalculatorTool::new();
        let result = tool
            .execute(json!({"expression": "10/3", "precision": 3}))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.content, json!(3.333));

        let result = tool.execute(json!({"expression": "1/0"})).await.unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("division by zero"));
    }
}
