//! Arithmetic expression evaluator
//!
//! Supports `+ - * /` (also `×` and `÷`), parentheses, unary signs and
//! decimal literals. Evaluation is done in `f64`.

use crate::{LedgerError, Result};

/// Deepest parenthesis/unary nesting accepted
const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Number(f64),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

fn invalid(detail: impl Into<String>) -> LedgerError {
    LedgerError::InvalidExpression(detail.into())
}

fn tokenize(expr: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = expr.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        let token = match c {
            c if c.is_whitespace() => {
                chars.next();
                continue;
            }
            '0'..='9' | '.' => {
                let mut end = start;
                while let Some(&(i, d)) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        end = i + d.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                let literal = &expr[start..end];
                let value = literal
                    .parse::<f64>()
                    .map_err(|_| invalid(format!("无效的数字 {}", literal)))?;
                tokens.push(Token::Number(value));
                continue;
            }
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' | '×' => Token::Star,
            '/' | '÷' => Token::Slash,
            '(' | '（' => Token::LParen,
            ')' | '）' => Token::RParen,
            other => return Err(invalid(format!("无法识别的字符 '{}'", other))),
        };
        tokens.push(token);
        chars.next();
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.peek();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    // expression := term (('+' | '-') term)*
    fn expression(&mut self) -> Result<f64> {
        let mut value = self.term()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.pos += 1;
                    value += self.term()?;
                }
                Some(Token::Minus) => {
                    self.pos += 1;
                    value -= self.term()?;
                }
                _ => return Ok(value),
            }
        }
    }

    // term := factor (('*' | '/') factor)*
    fn term(&mut self) -> Result<f64> {
        let mut value = self.factor()?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.pos += 1;
                    value *= self.factor()?;
                }
                Some(Token::Slash) => {
                    self.pos += 1;
                    let divisor = self.factor()?;
                    if divisor == 0.0 {
                        return Err(invalid("除数不能为零"));
                    }
                    value /= divisor;
                }
                _ => return Ok(value),
            }
        }
    }

    fn factor(&mut self) -> Result<f64> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(invalid("表达式嵌套过深"));
        }
        let value = self.primary();
        self.depth -= 1;
        value
    }

    // primary := ('+' | '-') factor | number | '(' expression ')'
    fn primary(&mut self) -> Result<f64> {
        match self.next() {
            Some(Token::Plus) => self.factor(),
            Some(Token::Minus) => Ok(-self.factor()?),
            Some(Token::Number(value)) => Ok(value),
            Some(Token::LParen) => {
                let value = self.expression()?;
                match self.next() {
                    Some(Token::RParen) => Ok(value),
                    _ => Err(invalid("括号不匹配")),
                }
            }
            Some(Token::RParen) => Err(invalid("括号不匹配")),
            _ => Err(invalid("表达式不完整")),
        }
    }
}

/// Evaluate an arithmetic expression
pub fn evaluate(expr: &str) -> Result<f64> {
    let tokens = tokenize(expr)?;
    if tokens.is_empty() {
        return Err(invalid("表达式为空"));
    }

    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let value = parser.expression()?;

    match parser.peek() {
        None => {}
        Some(Token::RParen) => return Err(invalid("括号不匹配")),
        Some(_) => return Err(invalid("表达式不完整")),
    }

    if !value.is_finite() {
        return Err(invalid("结果超出范围"));
    }
    Ok(value)
}

/// Whether a bare chat message should be treated as a calculation:
/// only digits, operators, parentheses and spaces, with at least one
/// binary operator
pub fn looks_like_arithmetic(text: &str) -> bool {
    let text = text.trim();
    let mut has_digit = false;
    let mut has_operator = false;

    for (i, c) in text.char_indices() {
        match c {
            '0'..='9' => has_digit = true,
            '+' | '-' | '*' | '/' | '×' | '÷' => {
                if i > 0 {
                    has_operator = true;
                }
            }
            '.' | '(' | ')' | '（' | '）' => {}
            c if c.is_whitespace() => {}
            _ => return false,
        }
    }

    has_digit && has_operator
}

/// Render a number without trailing zeros, at most 8 decimals
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        return format!("{}", value as i64);
    }

    let formatted = format!("{:.8}", value);
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    if trimmed == "-0" {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}
