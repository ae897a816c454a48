//! Formula parser
//!
//! Recursive descent over the token stream with spreadsheet operator
//! precedence: comparison < concatenation < additive < multiplicative <
//! power < unary minus.

use super::tokenizer::Token;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Text(String),
    /// A placeholder bound to cell values, or TRUE/FALSE
    Name(String),
    FunctionCall { name: String, args: Vec<Expr> },
    BinaryOp {
        op: String,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    UnaryOp { op: String, operand: Box<Expr> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub position: usize,
}

impl ParseError {
    fn new(message: impl Into<String>, position: usize) -> Self {
        Self {
            message: message.into(),
            position,
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Parse error at position {}: {}",
            self.position, self.message
        )
    }
}

impl std::error::Error for ParseError {}

pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            position: 0,
        }
    }

    pub fn parse(mut self) -> Result<Expr, ParseError> {
        if self.tokens.is_empty() {
            return Err(ParseError::new("Empty expression", 0));
        }
        let expr = self.expression()?;

        if !self.is_at_end() {
            return Err(ParseError::new(
                format!("Unexpected token after expression: {:?}", self.peek()),
                self.position,
            ));
        }

        Ok(expr)
    }

    fn is_at_end(&self) -> bool {
        self.position >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    fn match_token(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    fn match_any_operator(&mut self, ops: &[&str]) -> Option<String> {
        if let Some(Token::Operator(s)) = self.peek() {
            if ops.contains(&s.as_str()) {
                let op = s.clone();
                self.position += 1;
                return Some(op);
            }
        }
        None
    }

    /// Left-associative binary level: next (op next)*
    fn binary_level(
        &mut self,
        ops: &[&str],
        next: fn(&mut Self) -> Result<Expr, ParseError>,
    ) -> Result<Expr, ParseError> {
        let mut left = next(self)?;
        while let Some(op) = self.match_any_operator(ops) {
            let right = next(self)?;
            left = Expr::BinaryOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn expression(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(&["=", "<>", "<", ">", "<=", ">="], Self::concatenation)
    }

    fn concatenation(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(&["&"], Self::term)
    }

    fn term(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(&["+", "-"], Self::factor)
    }

    fn factor(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(&["*", "/"], Self::power)
    }

    /// Power binds left to right, like spreadsheets do (2^3^2 = 64)
    fn power(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(&["^"], Self::unary)
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        if let Some(op) = self.match_any_operator(&["-", "+"]) {
            let operand = self.unary()?;
            return Ok(Expr::UnaryOp {
                op,
                operand: Box::new(operand),
            });
        }
        self.primary()
    }

    fn arguments(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut args = Vec::new();
        if self.peek() == Some(&Token::CloseParen) {
            return Ok(args);
        }
        args.push(self.expression()?);
        while self.match_token(&Token::Comma) {
            args.push(self.expression()?);
        }
        Ok(args)
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        match self.advance() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Text(s)) => Ok(Expr::Text(s)),
            Some(Token::Identifier(name)) => {
                if !self.match_token(&Token::OpenParen) {
                    return Ok(Expr::Name(name));
                }
                let args = self.arguments()?;
                if !self.match_token(&Token::CloseParen) {
                    return Err(ParseError::new(
                        "Expected ')' after function arguments",
                        self.position,
                    ));
                }
                Ok(Expr::FunctionCall { name, args })
            }
            Some(Token::OpenParen) => {
                let expr = self.expression()?;
                if !self.match_token(&Token::CloseParen) {
                    return Err(ParseError::new(
                        "Expected ')' after expression",
                        self.position,
                    ));
                }
                Ok(expr)
            }
            Some(token) => Err(ParseError::new(
                format!("Unexpected token: {:?}", token),
                self.position,
            )),
            None => Err(ParseError::new(
                "Unexpected end of expression",
                self.position,
            )),
        }
    }
}

pub fn parse(tokens: Vec<Token>) -> Result<Expr, ParseError> {
    Parser::new(tokens).parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::excel::formula::tokenizer::tokenize;

    fn parse_str(formula: &str) -> Expr {
        parse(tokenize(formula).unwrap()).unwrap()
    }

    fn binary(op: &str, left: Expr, right: Expr) -> Expr {
        Expr::BinaryOp {
            op: op.to_string(),
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    #[test]
    fn test_multiplication_binds_tighter() {
        assert_eq!(
            parse_str("1+2*3"),
            binary(
                "+",
                Expr::Number(1.0),
                binary("*", Expr::Number(2.0), Expr::Number(3.0))
            )
        );
    }

    #[test]
    fn test_power_is_left_associative() {
        assert_eq!(
            parse_str("2^3^2"),
            binary(
                "^",
                binary("^", Expr::Number(2.0), Expr::Number(3.0)),
                Expr::Number(2.0)
            )
        );
    }

    #[test]
    fn test_function_call_with_nested_args() {
        let expr = parse_str("IF(xref0>0,ROUND(xref1,2),\"-\")");
        match expr {
            Expr::FunctionCall { name, args } => {
                assert_eq!(name, "IF");
                assert_eq!(args.len(), 3);
                assert_eq!(args[2], Expr::Text("-".to_string()));
            }
            other => panic!("expected function call, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_argument_list() {
        assert_eq!(
            parse_str("TRUE()"),
            Expr::FunctionCall {
                name: "TRUE".to_string(),
                args: vec![]
            }
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse(tokenize("SUM(1,2").unwrap()).is_err());
        assert!(parse(tokenize("1 2").unwrap()).is_err());
        assert!(parse(Vec::new()).is_err());
    }
}
