//! Formula tokenizer
//!
//! Converts a formula body such as `SUM(xref0)*1.18` into tokens. Cell
//! references have already been replaced by placeholder identifiers, so the
//! tokenizer only has to know about literals, identifiers and operators.

use std::iter::Peekable;
use std::str::Chars;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// A numeric literal (123, 45.67, 1.5e10)
    Number(f64),
    /// A double-quoted string literal
    Text(String),
    /// A function name, placeholder or TRUE/FALSE
    Identifier(String),
    /// + - * / ^ & = <> >= <= < >
    Operator(String),
    OpenParen,
    CloseParen,
    Comma,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TokenizeError {
    pub message: String,
    pub position: usize,
}

impl TokenizeError {
    fn new(message: impl Into<String>, position: usize) -> Self {
        Self {
            message: message.into(),
            position,
        }
    }
}

impl std::fmt::Display for TokenizeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Tokenize error at position {}: {}",
            self.position, self.message
        )
    }
}

impl std::error::Error for TokenizeError {}

pub struct Tokenizer<'a> {
    chars: Peekable<Chars<'a>>,
    position: usize,
}

impl<'a> Tokenizer<'a> {
    pub fn new(formula: &'a str) -> Self {
        let formula = formula.strip_prefix('=').unwrap_or(formula);
        Self {
            chars: formula.chars().peekable(),
            position: 0,
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, TokenizeError> {
        let mut tokens = Vec::new();
        while let Some(token) = self.next_token()? {
            tokens.push(token);
        }
        Ok(tokens)
    }

    fn next_token(&mut self) -> Result<Option<Token>, TokenizeError> {
        self.skip_whitespace();

        let Some(c) = self.peek() else {
            return Ok(None);
        };
        let token = match c {
            '"' => self.read_string()?,
            '(' => {
                self.advance();
                Token::OpenParen
            }
            ')' => {
                self.advance();
                Token::CloseParen
            }
            ',' => {
                self.advance();
                Token::Comma
            }
            '+' | '-' | '*' | '/' | '^' | '&' | '=' => {
                self.advance();
                Token::Operator(c.to_string())
            }
            '<' => {
                self.advance();
                match self.peek() {
                    Some('=') => {
                        self.advance();
                        Token::Operator("<=".to_string())
                    }
                    Some('>') => {
                        self.advance();
                        Token::Operator("<>".to_string())
                    }
                    _ => Token::Operator("<".to_string()),
                }
            }
            '>' => {
                self.advance();
                if self.peek() == Some('=') {
                    self.advance();
                    Token::Operator(">=".to_string())
                } else {
                    Token::Operator(">".to_string())
                }
            }
            c if c.is_ascii_digit() || c == '.' => self.read_number()?,
            c if c.is_alphabetic() || c == '_' => self.read_identifier(),
            c => {
                return Err(TokenizeError::new(
                    format!("Unexpected character: '{}'", c),
                    self.position,
                ));
            }
        };
        Ok(Some(token))
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.chars.next();
        if c.is_some() {
            self.position += 1;
        }
        c
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.advance();
        }
    }

    /// Append consecutive ASCII digits to `out`
    fn read_digits(&mut self, out: &mut String) {
        while let Some(c) = self.peek().filter(char::is_ascii_digit) {
            out.push(c);
            self.advance();
        }
    }

    fn read_string(&mut self) -> Result<Token, TokenizeError> {
        self.advance();
        let start_pos = self.position;
        let mut value = String::new();

        loop {
            match self.advance() {
                None => return Err(TokenizeError::new("Unterminated string literal", start_pos)),
                Some('"') => {
                    // Doubled quote is an escaped quote
                    if self.peek() == Some('"') {
                        value.push('"');
                        self.advance();
                    } else {
                        break;
                    }
                }
                Some(c) => value.push(c),
            }
        }

        Ok(Token::Text(value))
    }

    fn read_number(&mut self) -> Result<Token, TokenizeError> {
        let start_pos = self.position;
        let mut num_str = String::new();

        self.read_digits(&mut num_str);
        if self.peek() == Some('.') {
            num_str.push('.');
            self.advance();
            self.read_digits(&mut num_str);
        }
        if let Some(e) = self.peek().filter(|c| *c == 'e' || *c == 'E') {
            num_str.push(e);
            self.advance();
            if let Some(sign) = self.peek().filter(|c| *c == '+' || *c == '-') {
                num_str.push(sign);
                self.advance();
            }
            self.read_digits(&mut num_str);
        }

        num_str
            .parse::<f64>()
            .map(Token::Number)
            .map_err(|_| TokenizeError::new(format!("Invalid number: {}", num_str), start_pos))
    }

    fn read_identifier(&mut self) -> Token {
        let mut ident = String::new();
        while let Some(c) = self
            .peek()
            .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '.')
        {
            ident.push(c);
            self.advance();
        }
        Token::Identifier(ident)
    }
}

pub fn tokenize(formula: &str) -> Result<Vec<Token>, TokenizeError> {
    Tokenizer::new(formula).tokenize()
}
