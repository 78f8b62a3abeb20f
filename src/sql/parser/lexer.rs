use crate::error::{Error, Result};

use std::fmt::{self, Display};
use std::iter::Peekable;
use std::str::Chars;

/// A lexer token
#[derive(Clone, Debug, PartialEq)]
pub enum Token {
    Number(String),
    String(String),
    Ident(String),
    Keyword(Keyword),
    Period,
    Equal,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Asterisk,
    Colon,
    Comma,
    Semicolon,
    OpenParen,
    CloseParen,
}

impl Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Token::Number(n) => n,
            Token::String(s) => s,
            Token::Ident(s) => s,
            Token::Keyword(k) => k.to_str(),
            Token::Period => ".",
            Token::Equal => "=",
            Token::GreaterThan => ">",
            Token::GreaterThanOrEqual => ">=",
            Token::LessThan => "<",
            Token::LessThanOrEqual => "<=",
            Token::Asterisk => "*",
            Token::Colon => ":",
            Token::Comma => ",",
            Token::Semicolon => ";",
            Token::OpenParen => "(",
            Token::CloseParen => ")",
        })
    }
}

impl From<Keyword> for Token {
    fn from(keyword: Keyword) -> Self {
        Self::Keyword(keyword)
    }
}

/// Lexer keywords
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Keyword {
    And,
    Asc,
    Bulk,
    By,
    Create,
    Database,
    Delete,
    Desc,
    Drop,
    Explain,
    From,
    Group,
    Index,
    Inner,
    Insert,
    Into,
    Join,
    On,
    Order,
    Select,
    Table,
    Unique,
    Use,
    Values,
    Where,
}

impl Keyword {
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(ident: &str) -> Option<Self> {
        Some(match ident.to_uppercase().as_ref() {
            "AND" => Self::And,
            "ASC" => Self::Asc,
            "BULK" => Self::Bulk,
            "BY" => Self::By,
            "CREATE" => Self::Create,
            "DATABASE" => Self::Database,
            "DELETE" => Self::Delete,
            "DESC" => Self::Desc,
            "DROP" => Self::Drop,
            "EXPLAIN" => Self::Explain,
            "FROM" => Self::From,
            "GROUP" => Self::Group,
            "INDEX" => Self::Index,
            "INNER" => Self::Inner,
            "INSERT" => Self::Insert,
            "INTO" => Self::Into,
            "JOIN" => Self::Join,
            "ON" => Self::On,
            "ORDER" => Self::Order,
            "SELECT" => Self::Select,
            "TABLE" => Self::Table,
            "UNIQUE" => Self::Unique,
            "USE" => Self::Use,
            "VALUES" => Self::Values,
            "WHERE" => Self::Where,
            _ => return None,
        })
    }

    pub fn to_str(self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Asc => "ASC",
            Self::Bulk => "BULK",
            Self::By => "BY",
            Self::Create => "CREATE",
            Self::Database => "DATABASE",
            Self::Delete => "DELETE",
            Self::Desc => "DESC",
            Self::Drop => "DROP",
            Self::Explain => "EXPLAIN",
            Self::From => "FROM",
            Self::Group => "GROUP",
            Self::Index => "INDEX",
            Self::Inner => "INNER",
            Self::Insert => "INSERT",
            Self::Into => "INTO",
            Self::Join => "JOIN",
            Self::On => "ON",
            Self::Order => "ORDER",
            Self::Select => "SELECT",
            Self::Table => "TABLE",
            Self::Unique => "UNIQUE",
            Self::Use => "USE",
            Self::Values => "VALUES",
            Self::Where => "WHERE",
        }
    }
}

impl Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_str())
    }
}

/// A lexer tokenizes an input string as an iterator. Whitespace separates
/// tokens, quoted strings are preserved verbatim (without quotes), and
/// keywords are recognized case-insensitively.
pub struct Lexer<'a> {
    iter: Peekable<Chars<'a>>,
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Result<Token>;

    fn next(&mut self) -> Option<Result<Token>> {
        match self.scan() {
            Ok(Some(token)) => Some(Ok(token)),
            Ok(None) => self.iter.peek().map(|c| Err(Error::Parse(format!("Unexpected character {}", c)))),
            Err(err) => Some(Err(err)),
        }
    }
}

impl<'a> Lexer<'a> {
    /// Creates a new lexer for the given input string
    pub fn new(input: &'a str) -> Lexer<'a> {
        Lexer { iter: input.chars().peekable() }
    }

    /// Consumes any whitespace characters
    fn consume_whitespace(&mut self) {
        self.next_while(|c| c.is_whitespace());
    }

    /// Grabs the next character if it matches the predicate function
    fn next_if<F: Fn(char) -> bool>(&mut self, predicate: F) -> Option<char> {
        self.iter.peek().filter(|&c| predicate(*c))?;
        self.iter.next()
    }

    /// Grabs the next characters that match the predicate, as a string
    fn next_while<F: Fn(char) -> bool>(&mut self, predicate: F) -> Option<String> {
        let mut value = String::new();
        while let Some(c) = self.next_if(&predicate) {
            value.push(c)
        }
        Some(value).filter(|v| !v.is_empty())
    }

    /// Scans the input for the next token if any, ignoring leading whitespace
    fn scan(&mut self) -> Result<Option<Token>> {
        self.consume_whitespace();
        match self.iter.peek() {
            Some('\'') | Some('"') => self.scan_string(),
            Some(c) if c.is_ascii_digit() || *c == '-' => Ok(self.scan_number()),
            Some(c) if c.is_alphabetic() || *c == '_' => Ok(self.scan_ident()),
            Some(_) => Ok(self.scan_symbol()),
            None => Ok(None),
        }
    }

    /// Scans the input for the next ident or keyword token, if any
    fn scan_ident(&mut self) -> Option<Token> {
        let name = self.next_while(|c| c.is_alphanumeric() || c == '_')?;
        Some(Keyword::from_str(&name).map(Token::Keyword).unwrap_or(Token::Ident(name)))
    }

    /// Scans the input for the next number token, if any. A leading minus
    /// sign must be followed by a digit.
    fn scan_number(&mut self) -> Option<Token> {
        let mut num = String::new();
        if self.iter.peek() == Some(&'-') {
            let mut lookahead = self.iter.clone();
            lookahead.next();
            if !lookahead.peek().map(|c| c.is_ascii_digit()).unwrap_or(false) {
                return None;
            }
            self.iter.next();
            num.push('-');
        }
        num.push_str(&self.next_while(|c| c.is_ascii_digit())?);
        if self.iter.peek() == Some(&'.') {
            let mut lookahead = self.iter.clone();
            lookahead.next();
            if lookahead.peek().map(|c| c.is_ascii_digit()).unwrap_or(false) {
                self.iter.next();
                num.push('.');
                num.push_str(&self.next_while(|c| c.is_ascii_digit())?);
            }
        }
        Some(Token::Number(num))
    }

    /// Scans the input for the next quoted string, if any
    fn scan_string(&mut self) -> Result<Option<Token>> {
        let quote = match self.iter.next() {
            Some(q) => q,
            None => return Ok(None),
        };
        let mut s = String::new();
        loop {
            match self.iter.next() {
                Some(c) if c == quote => break,
                Some(c) => s.push(c),
                None => return Err(Error::Parse("Unexpected end of string literal".into())),
            }
        }
        Ok(Some(Token::String(s)))
    }

    /// Scans the input for the next symbol token, if any, and
    /// handles any multi-symbol tokens
    fn scan_symbol(&mut self) -> Option<Token> {
        self.next_if(|c| ".=><*:,;()".contains(c)).map(|c| match c {
            '.' => Token::Period,
            '=' => Token::Equal,
            '>' => Token::GreaterThan,
            '<' => Token::LessThan,
            '*' => Token::Asterisk,
            ':' => Token::Colon,
            ',' => Token::Comma,
            ';' => Token::Semicolon,
            '(' => Token::OpenParen,
            _ => Token::CloseParen,
        })
        .map(|token| match token {
            Token::GreaterThan if self.next_if(|c| c == '=').is_some() => Token::GreaterThanOrEqual,
            Token::LessThan if self.next_if(|c| c == '=').is_some() => Token::LessThanOrEqual,
            token => token,
        })
    }
}
