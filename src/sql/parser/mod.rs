pub mod ast;
mod lexer;

use crate::error::{Error, Result};
use crate::sql::types::{ColumnRef, DataType};

use self::lexer::{Keyword, Lexer, Token};

/// 命令解析
pub struct Parser<'a> {
    // 词法分析器
    lexer: std::iter::Peekable<Lexer<'a>>,
}

impl<'a> Parser<'a> {
    /// Creates a new parser for the given command
    pub fn new(command: &'a str) -> Parser<'a> {
        Parser { lexer: Lexer::new(command).peekable() }
    }

    /// Checks whether the command starts with a known command keyword.
    /// Anything else is an unknown command rather than a syntax error.
    pub fn is_command(command: &str) -> bool {
        matches!(
            Lexer::new(command).next(),
            Some(Ok(Token::Keyword(
                Keyword::Create
                    | Keyword::Drop
                    | Keyword::Use
                    | Keyword::Insert
                    | Keyword::Delete
                    | Keyword::Select
                    | Keyword::Explain
            )))
        )
    }

    /// Parses the input string into an AST statement. A trailing semicolon
    /// is allowed, anything else after the statement is an error.
    pub fn parse(&mut self) -> Result<ast::Statement> {
        let statement = self.parse_statement()?;
        self.next_if_token(Token::Semicolon);
        self.next_expect(None)?;
        Ok(statement)
    }

    /// 获取下一个词法分析器标记，如果没有找到则抛出错误。
    fn next(&mut self) -> Result<Token> {
        self.lexer.next().unwrap_or_else(|| Err(Error::Parse("Unexpected end of input".into())))
    }

    /// Grabs the next token if it is the expected one, or errors. With None,
    /// expects the end of input.
    fn next_expect(&mut self, expect: Option<Token>) -> Result<Option<Token>> {
        if let Some(t) = expect {
            let token = match self.lexer.next() {
                Some(token) => token?,
                None => return Err(Error::Parse(format!("Expected token {}, found end of input", t))),
            };
            if token == t {
                Ok(Some(token))
            } else {
                Err(Error::Parse(format!("Expected token {}, found {}", t, token)))
            }
        } else if let Some(token) = self.peek()? {
            Err(Error::Parse(format!("Unexpected token {}", token)))
        } else {
            Ok(None)
        }
    }

    /// 获取下一个标识符，如果没有找到则报错。
    fn next_ident(&mut self) -> Result<String> {
        match self.next()? {
            Token::Ident(ident) => Ok(ident),
            token => Err(Error::Parse(format!("Expected identifier, got {}", token))),
        }
    }

    /// 如果下一个词法分析器标记满足谓词函数，则获取它。
    fn next_if<F: Fn(&Token) -> bool>(&mut self, predicate: F) -> Option<Token> {
        self.peek().unwrap_or(None).filter(|t| predicate(t))?;
        self.next().ok()
    }

    /// Grabs the next token if it is a keyword
    fn next_if_keyword(&mut self) -> Option<Token> {
        self.next_if(|t| matches!(t, Token::Keyword(_)))
    }

    /// Grabs the next token if it equals the given token
    fn next_if_token(&mut self, token: Token) -> Option<Token> {
        self.next_if(|t| t == &token)
    }

    /// 查看下一个标记，把 Option<Result<Token>> 转换为 Result<Option<Token>>。
    fn peek(&mut self) -> Result<Option<Token>> {
        self.lexer.peek().cloned().transpose()
    }

    fn parse_statement(&mut self) -> Result<ast::Statement> {
        match self.peek()? {
            Some(Token::Keyword(Keyword::Create)) | Some(Token::Keyword(Keyword::Drop)) => {
                self.parse_ddl()
            }
            Some(Token::Keyword(Keyword::Use)) => {
                self.next()?;
                Ok(ast::Statement::Use { name: self.next_ident()? })
            }
            Some(Token::Keyword(Keyword::Insert)) => self.parse_insert(),
            Some(Token::Keyword(Keyword::Delete)) => self.parse_delete(),
            Some(Token::Keyword(Keyword::Select)) => {
                Ok(ast::Statement::Select(Box::new(self.parse_select()?)))
            }
            Some(Token::Keyword(Keyword::Explain)) => {
                self.next()?;
                Ok(ast::Statement::Explain(Box::new(self.parse_select()?)))
            }
            Some(token) => Err(Error::Parse(format!("Unexpected token {}", token))),
            None => Err(Error::Parse("Unexpected end of input".into())),
        }
    }

    // 解析ddl
    fn parse_ddl(&mut self) -> Result<ast::Statement> {
        match self.next()? {
            Token::Keyword(Keyword::Create) => match self.next()? {
                Token::Keyword(Keyword::Database) => {
                    Ok(ast::Statement::CreateDatabase { name: self.next_ident()? })
                }
                Token::Keyword(Keyword::Table) => self.parse_ddl_create_table(),
                Token::Keyword(Keyword::Index) => self.parse_ddl_create_index(false),
                Token::Keyword(Keyword::Unique) => {
                    self.next_expect(Some(Keyword::Index.into()))?;
                    self.parse_ddl_create_index(true)
                }
                token => Err(Error::Parse(format!("Unexpected token {}", token))),
            },
            Token::Keyword(Keyword::Drop) => match self.next()? {
                Token::Keyword(Keyword::Database) => {
                    Ok(ast::Statement::DropDatabase { name: self.next_ident()? })
                }
                Token::Keyword(Keyword::Table) => {
                    Ok(ast::Statement::DropTable { name: self.next_ident()? })
                }
                token => Err(Error::Parse(format!("Unexpected token {}", token))),
            },
            token => Err(Error::Parse(format!("Unexpected token {}", token))),
        }
    }

    /// Parses a CREATE TABLE DDL statement. The CREATE TABLE prefix has
    /// already been consumed.
    fn parse_ddl_create_table(&mut self) -> Result<ast::Statement> {
        let name = self.next_ident()?;
        let mut attributes = Vec::new();
        while let Some(Token::Ident(column)) = self.next_if(|t| matches!(t, Token::Ident(_))) {
            self.next_expect(Some(Token::Colon))?;
            let datatype = match self.next()? {
                Token::Ident(t) => DataType::parse(&t)
                    .ok_or_else(|| Error::Parse(format!("Unknown type {} for attribute {}", t, column)))?,
                token => return Err(Error::Parse(format!("Expected type, got {}", token))),
            };
            attributes.push((column, datatype));
            self.next_if_token(Token::Comma);
        }
        if attributes.is_empty() {
            return Err(Error::Parse(format!("Table {} has no attributes", name)));
        }
        Ok(ast::Statement::CreateTable { name, attributes })
    }

    /// Parses `col ON table`, after CREATE [UNIQUE] INDEX
    fn parse_ddl_create_index(&mut self, unique: bool) -> Result<ast::Statement> {
        let column = self.next_ident()?;
        self.next_expect(Some(Keyword::On.into()))?;
        let table = self.next_ident()?;
        Ok(ast::Statement::CreateIndex { table, column, unique })
    }

    /// Parses INSERT INTO and INSERT BULK INTO
    fn parse_insert(&mut self) -> Result<ast::Statement> {
        self.next_expect(Some(Keyword::Insert.into()))?;
        let bulk = self.next_if_token(Keyword::Bulk.into()).is_some();
        self.next_expect(Some(Keyword::Into.into()))?;
        let table = self.next_ident()?;
        self.next_expect(Some(Keyword::Values.into()))?;

        if !bulk {
            let values = self.parse_values()?;
            return Ok(ast::Statement::Insert { table, values });
        }
        let mut rows = vec![self.parse_values()?];
        loop {
            self.next_if_token(Token::Comma);
            match self.peek()? {
                Some(Token::OpenParen) => rows.push(self.parse_values()?),
                _ => break,
            }
        }
        Ok(ast::Statement::InsertBulk { table, rows })
    }

    /// Parses a parenthesized value tuple. Values are separated by
    /// whitespace, commas are optional.
    fn parse_values(&mut self) -> Result<Vec<ast::Literal>> {
        self.next_expect(Some(Token::OpenParen))?;
        let mut values = Vec::new();
        loop {
            if self.next_if_token(Token::CloseParen).is_some() {
                return Ok(values);
            }
            values.push(self.parse_literal()?);
            self.next_if_token(Token::Comma);
        }
    }

    /// Parses a literal. Bare words are read as strings.
    fn parse_literal(&mut self) -> Result<ast::Literal> {
        match self.next()? {
            Token::Number(n) => Ok(ast::Literal::Number(n)),
            Token::String(s) | Token::Ident(s) => Ok(ast::Literal::String(s)),
            token => Err(Error::Parse(format!("Expected value, got {}", token))),
        }
    }

    /// Parses DELETE FROM table WHERE column = literal
    fn parse_delete(&mut self) -> Result<ast::Statement> {
        self.next_expect(Some(Keyword::Delete.into()))?;
        self.next_expect(Some(Keyword::From.into()))?;
        let table = self.next_ident()?;
        self.next_expect(Some(Keyword::Where.into()))?;
        let column = self.parse_column_ref()?;
        match self.next()? {
            Token::Equal => {}
            token => {
                return Err(Error::Parse(format!(
                    "DELETE only supports equality conditions, got {}",
                    token
                )))
            }
        }
        let value = self.parse_literal()?;
        if self.peek()? == Some(Keyword::And.into()) {
            return Err(Error::Parse("DELETE supports a single condition".into()));
        }
        Ok(ast::Statement::Delete {
            table,
            condition: ast::Condition { column, operator: ast::Operator::Equal, value },
        })
    }

    /// Parses a SELECT query, with clauses in fixed order
    fn parse_select(&mut self) -> Result<ast::Select> {
        self.next_expect(Some(Keyword::Select.into()))?;
        let projection = self.parse_projection()?;
        self.next_expect(Some(Keyword::From.into()))?;
        let from = self.parse_table_ref()?;

        let mut joins = Vec::new();
        while self.next_if_token(Keyword::Inner.into()).is_some() {
            self.next_expect(Some(Keyword::Join.into()))?;
            joins.push(self.parse_join()?);
        }

        let mut filter = Vec::new();
        if self.next_if_token(Keyword::Where.into()).is_some() {
            loop {
                filter.push(self.parse_condition()?);
                if self.next_if_token(Keyword::And.into()).is_none() {
                    break;
                }
            }
        }

        let mut group_by = Vec::new();
        if self.next_if_token(Keyword::Group.into()).is_some() {
            self.next_expect(Some(Keyword::By.into()))?;
            loop {
                group_by.push(self.parse_column_ref()?);
                if self.next_if_token(Token::Comma).is_none() {
                    break;
                }
            }
        }

        let mut order_by = Vec::new();
        if self.next_if_token(Keyword::Order.into()).is_some() {
            self.next_expect(Some(Keyword::By.into()))?;
            loop {
                let expr = self.parse_expression()?;
                let direction = match self.next_if_keyword() {
                    Some(Token::Keyword(Keyword::Asc)) => ast::Direction::Ascending,
                    Some(Token::Keyword(Keyword::Desc)) => ast::Direction::Descending,
                    Some(token) => return Err(Error::Parse(format!("Unexpected token {}", token))),
                    None => ast::Direction::Ascending,
                };
                order_by.push((expr, direction));
                if self.next_if_token(Token::Comma).is_none() {
                    break;
                }
            }
        }

        let select = ast::Select { projection, from, joins, filter, group_by, order_by };
        Self::validate_grouping(&select)?;
        Ok(select)
    }

    /// Mixing aggregates with plain columns requires every plain column to
    /// be grouped on.
    fn validate_grouping(select: &ast::Select) -> Result<()> {
        let items = match &select.projection {
            ast::Projection::Items(items) => items,
            ast::Projection::All => return Ok(()),
        };
        if select.aggregates().is_empty() {
            return Ok(());
        }
        for item in items {
            if let ast::Expression::Column(column) = item {
                let grouped = select.group_by.iter().any(|g| {
                    g.name == column.name
                        && (g.qualifier.is_none()
                            || column.qualifier.is_none()
                            || g.qualifier == column.qualifier)
                });
                if !grouped {
                    return Err(Error::Value(format!(
                        "Column {} must appear in GROUP BY or be used in an aggregate function",
                        column
                    )));
                }
            }
        }
        Ok(())
    }

    fn parse_projection(&mut self) -> Result<ast::Projection> {
        if self.next_if_token(Token::Asterisk).is_some() {
            return Ok(ast::Projection::All);
        }
        let mut items = Vec::new();
        loop {
            items.push(self.parse_expression()?);
            if self.next_if_token(Token::Comma).is_none() {
                break;
            }
        }
        Ok(ast::Projection::Items(items))
    }

    /// Parses a table name and optional alias
    fn parse_table_ref(&mut self) -> Result<ast::TableRef> {
        let name = self.next_ident()?;
        let alias = match self.next_if(|t| matches!(t, Token::Ident(_))) {
            Some(Token::Ident(alias)) => alias,
            _ => name.clone(),
        };
        Ok(ast::TableRef { name, alias })
    }

    /// Parses `table [alias] ON a.x = b.y`, after INNER JOIN
    fn parse_join(&mut self) -> Result<ast::Join> {
        let table = self.parse_table_ref()?;
        self.next_expect(Some(Keyword::On.into()))?;
        let left = self.parse_column_ref()?;
        self.next_expect(Some(Token::Equal))?;
        let right = self.parse_column_ref()?;
        for column in [&left, &right] {
            if column.qualifier.is_none() {
                return Err(Error::Parse(format!(
                    "Join condition column {} must be qualified as alias.column",
                    column
                )));
            }
        }
        Ok(ast::Join { table, left, right })
    }

    /// Parses a single comparison `column op literal`
    fn parse_condition(&mut self) -> Result<ast::Condition> {
        let column = self.parse_column_ref()?;
        let operator = match self.next()? {
            Token::Equal => ast::Operator::Equal,
            Token::GreaterThan => ast::Operator::GreaterThan,
            Token::GreaterThanOrEqual => ast::Operator::GreaterThanOrEqual,
            Token::LessThan => ast::Operator::LessThan,
            Token::LessThanOrEqual => ast::Operator::LessThanOrEqual,
            token => {
                return Err(Error::Parse(format!("Expected comparison operator, got {}", token)))
            }
        };
        let value = self.parse_literal()?;
        Ok(ast::Condition { column, operator, value })
    }

    /// Parses a column reference or an aggregate call
    fn parse_expression(&mut self) -> Result<ast::Expression> {
        let name = self.next_ident()?;
        if self.peek()? == Some(Token::OpenParen) {
            let function = ast::Function::from_name(&name)
                .ok_or_else(|| Error::Parse(format!("Unknown function {}", name)))?;
            self.next()?;
            let argument = if self.next_if_token(Token::Asterisk).is_some() {
                if function != ast::Function::Count {
                    return Err(Error::Parse(format!("{}(*) is not supported", function)));
                }
                None
            } else {
                Some(self.parse_column_ref()?)
            };
            self.next_expect(Some(Token::CloseParen))?;
            return Ok(ast::Expression::Aggregate(ast::Aggregate { function, argument }));
        }
        self.parse_column_ref_rest(name).map(ast::Expression::Column)
    }

    /// Parses `column` or `alias.column`
    fn parse_column_ref(&mut self) -> Result<ColumnRef> {
        let name = self.next_ident()?;
        self.parse_column_ref_rest(name)
    }

    fn parse_column_ref_rest(&mut self, name: String) -> Result<ColumnRef> {
        if self.next_if_token(Token::Period).is_some() {
            Ok(ColumnRef::qualified(name, self.next_ident()?))
        } else {
            Ok(ColumnRef::unqualified(name))
        }
    }
}
