//! A recursive descent parser for the accepted C subset.
//!
//! The parser distinguishes declarations from expression statements by
//! checking whether a statement starts with a type name.
//! For this it tracks all typedef names seen so far,
//! so typedefs have to appear before their first use,
//! as they do in well-formed C.

use super::ast::*;
use super::lexer::{Token, TokenKind};
use crate::prelude::*;
use std::collections::BTreeSet;

/// Parse a token stream into a translation unit.
pub fn parse(tokens: Vec<Token>) -> Result<TranslationUnit, Error> {
    Parser::new(tokens).parse_translation_unit()
}

/// The built-in type names that can start a declaration.
const TYPE_KEYWORDS: &[&str] = &[
    "void", "char", "int", "long", "short", "signed", "unsigned", "const", "static", "struct",
    "size_t", "ssize_t", "off_t",
];

struct Parser {
    tokens: Vec<Token>,
    position: usize,
    typedef_names: BTreeSet<String>,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Parser {
        Parser {
            tokens,
            position: 0,
            typedef_names: BTreeSet::new(),
        }
    }

    fn peek(&self) -> Option<&TokenKind> {
        self.tokens.get(self.position).map(|token| &token.kind)
    }

    fn peek_at(&self, offset: usize) -> Option<&TokenKind> {
        self.tokens
            .get(self.position + offset)
            .map(|token| &token.kind)
    }

    /// The line of the current token, or of the last token if the input is exhausted.
    fn current_line(&self) -> u64 {
        self.tokens
            .get(self.position)
            .or_else(|| self.tokens.last())
            .map(|token| token.line)
            .unwrap_or(1)
    }

    fn advance(&mut self) -> Result<Token, Error> {
        let token = self
            .tokens
            .get(self.position)
            .cloned()
            .ok_or_else(|| anyhow!("Unexpected end of input"))?;
        self.position += 1;
        Ok(token)
    }

    fn expect(&mut self, expected: TokenKind) -> Result<(), Error> {
        let token = self.advance()?;
        if token.kind == expected {
            Ok(())
        } else {
            Err(anyhow!(
                "Expected {:?} but found {:?} at line {}",
                expected,
                token.kind,
                token.line
            ))
        }
    }

    fn expect_ident(&mut self) -> Result<String, Error> {
        let token = self.advance()?;
        match token.kind {
            TokenKind::Ident(name) => Ok(name),
            other => Err(anyhow!(
                "Expected an identifier but found {:?} at line {}",
                other,
                token.line
            )),
        }
    }

    /// Consume the given token if it is next in the stream.
    fn accept(&mut self, kind: &TokenKind) -> bool {
        if self.peek() == Some(kind) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    fn peek_is_word(&self, word: &str) -> bool {
        matches!(self.peek(), Some(TokenKind::Ident(name)) if name == word)
    }

    fn accept_word(&mut self, word: &str) -> bool {
        if self.peek_is_word(word) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    /// Whether the token at the given lookahead offset can start a type.
    fn is_type_start_at(&self, offset: usize) -> bool {
        match self.peek_at(offset) {
            Some(TokenKind::Ident(name)) => {
                TYPE_KEYWORDS.contains(&name.as_str()) || self.typedef_names.contains(name)
            }
            _ => false,
        }
    }

    fn is_type_start(&self) -> bool {
        self.is_type_start_at(0)
    }

    fn parse_translation_unit(&mut self) -> Result<TranslationUnit, Error> {
        let mut unit = TranslationUnit {
            types: Vec::new(),
            functions: Vec::new(),
        };
        while self.peek().is_some() {
            if self.peek_is_word("typedef") {
                unit.types.push(self.parse_typedef()?);
            } else if self.peek_is_word("struct")
                && matches!(self.peek_at(1), Some(TokenKind::Ident(_)))
                && matches!(
                    self.peek_at(2),
                    Some(TokenKind::LBrace) | Some(TokenKind::Semicolon)
                )
            {
                if let Some(struct_def) = self.parse_struct_def()? {
                    unit.types.push(struct_def);
                }
            } else if let Some(function) = self.parse_function()? {
                unit.functions.push(function);
            }
        }
        Ok(unit)
    }

    fn parse_typedef(&mut self) -> Result<TypeDef, Error> {
        self.expect(TokenKind::Ident("typedef".to_string()))?;
        let base = self.parse_type_prefix()?;
        let (name, ty) = self.parse_declarator(base)?;
        let name = name.ok_or_else(|| {
            anyhow!("Typedef without a name at line {}", self.current_line())
        })?;
        self.expect(TokenKind::Semicolon)?;
        self.typedef_names.insert(name.clone());
        Ok(TypeDef::Typedef { name, ty })
    }

    /// Parse a struct definition or forward declaration.
    /// Forward declarations produce no type definition of their own.
    fn parse_struct_def(&mut self) -> Result<Option<TypeDef>, Error> {
        self.expect(TokenKind::Ident("struct".to_string()))?;
        let name = self.expect_ident()?;
        if self.accept(&TokenKind::Semicolon) {
            return Ok(None);
        }
        self.expect(TokenKind::LBrace)?;
        let mut fields = Vec::new();
        while !self.accept(&TokenKind::RBrace) {
            let base = self.parse_type_prefix()?;
            let (field_name, field_ty) = self.parse_declarator(base)?;
            let field_name = field_name.ok_or_else(|| {
                anyhow!(
                    "Struct field without a name at line {}",
                    self.current_line()
                )
            })?;
            self.expect(TokenKind::Semicolon)?;
            fields.push((field_name, field_ty));
        }
        self.expect(TokenKind::Semicolon)?;
        Ok(Some(TypeDef::Struct { name, fields }))
    }

    /// Parse a function definition. Prototypes are consumed and dropped.
    fn parse_function(&mut self) -> Result<Option<Function>, Error> {
        let line = self.current_line();
        let base = self.parse_type_prefix()?;
        let (name, return_type) = self.parse_declarator(base)?;
        let name = name.ok_or_else(|| {
            anyhow!("Expected a function name at line {}", self.current_line())
        })?;
        self.expect(TokenKind::LParen)?;
        let params = self.parse_params()?;
        self.expect(TokenKind::RParen)?;
        if self.accept(&TokenKind::Semicolon) {
            return Ok(None);
        }
        self.expect(TokenKind::LBrace)?;
        let body = self.parse_block()?;
        Ok(Some(Function {
            name,
            return_type,
            params,
            body,
            line,
        }))
    }

    fn parse_params(&mut self) -> Result<Vec<(String, TypeExpr)>, Error> {
        let mut params = Vec::new();
        if self.peek() == Some(&TokenKind::RParen) {
            return Ok(params);
        }
        loop {
            let base = self.parse_type_prefix()?;
            let (name, ty) = self.parse_declarator(base)?;
            match name {
                Some(name) => params.push((name, ty)),
                // `f(void)` declares no parameters.
                None if ty == TypeExpr::Void && params.is_empty() => return Ok(params),
                None => {
                    return Err(anyhow!(
                        "Expected a parameter name at line {}",
                        self.current_line()
                    ))
                }
            }
            if !self.accept(&TokenKind::Comma) {
                return Ok(params);
            }
        }
    }

    /// Parse the leading part of a type, up to but excluding any `*`.
    fn parse_type_prefix(&mut self) -> Result<TypeExpr, Error> {
        while self.accept_word("const") || self.accept_word("static") {}
        if self.accept_word("struct") {
            let name = self.expect_ident()?;
            return Ok(TypeExpr::Struct(name));
        }
        if self.accept_word("unsigned") || self.accept_word("signed") {
            if self.accept_word("char") {
                return Ok(TypeExpr::Char);
            }
            if self.accept_word("long") {
                self.accept_word("int");
                return Ok(TypeExpr::Int(8));
            }
            self.accept_word("int");
            return Ok(TypeExpr::Int(4));
        }
        if self.accept_word("void") {
            return Ok(TypeExpr::Void);
        }
        if self.accept_word("char") {
            return Ok(TypeExpr::Char);
        }
        if self.accept_word("short") {
            self.accept_word("int");
            return Ok(TypeExpr::Int(2));
        }
        if self.accept_word("int") {
            return Ok(TypeExpr::Int(4));
        }
        if self.accept_word("long") {
            self.accept_word("long");
            self.accept_word("int");
            return Ok(TypeExpr::Int(8));
        }
        if self.accept_word("size_t") || self.accept_word("ssize_t") || self.accept_word("off_t") {
            return Ok(TypeExpr::Int(8));
        }
        if let Some(TokenKind::Ident(name)) = self.peek() {
            if self.typedef_names.contains(name) {
                let name = name.clone();
                self.position += 1;
                return Ok(TypeExpr::Named(name));
            }
        }
        Err(anyhow!(
            "Expected a type name at line {}",
            self.current_line()
        ))
    }

    /// Parse the declarator following a type prefix.
    ///
    /// Handles pointer stars, a plain name with an optional array length,
    /// and the function pointer form `(*name)(param-types)`.
    /// The name is optional so that abstract declarators in function
    /// pointer parameter lists parse with the same code.
    fn parse_declarator(
        &mut self,
        mut base: TypeExpr,
    ) -> Result<(Option<String>, TypeExpr), Error> {
        loop {
            if self.accept(&TokenKind::Star) {
                base = TypeExpr::Pointer(Box::new(base));
                while self.accept_word("const") {}
            } else {
                break;
            }
        }
        if self.peek() == Some(&TokenKind::LParen) && self.peek_at(1) == Some(&TokenKind::Star) {
            self.expect(TokenKind::LParen)?;
            self.expect(TokenKind::Star)?;
            let name = match self.peek() {
                Some(TokenKind::Ident(name)) => {
                    let name = name.clone();
                    self.position += 1;
                    Some(name)
                }
                _ => None,
            };
            self.expect(TokenKind::RParen)?;
            self.expect(TokenKind::LParen)?;
            let mut params = Vec::new();
            if self.peek() != Some(&TokenKind::RParen) {
                loop {
                    let param_base = self.parse_type_prefix()?;
                    let (_, param_ty) = self.parse_declarator(param_base)?;
                    params.push(param_ty);
                    if !self.accept(&TokenKind::Comma) {
                        break;
                    }
                }
            }
            self.expect(TokenKind::RParen)?;
            let ty = TypeExpr::FunctionPointer {
                params,
                return_type: Box::new(base),
            };
            return Ok((name, ty));
        }
        let name = match self.peek() {
            Some(TokenKind::Ident(name)) => {
                let name = name.clone();
                self.position += 1;
                Some(name)
            }
            _ => None,
        };
        if self.accept(&TokenKind::LBracket) {
            let length = match self.advance()? {
                Token {
                    kind: TokenKind::Number(length),
                    ..
                } if length >= 0 => length as u64,
                token => {
                    return Err(anyhow!(
                        "Expected an array length at line {}",
                        token.line
                    ))
                }
            };
            self.expect(TokenKind::RBracket)?;
            base = TypeExpr::Array {
                element: Box::new(base),
                length,
            };
        }
        Ok((name, base))
    }

    /// Parse a type without a declared name, as used in casts and `sizeof`.
    fn parse_type_name(&mut self) -> Result<TypeExpr, Error> {
        let mut ty = self.parse_type_prefix()?;
        while self.accept(&TokenKind::Star) {
            ty = TypeExpr::Pointer(Box::new(ty));
            while self.accept_word("const") {}
        }
        Ok(ty)
    }

    /// Parse statements up to and including the closing brace.
    fn parse_block(&mut self) -> Result<Vec<Statement>, Error> {
        let mut statements = Vec::new();
        while !self.accept(&TokenKind::RBrace) {
            if self.peek().is_none() {
                return Err(anyhow!("Unexpected end of input inside a block"));
            }
            statements.push(self.parse_statement()?);
        }
        Ok(statements)
    }

    /// Parse a statement body, either a braced block or a single statement.
    fn parse_body(&mut self) -> Result<Vec<Statement>, Error> {
        if self.accept(&TokenKind::LBrace) {
            self.parse_block()
        } else {
            Ok(vec![self.parse_statement()?])
        }
    }

    fn parse_statement(&mut self) -> Result<Statement, Error> {
        let line = self.current_line();
        if self.accept_word("return") {
            let value = if self.peek() == Some(&TokenKind::Semicolon) {
                None
            } else {
                Some(self.parse_expr()?)
            };
            self.expect(TokenKind::Semicolon)?;
            return Ok(Statement {
                kind: StatementKind::Return(value),
                line,
            });
        }
        if self.accept_word("if") {
            self.expect(TokenKind::LParen)?;
            let condition = self.parse_expr()?;
            self.expect(TokenKind::RParen)?;
            let then_body = self.parse_body()?;
            let else_body = if self.accept_word("else") {
                self.parse_body()?
            } else {
                Vec::new()
            };
            return Ok(Statement {
                kind: StatementKind::If {
                    condition,
                    then_body,
                    else_body,
                },
                line,
            });
        }
        if self.accept_word("while") {
            self.expect(TokenKind::LParen)?;
            let condition = self.parse_expr()?;
            self.expect(TokenKind::RParen)?;
            let body = self.parse_body()?;
            return Ok(Statement {
                kind: StatementKind::While { condition, body },
                line,
            });
        }
        if self.accept_word("for") {
            self.expect(TokenKind::LParen)?;
            let init = if self.peek() == Some(&TokenKind::Semicolon) {
                None
            } else {
                let init_line = self.current_line();
                let kind = self.parse_simple_statement()?;
                Some(Box::new(Statement {
                    kind,
                    line: init_line,
                }))
            };
            self.expect(TokenKind::Semicolon)?;
            let condition = if self.peek() == Some(&TokenKind::Semicolon) {
                None
            } else {
                Some(self.parse_expr()?)
            };
            self.expect(TokenKind::Semicolon)?;
            let step = if self.peek() == Some(&TokenKind::RParen) {
                None
            } else {
                let step_line = self.current_line();
                let kind = self.parse_simple_statement()?;
                Some(Box::new(Statement {
                    kind,
                    line: step_line,
                }))
            };
            self.expect(TokenKind::RParen)?;
            let body = self.parse_body()?;
            return Ok(Statement {
                kind: StatementKind::For {
                    init,
                    condition,
                    step,
                    body,
                },
                line,
            });
        }
        let kind = self.parse_simple_statement()?;
        self.expect(TokenKind::Semicolon)?;
        Ok(Statement { kind, line })
    }

    /// Parse a declaration, assignment, increment or expression statement
    /// without consuming the trailing delimiter.
    fn parse_simple_statement(&mut self) -> Result<StatementKind, Error> {
        if self.is_type_start() {
            let base = self.parse_type_prefix()?;
            let (name, ty) = self.parse_declarator(base)?;
            let name = name.ok_or_else(|| {
                anyhow!(
                    "Expected a name in the declaration at line {}",
                    self.current_line()
                )
            })?;
            let init = if self.accept(&TokenKind::Assign) {
                Some(self.parse_expr()?)
            } else {
                None
            };
            return Ok(StatementKind::Decl { name, ty, init });
        }
        if self.accept(&TokenKind::PlusPlus) {
            let name = self.expect_ident()?;
            return Ok(increment_of(Expr::Ident(name), BinaryOp::Add));
        }
        if self.accept(&TokenKind::MinusMinus) {
            let name = self.expect_ident()?;
            return Ok(increment_of(Expr::Ident(name), BinaryOp::Sub));
        }
        let expr = self.parse_expr()?;
        if self.accept(&TokenKind::Assign) {
            let value = self.parse_expr()?;
            check_assignable(&expr, self.current_line())?;
            return Ok(StatementKind::Assign {
                target: expr,
                value,
            });
        }
        if self.accept(&TokenKind::PlusPlus) {
            check_assignable(&expr, self.current_line())?;
            return Ok(increment_of(expr, BinaryOp::Add));
        }
        if self.accept(&TokenKind::MinusMinus) {
            check_assignable(&expr, self.current_line())?;
            return Ok(increment_of(expr, BinaryOp::Sub));
        }
        Ok(StatementKind::Expr(expr))
    }

    fn parse_expr(&mut self) -> Result<Expr, Error> {
        self.parse_binary(0)
    }

    /// Precedence climbing over the binary operator tiers.
    fn parse_binary(&mut self, min_tier: usize) -> Result<Expr, Error> {
        const TIERS: &[&[(TokenKind, BinaryOp)]] = &[
            &[(TokenKind::LogicalOr, BinaryOp::Or)],
            &[(TokenKind::LogicalAnd, BinaryOp::And)],
            &[
                (TokenKind::EqualEqual, BinaryOp::Equal),
                (TokenKind::NotEqual, BinaryOp::NotEqual),
            ],
            &[
                (TokenKind::Less, BinaryOp::Less),
                (TokenKind::LessEqual, BinaryOp::LessEqual),
                (TokenKind::Greater, BinaryOp::Greater),
                (TokenKind::GreaterEqual, BinaryOp::GreaterEqual),
            ],
            &[
                (TokenKind::Plus, BinaryOp::Add),
                (TokenKind::Minus, BinaryOp::Sub),
            ],
            &[
                (TokenKind::Star, BinaryOp::Mul),
                (TokenKind::Slash, BinaryOp::Div),
                (TokenKind::Percent, BinaryOp::Rem),
            ],
        ];
        if min_tier == TIERS.len() {
            return self.parse_unary();
        }
        let mut lhs = self.parse_binary(min_tier + 1)?;
        'outer: loop {
            for (token, op) in TIERS[min_tier] {
                if self.accept(token) {
                    let rhs = self.parse_binary(min_tier + 1)?;
                    lhs = Expr::Binary {
                        op: *op,
                        lhs: Box::new(lhs),
                        rhs: Box::new(rhs),
                    };
                    continue 'outer;
                }
            }
            return Ok(lhs);
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, Error> {
        let op = if self.accept(&TokenKind::Bang) {
            Some(UnaryOp::Not)
        } else if self.accept(&TokenKind::Minus) {
            Some(UnaryOp::Negate)
        } else if self.accept(&TokenKind::Ampersand) {
            Some(UnaryOp::AddressOf)
        } else if self.accept(&TokenKind::Star) {
            Some(UnaryOp::Deref)
        } else {
            None
        };
        if let Some(op) = op {
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary {
                op,
                operand: Box::new(operand),
            });
        }
        if self.peek_is_word("sizeof") {
            self.position += 1;
            self.expect(TokenKind::LParen)?;
            let result = if self.is_type_start() {
                Expr::SizeofType(self.parse_type_name()?)
            } else {
                Expr::SizeofExpr(Box::new(self.parse_expr()?))
            };
            self.expect(TokenKind::RParen)?;
            return Ok(result);
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, Error> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.accept(&TokenKind::LParen) {
                let mut args = Vec::new();
                if self.peek() != Some(&TokenKind::RParen) {
                    loop {
                        args.push(self.parse_expr()?);
                        if !self.accept(&TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(TokenKind::RParen)?;
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args,
                };
            } else if self.accept(&TokenKind::Dot) {
                let field = self.expect_ident()?;
                expr = Expr::Member {
                    base: Box::new(expr),
                    field,
                    through_pointer: false,
                };
            } else if self.accept(&TokenKind::Arrow) {
                let field = self.expect_ident()?;
                expr = Expr::Member {
                    base: Box::new(expr),
                    field,
                    through_pointer: true,
                };
            } else if self.accept(&TokenKind::LBracket) {
                let index = self.parse_expr()?;
                self.expect(TokenKind::RBracket)?;
                expr = Expr::Index {
                    base: Box::new(expr),
                    index: Box::new(index),
                };
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, Error> {
        if self.peek() == Some(&TokenKind::LParen) {
            // A parenthesis introduces a cast exactly if a type name follows.
            if self.is_type_start_at(1) {
                self.expect(TokenKind::LParen)?;
                let ty = self.parse_type_name()?;
                self.expect(TokenKind::RParen)?;
                let expr = self.parse_unary()?;
                return Ok(Expr::Cast {
                    ty,
                    expr: Box::new(expr),
                });
            }
            self.expect(TokenKind::LParen)?;
            let expr = self.parse_expr()?;
            self.expect(TokenKind::RParen)?;
            return Ok(expr);
        }
        let token = self.advance()?;
        match token.kind {
            TokenKind::Number(value) => Ok(Expr::Number(value)),
            TokenKind::Str(content) => Ok(Expr::Str(content)),
            TokenKind::Ident(name) if name == "NULL" => Ok(Expr::Null),
            TokenKind::Ident(name) => Ok(Expr::Ident(name)),
            other => Err(anyhow!(
                "Expected an expression but found {:?} at line {}",
                other,
                token.line
            )),
        }
    }
}

/// The statement form of `target++` and `++target`.
fn increment_of(target: Expr, op: BinaryOp) -> StatementKind {
    StatementKind::Assign {
        target: target.clone(),
        value: Expr::Binary {
            op,
            lhs: Box::new(target),
            rhs: Box::new(Expr::Number(1)),
        },
    }
}

/// Check that an expression can stand on the left side of an assignment.
fn check_assignable(expr: &Expr, line: u64) -> Result<(), Error> {
    match expr {
        Expr::Ident(_) | Expr::Member { .. } | Expr::Index { .. } => Ok(()),
        Expr::Unary {
            op: UnaryOp::Deref, ..
        } => Ok(()),
        _ => Err(anyhow!("Invalid assignment target at line {line}")),
    }
}
