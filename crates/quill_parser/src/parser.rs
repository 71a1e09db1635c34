//! Recursive-descent grammar building `Ast` entities for one module

use quill_ast::*;
use quill_lexer::{SpannedToken, Token};

use crate::{ParseError, ParseErrorKind, ParseResult};

/// Module header: `module name.version;` followed by `using name.version;` lines
pub(crate) struct Header {
    pub name: Option<(String, Span)>,
    pub version: u64,
    pub imports: Vec<(String, u64, Span)>,
    /// Token position after the header
    pub end: usize,
}

enum AssignOp {
    Plain,
    Compound(BinOp),
}

pub(crate) struct Parser<'t, 'a> {
    tokens: &'t [SpannedToken],
    pos: usize,
    ast: &'a mut Ast,
    module: ModuleId,
    module_name: NameId,
    /// Class whose body is being parsed
    class: Option<ClassId>,
    loop_target: Option<ActionId>,
    return_target: Option<ActionId>,
    /// `while` conditions never start a lambda: `while (a) { … }`
    in_condition: bool,
    temp_counter: usize,
}

impl<'t, 'a> Parser<'t, 'a> {
    pub(crate) fn new(tokens: &'t [SpannedToken], pos: usize, ast: &'a mut Ast, module: ModuleId) -> Self {
        let module_name = ast.module(module).name;
        Self {
            tokens,
            pos,
            ast,
            module,
            module_name,
            class: None,
            loop_target: None,
            return_target: None,
            in_condition: false,
            temp_counter: 0,
        }
    }

    // === Token Access ===

    fn current(&self) -> &SpannedToken {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek(&self) -> &Token {
        &self.current().token
    }

    fn peek_at(&self, offset: usize) -> &Token {
        &self.tokens[(self.pos + offset).min(self.tokens.len() - 1)].token
    }

    fn peek_span(&self) -> Span {
        self.current().span
    }

    fn prev_span(&self) -> Span {
        match self.pos {
            0 => Span::default(),
            n => self.tokens[(n - 1).min(self.tokens.len() - 1)].span,
        }
    }

    fn advance(&mut self) -> SpannedToken {
        let tok = self.current().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn check(&self, token: &Token) -> bool {
        std::mem::discriminant(self.peek()) == std::mem::discriminant(token)
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.check(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token) -> ParseResult<Span> {
        if self.check(&expected) {
            Ok(self.advance().span)
        } else {
            self.error(&format!("'{}'", expected))
        }
    }

    fn expect_ident(&mut self) -> ParseResult<(String, Span)> {
        match self.peek().clone() {
            Token::Ident(name) => {
                let span = self.advance().span;
                Ok((name, span))
            }
            _ => self.error("identifier"),
        }
    }

    fn expect_version(&mut self) -> ParseResult<u64> {
        if !self.eat(&Token::Dot) {
            return Ok(0);
        }
        match *self.peek() {
            Token::IntLiteral(v) if v >= 0 => {
                self.advance();
                Ok(v as u64)
            }
            _ => self.error("version number"),
        }
    }

    fn loc(&self, span: Span) -> Location {
        Location::new(self.module, span)
    }

    fn error<T>(&self, expected: &str) -> ParseResult<T> {
        Err(ParseError::new(
            ParseErrorKind::Expected {
                expected: expected.to_string(),
                found: self.peek().to_string(),
            },
            self.loc(self.peek_span()),
        ))
    }

    fn error_at(&self, span: Span, kind: ParseErrorKind) -> ParseError {
        ParseError::new(kind, self.loc(span))
    }

    fn add(&mut self, kind: ActionKind, span: Span) -> ActionId {
        let loc = self.loc(span);
        self.ast.add_action(kind, loc)
    }

    /// Fill a node reserved earlier so that nested `break`s could target it
    fn finish(&mut self, id: ActionId, kind: ActionKind, start: Span) {
        let span = start.to(self.prev_span());
        let action = self.ast.action_mut(id);
        action.kind = kind;
        action.loc.span = span;
    }

    fn span_of(&self, id: ActionId) -> Span {
        self.ast.action(id).loc.span
    }

    fn binding_var(&mut self, span: Span) -> VarId {
        let name = self.ast.names.root("_");
        let loc = self.loc(span);
        self.ast.add_var(name, VarKind::Binding, None, loc)
    }

    /// Hidden local used by compound assignment desugaring
    fn temp_local(&mut self, init: ActionId) -> (VarId, NameId) {
        let name = self.ast.names.root(&format!("${}", self.temp_counter));
        self.temp_counter += 1;
        let loc = self.ast.action(init).loc;
        (self.ast.add_var(name, VarKind::Local, Some(init), loc), name)
    }

    // === Module structure ===

    pub(crate) fn parse_header(&mut self) -> ParseResult<Header> {
        let mut header = Header {
            name: None,
            version: 0,
            imports: Vec::new(),
            end: 0,
        };
        if self.eat(&Token::Module) {
            header.name = Some(self.expect_ident()?);
            header.version = self.expect_version()?;
            self.expect(Token::Semi)?;
        }
        while self.check(&Token::Using) {
            let start = self.advance().span;
            let (name, _) = self.expect_ident()?;
            let version = self.expect_version()?;
            self.expect(Token::Semi)?;
            header.imports.push((name, version, start.to(self.prev_span())));
        }
        header.end = self.pos;
        Ok(header)
    }

    /// Declarations plus top-level statements, which become the module entry function
    pub(crate) fn parse_module_body(&mut self) -> ParseResult<()> {
        let start = self.peek_span();
        let block = self.add(ActionKind::Block(Vec::new()), start);
        self.return_target = Some(block);
        let stmts = self.parse_statements(true)?;
        self.return_target = None;
        if stmts.is_empty() {
            return Ok(());
        }
        self.finish(block, ActionKind::Block(stmts), start);
        let name = self.ast.names.child(self.module_name, "main");
        let loc = self.ast.action(block).loc;
        let entry = self.ast.add_function(Function {
            name,
            module: self.module,
            params: Vec::new(),
            result: None,
            body: Some(block),
            is_platform: false,
            ty: TypeSlot::Empty,
            loc,
        });
        self.ast.modules[self.module.index()].entry = Some(entry);
        Ok(())
    }

    fn parse_class(&mut self) -> ParseResult<()> {
        let is_interface = matches!(self.advance().token, Token::Interface);
        let (name, name_span) = self.expect_ident()?;
        let qualified = self.ast.names.child(self.module_name, &name);
        let loc = self.loc(name_span);
        let class = self.ast.add_class(ClassDef::new(qualified, self.module, is_interface, loc));
        self.ast.modules[self.module.index()].classes.push(class);

        if self.eat(&Token::LParen) {
            while !self.check(&Token::RParen) {
                let (param_name, span) = self.expect_ident()?;
                let bound_ref = if self.eat(&Token::Colon) {
                    Some(self.parse_class_ref()?)
                } else {
                    None
                };
                let index = self.ast.class(class).params.len();
                let name = self.ast.names.root(&param_name);
                let loc = self.loc(span);
                let param = self.ast.add_param(ClassParamDef {
                    name,
                    class,
                    index,
                    bound_ref,
                    bound: None,
                    loc,
                });
                self.ast.class_mut(class).params.push(param);
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
            self.expect(Token::RParen)?;
        }

        let saved = self.class.replace(class);
        self.expect(Token::LBrace)?;
        loop {
            match self.peek() {
                Token::RBrace => break,
                Token::Semi => {
                    self.advance();
                }
                Token::Plus => self.parse_base(class)?,
                _ => self.parse_member(class)?,
            }
        }
        self.expect(Token::RBrace)?;
        self.class = saved;
        Ok(())
    }

    fn parse_base(&mut self, class: ClassId) -> ParseResult<()> {
        self.advance();
        let reference = self.parse_class_ref()?;
        let index = self.ast.class(class).bases.len();
        self.ast.class_mut(class).bases.push(BaseDecl {
            reference,
            instance: None,
            overloads: Vec::new(),
        });
        if self.eat(&Token::LBrace) {
            while !self.check(&Token::RBrace) {
                if self.eat(&Token::Semi) {
                    continue;
                }
                let (name, span) = self.expect_ident()?;
                let method = self.parse_method(class, name, span, Some(index))?;
                self.ast.class_mut(class).bases[index].overloads.push(method);
            }
            self.expect(Token::RBrace)?;
        }
        Ok(())
    }

    fn parse_member(&mut self, class: ClassId) -> ParseResult<()> {
        let (name, span) = self.expect_ident()?;
        if self.eat(&Token::Eq) {
            let init = self.parse_expression()?;
            self.end_statement()?;
            let name = self.ast.names.root(&name);
            let loc = self.loc(span);
            let field = self.ast.add_var(name, VarKind::Field(class), Some(init), loc);
            self.ast.class_mut(class).fields.push(field);
        } else {
            let method = self.parse_method(class, name, span, None)?;
            self.ast.class_mut(class).methods.push(method);
        }
        Ok(())
    }

    fn parse_method(
        &mut self,
        class: ClassId,
        name: String,
        span: Span,
        base: Option<usize>,
    ) -> ParseResult<MethodId> {
        let params = self.parse_params()?;
        let result = self.parse_result_type()?;
        let body = if self.check(&Token::LBrace) {
            Some(self.parse_body()?)
        } else if self.ast.class(class).is_interface && base.is_none() {
            self.end_statement()?;
            None
        } else {
            return Err(self.error_at(span, ParseErrorKind::MissingBody { name }));
        };
        let name = self.ast.names.root(&name);
        let loc = self.loc(span);
        Ok(self.ast.add_method(Method {
            name,
            class,
            params,
            result,
            body,
            base,
            overrides: None,
            ty: TypeSlot::Empty,
            loc,
        }))
    }

    fn parse_function(&mut self) -> ParseResult<()> {
        self.advance();
        let (name, span) = self.expect_ident()?;
        let name = self.ast.names.child(self.module_name, &name);
        let params = self.parse_params()?;
        let result = self.parse_result_type()?;
        let body = if self.check(&Token::LBrace) {
            Some(self.parse_body()?)
        } else {
            self.end_statement()?;
            None
        };
        let loc = self.loc(span);
        let function = self.ast.add_function(Function {
            name,
            module: self.module,
            params,
            result,
            body,
            is_platform: body.is_none(),
            ty: TypeSlot::Empty,
            loc,
        });
        self.ast.modules[self.module.index()].functions.push(function);
        Ok(())
    }

    fn parse_params(&mut self) -> ParseResult<Vec<VarId>> {
        self.expect(Token::LParen)?;
        let mut params = Vec::new();
        while !self.check(&Token::RParen) {
            let start = self.peek_span();
            let declared = self.parse_type()?;
            let (name, _) = self.expect_ident()?;
            let name = self.ast.names.root(&name);
            let loc = self.loc(start);
            params.push(self.ast.add_var(name, VarKind::Param, Some(declared), loc));
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(Token::RParen)?;
        Ok(params)
    }

    fn parse_result_type(&mut self) -> ParseResult<Option<ActionId>> {
        if matches!(self.peek(), Token::LBrace | Token::Semi | Token::RBrace) {
            Ok(None)
        } else {
            self.parse_type().map(Some)
        }
    }

    /// Body of a method, function or lambda; `return` leaves it
    fn parse_body(&mut self) -> ParseResult<ActionId> {
        let start = self.peek_span();
        let body = self.add(ActionKind::Block(Vec::new()), start);
        let saved_return = self.return_target.replace(body);
        let saved_loop = self.loop_target.take();
        self.expect(Token::LBrace)?;
        let stmts = self.parse_statements(false)?;
        self.expect(Token::RBrace)?;
        self.return_target = saved_return;
        self.loop_target = saved_loop;
        self.finish(body, ActionKind::Block(stmts), start);
        Ok(body)
    }

    // === Statements ===

    /// Statements up to `}` (or end of input at top level). `name = expr`
    /// opens a `Local` whose body is the rest of the sequence.
    fn parse_statements(&mut self, top_level: bool) -> ParseResult<Vec<ActionId>> {
        let mut stmts = Vec::new();
        loop {
            match self.peek() {
                Token::Eof if top_level => break,
                Token::RBrace if !top_level => break,
                Token::Eof | Token::RBrace => {
                    return self.error(if top_level { "declaration or statement" } else { "'}'" });
                }
                Token::Semi => {
                    self.advance();
                    continue;
                }
                Token::Class | Token::Interface if top_level => {
                    self.parse_class()?;
                    continue;
                }
                Token::Fn if top_level && matches!(self.peek_at(1), Token::Ident(_)) => {
                    self.parse_function()?;
                    continue;
                }
                _ => {}
            }

            if let (Token::Ident(name), Token::Eq) = (self.peek(), self.peek_at(1)) {
                let name = name.clone();
                let start = self.advance().span;
                self.advance();
                let init = self.parse_expression()?;
                self.end_statement()?;
                let name = self.ast.names.root(&name);
                let loc = self.loc(start);
                let var = self.ast.add_var(name, VarKind::Local, Some(init), loc);
                let body = self.parse_statements(top_level)?;
                let span = start.to(self.prev_span());
                stmts.push(self.add(ActionKind::Local { var, body }, span));
                break;
            }

            stmts.push(self.parse_expression()?);
            self.end_statement()?;
        }
        Ok(stmts)
    }

    fn end_statement(&mut self) -> ParseResult<()> {
        let after_block = self.pos > 0
            && matches!(self.tokens.get(self.pos - 1).map(|t| &t.token), Some(Token::RBrace));
        if self.eat(&Token::Semi) || matches!(self.peek(), Token::RBrace | Token::Eof) || after_block {
            Ok(())
        } else {
            self.error("';'")
        }
    }

    // === Expressions ===

    pub(crate) fn parse_expression(&mut self) -> ParseResult<ActionId> {
        self.parse_else()
    }

    fn parse_else(&mut self) -> ParseResult<ActionId> {
        let lhs = self.parse_if()?;
        if self.eat(&Token::Colon) {
            let rhs = self.parse_else()?;
            let span = self.span_of(lhs).to(self.span_of(rhs));
            return Ok(self.add(ActionKind::Else { lhs, rhs }, span));
        }
        Ok(lhs)
    }

    fn parse_if(&mut self) -> ParseResult<ActionId> {
        let cond = self.parse_or()?;
        if self.eat(&Token::Question) {
            let binding = self.binding_var(self.span_of(cond));
            let then = self.parse_if()?;
            let span = self.span_of(cond).to(self.span_of(then));
            return Ok(self.add(ActionKind::If { cond, then, binding }, span));
        }
        Ok(cond)
    }

    fn binary(&mut self, op: BinOp, lhs: ActionId, rhs: ActionId) -> ActionId {
        let span = self.span_of(lhs).to(self.span_of(rhs));
        self.add(ActionKind::Binary { op, lhs, rhs }, span)
    }

    fn not(&mut self, operand: ActionId) -> ActionId {
        let span = self.span_of(operand);
        self.add(ActionKind::Unary { op: UnaryOp::Not, operand }, span)
    }

    fn parse_or(&mut self) -> ParseResult<ActionId> {
        let mut lhs = self.parse_and()?;
        while self.eat(&Token::OrOr) {
            let rhs = self.parse_and()?;
            lhs = self.binary(BinOp::LogOr, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> ParseResult<ActionId> {
        let mut lhs = self.parse_comparison()?;
        while self.eat(&Token::AndAnd) {
            let rhs = self.parse_comparison()?;
            lhs = self.binary(BinOp::LogAnd, lhs, rhs);
        }
        Ok(lhs)
    }

    /// `!=`, `>`, `<=` and `>=` are rewritten through `==`, `<` and `!`
    fn parse_comparison(&mut self) -> ParseResult<ActionId> {
        let lhs = self.parse_additive()?;
        let op = self.peek().clone();
        if !matches!(op, Token::EqEq | Token::NotEq | Token::Lt | Token::Gt | Token::LtEq | Token::GtEq) {
            return Ok(lhs);
        }
        self.advance();
        let rhs = self.parse_additive()?;
        Ok(match op {
            Token::EqEq => self.binary(BinOp::Eq, lhs, rhs),
            Token::NotEq => {
                let eq = self.binary(BinOp::Eq, lhs, rhs);
                self.not(eq)
            }
            Token::Lt => self.binary(BinOp::Lt, lhs, rhs),
            Token::Gt => self.binary(BinOp::Lt, rhs, lhs),
            Token::LtEq => {
                let gt = self.binary(BinOp::Lt, rhs, lhs);
                self.not(gt)
            }
            _ => {
                let lt = self.binary(BinOp::Lt, lhs, rhs);
                self.not(lt)
            }
        })
    }

    fn parse_additive(&mut self) -> ParseResult<ActionId> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                Token::Pipe => BinOp::Or,
                Token::Caret => BinOp::Xor,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_multiplicative()?;
            lhs = self.binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> ParseResult<ActionId> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                Token::Percent => BinOp::Mod,
                Token::Amp => BinOp::And,
                Token::Shl => BinOp::Shl,
                Token::Shr => BinOp::Shr,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = self.binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> ParseResult<ActionId> {
        let start = self.peek_span();
        let wrap: fn(ActionId) -> ActionKind = match self.peek() {
            Token::Minus => |operand| ActionKind::Unary { op: UnaryOp::Neg, operand },
            Token::Not => |operand| ActionKind::Unary { op: UnaryOp::Not, operand },
            Token::Plus => ActionKind::Just,
            Token::Amp => ActionKind::ToWeak,
            Token::Star => ActionKind::ToOwn,
            Token::At => ActionKind::CopyOf,
            Token::Question => {
                self.advance();
                let ty = self.parse_type()?;
                return Ok(self.add(ActionKind::NoneOf(ty), start.to(self.prev_span())));
            }
            Token::Tilde => {
                self.advance();
                let operand = self.parse_unary()?;
                let mask = self.add(ActionKind::ConstInt64(-1), start);
                return Ok(self.binary(BinOp::Xor, operand, mask));
            }
            _ => return self.parse_postfix(),
        };
        self.advance();
        let operand = self.parse_unary()?;
        Ok(self.add(wrap(operand), start.to(self.prev_span())))
    }

    fn assign_op(&mut self) -> Option<AssignOp> {
        let op = match self.peek() {
            Token::ColonEq => AssignOp::Plain,
            Token::PlusEq => AssignOp::Compound(BinOp::Add),
            Token::MinusEq => AssignOp::Compound(BinOp::Sub),
            Token::StarEq => AssignOp::Compound(BinOp::Mul),
            Token::SlashEq => AssignOp::Compound(BinOp::Div),
            Token::PercentEq => AssignOp::Compound(BinOp::Mod),
            Token::AmpEq => AssignOp::Compound(BinOp::And),
            Token::PipeEq => AssignOp::Compound(BinOp::Or),
            Token::CaretEq => AssignOp::Compound(BinOp::Xor),
            Token::ShlEq => AssignOp::Compound(BinOp::Shl),
            Token::ShrEq => AssignOp::Compound(BinOp::Shr),
            _ => return None,
        };
        self.advance();
        Some(op)
    }

    fn parse_postfix(&mut self) -> ParseResult<ActionId> {
        let start = self.peek_span();
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek() {
                Token::LParen => {
                    let args = self.parse_args()?;
                    let span = start.to(self.prev_span());
                    expr = self.add(ActionKind::Call { callee: expr, args }, span);
                }
                Token::Dot => {
                    self.advance();
                    let (field, _) = self.expect_ident()?;
                    let name = self.ast.names.root(&field);
                    if let Some(op) = self.assign_op() {
                        return self.finish_field_assign(start, expr, name, op);
                    }
                    let span = start.to(self.prev_span());
                    expr = self.add(ActionKind::GetField { base: Some(expr), name, field: None }, span);
                }
                Token::LBracket => {
                    self.advance();
                    let index = self.parse_expression()?;
                    self.expect(Token::RBracket)?;
                    if let Some(op) = self.assign_op() {
                        return self.finish_index_assign(start, expr, index, op);
                    }
                    let span = start.to(self.prev_span());
                    expr = self.add(ActionKind::GetAt { array: expr, index }, span);
                }
                Token::Tilde => {
                    self.advance();
                    let target = self.parse_class_ref()?;
                    let span = start.to(self.prev_span());
                    expr = self.add(ActionKind::Cast { operand: expr, target, checked: false }, span);
                }
                _ => break,
            }
        }
        match self.assign_op() {
            Some(op) => self.finish_name_assign(start, expr, op),
            None => Ok(expr),
        }
    }

    fn parse_args(&mut self) -> ParseResult<Vec<ActionId>> {
        self.expect(Token::LParen)?;
        let mut args = Vec::new();
        while !self.check(&Token::RParen) {
            args.push(self.parse_expression()?);
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(Token::RParen)?;
        Ok(args)
    }

    fn assigned_value(&mut self, op: AssignOp, current: impl FnOnce(&mut Self) -> ActionId) -> ParseResult<ActionId> {
        let rhs = self.parse_expression()?;
        Ok(match op {
            AssignOp::Plain => rhs,
            AssignOp::Compound(bin) => {
                let read = current(self);
                self.binary(bin, read, rhs)
            }
        })
    }

    fn finish_name_assign(&mut self, start: Span, target: ActionId, op: AssignOp) -> ParseResult<ActionId> {
        let ActionKind::Name(name) = self.ast.action(target).kind else {
            return Err(self.error_at(self.span_of(target), ParseErrorKind::InvalidAssignment));
        };
        let span = self.span_of(target);
        let value = self.assigned_value(op, |p| p.add(ActionKind::Name(name), span))?;
        Ok(self.add(ActionKind::SetName { name, value }, start.to(self.prev_span())))
    }

    fn finish_field_assign(&mut self, start: Span, base: ActionId, name: NameId, op: AssignOp) -> ParseResult<ActionId> {
        if let AssignOp::Plain = op {
            let value = self.parse_expression()?;
            let span = start.to(self.prev_span());
            return Ok(self.add(ActionKind::SetField { base: Some(base), name, field: None, value }, span));
        }
        // o.f op= v  ->  { $t = o; $t.f := $t.f op v }
        let (temp, temp_name) = self.temp_local(base);
        let span = self.span_of(base);
        let value = self.assigned_value(op, |p| {
            let object = p.add(ActionKind::Name(temp_name), span);
            p.add(ActionKind::GetField { base: Some(object), name, field: None }, span)
        })?;
        let object = self.add(ActionKind::Name(temp_name), span);
        let full = start.to(self.prev_span());
        let set = self.add(ActionKind::SetField { base: Some(object), name, field: None, value }, full);
        Ok(self.add(ActionKind::Local { var: temp, body: vec![set] }, full))
    }

    fn finish_index_assign(&mut self, start: Span, array: ActionId, index: ActionId, op: AssignOp) -> ParseResult<ActionId> {
        if let AssignOp::Plain = op {
            let value = self.parse_expression()?;
            let span = start.to(self.prev_span());
            return Ok(self.add(ActionKind::SetAt { array, index, value }, span));
        }
        let (array_temp, array_name) = self.temp_local(array);
        let (index_temp, index_name) = self.temp_local(index);
        let span = self.span_of(array);
        let value = self.assigned_value(op, |p| {
            let a = p.add(ActionKind::Name(array_name), span);
            let i = p.add(ActionKind::Name(index_name), span);
            p.add(ActionKind::GetAt { array: a, index: i }, span)
        })?;
        let a = self.add(ActionKind::Name(array_name), span);
        let i = self.add(ActionKind::Name(index_name), span);
        let full = start.to(self.prev_span());
        let set = self.add(ActionKind::SetAt { array: a, index: i, value }, full);
        let inner = self.add(ActionKind::Local { var: index_temp, body: vec![set] }, full);
        Ok(self.add(ActionKind::Local { var: array_temp, body: vec![inner] }, full))
    }

    fn parse_qualified_name(&mut self) -> ParseResult<NameId> {
        let (first, _) = self.expect_ident()?;
        let mut name = self.ast.names.root(&first);
        while self.check(&Token::ColonColon) && matches!(self.peek_at(1), Token::Ident(_)) {
            self.advance();
            let (segment, _) = self.expect_ident()?;
            name = self.ast.names.child(name, &segment);
        }
        Ok(name)
    }

    fn parse_primary(&mut self) -> ParseResult<ActionId> {
        let start = self.peek_span();
        let kind = match self.peek().clone() {
            Token::IntLiteral(v) => ActionKind::ConstInt64(v),
            Token::FloatLiteral(v) => ActionKind::ConstDouble(v),
            Token::True => ActionKind::ConstBool(true),
            Token::False => ActionKind::ConstBool(false),
            Token::This => ActionKind::GetThis,
            Token::Dot => {
                self.advance();
                let (atom, _) = self.expect_ident()?;
                let atom = self.ast.names.root(&atom);
                return Ok(self.add(ActionKind::ConstAtom(atom), start.to(self.prev_span())));
            }
            Token::Ident(_) => {
                let name = self.parse_qualified_name()?;
                return Ok(self.add(ActionKind::Name(name), start.to(self.prev_span())));
            }
            Token::Int | Token::Double if matches!(self.peek_at(1), Token::LParen) => {
                let op = if self.check(&Token::Int) { UnaryOp::ToInt } else { UnaryOp::ToFloat };
                self.advance();
                self.expect(Token::LParen)?;
                let operand = self.parse_expression()?;
                self.expect(Token::RParen)?;
                return Ok(self.add(ActionKind::Unary { op, operand }, start.to(self.prev_span())));
            }
            Token::Int | Token::Double | Token::Bool | Token::Fn => return self.parse_type(),
            Token::LParen if self.is_lambda_ahead() => return self.parse_lambda(),
            Token::LParen => {
                self.advance();
                let inner = self.parse_expression()?;
                self.expect(Token::RParen)?;
                return Ok(inner);
            }
            Token::LBrace => {
                self.advance();
                let stmts = self.parse_statements(false)?;
                self.expect(Token::RBrace)?;
                return Ok(self.add(ActionKind::Block(stmts), start.to(self.prev_span())));
            }
            Token::LBracket => {
                self.advance();
                let mut items = vec![self.parse_expression()?];
                while self.eat(&Token::Comma) {
                    items.push(self.parse_expression()?);
                }
                self.expect(Token::RBracket)?;
                return Ok(self.add(ActionKind::MakeArray(items), start.to(self.prev_span())));
            }
            Token::Loop => return self.parse_loop(),
            Token::While => return self.parse_while(),
            Token::Break => return self.parse_break(false),
            Token::Return => return self.parse_break(true),
            _ => return self.error("expression"),
        };
        self.advance();
        Ok(self.add(kind, start))
    }

    fn parse_loop(&mut self) -> ParseResult<ActionId> {
        let start = self.advance().span;
        let id = self.add(ActionKind::Loop(Vec::new()), start);
        let saved = self.loop_target.replace(id);
        self.expect(Token::LBrace)?;
        let stmts = self.parse_statements(false)?;
        self.expect(Token::RBrace)?;
        self.loop_target = saved;
        self.finish(id, ActionKind::Loop(stmts), start);
        Ok(id)
    }

    /// `while c { body }`  ->  `loop { c ? { body } : break }`
    fn parse_while(&mut self) -> ParseResult<ActionId> {
        let start = self.advance().span;
        let id = self.add(ActionKind::Loop(Vec::new()), start);
        let in_condition = std::mem::replace(&mut self.in_condition, true);
        let cond = self.parse_expression()?;
        self.in_condition = in_condition;
        let saved = self.loop_target.replace(id);
        let body_start = self.expect(Token::LBrace)?;
        let stmts = self.parse_statements(false)?;
        self.expect(Token::RBrace)?;
        self.loop_target = saved;
        let body_span = body_start.to(self.prev_span());
        let body = self.add(ActionKind::Block(stmts), body_span);
        let binding = self.binding_var(self.span_of(cond));
        let span = start.to(self.prev_span());
        let guarded = self.add(ActionKind::If { cond, then: body, binding }, span);
        let exit = self.add(ActionKind::Break { target: id, result: None }, span);
        let step = self.add(ActionKind::Else { lhs: guarded, rhs: exit }, span);
        self.finish(id, ActionKind::Loop(vec![step]), start);
        Ok(id)
    }

    fn parse_break(&mut self, is_return: bool) -> ParseResult<ActionId> {
        let start = self.advance().span;
        let target = if is_return { self.return_target } else { self.loop_target };
        let Some(target) = target else {
            let kind = if is_return {
                ParseErrorKind::ReturnOutsideBody
            } else {
                ParseErrorKind::BreakOutsideLoop
            };
            return Err(self.error_at(start, kind));
        };
        let ends = matches!(
            self.peek(),
            Token::Semi | Token::RBrace | Token::RParen | Token::Comma | Token::Colon | Token::Eof
        );
        let result = if ends { None } else { Some(self.parse_expression()?) };
        Ok(self.add(ActionKind::Break { target, result }, start.to(self.prev_span())))
    }

    fn is_lambda_ahead(&self) -> bool {
        if self.in_condition {
            return false;
        }
        let mut depth = 0usize;
        for (i, tok) in self.tokens.iter().enumerate().skip(self.pos) {
            match tok.token {
                Token::LParen => depth += 1,
                Token::RParen => {
                    depth -= 1;
                    if depth == 0 {
                        return matches!(self.tokens.get(i + 1).map(|t| &t.token), Some(Token::LBrace));
                    }
                }
                Token::Eof => return false,
                _ => {}
            }
        }
        false
    }

    /// `(a, b){ … }` or `(int a){ … }`
    fn parse_lambda(&mut self) -> ParseResult<ActionId> {
        let start = self.expect(Token::LParen)?;
        let mut params = Vec::new();
        while !self.check(&Token::RParen) {
            let param_start = self.peek_span();
            let bare = matches!(self.peek(), Token::Ident(_))
                && matches!(self.peek_at(1), Token::Comma | Token::RParen);
            let declared = if bare { None } else { Some(self.parse_type()?) };
            let (name, _) = self.expect_ident()?;
            let name = self.ast.names.root(&name);
            let loc = self.loc(param_start);
            params.push(self.ast.add_var(name, VarKind::Param, declared, loc));
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(Token::RParen)?;
        let body = self.parse_body()?;
        let lambda = self.ast.add_lambda(LambdaDef {
            params,
            body,
            class: self.class,
            cold: None,
        });
        Ok(self.add(ActionKind::Lambda(lambda), start.to(self.prev_span())))
    }

    // === Type expressions ===

    pub(crate) fn parse_type(&mut self) -> ParseResult<ActionId> {
        let start = self.peek_span();
        let kind = match self.peek() {
            Token::Int => {
                self.advance();
                ActionKind::ConstInt64(0)
            }
            Token::Double => {
                self.advance();
                ActionKind::ConstDouble(0.0)
            }
            Token::Bool => {
                self.advance();
                ActionKind::ConstBool(false)
            }
            Token::Amp => {
                self.advance();
                ActionKind::ToWeak(self.parse_type()?)
            }
            Token::Question => {
                self.advance();
                ActionKind::NoneOf(self.parse_type()?)
            }
            Token::LBracket => {
                self.advance();
                let element = self.parse_type()?;
                self.expect(Token::RBracket)?;
                ActionKind::ArrayOf(element)
            }
            Token::Fn => return self.parse_lambda_sig(),
            Token::Ident(_) => return self.parse_class_ref(),
            _ => return self.error("type"),
        };
        Ok(self.add(kind, start.to(self.prev_span())))
    }

    fn parse_lambda_sig(&mut self) -> ParseResult<ActionId> {
        let start = self.advance().span;
        self.expect(Token::LParen)?;
        let mut params = Vec::new();
        while !self.check(&Token::RParen) {
            params.push(self.parse_type()?);
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(Token::RParen)?;
        let has_result = match self.peek() {
            Token::Int | Token::Double | Token::Bool | Token::Amp | Token::Question | Token::LBracket
            | Token::Fn => true,
            // a following parameter name is not a result type
            Token::Ident(_) => !matches!(self.peek_at(1), Token::Comma | Token::RParen | Token::Semi | Token::Eq),
            _ => false,
        };
        let result = if has_result { Some(self.parse_type()?) } else { None };
        Ok(self.add(ActionKind::LambdaSig { params, result }, start.to(self.prev_span())))
    }

    /// `Name`, `module::Name` or `Name(Param, …)`
    fn parse_class_ref(&mut self) -> ParseResult<ActionId> {
        let start = self.peek_span();
        let name = self.parse_qualified_name()?;
        let mut params = Vec::new();
        if self.eat(&Token::LParen) {
            while !self.check(&Token::RParen) {
                params.push(self.parse_type()?);
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
            self.expect(Token::RParen)?;
        }
        let kind = ActionKind::MakeInstance {
            name,
            target: None,
            params,
            instance: None,
        };
        Ok(self.add(kind, start.to(self.prev_span())))
    }
}
