//! Expression AST, recursive-descent parser, and evaluator.
//!
//! Operator precedence (lowest → highest):
//!   conditional  →  or  →  and  →  not  →  comparison  →
//!   additive  →  multiplicative  →  unary  →  power  →  postfix  →  primary
//!
//! The [`Parser`] defined here is shared with the statement grammar in
//! [`stmt`](super::stmt), which adds its own `impl Parser` block.

use super::builtins;
use super::fault::{Fault, FaultKind, Unwind};
use super::lexer::{Spanned, Token};
use super::value::Value;

/// Deepest sub-expression nesting the parser accepts.
pub const MAX_NESTING: usize = 200;

// ── EvalContext ───────────────────────────────────────────────────────────────

/// Dependency-injection interface used by the expression evaluator.
///
/// The interpreter's machine implements this trait to give the evaluator
/// access to variable scopes and to function invocation.
pub trait EvalContext {
    /// Resolve a name (local scope, then globals, then built-ins).
    fn load(&self, name: &str) -> Result<Value, Fault>;

    /// Bind a name in the current scope.
    fn store(&mut self, name: &str, value: Value);

    /// Invoke a callable value.
    fn call(
        &mut self,
        callee: Value,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> Result<Value, Unwind>;
}

// ── AST ───────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnaryOp {
    Neg,
    Pos,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    Is,
    IsNot,
}

impl CmpOp {
    fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
            CmpOp::In => "in",
            CmpOp::NotIn => "not in",
            CmpOp::Is => "is",
            CmpOp::IsNot => "is not",
        }
    }
}

#[derive(Debug, Clone)]
pub enum Expr {
    Literal(Value),
    Name(String),
    List(Vec<Expr>),
    Index(Box<Expr>, Box<Expr>),
    Slice {
        obj: Box<Expr>,
        start: Option<Box<Expr>>,
        stop: Option<Box<Expr>>,
        step: Option<Box<Expr>>,
    },
    Attribute(Box<Expr>, String),
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
        kwargs: Vec<(String, Expr)>,
    },
    MethodCall {
        obj: Box<Expr>,
        method: String,
        args: Vec<Expr>,
        kwargs: Vec<(String, Expr)>,
    },
    Unary(UnaryOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Compare(Box<Expr>, Vec<(CmpOp, Expr)>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    /// `then if cond else otherwise`
    IfElse {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
}

impl Expr {
    /// Whether this expression may appear on the left of `=`.
    pub fn is_assignable(&self) -> bool {
        match self {
            Expr::Name(_) => true,
            Expr::Index(obj, _) => obj.is_assignable(),
            _ => false,
        }
    }
}

// ── Parser ────────────────────────────────────────────────────────────────────

pub struct Parser<'a> {
    tokens: Vec<Spanned>,
    pos: usize,
    src: &'a str,
    /// Enclosing `while`/`for` bodies; `break`/`continue` need one.
    pub(super) loop_depth: usize,
    /// Enclosing `def` bodies; `return` needs one.
    pub(super) fn_depth: usize,
    /// Open sub-expressions (brackets, unary operators).
    nesting: usize,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: Vec<Spanned>, src: &'a str) -> Self {
        Parser {
            tokens,
            pos: 0,
            src,
            loop_depth: 0,
            fn_depth: 0,
            nesting: 0,
        }
    }

    pub(super) fn peek(&self) -> &Token {
        self.tokens.get(self.pos).map(|s| &s.tok).unwrap_or(&Token::Eof)
    }

    pub(super) fn peek_at(&self, offset: usize) -> &Token {
        self.tokens
            .get(self.pos + offset)
            .map(|s| &s.tok)
            .unwrap_or(&Token::Eof)
    }

    /// Line of the next token.
    pub(super) fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map_or(1, |s| s.line)
    }

    pub(super) fn advance(&mut self) -> Token {
        let t = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    pub(super) fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == expected {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    pub(super) fn expect(&mut self, expected: &Token, what: &str) -> Result<(), Fault> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(self.error(format!("expected {what}")))
        }
    }

    /// `SyntaxError` at the current line.
    pub(super) fn error(&self, msg: impl Into<String>) -> Fault {
        self.error_at(FaultKind::SyntaxError, msg, self.line())
    }

    pub(super) fn error_at(&self, kind: FaultKind, msg: impl Into<String>, line: usize) -> Fault {
        Fault::syntax(kind, msg, line, self.src)
    }

    /// Generic "invalid syntax" for an unexpected token.
    pub(super) fn unexpected(&self) -> Fault {
        match self.peek() {
            Token::Indent => self.error_at(FaultKind::IndentationError, "unexpected indent", self.line()),
            _ => self.error("invalid syntax"),
        }
    }

    /// Run `f` one nesting level deeper, refusing past [`MAX_NESTING`].
    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T, Fault>) -> Result<T, Fault> {
        if self.nesting >= MAX_NESTING {
            return Err(self.error("too many nested parentheses"));
        }
        self.nesting += 1;
        let result = f(self);
        self.nesting -= 1;
        result
    }

    // ── Grammar ───────────────────────────────────────────────────────────────

    pub fn parse_expr(&mut self) -> Result<Expr, Fault> {
        self.nested(Self::parse_conditional)
    }

    fn parse_conditional(&mut self) -> Result<Expr, Fault> {
        let then = self.parse_or()?;
        if self.eat(&Token::If) {
            let cond = self.parse_or()?;
            self.expect(&Token::Else, "'else' after conditional expression")?;
            let otherwise = self.parse_expr()?;
            return Ok(Expr::IfElse {
                cond: Box::new(cond),
                then: Box::new(then),
                otherwise: Box::new(otherwise),
            });
        }
        Ok(then)
    }

    fn parse_or(&mut self) -> Result<Expr, Fault> {
        let mut lhs = self.parse_and()?;
        while self.eat(&Token::Or) {
            let rhs = self.parse_and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, Fault> {
        let mut lhs = self.parse_not()?;
        while self.eat(&Token::And) {
            let rhs = self.parse_not()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<Expr, Fault> {
        if self.eat(&Token::Not) {
            let inner = self.nested(Self::parse_not)?;
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, Fault> {
        let first = self.parse_additive()?;
        let mut rest = Vec::new();
        loop {
            let op = match self.peek() {
                Token::Eq => CmpOp::Eq,
                Token::Ne => CmpOp::Ne,
                Token::Lt => CmpOp::Lt,
                Token::Le => CmpOp::Le,
                Token::Gt => CmpOp::Gt,
                Token::Ge => CmpOp::Ge,
                Token::In => CmpOp::In,
                Token::Not if self.peek_at(1) == &Token::In => {
                    self.pos += 1;
                    CmpOp::NotIn
                }
                Token::Is if self.peek_at(1) == &Token::Not => {
                    self.pos += 1;
                    CmpOp::IsNot
                }
                Token::Is => CmpOp::Is,
                _ => break,
            };
            self.pos += 1;
            rest.push((op, self.parse_additive()?));
        }
        if rest.is_empty() {
            Ok(first)
        } else {
            Ok(Expr::Compare(Box::new(first), rest))
        }
    }

    fn parse_additive(&mut self) -> Result<Expr, Fault> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, Fault> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                Token::DoubleSlash => BinOp::FloorDiv,
                Token::Percent => BinOp::Mod,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, Fault> {
        let op = match self.peek() {
            Token::Minus => UnaryOp::Neg,
            Token::Plus => UnaryOp::Pos,
            _ => return self.parse_power(),
        };
        self.pos += 1;
        Ok(Expr::Unary(op, Box::new(self.nested(Self::parse_unary)?)))
    }

    fn parse_power(&mut self) -> Result<Expr, Fault> {
        let base = self.parse_postfix()?;
        if self.eat(&Token::DoubleStar) {
            // Right-associative, and binds tighter than a unary minus on its left.
            let exp = self.nested(Self::parse_unary)?;
            return Ok(Expr::Binary(BinOp::Pow, Box::new(base), Box::new(exp)));
        }
        Ok(base)
    }

    fn parse_postfix(&mut self) -> Result<Expr, Fault> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek() {
                Token::LParen => {
                    self.pos += 1;
                    let (args, kwargs) = self.parse_call_args()?;
                    expr = Expr::Call {
                        func: Box::new(expr),
                        args,
                        kwargs,
                    };
                }
                Token::LBracket => {
                    self.pos += 1;
                    expr = self.parse_subscript(expr)?;
                }
                Token::Dot => {
                    self.pos += 1;
                    let Token::Name(name) = self.advance() else {
                        return Err(self.error("invalid syntax"));
                    };
                    if self.eat(&Token::LParen) {
                        let (args, kwargs) = self.parse_call_args()?;
                        expr = Expr::MethodCall {
                            obj: Box::new(expr),
                            method: name,
                            args,
                            kwargs,
                        };
                    } else {
                        expr = Expr::Attribute(Box::new(expr), name);
                    }
                }
                _ => return Ok(expr),
            }
        }
    }

    /// Arguments after `(`, through the closing `)`.
    fn parse_call_args(&mut self) -> Result<(Vec<Expr>, Vec<(String, Expr)>), Fault> {
        let mut args = Vec::new();
        let mut kwargs: Vec<(String, Expr)> = Vec::new();
        while self.peek() != &Token::RParen {
            let keyword = match (self.peek(), self.peek_at(1)) {
                (Token::Name(name), Token::Assign) => Some(name.clone()),
                _ => None,
            };
            if let Some(name) = keyword {
                self.pos += 2;
                if kwargs.iter().any(|(k, _)| *k == name) {
                    return Err(self.error(format!("keyword argument repeated: {name}")));
                }
                kwargs.push((name, self.parse_expr()?));
            } else {
                if !kwargs.is_empty() {
                    return Err(self.error("positional argument follows keyword argument"));
                }
                args.push(self.parse_expr()?);
            }
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(&Token::RParen, "')'")?;
        Ok((args, kwargs))
    }

    /// Subscript after `[`: either `obj[index]` or `obj[start:stop:step]`.
    fn parse_subscript(&mut self, obj: Expr) -> Result<Expr, Fault> {
        let first = if matches!(self.peek(), Token::Colon) {
            None
        } else {
            Some(Box::new(self.parse_expr()?))
        };
        if !self.eat(&Token::Colon) {
            self.expect(&Token::RBracket, "']'")?;
            let index = first.ok_or_else(|| self.error("invalid syntax"))?;
            return Ok(Expr::Index(Box::new(obj), index));
        }
        let bound = |p: &mut Self| -> Result<Option<Box<Expr>>, Fault> {
            if matches!(p.peek(), Token::Colon | Token::RBracket) {
                Ok(None)
            } else {
                p.parse_expr().map(|e| Some(Box::new(e)))
            }
        };
        let stop = bound(self)?;
        let step = if self.eat(&Token::Colon) { bound(self)? } else { None };
        self.expect(&Token::RBracket, "']'")?;
        Ok(Expr::Slice {
            obj: Box::new(obj),
            start: first,
            stop,
            step,
        })
    }

    fn parse_primary(&mut self) -> Result<Expr, Fault> {
        match self.peek().clone() {
            Token::Int(n) => {
                self.pos += 1;
                Ok(Expr::Literal(Value::Int(n)))
            }
            Token::Float(x) => {
                self.pos += 1;
                Ok(Expr::Literal(Value::Float(x)))
            }
            Token::Str(s) => {
                self.pos += 1;
                // Adjacent literals concatenate.
                let mut s = s;
                while let Token::Str(next) = self.peek().clone() {
                    self.pos += 1;
                    s.push_str(&next);
                }
                Ok(Expr::Literal(Value::Str(s)))
            }
            Token::True => {
                self.pos += 1;
                Ok(Expr::Literal(Value::Bool(true)))
            }
            Token::False => {
                self.pos += 1;
                Ok(Expr::Literal(Value::Bool(false)))
            }
            Token::None => {
                self.pos += 1;
                Ok(Expr::Literal(Value::None))
            }
            Token::Name(name) => {
                self.pos += 1;
                Ok(Expr::Name(name))
            }
            Token::LParen => {
                self.pos += 1;
                if self.peek() == &Token::RParen {
                    return Err(self.error("tuples are not supported"));
                }
                let inner = self.parse_expr()?;
                if self.peek() == &Token::Comma {
                    return Err(self.error("tuples are not supported"));
                }
                self.expect(&Token::RParen, "')'")?;
                Ok(inner)
            }
            Token::LBracket => {
                self.pos += 1;
                let mut items = Vec::new();
                while self.peek() != &Token::RBracket {
                    items.push(self.parse_expr()?);
                    if !self.eat(&Token::Comma) {
                        break;
                    }
                }
                self.expect(&Token::RBracket, "']'")?;
                Ok(Expr::List(items))
            }
            _ => Err(self.unexpected()),
        }
    }
}

// ── Places ────────────────────────────────────────────────────────────────────

/// A resolved assignment target: a variable, or an element reached through
/// one or more subscripts.  Indices are evaluated once, when resolved.
#[derive(Debug, Clone)]
pub enum Place {
    Name(String),
    Item(Box<Place>, Value),
}

/// Resolve `expr` as a place, or `None` if it is not assignable.
pub fn resolve_place(expr: &Expr, ctx: &mut dyn EvalContext) -> Result<Option<Place>, Unwind> {
    match expr {
        Expr::Name(name) => Ok(Some(Place::Name(name.clone()))),
        Expr::Index(obj, index) => {
            let Some(inner) = resolve_place(obj, ctx)? else {
                return Ok(None);
            };
            let index = eval_expr(index, ctx)?;
            Ok(Some(Place::Item(Box::new(inner), index)))
        }
        _ => Ok(None),
    }
}

pub fn load_place(place: &Place, ctx: &mut dyn EvalContext) -> Result<Value, Unwind> {
    match place {
        Place::Name(name) => Ok(ctx.load(name)?),
        Place::Item(inner, index) => Ok(load_place(inner, ctx)?.get_item(index)?),
    }
}

pub fn store_place(place: &Place, value: Value, ctx: &mut dyn EvalContext) -> Result<(), Unwind> {
    match place {
        Place::Name(name) => {
            ctx.store(name, value);
            Ok(())
        }
        Place::Item(inner, index) => {
            let mut container = load_place(inner, ctx)?;
            container.set_item(index, value)?;
            store_place(inner, container, ctx)
        }
    }
}

// ── Evaluator ─────────────────────────────────────────────────────────────────

/// Evaluate an [`Expr`] against the given context.
pub fn eval_expr(expr: &Expr, ctx: &mut dyn EvalContext) -> Result<Value, Unwind> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),

        Expr::Name(name) => Ok(ctx.load(name)?),

        Expr::List(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(eval_expr(item, ctx)?);
            }
            Ok(Value::List(out))
        }

        Expr::Index(obj, index) => {
            let obj = eval_expr(obj, ctx)?;
            let index = eval_expr(index, ctx)?;
            Ok(obj.get_item(&index)?)
        }

        Expr::Slice {
            obj,
            start,
            stop,
            step,
        } => {
            let obj = eval_expr(obj, ctx)?;
            let start = eval_bound(start.as_deref(), ctx)?;
            let stop = eval_bound(stop.as_deref(), ctx)?;
            let step = eval_bound(step.as_deref(), ctx)?;
            Ok(obj.slice(start, stop, step)?)
        }

        Expr::Attribute(obj, name) => {
            let obj = eval_expr(obj, ctx)?;
            if let Value::Module(module) = obj {
                return Ok(builtins::module_attr(module, name)?);
            }
            if builtins::has_method(&obj, name) {
                Err(Fault::type_error(format!(
                    "method '{name}' of '{}' object must be called",
                    obj.type_name()
                ))
                .into())
            } else {
                Err(attribute_error(&obj, name).into())
            }
        }

        Expr::Call { func, args, kwargs } => {
            let callee = eval_expr(func, ctx)?;
            let args = eval_args(args, ctx)?;
            let kwargs = eval_kwargs(kwargs, ctx)?;
            ctx.call(callee, args, kwargs)
        }

        Expr::MethodCall {
            obj,
            method,
            args,
            kwargs,
        } => {
            let place = resolve_place(obj, ctx)?;
            let mut receiver = match &place {
                Some(p) => load_place(p, ctx)?,
                None => eval_expr(obj, ctx)?,
            };
            let args = eval_args(args, ctx)?;
            let kwargs = eval_kwargs(kwargs, ctx)?;
            if let Value::Module(module) = receiver {
                let func = builtins::module_attr(module, method)?;
                return ctx.call(func, args, kwargs);
            }
            let (result, mutated) = builtins::call_method(&mut receiver, method, args, kwargs)?;
            if mutated {
                if let Some(p) = place {
                    store_place(&p, receiver, ctx)?;
                }
            }
            Ok(result)
        }

        Expr::Unary(op, inner) => {
            let v = eval_expr(inner, ctx)?;
            Ok(match op {
                UnaryOp::Neg => v.neg()?,
                UnaryOp::Pos => v.pos()?,
                UnaryOp::Not => Value::Bool(!v.truthy()),
            })
        }

        Expr::Binary(op, lhs, rhs) => {
            let l = eval_expr(lhs, ctx)?;
            let r = eval_expr(rhs, ctx)?;
            Ok(eval_binop(*op, &l, &r)?)
        }

        Expr::Compare(first, rest) => {
            let mut left = eval_expr(first, ctx)?;
            for (op, rhs) in rest {
                let right = eval_expr(rhs, ctx)?;
                if !compare(*op, &left, &right)? {
                    return Ok(Value::Bool(false));
                }
                left = right;
            }
            Ok(Value::Bool(true))
        }

        // `and`/`or` return the deciding operand, not a bool.
        Expr::And(lhs, rhs) => {
            let l = eval_expr(lhs, ctx)?;
            if !l.truthy() {
                return Ok(l);
            }
            eval_expr(rhs, ctx)
        }
        Expr::Or(lhs, rhs) => {
            let l = eval_expr(lhs, ctx)?;
            if l.truthy() {
                return Ok(l);
            }
            eval_expr(rhs, ctx)
        }

        Expr::IfElse {
            cond,
            then,
            otherwise,
        } => {
            if eval_expr(cond, ctx)?.truthy() {
                eval_expr(then, ctx)
            } else {
                eval_expr(otherwise, ctx)
            }
        }
    }
}

fn eval_args(args: &[Expr], ctx: &mut dyn EvalContext) -> Result<Vec<Value>, Unwind> {
    args.iter().map(|a| eval_expr(a, ctx)).collect()
}

fn eval_kwargs(
    kwargs: &[(String, Expr)],
    ctx: &mut dyn EvalContext,
) -> Result<Vec<(String, Value)>, Unwind> {
    kwargs
        .iter()
        .map(|(k, e)| Ok((k.clone(), eval_expr(e, ctx)?)))
        .collect()
}

fn eval_bound(bound: Option<&Expr>, ctx: &mut dyn EvalContext) -> Result<Option<i64>, Unwind> {
    match bound {
        None => Ok(None),
        Some(e) => match eval_expr(e, ctx)? {
            Value::None => Ok(None),
            v => Ok(Some(v.as_index("slice indices")?)),
        },
    }
}

pub fn eval_binop(op: BinOp, l: &Value, r: &Value) -> Result<Value, Fault> {
    match op {
        BinOp::Add => l.add(r),
        BinOp::Sub => l.sub(r),
        BinOp::Mul => l.mul(r),
        BinOp::Div => l.true_div(r),
        BinOp::FloorDiv => l.floor_div(r),
        BinOp::Mod => l.rem(r),
        BinOp::Pow => l.pow(r),
    }
}

fn compare(op: CmpOp, l: &Value, r: &Value) -> Result<bool, Fault> {
    use std::cmp::Ordering::*;
    Ok(match op {
        CmpOp::Eq => l.py_eq(r),
        CmpOp::Ne => !l.py_eq(r),
        CmpOp::Lt => l.compare(r, op.symbol())? == Some(Less),
        CmpOp::Le => matches!(l.compare(r, op.symbol())?, Some(Less | Equal)),
        CmpOp::Gt => l.compare(r, op.symbol())? == Some(Greater),
        CmpOp::Ge => matches!(l.compare(r, op.symbol())?, Some(Greater | Equal)),
        CmpOp::In => r.contains(l)?,
        CmpOp::NotIn => !r.contains(l)?,
        CmpOp::Is => identical(l, r),
        CmpOp::IsNot => !identical(l, r),
    })
}

/// Identity as far as a value-semantics interpreter can observe it.
fn identical(l: &Value, r: &Value) -> bool {
    match (l, r) {
        (Value::None, Value::None) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Int(a), Value::Int(b)) => a == b,
        (Value::Str(a), Value::Str(b)) => a == b,
        (Value::Function(a), Value::Function(b)) => std::sync::Arc::ptr_eq(a, b),
        (Value::Builtin(a), Value::Builtin(b)) => a == b,
        _ => false,
    }
}

pub fn attribute_error(obj: &Value, name: &str) -> Fault {
    Fault::new(
        FaultKind::AttributeError,
        format!("'{}' object has no attribute '{name}'", obj.type_name()),
    )
}

/// Parse a standalone expression.
pub fn parse_expr(src: &str) -> Result<Expr, Fault> {
    let tokens = super::lexer::tokenize(src)?;
    let mut parser = Parser::new(tokens, src);
    let expr = parser.parse_expr()?;
    parser.eat(&Token::Newline);
    if parser.peek() != &Token::Eof {
        return Err(parser.unexpected());
    }
    Ok(expr)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
