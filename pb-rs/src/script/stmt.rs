//! Statement AST and the block-structured part of the parser.
//!
//! A program is a sequence of statements.  Compound statements (`if`,
//! `while`, `for`, `def`) own an indented block; simple statements may share a
//! line when separated by `;`.  Checks Python performs at compile time
//! (`break` outside a loop, `return` outside a function) are reported here as
//! `SyntaxError`s so a bad program never starts running.

use std::collections::HashSet;
use std::sync::Arc;

use super::expr::{BinOp, Expr, Parser};
use super::fault::{Fault, FaultKind};
use super::lexer::{self, Token};

/// A parsed statement and the line it starts on.
#[derive(Debug, Clone)]
pub struct Stmt {
    pub line: usize,
    pub kind: StmtKind,
}

#[derive(Debug, Clone)]
pub enum StmtKind {
    /// An expression evaluated for its side effects.
    Expr(Expr),
    /// `a = b = value`
    Assign { targets: Vec<Expr>, value: Expr },
    /// `target op= value`
    AugAssign {
        target: Expr,
        op: BinOp,
        value: Expr,
    },
    /// `if`/`elif` branches with their lines, then the optional `else` block.
    If {
        branches: Vec<(usize, Expr, Vec<Stmt>)>,
        else_block: Vec<Stmt>,
    },
    While { cond: Expr, body: Vec<Stmt> },
    For {
        target: Expr,
        iter: Expr,
        body: Vec<Stmt>,
    },
    Def(Arc<FunctionDef>),
    Return(Option<Expr>),
    Break,
    Continue,
    Pass,
    Global(Vec<String>),
    Del(Vec<Expr>),
    /// `import module [as alias]`
    Import { module: String, alias: Option<String> },
    /// `from module import name [as alias], ...`
    FromImport {
        module: String,
        names: Vec<(String, Option<String>)>,
    },
}

/// A `def` statement.
#[derive(Debug)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<Param>,
    pub body: Vec<Stmt>,
    /// Names the body binds locally; reading one before it is assigned is an
    /// `UnboundLocalError`, not a fall-through to the global.
    pub locals: HashSet<String>,
}

#[derive(Debug)]
pub struct Param {
    pub name: String,
    pub default: Option<Expr>,
}

// ── Parser ────────────────────────────────────────────────────────────────────

/// Parse a whole program.
pub fn parse_program(src: &str) -> Result<Vec<Stmt>, Fault> {
    let tokens = lexer::tokenize(src)?;
    let mut parser = Parser::new(tokens, src);
    let mut stmts = Vec::new();
    while parser.peek() != &Token::Eof {
        stmts.extend(parser.parse_statement()?);
    }
    Ok(stmts)
}

impl Parser<'_> {
    /// One logical line: a compound statement, or one or more simple ones.
    fn parse_statement(&mut self) -> Result<Vec<Stmt>, Fault> {
        let line = self.line();
        let kind = match self.peek() {
            Token::If => self.parse_if()?,
            Token::While => self.parse_while()?,
            Token::For => self.parse_for()?,
            Token::Def => self.parse_def()?,
            Token::Indent => return Err(self.unexpected()),
            _ => return self.parse_simple_line(),
        };
        Ok(vec![Stmt { line, kind }])
    }

    fn parse_simple_line(&mut self) -> Result<Vec<Stmt>, Fault> {
        let mut stmts = Vec::new();
        loop {
            let line = self.line();
            let kind = self.parse_simple()?;
            stmts.push(Stmt { line, kind });
            if !self.eat(&Token::Semicolon) || self.peek() == &Token::Newline {
                break;
            }
        }
        if !self.eat(&Token::Newline) {
            return Err(self.error("invalid syntax"));
        }
        Ok(stmts)
    }

    fn parse_simple(&mut self) -> Result<StmtKind, Fault> {
        let line = self.line();
        match self.peek() {
            Token::Pass => {
                self.advance();
                Ok(StmtKind::Pass)
            }
            Token::Break => {
                self.advance();
                if self.loop_depth == 0 {
                    return Err(self.error_at(FaultKind::SyntaxError, "'break' outside loop", line));
                }
                Ok(StmtKind::Break)
            }
            Token::Continue => {
                self.advance();
                if self.loop_depth == 0 {
                    return Err(self.error_at(
                        FaultKind::SyntaxError,
                        "'continue' not properly in loop",
                        line,
                    ));
                }
                Ok(StmtKind::Continue)
            }
            Token::Return => {
                self.advance();
                if self.fn_depth == 0 {
                    return Err(self.error_at(
                        FaultKind::SyntaxError,
                        "'return' outside function",
                        line,
                    ));
                }
                if matches!(self.peek(), Token::Newline | Token::Semicolon) {
                    Ok(StmtKind::Return(None))
                } else {
                    Ok(StmtKind::Return(Some(self.parse_expr()?)))
                }
            }
            Token::Global => {
                self.advance();
                let mut names = vec![self.parse_name()?];
                while self.eat(&Token::Comma) {
                    names.push(self.parse_name()?);
                }
                Ok(StmtKind::Global(names))
            }
            Token::Del => {
                self.advance();
                let mut targets = Vec::new();
                loop {
                    let target = self.parse_expr()?;
                    if !target.is_assignable() {
                        return Err(self.error_at(
                            FaultKind::SyntaxError,
                            "cannot delete expression",
                            line,
                        ));
                    }
                    targets.push(target);
                    if !self.eat(&Token::Comma) {
                        break;
                    }
                }
                Ok(StmtKind::Del(targets))
            }
            Token::Import => {
                self.advance();
                let module = self.parse_dotted_name()?;
                let alias = self.parse_alias()?;
                Ok(StmtKind::Import { module, alias })
            }
            Token::From => {
                self.advance();
                let module = self.parse_dotted_name()?;
                self.expect(&Token::Import, "'import'")?;
                let mut names = Vec::new();
                loop {
                    let name = if self.eat(&Token::Star) {
                        "*".to_owned()
                    } else {
                        self.parse_name()?
                    };
                    let alias = self.parse_alias()?;
                    names.push((name, alias));
                    if !self.eat(&Token::Comma) {
                        break;
                    }
                }
                Ok(StmtKind::FromImport { module, names })
            }
            _ => self.parse_expr_statement(line),
        }
    }

    fn parse_expr_statement(&mut self, line: usize) -> Result<StmtKind, Fault> {
        let first = self.parse_expr()?;

        let aug = match self.peek() {
            Token::PlusAssign => Some(BinOp::Add),
            Token::MinusAssign => Some(BinOp::Sub),
            Token::StarAssign => Some(BinOp::Mul),
            Token::SlashAssign => Some(BinOp::Div),
            Token::DoubleSlashAssign => Some(BinOp::FloorDiv),
            Token::PercentAssign => Some(BinOp::Mod),
            Token::DoubleStarAssign => Some(BinOp::Pow),
            _ => None,
        };
        if let Some(op) = aug {
            self.advance();
            if !first.is_assignable() {
                return Err(self.error_at(
                    FaultKind::SyntaxError,
                    "'expression' is an illegal expression for augmented assignment",
                    line,
                ));
            }
            let value = self.parse_expr()?;
            return Ok(StmtKind::AugAssign {
                target: first,
                op,
                value,
            });
        }

        if self.peek() != &Token::Assign {
            if self.peek() == &Token::Comma {
                return Err(self.error("tuples are not supported"));
            }
            return Ok(StmtKind::Expr(first));
        }

        let mut targets = Vec::new();
        let mut value = first;
        while self.eat(&Token::Assign) {
            if !value.is_assignable() {
                return Err(self.error_at(
                    FaultKind::SyntaxError,
                    "cannot assign to expression here. Maybe you meant '==' instead of '='?",
                    line,
                ));
            }
            targets.push(value);
            value = self.parse_expr()?;
        }
        if self.peek() == &Token::Comma {
            return Err(self.error("tuples are not supported"));
        }
        Ok(StmtKind::Assign { targets, value })
    }

    fn parse_name(&mut self) -> Result<String, Fault> {
        match self.advance() {
            Token::Name(name) => Ok(name),
            _ => Err(self.error("invalid syntax")),
        }
    }

    fn parse_dotted_name(&mut self) -> Result<String, Fault> {
        let mut name = self.parse_name()?;
        while self.eat(&Token::Dot) {
            name.push('.');
            name.push_str(&self.parse_name()?);
        }
        Ok(name)
    }

    /// Optional `as name`; `as` is a soft keyword here.
    fn parse_alias(&mut self) -> Result<Option<String>, Fault> {
        if matches!(self.peek(), Token::Name(n) if n == "as") {
            self.advance();
            return self.parse_name().map(Some);
        }
        Ok(None)
    }

    /// `: NEWLINE INDENT stmts DEDENT`, or simple statements on the same line.
    fn parse_block(&mut self, what: &str, header_line: usize) -> Result<Vec<Stmt>, Fault> {
        self.expect(&Token::Colon, "':'")?;
        if !self.eat(&Token::Newline) {
            return self.parse_simple_line();
        }
        if !self.eat(&Token::Indent) {
            let line = self.line();
            return Err(self.error_at(
                FaultKind::IndentationError,
                format!("expected an indented block after {what} on line {header_line}"),
                line,
            ));
        }
        let mut body = Vec::new();
        while !matches!(self.peek(), Token::Dedent | Token::Eof) {
            body.extend(self.parse_statement()?);
        }
        self.eat(&Token::Dedent);
        Ok(body)
    }

    fn parse_loop_body(&mut self, what: &str, header_line: usize) -> Result<Vec<Stmt>, Fault> {
        self.loop_depth += 1;
        let body = self.parse_block(what, header_line);
        self.loop_depth -= 1;
        body
    }

    fn parse_if(&mut self) -> Result<StmtKind, Fault> {
        let mut branches = Vec::new();
        let line = self.line();
        self.advance();
        let cond = self.parse_expr()?;
        let body = self.parse_block("'if' statement", line)?;
        branches.push((line, cond, body));

        while self.peek() == &Token::Elif {
            let line = self.line();
            self.advance();
            let cond = self.parse_expr()?;
            let body = self.parse_block("'elif' statement", line)?;
            branches.push((line, cond, body));
        }

        let else_block = if self.peek() == &Token::Else {
            let line = self.line();
            self.advance();
            self.parse_block("'else' statement", line)?
        } else {
            Vec::new()
        };
        Ok(StmtKind::If {
            branches,
            else_block,
        })
    }

    fn parse_while(&mut self) -> Result<StmtKind, Fault> {
        let line = self.line();
        self.advance();
        let cond = self.parse_expr()?;
        let body = self.parse_loop_body("'while' statement", line)?;
        Ok(StmtKind::While { cond, body })
    }

    fn parse_for(&mut self) -> Result<StmtKind, Fault> {
        let line = self.line();
        self.advance();
        // The target is a name or subscript; parse below comparison level so
        // the `in` is not swallowed as a membership test.
        let target = match self.peek().clone() {
            Token::Name(name) => {
                self.advance();
                let mut target = Expr::Name(name);
                while self.eat(&Token::LBracket) {
                    let index = self.parse_expr()?;
                    self.expect(&Token::RBracket, "']'")?;
                    target = Expr::Index(Box::new(target), Box::new(index));
                }
                target
            }
            _ => return Err(self.error("invalid syntax")),
        };
        if self.peek() == &Token::Comma {
            return Err(self.error("tuples are not supported"));
        }
        self.expect(&Token::In, "'in'")?;
        let iter = self.parse_expr()?;
        let body = self.parse_loop_body("'for' statement", line)?;
        Ok(StmtKind::For { target, iter, body })
    }

    fn parse_def(&mut self) -> Result<StmtKind, Fault> {
        let line = self.line();
        self.advance();
        let name = self.parse_name()?;
        self.expect(&Token::LParen, "'('")?;

        let mut params: Vec<Param> = Vec::new();
        while self.peek() != &Token::RParen {
            let pname = self.parse_name()?;
            if params.iter().any(|p| p.name == pname) {
                return Err(self.error(format!(
                    "duplicate argument '{pname}' in function definition"
                )));
            }
            let default = if self.eat(&Token::Assign) {
                Some(self.parse_expr()?)
            } else {
                if params.iter().any(|p| p.default.is_some()) {
                    return Err(self.error("non-default argument follows default argument"));
                }
                None
            };
            params.push(Param {
                name: pname,
                default,
            });
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(&Token::RParen, "')'")?;

        let saved_loops = std::mem::replace(&mut self.loop_depth, 0);
        self.fn_depth += 1;
        let body = self.parse_block("function definition", line);
        self.fn_depth -= 1;
        self.loop_depth = saved_loops;

        let body = body?;
        let locals = local_names(&params, &body);
        Ok(StmtKind::Def(Arc::new(FunctionDef {
            name,
            params,
            body,
            locals,
        })))
    }
}

/// Parameters plus every name bound in `body`, minus `global` declarations.
/// Nested `def` bodies are their own scope; only the function name binds here.
fn local_names(params: &[Param], body: &[Stmt]) -> HashSet<String> {
    let mut bound: HashSet<String> = params.iter().map(|p| p.name.clone()).collect();
    let mut globals = HashSet::new();
    collect_bindings(body, &mut bound, &mut globals);
    bound.retain(|name| !globals.contains(name));
    bound
}

fn collect_bindings(stmts: &[Stmt], bound: &mut HashSet<String>, globals: &mut HashSet<String>) {
    fn bind(target: &Expr, bound: &mut HashSet<String>) {
        if let Expr::Name(name) = target {
            bound.insert(name.clone());
        }
    }

    for stmt in stmts {
        match &stmt.kind {
            StmtKind::Assign { targets, .. } => {
                for t in targets {
                    bind(t, bound);
                }
            }
            StmtKind::AugAssign { target, .. } => bind(target, bound),
            StmtKind::Del(targets) => {
                for t in targets {
                    bind(t, bound);
                }
            }
            StmtKind::For { target, body, .. } => {
                bind(target, bound);
                collect_bindings(body, bound, globals);
            }
            StmtKind::While { body, .. } => collect_bindings(body, bound, globals),
            StmtKind::If {
                branches,
                else_block,
            } => {
                for (_, _, body) in branches {
                    collect_bindings(body, bound, globals);
                }
                collect_bindings(else_block, bound, globals);
            }
            StmtKind::Def(def) => {
                bound.insert(def.name.clone());
            }
            StmtKind::Import { module, alias } => {
                bound.insert(alias.clone().unwrap_or_else(|| module.clone()));
            }
            StmtKind::FromImport { names, .. } => {
                for (name, alias) in names {
                    if name != "*" {
                        bound.insert(alias.clone().unwrap_or_else(|| name.clone()));
                    }
                }
            }
            StmtKind::Global(names) => globals.extend(names.iter().cloned()),
            StmtKind::Expr(_)
            | StmtKind::Return(_)
            | StmtKind::Break
            | StmtKind::Continue
            | StmtKind::Pass => {}
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
