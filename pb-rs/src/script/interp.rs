//! Tree-walking interpreter for the built-in script language.
//!
//! [`Interpreter`] is the [`ScriptEvaluator`] the engine uses by default.  Each
//! run parses the script, then a short-lived [`Machine`] executes it against
//! the session [`Namespace`].  The machine implements [`EvalContext`] so the
//! expression evaluator can call back into it for name resolution and calls.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::thread;

use tokio::runtime::Handle;

use super::{
    builtins,
    expr::{eval_binop, eval_expr, load_place, resolve_place, store_place, EvalContext, Expr},
    fault::{Fault, FaultKind, TraceFrame, Unwind},
    stmt::{parse_program, FunctionDef, Stmt, StmtKind},
    value::{Function, Value},
};
use crate::engine::{ExecutionContext, Interrupt, ScriptEvaluator};
use crate::namespace::Namespace;
use crate::streams::ScriptStreams;

/// Default limit on nested user-function calls.
pub const DEFAULT_MAX_DEPTH: usize = 100;

/// Native stack of the thread that walks the tree.  Large enough that the
/// recursion and nesting limits trip long before the stack runs out, in
/// debug builds too.
const SCRIPT_STACK_SIZE: usize = 256 * 1024 * 1024;

// ── Interpreter ───────────────────────────────────────────────────────────────

/// The built-in evaluator.
#[derive(Debug, Clone)]
pub struct Interpreter {
    max_depth: usize,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Interpreter {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Override the recursion limit.
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth.max(1);
        self
    }

    /// Parse and execute `src`, reporting how the run ended.
    pub fn exec(
        &self,
        src: &str,
        namespace: &mut Namespace,
        streams: &ScriptStreams,
    ) -> Result<(), Unwind> {
        let max_depth = self.max_depth;
        // Input calls block on the caller's runtime from the script thread.
        let runtime = Handle::try_current().ok();
        thread::scope(|scope| {
            let worker = thread::Builder::new()
                .name("pyblocks-script".into())
                .stack_size(SCRIPT_STACK_SIZE)
                .spawn_scoped(scope, move || {
                    let _rt = runtime.as_ref().map(Handle::enter);
                    let program = parse_program(src)?;
                    let mut machine = Machine::new(namespace, streams, max_depth);
                    machine.exec_block(&program).map(|_| ())
                });
            match worker {
                Ok(worker) => worker
                    .join()
                    .unwrap_or_else(|panic| std::panic::resume_unwind(panic)),
                Err(e) => Err(Fault::new(
                    FaultKind::RuntimeError,
                    format!("cannot start script thread: {e}"),
                )
                .into()),
            }
        })
    }
}

impl ScriptEvaluator for Interpreter {
    type Namespace = Namespace;

    fn name(&self) -> &'static str {
        "builtin"
    }

    fn new_namespace(&self) -> Namespace {
        Namespace::new()
    }

    fn evaluate(
        &mut self,
        script: &str,
        ctx: &mut ExecutionContext<'_, Namespace>,
    ) -> Result<(), Interrupt> {
        self.exec(script, ctx.namespace, ctx.streams)
            .map_err(|unwind| match unwind {
                Unwind::Exit(code) => Interrupt::Exit(code),
                Unwind::Halted => Interrupt::Halted,
                Unwind::Fault(fault) => Interrupt::Fault(fault.traceback()),
            })
    }
}

// ── Machine ───────────────────────────────────────────────────────────────────

/// Result of executing a statement.
#[derive(Debug)]
enum Flow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

/// One active user-function call.
struct Frame {
    def: Arc<FunctionDef>,
    scope: String,
    line: usize,
    locals: HashMap<String, Value>,
    /// Names declared `global` in this call.
    globals: HashSet<String>,
}

/// Execution state for a single run.
struct Machine<'a> {
    globals: &'a mut Namespace,
    streams: &'a ScriptStreams,
    /// Line currently executing at module level.
    module_line: usize,
    frames: Vec<Frame>,
    max_depth: usize,
}

impl<'a> Machine<'a> {
    fn new(globals: &'a mut Namespace, streams: &'a ScriptStreams, max_depth: usize) -> Self {
        Machine {
            globals,
            streams,
            module_line: 0,
            frames: Vec::new(),
            max_depth,
        }
    }

    fn set_line(&mut self, line: usize) {
        match self.frames.last_mut() {
            Some(frame) => frame.line = line,
            None => self.module_line = line,
        }
    }

    /// The call stack, outermost first.
    fn snapshot(&self) -> Vec<TraceFrame> {
        let mut frames = vec![TraceFrame {
            line: self.module_line,
            scope: "<module>".to_owned(),
        }];
        frames.extend(self.frames.iter().map(|f| TraceFrame {
            line: f.line,
            scope: f.scope.clone(),
        }));
        frames
    }

    /// Attach the current stack to a fault that has not seen one yet.
    fn annotate(&self, unwind: Unwind) -> Unwind {
        match unwind {
            Unwind::Fault(mut fault) if !fault.is_annotated() => {
                fault.annotate(self.snapshot());
                Unwind::Fault(fault)
            }
            other => other,
        }
    }

    fn exec_block(&mut self, stmts: &[Stmt]) -> Result<Flow, Unwind> {
        for stmt in stmts {
            match self.exec_stmt(stmt)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(&mut self, stmt: &Stmt) -> Result<Flow, Unwind> {
        if self.streams.is_halted() {
            return Err(Unwind::Halted);
        }
        self.set_line(stmt.line);
        self.exec_kind(stmt).map_err(|u| self.annotate(u))
    }

    fn exec_kind(&mut self, stmt: &Stmt) -> Result<Flow, Unwind> {
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                eval_expr(expr, self)?;
            }

            StmtKind::Assign { targets, value } => {
                let value = eval_expr(value, self)?;
                for target in targets {
                    self.assign(target, value.clone())?;
                }
            }

            StmtKind::AugAssign { target, op, value } => {
                let place = resolve_place(target, self)?
                    .ok_or_else(|| Fault::type_error("illegal augmented assignment target"))?;
                let current = load_place(&place, self)?;
                let rhs = eval_expr(value, self)?;
                let updated = eval_binop(*op, &current, &rhs)?;
                store_place(&place, updated, self)?;
            }

            StmtKind::If {
                branches,
                else_block,
            } => {
                for (line, cond, body) in branches {
                    self.set_line(*line);
                    if eval_expr(cond, self)?.truthy() {
                        return self.exec_block(body);
                    }
                }
                return self.exec_block(else_block);
            }

            StmtKind::While { cond, body } => loop {
                if self.streams.is_halted() {
                    return Err(Unwind::Halted);
                }
                self.set_line(stmt.line);
                if !eval_expr(cond, self)?.truthy() {
                    break;
                }
                match self.exec_block(body)? {
                    Flow::Break => break,
                    Flow::Normal | Flow::Continue => {}
                    ret @ Flow::Return(_) => return Ok(ret),
                }
            },

            StmtKind::For { target, iter, body } => {
                let iterable = eval_expr(iter, self)?;
                return self.exec_for(target, iterable, body);
            }

            StmtKind::Def(def) => {
                let mut defaults = Vec::with_capacity(def.params.len());
                for param in &def.params {
                    defaults.push(match &param.default {
                        Some(expr) => Some(eval_expr(expr, self)?),
                        None => None,
                    });
                }
                let func = Function {
                    def: Arc::clone(def),
                    defaults,
                };
                self.store(&def.name, Value::Function(Arc::new(func)));
            }

            StmtKind::Return(expr) => {
                let value = match expr {
                    Some(e) => eval_expr(e, self)?,
                    None => Value::None,
                };
                return Ok(Flow::Return(value));
            }

            StmtKind::Break => return Ok(Flow::Break),
            StmtKind::Continue => return Ok(Flow::Continue),
            StmtKind::Pass => {}

            StmtKind::Global(names) => {
                if let Some(frame) = self.frames.last_mut() {
                    frame.globals.extend(names.iter().cloned());
                }
            }

            StmtKind::Del(targets) => {
                for target in targets {
                    self.delete(target)?;
                }
            }

            StmtKind::Import { module, alias } => {
                let value = builtins::import_module(module)?;
                let name = alias.as_deref().unwrap_or(module);
                self.store(name, value);
            }

            StmtKind::FromImport { module, names } => {
                builtins::import_module(module)?;
                for (name, alias) in names {
                    if name == "*" {
                        for (export, value) in builtins::module_exports(module) {
                            self.store(&export, value);
                        }
                        continue;
                    }
                    let value = builtins::module_attr(module, name).map_err(|_| {
                        Fault::new(
                            FaultKind::ImportError,
                            format!("cannot import name '{name}' from '{module}' (unknown location)"),
                        )
                    })?;
                    self.store(alias.as_deref().unwrap_or(name), value);
                }
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_for(&mut self, target: &Expr, iterable: Value, body: &[Stmt]) -> Result<Flow, Unwind> {
        // Ranges are walked lazily so `range(10**9)` costs nothing up front.
        if let Value::Range { start, stop, step } = iterable {
            let mut i = start;
            while (step > 0 && i < stop) || (step < 0 && i > stop) {
                self.assign(target, Value::Int(i))?;
                match self.exec_block(body)? {
                    Flow::Break => break,
                    Flow::Normal | Flow::Continue => {}
                    ret @ Flow::Return(_) => return Ok(ret),
                }
                i = match i.checked_add(step) {
                    Some(next) => next,
                    None => break,
                };
            }
            return Ok(Flow::Normal);
        }

        for item in iterable.iter_values()? {
            self.assign(target, item)?;
            match self.exec_block(body)? {
                Flow::Break => break,
                Flow::Normal | Flow::Continue => {}
                ret @ Flow::Return(_) => return Ok(ret),
            }
        }
        Ok(Flow::Normal)
    }

    fn assign(&mut self, target: &Expr, value: Value) -> Result<(), Unwind> {
        let place = resolve_place(target, self)?
            .ok_or_else(|| Fault::type_error("cannot assign to expression"))?;
        store_place(&place, value, self)
    }

    fn delete(&mut self, target: &Expr) -> Result<(), Unwind> {
        match target {
            Expr::Name(name) => {
                let removed = match self.frames.last_mut() {
                    Some(frame) if !frame.globals.contains(name) => frame.locals.remove(name),
                    _ => self.globals.unset(name),
                };
                removed.map(|_| ()).ok_or_else(|| Fault::name_error(name).into())
            }
            Expr::Index(obj, index) => {
                let place = resolve_place(obj, self)?
                    .ok_or_else(|| Fault::type_error("cannot delete expression"))?;
                let index = eval_expr(index, self)?;
                let mut container = load_place(&place, self)?;
                container.del_item(&index)?;
                store_place(&place, container, self)
            }
            _ => Err(Fault::type_error("cannot delete expression").into()),
        }
    }

    fn call_function(
        &mut self,
        func: &Function,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> Result<Value, Unwind> {
        let def = &func.def;
        let params = &def.params;
        if args.len() > params.len() {
            let expected = params.len();
            return Err(Fault::type_error(format!(
                "{}() takes {expected} positional argument{} but {} {} given",
                def.name,
                if expected == 1 { "" } else { "s" },
                args.len(),
                if args.len() == 1 { "was" } else { "were" },
            ))
            .into());
        }

        let mut slots: Vec<Option<Value>> = vec![None; params.len()];
        for (slot, arg) in slots.iter_mut().zip(args) {
            *slot = Some(arg);
        }
        for (key, value) in kwargs {
            let idx = params.iter().position(|p| p.name == key).ok_or_else(|| {
                Fault::type_error(format!(
                    "{}() got an unexpected keyword argument '{key}'",
                    def.name
                ))
            })?;
            if slots[idx].is_some() {
                return Err(Fault::type_error(format!(
                    "{}() got multiple values for argument '{key}'",
                    def.name
                ))
                .into());
            }
            slots[idx] = Some(value);
        }

        let mut locals = HashMap::with_capacity(params.len());
        let mut missing = Vec::new();
        for ((param, slot), default) in params.iter().zip(slots).zip(&func.defaults) {
            match slot.or_else(|| default.clone()) {
                Some(v) => {
                    locals.insert(param.name.clone(), v);
                }
                None => missing.push(format!("'{}'", param.name)),
            }
        }
        if !missing.is_empty() {
            return Err(Fault::type_error(format!(
                "{}() missing {} required positional argument{}: {}",
                def.name,
                missing.len(),
                if missing.len() == 1 { "" } else { "s" },
                join_names(&missing),
            ))
            .into());
        }

        if self.frames.len() >= self.max_depth {
            return Err(Fault::new(
                FaultKind::RecursionError,
                "maximum recursion depth exceeded",
            )
            .into());
        }

        self.frames.push(Frame {
            def: Arc::clone(def),
            scope: def.name.clone(),
            line: 0,
            locals,
            globals: HashSet::new(),
        });
        let result = self.exec_block(&def.body);
        self.frames.pop();

        match result? {
            Flow::Return(v) => Ok(v),
            _ => Ok(Value::None),
        }
    }
}

/// `'a'`, `'a' and 'b'`, `'a', 'b', and 'c'`.
fn join_names(names: &[String]) -> String {
    match names {
        [] => String::new(),
        [one] => one.clone(),
        [a, b] => format!("{a} and {b}"),
        [rest @ .., last] => format!("{}, and {last}", rest.join(", ")),
    }
}

// ── EvalContext impl ──────────────────────────────────────────────────────────

impl EvalContext for Machine<'_> {
    fn load(&self, name: &str) -> Result<Value, Fault> {
        if let Some(frame) = self.frames.last() {
            if !frame.globals.contains(name) {
                if let Some(v) = frame.locals.get(name) {
                    return Ok(v.clone());
                }
                if frame.def.locals.contains(name) {
                    return Err(Fault::unbound_local(name));
                }
            }
        }
        if let Some(v) = self.globals.get(name) {
            return Ok(v.clone());
        }
        builtins::lookup(name).ok_or_else(|| Fault::name_error(name))
    }

    fn store(&mut self, name: &str, value: Value) {
        match self.frames.last_mut() {
            Some(frame) if !frame.globals.contains(name) => {
                frame.locals.insert(name.to_owned(), value);
            }
            _ => self.globals.set(name, value),
        }
    }

    fn call(
        &mut self,
        callee: Value,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> Result<Value, Unwind> {
        match callee {
            Value::Function(func) => self.call_function(&func, args, kwargs),
            Value::Builtin(name) => builtins::call_builtin(name, args, kwargs, self.streams),
            other => Err(Fault::type_error(format!(
                "'{}' object is not callable",
                other.type_name()
            ))
            .into()),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
