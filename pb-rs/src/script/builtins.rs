//! Built-in functions, methods and modules.
//!
//! Each function receives already-evaluated positional and keyword arguments.
//! Functions that touch the outside world (`print`, `input`, `time.sleep`)
//! go through the run's [`ScriptStreams`]; everything else is pure.

use std::cmp::Ordering;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use super::fault::{Fault, FaultKind, Unwind};
use super::value::Value;
use crate::error::InputError;
use crate::streams::ScriptStreams;

/// Global built-in function names.
const FUNCTIONS: &[&str] = &[
    "print", "input", "exit", "quit", "str", "int", "float", "bool", "len", "range", "abs",
    "min", "max", "sum", "round", "type", "list", "sorted", "chr", "ord",
];

/// Functions exported by built-in modules, as `module.name`.
const MODULE_FUNCTIONS: &[&str] = &[
    "math.sqrt",
    "math.floor",
    "math.ceil",
    "math.trunc",
    "math.pow",
    "math.fabs",
    "math.exp",
    "math.log",
    "math.log10",
    "math.sin",
    "math.cos",
    "math.tan",
    "time.sleep",
    "time.time",
];

const MODULES: &[&str] = &["math", "time"];

const STR_METHODS: &[&str] = &[
    "upper", "lower", "strip", "lstrip", "rstrip", "split", "join", "replace", "startswith",
    "endswith", "find", "count", "isdigit", "isalpha", "title", "capitalize", "format",
];

const LIST_METHODS: &[&str] = &[
    "append", "pop", "insert", "extend", "remove", "index", "count", "sort", "reverse", "clear",
    "copy",
];

/// Granularity of `time.sleep` halt checks.
const SLEEP_SLICE: Duration = Duration::from_millis(20);

/// Resolve a global built-in by name.
pub fn lookup(name: &str) -> Option<Value> {
    FUNCTIONS
        .iter()
        .find(|f| **f == name)
        .copied()
        .map(Value::Builtin)
}

// ── Argument helpers ──────────────────────────────────────────────────────────

/// Evaluated call arguments for one built-in invocation.
struct Args {
    name: &'static str,
    pos: Vec<Value>,
    kw: Vec<(String, Value)>,
}

impl Args {
    fn arity(&self, min: usize, max: usize) -> Result<(), Fault> {
        let got = self.pos.len();
        if (min..=max).contains(&got) {
            return Ok(());
        }
        let name = self.name;
        let plural = |n: usize| if n == 1 { "" } else { "s" };
        let msg = if min == max {
            format!("{name}() takes exactly {min} argument{} ({got} given)", plural(min))
        } else if got < min {
            format!("{name}() takes at least {min} argument{} ({got} given)", plural(min))
        } else {
            format!("{name}() takes at most {max} argument{} ({got} given)", plural(max))
        };
        Err(Fault::type_error(msg))
    }

    fn kwarg(&mut self, key: &str) -> Option<Value> {
        let idx = self.kw.iter().position(|(k, _)| k == key)?;
        Some(self.kw.remove(idx).1)
    }

    /// Fail on any keyword argument not consumed by [`Args::kwarg`].
    fn finish(&self) -> Result<(), Fault> {
        match self.kw.first() {
            None => Ok(()),
            Some((k, _)) => Err(Fault::type_error(format!(
                "'{k}' is an invalid keyword argument for {}()",
                self.name
            ))),
        }
    }

    fn str_at(&self, idx: usize) -> Result<&str, Fault> {
        match self.pos.get(idx) {
            Some(Value::Str(s)) => Ok(s),
            Some(other) => Err(Fault::type_error(format!(
                "{}() argument {} must be str, not {}",
                self.name,
                idx + 1,
                other.type_name()
            ))),
            None => Err(Fault::type_error(format!("{}() missing argument", self.name))),
        }
    }

    fn int_at(&self, idx: usize) -> Result<i64, Fault> {
        match self.pos.get(idx) {
            Some(Value::Int(n)) => Ok(*n),
            Some(Value::Bool(b)) => Ok(i64::from(*b)),
            Some(other) => Err(Fault::type_error(format!(
                "'{}' object cannot be interpreted as an integer",
                other.type_name()
            ))),
            None => Err(Fault::type_error(format!("{}() missing argument", self.name))),
        }
    }

    fn float_at(&self, idx: usize) -> Result<f64, Fault> {
        match self.pos.get(idx) {
            Some(v) => v.as_f64(self.name).map_err(|_| {
                Fault::type_error(format!(
                    "must be real number, not {}",
                    v.type_name()
                ))
            }),
            None => Err(Fault::type_error(format!("{}() missing argument", self.name))),
        }
    }
}

fn cmp_values(a: &Value, b: &Value) -> Result<Ordering, Fault> {
    Ok(a.compare(b, "<")?.unwrap_or(Ordering::Equal))
}

/// Stable sort with a fallible comparison; the first failure wins.
fn sort_values(items: &mut [Value], reverse: bool) -> Result<(), Fault> {
    let mut failure = None;
    items.sort_by(|a, b| {
        let ord = cmp_values(a, b).unwrap_or_else(|e| {
            failure.get_or_insert(e);
            Ordering::Equal
        });
        if reverse {
            ord.reverse()
        } else {
            ord
        }
    });
    failure.map_or(Ok(()), Err)
}

// ── Functions ─────────────────────────────────────────────────────────────────

/// Invoke a global or module built-in.
pub fn call_builtin(
    name: &'static str,
    pos: Vec<Value>,
    kw: Vec<(String, Value)>,
    io: &ScriptStreams,
) -> Result<Value, Unwind> {
    let mut args = Args { name, pos, kw };
    match name {
        "print" => {
            let sep = text_kwarg(&mut args, "sep", " ")?;
            let end = text_kwarg(&mut args, "end", "\n")?;
            args.kwarg("flush");
            args.finish()?;
            let mut text = args
                .pos
                .iter()
                .map(Value::to_string)
                .collect::<Vec<_>>()
                .join(&sep);
            text.push_str(&end);
            if !text.is_empty() {
                io.write(&text);
            }
            Ok(Value::None)
        }
        "input" => {
            args.finish()?;
            args.arity(0, 1)?;
            let prompt = args.pos.first().map(Value::to_string).unwrap_or_default();
            match io.read_line(&prompt) {
                Ok(line) => Ok(Value::Str(line)),
                Err(e) => Err(input_failure(e)),
            }
        }
        "exit" | "quit" => {
            args.finish()?;
            args.arity(0, 1)?;
            match args.pos.into_iter().next() {
                None | Some(Value::None) => Err(Unwind::Exit(0)),
                Some(Value::Int(n)) => Err(Unwind::Exit(n)),
                Some(Value::Bool(b)) => Err(Unwind::Exit(i64::from(b))),
                Some(other) => {
                    io.write(&format!("{other}\n"));
                    Err(Unwind::Exit(1))
                }
            }
        }
        _ => Ok(call_pure(&mut args, io)?),
    }
}

fn text_kwarg(args: &mut Args, key: &str, default: &str) -> Result<String, Fault> {
    match args.kwarg(key) {
        None | Some(Value::None) => Ok(default.to_owned()),
        Some(Value::Str(s)) => Ok(s),
        Some(other) => Err(Fault::type_error(format!(
            "{key} must be None or a string, not {}",
            other.type_name()
        ))),
    }
}

/// Map an input failure to what the script observes.
fn input_failure(err: InputError) -> Unwind {
    match err {
        InputError::Cancelled => Unwind::Halted,
        InputError::Stalled(d) => Unwind::Fault(Fault::new(
            FaultKind::EOFError,
            format!("no input received within {} seconds", d.as_secs_f64()),
        )),
        InputError::AlreadyPending => Unwind::Fault(Fault::new(
            FaultKind::RuntimeError,
            "an input request is already pending",
        )),
        InputError::NoSurface | InputError::Display(_) => {
            Unwind::Fault(Fault::new(FaultKind::EOFError, "EOF when reading a line"))
        }
    }
}

fn call_pure(args: &mut Args, io: &ScriptStreams) -> Result<Value, Unwind> {
    let name = args.name;
    if name.contains('.') {
        return call_module_fn(args, io);
    }
    if name != "sorted" {
        args.finish()?;
    }
    Ok(match name {
        "str" => {
            args.arity(0, 1)?;
            Value::Str(args.pos.first().map(Value::to_string).unwrap_or_default())
        }
        "int" => {
            args.arity(0, 2)?;
            match args.pos.as_slice() {
                [] => Value::Int(0),
                [v] => v.to_int()?,
                [Value::Str(s), _] => parse_int_base(s, args.int_at(1)?)?,
                _ => {
                    return Err(Fault::type_error(
                        "int() can't convert non-string with explicit base",
                    )
                    .into())
                }
            }
        }
        "float" => {
            args.arity(0, 1)?;
            match args.pos.first() {
                None => Value::Float(0.0),
                Some(v) => v.to_float()?,
            }
        }
        "bool" => {
            args.arity(0, 1)?;
            Value::Bool(args.pos.first().is_some_and(Value::truthy))
        }
        "len" => {
            args.arity(1, 1)?;
            Value::Int(args.pos[0].len()? as i64)
        }
        "range" => {
            args.arity(1, 3)?;
            let (start, stop, step) = match args.pos.len() {
                1 => (0, args.int_at(0)?, 1),
                2 => (args.int_at(0)?, args.int_at(1)?, 1),
                _ => (args.int_at(0)?, args.int_at(1)?, args.int_at(2)?),
            };
            if step == 0 {
                return Err(Fault::value_error("range() arg 3 must not be zero").into());
            }
            Value::Range { start, stop, step }
        }
        "abs" => {
            args.arity(1, 1)?;
            match &args.pos[0] {
                Value::Int(n) => Value::Int(n.checked_abs().ok_or_else(Fault::overflow)?),
                Value::Bool(b) => Value::Int(i64::from(*b)),
                Value::Float(x) => Value::Float(x.abs()),
                other => {
                    return Err(Fault::type_error(format!(
                        "bad operand type for abs(): '{}'",
                        other.type_name()
                    ))
                    .into())
                }
            }
        }
        "min" | "max" => {
            if args.pos.is_empty() {
                return Err(Fault::type_error(format!(
                    "{name} expected at least 1 argument, got 0"
                ))
                .into());
            }
            let items = if args.pos.len() == 1 {
                args.pos[0].iter_values()?
            } else {
                std::mem::take(&mut args.pos)
            };
            let mut best: Option<Value> = None;
            for item in items {
                best = Some(match best {
                    None => item,
                    Some(cur) => {
                        let ord = cmp_values(&item, &cur)?;
                        let better = if name == "min" {
                            ord == Ordering::Less
                        } else {
                            ord == Ordering::Greater
                        };
                        if better {
                            item
                        } else {
                            cur
                        }
                    }
                });
            }
            best.ok_or_else(|| Fault::value_error(format!("{name}() arg is an empty sequence")))?
        }
        "sum" => {
            args.arity(1, 2)?;
            let mut acc = args.pos.get(1).cloned().unwrap_or(Value::Int(0));
            if matches!(acc, Value::Str(_)) {
                return Err(Fault::type_error(
                    "sum() can't sum strings [use ''.join(seq) instead]",
                )
                .into());
            }
            for item in args.pos[0].iter_values()? {
                acc = acc.add(&item)?;
            }
            acc
        }
        "round" => {
            args.arity(1, 2)?;
            let digits = match args.pos.get(1) {
                None | Some(Value::None) => None,
                Some(_) => Some(args.int_at(1)?),
            };
            round_value(&args.pos[0], digits)?
        }
        "type" => {
            args.arity(1, 1)?;
            Value::Str(format!("<class '{}'>", args.pos[0].type_name()))
        }
        "list" => {
            args.arity(0, 1)?;
            match args.pos.first() {
                None => Value::List(Vec::new()),
                Some(v) => Value::List(v.iter_values()?),
            }
        }
        "sorted" => {
            let reverse = args.kwarg("reverse").is_some_and(|v| v.truthy());
            args.finish()?;
            args.arity(1, 1)?;
            let mut items = args.pos[0].iter_values()?;
            sort_values(&mut items, reverse)?;
            Value::List(items)
        }
        "chr" => {
            args.arity(1, 1)?;
            let code = args.int_at(0)?;
            let c = u32::try_from(code)
                .ok()
                .and_then(char::from_u32)
                .ok_or_else(|| Fault::value_error("chr() arg not in range(0x110000)"))?;
            Value::Str(c.to_string())
        }
        "ord" => {
            args.arity(1, 1)?;
            let s = args.str_at(0).map_err(|_| {
                Fault::type_error(format!(
                    "ord() expected string of length 1, but {} found",
                    args.pos[0].type_name()
                ))
            })?;
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Value::Int(i64::from(u32::from(c))),
                _ => {
                    return Err(Fault::type_error(format!(
                        "ord() expected a character, but string of length {} found",
                        s.chars().count()
                    ))
                    .into())
                }
            }
        }
        other => {
            return Err(Fault::name_error(other).into());
        }
    })
}

fn parse_int_base(s: &str, base: i64) -> Result<Value, Fault> {
    let invalid = || {
        Fault::value_error(format!(
            "invalid literal for int() with base {base}: {}",
            Value::Str(s.to_owned()).repr()
        ))
    };
    if !(2..=36).contains(&base) {
        return Err(Fault::value_error("int() base must be >= 2 and <= 36, or 0"));
    }
    let t = s.trim().replace('_', "");
    let (neg, digits) = match t.strip_prefix('-') {
        Some(rest) => (true, rest.to_owned()),
        None => (false, t.trim_start_matches('+').to_owned()),
    };
    let lower = digits.to_ascii_lowercase();
    let digits = match base {
        16 => lower.strip_prefix("0x").unwrap_or(&lower),
        8 => lower.strip_prefix("0o").unwrap_or(&lower),
        2 => lower.strip_prefix("0b").unwrap_or(&lower),
        _ => &lower,
    };
    let n = i64::from_str_radix(digits, base as u32).map_err(|_| invalid())?;
    Ok(Value::Int(if neg { -n } else { n }))
}

fn round_value(v: &Value, digits: Option<i64>) -> Result<Value, Fault> {
    match (v, digits) {
        (Value::Int(n), None) => Ok(Value::Int(*n)),
        (Value::Bool(b), None) => Ok(Value::Int(i64::from(*b))),
        (Value::Int(n), Some(d)) if d >= 0 => Ok(Value::Int(*n)),
        (Value::Int(n), Some(d)) => {
            // |n| < 5 * 10^19, so past 10^20 everything rounds to zero.
            let exp = u32::try_from(-d).unwrap_or(u32::MAX);
            if exp >= 20 {
                return Ok(Value::Int(0));
            }
            let scale = 10i128.pow(exp);
            let n = i128::from(*n);
            let (q, r) = (n.div_euclid(scale), n.rem_euclid(scale));
            let q = match (2 * r).cmp(&scale) {
                Ordering::Greater => q + 1,
                Ordering::Equal if q % 2 != 0 => q + 1,
                _ => q,
            };
            i64::try_from(q * scale)
                .map(Value::Int)
                .map_err(|_| Fault::new(FaultKind::OverflowError, "int too large to convert"))
        }
        (Value::Float(x), None) => {
            let r = x.round_ties_even();
            Value::Float(r).to_int()
        }
        (Value::Float(x), Some(d)) => {
            let d = i32::try_from(d.clamp(-400, 400)).unwrap_or(0);
            let scale = 10f64.powi(d);
            let r = (x * scale).round_ties_even() / scale;
            Ok(Value::Float(if r.is_finite() { r } else { *x }))
        }
        (other, _) => Err(Fault::type_error(format!(
            "type {} doesn't define __round__ method",
            other.type_name()
        ))),
    }
}

// ── Modules ───────────────────────────────────────────────────────────────────

/// `import name`.
pub fn import_module(name: &str) -> Result<Value, Fault> {
    MODULES
        .iter()
        .find(|m| **m == name)
        .copied()
        .map(Value::Module)
        .ok_or_else(|| {
            Fault::new(
                FaultKind::ModuleNotFoundError,
                format!("No module named '{name}'"),
            )
        })
}

/// `module.attr`.
pub fn module_attr(module: &str, attr: &str) -> Result<Value, Fault> {
    let constant = match (module, attr) {
        ("math", "pi") => Some(std::f64::consts::PI),
        ("math", "e") => Some(std::f64::consts::E),
        ("math", "tau") => Some(std::f64::consts::TAU),
        ("math", "inf") => Some(f64::INFINITY),
        _ => None,
    };
    if let Some(x) = constant {
        return Ok(Value::Float(x));
    }
    MODULE_FUNCTIONS
        .iter()
        .find(|f| f.split_once('.') == Some((module, attr)))
        .copied()
        .map(Value::Builtin)
        .ok_or_else(|| {
            Fault::new(
                FaultKind::AttributeError,
                format!("module '{module}' has no attribute '{attr}'"),
            )
        })
}

/// Every public name of a module, for `from module import *`.
pub fn module_exports(module: &str) -> Vec<(String, Value)> {
    let mut names: Vec<&str> = MODULE_FUNCTIONS
        .iter()
        .filter_map(|f| f.split_once('.'))
        .filter(|(m, _)| *m == module)
        .map(|(_, n)| n)
        .collect();
    if module == "math" {
        names.extend(["pi", "e", "tau", "inf"]);
    }
    names
        .into_iter()
        .filter_map(|n| module_attr(module, n).ok().map(|v| (n.to_owned(), v)))
        .collect()
}

fn call_module_fn(args: &mut Args, io: &ScriptStreams) -> Result<Value, Unwind> {
    args.finish()?;
    let name = args.name;
    let domain = || Fault::value_error("math domain error");
    let unary = |args: &Args, f: fn(f64) -> f64| -> Result<Value, Fault> {
        args.arity(1, 1)?;
        Ok(Value::Float(f(args.float_at(0)?)))
    };
    Ok(match name {
        "math.sqrt" => {
            args.arity(1, 1)?;
            let x = args.float_at(0)?;
            if x < 0.0 {
                return Err(domain().into());
            }
            Value::Float(x.sqrt())
        }
        "math.floor" | "math.ceil" | "math.trunc" => {
            args.arity(1, 1)?;
            if let Value::Int(n) = args.pos[0] {
                return Ok(Value::Int(n));
            }
            let x = args.float_at(0)?;
            let r = match name {
                "math.floor" => x.floor(),
                "math.ceil" => x.ceil(),
                _ => x.trunc(),
            };
            Value::Float(r).to_int()?
        }
        "math.pow" => {
            args.arity(2, 2)?;
            Value::Float(args.float_at(0)?.powf(args.float_at(1)?))
        }
        "math.fabs" => unary(&*args, f64::abs)?,
        "math.exp" => unary(&*args, f64::exp)?,
        "math.sin" => unary(&*args, f64::sin)?,
        "math.cos" => unary(&*args, f64::cos)?,
        "math.tan" => unary(&*args, f64::tan)?,
        "math.log" | "math.log10" => {
            args.arity(1, if name == "math.log" { 2 } else { 1 })?;
            let x = args.float_at(0)?;
            if x <= 0.0 {
                return Err(domain().into());
            }
            match (name, args.pos.len()) {
                ("math.log10", _) => Value::Float(x.log10()),
                (_, 2) => {
                    let base = args.float_at(1)?;
                    if base <= 0.0 || base == 1.0 {
                        return Err(domain().into());
                    }
                    Value::Float(x.ln() / base.ln())
                }
                _ => Value::Float(x.ln()),
            }
        }
        "time.time" => {
            args.arity(0, 0)?;
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs_f64())
                .unwrap_or(0.0);
            Value::Float(now)
        }
        "time.sleep" => {
            args.arity(1, 1)?;
            let secs = args.float_at(0)?;
            if secs.is_nan() || secs < 0.0 {
                return Err(Fault::value_error("sleep length must be non-negative").into());
            }
            let deadline = Instant::now() + Duration::from_secs_f64(secs.min(1e9));
            loop {
                if io.is_halted() {
                    return Err(Unwind::Halted);
                }
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                std::thread::sleep(SLEEP_SLICE.min(deadline - now));
            }
            Value::None
        }
        other => return Err(Fault::name_error(other).into()),
    })
}

// ── Methods ───────────────────────────────────────────────────────────────────

/// Whether `value` has a built-in method called `name`.
pub fn has_method(value: &Value, name: &str) -> bool {
    match value {
        Value::Str(_) => STR_METHODS.contains(&name),
        Value::List(_) => LIST_METHODS.contains(&name),
        _ => false,
    }
}

/// Invoke `receiver.name(args)`.  Returns the result and whether the receiver
/// was mutated in place (so the caller can write it back).
pub fn call_method(
    receiver: &mut Value,
    name: &str,
    pos: Vec<Value>,
    kw: Vec<(String, Value)>,
) -> Result<(Value, bool), Fault> {
    let known: &[&'static str] = match receiver {
        Value::Str(_) => STR_METHODS,
        Value::List(_) => LIST_METHODS,
        _ => &[],
    };
    let method = known
        .iter()
        .find(|m| **m == name)
        .copied()
        .ok_or_else(|| super::expr::attribute_error(&*receiver, name))?;
    let mut args = Args {
        name: method,
        pos,
        kw,
    };
    match receiver {
        Value::Str(s) => str_method(s, &mut args).map(|v| (v, false)),
        Value::List(items) => list_method(items, &mut args),
        other => Err(super::expr::attribute_error(other, name)),
    }
}

fn str_method(s: &str, args: &mut Args) -> Result<Value, Fault> {
    if args.name != "format" && args.name != "split" {
        args.finish()?;
    }
    let strip_set = |args: &Args| -> Result<Option<Vec<char>>, Fault> {
        args.arity(0, 1)?;
        match args.pos.first() {
            None | Some(Value::None) => Ok(None),
            Some(_) => Ok(Some(args.str_at(0)?.chars().collect())),
        }
    };
    Ok(match args.name {
        "upper" => Value::Str(s.to_uppercase()),
        "lower" => Value::Str(s.to_lowercase()),
        "strip" => Value::Str(match strip_set(&*args)? {
            None => s.trim().to_owned(),
            Some(set) => s.trim_matches(|c| set.contains(&c)).to_owned(),
        }),
        "lstrip" => Value::Str(match strip_set(&*args)? {
            None => s.trim_start().to_owned(),
            Some(set) => s.trim_start_matches(|c| set.contains(&c)).to_owned(),
        }),
        "rstrip" => Value::Str(match strip_set(&*args)? {
            None => s.trim_end().to_owned(),
            Some(set) => s.trim_end_matches(|c| set.contains(&c)).to_owned(),
        }),
        "split" => {
            let sep = args.kwarg("sep");
            let maxsplit = args.kwarg("maxsplit");
            args.finish()?;
            args.arity(0, 2)?;
            let sep = match sep.or_else(|| args.pos.first().cloned()) {
                None | Some(Value::None) => None,
                Some(Value::Str(sep)) if sep.is_empty() => {
                    return Err(Fault::value_error("empty separator"))
                }
                Some(Value::Str(sep)) => Some(sep),
                Some(other) => {
                    return Err(Fault::type_error(format!(
                        "must be str or None, not {}",
                        other.type_name()
                    )))
                }
            };
            let limit = match maxsplit.or_else(|| args.pos.get(1).cloned()) {
                None => -1,
                Some(v) => v.as_index("maxsplit")?,
            };
            let parts: Vec<String> = match (sep, limit) {
                (None, n) if n < 0 => s.split_whitespace().map(str::to_owned).collect(),
                (None, n) => split_whitespace_n(s, n as usize),
                (Some(sep), n) if n < 0 => s.split(sep.as_str()).map(str::to_owned).collect(),
                (Some(sep), n) => s
                    .splitn(n as usize + 1, sep.as_str())
                    .map(str::to_owned)
                    .collect(),
            };
            Value::List(parts.into_iter().map(Value::Str).collect())
        }
        "join" => {
            args.arity(1, 1)?;
            let mut parts = Vec::new();
            for (i, item) in args.pos[0].iter_values()?.into_iter().enumerate() {
                match item {
                    Value::Str(p) => parts.push(p),
                    other => {
                        return Err(Fault::type_error(format!(
                            "sequence item {i}: expected str instance, {} found",
                            other.type_name()
                        )))
                    }
                }
            }
            Value::Str(parts.join(s))
        }
        "replace" => {
            args.arity(2, 3)?;
            let (old, new) = (args.str_at(0)?, args.str_at(1)?);
            match args.pos.get(2) {
                None => Value::Str(s.replace(old, new)),
                Some(_) => {
                    let count = args.int_at(2)?;
                    if count < 0 {
                        Value::Str(s.replace(old, new))
                    } else {
                        Value::Str(s.replacen(old, new, count as usize))
                    }
                }
            }
        }
        "startswith" => {
            args.arity(1, 1)?;
            Value::Bool(s.starts_with(args.str_at(0)?))
        }
        "endswith" => {
            args.arity(1, 1)?;
            Value::Bool(s.ends_with(args.str_at(0)?))
        }
        "find" => {
            args.arity(1, 1)?;
            let idx = s
                .find(args.str_at(0)?)
                .map_or(-1, |byte| s[..byte].chars().count() as i64);
            Value::Int(idx)
        }
        "count" => {
            args.arity(1, 1)?;
            let needle = args.str_at(0)?;
            let n = if needle.is_empty() {
                s.chars().count() + 1
            } else {
                s.matches(needle).count()
            };
            Value::Int(n as i64)
        }
        "isdigit" => {
            args.arity(0, 0)?;
            Value::Bool(!s.is_empty() && s.chars().all(|c| c.is_ascii_digit()))
        }
        "isalpha" => {
            args.arity(0, 0)?;
            Value::Bool(!s.is_empty() && s.chars().all(char::is_alphabetic))
        }
        "title" => {
            args.arity(0, 0)?;
            let mut out = String::with_capacity(s.len());
            let mut prev_cased = false;
            for c in s.chars() {
                if prev_cased {
                    out.extend(c.to_lowercase());
                } else {
                    out.extend(c.to_uppercase());
                }
                prev_cased = c.is_alphabetic();
            }
            Value::Str(out)
        }
        "capitalize" => {
            args.arity(0, 0)?;
            let mut chars = s.chars();
            Value::Str(match chars.next() {
                None => String::new(),
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect(),
            })
        }
        "format" => {
            let kw = std::mem::take(&mut args.kw);
            Value::Str(format_str(s, &args.pos, &kw)?)
        }
        other => return Err(Fault::type_error(format!("str.{other} is not supported"))),
    })
}

fn split_whitespace_n(s: &str, max: usize) -> Vec<String> {
    let mut parts = Vec::new();
    let mut rest = s.trim_start();
    while !rest.is_empty() {
        if parts.len() == max {
            parts.push(rest.to_owned());
            break;
        }
        match rest.find(char::is_whitespace) {
            Some(end) => {
                parts.push(rest[..end].to_owned());
                rest = rest[end..].trim_start();
            }
            None => {
                parts.push(rest.to_owned());
                break;
            }
        }
    }
    parts
}

/// `str.format` with `{}`, `{0}`, `{name}` fields and a small format-spec
/// subset: `[0][width][,][.precision][d|f|s|%]`.
fn format_str(template: &str, pos: &[Value], kw: &[(String, Value)]) -> Result<String, Fault> {
    let mut out = String::new();
    let mut chars = template.chars().peekable();
    let mut auto = 0usize;
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '}' => return Err(Fault::value_error("Single '}' encountered in format string")),
            '{' => {
                let mut field = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(ch) => field.push(ch),
                        None => {
                            return Err(Fault::value_error(
                                "Single '{' encountered in format string",
                            ))
                        }
                    }
                }
                let (key, spec) = field.split_once(':').unwrap_or((&field, ""));
                let value = if key.is_empty() {
                    auto += 1;
                    pos.get(auto - 1)
                } else if let Ok(i) = key.parse::<usize>() {
                    pos.get(i)
                } else {
                    kw.iter().find(|(k, _)| k == key).map(|(_, v)| v)
                };
                let value = value.ok_or_else(|| {
                    if key.is_empty() || key.parse::<usize>().is_ok() {
                        Fault::index_error(format!(
                            "Replacement index {} out of range for positional args tuple",
                            if key.is_empty() { auto - 1 } else { key.parse().unwrap_or(0) }
                        ))
                    } else {
                        Fault::new(FaultKind::NameError, format!("'{key}'"))
                    }
                })?;
                out.push_str(&apply_spec(value, spec)?);
            }
            c => out.push(c),
        }
    }
    Ok(out)
}

fn apply_spec(value: &Value, spec: &str) -> Result<String, Fault> {
    if spec.is_empty() {
        return Ok(value.to_string());
    }
    let bad = || Fault::value_error(format!("Invalid format specifier '{spec}'"));
    let mut rest = spec;

    let mut fill = ' ';
    let mut align = None;
    let head: Vec<char> = spec.chars().take(2).collect();
    if head.len() == 2 && matches!(head[1], '<' | '>' | '^') {
        fill = head[0];
        align = Some(head[1]);
        rest = &spec[head[0].len_utf8() + 1..];
    } else if matches!(head.first(), Some('<' | '>' | '^')) {
        align = Some(head[0]);
        rest = &spec[1..];
    }
    let zero = align.is_none() && rest.starts_with('0');

    let width_len = rest.chars().take_while(char::is_ascii_digit).count();
    let width: usize = if width_len > 0 {
        rest[..width_len].parse().map_err(|_| bad())?
    } else {
        0
    };
    rest = &rest[width_len..];
    let grouping = rest.starts_with(',');
    if grouping {
        rest = &rest[1..];
    }
    let precision = match rest.strip_prefix('.') {
        Some(p) => {
            let n = p.chars().take_while(char::is_ascii_digit).count();
            let prec: usize = p[..n].parse().map_err(|_| bad())?;
            rest = &p[n..];
            Some(prec)
        }
        None => None,
    };

    let numeric = matches!(value, Value::Int(_) | Value::Float(_) | Value::Bool(_));
    let body = match (rest, value) {
        ("" | "s", v) if !numeric || precision.is_none() => {
            let s = v.to_string();
            match precision {
                Some(p) => s.chars().take(p).collect(),
                None => s,
            }
        }
        ("d", Value::Int(n)) => n.to_string(),
        ("d", v) => {
            return Err(Fault::value_error(format!(
                "Unknown format code 'd' for object of type '{}'",
                v.type_name()
            )))
        }
        ("f" | "" | "%", v) if numeric => {
            let x = v.as_f64("format")?;
            let prec = precision.unwrap_or(6);
            if rest == "%" {
                format!("{:.*}%", prec, x * 100.0)
            } else {
                format!("{x:.prec$}")
            }
        }
        _ => return Err(bad()),
    };
    let body = if grouping { group_thousands(&body) } else { body };

    let len = body.chars().count();
    if len >= width {
        return Ok(body);
    }
    let pad = width - len;
    let run = |c: char, n: usize| -> String { std::iter::repeat(c).take(n).collect() };
    if zero && numeric {
        return Ok(match body.strip_prefix('-') {
            Some(digits) => format!("-{}{digits}", run('0', pad)),
            None => format!("{}{body}", run('0', pad)),
        });
    }
    let align = align.unwrap_or(if numeric { '>' } else { '<' });
    Ok(match align {
        '>' => format!("{}{body}", run(fill, pad)),
        '^' => format!("{}{body}{}", run(fill, pad / 2), run(fill, pad - pad / 2)),
        _ => format!("{body}{}", run(fill, pad)),
    })
}

fn group_thousands(num: &str) -> String {
    let (sign, rest) = match num.strip_prefix('-') {
        Some(r) => ("-", r),
        None => ("", num),
    };
    let (int_part, frac) = match rest.find(|c: char| !c.is_ascii_digit()) {
        Some(i) => rest.split_at(i),
        None => (rest, ""),
    };
    let mut grouped = String::new();
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    format!("{sign}{grouped}{frac}")
}

fn list_method(items: &mut Vec<Value>, args: &mut Args) -> Result<(Value, bool), Fault> {
    if args.name != "sort" {
        args.finish()?;
    }
    Ok(match args.name {
        "append" => {
            args.arity(1, 1)?;
            items.push(args.pos.remove(0));
            (Value::None, true)
        }
        "extend" => {
            args.arity(1, 1)?;
            items.extend(args.pos[0].iter_values()?);
            (Value::None, true)
        }
        "insert" => {
            args.arity(2, 2)?;
            let len = items.len() as i64;
            let idx = args.int_at(0)?;
            let at = if idx < 0 { (idx + len).max(0) } else { idx.min(len) };
            items.insert(at as usize, args.pos.remove(1));
            (Value::None, true)
        }
        "pop" => {
            args.arity(0, 1)?;
            if items.is_empty() {
                return Err(Fault::index_error("pop from empty list"));
            }
            let len = items.len() as i64;
            let idx = if args.pos.is_empty() { -1 } else { args.int_at(0)? };
            let at = if idx < 0 { idx + len } else { idx };
            if !(0..len).contains(&at) {
                return Err(Fault::index_error("pop index out of range"));
            }
            (items.remove(at as usize), true)
        }
        "remove" => {
            args.arity(1, 1)?;
            let at = items
                .iter()
                .position(|v| v.py_eq(&args.pos[0]))
                .ok_or_else(|| Fault::value_error("list.remove(x): x not in list"))?;
            items.remove(at);
            (Value::None, true)
        }
        "index" => {
            args.arity(1, 1)?;
            let at = items
                .iter()
                .position(|v| v.py_eq(&args.pos[0]))
                .ok_or_else(|| {
                    Fault::value_error(format!("{} is not in list", args.pos[0].repr()))
                })?;
            (Value::Int(at as i64), false)
        }
        "count" => {
            args.arity(1, 1)?;
            let n = items.iter().filter(|v| v.py_eq(&args.pos[0])).count();
            (Value::Int(n as i64), false)
        }
        "sort" => {
            let reverse = args.kwarg("reverse").is_some_and(|v| v.truthy());
            args.finish()?;
            args.arity(0, 0)?;
            sort_values(items, reverse)?;
            (Value::None, true)
        }
        "reverse" => {
            args.arity(0, 0)?;
            items.reverse();
            (Value::None, true)
        }
        "clear" => {
            args.arity(0, 0)?;
            items.clear();
            (Value::None, true)
        }
        "copy" => {
            args.arity(0, 0)?;
            (Value::List(items.clone()), false)
        }
        other => return Err(Fault::type_error(format!("list.{other} is not supported"))),
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
