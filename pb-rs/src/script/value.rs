//! Runtime value type for the built-in script language.
//!
//! Values follow Python's data model closely enough that scripts produced by
//! the block editor behave as they would under CPython: `int`/`float`
//! promotion, `str` concatenation and repetition, truthiness, and the same
//! exception messages for type mismatches.  Lists are copied on assignment;
//! in-place list methods write back to the variable they were called on.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use super::fault::{Fault, FaultKind};
use super::stmt::FunctionDef;

/// Longest string (bytes) or list (items) a script may build.
pub const MAX_SEQUENCE_LEN: usize = 1 << 28;

/// A user-defined function with its default values evaluated at `def` time.
#[derive(Debug)]
pub struct Function {
    pub def: Arc<FunctionDef>,
    /// One slot per parameter; `None` where the parameter has no default.
    pub defaults: Vec<Option<Value>>,
}

/// A script runtime value.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    /// Lazy `range(start, stop, step)`.
    Range { start: i64, stop: i64, step: i64 },
    Function(Arc<Function>),
    Builtin(&'static str),
    /// An imported built-in module (`math`, `time`).
    Module(&'static str),
}

/// Numeric view of a value (`bool` counts as `int`).
#[derive(Debug, Clone, Copy)]
enum Num {
    I(i64),
    F(f64),
}

impl Num {
    fn as_f64(self) -> f64 {
        match self {
            Num::I(n) => n as f64,
            Num::F(x) => x,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => f.write_str("None"),
            Value::Bool(true) => f.write_str("True"),
            Value::Bool(false) => f.write_str("False"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(x) => f.write_str(&format_float(*x)),
            Value::Str(s) => f.write_str(s),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    f.write_str(&item.repr())?;
                }
                f.write_str("]")
            }
            Value::Range { start, stop, step: 1 } => write!(f, "range({start}, {stop})"),
            Value::Range { start, stop, step } => write!(f, "range({start}, {stop}, {step})"),
            Value::Function(func) => write!(f, "<function {}>", func.def.name),
            Value::Builtin(name) => write!(f, "<built-in function {name}>"),
            Value::Module(name) => write!(f, "<module '{name}' (built-in)>"),
        }
    }
}

/// Format a float the way Python's `repr` does.
pub fn format_float(x: f64) -> String {
    if x.is_nan() {
        return "nan".to_owned();
    }
    if x.is_infinite() {
        return if x > 0.0 { "inf" } else { "-inf" }.to_owned();
    }
    let abs = x.abs();
    if abs != 0.0 && !(1e-4..1e16).contains(&abs) {
        let s = format!("{x:e}");
        let (mantissa, exp) = s.split_once('e').unwrap_or((&s, "0"));
        let exp: i32 = exp.parse().unwrap_or(0);
        let sign = if exp < 0 { '-' } else { '+' };
        return format!("{mantissa}e{sign}{:02}", exp.abs());
    }
    let s = format!("{x}");
    if s.contains('.') {
        s
    } else {
        s + ".0"
    }
}

/// Quote a string the way Python's `repr` does.
fn repr_str(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') { '"' } else { '\'' };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

impl Value {
    /// Python's `repr()`: strings are quoted, everything else matches `str()`.
    pub fn repr(&self) -> String {
        match self {
            Value::Str(s) => repr_str(s),
            other => other.to_string(),
        }
    }

    /// Name of the type, as shown by `type()` and in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Range { .. } => "range",
            Value::Function(_) => "function",
            Value::Builtin(_) => "builtin_function_or_method",
            Value::Module(_) => "module",
        }
    }

    /// Python truthiness.
    pub fn truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(x) => *x != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Range { start, stop, step } => range_len(*start, *stop, *step) > 0,
            Value::Function(_) | Value::Builtin(_) | Value::Module(_) => true,
        }
    }

    fn num(&self) -> Option<Num> {
        match self {
            Value::Bool(b) => Some(Num::I(i64::from(*b))),
            Value::Int(n) => Some(Num::I(*n)),
            Value::Float(x) => Some(Num::F(*x)),
            _ => None,
        }
    }

    /// Integer view used for indices, counts and `range()` bounds.
    pub fn as_index(&self, what: &str) -> Result<i64, Fault> {
        match self {
            Value::Bool(b) => Ok(i64::from(*b)),
            Value::Int(n) => Ok(*n),
            other => Err(Fault::type_error(format!(
                "{what} must be integers, not {}",
                other.type_name()
            ))),
        }
    }

    /// Numeric view as `f64`, or a `TypeError` naming the operation.
    pub fn as_f64(&self, what: &str) -> Result<f64, Fault> {
        self.num().map(Num::as_f64).ok_or_else(|| {
            Fault::type_error(format!(
                "{what} requires a number, not '{}'",
                self.type_name()
            ))
        })
    }

    fn unsupported(op: &str, a: &Value, b: &Value) -> Fault {
        Fault::type_error(format!(
            "unsupported operand type(s) for {op}: '{}' and '{}'",
            a.type_name(),
            b.type_name()
        ))
    }

    // ── Arithmetic ────────────────────────────────────────────────────────────

    pub fn add(&self, rhs: &Value) -> Result<Value, Fault> {
        match (self, rhs) {
            (Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{a}{b}"))),
            (Value::List(a), Value::List(b)) => {
                Ok(Value::List(a.iter().chain(b.iter()).cloned().collect()))
            }
            (Value::Str(_), other) => Err(Fault::type_error(format!(
                "can only concatenate str (not \"{}\") to str",
                other.type_name()
            ))),
            (Value::List(_), other) => Err(Fault::type_error(format!(
                "can only concatenate list (not \"{}\") to list",
                other.type_name()
            ))),
            _ => match (self.num(), rhs.num()) {
                (Some(Num::I(a)), Some(Num::I(b))) => {
                    a.checked_add(b).map(Value::Int).ok_or_else(Fault::overflow)
                }
                (Some(a), Some(b)) => Ok(Value::Float(a.as_f64() + b.as_f64())),
                _ => Err(Self::unsupported("+", self, rhs)),
            },
        }
    }

    pub fn sub(&self, rhs: &Value) -> Result<Value, Fault> {
        match (self.num(), rhs.num()) {
            (Some(Num::I(a)), Some(Num::I(b))) => {
                a.checked_sub(b).map(Value::Int).ok_or_else(Fault::overflow)
            }
            (Some(a), Some(b)) => Ok(Value::Float(a.as_f64() - b.as_f64())),
            _ => Err(Self::unsupported("-", self, rhs)),
        }
    }

    pub fn mul(&self, rhs: &Value) -> Result<Value, Fault> {
        match (self, rhs) {
            (Value::Str(s), n) | (n, Value::Str(s)) if matches!(n, Value::Int(_) | Value::Bool(_)) => {
                let count = n.as_index("repeat count")?.max(0) as usize;
                check_len(s.len(), count)?;
                Ok(Value::Str(s.repeat(count)))
            }
            (Value::List(items), n) | (n, Value::List(items))
                if matches!(n, Value::Int(_) | Value::Bool(_)) =>
            {
                let count = n.as_index("repeat count")?.max(0) as usize;
                check_len(items.len(), count)?;
                let mut out = Vec::with_capacity(items.len() * count);
                for _ in 0..count {
                    out.extend(items.iter().cloned());
                }
                Ok(Value::List(out))
            }
            _ => match (self.num(), rhs.num()) {
                (Some(Num::I(a)), Some(Num::I(b))) => {
                    a.checked_mul(b).map(Value::Int).ok_or_else(Fault::overflow)
                }
                (Some(a), Some(b)) => Ok(Value::Float(a.as_f64() * b.as_f64())),
                _ => Err(Self::unsupported("*", self, rhs)),
            },
        }
    }

    /// `/` — always produces a float.
    pub fn true_div(&self, rhs: &Value) -> Result<Value, Fault> {
        match (self.num(), rhs.num()) {
            (Some(Num::I(_)), Some(Num::I(0))) => Err(Fault::zero_division("division by zero")),
            (Some(_), Some(b)) if b.as_f64() == 0.0 => {
                Err(Fault::zero_division("float division by zero"))
            }
            (Some(a), Some(b)) => Ok(Value::Float(a.as_f64() / b.as_f64())),
            _ => Err(Self::unsupported("/", self, rhs)),
        }
    }

    /// `//` — floor division.
    pub fn floor_div(&self, rhs: &Value) -> Result<Value, Fault> {
        match (self.num(), rhs.num()) {
            (Some(Num::I(_)), Some(Num::I(0))) => {
                Err(Fault::zero_division("integer division or modulo by zero"))
            }
            (Some(Num::I(a)), Some(Num::I(b))) => {
                let q = a.checked_div(b).ok_or_else(Fault::overflow)?;
                let adjust = a % b != 0 && ((a < 0) != (b < 0));
                Ok(Value::Int(if adjust { q - 1 } else { q }))
            }
            (Some(_), Some(b)) if b.as_f64() == 0.0 => {
                Err(Fault::zero_division("float floor division by zero"))
            }
            (Some(a), Some(b)) => Ok(Value::Float((a.as_f64() / b.as_f64()).floor())),
            _ => Err(Self::unsupported("//", self, rhs)),
        }
    }

    /// `%` — modulo with the sign of the divisor.
    pub fn rem(&self, rhs: &Value) -> Result<Value, Fault> {
        match (self.num(), rhs.num()) {
            (Some(Num::I(_)), Some(Num::I(0))) => {
                Err(Fault::zero_division("integer division or modulo by zero"))
            }
            (Some(Num::I(a)), Some(Num::I(b))) => {
                let r = a.checked_rem(b).ok_or_else(Fault::overflow)?;
                Ok(Value::Int(if r != 0 && ((r < 0) != (b < 0)) { r + b } else { r }))
            }
            (Some(_), Some(b)) if b.as_f64() == 0.0 => Err(Fault::zero_division("float modulo")),
            (Some(a), Some(b)) => {
                let (a, b) = (a.as_f64(), b.as_f64());
                let r = a % b;
                Ok(Value::Float(if r != 0.0 && ((r < 0.0) != (b < 0.0)) { r + b } else { r }))
            }
            _ => Err(Self::unsupported("%", self, rhs)),
        }
    }

    /// `**`.
    pub fn pow(&self, rhs: &Value) -> Result<Value, Fault> {
        match (self.num(), rhs.num()) {
            (Some(Num::I(a)), Some(Num::I(b))) if b >= 0 => {
                let exp = u32::try_from(b).map_err(|_| Fault::overflow())?;
                a.checked_pow(exp).map(Value::Int).ok_or_else(Fault::overflow)
            }
            (Some(a), Some(b)) => {
                let (a, b) = (a.as_f64(), b.as_f64());
                if a == 0.0 && b < 0.0 {
                    return Err(Fault::zero_division(
                        "0.0 cannot be raised to a negative power",
                    ));
                }
                Ok(Value::Float(a.powf(b)))
            }
            _ => Err(Self::unsupported("** or pow()", self, rhs)),
        }
    }

    pub fn neg(&self) -> Result<Value, Fault> {
        match self.num() {
            Some(Num::I(n)) => n.checked_neg().map(Value::Int).ok_or_else(Fault::overflow),
            Some(Num::F(x)) => Ok(Value::Float(-x)),
            None => Err(Fault::type_error(format!(
                "bad operand type for unary -: '{}'",
                self.type_name()
            ))),
        }
    }

    pub fn pos(&self) -> Result<Value, Fault> {
        match self.num() {
            Some(Num::I(n)) => Ok(Value::Int(n)),
            Some(Num::F(x)) => Ok(Value::Float(x)),
            None => Err(Fault::type_error(format!(
                "bad operand type for unary +: '{}'",
                self.type_name()
            ))),
        }
    }

    // ── Comparison ────────────────────────────────────────────────────────────

    /// `==` semantics: numbers compare by value across `int`/`float`/`bool`.
    pub fn py_eq(&self, rhs: &Value) -> bool {
        match (self, rhs) {
            (Value::None, Value::None) => true,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.py_eq(y))
            }
            (Value::Function(a), Value::Function(b)) => Arc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => a == b,
            (Value::Module(a), Value::Module(b)) => a == b,
            (
                Value::Range { start: a0, stop: a1, step: a2 },
                Value::Range { start: b0, stop: b1, step: b2 },
            ) => {
                let (la, lb) = (range_len(*a0, *a1, *a2), range_len(*b0, *b1, *b2));
                la == lb && (la == 0 || (a0 == b0 && (la == 1 || a2 == b2)))
            }
            _ => match (self.num(), rhs.num()) {
                (Some(Num::I(a)), Some(Num::I(b))) => a == b,
                (Some(a), Some(b)) => a.as_f64() == b.as_f64(),
                _ => false,
            },
        }
    }

    /// Ordering for `<`, `<=`, `>`, `>=`; `None` when unordered (NaN).
    pub fn compare(&self, rhs: &Value, op: &str) -> Result<Option<Ordering>, Fault> {
        match (self, rhs) {
            (Value::Str(a), Value::Str(b)) => Ok(Some(a.cmp(b))),
            (Value::List(a), Value::List(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    if !x.py_eq(y) {
                        return x.compare(y, op);
                    }
                }
                Ok(Some(a.len().cmp(&b.len())))
            }
            _ => match (self.num(), rhs.num()) {
                (Some(Num::I(a)), Some(Num::I(b))) => Ok(Some(a.cmp(&b))),
                (Some(a), Some(b)) => Ok(a.as_f64().partial_cmp(&b.as_f64())),
                _ => Err(Fault::type_error(format!(
                    "'{op}' not supported between instances of '{}' and '{}'",
                    self.type_name(),
                    rhs.type_name()
                ))),
            },
        }
    }

    /// `needle in self`.
    pub fn contains(&self, needle: &Value) -> Result<bool, Fault> {
        match self {
            Value::List(items) => Ok(items.iter().any(|v| v.py_eq(needle))),
            Value::Range { start, stop, step } => {
                let n = match needle.num() {
                    Some(Num::I(n)) => n,
                    Some(Num::F(x)) if x.fract() == 0.0 && x.abs() < 9.0e18 => x as i64,
                    _ => return Ok(false),
                };
                let in_bounds = if *step > 0 {
                    *start <= n && n < *stop
                } else {
                    *stop < n && n <= *start
                };
                Ok(in_bounds && (i128::from(n) - i128::from(*start)) % i128::from(*step) == 0)
            }
            Value::Str(hay) => match needle {
                Value::Str(n) => Ok(hay.contains(n.as_str())),
                other => Err(Fault::type_error(format!(
                    "'in <string>' requires string as left operand, not {}",
                    other.type_name()
                ))),
            },
            other => Err(Fault::type_error(format!(
                "argument of type '{}' is not iterable",
                other.type_name()
            ))),
        }
    }

    // ── Sequences ─────────────────────────────────────────────────────────────

    /// Items produced by iterating over this value (`for`, `list()`, …).
    pub fn iter_values(&self) -> Result<Vec<Value>, Fault> {
        match self {
            Value::List(items) => Ok(items.clone()),
            Value::Str(s) => Ok(s.chars().map(|c| Value::Str(c.to_string())).collect()),
            Value::Range { start, stop, step } => {
                let len = range_len(*start, *stop, *step);
                if len as u64 > MAX_SEQUENCE_LEN as u64 {
                    return Err(Fault::memory());
                }
                Ok((0..len).map(|i| Value::Int(start + i * step)).collect())
            }
            other => Err(Fault::type_error(format!(
                "'{}' object is not iterable",
                other.type_name()
            ))),
        }
    }

    fn resolve_index(len: usize, idx: i64) -> Option<usize> {
        let len = len as i64;
        let i = if idx < 0 { idx + len } else { idx };
        (0..len).contains(&i).then_some(i as usize)
    }

    /// `self[index]`.
    pub fn get_item(&self, index: &Value) -> Result<Value, Fault> {
        match self {
            Value::List(items) => {
                let idx = index_of("list", index)?;
                Self::resolve_index(items.len(), idx)
                    .map(|i| items[i].clone())
                    .ok_or_else(|| Fault::index_error("list index out of range"))
            }
            Value::Str(s) => {
                let idx = index_of("string", index)?;
                let chars: Vec<char> = s.chars().collect();
                Self::resolve_index(chars.len(), idx)
                    .map(|i| Value::Str(chars[i].to_string()))
                    .ok_or_else(|| Fault::index_error("string index out of range"))
            }
            Value::Range { start, stop, step } => {
                let idx = index_of("range", index)?;
                Self::resolve_index(range_len(*start, *stop, *step) as usize, idx)
                    .map(|i| Value::Int(start + i as i64 * step))
                    .ok_or_else(|| Fault::index_error("range object index out of range"))
            }
            other => Err(Fault::type_error(format!(
                "'{}' object is not subscriptable",
                other.type_name()
            ))),
        }
    }

    /// `self[index] = value`.
    pub fn set_item(&mut self, index: &Value, value: Value) -> Result<(), Fault> {
        match self {
            Value::List(items) => {
                let idx = index_of("list", index)?;
                let i = Self::resolve_index(items.len(), idx)
                    .ok_or_else(|| Fault::index_error("list assignment index out of range"))?;
                items[i] = value;
                Ok(())
            }
            other => Err(Fault::type_error(format!(
                "'{}' object does not support item assignment",
                other.type_name()
            ))),
        }
    }

    /// Remove `self[index]` (`del x[i]`).
    pub fn del_item(&mut self, index: &Value) -> Result<(), Fault> {
        match self {
            Value::List(items) => {
                let idx = index_of("list", index)?;
                let i = Self::resolve_index(items.len(), idx)
                    .ok_or_else(|| Fault::index_error("list assignment index out of range"))?;
                items.remove(i);
                Ok(())
            }
            other => Err(Fault::type_error(format!(
                "'{}' object does not support item deletion",
                other.type_name()
            ))),
        }
    }

    /// `self[start:stop:step]` with Python's clamping rules.
    pub fn slice(
        &self,
        start: Option<i64>,
        stop: Option<i64>,
        step: Option<i64>,
    ) -> Result<Value, Fault> {
        let step = step.unwrap_or(1);
        if step == 0 {
            return Err(Fault::value_error("slice step cannot be zero"));
        }
        match self {
            Value::List(items) => Ok(Value::List(
                slice_indices(items.len(), start, stop, step)
                    .into_iter()
                    .map(|i| items[i].clone())
                    .collect(),
            )),
            Value::Str(s) => {
                let chars: Vec<char> = s.chars().collect();
                Ok(Value::Str(
                    slice_indices(chars.len(), start, stop, step)
                        .into_iter()
                        .map(|i| chars[i])
                        .collect(),
                ))
            }
            Value::Range { .. } => Value::List(self.iter_values()?).slice(start, stop, Some(step)),
            other => Err(Fault::type_error(format!(
                "'{}' object is not subscriptable",
                other.type_name()
            ))),
        }
    }

    pub fn len(&self) -> Result<usize, Fault> {
        match self {
            Value::Str(s) => Ok(s.chars().count()),
            Value::List(items) => Ok(items.len()),
            Value::Range { start, stop, step } => Ok(range_len(*start, *stop, *step) as usize),
            other => Err(Fault::type_error(format!(
                "object of type '{}' has no len()",
                other.type_name()
            ))),
        }
    }

    // ── Conversions ───────────────────────────────────────────────────────────

    /// `int(x)`.
    pub fn to_int(&self) -> Result<Value, Fault> {
        match self {
            Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
            Value::Int(n) => Ok(Value::Int(*n)),
            Value::Float(x) if x.is_nan() => {
                Err(Fault::value_error("cannot convert float NaN to integer"))
            }
            Value::Float(x) if x.is_infinite() => Err(Fault::new(
                FaultKind::OverflowError,
                "cannot convert float infinity to integer",
            )),
            Value::Float(x) => float_to_int(*x),
            Value::Str(s) => s.trim().replace('_', "").parse::<i64>().map(Value::Int).map_err(|_| {
                Fault::value_error(format!(
                    "invalid literal for int() with base 10: {}",
                    repr_str(s)
                ))
            }),
            other => Err(Fault::type_error(format!(
                "int() argument must be a string, a bytes-like object or a real number, not '{}'",
                other.type_name()
            ))),
        }
    }

    /// `float(x)`.
    pub fn to_float(&self) -> Result<Value, Fault> {
        match self {
            Value::Str(s) => {
                let t = s.trim().to_ascii_lowercase();
                let parsed = match t.as_str() {
                    "inf" | "+inf" | "infinity" | "+infinity" => Some(f64::INFINITY),
                    "-inf" | "-infinity" => Some(f64::NEG_INFINITY),
                    "nan" | "+nan" | "-nan" => Some(f64::NAN),
                    _ if t.chars().any(|c| c.is_ascii_digit()) => t.parse::<f64>().ok(),
                    _ => None,
                };
                parsed.map(Value::Float).ok_or_else(|| {
                    Fault::value_error(format!(
                        "could not convert string to float: {}",
                        repr_str(s)
                    ))
                })
            }
            other => match other.num() {
                Some(n) => Ok(Value::Float(n.as_f64())),
                None => Err(Fault::type_error(format!(
                    "float() argument must be a string or a real number, not '{}'",
                    other.type_name()
                ))),
            },
        }
    }
}

/// Number of items in `range(start, stop, step)`; `step` is never zero.
/// `MemoryError` when `unit * count` would exceed [`MAX_SEQUENCE_LEN`].
fn check_len(unit: usize, count: usize) -> Result<(), Fault> {
    match unit.checked_mul(count) {
        Some(total) if total <= MAX_SEQUENCE_LEN => Ok(()),
        _ => Err(Fault::memory()),
    }
}

/// Truncate a finite float to an int, failing when it leaves the i64 range.
fn float_to_int(x: f64) -> Result<Value, Fault> {
    // i64::MAX is not representable; 2^63 is the first value out of range.
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    let t = x.trunc();
    if t >= -LIMIT && t < LIMIT {
        Ok(Value::Int(t as i64))
    } else {
        Err(Fault::new(FaultKind::OverflowError, "int too large to convert"))
    }
}

pub fn range_len(start: i64, stop: i64, step: i64) -> i64 {
    let (start, stop, step) = (i128::from(start), i128::from(stop), i128::from(step));
    let len = if step > 0 && start < stop {
        (stop - start - 1) / step + 1
    } else if step < 0 && start > stop {
        (start - stop - 1) / (-step) + 1
    } else {
        0
    };
    len as i64
}

/// Positions selected by a slice over a sequence of `len` items.
fn slice_indices(len: usize, start: Option<i64>, stop: Option<i64>, step: i64) -> Vec<usize> {
    let n = len as i64;
    let adjust = |bound: i64| -> i64 {
        if bound < 0 {
            let b = bound + n;
            if b < 0 {
                if step < 0 { -1 } else { 0 }
            } else {
                b
            }
        } else if bound >= n {
            if step < 0 { n - 1 } else { n }
        } else {
            bound
        }
    };
    let (mut i, end) = if step > 0 {
        (start.map_or(0, adjust), stop.map_or(n, adjust))
    } else {
        (start.map_or(n - 1, adjust), stop.map_or(-1, adjust))
    };
    let mut out = Vec::new();
    while (step > 0 && i < end) || (step < 0 && i > end) {
        out.push(i as usize);
        i += step;
    }
    out
}

fn index_of(kind: &str, index: &Value) -> Result<i64, Fault> {
    match index {
        Value::Int(n) => Ok(*n),
        Value::Bool(b) => Ok(i64::from(*b)),
        other => Err(Fault::type_error(format!(
            "{kind} indices must be integers or slices, not {}",
            other.type_name()
        ))),
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_scalars() {
        assert_eq!(Value::Int(42).to_string(), "42");
        assert_eq!(Value::Bool(true).to_string(), "True");
        assert_eq!(Value::None.to_string(), "None");
        assert_eq!(Value::Str("hello".into()).to_string(), "hello");
    }

    #[test]
    fn display_float_like_python() {
        assert_eq!(Value::Float(1.0).to_string(), "1.0");
        assert_eq!(Value::Float(2.5).to_string(), "2.5");
        assert_eq!(Value::Float(0.1 + 0.2).to_string(), "0.30000000000000004");
        assert_eq!(Value::Float(1e16).to_string(), "1e+16");
        assert_eq!(Value::Float(1.5e-5).to_string(), "1.5e-05");
        assert_eq!(Value::Float(-0.0).to_string(), "-0.0");
        assert_eq!(Value::Float(f64::INFINITY).to_string(), "inf");
    }

    #[test]
    fn list_display_uses_repr() {
        let v = Value::List(vec![Value::Int(1), Value::Str("a".into()), Value::None]);
        assert_eq!(v.to_string(), "[1, 'a', None]");
        assert_eq!(Value::Str("it's".into()).repr(), "\"it's\"");
    }

    #[test]
    fn truthiness() {
        assert!(Value::Int(1).truthy());
        assert!(!Value::Int(0).truthy());
        assert!(!Value::Str(String::new()).truthy());
        assert!(Value::Str("0".into()).truthy());
        assert!(!Value::List(vec![]).truthy());
        assert!(!Value::None.truthy());
    }

    #[test]
    fn arithmetic() {
        let a = Value::Int(10);
        let b = Value::Int(3);
        assert!(a.add(&b).unwrap().py_eq(&Value::Int(13)));
        assert!(a.sub(&b).unwrap().py_eq(&Value::Int(7)));
        assert!(a.mul(&b).unwrap().py_eq(&Value::Int(30)));
        assert!(a.floor_div(&b).unwrap().py_eq(&Value::Int(3)));
        assert!(a.rem(&b).unwrap().py_eq(&Value::Int(1)));
        assert_eq!(a.true_div(&Value::Int(4)).unwrap().to_string(), "2.5");
    }

    #[test]
    fn floor_div_and_mod_follow_divisor_sign() {
        assert!(Value::Int(-7).floor_div(&Value::Int(2)).unwrap().py_eq(&Value::Int(-4)));
        assert!(Value::Int(-7).rem(&Value::Int(2)).unwrap().py_eq(&Value::Int(1)));
        assert!(Value::Int(7).rem(&Value::Int(-2)).unwrap().py_eq(&Value::Int(-1)));
    }

    #[test]
    fn division_by_zero_messages() {
        let e = Value::Int(1).true_div(&Value::Int(0)).unwrap_err();
        assert_eq!(e.to_string(), "ZeroDivisionError: division by zero");
        let e = Value::Float(1.0).true_div(&Value::Int(0)).unwrap_err();
        assert_eq!(e.message, "float division by zero");
        let e = Value::Int(1).floor_div(&Value::Int(0)).unwrap_err();
        assert_eq!(e.message, "integer division or modulo by zero");
    }

    #[test]
    fn string_concat_and_repeat() {
        let v = Value::Str("ab".into()).add(&Value::Str("cd".into())).unwrap();
        assert_eq!(v.to_string(), "abcd");
        let v = Value::Str("ab".into()).mul(&Value::Int(3)).unwrap();
        assert_eq!(v.to_string(), "ababab");
        let e = Value::Str("a".into()).add(&Value::Int(1)).unwrap_err();
        assert_eq!(e.message, "can only concatenate str (not \"int\") to str");
        let e = Value::Int(1).add(&Value::Str("a".into())).unwrap_err();
        assert_eq!(e.message, "unsupported operand type(s) for +: 'int' and 'str'");
    }

    #[test]
    fn overflow_is_reported() {
        let e = Value::Int(i64::MAX).add(&Value::Int(1)).unwrap_err();
        assert_eq!(e.kind, FaultKind::OverflowError);
    }

    #[test]
    fn pow_int_and_float() {
        assert!(Value::Int(2).pow(&Value::Int(10)).unwrap().py_eq(&Value::Int(1024)));
        assert_eq!(Value::Int(2).pow(&Value::Int(-1)).unwrap().to_string(), "0.5");
    }

    #[test]
    fn mixed_equality() {
        assert!(Value::Int(1).py_eq(&Value::Float(1.0)));
        assert!(Value::Bool(true).py_eq(&Value::Int(1)));
        assert!(!Value::Str("1".into()).py_eq(&Value::Int(1)));
    }

    #[test]
    fn compare_mismatched_types_fails() {
        let e = Value::Str("a".into()).compare(&Value::Int(1), "<").unwrap_err();
        assert_eq!(e.message, "'<' not supported between instances of 'str' and 'int'");
    }

    #[test]
    fn indexing_and_slicing() {
        let v = Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        assert!(v.get_item(&Value::Int(-1)).unwrap().py_eq(&Value::Int(3)));
        assert_eq!(v.slice(Some(1), None, None).unwrap().to_string(), "[2, 3]");
        assert_eq!(v.slice(None, None, Some(-1)).unwrap().to_string(), "[3, 2, 1]");
        assert_eq!(v.get_item(&Value::Int(5)).unwrap_err().message, "list index out of range");
        let s = Value::Str("hello".into());
        assert_eq!(s.slice(Some(1), Some(-1), None).unwrap().to_string(), "ell");
        assert_eq!(s.slice(None, None, Some(2)).unwrap().to_string(), "hlo");
        assert!(s.slice(None, None, Some(0)).is_err());
    }

    #[test]
    fn ranges_are_lazy_sequences() {
        let r = Value::Range { start: 0, stop: 10, step: 3 };
        assert_eq!(r.to_string(), "range(0, 10, 3)");
        assert_eq!(r.len().unwrap(), 4);
        assert!(r.contains(&Value::Int(9)).unwrap());
        assert!(!r.contains(&Value::Int(8)).unwrap());
        assert!(r.get_item(&Value::Int(-1)).unwrap().py_eq(&Value::Int(9)));
        assert_eq!(Value::List(r.iter_values().unwrap()).to_string(), "[0, 3, 6, 9]");
        let down = Value::Range { start: 5, stop: 0, step: -2 };
        assert_eq!(Value::List(down.iter_values().unwrap()).to_string(), "[5, 3, 1]");
        assert!(!Value::Range { start: 3, stop: 3, step: 1 }.truthy());
    }

    #[test]
    fn conversions() {
        assert!(Value::Str(" 42 ".into()).to_int().unwrap().py_eq(&Value::Int(42)));
        assert!(Value::Float(3.9).to_int().unwrap().py_eq(&Value::Int(3)));
        let e = Value::Str("abc".into()).to_int().unwrap_err();
        assert_eq!(e.message, "invalid literal for int() with base 10: 'abc'");
        assert_eq!(Value::Str("2.5".into()).to_float().unwrap().to_string(), "2.5");
        assert!(Value::Str("x".into()).to_float().is_err());
    }

    #[test]
    fn membership() {
        let v = Value::List(vec![Value::Int(1), Value::Str("a".into())]);
        assert!(v.contains(&Value::Float(1.0)).unwrap());
        assert!(Value::Str("hello".into()).contains(&Value::Str("ell".into())).unwrap());
        assert!(Value::Int(3).contains(&Value::Int(3)).is_err());
    }
}
