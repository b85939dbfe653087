//! Typed extraction of script arguments.
//!
//! Every failure is raised as a [`CoercionError`] through
//! `mlua::Error::external`, so scripts can `pcall` it and the manager can
//! recover the original kind at the `run` boundary.

use mlua::{Error as LuaError, Lua, Result as LuaResult, Value};

use super::binding;
use super::library::CallContext;
use crate::actor::ActorRef;
use crate::error::{CoercionError, HostError};
use crate::value::{script_to_host, HostTable, HostValue, MarshalLimits, Opaque};

/// Declared kind of one positional argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    Str,
    Float,
    Int,
    Bool,
    /// Boolean, or a number where any nonzero value is true.
    BoolOrInt,
    Table,
    Function,
    /// An actor instance of the named class or one of its subclasses.
    Object(&'static str),
    Any,
    Optional(&'static ArgKind),
}

impl ArgKind {
    pub fn describe(&self) -> String {
        match self {
            ArgKind::Str => "string".to_string(),
            ArgKind::Float | ArgKind::Int => "number".to_string(),
            ArgKind::Bool => "boolean".to_string(),
            ArgKind::BoolOrInt => "boolean or number".to_string(),
            ArgKind::Table => "table".to_string(),
            ArgKind::Function => "function".to_string(),
            ArgKind::Object(class) => (*class).to_string(),
            ArgKind::Any => "value".to_string(),
            ArgKind::Optional(inner) => format!("{} or nil", inner.describe()),
        }
    }
}

/// One coerced argument as handed to host functions.
#[derive(Debug, Clone)]
pub enum Arg {
    Missing,
    Str(String),
    Float(f64),
    Int(i64),
    Bool(bool),
    Table(HostTable),
    Value(HostValue),
    Actor(ActorRef),
}

/// Coerced arguments, indexed from zero after any receiver.
#[derive(Debug, Clone, Default)]
pub struct Args {
    values: Vec<Arg>,
}

const MISSING: Arg = Arg::Missing;

impl Args {
    pub fn new(values: Vec<Arg>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> &Arg {
        self.values.get(index).unwrap_or(&MISSING)
    }

    fn mismatch(index: usize, expected: &'static str) -> HostError {
        HostError::ArgumentMismatch { index, expected }
    }

    pub fn str(&self, index: usize) -> Result<&str, HostError> {
        match self.get(index) {
            Arg::Str(text) => Ok(text),
            _ => Err(Self::mismatch(index, "string")),
        }
    }

    pub fn float(&self, index: usize) -> Result<f64, HostError> {
        match self.get(index) {
            Arg::Float(value) => Ok(*value),
            Arg::Int(value) => Ok(*value as f64),
            _ => Err(Self::mismatch(index, "number")),
        }
    }

    pub fn f32(&self, index: usize) -> Result<f32, HostError> {
        self.float(index).map(|value| value as f32)
    }

    pub fn int(&self, index: usize) -> Result<i64, HostError> {
        match self.get(index) {
            Arg::Int(value) => Ok(*value),
            Arg::Float(value) => Ok(*value as i64),
            _ => Err(Self::mismatch(index, "integer")),
        }
    }

    pub fn bool(&self, index: usize) -> Result<bool, HostError> {
        match self.get(index) {
            Arg::Bool(flag) => Ok(*flag),
            _ => Err(Self::mismatch(index, "boolean")),
        }
    }

    pub fn table(&self, index: usize) -> Result<&HostTable, HostError> {
        match self.get(index) {
            Arg::Table(table) => Ok(table),
            _ => Err(Self::mismatch(index, "table")),
        }
    }

    pub fn actor(&self, index: usize) -> Result<&ActorRef, HostError> {
        match self.get(index) {
            Arg::Actor(actor) => Ok(actor),
            _ => Err(Self::mismatch(index, "actor")),
        }
    }

    pub fn opaque(&self, index: usize) -> Result<&Opaque, HostError> {
        match self.get(index) {
            Arg::Value(HostValue::Opaque(opaque)) => Ok(opaque),
            _ => Err(Self::mismatch(index, "function")),
        }
    }

    /// The argument as a plain value; missing arguments read as nil.
    pub fn value(&self, index: usize) -> HostValue {
        match self.get(index) {
            Arg::Missing => HostValue::Nil,
            Arg::Str(text) => HostValue::String(text.clone()),
            Arg::Float(value) => HostValue::Number(*value),
            Arg::Int(value) => HostValue::Number(*value as f64),
            Arg::Bool(flag) => HostValue::Boolean(*flag),
            Arg::Table(table) => HostValue::Table(table.clone()),
            Arg::Value(value) => value.clone(),
            Arg::Actor(actor) => actor
                .try_borrow()
                .ok()
                .and_then(|actor| actor.proxy().cloned())
                .map(HostValue::Opaque)
                .unwrap_or(HostValue::Nil),
        }
    }

    pub fn is_missing(&self, index: usize) -> bool {
        matches!(self.get(index), Arg::Missing)
    }

    pub fn opt_str(&self, index: usize) -> Result<Option<&str>, HostError> {
        optional(self, index, Self::str)
    }

    pub fn opt_float(&self, index: usize) -> Result<Option<f64>, HostError> {
        optional(self, index, Self::float)
    }

    pub fn opt_bool(&self, index: usize) -> Result<Option<bool>, HostError> {
        optional(self, index, Self::bool)
    }

    pub fn opt_int(&self, index: usize) -> Result<Option<i64>, HostError> {
        optional(self, index, Self::int)
    }
}

fn optional<'a, T>(
    args: &'a Args,
    index: usize,
    read: fn(&'a Args, usize) -> Result<T, HostError>,
) -> Result<Option<T>, HostError> {
    if args.is_missing(index) {
        Ok(None)
    } else {
        read(args, index).map(Some)
    }
}

fn type_name(value: &Value) -> String {
    match value {
        Value::Integer(_) => "number".to_string(),
        other => other.type_name().to_string(),
    }
}

pub fn mismatch(function: &str, position: usize, expected: &str, got: &Value) -> LuaError {
    LuaError::external(CoercionError {
        function: function.to_string(),
        position,
        expected: expected.to_string(),
        got: type_name(got),
    })
}

pub fn string_arg(function: &str, position: usize, value: &Value) -> LuaResult<String> {
    match value {
        Value::String(text) => Ok(String::from_utf8_lossy(text.as_bytes()).into_owned()),
        other => Err(mismatch(function, position, "string", other)),
    }
}

pub fn float_arg(function: &str, position: usize, value: &Value) -> LuaResult<f64> {
    match value {
        Value::Number(number) => Ok(*number),
        Value::Integer(number) => Ok(*number as f64),
        other => Err(mismatch(function, position, "number", other)),
    }
}

/// Numbers truncate toward zero.
pub fn int_arg(function: &str, position: usize, value: &Value) -> LuaResult<i64> {
    float_arg(function, position, value).map(|number| number.trunc() as i64)
}

pub fn bool_arg(function: &str, position: usize, value: &Value) -> LuaResult<bool> {
    match value {
        Value::Boolean(flag) => Ok(*flag),
        other => Err(mismatch(function, position, "boolean", other)),
    }
}

/// Accepts `true`/`false` or a number, nonzero meaning true.
pub fn truthy_bool_arg(function: &str, position: usize, value: &Value) -> LuaResult<bool> {
    match value {
        Value::Boolean(flag) => Ok(*flag),
        Value::Number(number) => Ok(*number != 0.0),
        Value::Integer(number) => Ok(*number != 0),
        other => Err(mismatch(function, position, "boolean or number", other)),
    }
}

pub fn table_arg<'lua>(
    lua: &'lua Lua,
    function: &str,
    position: usize,
    value: &Value<'lua>,
    limits: MarshalLimits,
) -> LuaResult<HostTable> {
    match value {
        Value::Table(_) => match script_to_host(lua, value, limits)? {
            HostValue::Table(table) => Ok(table),
            _ => Err(mismatch(function, position, "table", value)),
        },
        other => Err(mismatch(function, position, "table", other)),
    }
}

/// Resolve an instance proxy to the actor it was created for.
pub fn object_arg<'lua>(
    ctx: &CallContext<'_, 'lua>,
    function: &str,
    position: usize,
    value: &Value<'lua>,
    class: &str,
) -> LuaResult<ActorRef> {
    let Value::Table(table) = value else {
        return Err(mismatch(function, position, class, value));
    };
    let Some(tag) = binding::instance_tag(ctx.lua, table)? else {
        return Err(mismatch(function, position, class, value));
    };
    if !ctx.services.registry.is_kind_of(&tag.class, class) {
        return Err(LuaError::external(CoercionError {
            function: function.to_string(),
            position,
            expected: class.to_string(),
            got: tag.class,
        }));
    }
    tag.actor
        .upgrade()
        .ok_or_else(|| LuaError::external(HostError::DestroyedActor))
}

/// Coerce one value against its declared kind.
pub fn coerce<'lua>(
    ctx: &CallContext<'_, 'lua>,
    function: &str,
    position: usize,
    kind: ArgKind,
    value: &Value<'lua>,
) -> LuaResult<Arg> {
    Ok(match kind {
        ArgKind::Optional(inner) => {
            if matches!(value, Value::Nil) {
                Arg::Missing
            } else {
                coerce(ctx, function, position, *inner, value)?
            }
        }
        ArgKind::Str => Arg::Str(string_arg(function, position, value)?),
        ArgKind::Float => Arg::Float(float_arg(function, position, value)?),
        ArgKind::Int => Arg::Int(int_arg(function, position, value)?),
        ArgKind::Bool => Arg::Bool(bool_arg(function, position, value)?),
        ArgKind::BoolOrInt => Arg::Bool(truthy_bool_arg(function, position, value)?),
        ArgKind::Table => Arg::Table(table_arg(
            ctx.lua,
            function,
            position,
            value,
            ctx.services.limits(),
        )?),
        ArgKind::Function => match value {
            Value::Function(_) => Arg::Value(HostValue::Opaque(Opaque::capture(
                ctx.lua,
                value.clone(),
            )?)),
            other => return Err(mismatch(function, position, "function", other)),
        },
        ArgKind::Object(class) => Arg::Actor(object_arg(ctx, function, position, value, class)?),
        ArgKind::Any => Arg::Value(script_to_host(ctx.lua, value, ctx.services.limits())?),
    })
}

/// Coerce `kinds` left to right from `values`; `first_position` is the
/// script-visible position of `values[0]` used in error messages.
pub fn coerce_all<'lua>(
    ctx: &CallContext<'_, 'lua>,
    function: &str,
    kinds: &[ArgKind],
    values: &[Value<'lua>],
    first_position: usize,
) -> LuaResult<Args> {
    let mut coerced = Vec::with_capacity(kinds.len());
    for (offset, kind) in kinds.iter().enumerate() {
        let value = values.get(offset).unwrap_or(&Value::Nil);
        coerced.push(coerce(ctx, function, first_position + offset, *kind, value)?);
    }
    Ok(Args::new(coerced))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coercion_of(err: LuaError) -> CoercionError {
        match err {
            LuaError::ExternalError(inner) => inner
                .downcast_ref::<CoercionError>()
                .cloned()
                .expect("coercion error"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn float_arg_rejects_strings() {
        let lua = Lua::new();
        let text = Value::String(lua.create_string("1.5").expect("string"));
        let err = coercion_of(float_arg("zoom", 2, &text).expect_err("string rejected"));
        assert_eq!(err.position, 2);
        assert_eq!(err.expected, "number");
        assert_eq!(err.got, "string");
    }

    #[test]
    fn int_arg_truncates() {
        assert_eq!(int_arg("f", 1, &Value::Number(2.9)).expect("int"), 2);
        assert_eq!(int_arg("f", 1, &Value::Number(-2.9)).expect("int"), -2);
    }

    #[test]
    fn truthy_bool_accepts_numbers() {
        assert!(truthy_bool_arg("visible", 2, &Value::Number(1.0)).expect("one"));
        assert!(!truthy_bool_arg("visible", 2, &Value::Number(0.0)).expect("zero"));
        assert!(truthy_bool_arg("visible", 2, &Value::Boolean(true)).expect("bool"));
        assert!(bool_arg("visible", 2, &Value::Number(1.0)).is_err());
    }

    #[test]
    fn table_arg_marshals_eagerly() {
        let lua = Lua::new();
        let value: Value = lua.load("return { 1, 0.5, 0, a = 1 }").eval().expect("table");
        let table = table_arg(&lua, "diffuse", 2, &value, MarshalLimits::default()).expect("table");
        assert_eq!(table.get_number("2"), Some(0.5));
        assert_eq!(table.get_number("a"), Some(1.0));
        let err = coercion_of(
            table_arg(&lua, "diffuse", 2, &Value::Nil, MarshalLimits::default())
                .expect_err("nil rejected"),
        );
        assert_eq!(err.got, "nil");
    }

    #[test]
    fn optional_args_read_as_missing() {
        let args = Args::new(vec![Arg::Float(1.0), Arg::Missing]);
        assert_eq!(args.opt_float(1).expect("optional"), None);
        assert_eq!(args.opt_float(0).expect("present"), Some(1.0));
        assert!(args.str(0).is_err());
        assert_eq!(args.value(5), HostValue::Nil);
    }

    #[test]
    fn describe_names_optional_kinds() {
        assert_eq!(ArgKind::Optional(&ArgKind::Bool).describe(), "boolean or nil");
        assert_eq!(ArgKind::Object("Sprite").describe(), "Sprite");
    }
}
