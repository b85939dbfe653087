//! Conversion between script values and host values.
//!
//! Tables become [`HostTable`]s with string keys; functions, userdata and
//! threads pass through untouched as [`Opaque`] registry handles so they
//! round-trip by identity.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use mlua::{Error as LuaError, Lua, RegistryKey, Result as LuaResult, Value};
use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::error::MarshalError;

pub const DEFAULT_MAX_TABLE_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarshalLimits {
    pub max_depth: usize,
}

impl Default for MarshalLimits {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_TABLE_DEPTH,
        }
    }
}

/// A script value the host keeps without interpreting.
#[derive(Clone)]
pub struct Opaque {
    key: Rc<RegistryKey>,
    type_name: &'static str,
}

impl Opaque {
    pub fn capture<'lua>(lua: &'lua Lua, value: Value<'lua>) -> LuaResult<Self> {
        let type_name = value.type_name();
        let key = lua.create_registry_value(value)?;
        Ok(Self {
            key: Rc::new(key),
            type_name,
        })
    }

    pub fn to_value<'lua>(&self, lua: &'lua Lua) -> LuaResult<Value<'lua>> {
        lua.registry_value(&self.key)
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn is_function(&self) -> bool {
        self.type_name == "function"
    }

    pub fn same_handle(&self, other: &Opaque) -> bool {
        Rc::ptr_eq(&self.key, &other.key)
    }
}

impl fmt::Debug for Opaque {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.type_name)
    }
}

#[derive(Debug, Clone)]
pub enum HostValue {
    Nil,
    Boolean(bool),
    Number(f64),
    String(String),
    Table(HostTable),
    Opaque(Opaque),
}

impl HostValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            HostValue::Nil => "nil",
            HostValue::Boolean(_) => "boolean",
            HostValue::Number(_) => "number",
            HostValue::String(_) => "string",
            HostValue::Table(_) => "table",
            HostValue::Opaque(opaque) => opaque.type_name(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            HostValue::String(text) => Some(text.as_str()),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            HostValue::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&HostTable> {
        match self {
            HostValue::Table(table) => Some(table),
            _ => None,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, HostValue::Nil)
    }
}

impl PartialEq for HostValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (HostValue::Nil, HostValue::Nil) => true,
            (HostValue::Boolean(a), HostValue::Boolean(b)) => a == b,
            (HostValue::Number(a), HostValue::Number(b)) => a == b,
            (HostValue::String(a), HostValue::String(b)) => a == b,
            (HostValue::Table(a), HostValue::Table(b)) => a == b,
            (HostValue::Opaque(a), HostValue::Opaque(b)) => a.same_handle(b),
            _ => false,
        }
    }
}

impl From<f64> for HostValue {
    fn from(value: f64) -> Self {
        HostValue::Number(value)
    }
}

impl From<f32> for HostValue {
    fn from(value: f32) -> Self {
        HostValue::Number(value as f64)
    }
}

impl From<bool> for HostValue {
    fn from(value: bool) -> Self {
        HostValue::Boolean(value)
    }
}

impl From<&str> for HostValue {
    fn from(value: &str) -> Self {
        HostValue::String(value.to_string())
    }
}

impl From<String> for HostValue {
    fn from(value: String) -> Self {
        HostValue::String(value)
    }
}

impl From<HostTable> for HostValue {
    fn from(value: HostTable) -> Self {
        HostValue::Table(value)
    }
}

impl Serialize for HostValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            HostValue::Nil => serializer.serialize_none(),
            HostValue::Boolean(flag) => serializer.serialize_bool(*flag),
            HostValue::Number(value) => serializer.serialize_f64(*value),
            HostValue::String(text) => serializer.serialize_str(text),
            HostValue::Table(table) => table.serialize(serializer),
            HostValue::Opaque(opaque) => serializer.serialize_str(&format!("{opaque:?}")),
        }
    }
}

/// String-keyed mapping that keeps the order entries were inserted in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HostTable {
    entries: IndexMap<String, HostValue>,
}

impl HostTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace; a replaced key keeps its original position.
    pub fn insert(&mut self, key: impl Into<String>, value: HostValue) {
        self.entries.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&HostValue> {
        self.entries.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(HostValue::as_str)
    }

    pub fn get_number(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(HostValue::as_number)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &HostValue)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, HostValue)> for HostTable {
    fn from_iter<I: IntoIterator<Item = (String, HostValue)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl Serialize for HostTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Parse a key written the way an integer prints (`"0"`, `"12"`, `"-3"`).
pub fn canonical_index(key: &str) -> Option<i64> {
    let index: i64 = key.parse().ok()?;
    (index.to_string() == key).then_some(index)
}

/// Number a host key stands for when it is written the way that number
/// prints (`"1"`, `"2.5"`, `"-3"`). Such keys go back to script as numbers.
pub fn numeric_key(key: &str) -> Option<f64> {
    let number: f64 = key.parse().ok()?;
    (number.is_finite() && number_key(number) == key).then_some(number)
}

/// String form of a table key. Integral numbers print without a fraction so
/// array slots become `"1"`, `"2"`, ...
///
/// Boolean keys become `"true"` / `"false"` and come back as strings; they
/// are the one key kind that does not survive a round trip.
pub fn key_string(key: &Value) -> Result<String, MarshalError> {
    match key {
        Value::String(text) => Ok(String::from_utf8_lossy(text.as_bytes()).into_owned()),
        Value::Integer(index) => Ok(index.to_string()),
        Value::Number(number) => Ok(number_key(*number)),
        Value::Boolean(flag) => Ok(flag.to_string()),
        other => Err(MarshalError::UnsupportedKey {
            type_name: other.type_name().to_string(),
        }),
    }
}

fn number_key(number: f64) -> String {
    if number.is_finite() && number.fract() == 0.0 && number.abs() < 9.007_199_254_740_992e15 {
        (number as i64).to_string()
    } else {
        number.to_string()
    }
}

pub fn script_to_host<'lua>(
    lua: &'lua Lua,
    value: &Value<'lua>,
    limits: MarshalLimits,
) -> LuaResult<HostValue> {
    to_host(lua, value, limits.max_depth, 0)
}

fn to_host<'lua>(lua: &'lua Lua, value: &Value<'lua>, limit: usize, depth: usize) -> LuaResult<HostValue> {
    match value {
        Value::Nil => Ok(HostValue::Nil),
        Value::Boolean(flag) => Ok(HostValue::Boolean(*flag)),
        Value::Integer(number) => Ok(HostValue::Number(*number as f64)),
        Value::Number(number) => Ok(HostValue::Number(*number)),
        Value::String(text) => Ok(HostValue::String(
            String::from_utf8_lossy(text.as_bytes()).into_owned(),
        )),
        Value::Table(table) => {
            if depth >= limit {
                return Err(LuaError::external(MarshalError::TooDeep { limit }));
            }
            let mut host = HostTable::new();
            for pair in table.clone().pairs::<Value, Value>() {
                let (key, entry) = pair?;
                let key = key_string(&key).map_err(LuaError::external)?;
                host.insert(key, to_host(lua, &entry, limit, depth + 1)?);
            }
            Ok(HostValue::Table(host))
        }
        other => Ok(HostValue::Opaque(Opaque::capture(lua, other.clone())?)),
    }
}

pub fn host_to_script<'lua>(lua: &'lua Lua, value: &HostValue) -> LuaResult<Value<'lua>> {
    Ok(match value {
        HostValue::Nil => Value::Nil,
        HostValue::Boolean(flag) => Value::Boolean(*flag),
        HostValue::Number(number) => Value::Number(*number),
        HostValue::String(text) => Value::String(lua.create_string(text)?),
        HostValue::Table(host) => {
            let table = lua.create_table()?;
            for (key, entry) in host.iter() {
                let key = match numeric_key(key) {
                    Some(number) => Value::Number(number),
                    None => Value::String(lua.create_string(key)?),
                };
                table.raw_set(key, host_to_script(lua, entry)?)?;
            }
            Value::Table(table)
        }
        HostValue::Opaque(opaque) => opaque.to_value(lua)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mlua::{Function, Table};

    fn eval<'lua>(lua: &'lua Lua, source: &str) -> Value<'lua> {
        lua.load(source).eval().expect("chunk evaluates")
    }

    #[test]
    fn tables_convert_with_string_keys() {
        let lua = Lua::new();
        let value = eval(&lua, r#"return { "a", "b", x = 1.5, [2.5] = true, nested = { flag = false } }"#);
        let host = script_to_host(&lua, &value, MarshalLimits::default()).expect("marshal");
        let table = host.as_table().expect("table");
        assert_eq!(table.get_str("1"), Some("a"));
        assert_eq!(table.get_str("2"), Some("b"));
        assert_eq!(table.get_number("x"), Some(1.5));
        assert_eq!(table.get("2.5"), Some(&HostValue::Boolean(true)));
        let nested = table.get("nested").and_then(HostValue::as_table).expect("nested");
        assert_eq!(nested.get("flag"), Some(&HostValue::Boolean(false)));
    }

    #[test]
    fn round_trip_preserves_structure_and_function_identity() {
        let lua = Lua::new();
        let value = eval(
            &lua,
            r#"
            shared_fn = function() return 1 end
            return { 10, 20, name = "bg", inner = { 1.25, ok = true }, cb = shared_fn,
                [2.5] = "half", [-4] = "neg", [true] = "yes" }
            "#,
        );
        let host = script_to_host(&lua, &value, MarshalLimits::default()).expect("marshal");
        let back = host_to_script(&lua, &host).expect("unmarshal");
        lua.globals().set("copy", back).expect("set copy");
        let same: bool = lua
            .load(
                r#"
                return copy[1] == 10 and copy[2] == 20 and copy.name == "bg"
                    and copy.inner[1] == 1.25 and copy.inner.ok == true
                    and rawequal(copy.cb, shared_fn)
                    and copy[2.5] == "half" and copy[-4] == "neg"
                    and copy[true] == nil and copy["true"] == "yes"
                "#,
            )
            .eval()
            .expect("compare");
        assert!(same);
        let again = script_to_host(&lua, &lua.globals().get::<_, Value>("copy").expect("copy"), MarshalLimits::default())
            .expect("marshal again");
        assert_eq!(again, host);
    }

    #[test]
    fn nil_and_scalars_map_directly() {
        let lua = Lua::new();
        let limits = MarshalLimits::default();
        assert_eq!(script_to_host(&lua, &Value::Nil, limits).expect("nil"), HostValue::Nil);
        assert_eq!(
            script_to_host(&lua, &Value::Number(3.0), limits).expect("number"),
            HostValue::Number(3.0)
        );
        let func: Function = lua.load("return function() end").eval().expect("fn");
        let host = script_to_host(&lua, &Value::Function(func), limits).expect("opaque");
        assert_eq!(host.type_name(), "function");
    }

    #[test]
    fn cyclic_tables_fail_with_depth_error() {
        let lua = Lua::new();
        let table: Table = lua.load("local t = {} t.self = t return t").eval().expect("cycle");
        let err = script_to_host(&lua, &Value::Table(table), MarshalLimits { max_depth: 8 })
            .expect_err("cycle rejected");
        let message = err.to_string();
        assert!(message.contains("8 levels"), "{message}");
    }

    #[test]
    fn table_keys_must_be_scalars() {
        let lua = Lua::new();
        let value = eval(&lua, "return { [{}] = 1 }");
        assert!(script_to_host(&lua, &value, MarshalLimits::default()).is_err());
    }

    #[test]
    fn numeric_keys_only_match_their_printed_form() {
        assert_eq!(numeric_key("2.5"), Some(2.5));
        assert_eq!(numeric_key("-3"), Some(-3.0));
        assert_eq!(numeric_key("1e5"), None);
        assert_eq!(numeric_key("inf"), None);
        assert_eq!(numeric_key("-0"), None);
        assert_eq!(numeric_key("name"), None);
    }

    #[test]
    fn large_tables_marshal_in_linear_time() {
        let lua = Lua::new();
        let value = eval(
            &lua,
            "local t = {} for i = 1, 50000 do t['k' .. i] = i end return t",
        );
        let started = std::time::Instant::now();
        let host = script_to_host(&lua, &value, MarshalLimits::default()).expect("marshal");
        let table = host.as_table().expect("table");
        assert_eq!(table.len(), 50000);
        assert_eq!(table.get_number("k49999"), Some(49999.0));
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
    }

    #[test]
    fn replaced_keys_keep_their_position() {
        let mut table = HostTable::new();
        table.insert("b", HostValue::from(1.0));
        table.insert("a", HostValue::from(2.0));
        table.insert("b", HostValue::from(3.0));
        assert_eq!(table.keys().collect::<Vec<_>>(), vec!["b", "a"]);
        assert_eq!(table.get_number("b"), Some(3.0));
    }

    #[test]
    fn canonical_index_rejects_padded_numbers() {
        assert_eq!(canonical_index("7"), Some(7));
        assert_eq!(canonical_index("07"), None);
        assert_eq!(canonical_index("1.0"), None);
    }
}
