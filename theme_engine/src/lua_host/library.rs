//! Method library generation.
//!
//! A library pairs statically declared [`MethodSpec`]s with a table of host
//! functions. Generation validates every spec up front; entries that do not
//! resolve are dropped with a [`BindingWarning`] so one broken binding never
//! takes the interpreter down.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::rc::{Rc, Weak};
use std::sync::Arc;

use mlua::{Error as LuaError, Lua, MultiValue, Result as LuaResult, Table, Value, Variadic};
use serde::Serialize;

use super::coerce::{coerce_all, object_arg, ArgKind, Args};
use crate::actor::theme::MetricSource;
use crate::actor::{Actor, ActorRef};
use crate::actor::class::ActorRegistry;
use crate::config::ManagerConfig;
use crate::error::HostError;
use crate::scene::TextureSource;
use crate::value::{host_to_script, HostValue, MarshalLimits};

pub type HostResult = Result<Vec<HostValue>, HostError>;

/// A host function a spec can point at.
#[derive(Clone, Copy)]
pub enum HostFn {
    /// Pure state change on the receiver; cannot reach the interpreter.
    Method(fn(&mut Actor, &Args) -> HostResult),
    /// Needs the interpreter (commands, child proxies, resources).
    Invoke(for<'a, 'lua> fn(&CallContext<'a, 'lua>, &ActorRef, &Args) -> HostResult),
    /// Receiver-less entry of a static library.
    Static(for<'a, 'lua> fn(&CallContext<'a, 'lua>, &Args) -> HostResult),
}

impl HostFn {
    fn callable_with(&self, receiver: Receiver) -> bool {
        matches!(
            (self, receiver),
            (HostFn::Method(_) | HostFn::Invoke(_), Receiver::Instance)
                | (HostFn::Static(_), Receiver::Static)
        )
    }
}

pub type HostMethodTable = BTreeMap<&'static str, HostFn>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Receiver {
    Instance,
    Static,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Returns {
    Nothing,
    /// Return the receiver so setters chain.
    Receiver,
    /// Push exactly this many values, padding with nil.
    Count(usize),
}

#[derive(Debug, Clone, Copy)]
pub struct MethodSpec {
    pub script_name: &'static str,
    pub host_name: &'static str,
    pub args: &'static [ArgKind],
    pub returns: Returns,
}

impl MethodSpec {
    pub const fn new(
        script_name: &'static str,
        host_name: &'static str,
        args: &'static [ArgKind],
    ) -> Self {
        Self {
            script_name,
            host_name,
            args,
            returns: Returns::Nothing,
        }
    }

    pub const fn returns(mut self, count: usize) -> Self {
        self.returns = Returns::Count(count);
        self
    }

    pub const fn chained(mut self) -> Self {
        self.returns = Returns::Receiver;
        self
    }
}

/// A spec entry that failed validation and was left out of its library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BindingWarning {
    pub owner: String,
    pub script_name: String,
    pub host_name: String,
    pub reason: String,
}

#[derive(Clone, Copy)]
struct BoundMethod {
    spec: MethodSpec,
    func: HostFn,
}

/// Validated, immutable set of script-callable methods for one owner.
pub struct MethodLibrary {
    owner: String,
    receiver: Receiver,
    methods: Vec<BoundMethod>,
    warnings: Vec<BindingWarning>,
}

impl MethodLibrary {
    pub fn generate(
        owner: &str,
        receiver: Receiver,
        host: &HostMethodTable,
        specs: &[MethodSpec],
    ) -> Self {
        let mut methods: Vec<BoundMethod> = Vec::with_capacity(specs.len());
        let mut warnings = Vec::new();
        for spec in specs {
            let reason = match host.get(spec.host_name) {
                None => Some("host method does not exist"),
                Some(func) if !func.callable_with(receiver) => Some(match receiver {
                    Receiver::Instance => "host function takes no receiver",
                    Receiver::Static => "host method needs a receiver",
                }),
                Some(_) => None,
            };
            if let Some(reason) = reason {
                log::warn!(
                    "binding {owner}.{} -> {} skipped: {reason}",
                    spec.script_name,
                    spec.host_name
                );
                warnings.push(BindingWarning {
                    owner: owner.to_string(),
                    script_name: spec.script_name.to_string(),
                    host_name: spec.host_name.to_string(),
                    reason: reason.to_string(),
                });
                continue;
            }
            let Some(&func) = host.get(spec.host_name) else {
                continue;
            };
            let bound = BoundMethod { spec: *spec, func };
            // later specs override earlier ones, so subclasses can rebind a name
            match methods
                .iter_mut()
                .find(|existing| existing.spec.script_name == spec.script_name)
            {
                Some(existing) => *existing = bound,
                None => methods.push(bound),
            }
        }
        Self {
            owner: owner.to_string(),
            receiver,
            methods,
            warnings,
        }
    }

    pub fn contains(&self, script_name: &str) -> bool {
        self.methods
            .iter()
            .any(|method| method.spec.script_name == script_name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.methods.iter().map(|method| method.spec.script_name)
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    pub fn warnings(&self) -> &[BindingWarning] {
        &self.warnings
    }

    /// Build a fresh script table of wrapper functions.
    pub fn install<'lua>(&self, lua: &'lua Lua, services: Rc<Services>) -> LuaResult<Table<'lua>> {
        let table = lua.create_table()?;
        for method in &self.methods {
            let wrapper = match self.receiver {
                Receiver::Instance => {
                    instance_wrapper(lua, self.owner.clone(), *method, services.clone())?
                }
                Receiver::Static => {
                    static_wrapper(lua, self.owner.clone(), *method, services.clone())?
                }
            };
            table.set(method.spec.script_name, wrapper)?;
        }
        Ok(table)
    }
}

fn instance_wrapper<'lua>(
    lua: &'lua Lua,
    owner: String,
    method: BoundMethod,
    services: Rc<Services>,
) -> LuaResult<mlua::Function<'lua>> {
    lua.create_function(move |lua, args: Variadic<Value>| {
        let ctx = CallContext {
            lua,
            services: &services,
        };
        let name = method.spec.script_name;
        let receiver_value = args.first().cloned().unwrap_or(Value::Nil);
        let receiver = object_arg(&ctx, name, 1, &receiver_value, &owner)?;
        let rest = args.get(1..).unwrap_or(&[]);
        let coerced = coerce_all(&ctx, name, method.spec.args, rest, 2)?;
        let result = match method.func {
            HostFn::Method(func) => {
                let mut actor = receiver
                    .try_borrow_mut()
                    .map_err(|_| LuaError::external(HostError::ActorBusy))?;
                func(&mut actor, &coerced)
            }
            HostFn::Invoke(func) => func(&ctx, &receiver, &coerced),
            HostFn::Static(func) => func(&ctx, &coerced),
        };
        let values = result.map_err(into_script_error)?;
        push_results(lua, method.spec.returns, values, receiver_value)
    })
}

fn static_wrapper<'lua>(
    lua: &'lua Lua,
    owner: String,
    method: BoundMethod,
    services: Rc<Services>,
) -> LuaResult<mlua::Function<'lua>> {
    let registry_key = static_library_key(&owner);
    lua.create_function(move |lua, args: Variadic<Value>| {
        let ctx = CallContext {
            lua,
            services: &services,
        };
        // `LIB:Method(...)` passes the library itself first
        let library: Option<Table> = lua.named_registry_value(&registry_key)?;
        let skip = match (args.first(), library) {
            (Some(Value::Table(first)), Some(library)) if *first == library => 1,
            _ => 0,
        };
        let rest = args.get(skip..).unwrap_or(&[]);
        let coerced = coerce_all(&ctx, method.spec.script_name, method.spec.args, rest, 1 + skip)?;
        let result = match method.func {
            HostFn::Static(func) => func(&ctx, &coerced),
            HostFn::Method(_) | HostFn::Invoke(_) => Err(HostError::Message(format!(
                "{owner}.{} needs a receiver",
                method.spec.script_name
            ))),
        };
        let values = result.map_err(into_script_error)?;
        push_results(lua, method.spec.returns, values, Value::Nil)
    })
}

pub(crate) fn static_library_key(owner: &str) -> String {
    format!("theme_engine.static.{owner}")
}

pub(crate) fn into_script_error(err: HostError) -> LuaError {
    match err {
        HostError::Script(inner) => inner,
        other => LuaError::external(other),
    }
}

fn push_results<'lua>(
    lua: &'lua Lua,
    returns: Returns,
    values: Vec<HostValue>,
    receiver: Value<'lua>,
) -> LuaResult<MultiValue<'lua>> {
    match returns {
        Returns::Nothing => Ok(MultiValue::new()),
        Returns::Receiver => Ok(MultiValue::from_vec(vec![receiver])),
        Returns::Count(count) => {
            let mut pushed = Vec::with_capacity(count);
            for value in values.iter().take(count) {
                pushed.push(host_to_script(lua, value)?);
            }
            pushed.resize(count, Value::Nil);
            Ok(MultiValue::from_vec(pushed))
        }
    }
}

/// Host state shared by every wrapper installed into one interpreter.
pub struct Services {
    pub registry: Arc<ActorRegistry>,
    pub metrics: Rc<dyn MetricSource>,
    pub textures: Rc<dyn TextureSource>,
    pub config: ManagerConfig,
    pub(crate) pending: RefCell<VecDeque<(Weak<RefCell<Actor>>, String)>>,
    pub(crate) flushing: Cell<bool>,
    pub(crate) command_depth: Cell<u32>,
}

impl Services {
    pub fn new(
        registry: Arc<ActorRegistry>,
        metrics: Rc<dyn MetricSource>,
        textures: Rc<dyn TextureSource>,
        config: ManagerConfig,
    ) -> Self {
        Self {
            registry,
            metrics,
            textures,
            config,
            pending: RefCell::new(VecDeque::new()),
            flushing: Cell::new(false),
            command_depth: Cell::new(0),
        }
    }

    pub fn limits(&self) -> MarshalLimits {
        MarshalLimits {
            max_depth: self.config.max_table_depth,
        }
    }
}

/// What a host function may use while servicing one script call.
pub struct CallContext<'a, 'lua> {
    pub lua: &'lua Lua,
    pub services: &'a Services,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set_x(actor: &mut Actor, args: &Args) -> HostResult {
        actor.node.position.x = args.f32(0)?;
        Ok(Vec::new())
    }

    fn get_x(actor: &mut Actor, _args: &Args) -> HostResult {
        Ok(vec![HostValue::from(actor.node.position.x)])
    }

    fn lookup(_ctx: &CallContext<'_, '_>, _args: &Args) -> HostResult {
        Ok(vec![HostValue::Boolean(true)])
    }

    fn host_table() -> HostMethodTable {
        let mut table = HostMethodTable::new();
        table.insert("set_x", HostFn::Method(set_x));
        table.insert("get_x", HostFn::Method(get_x));
        table.insert("lookup", HostFn::Static(lookup));
        table
    }

    #[test]
    fn missing_host_methods_are_skipped_with_warning() {
        let specs = [
            MethodSpec::new("x", "set_x", &[ArgKind::Float]).chained(),
            MethodSpec::new("ThatMethod", "does_not_exist", &[]),
            MethodSpec::new("GetX", "get_x", &[]).returns(1),
        ];
        let library = MethodLibrary::generate("Gauge", Receiver::Instance, &host_table(), &specs);
        assert!(library.contains("x"));
        assert!(library.contains("GetX"));
        assert!(!library.contains("ThatMethod"));
        assert_eq!(library.len(), 2);
        assert_eq!(library.warnings().len(), 1);
        assert_eq!(library.warnings()[0].host_name, "does_not_exist");
    }

    #[test]
    fn receiver_mismatches_are_skipped() {
        let specs = [
            MethodSpec::new("Lookup", "lookup", &[]).returns(1),
            MethodSpec::new("x", "set_x", &[ArgKind::Float]),
        ];
        let instance = MethodLibrary::generate("Gauge", Receiver::Instance, &host_table(), &specs);
        assert_eq!(instance.names().collect::<Vec<_>>(), vec!["x"]);
        let statics = MethodLibrary::generate("GAUGE", Receiver::Static, &host_table(), &specs);
        assert_eq!(statics.names().collect::<Vec<_>>(), vec!["Lookup"]);
        assert_eq!(statics.warnings()[0].reason, "host method needs a receiver");
    }

    #[test]
    fn later_specs_override_earlier_names() {
        let specs = [
            MethodSpec::new("x", "set_x", &[ArgKind::Float]),
            MethodSpec::new("x", "set_x", &[ArgKind::Float]).chained(),
        ];
        let library = MethodLibrary::generate("Gauge", Receiver::Instance, &host_table(), &specs);
        assert_eq!(library.len(), 1);
        assert_eq!(library.methods[0].spec.returns, Returns::Receiver);
    }
}
