//! Class metatables, the `Def` namespace and instance tags.
//!
//! Every actor is represented in script by a plain proxy table whose
//! metatable routes method lookups to the class library. The proxy's
//! identity is recorded in a weak-keyed registry table so host code can map
//! a proxy back to its actor without trusting anything stored on the table.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use mlua::{Error as LuaError, Lua, Result as LuaResult, Table, UserData, Value};

use super::coerce::mismatch;
use super::library::Services;
use crate::actor::class::ActorRegistry;
use crate::actor::{Actor, ActorRef, Descriptor};
use crate::error::ThemeError;
use crate::value::{canonical_index, key_string, script_to_host, HostTable, MarshalLimits, Opaque};

const INSTANCE_MAP: &str = "theme_engine.instances";

/// What `getmetatable` returns for bound tables.
pub const PROTECTED_MARKER: &str = "protected metatable";

pub const COMMAND_SUFFIX: &str = "Command";

#[derive(Clone)]
pub struct InstanceTag {
    pub actor: Weak<RefCell<Actor>>,
    pub class: String,
}

impl UserData for InstanceTag {}

fn class_key(class: &str) -> String {
    format!("theme_engine.class.{class}")
}

pub fn install_instance_map(lua: &Lua) -> LuaResult<()> {
    let map = lua.create_table()?;
    let mode = lua.create_table()?;
    mode.set("__mode", "k")?;
    map.set_metatable(Some(mode));
    lua.set_named_registry_value(INSTANCE_MAP, map)
}

pub fn instance_tag(lua: &Lua, proxy: &Table) -> LuaResult<Option<InstanceTag>> {
    let map: Table = lua.named_registry_value(INSTANCE_MAP)?;
    match map.raw_get::<_, Value>(proxy.clone())? {
        Value::UserData(data) => Ok(Some(data.borrow::<InstanceTag>()?.clone())),
        _ => Ok(None),
    }
}

fn protect(lua: &Lua, table: &Table) -> LuaResult<()> {
    let meta = match table.get_metatable() {
        Some(meta) => meta,
        None => lua.create_table()?,
    };
    meta.set("__metatable", PROTECTED_MARKER)?;
    table.set_metatable(Some(meta));
    Ok(())
}

/// Install the instance metatable for `class`, indexing into `library`.
/// Both tables are hidden from `getmetatable`.
pub fn install_class(lua: &Lua, class: &str, library: Table) -> LuaResult<()> {
    protect(lua, &library)?;
    let meta = lua.create_table()?;
    meta.set("__index", library)?;
    meta.set("__metatable", PROTECTED_MARKER)?;
    meta.set("__name", class)?;
    let label = class.to_string();
    let tostring = lua.create_function(move |lua, proxy: Table| {
        let name = instance_tag(lua, &proxy)?
            .and_then(|tag| tag.actor.upgrade())
            .and_then(|actor| actor.try_borrow().ok().map(|a| a.name().to_string()))
            .unwrap_or_default();
        Ok(if name.is_empty() {
            label.clone()
        } else {
            format!("{label} ({name})")
        })
    })?;
    meta.set("__tostring", tostring)?;
    lua.set_named_registry_value(&class_key(class), meta)
}

/// Install one library table per registered class plus the static
/// libraries as globals.
pub fn install_libraries(lua: &Lua, services: &Rc<Services>) -> LuaResult<()> {
    let registry = services.registry.clone();
    for class in registry.class_names() {
        if let Some(library) = registry.library(class) {
            let table = library.install(lua, services.clone())?;
            install_class(lua, class, table)?;
        }
    }
    for name in registry.static_library_names() {
        if let Some(library) = registry.static_library(name) {
            let table = library.install(lua, services.clone())?;
            protect(lua, &table)?;
            lua.set_named_registry_value(&super::library::static_library_key(name), table.clone())?;
            lua.globals().set(name, table)?;
        }
    }
    install_def(lua, &registry)
}

/// `Def.<Class>{...}` stamps `Class` on the table and returns it; actors are
/// built later when the manager loads the returned descriptor.
pub fn install_def(lua: &Lua, registry: &ActorRegistry) -> LuaResult<()> {
    let def = lua.create_table()?;
    for class in registry.class_names() {
        let factory = lua.create_function(move |lua, arg: Value| {
            let table = match arg {
                Value::Nil => lua.create_table()?,
                Value::Table(table) => table,
                other => return Err(mismatch(&format!("Def.{class}"), 1, "table", &other)),
            };
            table.set("Class", class)?;
            Ok(table)
        })?;
        def.set(class, factory)?;
    }
    lua.globals().set("Def", def)
}

/// Create the script proxy for an actor and tag it.
pub fn wrap_instance<'lua>(lua: &'lua Lua, actor: &ActorRef) -> LuaResult<Table<'lua>> {
    let class = actor.borrow().class().to_string();
    let meta: Table = lua
        .named_registry_value::<Option<Table>>(&class_key(&class))?
        .ok_or_else(|| LuaError::RuntimeError(format!("class '{class}' has no metatable")))?;
    let proxy = lua.create_table()?;
    proxy.set_metatable(Some(meta));
    let tag = InstanceTag {
        actor: Rc::downgrade(actor),
        class,
    };
    let map: Table = lua.named_registry_value(INSTANCE_MAP)?;
    map.raw_set(proxy.clone(), lua.create_userdata(tag)?)?;
    actor
        .borrow_mut()
        .set_proxy(Opaque::capture(lua, Value::Table(proxy.clone()))?);
    Ok(proxy)
}

/// A descriptor split into its host fields and its child tables.
pub struct DescriptorParts<'lua> {
    pub descriptor: Descriptor,
    /// Child descriptors in ascending index order.
    pub children: Vec<(i64, Table<'lua>)>,
}

fn invalid(key: &str, reason: impl Into<String>) -> ThemeError {
    ThemeError::InvalidDescriptor {
        key: key.to_string(),
        reason: reason.into(),
    }
}

/// Read every key of a descriptor table. `class` has already been resolved
/// by the caller.
pub fn read_descriptor<'lua>(
    lua: &'lua Lua,
    class: &str,
    table: &Table<'lua>,
    limits: MarshalLimits,
) -> Result<DescriptorParts<'lua>, ThemeError> {
    let mut descriptor = Descriptor {
        class: class.to_string(),
        ..Descriptor::default()
    };
    let mut children = Vec::new();
    let mut options = BTreeMap::new();
    for pair in table.clone().pairs::<Value, Value>() {
        let (key, value) = pair.map_err(ThemeError::from_script)?;
        let key = key_string(&key).map_err(ThemeError::Marshal)?;
        if key == "Class" {
            continue;
        }
        if key == "Name" {
            match value {
                Value::String(name) => {
                    descriptor.name = Some(String::from_utf8_lossy(name.as_bytes()).into_owned())
                }
                other => return Err(invalid(&key, format!("expected string, got {}", other.type_name()))),
            }
            continue;
        }
        if let Some(index) = canonical_index(&key).filter(|index| *index >= 0) {
            match value {
                Value::Table(child) => children.push((index, child)),
                other => {
                    return Err(invalid(
                        &key,
                        format!("child descriptor must be a table, got {}", other.type_name()),
                    ))
                }
            }
            continue;
        }
        if let Some(command) = key.strip_suffix(COMMAND_SUFFIX).filter(|name| !name.is_empty()) {
            match value {
                Value::Function(_) => {
                    let handle = Opaque::capture(lua, value).map_err(ThemeError::from_script)?;
                    descriptor.commands.insert(command.to_string(), handle);
                }
                other => {
                    return Err(invalid(
                        &key,
                        format!("commands must be functions, got {}", other.type_name()),
                    ))
                }
            }
            continue;
        }
        let converted = script_to_host(lua, &value, limits).map_err(ThemeError::from_script)?;
        options.insert(key, converted);
    }
    children.sort_by_key(|(index, _)| *index);
    descriptor.options = options.into_iter().collect::<HostTable>();
    Ok(DescriptorParts {
        descriptor,
        children,
    })
}
