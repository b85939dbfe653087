//! Script manager: owns one interpreter and turns theme scripts into actor
//! trees.

pub mod binding;
pub mod coerce;
pub mod commands;
pub mod console;
pub mod diagnostics;
pub mod library;

use std::cell::Cell;
use std::fs;
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;

use mlua::{Function, Lua, LuaOptions, MultiValue, StdLib, Table, Value};
use theme_metrics::Metrics;

use crate::actor::class::ActorRegistry;
use crate::actor::theme::MetricSource;
use crate::actor::{Actor, ActorRef};
use crate::config::ManagerConfig;
use crate::error::{HostError, ThemeError};
use crate::scene::{FileTextureSource, TextureSource};
use crate::value::{host_to_script, script_to_host, HostValue};
use commands::CommandScope;
use console::{Console, ConsoleSink};
use diagnostics::Diagnostic;
use library::{CallContext, Services};

pub use library::BindingWarning;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    Uninitialized,
    Initializing,
    Ready,
    Compiling,
    Compiled,
    CompileError,
    Running,
    RunComplete,
    RuntimeError,
}

/// A compiled, not yet executed, script chunk.
pub struct Chunk<'lua> {
    name: String,
    function: Function<'lua>,
}

impl Chunk<'_> {
    pub fn name(&self) -> &str {
        &self.name
    }
}

pub struct ScriptManager {
    lua: Lua,
    services: Rc<Services>,
    console: Rc<Console>,
    state: Cell<ManagerState>,
}

#[derive(Default)]
pub struct ScriptManagerBuilder {
    registry: Option<Arc<ActorRegistry>>,
    metrics: Option<Rc<dyn MetricSource>>,
    textures: Option<Rc<dyn TextureSource>>,
    config: ManagerConfig,
    sink: Option<ConsoleSink>,
}

impl ScriptManagerBuilder {
    pub fn registry(mut self, registry: Arc<ActorRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn metrics(mut self, metrics: Rc<dyn MetricSource>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn textures(mut self, textures: Rc<dyn TextureSource>) -> Self {
        self.textures = Some(textures);
        self
    }

    pub fn config(mut self, config: ManagerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn console_sink(mut self, sink: ConsoleSink) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn build(self) -> Result<ScriptManager, ThemeError> {
        let registry = self.registry.unwrap_or_else(ActorRegistry::global);
        let textures = self
            .textures
            .unwrap_or_else(|| Rc::new(FileTextureSource::new(self.config.theme_root.clone())));
        let metrics = self.metrics.unwrap_or_else(|| Rc::new(Metrics::new()));
        let services = Rc::new(Services::new(registry, metrics, textures, self.config));
        let console = Rc::new(Console::new(self.sink.unwrap_or_else(console::default_sink)));
        let manager = ScriptManager {
            lua: Lua::new_with(StdLib::ALL_SAFE, LuaOptions::default())?,
            services,
            console,
            state: Cell::new(ManagerState::Uninitialized),
        };
        manager.initialize()?;
        Ok(manager)
    }
}

impl ScriptManager {
    pub fn builder() -> ScriptManagerBuilder {
        ScriptManagerBuilder::default()
    }

    /// Manager over the global registry with default collaborators.
    pub fn new(config: ManagerConfig) -> Result<Self, ThemeError> {
        Self::builder().config(config).build()
    }

    fn initialize(&self) -> Result<(), ThemeError> {
        self.state.set(ManagerState::Initializing);
        let registry = &self.services.registry;
        let warnings = registry.ensure_initialized();
        if self.services.config.strict_bindings {
            if let Some(first) = warnings.first() {
                return Err(ThemeError::Binding {
                    class: first.owner.clone(),
                    warnings: warnings
                        .iter()
                        .filter(|warning| warning.owner == first.owner)
                        .cloned()
                        .collect(),
                });
            }
        }
        console::install(&self.lua, self.console.clone())?;
        binding::install_instance_map(&self.lua)?;
        binding::install_libraries(&self.lua, &self.services)?;
        log::debug!(
            "script manager ready ({} classes)",
            registry.class_names().count()
        );
        self.state.set(ManagerState::Ready);
        Ok(())
    }

    pub fn state(&self) -> ManagerState {
        self.state.get()
    }

    pub fn lua(&self) -> &Lua {
        &self.lua
    }

    pub fn registry(&self) -> &Arc<ActorRegistry> {
        &self.services.registry
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.services.config
    }

    fn context(&self) -> CallContext<'_, '_> {
        CallContext {
            lua: &self.lua,
            services: &self.services,
        }
    }

    pub fn compile(&self, source: &str, chunk: &str) -> Result<Chunk<'_>, ThemeError> {
        self.state.set(ManagerState::Compiling);
        match self
            .lua
            .load(source)
            .set_name(format!("={chunk}"))
            .into_function()
        {
            Ok(function) => {
                self.state.set(ManagerState::Compiled);
                Ok(Chunk {
                    name: chunk.to_string(),
                    function,
                })
            }
            Err(err) => {
                self.state.set(ManagerState::CompileError);
                Err(match err {
                    mlua::Error::SyntaxError { message, .. } => ThemeError::Syntax {
                        chunk: chunk.to_string(),
                        message,
                    },
                    other => ThemeError::from_script(other),
                })
            }
        }
    }

    /// Syntax-check without running.
    pub fn check(&self, source: &str, chunk: &str) -> Vec<Diagnostic> {
        diagnostics::check(&self.lua, source, chunk)
    }

    /// Compile and execute. A returned descriptor with a registered `Class`
    /// is loaded into an actor tree; any other return value is logged.
    pub fn run(&self, source: &str, chunk: &str) -> Result<Option<ActorRef>, ThemeError> {
        if self.state.get() == ManagerState::Running {
            return Err(ThemeError::Busy);
        }
        let compiled = self.compile(source, chunk)?;
        self.execute(&compiled)
    }

    pub fn run_file(&self, path: &Path) -> Result<Option<ActorRef>, ThemeError> {
        let source = fs::read_to_string(path).map_err(|source| ThemeError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let chunk = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        self.run(&source, &chunk)
    }

    pub fn execute(&self, chunk: &Chunk<'_>) -> Result<Option<ActorRef>, ThemeError> {
        if self.state.get() == ManagerState::Running {
            return Err(ThemeError::Busy);
        }
        self.state.set(ManagerState::Running);
        let result = self.execute_inner(chunk);
        self.state.set(match result {
            Ok(_) => ManagerState::RunComplete,
            Err(_) => ManagerState::RuntimeError,
        });
        self.console.flush();
        result
    }

    fn execute_inner(&self, chunk: &Chunk<'_>) -> Result<Option<ActorRef>, ThemeError> {
        let values: MultiValue = chunk
            .function
            .call(())
            .map_err(ThemeError::from_script)?;
        let value = values.into_iter().next().unwrap_or(Value::Nil);
        let table = match value {
            Value::Table(table) => table,
            Value::Nil => {
                log::debug!("{} returned nothing", chunk.name);
                return Ok(None);
            }
            other => {
                self.log_result(&chunk.name, &other);
                return Ok(None);
            }
        };
        let class = table.raw_get::<_, Value>("Class").map_err(ThemeError::from_script)?;
        let registered = match &class {
            Value::String(name) => name
                .to_str()
                .map(|name| self.services.registry.is_registered_class(name))
                .unwrap_or(false),
            _ => false,
        };
        if registered {
            return self.load_actor(&table).map(Some);
        }
        if !matches!(class, Value::Nil) {
            log::warn!("{} returned a table with unknown Class; not loading an actor", chunk.name);
        }
        self.log_result(&chunk.name, &Value::Table(table));
        Ok(None)
    }

    fn log_result(&self, chunk: &str, value: &Value<'_>) {
        let rendered = script_to_host(&self.lua, value, self.services.limits())
            .ok()
            .and_then(|host| serde_json::to_string(&host).ok())
            .unwrap_or_else(|| value.type_name().to_string());
        log::info!("{chunk} returned {rendered}");
    }

    /// Resolve a descriptor table into an actor tree: Init runs before the
    /// children are resolved, children attach in ascending index order, and
    /// commands queued during the load play once the whole tree exists.
    pub fn load_actor<'lua>(&'lua self, descriptor: &Table<'lua>) -> Result<ActorRef, ThemeError> {
        let ctx = self.context();
        let mut ancestors = Vec::new();
        let actor = self.resolve(&ctx, descriptor, &mut ancestors)?;
        commands::flush_queued(&ctx).map_err(ThemeError::from_host)?;
        Ok(actor)
    }

    fn resolve<'lua>(
        &'lua self,
        ctx: &CallContext<'_, 'lua>,
        table: &Table<'lua>,
        ancestors: &mut Vec<Table<'lua>>,
    ) -> Result<ActorRef, ThemeError> {
        let class = match table.raw_get::<_, Value>("Class").map_err(ThemeError::from_script)? {
            Value::String(class) => String::from_utf8_lossy(class.as_bytes()).into_owned(),
            Value::Nil => return Err(ThemeError::MissingClass),
            other => {
                return Err(ThemeError::InvalidDescriptor {
                    key: "Class".to_string(),
                    reason: format!("expected string, got {}", other.type_name()),
                })
            }
        };
        if ancestors.iter().any(|ancestor| ancestor == table) {
            return Err(ThemeError::DescriptorCycle { class });
        }
        let limit = self.services.config.max_actor_depth;
        if ancestors.len() >= limit {
            return Err(ThemeError::DescriptorTooDeep { limit });
        }
        let registry = &self.services.registry;
        let entry = registry
            .class(&class)
            .ok_or_else(|| ThemeError::UnregisteredClass {
                class: class.clone(),
            })?;

        let parts = binding::read_descriptor(&self.lua, &class, table, self.services.limits())?;
        let actor = Actor::new(&class);
        binding::wrap_instance(&self.lua, &actor).map_err(ThemeError::from_script)?;
        let options = parts.descriptor.options.clone();
        actor.borrow_mut().load_from_descriptor(parts.descriptor);
        entry
            .load_options(ctx, &actor, &options)
            .map_err(ThemeError::from_host)?;

        let _scope = CommandScope::enter(&self.services);
        commands::play_command(ctx, &actor, "Init", None).map_err(ThemeError::from_host)?;
        ancestors.push(table.clone());
        for (_, child) in &parts.children {
            let child = self.resolve(ctx, child, ancestors)?;
            Actor::attach_child(&actor, child);
        }
        ancestors.pop();
        log::trace!("loaded {class} with {} children", parts.children.len());
        Ok(actor)
    }

    /// Play a command from the host side; queued commands flush afterwards.
    pub fn play_command(
        &self,
        actor: &ActorRef,
        name: &str,
        params: Option<HostValue>,
    ) -> Result<(), ThemeError> {
        commands::play_command(&self.context(), actor, name, params).map_err(ThemeError::from_host)
    }

    /// Expose an actor's script proxy as a global.
    pub fn set_global(&self, name: &str, value: &HostValue) -> Result<(), ThemeError> {
        let value = host_to_script(&self.lua, value)?;
        self.lua.globals().set(name, value)?;
        Ok(())
    }

    pub fn proxy_of(actor: &ActorRef) -> Result<HostValue, ThemeError> {
        let actor = actor
            .try_borrow()
            .map_err(|_| ThemeError::Host(HostError::ActorBusy))?;
        Ok(actor
            .proxy()
            .cloned()
            .map(HostValue::Opaque)
            .unwrap_or(HostValue::Nil))
    }
}

impl Drop for ScriptManager {
    fn drop(&mut self) {
        self.console.flush();
    }
}
