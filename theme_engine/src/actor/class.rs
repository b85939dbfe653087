//! Class definitions and the process-wide actor registry.
//!
//! A class is an ordered list of capabilities: its ancestors' capabilities
//! first, then its own. Each capability contributes host functions, method
//! specs and descriptor-option handling; the class library is the
//! concatenation, with later capabilities overriding earlier script names.

use std::collections::BTreeMap;
use std::sync::Arc;

use once_cell::sync::{Lazy, OnceCell};

use super::{frame, methods, sprite, theme, util, ActorRef};
use crate::error::{HostError, ThemeError};
use crate::lua_host::library::{
    BindingWarning, CallContext, HostMethodTable, MethodLibrary, MethodSpec, Receiver,
};
use crate::value::HostTable;

pub trait Capability: Send + Sync {
    fn name(&self) -> &'static str;

    fn host_methods(&self, table: &mut HostMethodTable);

    fn method_specs(&self) -> Vec<MethodSpec>;

    /// Consume the descriptor options this capability understands. Runs after
    /// the base descriptor step, in capability order.
    fn load_options(
        &self,
        _ctx: &CallContext<'_, '_>,
        _actor: &ActorRef,
        _options: &HostTable,
    ) -> Result<(), HostError> {
        Ok(())
    }
}

#[derive(Clone, Copy)]
pub struct ClassDef {
    pub name: &'static str,
    pub parent: Option<&'static str>,
    pub capability: &'static dyn Capability,
}

#[derive(Clone, Copy)]
pub struct StaticLibraryDef {
    pub name: &'static str,
    pub host_functions: fn(&mut HostMethodTable),
    pub method_specs: fn() -> Vec<MethodSpec>,
}

pub struct ClassEntry {
    def: ClassDef,
    capabilities: Vec<&'static dyn Capability>,
    library: OnceCell<MethodLibrary>,
}

impl ClassEntry {
    pub fn name(&self) -> &'static str {
        self.def.name
    }

    pub fn parent(&self) -> Option<&'static str> {
        self.def.parent
    }

    pub fn capability_names(&self) -> Vec<&'static str> {
        self.capabilities.iter().map(|cap| cap.name()).collect()
    }

    pub fn library(&self) -> &MethodLibrary {
        self.library.get_or_init(|| {
            let mut host = HostMethodTable::new();
            let mut specs = Vec::new();
            for capability in &self.capabilities {
                capability.host_methods(&mut host);
                specs.extend(capability.method_specs());
            }
            MethodLibrary::generate(self.def.name, Receiver::Instance, &host, &specs)
        })
    }

    /// Hand the descriptor options to every capability of the class.
    pub fn load_options(
        &self,
        ctx: &CallContext<'_, '_>,
        actor: &ActorRef,
        options: &HostTable,
    ) -> Result<(), HostError> {
        for capability in &self.capabilities {
            capability.load_options(ctx, actor, options)?;
        }
        Ok(())
    }
}

struct StaticEntry {
    def: StaticLibraryDef,
    library: OnceCell<MethodLibrary>,
}

impl StaticEntry {
    fn library(&self) -> &MethodLibrary {
        self.library.get_or_init(|| {
            let mut host = HostMethodTable::new();
            (self.def.host_functions)(&mut host);
            MethodLibrary::generate(self.def.name, Receiver::Static, &host, &(self.def.method_specs)())
        })
    }
}

pub struct ActorRegistry {
    classes: BTreeMap<&'static str, ClassEntry>,
    statics: BTreeMap<&'static str, StaticEntry>,
    warnings: OnceCell<Vec<BindingWarning>>,
}

static GLOBAL: Lazy<Arc<ActorRegistry>> = Lazy::new(|| Arc::new(ActorRegistry::builtin()));

impl ActorRegistry {
    /// The registry holding the built-in classes and static libraries.
    pub fn global() -> Arc<ActorRegistry> {
        GLOBAL.clone()
    }

    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Built-in classes, parents before children.
    pub fn builtin_builder() -> RegistryBuilder {
        Self::builder()
            .class(methods::ACTOR_CLASS)
            .class(frame::ACTOR_FRAME_CLASS)
            .class(sprite::SPRITE_CLASS)
            .static_library(util::ACTOR_UTIL)
            .static_library(theme::THEME_LIBRARY)
    }

    fn builtin() -> ActorRegistry {
        let (registry, problems) = Self::builtin_builder().assemble();
        for problem in problems {
            log::error!("builtin class registry: {problem}");
        }
        registry
    }

    pub fn is_registered_class(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    pub fn class(&self, name: &str) -> Option<&ClassEntry> {
        self.classes.get(name)
    }

    pub fn class_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.classes.keys().copied()
    }

    pub fn static_library_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.statics.keys().copied()
    }

    /// True when `class` is `ancestor` or derives from it.
    pub fn is_kind_of(&self, class: &str, ancestor: &str) -> bool {
        let mut current = self.classes.get(class);
        while let Some(entry) = current {
            if entry.def.name == ancestor {
                return true;
            }
            current = entry.def.parent.and_then(|parent| self.classes.get(parent));
        }
        false
    }

    pub fn library(&self, class: &str) -> Option<&MethodLibrary> {
        self.classes.get(class).map(ClassEntry::library)
    }

    pub fn static_library(&self, name: &str) -> Option<&MethodLibrary> {
        self.statics.get(name).map(StaticEntry::library)
    }

    /// Build every library now. Safe to call any number of times; the
    /// libraries are generated once and the warnings collected once.
    pub fn ensure_initialized(&self) -> &[BindingWarning] {
        self.warnings.get_or_init(|| {
            let mut warnings = Vec::new();
            for entry in self.classes.values() {
                warnings.extend_from_slice(entry.library().warnings());
            }
            for entry in self.statics.values() {
                warnings.extend_from_slice(entry.library().warnings());
            }
            log::debug!(
                "actor registry ready: {} classes, {} static libraries, {} binding warnings",
                self.classes.len(),
                self.statics.len(),
                warnings.len()
            );
            warnings
        })
    }

    pub fn warnings(&self) -> &[BindingWarning] {
        self.ensure_initialized()
    }
}

#[derive(Default)]
pub struct RegistryBuilder {
    classes: Vec<ClassDef>,
    statics: Vec<StaticLibraryDef>,
}

impl RegistryBuilder {
    pub fn class(mut self, def: ClassDef) -> Self {
        self.classes.push(def);
        self
    }

    pub fn static_library(mut self, def: StaticLibraryDef) -> Self {
        self.statics.push(def);
        self
    }

    pub fn build(self) -> Result<ActorRegistry, ThemeError> {
        let (registry, problems) = self.assemble();
        match problems.into_iter().next() {
            Some(problem) => Err(ThemeError::Registry(problem)),
            None => Ok(registry),
        }
    }

    /// Register what can be registered; report the rest.
    fn assemble(self) -> (ActorRegistry, Vec<String>) {
        let mut classes: BTreeMap<&'static str, ClassEntry> = BTreeMap::new();
        let mut problems = Vec::new();
        for def in self.classes {
            if classes.contains_key(def.name) {
                problems.push(format!("class '{}' registered twice", def.name));
                continue;
            }
            let mut capabilities = match def.parent {
                None => Vec::new(),
                Some(parent) => match classes.get(parent) {
                    Some(entry) => entry.capabilities.clone(),
                    None => {
                        problems.push(format!(
                            "class '{}' names unknown parent '{parent}'",
                            def.name
                        ));
                        continue;
                    }
                },
            };
            capabilities.push(def.capability);
            classes.insert(
                def.name,
                ClassEntry {
                    def,
                    capabilities,
                    library: OnceCell::new(),
                },
            );
        }
        let mut statics = BTreeMap::new();
        for def in self.statics {
            if classes.contains_key(def.name) || statics.contains_key(def.name) {
                problems.push(format!("library name '{}' is already taken", def.name));
                continue;
            }
            statics.insert(
                def.name,
                StaticEntry {
                    def,
                    library: OnceCell::new(),
                },
            );
        }
        let registry = ActorRegistry {
            classes,
            statics,
            warnings: OnceCell::new(),
        };
        (registry, problems)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_classes_are_registered() {
        let registry = ActorRegistry::global();
        assert!(registry.is_registered_class("Actor"));
        assert!(registry.is_registered_class("ActorFrame"));
        assert!(registry.is_registered_class("Sprite"));
        assert!(!registry.is_registered_class("Nonexistent"));
        assert!(registry.warnings().is_empty(), "{:?}", registry.warnings());
    }

    #[test]
    fn subclasses_inherit_parent_methods() {
        let registry = ActorRegistry::global();
        assert!(registry.is_kind_of("Sprite", "Actor"));
        assert!(!registry.is_kind_of("Actor", "Sprite"));
        let sprite = registry.library("Sprite").expect("sprite library");
        assert!(sprite.contains("x"));
        assert!(sprite.contains("Load"));
        let actor = registry.library("Actor").expect("actor library");
        assert!(!actor.contains("Load"));
        assert_eq!(
            registry.class("Sprite").expect("sprite").capability_names(),
            vec!["Actor", "Sprite"]
        );
    }

    #[test]
    fn libraries_are_built_once() {
        let registry = ActorRegistry::global();
        let first = registry.library("Actor").expect("first") as *const MethodLibrary;
        registry.ensure_initialized();
        registry.ensure_initialized();
        let second = registry.library("Actor").expect("second") as *const MethodLibrary;
        assert_eq!(first, second);
    }

    #[test]
    fn unknown_parents_fail_the_build() {
        let orphan = ClassDef {
            name: "Orphan",
            parent: Some("Missing"),
            capability: methods::ACTOR_CLASS.capability,
        };
        let err = ActorRegistry::builder()
            .class(orphan)
            .build()
            .err()
            .expect("build rejected");
        assert!(err.to_string().contains("unknown parent"), "{err}");
    }

    #[test]
    fn static_libraries_are_separate_from_classes() {
        let registry = ActorRegistry::global();
        let names: Vec<_> = registry.static_library_names().collect();
        assert_eq!(names, vec!["ActorUtil", "THEME"]);
        assert!(!registry.is_registered_class("THEME"));
        let util = registry.static_library("ActorUtil").expect("util");
        assert!(util.contains("IsRegisteredClass"));
    }
}
