//! Theme scripting runtime: builds actor trees from Lua theme scripts and
//! exposes actor methods back to those scripts.

pub mod actor;
pub mod config;
pub mod error;
pub mod lua_host;
pub mod scene;
pub mod value;

pub use actor::class::{ActorRegistry, Capability, ClassDef, StaticLibraryDef};
pub use actor::{Actor, ActorRef, ActorSnapshot};
pub use config::ManagerConfig;
pub use error::{CoercionError, HostError, MarshalError, ThemeError};
pub use lua_host::diagnostics::Diagnostic;
pub use lua_host::{ManagerState, ScriptManager, ScriptManagerBuilder};
pub use scene::{FileTextureSource, MemoryTextureSource, TextureSource};
pub use value::{HostTable, HostValue};
