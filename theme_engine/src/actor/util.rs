//! The `ActorUtil` static library: class checks, theme path resolution and
//! metric-driven actor setup.

use std::fs;
use std::path::{Path, PathBuf};

use super::class::StaticLibraryDef;
use super::theme::compile_command;
use super::ActorRef;
use crate::error::HostError;
use crate::lua_host::coerce::{ArgKind, Args};
use crate::lua_host::library::{CallContext, HostFn, HostMethodTable, HostResult, MethodSpec};
use crate::value::HostValue;

pub const ACTOR_UTIL: StaticLibraryDef = StaticLibraryDef {
    name: "ActorUtil",
    host_functions,
    method_specs,
};

const ACTOR_GROUP: &[ArgKind] = &[ArgKind::Object("Actor"), ArgKind::Str];

fn is_registered_class(ctx: &CallContext<'_, '_>, args: &Args) -> HostResult {
    let found = ctx.services.registry.is_registered_class(args.str(0)?);
    Ok(vec![HostValue::Boolean(found)])
}

/// Find `path` under the theme root. A path without an extension matches
/// the first file in its directory with the same stem.
pub fn resolve_path(root: &Path, path: &str) -> Option<PathBuf> {
    let candidate = root.join(path);
    if candidate.exists() {
        return Some(candidate);
    }
    let stem = candidate.file_name()?.to_str()?.to_string();
    let dir = candidate.parent()?;
    let mut matches: Vec<PathBuf> = fs::read_dir(dir)
        .ok()?
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|entry| {
            entry
                .file_stem()
                .and_then(|name| name.to_str())
                .map(|name| name.eq_ignore_ascii_case(&stem))
                .unwrap_or(false)
        })
        .collect();
    matches.sort();
    matches.into_iter().next()
}

fn resolve(ctx: &CallContext<'_, '_>, args: &Args) -> HostResult {
    let path = args.str(0)?;
    let optional = args.opt_bool(2)?.unwrap_or(false);
    match resolve_path(&ctx.services.config.theme_root, path) {
        Some(found) => Ok(vec![HostValue::String(found.display().to_string())]),
        None if optional => Ok(vec![HostValue::Nil]),
        None => Err(HostError::PathNotFound {
            path: path.to_string(),
        }),
    }
}

/// `FileType_*` name for a path, from the extension (or `Directory`).
pub fn file_type(root: &Path, path: &str) -> &'static str {
    let full = root.join(path);
    if full.is_dir() {
        return "FileType_Directory";
    }
    let extension = Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "png" | "jpg" | "jpeg" | "gif" | "bmp" => "FileType_Bitmap",
        "sprite" => "FileType_Sprite",
        "lua" => "FileType_Lua",
        "txt" | "model" => "FileType_Model",
        "avi" | "mpg" | "mpeg" | "mp4" | "ogv" => "FileType_Movie",
        "ogg" | "mp3" | "wav" | "oga" => "FileType_Sound",
        "ini" => "FileType_Ini",
        _ => "FileType_Unknown",
    }
}

fn get_file_type(ctx: &CallContext<'_, '_>, args: &Args) -> HostResult {
    let kind = file_type(&ctx.services.config.theme_root, args.str(0)?);
    Ok(vec![HostValue::from(kind)])
}

fn actor_name(actor: &ActorRef) -> Result<String, HostError> {
    let name = actor
        .try_borrow()
        .map_err(|_| HostError::ActorBusy)?
        .name()
        .to_string();
    if name.is_empty() {
        return Err(HostError::InvalidValue {
            what: "actor name",
            value: "actor has no Name".to_string(),
        });
    }
    Ok(name)
}

fn metric_f(ctx: &CallContext<'_, '_>, group: &str, key: &str) -> Result<f32, HostError> {
    match ctx.services.metrics.metric_f(group, key) {
        Some(value) => Ok(value as f32),
        None if ctx.services.metrics.metric(group, key).is_some() => {
            Err(HostError::InvalidMetric {
                group: group.to_string(),
                key: key.to_string(),
                reason: "not a number".to_string(),
            })
        }
        None => Err(HostError::MissingMetric {
            group: group.to_string(),
            key: key.to_string(),
        }),
    }
}

/// Position from the `<Name>X` / `<Name>Y` metrics of `group`.
fn apply_xy(ctx: &CallContext<'_, '_>, actor: &ActorRef, group: &str) -> Result<(), HostError> {
    let name = actor_name(actor)?;
    let x = metric_f(ctx, group, &format!("{name}X"))?;
    let y = metric_f(ctx, group, &format!("{name}Y"))?;
    // (0, 0) means "leave where it is".
    if x == 0.0 && y == 0.0 {
        return Ok(());
    }
    let mut actor = actor.try_borrow_mut().map_err(|_| HostError::ActorBusy)?;
    actor.node.position.x = x;
    actor.node.position.y = y;
    Ok(())
}

/// Install every `<name><Cmd>Command` metric of `group` as command `<Cmd>`.
fn load_commands(
    ctx: &CallContext<'_, '_>,
    actor: &ActorRef,
    group: &str,
    name: &str,
) -> Result<usize, HostError> {
    let mut loaded = 0;
    for key in ctx.services.metrics.names_beginning_with(group, name) {
        let Some(command) = key
            .strip_prefix(name)
            .and_then(|rest| rest.strip_suffix("Command"))
            .filter(|command| !command.is_empty())
        else {
            continue;
        };
        let function = compile_command(ctx, group, &key)?;
        actor
            .try_borrow_mut()
            .map_err(|_| HostError::ActorBusy)?
            .set_command(command, function);
        loaded += 1;
    }
    log::debug!("loaded {loaded} commands for {name} from [{group}]");
    Ok(loaded)
}

fn set_xy(ctx: &CallContext<'_, '_>, args: &Args) -> HostResult {
    apply_xy(ctx, args.actor(0)?, args.str(1)?)?;
    Ok(Vec::new())
}

fn load_all_commands(ctx: &CallContext<'_, '_>, args: &Args) -> HostResult {
    let actor = args.actor(0)?;
    let name = actor_name(actor)?;
    load_commands(ctx, actor, args.str(1)?, &name)?;
    Ok(Vec::new())
}

fn load_all_commands_from_name(ctx: &CallContext<'_, '_>, args: &Args) -> HostResult {
    let actor = args.actor(0)?;
    actor_name(actor)?;
    load_commands(ctx, actor, args.str(1)?, args.str(2)?)?;
    Ok(Vec::new())
}

fn load_all_commands_and_set_xy(ctx: &CallContext<'_, '_>, args: &Args) -> HostResult {
    let actor = args.actor(0)?;
    let group = args.str(1)?;
    let name = actor_name(actor)?;
    load_commands(ctx, actor, group, &name)?;
    apply_xy(ctx, actor, group)?;
    Ok(Vec::new())
}

fn host_functions(table: &mut HostMethodTable) {
    table.insert("is_registered_class", HostFn::Static(is_registered_class));
    table.insert("resolve_path", HostFn::Static(resolve));
    table.insert("get_file_type", HostFn::Static(get_file_type));
    table.insert("set_xy", HostFn::Static(set_xy));
    table.insert("load_all_commands", HostFn::Static(load_all_commands));
    table.insert(
        "load_all_commands_from_name",
        HostFn::Static(load_all_commands_from_name),
    );
    table.insert(
        "load_all_commands_and_set_xy",
        HostFn::Static(load_all_commands_and_set_xy),
    );
}

fn method_specs() -> Vec<MethodSpec> {
    use ArgKind::{Int, Optional, Str};
    vec![
        MethodSpec::new("IsRegisteredClass", "is_registered_class", &[Str]).returns(1),
        MethodSpec::new(
            "ResolvePath",
            "resolve_path",
            &[Str, Optional(&Int), Optional(&ArgKind::BoolOrInt)],
        )
        .returns(1),
        MethodSpec::new("GetFileType", "get_file_type", &[Str]).returns(1),
        MethodSpec::new("SetXY", "set_xy", ACTOR_GROUP),
        MethodSpec::new("LoadAllCommands", "load_all_commands", ACTOR_GROUP),
        MethodSpec::new(
            "LoadAllCommandsFromName",
            "load_all_commands_from_name",
            &[ArgKind::Object("Actor"), Str, Str],
        ),
        MethodSpec::new(
            "LoadAllCommandsAndSetXY",
            "load_all_commands_and_set_xy",
            ACTOR_GROUP,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_path_matches_stems() {
        let dir = tempfile::tempdir().expect("tempdir");
        let graphics = dir.path().join("Graphics");
        fs::create_dir_all(&graphics).expect("mkdir");
        fs::write(graphics.join("bg.png"), b"not really a png").expect("write");
        assert_eq!(
            resolve_path(dir.path(), "Graphics/bg.png"),
            Some(graphics.join("bg.png"))
        );
        assert_eq!(
            resolve_path(dir.path(), "Graphics/bg"),
            Some(graphics.join("bg.png"))
        );
        assert_eq!(resolve_path(dir.path(), "Graphics/missing"), None);
        assert_eq!(resolve_path(dir.path(), "Nowhere/bg"), None);
    }

    #[test]
    fn file_types_follow_extensions() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert_eq!(file_type(dir.path(), "a.PNG"), "FileType_Bitmap");
        assert_eq!(file_type(dir.path(), "b.lua"), "FileType_Lua");
        assert_eq!(file_type(dir.path(), "c.ogg"), "FileType_Sound");
        assert_eq!(file_type(dir.path(), "d.xyz"), "FileType_Unknown");
        assert_eq!(file_type(dir.path(), ""), "FileType_Directory");
    }
}
