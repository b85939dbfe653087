//! `ActorFrame`: an actor whose children scripts can address.

use super::class::{Capability, ClassDef};
use super::methods::{done, one, NO_ARGS, S};
use super::{Actor, ActorRef};
use crate::lua_host::coerce::{ArgKind, Args};
use crate::lua_host::commands;
use crate::lua_host::library::{CallContext, HostFn, HostMethodTable, HostResult, MethodSpec};
use crate::value::{HostTable, HostValue};

pub struct FrameCapability;

pub const ACTOR_FRAME_CLASS: ClassDef = ClassDef {
    name: "ActorFrame",
    parent: Some("Actor"),
    capability: &FrameCapability,
};

fn proxy_value(actor: &ActorRef) -> HostValue {
    actor
        .try_borrow()
        .ok()
        .and_then(|actor| actor.proxy().cloned())
        .map(HostValue::Opaque)
        .unwrap_or(HostValue::Nil)
}

fn get_child(actor: &mut Actor, args: &Args) -> HostResult {
    Ok(vec![actor
        .child_by_name(args.str(0)?)
        .map(|child| proxy_value(&child))
        .unwrap_or(HostValue::Nil)])
}

/// Children keyed by name; unnamed children are left out.
fn get_children(actor: &mut Actor, _args: &Args) -> HostResult {
    let mut table = HostTable::new();
    for child in actor.children() {
        let name = match child.try_borrow() {
            Ok(child) => child.name().to_string(),
            Err(_) => continue,
        };
        if !name.is_empty() && !table.contains_key(&name) {
            table.insert(name, proxy_value(child));
        }
    }
    Ok(vec![HostValue::Table(table)])
}

fn get_num_children(actor: &mut Actor, _args: &Args) -> HostResult {
    one(actor.children().len() as f64)
}

fn play_on_children(ctx: &CallContext<'_, '_>, actor: &ActorRef, args: &Args) -> HostResult {
    let params = Some(args.value(1)).filter(|value| !value.is_nil());
    commands::play_on_children(ctx, actor, args.str(0)?, params)?;
    done()
}

impl Capability for FrameCapability {
    fn name(&self) -> &'static str {
        "ActorFrame"
    }

    fn host_methods(&self, table: &mut HostMethodTable) {
        table.insert("get_child", HostFn::Method(get_child));
        table.insert("get_children", HostFn::Method(get_children));
        table.insert("get_num_children", HostFn::Method(get_num_children));
        table.insert("play_on_children", HostFn::Invoke(play_on_children));
    }

    fn method_specs(&self) -> Vec<MethodSpec> {
        vec![
            MethodSpec::new("GetChild", "get_child", S).returns(1),
            MethodSpec::new("GetChildren", "get_children", NO_ARGS).returns(1),
            MethodSpec::new("GetNumChildren", "get_num_children", NO_ARGS).returns(1),
            MethodSpec::new(
                "playcommandonchildren",
                "play_on_children",
                &[ArgKind::Str, ArgKind::Optional(&ArgKind::Any)],
            )
            .chained(),
        ]
    }
}
