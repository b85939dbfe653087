//! `Sprite`: an actor drawing a texture, optionally animated by frames.

use super::class::{Capability, ClassDef};
use super::methods::{done, one, B, FF, FFFF, I, NO_ARGS, S};
use super::{Actor, ActorRef};
use crate::error::HostError;
use crate::lua_host::coerce::Args;
use crate::lua_host::library::{CallContext, HostFn, HostMethodTable, HostResult, MethodSpec};
use crate::value::{HostTable, HostValue};

pub struct SpriteCapability;

pub const SPRITE_CLASS: ClassDef = ClassDef {
    name: "Sprite",
    parent: Some("Actor"),
    capability: &SpriteCapability,
};

pub const TEXTURE_OPTION: &str = "Texture";

fn load_texture(ctx: &CallContext<'_, '_>, actor: &ActorRef, path: &str) -> Result<(), HostError> {
    let texture = ctx.services.textures.load(path)?;
    actor
        .try_borrow_mut()
        .map_err(|_| HostError::ActorBusy)?
        .node
        .set_texture(texture);
    Ok(())
}

fn load(ctx: &CallContext<'_, '_>, actor: &ActorRef, args: &Args) -> HostResult {
    load_texture(ctx, actor, args.str(0)?)?;
    done()
}

fn get_texture(actor: &mut Actor, _args: &Args) -> HostResult {
    let Some(texture) = actor.node.texture.as_ref() else {
        return Ok(vec![HostValue::Nil]);
    };
    let mut table = HostTable::new();
    table.insert("path", HostValue::from(texture.path.as_str()));
    table.insert("width", HostValue::from(texture.width as f64));
    table.insert("height", HostValue::from(texture.height as f64));
    table.insert("frames", HostValue::from(texture.frames as f64));
    Ok(vec![HostValue::Table(table)])
}

fn set_state(actor: &mut Actor, args: &Args) -> HostResult {
    let state = args.int(0)?;
    let states = actor.node.num_states();
    if state < 0 || state >= i64::from(states) {
        return Err(HostError::InvalidValue {
            what: "sprite state",
            value: format!("{state} (sprite has {states} states)"),
        });
    }
    actor.node.state = state as u32;
    done()
}

fn get_num_states(actor: &mut Actor, _args: &Args) -> HostResult {
    one(actor.node.num_states() as f64)
}

fn set_animate(actor: &mut Actor, args: &Args) -> HostResult {
    actor.node.animating = args.bool(0)?;
    done()
}

fn texture_translate(actor: &mut Actor, args: &Args) -> HostResult {
    actor.node.texture_translate = (args.f32(0)?, args.f32(1)?);
    done()
}

fn set_texture_wrapping(actor: &mut Actor, args: &Args) -> HostResult {
    actor.node.texture_wrapping = args.bool(0)?;
    done()
}

fn scale_to(actor: &mut Actor, args: &Args, cover: bool) -> HostResult {
    actor
        .node
        .scale_to(args.f32(0)?, args.f32(1)?, args.f32(2)?, args.f32(3)?, cover);
    done()
}

impl Capability for SpriteCapability {
    fn name(&self) -> &'static str {
        "Sprite"
    }

    fn host_methods(&self, table: &mut HostMethodTable) {
        table.insert("load", HostFn::Invoke(load));
        table.insert("get_texture", HostFn::Method(get_texture));
        table.insert("set_state", HostFn::Method(set_state));
        table.insert("get_num_states", HostFn::Method(get_num_states));
        table.insert("set_animate", HostFn::Method(set_animate));
        table.insert("texture_translate", HostFn::Method(texture_translate));
        table.insert("set_texture_wrapping", HostFn::Method(set_texture_wrapping));
        table.insert(
            "scale_to_cover",
            HostFn::Method(|actor, args| scale_to(actor, args, true)),
        );
        table.insert(
            "scale_to_fit",
            HostFn::Method(|actor, args| scale_to(actor, args, false)),
        );
    }

    fn method_specs(&self) -> Vec<MethodSpec> {
        vec![
            MethodSpec::new("Load", "load", S).chained(),
            MethodSpec::new("GetTexture", "get_texture", NO_ARGS).returns(1),
            MethodSpec::new("setstate", "set_state", I).chained(),
            MethodSpec::new("GetNumStates", "get_num_states", NO_ARGS).returns(1),
            MethodSpec::new("animate", "set_animate", B).chained(),
            MethodSpec::new("texturetranslate", "texture_translate", FF).chained(),
            MethodSpec::new("texturewrapping", "set_texture_wrapping", B).chained(),
            MethodSpec::new("scaletocover", "scale_to_cover", FFFF).chained(),
            MethodSpec::new("scaletofit", "scale_to_fit", FFFF).chained(),
        ]
    }

    /// A `Texture` that cannot be loaded leaves the sprite untextured; an
    /// explicit `Load` from script reports the failure instead.
    fn load_options(
        &self,
        ctx: &CallContext<'_, '_>,
        actor: &ActorRef,
        options: &HostTable,
    ) -> Result<(), HostError> {
        let Some(path) = options.get_str(TEXTURE_OPTION) else {
            return Ok(());
        };
        if let Err(err) = load_texture(ctx, actor, path) {
            log::warn!("sprite texture skipped: {err}");
        }
        Ok(())
    }
}
