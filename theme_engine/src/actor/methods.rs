//! The base `Actor` capability: transform, colour, effect, render-state,
//! tween and command methods every class inherits.

use super::class::{Capability, ClassDef};
use super::{Actor, ActorRef};
use crate::error::HostError;
use crate::lua_host::coerce::{ArgKind, Args};
use crate::lua_host::commands;
use crate::lua_host::library::{CallContext, HostFn, HostMethodTable, HostResult, MethodSpec};
use crate::scene::{
    BlendMode, Color, CullMode, EffectClock, EffectKind, HorizAlign, VertAlign, ZTestMode,
};
use crate::value::{HostTable, HostValue};

pub struct ActorCapability;

pub const ACTOR_CLASS: ClassDef = ClassDef {
    name: "Actor",
    parent: None,
    capability: &ActorCapability,
};

pub(crate) const NO_ARGS: &[ArgKind] = &[];
pub(crate) const F: &[ArgKind] = &[ArgKind::Float];
pub(crate) const FF: &[ArgKind] = &[ArgKind::Float, ArgKind::Float];
pub(crate) const FFF: &[ArgKind] = &[ArgKind::Float, ArgKind::Float, ArgKind::Float];
pub(crate) const FFFF: &[ArgKind] = &[
    ArgKind::Float,
    ArgKind::Float,
    ArgKind::Float,
    ArgKind::Float,
];
pub(crate) const I: &[ArgKind] = &[ArgKind::Int];
pub(crate) const S: &[ArgKind] = &[ArgKind::Str];
pub(crate) const B: &[ArgKind] = &[ArgKind::BoolOrInt];
pub(crate) const T: &[ArgKind] = &[ArgKind::Table];

pub(crate) fn done() -> HostResult {
    Ok(Vec::new())
}

pub(crate) fn one(value: impl Into<HostValue>) -> HostResult {
    Ok(vec![value.into()])
}

macro_rules! set_f32 {
    ($($field:tt)+) => {
        HostFn::Method(|actor, args| {
            actor.node.$($field)+ = args.f32(0)?;
            done()
        })
    };
}

macro_rules! add_f32 {
    ($($field:tt)+) => {
        HostFn::Method(|actor, args| {
            actor.node.$($field)+ += args.f32(0)?;
            done()
        })
    };
}

macro_rules! get_f32 {
    ($($field:tt)+) => {
        HostFn::Method(|actor, _args| one(actor.node.$($field)+))
    };
}

macro_rules! effect {
    ($kind:expr) => {
        HostFn::Method(|actor, _args| {
            actor.node.effect.start($kind);
            done()
        })
    };
}

fn color_table(color: Color) -> HostValue {
    let mut table = HostTable::new();
    for (index, component) in color.to_array().into_iter().enumerate() {
        table.insert((index + 1).to_string(), HostValue::from(component));
    }
    HostValue::Table(table)
}

fn proxy_of(actor: &ActorRef) -> HostValue {
    actor
        .try_borrow()
        .ok()
        .and_then(|actor| actor.proxy().cloned())
        .map(HostValue::Opaque)
        .unwrap_or(HostValue::Nil)
}

fn set_name(actor: &mut Actor, args: &Args) -> HostResult {
    actor.set_name(args.str(0)?);
    done()
}

fn get_name(actor: &mut Actor, _args: &Args) -> HostResult {
    one(actor.name())
}

fn set_xy(actor: &mut Actor, args: &Args) -> HostResult {
    actor.node.position.x = args.f32(0)?;
    actor.node.position.y = args.f32(1)?;
    done()
}

fn set_xyz(actor: &mut Actor, args: &Args) -> HostResult {
    actor.node.position.x = args.f32(0)?;
    actor.node.position.y = args.f32(1)?;
    actor.node.position.z = args.f32(2)?;
    done()
}

fn set_zoom(actor: &mut Actor, args: &Args) -> HostResult {
    actor.node.set_zoom(args.f32(0)?);
    done()
}

fn set_base_zoom(actor: &mut Actor, args: &Args) -> HostResult {
    let zoom = args.f32(0)?;
    actor.node.base_zoom.x = zoom;
    actor.node.base_zoom.y = zoom;
    done()
}

fn zoom_to(actor: &mut Actor, args: &Args) -> HostResult {
    let (width, height) = (args.f32(0)?, args.f32(1)?);
    if actor.node.width > 0.0 {
        actor.node.zoom.x = width / actor.node.width;
    }
    if actor.node.height > 0.0 {
        actor.node.zoom.y = height / actor.node.height;
    }
    done()
}

/// Zoom uniformly so one dimension reaches `target`.
fn zoom_to_extent(actor: &mut Actor, target: f32, horizontal: bool) -> HostResult {
    let extent = if horizontal {
        actor.node.width
    } else {
        actor.node.height
    };
    if extent > 0.0 {
        actor.node.set_zoom(target / extent);
    }
    done()
}

fn set_size(actor: &mut Actor, args: &Args) -> HostResult {
    actor.node.width = args.f32(0)?;
    actor.node.height = args.f32(1)?;
    done()
}

fn stretch_to(actor: &mut Actor, args: &Args) -> HostResult {
    actor
        .node
        .stretch_to(args.f32(0)?, args.f32(1)?, args.f32(2)?, args.f32(3)?);
    done()
}

fn get_rotation(actor: &mut Actor, _args: &Args) -> HostResult {
    let rotation = actor.node.rotation;
    Ok(vec![
        rotation.x.into(),
        rotation.y.into(),
        rotation.z.into(),
    ])
}

fn set_diffuse(actor: &mut Actor, args: &Args) -> HostResult {
    actor.node.diffuse = Color::from_table(args.table(0)?)?;
    done()
}

fn set_diffuse_alpha(actor: &mut Actor, args: &Args) -> HostResult {
    actor.node.diffuse.a = args.f32(0)?;
    done()
}

fn set_glow(actor: &mut Actor, args: &Args) -> HostResult {
    actor.node.glow = Color::from_table(args.table(0)?)?;
    done()
}

fn get_diffuse(actor: &mut Actor, _args: &Args) -> HostResult {
    Ok(vec![color_table(actor.node.diffuse)])
}

fn get_glow(actor: &mut Actor, _args: &Args) -> HostResult {
    Ok(vec![color_table(actor.node.glow)])
}

fn set_horiz_align(actor: &mut Actor, args: &Args) -> HostResult {
    actor.node.halign = HorizAlign::from_name(args.str(0)?)?.fraction();
    done()
}

fn set_vert_align(actor: &mut Actor, args: &Args) -> HostResult {
    actor.node.valign = VertAlign::from_name(args.str(0)?)?.fraction();
    done()
}

fn set_effect_magnitude(actor: &mut Actor, args: &Args) -> HostResult {
    let magnitude = &mut actor.node.effect.magnitude;
    magnitude.x = args.f32(0)?;
    magnitude.y = args.f32(1)?;
    magnitude.z = args.f32(2)?;
    done()
}

fn get_effect_magnitude(actor: &mut Actor, _args: &Args) -> HostResult {
    let magnitude = actor.node.effect.magnitude;
    Ok(vec![
        magnitude.x.into(),
        magnitude.y.into(),
        magnitude.z.into(),
    ])
}

fn set_effect_period(actor: &mut Actor, args: &Args) -> HostResult {
    let period = args.f32(0)?;
    if period <= 0.0 {
        return Err(HostError::InvalidValue {
            what: "effect period",
            value: period.to_string(),
        });
    }
    actor.node.effect.period = period;
    done()
}

fn set_effect_clock(actor: &mut Actor, args: &Args) -> HostResult {
    actor.node.effect.clock = EffectClock::from_name(args.str(0)?)?;
    done()
}

fn set_effect_color1(actor: &mut Actor, args: &Args) -> HostResult {
    actor.node.effect.color1 = Color::from_table(args.table(0)?)?;
    done()
}

fn set_effect_color2(actor: &mut Actor, args: &Args) -> HostResult {
    actor.node.effect.color2 = Color::from_table(args.table(0)?)?;
    done()
}

fn set_visible(actor: &mut Actor, args: &Args) -> HostResult {
    actor.node.visible = args.bool(0)?;
    done()
}

fn get_visible(actor: &mut Actor, _args: &Args) -> HostResult {
    one(actor.node.visible)
}

fn set_draw_order(actor: &mut Actor, args: &Args) -> HostResult {
    actor.node.draw_order = args.int(0)? as i32;
    done()
}

fn set_blend(actor: &mut Actor, args: &Args) -> HostResult {
    actor.node.blend = BlendMode::from_name(args.str(0)?)?;
    done()
}

fn set_zbuffer(actor: &mut Actor, args: &Args) -> HostResult {
    let on = args.bool(0)?;
    actor.node.ztest = if on {
        ZTestMode::WriteOnPass
    } else {
        ZTestMode::Off
    };
    actor.node.zwrite = on;
    done()
}

fn set_ztest(actor: &mut Actor, args: &Args) -> HostResult {
    actor.node.ztest = if args.bool(0)? {
        ZTestMode::WriteOnPass
    } else {
        ZTestMode::Off
    };
    done()
}

fn set_ztest_mode(actor: &mut Actor, args: &Args) -> HostResult {
    actor.node.ztest = ZTestMode::from_name(args.str(0)?)?;
    done()
}

fn set_zwrite(actor: &mut Actor, args: &Args) -> HostResult {
    actor.node.zwrite = args.bool(0)?;
    done()
}

fn set_backface_cull(actor: &mut Actor, args: &Args) -> HostResult {
    actor.node.cull = if args.bool(0)? {
        CullMode::Back
    } else {
        CullMode::None
    };
    done()
}

fn set_cull_mode(actor: &mut Actor, args: &Args) -> HostResult {
    actor.node.cull = CullMode::from_name(args.str(0)?)?;
    done()
}

fn tween(actor: &mut Actor, args: &Args) -> HostResult {
    actor.add_tween(args.f32(0)?);
    done()
}

fn stop_tweening(actor: &mut Actor, _args: &Args) -> HostResult {
    actor.stop_tweening();
    done()
}

fn hurry_tweening(actor: &mut Actor, args: &Args) -> HostResult {
    actor.hurry_tweening(args.f32(0)?);
    done()
}

fn get_tween_time_left(actor: &mut Actor, _args: &Args) -> HostResult {
    one(actor.tween_time_left())
}

fn add_command(actor: &mut Actor, args: &Args) -> HostResult {
    let name = args.str(0)?;
    let name = name.strip_suffix("Command").unwrap_or(name);
    actor.set_command(name, args.opaque(1)?.clone());
    done()
}

fn get_command(actor: &mut Actor, args: &Args) -> HostResult {
    Ok(vec![actor
        .command(args.str(0)?)
        .cloned()
        .map(HostValue::Opaque)
        .unwrap_or(HostValue::Nil)])
}

fn get_parent(actor: &mut Actor, _args: &Args) -> HostResult {
    Ok(vec![actor
        .parent()
        .map(|parent| proxy_of(&parent))
        .unwrap_or(HostValue::Nil)])
}

fn params_arg(args: &Args, index: usize) -> Option<HostValue> {
    Some(args.value(index)).filter(|value| !value.is_nil())
}

fn play_command(ctx: &CallContext<'_, '_>, actor: &ActorRef, args: &Args) -> HostResult {
    commands::play_command(ctx, actor, args.str(0)?, params_arg(args, 1))?;
    done()
}

fn queue_command(ctx: &CallContext<'_, '_>, actor: &ActorRef, args: &Args) -> HostResult {
    commands::queue_command(ctx, actor, args.str(0)?)?;
    done()
}

fn run_commands_recursively(
    ctx: &CallContext<'_, '_>,
    actor: &ActorRef,
    args: &Args,
) -> HostResult {
    commands::run_recursively(ctx, actor, args.opaque(0)?, params_arg(args, 1))?;
    done()
}

fn register(table: &mut HostMethodTable) {
    table.extend([
        ("set_name", HostFn::Method(set_name)),
        ("get_name", HostFn::Method(get_name)),
        ("set_x", set_f32!(position.x)),
        ("set_y", set_f32!(position.y)),
        ("set_z", set_f32!(position.z)),
        ("set_xy", HostFn::Method(set_xy)),
        ("set_xyz", HostFn::Method(set_xyz)),
        ("add_x", add_f32!(position.x)),
        ("add_y", add_f32!(position.y)),
        ("add_z", add_f32!(position.z)),
        ("set_zoom", HostFn::Method(set_zoom)),
        ("set_zoom_x", set_f32!(zoom.x)),
        ("set_zoom_y", set_f32!(zoom.y)),
        ("set_zoom_z", set_f32!(zoom.z)),
        ("zoom_to", HostFn::Method(zoom_to)),
        (
            "zoom_to_width",
            HostFn::Method(|actor, args| zoom_to_extent(actor, args.f32(0)?, true)),
        ),
        (
            "zoom_to_height",
            HostFn::Method(|actor, args| zoom_to_extent(actor, args.f32(0)?, false)),
        ),
        ("set_base_zoom", HostFn::Method(set_base_zoom)),
        ("set_base_zoom_x", set_f32!(base_zoom.x)),
        ("set_base_zoom_y", set_f32!(base_zoom.y)),
        ("set_base_zoom_z", set_f32!(base_zoom.z)),
        ("set_size", HostFn::Method(set_size)),
        ("set_width", set_f32!(width)),
        ("set_height", set_f32!(height)),
        ("stretch_to", HostFn::Method(stretch_to)),
        ("set_rotation_x", set_f32!(rotation.x)),
        ("set_rotation_y", set_f32!(rotation.y)),
        ("set_rotation_z", set_f32!(rotation.z)),
        ("add_rotation_x", add_f32!(rotation.x)),
        ("add_rotation_y", add_f32!(rotation.y)),
        ("add_rotation_z", add_f32!(rotation.z)),
        ("set_base_rotation_x", set_f32!(base_rotation.x)),
        ("set_base_rotation_y", set_f32!(base_rotation.y)),
        ("set_base_rotation_z", set_f32!(base_rotation.z)),
        ("set_skew_x", set_f32!(skew_x)),
        ("set_skew_y", set_f32!(skew_y)),
        ("set_crop_left", set_f32!(crop.left)),
        ("set_crop_top", set_f32!(crop.top)),
        ("set_crop_right", set_f32!(crop.right)),
        ("set_crop_bottom", set_f32!(crop.bottom)),
        ("set_fade_left", set_f32!(fade.left)),
        ("set_fade_top", set_f32!(fade.top)),
        ("set_fade_right", set_f32!(fade.right)),
        ("set_fade_bottom", set_f32!(fade.bottom)),
        ("set_diffuse", HostFn::Method(set_diffuse)),
        ("set_diffuse_alpha", HostFn::Method(set_diffuse_alpha)),
        ("set_glow", HostFn::Method(set_glow)),
        ("set_aux", set_f32!(aux)),
        ("get_aux", get_f32!(aux)),
        ("set_halign", set_f32!(halign)),
        ("set_valign", set_f32!(valign)),
        ("set_horiz_align", HostFn::Method(set_horiz_align)),
        ("set_vert_align", HostFn::Method(set_vert_align)),
        ("effect_diffuse_blink", effect!(EffectKind::DiffuseBlink)),
        ("effect_diffuse_shift", effect!(EffectKind::DiffuseShift)),
        ("effect_glow_shift", effect!(EffectKind::GlowShift)),
        ("effect_rainbow", effect!(EffectKind::Rainbow)),
        ("effect_wag", effect!(EffectKind::Wag)),
        ("effect_bounce", effect!(EffectKind::Bounce)),
        ("effect_bob", effect!(EffectKind::Bob)),
        ("effect_pulse", effect!(EffectKind::Pulse)),
        ("effect_spin", effect!(EffectKind::Spin)),
        ("effect_vibrate", effect!(EffectKind::Vibrate)),
        ("stop_effect", effect!(EffectKind::None)),
        ("set_effect_period", HostFn::Method(set_effect_period)),
        ("set_effect_magnitude", HostFn::Method(set_effect_magnitude)),
        ("get_effect_magnitude", HostFn::Method(get_effect_magnitude)),
        ("set_effect_clock", HostFn::Method(set_effect_clock)),
        ("set_effect_color1", HostFn::Method(set_effect_color1)),
        ("set_effect_color2", HostFn::Method(set_effect_color2)),
        ("set_visible", HostFn::Method(set_visible)),
        ("set_hibernate", set_f32!(hibernate)),
        ("set_draw_order", HostFn::Method(set_draw_order)),
        ("set_blend", HostFn::Method(set_blend)),
        ("set_zbuffer", HostFn::Method(set_zbuffer)),
        ("set_ztest", HostFn::Method(set_ztest)),
        ("set_ztest_mode", HostFn::Method(set_ztest_mode)),
        ("set_zwrite", HostFn::Method(set_zwrite)),
        ("set_zbias", set_f32!(zbias)),
        ("set_backface_cull", HostFn::Method(set_backface_cull)),
        ("set_cull_mode", HostFn::Method(set_cull_mode)),
        ("set_shadow_length", set_f32!(shadow_length)),
        ("tween", HostFn::Method(tween)),
        ("stop_tweening", HostFn::Method(stop_tweening)),
        ("hurry_tweening", HostFn::Method(hurry_tweening)),
        ("get_tween_time_left", HostFn::Method(get_tween_time_left)),
        ("play_command", HostFn::Invoke(play_command)),
        ("queue_command", HostFn::Invoke(queue_command)),
        ("add_command", HostFn::Method(add_command)),
        ("get_command", HostFn::Method(get_command)),
        ("run_commands_recursively", HostFn::Invoke(run_commands_recursively)),
        ("get_x", get_f32!(position.x)),
        ("get_y", get_f32!(position.y)),
        ("get_z", get_f32!(position.z)),
        ("get_width", get_f32!(width)),
        ("get_height", get_f32!(height)),
        (
            "get_zoomed_width",
            HostFn::Method(|actor, _args| one(actor.node.zoomed_width())),
        ),
        (
            "get_zoomed_height",
            HostFn::Method(|actor, _args| one(actor.node.zoomed_height())),
        ),
        ("get_zoom_x", get_f32!(zoom.x)),
        ("get_zoom_y", get_f32!(zoom.y)),
        ("get_zoom_z", get_f32!(zoom.z)),
        ("get_base_zoom_x", get_f32!(base_zoom.x)),
        ("get_base_zoom_y", get_f32!(base_zoom.y)),
        ("get_base_zoom_z", get_f32!(base_zoom.z)),
        ("get_rotation_x", get_f32!(rotation.x)),
        ("get_rotation_y", get_f32!(rotation.y)),
        ("get_rotation_z", get_f32!(rotation.z)),
        ("get_rotation", HostFn::Method(get_rotation)),
        ("get_diffuse", HostFn::Method(get_diffuse)),
        ("get_diffuse_alpha", get_f32!(diffuse.a)),
        ("get_glow", HostFn::Method(get_glow)),
        ("get_visible", HostFn::Method(get_visible)),
        ("get_halign", get_f32!(halign)),
        ("get_valign", get_f32!(valign)),
        ("get_parent", HostFn::Method(get_parent)),
    ]);
}

fn specs() -> Vec<MethodSpec> {
    use ArgKind::{Any, Function, Optional};
    vec![
        MethodSpec::new("name", "set_name", S).chained(),
        MethodSpec::new("GetName", "get_name", NO_ARGS).returns(1),
        MethodSpec::new("x", "set_x", F).chained(),
        MethodSpec::new("y", "set_y", F).chained(),
        MethodSpec::new("z", "set_z", F).chained(),
        MethodSpec::new("xy", "set_xy", FF).chained(),
        MethodSpec::new("xyz", "set_xyz", FFF).chained(),
        MethodSpec::new("addx", "add_x", F).chained(),
        MethodSpec::new("addy", "add_y", F).chained(),
        MethodSpec::new("addz", "add_z", F).chained(),
        MethodSpec::new("zoom", "set_zoom", F).chained(),
        MethodSpec::new("zoomx", "set_zoom_x", F).chained(),
        MethodSpec::new("zoomy", "set_zoom_y", F).chained(),
        MethodSpec::new("zoomz", "set_zoom_z", F).chained(),
        MethodSpec::new("zoomto", "zoom_to", FF).chained(),
        MethodSpec::new("zoomtowidth", "zoom_to_width", F).chained(),
        MethodSpec::new("zoomtoheight", "zoom_to_height", F).chained(),
        MethodSpec::new("basezoom", "set_base_zoom", F).chained(),
        MethodSpec::new("basezoomx", "set_base_zoom_x", F).chained(),
        MethodSpec::new("basezoomy", "set_base_zoom_y", F).chained(),
        MethodSpec::new("basezoomz", "set_base_zoom_z", F).chained(),
        MethodSpec::new("setsize", "set_size", FF).chained(),
        MethodSpec::new("SetWidth", "set_width", F).chained(),
        MethodSpec::new("SetHeight", "set_height", F).chained(),
        MethodSpec::new("stretchto", "stretch_to", FFFF).chained(),
        MethodSpec::new("rotationx", "set_rotation_x", F).chained(),
        MethodSpec::new("rotationy", "set_rotation_y", F).chained(),
        MethodSpec::new("rotationz", "set_rotation_z", F).chained(),
        MethodSpec::new("addrotationx", "add_rotation_x", F).chained(),
        MethodSpec::new("addrotationy", "add_rotation_y", F).chained(),
        MethodSpec::new("addrotationz", "add_rotation_z", F).chained(),
        MethodSpec::new("baserotationx", "set_base_rotation_x", F).chained(),
        MethodSpec::new("baserotationy", "set_base_rotation_y", F).chained(),
        MethodSpec::new("baserotationz", "set_base_rotation_z", F).chained(),
        MethodSpec::new("pitch", "set_rotation_x", F).chained(),
        MethodSpec::new("heading", "set_rotation_y", F).chained(),
        MethodSpec::new("roll", "set_rotation_z", F).chained(),
        MethodSpec::new("skewx", "set_skew_x", F).chained(),
        MethodSpec::new("skewy", "set_skew_y", F).chained(),
        MethodSpec::new("cropleft", "set_crop_left", F).chained(),
        MethodSpec::new("croptop", "set_crop_top", F).chained(),
        MethodSpec::new("cropright", "set_crop_right", F).chained(),
        MethodSpec::new("cropbottom", "set_crop_bottom", F).chained(),
        MethodSpec::new("fadeleft", "set_fade_left", F).chained(),
        MethodSpec::new("fadetop", "set_fade_top", F).chained(),
        MethodSpec::new("faderight", "set_fade_right", F).chained(),
        MethodSpec::new("fadebottom", "set_fade_bottom", F).chained(),
        MethodSpec::new("diffuse", "set_diffuse", T).chained(),
        MethodSpec::new("diffusealpha", "set_diffuse_alpha", F).chained(),
        MethodSpec::new("glow", "set_glow", T).chained(),
        MethodSpec::new("aux", "set_aux", F).chained(),
        MethodSpec::new("getaux", "get_aux", NO_ARGS).returns(1),
        MethodSpec::new("halign", "set_halign", F).chained(),
        MethodSpec::new("valign", "set_valign", F).chained(),
        MethodSpec::new("horizalign", "set_horiz_align", S).chained(),
        MethodSpec::new("vertalign", "set_vert_align", S).chained(),
        MethodSpec::new("diffuseblink", "effect_diffuse_blink", NO_ARGS).chained(),
        MethodSpec::new("diffuseshift", "effect_diffuse_shift", NO_ARGS).chained(),
        MethodSpec::new("glowshift", "effect_glow_shift", NO_ARGS).chained(),
        MethodSpec::new("rainbow", "effect_rainbow", NO_ARGS).chained(),
        MethodSpec::new("wag", "effect_wag", NO_ARGS).chained(),
        MethodSpec::new("bounce", "effect_bounce", NO_ARGS).chained(),
        MethodSpec::new("bob", "effect_bob", NO_ARGS).chained(),
        MethodSpec::new("pulse", "effect_pulse", NO_ARGS).chained(),
        MethodSpec::new("spin", "effect_spin", NO_ARGS).chained(),
        MethodSpec::new("vibrate", "effect_vibrate", NO_ARGS).chained(),
        MethodSpec::new("stopeffect", "stop_effect", NO_ARGS).chained(),
        MethodSpec::new("effectperiod", "set_effect_period", F).chained(),
        MethodSpec::new("effectmagnitude", "set_effect_magnitude", FFF).chained(),
        MethodSpec::new("geteffectmagnitude", "get_effect_magnitude", NO_ARGS).returns(3),
        MethodSpec::new("effectclock", "set_effect_clock", S).chained(),
        MethodSpec::new("effectcolor1", "set_effect_color1", T).chained(),
        MethodSpec::new("effectcolor2", "set_effect_color2", T).chained(),
        MethodSpec::new("visible", "set_visible", B).chained(),
        MethodSpec::new("hibernate", "set_hibernate", F).chained(),
        MethodSpec::new("draworder", "set_draw_order", I).chained(),
        MethodSpec::new("blend", "set_blend", S).chained(),
        MethodSpec::new("zbuffer", "set_zbuffer", B).chained(),
        MethodSpec::new("ztest", "set_ztest", B).chained(),
        MethodSpec::new("ztestmode", "set_ztest_mode", S).chained(),
        MethodSpec::new("zwrite", "set_zwrite", B).chained(),
        MethodSpec::new("zbias", "set_zbias", F).chained(),
        MethodSpec::new("backfacecull", "set_backface_cull", B).chained(),
        MethodSpec::new("cullmode", "set_cull_mode", S).chained(),
        MethodSpec::new("shadowlength", "set_shadow_length", F).chained(),
        MethodSpec::new("sleep", "tween", F).chained(),
        MethodSpec::new("linear", "tween", F).chained(),
        MethodSpec::new("accelerate", "tween", F).chained(),
        MethodSpec::new("decelerate", "tween", F).chained(),
        MethodSpec::new("spring", "tween", F).chained(),
        MethodSpec::new("stoptweening", "stop_tweening", NO_ARGS).chained(),
        MethodSpec::new("finishtweening", "stop_tweening", NO_ARGS).chained(),
        MethodSpec::new("hurrytweening", "hurry_tweening", F).chained(),
        MethodSpec::new("GetTweenTimeLeft", "get_tween_time_left", NO_ARGS).returns(1),
        MethodSpec::new("playcommand", "play_command", &[ArgKind::Str, Optional(&Any)]).chained(),
        MethodSpec::new("queuecommand", "queue_command", S).chained(),
        MethodSpec::new("addcommand", "add_command", &[ArgKind::Str, Function]).chained(),
        MethodSpec::new("GetCommand", "get_command", S).returns(1),
        MethodSpec::new(
            "RunCommandsRecursively",
            "run_commands_recursively",
            &[Function, Optional(&Any)],
        )
        .chained(),
        MethodSpec::new("GetX", "get_x", NO_ARGS).returns(1),
        MethodSpec::new("GetY", "get_y", NO_ARGS).returns(1),
        MethodSpec::new("GetZ", "get_z", NO_ARGS).returns(1),
        MethodSpec::new("GetDestX", "get_x", NO_ARGS).returns(1),
        MethodSpec::new("GetDestY", "get_y", NO_ARGS).returns(1),
        MethodSpec::new("GetDestZ", "get_z", NO_ARGS).returns(1),
        MethodSpec::new("GetWidth", "get_width", NO_ARGS).returns(1),
        MethodSpec::new("GetHeight", "get_height", NO_ARGS).returns(1),
        MethodSpec::new("GetZoomedWidth", "get_zoomed_width", NO_ARGS).returns(1),
        MethodSpec::new("GetZoomedHeight", "get_zoomed_height", NO_ARGS).returns(1),
        MethodSpec::new("GetZoom", "get_zoom_x", NO_ARGS).returns(1),
        MethodSpec::new("GetZoomX", "get_zoom_x", NO_ARGS).returns(1),
        MethodSpec::new("GetZoomY", "get_zoom_y", NO_ARGS).returns(1),
        MethodSpec::new("GetZoomZ", "get_zoom_z", NO_ARGS).returns(1),
        MethodSpec::new("GetBaseZoomX", "get_base_zoom_x", NO_ARGS).returns(1),
        MethodSpec::new("GetBaseZoomY", "get_base_zoom_y", NO_ARGS).returns(1),
        MethodSpec::new("GetBaseZoomZ", "get_base_zoom_z", NO_ARGS).returns(1),
        MethodSpec::new("GetRotationX", "get_rotation_x", NO_ARGS).returns(1),
        MethodSpec::new("GetRotationY", "get_rotation_y", NO_ARGS).returns(1),
        MethodSpec::new("GetRotationZ", "get_rotation_z", NO_ARGS).returns(1),
        MethodSpec::new("getrotation", "get_rotation", NO_ARGS).returns(3),
        MethodSpec::new("GetDiffuse", "get_diffuse", NO_ARGS).returns(1),
        MethodSpec::new("GetDiffuseAlpha", "get_diffuse_alpha", NO_ARGS).returns(1),
        MethodSpec::new("GetGlow", "get_glow", NO_ARGS).returns(1),
        MethodSpec::new("GetVisible", "get_visible", NO_ARGS).returns(1),
        MethodSpec::new("GetHAlign", "get_halign", NO_ARGS).returns(1),
        MethodSpec::new("GetVAlign", "get_valign", NO_ARGS).returns(1),
        MethodSpec::new("GetParent", "get_parent", NO_ARGS).returns(1),
    ]
}

impl Capability for ActorCapability {
    fn name(&self) -> &'static str {
        "Actor"
    }

    fn host_methods(&self, table: &mut HostMethodTable) {
        register(table);
    }

    fn method_specs(&self) -> Vec<MethodSpec> {
        specs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lua_host::coerce::Arg;
    use crate::lua_host::library::{MethodLibrary, Receiver};

    fn call(table: &HostMethodTable, host_name: &str, actor: &ActorRef, args: Vec<Arg>) -> HostResult {
        match table.get(host_name) {
            Some(HostFn::Method(func)) => func(&mut actor.borrow_mut(), &Args::new(args)),
            _ => panic!("{host_name} is not a plain method"),
        }
    }

    fn host_table() -> HostMethodTable {
        let mut table = HostMethodTable::new();
        register(&mut table);
        table
    }

    #[test]
    fn every_spec_binds() {
        let library =
            MethodLibrary::generate("Actor", Receiver::Instance, &host_table(), &specs());
        assert!(library.warnings().is_empty(), "{:?}", library.warnings());
        assert!(library.contains("diffusealpha"));
        assert!(library.contains("GetTweenTimeLeft"));
    }

    #[test]
    fn position_setters_and_getters() {
        let table = host_table();
        let actor = Actor::new("Actor");
        call(&table, "set_xy", &actor, vec![Arg::Float(10.0), Arg::Float(20.0)]).expect("xy");
        call(&table, "add_x", &actor, vec![Arg::Float(5.0)]).expect("addx");
        let x = call(&table, "get_x", &actor, Vec::new()).expect("GetX");
        assert_eq!(x, vec![HostValue::Number(15.0)]);
        assert_eq!(actor.borrow().node().position.y, 20.0);
    }

    #[test]
    fn zoomto_uses_current_size() {
        let table = host_table();
        let actor = Actor::new("Actor");
        call(&table, "set_size", &actor, vec![Arg::Float(100.0), Arg::Float(50.0)]).expect("size");
        call(&table, "zoom_to", &actor, vec![Arg::Float(200.0), Arg::Float(25.0)]).expect("zoomto");
        let node = actor.borrow().node().clone();
        assert_eq!((node.zoom.x, node.zoom.y), (2.0, 0.5));
        assert_eq!(node.zoomed_width(), 200.0);
    }

    #[test]
    fn invalid_enum_names_are_host_errors() {
        let table = host_table();
        let actor = Actor::new("Actor");
        let err = call(&table, "set_blend", &actor, vec![Arg::Str("sideways".to_string())])
            .expect_err("bad blend");
        assert!(matches!(err, HostError::InvalidValue { what: "blend mode", .. }));
        call(&table, "set_blend", &actor, vec![Arg::Str("BlendMode_Add".to_string())]).expect("add");
        assert_eq!(actor.borrow().node().blend, BlendMode::Add);
    }

    #[test]
    fn effects_start_with_defaults() {
        let table = host_table();
        let actor = Actor::new("Actor");
        call(&table, "effect_spin", &actor, Vec::new()).expect("spin");
        let magnitude = call(&table, "get_effect_magnitude", &actor, Vec::new()).expect("mag");
        assert_eq!(magnitude.len(), 3);
        assert_eq!(magnitude[2], HostValue::Number(180.0));
        call(&table, "stop_effect", &actor, Vec::new()).expect("stop");
        assert_eq!(actor.borrow().node().effect.kind, EffectKind::None);
    }

    #[test]
    fn diffuse_round_trips_through_tables() {
        let table = host_table();
        let actor = Actor::new("Actor");
        let mut color = HostTable::new();
        for (index, value) in [1.0, 0.5, 0.25].into_iter().enumerate() {
            color.insert((index + 1).to_string(), HostValue::Number(value));
        }
        call(&table, "set_diffuse", &actor, vec![Arg::Table(color)]).expect("diffuse");
        call(&table, "set_diffuse_alpha", &actor, vec![Arg::Float(0.5)]).expect("alpha");
        let out = call(&table, "get_diffuse", &actor, Vec::new()).expect("GetDiffuse");
        let out = out[0].as_table().expect("table");
        assert_eq!(out.get_number("2"), Some(0.5));
        assert_eq!(out.get_number("4"), Some(0.5));
    }
}
