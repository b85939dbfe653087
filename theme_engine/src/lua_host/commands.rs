//! Command dispatch.
//!
//! Commands are script functions stored on actors by name. Playing one never
//! holds an actor borrow across the script call, so commands are free to
//! call back into any actor, including their own.

use std::rc::Rc;

use mlua::Value;

use super::library::{CallContext, Services};
use crate::actor::ActorRef;
use crate::error::HostError;
use crate::value::{host_to_script, HostValue, Opaque};

/// Upper bound on queued commands played by one flush. A command that keeps
/// queueing itself would otherwise never finish.
pub const MAX_QUEUED_PER_FLUSH: usize = 256;

/// Marks that a command (or an actor finalize step) is running; queued
/// commands wait until the outermost scope ends.
pub(crate) struct CommandScope<'a> {
    services: &'a Services,
}

impl<'a> CommandScope<'a> {
    pub(crate) fn enter(services: &'a Services) -> Self {
        services.command_depth.set(services.command_depth.get() + 1);
        Self { services }
    }
}

impl Drop for CommandScope<'_> {
    fn drop(&mut self) {
        let depth = self.services.command_depth.get();
        self.services.command_depth.set(depth.saturating_sub(1));
    }
}

struct FlushGuard<'a>(&'a Services);

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.0.flushing.set(false);
    }
}

fn call_with_receiver(
    ctx: &CallContext<'_, '_>,
    command: &Opaque,
    proxy: Option<&Opaque>,
    params: Option<&HostValue>,
) -> Result<(), HostError> {
    let Value::Function(func) = command.to_value(ctx.lua)? else {
        return Err(HostError::InvalidValue {
            what: "command",
            value: command.type_name().to_string(),
        });
    };
    let receiver = match proxy {
        Some(proxy) => proxy.to_value(ctx.lua)?,
        None => Value::Nil,
    };
    let params = match params {
        Some(params) => host_to_script(ctx.lua, params)?,
        None => Value::Nil,
    };
    func.call::<_, ()>((receiver, params))?;
    Ok(())
}

/// Invoke the named command with the actor as receiver. A missing command
/// is not an error.
pub fn play_command(
    ctx: &CallContext<'_, '_>,
    actor: &ActorRef,
    name: &str,
    params: Option<HostValue>,
) -> Result<(), HostError> {
    let (command, proxy) = {
        let actor = actor.try_borrow().map_err(|_| HostError::ActorBusy)?;
        (actor.command(name).cloned(), actor.proxy().cloned())
    };
    let Some(command) = command else {
        log::trace!("command {name} not present; skipping");
        return Ok(());
    };
    {
        let _scope = CommandScope::enter(ctx.services);
        call_with_receiver(ctx, &command, proxy.as_ref(), params.as_ref())?;
    }
    if ctx.services.command_depth.get() == 0 {
        flush_queued(ctx)?;
    }
    Ok(())
}

/// Defer a command until the running command completes; outside any
/// command it plays straight away.
pub fn queue_command(ctx: &CallContext<'_, '_>, actor: &ActorRef, name: &str) -> Result<(), HostError> {
    ctx.services
        .pending
        .borrow_mut()
        .push_back((Rc::downgrade(actor), name.to_string()));
    if ctx.services.command_depth.get() == 0 {
        flush_queued(ctx)?;
    }
    Ok(())
}

/// Play every queued command in order. Re-entrant calls return at once;
/// the outer flush picks up anything queued meanwhile.
pub fn flush_queued(ctx: &CallContext<'_, '_>) -> Result<(), HostError> {
    if ctx.services.flushing.replace(true) {
        return Ok(());
    }
    let _guard = FlushGuard(ctx.services);
    let mut played = 0;
    loop {
        let next = ctx.services.pending.borrow_mut().pop_front();
        let Some((target, name)) = next else {
            break;
        };
        if played == MAX_QUEUED_PER_FLUSH {
            let mut pending = ctx.services.pending.borrow_mut();
            log::warn!(
                "dropping {} queued commands after {MAX_QUEUED_PER_FLUSH} in one flush (last: {name})",
                pending.len() + 1
            );
            pending.clear();
            break;
        }
        played += 1;
        // destroyed actors drop their queued commands
        if let Some(actor) = target.upgrade() {
            play_command(ctx, &actor, &name, None)?;
        }
    }
    Ok(())
}

/// Call `func(actor, params)` on the actor and then on every descendant,
/// depth first.
pub fn run_recursively(
    ctx: &CallContext<'_, '_>,
    actor: &ActorRef,
    func: &Opaque,
    params: Option<HostValue>,
) -> Result<(), HostError> {
    {
        let _scope = CommandScope::enter(ctx.services);
        visit(ctx, actor, func, params.as_ref())?;
    }
    if ctx.services.command_depth.get() == 0 {
        flush_queued(ctx)?;
    }
    Ok(())
}

fn visit(
    ctx: &CallContext<'_, '_>,
    actor: &ActorRef,
    func: &Opaque,
    params: Option<&HostValue>,
) -> Result<(), HostError> {
    let (proxy, children) = {
        let actor = actor.try_borrow().map_err(|_| HostError::ActorBusy)?;
        (actor.proxy().cloned(), actor.children().to_vec())
    };
    call_with_receiver(ctx, func, proxy.as_ref(), params)?;
    for child in &children {
        visit(ctx, child, func, params)?;
    }
    Ok(())
}

/// Play a command on each direct child, in attach order.
pub fn play_on_children(
    ctx: &CallContext<'_, '_>,
    actor: &ActorRef,
    name: &str,
    params: Option<HostValue>,
) -> Result<(), HostError> {
    let children = actor
        .try_borrow()
        .map_err(|_| HostError::ActorBusy)?
        .children()
        .to_vec();
    for child in &children {
        play_command(ctx, child, name, params.clone())?;
    }
    Ok(())
}
