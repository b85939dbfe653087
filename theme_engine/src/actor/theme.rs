//! The `THEME` static library: metric lookups.

use mlua::Value;
use theme_metrics::{MetricCommand, Metrics};

use super::class::StaticLibraryDef;
use crate::error::HostError;
use crate::lua_host::coerce::{ArgKind, Args};
use crate::lua_host::library::{CallContext, HostFn, HostMethodTable, HostResult, MethodSpec};
use crate::value::{HostValue, Opaque};

/// Metric collaborator. Values are raw strings; typed readers return `None`
/// when the value does not parse.
pub trait MetricSource {
    fn metric(&self, group: &str, key: &str) -> Option<String>;

    fn names_beginning_with(&self, group: &str, prefix: &str) -> Vec<String>;

    fn metric_f(&self, group: &str, key: &str) -> Option<f64> {
        self.metric(group, key)?.trim().parse().ok()
    }

    fn metric_i(&self, group: &str, key: &str) -> Option<i64> {
        self.metric_f(group, key).map(|value| value as i64)
    }

    fn metric_b(&self, group: &str, key: &str) -> Option<bool> {
        match self.metric(group, key)?.trim() {
            "1" => Some(true),
            "0" => Some(false),
            other if other.eq_ignore_ascii_case("true") => Some(true),
            other if other.eq_ignore_ascii_case("false") => Some(false),
            _ => None,
        }
    }
}

impl MetricSource for Metrics {
    fn metric(&self, group: &str, key: &str) -> Option<String> {
        self.get(group, key).map(str::to_string)
    }

    fn names_beginning_with(&self, group: &str, prefix: &str) -> Vec<String> {
        Metrics::names_beginning_with(self, group, prefix)
    }

    fn metric_f(&self, group: &str, key: &str) -> Option<f64> {
        self.get_f(group, key)
    }

    fn metric_i(&self, group: &str, key: &str) -> Option<i64> {
        self.get_i(group, key)
    }

    fn metric_b(&self, group: &str, key: &str) -> Option<bool> {
        self.get_b(group, key)
    }
}

pub const THEME_LIBRARY: StaticLibraryDef = StaticLibraryDef {
    name: "THEME",
    host_functions,
    method_specs,
};

const GROUP_KEY: &[ArgKind] = &[ArgKind::Str, ArgKind::Str];

fn missing(group: &str, key: &str) -> HostError {
    HostError::MissingMetric {
        group: group.to_string(),
        key: key.to_string(),
    }
}

fn invalid(group: &str, key: &str, reason: &str) -> HostError {
    HostError::InvalidMetric {
        group: group.to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

fn raw_metric(ctx: &CallContext<'_, '_>, group: &str, key: &str) -> Result<String, HostError> {
    ctx.services
        .metrics
        .metric(group, key)
        .ok_or_else(|| missing(group, key))
}

/// Untyped lookup: numbers and booleans come back typed, anything else as
/// the raw string.
fn get_metric(ctx: &CallContext<'_, '_>, args: &Args) -> HostResult {
    let (group, key) = (args.str(0)?, args.str(1)?);
    let raw = raw_metric(ctx, group, key)?;
    let trimmed = raw.trim();
    let value = if let Ok(number) = trimmed.parse::<f64>() {
        HostValue::Number(number)
    } else if trimmed.eq_ignore_ascii_case("true") {
        HostValue::Boolean(true)
    } else if trimmed.eq_ignore_ascii_case("false") {
        HostValue::Boolean(false)
    } else {
        HostValue::String(raw)
    };
    Ok(vec![value])
}

fn get_metric_f(ctx: &CallContext<'_, '_>, args: &Args) -> HostResult {
    let (group, key) = (args.str(0)?, args.str(1)?);
    raw_metric(ctx, group, key)?;
    let value = ctx
        .services
        .metrics
        .metric_f(group, key)
        .ok_or_else(|| invalid(group, key, "not a number"))?;
    Ok(vec![HostValue::Number(value)])
}

fn get_metric_i(ctx: &CallContext<'_, '_>, args: &Args) -> HostResult {
    let (group, key) = (args.str(0)?, args.str(1)?);
    raw_metric(ctx, group, key)?;
    let value = ctx
        .services
        .metrics
        .metric_i(group, key)
        .ok_or_else(|| invalid(group, key, "not an integer"))?;
    Ok(vec![HostValue::Number(value as f64)])
}

fn get_metric_b(ctx: &CallContext<'_, '_>, args: &Args) -> HostResult {
    let (group, key) = (args.str(0)?, args.str(1)?);
    raw_metric(ctx, group, key)?;
    let value = ctx
        .services
        .metrics
        .metric_b(group, key)
        .ok_or_else(|| invalid(group, key, "not a boolean"))?;
    Ok(vec![HostValue::Boolean(value)])
}

/// Compile a command metric into a script function.
pub(crate) fn compile_command(
    ctx: &CallContext<'_, '_>,
    group: &str,
    key: &str,
) -> Result<Opaque, HostError> {
    let raw = raw_metric(ctx, group, key)?;
    let command =
        MetricCommand::parse(&raw).map_err(|err| invalid(group, key, &format!("{err:#}")))?;
    let chunk = format!("={group}::{key}");
    let value: Value = ctx
        .lua
        .load(command.to_lua_source())
        .set_name(chunk)
        .eval()
        .map_err(|err| invalid(group, key, &err.to_string()))?;
    if !matches!(value, Value::Function(_)) {
        return Err(invalid(group, key, "command does not evaluate to a function"));
    }
    Ok(Opaque::capture(ctx.lua, value)?)
}

fn get_metric_a(ctx: &CallContext<'_, '_>, args: &Args) -> HostResult {
    let command = compile_command(ctx, args.str(0)?, args.str(1)?)?;
    Ok(vec![HostValue::Opaque(command)])
}

fn has_metric(ctx: &CallContext<'_, '_>, args: &Args) -> HostResult {
    let found = ctx.services.metrics.metric(args.str(0)?, args.str(1)?).is_some();
    Ok(vec![HostValue::Boolean(found)])
}

fn host_functions(table: &mut HostMethodTable) {
    table.insert("get_metric", HostFn::Static(get_metric));
    table.insert("get_metric_f", HostFn::Static(get_metric_f));
    table.insert("get_metric_i", HostFn::Static(get_metric_i));
    table.insert("get_metric_b", HostFn::Static(get_metric_b));
    table.insert("get_metric_a", HostFn::Static(get_metric_a));
    table.insert("has_metric", HostFn::Static(has_metric));
}

fn method_specs() -> Vec<MethodSpec> {
    vec![
        MethodSpec::new("GetMetric", "get_metric", GROUP_KEY).returns(1),
        MethodSpec::new("GetMetricF", "get_metric_f", GROUP_KEY).returns(1),
        MethodSpec::new("GetMetricI", "get_metric_i", GROUP_KEY).returns(1),
        MethodSpec::new("GetMetricB", "get_metric_b", GROUP_KEY).returns(1),
        MethodSpec::new("GetMetricA", "get_metric_a", GROUP_KEY).returns(1),
        MethodSpec::new("HasMetric", "has_metric", GROUP_KEY).returns(1),
    ]
}
