//! Metric commands.
//!
//! A command metric is either a `;`-separated list of `method,arg,...` calls
//! (`"x,10;diffusealpha,0.5"`) or, when prefixed with `%`, a Lua expression
//! that evaluates to a function (`"%function(self) self:x(10) end"`). Both
//! forms render to a Lua chunk returning a `function(self, params)`.

use anyhow::{anyhow, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum CommandArg {
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommandCall {
    pub method: String,
    pub args: Vec<CommandArg>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandList {
    pub calls: Vec<CommandCall>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetricCommand {
    Script(String),
    List(CommandList),
}

impl MetricCommand {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if let Some(expr) = trimmed.strip_prefix('%') {
            let expr = expr.trim();
            if expr.is_empty() {
                return Err(anyhow!("empty Lua command expression"));
            }
            return Ok(MetricCommand::Script(expr.to_string()));
        }
        Ok(MetricCommand::List(CommandList::parse(trimmed)?))
    }

    /// Lua chunk source whose single return value is the command function.
    pub fn to_lua_source(&self) -> String {
        match self {
            MetricCommand::Script(expr) => format!("return ({expr})"),
            MetricCommand::List(list) => list.to_lua_source(),
        }
    }
}

impl CommandList {
    pub fn parse(raw: &str) -> Result<Self> {
        let mut calls = Vec::new();
        for segment in raw.split(';') {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }
            let mut parts = segment.split(',').map(str::trim);
            let method = parts.next().unwrap_or_default();
            if !is_identifier(method) {
                return Err(anyhow!("invalid command name '{method}' in '{segment}'"));
            }
            let args = parts.map(parse_arg).collect();
            calls.push(CommandCall {
                method: method.to_string(),
                args,
            });
        }
        Ok(CommandList { calls })
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn to_lua_source(&self) -> String {
        let mut source = String::from("return function(self, params)\n");
        for call in &self.calls {
            let args = call
                .args
                .iter()
                .map(|arg| match arg {
                    CommandArg::Number(value) => value.to_string(),
                    CommandArg::Text(text) => quote_lua(text),
                })
                .collect::<Vec<_>>()
                .join(", ");
            source.push_str(&format!("  self:{}({})\n", call.method, args));
        }
        source.push_str("end\n");
        source
    }
}

fn parse_arg(raw: &str) -> CommandArg {
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() => CommandArg::Number(value),
        _ => {
            let text = raw
                .strip_prefix('"')
                .and_then(|inner| inner.strip_suffix('"'))
                .unwrap_or(raw);
            CommandArg::Text(text.to_string())
        }
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn quote_lua(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c if (c as u32) < 0x20 || c == '\u{7f}' => {
                out.push_str(&format!("\\{:03}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_command_lists() {
        let list = CommandList::parse("x,10; diffusealpha,0.5;;blend,add").expect("parse");
        assert_eq!(list.calls.len(), 3);
        assert_eq!(list.calls[0].method, "x");
        assert_eq!(list.calls[0].args, vec![CommandArg::Number(10.0)]);
        assert_eq!(list.calls[2].args, vec![CommandArg::Text("add".to_string())]);
    }

    #[test]
    fn renders_lua_function_source() {
        let command = MetricCommand::parse("x,10;effectclock,\"be\\at\"").expect("parse");
        let source = command.to_lua_source();
        assert!(source.starts_with("return function(self, params)"));
        assert!(source.contains("self:x(10)"));
        assert!(source.contains("self:effectclock(\"be\\\\at\")"));
    }

    #[test]
    fn percent_prefix_is_a_lua_expression() {
        let command = MetricCommand::parse("%function(self) self:x(1) end").expect("parse");
        assert_eq!(
            command.to_lua_source(),
            "return (function(self) self:x(1) end)"
        );
    }

    #[test]
    fn rejects_bad_method_names() {
        assert!(CommandList::parse("1x,3").is_err());
        assert!(MetricCommand::parse("%").is_err());
    }

    #[test]
    fn non_finite_numbers_stay_text() {
        let list = CommandList::parse("effectclock,inf").expect("parse");
        assert_eq!(list.calls[0].args, vec![CommandArg::Text("inf".to_string())]);
    }
}
