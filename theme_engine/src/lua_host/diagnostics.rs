//! Compile-only checks that report where a script fails to parse.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use mlua::Lua;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub chunk: String,
    pub line: Option<u32>,
    pub message: String,
}

static LOCATED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?s)(.*?):(\d+): (.*)$").expect("diagnostic pattern"));

impl Diagnostic {
    /// Split an interpreter message of the form `chunk:line: message`.
    pub fn parse(chunk: &str, raw: &str) -> Self {
        let raw = raw.trim();
        if let Some(captures) = LOCATED.captures(raw) {
            let line = captures.get(2).and_then(|line| line.as_str().parse().ok());
            let message = captures.get(3).map(|m| m.as_str()).unwrap_or(raw);
            return Diagnostic {
                chunk: chunk.to_string(),
                line,
                message: message.to_string(),
            };
        }
        Diagnostic {
            chunk: chunk.to_string(),
            line: None,
            message: raw.to_string(),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.line {
            Some(line) => write!(f, "{}:{line}: {}", self.chunk, self.message),
            None => write!(f, "{}: {}", self.chunk, self.message),
        }
    }
}

/// Compile `source` without running it.
pub fn check(lua: &Lua, source: &str, chunk: &str) -> Vec<Diagnostic> {
    match lua.load(source).set_name(format!("={chunk}")).into_function() {
        Ok(_) => Vec::new(),
        Err(mlua::Error::SyntaxError { message, .. }) => vec![Diagnostic::parse(chunk, &message)],
        Err(other) => vec![Diagnostic {
            chunk: chunk.to_string(),
            line: None,
            message: other.to_string(),
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_source_has_no_diagnostics() {
        let lua = Lua::new();
        assert!(check(&lua, "return Def.Actor{}", "ok.lua").is_empty());
    }

    #[test]
    fn syntax_errors_report_their_line() {
        let lua = Lua::new();
        let diagnostics = check(&lua, "local a = 1\nlocal b = = 2\n", "bad.lua");
        assert_eq!(diagnostics.len(), 1);
        let diagnostic = &diagnostics[0];
        assert_eq!(diagnostic.line, Some(2));
        assert_eq!(diagnostic.chunk, "bad.lua");
        assert!(diagnostic.message.contains("unexpected symbol"), "{diagnostic}");
    }

    #[test]
    fn unlocated_messages_are_kept_whole() {
        let diagnostic = Diagnostic::parse("x", "something odd");
        assert_eq!(diagnostic.line, None);
        assert_eq!(diagnostic.to_string(), "x: something odd");
    }
}
