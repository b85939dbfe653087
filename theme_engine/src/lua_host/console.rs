use std::cell::RefCell;
use std::rc::Rc;

use mlua::{Function, Lua, Result as LuaResult, Table, Value, Variadic};

use super::coerce::mismatch;

/// Receives one complete console line at a time.
pub type ConsoleSink = Rc<dyn Fn(&str)>;

pub fn default_sink() -> ConsoleSink {
    Rc::new(|line: &str| log::info!(target: "theme::console", "{line}"))
}

/// Line buffer between script output primitives and the sink.
pub struct Console {
    sink: ConsoleSink,
    buffer: RefCell<Vec<u8>>,
}

impl Console {
    pub fn new(sink: ConsoleSink) -> Self {
        Self {
            sink,
            buffer: RefCell::new(Vec::new()),
        }
    }

    /// Buffer bytes and emit every line completed by them.
    pub fn write(&self, bytes: &[u8]) {
        let lines = {
            let mut buffer = self.buffer.borrow_mut();
            buffer.extend_from_slice(bytes);
            let mut lines = Vec::new();
            while let Some(end) = buffer.iter().position(|&byte| byte == b'\n') {
                let line: Vec<u8> = buffer.drain(..=end).collect();
                lines.push(decode_line(&line[..end]));
            }
            lines
        };
        for line in lines {
            (self.sink)(&line);
        }
    }

    /// Emit whatever is buffered as a final partial line.
    pub fn flush(&self) {
        let rest = std::mem::take(&mut *self.buffer.borrow_mut());
        if !rest.is_empty() {
            (self.sink)(&decode_line(&rest));
        }
    }
}

/// UTF-8 when valid, otherwise each byte maps to the char with that code.
fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes.iter().map(|&byte| byte as char).collect(),
    }
}

fn tostring_all<'lua>(lua: &'lua Lua, values: &[Value<'lua>]) -> LuaResult<Vec<mlua::String<'lua>>> {
    let tostring: Function = lua.globals().get("tostring")?;
    values
        .iter()
        .map(|value| tostring.call::<_, mlua::String>(value.clone()))
        .collect()
}

/// Route `print`, `io.write`, `Trace` and `Warn` through the console.
pub fn install(lua: &Lua, console: Rc<Console>) -> LuaResult<()> {
    let globals = lua.globals();

    let sink = console.clone();
    let print = lua.create_function(move |lua, args: Variadic<Value>| {
        let mut line = Vec::new();
        for (index, text) in tostring_all(lua, &args)?.into_iter().enumerate() {
            if index > 0 {
                line.push(b'\t');
            }
            line.extend_from_slice(text.as_bytes());
        }
        line.push(b'\n');
        sink.write(&line);
        Ok(())
    })?;
    globals.set("print", print)?;

    let sink = console;
    let write = lua.create_function(move |lua, args: Variadic<Value>| {
        for (index, value) in args.iter().enumerate() {
            if !matches!(value, Value::String(_) | Value::Number(_) | Value::Integer(_)) {
                return Err(mismatch("write", index + 1, "string", value));
            }
        }
        for text in tostring_all(lua, &args)? {
            sink.write(text.as_bytes());
        }
        Ok(())
    })?;
    match globals.get::<_, Option<Table>>("io")? {
        Some(io) => io.set("write", write)?,
        None => {
            let io = lua.create_table()?;
            io.set("write", write)?;
            globals.set("io", io)?;
        }
    }

    let trace = lua.create_function(|lua, args: Variadic<Value>| {
        let text = joined(lua, &args)?;
        log::info!(target: "theme::script", "{text}");
        Ok(())
    })?;
    globals.set("Trace", trace)?;

    let warn = lua.create_function(|lua, args: Variadic<Value>| {
        let text = joined(lua, &args)?;
        log::warn!(target: "theme::script", "{text}");
        Ok(())
    })?;
    globals.set("Warn", warn)?;
    Ok(())
}

fn joined(lua: &Lua, args: &[Value]) -> LuaResult<String> {
    Ok(tostring_all(lua, args)?
        .iter()
        .map(|text| String::from_utf8_lossy(text.as_bytes()).into_owned())
        .collect::<Vec<_>>()
        .join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capture() -> (ConsoleSink, Rc<RefCell<Vec<String>>>) {
        let lines = Rc::new(RefCell::new(Vec::new()));
        let sink_lines = lines.clone();
        let sink: ConsoleSink = Rc::new(move |line: &str| sink_lines.borrow_mut().push(line.to_string()));
        (sink, lines)
    }

    #[test]
    fn partial_writes_join_into_one_line() {
        let (sink, lines) = capture();
        let console = Console::new(sink);
        console.write(b"score: ");
        console.write(b"100");
        assert!(lines.borrow().is_empty());
        console.write(b"\nnext\r\nrest");
        assert_eq!(*lines.borrow(), vec!["score: 100", "next"]);
        console.flush();
        assert_eq!(lines.borrow().last().map(String::as_str), Some("rest"));
    }

    #[test]
    fn invalid_utf8_falls_back_to_bytes() {
        let (sink, lines) = capture();
        let console = Console::new(sink);
        console.write(b"caf\xe9\n");
        assert_eq!(*lines.borrow(), vec!["caf\u{e9}"]);
    }

    #[test]
    fn print_and_io_write_go_through_the_console() {
        let (sink, lines) = capture();
        let lua = Lua::new();
        install(&lua, Rc::new(Console::new(sink))).expect("install console");
        lua.load(
            r#"
            print("a", 1, true, nil)
            io.write("partial ")
            io.write("line", 2, "\n")
            "#,
        )
        .exec()
        .expect("script runs");
        assert_eq!(*lines.borrow(), vec!["a\t1\ttrue\tnil", "partial line2"]);
    }

    #[test]
    fn io_write_rejects_tables() {
        let (sink, _lines) = capture();
        let lua = Lua::new();
        install(&lua, Rc::new(Console::new(sink))).expect("install console");
        let err = lua.load("io.write({})").exec().expect_err("table rejected");
        assert!(err.to_string().contains("bad argument #1 to 'write'"), "{err}");
    }
}
