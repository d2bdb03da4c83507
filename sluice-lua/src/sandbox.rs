//! Sandboxed execution of transformation code
//!
//! Every call runs in a fresh interpreter state, so nothing a script does can
//! leak into the next one. The state only carries the table, string and math
//! libraries plus the `log` table; anything that reaches outside the process
//! or could catch the timeout is removed.
//!
//! The deadline is enforced by an instruction hook for Lua code and by a work
//! budget inside the pattern functions. The hook stays installed until the
//! state is closed.

use mlua::{Function, HookTriggers, Lua, LuaOptions, LuaSerdeExt, StdLib, VmState};
use serde_json::Value;
use sluice_core::domain::job::{JobError, JobErrorKind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::error::translate;
use crate::log::{LogSink, TracingSink, register_log_module};
use crate::pattern::register_string_functions;
use crate::wrap::{CHUNK_NAME, wrap};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);
pub const DEFAULT_MEMORY_LIMIT: usize = 64 * 1024 * 1024;

/// Instructions between two deadline checks
const HOOK_INTERVAL: u32 = 1000;

/// Globals removed from every sandbox
const REMOVED_GLOBALS: &[&str] = &[
    "collectgarbage",
    "coroutine",
    "debug",
    "dofile",
    "io",
    "load",
    "loadfile",
    "os",
    "package",
    "pcall",
    "print",
    "require",
    "xpcall",
];

/// Reading an undefined global raises instead of yielding nil, and
/// finalizers cannot be installed: they would run when the state is closed,
/// outside any deadline.
const PRELUDE: &str = r#"
local error, tostring, type, rawget = error, tostring, type, rawget
local set_metatable = setmetatable
set_metatable(_G, {
  __index = function(_, name)
    error("ReferenceError: " .. tostring(name) .. " is not defined", 2)
  end,
  __metatable = false,
})
setmetatable = function(t, mt)
  if type(mt) == "table" and rawget(mt, "__gc") ~= nil then
    error("attempt to set a __gc metamethod", 2)
  end
  return set_metatable(t, mt)
end
"#;

/// Deadline of the run in progress
///
/// Stored as interpreter app data so that library functions written in Rust
/// can check it too.
#[derive(Debug, Clone)]
pub(crate) struct Deadline {
    at: Instant,
    timed_out: Arc<AtomicBool>,
}

impl Deadline {
    pub(crate) fn after(timeout: Duration) -> Self {
        Self {
            at: Instant::now() + timeout,
            timed_out: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether the deadline has passed; remembers the first time it has
    pub(crate) fn expired(&self) -> bool {
        if Instant::now() < self.at {
            return false;
        }
        self.timed_out.store(true, Ordering::SeqCst);
        true
    }

    pub(crate) fn timed_out(&self) -> bool {
        self.timed_out.load(Ordering::SeqCst)
    }
}

/// Data produced by a run; `None` when the code returned nothing
pub type ExecutionResult = Result<Option<Value>, JobError>;

/// Runs transformation code against one data value
pub trait SandboxExecutor: Send + Sync {
    fn execute(&self, code: &str, data: &Value) -> ExecutionResult;
}

#[derive(Debug, Clone)]
pub struct SandboxOptions {
    /// Wall-clock bound for a single run
    pub timeout: Duration,
    /// Interpreter heap limit in bytes; `None` leaves it unbounded
    pub memory_limit: Option<usize>,
}

impl Default for SandboxOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            memory_limit: Some(DEFAULT_MEMORY_LIMIT),
        }
    }
}

/// Creates a restricted interpreter state
///
/// Only `table`, `string` and `math` are loaded on top of the base library,
/// and the globals in `REMOVED_GLOBALS` are cleared. Undefined globals raise
/// a `ReferenceError` when read.
///
/// # Arguments
///
/// * `options` - Memory limit of the state; strings built by `string.rep`
///   and `string.gsub` are capped at the same size
/// * `sink` - Destination of the `log` table's messages
///
/// # Security
/// This sandbox prevents:
/// - File system, network and process access
/// - Loading code or modules at runtime
/// - Catching errors, which would swallow the timeout
/// - Installing `__gc` finalizers
pub fn create_sandbox(options: &SandboxOptions, sink: Arc<dyn LogSink>) -> mlua::Result<Lua> {
    let lua = Lua::new_with(
        StdLib::TABLE | StdLib::STRING | StdLib::MATH,
        LuaOptions::default(),
    )?;

    if let Some(limit) = options.memory_limit {
        lua.set_memory_limit(limit)?;
    }

    let globals = lua.globals();
    for name in REMOVED_GLOBALS {
        globals.raw_set(*name, mlua::Nil)?;
    }
    let string: mlua::Table = globals.raw_get("string")?;
    string.raw_set("dump", mlua::Nil)?;

    register_string_functions(&lua, options.memory_limit.unwrap_or(usize::MAX))?;
    register_log_module(&lua, sink)?;

    lua.load(PRELUDE).set_name("=sandbox").exec()?;
    Ok(lua)
}

/// [`SandboxExecutor`] backed by an embedded Lua 5.4 interpreter
pub struct LuaSandboxExecutor {
    options: SandboxOptions,
    sink: Arc<dyn LogSink>,
}

impl LuaSandboxExecutor {
    pub fn new(options: SandboxOptions) -> Self {
        Self {
            options,
            sink: Arc::new(TracingSink),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = sink;
        self
    }
}

impl Default for LuaSandboxExecutor {
    fn default() -> Self {
        Self::new(SandboxOptions::default())
    }
}

impl SandboxExecutor for LuaSandboxExecutor {
    fn execute(&self, code: &str, data: &Value) -> ExecutionResult {
        let source = wrap(code);
        let lua = create_sandbox(&self.options, self.sink.clone())
            .map_err(|e| JobError::new(JobErrorKind::RuntimeError, e))?;

        let main: Function = lua
            .load(source.text())
            .set_name(format!("={}", CHUNK_NAME))
            .eval()
            .map_err(|e| translate(&e, &source))?;

        let input = lua.to_value(data).map_err(|e| {
            JobError::new(
                JobErrorKind::TypeError,
                format!("data cannot be passed to the sandbox: {}", e),
            )
        })?;

        let deadline = Deadline::after(self.options.timeout);
        lua.set_app_data(deadline.clone());
        {
            let deadline = deadline.clone();
            lua.set_hook(
                HookTriggers::new().every_nth_instruction(HOOK_INTERVAL),
                move |_, _| {
                    if deadline.expired() {
                        return Err(mlua::Error::runtime("execution timed out"));
                    }
                    Ok(VmState::Continue)
                },
            )
            .map_err(|e| JobError::new(JobErrorKind::RuntimeError, e))?;
        }

        let returned = match main.call::<mlua::Value>(input) {
            Ok(value) => value,
            Err(_) if deadline.timed_out() => {
                return Err(JobError::timeout(self.options.timeout.as_millis()));
            }
            Err(e) => {
                tracing::debug!("Transformation failed: {}", e);
                return Err(translate(&e, &source));
            }
        };

        if returned.is_nil() {
            return Ok(None);
        }

        lua.from_value::<Value>(returned).map(Some).map_err(|e| {
            JobError::new(
                JobErrorKind::TypeError,
                format!("returned value is not valid data: {}", e),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn executor() -> LuaSandboxExecutor {
        LuaSandboxExecutor::default()
    }

    fn run(code: &str, data: Value) -> ExecutionResult {
        executor().execute(code, &data)
    }

    fn run_err(code: &str) -> JobError {
        run(code, json!({})).unwrap_err()
    }

    #[test]
    fn test_return_literal() {
        assert_eq!(run("return 1", json!({})).unwrap(), Some(json!(1)));
        assert_eq!(
            run("return 'hello'", json!({})).unwrap(),
            Some(json!("hello"))
        );
    }

    #[test]
    fn test_return_object() {
        let result = run("return { a = 1, b = { c = 'x' } }", json!({})).unwrap();
        assert_eq!(result, Some(json!({"a": 1, "b": {"c": "x"}})));
    }

    #[test]
    fn test_return_data() {
        let data = json!({"a": 1, "b": [1, 2, 3], "c": {"d": "x"}});
        assert_eq!(run("return data", data.clone()).unwrap(), Some(data));
    }

    #[test]
    fn test_modify_data() {
        let result = run(
            "data.b = data.a * 2\ndata.name = string.upper(data.name)\nreturn data",
            json!({"a": 21, "name": "sluice"}),
        )
        .unwrap();
        assert_eq!(result, Some(json!({"a": 21, "b": 42, "name": "SLUICE"})));
    }

    #[test]
    fn test_scalar_data() {
        assert_eq!(run("return data + data", json!(5)).unwrap(), Some(json!(10)));
    }

    #[test]
    fn test_no_return_is_none() {
        assert_eq!(run("local x = 1", json!({})).unwrap(), None);
        assert_eq!(run("", json!({})).unwrap(), None);
    }

    #[test]
    fn test_syntax_error() {
        let error = run_err("syntax error");
        assert_eq!(error.name, JobErrorKind::SyntaxError);
        assert!(error.message.starts_with("SyntaxError: "));
        assert_eq!(error.line_number, 1);
        assert_eq!(error.position, 8);
    }

    #[test]
    fn test_unclosed_call_points_past_input() {
        let error = run_err("c = math.max(a");
        assert_eq!(error.name, JobErrorKind::SyntaxError);
        assert_eq!(error.line_number, 1);
        assert_eq!(error.position, 15);
    }

    #[test]
    fn test_reference_error() {
        let error = run_err("return somethingThatIsntThere;");
        assert_eq!(error.name, JobErrorKind::ReferenceError);
        assert_eq!(
            error.message,
            "ReferenceError: somethingThatIsntThere is not defined"
        );
        assert_eq!(error.line_number, 1);
        assert_eq!(error.position, 8);
    }

    #[test]
    fn test_no_host_access() {
        for (code, name) in [
            ("return require('os')", "require"),
            ("return process.env", "process"),
            ("return os.time()", "os"),
            ("return io.open('/etc/passwd')", "io"),
            ("return load('return 1')()", "load"),
        ] {
            let error = run_err(code);
            assert_eq!(error.name, JobErrorKind::ReferenceError, "{}", code);
            assert_eq!(error.message, format!("ReferenceError: {} is not defined", name));
        }
    }

    #[test]
    fn test_errors_cannot_be_caught() {
        let error = run_err("return pcall(function() end)");
        assert_eq!(error.message, "ReferenceError: pcall is not defined");
    }

    #[test]
    fn test_type_error_stacktrace() {
        let code = "\nlocal function test(data)\n  data.d.e = 0\nend\nlocal result = test(data)\nreturn result";
        let error = run(code, json!({"a": 1})).unwrap_err();

        assert_eq!(error.name, JobErrorKind::TypeError);
        assert!(error.message.starts_with("TypeError: attempt to index a nil value"));
        assert_eq!(error.line_number, 3);
        assert_eq!(
            error.stacktrace,
            vec![
                "    at test (main:3)".to_string(),
                "    at main (main:5)".to_string(),
            ]
        );
    }

    #[test]
    fn test_explicit_error() {
        let error = run_err("local x = 1\nerror('boom')");
        assert_eq!(error.name, JobErrorKind::RuntimeError);
        assert_eq!(error.message, "RuntimeError: boom");
        assert_eq!(error.line_number, 2);
    }

    #[test]
    fn test_timeout() {
        let executor = LuaSandboxExecutor::new(SandboxOptions {
            timeout: Duration::from_millis(200),
            ..SandboxOptions::default()
        });

        let started = Instant::now();
        let error = executor.execute("while true do end", &json!({})).unwrap_err();

        assert_eq!(error.name, JobErrorKind::TimeoutError);
        assert_eq!(error.message, "TimeoutError: Script execution timed out after 200ms");
        assert_eq!((error.line_number, error.position), (0, 0));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    /// Runs on a separate thread so that a run ignoring its deadline fails the
    /// test instead of hanging it
    fn run_guarded(executor: LuaSandboxExecutor, code: &'static str) -> ExecutionResult {
        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            let _ = tx.send(executor.execute(code, &json!({})));
        });
        rx.recv_timeout(Duration::from_secs(10))
            .expect("execution did not return after its deadline")
    }

    fn short_timeout() -> LuaSandboxExecutor {
        LuaSandboxExecutor::new(SandboxOptions {
            timeout: Duration::from_millis(300),
            ..SandboxOptions::default()
        })
    }

    #[test]
    fn test_timeout_inside_pattern_matching() {
        let started = Instant::now();
        let error = run_guarded(
            short_timeout(),
            "local s = string.rep('a', 20000)\nreturn s:find('.-.-.-b')",
        )
        .unwrap_err();

        assert_eq!(error.name, JobErrorKind::TimeoutError);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_timeout_inside_gsub_callback() {
        let error = run_guarded(
            short_timeout(),
            "return ('abc'):gsub('%w', function(c) while true do end end)",
        )
        .unwrap_err();

        assert_eq!(error.name, JobErrorKind::TimeoutError);
    }

    #[test]
    fn test_finalizers_are_refused() {
        let error = run_guarded(
            short_timeout(),
            "setmetatable({}, {__gc = function() while true do end end})\nreturn 1",
        )
        .unwrap_err();

        assert_eq!(error.name, JobErrorKind::TypeError);
        assert_eq!(error.message, "TypeError: attempt to set a __gc metamethod");
        assert_eq!(error.line_number, 1);
    }

    #[test]
    fn test_plain_metatables_still_work() {
        let code = "local t = setmetatable({}, {__index = function(_, k) return k .. '!' end})\nreturn t.hi";
        assert_eq!(run(code, json!({})).unwrap(), Some(json!("hi!")));
    }

    #[test]
    fn test_rep_beyond_memory_limit() {
        let executor = LuaSandboxExecutor::new(SandboxOptions {
            memory_limit: Some(4 * 1024 * 1024),
            ..SandboxOptions::default()
        });

        let error = executor
            .execute("return string.rep('x', 1e9)", &json!({}))
            .unwrap_err();
        assert_eq!(error.name, JobErrorKind::RuntimeError);
        assert!(error.message.contains("resulting string too large"));
    }

    #[test]
    fn test_pattern_functions_match_lua_semantics() {
        let code = r#"
local words = {}
for w in data.text:gmatch("%a+") do words[#words + 1] = w:upper() end
local trimmed = ("  padded  "):match("^%s*(.-)%s*$")
local swapped = ("k=v"):gsub("(%w)=(%w)", "%2=%1")
return { words = words, trimmed = trimmed, swapped = swapped, at = ("a.b"):find(".", 1, true) }
"#;
        let result = run(code, json!({"text": "hi there"})).unwrap();
        assert_eq!(
            result,
            Some(json!({"words": ["HI", "THERE"], "trimmed": "padded", "swapped": "v=k", "at": 2}))
        );
    }

    #[test]
    fn test_memory_limit() {
        let executor = LuaSandboxExecutor::new(SandboxOptions {
            memory_limit: Some(4 * 1024 * 1024),
            ..SandboxOptions::default()
        });

        let error = executor
            .execute("local t = {}\nfor i = 1, 1e8 do t[i] = i end\nreturn t", &json!({}))
            .unwrap_err();
        assert_eq!(error.name, JobErrorKind::RuntimeError);
        assert!(error.message.contains("memory"));
    }

    #[test]
    fn test_runs_are_isolated() {
        let executor = executor();
        let code = "counter = (rawget(_G, 'counter') or 0) + 1\nreturn counter";

        assert_eq!(executor.execute(code, &json!({})).unwrap(), Some(json!(1)));
        assert_eq!(executor.execute(code, &json!({})).unwrap(), Some(json!(1)));
    }

    #[test]
    fn test_function_return_is_type_error() {
        let error = run_err("return function() end");
        assert_eq!(error.name, JobErrorKind::TypeError);
    }

    #[derive(Default)]
    struct CollectingSink {
        messages: std::sync::Mutex<Vec<String>>,
    }

    impl LogSink for CollectingSink {
        fn write(&self, _level: crate::log::LogLevel, message: &str) {
            self.messages.lock().unwrap().push(message.to_string());
        }
    }

    #[test]
    fn test_log_reaches_sink() {
        let sink = Arc::new(CollectingSink::default());
        let executor = executor().with_sink(sink.clone());

        let result = executor
            .execute("log.info('rows: ' .. #data)\nreturn true", &json!([1, 2, 3]))
            .unwrap();

        assert_eq!(result, Some(json!(true)));
        assert_eq!(*sink.messages.lock().unwrap(), vec!["rows: 3".to_string()]);
    }
}
