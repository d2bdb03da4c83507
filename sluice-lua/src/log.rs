//! `log` table available to transformation code
//!
//! Messages are handed to a [`LogSink`]. The default sink forwards them to
//! `tracing` as events of the current span, so a caller that runs code inside
//! a span (the pipeline manager opens one per pipeline) gets its fields on
//! every script message.

use mlua::prelude::*;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    const ALL: [LogLevel; 4] = [
        LogLevel::Debug,
        LogLevel::Info,
        LogLevel::Warning,
        LogLevel::Error,
    ];

    /// Name of the function exposed in the `log` table
    pub fn function_name(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.function_name())
    }
}

/// Destination of messages written through the `log` table
pub trait LogSink: Send + Sync {
    fn write(&self, level: LogLevel, message: &str);
}

/// Forwards script messages to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn write(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Debug => tracing::debug!(target: "sluice_lua::script", "{}", message),
            LogLevel::Info => tracing::info!(target: "sluice_lua::script", "{}", message),
            LogLevel::Warning => tracing::warn!(target: "sluice_lua::script", "{}", message),
            LogLevel::Error => tracing::error!(target: "sluice_lua::script", "{}", message),
        }
    }
}

/// Registers the global `log` table with one function per level
pub fn register_log_module(lua: &Lua, sink: Arc<dyn LogSink>) -> LuaResult<()> {
    let log_table = lua.create_table()?;

    for level in LogLevel::ALL {
        let sink = sink.clone();
        log_table.set(
            level.function_name(),
            lua.create_function(move |_, msg: String| {
                sink.write(level, &msg);
                Ok(())
            })?,
        )?;
    }

    lua.globals().set("log", log_table)?;
    Ok(())
}
