//! Console capture for sandboxed code.
//!
//! The sandbox gets a `console` global whose methods append to a
//! [`ConsoleOutput`] owned by the runtime and mirror each line to
//! `tracing` under the `sandbox::console` target.
//!
//! The buffer lives in host memory, outside the engine heap limit, so it
//! holds at most a fixed number of bytes per evaluation. Output past the
//! cap is dropped and the buffer remembers that it was truncated.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rquickjs::convert::Coerced;
use rquickjs::function::Rest;
use rquickjs::{Ctx, Function, Object, Value};

/// Default per-evaluation cap on captured console text.
pub const DEFAULT_MAX_CONSOLE_BYTES: usize = 1024 * 1024; // 1MB

/// Severity of a console line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConsoleLevel {
    /// `console.debug`
    Debug,
    /// `console.log`
    Log,
    /// `console.info`
    Info,
    /// `console.warn`
    Warn,
    /// `console.error`
    Error,
}

impl ConsoleLevel {
    /// Every level, in the order methods are installed.
    pub const ALL: [ConsoleLevel; 5] = [
        ConsoleLevel::Debug,
        ConsoleLevel::Log,
        ConsoleLevel::Info,
        ConsoleLevel::Warn,
        ConsoleLevel::Error,
    ];

    /// Name of the `console` method for this level.
    pub fn method(&self) -> &'static str {
        match self {
            ConsoleLevel::Debug => "debug",
            ConsoleLevel::Log => "log",
            ConsoleLevel::Info => "info",
            ConsoleLevel::Warn => "warn",
            ConsoleLevel::Error => "error",
        }
    }
}

/// One captured `console` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleLine {
    /// Which method was called.
    pub level: ConsoleLevel,
    /// Arguments rendered and joined by a space.
    pub text: String,
}

#[derive(Debug)]
struct ConsoleBuffer {
    lines: Vec<ConsoleLine>,
    bytes: usize,
    limit: usize,
    dropped: usize,
}

impl ConsoleBuffer {
    fn is_full(&self) -> bool {
        self.bytes >= self.limit
    }
}

/// A shared, size-capped buffer of console lines.
#[derive(Clone, Debug)]
pub struct ConsoleOutput {
    buffer: Arc<Mutex<ConsoleBuffer>>,
}

impl Default for ConsoleOutput {
    fn default() -> Self {
        Self::with_limit(DEFAULT_MAX_CONSOLE_BYTES)
    }
}

impl ConsoleOutput {
    /// Create an empty buffer with the default cap.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty buffer holding at most `max_bytes` of text.
    pub fn with_limit(max_bytes: usize) -> Self {
        Self {
            buffer: Arc::new(Mutex::new(ConsoleBuffer {
                lines: Vec::new(),
                bytes: 0,
                limit: max_bytes,
                dropped: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ConsoleBuffer> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a line and mirror it to `tracing`.
    ///
    /// A line that does not fit is cut at the cap; once the cap is reached
    /// further lines are counted and discarded. Returns `false` if any part
    /// of `text` was discarded.
    pub fn record(&self, level: ConsoleLevel, mut text: String) -> bool {
        let mut buffer = self.lock();
        if buffer.is_full() {
            buffer.dropped += 1;
            return false;
        }

        let remaining = buffer.limit - buffer.bytes;
        let complete = text.len() <= remaining;
        if !complete {
            let mut cut = remaining;
            while !text.is_char_boundary(cut) {
                cut -= 1;
            }
            text.truncate(cut);
            buffer.dropped += 1;
            tracing::warn!(
                target: "sandbox::console",
                limit = buffer.limit,
                "console output cap reached, further output is discarded"
            );
        }

        match level {
            ConsoleLevel::Warn => tracing::warn!(target: "sandbox::console", "{text}"),
            ConsoleLevel::Error => tracing::error!(target: "sandbox::console", "{text}"),
            ConsoleLevel::Debug => tracing::debug!(target: "sandbox::console", "{text}"),
            _ => tracing::info!(target: "sandbox::console", "{text}"),
        }

        // An empty remainder still counts toward the cap so a full buffer
        // stays full.
        buffer.bytes = if complete { buffer.bytes + text.len() } else { buffer.limit };
        buffer.lines.push(ConsoleLine { level, text });
        complete
    }

    /// Check if no more text will be accepted.
    pub fn is_full(&self) -> bool {
        self.lock().is_full()
    }

    /// Check if any output was cut or discarded since the last clear.
    pub fn truncated(&self) -> bool {
        self.lock().dropped > 0
    }

    /// Number of `console` calls that were cut or discarded.
    pub fn dropped(&self) -> usize {
        self.lock().dropped
    }

    /// Bytes of text currently held.
    pub fn bytes(&self) -> usize {
        self.lock().bytes
    }

    /// Snapshot of all captured lines.
    pub fn lines(&self) -> Vec<ConsoleLine> {
        self.lock().lines.clone()
    }

    /// Captured text, one line per call.
    pub fn to_string_lossy(&self) -> String {
        self.lock()
            .lines
            .iter()
            .map(|line| line.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Clear the buffer and its truncation record.
    pub fn clear(&self) {
        let mut buffer = self.lock();
        buffer.lines.clear();
        buffer.bytes = 0;
        buffer.dropped = 0;
    }

    /// Get the number of captured lines.
    pub fn len(&self) -> usize {
        self.lock().lines.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Render one `console` argument. Never fails: anything that cannot be
/// stringified falls back to its coerced form or its type.
fn render<'js>(ctx: &Ctx<'js>, value: &Value<'js>) -> String {
    if let Some(s) = value.as_string() {
        if let Ok(text) = s.to_string() {
            return text;
        }
    }
    if value.is_object() && !value.is_function() {
        match ctx.json_stringify(value.clone()) {
            Ok(Some(json)) => {
                if let Ok(text) = json.to_string() {
                    return text;
                }
            }
            Ok(None) => {}
            Err(_) => {
                // Cycles and BigInt fields throw; drop the pending exception.
                ctx.catch();
            }
        }
    }
    match value.get::<Coerced<String>>() {
        Ok(text) => text.0,
        Err(_) => {
            ctx.catch();
            format!("[{:?}]", value.type_of())
        }
    }
}

/// Install the `console` global on a context.
pub fn install_console<'js>(ctx: &Ctx<'js>, output: &ConsoleOutput) -> rquickjs::Result<()> {
    let console = Object::new(ctx.clone())?;
    for level in ConsoleLevel::ALL {
        let output = output.clone();
        let method = Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, args: Rest<Value<'js>>| {
                if output.is_full() {
                    output.record(level, String::new());
                    return;
                }
                let text = args
                    .iter()
                    .map(|arg| render(&ctx, arg))
                    .collect::<Vec<_>>()
                    .join(" ");
                output.record(level, text);
            },
        )?;
        console.set(level.method(), method)?;
    }
    ctx.globals().set("console", console)
}
