//! Built-in local tools: filesystem access, shell, calculator and clock.
//!
//! [`builtin_tools`] returns the six tools the CLI hands to the agent. Each
//! handler returns `Err(Error::Tool(..))` with a message written for the
//! model; [`Tool::invoke`] turns that into an `{"error": ...}` payload.

use crate::calc;
use crate::tools::{Tool, ToolRegistry};
use crate::{Error, Result};
use chrono::{Datelike, Local};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

/// Largest file `read_file` will return.
pub const MAX_FILE_SIZE: u64 = 100 * 1024;

/// Cap applied separately to a command's stdout and stderr.
pub const MAX_OUTPUT_SIZE: usize = 10 * 1024;

/// Wall-clock limit for `run_command`.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Default system prompt for the local assistant.
pub const SYSTEM_PROMPT: &str = "You are a local AI assistant with access to the user's file system and shell.\n\
You can read/write files, list directories, run commands, do calculations, and check the time.\n\
Think step by step for complex tasks. Use tools when needed; don't guess file contents or command output.\n\
Be concise. When showing file contents, summarize unless the user asks for the full output.";

/// All six built-in tools, in the order they are advertised.
pub fn builtin_tools() -> ToolRegistry {
    ToolRegistry::new().with_tools([
        read_file_tool(),
        write_file_tool(),
        list_directory_tool(),
        run_command_tool(),
        calculate_tool(),
        get_datetime_tool(),
    ])
}

pub fn read_file_tool() -> Tool {
    Tool::new(
        "read_file",
        "Read a file from the local filesystem. Returns file content as text.",
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Absolute or relative file path"}
            },
            "required": ["path"]
        }),
        read_file,
    )
}

pub fn write_file_tool() -> Tool {
    Tool::new(
        "write_file",
        "Write content to a file. Creates parent directories if needed.",
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "File path to write to"},
                "content": {"type": "string", "description": "Content to write"}
            },
            "required": ["path", "content"]
        }),
        write_file,
    )
}

pub fn list_directory_tool() -> Tool {
    Tool::new(
        "list_directory",
        "List files and subdirectories in a directory with sizes.",
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Directory path (default: current directory)"}
            }
        }),
        list_directory,
    )
}

pub fn run_command_tool() -> Tool {
    Tool::new(
        "run_command",
        "Run a shell command and return stdout/stderr. 30s timeout, 10KB output limit.",
        json!({
            "type": "object",
            "properties": {
                "command": {"type": "string", "description": "Shell command to execute"}
            },
            "required": ["command"]
        }),
        |args| async move {
            let CommandArgs { command } = parse_args("run_command", args)?;
            Ok(command_payload(&command, COMMAND_TIMEOUT).await)
        },
    )
}

pub fn calculate_tool() -> Tool {
    Tool::new(
        "calculate",
        "Evaluate a math expression. Supports +, -, *, /, **, % and functions: sin, cos, tan, \
         asin, acos, atan, sqrt, log, log10, exp, pow, abs, floor, ceil, round. Constants: pi, e.",
        json!({
            "type": "object",
            "properties": {
                "expression": {"type": "string", "description": "Math expression, e.g. 'sqrt(16) + 5 * 2'"}
            },
            "required": ["expression"]
        }),
        calculate,
    )
}

pub fn get_datetime_tool() -> Tool {
    Tool::new(
        "get_datetime",
        "Get current date, time, day of week, and week number.",
        json!({"type": "object", "properties": {}}),
        |_args| async move { Ok(get_datetime()) },
    )
}

#[derive(Deserialize)]
struct PathArgs {
    path: String,
}

#[derive(Deserialize)]
struct WriteArgs {
    path: String,
    content: String,
}

#[derive(Deserialize)]
struct ListArgs {
    #[serde(default = "current_dir")]
    path: String,
}

fn current_dir() -> String {
    ".".to_string()
}

#[derive(Deserialize)]
struct CommandArgs {
    command: String,
}

#[derive(Deserialize)]
struct CalculateArgs {
    expression: String,
}

fn parse_args<T: DeserializeOwned>(tool: &str, args: Value) -> Result<T> {
    serde_json::from_value(args)
        .map_err(|e| Error::invalid_input(format!("Invalid arguments for {tool}: {e}")))
}

/// Expands a leading `~` to the home directory.
fn expand_home(raw: &str) -> PathBuf {
    let rest = match raw.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') || rest.starts_with('\\') => rest,
        _ => return PathBuf::from(raw),
    };
    match dirs::home_dir() {
        Some(home) => home.join(rest.trim_start_matches(['/', '\\'])),
        None => PathBuf::from(raw),
    }
}

/// Absolute form of `raw`, with symlinks resolved when the path exists.
async fn resolve_path(raw: &str) -> Result<PathBuf> {
    let absolute = std::path::absolute(expand_home(raw))
        .map_err(|e| Error::tool(format!("Invalid path '{raw}': {e}")))?;
    Ok(tokio::fs::canonicalize(&absolute).await.unwrap_or(absolute))
}

fn io_error(path: &Path, e: std::io::Error) -> Error {
    Error::tool(format!("{}: {}", path.display(), e))
}

async fn read_file(args: Value) -> Result<Value> {
    let PathArgs { path } = parse_args("read_file", args)?;
    let path = resolve_path(&path).await?;

    let metadata = match tokio::fs::metadata(&path).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(Error::tool(format!("File not found: {}", path.display())));
        }
        Err(e) => return Err(io_error(&path, e)),
    };
    if !metadata.is_file() {
        return Err(Error::tool(format!("Not a file: {}", path.display())));
    }
    if metadata.len() > MAX_FILE_SIZE {
        return Err(Error::tool(format!(
            "File too large ({} bytes, max {})",
            metadata.len(),
            MAX_FILE_SIZE
        )));
    }

    let bytes = tokio::fs::read(&path).await.map_err(|e| io_error(&path, e))?;
    let content = String::from_utf8(bytes).map_err(|_| {
        Error::tool(format!("Binary file, cannot read as text: {}", path.display()))
    })?;

    Ok(json!({
        "path": path.display().to_string(),
        "size": content.chars().count(),
        "content": content,
    }))
}

async fn write_file(args: Value) -> Result<Value> {
    let WriteArgs { path, content } = parse_args("write_file", args)?;
    let path = resolve_path(&path).await?;

    let existed = tokio::fs::try_exists(&path).await.unwrap_or(false);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| io_error(parent, e))?;
    }
    tokio::fs::write(&path, &content)
        .await
        .map_err(|e| io_error(&path, e))?;

    log::debug!("wrote {} bytes to {}", content.len(), path.display());

    Ok(json!({
        "path": path.display().to_string(),
        "status": if existed { "overwritten" } else { "created" },
        "size": content.chars().count(),
    }))
}

async fn list_directory(args: Value) -> Result<Value> {
    let ListArgs { path } = parse_args("list_directory", args)?;
    let path = resolve_path(&path).await?;

    match tokio::fs::metadata(&path).await {
        Ok(metadata) if !metadata.is_dir() => {
            return Err(Error::tool(format!("Not a directory: {}", path.display())));
        }
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(Error::tool(format!("Directory not found: {}", path.display())));
        }
        Err(e) => return Err(io_error(&path, e)),
    }

    let mut reader = tokio::fs::read_dir(&path)
        .await
        .map_err(|e| io_error(&path, e))?;
    let mut entries = Vec::new();
    while let Some(entry) = reader.next_entry().await.map_err(|e| io_error(&path, e))? {
        let name = entry.file_name().to_string_lossy().into_owned();
        // Follows symlinks; a dangling link is listed as a file without size
        let (is_dir, size) = match tokio::fs::metadata(entry.path()).await {
            Ok(m) => (m.is_dir(), m.is_file().then(|| m.len())),
            Err(_) => (false, None),
        };
        entries.push((name, is_dir, size));
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let entries: Vec<Value> = entries
        .into_iter()
        .map(|(name, is_dir, size)| {
            let mut entry = Map::new();
            entry.insert("name".into(), Value::String(name));
            entry.insert("type".into(), json!(if is_dir { "dir" } else { "file" }));
            if let Some(size) = size {
                entry.insert("size".into(), json!(size));
            }
            Value::Object(entry)
        })
        .collect();

    Ok(json!({
        "path": path.display().to_string(),
        "count": entries.len(),
        "entries": entries,
    }))
}

fn shell_command(command: &str) -> tokio::process::Command {
    let mut cmd = if cfg!(windows) {
        let mut cmd = tokio::process::Command::new("cmd");
        cmd.arg("/C");
        cmd
    } else {
        let mut cmd = tokio::process::Command::new("sh");
        cmd.arg("-c");
        cmd
    };
    cmd.arg(command);
    cmd
}

/// Truncates `output` to at most `limit` bytes on a char boundary.
fn cap_output(output: &str, limit: usize) -> (&str, bool) {
    if output.len() <= limit {
        return (output, false);
    }
    let mut end = limit;
    while end > 0 && !output.is_char_boundary(end) {
        end -= 1;
    }
    (&output[..end], true)
}

/// Result payload of the `run_command` tool. Failures (spawn errors and
/// timeouts) are reported as `{"error", "command"}` so the model can tell
/// which command broke.
async fn command_payload(command: &str, timeout: Duration) -> Value {
    match run_command(command, timeout).await {
        Ok(value) => value,
        Err(e) => json!({"error": e.tool_message(), "command": command}),
    }
}

/// Runs `command` through the platform shell in the current directory.
///
/// The child is killed if it outlives `timeout`.
pub async fn run_command(command: &str, timeout: Duration) -> Result<Value> {
    let child = shell_command(command)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| Error::tool(format!("Failed to execute command: {e}")))?;

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => return Err(Error::tool(format!("Failed to execute command: {e}"))),
        Err(_) => {
            log::warn!("command timed out after {:?}: {}", timeout, command);
            return Err(Error::tool(format!(
                "Command timed out after {}s",
                timeout.as_secs()
            )));
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let (stdout, stdout_truncated) = cap_output(&stdout, MAX_OUTPUT_SIZE);
    let (stderr, stderr_truncated) = cap_output(&stderr, MAX_OUTPUT_SIZE);

    let mut result = Map::new();
    result.insert("command".into(), json!(command));
    result.insert("returncode".into(), json!(output.status.code().unwrap_or(-1)));
    result.insert("stdout".into(), json!(stdout));
    if !stderr.is_empty() {
        result.insert("stderr".into(), json!(stderr));
    }
    if stdout_truncated || stderr_truncated {
        result.insert("truncated".into(), Value::Bool(true));
    }
    Ok(Value::Object(result))
}

async fn calculate(args: Value) -> Result<Value> {
    let CalculateArgs { expression } = parse_args("calculate", args)?;
    let result = calc::evaluate(&expression)?;
    Ok(json!({"expression": expression, "result": result}))
}

/// Local date and time in several handy shapes.
pub fn get_datetime() -> Value {
    let now = Local::now();
    json!({
        "datetime": now.format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
        "date": now.format("%Y-%m-%d").to_string(),
        "time": now.format("%H:%M:%S").to_string(),
        "day_of_week": now.format("%A").to_string(),
        "week_number": now.iso_week().week(),
        "timezone": now.format("UTC%:z").to_string(),
    })
}
