//! # Tool System
//!
//! Tools are the local capabilities the model can ask for: each one is a value
//! holding its name, a human-readable description, a JSON Schema describing its
//! named arguments, and an async handler.
//!
//! ## Tool Lifecycle
//!
//! ```text
//! 1. Definition:   Create tool with name, description, schema, and handler
//! 2. Registration: Collect tools into an immutable ToolRegistry
//! 3. Advertising:  The registry's schema list is sent with every request
//! 4. Dispatch:     The agent looks the tool up by name and invokes it
//! 5. Response:     The ToolResult is serialized into a tool message
//! ```
//!
//! ## Schema Conversion
//!
//! Three schema spellings are accepted and normalized to JSON Schema:
//!
//! - **Simple notation**: `{"path": "string", "content": "string"}`
//! - **Typed schema**: `{"path": {"type": "string", "description": "..."}}`
//! - **Full JSON Schema**: already has `"type"` and `"properties"`
//!
//! ## Failure Model
//!
//! A handler returns `Err` for anything that went wrong. [`Tool::invoke`]
//! turns both errors and panics into [`ToolResult::Error`], so a failing tool
//! never ends the turn; the model sees the error text on the next round.
//!
//! ```rust,no_run
//! use local_agent::{tool, ToolRegistry};
//! use serde_json::json;
//!
//! let echo = tool("echo", "Echo the given text back")
//!     .param("text", "string")
//!     .build(|args| async move { Ok(json!({"text": args["text"]})) });
//!
//! let registry = ToolRegistry::new().with_tool(echo);
//! assert!(registry.get("echo").is_some());
//! ```

use crate::Result;
use futures::FutureExt;
use serde_json::Value;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;

/// Type alias for tool handler functions.
///
/// ```text
/// Arc<                                      // Shared between registry clones
///   dyn Fn(Value)                          // JSON object of named arguments
///     -> Pin<Box<                           // Type-erased future
///       dyn Future<Output = Result<Value>>  // Structured result or failure
///         + Send>>
///     + Send + Sync>
/// ```
pub type ToolHandler =
    Arc<dyn Fn(Value) -> Pin<Box<dyn Future<Output = Result<Value>> + Send>> + Send + Sync>;

/// Tool definition for OpenAI-compatible function calling.
///
/// Tools are immutable once created. Cloning is cheap: the handler is shared
/// through an [`Arc`].
#[derive(Clone)]
pub struct Tool {
    /// Name the model uses when calling the tool (snake_case by convention).
    name: String,

    /// Description sent to the model; it decides when the tool gets called.
    description: String,

    /// JSON Schema (`type: object`) for the named arguments.
    input_schema: Value,

    handler: ToolHandler,
}

impl Tool {
    /// Create a new tool with flexible schema definition.
    ///
    /// The schema may be simple notation (`{"path": "string"}`, every entry
    /// required), typed properties where `"optional": true`, `"required":
    /// false` or a `"default"` makes an entry optional, or a full JSON Schema
    /// which is passed through unchanged.
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        handler: F,
    ) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: convert_schema_to_openai(input_schema),
            handler: Arc::new(move |args| Box::pin(handler(args))),
        }
    }

    /// Execute the tool with the provided arguments.
    ///
    /// Errors from the handler are returned as-is; see [`Tool::invoke`] for
    /// the variant that never fails.
    pub async fn execute(&self, arguments: Value) -> Result<Value> {
        (self.handler)(arguments).await
    }

    /// Execute the tool and fold every outcome into a [`ToolResult`].
    ///
    /// Handler errors become [`ToolResult::Error`] carrying the error text.
    /// A panicking handler is caught and reported the same way.
    pub async fn invoke(&self, arguments: Value) -> ToolResult {
        match AssertUnwindSafe(self.execute(arguments)).catch_unwind().await {
            Ok(Ok(value)) => ToolResult::Success(value),
            Ok(Err(e)) => ToolResult::Error(e.tool_message()),
            Err(panic) => {
                log::warn!("tool '{}' panicked", self.name);
                ToolResult::Error(format!(
                    "Tool '{}' panicked: {}",
                    self.name,
                    panic_message(panic.as_ref())
                ))
            }
        }
    }

    /// Convert the tool definition to OpenAI's function calling format.
    ///
    /// ```json
    /// {
    ///   "type": "function",
    ///   "function": {
    ///     "name": "tool_name",
    ///     "description": "Tool description",
    ///     "parameters": { "type": "object", "properties": { ... }, "required": [ ... ] }
    ///   }
    /// }
    /// ```
    pub fn to_openai_format(&self) -> Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.input_schema
            }
        })
    }

    /// Returns the tool's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the tool's description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns a reference to the tool's input schema.
    pub fn input_schema(&self) -> &Value {
        &self.input_schema
    }
}

impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("input_schema", &self.input_schema)
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Outcome of one tool invocation, as recorded in the transcript.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolResult {
    /// Arbitrary structured data returned by the tool
    Success(Value),
    /// Failure description; serialized as `{"error": "..."}`
    Error(String),
}

impl ToolResult {
    pub fn error(msg: impl Into<String>) -> Self {
        ToolResult::Error(msg.into())
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ToolResult::Error(_))
    }

    /// JSON payload for the tool message.
    pub fn to_value(&self) -> Value {
        match self {
            ToolResult::Success(value) => value.clone(),
            ToolResult::Error(msg) => serde_json::json!({ "error": msg }),
        }
    }

    /// Serialized text placed in the tool message's `content`.
    pub fn to_content(&self) -> String {
        self.to_value().to_string()
    }
}

/// Immutable name → tool mapping handed to the agent at construction.
///
/// Registration order is preserved, so the schema list sent to the server is
/// stable across requests. Registering a name twice replaces the earlier tool
/// in place.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a tool, replacing any tool already registered under its name.
    pub fn with_tool(mut self, tool: Tool) -> Self {
        let tool = Arc::new(tool);
        match self.tools.iter().position(|t| t.name() == tool.name()) {
            Some(pos) => self.tools[pos] = tool,
            None => self.tools.push(tool),
        }
        self
    }

    /// Adds every tool from `tools`, in order.
    pub fn with_tools(self, tools: impl IntoIterator<Item = Tool>) -> Self {
        tools.into_iter().fold(self, ToolRegistry::with_tool)
    }

    /// Looks up a registered tool by name (case-sensitive).
    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tool> {
        self.tools.iter().map(|t| t.as_ref())
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Tool schema list in OpenAI function-calling format.
    pub fn schemas(&self) -> Vec<Value> {
        self.tools.iter().map(|t| t.to_openai_format()).collect()
    }
}

impl FromIterator<Tool> for ToolRegistry {
    fn from_iter<I: IntoIterator<Item = Tool>>(iter: I) -> Self {
        ToolRegistry::new().with_tools(iter)
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

fn convert_schema_to_openai(schema: Value) -> Value {
    let Some(obj) = schema.as_object() else {
        // Not an object: accept any properties
        return serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        });
    };

    if obj.contains_key("type") && obj.contains_key("properties") {
        return schema;
    }

    let mut properties = serde_json::Map::new();
    let mut required = Vec::new();

    for (param_name, param_type) in obj {
        if let Some(type_str) = param_type.as_str() {
            // Simple notation is always required
            properties.insert(param_name.clone(), type_to_json_schema(type_str));
            required.push(param_name.clone());
        } else if let Some(prop_obj) = param_type.as_object() {
            let mut prop_obj = prop_obj.clone();

            // "optional" and per-property "required" are not JSON Schema keys
            let is_optional = prop_obj
                .remove("optional")
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            let is_required = prop_obj.remove("required").and_then(|v| v.as_bool());
            let has_default = prop_obj.contains_key("default");

            properties.insert(param_name.clone(), Value::Object(prop_obj));

            match is_required {
                Some(true) => required.push(param_name.clone()),
                Some(false) => {}
                None if is_optional || has_default => {}
                None => required.push(param_name.clone()),
            }
        }
    }

    serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": required
    })
}

fn type_to_json_schema(type_str: &str) -> Value {
    let json_type = match type_str {
        "string" | "str" => "string",
        "integer" | "int" | "i32" | "i64" | "u32" | "u64" => "integer",
        "number" | "float" | "f32" | "f64" => "number",
        "boolean" | "bool" => "boolean",
        "array" | "list" | "vec" => "array",
        "object" | "dict" | "map" => "object",
        // Unknown types fall back to string
        _ => "string",
    };

    serde_json::json!({ "type": json_type })
}

/// Builder for creating tools with a fluent API.
pub struct ToolBuilder {
    name: String,
    description: String,
    schema: Value,
}

impl ToolBuilder {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            schema: serde_json::json!({}),
        }
    }

    /// Replaces the whole schema.
    pub fn schema(mut self, schema: Value) -> Self {
        self.schema = schema;
        self
    }

    /// Adds one required parameter in simple notation.
    pub fn param(mut self, name: &str, type_str: &str) -> Self {
        // A non-object schema set through .schema() is discarded
        if !self.schema.is_object() {
            self.schema = serde_json::json!({});
        }
        if let Some(obj) = self.schema.as_object_mut() {
            obj.insert(name.to_string(), Value::String(type_str.to_string()));
        }
        self
    }

    /// Adds one parameter with a description; `required: false` makes it optional.
    pub fn describe(mut self, name: &str, type_str: &str, description: &str, required: bool) -> Self {
        let mut prop = type_to_json_schema(type_str);
        prop["description"] = Value::String(description.to_string());
        prop["required"] = Value::Bool(required);

        if !self.schema.is_object() {
            self.schema = serde_json::json!({});
        }
        if let Some(obj) = self.schema.as_object_mut() {
            obj.insert(name.to_string(), prop);
        }
        self
    }

    pub fn build<F, Fut>(self, handler: F) -> Tool
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Tool::new(self.name, self.description, self.schema, handler)
    }
}

/// Start building a tool: `tool("name", "description").param(..).build(handler)`.
pub fn tool(name: impl Into<String>, description: impl Into<String>) -> ToolBuilder {
    ToolBuilder::new(name, description)
}
