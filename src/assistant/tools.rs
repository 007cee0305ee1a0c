use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::assistant::backend::Backend;
use crate::error::ToolError;

/// JSON schema primitive types supported for tool parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolParamType {
    Integer,
    Number,
    String,
    Boolean,
}

impl ToolParamType {
    fn as_str(self) -> &'static str {
        match self {
            ToolParamType::Integer => "integer",
            ToolParamType::Number => "number",
            ToolParamType::String => "string",
            ToolParamType::Boolean => "boolean",
        }
    }
}

/// One function parameter definition.
#[derive(Debug, Clone)]
pub struct ToolParam {
    /// Parameter name.
    pub name: String,
    /// Optional human-readable description.
    pub description: Option<String>,
    /// JSON schema type.
    pub kind: ToolParamType,
    /// Whether the parameter is required.
    pub required: bool,
    /// Allowed values, empty when unconstrained.
    pub allowed: Vec<String>,
}

impl ToolParam {
    /// Builds a parameter definition.
    pub fn new(
        name: impl Into<String>,
        kind: ToolParamType,
        required: bool,
        description: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description,
            kind,
            required,
            allowed: Vec::new(),
        }
    }

    /// Restricts the parameter to a fixed set of values.
    pub fn with_enum<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed = values.into_iter().map(Into::into).collect();
        self
    }
}

/// Callable tool function definition.
#[derive(Debug, Clone)]
pub struct ToolFunction {
    /// Function name.
    pub name: String,
    /// Function description.
    pub description: String,
    /// Parameter definitions.
    pub params: Vec<ToolParam>,
}

impl ToolFunction {
    /// Creates a function definition.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            params: Vec::new(),
        }
    }

    /// Appends one parameter definition.
    pub fn with_param(mut self, param: ToolParam) -> Self {
        self.params.push(param);
        self
    }

    fn to_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for param in &self.params {
            let mut param_def = Map::new();
            param_def.insert("type".to_string(), json!(param.kind.as_str()));
            if let Some(description) = &param.description {
                param_def.insert("description".to_string(), json!(description));
            }
            if !param.allowed.is_empty() {
                param_def.insert("enum".to_string(), json!(param.allowed));
            }
            properties.insert(param.name.clone(), Value::Object(param_def));
            if param.required {
                required.push(json!(param.name));
            }
        }

        let mut schema = Map::new();
        schema.insert("type".to_string(), json!("object"));
        schema.insert("properties".to_string(), Value::Object(properties));
        if !required.is_empty() {
            schema.insert("required".to_string(), Value::Array(required));
        }
        Value::Object(schema)
    }
}

/// Tool wrapper matching chat-completions function-calling schema.
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    /// Function declaration.
    pub function: ToolFunction,
}

impl ToolDefinition {
    /// Wraps a function definition as a tool.
    pub fn from_function(function: ToolFunction) -> Self {
        Self { function }
    }

    pub fn name(&self) -> &str {
        &self.function.name
    }

    /// Serializes the tool declaration to JSON.
    pub fn to_json(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.function.name,
                "description": self.function.description,
                "parameters": self.function.to_schema(),
            }
        })
    }
}

/// Function name and raw JSON argument text of a tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

/// Tool call emitted by a model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider-generated call id.
    pub id: String,
    #[serde(rename = "type", default = "function_kind")]
    pub kind: String,
    pub function: FunctionCall,
    /// Position assigned by the stream; only used while reassembling fragments.
    #[serde(skip)]
    pub index: u32,
}

fn function_kind() -> String {
    "function".to_string()
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: function_kind(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
            index: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.function.name
    }

    /// Parses the concatenated argument text. An empty string means no arguments.
    pub fn parse_arguments(&self) -> Result<Value, ToolError> {
        let raw = self.function.arguments.trim();
        if raw.is_empty() {
            return Ok(Value::Object(Map::new()));
        }
        serde_json::from_str(raw).map_err(|source| ToolError::InvalidArguments {
            name: self.function.name.clone(),
            source,
        })
    }
}

/// Local implementation of a tool, run against the backend on the model's behalf.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, args: Value, backend: &dyn Backend) -> Result<Value, ToolError>;
}

/// Result of one executed tool call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolOutput {
    pub id: String,
    pub name: String,
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolOutput {
    fn failed(call: &ToolCall, error: &ToolError) -> Self {
        Self {
            id: call.id.clone(),
            name: call.name().to_string(),
            output: None,
            error: Some(error.to_string()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Text handed back to the model in the tool-role message.
    pub fn to_message_content(&self) -> String {
        let value = match (&self.error, &self.output) {
            (Some(error), _) => json!({ "error": error }),
            (None, Some(output)) => output.clone(),
            (None, None) => Value::Null,
        };
        value.to_string()
    }
}

struct RegisteredTool {
    definition: ToolDefinition,
    handler: Arc<dyn ToolHandler>,
}

/// Named, schema-described operations the model may request.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: IndexMap<String, Arc<RegisteredTool>>,
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.tools.keys()).finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a tool keyed by its function name. A second registration under
    /// the same name replaces the first.
    pub fn register(
        &mut self,
        definition: ToolDefinition,
        handler: impl ToolHandler + 'static,
    ) -> Result<(), ToolError> {
        let name = definition.name().trim().to_string();
        if name.is_empty() {
            return Err(ToolError::EmptyName);
        }
        if self.tools.contains_key(&name) {
            log::warn!("tool '{name}' registered twice, replacing previous definition");
        }
        self.tools.insert(
            name,
            Arc::new(RegisteredTool {
                definition,
                handler: Arc::new(handler),
            }),
        );
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Registered names, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.keys().map(String::as_str)
    }

    pub fn definition(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.get(name).map(|tool| &tool.definition)
    }

    /// Tool declarations in the wire format sent on every chat request.
    pub fn schemas(&self) -> Vec<Value> {
        self.tools
            .values()
            .map(|tool| tool.definition.to_json())
            .collect()
    }

    /// Runs every call in order, one at a time. Failures are reported per call
    /// and never abort the remaining calls.
    pub async fn execute(&self, calls: &[ToolCall], backend: &dyn Backend) -> Vec<ToolOutput> {
        let mut outputs = Vec::with_capacity(calls.len());
        for call in calls {
            let output = match self.execute_one(call, backend).await {
                Ok(value) => ToolOutput {
                    id: call.id.clone(),
                    name: call.name().to_string(),
                    output: Some(value),
                    error: None,
                },
                Err(err) => {
                    log::warn!("tool call {} ({}) failed: {err}", call.id, call.name());
                    ToolOutput::failed(call, &err)
                }
            };
            outputs.push(output);
        }
        outputs
    }

    async fn execute_one(&self, call: &ToolCall, backend: &dyn Backend) -> Result<Value, ToolError> {
        let tool = self
            .tools
            .get(call.name())
            .ok_or_else(|| ToolError::UnknownTool(call.name().to_string()))?;
        let args = call.parse_arguments()?;
        log::debug!("executing tool {} with {args}", call.name());
        tool.handler.call(args, backend).await
    }
}

/// Reads a required string argument.
pub fn required_str<'a>(args: &'a Value, name: &'static str) -> Result<&'a str, ToolError> {
    args.get(name)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or(ToolError::MissingArgument(name))
}

/// Reads an optional argument, accepting strings and numbers.
pub fn optional_str(args: &Value, name: &str) -> Option<String> {
    match args.get(name)? {
        Value::String(value) if !value.trim().is_empty() => Some(value.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}
