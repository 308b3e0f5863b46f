use schemars::{JsonSchema, Schema, schema_for};
use serde::Deserialize;

pub const RUN_TERMINAL_COMMAND: &str = "run_terminal_command";

const TOOL_DESCRIPTION: &str = "Run a shell command on the user's machine and return its combined \
     output. Use this for any request that needs to read from or act on the system. Commands are \
     reviewed automatically before execution: read-only commands run immediately, and commands \
     that modify the system prompt the operator for approval out of band. Do not ask for \
     permission yourself, just issue the command.";

/// Parameters of the `run_terminal_command` tool, parsed from the raw
/// argument payload of a tool-call request.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CommandParams {
    /// The shell command to run.
    pub command: String,
}

impl CommandParams {
    /// # Errors
    ///
    /// Returns the underlying `serde_json` error when the payload is not a
    /// JSON object with a string `command` field.
    pub fn from_raw(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// A tool signature as declared to the model.
#[derive(Debug, Clone)]
pub struct ToolDef {
    pub id: &'static str,
    pub description: &'static str,
    pub schema: Schema,
}

impl ToolDef {
    /// JSON-schema parameter object for the wire declaration, with the
    /// schema envelope keys stripped.
    #[must_use]
    pub fn parameters(&self) -> serde_json::Value {
        let mut params = serde_json::to_value(&self.schema).unwrap_or_default();
        if let serde_json::Value::Object(ref mut map) = params {
            map.remove("$schema");
            map.remove("title");
        }
        params
    }
}

#[must_use]
pub fn terminal_command_tool() -> ToolDef {
    ToolDef {
        id: RUN_TERMINAL_COMMAND,
        description: TOOL_DESCRIPTION,
        schema: schema_for!(CommandParams),
    }
}
