use std::collections::HashMap;
use std::sync::Arc;

use jsonschema::JSONSchema;
use serde_json::Value;
use tracing::debug;

use scout_core::{Result, ScoutError, ToolHandler, ToolSpec};

/// Schema violations reported back to the model per call.
const MAX_REPORTED_VIOLATIONS: usize = 3;

/// A registered tool: its declaration plus the handler that runs it.
#[derive(Clone)]
pub struct RegisteredTool {
    pub spec: ToolSpec,
    pub handler: Arc<dyn ToolHandler>,
}

/// Collects tools before the registry is frozen.
#[derive(Default)]
pub struct ToolRegistryBuilder {
    tools: Vec<RegisteredTool>,
    validators: Vec<JSONSchema>,
    index: HashMap<String, usize>,
}

impl ToolRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool. Names are unique; a second registration fails with
    /// `DuplicateTool` and leaves the builder unchanged. The parameter
    /// schema is compiled here, once.
    pub fn register(&mut self, spec: ToolSpec, handler: Arc<dyn ToolHandler>) -> Result<()> {
        if self.index.contains_key(&spec.name) {
            return Err(ScoutError::DuplicateTool(spec.name));
        }
        let validator = JSONSchema::compile(&spec.parameters).map_err(|e| ScoutError::ArgumentValidation {
            tool: spec.name.clone(),
            reason: format!("parameter schema does not compile: {e}"),
        })?;
        debug!(tool = %spec.name, "registering tool");
        self.index.insert(spec.name.clone(), self.tools.len());
        self.tools.push(RegisteredTool { spec, handler });
        self.validators.push(validator);
        Ok(())
    }

    /// Chaining form of [`register`](Self::register).
    pub fn with(mut self, spec: ToolSpec, handler: Arc<dyn ToolHandler>) -> Result<Self> {
        self.register(spec, handler)?;
        Ok(self)
    }

    pub fn build(self) -> ToolRegistry {
        ToolRegistry {
            tools: self.tools,
            validators: self.validators,
            index: self.index,
        }
    }
}

/// Immutable name → tool map. Specs are listed in registration order.
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
    validators: Vec<JSONSchema>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn builder() -> ToolRegistryBuilder {
        ToolRegistryBuilder::new()
    }

    pub fn lookup(&self, name: &str) -> Result<&RegisteredTool> {
        self.index
            .get(name)
            .map(|&i| &self.tools[i])
            .ok_or_else(|| ScoutError::UnknownTool(name.to_string()))
    }

    pub fn list_specs(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|t| t.spec.clone()).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.spec.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Check arguments against the named tool's parameter schema.
    ///
    /// Top-level `null` values count as omitted; local models often send
    /// them for optional parameters.
    pub fn validate(&self, name: &str, args: &Value) -> Result<()> {
        let i = *self
            .index
            .get(name)
            .ok_or_else(|| ScoutError::UnknownTool(name.to_string()))?;
        let args = without_nulls(args);

        let reason = match self.validators[i].validate(&args) {
            Ok(()) => return Ok(()),
            Err(errors) => errors
                .take(MAX_REPORTED_VIOLATIONS)
                .map(|e| {
                    let path = e.instance_path.to_string();
                    if path.is_empty() { e.to_string() } else { format!("{path}: {e}") }
                })
                .collect::<Vec<_>>()
                .join("; "),
        };
        Err(ScoutError::ArgumentValidation {
            tool: name.to_string(),
            reason,
        })
    }
}

fn without_nulls(args: &Value) -> Value {
    match args {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        ),
        other => other.clone(),
    }
}
