//! Tool catalog — one flat namespace over every provider's tools.
//!
//! Provides:
//! - Qualified names (`provider` + separator + `tool`) and their resolution
//! - Best-effort catalog building from the ready sessions in a registry
//! - Structural argument validation against a tool's input schema
//! - Serialization into OpenAI function-calling format
//! - "Did you mean" suggestions for unknown names

use std::collections::HashMap;

use futures::future::join_all;

use super::errors::McpError;
use super::registry::SessionRegistry;
use super::types::McpToolDefinition;

/// Similarity floor for suggestions; anything lower is noise.
const SUGGESTION_FLOOR: f64 = 0.3;

/// Suggestions attached to an `UnknownTool` error.
const MAX_SUGGESTIONS: usize = 3;

// ─── ToolDescriptor ──────────────────────────────────────────────────────────

/// One tool, addressable by its qualified name.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDescriptor {
    pub qualified_name: String,
    pub provider_id: String,
    pub original_name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

impl ToolDescriptor {
    /// Names of the properties the schema marks as required.
    pub fn required_properties(&self) -> Vec<&str> {
        self.input_schema
            .get("required")
            .and_then(|r| r.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_str()).collect())
            .unwrap_or_default()
    }

    /// Declared primitive type of a top-level property, if any.
    pub fn property_type(&self, property: &str) -> Option<&str> {
        self.input_schema
            .get("properties")
            .and_then(|p| p.get(property))
            .and_then(|p| p.get("type"))
            .and_then(|t| t.as_str())
    }

    /// Structural check of call arguments.
    ///
    /// Arguments must be an object (`null` counts as `{}`), every required
    /// property must be present and top-level values must match their
    /// declared primitive type. Nested schemas are left to the provider.
    /// Returns the arguments to forward.
    pub fn validate_arguments(&self, arguments: serde_json::Value) -> Result<serde_json::Value, McpError> {
        let arguments = match arguments {
            serde_json::Value::Null => serde_json::json!({}),
            other => other,
        };
        let Some(obj) = arguments.as_object() else {
            return Err(self.invalid("arguments must be a JSON object".into()));
        };

        for field in self.required_properties() {
            if !obj.contains_key(field) {
                return Err(self.invalid(format!("missing required field: '{field}'")));
            }
        }

        for (key, value) in obj {
            if let Some(expected) = self.property_type(key) {
                if !type_matches(expected, value) {
                    return Err(self.invalid(format!("field '{key}' must be of type {expected}")));
                }
            }
        }

        Ok(arguments)
    }

    fn invalid(&self, reason: String) -> McpError {
        McpError::InvalidArguments {
            tool: self.qualified_name.clone(),
            reason,
        }
    }
}

fn type_matches(expected: &str, value: &serde_json::Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}

// ─── ToolCatalog ─────────────────────────────────────────────────────────────

/// Aggregated tools of every ready provider.
///
/// Built wholesale and never patched; refreshing means building a new one.
/// Qualified names are unique because provider ids are unique and never
/// contain the separator.
#[derive(Debug, Clone, Default)]
pub struct ToolCatalog {
    separator: String,
    tools: Vec<ToolDescriptor>,
    index: HashMap<String, usize>,
}

impl ToolCatalog {
    /// Join a provider id and a provider-local tool name.
    pub fn qualify(provider_id: &str, original_name: &str, separator: &str) -> String {
        format!("{provider_id}{separator}{original_name}")
    }

    /// Build a catalog from already-fetched tool lists, in the given order.
    ///
    /// A provider listing the same tool name twice keeps the first.
    pub fn from_provider_tools(
        separator: &str,
        providers: impl IntoIterator<Item = (String, Vec<McpToolDefinition>)>,
    ) -> Self {
        let mut catalog = Self {
            separator: separator.to_string(),
            tools: Vec::new(),
            index: HashMap::new(),
        };

        for (provider_id, tools) in providers {
            for tool in tools {
                let qualified_name = Self::qualify(&provider_id, &tool.name, separator);
                if catalog.index.contains_key(&qualified_name) {
                    tracing::warn!(server = %provider_id, tool = %tool.name, "duplicate tool name, skipping");
                    continue;
                }
                catalog.index.insert(qualified_name.clone(), catalog.tools.len());
                catalog.tools.push(ToolDescriptor {
                    qualified_name,
                    provider_id: provider_id.clone(),
                    original_name: tool.name,
                    description: tool.description,
                    input_schema: tool.input_schema,
                });
            }
        }

        catalog
    }

    /// List tools from every ready session and aggregate them.
    ///
    /// A provider whose listing fails is logged and left out.
    pub async fn build(registry: &SessionRegistry, separator: &str) -> Self {
        let sessions: Vec<_> = registry.ready_sessions().collect();
        let listings = join_all(sessions.iter().map(|s| s.list_tools())).await;

        let mut providers = Vec::new();
        for (session, listing) in sessions.iter().zip(listings) {
            match listing {
                Ok(tools) => {
                    tracing::info!(server = %session.provider_id(), tools = tools.len(), "tools discovered");
                    providers.push((session.provider_id().to_string(), tools));
                }
                Err(e) => {
                    tracing::warn!(server = %session.provider_id(), error = %e, "tool listing failed, skipping provider");
                }
            }
        }

        let catalog = Self::from_provider_tools(separator, providers);
        tracing::info!(tools = catalog.len(), "tool catalog built");
        catalog
    }

    /// Separator used to build qualified names.
    pub fn separator(&self) -> &str {
        &self.separator
    }

    /// All descriptors in catalog order.
    pub fn tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Look up a descriptor by qualified name.
    pub fn get(&self, qualified_name: &str) -> Option<&ToolDescriptor> {
        self.index.get(qualified_name).map(|&i| &self.tools[i])
    }

    /// Look up a descriptor, failing with `UnknownTool` plus suggestions.
    pub fn resolve(&self, qualified_name: &str) -> Result<&ToolDescriptor, McpError> {
        self.get(qualified_name).ok_or_else(|| McpError::UnknownTool {
            name: qualified_name.to_string(),
            suggestions: self.find_similar(qualified_name, MAX_SUGGESTIONS),
        })
    }

    /// Split a qualified name into `(provider_id, original_name)`.
    ///
    /// Provider ids never contain the separator, so the first occurrence is
    /// the boundary.
    pub fn split_qualified<'a>(&self, qualified_name: &'a str) -> Option<(&'a str, &'a str)> {
        qualified_name
            .split_once(self.separator.as_str())
            .filter(|(provider, name)| !provider.is_empty() && !name.is_empty())
    }

    /// Up to `max_results` qualified names most similar to `name`.
    ///
    /// Compares provider-local names when `name` carries a provider prefix.
    pub fn find_similar(&self, name: &str, max_results: usize) -> Vec<String> {
        let query = self.split_qualified(name).map(|(_, n)| n).unwrap_or(name);

        let mut scored: Vec<(&str, f64)> = self
            .tools
            .iter()
            .map(|t| (t.qualified_name.as_str(), similarity(query, &t.original_name)))
            .filter(|(_, score)| *score > SUGGESTION_FLOOR)
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(max_results);
        scored.into_iter().map(|(n, _)| n.to_string()).collect()
    }
}

impl ToolDescriptor {
    /// This tool in OpenAI function-calling format.
    pub fn to_tool_definition(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.qualified_name,
                "description": self.description,
                "parameters": parameters_schema(&self.input_schema),
            }
        })
    }
}

/// The input schema as a function `parameters` object.
///
/// Strict backends require `"type": "object"` at the top; providers often
/// send `{}` for argument-less tools. A schema that is not an object at all
/// is replaced.
fn parameters_schema(schema: &serde_json::Value) -> serde_json::Value {
    let serde_json::Value::Object(map) = schema else {
        return serde_json::json!({"type": "object", "properties": {}});
    };
    let mut map = map.clone();
    map.entry("type").or_insert_with(|| serde_json::json!("object"));
    if map.get("type").and_then(|t| t.as_str()) == Some("object") {
        map.entry("properties").or_insert_with(|| serde_json::json!({}));
    }
    serde_json::Value::Object(map)
}

// ─── Edit Distance ──────────────────────────────────────────────────────────

/// Levenshtein distance over chars.
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for i in 1..=a.len() {
        curr[0] = i;
        for j in 1..=b.len() {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Normalized similarity, 1.0 for identical strings.
fn similarity(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - (levenshtein(a, b) as f64 / max_len as f64)
}

// ─── Tests ───────────────────────────────────────────────────────────────────
