use std::collections::BTreeMap;
use std::sync::Arc;

use scholar_model::ModelTool;
use schemars::schema_for;
use serde_json::Value;
use tracing::Instrument;

use super::{AnyTool, Tool, ToolInput, ToolKind, ToolObject, truncate_chars};

/// What a lookup handed back to the model.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Observation {
    /// The lookup succeeded. Carries the documents, or a note that nothing
    /// was found.
    Found(String),
    /// The lookup failed. Carries a short diagnostic for the model.
    Failed(String),
}

impl Observation {
    /// Returns the text handed to the model.
    #[inline]
    pub fn text(&self) -> &str {
        match self {
            Observation::Found(text) | Observation::Failed(text) => text,
        }
    }

    /// Returns `true` if the lookup failed.
    #[inline]
    pub fn is_failure(&self) -> bool {
        matches!(self, Observation::Failed(_))
    }
}

/// The tools of one agent, keyed by kind.
#[derive(Clone, Default)]
pub struct Toolbox {
    tools: BTreeMap<ToolKind, Arc<dyn ToolObject>>,
}

impl Toolbox {
    /// Registers a tool, replacing any tool of the same kind.
    pub fn register<T: Tool>(&mut self, tool: T) {
        let kind = tool.kind();
        if self.tools.insert(kind, Arc::new(AnyTool(tool))).is_some() {
            debug!("replaced tool: {}", kind.name());
        }
    }

    /// Returns the kind of the registered tool called `name`.
    #[inline]
    pub fn resolve(&self, name: &str) -> Option<ToolKind> {
        ToolKind::from_name(name).filter(|kind| self.tools.contains_key(kind))
    }

    /// Returns the registered kinds, in the order they are offered.
    #[inline]
    pub fn kinds(&self) -> impl Iterator<Item = ToolKind> + '_ {
        self.tools.keys().copied()
    }

    /// Returns `true` if no tool is registered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Returns the function definitions advertised to the model.
    pub fn definitions(&self) -> Vec<ModelTool> {
        if self.tools.is_empty() {
            return vec![];
        }
        let parameters = input_schema();
        self.kinds()
            .map(|kind| ModelTool {
                name: kind.name().to_owned(),
                description: kind.description().to_owned(),
                parameters: parameters.clone(),
            })
            .collect()
    }

    /// Returns the observation for a call to a tool that does not exist.
    pub fn invalid_tool_message(&self, name: &str) -> String {
        let names: Vec<_> = self.kinds().map(ToolKind::name).collect();
        format!(
            "{name} is not a valid tool, try one of [{}].",
            names.join(", ")
        )
    }

    /// Runs one lookup and turns its outcome into an observation.
    ///
    /// Failures never propagate. They become [`Observation::Failed`], so the
    /// agent can keep reasoning.
    pub async fn invoke(&self, kind: ToolKind, query: &str) -> Observation {
        let Some(tool) = self.tools.get(&kind) else {
            return Observation::Failed(self.invalid_tool_message(kind.name()));
        };
        let limits = tool.limits();
        let lookup = tool
            .lookup(query.to_owned(), limits.max_results)
            .instrument(debug_span!("lookup", tool = kind.name()));
        let docs = match lookup.await {
            Ok(docs) => docs,
            Err(err) => {
                warn!("{} lookup failed: {err}", kind.name());
                return Observation::Failed(format!(
                    "{} lookup failed: {}",
                    kind.name(),
                    err.reason()
                ));
            }
        };

        let docs: Vec<_> = docs
            .iter()
            .map(|doc| doc.trim())
            .filter(|doc| !doc.is_empty())
            .take(limits.max_results)
            .collect();
        trace!("{} returned {} documents", kind.name(), docs.len());
        if docs.is_empty() {
            return Observation::Found(format!(
                "No good {} result was found",
                kind.title()
            ));
        }
        let joined = docs.join("\n\n");
        Observation::Found(truncate_chars(&joined, limits.max_chars).to_owned())
    }
}

fn input_schema() -> Value {
    schema_for!(ToolInput).to_value()
}
