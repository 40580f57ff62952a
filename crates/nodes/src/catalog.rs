//! Node type catalog.
//!
//! Maps the `node_type` string of a graph definition to a factory that builds
//! the action from the node's JSON config.

use std::collections::HashMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Number, Value};

use crate::builtin::{Arithmetic, ArithmeticOp, Constant, Output, Passthrough};
use crate::{ExecutableNode, NodeError};

type Factory = Box<dyn Fn(&Value) -> Result<Arc<dyn ExecutableNode>, NodeError> + Send + Sync>;

/// Registry of node types that can be instantiated by name.
#[derive(Default)]
pub struct NodeCatalog {
    factories: HashMap<String, Factory>,
}

#[derive(Deserialize)]
struct OperandConfig {
    operand: Number,
}

#[derive(Deserialize)]
struct ConstantConfig {
    value: Value,
}

#[derive(Deserialize, Default)]
struct OutputConfig {
    #[serde(default)]
    label: Option<String>,
}

/// Deserialize a node config, treating a missing config as an empty object.
fn parse_config<T: DeserializeOwned>(config: &Value) -> Result<T, NodeError> {
    let config = match config {
        Value::Null => Value::Object(Default::default()),
        other => other.clone(),
    };
    serde_json::from_value(config).map_err(|e| NodeError::InvalidConfig(e.to_string()))
}

fn arithmetic(op: ArithmeticOp) -> impl Fn(&Value) -> Result<Arc<dyn ExecutableNode>, NodeError> {
    move |config| {
        let OperandConfig { operand } = parse_config(config)?;
        Ok(Arc::new(Arithmetic::new(op, operand)) as Arc<dyn ExecutableNode>)
    }
}

impl NodeCatalog {
    /// An empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog pre-populated with the built-in node types:
    /// `passthrough`, `add`, `subtract`, `multiply`, `constant`, `output`.
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        catalog.register("passthrough", |_| Ok(Arc::new(Passthrough)));
        catalog.register("add", arithmetic(ArithmeticOp::Add));
        catalog.register("subtract", arithmetic(ArithmeticOp::Subtract));
        catalog.register("multiply", arithmetic(ArithmeticOp::Multiply));
        catalog.register("constant", |config| {
            let ConstantConfig { value } = parse_config(config)?;
            Ok(Arc::new(Constant { value }))
        });
        catalog.register("output", |config| {
            let OutputConfig { label } = parse_config(config)?;
            Ok(Arc::new(Output { label }))
        });
        catalog
    }

    /// Add (or replace) a node type.
    pub fn register<F>(&mut self, node_type: impl Into<String>, factory: F)
    where
        F: Fn(&Value) -> Result<Arc<dyn ExecutableNode>, NodeError> + Send + Sync + 'static,
    {
        self.factories.insert(node_type.into(), Box::new(factory));
    }

    /// Build an action of `node_type` from `config`.
    ///
    /// Returns `None` when the type is not registered.
    pub fn build(
        &self,
        node_type: &str,
        config: &Value,
    ) -> Option<Result<Arc<dyn ExecutableNode>, NodeError>> {
        self.factories.get(node_type).map(|factory| factory(config))
    }

    /// Registered type names, sorted.
    pub fn node_types(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
