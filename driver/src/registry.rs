//! Name-indexed table of workflow functions.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use anyhow::{Context as _, Result, bail};

use crate::core::codec::Codec;
use crate::core::signature::{IntoWorkflow, WorkflowFn};
use crate::instance::WorkflowInstance;
use crate::io::config::DriverConfig;

/// Workflow functions a host can start by name.
#[derive(Default, Clone)]
pub struct Registry {
    workflows: BTreeMap<String, Rc<dyn WorkflowFn>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `workflow` under `name`. Names are unique.
    pub fn register(&mut self, name: impl Into<String>, workflow: Rc<dyn WorkflowFn>) -> Result<()> {
        let name = name.into();
        if self.workflows.contains_key(&name) {
            bail!("workflow {name} is already registered");
        }
        self.workflows.insert(name, workflow);
        Ok(())
    }

    /// Register a typed async function under `name`.
    pub fn register_fn<Args>(
        &mut self,
        name: impl Into<String>,
        func: impl IntoWorkflow<Args>,
    ) -> Result<()> {
        self.register(name, func.into_workflow())
    }

    pub fn get(&self, name: &str) -> Option<Rc<dyn WorkflowFn>> {
        self.workflows.get(name).cloned()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.workflows.keys().map(String::as_str).collect()
    }

    /// Build a fresh instance of the workflow registered under `name`.
    pub fn instantiate(
        &self,
        name: &str,
        codec: Rc<dyn Codec>,
        config: &DriverConfig,
    ) -> Result<WorkflowInstance> {
        let target = self
            .get(name)
            .with_context(|| format!("unknown workflow {name}"))?;
        Ok(WorkflowInstance::new(target, codec, config))
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("workflows", &self.names())
            .finish()
    }
}
