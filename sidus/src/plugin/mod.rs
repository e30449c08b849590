//! Load-time registration of task factories and output columns.
//!
//! Plugins are registered with a [`PluginManager`] at startup. `load` runs
//! every plugin's registration once, in insertion order, and freezes the
//! result into [`Registries`]. Nothing is registered after that.

mod output;


use std::sync::Arc;

use thiserror::Error;

pub use output::{ColumnValue, OutputRegistry, Row};

use crate::property::{Property, PropertyId};
use crate::task::{TaskFactory, TaskRegistry};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RegistryError {
    #[error("property {0} already has a producer")]
    DuplicateProducer(PropertyId),
    #[error("output column '{0}' is registered twice")]
    DuplicateColumn(String),
    #[error("unknown output column '{0}'")]
    UnknownColumn(String),
    #[error("plugin '{plugin}' failed to register: {message}")]
    PluginFailed { plugin: String, message: String },
}

/// A named unit of task factories and output columns.
pub trait Plugin: Send + Sync {
    fn id(&self) -> &str;
    fn register(&self, registrar: &mut PluginRegistrar) -> anyhow::Result<()>;
}

/// Registration surface handed to [`Plugin::register`].
#[derive(Debug, Default)]
pub struct PluginRegistrar {
    tasks: TaskRegistry,
    outputs: OutputRegistry,
}

impl PluginRegistrar {
    pub fn register_task_factory<I, T>(&mut self, ids: I, factory: T) -> anyhow::Result<()>
    where
        I: IntoIterator<Item = PropertyId>,
        T: TaskFactory + 'static,
    {
        self.tasks.register_task_factory(ids, factory)?;
        Ok(())
    }

    pub fn register_column_converter<P, F>(&mut self, name: &str, extract: F) -> anyhow::Result<()>
    where
        P: Property,
        F: Fn(&P) -> ColumnValue + Send + Sync + 'static,
    {
        self.outputs.register_column_converter::<P, F>(name, extract)?;
        Ok(())
    }

    pub fn register_property_instances<P: Property>(
        &mut self,
        instances: &[(&str, u32)],
    ) -> anyhow::Result<()> {
        self.outputs.register_property_instances::<P>(instances)?;
        Ok(())
    }

    pub fn task_registry(&self) -> &TaskRegistry {
        &self.tasks
    }

    pub fn output_registry(&self) -> &OutputRegistry {
        &self.outputs
    }
}

/// The frozen result of plugin loading.
#[derive(Debug, Clone)]
pub struct Registries {
    pub tasks: Arc<TaskRegistry>,
    pub outputs: Arc<OutputRegistry>,
}

#[derive(Default)]
pub struct PluginManager {
    plugins: Vec<Box<dyn Plugin>>,
    output_columns: Vec<String>,
}

impl PluginManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_plugin<P: Plugin + 'static>(&mut self, plugin: P) -> &mut Self {
        self.plugins.push(Box::new(plugin));
        self
    }

    /// Columns to emit once loading is done; all of them when never called.
    pub fn enable_output<S: AsRef<str>>(&mut self, names: &[S]) -> &mut Self {
        self.output_columns = names.iter().map(|name| name.as_ref().to_string()).collect();
        self
    }

    pub fn plugin_ids(&self) -> Vec<&str> {
        self.plugins.iter().map(|plugin| plugin.id()).collect()
    }

    /// Run every plugin's registration. Any duplicate producer, duplicate
    /// column, unknown enabled column or failing plugin aborts loading.
    pub fn load(self) -> Result<Registries, RegistryError> {
        let mut registrar = PluginRegistrar::default();
        let mut seen: Vec<&str> = Vec::with_capacity(self.plugins.len());

        for plugin in &self.plugins {
            let id = plugin.id();
            if seen.contains(&id) {
                return Err(RegistryError::PluginFailed {
                    plugin: id.to_string(),
                    message: "plugin id is registered twice".to_string(),
                });
            }
            seen.push(id);

            plugin
                .register(&mut registrar)
                .map_err(|err| match err.downcast::<RegistryError>() {
                    Ok(registry_err) => registry_err,
                    Err(err) => RegistryError::PluginFailed {
                        plugin: id.to_string(),
                        message: format!("{err:#}"),
                    },
                })?;
            tracing::info!("Loaded plugin '{id}'");
        }
        registrar.outputs.enable_output(&self.output_columns)?;

        tracing::debug!(
            "Plugin loading done: {} properties, {} output columns",
            registrar.tasks.len(),
            registrar.outputs.column_names().len()
        );

        Ok(Registries {
            tasks: Arc::new(registrar.tasks),
            outputs: Arc::new(registrar.outputs),
        })
    }
}

impl std::fmt::Debug for PluginManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginManager")
            .field("plugins", &self.plugin_ids())
            .field("output_columns", &self.output_columns)
            .finish()
    }
}
