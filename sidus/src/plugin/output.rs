use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::RegistryError;
use crate::property::{Property, PropertyId, PropertyResult};
use crate::source::Source;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<bool> for ColumnValue {
    fn from(value: bool) -> Self {
        ColumnValue::Bool(value)
    }
}

impl From<i64> for ColumnValue {
    fn from(value: i64) -> Self {
        ColumnValue::Int(value)
    }
}

impl From<usize> for ColumnValue {
    fn from(value: usize) -> Self {
        ColumnValue::Int(value as i64)
    }
}

impl From<u64> for ColumnValue {
    fn from(value: u64) -> Self {
        ColumnValue::Int(value as i64)
    }
}

impl From<f64> for ColumnValue {
    fn from(value: f64) -> Self {
        ColumnValue::Float(value)
    }
}

impl From<f32> for ColumnValue {
    fn from(value: f32) -> Self {
        ColumnValue::Float(value as f64)
    }
}

impl From<String> for ColumnValue {
    fn from(value: String) -> Self {
        ColumnValue::Text(value)
    }
}

/// One output record: column name and value, in column registration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub columns: Vec<(String, ColumnValue)>,
}

impl Row {
    pub fn get(&self, name: &str) -> Option<&ColumnValue> {
        self.columns
            .iter()
            .find(|(column, _)| column == name)
            .map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

type Converter = Arc<dyn Fn(&mut Source, u32) -> PropertyResult<ColumnValue> + Send + Sync>;

#[derive(Clone)]
struct Column {
    name: String,
    id: PropertyId,
    convert: Converter,
}

/// Named output columns, each bound to one property instance.
#[derive(Default)]
pub struct OutputRegistry {
    columns: Vec<Column>,
    /// Indices into `columns`; empty means every column.
    enabled: Vec<usize>,
}

impl OutputRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind column `name` to instance 0 of `P`.
    pub fn register_column_converter<P, F>(
        &mut self,
        name: &str,
        extract: F,
    ) -> Result<(), RegistryError>
    where
        P: Property,
        F: Fn(&P) -> ColumnValue + Send + Sync + 'static,
    {
        if self.column_index(name).is_some() {
            return Err(RegistryError::DuplicateColumn(name.to_string()));
        }
        let convert: Converter = Arc::new(move |source: &mut Source, index: u32| {
            source.property_instance::<P>(index).map(&extract)
        });
        self.columns.push(Column {
            name: name.to_string(),
            id: PropertyId::of::<P>(),
            convert,
        });
        Ok(())
    }

    /// Replace every column of kind `P` by one column per instance, named
    /// `<column>_<postfix>` and bound to that instance's index.
    pub fn register_property_instances<P: Property>(
        &mut self,
        instances: &[(&str, u32)],
    ) -> Result<(), RegistryError> {
        let mut columns = Vec::with_capacity(self.columns.len() + instances.len());
        for column in self.columns.drain(..) {
            if !column.id.is_kind_of::<P>() {
                columns.push(column);
                continue;
            }
            for &(postfix, index) in instances {
                columns.push(Column {
                    name: format!("{}_{postfix}", column.name),
                    id: column.id.instance(index),
                    convert: Arc::clone(&column.convert),
                });
            }
        }

        for (i, column) in columns.iter().enumerate() {
            if columns[..i].iter().any(|other| other.name == column.name) {
                return Err(RegistryError::DuplicateColumn(column.name.clone()));
            }
        }
        self.columns = columns;
        self.enabled.clear();
        Ok(())
    }

    /// Restrict output to `names`, in the given order. An empty list enables
    /// every registered column.
    pub fn enable_output<S: AsRef<str>>(&mut self, names: &[S]) -> Result<(), RegistryError> {
        let enabled = names
            .iter()
            .map(|name| {
                let name = name.as_ref();
                self.column_index(name)
                    .ok_or_else(|| RegistryError::UnknownColumn(name.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.enabled = enabled;
        Ok(())
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.active_columns().map(|column| column.name.as_str()).collect()
    }

    /// Property instances the enabled columns read.
    pub fn required_properties(&self) -> Vec<PropertyId> {
        let mut ids: Vec<PropertyId> = self.active_columns().map(|column| column.id).collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// Convert `source` into a row, computing missing properties on demand.
    pub fn source_to_row(&self, source: &mut Source) -> PropertyResult<Row> {
        let columns = self
            .active_columns()
            .map(|column| {
                let value = (column.convert)(source, column.id.index())?;
                Ok((column.name.clone(), value))
            })
            .collect::<PropertyResult<Vec<_>>>()?;
        Ok(Row { columns })
    }

    fn active_columns(&self) -> Box<dyn Iterator<Item = &Column> + '_> {
        if self.enabled.is_empty() {
            Box::new(self.columns.iter())
        } else {
            Box::new(self.enabled.iter().map(|&index| &self.columns[index]))
        }
    }

    fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column.name == name)
    }
}

impl fmt::Debug for OutputRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputRegistry")
            .field("columns", &self.column_names())
            .finish()
    }
}
