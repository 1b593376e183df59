//! Point-in-time listing of a registry's contents.

use serde::Serialize;
use std::fmt;

use crate::intern::StringId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistrySnapshot {
    pub modules: Vec<String>,
    pub components: Vec<String>,
    pub instances: Vec<InstanceSummary>,
    pub strings: Vec<StringSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceSummary {
    pub id: String,
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StringSummary {
    pub id: StringId,
    pub content: String,
}

impl fmt::Display for RegistrySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Modules:")?;
        for module in &self.modules {
            writeln!(f, " > {}", module)?;
        }
        writeln!(f, "Components:")?;
        for component in &self.components {
            writeln!(f, " > {}", component)?;
        }
        writeln!(f, "Objects:")?;
        for instance in &self.instances {
            writeln!(f, " > {} [ {} ]", instance.id, instance.kind)?;
        }
        writeln!(f, "Strings:")?;
        for string in &self.strings {
            writeln!(f, " > {} [ {} ]", string.content, string.id)?;
        }
        Ok(())
    }
}
