//! Resource type dependency graph
//!
//! Built once when the query context is constructed. A cycle is a
//! configuration error, detected by tracking which types are in progress
//! during a depth-first walk.

use crate::error::ConfigError;
use crate::record::ResourceType;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    edges: BTreeMap<ResourceType, Vec<ResourceType>>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, resource_type: ResourceType, dependencies: Vec<ResourceType>) {
        self.edges.insert(resource_type, dependencies);
    }

    /// Direct prerequisites of a type
    pub fn dependencies_of(&self, resource_type: ResourceType) -> &[ResourceType] {
        self.edges
            .get(&resource_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Whether `from` needs `to`, directly or transitively
    pub fn depends_on(&self, from: ResourceType, to: ResourceType) -> bool {
        let mut stack = self.dependencies_of(from).to_vec();
        let mut seen = Vec::new();
        while let Some(next) = stack.pop() {
            if next == to {
                return true;
            }
            if !seen.contains(&next) {
                seen.push(next);
                stack.extend_from_slice(self.dependencies_of(next));
            }
        }
        false
    }

    /// Fail if any type depends on itself, directly or transitively
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut marks = HashMap::new();
        for &node in self.edges.keys() {
            let mut path = Vec::new();
            self.visit(node, &mut marks, &mut path)?;
        }
        Ok(())
    }

    fn visit(
        &self,
        node: ResourceType,
        marks: &mut HashMap<ResourceType, Mark>,
        path: &mut Vec<ResourceType>,
    ) -> Result<(), ConfigError> {
        match marks.get(&node) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::InProgress) => {
                let start = path.iter().position(|t| *t == node).unwrap_or(0);
                let cycle = path[start..]
                    .iter()
                    .chain(std::iter::once(&node))
                    .map(|t| t.name())
                    .collect::<Vec<_>>()
                    .join(" -> ");
                return Err(ConfigError::DependencyCycle(cycle));
            }
            None => {}
        }

        marks.insert(node, Mark::InProgress);
        path.push(node);
        for &dep in self.dependencies_of(node) {
            self.visit(dep, marks, path)?;
        }
        path.pop();
        marks.insert(node, Mark::Done);
        Ok(())
    }
}
