use indexmap::IndexMap;

use crate::error::{ConformanceError, Result};
use crate::step::TestStep;

/// Ordered collection of test steps, addressable by step id.
#[derive(Debug, Clone)]
pub struct Sequence {
    id: String,
    title: String,
    steps: IndexMap<String, TestStep>,
}

impl Sequence {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            steps: IndexMap::new(),
        }
    }

    /// Append `step`; ids must be unique within the sequence.
    pub fn register(&mut self, step: TestStep) -> Result<()> {
        if self.steps.contains_key(step.id()) {
            return Err(ConformanceError::duplicate_step(&self.id, step.id()));
        }
        self.steps.insert(step.id().to_string(), step);
        Ok(())
    }

    /// Builder form of [`register`](Self::register).
    pub fn with_step(mut self, step: TestStep) -> Result<Self> {
        self.register(step)?;
        Ok(self)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn get(&self, id: &str) -> Option<&TestStep> {
        self.steps.get(id)
    }

    /// Position of step `id` in declaration order.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.steps.get_index_of(id)
    }

    pub fn steps(&self) -> impl Iterator<Item = &TestStep> {
        self.steps.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.steps.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
