//! Per-classification remediation chains

use crate::error::PipelineError;
use repairnet_db::{LinkClass, Stage};
use std::collections::HashMap;

/// Stages every standard chain walks after classification.
pub const STANDARD_STAGES: [Stage; 4] = [
    Stage::ExistenceCheck,
    Stage::BandwidthCheck,
    Stage::PortShutdown,
    Stage::JiraCreate,
];

/// An ordered stage sequence owned by one classification label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chain {
    label: LinkClass,
    stages: Vec<Stage>,
}

impl Chain {
    pub fn new(label: LinkClass, stages: Vec<Stage>) -> Self {
        Self { label, stages }
    }

    pub fn standard(label: LinkClass) -> Self {
        Self::new(label, STANDARD_STAGES.to_vec())
    }

    pub fn label(&self) -> LinkClass {
        self.label
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Transition table lookup: the stage to run after `current`.
    ///
    /// `None` means the chain is finished. A `current` stage the chain does
    /// not own (other than `classification`, the entry point) is an error.
    pub fn next_stage(&self, current: Stage) -> Result<Option<Stage>, PipelineError> {
        if current == Stage::Classification {
            return Ok(self.stages.first().copied());
        }
        match self.stages.iter().position(|s| *s == current) {
            Some(pos) => Ok(self.stages.get(pos + 1).copied()),
            None => Err(PipelineError::UnknownStage {
                stage: current.to_string(),
                chain: self.label.to_string(),
            }),
        }
    }
}

/// Mapping from classification label to an independently owned chain.
#[derive(Debug, Clone, Default)]
pub struct PipelineRegistry {
    chains: HashMap<LinkClass, Chain>,
}

impl PipelineRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// One standard chain per remediable label.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        for label in LinkClass::REMEDIABLE {
            registry.register(Chain::standard(label));
        }
        registry
    }

    /// Install a chain, replacing any chain registered for the same label.
    pub fn register(&mut self, chain: Chain) -> Option<Chain> {
        self.chains.insert(chain.label(), chain)
    }

    pub fn chain(&self, label: LinkClass) -> Option<&Chain> {
        self.chains.get(&label)
    }

    pub fn labels(&self) -> Vec<LinkClass> {
        let mut labels: Vec<LinkClass> = self.chains.keys().copied().collect();
        labels.sort();
        labels
    }
}
