//! Agent definitions and the selection that decides which of them run.
//!
//! The store keeps definitions in a fixed order and that order is the
//! execution order of every pipeline run; the selection is only a filter.
//! Definitions are edited field by field and can be reset wholesale to the
//! built-in set, but never inserted or removed one at a time.

use crate::config::{DEFAULT_MODEL, MAX_OUTPUT_TOKENS_RANGE};
use crate::error::ReviewError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

/// One configurable analysis stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(alias = "system_prompt")]
    pub system_instruction: String,
    #[serde(alias = "user_prompt")]
    pub user_prefix: String,
    #[serde(alias = "model", default = "default_model")]
    pub model_id: String,
    pub temperature: f32,
    #[serde(alias = "top_p")]
    pub top_p: f32,
    #[serde(alias = "max_tokens")]
    pub max_output_tokens: u32,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

impl AgentDefinition {
    /// Whether the generation parameters are inside the bounds the editor enforces.
    pub fn has_valid_bounds(&self) -> bool {
        MAX_OUTPUT_TOKENS_RANGE.contains(&self.max_output_tokens)
            && (0.0..=2.0).contains(&self.temperature)
            && (0.0..=1.0).contains(&self.top_p)
    }
}

/// A single-field edit of a definition.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentField {
    Name(String),
    Description(String),
    SystemInstruction(String),
    UserPrefix(String),
    ModelId(String),
    Temperature(f32),
    TopP(f32),
    MaxOutputTokens(u32),
}

impl AgentField {
    /// Parse a `key=value` style edit, e.g. `("temperature", "0.4")`.
    pub fn parse(key: &str, value: &str) -> Result<Self, ReviewError> {
        let bad = |what: &str| ReviewError::InvalidConfig(format!("{key}: expected {what}, got '{value}'"));
        Ok(match key {
            "name" => AgentField::Name(value.to_string()),
            "description" => AgentField::Description(value.to_string()),
            "system_instruction" | "system_prompt" => AgentField::SystemInstruction(value.to_string()),
            "user_prefix" | "user_prompt" => AgentField::UserPrefix(value.to_string()),
            "model" | "model_id" => AgentField::ModelId(value.to_string()),
            "temperature" => AgentField::Temperature(value.parse().map_err(|_| bad("a number"))?),
            "top_p" => AgentField::TopP(value.parse().map_err(|_| bad("a number"))?),
            "max_tokens" | "max_output_tokens" => {
                AgentField::MaxOutputTokens(value.parse().map_err(|_| bad("an integer"))?)
            }
            other => {
                return Err(ReviewError::InvalidConfig(format!("unknown agent field '{other}'")));
            }
        })
    }

    fn apply(self, agent: &mut AgentDefinition) {
        match self {
            AgentField::Name(v) => agent.name = v,
            AgentField::Description(v) => agent.description = v,
            AgentField::SystemInstruction(v) => agent.system_instruction = v,
            AgentField::UserPrefix(v) => agent.user_prefix = v,
            AgentField::ModelId(v) => agent.model_id = v,
            AgentField::Temperature(v) => agent.temperature = v,
            AgentField::TopP(v) => agent.top_p = v,
            AgentField::MaxOutputTokens(v) => agent.max_output_tokens = v,
        }
    }
}

/// Ordered set of agent definitions.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentStore {
    agents: Vec<AgentDefinition>,
}

impl Default for AgentStore {
    fn default() -> Self {
        Self {
            agents: default_agents(),
        }
    }
}

impl AgentStore {
    /// Replace the built-in set with caller-provided definitions.
    ///
    /// Ids must be non-empty and unique.
    pub fn from_definitions(agents: Vec<AgentDefinition>) -> Result<Self, ReviewError> {
        let mut seen = HashSet::new();
        for a in &agents {
            if a.id.trim().is_empty() {
                return Err(ReviewError::InvalidConfig("agent id must not be empty".into()));
            }
            if !seen.insert(a.id.as_str()) {
                return Err(ReviewError::InvalidConfig(format!("duplicate agent id '{}'", a.id)));
            }
        }
        Ok(Self { agents })
    }

    pub fn list(&self) -> &[AgentDefinition] {
        &self.agents
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&AgentDefinition> {
        self.agents.iter().find(|a| a.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Edit one field of the definition with `id`.
    ///
    /// Field-specific bounds are not checked here.
    pub fn update(&mut self, id: &str, field: AgentField) -> Result<(), ReviewError> {
        let agent = self
            .agents
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| ReviewError::UnknownAgent { id: id.to_string() })?;
        field.apply(agent);
        Ok(())
    }

    /// Edit one field of the definition at `index`.
    pub fn update_at(&mut self, index: usize, field: AgentField) -> Result<(), ReviewError> {
        let agent = self
            .agents
            .get_mut(index)
            .ok_or_else(|| ReviewError::UnknownAgent { id: format!("#{index}") })?;
        field.apply(agent);
        Ok(())
    }

    pub fn reset_to_defaults(&mut self) {
        self.agents = default_agents();
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.agents.iter().map(|a| a.id.as_str())
    }
}

/// Ids of the agents taking part in the next run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentSelection {
    ids: BTreeSet<String>,
}

impl AgentSelection {
    /// Every agent in `store`.
    pub fn all(store: &AgentStore) -> Self {
        Self {
            ids: store.ids().map(str::to_string).collect(),
        }
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }

    /// Flip membership of `id`; returns whether it is now selected.
    pub fn toggle(&mut self, store: &AgentStore, id: &str) -> Result<bool, ReviewError> {
        if !store.contains(id) {
            return Err(ReviewError::UnknownAgent { id: id.to_string() });
        }
        if self.ids.remove(id) {
            Ok(false)
        } else {
            self.ids.insert(id.to_string());
            Ok(true)
        }
    }

    /// Deselect everything when all agents are selected, otherwise select all.
    pub fn toggle_all(&mut self, store: &AgentStore) {
        if self.ids.len() == store.len() {
            self.ids.clear();
        } else {
            *self = Self::all(store);
        }
    }

    /// Drop ids that no longer reference a definition.
    pub fn retain_existing(&mut self, store: &AgentStore) {
        self.ids.retain(|id| store.contains(id));
    }

    /// Selected definitions, copied, in store order.
    pub fn resolve(&self, store: &AgentStore) -> Vec<AgentDefinition> {
        store
            .list()
            .iter()
            .filter(|a| self.ids.contains(&a.id))
            .cloned()
            .collect()
    }
}

/// The built-in five-stage regulatory review set.
pub fn default_agents() -> Vec<AgentDefinition> {
    let agent = |n: u32,
                 name: &str,
                 description: &str,
                 system: &str,
                 user: &str,
                 temperature: f32,
                 max_tokens: u32| AgentDefinition {
        id: format!("agent-{n}"),
        name: name.to_string(),
        description: description.to_string(),
        system_instruction: system.to_string(),
        user_prefix: user.to_string(),
        model_id: DEFAULT_MODEL.to_string(),
        temperature,
        top_p: 0.95,
        max_output_tokens: max_tokens,
    };

    vec![
        agent(
            1,
            "申請資料提取器 (Data Extractor)",
            "Summarize document and extract key 20 items",
            "You are an expert in medical device regulations (TFDA). Analyze the provided document.\n- Summarize the content in Traditional Chinese.\n- Create a markdown table with 20 key items identified (e.g., Manufacturer Name, Address, Device Name, Category, License No).\n- Flag uncertain items.",
            "Please analyze the following document content:",
            0.1,
            4000,
        ),
        agent(
            2,
            "禁忌症與警語提取器 (Safety Analyst)",
            "Extract contraindications, warnings, and precautions",
            "You are a drug safety management expert.\n- Extract: Absolute contraindications, relative contraindications, special warnings.\n- Categorize by severity.\n- Highlight precautions for special populations (pregnant, lactating, children, elderly).",
            "Extract contraindications and warnings from the following:",
            0.2,
            2000,
        ),
        agent(
            3,
            "臨床試驗資料分析器 (Clinical Analyst)",
            "Analyze clinical trial design, results, and statistics",
            "You are a clinical trial expert.\n- Extract: Trial design (Phase I/II/III/IV), sample size, primary endpoints.\n- Analyze: Efficacy indicators, safety data, statistical significance.\n- Mark study limitations and bias risks.",
            "Analyze the clinical trial data in the following:",
            0.3,
            3000,
        ),
        agent(
            4,
            "法規符合性檢查器 (Compliance Auditor)",
            "Check document against FDA regulatory requirements",
            "You are a regulatory affairs auditor.\n- Check for completeness of necessary items based on standard submission requirements.\n- Identify missing or non-compliant sections.\n- Provide improvement suggestions.",
            "Check the regulatory compliance of the following:",
            0.2,
            2000,
        ),
        agent(
            5,
            "綜合報告生成器 (Report Generator)",
            "Integrate findings into a comprehensive report",
            "You are an FDA document integration expert.\n- Consolidate all previous analysis results.\n- Generate a structured comprehensive report in Traditional Chinese.\n- Highlight key findings, risk alerts, and recommendations.",
            "Generate a comprehensive report based on the analysis:",
            0.5,
            5000,
        ),
    ]
}
