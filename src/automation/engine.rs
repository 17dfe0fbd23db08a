use super::actions::{parse_actions, ActionRegistry};
use super::condition::Condition;
use crate::models::{AutomationRule, Lead};
use crate::store::RuleStore;
use anyhow::{anyhow, Result};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

/// What happened during one automation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunReport {
    pub evaluated: usize,
    pub matched: usize,
    /// Rules whose condition or actions errored.
    pub failed: usize,
    /// Rules whose actions all completed, in execution order.
    pub executed_rules: Vec<Uuid>,
    pub stopped_by: Option<Uuid>,
}

/// Evaluates active rules against a lead in descending priority order.
///
/// Rules run sequentially. A rule that errors is logged and counted, and
/// evaluation continues with the next rule; a rule's `stop_on_match` only
/// halts the run when that rule completed successfully.
pub struct AutomationEngine {
    rules: Arc<dyn RuleStore>,
    registry: ActionRegistry,
}

impl AutomationEngine {
    pub fn new(rules: Arc<dyn RuleStore>, registry: ActionRegistry) -> Self {
        Self { rules, registry }
    }

    /// Fails only when the rule set cannot be loaded.
    pub async fn run(&self, lead: &Lead) -> Result<RunReport> {
        let mut rules = self
            .rules
            .active_rules()
            .await
            .map_err(|e| anyhow!("failed to load automation rules: {}", e))?;

        // Stable sort keeps the store's tie order for equal priorities.
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));

        let mut report = RunReport::default();

        for rule in rules.iter().filter(|r| r.is_active) {
            report.evaluated += 1;

            match self.apply(rule, lead).await {
                Ok(false) => {}
                Ok(true) => {
                    report.matched += 1;
                    report.executed_rules.push(rule.id);
                    tracing::debug!("Rule '{}' applied to lead {}", rule.name, lead.id);

                    if rule.stop_on_match {
                        report.stopped_by = Some(rule.id);
                        break;
                    }
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!("Rule '{}' failed for lead {}: {:#}", rule.name, lead.id, e);
                }
            }
        }

        Ok(report)
    }

    /// `Ok(true)` when the rule matched and every action succeeded. A rule
    /// naming an unregistered action type fails before any action runs.
    async fn apply(&self, rule: &AutomationRule, lead: &Lead) -> Result<bool> {
        let condition = Condition::from_json(&rule.conditions)?;
        if !condition.evaluate(lead)? {
            return Ok(false);
        }

        let actions = parse_actions(&rule.actions)?;
        if let Some(unknown) = actions.iter().find(|a| !self.registry.supports(&a.kind)) {
            return Err(anyhow!("unknown action type '{}'", unknown.kind));
        }

        for action in actions {
            self.registry
                .execute(&action, lead)
                .await
                .map_err(|e| anyhow!("action '{}': {:#}", action.kind, e))?;
        }

        Ok(true)
    }
}
