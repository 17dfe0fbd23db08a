//! Lead intake: validate, persist, fan out, then hand off to automation.
//!
//! The lead insert is the only step that can fail the request. Fan-out
//! errors come back as a soft warning next to the created id, and the
//! automation run happens on the background worker after the response.
use crate::automation::worker::AutomationQueue;
use crate::distribution;
use crate::errors::AppError;
use crate::models::{Lead, LeadRequest};
use crate::store::LeadStore;
use crate::validation::{self, fingerprint};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct IntakeOutcome {
    pub lead_id: Uuid,
    pub distributed: usize,
    pub warning: Option<String>,
}

#[derive(Clone)]
pub struct LeadIntake {
    store: Arc<dyn LeadStore>,
    automation: Option<AutomationQueue>,
}

impl LeadIntake {
    pub fn new(store: Arc<dyn LeadStore>, automation: Option<AutomationQueue>) -> Self {
        Self { store, automation }
    }

    pub async fn submit(&self, payload: LeadRequest) -> Result<IntakeOutcome, AppError> {
        let new_lead = validation::validate_lead(payload)?;

        let lead: Lead = self.store.insert_lead(&new_lead).await?;
        tracing::info!(
            "Lead {} created (source={}, email={})",
            lead.id,
            lead.source.as_deref().unwrap_or("unknown"),
            lead.email
                .as_deref()
                .map(fingerprint)
                .unwrap_or_else(|| "-".to_string())
        );

        let (distributed, warning) = match distribution::fan_out(self.store.as_ref(), lead.id).await
        {
            Ok(count) => (count, None),
            Err(e) => {
                tracing::error!("Distribution failed for lead {}: {}", lead.id, e);
                (
                    0,
                    Some("Lead saved, but distribution to clients failed".to_string()),
                )
            }
        };

        let lead_id = lead.id;
        if let Some(queue) = &self.automation {
            queue.enqueue(lead);
        }

        Ok(IntakeOutcome {
            lead_id,
            distributed,
            warning,
        })
    }
}
