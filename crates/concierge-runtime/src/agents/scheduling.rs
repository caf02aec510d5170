//! Scheduling specialist: hands the customer over to a live agent.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveDateTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use concierge_core::{AgentOutput, Clock, SpecialistId};

use super::common::Generation;
use super::traits::{AgentError, Specialist, SpecialistRequest};
use crate::config::SchedulingConfig;
use crate::prompts;

/// Appended to the answer when classification escalated the request.
pub const ESCALATION_NOTE: &str = "\n\n**Note:** Your query requires specialized assistance from our team. \
A live agent will be better equipped to help you with this matter.";

const SLOT_HOURS: [u32; 6] = [9, 10, 11, 14, 15, 16];

/// A bookable callback time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackSlot {
    pub slot_id: String,
    pub starts_at: NaiveDateTime,
}

impl CallbackSlot {
    fn new(date: NaiveDate, hour: u32) -> Option<Self> {
        let starts_at = date.and_hms_opt(hour, 0, 0)?;
        Some(Self {
            slot_id: format!("SLOT-{}-{:02}00", date.format("%Y%m%d"), hour),
            starts_at,
        })
    }

    /// e.g. "Tuesday, March 04 at 2:00 PM"
    pub fn label(&self) -> String {
        self.starts_at.format("%A, %B %d at %-I:%M %p").to_string()
    }
}

/// Weekday slots from tomorrow through `days_ahead` days, capped at
/// `max_slots`.
pub fn available_slots(now: DateTime<Utc>, config: &SchedulingConfig) -> Vec<CallbackSlot> {
    let today = now.date_naive();

    (1..=u64::from(config.days_ahead))
        .filter_map(|offset| today.checked_add_days(Days::new(offset)))
        .filter(|date| !matches!(date.weekday(), Weekday::Sat | Weekday::Sun))
        .flat_map(|date| SLOT_HOURS.into_iter().filter_map(move |hour| CallbackSlot::new(date, hour)))
        .take(config.max_slots)
        .collect()
}

pub struct SchedulingSpecialist {
    generation: Generation,
    config: SchedulingConfig,
    clock: Arc<dyn Clock>,
}

impl SchedulingSpecialist {
    pub fn new(generation: Generation, config: SchedulingConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            generation,
            config,
            clock,
        }
    }
}

#[async_trait]
impl Specialist for SchedulingSpecialist {
    fn id(&self) -> SpecialistId {
        SpecialistId::Scheduling
    }

    async fn handle(&self, request: &SpecialistRequest<'_>) -> Result<AgentOutput, AgentError> {
        let slots = available_slots(self.clock.now(), &self.config);
        let listing = if slots.is_empty() {
            "No callback slots are open in the coming days.".to_string()
        } else {
            slots
                .iter()
                .map(|slot| format!("- {} (ID: {})", slot.label(), slot.slot_id))
                .collect::<Vec<_>>()
                .join("\n")
        };

        let message = prompts::specialist_user_message(
            request.context,
            "Available Time Slots",
            &listing,
            request.query,
        );

        let mut output = self
            .generation
            .answer(
                self.id(),
                prompts::SCHEDULING_SYSTEM_PROMPT,
                message,
                request.context,
                Vec::new(),
            )
            .await?;

        if request.escalated {
            output.text.push_str(ESCALATION_NOTE);
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn friday_noon() -> DateTime<Utc> {
        // 2025-03-07 is a Friday
        Utc.with_ymd_and_hms(2025, 3, 7, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_slots_skip_weekend() {
        let config = SchedulingConfig {
            days_ahead: 3,
            max_slots: 100,
        };
        let slots = available_slots(friday_noon(), &config);

        // Sat and Sun skipped, Monday only
        assert_eq!(slots.len(), 6);
        assert_eq!(slots[0].slot_id, "SLOT-20250310-0900");
        assert_eq!(slots[5].slot_id, "SLOT-20250310-1600");
        assert_eq!(slots[3].label(), "Monday, March 10 at 2:00 PM");
    }

    #[test]
    fn test_slots_capped() {
        let config = SchedulingConfig {
            days_ahead: 7,
            max_slots: 4,
        };
        let slots = available_slots(friday_noon(), &config);
        assert_eq!(slots.len(), 4);
        assert_eq!(slots[3].slot_id, "SLOT-20250310-1400");
    }

    #[test]
    fn test_no_days_no_slots() {
        let config = SchedulingConfig {
            days_ahead: 0,
            max_slots: 10,
        };
        assert!(available_slots(friday_noon(), &config).is_empty());
    }
}
