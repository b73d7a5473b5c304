//! Inspection aggregate (§3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{AppError, AppResult};
use crate::events::DomainEvent;
use crate::impl_aggregate_root;

use super::aggregate::{AggregateMeta, EventLog};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InspectionStatus {
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
}

impl InspectionStatus {
    /// Transition table from §3: `scheduled <-> in-progress -> completed`;
    /// `cancelled -> scheduled` only; `completed` is terminal.
    pub fn can_transition_to(self, next: InspectionStatus) -> bool {
        use InspectionStatus::*;
        matches!(
            (self, next),
            (Scheduled, InProgress)
                | (InProgress, Scheduled)
                | (InProgress, Completed)
                | (Scheduled, Cancelled)
                | (InProgress, Cancelled)
                | (Cancelled, Scheduled)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ItemStatus {
    Pending,
    Passed,
    Failed,
    Na,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InspectionItem {
    pub id: String,
    pub name: String,
    pub status: ItemStatus,
    pub actual_value: Option<f64>,
    pub expected: Option<f64>,
    pub tolerance: Option<f64>,
    pub unit: Option<String>,
}

impl InspectionItem {
    /// `isWithinTolerance = |expected - actual| <= tolerance`. `None` when
    /// any of the three numeric inputs is absent — tolerance is simply not
    /// applicable to this item.
    pub fn is_within_tolerance(&self) -> Option<bool> {
        match (self.expected, self.tolerance, self.actual_value) {
            (Some(expected), Some(tolerance), Some(actual)) => {
                Some((expected - actual).abs() <= tolerance)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DefectSeverity {
    Critical,
    Major,
    Minor,
    Cosmetic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DefectStatus {
    Open,
    InProgress,
    Resolved,
    Closed,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Defect {
    pub id: String,
    pub description: String,
    pub severity: DefectSeverity,
    pub status: DefectStatus,
}

impl Defect {
    /// Close requires the defect to already be `Resolved` (§3).
    pub fn close(&mut self) -> AppResult<()> {
        if self.status != DefectStatus::Resolved {
            return Err(AppError::validation(
                "defect must be resolved before it can be closed",
            ));
        }
        self.status = DefectStatus::Closed;
        Ok(())
    }

    /// Reopen is permitted from `resolved`, `closed`, or `rejected` (§3).
    pub fn reopen(&mut self) -> AppResult<()> {
        if !matches!(
            self.status,
            DefectStatus::Resolved | DefectStatus::Closed | DefectStatus::Rejected
        ) {
            return Err(AppError::validation(format!(
                "defect cannot be reopened from status {:?}",
                self.status
            )));
        }
        self.status = DefectStatus::Open;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Inspection {
    meta: AggregateMeta,
    #[serde(skip)]
    events: EventLog,

    pub title: String,
    pub description: String,
    pub customer_id: Option<String>,
    pub supplier_id: Option<String>,
    pub component_id: Option<String>,
    pub status: InspectionStatus,
    pub scheduled_date: DateTime<Utc>,
    pub completed_date: Option<DateTime<Utc>>,
    pub inspector_id: Option<String>,
    pub location: String,
    pub inspection_type: String,
    pub items: Vec<InspectionItem>,
    pub defects: Vec<Defect>,
    pub attachments: Vec<String>,
}

impl_aggregate_root!(Inspection);

#[derive(Debug)]
pub struct InspectionCreated {
    pub inspection_id: String,
}

impl DomainEvent for InspectionCreated {
    fn event_type(&self) -> &'static str {
        "InspectionCreated"
    }
    fn aggregate_id(&self) -> &str {
        &self.inspection_id
    }
    fn payload(&self) -> serde_json::Value {
        json!({ "inspectionId": self.inspection_id })
    }
}

#[derive(Debug)]
pub struct InspectionStatusChanged {
    pub inspection_id: String,
    pub from: InspectionStatus,
    pub to: InspectionStatus,
}

impl DomainEvent for InspectionStatusChanged {
    fn event_type(&self) -> &'static str {
        "InspectionStatusChanged"
    }
    fn aggregate_id(&self) -> &str {
        &self.inspection_id
    }
    fn payload(&self) -> serde_json::Value {
        json!({
            "inspectionId": self.inspection_id,
            "from": format!("{:?}", self.from),
            "to": format!("{:?}", self.to),
        })
    }
}

/// Inputs for [`Inspection::create`]; field-level validation is done here so
/// the aggregate constructor never observes an already-invalid shape.
pub struct NewInspection {
    pub id: String,
    pub title: String,
    pub description: String,
    pub customer_id: Option<String>,
    pub supplier_id: Option<String>,
    pub component_id: Option<String>,
    pub scheduled_date: DateTime<Utc>,
    pub location: String,
    pub inspection_type: String,
}

impl Inspection {
    /// `title` + `scheduledDate` required; at least one of
    /// `customerId`/`supplierId` (§3).
    pub fn create(input: NewInspection) -> AppResult<Self> {
        if input.title.trim().is_empty() {
            return Err(AppError::validation("title is required"));
        }
        if input.customer_id.is_none() && input.supplier_id.is_none() {
            return Err(AppError::validation(
                "at least one of customerId or supplierId is required",
            ));
        }

        let mut events = EventLog::default();
        events.record(InspectionCreated { inspection_id: input.id.clone() });

        Ok(Self {
            meta: AggregateMeta::new(input.id),
            events,
            title: input.title,
            description: input.description,
            customer_id: input.customer_id,
            supplier_id: input.supplier_id,
            component_id: input.component_id,
            status: InspectionStatus::Scheduled,
            scheduled_date: input.scheduled_date,
            completed_date: None,
            inspector_id: None,
            location: input.location,
            inspection_type: input.inspection_type,
            items: Vec::new(),
            defects: Vec::new(),
            attachments: Vec::new(),
        })
    }

    /// Validated status transition per the table in §3. `Completed` also
    /// requires `completedDate` to be set as part of the same call.
    pub fn transition_to(&mut self, next: InspectionStatus) -> AppResult<()> {
        if self.status == next {
            return Ok(()); // idempotent no-op, not a transition
        }
        if !self.status.can_transition_to(next) {
            return Err(AppError::validation(format!(
                "invalid status transition from {:?} to {:?}",
                self.status, next
            )));
        }

        let from = self.status;
        self.status = next;
        if next == InspectionStatus::Completed {
            self.completed_date = Some(Utc::now());
        }
        self.meta.touch();
        self.events.record(InspectionStatusChanged {
            inspection_id: self.meta.id.clone(),
            from,
            to: next,
        });
        Ok(())
    }

    pub fn add_item(&mut self, item: InspectionItem) {
        self.items.push(item);
        self.meta.touch();
    }

    pub fn add_defect(&mut self, defect: Defect) {
        self.defects.push(defect);
        self.meta.touch();
    }

    /// Completed items over total items, as a percentage in `[0, 100]`.
    pub fn completion_percentage(&self) -> f64 {
        if self.items.is_empty() {
            return 0.0;
        }
        let completed = self
            .items
            .iter()
            .filter(|i| i.status != ItemStatus::Pending)
            .count();
        (completed as f64 / self.items.len() as f64) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_input() -> NewInspection {
        NewInspection {
            id: "I1".into(),
            title: "T1".into(),
            description: "".into(),
            customer_id: Some("C1".into()),
            supplier_id: None,
            component_id: None,
            scheduled_date: "2030-01-01T00:00:00Z".parse().unwrap(),
            location: "Bay 3".into(),
            inspection_type: "incoming".into(),
        }
    }

    #[test]
    fn create_requires_title() {
        let mut input = new_input();
        input.title = "".into();
        assert!(Inspection::create(input).is_err());
    }

    #[test]
    fn create_requires_customer_or_supplier() {
        let mut input = new_input();
        input.customer_id = None;
        input.supplier_id = None;
        assert!(Inspection::create(input).is_err());
    }

    #[test]
    fn create_emits_inspection_created() {
        let mut inspection = Inspection::create(new_input()).unwrap();
        assert_eq!(inspection.status, InspectionStatus::Scheduled);
        assert_eq!(inspection.completion_percentage(), 0.0);
        let events = inspection.take_events_for_test();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type(), "InspectionCreated");
    }

    #[test]
    fn cancelled_to_completed_is_invalid() {
        let mut inspection = Inspection::create(new_input()).unwrap();
        inspection.transition_to(InspectionStatus::Cancelled).unwrap();
        let err = inspection.transition_to(InspectionStatus::Completed).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Validation);
        assert!(err.message.contains("invalid status transition"));
    }

    #[test]
    fn completed_is_terminal() {
        let mut inspection = Inspection::create(new_input()).unwrap();
        inspection.transition_to(InspectionStatus::InProgress).unwrap();
        inspection.transition_to(InspectionStatus::Completed).unwrap();
        assert!(inspection.completed_date.is_some());
        assert!(inspection.transition_to(InspectionStatus::InProgress).is_err());
        assert!(inspection.transition_to(InspectionStatus::Scheduled).is_err());
    }

    #[test]
    fn cancelled_can_only_go_back_to_scheduled() {
        let mut inspection = Inspection::create(new_input()).unwrap();
        inspection.transition_to(InspectionStatus::Cancelled).unwrap();
        inspection.transition_to(InspectionStatus::Scheduled).unwrap();
        assert_eq!(inspection.status, InspectionStatus::Scheduled);
    }

    #[test]
    fn completion_percentage_counts_non_pending_items() {
        let mut inspection = Inspection::create(new_input()).unwrap();
        inspection.add_item(InspectionItem {
            id: "i1".into(), name: "n".into(), status: ItemStatus::Passed,
            actual_value: None, expected: None, tolerance: None, unit: None,
        });
        inspection.add_item(InspectionItem {
            id: "i2".into(), name: "n".into(), status: ItemStatus::Pending,
            actual_value: None, expected: None, tolerance: None, unit: None,
        });
        assert_eq!(inspection.completion_percentage(), 50.0);
    }

    #[test]
    fn item_within_tolerance() {
        let item = InspectionItem {
            id: "i1".into(), name: "n".into(), status: ItemStatus::Pending,
            actual_value: Some(10.1), expected: Some(10.0), tolerance: Some(0.2), unit: None,
        };
        assert_eq!(item.is_within_tolerance(), Some(true));
    }

    #[test]
    fn defect_close_requires_resolved_first() {
        let mut defect = Defect {
            id: "d1".into(), description: "crack".into(),
            severity: DefectSeverity::Major, status: DefectStatus::Open,
        };
        assert!(defect.close().is_err());
        defect.status = DefectStatus::Resolved;
        assert!(defect.close().is_ok());
        assert_eq!(defect.status, DefectStatus::Closed);
    }

    #[test]
    fn defect_reopen_allowed_from_terminal_states() {
        let mut defect = Defect {
            id: "d1".into(), description: "crack".into(),
            severity: DefectSeverity::Minor, status: DefectStatus::Rejected,
        };
        assert!(defect.reopen().is_ok());
        assert_eq!(defect.status, DefectStatus::Open);
    }

    impl Inspection {
        /// Test-only accessor so unit tests don't need the full
        /// `AggregateRoot` trait import dance.
        fn take_events_for_test(&mut self) -> Vec<Box<dyn DomainEvent>> {
            self.events.take()
        }
    }
}
