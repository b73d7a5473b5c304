//! Component aggregate (§3).
//!
//! A component owns three kinds of sub-entities: dimensional/performance
//! `Specification`s, a `Revision` history with its own approval lifecycle,
//! and typed `RelatedComponent` links to other parts. All three are plain
//! data owned by the aggregate root — deleting a `Component` deletes them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{AppError, AppResult};
use crate::events::DomainEvent;
use crate::impl_aggregate_root;

use super::aggregate::{AggregateMeta, EventLog};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComponentStatus {
    Development,
    Active,
    Obsolete,
    Discontinued,
}

impl ComponentStatus {
    /// No transition table is given verbatim in §3 for `Component` (only
    /// for `Inspection` and `Revision`); this crate's decision (recorded in
    /// DESIGN.md) is the natural one-way parts lifecycle: a part is drafted,
    /// goes active, and eventually leaves service either superseded
    /// (`obsolete`) or withdrawn outright (`discontinued`). No transition
    /// moves backward.
    pub fn can_transition_to(self, next: ComponentStatus) -> bool {
        use ComponentStatus::*;
        matches!(
            (self, next),
            (Development, Active) | (Active, Obsolete) | (Active, Discontinued) | (Obsolete, Discontinued)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RevisionStatus {
    Draft,
    Review,
    Approved,
    Obsolete,
}

impl RevisionStatus {
    /// `draft <-> review`, `review -> approved`, any -> `obsolete` (§3).
    /// `approved` is reached only through [`Revision::approve`], never
    /// through a bare transition, since approval also requires recording
    /// the approver and date.
    pub fn can_transition_to(self, next: RevisionStatus) -> bool {
        use RevisionStatus::*;
        match next {
            Obsolete => true,
            Review => matches!(self, Draft | Review),
            Draft => matches!(self, Review | Draft),
            Approved => false,
        }
    }
}

/// One immutable-once-approved point in a component's revision history.
/// `version` follows semantic-version `X.Y.Z`; see [`Component::add_revision`]
/// for the auto-increment/rollover rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Revision {
    pub version: semver::Version,
    pub status: RevisionStatus,
    pub notes: String,
    #[serde(rename = "approvedBy")]
    pub approved_by: Option<String>,
    #[serde(rename = "approvedAt")]
    pub approved_at: Option<DateTime<Utc>>,
}

impl Revision {
    /// Plain status transition per the table above. Approval is rejected
    /// here — it always needs an approver, so it goes through [`Self::approve`].
    pub fn transition_to(&mut self, next: RevisionStatus) -> AppResult<()> {
        if next == RevisionStatus::Approved {
            return Err(AppError::validation(
                "use approve() to transition a revision to approved",
            ));
        }
        if self.status == next {
            return Ok(());
        }
        if !self.status.can_transition_to(next) {
            return Err(AppError::validation(format!(
                "invalid revision transition from {:?} to {:?}",
                self.status, next
            )));
        }
        self.status = next;
        Ok(())
    }

    /// `review -> approved` only, recording the approver and timestamp;
    /// approval freezes the revision (§3 — "approved requires
    /// approver+date and freezes edits").
    pub fn approve(&mut self, approved_by: impl Into<String>) -> AppResult<()> {
        if self.status != RevisionStatus::Review {
            return Err(AppError::validation(
                "revision must be in review before it can be approved",
            ));
        }
        self.status = RevisionStatus::Approved;
        self.approved_by = Some(approved_by.into());
        self.approved_at = Some(Utc::now());
        Ok(())
    }

    /// Notes may only change before approval (§3's "freezes edits").
    pub fn edit_notes(&mut self, notes: impl Into<String>) -> AppResult<()> {
        if self.status == RevisionStatus::Approved {
            return Err(AppError::validation("an approved revision cannot be edited"));
        }
        self.notes = notes.into();
        Ok(())
    }
}

/// Increment the patch component, rolling over into the next minor when
/// the patch would otherwise reach 10 (§3).
fn next_version(current: &semver::Version) -> semver::Version {
    if current.patch + 1 >= 10 {
        semver::Version::new(current.major, current.minor + 1, 0)
    } else {
        semver::Version::new(current.major, current.minor, current.patch + 1)
    }
}

/// A dimensional/performance specification attached to a component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Specification {
    pub name: String,
    pub value: Option<f64>,
    #[serde(rename = "expectedValue")]
    pub expected_value: Option<f64>,
    pub tolerance: Option<f64>,
    #[serde(rename = "minValue")]
    pub min_value: Option<f64>,
    #[serde(rename = "maxValue")]
    pub max_value: Option<f64>,
}

impl Specification {
    /// `name` required; `tolerance >= 0`; `min <= max`; `value` within
    /// `[min, max]` when all three numeric bounds are present (§3).
    pub fn validate(&self) -> AppResult<()> {
        if self.name.trim().is_empty() {
            return Err(AppError::validation("specification name is required"));
        }
        if let Some(tolerance) = self.tolerance {
            if tolerance < 0.0 {
                return Err(AppError::validation("specification tolerance must be >= 0"));
            }
        }
        if let (Some(min), Some(max)) = (self.min_value, self.max_value) {
            if min > max {
                return Err(AppError::validation("specification minValue must be <= maxValue"));
            }
            if let Some(value) = self.value {
                if value < min || value > max {
                    return Err(AppError::validation(
                        "specification value is outside [minValue, maxValue]",
                    ));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RelatedComponentType {
    Parent,
    Child,
    Sibling,
    Assembly,
    Part,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedComponent {
    #[serde(rename = "componentId")]
    pub component_id: String,
    pub relation: RelatedComponentType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Component {
    meta: AggregateMeta,
    #[serde(skip)]
    events: EventLog,

    pub part_number: String,
    pub name: String,
    pub description: String,
    pub status: ComponentStatus,
    pub supplier_id: Option<String>,
    pub category: String,
    pub unit_of_measure: String,
    pub specifications: Vec<Specification>,
    pub revisions: Vec<Revision>,
    pub documents: Vec<String>,
    #[serde(rename = "relatedComponents")]
    pub related_components: Vec<RelatedComponent>,
}

impl_aggregate_root!(Component);

#[derive(Debug)]
pub struct ComponentCreated {
    pub component_id: String,
    pub part_number: String,
}

impl DomainEvent for ComponentCreated {
    fn event_type(&self) -> &'static str {
        "ComponentCreated"
    }
    fn aggregate_id(&self) -> &str {
        &self.component_id
    }
    fn payload(&self) -> serde_json::Value {
        json!({ "componentId": self.component_id, "partNumber": self.part_number })
    }
}

#[derive(Debug)]
pub struct ComponentRevised {
    pub component_id: String,
    pub from_revision: String,
    pub to_revision: String,
}

impl DomainEvent for ComponentRevised {
    fn event_type(&self) -> &'static str {
        "ComponentRevised"
    }
    fn aggregate_id(&self) -> &str {
        &self.component_id
    }
    fn payload(&self) -> serde_json::Value {
        json!({
            "componentId": self.component_id,
            "fromRevision": self.from_revision,
            "toRevision": self.to_revision,
        })
    }
}

pub struct NewComponent {
    pub id: String,
    pub part_number: String,
    pub name: String,
    pub description: String,
    pub supplier_id: Option<String>,
    pub category: String,
    pub unit_of_measure: String,
    pub specifications: Vec<Specification>,
}

impl Component {
    /// `partNumber` + `name` required (§3); every supplied specification is
    /// validated up front so the aggregate never holds an invalid one.
    /// Starts life as a single `1.0.0` revision in `Draft`.
    pub fn create(input: NewComponent) -> AppResult<Self> {
        if input.part_number.trim().is_empty() {
            return Err(AppError::validation("partNumber is required"));
        }
        if input.name.trim().is_empty() {
            return Err(AppError::validation("name is required"));
        }
        for spec in &input.specifications {
            spec.validate()?;
        }

        let mut events = EventLog::default();
        events.record(ComponentCreated {
            component_id: input.id.clone(),
            part_number: input.part_number.clone(),
        });

        Ok(Self {
            meta: AggregateMeta::new(input.id),
            events,
            part_number: input.part_number,
            name: input.name,
            description: input.description,
            status: ComponentStatus::Development,
            supplier_id: input.supplier_id,
            category: input.category,
            unit_of_measure: input.unit_of_measure,
            specifications: input.specifications,
            revisions: vec![Revision {
                version: semver::Version::new(1, 0, 0),
                status: RevisionStatus::Draft,
                notes: "initial revision".to_string(),
                approved_by: None,
                approved_at: None,
            }],
            documents: Vec::new(),
            related_components: Vec::new(),
        })
    }

    /// The most recently added revision; every component has at least one
    /// from `create`, so this is only `None` after a (disallowed) empty
    /// deserialization.
    pub fn current_revision(&self) -> Option<&Revision> {
        self.revisions.last()
    }

    /// Appends a new `Draft` revision, auto-incrementing the patch of the
    /// current revision's version with rollover at 10 (§3). Revising does
    /// not itself change the component's `status`.
    pub fn add_revision(&mut self, notes: impl Into<String>) -> AppResult<&Revision> {
        let from = self
            .current_revision()
            .map(|r| r.version.clone())
            .unwrap_or_else(|| semver::Version::new(1, 0, 0));
        let to = next_version(&from);

        self.revisions.push(Revision {
            version: to.clone(),
            status: RevisionStatus::Draft,
            notes: notes.into(),
            approved_by: None,
            approved_at: None,
        });
        self.meta.touch();
        self.events.record(ComponentRevised {
            component_id: self.meta.id.clone(),
            from_revision: from.to_string(),
            to_revision: to.to_string(),
        });
        Ok(self.revisions.last().unwrap())
    }

    /// Moves the current (latest) revision through its own lifecycle.
    /// Approval requires `approved_by`; anything else uses a plain
    /// transition.
    pub fn transition_revision(
        &mut self,
        next: RevisionStatus,
        approved_by: Option<String>,
    ) -> AppResult<()> {
        let revision = self
            .revisions
            .last_mut()
            .ok_or_else(|| AppError::internal("component has no revisions"))?;
        match (next, approved_by) {
            (RevisionStatus::Approved, Some(approver)) => revision.approve(approver)?,
            (RevisionStatus::Approved, None) => {
                return Err(AppError::validation("approving a revision requires an approver"))
            }
            (other, _) => revision.transition_to(other)?,
        }
        self.meta.touch();
        Ok(())
    }

    pub fn add_specification(&mut self, spec: Specification) -> AppResult<()> {
        spec.validate()?;
        self.specifications.push(spec);
        self.meta.touch();
        Ok(())
    }

    /// Rejects a duplicate `(componentId, relation)` pair (§3 — "no
    /// duplicates").
    pub fn add_related_component(&mut self, related: RelatedComponent) -> AppResult<()> {
        if self.related_components.contains(&related) {
            return Err(AppError::validation(
                "this related-component link already exists",
            ));
        }
        self.related_components.push(related);
        self.meta.touch();
        Ok(())
    }

    pub fn add_document(&mut self, document: impl Into<String>) {
        self.documents.push(document.into());
        self.meta.touch();
    }

    pub fn transition_to(&mut self, next: ComponentStatus) -> AppResult<()> {
        if self.status == next {
            return Ok(());
        }
        if !self.status.can_transition_to(next) {
            return Err(AppError::validation(format!(
                "invalid status transition from {:?} to {:?}",
                self.status, next
            )));
        }
        self.status = next;
        self.meta.touch();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_input() -> NewComponent {
        NewComponent {
            id: "C1".into(),
            part_number: "PN-100".into(),
            name: "Bracket".into(),
            description: "".into(),
            supplier_id: None,
            category: "hardware".into(),
            unit_of_measure: "each".into(),
            specifications: Vec::new(),
        }
    }

    #[test]
    fn create_requires_part_number() {
        let mut input = new_input();
        input.part_number = "".into();
        assert!(Component::create(input).is_err());
    }

    #[test]
    fn create_seeds_a_draft_1_0_0_revision() {
        let component = Component::create(new_input()).unwrap();
        let revision = component.current_revision().unwrap();
        assert_eq!(revision.version, semver::Version::new(1, 0, 0));
        assert_eq!(revision.status, RevisionStatus::Draft);
    }

    #[test]
    fn add_revision_increments_patch() {
        let mut component = Component::create(new_input()).unwrap();
        component.add_revision("tolerance tightened").unwrap();
        assert_eq!(component.current_revision().unwrap().version, semver::Version::new(1, 0, 1));
    }

    #[test]
    fn add_revision_rolls_over_patch_at_ten() {
        let mut component = Component::create(new_input()).unwrap();
        for _ in 0..9 {
            component.add_revision("bump").unwrap();
        }
        // 1.0.0 -> ... -> 1.0.9 after nine bumps; the tenth rolls to 1.1.0.
        assert_eq!(component.current_revision().unwrap().version, semver::Version::new(1, 0, 9));
        component.add_revision("bump").unwrap();
        assert_eq!(component.current_revision().unwrap().version, semver::Version::new(1, 1, 0));
    }

    #[test]
    fn revision_approval_requires_review_first_and_an_approver() {
        let mut component = Component::create(new_input()).unwrap();
        let err = component
            .transition_revision(RevisionStatus::Approved, Some("qa-lead".into()))
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Validation);

        component.transition_revision(RevisionStatus::Review, None).unwrap();
        component
            .transition_revision(RevisionStatus::Approved, Some("qa-lead".into()))
            .unwrap();
        let revision = component.current_revision().unwrap();
        assert_eq!(revision.status, RevisionStatus::Approved);
        assert_eq!(revision.approved_by.as_deref(), Some("qa-lead"));
        assert!(revision.approved_at.is_some());
    }

    #[test]
    fn approved_revision_rejects_further_edits() {
        let mut component = Component::create(new_input()).unwrap();
        component.transition_revision(RevisionStatus::Review, None).unwrap();
        component
            .transition_revision(RevisionStatus::Approved, Some("qa-lead".into()))
            .unwrap();
        let revision = component.revisions.last_mut().unwrap();
        assert!(revision.edit_notes("late change").is_err());
    }

    #[test]
    fn specification_min_must_not_exceed_max() {
        let spec = Specification {
            name: "diameter".into(),
            value: Some(5.0),
            expected_value: Some(5.0),
            tolerance: Some(0.1),
            min_value: Some(10.0),
            max_value: Some(1.0),
        };
        assert!(spec.validate().is_err());
    }

    #[test]
    fn specification_value_outside_bounds_is_rejected() {
        let spec = Specification {
            name: "diameter".into(),
            value: Some(99.0),
            expected_value: None,
            tolerance: None,
            min_value: Some(0.0),
            max_value: Some(10.0),
        };
        assert!(spec.validate().is_err());
    }

    #[test]
    fn related_component_rejects_duplicate_links() {
        let mut component = Component::create(new_input()).unwrap();
        let link = RelatedComponent { component_id: "C2".into(), relation: RelatedComponentType::Assembly };
        component.add_related_component(link.clone()).unwrap();
        assert!(component.add_related_component(link).is_err());
    }

    #[test]
    fn status_cannot_move_backward() {
        let mut component = Component::create(new_input()).unwrap();
        component.transition_to(ComponentStatus::Active).unwrap();
        component.transition_to(ComponentStatus::Obsolete).unwrap();
        assert!(component.transition_to(ComponentStatus::Active).is_err());
    }
}
