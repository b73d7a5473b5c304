//! Customer aggregate (§3).

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{AppError, AppResult};
use crate::events::DomainEvent;
use crate::impl_aggregate_root;

use super::aggregate::{AggregateMeta, EventLog};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CustomerStatus {
    Active,
    Inactive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    meta: AggregateMeta,
    #[serde(skip)]
    events: EventLog,

    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub billing_address: Option<String>,
    pub status: CustomerStatus,
    pub notes: String,
}

impl_aggregate_root!(Customer);

#[derive(Debug)]
pub struct CustomerCreated {
    pub customer_id: String,
    pub email: String,
}

impl DomainEvent for CustomerCreated {
    fn event_type(&self) -> &'static str {
        "CustomerCreated"
    }
    fn aggregate_id(&self) -> &str {
        &self.customer_id
    }
    fn payload(&self) -> serde_json::Value {
        json!({ "customerId": self.customer_id, "email": self.email })
    }
}

pub struct NewCustomer {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub billing_address: Option<String>,
}

fn is_plausible_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else { return false };
    !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
}

impl Customer {
    /// `name` + `email` required; `email` must look like an email and is
    /// normalized to lowercase so uniqueness checks at the repository layer
    /// are case-insensitive (§3, §4.6).
    pub fn create(input: NewCustomer) -> AppResult<Self> {
        if input.name.trim().is_empty() {
            return Err(AppError::validation("name is required"));
        }
        let email = input.email.trim().to_lowercase();
        if !is_plausible_email(&email) {
            return Err(AppError::validation("email is not valid"));
        }

        let mut events = EventLog::default();
        events.record(CustomerCreated { customer_id: input.id.clone(), email: email.clone() });

        Ok(Self {
            meta: AggregateMeta::new(input.id),
            events,
            name: input.name,
            email,
            phone: input.phone,
            billing_address: input.billing_address,
            status: CustomerStatus::Active,
            notes: String::new(),
        })
    }

    pub fn deactivate(&mut self) {
        if self.status == CustomerStatus::Active {
            self.status = CustomerStatus::Inactive;
            self.meta.touch();
        }
    }

    pub fn reactivate(&mut self) {
        if self.status == CustomerStatus::Inactive {
            self.status = CustomerStatus::Active;
            self.meta.touch();
        }
    }

    pub fn update_contact(&mut self, phone: Option<String>, billing_address: Option<String>) {
        self.phone = phone;
        self.billing_address = billing_address;
        self.meta.touch();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_input() -> NewCustomer {
        NewCustomer {
            id: "CU1".into(),
            name: "Acme Inc".into(),
            email: "Ops@Acme.com".into(),
            phone: None,
            billing_address: None,
        }
    }

    #[test]
    fn create_normalizes_email_case() {
        let customer = Customer::create(new_input()).unwrap();
        assert_eq!(customer.email, "ops@acme.com");
    }

    #[test]
    fn create_rejects_malformed_email() {
        let mut input = new_input();
        input.email = "not-an-email".into();
        assert!(Customer::create(input).is_err());
    }

    #[test]
    fn deactivate_then_reactivate_round_trips() {
        let mut customer = Customer::create(new_input()).unwrap();
        customer.deactivate();
        assert_eq!(customer.status, CustomerStatus::Inactive);
        customer.reactivate();
        assert_eq!(customer.status, CustomerStatus::Active);
    }
}
