//! DomainService layer (C8): the validate/load/invoke/persist/publish
//! sequence every write endpoint runs, shared across aggregates.

mod component_service;
mod customer_service;
mod inspection_service;

pub use component_service::{ComponentService, CreateComponentInput};
pub use customer_service::{CreateCustomerInput, CustomerService};
pub use inspection_service::{CreateInspectionInput, InspectionService};
