//! Per-garage customer ledger.

pub mod customer;

pub use customer::{
    CompletedJobRecorded, CreateCustomer, Customer, CustomerCommand, CustomerCreated,
    CustomerEvent, CustomerId, CustomerIdentity, CustomerProfileUpdated, RecordCompletedJob,
    UpdateCustomerProfile, normalize_bike_number,
};
