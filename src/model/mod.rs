pub mod accounting;
pub mod attendance;
pub mod benefit;
pub mod customer;
pub mod department;
pub mod device;
pub mod employee;
pub mod invoice;
pub mod leave_request;
pub mod location;
pub mod payroll;
pub mod performance;
pub mod product;
pub mod quotation;
pub mod role;
pub mod sale;
pub mod shift;
pub mod stock;
pub mod sync;
pub mod training;
pub mod user;
