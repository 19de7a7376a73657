pub mod accounting;
pub mod attendance;
pub mod benefit;
pub mod customer;
pub mod department;
pub mod employee;
pub mod hr_report;
pub mod invoice;
pub mod leave_request;
pub mod location;
pub mod payroll;
pub mod performance;
pub mod pos;
pub mod pos_report;
pub mod pos_sync;
pub mod product;
pub mod quotation;
pub mod sales_report;
pub mod shift;
pub mod stock_movement;
pub mod stock_take;
pub mod stock_transfer;
pub mod training;
