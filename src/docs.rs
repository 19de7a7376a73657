use crate::api::{
    accounting::{CreateAccount, CreateJournalEntry, SetupChart, UpdateAccount},
    attendance::{ClockReq, RecordAttendanceReq},
    benefit::CreateBenefit,
    customer::{CreateCustomer, CustomerPurchases, LogInteraction},
    department::{CreateDepartment, CreatePosition},
    employee::{CreateEmployee, EmployeeListResponse},
    hr_report::{AttendanceReport, HrOverview, PayrollReport},
    invoice::{CreateInvoice, RecordPayment},
    leave_request::{CreateLeave, LeaveFilter, LeaveListResponse, RejectLeave},
    location::CreateLocation,
    payroll::{GeneratePayslip, MarkPaid, PaginatedPayrollResponse, UpdatePayroll},
    performance::CreateReview,
    pos::{CheckoutLine, CheckoutReq, QuoteReq, ReturnLine, ReturnReq},
    pos_report::{CloseDay, Dashboard, MovementReport},
    pos_sync::RegisterDevice,
    product::{CreateCategory, CreateProduct, InitialStock},
    quotation::{ConvertQuotation, CreateQuotation, QuotationStatusUpdate},
    sales_report::{PosTotals, SalesStats, TopCustomer},
    shift::{AssignShift, CreateShift, StaffOnShift},
    stock_movement::CreateMovement,
    stock_take::{Count, RecordCounts, StartStockTake, StockTakeReport},
    stock_transfer::CreateTransfer,
    training::CreateTraining,
};
use crate::model::{
    accounting::{Account, AccountType, Industry, JournalEntry, JournalEntryWithLines, LedgerLine},
    attendance::{Attendance, AttendanceStatus},
    benefit::{Benefit, BenefitType},
    customer::{CrmLog, Customer, CustomerStatus, LogType},
    department::{Department, Position},
    device::PosDevice,
    employee::{Employee, EmployeeStatus, EmploymentType, SalaryType},
    invoice::{Invoice, InvoiceStatus, InvoiceWithLines},
    leave_request::{LeaveRequest, LeaveStatus, LeaveType},
    location::{Location, LocationType},
    payroll::{PayrollSlip, PayrollStatus},
    performance::{PerformanceReview, ReviewStatus},
    product::{Category, LocationStockRow, Product},
    quotation::{DocumentLine, Quotation, QuotationStatus, QuotationWithLines},
    sale::{PaymentMethod, Sale, SaleItem, SaleStatus, SaleWithItems},
    shift::{ScheduledShift, Shift},
    stock::{
        CashSession, MovementType, StockMovement, StockTake, StockTakeItem, StockTakeStatus,
        StockTakeWithItems, StockTransfer, StockTransferItem, TransferStatus, TransferWithItems,
    },
    sync::{
        CatalogResponse, PushResult, RejectedRecord, SyncMovement, SyncSale, SyncSaleItem,
        SyncStockTake, SyncStockTakeItem, SyncTransfer, SyncTransferItem,
    },
    training::{TrainingProgram, TrainingStatus},
};
use crate::models::{LoginReqDto, TokenPair, UserReq};
use crate::service::{
    accounting::{JournalLineInput, TrialBalance, TrialBalanceRow},
    attendance::{AttendanceSummary, StatusShare},
    cart::{CartLine, Quote, QuotedLine, Settlement},
    hr_stats::{
        BenefitStats, DepartmentHeadcount, HeadcountReport, PerformanceStats, RatingBucket,
        TrainingStats,
    },
    inventory::{StockTakeSummary, TransferLine},
    leave::{LeaveBalance, LeaveStats},
    payroll::{PayrollCalculation, PayrollSummary, PayslipComponents, PayslipTotals},
    pos_report::{
        CashRegister, CategorySales, DateRange, DiscountsReturns, MovementTotals,
        PaymentMethodRow, Period, ProfitLoss, SalesSummary, SlowMover, StaffSales, StockLevels,
        StockSort, TopProduct, TrendPoint, VatDay, VatReport,
    },
    sales::{DocumentLineInput, DocumentTotals, InvoiceTotals},
};
use utoipa::Modify;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "ERP API",
        version = "1.0.0",
        description = r#"
## Retail ERP

One backend for the people, the shops and the customers of a multi-store business.

### 🔹 Modules
- **HR**
  - Employees, departments, positions, leave, attendance, shifts
  - Payroll with overtime and tax, performance reviews, training, benefits
- **Inventory**
  - Locations, products and per-location stock
  - Stock movements, inter-store transfers, stock takes
- **Point of Sale**
  - Cart quotes, checkout, returns, operational reports and day close
  - Offline tills push sales and pull the catalog through `/api/pos/sync`
- **Sales / CRM**
  - Customers and interaction logs, quotations, invoices, sales stats
- **Accounting**
  - Chart of accounts, balanced journal entries, trial balance
  - Every sale posts Dr cash / Cr revenue once the chart is set up

### 🔐 Security
Every `/api` endpoint needs a **JWT Bearer** token from `/auth/login`.
Roles (admin, hr, manager, cashier, employee, device) decide what each caller may do.

### 📦 Response Format
- JSON, paginated lists return `{data, page, per_page, total}`
- Reports accept `?format=csv`
- Errors are `{"code": "...", "message": "..."}`
"#,
    ),
    paths(
        crate::auth::handlers::register,
        crate::auth::handlers::login,
        crate::auth::handlers::refresh_token,
        crate::auth::handlers::logout,

        crate::api::employee::create_employee,
        crate::api::employee::list_employees,
        crate::api::employee::get_employee,
        crate::api::employee::update_employee,
        crate::api::employee::delete_employee,

        crate::api::department::create_department,
        crate::api::department::list_departments,
        crate::api::department::get_department,
        crate::api::department::update_department,
        crate::api::department::delete_department,
        crate::api::department::create_position,
        crate::api::department::list_positions,
        crate::api::department::get_position,
        crate::api::department::update_position,
        crate::api::department::delete_position,

        crate::api::leave_request::create_leave,
        crate::api::leave_request::approve_leave,
        crate::api::leave_request::reject_leave,
        crate::api::leave_request::cancel_leave,
        crate::api::leave_request::get_leave,
        crate::api::leave_request::leave_list,
        crate::api::leave_request::get_leave_stats,
        crate::api::leave_request::get_leave_balances,

        crate::api::attendance::clock_in,
        crate::api::attendance::clock_out,
        crate::api::attendance::record_attendance,
        crate::api::attendance::list_attendance,
        crate::api::attendance::attendance_summary,

        crate::api::payroll::calculate_payroll,
        crate::api::payroll::generate_payslip,
        crate::api::payroll::update_payroll,
        crate::api::payroll::mark_paid,
        crate::api::payroll::get_payroll,
        crate::api::payroll::list_payrolls,
        crate::api::payroll::payroll_summary,

        crate::api::shift::create_shift,
        crate::api::shift::list_shifts,
        crate::api::shift::assign_shift,
        crate::api::shift::employee_schedule,
        crate::api::shift::staff_on_shift,

        crate::api::performance::create_review,
        crate::api::performance::submit_review,
        crate::api::performance::acknowledge_review,
        crate::api::performance::list_reviews,
        crate::api::performance::get_review,
        crate::api::performance::get_performance_stats,

        crate::api::training::create_training,
        crate::api::training::list_trainings,
        crate::api::training::enroll,
        crate::api::training::get_training_stats,

        crate::api::benefit::create_benefit,
        crate::api::benefit::list_benefits,
        crate::api::benefit::get_benefit_stats,

        crate::api::hr_report::overview,
        crate::api::hr_report::headcount,
        crate::api::hr_report::payroll,
        crate::api::hr_report::attendance,

        crate::api::location::create_location,
        crate::api::location::list_locations,
        crate::api::location::get_location,
        crate::api::location::update_location,
        crate::api::location::deactivate_location,

        crate::api::product::create_category,
        crate::api::product::list_categories,
        crate::api::product::create_product,
        crate::api::product::list_products,
        crate::api::product::get_product,
        crate::api::product::update_product,
        crate::api::product::lookup,
        crate::api::product::stock_by_location,

        crate::api::stock_movement::create_movement,
        crate::api::stock_movement::list_movements,

        crate::api::stock_transfer::create_transfer,
        crate::api::stock_transfer::submit_transfer,
        crate::api::stock_transfer::dispatch_transfer,
        crate::api::stock_transfer::receive_transfer,
        crate::api::stock_transfer::cancel_transfer,
        crate::api::stock_transfer::list_transfers,
        crate::api::stock_transfer::get_transfer,

        crate::api::stock_take::start_stock_take,
        crate::api::stock_take::record_counts,
        crate::api::stock_take::get_summary,
        crate::api::stock_take::complete_stock_take,
        crate::api::stock_take::list_stock_takes,
        crate::api::stock_take::get_stock_take,

        crate::api::pos::quote_cart,
        crate::api::pos::checkout,
        crate::api::pos::return_sale,
        crate::api::pos::list_sales,
        crate::api::pos::get_sale,

        crate::api::pos_report::daily_sales,
        crate::api::pos_report::payment_methods_report,
        crate::api::pos_report::staff_report,
        crate::api::pos_report::category_report,
        crate::api::pos_report::top_products_report,
        crate::api::pos_report::slow_moving_report,
        crate::api::pos_report::low_stock_report,
        crate::api::pos_report::stock_levels_report,
        crate::api::pos_report::movements_report,
        crate::api::pos_report::vat,
        crate::api::pos_report::profit_loss_report,
        crate::api::pos_report::discounts_returns_report,
        crate::api::pos_report::cash_register_report,
        crate::api::pos_report::close_day,
        crate::api::pos_report::transactions,
        crate::api::pos_report::dashboard,

        crate::api::pos_sync::register_device,
        crate::api::pos_sync::push_sales,
        crate::api::pos_sync::push_movements,
        crate::api::pos_sync::push_transfers,
        crate::api::pos_sync::push_stock_takes,
        crate::api::pos_sync::pull_catalog,

        crate::api::customer::create_customer,
        crate::api::customer::list_customers,
        crate::api::customer::get_customer,
        crate::api::customer::update_customer,
        crate::api::customer::delete_customer,
        crate::api::customer::log_interaction,
        crate::api::customer::customer_logs,
        crate::api::customer::customer_purchases,

        crate::api::quotation::create_quotation,
        crate::api::quotation::list_quotations,
        crate::api::quotation::get_quotation,
        crate::api::quotation::update_quotation_status,
        crate::api::quotation::convert_to_invoice,

        crate::api::invoice::create_invoice,
        crate::api::invoice::list_invoices,
        crate::api::invoice::get_invoice,
        crate::api::invoice::send_invoice,
        crate::api::invoice::cancel_invoice,
        crate::api::invoice::record_payment,
        crate::api::invoice::mark_overdue,

        crate::api::sales_report::sales_stats,

        crate::api::accounting::create_account,
        crate::api::accounting::list_accounts,
        crate::api::accounting::get_account,
        crate::api::accounting::update_account,
        crate::api::accounting::setup_chart,
        crate::api::accounting::get_trial_balance,
        crate::api::accounting::create_entry,
        crate::api::accounting::list_entries,
        crate::api::accounting::get_entry
    ),
    components(
        schemas(
            UserReq, LoginReqDto, TokenPair,

            Employee, EmployeeStatus, EmploymentType, SalaryType, CreateEmployee,
            EmployeeListResponse,
            Department, Position, CreateDepartment, CreatePosition,
            LeaveRequest, LeaveType, LeaveStatus, CreateLeave, RejectLeave, LeaveFilter,
            LeaveListResponse, LeaveStats, LeaveBalance,
            Attendance, AttendanceStatus, ClockReq, RecordAttendanceReq, AttendanceSummary,
            StatusShare,
            PayrollSlip, PayrollStatus, GeneratePayslip, UpdatePayroll, MarkPaid,
            PaginatedPayrollResponse, PayrollCalculation, PayslipComponents, PayslipTotals,
            PayrollSummary,
            Shift, ScheduledShift, CreateShift, AssignShift, StaffOnShift,
            PerformanceReview, ReviewStatus, CreateReview, PerformanceStats, RatingBucket,
            TrainingProgram, TrainingStatus, CreateTraining, TrainingStats,
            Benefit, BenefitType, CreateBenefit, BenefitStats,
            HrOverview, PayrollReport, AttendanceReport, HeadcountReport, DepartmentHeadcount,

            Location, LocationType, CreateLocation,
            Category, Product, LocationStockRow, CreateCategory, CreateProduct, InitialStock,
            StockMovement, MovementType, CreateMovement,
            StockTransfer, StockTransferItem, TransferStatus, TransferWithItems, CreateTransfer,
            TransferLine,
            StockTake, StockTakeItem, StockTakeStatus, StockTakeWithItems, StartStockTake,
            Count, RecordCounts, StockTakeReport, StockTakeSummary,

            Sale, SaleItem, SaleStatus, PaymentMethod, SaleWithItems, CashSession,
            CartLine, QuotedLine, Quote, Settlement,
            QuoteReq, CheckoutLine, CheckoutReq, ReturnLine, ReturnReq,
            Period, DateRange, SalesSummary, PaymentMethodRow, StaffSales, CategorySales,
            TopProduct, SlowMover, StockSort, StockLevels, MovementTotals, VatDay, VatReport,
            ProfitLoss, DiscountsReturns, CashRegister, TrendPoint,
            CloseDay, MovementReport, Dashboard,
            PosDevice, RegisterDevice,
            SyncSale, SyncSaleItem, SyncMovement, SyncTransfer, SyncTransferItem, SyncStockTake,
            SyncStockTakeItem, PushResult, RejectedRecord, CatalogResponse,

            Customer, CustomerStatus, CrmLog, LogType, CreateCustomer, LogInteraction,
            CustomerPurchases,
            Quotation, QuotationStatus, QuotationWithLines, DocumentLine, CreateQuotation,
            QuotationStatusUpdate, ConvertQuotation,
            Invoice, InvoiceStatus, InvoiceWithLines, CreateInvoice, RecordPayment,
            DocumentLineInput, DocumentTotals, InvoiceTotals,
            SalesStats, PosTotals, TopCustomer,

            Account, AccountType, Industry, JournalEntry, LedgerLine, JournalEntryWithLines,
            CreateAccount, UpdateAccount, SetupChart, CreateJournalEntry, JournalLineInput,
            TrialBalance, TrialBalanceRow
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Login, registration and token refresh"),
        (name = "Employee", description = "Employee management APIs"),
        (name = "Department", description = "Departments and positions"),
        (name = "Leave", description = "Leave management APIs"),
        (name = "Attendance", description = "Attendance management APIs"),
        (name = "Payroll", description = "Payroll management APIs"),
        (name = "Shift", description = "Shift templates and rosters"),
        (name = "Performance", description = "Performance reviews"),
        (name = "Training", description = "Training programs and enrolment"),
        (name = "Benefit", description = "Employee benefits"),
        (name = "HR Reports", description = "HR analytics"),
        (name = "Location", description = "Stores and warehouses"),
        (name = "Product", description = "Catalog and per-location stock"),
        (name = "Stock Movement", description = "Manual stock movements"),
        (name = "Stock Transfer", description = "Inter-store transfers"),
        (name = "Stock Take", description = "Physical counts and adjustments"),
        (name = "POS", description = "Till checkout and returns"),
        (name = "POS Reports", description = "Sales, stock and cash reports"),
        (name = "Dashboard", description = "Revenue and stock at a glance"),
        (name = "POS Sync", description = "Offline till synchronisation"),
        (name = "Customer", description = "Customers and interaction logs"),
        (name = "Quotation", description = "Quotations"),
        (name = "Invoice", description = "Invoices and payments"),
        (name = "Sales", description = "Sales management stats"),
        (name = "Accounting", description = "Chart of accounts, journal entries, trial balance"),
    )
)]
pub struct ApiDoc;

/// Registers the `bearer_auth` scheme the paths refer to.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_lists_every_area_and_the_bearer_scheme() {
        let doc = ApiDoc::openapi();
        for path in [
            "/api/employee",
            "/api/stock-transfer/{transfer_id}/receive",
            "/api/pos/checkout",
            "/api/pos/sync/sales",
            "/api/invoice/{invoice_id}/payments",
            "/api/sales/stats",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
        let components = doc.components.unwrap();
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }
}
