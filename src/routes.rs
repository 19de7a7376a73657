use crate::{
    api::{
        accounting, attendance, benefit, customer, department, employee, hr_report, invoice,
        leave_request, location, payroll, performance, pos, pos_report, pos_sync, product,
        quotation, sales_report, shift, stock_movement, stock_take, stock_transfer, training,
    },
    auth::{handlers, middleware::auth_middleware},
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfig, GovernorConfigBuilder, PeerIpKeyExtractor,
    governor::middleware::NoOpMiddleware,
};
use actix_web::{HttpResponse, middleware::from_fn, web};
use serde_json::json;
use std::sync::Arc;

/// Liveness check, also pinged by the till agent before each sync pass.
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}

// Helper to build per-route limiter
fn build_limiter(requests_per_min: u32) -> Governor<PeerIpKeyExtractor, NoOpMiddleware> {
    let requests_per_min = requests_per_min.max(1);
    let per_ms = (60_000 / requests_per_min as u64).max(1);
    let cfg = GovernorConfigBuilder::default()
        .per_millisecond(per_ms)
        .burst_size(requests_per_min)
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .unwrap_or_else(GovernorConfig::default);
    Governor::new(&cfg)
}

pub fn configure(cfg: &mut web::ServiceConfig, config: Config) {
    let login_limiter = Arc::new(build_limiter(config.rate_login_per_min));
    let register_limiter = Arc::new(build_limiter(config.rate_register_per_min));
    let refresh_limiter = Arc::new(build_limiter(config.rate_refresh_per_min));
    let protected_limiter = Arc::new(build_limiter(config.rate_protected_per_min));

    // Public routes
    cfg.service(web::resource("/health").route(web::get().to(health)));
    cfg.service(
        web::scope("/auth")
            .service(
                web::resource("/login")
                    .wrap(login_limiter.clone())
                    .route(web::post().to(handlers::login)),
            )
            .service(
                web::resource("/register")
                    .wrap(register_limiter)
                    .route(web::post().to(handlers::register)),
            )
            .service(
                web::resource("/refresh")
                    .wrap(refresh_limiter)
                    .route(web::post().to(handlers::refresh_token)),
            )
            .service(
                web::resource("/logout")
                    .wrap(login_limiter)
                    .route(web::post().to(handlers::logout)),
            ),
    );

    // Protected routes. Static segments are registered before `{id}` so
    // `/leave/stats` never gets parsed as a leave id.
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware)) // authentication
            .wrap(protected_limiter) // rate limiting
            .configure(hr_routes)
            .configure(inventory_routes)
            .configure(pos_routes)
            .configure(sales_routes)
            .configure(accounting_routes),
    );
}

fn hr_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/employee")
            .service(
                web::resource("")
                    .route(web::post().to(employee::create_employee))
                    .route(web::get().to(employee::list_employees)),
            )
            .service(
                web::resource("/{id}")
                    .route(web::put().to(employee::update_employee))
                    .route(web::get().to(employee::get_employee))
                    .route(web::delete().to(employee::delete_employee)),
            ),
    )
    .service(
        web::scope("/department")
            .service(
                web::resource("")
                    .route(web::post().to(department::create_department))
                    .route(web::get().to(department::list_departments)),
            )
            .service(
                web::resource("/{id}")
                    .route(web::get().to(department::get_department))
                    .route(web::put().to(department::update_department))
                    .route(web::delete().to(department::delete_department)),
            ),
    )
    .service(
        web::scope("/position")
            .service(
                web::resource("")
                    .route(web::post().to(department::create_position))
                    .route(web::get().to(department::list_positions)),
            )
            .service(
                web::resource("/{id}")
                    .route(web::get().to(department::get_position))
                    .route(web::put().to(department::update_position))
                    .route(web::delete().to(department::delete_position)),
            ),
    )
    .service(
        web::scope("/leave")
            .service(
                web::resource("")
                    .route(web::get().to(leave_request::leave_list))
                    .route(web::post().to(leave_request::create_leave)),
            )
            .service(web::resource("/stats").route(web::get().to(leave_request::get_leave_stats)))
            .service(
                web::resource("/balances").route(web::get().to(leave_request::get_leave_balances)),
            )
            .service(web::resource("/{id}").route(web::get().to(leave_request::get_leave)))
            .service(
                web::resource("/{id}/approve").route(web::put().to(leave_request::approve_leave)),
            )
            .service(
                web::resource("/{id}/reject").route(web::put().to(leave_request::reject_leave)),
            )
            .service(
                web::resource("/{id}/cancel").route(web::put().to(leave_request::cancel_leave)),
            ),
    )
    .service(
        web::scope("/attendance")
            .service(
                web::resource("")
                    .route(web::post().to(attendance::record_attendance))
                    .route(web::get().to(attendance::list_attendance)),
            )
            .service(web::resource("/clock-in").route(web::post().to(attendance::clock_in)))
            .service(web::resource("/clock-out").route(web::post().to(attendance::clock_out)))
            .service(
                web::resource("/summary").route(web::get().to(attendance::attendance_summary)),
            ),
    )
    .service(
        web::scope("/payroll")
            .service(
                web::resource("")
                    .route(web::post().to(payroll::generate_payslip))
                    .route(web::get().to(payroll::list_payrolls)),
            )
            .service(web::resource("/calculate").route(web::get().to(payroll::calculate_payroll)))
            .service(web::resource("/summary").route(web::get().to(payroll::payroll_summary)))
            .service(
                web::resource("/{id}")
                    .route(web::get().to(payroll::get_payroll))
                    .route(web::put().to(payroll::update_payroll)),
            )
            .service(web::resource("/{id}/pay").route(web::put().to(payroll::mark_paid))),
    )
    .service(
        web::scope("/shift")
            .service(
                web::resource("")
                    .route(web::post().to(shift::create_shift))
                    .route(web::get().to(shift::list_shifts)),
            )
            .service(web::resource("/assign").route(web::post().to(shift::assign_shift)))
            .service(web::resource("/schedule").route(web::get().to(shift::employee_schedule)))
            .service(web::resource("/on-shift").route(web::get().to(shift::staff_on_shift))),
    )
    .service(
        web::scope("/performance")
            .service(
                web::resource("")
                    .route(web::post().to(performance::create_review))
                    .route(web::get().to(performance::list_reviews)),
            )
            .service(
                web::resource("/stats").route(web::get().to(performance::get_performance_stats)),
            )
            .service(web::resource("/{id}").route(web::get().to(performance::get_review)))
            .service(web::resource("/{id}/submit").route(web::put().to(performance::submit_review)))
            .service(
                web::resource("/{id}/acknowledge")
                    .route(web::put().to(performance::acknowledge_review)),
            ),
    )
    .service(
        web::scope("/training")
            .service(
                web::resource("")
                    .route(web::post().to(training::create_training))
                    .route(web::get().to(training::list_trainings)),
            )
            .service(web::resource("/stats").route(web::get().to(training::get_training_stats)))
            .service(web::resource("/{id}/enroll").route(web::post().to(training::enroll))),
    )
    .service(
        web::scope("/benefit")
            .service(
                web::resource("")
                    .route(web::post().to(benefit::create_benefit))
                    .route(web::get().to(benefit::list_benefits)),
            )
            .service(web::resource("/stats").route(web::get().to(benefit::get_benefit_stats))),
    )
    .service(
        web::scope("/hr/reports")
            .service(web::resource("/overview").route(web::get().to(hr_report::overview)))
            .service(web::resource("/headcount").route(web::get().to(hr_report::headcount)))
            .service(web::resource("/payroll").route(web::get().to(hr_report::payroll)))
            .service(web::resource("/attendance").route(web::get().to(hr_report::attendance))),
    );
}

fn inventory_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/location")
            .service(
                web::resource("")
                    .route(web::post().to(location::create_location))
                    .route(web::get().to(location::list_locations)),
            )
            .service(
                web::resource("/{id}")
                    .route(web::get().to(location::get_location))
                    .route(web::put().to(location::update_location)),
            )
            .service(
                web::resource("/{id}/deactivate")
                    .route(web::put().to(location::deactivate_location)),
            ),
    )
    .service(
        web::scope("/product")
            .service(
                web::resource("")
                    .route(web::post().to(product::create_product))
                    .route(web::get().to(product::list_products)),
            )
            .service(
                web::resource("/category")
                    .route(web::post().to(product::create_category))
                    .route(web::get().to(product::list_categories)),
            )
            .service(web::resource("/lookup").route(web::get().to(product::lookup)))
            .service(
                web::resource("/{id}")
                    .route(web::get().to(product::get_product))
                    .route(web::put().to(product::update_product)),
            )
            .service(web::resource("/{id}/stock").route(web::get().to(product::stock_by_location))),
    )
    .service(
        web::resource("/stock-movement")
            .route(web::post().to(stock_movement::create_movement))
            .route(web::get().to(stock_movement::list_movements)),
    )
    .service(
        web::scope("/stock-transfer")
            .service(
                web::resource("")
                    .route(web::post().to(stock_transfer::create_transfer))
                    .route(web::get().to(stock_transfer::list_transfers)),
            )
            .service(web::resource("/{id}").route(web::get().to(stock_transfer::get_transfer)))
            .service(
                web::resource("/{id}/submit").route(web::put().to(stock_transfer::submit_transfer)),
            )
            .service(
                web::resource("/{id}/dispatch")
                    .route(web::put().to(stock_transfer::dispatch_transfer)),
            )
            .service(
                web::resource("/{id}/receive")
                    .route(web::put().to(stock_transfer::receive_transfer)),
            )
            .service(
                web::resource("/{id}/cancel").route(web::put().to(stock_transfer::cancel_transfer)),
            ),
    )
    .service(
        web::scope("/stock-take")
            .service(
                web::resource("")
                    .route(web::post().to(stock_take::start_stock_take))
                    .route(web::get().to(stock_take::list_stock_takes)),
            )
            .service(web::resource("/{id}").route(web::get().to(stock_take::get_stock_take)))
            .service(web::resource("/{id}/counts").route(web::put().to(stock_take::record_counts)))
            .service(web::resource("/{id}/summary").route(web::get().to(stock_take::get_summary)))
            .service(
                web::resource("/{id}/complete")
                    .route(web::put().to(stock_take::complete_stock_take)),
            ),
    );
}

fn pos_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/dashboard").route(web::get().to(pos_report::dashboard)))
        .service(
            web::scope("/pos")
                .service(web::resource("/quote").route(web::post().to(pos::quote_cart)))
                .service(web::resource("/checkout").route(web::post().to(pos::checkout)))
                .service(web::resource("/sales").route(web::get().to(pos::list_sales)))
                .service(web::resource("/sales/{id}").route(web::get().to(pos::get_sale)))
                .service(web::resource("/sales/{id}/return").route(web::post().to(pos::return_sale)))
                .service(
                    web::scope("/reports")
                        .route("/daily-sales", web::get().to(pos_report::daily_sales))
                        .route("/payment-methods", web::get().to(pos_report::payment_methods_report))
                        .route("/staff", web::get().to(pos_report::staff_report))
                        .route("/categories", web::get().to(pos_report::category_report))
                        .route("/top-products", web::get().to(pos_report::top_products_report))
                        .route("/slow-moving", web::get().to(pos_report::slow_moving_report))
                        .route("/low-stock", web::get().to(pos_report::low_stock_report))
                        .route("/stock-levels", web::get().to(pos_report::stock_levels_report))
                        .route("/stock-movements", web::get().to(pos_report::movements_report))
                        .route("/vat", web::get().to(pos_report::vat))
                        .route("/profit-loss", web::get().to(pos_report::profit_loss_report))
                        .route(
                            "/discounts-returns",
                            web::get().to(pos_report::discounts_returns_report),
                        )
                        .route("/cash-register", web::get().to(pos_report::cash_register_report))
                        .route("/close-day", web::post().to(pos_report::close_day))
                        .route("/transactions", web::get().to(pos_report::transactions)),
                )
                .service(
                    web::scope("/sync")
                        .route("/devices", web::post().to(pos_sync::register_device))
                        .route("/sales", web::post().to(pos_sync::push_sales))
                        .route("/movements", web::post().to(pos_sync::push_movements))
                        .route("/transfers", web::post().to(pos_sync::push_transfers))
                        .route("/stock-takes", web::post().to(pos_sync::push_stock_takes))
                        .route("/catalog", web::get().to(pos_sync::pull_catalog)),
                ),
        );
}

fn sales_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/customer")
            .service(
                web::resource("")
                    .route(web::post().to(customer::create_customer))
                    .route(web::get().to(customer::list_customers)),
            )
            .service(
                web::resource("/{id}")
                    .route(web::get().to(customer::get_customer))
                    .route(web::put().to(customer::update_customer))
                    .route(web::delete().to(customer::delete_customer)),
            )
            .service(
                web::resource("/{id}/logs")
                    .route(web::post().to(customer::log_interaction))
                    .route(web::get().to(customer::customer_logs)),
            )
            .service(
                web::resource("/{id}/purchases").route(web::get().to(customer::customer_purchases)),
            ),
    )
    .service(
        web::scope("/quotation")
            .service(
                web::resource("")
                    .route(web::post().to(quotation::create_quotation))
                    .route(web::get().to(quotation::list_quotations)),
            )
            .service(web::resource("/{id}").route(web::get().to(quotation::get_quotation)))
            .service(
                web::resource("/{id}/status")
                    .route(web::put().to(quotation::update_quotation_status)),
            )
            .service(
                web::resource("/{id}/convert").route(web::post().to(quotation::convert_to_invoice)),
            ),
    )
    .service(
        web::scope("/invoice")
            .service(
                web::resource("")
                    .route(web::post().to(invoice::create_invoice))
                    .route(web::get().to(invoice::list_invoices)),
            )
            .service(web::resource("/mark-overdue").route(web::post().to(invoice::mark_overdue)))
            .service(web::resource("/{id}").route(web::get().to(invoice::get_invoice)))
            .service(web::resource("/{id}/send").route(web::put().to(invoice::send_invoice)))
            .service(web::resource("/{id}/cancel").route(web::put().to(invoice::cancel_invoice)))
            .service(
                web::resource("/{id}/payments").route(web::post().to(invoice::record_payment)),
            ),
    )
    .service(web::resource("/sales/stats").route(web::get().to(sales_report::sales_stats)));
}

fn accounting_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/accounting")
            .service(
                web::resource("/accounts")
                    .route(web::post().to(accounting::create_account))
                    .route(web::get().to(accounting::list_accounts)),
            )
            .service(
                web::resource("/accounts/setup").route(web::post().to(accounting::setup_chart)),
            )
            .service(
                web::resource("/accounts/trial-balance")
                    .route(web::get().to(accounting::get_trial_balance)),
            )
            .service(
                web::resource("/accounts/{id}")
                    .route(web::get().to(accounting::get_account))
                    .route(web::put().to(accounting::update_account)),
            )
            .service(
                web::resource("/entries")
                    .route(web::post().to(accounting::create_entry))
                    .route(web::get().to(accounting::list_entries)),
            )
            .service(web::resource("/entries/{id}").route(web::get().to(accounting::get_entry))),
    );
}

// LOGIN
//  ├─ access_token (15 min)
//  └─ refresh_token (7 days)

// API REQUEST
//  └─ Authorization: Bearer access_token

// ACCESS EXPIRED
//  └─ POST /refresh with refresh_token
//       └─ returns new access_token

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{App, http::StatusCode, test};

    #[actix_web::test]
    async fn health_is_public() {
        let config = Config::for_tests();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(config.clone()))
                .configure(|cfg| configure(cfg, config)),
        )
        .await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "ok");
    }

    #[actix_web::test]
    async fn api_scope_requires_a_token() {
        let config = Config::for_tests();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(config.clone()))
                .configure(|cfg| configure(cfg, config)),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/api/employee")
            .peer_addr("127.0.0.1:40000".parse().unwrap())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn ledger_routes_require_a_token() {
        let config = Config::for_tests();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(config.clone()))
                .configure(|cfg| configure(cfg, config)),
        )
        .await;

        for uri in ["/api/accounting/accounts/trial-balance", "/api/accounting/entries"] {
            let req = test::TestRequest::get()
                .uri(uri)
                .peer_addr("127.0.0.1:40001".parse().unwrap())
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "{uri}");
        }
    }
}
