pub mod db_utils;
pub mod ledger_db;
pub mod product_cache;
pub mod stock_db;
pub mod txn_filter;
pub mod username_cache;
