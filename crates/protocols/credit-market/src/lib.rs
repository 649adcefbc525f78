//! Creditcoin Credit Marketplace
//!
//! Lenders post ask orders, borrowers post bid orders, and accepting either
//! side creates a deal that the borrower repays over the loan term. Orders
//! and deals live in the `Credit` pallet's storage maps.

pub mod calculator;
pub mod constants;
pub mod fetch;
pub mod market;
pub mod state;
pub mod tx_builder;

pub use calculator::{collateral_ratio, repayment_schedule, simple_interest, total_repayment};
pub use constants::PALLET;
pub use fetch::fetch_market;
pub use market::CreditMarket;
pub use state::{
    Deal, DealFilter, DealStatus, LoanTerms, MarketSnapshot, Order, OrderFilter, OrderStatus,
    OrderType, RepaymentSchedule, RepaymentStatus,
};
pub use tx_builder::{build_accept_order, build_create_order, build_repay, CreateOrderRequest};
