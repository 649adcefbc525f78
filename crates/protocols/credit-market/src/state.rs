//! Credit marketplace state types

use std::fmt;
use std::str::FromStr;

use creditcoin_core::{Address, BlockNumber, Error, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Side of the order book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    /// Lend offer
    Ask,
    /// Borrow request
    Bid,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ask => "ask",
            Self::Bid => "bid",
        }
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order lifecycle: `Active` then one terminal state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Active,
    Filled,
    Cancelled,
    Expired,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Filled => "filled",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Active)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "filled" => Ok(Self::Filled),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            "expired" => Ok(Self::Expired),
            other => Err(format!("unknown order status '{}'", other)),
        }
    }
}

/// Deal lifecycle: `Pending` then one terminal state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DealStatus {
    Pending,
    Completed,
    Disputed,
    Cancelled,
}

impl DealStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Disputed => "disputed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for DealStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DealStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "disputed" => Ok(Self::Disputed),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            other => Err(format!("unknown deal status '{}'", other)),
        }
    }
}

/// Loan terms shared by orders and deals
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanTerms {
    /// Amount lent, in whole tokens
    pub principal: Decimal,
    /// Annual percentage rate (5.0 = 5%)
    pub interest_rate: Decimal,
    pub duration_days: u32,
    pub collateral_required: bool,
    /// Present and positive when `collateral_required`
    pub collateral_amount: Option<Decimal>,
    pub grace_period_days: Option<u32>,
    /// Percentage of the outstanding amount charged once overdue
    pub late_fee_percent: Option<Decimal>,
}

impl LoanTerms {
    /// Uncollateralized terms
    pub fn new(principal: Decimal, interest_rate: Decimal, duration_days: u32) -> Self {
        Self {
            principal,
            interest_rate,
            duration_days,
            collateral_required: false,
            collateral_amount: None,
            grace_period_days: None,
            late_fee_percent: None,
        }
    }

    pub fn with_collateral(mut self, amount: Decimal) -> Self {
        self.collateral_required = true;
        self.collateral_amount = Some(amount);
        self
    }

    pub fn with_grace_period(mut self, days: u32) -> Self {
        self.grace_period_days = Some(days);
        self
    }

    pub fn with_late_fee(mut self, percent: Decimal) -> Self {
        self.late_fee_percent = Some(percent);
        self
    }

    /// Collateral that actually applies (None unless required)
    pub fn effective_collateral(&self) -> Option<Decimal> {
        if self.collateral_required {
            self.collateral_amount
        } else {
            None
        }
    }

    /// Check the terms before they are sent to the chain
    pub fn validate(&self) -> Result<()> {
        if self.principal <= Decimal::ZERO {
            return Err(Error::invalid_amount(format!(
                "principal must be positive, got {}",
                self.principal
            )));
        }
        if self.interest_rate.is_sign_negative() && !self.interest_rate.is_zero() {
            return Err(Error::invalid_amount(format!(
                "interest rate must not be negative, got {}",
                self.interest_rate
            )));
        }
        if self.duration_days == 0 {
            return Err(Error::invalid_terms("duration must be at least one day"));
        }
        if self.collateral_required {
            match self.collateral_amount {
                None => {
                    return Err(Error::invalid_terms(
                        "collateral amount is required when collateral is required",
                    ))
                }
                Some(amount) if amount <= Decimal::ZERO => {
                    return Err(Error::invalid_amount(format!(
                        "collateral amount must be positive, got {}",
                        amount
                    )))
                }
                Some(_) => {}
            }
        }
        if let Some(fee) = self.late_fee_percent {
            if fee.is_sign_negative() && !fee.is_zero() {
                return Err(Error::invalid_amount(format!(
                    "late fee must not be negative, got {}",
                    fee
                )));
            }
        }
        Ok(())
    }
}

/// An ask (lend) or bid (borrow) order as stored on chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: String,
    pub order_type: OrderType,
    /// Lender for asks, borrower for bids
    pub owner: Address,
    pub terms: LoanTerms,
    /// Absolute block height after which the order lapses
    pub expiry_block: BlockNumber,
    pub status: OrderStatus,
    pub created_block: BlockNumber,
    pub filled_amount: Decimal,
}

impl Order {
    pub fn lender_address(&self) -> Option<&Address> {
        match self.order_type {
            OrderType::Ask => Some(&self.owner),
            OrderType::Bid => None,
        }
    }

    pub fn borrower_address(&self) -> Option<&Address> {
        match self.order_type {
            OrderType::Ask => None,
            OrderType::Bid => Some(&self.owner),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == OrderStatus::Active
    }

    /// Active on chain but past expiry at `block`
    pub fn is_stale_at(&self, block: BlockNumber) -> bool {
        self.is_active() && self.expiry_block < block
    }

    pub fn remaining_amount(&self) -> Decimal {
        (self.terms.principal - self.filled_amount).max(Decimal::ZERO)
    }
}

/// A matched loan between one ask and one bid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deal {
    pub deal_id: String,
    pub ask_order_id: String,
    pub bid_order_id: String,
    pub lender: Address,
    pub borrower: Address,
    /// Terms fixed when the deal was created
    pub terms: LoanTerms,
    /// Total owed: principal plus interest
    pub amount: Decimal,
    pub status: DealStatus,
    pub created_block: BlockNumber,
    pub start_block: Option<BlockNumber>,
    pub end_block: Option<BlockNumber>,
    pub repaid_amount: Decimal,
}

impl Deal {
    pub fn outstanding(&self) -> Decimal {
        (self.amount - self.repaid_amount).max(Decimal::ZERO)
    }

    pub fn is_fully_repaid(&self) -> bool {
        self.repaid_amount >= self.amount
    }

    /// True when `address` is the lender or the borrower
    pub fn involves(&self, address: &Address) -> bool {
        &self.lender == address || &self.borrower == address
    }

    pub fn references_order(&self, order_id: &str) -> bool {
        self.ask_order_id == order_id || self.bid_order_id == order_id
    }
}

/// Client-side order filter; unset fields match everything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderFilter {
    pub owner: Option<Address>,
    pub status: Option<OrderStatus>,
}

impl OrderFilter {
    pub fn owner(mut self, owner: Address) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn matches(&self, order: &Order) -> bool {
        if let Some(owner) = &self.owner {
            if &order.owner != owner {
                return false;
            }
        }
        self.status.map_or(true, |s| order.status == s)
    }
}

/// Client-side deal filter; `participant` matches lender or borrower
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DealFilter {
    pub participant: Option<Address>,
    pub status: Option<DealStatus>,
}

impl DealFilter {
    pub fn participant(mut self, participant: Address) -> Self {
        self.participant = Some(participant);
        self
    }

    pub fn status(mut self, status: DealStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn matches(&self, deal: &Deal) -> bool {
        if let Some(participant) = &self.participant {
            if !deal.involves(participant) {
                return false;
            }
        }
        self.status.map_or(true, |s| deal.status == s)
    }
}

/// Repayment state of a deal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepaymentStatus {
    Pending,
    Paid,
    Overdue,
}

/// What a borrower owes on a deal and by when
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepaymentSchedule {
    pub deal_id: String,
    pub principal: Decimal,
    pub interest: Decimal,
    /// Outstanding amount plus any late fee
    pub total_due: Decimal,
    pub due_block: Option<BlockNumber>,
    pub status: RepaymentStatus,
}

/// Marketplace state fetched in one pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub ask_orders: Vec<Order>,
    pub bid_orders: Vec<Order>,
    pub deals: Vec<Deal>,
    pub block_number: BlockNumber,
}
