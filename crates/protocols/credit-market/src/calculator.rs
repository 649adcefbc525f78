//! Loan calculation utilities

use creditcoin_core::constants::BLOCKS_PER_DAY;
use creditcoin_core::{BlockNumber, Error, Result};
use rust_decimal::Decimal;

use crate::constants::DAYS_PER_YEAR;
use crate::state::{Deal, DealStatus, LoanTerms, RepaymentSchedule, RepaymentStatus};

/// Simple interest: `principal * rate% * days / 365`
pub fn simple_interest(principal: Decimal, annual_rate: Decimal, days: u32) -> Result<Decimal> {
    let denominator = Decimal::from(100u32 * DAYS_PER_YEAR);
    principal
        .checked_mul(annual_rate)
        .and_then(|v| v.checked_mul(Decimal::from(days)))
        .and_then(|v| v.checked_div(denominator))
        .ok_or_else(|| Error::invalid_amount("interest computation overflowed"))
}

/// Principal plus simple interest over the full term
pub fn total_repayment(terms: &LoanTerms) -> Result<Decimal> {
    let interest = simple_interest(terms.principal, terms.interest_rate, terms.duration_days)?;
    terms
        .principal
        .checked_add(interest)
        .ok_or_else(|| Error::invalid_amount("repayment computation overflowed"))
}

/// Late fee on `outstanding`; zero when the terms carry none
pub fn late_fee(terms: &LoanTerms, outstanding: Decimal) -> Result<Decimal> {
    match terms.late_fee_percent {
        Some(percent) => percent
            .checked_div(Decimal::ONE_HUNDRED)
            .and_then(|rate| outstanding.checked_mul(rate))
            .ok_or_else(|| Error::invalid_amount("late fee computation overflowed")),
        None => Ok(Decimal::ZERO),
    }
}

/// Loan term in blocks at the target block time
pub fn duration_blocks(days: u32) -> BlockNumber {
    days as BlockNumber * BLOCKS_PER_DAY
}

/// Collateral as a percentage of principal (150 = 150%)
pub fn collateral_ratio(terms: &LoanTerms) -> Option<Decimal> {
    let collateral = terms.effective_collateral()?;
    if terms.principal.is_zero() {
        return None;
    }
    collateral
        .checked_mul(Decimal::ONE_HUNDRED)
        .and_then(|v| v.checked_div(terms.principal))
}

/// Block at which repayment is due: the chain's end block, or start + term.
///
/// `None` when neither is known or the term runs past the last block number.
pub fn due_block(deal: &Deal) -> Option<BlockNumber> {
    deal.end_block.or_else(|| {
        deal.start_block
            .and_then(|start| start.checked_add(duration_blocks(deal.terms.duration_days)))
    })
}

/// Repayment position of `deal` as of `current_block`
pub fn repayment_schedule(deal: &Deal, current_block: BlockNumber) -> Result<RepaymentSchedule> {
    let principal = deal.terms.principal;
    let interest = if deal.amount >= principal {
        deal.amount - principal
    } else {
        simple_interest(
            principal,
            deal.terms.interest_rate,
            deal.terms.duration_days,
        )?
    };

    let due = due_block(deal);
    let grace = deal
        .terms
        .grace_period_days
        .map(duration_blocks)
        .unwrap_or(0);

    let status = if deal.is_fully_repaid() || deal.status == DealStatus::Completed {
        RepaymentStatus::Paid
    } else if due.is_some_and(|d| current_block > d.saturating_add(grace)) {
        RepaymentStatus::Overdue
    } else {
        RepaymentStatus::Pending
    };

    let outstanding = deal.outstanding();
    let total_due = match status {
        RepaymentStatus::Overdue => outstanding
            .checked_add(late_fee(&deal.terms, outstanding)?)
            .ok_or_else(|| Error::invalid_amount("amount due overflowed"))?,
        RepaymentStatus::Paid => Decimal::ZERO,
        RepaymentStatus::Pending => outstanding,
    };

    Ok(RepaymentSchedule {
        deal_id: deal.deal_id.clone(),
        principal,
        interest,
        total_due,
        due_block: due,
        status,
    })
}
