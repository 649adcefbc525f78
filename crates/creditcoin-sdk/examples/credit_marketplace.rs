//! Credit marketplace walkthrough against an in-memory chain.
//!
//! Funds two development accounts, has the lender post an ask order, the
//! borrower accept it, and the borrower repay the resulting deal.
//!
//! Run with `RUST_LOG=debug` for the SDK's own logs.

use std::sync::Arc;

use anyhow::Context;
use creditcoin_sdk::{
    ClientConfig, CreditcoinClient, DealFilter, LoanTerms, Network, OrderFilter, OrderStatus,
    OrderType, SimulatedChain, SimulatedConnector,
};
use rust_decimal_macros::dec;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let chain = Arc::new(SimulatedChain::new());
    let connector = SimulatedConnector::new(chain.clone());
    let client = CreditcoinClient::connect(&connector, ClientConfig::for_network(Network::Local))
        .await
        .context("connecting to the simulated node")?;

    let lender = client.import_account_from_uri("//Alice")?;
    let borrower = client.import_account_from_uri("//Bob")?;
    chain.endow(&lender.address, dec!(10000))?;
    chain.endow(&borrower.address, dec!(2000))?;

    for account in [&lender, &borrower] {
        let balance = client.get_balance(account.address.as_str()).await?;
        println!("{}: {} CTC available", account.address, balance.available);
    }

    let market = client.credit_contracts();
    let terms = LoanTerms::new(dec!(1000), dec!(5), 90).with_collateral(dec!(1500));

    let receipt = market
        .create_ask_order(&lender, &terms, None, true)
        .await
        .context("creating ask order")?;
    println!(
        "Ask order included in block {:?}, fee {:?}",
        receipt.block_number, receipt.fee
    );

    let open = market
        .get_ask_orders(&OrderFilter::default().status(OrderStatus::Active))
        .await?;
    let order = open.first().context("ask order not found on chain")?;
    println!(
        "Open ask {} : {} CTC at {}% for {} days",
        order.order_id, order.terms.principal, order.terms.interest_rate, order.terms.duration_days
    );

    market
        .accept_offer(&borrower, &order.order_id, OrderType::Ask, true)
        .await
        .context("accepting ask order")?;

    let deals = market
        .get_credit_deals(&DealFilter::default().participant(borrower.address.clone()))
        .await?;
    let deal = deals.first().context("deal not created")?;
    println!("Deal {} owes {} CTC", deal.deal_id, deal.amount);

    if let Some(schedule) = market.repayment_schedule(&deal.deal_id).await? {
        println!(
            "Due at block {:?}: {} CTC ({:?})",
            schedule.due_block, schedule.total_due, schedule.status
        );
    }

    market
        .repay_loan(&borrower, &deal.deal_id, deal.outstanding(), true)
        .await
        .context("repaying loan")?;

    let settled = market
        .get_deal(&deal.deal_id)
        .await?
        .context("deal disappeared")?;
    println!("Deal {} is now {}", settled.deal_id, settled.status);

    let snapshot = market.fetch_market(None).await?;
    println!(
        "Market at block {}: {} asks, {} bids, {} deals",
        snapshot.block_number,
        snapshot.ask_orders.len(),
        snapshot.bid_orders.len(),
        snapshot.deals.len()
    );

    client.close().await?;
    Ok(())
}
