//! Credit marketplace service
//!
//! [`CreditMarket`] pairs the read path in [`crate::fetch`] with the call
//! builders in [`crate::tx_builder`], submitting every write through the
//! shared chain client.

use chain_client::ChainClient;
use creditcoin_core::{Address, BlockNumber, Keypair, Result, TransactionReceipt};
use rust_decimal::Decimal;

use crate::calculator;
use crate::constants::{DEFAULT_EXPIRY_BLOCKS, PALLET};
use crate::fetch;
use crate::state::{
    Deal, DealFilter, LoanTerms, MarketSnapshot, Order, OrderFilter, OrderType,
    RepaymentSchedule,
};
use crate::tx_builder::{self, CallRequest, CreateOrderRequest};

/// Ask orders, bid orders and deals on the `Credit` pallet
#[derive(Clone)]
pub struct CreditMarket {
    client: ChainClient,
    default_expiry_blocks: BlockNumber,
}

impl CreditMarket {
    pub fn new(client: ChainClient) -> Self {
        Self {
            client,
            default_expiry_blocks: DEFAULT_EXPIRY_BLOCKS,
        }
    }

    /// Order lifetime used when a create call passes no expiry
    pub fn with_default_expiry(mut self, blocks: BlockNumber) -> Self {
        self.default_expiry_blocks = blocks;
        self
    }

    pub fn client(&self) -> &ChainClient {
        &self.client
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Offer to lend on `terms`
    pub async fn create_ask_order(
        &self,
        keypair: &Keypair,
        terms: &LoanTerms,
        expiry_in_blocks: Option<BlockNumber>,
        wait_for_inclusion: bool,
    ) -> Result<TransactionReceipt> {
        self.create_order(
            keypair,
            OrderType::Ask,
            terms,
            expiry_in_blocks,
            wait_for_inclusion,
        )
        .await
    }

    /// Request to borrow on `terms`
    pub async fn create_bid_order(
        &self,
        keypair: &Keypair,
        terms: &LoanTerms,
        expiry_in_blocks: Option<BlockNumber>,
        wait_for_inclusion: bool,
    ) -> Result<TransactionReceipt> {
        self.create_order(
            keypair,
            OrderType::Bid,
            terms,
            expiry_in_blocks,
            wait_for_inclusion,
        )
        .await
    }

    async fn create_order(
        &self,
        keypair: &Keypair,
        order_type: OrderType,
        terms: &LoanTerms,
        expiry_in_blocks: Option<BlockNumber>,
        wait_for_inclusion: bool,
    ) -> Result<TransactionReceipt> {
        let request = CreateOrderRequest {
            order_type,
            terms: terms.clone(),
            expiry_in_blocks: expiry_in_blocks.unwrap_or(self.default_expiry_blocks),
        };
        let call = tx_builder::build_create_order(&request)?;

        tracing::info!(
            order_type = %order_type,
            owner = %keypair.address,
            principal = %terms.principal,
            rate = %terms.interest_rate,
            days = terms.duration_days,
            "Creating order"
        );

        self.submit(call, keypair, wait_for_inclusion).await
    }

    /// Accept an existing order; the signer takes the opposite side
    pub async fn accept_offer(
        &self,
        keypair: &Keypair,
        order_id: &str,
        order_type: OrderType,
        wait_for_inclusion: bool,
    ) -> Result<TransactionReceipt> {
        let call = tx_builder::build_accept_order(order_id, order_type)?;

        tracing::info!(
            order_id = order_id,
            order_type = %order_type,
            accepted_by = %keypair.address,
            "Accepting order"
        );

        self.submit(call, keypair, wait_for_inclusion).await
    }

    /// Repay `amount` tokens toward a deal
    pub async fn repay_loan(
        &self,
        keypair: &Keypair,
        deal_id: &str,
        amount: Decimal,
        wait_for_inclusion: bool,
    ) -> Result<TransactionReceipt> {
        let call = tx_builder::build_repay(deal_id, amount)?;

        tracing::info!(
            deal_id = deal_id,
            amount = %amount,
            borrower = %keypair.address,
            "Repaying loan"
        );

        self.submit(call, keypair, wait_for_inclusion).await
    }

    async fn submit(
        &self,
        call: CallRequest,
        keypair: &Keypair,
        wait_for_inclusion: bool,
    ) -> Result<TransactionReceipt> {
        self.client
            .submit_call(
                PALLET,
                call.function,
                call.params,
                keypair,
                wait_for_inclusion,
            )
            .await
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub async fn get_ask_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>> {
        fetch::list_ask_orders(&self.client, filter).await
    }

    pub async fn get_bid_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>> {
        fetch::list_bid_orders(&self.client, filter).await
    }

    pub async fn get_credit_deals(&self, filter: &DealFilter) -> Result<Vec<Deal>> {
        fetch::list_deals(&self.client, filter).await
    }

    pub async fn get_ask_order(&self, order_id: &str) -> Result<Option<Order>> {
        fetch::get_ask_order(&self.client, order_id).await
    }

    pub async fn get_bid_order(&self, order_id: &str) -> Result<Option<Order>> {
        fetch::get_bid_order(&self.client, order_id).await
    }

    pub async fn get_deal(&self, deal_id: &str) -> Result<Option<Deal>> {
        fetch::get_deal(&self.client, deal_id).await
    }

    pub async fn deals_for_order(&self, order_id: &str) -> Result<Vec<Deal>> {
        fetch::deals_for_order(&self.client, order_id).await
    }

    pub async fn fetch_market(&self, user_address: Option<&Address>) -> Result<MarketSnapshot> {
        fetch::fetch_market(&self.client, user_address).await
    }

    /// Repayment position of a deal at the current best block
    pub async fn repayment_schedule(&self, deal_id: &str) -> Result<Option<RepaymentSchedule>> {
        let Some(deal) = self.get_deal(deal_id).await? else {
            return Ok(None);
        };
        let current = self.client.current_block_number().await?;
        calculator::repayment_schedule(&deal, current).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::state::{DealStatus, OrderStatus, RepaymentStatus};
    use chain_client::{KeyBackend, SimulatedChain, Sr25519Backend};
    use creditcoin_core::{AddressFormat, Error, NodeConfig, ReceiptStatus, TxError};
    use rust_decimal_macros::dec;

    struct Fixture {
        chain: Arc<SimulatedChain>,
        market: CreditMarket,
        alice: Keypair,
        bob: Keypair,
    }

    fn fixture() -> Fixture {
        let chain = Arc::new(SimulatedChain::new());
        let client = ChainClient::new(chain.clone(), NodeConfig::new("ws://127.0.0.1:9944"));
        let alice = Sr25519Backend
            .derive_from_uri("//Alice", AddressFormat::CREDITCOIN)
            .unwrap();
        let bob = Sr25519Backend
            .derive_from_uri("//Bob", AddressFormat::CREDITCOIN)
            .unwrap();
        chain.endow(&alice.address, dec!(5000)).unwrap();
        chain.endow(&bob.address, dec!(5000)).unwrap();
        Fixture {
            chain,
            market: CreditMarket::new(client),
            alice,
            bob,
        }
    }

    #[tokio::test]
    async fn test_lend_borrow_repay_lifecycle() {
        let f = fixture();
        let terms = LoanTerms::new(dec!(1000), dec!(5), 90);

        let receipt = f
            .market
            .create_ask_order(&f.alice, &terms, None, true)
            .await
            .unwrap();
        assert_eq!(receipt.status, ReceiptStatus::Success);
        assert!(receipt.find_event("Credit", "AskOrderAdded").is_some());

        let asks = f
            .market
            .get_ask_orders(
                &OrderFilter::default()
                    .owner(f.alice.address.clone())
                    .status(OrderStatus::Active),
            )
            .await
            .unwrap();
        assert_eq!(asks.len(), 1);
        assert!(f
            .market
            .get_ask_orders(&OrderFilter::default().owner(f.bob.address.clone()))
            .await
            .unwrap()
            .is_empty());
        let ask = &asks[0];
        assert_eq!(ask.owner, f.alice.address);
        assert_eq!(ask.terms, terms);
        assert_eq!(ask.expiry_block, ask.created_block + DEFAULT_EXPIRY_BLOCKS);

        f.market
            .accept_offer(&f.bob, &ask.order_id, OrderType::Ask, true)
            .await
            .unwrap();

        let ask = f.market.get_ask_order(&ask.order_id).await.unwrap().unwrap();
        assert_eq!(ask.status, OrderStatus::Filled);
        assert_eq!(ask.filled_amount, dec!(1000));

        let deals = f.market.deals_for_order(&ask.order_id).await.unwrap();
        assert_eq!(deals.len(), 1);
        let deal = &deals[0];
        assert_eq!(deal.lender, f.alice.address);
        assert_eq!(deal.borrower, f.bob.address);
        assert_eq!(deal.status, DealStatus::Pending);

        let expected = calculator::total_repayment(&terms).unwrap();
        assert!((deal.amount - expected).abs() <= dec!(0.000000000000000001));

        // the counter bid exists and is already filled
        let bid = f
            .market
            .get_bid_order(&deal.bid_order_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(bid.status, OrderStatus::Filled);
        assert_eq!(bid.owner, f.bob.address);

        let schedule = f.market.repayment_schedule(&deal.deal_id).await.unwrap().unwrap();
        assert_eq!(schedule.status, RepaymentStatus::Pending);
        assert_eq!(schedule.total_due, deal.amount);

        f.market
            .repay_loan(&f.bob, &deal.deal_id, dec!(500), true)
            .await
            .unwrap();
        let partial = f.market.get_deal(&deal.deal_id).await.unwrap().unwrap();
        assert_eq!(partial.repaid_amount, dec!(500));
        assert_eq!(partial.status, DealStatus::Pending);

        f.market
            .repay_loan(&f.bob, &deal.deal_id, partial.outstanding(), true)
            .await
            .unwrap();
        let done = f.market.get_deal(&deal.deal_id).await.unwrap().unwrap();
        assert_eq!(done.status, DealStatus::Completed);
        assert!(done.is_fully_repaid());

        let schedule = f.market.repayment_schedule(&deal.deal_id).await.unwrap().unwrap();
        assert_eq!(schedule.status, RepaymentStatus::Paid);
    }

    #[tokio::test]
    async fn test_accept_bid_makes_signer_lender() {
        let f = fixture();
        let terms = LoanTerms::new(dec!(100), dec!(10), 30).with_collateral(dec!(150));

        f.market
            .create_bid_order(&f.bob, &terms, Some(50), true)
            .await
            .unwrap();
        let bids = f.market.get_bid_orders(&OrderFilter::default()).await.unwrap();
        let bid = &bids[0];
        assert_eq!(bid.terms.collateral_amount, Some(dec!(150)));

        f.market
            .accept_offer(&f.alice, &bid.order_id, OrderType::Bid, true)
            .await
            .unwrap();

        let deals = f
            .market
            .get_credit_deals(&DealFilter::default().participant(f.alice.address.clone()))
            .await
            .unwrap();
        assert_eq!(deals.len(), 1);
        assert_eq!(deals[0].lender, f.alice.address);
        assert_eq!(deals[0].bid_order_id, bid.order_id);

        // collateral moved to reserved
        let (_, reserved) = f.chain.balance_of(&f.bob.address);
        assert_eq!(reserved, 150 * 10u128.pow(18));
    }

    #[tokio::test]
    async fn test_accepting_filled_order_surfaces_chain_error() {
        let f = fixture();
        let terms = LoanTerms::new(dec!(10), dec!(1), 7);
        f.market
            .create_ask_order(&f.alice, &terms, None, true)
            .await
            .unwrap();
        let order_id = f.market.get_ask_orders(&OrderFilter::default()).await.unwrap()[0]
            .order_id
            .clone();

        f.market
            .accept_offer(&f.bob, &order_id, OrderType::Ask, true)
            .await
            .unwrap();
        let err = f
            .market
            .accept_offer(&f.bob, &order_id, OrderType::Ask, true)
            .await
            .unwrap_err();
        match err {
            Error::Transaction(TxError::Rejected { message }) => {
                assert_eq!(message, "Credit.OrderNotActive")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_invalid_terms_never_reach_chain() {
        let f = fixture();
        let err = f
            .market
            .create_ask_order(&f.alice, &LoanTerms::new(dec!(0), dec!(5), 90), None, true)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidAmount { .. }));

        let err = f
            .market
            .repay_loan(&f.bob, "any", dec!(-1), true)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidAmount { .. }));
        assert_eq!(f.chain.submission_count(), 0);
    }

    #[tokio::test]
    async fn test_orders_expire_after_expiry_block() {
        let f = fixture();
        f.market
            .clone()
            .with_default_expiry(2)
            .create_ask_order(&f.alice, &LoanTerms::new(dec!(5), dec!(1), 1), None, true)
            .await
            .unwrap();

        f.chain.advance_blocks(3);
        let expired = f
            .market
            .get_ask_orders(&OrderFilter::default().status(OrderStatus::Expired))
            .await
            .unwrap();
        assert_eq!(expired.len(), 1);
        assert!(f
            .market
            .get_ask_orders(&OrderFilter::default().status(OrderStatus::Active))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_expiry_past_last_block_is_rejected_by_chain() {
        let f = fixture();
        let terms = LoanTerms::new(dec!(10), dec!(1), 7);
        let err = f
            .market
            .create_ask_order(&f.alice, &terms, Some(u64::MAX), true)
            .await
            .unwrap_err();
        match err {
            Error::Transaction(TxError::Rejected { message }) => {
                assert_eq!(message, "Credit.InvalidExpiry")
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(f
            .market
            .get_ask_orders(&OrderFilter::default())
            .await
            .unwrap()
            .is_empty());

        // the node is still usable
        f.market
            .create_ask_order(&f.alice, &terms, None, true)
            .await
            .unwrap();
        assert_eq!(
            f.market
                .get_ask_orders(&OrderFilter::default())
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_missing_deal_has_no_schedule() {
        let f = fixture();
        assert!(f.market.repayment_schedule("nope").await.unwrap().is_none());
    }
}
