//! Credit pallet names and marketplace defaults

use creditcoin_core::constants::BLOCKS_PER_DAY;
use creditcoin_core::BlockNumber;

/// Runtime pallet hosting the marketplace
pub const PALLET: &str = "Credit";

/// Storage map of lend offers, keyed by order id
pub const ASK_ORDERS: &str = "AskOrders";

/// Storage map of borrow requests, keyed by order id
pub const BID_ORDERS: &str = "BidOrders";

/// Storage map of matched loans, keyed by deal id
pub const DEALS: &str = "Deals";

pub const CREATE_ASK_ORDER: &str = "create_ask_order";
pub const CREATE_BID_ORDER: &str = "create_bid_order";
pub const ACCEPT_ASK_ORDER: &str = "accept_ask_order";
pub const ACCEPT_BID_ORDER: &str = "accept_bid_order";
pub const REPAY_LOAN: &str = "repay_loan";

/// Order lifetime when the caller gives none (~24h at 6s blocks)
pub const DEFAULT_EXPIRY_BLOCKS: BlockNumber = BLOCKS_PER_DAY;

/// Day count convention for simple interest
pub const DAYS_PER_YEAR: u32 = 365;
