//! Native token transfers

use chain_client::Call;
use creditcoin_core::{amount, Address, Error, Keypair, Result, TransactionReceipt};
use rust_decimal::Decimal;
use serde_json::json;

use crate::CreditcoinClient;

const BALANCES: &str = "Balances";
const TRANSFER_KEEP_ALIVE: &str = "transfer_keep_alive";

impl CreditcoinClient {
    async fn transfer_call(&self, to: &Address, value: Decimal) -> Result<Call> {
        let params = json!({
            "dest": to.as_str(),
            "value": amount::to_wire(value)?.to_string(),
        });
        self.chain
            .prepare_call(BALANCES, TRANSFER_KEEP_ALIVE, params)
            .await
    }

    /// Fee the chain would charge `keypair` to send `amount` to `to_address`
    pub async fn get_transfer_fee_estimate(
        &self,
        keypair: &Keypair,
        to_address: &str,
        amount: Decimal,
    ) -> Result<Decimal> {
        let to = self.checked_address(to_address)?;
        let call = self.transfer_call(&to, amount).await?;
        let fee = self.chain.estimate_fee(&call, keypair).await?;
        amount::from_wire(fee)
    }

    /// Send `amount` tokens to `to_address`.
    ///
    /// Fails with [`Error::InsufficientBalance`] before submitting when the
    /// sender's available balance cannot cover the amount plus the estimated
    /// fee. The check is pre-flight only; the chain has the final say.
    pub async fn transfer(
        &self,
        keypair: &Keypair,
        to_address: &str,
        amount: Decimal,
        wait_for_inclusion: bool,
    ) -> Result<TransactionReceipt> {
        let to = self.checked_address(to_address)?;
        if amount <= Decimal::ZERO {
            return Err(Error::invalid_amount(format!(
                "transfer amount must be positive, got {}",
                amount
            )));
        }

        let call = self.transfer_call(&to, amount).await?;
        let fee = amount::from_wire(self.chain.estimate_fee(&call, keypair).await?)?;
        let balance = self.get_balance(keypair.address.as_str()).await?;
        let required = amount + fee;

        if balance.available < required {
            tracing::warn!(
                from = %keypair.address,
                required = %required,
                available = %balance.available,
                "Transfer exceeds available balance"
            );
            return Err(Error::InsufficientBalance {
                required,
                available: balance.available,
            });
        }

        tracing::info!(
            from = %keypair.address,
            to = %to,
            amount = %amount,
            fee = %fee,
            "Submitting transfer"
        );

        self.chain
            .sign_and_submit(call, keypair, wait_for_inclusion)
            .await
    }
}
