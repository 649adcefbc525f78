//! Extrinsic submission and receipt assembly
//!
//! Every write in the SDK goes through [`ChainClient::sign_and_submit`]:
//! sign, submit, surface the chain's rejection text unchanged, and (when the
//! caller waits for inclusion) build a [`TransactionReceipt`] from the block's
//! events, the fee actually charged, and the block timestamp.

use creditcoin_core::amount::{self, wire_amount};
use creditcoin_core::{
    Error, EventRecord, Keypair, NetworkError, ReceiptStatus, TransactionReceipt, TxError,
};

use crate::rpc::{Call, SubmissionResult};
use crate::{timed_request, ChainClient};

impl ChainClient {
    /// Compose `module.function(params)`, then sign and submit it
    pub async fn submit_call(
        &self,
        module: &str,
        function: &str,
        params: serde_json::Value,
        keypair: &Keypair,
        wait_for_inclusion: bool,
    ) -> creditcoin_core::Result<TransactionReceipt> {
        let call = self.prepare_call(module, function, params).await?;
        self.sign_and_submit(call, keypair, wait_for_inclusion).await
    }

    /// Compose a call for submission; a node refusing the call surfaces as a
    /// transaction rejection rather than a network failure
    pub async fn prepare_call(
        &self,
        module: &str,
        function: &str,
        params: serde_json::Value,
    ) -> creditcoin_core::Result<Call> {
        self.compose_call(module, function, params)
            .await
            .map_err(submission_error)
    }

    /// Sign `call` with `keypair` and submit it.
    ///
    /// Without `wait_for_inclusion` the receipt only carries the extrinsic
    /// hash. With it, the wait is bounded by the configured inclusion timeout.
    pub async fn sign_and_submit(
        &self,
        call: Call,
        keypair: &Keypair,
        wait_for_inclusion: bool,
    ) -> creditcoin_core::Result<TransactionReceipt> {
        let extrinsic = timed_request(
            self.request_timeout(),
            self.inner.create_signed_extrinsic(&call, keypair),
        )
        .await
        .map_err(signing_error)?;

        tracing::debug!(
            call = %call.name(),
            tx_hash = %extrinsic.hash,
            signer = %keypair.address,
            nonce = extrinsic.nonce,
            "Submitting extrinsic"
        );

        let submit_timeout = if wait_for_inclusion {
            self.inclusion_timeout()
        } else {
            self.request_timeout()
        };
        let result = timed_request(
            submit_timeout,
            self.inner.submit_extrinsic(&extrinsic, wait_for_inclusion),
        )
        .await
        .map_err(submission_error)?;

        if !result.is_success {
            let message = result
                .error_message
                .unwrap_or_else(|| "extrinsic failed without an error message".to_string());
            tracing::warn!(
                call = %call.name(),
                tx_hash = %result.extrinsic_hash,
                error = %message,
                "Extrinsic rejected"
            );
            return Err(TxError::Rejected { message }.into());
        }

        if !wait_for_inclusion {
            return Ok(TransactionReceipt::submitted(result.extrinsic_hash));
        }

        self.build_receipt(&call, keypair, result).await
    }

    async fn build_receipt(
        &self,
        call: &Call,
        keypair: &Keypair,
        result: SubmissionResult,
    ) -> creditcoin_core::Result<TransactionReceipt> {
        let block_hash = result
            .block_hash
            .clone()
            .ok_or_else(|| TxError::MissingInclusion {
                tx_hash: result.extrinsic_hash.to_string(),
            })?;

        let block_events = timed_request(
            self.request_timeout(),
            self.inner.get_events(&block_hash),
        )
        .await?;
        let events = events_for_extrinsic(block_events, result.extrinsic_index);

        let status = if events.iter().any(|e| e.is("System", "ExtrinsicFailed")) {
            ReceiptStatus::Failed
        } else {
            ReceiptStatus::Success
        };

        let fee_raw = match fee_from_events(&events) {
            Some(fee) => fee,
            None => self.estimate_fee(call, keypair).await?,
        };
        let fee = amount::from_wire(fee_raw)?;

        let timestamp = self.get_block_timestamp(&block_hash).await?;

        tracing::info!(
            call = %call.name(),
            tx_hash = %result.extrinsic_hash,
            block = ?result.block_number,
            fee = %fee,
            "Extrinsic included"
        );

        Ok(TransactionReceipt {
            tx_hash: result.extrinsic_hash,
            block_hash: Some(block_hash),
            block_number: result.block_number,
            status,
            events,
            fee: Some(fee),
            timestamp: Some(timestamp),
        })
    }
}

/// Events emitted by the extrinsic at `index`; all block events when unknown
fn events_for_extrinsic(events: Vec<EventRecord>, index: Option<u32>) -> Vec<EventRecord> {
    match index {
        Some(idx) => events
            .into_iter()
            .filter(|e| e.extrinsic_index == Some(idx))
            .collect(),
        None => events,
    }
}

/// `actual_fee` of the `TransactionPayment.TransactionFeePaid` event
fn fee_from_events(events: &[EventRecord]) -> Option<u128> {
    events
        .iter()
        .find(|e| e.is("TransactionPayment", "TransactionFeePaid"))
        .and_then(|e| wire_amount::deserialize(&e.attributes["actual_fee"]).ok())
}

fn signing_error(err: NetworkError) -> Error {
    match err {
        NetworkError::Rpc { message } => TxError::Signing { message }.into(),
        other => other.into(),
    }
}

fn submission_error(err: NetworkError) -> Error {
    match err {
        NetworkError::Rpc { message } => TxError::Rejected { message }.into(),
        other => other.into(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{KeyBackend, SimulatedChain, Sr25519Backend};
    use creditcoin_core::{AddressFormat, NodeConfig};
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn setup() -> (Arc<SimulatedChain>, ChainClient, Keypair, Keypair) {
        let chain = Arc::new(SimulatedChain::new());
        let client = ChainClient::new(chain.clone(), NodeConfig::new("ws://127.0.0.1:9944"));
        let alice = Sr25519Backend
            .derive_from_uri("//Alice", AddressFormat::CREDITCOIN)
            .unwrap();
        let bob = Sr25519Backend
            .derive_from_uri("//Bob", AddressFormat::CREDITCOIN)
            .unwrap();
        (chain, client, alice, bob)
    }

    async fn transfer_call(client: &ChainClient, to: &Keypair, value: u128) -> Call {
        client
            .compose_call(
                "Balances",
                "transfer_keep_alive",
                json!({"dest": to.address.as_str(), "value": value.to_string()}),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_receipt_after_inclusion() {
        let (chain, client, alice, bob) = setup();
        chain.endow(&alice.address, dec!(100)).unwrap();

        let call = transfer_call(&client, &bob, 10u128.pow(18)).await;
        let receipt = client.sign_and_submit(call, &alice, true).await.unwrap();

        assert_eq!(receipt.status, ReceiptStatus::Success);
        assert!(receipt.block_hash.is_some());
        assert!(receipt.timestamp.is_some());
        assert_eq!(receipt.fee, Some(dec!(0.01)));
        assert!(receipt.find_event("Balances", "Transfer").is_some());
        // only this extrinsic's events
        assert!(receipt
            .events
            .iter()
            .all(|e| e.extrinsic_index == receipt.events[0].extrinsic_index));
    }

    #[tokio::test]
    async fn test_no_wait_returns_hash_only() {
        let (chain, client, alice, bob) = setup();
        chain.endow(&alice.address, dec!(100)).unwrap();

        let call = transfer_call(&client, &bob, 1).await;
        let receipt = client.sign_and_submit(call, &alice, false).await.unwrap();
        assert_eq!(receipt.status, ReceiptStatus::Submitted);
        assert!(receipt.block_hash.is_none());
        assert!(receipt.tx_hash.as_str().starts_with("0x"));
    }

    #[tokio::test]
    async fn test_pool_rejection_is_verbatim() {
        let (chain, client, alice, bob) = setup();
        chain.endow(&alice.address, dec!(100)).unwrap();
        chain.fail_next_submission("1010: Invalid Transaction: Transaction is outdated");

        let call = transfer_call(&client, &bob, 1).await;
        let err = client.sign_and_submit(call, &alice, true).await.unwrap_err();
        match err {
            Error::Transaction(TxError::Rejected { message }) => {
                assert_eq!(message, "1010: Invalid Transaction: Transaction is outdated")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_dispatch_failure_is_rejected() {
        let (chain, client, alice, bob) = setup();
        chain.endow(&alice.address, dec!(1)).unwrap();

        // more than alice holds
        let call = transfer_call(&client, &bob, 50 * 10u128.pow(18)).await;
        let err = client.sign_and_submit(call, &alice, true).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Transaction(TxError::Rejected { ref message }) if message.starts_with("Balances.")
        ));
    }

    #[tokio::test]
    async fn test_unreachable_node_is_network_error() {
        let (chain, client, alice, bob) = setup();
        chain.endow(&alice.address, dec!(100)).unwrap();
        let call = transfer_call(&client, &bob, 1).await;

        chain.set_offline(true);
        let err = client.sign_and_submit(call, &alice, true).await.unwrap_err();
        assert!(matches!(err, Error::Network(NetworkError::Unreachable { .. })));
        assert_eq!(chain.submission_count(), 0);
    }

    #[tokio::test]
    async fn test_refused_call_is_rejection() {
        let (chain, client, _alice, _bob) = setup();
        let err = client
            .prepare_call("Balances", "burn_everything", json!({}))
            .await
            .unwrap_err();
        match err {
            Error::Transaction(TxError::Rejected { message }) => {
                assert!(message.contains("Balances.burn_everything"))
            }
            other => panic!("unexpected error: {other:?}"),
        }

        chain.set_offline(true);
        let err = client
            .prepare_call("Balances", "transfer_keep_alive", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Network(NetworkError::Unreachable { .. })));
    }

    #[test]
    fn test_fee_from_events() {
        let events = vec![EventRecord {
            pallet: "TransactionPayment".into(),
            name: "TransactionFeePaid".into(),
            attributes: json!({"who": "5Grw", "actual_fee": "12500000000000000", "tip": 0}),
            extrinsic_index: Some(1),
        }];
        assert_eq!(fee_from_events(&events), Some(12_500_000_000_000_000));
        assert_eq!(fee_from_events(&[]), None);
    }
}
