//! Wallet activity aggregation
//!
//! Derives per-block wallet updates and wallet/contract interaction
//! rows from the block's normalized entities. Senders get a counted
//! update, every other touched address an uncounted one; the store
//! recomputes counted wallets' transaction totals from the transactions
//! table, so the counter equals the wallet's sent transactions no
//! matter how many it sends per block or how often a block is
//! re-ingested.

use std::collections::{HashMap, HashSet};

use chain_common::{
    NormalizedBlock, NormalizedContract, NormalizedTransaction, WalletInteraction, WalletType,
    WalletUpdate,
};

use super::ReceiptMap;

/// Aggregated wallet output for one block
#[derive(Debug, Default)]
pub struct WalletActivity {
    pub updates: Vec<WalletUpdate>,
    pub interactions: Vec<WalletInteraction>,
}

pub fn aggregate(
    block: &NormalizedBlock,
    transactions: &[NormalizedTransaction],
    receipts: &ReceiptMap,
    contracts: &[NormalizedContract],
) -> WalletActivity {
    let deployed: HashSet<&str> = contracts
        .iter()
        .map(|c| c.contract_address.as_str())
        .collect();

    // One update per address; any send marks it counted.
    let mut updates: HashMap<String, WalletUpdate> = HashMap::new();
    let mut interactions = Vec::new();

    for tx in transactions {
        let sender = updates
            .entry(tx.from_address.clone())
            .or_insert_with(|| WalletUpdate {
                chain_id: block.chain_id.clone(),
                wallet_address: tx.from_address.clone(),
                wallet_type: WalletType::ExternallyOwned,
                block_number: block.number,
                block_timestamp: block.timestamp,
                counted: false,
            });
        sender.counted = true;

        let success = receipts
            .get(&tx.tx_hash)
            .map(|r| r.status == chain_common::TxStatus::Succeeded)
            .unwrap_or(tx.status == chain_common::TxStatus::Succeeded);
        let gas_used = receipts
            .get(&tx.tx_hash)
            .and_then(|r| r.gas_used)
            .or(tx.gas_used);

        if let Some(to) = &tx.to_address {
            let wallet_type = if deployed.contains(to.as_str()) {
                WalletType::Contract
            } else {
                WalletType::ExternallyOwned
            };
            updates.entry(to.clone()).or_insert_with(|| WalletUpdate {
                chain_id: block.chain_id.clone(),
                wallet_address: to.clone(),
                wallet_type,
                block_number: block.number,
                block_timestamp: block.timestamp,
                counted: false,
            });

            let interaction_type = match &tx.input_data {
                Some(data) if data.len() > 2 => "call",
                _ => "transfer",
            };
            interactions.push(WalletInteraction {
                chain_id: block.chain_id.clone(),
                tx_hash: tx.tx_hash.clone(),
                wallet_address: tx.from_address.clone(),
                contract_address: to.clone(),
                interaction_type: interaction_type.to_string(),
                value: tx.value.clone(),
                gas_used,
                success,
                timestamp: block.timestamp,
            });
        }
    }

    for contract in contracts {
        updates
            .entry(contract.contract_address.clone())
            .and_modify(|u| u.wallet_type = WalletType::Contract)
            .or_insert_with(|| WalletUpdate {
                chain_id: block.chain_id.clone(),
                wallet_address: contract.contract_address.clone(),
                wallet_type: WalletType::Contract,
                block_number: block.number,
                block_timestamp: block.timestamp,
                counted: false,
            });

        // The deployment itself is an interaction with the new contract.
        if let Some(tx) = transactions
            .iter()
            .find(|t| t.tx_hash == contract.deployment_tx_hash)
        {
            let success = receipts
                .get(&tx.tx_hash)
                .map(|r| r.status == chain_common::TxStatus::Succeeded)
                .unwrap_or(true);
            interactions.push(WalletInteraction {
                chain_id: block.chain_id.clone(),
                tx_hash: tx.tx_hash.clone(),
                wallet_address: contract.deployer_address.clone(),
                contract_address: contract.contract_address.clone(),
                interaction_type: "deploy".to_string(),
                value: tx.value.clone(),
                gas_used: receipts.get(&tx.tx_hash).and_then(|r| r.gas_used),
                success,
                timestamp: block.timestamp,
            });
        }
    }

    WalletActivity {
        updates: updates.into_values().collect(),
        interactions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain_common::{FinalityStatus, NormalizedReceipt, TxStatus};
    use serde_json::Value;

    fn block() -> NormalizedBlock {
        NormalizedBlock {
            chain_id: "test-chain".into(),
            number: 10,
            hash: "0xb10".into(),
            parent_hash: "0xb09".into(),
            timestamp: 1_700_000_000,
            finality: FinalityStatus::AcceptedOnL2,
            gas_used: None,
            gas_limit: None,
            transaction_count: 2,
            chain_specific: Value::Null,
        }
    }

    fn tx(hash: &str, from: &str, to: Option<&str>, input: Option<&str>) -> NormalizedTransaction {
        NormalizedTransaction {
            chain_id: "test-chain".into(),
            tx_hash: hash.into(),
            block_number: 10,
            block_hash: "0xb10".into(),
            block_timestamp: 1_700_000_000,
            from_address: from.into(),
            to_address: to.map(Into::into),
            value: "100".into(),
            gas_limit: None,
            gas_used: Some(21_000),
            gas_price: None,
            fee: None,
            status: TxStatus::Succeeded,
            input_data: input.map(Into::into),
            chain_specific: Value::Null,
        }
    }

    fn receipt(hash: &str, status: TxStatus) -> NormalizedReceipt {
        NormalizedReceipt {
            tx_hash: hash.into(),
            status,
            gas_used: Some(21_000),
            effective_gas_price: None,
            fee: None,
            contract_address: None,
            class_hash: None,
            logs: vec![],
        }
    }

    #[test]
    fn sender_marked_counted_recipient_uncounted() {
        let txs = vec![
            tx("0xt1", "0xalice", Some("0xbob"), None),
            tx("0xt2", "0xalice", Some("0xbob"), None),
        ];
        let receipts: ReceiptMap = txs
            .iter()
            .map(|t| (t.tx_hash.clone(), receipt(&t.tx_hash, TxStatus::Succeeded)))
            .collect();

        let activity = aggregate(&block(), &txs, &receipts, &[]);

        // One update per address; alice counted, bob not.
        assert_eq!(activity.updates.len(), 2);
        let alice = activity
            .updates
            .iter()
            .find(|u| u.wallet_address == "0xalice")
            .unwrap();
        assert!(alice.counted);
        let bob = activity
            .updates
            .iter()
            .find(|u| u.wallet_address == "0xbob")
            .unwrap();
        assert!(!bob.counted);

        assert_eq!(activity.interactions.len(), 2);
        assert!(activity
            .interactions
            .iter()
            .all(|i| i.interaction_type == "transfer"));
    }

    #[test]
    fn deployment_produces_deploy_interaction_and_contract_wallet() {
        let txs = vec![tx("0xt1", "0xalice", None, Some("0x6080"))];
        let mut receipts: ReceiptMap = ReceiptMap::new();
        let mut deploy_receipt = receipt("0xt1", TxStatus::Succeeded);
        deploy_receipt.contract_address = Some("0xc0de".into());
        receipts.insert("0xt1".into(), deploy_receipt);

        let contracts = vec![NormalizedContract {
            chain_id: "test-chain".into(),
            contract_address: "0xc0de".into(),
            deployer_address: "0xalice".into(),
            deployment_tx_hash: "0xt1".into(),
            deployment_block_number: 10,
            class_hash: None,
            is_verified: false,
        }];

        let activity = aggregate(&block(), &txs, &receipts, &contracts);

        let contract_wallet = activity
            .updates
            .iter()
            .find(|u| u.wallet_address == "0xc0de")
            .unwrap();
        assert_eq!(contract_wallet.wallet_type, WalletType::Contract);
        assert!(!contract_wallet.counted);

        assert_eq!(activity.interactions.len(), 1);
        assert_eq!(activity.interactions[0].interaction_type, "deploy");
        assert_eq!(activity.interactions[0].contract_address, "0xc0de");
    }

    #[test]
    fn reverted_receipt_marks_interaction_unsuccessful() {
        let txs = vec![tx("0xt1", "0xalice", Some("0xc0de"), Some("0xdeadbeef"))];
        let mut receipts = ReceiptMap::new();
        receipts.insert("0xt1".into(), receipt("0xt1", TxStatus::Reverted));

        let activity = aggregate(&block(), &txs, &receipts, &[]);

        assert_eq!(activity.interactions.len(), 1);
        assert!(!activity.interactions[0].success);
        assert_eq!(activity.interactions[0].interaction_type, "call");
    }
}
