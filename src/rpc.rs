use std::future::Future;

use solana_client::{client_error::ClientError, nonblocking::rpc_client::RpcClient};
use solana_sdk::{
	commitment_config::CommitmentConfig, hash::Hash, pubkey::Pubkey, signature::Signature,
	transaction::Transaction,
};

/// The ledger calls the client makes. Implemented for the nonblocking
/// [`RpcClient`]; tests substitute their own.
pub trait LedgerRpc: Send + Sync {
	/// Latest blockhash at finalized commitment.
	fn latest_blockhash(&self) -> impl Future<Output = Result<Hash, ClientError>> + Send;

	/// One send-and-confirm round trip at confirmed commitment.
	fn send_and_confirm(&self, tx: &Transaction) -> impl Future<Output = Result<Signature, ClientError>> + Send;

	/// Raw account data, `None` when the account does not exist.
	fn account_data(&self, address: &Pubkey) -> impl Future<Output = Result<Option<Vec<u8>>, ClientError>> + Send;
}

/// RPC client whose default commitment is `confirmed`, which is what
/// `send_and_confirm` waits for.
pub fn connect(rpc_url: &str) -> RpcClient {
	RpcClient::new_with_commitment(rpc_url.to_string(), CommitmentConfig::confirmed())
}

impl LedgerRpc for RpcClient {
	async fn latest_blockhash(&self) -> Result<Hash, ClientError> {
		let (hash, _last_valid_block_height) =
			self.get_latest_blockhash_with_commitment(CommitmentConfig::finalized()).await?;
		Ok(hash)
	}

	async fn send_and_confirm(&self, tx: &Transaction) -> Result<Signature, ClientError> {
		self.send_and_confirm_transaction(tx).await
	}

	async fn account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>, ClientError> {
		let response = self.get_account_with_commitment(address, CommitmentConfig::confirmed()).await?;
		Ok(response.value.map(|acc| acc.data))
	}
}
