use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use serde::{Deserialize, Serialize};
use solana_client::{client_error::ClientError, nonblocking::rpc_client::RpcClient};
use solana_sdk::{
	hash::Hash,
	instruction::Instruction,
	message::Message,
	pubkey::Pubkey,
	signature::{Signature, Signer},
	transaction::Transaction,
};
use tracing::{debug, info, warn};

use crate::codec::{decode_account, InitializeVaultArgs};
use crate::config::ClientConfig;
use crate::error::{SdkError, SdkResult};
use crate::instructions::{
	build_compute_budget_instructions, build_instruction_deposit, build_instruction_initialize_vault,
	build_instruction_route_yield, build_instruction_withdraw, DepositAccounts, InitializeVaultAccounts,
	RouteYieldAccounts, WithdrawAccounts,
};
use crate::oracle::{self, OraclePriceReading, YieldDestination};
use crate::pda::VaultAddresses;
use crate::program_error::translate_client_error;
use crate::rpc::{self, LedgerRpc};
use crate::schema::ProgramSchema;
use crate::state::{UserPosition, Vault};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
	/// Total send attempts, including the first.
	pub max_attempts: u32,
	pub backoff_ms: u64,
}

impl Default for RetryPolicy {
	fn default() -> Self {
		Self { max_attempts: 3, backoff_ms: 500 }
	}
}

impl RetryPolicy {
	/// Linear backoff after the `failed`-th failed attempt.
	pub fn backoff(&self, failed: u32) -> Duration {
		Duration::from_millis(self.backoff_ms.saturating_mul(u64::from(failed)))
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeBudget {
	pub units: u32,
	pub micro_lamports: u64,
}

/// Progress of one submission. `Retrying(n)` means `n` attempts have failed
/// transiently and another is due.
#[derive(Debug)]
pub enum SubmitState {
	Pending,
	Retrying(u32),
	Confirmed(Signature),
	Failed { attempts: u32, error: ClientError },
}

impl SubmitState {
	/// Folds the outcome of the next attempt into the state. Terminal states
	/// ignore further outcomes.
	pub fn advance(self, outcome: Result<Signature, ClientError>, policy: &RetryPolicy) -> SubmitState {
		let attempts = match self {
			SubmitState::Pending => 1,
			SubmitState::Retrying(failed) => failed + 1,
			terminal => return terminal,
		};
		match outcome {
			Ok(sig) => SubmitState::Confirmed(sig),
			Err(error) if is_transient(&error) && attempts < policy.max_attempts.max(1) => SubmitState::Retrying(attempts),
			Err(error) => SubmitState::Failed { attempts, error },
		}
	}

	pub fn is_terminal(&self) -> bool {
		matches!(self, SubmitState::Confirmed(_) | SubmitState::Failed { .. })
	}
}

/// A failure is transient when the ledger did not reject the transaction
/// itself: no transaction error and no custom program error in the message.
pub fn is_transient(err: &ClientError) -> bool {
	err.get_transaction_error().is_none() && !err.to_string().contains("custom program error")
}

/// Vault operations bound to one wallet and one program. Cheap to clone.
pub struct VaultClient<R: LedgerRpc> {
	rpc: Arc<R>,
	wallet: Arc<dyn Signer + Send + Sync>,
	schema: Arc<ProgramSchema>,
	program_id: Pubkey,
	retry: RetryPolicy,
	compute_budget: Option<ComputeBudget>,
}

impl<R: LedgerRpc> Clone for VaultClient<R> {
	fn clone(&self) -> Self {
		Self {
			rpc: Arc::clone(&self.rpc),
			wallet: Arc::clone(&self.wallet),
			schema: Arc::clone(&self.schema),
			program_id: self.program_id,
			retry: self.retry,
			compute_budget: self.compute_budget,
		}
	}
}

impl VaultClient<RpcClient> {
	/// RPC endpoint, wallet, schema and retry settings all come from `config`.
	pub fn from_config(config: &ClientConfig) -> SdkResult<Self> {
		let wallet = config.load_wallet()?;
		let schema = config.load_schema()?;
		let client = Self::new(rpc::connect(&config.rpc_url), wallet, Arc::new(schema), config.program_id)
			.with_retry(config.retry);
		Ok(match config.compute_budget {
			Some(budget) => client.with_compute_budget(budget),
			None => client,
		})
	}
}

impl<R: LedgerRpc> VaultClient<R> {
	pub fn new(rpc: R, wallet: Arc<dyn Signer + Send + Sync>, schema: Arc<ProgramSchema>, program_id: Pubkey) -> Self {
		Self { rpc: Arc::new(rpc), wallet, schema, program_id, retry: RetryPolicy::default(), compute_budget: None }
	}

	pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
		self.retry = retry;
		self
	}

	pub fn with_compute_budget(mut self, budget: ComputeBudget) -> Self {
		self.compute_budget = Some(budget);
		self
	}

	pub fn rpc(&self) -> &R {
		&self.rpc
	}

	pub fn schema(&self) -> &ProgramSchema {
		&self.schema
	}

	pub fn program_id(&self) -> &Pubkey {
		&self.program_id
	}

	pub fn wallet(&self) -> Pubkey {
		self.wallet.pubkey()
	}

	pub fn addresses(&self, mint: &Pubkey) -> SdkResult<VaultAddresses> {
		VaultAddresses::derive(&self.program_id, mint)
	}

	/// Signs with the wallet as fee payer and sends under the retry policy.
	/// The signed transaction is reused across attempts.
	pub async fn submit(&self, instructions: &[Instruction]) -> SdkResult<Signature> {
		let blockhash = self
			.rpc
			.latest_blockhash()
			.await
			.map_err(|e| SdkError::rpc("get_latest_blockhash", e))?;
		let tx = self.signed_transaction(instructions, blockhash)?;
		debug!(instructions = instructions.len(), %blockhash, "submitting transaction");

		let mut state = SubmitState::Pending;
		loop {
			let outcome = self.rpc.send_and_confirm(&tx).await;
			state = match state.advance(outcome, &self.retry) {
				SubmitState::Confirmed(sig) => {
					info!(signature = %sig, "transaction confirmed");
					return Ok(sig);
				}
				SubmitState::Failed { attempts, error } => return Err(self.failure(attempts, error)),
				retrying => {
					if let SubmitState::Retrying(failed) = retrying {
						warn!(attempt = failed, max_attempts = self.retry.max_attempts, "send failed, retrying");
						tokio::time::sleep(self.retry.backoff(failed)).await;
					}
					retrying
				}
			};
		}
	}

	/// Wallet-signed transaction as base64 bincode, for a co-signer or an
	/// external sender. Other required signatures stay empty.
	pub async fn prepare_transaction(&self, instructions: &[Instruction]) -> SdkResult<String> {
		let blockhash = self
			.rpc
			.latest_blockhash()
			.await
			.map_err(|e| SdkError::rpc("get_latest_blockhash", e))?;
		let mut tx = self.unsigned_transaction(instructions);
		let signer: &dyn Signer = self.wallet.as_ref();
		tx.try_partial_sign(&[signer], blockhash)
			.map_err(|e| SdkError::Transaction(format!("sign: {e}")))?;
		let bytes = bincode::serialize(&tx).map_err(|e| SdkError::Transaction(format!("serialize tx: {e}")))?;
		Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
	}

	pub async fn fetch_vault(&self, mint: &Pubkey) -> SdkResult<Vault> {
		let addrs = self.addresses(mint)?;
		let data = self.account_data(&addrs.vault).await?.ok_or(SdkError::NotFound(addrs.vault))?;
		decode_account(&self.schema, &data)
	}

	/// `None` until the owner's first deposit creates the position.
	pub async fn fetch_user_position(&self, vault: &Pubkey, owner: &Pubkey) -> SdkResult<Option<UserPosition>> {
		let (position, _bump) = crate::pda::user_position_pda(&self.program_id, vault, owner)?;
		match self.account_data(&position).await? {
			Some(data) => decode_account(&self.schema, &data).map(Some),
			None => Ok(None),
		}
	}

	pub async fn read_oracle(&self, feed: &Pubkey) -> SdkResult<OraclePriceReading> {
		oracle::read_price(self.rpc.as_ref(), feed).await
	}

	/// Creates the vault for `mint`, paid for by the wallet.
	pub async fn initialize_vault(
		&self,
		mint: &Pubkey,
		yield_token_account_a: &Pubkey,
		yield_token_account_b: &Pubkey,
		args: &InitializeVaultArgs,
	) -> SdkResult<Signature> {
		let addrs = self.addresses(mint)?;
		let accounts = InitializeVaultAccounts::resolve(
			&addrs,
			&self.wallet(),
			yield_token_account_a,
			yield_token_account_b,
			&args.oracle_feed,
		);
		let ix = build_instruction_initialize_vault(&self.schema, &self.program_id, &accounts, args)?;
		self.submit(&[ix]).await
	}

	pub async fn deposit(&self, mint: &Pubkey, amount: u64) -> SdkResult<Signature> {
		let vault = self.fetch_vault(mint).await?;
		let accounts = DepositAccounts::resolve(&self.program_id, &vault, &self.wallet())?;
		let ix = build_instruction_deposit(&self.schema, &self.program_id, &accounts, amount)?;
		self.submit(&[ix]).await
	}

	pub async fn withdraw(&self, mint: &Pubkey, shares: u64) -> SdkResult<Signature> {
		let vault = self.fetch_vault(mint).await?;
		let accounts = WithdrawAccounts::resolve(&self.program_id, &vault, &self.wallet())?;
		let ix = build_instruction_withdraw(&self.schema, &self.program_id, &accounts, shares)?;
		self.submit(&[ix]).await
	}

	/// Checks the feed against the vault's limits before sending, so a stale
	/// or wide price fails locally with the code the program would return.
	pub async fn route_yield(&self, mint: &Pubkey, amount: u64, now_unix: i64) -> SdkResult<(Signature, YieldDestination)> {
		let vault = self.fetch_vault(mint).await?;
		let reading = self.read_oracle(&vault.oracle_feed).await?;
		let destination = oracle::validate_for_routing(&vault, &reading, now_unix)?;
		let accounts = RouteYieldAccounts::from_vault(&self.program_id, &vault, &self.wallet())?;
		let ix = build_instruction_route_yield(&self.schema, &self.program_id, &accounts, amount)?;
		let sig = self.submit(&[ix]).await?;
		Ok((sig, destination))
	}

	async fn account_data(&self, address: &Pubkey) -> SdkResult<Option<Vec<u8>>> {
		self.rpc.account_data(address).await.map_err(|e| SdkError::rpc("get_account", e))
	}

	/// The wallet pays; compute budget instructions, when configured, go first.
	fn unsigned_transaction(&self, instructions: &[Instruction]) -> Transaction {
		let mut ixs = match self.compute_budget {
			Some(b) => build_compute_budget_instructions(b.units, b.micro_lamports),
			None => Vec::with_capacity(instructions.len()),
		};
		ixs.extend_from_slice(instructions);
		Transaction::new_unsigned(Message::new(&ixs, Some(&self.wallet())))
	}

	fn signed_transaction(&self, instructions: &[Instruction], blockhash: Hash) -> SdkResult<Transaction> {
		let mut tx = self.unsigned_transaction(instructions);
		let signer: &dyn Signer = self.wallet.as_ref();
		tx.try_sign(&[signer], blockhash)
			.map_err(|e| SdkError::Transaction(format!("sign: {e}")))?;
		Ok(tx)
	}

	fn failure(&self, attempts: u32, error: ClientError) -> SdkError {
		match translate_client_error(&error, &self.schema) {
			Some(program_error) => {
				warn!(code = program_error.code, name = ?program_error.name, attempts, "transaction rejected by program");
				SdkError::Program { error: program_error, source: Box::new(error) }
			}
			None => {
				warn!(attempts, error = %error, "transaction submission failed");
				SdkError::Submission { attempts, source: Box::new(error) }
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use solana_client::client_error::ClientErrorKind;
	use solana_sdk::{instruction::InstructionError, transaction::TransactionError};

	fn transient() -> ClientError {
		ClientErrorKind::Custom("connection reset by peer".to_string()).into()
	}

	fn rejected(code: u32) -> ClientError {
		ClientErrorKind::TransactionError(TransactionError::InstructionError(0, InstructionError::Custom(code))).into()
	}

	#[test]
	fn test_retry_until_exhausted() {
		let policy = RetryPolicy::default();
		let state = SubmitState::Pending.advance(Err(transient()), &policy);
		assert!(matches!(state, SubmitState::Retrying(1)));
		let state = state.advance(Err(transient()), &policy);
		assert!(matches!(state, SubmitState::Retrying(2)));
		let state = state.advance(Err(transient()), &policy);
		assert!(matches!(state, SubmitState::Failed { attempts: 3, .. }));
	}

	#[test]
	fn test_program_rejection_fails_immediately() {
		let state = SubmitState::Pending.advance(Err(rejected(6000)), &RetryPolicy::default());
		assert!(matches!(state, SubmitState::Failed { attempts: 1, .. }));

		let text: ClientError =
			ClientErrorKind::Custom("Error processing Instruction 0: custom program error: 0x1770".to_string()).into();
		assert!(!is_transient(&text));
	}

	#[test]
	fn test_advance_only_moves_forward() {
		let policy = RetryPolicy { max_attempts: 5, ..RetryPolicy::default() };
		let mut state = SubmitState::Pending;
		for attempt in 1..5 {
			state = state.advance(Err(transient()), &policy);
			assert!(matches!(state, SubmitState::Retrying(n) if n == attempt));
		}
		let state = state.advance(Ok(Signature::new_unique()), &policy);
		assert!(state.is_terminal());
		// Terminal states swallow later outcomes.
		assert!(matches!(state.advance(Err(transient()), &policy), SubmitState::Confirmed(_)));
	}

	#[test]
	fn test_confirm_after_retry() {
		let sig = Signature::new_unique();
		let state = SubmitState::Pending
			.advance(Err(transient()), &RetryPolicy::default())
			.advance(Ok(sig), &RetryPolicy::default());
		assert!(matches!(state, SubmitState::Confirmed(s) if s == sig));
		assert!(state.is_terminal());
	}

	#[test]
	fn test_terminal_states_are_sticky() {
		let sig = Signature::new_unique();
		let state = SubmitState::Confirmed(sig).advance(Err(transient()), &RetryPolicy::default());
		assert!(matches!(state, SubmitState::Confirmed(s) if s == sig));
	}

	#[test]
	fn test_single_attempt_policy() {
		let policy = RetryPolicy { max_attempts: 1, backoff_ms: 0 };
		let state = SubmitState::Pending.advance(Err(transient()), &policy);
		assert!(matches!(state, SubmitState::Failed { attempts: 1, .. }));
	}

	#[test]
	fn test_linear_backoff() {
		let policy = RetryPolicy { max_attempts: 3, backoff_ms: 500 };
		assert_eq!(policy.backoff(1), Duration::from_millis(500));
		assert_eq!(policy.backoff(2), Duration::from_millis(1000));
	}
}
