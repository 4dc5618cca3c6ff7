use std::str::FromStr;
use std::sync::Arc;

use base64::Engine;
use solana_sdk::{
	pubkey::Pubkey,
	signature::{read_keypair_file, Keypair},
};

use crate::client::{ComputeBudget, RetryPolicy};
use crate::error::{SdkError, SdkResult};
use crate::schema::{ProgramSchema, URBANIUM_PROGRAM_ID};

pub const DEFAULT_RPC_URL: &str = "https://api.devnet.solana.com";

/// Client settings read from the environment. Not `Debug`: it holds wallet
/// material.
#[derive(Clone)]
pub struct ClientConfig {
	pub rpc_url: String,
	pub program_id: Pubkey,
	pub wallet_keypair_path: Option<String>,
	pub wallet_keypair_base64: Option<String>,
	pub retry: RetryPolicy,
	pub compute_budget: Option<ComputeBudget>,
	pub idl_path: Option<String>,
}

impl ClientConfig {
	/// Loads `.env` if present, then reads the process environment.
	pub fn from_env() -> SdkResult<Self> {
		dotenvy::dotenv().ok();
		Self::from_lookup(|key| std::env::var(key).ok())
	}

	pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> SdkResult<Self> {
		let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

		let program_id = match var("PROGRAM_ID") {
			Some(raw) => Pubkey::from_str(raw.trim())
				.map_err(|e| SdkError::Config(format!("PROGRAM_ID is not a valid pubkey: {e}")))?,
			None => URBANIUM_PROGRAM_ID,
		};

		let defaults = RetryPolicy::default();
		let retry = RetryPolicy {
			max_attempts: parse_or(var("SUBMIT_MAX_ATTEMPTS"), "SUBMIT_MAX_ATTEMPTS", defaults.max_attempts)?,
			backoff_ms: parse_or(var("SUBMIT_RETRY_BACKOFF_MS"), "SUBMIT_RETRY_BACKOFF_MS", defaults.backoff_ms)?,
		};
		if retry.max_attempts == 0 {
			return Err(SdkError::Config("SUBMIT_MAX_ATTEMPTS must be at least 1".to_string()));
		}

		let compute_budget = match var("COMPUTE_UNIT_LIMIT") {
			Some(raw) => Some(ComputeBudget {
				units: parse(&raw, "COMPUTE_UNIT_LIMIT")?,
				micro_lamports: parse_or(var("COMPUTE_UNIT_PRICE"), "COMPUTE_UNIT_PRICE", 0)?,
			}),
			None => None,
		};

		Ok(Self {
			rpc_url: var("SOLANA_RPC_URL").unwrap_or_else(|| DEFAULT_RPC_URL.to_string()),
			program_id,
			wallet_keypair_path: var("WALLET_KEYPAIR_PATH"),
			wallet_keypair_base64: var("WALLET_KEYPAIR_BASE64"),
			retry,
			compute_budget,
			idl_path: var("IDL_PATH"),
		})
	}

	/// Base64 secret wins over the keypair file.
	pub fn load_wallet(&self) -> SdkResult<Arc<Keypair>> {
		if let Some(b64) = &self.wallet_keypair_base64 {
			let bytes = base64::engine::general_purpose::STANDARD
				.decode(b64.trim())
				.map_err(|e| SdkError::Config(format!("invalid base64 keypair: {e}")))?;
			let kp = Keypair::from_bytes(&bytes).map_err(|e| SdkError::Config(format!("invalid keypair bytes: {e}")))?;
			return Ok(Arc::new(kp));
		}
		let path = self
			.wallet_keypair_path
			.as_deref()
			.ok_or_else(|| SdkError::Config("set WALLET_KEYPAIR_PATH or WALLET_KEYPAIR_BASE64".to_string()))?;
		let kp = read_keypair_file(path).map_err(|e| SdkError::Config(format!("failed to read keypair {path}: {e}")))?;
		Ok(Arc::new(kp))
	}

	/// The shipped schema, or the IDL at `IDL_PATH` when set.
	pub fn load_schema(&self) -> SdkResult<ProgramSchema> {
		let Some(path) = &self.idl_path else {
			return Ok(ProgramSchema::default());
		};
		let json = std::fs::read_to_string(path).map_err(|e| SdkError::Config(format!("failed to read IDL {path}: {e}")))?;
		ProgramSchema::from_idl_json(&json)
	}
}

fn parse<T: FromStr>(raw: &str, key: &str) -> SdkResult<T>
where
	T::Err: std::fmt::Display,
{
	raw.trim().parse().map_err(|e| SdkError::Config(format!("{key}: {e}")))
}

fn parse_or<T: FromStr>(raw: Option<String>, key: &str, default: T) -> SdkResult<T>
where
	T::Err: std::fmt::Display,
{
	match raw {
		Some(raw) => parse(&raw, key),
		None => Ok(default),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use solana_sdk::signature::Signer;
	use std::collections::HashMap;

	fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
		let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
		move |key| map.get(key).cloned()
	}

	#[test]
	fn test_defaults() {
		let cfg = ClientConfig::from_lookup(lookup(&[])).unwrap();
		assert_eq!(cfg.rpc_url, DEFAULT_RPC_URL);
		assert_eq!(cfg.program_id, URBANIUM_PROGRAM_ID);
		assert_eq!(cfg.retry, RetryPolicy { max_attempts: 3, backoff_ms: 500 });
		assert!(cfg.compute_budget.is_none());
		assert!(cfg.idl_path.is_none());
	}

	#[test]
	fn test_overrides() {
		let cfg = ClientConfig::from_lookup(lookup(&[
			("SOLANA_RPC_URL", "http://127.0.0.1:8899"),
			("PROGRAM_ID", "11111111111111111111111111111111"),
			("SUBMIT_MAX_ATTEMPTS", "5"),
			("SUBMIT_RETRY_BACKOFF_MS", "10"),
			("COMPUTE_UNIT_LIMIT", "200000"),
			("COMPUTE_UNIT_PRICE", "1000"),
		]))
		.unwrap();
		assert_eq!(cfg.rpc_url, "http://127.0.0.1:8899");
		assert_eq!(cfg.program_id, solana_sdk::system_program::id());
		assert_eq!(cfg.retry, RetryPolicy { max_attempts: 5, backoff_ms: 10 });
		assert_eq!(cfg.compute_budget, Some(ComputeBudget { units: 200_000, micro_lamports: 1_000 }));
	}

	#[test]
	fn test_invalid_values() {
		assert!(matches!(
			ClientConfig::from_lookup(lookup(&[("PROGRAM_ID", "not-a-key")])),
			Err(SdkError::Config(_))
		));
		assert!(matches!(
			ClientConfig::from_lookup(lookup(&[("SUBMIT_MAX_ATTEMPTS", "three")])),
			Err(SdkError::Config(_))
		));
		assert!(matches!(
			ClientConfig::from_lookup(lookup(&[("SUBMIT_MAX_ATTEMPTS", "0")])),
			Err(SdkError::Config(_))
		));
	}

	#[test]
	fn test_wallet_from_base64() {
		let kp = Keypair::new();
		let b64 = base64::engine::general_purpose::STANDARD.encode(kp.to_bytes());
		let cfg = ClientConfig::from_lookup(lookup(&[("WALLET_KEYPAIR_BASE64", b64.as_str())])).unwrap();
		assert_eq!(cfg.load_wallet().unwrap().pubkey(), kp.pubkey());
	}

	#[test]
	fn test_missing_wallet() {
		let cfg = ClientConfig::from_lookup(lookup(&[])).unwrap();
		assert!(matches!(cfg.load_wallet(), Err(SdkError::Config(_))));
	}
}
