use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

use crate::codec::{AccountRecord, FieldValues};
use crate::error::SdkResult;
use crate::schema::AccountKind;

/// Vault account as stored by the program. Read-only from the client side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vault {
	pub version: u8,
	pub bump: u8,
	pub authority_bump: u8,
	pub mint: Pubkey,
	pub vault_token_account: Pubkey,
	pub yield_token_account_a: Pubkey,
	pub yield_token_account_b: Pubkey,
	pub oracle_program: Pubkey,
	pub oracle_feed: Pubkey,
	pub oracle_expo: i32,
	pub max_staleness_seconds: u64,
	pub max_confidence_bps: u16,
	pub route_threshold_price: i64,
	pub total_shares: u64,
}

impl AccountRecord for Vault {
	const KIND: AccountKind = AccountKind::Vault;

	fn from_fields(f: &FieldValues) -> SdkResult<Self> {
		Ok(Self {
			version: f.int("version")?,
			bump: f.int("bump")?,
			authority_bump: f.int("authorityBump")?,
			mint: f.pubkey("mint")?,
			vault_token_account: f.pubkey("vaultTokenAccount")?,
			yield_token_account_a: f.pubkey("yieldTokenAccountA")?,
			yield_token_account_b: f.pubkey("yieldTokenAccountB")?,
			oracle_program: f.pubkey("oracleProgram")?,
			oracle_feed: f.pubkey("oracleFeed")?,
			oracle_expo: f.int("oracleExpo")?,
			max_staleness_seconds: f.int("maxStalenessSeconds")?,
			max_confidence_bps: f.int("maxConfidenceBps")?,
			route_threshold_price: f.int("routeThresholdPrice")?,
			total_shares: f.int("totalShares")?,
		})
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPosition {
	pub bump: u8,
	pub vault: Pubkey,
	pub owner: Pubkey,
	pub shares: u64,
}

impl AccountRecord for UserPosition {
	const KIND: AccountKind = AccountKind::UserPosition;

	fn from_fields(f: &FieldValues) -> SdkResult<Self> {
		Ok(Self {
			bump: f.int("bump")?,
			vault: f.pubkey("vault")?,
			owner: f.pubkey("owner")?,
			shares: f.int("shares")?,
		})
	}
}
