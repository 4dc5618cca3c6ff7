//! Pyth (v2 push) price account reading and the price checks the program
//! applies before routing yield.

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use thiserror::Error;
use tracing::debug;

use crate::error::{SdkError, SdkResult};
use crate::rpc::LedgerRpc;
use crate::state::Vault;

pub const PYTH_MAGIC: u32 = 0xa1b2_c3d4;
pub const ACCOUNT_TYPE_PRICE: u32 = 3;
pub const PRICE_STATUS_TRADING: u32 = 1;

// Offsets into the price account.
const MAGIC_OFFSET: usize = 0;
const ACCOUNT_TYPE_OFFSET: usize = 8;
const EXPO_OFFSET: usize = 20;
const TIMESTAMP_OFFSET: usize = 96;
const AGG_PRICE_OFFSET: usize = 208;
const AGG_CONF_OFFSET: usize = 216;
const AGG_STATUS_OFFSET: usize = 224;

/// A single fresh price reading. `price` and `conf` are the feed values
/// scaled by `10^expo` and truncated toward zero; `raw_price`/`raw_conf` are
/// the stored mantissas the program itself compares against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OraclePriceReading {
	pub price: i64,
	pub conf: u64,
	pub expo: i32,
	pub publish_time: i64,
	pub raw_price: i64,
	pub raw_conf: u64,
}

/// Fetches and parses a price account. Staleness is not checked here, see
/// [`PricePolicy`].
pub async fn read_price<R: LedgerRpc>(rpc: &R, price_account: &Pubkey) -> SdkResult<OraclePriceReading> {
	let data = rpc
		.account_data(price_account)
		.await
		.map_err(|e| SdkError::rpc("get_account", e))?
		.ok_or(SdkError::NotFound(*price_account))?;
	let reading = parse_price_account(price_account, &data)?;
	debug!(
		account = %price_account,
		price = reading.raw_price,
		conf = reading.raw_conf,
		expo = reading.expo,
		publish_time = reading.publish_time,
		"oracle price read"
	);
	Ok(reading)
}

pub fn parse_price_account(address: &Pubkey, data: &[u8]) -> SdkResult<OraclePriceReading> {
	let magic = read_u32(data, MAGIC_OFFSET).ok_or_else(|| header_error(address, data))?;
	let account_type = read_u32(data, ACCOUNT_TYPE_OFFSET).ok_or_else(|| header_error(address, data))?;
	let expo = read_i32(data, EXPO_OFFSET).ok_or_else(|| header_error(address, data))?;
	if magic != PYTH_MAGIC {
		return Err(SdkError::Decode(format!("{address} is not a price account (magic {magic:#x})")));
	}
	if account_type != ACCOUNT_TYPE_PRICE {
		return Err(SdkError::Decode(format!("{address} has account type {account_type}, expected price")));
	}

	let raw_price = read_i64(data, AGG_PRICE_OFFSET).ok_or(SdkError::PriceUnavailable(*address))?;
	let raw_conf = read_u64(data, AGG_CONF_OFFSET).ok_or(SdkError::ConfidenceUnavailable(*address))?;
	// The aggregate is only meaningful while the feed is trading.
	match read_u32(data, AGG_STATUS_OFFSET) {
		Some(PRICE_STATUS_TRADING) => {}
		_ => return Err(SdkError::PriceUnavailable(*address)),
	}
	let publish_time = read_i64(data, TIMESTAMP_OFFSET).ok_or(SdkError::PriceUnavailable(*address))?;

	let price = scale_toward_zero(i128::from(raw_price), expo)
		.and_then(|v| i64::try_from(v).ok())
		.ok_or_else(|| SdkError::Decode(format!("{address}: price {raw_price}e{expo} overflows")))?;
	let conf = scale_toward_zero(i128::from(raw_conf), expo)
		.and_then(|v| u64::try_from(v).ok())
		.ok_or_else(|| SdkError::Decode(format!("{address}: confidence {raw_conf}e{expo} overflows")))?;

	Ok(OraclePriceReading { price, conf, expo, publish_time, raw_price, raw_conf })
}

/// `value * 10^expo`, truncated toward zero.
fn scale_toward_zero(value: i128, expo: i32) -> Option<i128> {
	if expo >= 0 {
		10i128.checked_pow(expo.unsigned_abs()).and_then(|m| value.checked_mul(m))
	} else {
		match 10i128.checked_pow(expo.unsigned_abs()) {
			Some(divisor) => Some(value / divisor),
			// |value| < 2^127 < 10^39, anything scaled down further is zero
			None => Some(0),
		}
	}
}

fn header_error(address: &Pubkey, data: &[u8]) -> SdkError {
	SdkError::Decode(format!("{address}: price account header truncated ({} bytes)", data.len()))
}

fn read_u32(data: &[u8], offset: usize) -> Option<u32> {
	data.get(offset..offset + 4).map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

fn read_i32(data: &[u8], offset: usize) -> Option<i32> {
	read_u32(data, offset).map(|v| v as i32)
}

fn read_u64(data: &[u8], offset: usize) -> Option<u64> {
	let bytes: [u8; 8] = data.get(offset..offset + 8)?.try_into().ok()?;
	Some(u64::from_le_bytes(bytes))
}

fn read_i64(data: &[u8], offset: usize) -> Option<i64> {
	read_u64(data, offset).map(|v| v as i64)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum OracleRejection {
	#[error("price is {age}s old, limit is {max}s")]
	Stale { age: u64, max: u64 },
	#[error("price is zero")]
	ZeroPrice,
	#[error("confidence is {bps} bps, limit is {max} bps")]
	ConfidenceTooHigh { bps: u128, max: u16 },
	#[error("exponent {actual} does not match vault exponent {expected}")]
	ExponentMismatch { expected: i32, actual: i32 },
}

impl OracleRejection {
	/// Program error code the on-chain check would fail with.
	pub fn code(&self) -> u32 {
		match self {
			OracleRejection::ZeroPrice => 6010,
			OracleRejection::Stale { .. } => 6011,
			OracleRejection::ConfidenceTooHigh { .. } => 6012,
			OracleRejection::ExponentMismatch { .. } => 6013,
		}
	}
}

/// The vault's oracle limits. Checks run in the program's order: staleness,
/// zero price, confidence, exponent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricePolicy {
	pub max_staleness_seconds: u64,
	pub max_confidence_bps: u16,
	pub expected_expo: i32,
}

impl PricePolicy {
	pub fn from_vault(vault: &Vault) -> Self {
		Self {
			max_staleness_seconds: vault.max_staleness_seconds,
			max_confidence_bps: vault.max_confidence_bps,
			expected_expo: vault.oracle_expo,
		}
	}

	pub fn check(&self, reading: &OraclePriceReading, now_unix: i64) -> Result<(), OracleRejection> {
		// Measured in both directions; a publish time ahead of the clock counts too.
		let age = now_unix.abs_diff(reading.publish_time);
		if age > self.max_staleness_seconds {
			return Err(OracleRejection::Stale { age, max: self.max_staleness_seconds });
		}

		let abs_price = i128::from(reading.raw_price).abs();
		if abs_price == 0 {
			return Err(OracleRejection::ZeroPrice);
		}
		let bps = (i128::from(reading.raw_conf) * 10_000 / abs_price) as u128;
		if bps > u128::from(self.max_confidence_bps) {
			return Err(OracleRejection::ConfidenceTooHigh { bps, max: self.max_confidence_bps });
		}

		if reading.expo != self.expected_expo {
			return Err(OracleRejection::ExponentMismatch { expected: self.expected_expo, actual: reading.expo });
		}
		Ok(())
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum YieldDestination {
	A,
	B,
}

impl YieldDestination {
	pub fn token_account(self, vault: &Vault) -> Pubkey {
		match self {
			YieldDestination::A => vault.yield_token_account_a,
			YieldDestination::B => vault.yield_token_account_b,
		}
	}
}

/// Where `routeYield` would send funds at this price: A at or above the
/// vault's threshold, B below it.
pub fn route_destination(vault: &Vault, reading: &OraclePriceReading) -> YieldDestination {
	if reading.raw_price >= vault.route_threshold_price {
		YieldDestination::A
	} else {
		YieldDestination::B
	}
}

/// Runs the vault's price checks and returns the destination the program
/// would pick.
pub fn validate_for_routing(vault: &Vault, reading: &OraclePriceReading, now_unix: i64) -> SdkResult<YieldDestination> {
	PricePolicy::from_vault(vault).check(reading, now_unix).map_err(SdkError::OracleRejected)?;
	Ok(route_destination(vault, reading))
}
