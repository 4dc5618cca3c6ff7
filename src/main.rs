use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Context, Result};
use serde_json::json;
use solana_sdk::pubkey::Pubkey;
use tracing::info;

use urbanium_client::codec::decode_account;
use urbanium_client::config::ClientConfig;
use urbanium_client::oracle::{self, PricePolicy};
use urbanium_client::pda::VaultAddresses;
use urbanium_client::rpc::{self, LedgerRpc};
use urbanium_client::state::{UserPosition, Vault};
use urbanium_client::telemetry;

fn pubkey_var(key: &str) -> Result<Option<Pubkey>> {
	match std::env::var(key) {
		Ok(raw) if !raw.trim().is_empty() => {
			Ok(Some(Pubkey::from_str(raw.trim()).with_context(|| format!("{key} is not a valid pubkey"))?))
		}
		_ => Ok(None),
	}
}

#[tokio::main]
async fn main() -> Result<()> {
	let config = ClientConfig::from_env()?;
	telemetry::init_tracing();

	let mint = pubkey_var("VAULT_MINT")?.ok_or_else(|| anyhow!("VAULT_MINT must be set"))?;
	let schema = config.load_schema()?;
	let client = rpc::connect(&config.rpc_url);
	let addrs = VaultAddresses::derive(&config.program_id, &mint)?;
	info!(rpc = %config.rpc_url, vault = %addrs.vault, "inspecting vault");

	let data = client
		.account_data(&addrs.vault)
		.await
		.context("fetching vault account")?
		.ok_or_else(|| anyhow!("no vault at {} for mint {mint}", addrs.vault))?;
	let vault: Vault = decode_account(&schema, &data)?;

	let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs() as i64;
	let oracle_summary = match oracle::read_price(&client, &vault.oracle_feed).await {
		Ok(reading) => {
			let verdict = PricePolicy::from_vault(&vault).check(&reading, now);
			json!({
				"reading": reading,
				"acceptable": verdict.is_ok(),
				"rejection": verdict.err().map(|r| json!({ "code": r.code(), "reason": r.to_string() })),
				"destination": oracle::route_destination(&vault, &reading),
			})
		}
		Err(e) => json!({ "error": e.to_string() }),
	};

	let position = match pubkey_var("OWNER")? {
		Some(owner) => {
			let (address, _bump) = addrs.user_position(&owner)?;
			let decoded = match client.account_data(&address).await.context("fetching user position")? {
				Some(data) => Some(decode_account::<UserPosition>(&schema, &data)?),
				None => None,
			};
			json!({ "address": address.to_string(), "position": decoded })
		}
		None => serde_json::Value::Null,
	};

	let summary = json!({
		"programId": config.program_id.to_string(),
		"mint": mint.to_string(),
		"vault": addrs.vault.to_string(),
		"vaultBump": addrs.vault_bump,
		"vaultAuthority": addrs.vault_authority.to_string(),
		"authorityBump": addrs.authority_bump,
		"state": vault,
		"oracle": oracle_summary,
		"userPosition": position,
	});
	println!("{}", serde_json::to_string_pretty(&summary)?);
	Ok(())
}
