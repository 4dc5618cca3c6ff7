//! One builder per program instruction.
//!
//! Builders never inspect the accounts they are given; the program checks
//! them. What they guarantee is the wire contract: each address lands on the
//! schema role of the same name, in the schema's order and with the schema's
//! signer/writable flags, and data is encoded by the codec.

use serde::{Deserialize, Serialize};
use solana_sdk::{
	compute_budget::ComputeBudgetInstruction,
	instruction::{AccountMeta, Instruction},
	pubkey::Pubkey,
	system_program,
};
use spl_associated_token_account as spl_ata;

use crate::codec::{InitializeVaultArgs, VaultInstruction};
use crate::error::{SdkError, SdkResult};
use crate::pda::{derive_associated_token_address, VaultAddresses};
use crate::schema::{normalize, InstructionSpec, ProgramSchema};
use crate::state::Vault;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeVaultAccounts {
	pub payer: Pubkey,
	pub mint: Pubkey,
	pub vault: Pubkey,
	pub vault_authority: Pubkey,
	pub vault_token_account: Pubkey,
	pub yield_token_account_a: Pubkey,
	pub yield_token_account_b: Pubkey,
	pub oracle_feed: Pubkey,
	pub system_program: Pubkey,
	pub token_program: Pubkey,
	pub associated_token_program: Pubkey,
}

impl InitializeVaultAccounts {
	/// Fills the derived addresses and program ids. The two yield destinations
	/// are caller-chosen token accounts.
	pub fn resolve(
		addrs: &VaultAddresses,
		payer: &Pubkey,
		yield_token_account_a: &Pubkey,
		yield_token_account_b: &Pubkey,
		oracle_feed: &Pubkey,
	) -> Self {
		Self {
			payer: *payer,
			mint: addrs.mint,
			vault: addrs.vault,
			vault_authority: addrs.vault_authority,
			vault_token_account: addrs.vault_token_account,
			yield_token_account_a: *yield_token_account_a,
			yield_token_account_b: *yield_token_account_b,
			oracle_feed: *oracle_feed,
			system_program: system_program::id(),
			token_program: spl_token::id(),
			associated_token_program: spl_ata::id(),
		}
	}

	fn roles(&self) -> [(&'static str, Pubkey); 11] {
		[
			("payer", self.payer),
			("mint", self.mint),
			("vault", self.vault),
			("vault_authority", self.vault_authority),
			("vault_token_account", self.vault_token_account),
			("yield_token_account_a", self.yield_token_account_a),
			("yield_token_account_b", self.yield_token_account_b),
			("oracle_feed", self.oracle_feed),
			("system_program", self.system_program),
			("token_program", self.token_program),
			("associated_token_program", self.associated_token_program),
		]
	}
}

/// Accounts shared by `deposit` and `withdraw`; `user` is the depositor or
/// withdrawer and signs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionAccounts {
	pub user: Pubkey,
	pub mint: Pubkey,
	pub vault: Pubkey,
	pub vault_authority: Pubkey,
	pub user_position: Pubkey,
	pub user_token_account: Pubkey,
	pub vault_token_account: Pubkey,
	pub yield_token_account_a: Pubkey,
	pub yield_token_account_b: Pubkey,
	pub system_program: Pubkey,
	pub token_program: Pubkey,
	pub associated_token_program: Pubkey,
}

pub type DepositAccounts = PositionAccounts;
pub type WithdrawAccounts = PositionAccounts;

impl PositionAccounts {
	/// Derives every address from the decoded vault and the user: vault PDAs,
	/// the user position PDA and the user's associated token account.
	pub fn resolve(program_id: &Pubkey, vault: &Vault, user: &Pubkey) -> SdkResult<Self> {
		let addrs = VaultAddresses::derive(program_id, &vault.mint)?;
		let (user_position, _bump) = addrs.user_position(user)?;
		Ok(Self {
			user: *user,
			mint: vault.mint,
			vault: addrs.vault,
			vault_authority: addrs.vault_authority,
			user_position,
			user_token_account: derive_associated_token_address(user, &vault.mint),
			vault_token_account: vault.vault_token_account,
			yield_token_account_a: vault.yield_token_account_a,
			yield_token_account_b: vault.yield_token_account_b,
			system_program: system_program::id(),
			token_program: spl_token::id(),
			associated_token_program: spl_ata::id(),
		})
	}

	/// `user_role` is the name the instruction gives the signing user.
	fn roles(&self, user_role: &'static str) -> [(&'static str, Pubkey); 12] {
		[
			(user_role, self.user),
			("mint", self.mint),
			("vault", self.vault),
			("vault_authority", self.vault_authority),
			("user_position", self.user_position),
			("user_token_account", self.user_token_account),
			("vault_token_account", self.vault_token_account),
			("yield_token_account_a", self.yield_token_account_a),
			("yield_token_account_b", self.yield_token_account_b),
			("system_program", self.system_program),
			("token_program", self.token_program),
			("associated_token_program", self.associated_token_program),
		]
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteYieldAccounts {
	pub executor: Pubkey,
	pub mint: Pubkey,
	pub vault: Pubkey,
	pub vault_authority: Pubkey,
	pub vault_token_account: Pubkey,
	pub yield_token_account_a: Pubkey,
	pub yield_token_account_b: Pubkey,
	pub oracle_feed: Pubkey,
	pub token_program: Pubkey,
}

impl RouteYieldAccounts {
	pub fn from_vault(program_id: &Pubkey, vault: &Vault, executor: &Pubkey) -> SdkResult<Self> {
		let addrs = VaultAddresses::derive(program_id, &vault.mint)?;
		Ok(Self {
			executor: *executor,
			mint: vault.mint,
			vault: addrs.vault,
			vault_authority: addrs.vault_authority,
			vault_token_account: vault.vault_token_account,
			yield_token_account_a: vault.yield_token_account_a,
			yield_token_account_b: vault.yield_token_account_b,
			oracle_feed: vault.oracle_feed,
			token_program: spl_token::id(),
		})
	}

	fn roles(&self) -> [(&'static str, Pubkey); 9] {
		[
			("executor", self.executor),
			("mint", self.mint),
			("vault", self.vault),
			("vault_authority", self.vault_authority),
			("vault_token_account", self.vault_token_account),
			("yield_token_account_a", self.yield_token_account_a),
			("yield_token_account_b", self.yield_token_account_b),
			("oracle_feed", self.oracle_feed),
			("token_program", self.token_program),
		]
	}
}

pub fn build_instruction_initialize_vault(
	schema: &ProgramSchema,
	program_id: &Pubkey,
	accounts: &InitializeVaultAccounts,
	args: &InitializeVaultArgs,
) -> SdkResult<Instruction> {
	build(schema, program_id, &accounts.roles(), &VaultInstruction::InitializeVault(*args))
}

pub fn build_instruction_deposit(
	schema: &ProgramSchema,
	program_id: &Pubkey,
	accounts: &DepositAccounts,
	amount: u64,
) -> SdkResult<Instruction> {
	build(schema, program_id, &accounts.roles("depositor"), &VaultInstruction::Deposit { amount })
}

pub fn build_instruction_withdraw(
	schema: &ProgramSchema,
	program_id: &Pubkey,
	accounts: &WithdrawAccounts,
	shares: u64,
) -> SdkResult<Instruction> {
	build(schema, program_id, &accounts.roles("withdrawer"), &VaultInstruction::Withdraw { shares })
}

pub fn build_instruction_route_yield(
	schema: &ProgramSchema,
	program_id: &Pubkey,
	accounts: &RouteYieldAccounts,
	amount: u64,
) -> SdkResult<Instruction> {
	build(schema, program_id, &accounts.roles(), &VaultInstruction::RouteYield { amount })
}

fn build(
	schema: &ProgramSchema,
	program_id: &Pubkey,
	named: &[(&str, Pubkey)],
	ix: &VaultInstruction,
) -> SdkResult<Instruction> {
	let spec = schema.instruction(ix.kind())?;
	let accounts = account_metas(spec, named)?;
	let data = ix.encode(schema)?;
	Ok(Instruction { program_id: *program_id, accounts, data })
}

/// Pairs named addresses with the schema's roles. Names match the way schema
/// lookups do (case and underscores ignored), and the metas come out in the
/// schema's order whatever order `named` is in.
pub fn account_metas(spec: &InstructionSpec, named: &[(&str, Pubkey)]) -> SdkResult<Vec<AccountMeta>> {
	if named.len() != spec.accounts.len() {
		return Err(SdkError::Schema(format!(
			"{} takes {} accounts, got {}",
			spec.name,
			spec.accounts.len(),
			named.len()
		)));
	}
	spec.accounts
		.iter()
		.map(|role| {
			let wanted = normalize(&role.name);
			let (_, key) = named.iter().find(|(name, _)| normalize(name) == wanted).ok_or_else(|| {
				SdkError::Schema(format!("{}: no address for account {}", spec.name, role.name))
			})?;
			Ok(AccountMeta { pubkey: *key, is_signer: role.signer, is_writable: role.writable })
		})
		.collect()
}

pub fn build_compute_budget_instructions(units: u32, micro_lamports: u64) -> Vec<Instruction> {
	vec![
		ComputeBudgetInstruction::set_compute_unit_limit(units),
		ComputeBudgetInstruction::set_compute_unit_price(micro_lamports),
	]
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_compute_budget_ixs() {
		let ixs = build_compute_budget_instructions(1_000_000, 1_000);
		assert_eq!(ixs.len(), 2);
		assert_eq!(ixs[0].program_id, solana_sdk::compute_budget::id());
		assert_eq!(ixs[1].program_id, solana_sdk::compute_budget::id());
	}

	#[test]
	fn test_account_count_mismatch_is_schema_error() {
		let schema = ProgramSchema::default();
		let spec = schema.instruction(crate::schema::InstructionKind::RouteYield).unwrap();
		let named: Vec<(&str, Pubkey)> = spec.accounts[..8].iter().map(|r| (r.name.as_str(), Pubkey::new_unique())).collect();
		assert!(matches!(account_metas(spec, &named), Err(SdkError::Schema(_))));
	}

	#[test]
	fn test_metas_follow_schema_order() {
		let schema = ProgramSchema::default();
		let spec = schema.instruction(crate::schema::InstructionKind::RouteYield).unwrap();
		let mut named: Vec<(&str, Pubkey)> =
			spec.accounts.iter().map(|r| (r.name.as_str(), Pubkey::new_unique())).collect();
		let expected: Vec<Pubkey> = named.iter().map(|(_, k)| *k).collect();
		named.reverse();

		let metas = account_metas(spec, &named).unwrap();
		assert_eq!(metas.iter().map(|m| m.pubkey).collect::<Vec<_>>(), expected);
		assert!(metas[0].is_signer && !metas[0].is_writable);
	}

	#[test]
	fn test_unnamed_role_is_schema_error() {
		let schema = ProgramSchema::default();
		let spec = schema.instruction(crate::schema::InstructionKind::RouteYield).unwrap();
		let mut named: Vec<(&str, Pubkey)> =
			spec.accounts.iter().map(|r| (r.name.as_str(), Pubkey::new_unique())).collect();
		named[7].0 = "price_feed";

		let err = account_metas(spec, &named).unwrap_err();
		assert_eq!(err.to_string(), "Schema error: routeYield: no address for account oracleFeed");
	}
}
