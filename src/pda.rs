use solana_sdk::pubkey::Pubkey;
use spl_associated_token_account as spl_ata;

use crate::error::{SdkError, SdkResult};

pub const VAULT_SEED: &[u8] = b"vault";
pub const VAULT_AUTHORITY_SEED: &[u8] = b"vault_authority";
pub const USER_POSITION_SEED: &[u8] = b"user_position";

/// Canonical program address: walks the bump from 255 down and takes the first
/// off-curve hash of `seeds ‖ bump ‖ program_id ‖ "ProgramDerivedAddress"`.
pub fn derive_address(program_id: &Pubkey, seeds: &[&[u8]]) -> SdkResult<(Pubkey, u8)> {
	Pubkey::try_find_program_address(seeds, program_id).ok_or(SdkError::NoValidBump { program_id: *program_id })
}

// Seeds: [b"vault", mint]
pub fn vault_pda(program_id: &Pubkey, mint: &Pubkey) -> SdkResult<(Pubkey, u8)> {
	derive_address(program_id, &[VAULT_SEED, mint.as_ref()])
}

// Seeds: [b"vault_authority", vault]
pub fn vault_authority_pda(program_id: &Pubkey, vault: &Pubkey) -> SdkResult<(Pubkey, u8)> {
	derive_address(program_id, &[VAULT_AUTHORITY_SEED, vault.as_ref()])
}

// Seeds: [b"user_position", vault, owner]
pub fn user_position_pda(program_id: &Pubkey, vault: &Pubkey, owner: &Pubkey) -> SdkResult<(Pubkey, u8)> {
	derive_address(program_id, &[USER_POSITION_SEED, vault.as_ref(), owner.as_ref()])
}

/// The program-owned addresses of one vault, derived from its mint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VaultAddresses {
	pub program_id: Pubkey,
	pub mint: Pubkey,
	pub vault: Pubkey,
	pub vault_bump: u8,
	pub vault_authority: Pubkey,
	pub authority_bump: u8,
	/// Associated token account of the vault authority for `mint`.
	pub vault_token_account: Pubkey,
}

impl VaultAddresses {
	pub fn derive(program_id: &Pubkey, mint: &Pubkey) -> SdkResult<Self> {
		let (vault, vault_bump) = vault_pda(program_id, mint)?;
		let (vault_authority, authority_bump) = vault_authority_pda(program_id, &vault)?;
		Ok(Self {
			program_id: *program_id,
			mint: *mint,
			vault,
			vault_bump,
			vault_authority,
			authority_bump,
			vault_token_account: derive_associated_token_address(&vault_authority, mint),
		})
	}

	pub fn user_position(&self, owner: &Pubkey) -> SdkResult<(Pubkey, u8)> {
		user_position_pda(&self.program_id, &self.vault, owner)
	}
}

pub fn derive_associated_token_address(owner: &Pubkey, mint: &Pubkey) -> Pubkey {
	spl_ata::get_associated_token_address(owner, mint)
}

#[cfg(test)]
mod tests {
	use super::*;
	use sha2::{Digest, Sha256};
	use std::str::FromStr;

	fn program_id() -> Pubkey {
		Pubkey::from_str("7XzKxpTmsiTevyC9KYaFZbpGp9NnJ2VwK6ie7RdKZXBW").unwrap()
	}

	fn wsol() -> Pubkey {
		Pubkey::from_str("So11111111111111111111111111111111111111112").unwrap()
	}

	#[test]
	fn test_vault_pda_is_deterministic() {
		let a = vault_pda(&program_id(), &wsol()).unwrap();
		let b = vault_pda(&program_id(), &wsol()).unwrap();
		assert_eq!(a, b);
	}

	#[test]
	fn test_pda_matches_manual_hash() {
		let mint = wsol();
		let (vault, bump) = vault_pda(&program_id(), &mint).unwrap();
		let mut hasher = Sha256::new();
		hasher.update(VAULT_SEED);
		hasher.update(mint.as_ref());
		hasher.update([bump]);
		hasher.update(program_id().as_ref());
		hasher.update(b"ProgramDerivedAddress");
		let hash: [u8; 32] = hasher.finalize().into();
		assert_eq!(vault, Pubkey::new_from_array(hash));
		assert!(!vault.is_on_curve());
	}

	#[test]
	fn test_bump_is_highest_off_curve() {
		let mint = wsol();
		let (vault, bump) = vault_pda(&program_id(), &mint).unwrap();
		for higher in (u16::from(bump) + 1)..=255 {
			let seeds: &[&[u8]] = &[VAULT_SEED, mint.as_ref(), &[higher as u8]];
			assert!(Pubkey::create_program_address(seeds, &program_id()).is_err());
		}
		let seeds: &[&[u8]] = &[VAULT_SEED, mint.as_ref(), &[bump]];
		assert_eq!(Pubkey::create_program_address(seeds, &program_id()).unwrap(), vault);
	}

	#[test]
	fn test_seed_literals() {
		assert_eq!(VAULT_SEED, "vault".as_bytes());
		assert_eq!(VAULT_AUTHORITY_SEED, "vault_authority".as_bytes());
		assert_eq!(USER_POSITION_SEED, "user_position".as_bytes());
	}

	#[test]
	fn test_vault_addresses_bundle() {
		let addrs = VaultAddresses::derive(&program_id(), &wsol()).unwrap();
		assert_eq!((addrs.vault, addrs.vault_bump), vault_pda(&program_id(), &wsol()).unwrap());
		assert_eq!(
			(addrs.vault_authority, addrs.authority_bump),
			vault_authority_pda(&program_id(), &addrs.vault).unwrap()
		);
		assert_eq!(addrs.vault_token_account, derive_associated_token_address(&addrs.vault_authority, &wsol()));
		let owner = Pubkey::new_unique();
		assert_eq!(addrs.user_position(&owner).unwrap(), user_position_pda(&program_id(), &addrs.vault, &owner).unwrap());
	}
}
