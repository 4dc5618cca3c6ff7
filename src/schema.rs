//! Static description of the vault program: instructions, account layouts and
//! the custom error table.
//!
//! The shipped program is described by [`ProgramSchema::default`]. A different
//! deployment can be described by loading its Anchor IDL with
//! [`ProgramSchema::from_idl_json`]; both produce the same immutable value that
//! the codec, builders and error translator take by reference.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use solana_sdk::{pubkey, pubkey::Pubkey};

use crate::error::{SdkError, SdkResult};

pub const URBANIUM_PROGRAM_ID: Pubkey = pubkey!("7XzKxpTmsiTevyC9KYaFZbpGp9NnJ2VwK6ie7RdKZXBW");

pub const DISCRIMINATOR_LEN: usize = 8;
pub type Discriminator = [u8; DISCRIMINATOR_LEN];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstructionKind {
	InitializeVault,
	Deposit,
	Withdraw,
	RouteYield,
}

impl InstructionKind {
	pub const ALL: [InstructionKind; 4] = [
		InstructionKind::InitializeVault,
		InstructionKind::Deposit,
		InstructionKind::Withdraw,
		InstructionKind::RouteYield,
	];

	/// Name as it appears in the IDL.
	pub fn name(self) -> &'static str {
		match self {
			InstructionKind::InitializeVault => "initializeVault",
			InstructionKind::Deposit => "deposit",
			InstructionKind::Withdraw => "withdraw",
			InstructionKind::RouteYield => "routeYield",
		}
	}

	/// Accepts camelCase (`routeYield`) and snake_case (`route_yield`).
	pub fn from_name(name: &str) -> Option<Self> {
		let wanted = normalize(name);
		Self::ALL.into_iter().find(|k| normalize(k.name()) == wanted)
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountKind {
	Vault,
	UserPosition,
}

impl AccountKind {
	pub const ALL: [AccountKind; 2] = [AccountKind::Vault, AccountKind::UserPosition];

	pub fn name(self) -> &'static str {
		match self {
			AccountKind::Vault => "vault",
			AccountKind::UserPosition => "userPosition",
		}
	}

	pub fn from_name(name: &str) -> Option<Self> {
		let wanted = normalize(name);
		Self::ALL.into_iter().find(|k| normalize(k.name()) == wanted)
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
	U8,
	U16,
	I32,
	U64,
	I64,
	Pubkey,
}

impl FieldType {
	/// Encoded width in bytes.
	pub fn size(self) -> usize {
		match self {
			FieldType::U8 => 1,
			FieldType::U16 => 2,
			FieldType::I32 => 4,
			FieldType::U64 | FieldType::I64 => 8,
			FieldType::Pubkey => 32,
		}
	}

	pub fn from_idl(ty: &str) -> Option<Self> {
		match ty {
			"u8" => Some(FieldType::U8),
			"u16" => Some(FieldType::U16),
			"i32" => Some(FieldType::I32),
			"u64" => Some(FieldType::U64),
			"i64" => Some(FieldType::I64),
			"pubkey" | "publicKey" => Some(FieldType::Pubkey),
			_ => None,
		}
	}
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldSpec {
	pub name: String,
	pub ty: FieldType,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccountRole {
	pub name: String,
	pub signer: bool,
	pub writable: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstructionSpec {
	pub kind: InstructionKind,
	pub name: String,
	pub discriminator: Discriminator,
	pub accounts: Vec<AccountRole>,
	pub args: Vec<FieldSpec>,
}

impl InstructionSpec {
	pub fn data_len(&self) -> usize {
		DISCRIMINATOR_LEN + self.args.iter().map(|a| a.ty.size()).sum::<usize>()
	}
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccountLayout {
	pub kind: AccountKind,
	pub name: String,
	pub discriminator: Discriminator,
	pub fields: Vec<FieldSpec>,
}

impl AccountLayout {
	/// Minimum account data length, discriminator included.
	pub fn data_len(&self) -> usize {
		DISCRIMINATOR_LEN + self.fields.iter().map(|f| f.ty.size()).sum::<usize>()
	}
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorEntry {
	pub code: u32,
	pub name: String,
	pub msg: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProgramSchema {
	pub program_id: Pubkey,
	pub name: String,
	pub version: String,
	pub instructions: Vec<InstructionSpec>,
	pub accounts: Vec<AccountLayout>,
	pub errors: Vec<ErrorEntry>,
}

impl ProgramSchema {
	pub fn instruction(&self, kind: InstructionKind) -> SdkResult<&InstructionSpec> {
		self.instructions
			.iter()
			.find(|i| i.kind == kind)
			.ok_or_else(|| SdkError::Schema(format!("instruction {} not in schema", kind.name())))
	}

	pub fn instruction_by_name(&self, name: &str) -> SdkResult<&InstructionSpec> {
		let kind = InstructionKind::from_name(name)
			.ok_or_else(|| SdkError::Schema(format!("unknown instruction: {name}")))?;
		self.instruction(kind)
	}

	pub fn instruction_by_discriminator(&self, data: &[u8]) -> Option<&InstructionSpec> {
		let prefix = data.get(..DISCRIMINATOR_LEN)?;
		self.instructions.iter().find(|i| i.discriminator[..] == *prefix)
	}

	pub fn account(&self, kind: AccountKind) -> SdkResult<&AccountLayout> {
		self.accounts
			.iter()
			.find(|a| a.kind == kind)
			.ok_or_else(|| SdkError::Schema(format!("account {} not in schema", kind.name())))
	}

	pub fn account_by_name(&self, name: &str) -> SdkResult<&AccountLayout> {
		let kind = AccountKind::from_name(name)
			.ok_or_else(|| SdkError::Schema(format!("unknown account type: {name}")))?;
		self.account(kind)
	}

	pub fn error(&self, code: u32) -> Option<&ErrorEntry> {
		self.errors.iter().find(|e| e.code == code)
	}

	/// Builds a schema from an Anchor IDL document (0.30 layout, with the
	/// pre-0.30 `publicKey` spelling and missing discriminators tolerated).
	pub fn from_idl_json(json: &str) -> SdkResult<Self> {
		let idl: IdlDocument =
			serde_json::from_str(json).map_err(|e| SdkError::Schema(format!("invalid IDL JSON: {e}")))?;
		idl.into_schema()
	}
}

impl Default for ProgramSchema {
	fn default() -> Self {
		let token_accounts = |first: &str| {
			vec![
				role(first, true, true),
				role("mint", false, false),
				role("vault", false, true),
				role("vaultAuthority", false, false),
				role("userPosition", false, true),
				role("userTokenAccount", false, true),
				role("vaultTokenAccount", false, true),
				role("yieldTokenAccountA", false, true),
				role("yieldTokenAccountB", false, true),
				role("systemProgram", false, false),
				role("tokenProgram", false, false),
				role("associatedTokenProgram", false, false),
			]
		};

		let instructions = vec![
			InstructionSpec {
				kind: InstructionKind::InitializeVault,
				name: "initializeVault".to_string(),
				discriminator: [48, 191, 163, 44, 71, 129, 63, 164],
				accounts: vec![
					role("payer", true, true),
					role("mint", false, false),
					role("vault", false, true),
					role("vaultAuthority", false, false),
					role("vaultTokenAccount", false, true),
					role("yieldTokenAccountA", false, true),
					role("yieldTokenAccountB", false, true),
					role("oracleFeed", false, false),
					role("systemProgram", false, false),
					role("tokenProgram", false, false),
					role("associatedTokenProgram", false, false),
				],
				args: vec![
					field("oracleProgram", FieldType::Pubkey),
					field("oracleFeed", FieldType::Pubkey),
					field("maxStalenessSeconds", FieldType::U64),
					field("maxConfidenceBps", FieldType::U16),
					field("routeThresholdPrice", FieldType::I64),
				],
			},
			InstructionSpec {
				kind: InstructionKind::Deposit,
				name: "deposit".to_string(),
				discriminator: [242, 35, 198, 137, 82, 225, 242, 182],
				accounts: token_accounts("depositor"),
				args: vec![field("amount", FieldType::U64)],
			},
			InstructionSpec {
				kind: InstructionKind::Withdraw,
				name: "withdraw".to_string(),
				discriminator: [183, 18, 70, 156, 148, 109, 161, 34],
				accounts: token_accounts("withdrawer"),
				args: vec![field("shares", FieldType::U64)],
			},
			InstructionSpec {
				kind: InstructionKind::RouteYield,
				name: "routeYield".to_string(),
				discriminator: [30, 120, 157, 134, 19, 72, 147, 2],
				accounts: vec![
					role("executor", true, false),
					role("mint", false, false),
					role("vault", false, true),
					role("vaultAuthority", false, false),
					role("vaultTokenAccount", false, true),
					role("yieldTokenAccountA", false, true),
					role("yieldTokenAccountB", false, true),
					role("oracleFeed", false, false),
					role("tokenProgram", false, false),
				],
				args: vec![field("amount", FieldType::U64)],
			},
		];

		let accounts = vec![
			AccountLayout {
				kind: AccountKind::Vault,
				name: "vault".to_string(),
				discriminator: [211, 8, 232, 43, 2, 152, 117, 119],
				fields: vec![
					field("version", FieldType::U8),
					field("bump", FieldType::U8),
					field("authorityBump", FieldType::U8),
					field("mint", FieldType::Pubkey),
					field("vaultTokenAccount", FieldType::Pubkey),
					field("yieldTokenAccountA", FieldType::Pubkey),
					field("yieldTokenAccountB", FieldType::Pubkey),
					field("oracleProgram", FieldType::Pubkey),
					field("oracleFeed", FieldType::Pubkey),
					field("oracleExpo", FieldType::I32),
					field("maxStalenessSeconds", FieldType::U64),
					field("maxConfidenceBps", FieldType::U16),
					field("routeThresholdPrice", FieldType::I64),
					field("totalShares", FieldType::U64),
				],
			},
			AccountLayout {
				kind: AccountKind::UserPosition,
				name: "userPosition".to_string(),
				discriminator: [251, 248, 209, 245, 83, 234, 17, 27],
				fields: vec![
					field("bump", FieldType::U8),
					field("vault", FieldType::Pubkey),
					field("owner", FieldType::Pubkey),
					field("shares", FieldType::U64),
				],
			},
		];

		let errors = [
			(6000, "InvalidVaultPda", "Invalid vault PDA"),
			(6001, "InvalidVaultAuthorityPda", "Invalid vault authority PDA"),
			(6002, "InvalidUserPositionPda", "Invalid user position PDA"),
			(6003, "InvalidTokenProgram", "Invalid token program"),
			(6004, "InvalidMint", "Invalid mint"),
			(6005, "InvalidVaultTokenAccount", "Invalid vault token account"),
			(6006, "InvalidYieldTokenAccount", "Invalid yield token account"),
			(6007, "MathOverflow", "Arithmetic overflow"),
			(6008, "InsufficientLiquidity", "Insufficient liquidity in vault"),
			(6009, "InvalidOracleOwner", "Oracle feed account owner mismatch"),
			(6010, "OraclePriceUnavailable", "Oracle price unavailable"),
			(6011, "OracleStale", "Oracle price is too stale"),
			(6012, "OracleConfidenceTooHigh", "Oracle confidence interval too large"),
			(6013, "OracleExponentMismatch", "Oracle exponent mismatch"),
			(6014, "InsufficientShares", "Withdraw shares exceeds position shares"),
			(6015, "ZeroAmount", "Deposit amount must be non-zero"),
			(6016, "ZeroShares", "Shares must be non-zero"),
		]
		.into_iter()
		.map(|(code, name, msg)| ErrorEntry { code, name: name.to_string(), msg: msg.to_string() })
		.collect();

		Self {
			program_id: URBANIUM_PROGRAM_ID,
			name: "urbanium".to_string(),
			version: "0.1.0".to_string(),
			instructions,
			accounts,
			errors,
		}
	}
}

/// Anchor discriminator: first 8 bytes of `sha256("<namespace>:<name>")`.
/// Instructions use namespace `global` with the snake_case name, accounts use
/// `account` with the PascalCase type name.
pub fn anchor_discriminator(namespace: &str, name: &str) -> Discriminator {
	let mut hasher = Sha256::new();
	hasher.update(format!("{namespace}:{name}"));
	let hash = hasher.finalize();
	let mut disc = [0u8; DISCRIMINATOR_LEN];
	disc.copy_from_slice(&hash[..DISCRIMINATOR_LEN]);
	disc
}

fn role(name: &str, signer: bool, writable: bool) -> AccountRole {
	AccountRole { name: name.to_string(), signer, writable }
}

fn field(name: &str, ty: FieldType) -> FieldSpec {
	FieldSpec { name: name.to_string(), ty }
}

pub(crate) fn normalize(name: &str) -> String {
	name.chars().filter(|c| *c != '_').map(|c| c.to_ascii_lowercase()).collect()
}

fn to_snake_case(name: &str) -> String {
	let mut out = String::with_capacity(name.len() + 4);
	for (i, c) in name.chars().enumerate() {
		if c.is_ascii_uppercase() {
			if i > 0 {
				out.push('_');
			}
			out.push(c.to_ascii_lowercase());
		} else {
			out.push(c);
		}
	}
	out
}

fn to_pascal_case(name: &str) -> String {
	let mut out = String::with_capacity(name.len());
	let mut upper = true;
	for c in name.chars() {
		if c == '_' {
			upper = true;
		} else if upper {
			out.push(c.to_ascii_uppercase());
			upper = false;
		} else {
			out.push(c);
		}
	}
	out
}

// IDL document, only the parts the client needs.

#[derive(Deserialize)]
struct IdlDocument {
	address: String,
	#[serde(default)]
	metadata: Option<IdlMetadata>,
	instructions: Vec<IdlInstruction>,
	#[serde(default)]
	accounts: Vec<IdlAccountDef>,
	#[serde(default)]
	types: Vec<IdlTypeDef>,
	#[serde(default)]
	errors: Vec<IdlErrorDef>,
}

#[derive(Deserialize)]
struct IdlMetadata {
	name: String,
	version: String,
}

#[derive(Deserialize)]
struct IdlInstruction {
	name: String,
	#[serde(default)]
	discriminator: Option<Vec<u8>>,
	accounts: Vec<IdlAccountItem>,
	args: Vec<IdlField>,
}

#[derive(Deserialize)]
struct IdlAccountItem {
	name: String,
	#[serde(default, alias = "isMut")]
	writable: bool,
	#[serde(default, alias = "isSigner")]
	signer: bool,
}

#[derive(Deserialize)]
struct IdlField {
	name: String,
	#[serde(rename = "type")]
	ty: IdlType,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IdlType {
	Primitive(String),
	Defined { defined: IdlDefined },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IdlDefined {
	Named { name: String },
	Legacy(String),
}

impl IdlDefined {
	fn name(&self) -> &str {
		match self {
			IdlDefined::Named { name } => name,
			IdlDefined::Legacy(name) => name,
		}
	}
}

#[derive(Deserialize)]
struct IdlTypeDef {
	name: String,
	#[serde(rename = "type")]
	ty: IdlTypeBody,
}

#[derive(Deserialize)]
struct IdlTypeBody {
	kind: String,
	#[serde(default)]
	fields: Vec<IdlField>,
}

#[derive(Deserialize)]
struct IdlAccountDef {
	name: String,
	#[serde(default)]
	discriminator: Option<Vec<u8>>,
}

#[derive(Deserialize)]
struct IdlErrorDef {
	code: u32,
	name: String,
	#[serde(default)]
	msg: Option<String>,
}

impl IdlDocument {
	fn into_schema(self) -> SdkResult<ProgramSchema> {
		let program_id = self
			.address
			.parse::<Pubkey>()
			.map_err(|e| SdkError::Schema(format!("invalid program address {}: {e}", self.address)))?;

		let mut instructions = Vec::with_capacity(self.instructions.len());
		for ix in &self.instructions {
			let kind = InstructionKind::from_name(&ix.name)
				.ok_or_else(|| SdkError::Schema(format!("unknown instruction in IDL: {}", ix.name)))?;
			let discriminator = match &ix.discriminator {
				Some(bytes) => to_discriminator(&ix.name, bytes)?,
				None => anchor_discriminator("global", &to_snake_case(&ix.name)),
			};
			let accounts = ix
				.accounts
				.iter()
				.map(|a| role(&a.name, a.signer, a.writable))
				.collect();
			let mut args = Vec::new();
			for arg in &ix.args {
				self.flatten_field(arg, &mut args)?;
			}
			instructions.push(InstructionSpec { kind, name: ix.name.clone(), discriminator, accounts, args });
		}

		let mut accounts = Vec::with_capacity(self.accounts.len());
		for acc in &self.accounts {
			let kind = AccountKind::from_name(&acc.name)
				.ok_or_else(|| SdkError::Schema(format!("unknown account in IDL: {}", acc.name)))?;
			let discriminator = match &acc.discriminator {
				Some(bytes) => to_discriminator(&acc.name, bytes)?,
				None => anchor_discriminator("account", &to_pascal_case(&acc.name)),
			};
			let def = self
				.find_type(&acc.name)
				.ok_or_else(|| SdkError::Schema(format!("no type definition for account {}", acc.name)))?;
			let mut fields = Vec::with_capacity(def.ty.fields.len());
			for f in &def.ty.fields {
				self.flatten_field(f, &mut fields)?;
			}
			accounts.push(AccountLayout { kind, name: acc.name.clone(), discriminator, fields });
		}

		let errors = self
			.errors
			.iter()
			.map(|e| ErrorEntry { code: e.code, name: e.name.clone(), msg: e.msg.clone().unwrap_or_default() })
			.collect();

		let (name, version) = match self.metadata {
			Some(m) => (m.name, m.version),
			None => (String::new(), String::new()),
		};

		Ok(ProgramSchema { program_id, name, version, instructions, accounts, errors })
	}

	fn find_type(&self, name: &str) -> Option<&IdlTypeDef> {
		let wanted = normalize(name);
		self.types.iter().find(|t| normalize(&t.name) == wanted)
	}

	// `defined` struct arguments are inlined: the wire format of a borsh struct
	// is the concatenation of its fields.
	fn flatten_field(&self, f: &IdlField, out: &mut Vec<FieldSpec>) -> SdkResult<()> {
		match &f.ty {
			IdlType::Primitive(ty) => {
				let ty = FieldType::from_idl(ty)
					.ok_or_else(|| SdkError::Schema(format!("unsupported type {ty} for field {}", f.name)))?;
				out.push(field(&f.name, ty));
			}
			IdlType::Defined { defined } => {
				let def = self
					.find_type(defined.name())
					.ok_or_else(|| SdkError::Schema(format!("undefined type {}", defined.name())))?;
				if def.ty.kind != "struct" {
					return Err(SdkError::Schema(format!("type {} is not a struct", def.name)));
				}
				for inner in &def.ty.fields {
					self.flatten_field(inner, out)?;
				}
			}
		}
		Ok(())
	}
}

fn to_discriminator(owner: &str, bytes: &[u8]) -> SdkResult<Discriminator> {
	bytes
		.try_into()
		.map_err(|_| SdkError::Schema(format!("discriminator for {owner} must be 8 bytes, got {}", bytes.len())))
}

#[cfg(test)]
mod tests {
	use super::*;

	const SHIPPED_IDL: &str = include_str!("../idl/urbanium.json");

	#[test]
	fn test_default_discriminators_follow_anchor_derivation() {
		let schema = ProgramSchema::default();
		for spec in &schema.instructions {
			assert_eq!(spec.discriminator, anchor_discriminator("global", &to_snake_case(&spec.name)), "{}", spec.name);
		}
		for layout in &schema.accounts {
			assert_eq!(layout.discriminator, anchor_discriminator("account", &to_pascal_case(&layout.name)));
		}
	}

	#[test]
	fn test_shipped_idl_matches_default_schema() {
		let loaded = ProgramSchema::from_idl_json(SHIPPED_IDL).unwrap();
		assert_eq!(loaded, ProgramSchema::default());
	}

	#[test]
	fn test_error_table_covers_6000_to_6016() {
		let schema = ProgramSchema::default();
		assert_eq!(schema.errors.len(), 17);
		for code in 6000..=6016 {
			assert!(schema.error(code).is_some(), "missing {code}");
		}
		assert_eq!(schema.error(6000).unwrap().name, "InvalidVaultPda");
		assert_eq!(schema.error(6016).unwrap().name, "ZeroShares");
		assert!(schema.error(6017).is_none());
	}

	#[test]
	fn test_layout_sizes() {
		let schema = ProgramSchema::default();
		assert_eq!(schema.account(AccountKind::Vault).unwrap().data_len(), 8 + 225);
		assert_eq!(schema.account(AccountKind::UserPosition).unwrap().data_len(), 8 + 73);
		assert_eq!(schema.instruction(InstructionKind::InitializeVault).unwrap().data_len(), 8 + 82);
		assert_eq!(schema.instruction(InstructionKind::Deposit).unwrap().data_len(), 16);
	}

	#[test]
	fn test_lookup_by_name_accepts_both_cases() {
		let schema = ProgramSchema::default();
		assert_eq!(schema.instruction_by_name("route_yield").unwrap().kind, InstructionKind::RouteYield);
		assert_eq!(schema.instruction_by_name("routeYield").unwrap().kind, InstructionKind::RouteYield);
		assert_eq!(schema.account_by_name("UserPosition").unwrap().kind, AccountKind::UserPosition);
		assert!(matches!(schema.instruction_by_name("liquidate"), Err(SdkError::Schema(_))));
	}

	#[test]
	fn test_idl_without_discriminators_is_derived() {
		let json = r#"{
			"address": "7XzKxpTmsiTevyC9KYaFZbpGp9NnJ2VwK6ie7RdKZXBW",
			"instructions": [
				{ "name": "deposit", "accounts": [{ "name": "depositor", "isMut": true, "isSigner": true }],
				  "args": [{ "name": "amount", "type": "u64" }] }
			],
			"accounts": [{ "name": "UserPosition" }],
			"types": [
				{ "name": "UserPosition", "type": { "kind": "struct", "fields": [
					{ "name": "bump", "type": "u8" },
					{ "name": "vault", "type": "publicKey" },
					{ "name": "owner", "type": "publicKey" },
					{ "name": "shares", "type": "u64" }
				] } }
			]
		}"#;
		let schema = ProgramSchema::from_idl_json(json).unwrap();
		let deposit = schema.instruction(InstructionKind::Deposit).unwrap();
		assert_eq!(deposit.discriminator, [242, 35, 198, 137, 82, 225, 242, 182]);
		assert!(deposit.accounts[0].signer && deposit.accounts[0].writable);
		let position = schema.account(AccountKind::UserPosition).unwrap();
		assert_eq!(position.discriminator, [251, 248, 209, 245, 83, 234, 17, 27]);
		assert_eq!(position.data_len(), 8 + 73);
		assert!(schema.instruction(InstructionKind::Withdraw).is_err());
	}

	#[test]
	fn test_idl_rejects_unsupported_types() {
		let json = r#"{
			"address": "7XzKxpTmsiTevyC9KYaFZbpGp9NnJ2VwK6ie7RdKZXBW",
			"instructions": [
				{ "name": "deposit", "accounts": [], "args": [{ "name": "amount", "type": "u128" }] }
			]
		}"#;
		assert!(matches!(ProgramSchema::from_idl_json(json), Err(SdkError::Schema(_))));
	}
}
