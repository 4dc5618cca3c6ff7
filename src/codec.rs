//! Instruction encoding and account decoding.
//!
//! Layouts always come from a [`ProgramSchema`]: the discriminator is written
//! (or checked) first, then each field in the schema's declared order as a
//! little-endian fixed-width integer or a raw 32-byte address.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

use crate::error::{SdkError, SdkResult};
use crate::schema::{
	normalize, AccountKind, AccountLayout, FieldSpec, FieldType, InstructionKind, InstructionSpec, ProgramSchema,
	DISCRIMINATOR_LEN,
};
use crate::state::{UserPosition, Vault};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldValue {
	/// Any integer field. Wide enough to carry every u64/i64 and to represent
	/// negative input for unsigned fields so it can be rejected.
	Int(i128),
	Pubkey(Pubkey),
}

impl From<Pubkey> for FieldValue {
	fn from(pk: Pubkey) -> Self {
		FieldValue::Pubkey(pk)
	}
}

macro_rules! int_field_value {
	($($t:ty),*) => {
		$(impl From<$t> for FieldValue {
			fn from(v: $t) -> Self {
				FieldValue::Int(i128::from(v))
			}
		})*
	};
}

int_field_value!(u8, u16, u32, u64, i8, i16, i32, i64, i128);

/// Named field values, in insertion order. Names are matched ignoring case
/// and underscores so `maxStalenessSeconds` and `max_staleness_seconds` agree.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FieldValues(Vec<(String, FieldValue)>);

impl FieldValues {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with(mut self, name: &str, value: impl Into<FieldValue>) -> Self {
		self.push(name, value.into());
		self
	}

	pub fn push(&mut self, name: &str, value: FieldValue) {
		self.0.push((name.to_string(), value));
	}

	pub fn get(&self, name: &str) -> Option<&FieldValue> {
		let wanted = normalize(name);
		self.0.iter().find(|(n, _)| normalize(n) == wanted).map(|(_, v)| v)
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	pub(crate) fn int<T: TryFrom<i128>>(&self, name: &str) -> SdkResult<T> {
		match self.get(name) {
			Some(FieldValue::Int(v)) => T::try_from(*v)
				.map_err(|_| SdkError::Decode(format!("field {name} value {v} out of range"))),
			Some(FieldValue::Pubkey(_)) => Err(SdkError::Decode(format!("field {name} is an address, expected integer"))),
			None => Err(SdkError::Decode(format!("field {name} missing from layout"))),
		}
	}

	pub(crate) fn pubkey(&self, name: &str) -> SdkResult<Pubkey> {
		match self.get(name) {
			Some(FieldValue::Pubkey(pk)) => Ok(*pk),
			Some(FieldValue::Int(_)) => Err(SdkError::Decode(format!("field {name} is an integer, expected address"))),
			None => Err(SdkError::Decode(format!("field {name} missing from layout"))),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitializeVaultArgs {
	pub oracle_program: Pubkey,
	pub oracle_feed: Pubkey,
	pub max_staleness_seconds: u64,
	/// Basis points; not range-checked here.
	pub max_confidence_bps: u16,
	pub route_threshold_price: i64,
}

/// One variant per program instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VaultInstruction {
	InitializeVault(InitializeVaultArgs),
	Deposit { amount: u64 },
	Withdraw { shares: u64 },
	RouteYield { amount: u64 },
}

impl VaultInstruction {
	pub fn kind(&self) -> InstructionKind {
		match self {
			VaultInstruction::InitializeVault(_) => InstructionKind::InitializeVault,
			VaultInstruction::Deposit { .. } => InstructionKind::Deposit,
			VaultInstruction::Withdraw { .. } => InstructionKind::Withdraw,
			VaultInstruction::RouteYield { .. } => InstructionKind::RouteYield,
		}
	}

	pub fn args(&self) -> FieldValues {
		match self {
			VaultInstruction::InitializeVault(a) => FieldValues::new()
				.with("oracleProgram", a.oracle_program)
				.with("oracleFeed", a.oracle_feed)
				.with("maxStalenessSeconds", a.max_staleness_seconds)
				.with("maxConfidenceBps", a.max_confidence_bps)
				.with("routeThresholdPrice", a.route_threshold_price),
			VaultInstruction::Deposit { amount } | VaultInstruction::RouteYield { amount } => {
				FieldValues::new().with("amount", *amount)
			}
			VaultInstruction::Withdraw { shares } => FieldValues::new().with("shares", *shares),
		}
	}

	pub fn encode(&self, schema: &ProgramSchema) -> SdkResult<Vec<u8>> {
		encode_with_spec(schema.instruction(self.kind())?, &self.args())
	}

	fn from_args(kind: InstructionKind, args: &FieldValues) -> SdkResult<Self> {
		Ok(match kind {
			InstructionKind::InitializeVault => VaultInstruction::InitializeVault(InitializeVaultArgs {
				oracle_program: args.pubkey("oracleProgram")?,
				oracle_feed: args.pubkey("oracleFeed")?,
				max_staleness_seconds: args.int("maxStalenessSeconds")?,
				max_confidence_bps: args.int("maxConfidenceBps")?,
				route_threshold_price: args.int("routeThresholdPrice")?,
			}),
			InstructionKind::Deposit => VaultInstruction::Deposit { amount: args.int("amount")? },
			InstructionKind::Withdraw => VaultInstruction::Withdraw { shares: args.int("shares")? },
			InstructionKind::RouteYield => VaultInstruction::RouteYield { amount: args.int("amount")? },
		})
	}
}

/// Encodes by operation name. This is the boundary for untyped callers:
/// every argument is range-checked against its declared type, so a negative
/// amount is rejected rather than wrapped.
pub fn encode_instruction(schema: &ProgramSchema, name: &str, args: &FieldValues) -> SdkResult<Vec<u8>> {
	encode_with_spec(schema.instruction_by_name(name)?, args)
}

pub fn encode_with_spec(spec: &InstructionSpec, args: &FieldValues) -> SdkResult<Vec<u8>> {
	let mut data = Vec::with_capacity(spec.data_len());
	data.extend_from_slice(&spec.discriminator);
	for field in &spec.args {
		let value = args
			.get(&field.name)
			.ok_or_else(|| SdkError::Schema(format!("{}: missing argument {}", spec.name, field.name)))?;
		write_field(&mut data, spec, field, value)?;
	}
	Ok(data)
}

/// Identifies the operation from the leading discriminator and decodes its
/// arguments.
pub fn decode_instruction(schema: &ProgramSchema, data: &[u8]) -> SdkResult<VaultInstruction> {
	let spec = schema
		.instruction_by_discriminator(data)
		.ok_or_else(|| SdkError::Decode("unknown instruction discriminator".to_string()))?;
	if data.len() < spec.data_len() {
		return Err(SdkError::Decode(format!(
			"{} data is {} bytes, expected {}",
			spec.name,
			data.len(),
			spec.data_len()
		)));
	}
	let mut cursor = &data[DISCRIMINATOR_LEN..];
	let mut args = FieldValues::new();
	for field in &spec.args {
		args.push(&field.name, read_field(&mut cursor, field)?);
	}
	VaultInstruction::from_args(spec.kind, &args)
}

/// A typed program account decoded through the schema.
pub trait AccountRecord: Sized {
	const KIND: AccountKind;

	fn from_fields(fields: &FieldValues) -> SdkResult<Self>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedAccount {
	Vault(Vault),
	UserPosition(UserPosition),
}

pub fn decode_account<T: AccountRecord>(schema: &ProgramSchema, data: &[u8]) -> SdkResult<T> {
	let fields = read_account_fields(schema.account(T::KIND)?, data)?;
	T::from_fields(&fields)
}

pub fn decode_account_by_name(schema: &ProgramSchema, name: &str, data: &[u8]) -> SdkResult<DecodedAccount> {
	let layout = schema.account_by_name(name)?;
	let fields = read_account_fields(layout, data)?;
	Ok(match layout.kind {
		AccountKind::Vault => DecodedAccount::Vault(Vault::from_fields(&fields)?),
		AccountKind::UserPosition => DecodedAccount::UserPosition(UserPosition::from_fields(&fields)?),
	})
}

/// Checks discriminator and length up front, then reads every declared field.
/// Nothing is returned unless the whole layout fits.
pub fn read_account_fields(layout: &AccountLayout, data: &[u8]) -> SdkResult<FieldValues> {
	if data.len() < DISCRIMINATOR_LEN {
		return Err(SdkError::Decode(format!(
			"{} account data is {} bytes, shorter than the discriminator",
			layout.name,
			data.len()
		)));
	}
	if data[..DISCRIMINATOR_LEN] != layout.discriminator {
		return Err(SdkError::Decode(format!(
			"discriminator mismatch for {}: expected {:?}, got {:?}",
			layout.name,
			layout.discriminator,
			&data[..DISCRIMINATOR_LEN]
		)));
	}
	if data.len() < layout.data_len() {
		return Err(SdkError::Decode(format!(
			"{} account data is {} bytes, expected at least {}",
			layout.name,
			data.len(),
			layout.data_len()
		)));
	}
	let mut cursor = &data[DISCRIMINATOR_LEN..];
	let mut fields = FieldValues::new();
	for field in &layout.fields {
		fields.push(&field.name, read_field(&mut cursor, field)?);
	}
	Ok(fields)
}

fn write_field(buf: &mut Vec<u8>, spec: &InstructionSpec, field: &FieldSpec, value: &FieldValue) -> SdkResult<()> {
	match (field.ty, value) {
		(FieldType::Pubkey, FieldValue::Pubkey(pk)) => {
			buf.extend_from_slice(pk.as_ref());
			Ok(())
		}
		(FieldType::U8, FieldValue::Int(v)) => put(buf, &narrow::<u8>(spec, field, *v)?),
		(FieldType::U16, FieldValue::Int(v)) => put(buf, &narrow::<u16>(spec, field, *v)?),
		(FieldType::I32, FieldValue::Int(v)) => put(buf, &narrow::<i32>(spec, field, *v)?),
		(FieldType::U64, FieldValue::Int(v)) => put(buf, &narrow::<u64>(spec, field, *v)?),
		(FieldType::I64, FieldValue::Int(v)) => put(buf, &narrow::<i64>(spec, field, *v)?),
		(ty, _) => Err(SdkError::Schema(format!(
			"{}: argument {} expects {:?}, got {:?}",
			spec.name, field.name, ty, value
		))),
	}
}

fn narrow<T: TryFrom<i128>>(spec: &InstructionSpec, field: &FieldSpec, v: i128) -> SdkResult<T> {
	T::try_from(v).map_err(|_| {
		SdkError::Schema(format!(
			"{}: argument {} = {v} is out of range for {:?}",
			spec.name, field.name, field.ty
		))
	})
}

fn put<T: BorshSerialize>(buf: &mut Vec<u8>, v: &T) -> SdkResult<()> {
	v.serialize(buf).map_err(|e| SdkError::Schema(format!("serialize: {e}")))
}

fn read_field(cursor: &mut &[u8], field: &FieldSpec) -> SdkResult<FieldValue> {
	Ok(match field.ty {
		FieldType::U8 => FieldValue::from(take::<u8>(cursor, field)?),
		FieldType::U16 => FieldValue::from(take::<u16>(cursor, field)?),
		FieldType::I32 => FieldValue::from(take::<i32>(cursor, field)?),
		FieldType::U64 => FieldValue::from(take::<u64>(cursor, field)?),
		FieldType::I64 => FieldValue::from(take::<i64>(cursor, field)?),
		FieldType::Pubkey => FieldValue::Pubkey(Pubkey::new_from_array(take::<[u8; 32]>(cursor, field)?)),
	})
}

fn take<T: BorshDeserialize>(cursor: &mut &[u8], field: &FieldSpec) -> SdkResult<T> {
	T::deserialize(cursor).map_err(|e| SdkError::Decode(format!("field {}: {e}", field.name)))
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::str::FromStr;

	fn oracle_program() -> Pubkey {
		Pubkey::from_str("FsJ3A3u2vn5cTVofAjvy6y5kwABJAqYWpe4975bi2epH").unwrap()
	}

	#[test]
	fn test_deposit_layout() {
		let schema = ProgramSchema::default();
		let data = VaultInstruction::Deposit { amount: 1_000_000 }.encode(&schema).unwrap();
		assert_eq!(data.len(), 16);
		assert_eq!(&data[..8], &[242, 35, 198, 137, 82, 225, 242, 182]);
		assert_eq!(u64::from_le_bytes(data[8..16].try_into().unwrap()), 1_000_000);
	}

	#[test]
	fn test_initialize_vault_field_order() {
		let schema = ProgramSchema::default();
		let feed = Pubkey::new_unique();
		let args = InitializeVaultArgs {
			oracle_program: oracle_program(),
			oracle_feed: feed,
			max_staleness_seconds: 60,
			max_confidence_bps: 200,
			route_threshold_price: -5,
		};
		let data = VaultInstruction::InitializeVault(args).encode(&schema).unwrap();
		assert_eq!(data.len(), 8 + 32 + 32 + 8 + 2 + 8);
		assert_eq!(&data[..8], &[48, 191, 163, 44, 71, 129, 63, 164]);
		assert_eq!(&data[8..40], oracle_program().as_ref());
		assert_eq!(&data[40..72], feed.as_ref());
		assert_eq!(u64::from_le_bytes(data[72..80].try_into().unwrap()), 60);
		assert_eq!(u16::from_le_bytes(data[80..82].try_into().unwrap()), 200);
		assert_eq!(i64::from_le_bytes(data[82..90].try_into().unwrap()), -5);
	}

	#[test]
	fn test_decode_recovers_operation() {
		let schema = ProgramSchema::default();
		let cases = [
			VaultInstruction::Deposit { amount: 7 },
			VaultInstruction::Withdraw { shares: 9 },
			VaultInstruction::RouteYield { amount: 11 },
			VaultInstruction::InitializeVault(InitializeVaultArgs {
				oracle_program: oracle_program(),
				oracle_feed: Pubkey::new_unique(),
				max_staleness_seconds: 30,
				max_confidence_bps: 10_000,
				route_threshold_price: i64::MIN,
			}),
		];
		for ix in cases {
			let data = ix.encode(&schema).unwrap();
			let spec = schema.instruction_by_discriminator(&data).unwrap();
			assert_eq!(spec.kind, ix.kind());
			assert_eq!(decode_instruction(&schema, &data).unwrap(), ix);
		}
	}

	#[test]
	fn test_negative_amount_is_schema_error() {
		let schema = ProgramSchema::default();
		let args = FieldValues::new().with("amount", -1i64);
		let err = encode_instruction(&schema, "deposit", &args).unwrap_err();
		assert!(matches!(err, SdkError::Schema(_)), "{err}");
	}

	#[test]
	fn test_dynamic_encoding_checks() {
		let schema = ProgramSchema::default();
		assert!(matches!(
			encode_instruction(&schema, "liquidate", &FieldValues::new()),
			Err(SdkError::Schema(_))
		));
		assert!(matches!(
			encode_instruction(&schema, "withdraw", &FieldValues::new()),
			Err(SdkError::Schema(_))
		));
		assert!(matches!(
			encode_instruction(&schema, "withdraw", &FieldValues::new().with("shares", i128::from(u64::MAX) + 1)),
			Err(SdkError::Schema(_))
		));
		assert!(matches!(
			encode_instruction(&schema, "withdraw", &FieldValues::new().with("shares", Pubkey::new_unique())),
			Err(SdkError::Schema(_))
		));
		let by_name = encode_instruction(&schema, "route_yield", &FieldValues::new().with("amount", 5u64)).unwrap();
		assert_eq!(by_name, VaultInstruction::RouteYield { amount: 5 }.encode(&schema).unwrap());
	}

	#[test]
	fn test_confidence_bps_not_range_checked() {
		let schema = ProgramSchema::default();
		let args = FieldValues::new()
			.with("oracle_program", oracle_program())
			.with("oracle_feed", Pubkey::new_unique())
			.with("max_staleness_seconds", 60u64)
			.with("max_confidence_bps", u16::MAX)
			.with("route_threshold_price", 0i64);
		assert!(encode_instruction(&schema, "initializeVault", &args).is_ok());
	}

	#[test]
	fn test_decode_instruction_rejects_truncated_data() {
		let schema = ProgramSchema::default();
		let data = VaultInstruction::Withdraw { shares: 1 }.encode(&schema).unwrap();
		assert!(matches!(decode_instruction(&schema, &data[..12]), Err(SdkError::Decode(_))));
		assert!(matches!(decode_instruction(&schema, &[0u8; 16]), Err(SdkError::Decode(_))));
	}
}
