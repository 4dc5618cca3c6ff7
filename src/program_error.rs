use std::fmt;

use serde::{Deserialize, Serialize};
use solana_client::client_error::ClientError;
use solana_sdk::{instruction::InstructionError, transaction::TransactionError};

use crate::schema::ProgramSchema;

const CUSTOM_ERROR_MARKER: &str = "custom program error: ";

/// An on-chain rejection resolved against the schema's error table. Name and
/// message are absent when the code is not in the table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramError {
	pub code: u32,
	pub name: Option<String>,
	pub msg: Option<String>,
}

impl ProgramError {
	pub fn resolve(code: u32, schema: &ProgramSchema) -> Self {
		let entry = schema.error(code);
		Self {
			code,
			name: entry.map(|e| e.name.clone()),
			msg: entry.map(|e| e.msg.clone()).filter(|m| !m.is_empty()),
		}
	}
}

impl fmt::Display for ProgramError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "program error {}", self.code)?;
		if let Some(name) = &self.name {
			write!(f, " ({name})")?;
		}
		if let Some(msg) = &self.msg {
			write!(f, ": {msg}")?;
		}
		Ok(())
	}
}

/// Finds `custom program error: <code>` in a raw failure message. A hex code
/// anywhere in the message wins over a decimal one.
pub fn translate(raw: &str, schema: &ProgramSchema) -> Option<ProgramError> {
	let code = find_hex_code(raw).or_else(|| find_decimal_code(raw))?;
	Some(ProgramError::resolve(code, schema))
}

/// Prefers the structured `InstructionError::Custom` code when the RPC error
/// carries a transaction error, otherwise scans the rendered message.
pub fn translate_client_error(err: &ClientError, schema: &ProgramSchema) -> Option<ProgramError> {
	if let Some(TransactionError::InstructionError(_, InstructionError::Custom(code))) = err.get_transaction_error() {
		return Some(ProgramError::resolve(code, schema));
	}
	translate(&err.to_string(), schema)
}

fn codes_after_marker(raw: &str) -> impl Iterator<Item = &str> {
	raw.match_indices(CUSTOM_ERROR_MARKER).map(move |(i, _)| &raw[i + CUSTOM_ERROR_MARKER.len()..])
}

fn find_hex_code(raw: &str) -> Option<u32> {
	codes_after_marker(raw).find_map(|rest| {
		let digits = rest.strip_prefix("0x")?;
		let end = digits.find(|c: char| !c.is_ascii_hexdigit()).unwrap_or(digits.len());
		u32::from_str_radix(&digits[..end], 16).ok()
	})
}

fn find_decimal_code(raw: &str) -> Option<u32> {
	// A hex code that failed to parse is not a decimal zero.
	codes_after_marker(raw).filter(|rest| !rest.starts_with("0x")).find_map(|rest| {
		let end = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
		rest[..end].parse().ok()
	})
}
