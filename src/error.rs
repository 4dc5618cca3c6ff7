use solana_client::client_error::ClientError;
use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

use crate::oracle::OracleRejection;
use crate::program_error::ProgramError;

#[derive(Error, Debug)]
pub enum SdkError {
	/// Unknown operation/account, missing or out-of-range argument. Never retried.
	#[error("Schema error: {0}")]
	Schema(String),
	/// Account bytes that do not match the expected layout. Never partially decoded.
	#[error("Decode error: {0}")]
	Decode(String),
	#[error("No valid bump seed found for program {program_id}")]
	NoValidBump { program_id: Pubkey },
	#[error("Account not found: {0}")]
	NotFound(Pubkey),
	#[error("Oracle price unavailable for {0}")]
	PriceUnavailable(Pubkey),
	#[error("Oracle confidence unavailable for {0}")]
	ConfidenceUnavailable(Pubkey),
	#[error("Oracle price rejected: {0}")]
	OracleRejected(OracleRejection),
	#[error("{error}")]
	Program {
		error: ProgramError,
		#[source]
		source: Box<ClientError>,
	},
	#[error("Transaction failed after {attempts} attempt(s): {source}")]
	Submission {
		attempts: u32,
		#[source]
		source: Box<ClientError>,
	},
	#[error("RPC error during {context}: {source}")]
	Rpc {
		context: &'static str,
		#[source]
		source: Box<ClientError>,
	},
	#[error("Transaction build error: {0}")]
	Transaction(String),
	#[error("Config error: {0}")]
	Config(String),
}

impl SdkError {
	pub fn rpc(context: &'static str, source: ClientError) -> Self {
		SdkError::Rpc { context, source: Box::new(source) }
	}

	/// The translated on-chain error, if this failure carries one.
	pub fn program_error(&self) -> Option<&ProgramError> {
		match self {
			SdkError::Program { error, .. } => Some(error),
			_ => None,
		}
	}
}

pub type SdkResult<T> = Result<T, SdkError>;
