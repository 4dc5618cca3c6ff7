//! Client for the Urbanium vault program: schema registry, instruction codec,
//! address derivation, oracle reads and transaction submission.

pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod instructions;
pub mod oracle;
pub mod pda;
pub mod program_error;
pub mod rpc;
pub mod schema;
pub mod state;
pub mod telemetry;

pub use client::{RetryPolicy, SubmitState, VaultClient};
pub use error::{SdkError, SdkResult};
pub use schema::{ProgramSchema, URBANIUM_PROGRAM_ID};
