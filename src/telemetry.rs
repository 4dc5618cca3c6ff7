use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

/// Default directives when `RUST_LOG` is unset. The RPC client logs every
/// request at debug, so it is held at warn.
pub const DEFAULT_FILTER: &str = "info,solana_rpc_client=warn,solana_client=warn";

pub fn init_tracing() -> bool {
	init_tracing_with(DEFAULT_FILTER)
}

/// Installs the global subscriber. Returns `false` when one is already set,
/// which happens when tests or an embedding binary got there first.
pub fn init_tracing_with(default_filter: &str) -> bool {
	let env_filter = EnvFilter::try_from_default_env()
		.or_else(|_| EnvFilter::try_new(default_filter))
		.unwrap_or_else(|_| EnvFilter::new("info"));

	let fmt_layer = fmt::layer().with_target(false).with_level(true).with_writer(std::io::stderr);
	let subscriber = Registry::default().with(env_filter).with(fmt_layer);
	tracing::subscriber::set_global_default(subscriber).is_ok()
}
