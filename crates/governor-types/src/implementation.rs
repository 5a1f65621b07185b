//! Self-registration for pluggable implementations.
//!
//! Storage backends, signers, chain clients, multisig services and verifiers
//! are all selected by name from the configuration file. Each implementation
//! module exposes a `Registry` type implementing this trait so the binary can
//! build its name to factory tables without hard-coding constructors.

/// Base trait for implementation registries.
pub trait ImplementationRegistry {
	/// The name used in configuration files to reference this implementation,
	/// e.g. "file" for `storage.implementations.file`.
	const NAME: &'static str;

	/// The factory function type this implementation provides.
	type Factory;

	/// Returns the factory that builds this implementation from its TOML table.
	fn factory() -> Self::Factory;
}
