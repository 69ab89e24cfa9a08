// Adapters layer: concrete implementations for external systems.
// Local storage still lives under src/config/cli.rs.

pub mod cloudrf;
