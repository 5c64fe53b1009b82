/*!
 * Configuration
 * TOML-driven construction of accounts and managers
 */

mod errors;
mod loader;
mod params;
mod registry;

pub use errors::{ConfigError, ConfigResult};
pub use loader::Configurator;
pub use params::Params;
pub use registry::{AccountFactory, BuildContext, ManagerFactory, Registry};
