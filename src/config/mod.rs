//! Runtime settings.
//!
//! - `duration` - human-readable duration strings (`"500ms"`, `"5s"`, `"1m"`)
//! - `settings` - [`Settings`] and its layered loader (defaults, YAML file,
//!   `VRT_*` environment variables, CLI overrides)

mod duration;
mod settings;

pub use duration::*;
pub use settings::*;
