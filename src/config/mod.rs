//! # Configuration
//!
//! `Settings::load` layers built-in defaults, optional `config/default.toml`
//! and `config/{RUN_ENV}.toml` files, `APP__SECTION__KEY` variables, and a few
//! direct overrides (`REDIS_URL`, `BUS_URL`, `COORDINATOR_URL`,
//! `COORDINATOR_API_KEY`, `SERVER_HOST`, `SERVER_PORT`). A `.env` file is
//! read first when present.
//!
//! ```rust,ignore
//! let settings = live_relay::config::Settings::load()?;
//! let ttl = settings.session.buffer_ttl();
//! ```

mod settings;

pub use settings::*;
