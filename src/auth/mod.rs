//! Local auth state and the login/logout broadcast bus.
//!
//! The scoring client reads its bearer token from an [`AuthSession`]; an
//! [`AuthListener`] keeps that session in sync with events published on the
//! [`AuthBus`] by whatever component owns the login flow.
//!
//! ```rust,no_run
//! use nihao_voice::auth::{AuthBus, AuthEvent, AuthSession};
//!
//! # async fn example() {
//! let bus = AuthBus::default();
//! let session = AuthSession::default();
//! tokio::spawn(bus.subscribe().run(session.clone()));
//!
//! bus.publish(AuthEvent::LoggedIn { token: "jwt".into() });
//! # }
//! ```

pub mod bus;

pub use bus::{AuthBus, AuthEvent, AuthListener, AuthSession};
