//! Client-side chat state engine.
//!
//! A [`ChatClient`] owns a [`ChatSession`] (chat list, open thread, selection)
//! and the notification subscription feeding it. Pushed notifications are
//! decoded by [`codec`], applied by [`reconcile`] and observed through
//! [`ClientEvent`]s; user actions go out through a [`ChatApi`].

pub mod api;
pub mod codec;
pub mod config;
pub mod connection;
pub mod identity;
pub mod reconcile;
pub mod session;
pub mod stomp;
pub mod store;

pub use api::{ChatApi, HttpChatApi, MediaUpload};
pub use codec::{decode_notification, DecodeError, Decoded, Notification};
pub use config::{load_settings, load_settings_from, ClientSettings};
pub use connection::{ConnectionError, ConnectionState, NotificationConnection};
pub use identity::{BearerTokenIdentity, IdentityError, IdentityProvider, StaticIdentity};
pub use reconcile::{reconcile, IgnoreReason, Reconciled};
pub use session::{ChatClient, ChatSession, ClientEvent, SessionSnapshot};
pub use store::{wrap_preview, ChatStore, MessageStore};
