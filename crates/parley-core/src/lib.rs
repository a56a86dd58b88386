//! Parley chat client core.
//!
//! Session and room lifecycle plus the message protocol. Rendering and
//! media capture live in the host application.

pub mod data_uri;
pub mod endpoint;
pub mod errors;
pub mod events;
pub mod history;
pub mod message;
pub mod protocol;
pub mod room;
pub mod session;
pub mod settings;
pub mod transport;

pub use data_uri::DataUri;
pub use errors::ParleyError;
pub use events::{
    ConnectionState, EventEmitter, ListenerId, ParleyEvent, ParleyEventListener, PresenceEvent,
    PresenceKind,
};
pub use history::MessageHistory;
pub use message::{ChatMessage, MessageId, MessageKind, OutgoingMessage};
pub use protocol::{ClientIntent, ServerPush};
pub use room::RoomController;
pub use session::{Delivery, DropReason, SessionConfig, SessionManager};
pub use settings::{Settings, SettingsStore};
pub use transport::{Connector, MemoryConnector, WsConnector};
