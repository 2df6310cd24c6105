//! Harbor Remote Clients
//!
//! Relational cache of the account's other clients: their records,
//! their open tabs, and the commands queued for them. Sync fills these
//! tables; the UI only reads them.

mod client;
mod command;
mod device;
mod error;
mod store;
mod tab;

pub use client::RemoteClient;
pub use command::SyncCommand;
pub use device::RemoteDevice;
pub use error::ClientsError;
pub use store::ClientsStore;
pub use tab::RemoteTab;

pub type Result<T> = std::result::Result<T, ClientsError>;
