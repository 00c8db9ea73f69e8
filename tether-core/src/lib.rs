// ABOUTME: Realtime session layer between an operator and a remote coding agent.
// ABOUTME: Connection lifecycle, envelope routing, task state, and the aggregated session store.

pub mod address;
pub mod config;
pub mod connection;
pub mod envelope;
pub mod error;
pub mod message;
pub mod paths;
pub mod reconnect;
pub mod router;
pub mod session;
pub mod store;
pub mod subscribers;
pub mod task;
pub mod workspace;

pub use address::ChannelAddress;
pub use config::Config;
pub use connection::{ConnectionConfig, ConnectionEvent, ConnectionManager, ConnectionStatus};
pub use envelope::{Action, Envelope};
pub use error::{SessionError, SessionResult};
pub use message::{ChatMessage, MessageKind, Role};
pub use router::{ClassifiedEvent, MessageRouter, RouterStats};
pub use session::{spawn, Session, SessionHandle, StoreEvents};
pub use store::{SessionSnapshot, SessionStore, StoreEvent};
pub use task::{AgentTask, PlanStep, StepStatus, TaskStatus};
