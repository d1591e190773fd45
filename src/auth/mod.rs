//! Client-side session subsystem: credential persistence, the request
//! gateway every backend call goes through, the session state machine, and
//! the access gate that guards console screens.

pub mod api;
pub mod config;
pub mod error;
pub mod gate;
pub mod gateway;
pub mod responses;
pub mod session;
pub mod store;

pub use api::AuthApi;
pub use config::{ConsoleConfig, EndpointPaths};
pub use error::{AuthError, AuthResult, ErrorKind};
pub use gate::{AccessGate, GateDecision, Guarded, Route, navigation_for};
pub use gateway::{
    AuthEventHandler, HttpTransport, OutboundRequest, RequestEnvelope, RequestGateway, Transport,
    TransportResponse,
};
pub use responses::{ApiResponse, LoginData, Role, UserRecord};
pub use session::{LogoutReason, SessionEvent, SessionManager, SessionPhase, SessionSnapshot};
pub use store::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
