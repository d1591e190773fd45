pub mod auth;

use crate::auth::{
    AuthApi, AuthResult, ConsoleConfig, CredentialStore, FileCredentialStore, HttpTransport,
    RequestGateway, SessionManager, Transport,
};
use env_logger::Env;
use std::sync::{Arc, Once};

static LOGGER: Once = Once::new();

pub fn init_logger() {
    LOGGER.call_once(|| {
        env_logger::Builder::from_env(Env::default().default_filter_or("info,reqwest=warn,hyper=warn"))
            .format_timestamp(None)
            .init();
    });
}

/// Everything a console front end needs: one store, one gateway, and the
/// session manager subscribed to that gateway.
pub struct ConsoleContext {
    pub config: ConsoleConfig,
    pub store: Arc<dyn CredentialStore>,
    pub gateway: Arc<RequestGateway>,
    pub session: Arc<SessionManager>,
}

impl ConsoleContext {
    /// Opens the on-disk credential store and the HTTP transport, then
    /// bootstraps the session.
    pub fn from_config(config: ConsoleConfig) -> AuthResult<Self> {
        let store = Arc::new(FileCredentialStore::open(&config.credentials_path)?);
        let transport = Arc::new(HttpTransport::new(&config)?);
        log::debug!(
            "console context: api={} credentials={}",
            config.api_base_url,
            store.path().display()
        );
        Ok(Self::assemble(config, store, transport))
    }

    pub fn assemble(
        config: ConsoleConfig,
        store: Arc<dyn CredentialStore>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let gateway = Arc::new(RequestGateway::new(transport, store.clone()));
        let api = AuthApi::new(gateway.clone(), config.endpoints.clone());
        let session = SessionManager::start(store.clone(), api);

        Self {
            config,
            store,
            gateway,
            session,
        }
    }
}

pub mod test_support {
    use std::sync::Arc;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use crate::auth::{
        AuthResult, OutboundRequest, Role, Transport, TransportResponse, UserRecord,
    };

    type Responder = dyn Fn(&OutboundRequest) -> TransportResponse + Send + Sync;

    /// Transport that answers from a closure and records every request.
    pub struct ScriptedTransport {
        responder: Box<Responder>,
        requests: Mutex<Vec<OutboundRequest>>,
    }

    impl ScriptedTransport {
        pub fn new(
            responder: impl Fn(&OutboundRequest) -> TransportResponse + Send + Sync + 'static,
        ) -> Self {
            Self {
                responder: Box::new(responder),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn shared(
            responder: impl Fn(&OutboundRequest) -> TransportResponse + Send + Sync + 'static,
        ) -> Arc<Self> {
            Arc::new(Self::new(responder))
        }

        pub fn requests(&self) -> Vec<OutboundRequest> {
            self.requests.lock().clone()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn dispatch(&self, request: OutboundRequest) -> AuthResult<TransportResponse> {
            self.requests.lock().push(request.clone());
            // Suspend like real I/O so concurrent calls interleave.
            tokio::task::yield_now().await;
            Ok((self.responder)(&request))
        }
    }

    pub fn user(id: &str, email: &str, role: Role) -> UserRecord {
        UserRecord {
            id: id.to_string(),
            email: email.to_string(),
            role,
            created_at: None,
        }
    }
}
