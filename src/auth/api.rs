use std::sync::Arc;

use crate::auth::config::EndpointPaths;
use crate::auth::gateway::{RequestEnvelope, RequestGateway};
use crate::auth::responses::{
    ApiResponse, ChangePasswordRequest, LoginData, LoginRequest, RegisterRequest, Role,
    UserRecord,
};
use crate::auth::AuthResult;

/// Auth endpoints of the backend, each a single gateway call.
///
/// Returns the raw envelopes; persisting a login is the session manager's job.
#[derive(Clone)]
pub struct AuthApi {
    gateway: Arc<RequestGateway>,
    paths: EndpointPaths,
}

impl AuthApi {
    pub fn new(gateway: Arc<RequestGateway>, paths: EndpointPaths) -> Self {
        Self { gateway, paths }
    }

    pub fn gateway(&self) -> &Arc<RequestGateway> {
        &self.gateway
    }

    pub async fn login(&self, email: &str, password: &str) -> AuthResult<ApiResponse<LoginData>> {
        let payload = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let envelope = RequestEnvelope::post(&self.paths.login, &payload)?.without_auth();
        self.gateway.send(envelope).await
    }

    pub async fn register(
        &self,
        email: &str,
        password: &str,
        role: Role,
    ) -> AuthResult<ApiResponse<UserRecord>> {
        let payload = RegisterRequest {
            email: email.to_string(),
            password: password.to_string(),
            role,
        };
        self.gateway
            .send(RequestEnvelope::post(&self.paths.register, &payload)?)
            .await
    }

    pub async fn profile(&self) -> AuthResult<ApiResponse<UserRecord>> {
        self.gateway
            .send(RequestEnvelope::get(&self.paths.profile))
            .await
    }

    pub async fn change_password(
        &self,
        current_password: &str,
        new_password: &str,
    ) -> AuthResult<ApiResponse<serde_json::Value>> {
        let payload = ChangePasswordRequest {
            current_password: current_password.to_string(),
            new_password: new_password.to_string(),
        };
        self.gateway
            .send(RequestEnvelope::put(&self.paths.change_password, &payload)?)
            .await
    }

    pub async fn list_users(&self) -> AuthResult<ApiResponse<Vec<UserRecord>>> {
        self.gateway
            .send(RequestEnvelope::get(&self.paths.users))
            .await
    }

    pub async fn delete_user(&self, id: &str) -> AuthResult<ApiResponse<serde_json::Value>> {
        self.gateway
            .send(RequestEnvelope::delete(self.paths.user(id)))
            .await
    }
}
