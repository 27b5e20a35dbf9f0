pub mod types;
pub mod roles;
pub mod auth;
pub mod profiles;
pub mod supervisors;
pub mod sites;
pub mod materials;
pub mod assignments;
pub mod email;

use aws_sdk_cognitoidentityprovider::Client as CognitoClient;
use aws_sdk_dynamodb::Client as DynamoClient;
use aws_sdk_sesv2::Client as SesClient;
use std::sync::Arc;

/// Shared application state
pub struct AppState {
    pub cognito_client: CognitoClient,
    pub dynamo_client: DynamoClient,
    pub ses_client: SesClient,
}

impl AppState {
    pub fn new(
        cognito_client: CognitoClient,
        dynamo_client: DynamoClient,
        ses_client: SesClient,
    ) -> Arc<Self> {
        Arc::new(Self {
            cognito_client,
            dynamo_client,
            ses_client,
        })
    }
}

/// Caller identity for one request, rebuilt by the router on every
/// invocation. Role always comes from the token email, never from the
/// stored profile copy, so a stale profile row cannot widen privileges.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub user_id: String,
    pub email: String,
    pub role: roles::Role,
}

impl RequestContext {
    pub fn new(user_id: String, email: String) -> Self {
        let role = roles::derive_role(&email);
        Self {
            user_id,
            email,
            role,
        }
    }

    pub fn is_manager(&self) -> bool {
        self.role == roles::Role::Manager
    }
}
