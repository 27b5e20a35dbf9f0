use crate::profiles;
use crate::roles;
use aws_sdk_cognitoidentityprovider::Client as CognitoClient;
use base64::{engine::general_purpose, Engine as _};
use hmac::{Hmac, Mac};
use lambda_http::{http::StatusCode, Body, Error, Response};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    pub full_name: String,
    pub contact: String,
}

#[derive(Deserialize)]
pub struct RefreshRequest {
    pub email: String,
    pub refresh_token: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub id_token: String,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i32,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

type HmacSha256 = Hmac<Sha256>;

/// Compute the SECRET_HASH for Cognito authentication
fn compute_secret_hash(username: &str, client_id: &str, client_secret: &str) -> String {
    let message = format!("{}{}", username, client_id);
    let mut mac = HmacSha256::new_from_slice(client_secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(message.as_bytes());
    let result = mac.finalize();
    general_purpose::STANDARD.encode(result.into_bytes())
}

fn error_response(
    status: StatusCode,
    error: &str,
    message: &str,
) -> Result<Response<Body>, Error> {
    let body = ErrorResponse {
        error: error.to_string(),
        message: message.to_string(),
    };
    Ok(Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(serde_json::to_string(&body)?.into())
        .map_err(Box::new)?)
}

fn body_str(body: &Body) -> &str {
    match body {
        Body::Text(text) => text,
        Body::Binary(bytes) => std::str::from_utf8(bytes).unwrap_or(""),
        Body::Empty => "",
    }
}

/// Handle user login with Cognito
pub async fn login(
    cognito_client: &CognitoClient,
    client_id: &str,
    client_secret: &str,
    body: &Body,
) -> Result<Response<Body>, Error> {
    tracing::info!("Login request received");

    let login_request: LoginRequest = match serde_json::from_str(body_str(body)) {
        Ok(req) => req,
        Err(e) => {
            tracing::error!("Failed to parse request body: {}", e);
            return error_response(
                StatusCode::BAD_REQUEST,
                "InvalidRequest",
                &format!("Invalid request body: {}", e),
            );
        }
    };

    tracing::info!("Authenticating user: {}", login_request.email);

    let secret_hash = compute_secret_hash(&login_request.email, client_id, client_secret);

    let auth_result = cognito_client
        .initiate_auth()
        .auth_flow(aws_sdk_cognitoidentityprovider::types::AuthFlowType::UserPasswordAuth)
        .client_id(client_id)
        .auth_parameters("USERNAME", &login_request.email)
        .auth_parameters("PASSWORD", &login_request.password)
        .auth_parameters("SECRET_HASH", &secret_hash)
        .send()
        .await;

    match auth_result {
        Ok(response) => {
            if let Some(auth_result) = response.authentication_result() {
                tracing::info!("Authentication successful for user: {}", login_request.email);

                let login_response = LoginResponse {
                    id_token: auth_result.id_token().unwrap_or_default().to_string(),
                    access_token: auth_result.access_token().unwrap_or_default().to_string(),
                    refresh_token: auth_result.refresh_token().unwrap_or_default().to_string(),
                    expires_in: auth_result.expires_in(),
                };

                Ok(Response::builder()
                    .status(StatusCode::OK)
                    .header("Content-Type", "application/json")
                    .header("Access-Control-Allow-Origin", "*")
                    .body(serde_json::to_string(&login_response)?.into())
                    .map_err(Box::new)?)
            } else {
                tracing::error!("No authentication result returned");
                error_response(
                    StatusCode::UNAUTHORIZED,
                    "AuthenticationFailed",
                    "No authentication result returned",
                )
            }
        }
        Err(e) => {
            let error_message = format!("{:?}", e);
            tracing::error!("Cognito authentication error: {}", error_message);

            // Extract user-friendly error message
            let user_message = if error_message.contains("NotAuthorizedException") {
                "Incorrect email or password"
            } else if error_message.contains("UserNotConfirmedException") {
                "Please verify your email before logging in"
            } else if error_message.contains("UserNotFoundException") {
                "No account found with this email"
            } else if error_message.contains("PasswordResetRequiredException") {
                "Password reset required"
            } else if error_message.contains("TooManyRequestsException") {
                "Too many login attempts. Please try again later"
            } else {
                "Login failed. Please check your credentials"
            };

            error_response(StatusCode::UNAUTHORIZED, "AuthenticationFailed", user_message)
        }
    }
}

/// Handle user signup with Cognito. The role is carried entirely by the
/// email's plus suffix, so eligibility is checked locally before any
/// network call and the derived role is cached on the profile row.
pub async fn signup(
    cognito_client: &CognitoClient,
    dynamo_client: &aws_sdk_dynamodb::Client,
    table_name: &str,
    client_id: &str,
    client_secret: &str,
    body: &Body,
) -> Result<Response<Body>, Error> {
    tracing::info!("Signup request received");

    let signup_request: SignupRequest = match serde_json::from_str(body_str(body)) {
        Ok(req) => req,
        Err(e) => {
            tracing::error!("Failed to parse request body: {}", e);
            return error_response(
                StatusCode::BAD_REQUEST,
                "InvalidRequest",
                &format!("Invalid request body: {}", e),
            );
        }
    };

    if !roles::is_eligible_for_signup(&signup_request.email) {
        return error_response(
            StatusCode::BAD_REQUEST,
            "InvalidSignupEmail",
            "Please use your Gmail address with +manager or +supervisor (e.g., your.email+manager@gmail.com)",
        );
    }

    if signup_request.full_name.trim().is_empty() || signup_request.contact.trim().is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "InvalidRequest",
            "Please fill in all fields",
        );
    }

    tracing::info!("Signing up user: {}", signup_request.email);

    let secret_hash = compute_secret_hash(&signup_request.email, client_id, client_secret);

    let signup_result = cognito_client
        .sign_up()
        .client_id(client_id)
        .username(&signup_request.email)
        .password(&signup_request.password)
        .secret_hash(&secret_hash)
        .user_attributes(
            aws_sdk_cognitoidentityprovider::types::AttributeType::builder()
                .name("email")
                .value(&signup_request.email)
                .build()?,
        )
        .user_attributes(
            aws_sdk_cognitoidentityprovider::types::AttributeType::builder()
                .name("name")
                .value(&signup_request.full_name)
                .build()?,
        )
        .send()
        .await;

    match signup_result {
        Ok(response) => {
            tracing::info!("Signup successful for user: {}", signup_request.email);

            let role = roles::derive_role(&signup_request.email);
            let user_id = response.user_sub().to_string();

            if let Err(e) = profiles::put_profile_records(
                dynamo_client,
                table_name,
                &user_id,
                &signup_request.email,
                role,
                &signup_request.full_name,
                &signup_request.contact,
            )
            .await
            {
                tracing::error!("Failed to write profile after signup: {}", e);
                // The account exists in Cognito; the profile read path
                // reports the orphan and the client can re-register.
            }

            Ok(Response::builder()
                .status(StatusCode::OK)
                .header("Content-Type", "application/json")
                .header("Access-Control-Allow-Origin", "*")
                .body(
                    serde_json::json!({
                        "message": "Account created successfully! You can now sign in.",
                        "role": role,
                    })
                    .to_string()
                    .into(),
                )
                .map_err(Box::new)?)
        }
        Err(e) => {
            let error_message = format!("{:?}", e);
            tracing::error!("Cognito signup error: {}", error_message);

            // Extract user-friendly error message (only send this to frontend)
            let user_message = if error_message.contains("InvalidPasswordException") {
                "Password must contain at least 8 characters with uppercase, lowercase, number, and special character"
            } else if error_message.contains("UsernameExistsException") {
                "An account with this email already exists"
            } else if error_message.contains("InvalidParameterException") {
                "Invalid email or password format"
            } else {
                "Signup failed. Please check your credentials and try again."
            };

            error_response(StatusCode::BAD_REQUEST, "SignupFailed", user_message)
        }
    }
}

/// Exchange a refresh token for fresh session tokens
pub async fn refresh_token(
    cognito_client: &CognitoClient,
    client_id: &str,
    client_secret: &str,
    body: &Body,
) -> Result<Response<Body>, Error> {
    let refresh_request: RefreshRequest = match serde_json::from_str(body_str(body)) {
        Ok(req) => req,
        Err(e) => {
            tracing::error!("Failed to parse request body: {}", e);
            return error_response(
                StatusCode::BAD_REQUEST,
                "InvalidRequest",
                &format!("Invalid request body: {}", e),
            );
        }
    };

    let secret_hash = compute_secret_hash(&refresh_request.email, client_id, client_secret);

    let auth_result = cognito_client
        .initiate_auth()
        .auth_flow(aws_sdk_cognitoidentityprovider::types::AuthFlowType::RefreshTokenAuth)
        .client_id(client_id)
        .auth_parameters("REFRESH_TOKEN", &refresh_request.refresh_token)
        .auth_parameters("SECRET_HASH", &secret_hash)
        .send()
        .await;

    match auth_result {
        Ok(response) => {
            if let Some(auth_result) = response.authentication_result() {
                let login_response = LoginResponse {
                    id_token: auth_result.id_token().unwrap_or_default().to_string(),
                    access_token: auth_result.access_token().unwrap_or_default().to_string(),
                    // Cognito does not rotate the refresh token on this flow
                    refresh_token: auth_result
                        .refresh_token()
                        .unwrap_or(&refresh_request.refresh_token)
                        .to_string(),
                    expires_in: auth_result.expires_in(),
                };

                Ok(Response::builder()
                    .status(StatusCode::OK)
                    .header("Content-Type", "application/json")
                    .header("Access-Control-Allow-Origin", "*")
                    .body(serde_json::to_string(&login_response)?.into())
                    .map_err(Box::new)?)
            } else {
                error_response(
                    StatusCode::UNAUTHORIZED,
                    "RefreshFailed",
                    "No authentication result returned",
                )
            }
        }
        Err(e) => {
            tracing::error!("Cognito refresh error: {:?}", e);
            error_response(
                StatusCode::UNAUTHORIZED,
                "RefreshFailed",
                "Session expired. Please sign in again",
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_dynamodb::Client as DynamoClient;

    async fn test_clients() -> (CognitoClient, DynamoClient) {
        std::env::set_var("AWS_REGION", "ap-southeast-2");
        let config = aws_config::load_from_env().await;
        (CognitoClient::new(&config), DynamoClient::new(&config))
    }

    #[tokio::test]
    async fn signup_rejects_ineligible_email_before_any_network_call() {
        let (cognito, dynamo) = test_clients().await;
        let body = Body::Text(
            serde_json::json!({
                "email": "a@yahoo.com",
                "password": "Password1!",
                "full_name": "A",
                "contact": "0400 000 000",
            })
            .to_string(),
        );

        let response = signup(&cognito, &dynamo, "sitestock", "client", "secret", &body)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = String::from_utf8(response.body().to_vec()).unwrap();
        assert!(body.contains("InvalidSignupEmail"));
    }

    #[tokio::test]
    async fn signup_rejects_unknown_role_token() {
        let (cognito, dynamo) = test_clients().await;
        let body = Body::Text(
            serde_json::json!({
                "email": "a+other@gmail.com",
                "password": "Password1!",
                "full_name": "A",
                "contact": "0400 000 000",
            })
            .to_string(),
        );

        let response = signup(&cognito, &dynamo, "sitestock", "client", "secret", &body)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn signup_requires_name_and_contact() {
        let (cognito, dynamo) = test_clients().await;
        let body = Body::Text(
            serde_json::json!({
                "email": "a+supervisor@gmail.com",
                "password": "Password1!",
                "full_name": "",
                "contact": "",
            })
            .to_string(),
        );

        let response = signup(&cognito, &dynamo, "sitestock", "client", "secret", &body)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = String::from_utf8(response.body().to_vec()).unwrap();
        assert!(body.contains("Please fill in all fields"));
    }

    #[tokio::test]
    async fn login_rejects_malformed_body() {
        let (cognito, _) = test_clients().await;
        let body = Body::Text("not json".to_string());

        let response = login(&cognito, "client", "secret", &body).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn secret_hash_is_deterministic() {
        let a = compute_secret_hash("user@gmail.com", "client", "secret");
        let b = compute_secret_hash("user@gmail.com", "client", "secret");
        assert_eq!(a, b);
        assert_ne!(a, compute_secret_hash("other@gmail.com", "client", "secret"));
    }
}
