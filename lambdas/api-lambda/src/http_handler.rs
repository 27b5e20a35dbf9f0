use lambda_http::{
    http::{Method, StatusCode},
    Body, Error, Request, RequestExt, Response,
};
use sitestock_shared::{
    assignments, auth, materials, profiles, sites, supervisors, AppState, RequestContext,
};
use std::env;
use std::sync::Arc;

/// Main Lambda handler - routes requests to auth, profile, supervisor,
/// site and material endpoints
pub(crate) async fn function_handler(
    event: Request,
    state: Arc<AppState>,
) -> Result<Response<Body>, Error> {
    let method = event.method();
    let path = event.uri().path();
    let body = event.body();
    tracing::info!("API invoked - Method: {} Path: {}", method, path);

    // Handle CORS preflight
    if method == "OPTIONS" {
        return Ok(Response::builder()
            .status(StatusCode::OK)
            .header("Access-Control-Allow-Origin", "*")
            .header(
                "Access-Control-Allow-Methods",
                "GET,POST,PUT,PATCH,DELETE,OPTIONS",
            )
            .header(
                "Access-Control-Allow-Headers",
                "Content-Type,Authorization,X-User-Id,X-User-Email",
            )
            .body(Body::Empty)
            .map_err(Box::new)?);
    }

    // Auth endpoints (no JWT validation)
    if path.starts_with("/login") {
        let client_id = env::var("COGNITO_CLIENT_ID").expect("COGNITO_CLIENT_ID must be set");
        let client_secret =
            env::var("COGNITO_CLIENT_SECRET").expect("COGNITO_CLIENT_SECRET must be set");

        return match method {
            &Method::POST => {
                auth::login(&state.cognito_client, &client_id, &client_secret, body).await
            }
            _ => method_not_allowed(),
        };
    }

    if path.starts_with("/signup") {
        let client_id = env::var("COGNITO_CLIENT_ID").expect("COGNITO_CLIENT_ID must be set");
        let client_secret =
            env::var("COGNITO_CLIENT_SECRET").expect("COGNITO_CLIENT_SECRET must be set");
        let table_name = env::var("TABLE_NAME").unwrap_or_else(|_| "sitestock".to_string());

        return match method {
            &Method::POST => {
                auth::signup(
                    &state.cognito_client,
                    &state.dynamo_client,
                    &table_name,
                    &client_id,
                    &client_secret,
                    body,
                )
                .await
            }
            _ => method_not_allowed(),
        };
    }

    if path.starts_with("/refresh") {
        let client_id = env::var("COGNITO_CLIENT_ID").expect("COGNITO_CLIENT_ID must be set");
        let client_secret =
            env::var("COGNITO_CLIENT_SECRET").expect("COGNITO_CLIENT_SECRET must be set");

        return match method {
            &Method::POST => {
                auth::refresh_token(&state.cognito_client, &client_id, &client_secret, body).await
            }
            _ => method_not_allowed(),
        };
    }

    let table_name = env::var("TABLE_NAME").unwrap_or_else(|_| "sitestock".to_string());

    // Profile routes (JWT validated by API Gateway)
    if path.starts_with("/profiles") {
        let Some(ctx) = caller_context(&event) else {
            return unauthorized();
        };
        let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        return match (method, parts.as_slice()) {
            // GET /profiles/me - current profile with assigned site
            (&Method::GET, ["profiles", "me"]) => {
                profiles::get_my_profile(&state.dynamo_client, &table_name, &ctx.user_id).await
            }
            // PATCH /profiles/me - update own name/contact
            (&Method::PATCH, ["profiles", "me"]) => {
                profiles::update_my_profile(&state.dynamo_client, &table_name, &ctx.user_id, body)
                    .await
            }
            _ => not_found(),
        };
    }

    // Supervisor directory routes (manager only)
    if path.starts_with("/supervisors") {
        let Some(ctx) = caller_context(&event) else {
            return unauthorized();
        };
        if !ctx.is_manager() {
            return forbidden();
        }
        let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        return match (method, parts.as_slice()) {
            // GET /supervisors - list supervisor profiles
            (&Method::GET, ["supervisors"]) => {
                supervisors::list_supervisors(&state.dynamo_client, &table_name).await
            }
            // POST /supervisors - provision a supervisor account
            (&Method::POST, ["supervisors"]) => {
                supervisors::create_supervisor(
                    &state.cognito_client,
                    &state.dynamo_client,
                    &state.ses_client,
                    &table_name,
                    body,
                )
                .await
            }
            // PATCH /supervisors/{id} - update a supervisor profile
            (&Method::PATCH, ["supervisors", user_id]) => {
                supervisors::update_supervisor(&state.dynamo_client, &table_name, user_id, body)
                    .await
            }
            // DELETE /supervisors/{id} - delete account and profile
            (&Method::DELETE, ["supervisors", user_id]) => {
                supervisors::delete_supervisor(
                    &state.cognito_client,
                    &state.dynamo_client,
                    &table_name,
                    user_id,
                )
                .await
            }
            // DELETE /supervisors/{id}/assignment - unassign from any site
            (&Method::DELETE, ["supervisors", user_id, "assignment"]) => {
                assignments::unassign_supervisor(&state.dynamo_client, &table_name, user_id).await
            }
            _ => not_found(),
        };
    }

    // Site routes
    if path.starts_with("/sites") {
        let Some(ctx) = caller_context(&event) else {
            return unauthorized();
        };
        let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        return match (method, parts.as_slice()) {
            // --- SITES ---
            // POST /sites - create site
            (&Method::POST, ["sites"]) => {
                if ctx.is_manager() {
                    sites::create_site(&state.dynamo_client, &table_name, body).await
                } else {
                    forbidden()
                }
            }
            // GET /sites - list all sites
            (&Method::GET, ["sites"]) => {
                if ctx.is_manager() {
                    sites::list_sites(&state.dynamo_client, &table_name).await
                } else {
                    forbidden()
                }
            }
            // GET /sites/my - the caller's assigned site
            (&Method::GET, ["sites", "my"]) => {
                sites::get_my_site(&state.dynamo_client, &table_name, &ctx.user_id).await
            }
            // GET /sites/{id} - get site
            (&Method::GET, ["sites", site_id]) => {
                if can_view_site(&state, &table_name, &ctx, site_id).await {
                    sites::get_site(&state.dynamo_client, &table_name, site_id).await
                } else {
                    forbidden()
                }
            }
            // PATCH /sites/{id} - update site
            (&Method::PATCH, ["sites", site_id]) => {
                if ctx.is_manager() {
                    sites::update_site(&state.dynamo_client, &table_name, site_id, body).await
                } else {
                    forbidden()
                }
            }
            // DELETE /sites/{id} - delete site and cascade
            (&Method::DELETE, ["sites", site_id]) => {
                if ctx.is_manager() {
                    sites::delete_site(&state.dynamo_client, &table_name, site_id).await
                } else {
                    forbidden()
                }
            }

            // --- SUPERVISOR ASSIGNMENT ---
            // POST /sites/{id}/supervisor - assign supervisor
            (&Method::POST, ["sites", site_id, "supervisor"]) => {
                if ctx.is_manager() {
                    assignments::assign_supervisor(&state.dynamo_client, &table_name, site_id, body)
                        .await
                } else {
                    forbidden()
                }
            }
            // GET /sites/{id}/supervisor - current supervisor or null
            (&Method::GET, ["sites", site_id, "supervisor"]) => {
                if can_view_site(&state, &table_name, &ctx, site_id).await {
                    assignments::get_site_supervisor(&state.dynamo_client, &table_name, site_id)
                        .await
                } else {
                    forbidden()
                }
            }
            // GET /sites/{id}/supervisor/{uid} - check a specific pair
            (&Method::GET, ["sites", site_id, "supervisor", user_id]) => {
                if ctx.is_manager() {
                    assignments::check_site_assignment(
                        &state.dynamo_client,
                        &table_name,
                        site_id,
                        user_id,
                    )
                    .await
                } else {
                    forbidden()
                }
            }

            // --- MATERIALS ---
            // GET /sites/{id}/materials - list site materials
            (&Method::GET, ["sites", site_id, "materials"]) => {
                if can_view_site(&state, &table_name, &ctx, site_id).await {
                    materials::list_site_materials(&state.dynamo_client, &table_name, site_id)
                        .await
                } else {
                    forbidden()
                }
            }
            // POST /sites/{id}/materials - create material
            (&Method::POST, ["sites", site_id, "materials"]) => {
                if can_view_site(&state, &table_name, &ctx, site_id).await {
                    materials::create_material(&state.dynamo_client, &table_name, site_id, body)
                        .await
                } else {
                    forbidden()
                }
            }
            // PATCH /sites/{sid}/materials/{mid} - update material
            (&Method::PATCH, ["sites", site_id, "materials", material_id]) => {
                if can_view_site(&state, &table_name, &ctx, site_id).await {
                    materials::update_material(
                        &state.dynamo_client,
                        &table_name,
                        site_id,
                        material_id,
                        body,
                    )
                    .await
                } else {
                    forbidden()
                }
            }
            // DELETE /sites/{sid}/materials/{mid} - delete material (manager only)
            (&Method::DELETE, ["sites", site_id, "materials", material_id]) => {
                if ctx.is_manager() {
                    materials::delete_material(
                        &state.dynamo_client,
                        &table_name,
                        site_id,
                        material_id,
                    )
                    .await
                } else {
                    forbidden()
                }
            }
            _ => not_found(),
        };
    }

    // No matching route
    tracing::warn!("No route matched - Method: {} Path: {}", method, path);
    not_found()
}

/// One claim from the request: an X-* header override in local
/// development, otherwise the JWT claims the API Gateway authorizer
/// attached to the request context.
fn claim(event: &Request, header: &str, name: &str) -> Option<String> {
    event
        .headers()
        .get(header)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .or_else(|| {
            event
                .request_context_ref()
                .and_then(|rc| rc.authorizer())
                .and_then(|auth| auth.jwt.as_ref())
                .and_then(|jwt| jwt.claims.get(name))
                .map(|s| s.to_string())
        })
}

fn caller_context(event: &Request) -> Option<RequestContext> {
    let user_id = claim(event, "X-User-Id", "sub")?;
    let email = claim(event, "X-User-Email", "email")?;
    Some(RequestContext::new(user_id, email))
}

/// Managers see every site; supervisors only their assigned one.
async fn can_view_site(
    state: &AppState,
    table_name: &str,
    ctx: &RequestContext,
    site_id: &str,
) -> bool {
    if ctx.is_manager() {
        return true;
    }
    assignments::assigned_site_id(&state.dynamo_client, table_name, &ctx.user_id)
        .await
        .as_deref()
        == Some(site_id)
}

fn not_found() -> Result<Response<Body>, Error> {
    Ok(Response::builder()
        .status(StatusCode::NOT_FOUND)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(serde_json::json!({"error": "Not found"}).to_string().into())
        .map_err(Box::new)?)
}

fn method_not_allowed() -> Result<Response<Body>, Error> {
    Ok(Response::builder()
        .status(StatusCode::METHOD_NOT_ALLOWED)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(
            serde_json::json!({"error": "Method not allowed"})
                .to_string()
                .into(),
        )
        .map_err(Box::new)?)
}

fn unauthorized() -> Result<Response<Body>, Error> {
    Ok(Response::builder()
        .status(StatusCode::UNAUTHORIZED)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(
            serde_json::json!({"error": "Missing authentication"})
                .to_string()
                .into(),
        )
        .map_err(Box::new)?)
}

fn forbidden() -> Result<Response<Body>, Error> {
    Ok(Response::builder()
        .status(StatusCode::FORBIDDEN)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(
            serde_json::json!({"error": "You do not have access to this resource"})
                .to_string()
                .into(),
        )
        .map_err(Box::new)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_cognitoidentityprovider::Client as CognitoClient;
    use aws_sdk_dynamodb::Client as DynamoClient;
    use aws_sdk_sesv2::Client as SesClient;
    use lambda_http::http;

    async fn test_state() -> Arc<AppState> {
        std::env::set_var("AWS_REGION", "ap-southeast-2");
        let config = aws_config::load_from_env().await;
        AppState::new(
            CognitoClient::new(&config),
            DynamoClient::new(&config),
            SesClient::new(&config),
        )
    }

    fn request(method: &str, path: &str) -> Request {
        http::Request::builder()
            .method(method)
            .uri(path)
            .body(Body::Empty)
            .unwrap()
    }

    fn supervisor_request(method: &str, path: &str) -> Request {
        http::Request::builder()
            .method(method)
            .uri(path)
            .header("X-User-Id", "u1")
            .header("X-User-Email", "sam+supervisor@gmail.com")
            .body(Body::Empty)
            .unwrap()
    }

    #[tokio::test]
    async fn cors_preflight_succeeds() {
        let response = function_handler(request("OPTIONS", "/sites"), test_state().await)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let response = function_handler(request("GET", "/nope"), test_state().await)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn login_rejects_wrong_method() {
        std::env::set_var("COGNITO_CLIENT_ID", "client");
        std::env::set_var("COGNITO_CLIENT_SECRET", "secret");

        let response = function_handler(request("GET", "/login"), test_state().await)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn authenticated_routes_require_identity() {
        let response = function_handler(request("GET", "/profiles/me"), test_state().await)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn supervisor_directory_is_manager_only() {
        let response = function_handler(
            supervisor_request("GET", "/supervisors"),
            test_state().await,
        )
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn site_administration_is_manager_only() {
        let state = test_state().await;

        let response = function_handler(supervisor_request("POST", "/sites"), Arc::clone(&state))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response =
            function_handler(supervisor_request("DELETE", "/sites/s1"), Arc::clone(&state))
                .await
                .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = function_handler(
            supervisor_request("POST", "/sites/s1/supervisor"),
            Arc::clone(&state),
        )
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = function_handler(
            supervisor_request("GET", "/sites"),
            state,
        )
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
