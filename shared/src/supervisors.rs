use crate::types::{CreateSupervisorRequest, Profile, UpdateSupervisorRequest};
use crate::{assignments, email, profiles, roles};
use aws_sdk_cognitoidentityprovider::Client as CognitoClient;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client as DynamoClient;
use aws_sdk_sesv2::Client as SesClient;
use lambda_http::{http::StatusCode, Body, Error, Response};
use std::env;

fn error_json(status: StatusCode, message: &str) -> Result<Response<Body>, Error> {
    Ok(Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(serde_json::json!({"error": message}).to_string().into())
        .map_err(Box::new)?)
}

/// List every supervisor profile, ordered by email. The role listing edge
/// keeps this a partition query followed by a batch get, no scan.
pub async fn list_supervisors(
    client: &DynamoClient,
    table_name: &str,
) -> Result<Response<Body>, Error> {
    let pk = format!("ROLE#{}", roles::Role::Supervisor.as_str());

    let result = client
        .query()
        .table_name(table_name)
        .key_condition_expression("PK = :pk AND begins_with(SK, :sk_prefix)")
        .expression_attribute_values(":pk", AttributeValue::S(pk))
        .expression_attribute_values(":sk_prefix", AttributeValue::S("USER#".to_string()))
        .send()
        .await?;

    let mut user_ids = Vec::new();
    for item in result.items() {
        if let Some(sk) = item.get("SK").and_then(|v| v.as_s().ok()) {
            if let Some(user_id) = sk.strip_prefix("USER#") {
                user_ids.push(user_id.to_string());
            }
        }
    }

    let mut supervisors: Vec<Profile> = Vec::new();

    if user_ids.is_empty() {
        return Ok(Response::builder()
            .status(StatusCode::OK)
            .header("Content-Type", "application/json")
            .header("Access-Control-Allow-Origin", "*")
            .body(serde_json::to_string(&supervisors)?.into())
            .map_err(Box::new)?);
    }

    // Batch fetch the profiles (DynamoDB allows up to 100 items per batch)
    for chunk in user_ids.chunks(100) {
        let mut keys = Vec::new();
        for user_id in chunk {
            let user_pk = format!("USER#{}", user_id);
            let mut key = std::collections::HashMap::new();
            key.insert("PK".to_string(), AttributeValue::S(user_pk.clone()));
            key.insert("SK".to_string(), AttributeValue::S(user_pk));
            keys.push(key);
        }

        let batch_result = client
            .batch_get_item()
            .request_items(
                table_name,
                aws_sdk_dynamodb::types::KeysAndAttributes::builder()
                    .set_keys(Some(keys))
                    .build()
                    .map_err(Box::new)?,
            )
            .send()
            .await?;

        if let Some(responses) = batch_result.responses() {
            if let Some(items) = responses.get(table_name) {
                for item in items {
                    if let Some(pk_attr) = item.get("PK").and_then(|v| v.as_s().ok()) {
                        if let Some(user_id) = pk_attr.strip_prefix("USER#") {
                            let site_id =
                                assignments::assigned_site_id(client, table_name, user_id).await;
                            supervisors.push(profiles::profile_from_item(user_id, item, site_id));
                        }
                    }
                }
            }
        }
    }

    supervisors.sort_by(|a, b| a.email.cmp(&b.email));

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(serde_json::to_string(&supervisors)?.into())
        .map_err(Box::new)?)
}

/// Provision a supervisor account on behalf of a manager. Cognito creates
/// the user and delivers a temporary password; the profile rows are
/// written here rather than waiting for a first sign-in.
pub async fn create_supervisor(
    cognito_client: &CognitoClient,
    dynamo_client: &DynamoClient,
    ses_client: &SesClient,
    table_name: &str,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let req: CreateSupervisorRequest = match serde_json::from_slice(body) {
        Ok(v) => v,
        Err(e) => {
            tracing::error!("Failed to parse create supervisor request: {}", e);
            return error_json(
                StatusCode::BAD_REQUEST,
                &format!("Invalid request body: {}", e),
            );
        }
    };

    if !roles::is_eligible_for_signup(&req.email)
        || roles::derive_role(&req.email) != roles::Role::Supervisor
    {
        return error_json(
            StatusCode::BAD_REQUEST,
            "Supervisor accounts must use a Gmail address with +supervisor (e.g., their.email+supervisor@gmail.com)",
        );
    }

    if req.full_name.trim().is_empty() || req.contact.trim().is_empty() {
        return error_json(StatusCode::BAD_REQUEST, "Please fill in all fields");
    }

    let user_pool_id = match env::var("COGNITO_USER_POOL_ID") {
        Ok(id) => id,
        Err(_) => {
            tracing::error!("COGNITO_USER_POOL_ID not set; cannot provision supervisor");
            return error_json(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to create supervisor",
            );
        }
    };

    let create_result = cognito_client
        .admin_create_user()
        .user_pool_id(&user_pool_id)
        .username(&req.email)
        .desired_delivery_mediums(
            aws_sdk_cognitoidentityprovider::types::DeliveryMediumType::Email,
        )
        .user_attributes(
            aws_sdk_cognitoidentityprovider::types::AttributeType::builder()
                .name("email")
                .value(&req.email)
                .build()?,
        )
        .user_attributes(
            aws_sdk_cognitoidentityprovider::types::AttributeType::builder()
                .name("email_verified")
                .value("true")
                .build()?,
        )
        .user_attributes(
            aws_sdk_cognitoidentityprovider::types::AttributeType::builder()
                .name("name")
                .value(&req.full_name)
                .build()?,
        )
        .send()
        .await;

    let created = match create_result {
        Ok(output) => output,
        Err(e) => {
            let error_message = format!("{:?}", e);
            tracing::error!("Cognito admin_create_user error: {}", error_message);

            let user_message = if error_message.contains("UsernameExistsException") {
                "An account with this email already exists"
            } else {
                "Failed to create supervisor account"
            };
            return error_json(StatusCode::BAD_REQUEST, user_message);
        }
    };

    // The stable identifier is the sub attribute, not the username
    let user_id = created.user().and_then(|user| {
        user.attributes()
            .iter()
            .find(|attr| attr.name() == "sub")
            .and_then(|attr| attr.value())
            .map(|s| s.to_string())
            .or_else(|| user.username().map(|s| s.to_string()))
    });

    let Some(user_id) = user_id else {
        tracing::error!("admin_create_user returned no user identifier");
        return error_json(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to create supervisor account",
        );
    };

    let profile = match profiles::put_profile_records(
        dynamo_client,
        table_name,
        &user_id,
        &req.email,
        roles::Role::Supervisor,
        &req.full_name,
        &req.contact,
    )
    .await
    {
        Ok(profile) => profile,
        Err(e) => {
            tracing::error!("Failed to write supervisor profile: {}", e);
            return error_json(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to create supervisor profile",
            );
        }
    };

    let frontend_url =
        env::var("FRONTEND_URL").unwrap_or_else(|_| "http://localhost:8080".to_string());

    if let Err(e) =
        email::send_welcome_email(ses_client, &req.email, &req.full_name, &frontend_url).await
    {
        tracing::error!("Failed to send welcome email: {}", e);
        // The account is live either way; Cognito has already mailed the
        // temporary password.
    } else {
        tracing::info!("Welcome email sent to {}", req.email);
    }

    Ok(Response::builder()
        .status(StatusCode::CREATED)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(serde_json::to_string(&profile)?.into())
        .map_err(Box::new)?)
}

/// Update a supervisor's profile details
pub async fn update_supervisor(
    client: &DynamoClient,
    table_name: &str,
    user_id: &str,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let req: UpdateSupervisorRequest = match serde_json::from_slice(body) {
        Ok(v) => v,
        Err(e) => {
            return error_json(
                StatusCode::BAD_REQUEST,
                &format!("Invalid request body: {}", e),
            );
        }
    };

    profiles::update_profile_fields(client, table_name, user_id, req.full_name, req.contact)
        .await?;

    let pk = format!("USER#{}", user_id);
    let result = client
        .get_item()
        .table_name(table_name)
        .key("PK", AttributeValue::S(pk.clone()))
        .key("SK", AttributeValue::S(pk))
        .send()
        .await?;

    if let Some(item) = result.item() {
        let site_id = assignments::assigned_site_id(client, table_name, user_id).await;
        let profile = profiles::profile_from_item(user_id, item, site_id);

        Ok(Response::builder()
            .status(StatusCode::OK)
            .header("Content-Type", "application/json")
            .header("Access-Control-Allow-Origin", "*")
            .body(serde_json::to_string(&profile)?.into())
            .map_err(Box::new)?)
    } else {
        error_json(StatusCode::NOT_FOUND, "Supervisor not found")
    }
}

/// Delete a supervisor: assignments first, then the profile rows, then
/// the Cognito account (best-effort).
pub async fn delete_supervisor(
    cognito_client: &CognitoClient,
    dynamo_client: &DynamoClient,
    table_name: &str,
    user_id: &str,
) -> Result<Response<Body>, Error> {
    let pk = format!("USER#{}", user_id);

    let result = dynamo_client
        .get_item()
        .table_name(table_name)
        .key("PK", AttributeValue::S(pk.clone()))
        .key("SK", AttributeValue::S(pk.clone()))
        .send()
        .await?;

    let Some(item) = result.item() else {
        return error_json(StatusCode::NOT_FOUND, "Supervisor not found");
    };

    let email = item
        .get("email")
        .and_then(|v| v.as_s().ok())
        .map(|s| s.to_string())
        .unwrap_or_default();

    if !assignments::unassign(dynamo_client, table_name, user_id).await {
        tracing::warn!(
            "Could not clear assignments for {}; continuing with delete",
            user_id
        );
    }

    // Profile row and its role listing edge
    let role_pk = format!("ROLE#{}", roles::Role::Supervisor.as_str());
    for (key_pk, key_sk) in [(pk.clone(), pk.clone()), (role_pk, pk)] {
        dynamo_client
            .delete_item()
            .table_name(table_name)
            .key("PK", AttributeValue::S(key_pk))
            .key("SK", AttributeValue::S(key_sk))
            .send()
            .await?;
    }

    if let Ok(user_pool_id) = env::var("COGNITO_USER_POOL_ID") {
        if !email.is_empty() {
            if let Err(e) = cognito_client
                .admin_delete_user()
                .user_pool_id(&user_pool_id)
                .username(&email)
                .send()
                .await
            {
                tracing::error!("Failed to delete Cognito account for {}: {:?}", email, e);
                // The profile rows are gone; the orphaned login can no
                // longer reach anything.
            }
        }
    } else {
        tracing::warn!("COGNITO_USER_POOL_ID not set; skipping Cognito delete");
    }

    Ok(Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header("Access-Control-Allow-Origin", "*")
        .body(Body::Empty)
        .map_err(Box::new)?)
}
