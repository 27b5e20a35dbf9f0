use crate::assignments;
use crate::roles::Role;
use crate::types::{Profile, UpdateProfileRequest};
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client as DynamoClient;
use lambda_http::{http::StatusCode, Body, Error, Response};
use std::collections::HashMap;

/// Map a stored profile item to the wire shape. The role string in the
/// row is a cached copy of what was derived at creation.
pub(crate) fn profile_from_item(
    user_id: &str,
    item: &HashMap<String, AttributeValue>,
    site_id: Option<String>,
) -> Profile {
    Profile {
        user_id: user_id.to_string(),
        email: item
            .get("email")
            .and_then(|v| v.as_s().ok())
            .map(|s| s.to_string())
            .unwrap_or_default(),
        role: item
            .get("role")
            .and_then(|v| v.as_s().ok())
            .map(|s| Role::parse_or_default(s))
            .unwrap_or(Role::Supervisor),
        full_name: item
            .get("full_name")
            .and_then(|v| v.as_s().ok())
            .map(|s| s.to_string())
            .unwrap_or_default(),
        contact: item
            .get("contact")
            .and_then(|v| v.as_s().ok())
            .map(|s| s.to_string())
            .unwrap_or_default(),
        site_id,
        created_at: item
            .get("created_at")
            .and_then(|v| v.as_s().ok())
            .map(|s| s.to_string())
            .unwrap_or_default(),
    }
}

/// Write the profile row and its role listing edge in one batch. Called
/// after the auth collaborator has accepted the account.
pub async fn put_profile_records(
    client: &DynamoClient,
    table_name: &str,
    user_id: &str,
    email: &str,
    role: Role,
    full_name: &str,
    contact: &str,
) -> Result<Profile, String> {
    let now = chrono::Utc::now().to_rfc3339();
    let user_pk = format!("USER#{}", user_id);

    let mut profile_item = HashMap::new();
    profile_item.insert("PK".to_string(), AttributeValue::S(user_pk.clone()));
    profile_item.insert("SK".to_string(), AttributeValue::S(user_pk.clone()));
    profile_item.insert("email".to_string(), AttributeValue::S(email.to_string()));
    profile_item.insert(
        "role".to_string(),
        AttributeValue::S(role.as_str().to_string()),
    );
    profile_item.insert(
        "full_name".to_string(),
        AttributeValue::S(full_name.to_string()),
    );
    profile_item.insert(
        "contact".to_string(),
        AttributeValue::S(contact.to_string()),
    );
    profile_item.insert("created_at".to_string(), AttributeValue::S(now.clone()));

    // Role listing edge, so GET /supervisors is a partition query rather
    // than a table scan.
    let mut role_edge = HashMap::new();
    role_edge.insert(
        "PK".to_string(),
        AttributeValue::S(format!("ROLE#{}", role.as_str())),
    );
    role_edge.insert("SK".to_string(), AttributeValue::S(user_pk));
    role_edge.insert("created_at".to_string(), AttributeValue::S(now.clone()));

    client
        .batch_write_item()
        .request_items(
            table_name,
            vec![
                aws_sdk_dynamodb::types::WriteRequest::builder()
                    .put_request(
                        aws_sdk_dynamodb::types::PutRequest::builder()
                            .set_item(Some(profile_item))
                            .build()
                            .map_err(|e| format!("Failed to build profile put: {:?}", e))?,
                    )
                    .build(),
                aws_sdk_dynamodb::types::WriteRequest::builder()
                    .put_request(
                        aws_sdk_dynamodb::types::PutRequest::builder()
                            .set_item(Some(role_edge))
                            .build()
                            .map_err(|e| format!("Failed to build role edge put: {:?}", e))?,
                    )
                    .build(),
            ],
        )
        .send()
        .await
        .map_err(|e| format!("Failed to write profile records: {:?}", e))?;

    Ok(Profile {
        user_id: user_id.to_string(),
        email: email.to_string(),
        role,
        full_name: full_name.to_string(),
        contact: contact.to_string(),
        site_id: None,
        created_at: now,
    })
}

/// Get the caller's profile, joined with their assigned site
pub async fn get_my_profile(
    client: &DynamoClient,
    table_name: &str,
    user_id: &str,
) -> Result<Response<Body>, Error> {
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
        let profile = profile_from_item(user_id, item, site_id);

        Ok(Response::builder()
            .status(StatusCode::OK)
            .header("Content-Type", "application/json")
            .header("Access-Control-Allow-Origin", "*")
            .body(serde_json::to_string(&profile)?.into())
            .map_err(Box::new)?)
    } else {
        // Auth accepted the token but no profile row exists - an orphaned
        // account; surfaced as not-found so the client can re-register.
        Ok(Response::builder()
            .status(StatusCode::NOT_FOUND)
            .header("Content-Type", "application/json")
            .header("Access-Control-Allow-Origin", "*")
            .body(
                serde_json::json!({"error": "Profile not found"})
                    .to_string()
                    .into(),
            )
            .map_err(Box::new)?)
    }
}

/// Update the caller's profile. Email and role are fixed at creation.
pub async fn update_my_profile(
    client: &DynamoClient,
    table_name: &str,
    user_id: &str,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let req: UpdateProfileRequest = match serde_json::from_slice(body) {
        Ok(v) => v,
        Err(e) => {
            return Ok(Response::builder()
                .status(StatusCode::BAD_REQUEST)
                .header("Content-Type", "application/json")
                .header("Access-Control-Allow-Origin", "*")
                .body(
                    serde_json::json!({"error": format!("Invalid request body: {}", e)})
                        .to_string()
                        .into(),
                )
                .map_err(Box::new)?);
        }
    };

    update_profile_fields(client, table_name, user_id, req.full_name, req.contact).await?;

    get_my_profile(client, table_name, user_id).await
}

/// Shared update path for /profiles/me and the manager's supervisor edit.
pub(crate) async fn update_profile_fields(
    client: &DynamoClient,
    table_name: &str,
    user_id: &str,
    full_name: Option<String>,
    contact: Option<String>,
) -> Result<(), Error> {
    let pk = format!("USER#{}", user_id);

    let mut update_expr = vec![];
    let mut expr_values = std::collections::HashMap::new();

    if let Some(full_name) = full_name {
        update_expr.push("full_name = :full_name");
        expr_values.insert(":full_name".to_string(), AttributeValue::S(full_name));
    }

    if let Some(contact) = contact {
        update_expr.push("contact = :contact");
        expr_values.insert(":contact".to_string(), AttributeValue::S(contact));
    }

    if !update_expr.is_empty() {
        let mut builder = client
            .update_item()
            .table_name(table_name)
            .key("PK", AttributeValue::S(pk.clone()))
            .key("SK", AttributeValue::S(pk))
            .update_expression(format!("SET {}", update_expr.join(", ")));

        for (k, v) in expr_values {
            builder = builder.expression_attribute_values(k, v);
        }

        builder.send().await?;
    }

    Ok(())
}
