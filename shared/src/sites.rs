use crate::assignments;
use crate::types::{CreateSiteRequest, Site, UpdateSiteRequest};
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client as DynamoClient;
use lambda_http::{http::StatusCode, Body, Error, Response};
use std::collections::HashMap;

// Sites are written twice: the canonical record under its own partition
// and a copy under the fixed SITES partition so the manager listing is a
// query, not a scan. Updates touch both.

const LISTING_PK: &str = "SITES";

fn validate_create_site(req: &CreateSiteRequest) -> Result<(), String> {
    if req.name.trim().is_empty() {
        return Err("Site name is required".to_string());
    }
    if req.location.trim().is_empty() {
        return Err("Location is required".to_string());
    }
    if req.building_type.trim().is_empty() {
        return Err("Building type is required".to_string());
    }
    if !req.size.is_finite() || req.size <= 0.0 {
        return Err("Size must be a positive number".to_string());
    }
    Ok(())
}

pub(crate) fn site_from_item(site_id: &str, item: &HashMap<String, AttributeValue>) -> Site {
    Site {
        site_id: site_id.to_string(),
        name: item
            .get("name")
            .and_then(|v| v.as_s().ok())
            .map(|s| s.to_string())
            .unwrap_or_default(),
        location: item
            .get("location")
            .and_then(|v| v.as_s().ok())
            .map(|s| s.to_string())
            .unwrap_or_default(),
        building_type: item
            .get("building_type")
            .and_then(|v| v.as_s().ok())
            .map(|s| s.to_string())
            .unwrap_or_default(),
        size: item
            .get("size")
            .and_then(|v| v.as_n().ok())
            .and_then(|n| n.parse::<f64>().ok())
            .unwrap_or_default(),
        created_at: item
            .get("created_at")
            .and_then(|v| v.as_s().ok())
            .map(|s| s.to_string())
            .unwrap_or_default(),
        updated_at: item
            .get("updated_at")
            .and_then(|v| v.as_s().ok())
            .map(|s| s.to_string())
            .unwrap_or_default(),
    }
}

fn site_attributes(req: &CreateSiteRequest, now: &str) -> HashMap<String, AttributeValue> {
    let mut attrs = HashMap::new();
    attrs.insert("name".to_string(), AttributeValue::S(req.name.clone()));
    attrs.insert(
        "location".to_string(),
        AttributeValue::S(req.location.clone()),
    );
    attrs.insert(
        "building_type".to_string(),
        AttributeValue::S(req.building_type.clone()),
    );
    attrs.insert("size".to_string(), AttributeValue::N(req.size.to_string()));
    attrs.insert("created_at".to_string(), AttributeValue::S(now.to_string()));
    attrs.insert("updated_at".to_string(), AttributeValue::S(now.to_string()));
    attrs
}

/// Create a new site
pub async fn create_site(
    client: &DynamoClient,
    table_name: &str,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let req: CreateSiteRequest = match serde_json::from_slice(body) {
        Ok(v) => v,
        Err(e) => {
            tracing::error!("Failed to parse create site request: {}", e);
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

    if let Err(message) = validate_create_site(&req) {
        return Ok(Response::builder()
            .status(StatusCode::BAD_REQUEST)
            .header("Content-Type", "application/json")
            .header("Access-Control-Allow-Origin", "*")
            .body(serde_json::json!({"error": message}).to_string().into())
            .map_err(Box::new)?);
    }

    let site_id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    let pk = format!("SITE#{}", site_id);

    let mut canonical = site_attributes(&req, &now);
    canonical.insert("PK".to_string(), AttributeValue::S(pk.clone()));
    canonical.insert("SK".to_string(), AttributeValue::S(pk.clone()));

    let mut listing = site_attributes(&req, &now);
    listing.insert("PK".to_string(), AttributeValue::S(LISTING_PK.to_string()));
    listing.insert("SK".to_string(), AttributeValue::S(pk));

    client
        .batch_write_item()
        .request_items(
            table_name,
            vec![
                aws_sdk_dynamodb::types::WriteRequest::builder()
                    .put_request(
                        aws_sdk_dynamodb::types::PutRequest::builder()
                            .set_item(Some(canonical))
                            .build()
                            .map_err(Box::new)?,
                    )
                    .build(),
                aws_sdk_dynamodb::types::WriteRequest::builder()
                    .put_request(
                        aws_sdk_dynamodb::types::PutRequest::builder()
                            .set_item(Some(listing))
                            .build()
                            .map_err(Box::new)?,
                    )
                    .build(),
            ],
        )
        .send()
        .await?;

    let site = Site {
        site_id: site_id.clone(),
        name: req.name,
        location: req.location,
        building_type: req.building_type,
        size: req.size,
        created_at: now.clone(),
        updated_at: now,
    };

    tracing::info!("Created site {}", site_id);

    Ok(Response::builder()
        .status(StatusCode::CREATED)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(serde_json::to_string(&site)?.into())
        .map_err(Box::new)?)
}

/// Get a specific site
pub async fn get_site(
    client: &DynamoClient,
    table_name: &str,
    site_id: &str,
) -> Result<Response<Body>, Error> {
    let pk = format!("SITE#{}", site_id);

    let result = client
        .get_item()
        .table_name(table_name)
        .key("PK", AttributeValue::S(pk.clone()))
        .key("SK", AttributeValue::S(pk))
        .send()
        .await?;

    if let Some(item) = result.item() {
        let site = site_from_item(site_id, item);

        Ok(Response::builder()
            .status(StatusCode::OK)
            .header("Content-Type", "application/json")
            .header("Access-Control-Allow-Origin", "*")
            .body(serde_json::to_string(&site)?.into())
            .map_err(Box::new)?)
    } else {
        Ok(Response::builder()
            .status(StatusCode::NOT_FOUND)
            .header("Content-Type", "application/json")
            .header("Access-Control-Allow-Origin", "*")
            .body(
                serde_json::json!({"error": "Site not found"})
                    .to_string()
                    .into(),
            )
            .map_err(Box::new)?)
    }
}

/// List all sites, ordered by name
pub async fn list_sites(
    client: &DynamoClient,
    table_name: &str,
) -> Result<Response<Body>, Error> {
    let result = client
        .query()
        .table_name(table_name)
        .key_condition_expression("PK = :pk AND begins_with(SK, :sk_prefix)")
        .expression_attribute_values(":pk", AttributeValue::S(LISTING_PK.to_string()))
        .expression_attribute_values(":sk_prefix", AttributeValue::S("SITE#".to_string()))
        .send()
        .await?;

    let mut sites = Vec::new();

    for item in result.items() {
        if let Some(sk) = item.get("SK").and_then(|v| v.as_s().ok()) {
            if let Some(site_id) = sk.strip_prefix("SITE#") {
                sites.push(site_from_item(site_id, item));
            }
        }
    }

    sites.sort_by(|a, b| a.name.cmp(&b.name));

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(serde_json::to_string(&sites)?.into())
        .map_err(Box::new)?)
}

/// Get the caller's assigned site (supervisor dashboard)
pub async fn get_my_site(
    client: &DynamoClient,
    table_name: &str,
    user_id: &str,
) -> Result<Response<Body>, Error> {
    match assignments::assigned_site_id(client, table_name, user_id).await {
        Some(site_id) => get_site(client, table_name, &site_id).await,
        None => Ok(Response::builder()
            .status(StatusCode::NOT_FOUND)
            .header("Content-Type", "application/json")
            .header("Access-Control-Allow-Origin", "*")
            .body(
                serde_json::json!({"error": "No site assigned"})
                    .to_string()
                    .into(),
            )
            .map_err(Box::new)?),
    }
}

/// Update a site. Both the canonical and listing copies are rewritten.
pub async fn update_site(
    client: &DynamoClient,
    table_name: &str,
    site_id: &str,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let req: UpdateSiteRequest = match serde_json::from_slice(body) {
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

    let mut update_expr = vec![];
    let mut expr_names = std::collections::HashMap::new();
    let mut expr_values = std::collections::HashMap::new();

    if let Some(name) = req.name {
        update_expr.push("#name = :name");
        expr_names.insert("#name".to_string(), "name".to_string());
        expr_values.insert(":name".to_string(), AttributeValue::S(name));
    }

    if let Some(location) = req.location {
        update_expr.push("#location = :location");
        expr_names.insert("#location".to_string(), "location".to_string());
        expr_values.insert(":location".to_string(), AttributeValue::S(location));
    }

    if let Some(building_type) = req.building_type {
        update_expr.push("building_type = :building_type");
        expr_values.insert(
            ":building_type".to_string(),
            AttributeValue::S(building_type),
        );
    }

    if let Some(size) = req.size {
        if !size.is_finite() || size <= 0.0 {
            return Ok(Response::builder()
                .status(StatusCode::BAD_REQUEST)
                .header("Content-Type", "application/json")
                .header("Access-Control-Allow-Origin", "*")
                .body(
                    serde_json::json!({"error": "Size must be a positive number"})
                        .to_string()
                        .into(),
                )
                .map_err(Box::new)?);
        }
        update_expr.push("#size = :size");
        expr_names.insert("#size".to_string(), "size".to_string());
        expr_values.insert(":size".to_string(), AttributeValue::N(size.to_string()));
    }

    if !update_expr.is_empty() {
        update_expr.push("updated_at = :updated_at");
        expr_values.insert(
            ":updated_at".to_string(),
            AttributeValue::S(chrono::Utc::now().to_rfc3339()),
        );

        let pk = format!("SITE#{}", site_id);
        let keys = [
            (pk.clone(), pk.clone()),
            (LISTING_PK.to_string(), pk.clone()),
        ];

        for (key_pk, key_sk) in keys {
            let mut builder = client
                .update_item()
                .table_name(table_name)
                .key("PK", AttributeValue::S(key_pk))
                .key("SK", AttributeValue::S(key_sk))
                .update_expression(format!("SET {}", update_expr.join(", ")));

            for (k, v) in &expr_names {
                builder = builder.expression_attribute_names(k, v);
            }

            for (k, v) in &expr_values {
                builder = builder.expression_attribute_values(k, v.clone());
            }

            builder.send().await?;
        }
    }

    get_site(client, table_name, site_id).await
}

/// Delete a site and everything hanging off it: materials, assignment
/// edges (both directions), then the site records themselves. Assignment
/// rows go before the site so a failed delete never leaves a supervisor
/// pointing at a missing site.
pub async fn delete_site(
    client: &DynamoClient,
    table_name: &str,
    site_id: &str,
) -> Result<Response<Body>, Error> {
    let pk = format!("SITE#{}", site_id);

    // The whole site partition: canonical record, materials, site-side
    // assignment edges.
    let result = client
        .query()
        .table_name(table_name)
        .key_condition_expression("PK = :pk")
        .expression_attribute_values(":pk", AttributeValue::S(pk.clone()))
        .send()
        .await?;

    let mut all_delete_keys: Vec<HashMap<String, AttributeValue>> = Vec::new();

    for item in result.items() {
        let Some(sk) = item.get("SK").and_then(|v| v.as_s().ok()) else {
            continue;
        };

        let mut key = HashMap::new();
        key.insert("PK".to_string(), AttributeValue::S(pk.clone()));
        key.insert("SK".to_string(), AttributeValue::S(sk.to_string()));
        all_delete_keys.push(key);

        // Site-side assignment edges have a mirror under the supervisor
        if let Some(user_id) = sk.strip_prefix("ASSIGN#USER#") {
            let mut mirror = HashMap::new();
            mirror.insert(
                "PK".to_string(),
                AttributeValue::S(format!("USER#{}", user_id)),
            );
            mirror.insert(
                "SK".to_string(),
                AttributeValue::S(format!("ASSIGN#SITE#{}", site_id)),
            );
            all_delete_keys.push(mirror);
        }
    }

    // Listing copy
    let mut listing_key = HashMap::new();
    listing_key.insert("PK".to_string(), AttributeValue::S(LISTING_PK.to_string()));
    listing_key.insert("SK".to_string(), AttributeValue::S(pk));
    all_delete_keys.push(listing_key);

    tracing::info!(
        "Deleting site {}: {} records",
        site_id,
        all_delete_keys.len()
    );

    // Batch delete (DynamoDB allows max 25 items per batch)
    for chunk in all_delete_keys.chunks(25) {
        let delete_requests: Vec<_> = chunk
            .iter()
            .map(|key| {
                aws_sdk_dynamodb::types::WriteRequest::builder()
                    .delete_request(
                        aws_sdk_dynamodb::types::DeleteRequest::builder()
                            .set_key(Some(key.clone()))
                            .build()
                            .unwrap(),
                    )
                    .build()
            })
            .collect();

        let mut attempts = 0;
        let mut unprocessed = Some(delete_requests);

        while let Some(requests) = unprocessed {
            attempts += 1;
            if attempts > 5 {
                tracing::warn!(
                    "Max retry attempts reached, {} items may not be deleted",
                    requests.len()
                );
                break;
            }

            let result = client
                .batch_write_item()
                .request_items(table_name, requests)
                .send()
                .await?;

            unprocessed = result
                .unprocessed_items()
                .and_then(|items| items.get(table_name))
                .map(|items| items.clone());

            if let Some(remaining) = unprocessed.as_ref() {
                tracing::info!(
                    "Retrying {} unprocessed deletes (attempt {})",
                    remaining.len(),
                    attempts
                );
                tokio::time::sleep(tokio::time::Duration::from_millis(100 * attempts as u64))
                    .await;
            }
        }
    }

    Ok(Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header("Access-Control-Allow-Origin", "*")
        .body(Body::Empty)
        .map_err(Box::new)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_request() -> CreateSiteRequest {
        CreateSiteRequest {
            name: "Riverside Tower".to_string(),
            location: "12 Wharf St".to_string(),
            building_type: "Residential".to_string(),
            size: 4200.0,
        }
    }

    #[test]
    fn create_site_requires_every_field() {
        assert!(validate_create_site(&valid_request()).is_ok());

        let mut req = valid_request();
        req.name = "  ".to_string();
        assert!(validate_create_site(&req).is_err());

        let mut req = valid_request();
        req.location = String::new();
        assert!(validate_create_site(&req).is_err());

        let mut req = valid_request();
        req.building_type = String::new();
        assert!(validate_create_site(&req).is_err());
    }

    #[test]
    fn create_site_rejects_non_positive_size() {
        let mut req = valid_request();
        req.size = 0.0;
        assert!(validate_create_site(&req).is_err());

        req.size = -10.0;
        assert!(validate_create_site(&req).is_err());

        req.size = f64::NAN;
        assert!(validate_create_site(&req).is_err());
    }

    #[test]
    fn site_round_trips_through_item_attributes() {
        let now = "2025-06-01T00:00:00+00:00";
        let mut item = site_attributes(&valid_request(), now);
        item.insert("PK".to_string(), AttributeValue::S("SITE#s1".to_string()));
        item.insert("SK".to_string(), AttributeValue::S("SITE#s1".to_string()));

        let site = site_from_item("s1", &item);
        assert_eq!(site.site_id, "s1");
        assert_eq!(site.name, "Riverside Tower");
        assert_eq!(site.size, 4200.0);
        assert_eq!(site.updated_at, now);
    }
}
