use crate::types::{CreateMaterialRequest, Material, UpdateMaterialRequest};
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client as DynamoClient;
use lambda_http::{http::StatusCode, Body, Error, Response};
use std::collections::HashMap;

// Materials live in their site's partition (SITE#{site_id} / MATERIAL#{id})
// so the per-site listing is a single query and deleting a site sweeps
// them up with the rest of the partition.

fn validate_material(name: &str, quantity: f64, unit: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("Material name is required".to_string());
    }
    if unit.trim().is_empty() {
        return Err("Unit is required".to_string());
    }
    if !quantity.is_finite() || quantity < 0.0 {
        return Err("Quantity must be zero or more".to_string());
    }
    Ok(())
}

pub(crate) fn material_from_item(
    site_id: &str,
    material_id: &str,
    item: &HashMap<String, AttributeValue>,
) -> Material {
    Material {
        material_id: material_id.to_string(),
        site_id: site_id.to_string(),
        name: item
            .get("name")
            .and_then(|v| v.as_s().ok())
            .map(|s| s.to_string())
            .unwrap_or_default(),
        quantity: item
            .get("quantity")
            .and_then(|v| v.as_n().ok())
            .and_then(|n| n.parse::<f64>().ok())
            .unwrap_or_default(),
        unit: item
            .get("unit")
            .and_then(|v| v.as_s().ok())
            .map(|s| s.to_string())
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

/// Create a material record under a site
pub async fn create_material(
    client: &DynamoClient,
    table_name: &str,
    site_id: &str,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let req: CreateMaterialRequest = match serde_json::from_slice(body) {
        Ok(v) => v,
        Err(e) => {
            tracing::error!("Failed to parse create material request: {}", e);
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

    if let Err(message) = validate_material(&req.name, req.quantity, &req.unit) {
        return Ok(Response::builder()
            .status(StatusCode::BAD_REQUEST)
            .header("Content-Type", "application/json")
            .header("Access-Control-Allow-Origin", "*")
            .body(serde_json::json!({"error": message}).to_string().into())
            .map_err(Box::new)?);
    }

    let material_id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    let pk = format!("SITE#{}", site_id);
    let sk = format!("MATERIAL#{}", material_id);

    client
        .put_item()
        .table_name(table_name)
        .item("PK", AttributeValue::S(pk))
        .item("SK", AttributeValue::S(sk))
        .item("name", AttributeValue::S(req.name.clone()))
        .item("quantity", AttributeValue::N(req.quantity.to_string()))
        .item("unit", AttributeValue::S(req.unit.clone()))
        .item("created_at", AttributeValue::S(now.clone()))
        .item("updated_at", AttributeValue::S(now.clone()))
        .send()
        .await?;

    let material = Material {
        material_id,
        site_id: site_id.to_string(),
        name: req.name,
        quantity: req.quantity,
        unit: req.unit,
        created_at: now.clone(),
        updated_at: now,
    };

    Ok(Response::builder()
        .status(StatusCode::CREATED)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(serde_json::to_string(&material)?.into())
        .map_err(Box::new)?)
}

/// Get a specific material
pub async fn get_material(
    client: &DynamoClient,
    table_name: &str,
    site_id: &str,
    material_id: &str,
) -> Result<Response<Body>, Error> {
    let pk = format!("SITE#{}", site_id);
    let sk = format!("MATERIAL#{}", material_id);

    let result = client
        .get_item()
        .table_name(table_name)
        .key("PK", AttributeValue::S(pk))
        .key("SK", AttributeValue::S(sk))
        .send()
        .await?;

    if let Some(item) = result.item() {
        let material = material_from_item(site_id, material_id, item);

        Ok(Response::builder()
            .status(StatusCode::OK)
            .header("Content-Type", "application/json")
            .header("Access-Control-Allow-Origin", "*")
            .body(serde_json::to_string(&material)?.into())
            .map_err(Box::new)?)
    } else {
        Ok(Response::builder()
            .status(StatusCode::NOT_FOUND)
            .header("Content-Type", "application/json")
            .header("Access-Control-Allow-Origin", "*")
            .body(
                serde_json::json!({"error": "Material not found"})
                    .to_string()
                    .into(),
            )
            .map_err(Box::new)?)
    }
}

/// List all materials for a site, ordered by name
pub async fn list_site_materials(
    client: &DynamoClient,
    table_name: &str,
    site_id: &str,
) -> Result<Response<Body>, Error> {
    let pk = format!("SITE#{}", site_id);

    let result = client
        .query()
        .table_name(table_name)
        .key_condition_expression("PK = :pk AND begins_with(SK, :sk_prefix)")
        .expression_attribute_values(":pk", AttributeValue::S(pk))
        .expression_attribute_values(":sk_prefix", AttributeValue::S("MATERIAL#".to_string()))
        .send()
        .await?;

    let mut materials = Vec::new();

    for item in result.items() {
        if let Some(sk) = item.get("SK").and_then(|v| v.as_s().ok()) {
            if let Some(material_id) = sk.strip_prefix("MATERIAL#") {
                materials.push(material_from_item(site_id, material_id, item));
            }
        }
    }

    materials.sort_by(|a, b| a.name.cmp(&b.name));

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(serde_json::to_string(&materials)?.into())
        .map_err(Box::new)?)
}

/// Update a material
pub async fn update_material(
    client: &DynamoClient,
    table_name: &str,
    site_id: &str,
    material_id: &str,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let req: UpdateMaterialRequest = match serde_json::from_slice(body) {
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

    if let Some(quantity) = req.quantity {
        if !quantity.is_finite() || quantity < 0.0 {
            return Ok(Response::builder()
                .status(StatusCode::BAD_REQUEST)
                .header("Content-Type", "application/json")
                .header("Access-Control-Allow-Origin", "*")
                .body(
                    serde_json::json!({"error": "Quantity must be zero or more"})
                        .to_string()
                        .into(),
                )
                .map_err(Box::new)?);
        }
    }

    let pk = format!("SITE#{}", site_id);
    let sk = format!("MATERIAL#{}", material_id);

    let mut update_expr = vec![];
    let mut expr_names = std::collections::HashMap::new();
    let mut expr_values = std::collections::HashMap::new();

    if let Some(name) = req.name {
        update_expr.push("#name = :name");
        expr_names.insert("#name".to_string(), "name".to_string());
        expr_values.insert(":name".to_string(), AttributeValue::S(name));
    }

    if let Some(quantity) = req.quantity {
        update_expr.push("quantity = :quantity");
        expr_values.insert(
            ":quantity".to_string(),
            AttributeValue::N(quantity.to_string()),
        );
    }

    if let Some(unit) = req.unit {
        update_expr.push("#unit = :unit");
        expr_names.insert("#unit".to_string(), "unit".to_string());
        expr_values.insert(":unit".to_string(), AttributeValue::S(unit));
    }

    if !update_expr.is_empty() {
        update_expr.push("updated_at = :updated_at");
        expr_values.insert(
            ":updated_at".to_string(),
            AttributeValue::S(chrono::Utc::now().to_rfc3339()),
        );

        let mut builder = client
            .update_item()
            .table_name(table_name)
            .key("PK", AttributeValue::S(pk))
            .key("SK", AttributeValue::S(sk))
            .update_expression(format!("SET {}", update_expr.join(", ")));

        for (k, v) in expr_names {
            builder = builder.expression_attribute_names(k, v);
        }

        for (k, v) in expr_values {
            builder = builder.expression_attribute_values(k, v);
        }

        builder.send().await?;
    }

    get_material(client, table_name, site_id, material_id).await
}

/// Delete a material
pub async fn delete_material(
    client: &DynamoClient,
    table_name: &str,
    site_id: &str,
    material_id: &str,
) -> Result<Response<Body>, Error> {
    let pk = format!("SITE#{}", site_id);
    let sk = format!("MATERIAL#{}", material_id);

    client
        .delete_item()
        .table_name(table_name)
        .key("PK", AttributeValue::S(pk))
        .key("SK", AttributeValue::S(sk))
        .send()
        .await?;

    Ok(Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header("Access-Control-Allow-Origin", "*")
        .body(Body::Empty)
        .map_err(Box::new)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn material_fields_are_required() {
        assert!(validate_material("Rebar", 120.0, "ton").is_ok());
        assert!(validate_material("Cement", 0.0, "bag").is_ok());
        assert!(validate_material("", 1.0, "ton").is_err());
        assert!(validate_material("Rebar", 1.0, " ").is_err());
    }

    #[test]
    fn quantity_must_not_be_negative() {
        assert!(validate_material("Rebar", -1.0, "ton").is_err());
        assert!(validate_material("Rebar", f64::NAN, "ton").is_err());
    }
}
