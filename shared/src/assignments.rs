use crate::profiles;
use crate::types::{Assignment, AssignSupervisorRequest, Profile};
use aws_sdk_dynamodb::types::{AttributeValue, Delete, Put, TransactWriteItem};
use aws_sdk_dynamodb::Client as DynamoClient;
use lambda_http::{http::StatusCode, Body, Error, Response};
use std::collections::HashMap;

// Assignment edges are mirrored so both "who supervises this site" and
// "which site does this supervisor hold" are single-partition queries:
//   SITE#{site_id} / ASSIGN#USER#{user_id}
//   USER#{user_id} / ASSIGN#SITE#{site_id}
// Every mutation touches both edges inside one TransactWriteItems call,
// which is what actually holds the one-per-site / one-per-supervisor
// invariants. There is no unique constraint in the table itself.

const SITE_EDGE_PREFIX: &str = "ASSIGN#USER#";
const USER_EDGE_PREFIX: &str = "ASSIGN#SITE#";

/// (PK, SK) of the site-side edge for a pair.
fn site_edge_key(site_id: &str, user_id: &str) -> (String, String) {
    (
        format!("SITE#{}", site_id),
        format!("{}{}", SITE_EDGE_PREFIX, user_id),
    )
}

/// (PK, SK) of the supervisor-side edge for a pair.
fn user_edge_key(site_id: &str, user_id: &str) -> (String, String) {
    (
        format!("USER#{}", user_id),
        format!("{}{}", USER_EDGE_PREFIX, site_id),
    )
}

fn user_id_from_site_edge(sk: &str) -> Option<&str> {
    sk.strip_prefix(SITE_EDGE_PREFIX)
}

fn site_id_from_user_edge(sk: &str) -> Option<&str> {
    sk.strip_prefix(USER_EDGE_PREFIX)
}

async fn query_edges(
    client: &DynamoClient,
    table_name: &str,
    pk: &str,
    sk_prefix: &str,
) -> Result<Vec<String>, String> {
    let result = client
        .query()
        .table_name(table_name)
        .key_condition_expression("PK = :pk AND begins_with(SK, :sk_prefix)")
        .expression_attribute_values(":pk", AttributeValue::S(pk.to_string()))
        .expression_attribute_values(":sk_prefix", AttributeValue::S(sk_prefix.to_string()))
        .send()
        .await
        .map_err(|e| format!("Failed to query assignment edges for {}: {:?}", pk, e))?;

    let mut sks = Vec::new();
    for item in result.items() {
        if let Some(sk) = item.get("SK").and_then(|v| v.as_s().ok()) {
            sks.push(sk.to_string());
        }
    }
    Ok(sks)
}

/// Site ids the supervisor currently holds (0 or 1 when the invariant is intact).
pub async fn sites_for_supervisor(
    client: &DynamoClient,
    table_name: &str,
    user_id: &str,
) -> Result<Vec<String>, String> {
    let pk = format!("USER#{}", user_id);
    let sks = query_edges(client, table_name, &pk, USER_EDGE_PREFIX).await?;
    Ok(sks
        .iter()
        .filter_map(|sk| site_id_from_user_edge(sk))
        .map(|s| s.to_string())
        .collect())
}

async fn supervisors_for_site(
    client: &DynamoClient,
    table_name: &str,
    site_id: &str,
) -> Result<Vec<String>, String> {
    let pk = format!("SITE#{}", site_id);
    let sks = query_edges(client, table_name, &pk, SITE_EDGE_PREFIX).await?;
    Ok(sks
        .iter()
        .filter_map(|sk| user_id_from_site_edge(sk))
        .map(|s| s.to_string())
        .collect())
}

/// The site a supervisor is assigned to, if any.
pub async fn assigned_site_id(
    client: &DynamoClient,
    table_name: &str,
    user_id: &str,
) -> Option<String> {
    match sites_for_supervisor(client, table_name, user_id).await {
        Ok(site_ids) => site_ids.into_iter().next(),
        Err(e) => {
            tracing::error!("{}", e);
            None
        }
    }
}

fn delete_op(table_name: &str, pk: String, sk: String) -> Result<TransactWriteItem, String> {
    let delete = Delete::builder()
        .table_name(table_name)
        .key("PK", AttributeValue::S(pk))
        .key("SK", AttributeValue::S(sk))
        .build()
        .map_err(|e| format!("Failed to build delete op: {:?}", e))?;
    Ok(TransactWriteItem::builder().delete(delete).build())
}

fn put_op(
    table_name: &str,
    pk: String,
    sk: String,
    assigned_at: &str,
) -> Result<TransactWriteItem, String> {
    let mut item = HashMap::new();
    item.insert("PK".to_string(), AttributeValue::S(pk));
    item.insert("SK".to_string(), AttributeValue::S(sk));
    item.insert(
        "assigned_at".to_string(),
        AttributeValue::S(assigned_at.to_string()),
    );
    let put = Put::builder()
        .table_name(table_name)
        .set_item(Some(item))
        .build()
        .map_err(|e| format!("Failed to build put op: {:?}", e))?;
    Ok(TransactWriteItem::builder().put(put).build())
}

/// Every edge to delete before writing the new pair: edges for sites the
/// supervisor already holds and edges for supervisors the site already
/// has. The new pair itself is excluded because a transaction may not
/// touch the same item twice.
fn stale_edges(
    held_sites: &[String],
    current_supervisors: &[String],
    site_id: &str,
    user_id: &str,
) -> Vec<(String, String)> {
    let mut stale: Vec<(String, String)> = Vec::new();
    for held in held_sites {
        stale.push(site_edge_key(held, user_id));
        stale.push(user_edge_key(held, user_id));
    }
    for current in current_supervisors {
        stale.push(site_edge_key(site_id, current));
        stale.push(user_edge_key(site_id, current));
    }
    stale.sort();
    stale.dedup();

    let new_edges = [site_edge_key(site_id, user_id), user_edge_key(site_id, user_id)];
    stale.retain(|key| !new_edges.contains(key));
    stale
}

async fn assign_inner(
    client: &DynamoClient,
    table_name: &str,
    site_id: &str,
    user_id: &str,
) -> Result<(), String> {
    // Collect every edge touching either side of the new pair.
    let held_sites = sites_for_supervisor(client, table_name, user_id).await?;
    let current_supervisors = supervisors_for_site(client, table_name, site_id).await?;

    let stale = stale_edges(&held_sites, &current_supervisors, site_id, user_id);

    let already_assigned =
        held_sites.iter().any(|s| s == site_id) && current_supervisors.iter().any(|u| u == user_id);
    if already_assigned && stale.is_empty() {
        return Ok(());
    }
    let new_edges = [site_edge_key(site_id, user_id), user_edge_key(site_id, user_id)];

    let now = chrono::Utc::now().to_rfc3339();
    let mut ops = Vec::new();
    for (pk, sk) in stale {
        ops.push(delete_op(table_name, pk, sk)?);
    }
    for (pk, sk) in new_edges {
        ops.push(put_op(table_name, pk, sk, &now)?);
    }

    client
        .transact_write_items()
        .set_transact_items(Some(ops))
        .send()
        .await
        .map_err(|e| format!("Assignment transaction failed: {:?}", e))?;

    Ok(())
}

/// Establish the supervisor as the sole supervisor of the site, and the
/// site as the supervisor's sole site. Replaces any existing assignment
/// on either side in the same transaction.
pub async fn assign(
    client: &DynamoClient,
    table_name: &str,
    site_id: &str,
    user_id: &str,
) -> bool {
    match assign_inner(client, table_name, site_id, user_id).await {
        Ok(()) => {
            tracing::info!("Assigned supervisor {} to site {}", user_id, site_id);
            true
        }
        Err(e) => {
            tracing::error!(
                "Failed to assign supervisor {} to site {}: {}",
                user_id,
                site_id,
                e
            );
            false
        }
    }
}

async fn unassign_inner(
    client: &DynamoClient,
    table_name: &str,
    user_id: &str,
) -> Result<(), String> {
    let held_sites = sites_for_supervisor(client, table_name, user_id).await?;
    if held_sites.is_empty() {
        return Ok(());
    }

    let mut ops = Vec::new();
    for held in &held_sites {
        let (pk, sk) = site_edge_key(held, user_id);
        ops.push(delete_op(table_name, pk, sk)?);
        let (pk, sk) = user_edge_key(held, user_id);
        ops.push(delete_op(table_name, pk, sk)?);
    }

    client
        .transact_write_items()
        .set_transact_items(Some(ops))
        .send()
        .await
        .map_err(|e| format!("Unassign transaction failed: {:?}", e))?;

    Ok(())
}

/// Remove every assignment edge for the supervisor.
pub async fn unassign(client: &DynamoClient, table_name: &str, user_id: &str) -> bool {
    match unassign_inner(client, table_name, user_id).await {
        Ok(()) => true,
        Err(e) => {
            tracing::error!("Failed to unassign supervisor {}: {}", user_id, e);
            false
        }
    }
}

/// The profile currently assigned to a site, joined through the site-side
/// edge. None when no edge exists or any lookup fails.
pub async fn get_current_supervisor(
    client: &DynamoClient,
    table_name: &str,
    site_id: &str,
) -> Option<Profile> {
    let user_id = match supervisors_for_site(client, table_name, site_id).await {
        Ok(user_ids) => user_ids.into_iter().next()?,
        Err(e) => {
            tracing::error!("{}", e);
            return None;
        }
    };

    let pk = format!("USER#{}", user_id);
    let result = client
        .get_item()
        .table_name(table_name)
        .key("PK", AttributeValue::S(pk.clone()))
        .key("SK", AttributeValue::S(pk))
        .send()
        .await;

    match result {
        Ok(output) => output.item().map(|item| {
            profiles::profile_from_item(&user_id, item, Some(site_id.to_string()))
        }),
        Err(e) => {
            tracing::error!("Failed to fetch supervisor profile {}: {:?}", user_id, e);
            None
        }
    }
}

/// Existence probe used by clients to pre-empt duplicate assignments.
/// Returns the matching edge rows (0 or 1); an error reads as empty.
pub async fn check_assignment(
    client: &DynamoClient,
    table_name: &str,
    site_id: &str,
    user_id: &str,
) -> Vec<Assignment> {
    let (pk, sk) = site_edge_key(site_id, user_id);
    let result = client
        .get_item()
        .table_name(table_name)
        .key("PK", AttributeValue::S(pk))
        .key("SK", AttributeValue::S(sk))
        .send()
        .await;

    match result {
        Ok(output) => match output.item() {
            Some(item) => {
                let assigned_at = item
                    .get("assigned_at")
                    .and_then(|v| v.as_s().ok())
                    .map(|s| s.to_string())
                    .unwrap_or_default();
                vec![Assignment {
                    site_id: site_id.to_string(),
                    user_id: user_id.to_string(),
                    assigned_at,
                }]
            }
            None => Vec::new(),
        },
        Err(e) => {
            tracing::error!(
                "Failed to check assignment {} / {}: {:?}",
                site_id,
                user_id,
                e
            );
            Vec::new()
        }
    }
}

// ---- HTTP wrappers ----

/// POST /sites/{id}/supervisor
pub async fn assign_supervisor(
    client: &DynamoClient,
    table_name: &str,
    site_id: &str,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let req: AssignSupervisorRequest = match serde_json::from_slice(body) {
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

    if assign(client, table_name, site_id, &req.user_id).await {
        Ok(Response::builder()
            .status(StatusCode::OK)
            .header("Content-Type", "application/json")
            .header("Access-Control-Allow-Origin", "*")
            .body(serde_json::json!({"success": true}).to_string().into())
            .map_err(Box::new)?)
    } else {
        Ok(Response::builder()
            .status(StatusCode::INTERNAL_SERVER_ERROR)
            .header("Content-Type", "application/json")
            .header("Access-Control-Allow-Origin", "*")
            .body(
                serde_json::json!({"error": "Failed to assign supervisor"})
                    .to_string()
                    .into(),
            )
            .map_err(Box::new)?)
    }
}

/// DELETE /supervisors/{id}/assignment
pub async fn unassign_supervisor(
    client: &DynamoClient,
    table_name: &str,
    user_id: &str,
) -> Result<Response<Body>, Error> {
    if unassign(client, table_name, user_id).await {
        Ok(Response::builder()
            .status(StatusCode::OK)
            .header("Content-Type", "application/json")
            .header("Access-Control-Allow-Origin", "*")
            .body(serde_json::json!({"success": true}).to_string().into())
            .map_err(Box::new)?)
    } else {
        Ok(Response::builder()
            .status(StatusCode::INTERNAL_SERVER_ERROR)
            .header("Content-Type", "application/json")
            .header("Access-Control-Allow-Origin", "*")
            .body(
                serde_json::json!({"error": "Failed to unassign supervisor"})
                    .to_string()
                    .into(),
            )
            .map_err(Box::new)?)
    }
}

/// GET /sites/{id}/supervisor - the assigned profile, or JSON null
pub async fn get_site_supervisor(
    client: &DynamoClient,
    table_name: &str,
    site_id: &str,
) -> Result<Response<Body>, Error> {
    let supervisor = get_current_supervisor(client, table_name, site_id).await;

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(serde_json::to_string(&supervisor)?.into())
        .map_err(Box::new)?)
}

/// GET /sites/{id}/supervisor/{user_id} - matching edge rows
pub async fn check_site_assignment(
    client: &DynamoClient,
    table_name: &str,
    site_id: &str,
    user_id: &str,
) -> Result<Response<Body>, Error> {
    let rows = check_assignment(client, table_name, site_id, user_id).await;

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(serde_json::to_string(&rows)?.into())
        .map_err(Box::new)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edge_keys_mirror_each_other() {
        let (pk, sk) = site_edge_key("site-1", "u1");
        assert_eq!(pk, "SITE#site-1");
        assert_eq!(sk, "ASSIGN#USER#u1");

        let (pk, sk) = user_edge_key("site-1", "u1");
        assert_eq!(pk, "USER#u1");
        assert_eq!(sk, "ASSIGN#SITE#site-1");
    }

    #[test]
    fn edge_parsing_round_trips() {
        let (_, site_sk) = site_edge_key("site-1", "u1");
        assert_eq!(user_id_from_site_edge(&site_sk), Some("u1"));

        let (_, user_sk) = user_edge_key("site-1", "u1");
        assert_eq!(site_id_from_user_edge(&user_sk), Some("site-1"));

        // Foreign SKs in the partition are skipped, not misread
        assert_eq!(user_id_from_site_edge("MATERIAL#m1"), None);
        assert_eq!(site_id_from_user_edge("USER#u1"), None);
    }

    #[test]
    fn reassignment_drops_old_edges_on_both_sides() {
        // u1 holds site-1; moving u1 to site-2 deletes both old edges.
        let stale = stale_edges(&["site-1".to_string()], &[], "site-2", "u1");
        assert_eq!(
            stale,
            vec![
                ("SITE#site-1".to_string(), "ASSIGN#USER#u1".to_string()),
                ("USER#u1".to_string(), "ASSIGN#SITE#site-1".to_string()),
            ]
        );
    }

    #[test]
    fn taking_over_a_site_evicts_its_current_supervisor() {
        let stale = stale_edges(&[], &["u0".to_string()], "site-1", "u1");
        assert_eq!(
            stale,
            vec![
                ("SITE#site-1".to_string(), "ASSIGN#USER#u0".to_string()),
                ("USER#u0".to_string(), "ASSIGN#SITE#site-1".to_string()),
            ]
        );
    }

    #[test]
    fn repeat_assignment_leaves_nothing_stale() {
        // Re-assigning an existing pair must not delete the edges it is
        // about to write; a transaction cannot touch one item twice.
        let stale = stale_edges(
            &["site-1".to_string()],
            &["u1".to_string()],
            "site-1",
            "u1",
        );
        assert!(stale.is_empty());
    }
}
