use crate::roles::Role;
use serde::{Deserialize, Serialize};

// ========== PROFILE ==========
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Profile {
    pub user_id: String,
    pub email: String,
    pub role: Role,
    pub full_name: String,
    pub contact: String,
    /// Site the supervisor is currently assigned to, if any.
    pub site_id: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub full_name: Option<String>,
    pub contact: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateSupervisorRequest {
    pub email: String,
    pub full_name: String,
    pub contact: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSupervisorRequest {
    pub full_name: Option<String>,
    pub contact: Option<String>,
}

// ========== SITE ==========
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Site {
    pub site_id: String,
    pub name: String,
    pub location: String,
    pub building_type: String,
    pub size: f64, // square feet
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateSiteRequest {
    pub name: String,
    pub location: String,
    pub building_type: String,
    pub size: f64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSiteRequest {
    pub name: Option<String>,
    pub location: Option<String>,
    pub building_type: Option<String>,
    pub size: Option<f64>,
}

// ========== MATERIAL ==========
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Material {
    pub material_id: String,
    pub site_id: String,
    pub name: String,
    pub quantity: f64,
    pub unit: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateMaterialRequest {
    pub name: String,
    pub quantity: f64,
    pub unit: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMaterialRequest {
    pub name: Option<String>,
    pub quantity: Option<f64>,
    pub unit: Option<String>,
}

// ========== ASSIGNMENT ==========
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Assignment {
    pub site_id: String,
    pub user_id: String,
    pub assigned_at: String,
}

#[derive(Debug, Deserialize)]
pub struct AssignSupervisorRequest {
    pub user_id: String,
}
