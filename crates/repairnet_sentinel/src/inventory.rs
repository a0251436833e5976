//! Inventory export parsing for topology imports

use repairnet_db::TopologyHost;
use serde::Deserialize;

/// Role list as delivered: a comma-separated string or a JSON array.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RoleList {
    Joined(String),
    Items(Vec<String>),
}

impl RoleList {
    fn joined(self) -> String {
        match self {
            Self::Joined(s) => s,
            Self::Items(items) => items.join(","),
        }
    }
}

/// One inventory record. Field names follow the inventory export.
#[derive(Debug, Clone, Deserialize)]
struct InventoryRecord {
    #[serde(alias = "HostName")]
    hostname: String,
    #[serde(default, alias = "Status")]
    status: Option<String>,
    #[serde(default, alias = "HardwareModelName")]
    hardware_model: Option<String>,
    #[serde(default, alias = "NetworkRoles")]
    roles: Option<RoleList>,
    #[serde(default, alias = "NetworkType")]
    network_type: Option<String>,
}

/// Only switches are imported when the export says what a record is.
const SWITCH_TYPE: &str = "Switch";

/// Parse an inventory export into topology records.
///
/// Host names are cut at the first `_`; records without roles and records
/// typed as something other than a switch are skipped.
pub fn parse_inventory(json: &str) -> Result<Vec<TopologyHost>, serde_json::Error> {
    let records: Vec<InventoryRecord> = serde_json::from_str(json)?;

    Ok(records
        .into_iter()
        .filter(|r| r.network_type.as_deref().map_or(true, |t| t == SWITCH_TYPE))
        .filter_map(|record| {
            let roles = record.roles.map(RoleList::joined).unwrap_or_default();
            if roles.trim().is_empty() {
                return None;
            }
            let hostname = record
                .hostname
                .split('_')
                .next()
                .unwrap_or_default()
                .to_string();
            Some(TopologyHost {
                hostname,
                roles,
                hardware_model: record.hardware_model.unwrap_or_default(),
                status: record.status.unwrap_or_default(),
            })
        })
        .collect())
}
