//! Warehouse and storage location models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A physical warehouse holding stock
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Warehouse {
    pub id: Uuid,
    /// Short code, `WH001` style when generated
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub manager_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub is_active: bool,
    /// Exactly one warehouse is flagged as main
    pub is_main: bool,
    pub capacity: Option<Decimal>,
    pub current_utilization: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Warehouse {
    /// Used capacity as a percentage, 0 when no capacity is recorded
    pub fn utilization_percentage(&self) -> Decimal {
        match self.capacity {
            Some(capacity) if !capacity.is_zero() => {
                (self.current_utilization / capacity * Decimal::from(100)).round_dp(2)
            }
            _ => Decimal::ZERO,
        }
    }

    pub fn available_capacity(&self) -> Option<Decimal> {
        self.capacity.map(|c| c - self.current_utilization)
    }

    /// Non-empty address parts joined with ", "
    pub fn full_address(&self) -> String {
        [
            &self.address,
            &self.city,
            &self.state,
            &self.postal_code,
            &self.country,
        ]
        .iter()
        .filter_map(|part| part.as_deref())
        .filter(|part| !part.trim().is_empty())
        .collect::<Vec<_>>()
        .join(", ")
    }
}

/// Reason a warehouse cannot be deleted, if any
pub fn warehouse_deletion_blocker(
    is_main: bool,
    total_stock: i64,
    open_transfers: i64,
) -> Option<&'static str> {
    if is_main {
        Some("The main warehouse cannot be deleted")
    } else if total_stock > 0 {
        Some("Warehouse still holds stock")
    } else if open_transfers > 0 {
        Some("Warehouse has open transfers")
    } else {
        None
    }
}

/// Warehouse occupancy figures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarehouseStats {
    pub warehouse_id: Uuid,
    pub total_locations: i64,
    pub active_locations: i64,
    pub total_stock: i64,
    pub unique_products: i64,
    pub utilization_percentage: Decimal,
    pub available_capacity: Option<Decimal>,
    pub open_transfers_in: i64,
    pub open_transfers_out: i64,
}

string_enum! {
    /// Granularity of a storage location
    pub enum LocationType as "location_type" {
        Zone => "zone",
        Aisle => "aisle",
        Rack => "rack",
        Shelf => "shelf",
        Bin => "bin",
    }
}

impl Default for LocationType {
    fn default() -> Self {
        LocationType::Bin
    }
}

/// A storage location inside one warehouse
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Location {
    pub id: Uuid,
    pub warehouse_id: Uuid,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub location_type: LocationType,
    pub aisle: Option<String>,
    pub rack: Option<String>,
    pub shelf: Option<String>,
    pub bin: Option<String>,
    pub capacity: Option<i32>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Location {
    /// Shelf path such as `A1-R2-S3-B4`
    pub fn position(&self) -> Option<String> {
        let parts: Vec<&str> = [&self.aisle, &self.rack, &self.shelf, &self.bin]
            .iter()
            .filter_map(|p| p.as_deref())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("-"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn warehouse() -> Warehouse {
        Warehouse {
            id: Uuid::new_v4(),
            code: "WH001".into(),
            name: "Central".into(),
            description: None,
            address: Some("Calle 10 # 5-20".into()),
            city: Some("Bogotá".into()),
            state: None,
            postal_code: Some("".into()),
            country: Some("Colombia".into()),
            manager_name: None,
            phone: None,
            email: None,
            is_active: true,
            is_main: false,
            capacity: Some(Decimal::from(200)),
            current_utilization: Decimal::from(50),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_utilization() {
        let mut w = warehouse();
        assert_eq!(w.utilization_percentage(), Decimal::from(25));
        assert_eq!(w.available_capacity(), Some(Decimal::from(150)));

        w.capacity = None;
        assert_eq!(w.utilization_percentage(), Decimal::ZERO);
        assert_eq!(w.available_capacity(), None);
    }

    #[test]
    fn test_full_address_skips_blank_parts() {
        assert_eq!(warehouse().full_address(), "Calle 10 # 5-20, Bogotá, Colombia");
    }

    #[test]
    fn test_deletion_blocker() {
        assert!(warehouse_deletion_blocker(true, 0, 0).is_some());
        assert!(warehouse_deletion_blocker(false, 3, 0).is_some());
        assert!(warehouse_deletion_blocker(false, 0, 1).is_some());
        assert!(warehouse_deletion_blocker(false, 0, 0).is_none());
    }

    #[test]
    fn test_location_type_codes() {
        assert_eq!("shelf".parse::<LocationType>().unwrap(), LocationType::Shelf);
        assert!("pallet".parse::<LocationType>().is_err());
        assert_eq!(LocationType::default().as_str(), "bin");
    }
}
