//! Node identity structures.

use serde::{Deserialize, Serialize};

use crate::{AccountAddress, Result, Timestamped, TypesError};

/// Geographic position in arc-minutes.
///
/// Latitude spans `[-5400, 5400]`, longitude `[0, 10800]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GeoLocation {
    pub lat_minutes: i32,
    pub lon_minutes: i32,
}

impl GeoLocation {
    pub const MAX_LAT_MINUTES: i32 = 5400;
    pub const MAX_LON_MINUTES: i32 = 10800;

    /// Create a location, rejecting out-of-range coordinates.
    pub fn new(lat_minutes: i32, lon_minutes: i32) -> Result<Self> {
        let location = Self {
            lat_minutes,
            lon_minutes,
        };
        if !location.is_valid() {
            return Err(TypesError::CoordinateOutOfRange(format!(
                "lat {lat_minutes}, lon {lon_minutes}"
            )));
        }
        Ok(location)
    }

    pub fn is_valid(&self) -> bool {
        (-Self::MAX_LAT_MINUTES..=Self::MAX_LAT_MINUTES).contains(&self.lat_minutes)
            && (0..=Self::MAX_LON_MINUTES).contains(&self.lon_minutes)
    }
}

/// Ports a node listens on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ports {
    pub p2p: u16,
    pub rpc: u16,
}

/// A node's self-description, published as a signed envelope.
///
/// Immutable for the lifetime of a membership; changing it requires leaving
/// and rejoining.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeIdentity {
    pub protocol_version: u32,
    pub account_address: AccountAddress,
    pub geo_location: GeoLocation,
    /// Opaque network address, stable for the membership lifetime.
    pub network_address: String,
    pub ports: Ports,
    /// Creation time, unix milliseconds.
    pub timestamp: u64,
}

impl Timestamped for NodeIdentity {
    fn timestamp(&self) -> u64 {
        self.timestamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_bounds() {
        assert!(GeoLocation::new(5400, 10800).is_ok());
        assert!(GeoLocation::new(-5400, 0).is_ok());
        assert!(GeoLocation::new(5401, 0).is_err());
        assert!(GeoLocation::new(-5401, 0).is_err());
        assert!(GeoLocation::new(0, -1).is_err());
        assert!(GeoLocation::new(0, 10801).is_err());
    }

    #[test]
    fn test_identity_timestamp() {
        let identity = NodeIdentity {
            protocol_version: crate::PROTOCOL_VERSION,
            account_address: AccountAddress::default(),
            geo_location: GeoLocation {
                lat_minutes: 0,
                lon_minutes: 0,
            },
            network_address: "10.0.0.1".to_string(),
            ports: Ports { p2p: 7000, rpc: 7001 },
            timestamp: 42,
        };
        assert_eq!(Timestamped::timestamp(&identity), 42);
    }
}
