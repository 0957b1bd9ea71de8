use std::fmt;

use serde::{Deserialize, Serialize};

/// Address of a housing plot or apartment room. Compared by value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HousingPlotLocation {
    pub world_id: u32,
    pub territory_id: u32,
    pub division_id: u32,
    pub ward_id: u32,
    pub plot_id: u32,
    pub room_id: u32,
    pub is_apartment: bool,
}

impl HousingPlotLocation {
    pub fn plot(world_id: u32, territory_id: u32, ward_id: u32, plot_id: u32) -> Self {
        Self {
            world_id,
            territory_id,
            division_id: 0,
            ward_id,
            plot_id,
            room_id: 0,
            is_apartment: false,
        }
    }
}

impl fmt::Display for HousingPlotLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_apartment {
            write!(
                f,
                "W{}/T{} Ward {} Apartment {} (div {})",
                self.world_id, self.territory_id, self.ward_id, self.room_id, self.division_id
            )
        } else {
            write!(
                f,
                "W{}/T{} Ward {} Plot {}",
                self.world_id, self.territory_id, self.ward_id, self.plot_id
            )
        }
    }
}
