use serde::{Deserialize, Serialize};

/// Sun/view geometry of one observation, all angles in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    /// Solar zenith angle
    pub sza: f64,
    /// View zenith angle
    pub vza: f64,
    /// Relative azimuth, folded into [0, 180]
    pub razi: f64,
}

impl Geometry {
    /// Build from solar/view zenith and azimuth angles
    pub fn from_zenith_angles(sza: f64, saa: f64, vza: f64, vaa: f64) -> Self {
        Self {
            sza,
            vza,
            razi: relative_azimuth(saa, vaa),
        }
    }

    /// Build from solar/view elevation angles (zenith = 90 - elevation)
    pub fn from_elevation_angles(sun_elev: f64, saa: f64, view_elev: f64, vaa: f64) -> Self {
        Self::from_zenith_angles(90.0 - sun_elev, saa, 90.0 - view_elev, vaa)
    }

    /// Geometric air-mass factor 1/cos(sza) + 1/cos(vza)
    pub fn air_mass(&self) -> f64 {
        1.0 / self.sza.to_radians().cos() + 1.0 / self.vza.to_radians().cos()
    }

    pub fn cos_sza(&self) -> f64 {
        self.sza.to_radians().cos()
    }
}

/// Fold the azimuth difference into [0, 180] so that 0 means backscatter
/// and 180 forward scatter.
pub fn relative_azimuth(saa: f64, vaa: f64) -> f64 {
    let mut razi = (saa - vaa).abs();
    if razi > 180.0 {
        razi = 360.0 - razi;
    }
    180.0 - razi
}
