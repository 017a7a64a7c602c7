use super::gridded::axis_position;
use crate::types::{AotError, AotResult};
use ndarray::Array4;

/// Gaseous transmission per channel, tabulated on air mass, water-vapour
/// column (g/cm²) and ozone column (atm·cm)
#[derive(Debug, Clone)]
pub struct GasTable {
    air_mass: Vec<f64>,
    water_vapour: Vec<f64>,
    ozone: Vec<f64>,
    /// `(air_mass, water_vapour, ozone, channel)`
    values: Array4<f32>,
}

impl GasTable {
    pub fn new(air_mass: Vec<f64>, water_vapour: Vec<f64>, ozone: Vec<f64>, values: Array4<f32>) -> AotResult<Self> {
        for (name, axis) in [("air mass", &air_mass), ("water vapour", &water_vapour), ("ozone", &ozone)] {
            if axis.is_empty() {
                return Err(AotError::Lut(format!("gas axis '{}' is empty", name)));
            }
            if axis.windows(2).any(|w| !(w[1] > w[0])) {
                return Err(AotError::Lut(format!("gas axis '{}' is not strictly increasing", name)));
            }
        }
        let (n_am, n_wv, n_o3, n_channels) = values.dim();
        if (n_am, n_wv, n_o3) != (air_mass.len(), water_vapour.len(), ozone.len()) || n_channels == 0 {
            return Err(AotError::Lut(format!(
                "gas table shape {:?} does not match axes ({}, {}, {})",
                values.dim(),
                air_mass.len(),
                water_vapour.len(),
                ozone.len()
            )));
        }
        if values.iter().any(|&t| !(t > 0.0)) {
            return Err(AotError::Lut("gas transmission must be positive".to_string()));
        }
        Ok(Self {
            air_mass,
            water_vapour,
            ozone,
            values,
        })
    }

    pub fn n_channels(&self) -> usize {
        self.values.dim().3
    }

    /// Trilinear transmission of every channel; coordinates are clamped to
    /// the tabulated range
    pub fn transmission(&self, air_mass: f64, water_vapour: f64, ozone: f64) -> Vec<f64> {
        let positions = [
            axis_position(&self.air_mass, air_mass),
            axis_position(&self.water_vapour, water_vapour),
            axis_position(&self.ozone, ozone),
        ];

        let mut out = vec![0.0; self.n_channels()];
        for corner in 0..8usize {
            let mut weight = 1.0;
            let mut idx = [0usize; 3];
            for (axis, &(lo, hi, w)) in positions.iter().enumerate() {
                if corner & (1 << axis) == 0 {
                    idx[axis] = lo;
                    weight *= 1.0 - w;
                } else {
                    idx[axis] = hi;
                    weight *= w;
                }
            }
            if weight == 0.0 {
                continue;
            }
            for (c, t) in out.iter_mut().enumerate() {
                *t += weight * self.values[[idx[0], idx[1], idx[2], c]] as f64;
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    /// Transmission falls linearly with every coordinate
    fn linear_table() -> GasTable {
        let air_mass = vec![2.0, 3.0, 6.0];
        let water_vapour = vec![0.0, 5.0];
        let ozone = vec![0.2, 0.4];
        let values = Array4::from_shape_fn((3, 2, 2, 2), |(a, w, o, c)| {
            let t = 1.0 - 0.01 * air_mass[a] - 0.02 * water_vapour[w] - 0.1 * ozone[o];
            (t * (1.0 - 0.1 * c as f64)) as f32
        });
        GasTable::new(air_mass, water_vapour, ozone, values).unwrap()
    }

    #[test]
    fn test_trilinear_transmission() {
        let table = linear_table();
        let t = table.transmission(2.5, 2.5, 0.3);
        let expected = 1.0 - 0.025 - 0.05 - 0.03;
        assert_eq!(t.len(), 2);
        assert_abs_diff_eq!(t[0], expected, epsilon = 1e-6);
        assert_abs_diff_eq!(t[1], expected * 0.9, epsilon = 1e-6);
    }

    #[test]
    fn test_coordinates_clamped_to_table() {
        let table = linear_table();
        let edge = table.transmission(6.0, 0.0, 0.4);
        let beyond = table.transmission(40.0, -1.0, 0.9);
        assert_eq!(edge, beyond);
    }

    #[test]
    fn test_shape_checked() {
        let values = Array4::from_elem((2, 2, 2, 1), 0.9f32);
        assert!(GasTable::new(vec![2.0, 3.0], vec![0.0, 5.0], vec![0.3], values.clone()).is_err());
        assert!(GasTable::new(vec![3.0, 2.0], vec![0.0, 5.0], vec![0.2, 0.3], values.clone()).is_err());
        assert!(GasTable::new(vec![2.0, 3.0], vec![0.0, 5.0], vec![0.2, 0.3], values).is_ok());

        let zero = Array4::from_elem((1, 1, 1, 2), 0.0f32);
        assert!(matches!(
            GasTable::new(vec![2.0], vec![2.5], vec![0.3], zero),
            Err(AotError::Lut(_))
        ));
    }
}
