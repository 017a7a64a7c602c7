//! Reader for binary aerosol LUT files (MOMO layout)
//!
//! All numbers are little-endian. The file holds five dimension vectors,
//! each prefixed by an `i32` length: vza, sza, azi, surface pressure
//! (stored decreasing), aot. They are followed by the values, ordered
//! wavelength, aot, pressure (descending), azi, sza, vza, parameter with
//! five parameters per node, then one wavelength per channel and a solar
//! irradiance scalar. The channel count is not stored in the file.
//!
//! The companion gaseous-transmission file starts with three `i32` counts
//! (angle, water vapour, ozone), then the three axes and the transmission
//! values with the channel varying fastest. Angle nodes are zenith angles
//! in degrees, tabulated as the two-way air mass `2/cos(angle)`.

use crate::lut::{AtmosphericTerms, GasTable, GriddedLut, LutAxes};
use crate::types::{AotError, AotResult};
use ndarray::{Array4, Array6};
use std::path::Path;

/// Parameters stored per node: path radiance, Tdown·Tup, spherical albedo,
/// direct/total down, and an upward ratio that the inversion does not use
const N_PARAMETERS: usize = 5;

struct LeReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> LeReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take4(&mut self) -> AotResult<[u8; 4]> {
        let end = self.pos + 4;
        let chunk = self.bytes.get(self.pos..end).ok_or_else(|| {
            AotError::Lut(format!("unexpected end of LUT data at byte {}", self.pos))
        })?;
        self.pos = end;
        let mut buf = [0u8; 4];
        buf.copy_from_slice(chunk);
        Ok(buf)
    }

    fn read_f32(&mut self) -> AotResult<f32> {
        Ok(f32::from_le_bytes(self.take4()?))
    }

    fn read_len(&mut self) -> AotResult<usize> {
        let len = i32::from_le_bytes(self.take4()?);
        if len <= 0 {
            return Err(AotError::Lut(format!("invalid dimension length {}", len)));
        }
        Ok(len as usize)
    }

    fn read_vec(&mut self, len: usize) -> AotResult<Vec<f64>> {
        (0..len).map(|_| self.read_f32().map(f64::from)).collect()
    }

    fn read_dimension(&mut self) -> AotResult<Vec<f64>> {
        let len = self.read_len()?;
        self.read_vec(len)
    }
}

/// Read a MOMO LUT file with `n_channels` spectral channels
pub fn read_momo_lut<P: AsRef<Path>>(path: P, n_channels: usize) -> AotResult<GriddedLut> {
    log::info!("Reading aerosol LUT from: {}", path.as_ref().display());
    let bytes = std::fs::read(path.as_ref())?;
    let lut = parse_momo_lut(&bytes, n_channels)?;
    log::debug!(
        "LUT axes: {} vza, {} sza, {} azi, {} pressure, {} aot; {} channels",
        lut.axes().vza.len(),
        lut.axes().sza.len(),
        lut.axes().razi.len(),
        lut.axes().pressure.len(),
        lut.axes().aot.len(),
        n_channels
    );
    Ok(lut)
}

/// Parse an in-memory MOMO LUT
pub fn parse_momo_lut(bytes: &[u8], n_channels: usize) -> AotResult<GriddedLut> {
    if n_channels == 0 {
        return Err(AotError::Lut("LUT needs at least one channel".to_string()));
    }
    let mut rd = LeReader::new(bytes);

    let vza = rd.read_dimension()?;
    let sza = rd.read_dimension()?;
    let razi = rd.read_dimension()?;
    let mut pressure = rd.read_dimension()?;
    pressure.reverse();
    let aot = rd.read_dimension()?;

    let axes = LutAxes { pressure, vza, sza, razi, aot };
    let (n_aot, n_p, n_azi, n_sza, n_vza) = (
        axes.aot.len(),
        axes.pressure.len(),
        axes.razi.len(),
        axes.sza.len(),
        axes.vza.len(),
    );

    let mut table = Array6::from_elem((n_channels, n_aot, n_p, n_azi, n_sza, n_vza), AtmosphericTerms::default());
    let mut node = [0f32; N_PARAMETERS];
    for c in 0..n_channels {
        for ia in 0..n_aot {
            for ip in (0..n_p).rev() {
                for ir in 0..n_azi {
                    for is in 0..n_sza {
                        for iv in 0..n_vza {
                            for value in node.iter_mut() {
                                *value = rd.read_f32()?;
                            }
                            table[[c, ia, ip, ir, is, iv]] = AtmosphericTerms {
                                path_reflectance: node[0],
                                transmission: node[1],
                                spherical_albedo: node[2],
                                direct_fraction: node[3],
                            };
                        }
                    }
                }
            }
        }
    }

    let wavelengths = rd.read_vec(n_channels)?;
    let solar_irradiance = rd.read_f32()? as f64;
    if rd.pos != bytes.len() {
        log::warn!(
            "LUT has {} trailing bytes; channel count {} may be wrong",
            bytes.len() - rd.pos,
            n_channels
        );
    }

    Ok(GriddedLut::new(axes, wavelengths, table)?.with_solar_irradiance(solar_irradiance))
}

/// Read a gaseous-transmission table with `n_channels` channels
pub fn read_gas_table<P: AsRef<Path>>(path: P, n_channels: usize) -> AotResult<GasTable> {
    log::info!("Reading gas transmission table from: {}", path.as_ref().display());
    let bytes = std::fs::read(path.as_ref())?;
    parse_gas_table(&bytes, n_channels)
}

/// Parse an in-memory gaseous-transmission table
pub fn parse_gas_table(bytes: &[u8], n_channels: usize) -> AotResult<GasTable> {
    if n_channels == 0 {
        return Err(AotError::Lut("gas table needs at least one channel".to_string()));
    }
    let mut rd = LeReader::new(bytes);
    let (n_angle, n_wv, n_o3) = (rd.read_len()?, rd.read_len()?, rd.read_len()?);

    let air_mass = rd
        .read_vec(n_angle)?
        .into_iter()
        .map(|angle| 2.0 / angle.to_radians().cos())
        .collect();
    let water_vapour = rd.read_vec(n_wv)?;
    let ozone = rd.read_vec(n_o3)?;

    let mut values = Array4::zeros((n_angle, n_wv, n_o3, n_channels));
    for value in values.iter_mut() {
        *value = rd.read_f32()?;
    }
    if rd.pos != bytes.len() {
        log::warn!(
            "Gas table has {} trailing bytes; channel count {} may be wrong",
            bytes.len() - rd.pos,
            n_channels
        );
    }

    GasTable::new(air_mass, water_vapour, ozone, values)
}
