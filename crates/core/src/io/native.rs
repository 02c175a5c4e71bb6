//! Native GeoTIFF reading/writing
//!
//! Uses the `tiff` crate for single-band TIFF I/O. Georeferencing is carried
//! through ModelPixelScale + ModelTiepoint, the CRS through the EPSG entry of
//! the GeoKey directory, and no-data through the GDAL_NODATA ASCII tag.

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster, RasterElement};
use std::fs::File;
use std::io::{BufWriter, Cursor};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::colortype::Gray32Float;
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GDAL_NODATA: u16 = 42113;

const GT_MODEL_TYPE_KEY: u16 = 1024;
const GT_RASTER_TYPE_KEY: u16 = 1025;
const GEOGRAPHIC_TYPE_KEY: u16 = 2048;
const PROJECTED_CS_TYPE_KEY: u16 = 3072;

/// Options for writing GeoTIFF files
#[derive(Debug, Clone, Default)]
pub struct GeoTiffOptions {
    /// CRS to record in the GeoKey directory, overriding the raster's own
    pub crs: Option<CRS>,
}

/// Read a single-band GeoTIFF file into a Raster
pub fn read_geotiff<T, P>(path: P) -> Result<Raster<T>>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = File::open(path.as_ref())?;
    decode_geotiff(file)
}

/// Read a GeoTIFF from an in-memory buffer into a Raster
pub fn read_geotiff_from_buffer<T>(data: &[u8]) -> Result<Raster<T>>
where
    T: RasterElement,
{
    decode_geotiff(Cursor::new(data))
}

fn cast_all<S, T>(buf: Vec<S>) -> Vec<T>
where
    S: num_traits::NumCast + Copy,
    T: RasterElement,
{
    buf.into_iter()
        .map(|v| num_traits::cast(v).unwrap_or_else(T::default_nodata))
        .collect()
}

fn decode_geotiff<T, R>(reader: R) -> Result<Raster<T>>
where
    T: RasterElement,
    R: std::io::Read + std::io::Seek,
{
    let mut decoder = Decoder::new(reader)
        .map_err(|e| Error::Other(format!("TIFF decode error: {}", e)))?;

    let (width, height) = decoder
        .dimensions()
        .map_err(|e| Error::Other(format!("Cannot read dimensions: {}", e)))?;
    let rows = height as usize;
    let cols = width as usize;

    let result = decoder
        .read_image()
        .map_err(|e| Error::Other(format!("Cannot read image data: {}", e)))?;

    let data: Vec<T> = match result {
        DecodingResult::F32(buf) => cast_all(buf),
        DecodingResult::F64(buf) => cast_all(buf),
        DecodingResult::U8(buf) => cast_all(buf),
        DecodingResult::U16(buf) => cast_all(buf),
        DecodingResult::U32(buf) => cast_all(buf),
        DecodingResult::I16(buf) => cast_all(buf),
        DecodingResult::I32(buf) => cast_all(buf),
        _ => return Err(Error::UnsupportedDataType("Unsupported TIFF pixel format".to_string())),
    };

    if data.len() != rows * cols {
        return Err(Error::UnsupportedDataType(format!(
            "expected a single band of {} cells, found {} samples",
            rows * cols,
            data.len()
        )));
    }

    let mut raster = Raster::from_vec(data, rows, cols)?;

    if let Some(transform) = read_geotransform(&mut decoder) {
        raster.set_transform(transform);
    }
    raster.set_crs(read_crs(&mut decoder));

    let nodata = decoder
        .get_tag_ascii_string(Tag::from_u16_exhaustive(GDAL_NODATA))
        .ok()
        .and_then(|s| s.trim_matches(char::from(0)).trim().parse::<f64>().ok())
        .map(T::from_f64);
    raster.set_nodata(nodata.or_else(|| T::is_float().then(T::default_nodata)));

    Ok(raster)
}

fn read_geotransform<R: std::io::Read + std::io::Seek>(decoder: &mut Decoder<R>) -> Option<GeoTransform> {
    let scale = decoder.get_tag_f64_vec(Tag::from_u16_exhaustive(MODEL_PIXEL_SCALE)).ok()?;
    let tiepoint = decoder.get_tag_f64_vec(Tag::from_u16_exhaustive(MODEL_TIEPOINT)).ok()?;

    if scale.len() >= 2 && tiepoint.len() >= 6 {
        // tiepoint: [I, J, K, X, Y, Z]; scale: [ScaleX, ScaleY, ScaleZ]
        let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
        let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
        return Some(GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]));
    }
    None
}

fn read_crs<R: std::io::Read + std::io::Seek>(decoder: &mut Decoder<R>) -> Option<CRS> {
    let keys = decoder.get_tag_u16_vec(Tag::from_u16_exhaustive(GEO_KEY_DIRECTORY)).ok()?;
    // Header [version, revision, minor, count] then 4-tuples [key, location, count, value]
    keys.get(4..)?
        .chunks_exact(4)
        .find(|entry| {
            (entry[0] == PROJECTED_CS_TYPE_KEY || entry[0] == GEOGRAPHIC_TYPE_KEY) && entry[1] == 0
        })
        .map(|entry| CRS::from_epsg(entry[3] as u32))
}

/// Write a Raster to a GeoTIFF file as 32-bit float
pub fn write_geotiff<T, P>(raster: &Raster<T>, path: P, options: Option<GeoTiffOptions>) -> Result<()>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = BufWriter::new(File::create(path.as_ref())?);
    encode_geotiff(raster, file, options.unwrap_or_default())
}

/// Write a Raster to an in-memory GeoTIFF buffer
pub fn write_geotiff_to_buffer<T>(raster: &Raster<T>, options: Option<GeoTiffOptions>) -> Result<Vec<u8>>
where
    T: RasterElement,
{
    let mut buf = Vec::new();
    encode_geotiff(raster, Cursor::new(&mut buf), options.unwrap_or_default())?;
    Ok(buf)
}

fn geokeys(crs: Option<&CRS>) -> Vec<u16> {
    let epsg = crs.and_then(|c| c.epsg()).filter(|&code| code <= u16::MAX as u32);
    match epsg {
        Some(4326) => vec![1, 1, 0, 3, GT_MODEL_TYPE_KEY, 0, 1, 2, GT_RASTER_TYPE_KEY, 0, 1, 1, GEOGRAPHIC_TYPE_KEY, 0, 1, 4326],
        Some(code) => vec![1, 1, 0, 3, GT_MODEL_TYPE_KEY, 0, 1, 1, GT_RASTER_TYPE_KEY, 0, 1, 1, PROJECTED_CS_TYPE_KEY, 0, 1, code as u16],
        None => vec![1, 1, 0, 2, GT_MODEL_TYPE_KEY, 0, 1, 1, GT_RASTER_TYPE_KEY, 0, 1, 1],
    }
}

fn encode_geotiff<T, W>(raster: &Raster<T>, writer: W, options: GeoTiffOptions) -> Result<()>
where
    T: RasterElement,
    W: std::io::Write + std::io::Seek,
{
    let tiff_err = |what: &str, e: tiff::TiffError| Error::Other(format!("{}: {}", what, e));

    let mut encoder = TiffEncoder::new(writer).map_err(|e| tiff_err("TIFF encoder error", e))?;
    let (rows, cols) = raster.shape();

    let data: Vec<f32> = raster
        .data()
        .iter()
        .map(|&v| if raster.is_nodata(v) && T::is_float() { f32::NAN } else { num_traits::cast(v).unwrap_or(f32::NAN) })
        .collect();

    let mut image = encoder
        .new_image::<Gray32Float>(cols as u32, rows as u32)
        .map_err(|e| tiff_err("Cannot create TIFF image", e))?;

    let gt = raster.transform();
    let scale = [gt.pixel_width, gt.pixel_height.abs(), 0.0];
    image
        .encoder()
        .write_tag(Tag::Unknown(MODEL_PIXEL_SCALE), &scale[..])
        .map_err(|e| tiff_err("Cannot write scale tag", e))?;

    let tiepoint = [0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
    image
        .encoder()
        .write_tag(Tag::Unknown(MODEL_TIEPOINT), &tiepoint[..])
        .map_err(|e| tiff_err("Cannot write tiepoint tag", e))?;

    let crs = options.crs.as_ref().or(raster.crs());
    image
        .encoder()
        .write_tag(Tag::Unknown(GEO_KEY_DIRECTORY), &geokeys(crs)[..])
        .map_err(|e| tiff_err("Cannot write geokey tag", e))?;

    let nodata_text = match raster.nodata().and_then(|nd| nd.to_f64()) {
        Some(nd) if nd.is_nan() => Some("nan".to_string()),
        Some(nd) => Some(nd.to_string()),
        None => None,
    };
    if let Some(text) = nodata_text {
        image
            .encoder()
            .write_tag(Tag::Unknown(GDAL_NODATA), text.as_str())
            .map_err(|e| tiff_err("Cannot write nodata tag", e))?;
    }

    image
        .write_data(&data)
        .map_err(|e| tiff_err("Cannot write image data", e))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_roundtrip_keeps_georeferencing() {
        let mut raster: Raster<f64> = Raster::new(3, 4);
        for r in 0..3 {
            for c in 0..4 {
                raster.set(r, c, (r * 4 + c) as f64 * 0.01).unwrap();
            }
        }
        raster.set(1, 1, f64::NAN).unwrap();
        raster.set_transform(GeoTransform::new(360000.0, 150000.0, 10.0, -10.0));
        raster.set_crs(Some(CRS::utm(48, true)));
        raster.set_nodata(Some(f64::NAN));

        let bytes = write_geotiff_to_buffer(&raster, None).unwrap();
        let back: Raster<f64> = read_geotiff_from_buffer(&bytes).unwrap();

        assert_eq!(back.shape(), (3, 4));
        assert_eq!(back.transform(), raster.transform());
        assert_eq!(back.crs().and_then(|c| c.epsg()), Some(32648));
        assert!(back.get(1, 1).unwrap().is_nan());
        assert!((back.get(2, 3).unwrap() - 0.11).abs() < 1e-6);
    }

    #[test]
    fn test_label_raster_nodata_roundtrip() {
        let mut labels: Raster<i32> = Raster::filled(2, 2, 1);
        labels.set(0, 0, -1).unwrap();
        labels.set_nodata(Some(-1));

        let bytes = write_geotiff_to_buffer(&labels, None).unwrap();
        let back: Raster<i32> = read_geotiff_from_buffer(&bytes).unwrap();
        assert_eq!(back.nodata(), Some(-1));
        assert_eq!(back.get(0, 0).unwrap(), -1);
        assert_eq!(back.get(1, 1).unwrap(), 1);
    }
}
