//! EWKB (Extended Well-Known Binary) encode/decode (spec §6, property P6).
//!
//! Grounded on `examples/other_examples/c36ddf6a_DoFabien-cadastre-pg__cadastre-pg-src-export-postgres.rs.rs`,
//! which embeds an SRID into WKB bytes before a COPY upload the same way
//! this module does, and on spec §6's literal byte layout: little-endian
//! WKB with the type's high bit (`0x2000_0000`) set and the SRID spelled
//! out as a 4-byte little-endian integer immediately after the type. Hex
//! encoding/decoding is `hex`, matching the teacher's preference for small
//! focused crates over hand-rolled codecs.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use geo::{
    Coord, Geometry, GeometryCollection, LineString, MultiLineString, MultiPoint, MultiPolygon, Point, Polygon,
};

use crate::error::{CoreError, Result};

const WKB_POINT: u32 = 1;
const WKB_LINESTRING: u32 = 2;
const WKB_POLYGON: u32 = 3;
const WKB_MULTIPOINT: u32 = 4;
const WKB_MULTILINESTRING: u32 = 5;
const WKB_MULTIPOLYGON: u32 = 6;
const WKB_GEOMETRYCOLLECTION: u32 = 7;

const SRID_FLAG: u32 = 0x2000_0000;

/// Encodes a geometry as ASCII-hex EWKB for the given SRID (spec §6).
pub fn encode_hex(geom: &Geometry<f64>, srid: i32) -> Result<String> {
    let mut buf = Vec::new();
    write_geometry(&mut buf, geom, srid)?;
    Ok(hex::encode_upper(buf))
}

/// Decodes ASCII-hex EWKB back into a geometry and its SRID (spec §6,
/// property P6: `ewkb_decode(ewkb_encode(g)) == g`).
pub fn decode_hex(text: &str) -> Result<(Geometry<f64>, i32)> {
    let bytes = hex::decode(text).map_err(|e| CoreError::Input(format!("invalid EWKB hex: {e}")))?;
    let mut cursor = std::io::Cursor::new(bytes);
    read_geometry(&mut cursor)
}

fn write_header(buf: &mut Vec<u8>, wkb_type: u32, srid: i32) -> Result<()> {
    buf.write_u8(1)?; // little-endian byte order marker
    buf.write_u32::<LittleEndian>(wkb_type | SRID_FLAG)?;
    buf.write_i32::<LittleEndian>(srid)?;
    Ok(())
}

fn write_point(buf: &mut Vec<u8>, p: &Coord<f64>) -> Result<()> {
    buf.write_f64::<LittleEndian>(p.x)?;
    buf.write_f64::<LittleEndian>(p.y)?;
    Ok(())
}

fn write_line_string(buf: &mut Vec<u8>, ls: &LineString<f64>) -> Result<()> {
    buf.write_u32::<LittleEndian>(ls.0.len() as u32)?;
    for p in &ls.0 {
        write_point(buf, p)?;
    }
    Ok(())
}

fn write_polygon_rings(buf: &mut Vec<u8>, poly: &Polygon<f64>) -> Result<()> {
    let num_rings = 1 + poly.interiors().len();
    buf.write_u32::<LittleEndian>(num_rings as u32)?;
    write_line_string(buf, poly.exterior())?;
    for ring in poly.interiors() {
        write_line_string(buf, ring)?;
    }
    Ok(())
}

fn write_geometry(buf: &mut Vec<u8>, geom: &Geometry<f64>, srid: i32) -> Result<()> {
    match geom {
        Geometry::Point(p) => {
            write_header(buf, WKB_POINT, srid)?;
            write_point(buf, &p.0)?;
        }
        Geometry::LineString(ls) => {
            write_header(buf, WKB_LINESTRING, srid)?;
            write_line_string(buf, ls)?;
        }
        Geometry::Polygon(poly) => {
            write_header(buf, WKB_POLYGON, srid)?;
            write_polygon_rings(buf, poly)?;
        }
        Geometry::MultiPoint(mp) => {
            write_header(buf, WKB_MULTIPOINT, srid)?;
            buf.write_u32::<LittleEndian>(mp.0.len() as u32)?;
            for p in &mp.0 {
                write_header(buf, WKB_POINT, srid)?;
                write_point(buf, &p.0)?;
            }
        }
        Geometry::MultiLineString(mls) => {
            write_header(buf, WKB_MULTILINESTRING, srid)?;
            buf.write_u32::<LittleEndian>(mls.0.len() as u32)?;
            for ls in &mls.0 {
                write_header(buf, WKB_LINESTRING, srid)?;
                write_line_string(buf, ls)?;
            }
        }
        Geometry::MultiPolygon(mpoly) => {
            write_header(buf, WKB_MULTIPOLYGON, srid)?;
            buf.write_u32::<LittleEndian>(mpoly.0.len() as u32)?;
            for poly in &mpoly.0 {
                write_header(buf, WKB_POLYGON, srid)?;
                write_polygon_rings(buf, poly)?;
            }
        }
        Geometry::GeometryCollection(gc) => {
            write_header(buf, WKB_GEOMETRYCOLLECTION, srid)?;
            buf.write_u32::<LittleEndian>(gc.0.len() as u32)?;
            for g in &gc.0 {
                write_geometry(buf, g, srid)?;
            }
        }
        other => return Err(CoreError::Topology(format!("unsupported geometry variant for EWKB: {other:?}"))),
    }
    Ok(())
}

fn read_header(cur: &mut std::io::Cursor<Vec<u8>>) -> Result<(u32, i32)> {
    let byte_order = cur.read_u8()?;
    if byte_order != 1 {
        return Err(CoreError::Input("only little-endian EWKB is supported".into()));
    }
    let raw_type = cur.read_u32::<LittleEndian>()?;
    let srid = if raw_type & SRID_FLAG != 0 { cur.read_i32::<LittleEndian>()? } else { 0 };
    Ok((raw_type & !SRID_FLAG, srid))
}

fn read_point_coord(cur: &mut std::io::Cursor<Vec<u8>>) -> Result<Coord<f64>> {
    let x = cur.read_f64::<LittleEndian>()?;
    let y = cur.read_f64::<LittleEndian>()?;
    Ok(Coord { x, y })
}

fn read_line_string(cur: &mut std::io::Cursor<Vec<u8>>) -> Result<LineString<f64>> {
    let n = cur.read_u32::<LittleEndian>()?;
    let mut coords = Vec::with_capacity(n as usize);
    for _ in 0..n {
        coords.push(read_point_coord(cur)?);
    }
    Ok(LineString::new(coords))
}

fn read_polygon(cur: &mut std::io::Cursor<Vec<u8>>) -> Result<Polygon<f64>> {
    let n = cur.read_u32::<LittleEndian>()?;
    if n == 0 {
        return Err(CoreError::Topology("polygon with zero rings".into()));
    }
    let exterior = read_line_string(cur)?;
    let mut interiors = Vec::with_capacity((n - 1) as usize);
    for _ in 1..n {
        interiors.push(read_line_string(cur)?);
    }
    Ok(Polygon::new(exterior, interiors))
}

fn read_geometry(cur: &mut std::io::Cursor<Vec<u8>>) -> Result<(Geometry<f64>, i32)> {
    let (wkb_type, srid) = read_header(cur)?;
    let geom = match wkb_type {
        WKB_POINT => Geometry::Point(Point(read_point_coord(cur)?)),
        WKB_LINESTRING => Geometry::LineString(read_line_string(cur)?),
        WKB_POLYGON => Geometry::Polygon(read_polygon(cur)?),
        WKB_MULTIPOINT => {
            let n = cur.read_u32::<LittleEndian>()?;
            let mut points = Vec::with_capacity(n as usize);
            for _ in 0..n {
                let (g, _) = read_geometry(cur)?;
                match g {
                    Geometry::Point(p) => points.push(p),
                    _ => return Err(CoreError::Input("MultiPoint member was not a Point".into())),
                }
            }
            Geometry::MultiPoint(MultiPoint(points))
        }
        WKB_MULTILINESTRING => {
            let n = cur.read_u32::<LittleEndian>()?;
            let mut lines = Vec::with_capacity(n as usize);
            for _ in 0..n {
                let (g, _) = read_geometry(cur)?;
                match g {
                    Geometry::LineString(ls) => lines.push(ls),
                    _ => return Err(CoreError::Input("MultiLineString member was not a LineString".into())),
                }
            }
            Geometry::MultiLineString(MultiLineString(lines))
        }
        WKB_MULTIPOLYGON => {
            let n = cur.read_u32::<LittleEndian>()?;
            let mut polys = Vec::with_capacity(n as usize);
            for _ in 0..n {
                let (g, _) = read_geometry(cur)?;
                match g {
                    Geometry::Polygon(p) => polys.push(p),
                    _ => return Err(CoreError::Input("MultiPolygon member was not a Polygon".into())),
                }
            }
            Geometry::MultiPolygon(MultiPolygon(polys))
        }
        WKB_GEOMETRYCOLLECTION => {
            let n = cur.read_u32::<LittleEndian>()?;
            let mut geoms = Vec::with_capacity(n as usize);
            for _ in 0..n {
                geoms.push(read_geometry(cur)?.0);
            }
            Geometry::GeometryCollection(GeometryCollection(geoms))
        }
        other => return Err(CoreError::Input(format!("unknown WKB type {other}"))),
    };
    Ok((geom, srid))
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{line_string, polygon};

    #[test]
    fn point_round_trips() {
        let g = Geometry::Point(Point::new(1.5, -2.5));
        let hex = encode_hex(&g, 4326).unwrap();
        let (decoded, srid) = decode_hex(&hex).unwrap();
        assert_eq!(decoded, g);
        assert_eq!(srid, 4326);
    }

    #[test]
    fn linestring_round_trips() {
        let g = Geometry::LineString(line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 1.0), (x: 2.0, y: 0.0)]);
        let hex = encode_hex(&g, 3857).unwrap();
        let (decoded, srid) = decode_hex(&hex).unwrap();
        assert_eq!(decoded, g);
        assert_eq!(srid, 3857);
    }

    #[test]
    fn polygon_with_hole_round_trips() {
        let outer = line_string![(x: 0.0, y: 0.0), (x: 3.0, y: 0.0), (x: 3.0, y: 3.0), (x: 0.0, y: 3.0), (x: 0.0, y: 0.0)];
        let inner = line_string![(x: 1.0, y: 1.0), (x: 2.0, y: 1.0), (x: 2.0, y: 2.0), (x: 1.0, y: 2.0), (x: 1.0, y: 1.0)];
        let poly = polygon!(exterior: outer, interiors: [inner]);
        let g = Geometry::Polygon(poly);
        let hex = encode_hex(&g, 4326).unwrap();
        let (decoded, _) = decode_hex(&hex).unwrap();
        assert_eq!(decoded, g);
    }

    #[test]
    fn multipolygon_round_trips() {
        let a = polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 0.0)];
        let b = polygon![(x: 10.0, y: 10.0), (x: 11.0, y: 10.0), (x: 11.0, y: 11.0), (x: 10.0, y: 10.0)];
        let g = Geometry::MultiPolygon(MultiPolygon(vec![a, b]));
        let hex = encode_hex(&g, 4326).unwrap();
        let (decoded, _) = decode_hex(&hex).unwrap();
        assert_eq!(decoded, g);
    }

    #[test]
    fn hex_output_is_uppercase_ascii() {
        let g = Geometry::Point(Point::new(0.0, 0.0));
        let hex = encode_hex(&g, 4326).unwrap();
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(hex, hex.to_uppercase());
    }
}
