//! Well-Known Binary (OGC Simple Features) encoding of 2D geometries.
//!
//! Every geometry, including each member of a multi-geometry, starts with a
//! one byte order marker (`0` big-endian/XDR, `1` little-endian/NDR)
//! followed by a `u32` type code in that order. Coordinates are `f64` pairs
//! and counts are `u32`.
//!
//! `Line`, `Rect` and `Triangle` have no WKB type of their own and are
//! written as a `LineString` or `Polygon`.

use crate::error::{Error, Result};
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use geo_types::{
    Coord, Geometry, GeometryCollection, LineString, MultiLineString, MultiPoint, MultiPolygon,
    Point, Polygon,
};

const WKB_POINT: u32 = 1;
const WKB_LINESTRING: u32 = 2;
const WKB_POLYGON: u32 = 3;
const WKB_MULTIPOINT: u32 = 4;
const WKB_MULTILINESTRING: u32 = 5;
const WKB_MULTIPOLYGON: u32 = 6;
const WKB_GEOMETRYCOLLECTION: u32 = 7;

/// Byte order of an encoded geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WkbByteOrder {
    /// XDR, marker byte `0`
    BigEndian,
    /// NDR, marker byte `1`
    #[default]
    LittleEndian,
}

impl WkbByteOrder {
    pub fn marker(self) -> u8 {
        match self {
            WkbByteOrder::BigEndian => 0,
            WkbByteOrder::LittleEndian => 1,
        }
    }

    pub fn from_marker(marker: u8) -> Option<Self> {
        match marker {
            0 => Some(WkbByteOrder::BigEndian),
            1 => Some(WkbByteOrder::LittleEndian),
            _ => None,
        }
    }
}

/// Encode a geometry as WKB
pub fn write_wkb(geometry: &Geometry<f64>, order: WkbByteOrder) -> Vec<u8> {
    let mut out = Vec::with_capacity(wkb_size(geometry));
    match order {
        WkbByteOrder::BigEndian => write_geometry::<BigEndian>(&mut out, geometry),
        WkbByteOrder::LittleEndian => write_geometry::<LittleEndian>(&mut out, geometry),
    }
    out
}

/// Number of bytes `write_wkb` produces for this geometry
pub fn wkb_size(geometry: &Geometry<f64>) -> usize {
    const HEADER: usize = 1 + 4;
    const COORD: usize = 16;
    let ring = |ls: &LineString<f64>| 4 + ls.0.len() * COORD;
    let polygon = |p: &Polygon<f64>| {
        if p.exterior().0.is_empty() {
            return 4;
        }
        4 + ring(p.exterior()) + p.interiors().iter().map(ring).sum::<usize>()
    };

    match geometry {
        Geometry::Point(_) => HEADER + COORD,
        Geometry::Line(_) => HEADER + 4 + 2 * COORD,
        Geometry::LineString(ls) => HEADER + ring(ls),
        Geometry::Polygon(p) => HEADER + polygon(p),
        Geometry::Rect(r) => HEADER + polygon(&r.to_polygon()),
        Geometry::Triangle(t) => HEADER + polygon(&t.to_polygon()),
        Geometry::MultiPoint(mp) => HEADER + 4 + mp.0.len() * (HEADER + COORD),
        Geometry::MultiLineString(ml) => {
            HEADER + 4 + ml.0.iter().map(|ls| HEADER + ring(ls)).sum::<usize>()
        }
        Geometry::MultiPolygon(mp) => {
            HEADER + 4 + mp.0.iter().map(|p| HEADER + polygon(p)).sum::<usize>()
        }
        Geometry::GeometryCollection(gc) => HEADER + 4 + gc.0.iter().map(wkb_size).sum::<usize>(),
    }
}

fn put_u32<B: ByteOrder>(out: &mut Vec<u8>, value: u32) {
    let mut raw = [0u8; 4];
    B::write_u32(&mut raw, value);
    out.extend_from_slice(&raw);
}

fn put_coord<B: ByteOrder>(out: &mut Vec<u8>, coord: Coord<f64>) {
    let mut raw = [0u8; 16];
    B::write_f64(&mut raw[..8], coord.x);
    B::write_f64(&mut raw[8..], coord.y);
    out.extend_from_slice(&raw);
}

fn put_header<B: ByteOrder>(out: &mut Vec<u8>, order: WkbByteOrder, type_code: u32) {
    out.push(order.marker());
    put_u32::<B>(out, type_code);
}

fn put_points<B: ByteOrder>(out: &mut Vec<u8>, coords: &[Coord<f64>]) {
    put_u32::<B>(out, coords.len() as u32);
    for &c in coords {
        put_coord::<B>(out, c);
    }
}

fn put_polygon_body<B: ByteOrder>(out: &mut Vec<u8>, polygon: &Polygon<f64>) {
    let exterior = polygon.exterior();
    if exterior.0.is_empty() {
        put_u32::<B>(out, 0);
        return;
    }
    put_u32::<B>(out, 1 + polygon.interiors().len() as u32);
    put_points::<B>(out, &exterior.0);
    for ring in polygon.interiors() {
        put_points::<B>(out, &ring.0);
    }
}

fn write_geometry<B: ByteOrder>(out: &mut Vec<u8>, geometry: &Geometry<f64>) {
    let order = order_of::<B>();
    match geometry {
        Geometry::Point(p) => {
            put_header::<B>(out, order, WKB_POINT);
            put_coord::<B>(out, p.0);
        }
        Geometry::Line(line) => {
            put_header::<B>(out, order, WKB_LINESTRING);
            put_points::<B>(out, &[line.start, line.end]);
        }
        Geometry::LineString(ls) => {
            put_header::<B>(out, order, WKB_LINESTRING);
            put_points::<B>(out, &ls.0);
        }
        Geometry::Polygon(p) => {
            put_header::<B>(out, order, WKB_POLYGON);
            put_polygon_body::<B>(out, p);
        }
        Geometry::Rect(r) => {
            put_header::<B>(out, order, WKB_POLYGON);
            put_polygon_body::<B>(out, &r.to_polygon());
        }
        Geometry::Triangle(t) => {
            put_header::<B>(out, order, WKB_POLYGON);
            put_polygon_body::<B>(out, &t.to_polygon());
        }
        Geometry::MultiPoint(mp) => {
            put_header::<B>(out, order, WKB_MULTIPOINT);
            put_u32::<B>(out, mp.0.len() as u32);
            for p in &mp.0 {
                put_header::<B>(out, order, WKB_POINT);
                put_coord::<B>(out, p.0);
            }
        }
        Geometry::MultiLineString(ml) => {
            put_header::<B>(out, order, WKB_MULTILINESTRING);
            put_u32::<B>(out, ml.0.len() as u32);
            for ls in &ml.0 {
                put_header::<B>(out, order, WKB_LINESTRING);
                put_points::<B>(out, &ls.0);
            }
        }
        Geometry::MultiPolygon(mp) => {
            put_header::<B>(out, order, WKB_MULTIPOLYGON);
            put_u32::<B>(out, mp.0.len() as u32);
            for p in &mp.0 {
                put_header::<B>(out, order, WKB_POLYGON);
                put_polygon_body::<B>(out, p);
            }
        }
        Geometry::GeometryCollection(gc) => {
            put_header::<B>(out, order, WKB_GEOMETRYCOLLECTION);
            put_u32::<B>(out, gc.0.len() as u32);
            for g in &gc.0 {
                write_geometry::<B>(out, g);
            }
        }
    }
}

fn order_of<B: ByteOrder>() -> WkbByteOrder {
    let mut marker = [0u8; 2];
    B::write_u16(&mut marker, 1);
    if marker[0] == 1 {
        WkbByteOrder::LittleEndian
    } else {
        WkbByteOrder::BigEndian
    }
}

/// Decode one WKB geometry.
///
/// Trailing bytes after the geometry are rejected.
pub fn read_wkb(bytes: &[u8]) -> Result<Geometry<f64>> {
    let mut reader = WkbReader { bytes, offset: 0 };
    let geometry = reader.geometry(0)?;
    if reader.offset != bytes.len() {
        return Err(reader.invalid(format!(
            "{} trailing bytes",
            bytes.len() - reader.offset
        )));
    }
    Ok(geometry)
}

// Collections deeper than this are treated as corrupt input.
const MAX_DEPTH: usize = 64;

struct WkbReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl WkbReader<'_> {
    fn invalid(&self, reason: impl Into<String>) -> Error {
        Error::InvalidWkb {
            offset: self.offset,
            reason: reason.into(),
        }
    }

    fn take(&mut self, len: usize) -> Result<&[u8]> {
        let end = self.offset.checked_add(len).filter(|&e| e <= self.bytes.len());
        match end {
            Some(end) => {
                let slice = &self.bytes[self.offset..end];
                self.offset = end;
                Ok(slice)
            }
            None => Err(self.invalid("unexpected end of input")),
        }
    }

    fn u32<B: ByteOrder>(&mut self) -> Result<u32> {
        Ok(B::read_u32(self.take(4)?))
    }

    fn coord<B: ByteOrder>(&mut self) -> Result<Coord<f64>> {
        let raw = self.take(16)?;
        Ok(Coord {
            x: B::read_f64(&raw[..8]),
            y: B::read_f64(&raw[8..]),
        })
    }

    /// Element count, checked against the bytes left so corrupt counts fail fast
    fn count<B: ByteOrder>(&mut self, min_element_size: usize) -> Result<usize> {
        let count = self.u32::<B>()? as usize;
        let remaining = self.bytes.len() - self.offset;
        if count.saturating_mul(min_element_size) > remaining {
            return Err(self.invalid(format!("count {count} exceeds remaining {remaining} bytes")));
        }
        Ok(count)
    }

    fn header(&mut self) -> Result<(WkbByteOrder, u32)> {
        let marker = self.take(1)?[0];
        let order = WkbByteOrder::from_marker(marker)
            .ok_or_else(|| self.invalid(format!("bad byte order marker {marker}")))?;
        let type_code = match order {
            WkbByteOrder::BigEndian => self.u32::<BigEndian>()?,
            WkbByteOrder::LittleEndian => self.u32::<LittleEndian>()?,
        };
        Ok((order, type_code))
    }

    fn geometry(&mut self, depth: usize) -> Result<Geometry<f64>> {
        if depth > MAX_DEPTH {
            return Err(self.invalid("geometry nesting too deep"));
        }
        let (order, type_code) = self.header()?;
        match order {
            WkbByteOrder::BigEndian => self.body::<BigEndian>(type_code, depth),
            WkbByteOrder::LittleEndian => self.body::<LittleEndian>(type_code, depth),
        }
    }

    fn expect_member(&mut self, expected: u32) -> Result<WkbByteOrder> {
        let (order, type_code) = self.header()?;
        if type_code != expected {
            return Err(self.invalid(format!(
                "expected member of type {expected}, found {type_code}"
            )));
        }
        Ok(order)
    }

    fn line_string<B: ByteOrder>(&mut self) -> Result<LineString<f64>> {
        let n = self.count::<B>(16)?;
        let coords = (0..n).map(|_| self.coord::<B>()).collect::<Result<Vec<_>>>()?;
        Ok(LineString::new(coords))
    }

    fn polygon<B: ByteOrder>(&mut self) -> Result<Polygon<f64>> {
        let n = self.count::<B>(4)?;
        let mut rings = (0..n)
            .map(|_| self.line_string::<B>())
            .collect::<Result<Vec<_>>>()?;
        if rings.is_empty() {
            return Ok(Polygon::new(LineString::new(Vec::new()), Vec::new()));
        }
        let exterior = rings.remove(0);
        Ok(Polygon::new(exterior, rings))
    }

    fn member_point(&mut self) -> Result<Point<f64>> {
        let coord = match self.expect_member(WKB_POINT)? {
            WkbByteOrder::BigEndian => self.coord::<BigEndian>()?,
            WkbByteOrder::LittleEndian => self.coord::<LittleEndian>()?,
        };
        Ok(Point(coord))
    }

    fn member_line_string(&mut self) -> Result<LineString<f64>> {
        match self.expect_member(WKB_LINESTRING)? {
            WkbByteOrder::BigEndian => self.line_string::<BigEndian>(),
            WkbByteOrder::LittleEndian => self.line_string::<LittleEndian>(),
        }
    }

    fn member_polygon(&mut self) -> Result<Polygon<f64>> {
        match self.expect_member(WKB_POLYGON)? {
            WkbByteOrder::BigEndian => self.polygon::<BigEndian>(),
            WkbByteOrder::LittleEndian => self.polygon::<LittleEndian>(),
        }
    }

    fn body<B: ByteOrder>(&mut self, type_code: u32, depth: usize) -> Result<Geometry<f64>> {
        let geometry = match type_code {
            WKB_POINT => Geometry::Point(Point(self.coord::<B>()?)),
            WKB_LINESTRING => Geometry::LineString(self.line_string::<B>()?),
            WKB_POLYGON => Geometry::Polygon(self.polygon::<B>()?),
            WKB_MULTIPOINT => {
                let n = self.count::<B>(21)?;
                let points = (0..n)
                    .map(|_| self.member_point())
                    .collect::<Result<Vec<_>>>()?;
                Geometry::MultiPoint(MultiPoint(points))
            }
            WKB_MULTILINESTRING => {
                let n = self.count::<B>(9)?;
                let lines = (0..n)
                    .map(|_| self.member_line_string())
                    .collect::<Result<Vec<_>>>()?;
                Geometry::MultiLineString(MultiLineString(lines))
            }
            WKB_MULTIPOLYGON => {
                let n = self.count::<B>(9)?;
                let polygons = (0..n)
                    .map(|_| self.member_polygon())
                    .collect::<Result<Vec<_>>>()?;
                Geometry::MultiPolygon(MultiPolygon(polygons))
            }
            WKB_GEOMETRYCOLLECTION => {
                let n = self.count::<B>(5)?;
                let members = (0..n)
                    .map(|_| self.geometry(depth + 1))
                    .collect::<Result<Vec<_>>>()?;
                Geometry::GeometryCollection(GeometryCollection(members))
            }
            other => return Err(self.invalid(format!("unsupported geometry type {other}"))),
        };
        Ok(geometry)
    }
}
