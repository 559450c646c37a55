use crate::prelude::*;
use crate::sunspec::models::ModelDefinition;
use crate::sunspec::point::{DataType, EnumValue, FlagSet, PointDefinition, PointValue};
use crate::sunspec::{ModelInstance, ModelSnapshot, PointMap};

use bytes::{BufMut, BytesMut};
use nom::{
    bytes::complete::take,
    combinator::map,
    number::complete::{be_f32, be_i16, be_i32, be_u16, be_u32, be_u64},
    IResult,
};

/// Raw value of a single point before scale factors are applied.
#[derive(Clone, Debug, PartialEq)]
enum Raw {
    Signed(i64),
    Unsigned(u64),
    Float(f32),
    Text(String),
    Enum(u16),
    Bits(u32),
    Exponent(i16),
    NotImplemented,
}

// decode {{{
/// Decodes one model instance's registers into a snapshot.
///
/// Every raw value is parsed first and scale factors are applied in a second
/// pass, so a scale factor declared after the points that use it still applies.
pub fn decode(
    definition: &ModelDefinition,
    raw_words: &[u16],
    instance: &ModelInstance,
) -> Result<ModelSnapshot> {
    if instance.model_id != definition.id {
        return Err(Error::Decode {
            model_id: instance.model_id,
            point: "ID".to_string(),
            reason: format!("instance decoded with definition of model {}", definition.id),
        });
    }

    let length = instance.length as usize;
    if raw_words.len() < length {
        return Err(Error::TruncatedModelData {
            model_id: definition.id,
            expected: length,
            actual: raw_words.len(),
        });
    }

    let min_length = definition.min_length() as usize;
    if length < min_length {
        return Err(Error::TruncatedModelData {
            model_id: definition.id,
            expected: min_length,
            actual: length,
        });
    }

    let words = &raw_words[..length];
    let fixed_length = (definition.fixed_block_length() as usize).min(length);
    let fixed_raw = parse_block(definition.id, definition.points, &words[..fixed_length])?;
    let points = resolve(definition.id, &fixed_raw, None)?;

    let mut groups = Vec::new();
    if definition.has_repeating_block() && length > fixed_length {
        let group_length = definition.repeating_block_length() as usize;
        let remainder = &words[fixed_length..];
        let count = remainder.len() / group_length;

        if remainder.len() % group_length != 0 {
            debug!(
                "model {}: ignoring {} trailing registers after {} repeating groups",
                definition.id,
                remainder.len() % group_length,
                count
            );
        }

        for chunk in remainder.chunks_exact(group_length) {
            let group_raw = parse_block(definition.id, definition.repeating, chunk)?;
            groups.push(resolve(definition.id, &group_raw, Some(&fixed_raw))?);
        }
    }

    Ok(ModelSnapshot {
        model_id: definition.id,
        model_name: definition.name.to_string(),
        points,
        groups,
        captured_at: Utc::now(),
    })
}

/// Parses every point whose registers are covered by `words`; trailing
/// optional points beyond the end are left out.
fn parse_block(
    model_id: u16,
    points: &'static [PointDefinition],
    words: &[u16],
) -> Result<Vec<(&'static PointDefinition, Raw)>> {
    let bytes = to_bytes(words);
    let mut input: &[u8] = &bytes;
    let mut parsed = Vec::with_capacity(points.len());
    let mut offset = 0usize;

    for point in points {
        offset += point.register_length() as usize;
        if offset > words.len() {
            if point.mandatory {
                return Err(Error::TruncatedModelData {
                    model_id,
                    expected: offset,
                    actual: words.len(),
                });
            }
            break;
        }

        let (rest, raw) = parse_raw(point.data_type, input).map_err(|e| Error::Decode {
            model_id,
            point: point.name.to_string(),
            reason: e.to_string(),
        })?;
        input = rest;
        parsed.push((point, raw));
    }

    Ok(parsed)
}

fn parse_raw(data_type: DataType, input: &[u8]) -> IResult<&[u8], Raw> {
    match data_type {
        DataType::Int16 => map(be_i16, |v| {
            if v == i16::MIN {
                Raw::NotImplemented
            } else {
                Raw::Signed(v.into())
            }
        })(input),
        DataType::ScaleFactor => map(be_i16, |v| {
            if v == i16::MIN {
                Raw::NotImplemented
            } else {
                Raw::Exponent(v)
            }
        })(input),
        DataType::Uint16 => map(be_u16, |v| {
            if v == u16::MAX {
                Raw::NotImplemented
            } else {
                Raw::Unsigned(v.into())
            }
        })(input),
        DataType::Enum16 => map(be_u16, |v| {
            if v == u16::MAX {
                Raw::NotImplemented
            } else {
                Raw::Enum(v)
            }
        })(input),
        DataType::Bitfield16 => map(be_u16, |v| {
            if v == u16::MAX {
                Raw::NotImplemented
            } else {
                Raw::Bits(v.into())
            }
        })(input),
        DataType::Int32 => map(be_i32, |v| {
            if v == i32::MIN {
                Raw::NotImplemented
            } else {
                Raw::Signed(v.into())
            }
        })(input),
        DataType::Uint32 => map(be_u32, |v| {
            if v == u32::MAX {
                Raw::NotImplemented
            } else {
                Raw::Unsigned(v.into())
            }
        })(input),
        DataType::Bitfield32 => map(be_u32, |v| {
            if v == u32::MAX {
                Raw::NotImplemented
            } else {
                Raw::Bits(v)
            }
        })(input),
        DataType::Acc32 => map(be_u32, |v| {
            if v == 0 {
                Raw::NotImplemented
            } else {
                Raw::Unsigned(v.into())
            }
        })(input),
        DataType::Acc64 => map(be_u64, |v| {
            if v == 0 {
                Raw::NotImplemented
            } else {
                Raw::Unsigned(v)
            }
        })(input),
        DataType::Float32 => map(be_f32, |v| {
            if v.is_nan() {
                Raw::NotImplemented
            } else {
                Raw::Float(v)
            }
        })(input),
        DataType::String(n) => map(take(n as usize * 2), |b: &[u8]| {
            let end = b.iter().rposition(|c| *c != 0).map_or(0, |i| i + 1);
            if end == 0 {
                Raw::NotImplemented
            } else {
                Raw::Text(String::from_utf8_lossy(&b[..end]).into_owned())
            }
        })(input),
        DataType::Pad => map(take(2usize), |_| Raw::NotImplemented)(input),
    }
}

/// Second pass: apply scale factors. Scale factors are looked up in the same
/// block first, then in `outer` (the fixed block, for repeating groups).
fn resolve(
    model_id: u16,
    block: &[(&'static PointDefinition, Raw)],
    outer: Option<&[(&'static PointDefinition, Raw)]>,
) -> Result<PointMap> {
    let mut points = PointMap::new();

    for (point, raw) in block {
        let value = match (raw, point.scale_factor) {
            (Raw::NotImplemented, _) => PointValue::Absent,
            (Raw::Signed(v), Some(sf)) => scaled(model_id, point, *v as f64, sf, block, outer)?,
            (Raw::Unsigned(v), Some(sf)) => scaled(model_id, point, *v as f64, sf, block, outer)?,
            (Raw::Signed(v), None) => PointValue::Integer(*v),
            (Raw::Unsigned(v), None) => {
                i64::try_from(*v).map_or(PointValue::Float(*v as f64), PointValue::Integer)
            }
            (Raw::Float(v), _) => PointValue::Float(f64::from(*v)),
            (Raw::Text(s), _) => PointValue::String(s.clone()),
            (Raw::Enum(v), _) => PointValue::Enum(EnumValue {
                value: *v,
                symbol: point.symbol_name(u32::from(*v)),
            }),
            (Raw::Bits(v), _) => PointValue::Flags(FlagSet::new(*v, point.symbols)),
            (Raw::Exponent(v), _) => PointValue::Integer(i64::from(*v)),
        };
        points.insert(point.name.to_string(), value);
    }

    Ok(points)
}

fn scaled(
    model_id: u16,
    point: &PointDefinition,
    value: f64,
    sf_name: &str,
    block: &[(&'static PointDefinition, Raw)],
    outer: Option<&[(&'static PointDefinition, Raw)]>,
) -> Result<PointValue> {
    let found = block
        .iter()
        .chain(outer.unwrap_or_default())
        .find(|(p, _)| p.name == sf_name);

    match found.map(|(_, raw)| raw) {
        Some(Raw::Exponent(sf)) => Ok(PointValue::Float(apply_scale(value, *sf))),
        // scale factor not implemented, or beyond the end of a short instance
        Some(Raw::NotImplemented) | None => Ok(PointValue::Absent),
        Some(other) => Err(Error::Decode {
            model_id,
            point: point.name.to_string(),
            reason: format!("scale factor {} decoded as {:?}", sf_name, other),
        }),
    }
}
// }}}

// scaling {{{
/// `value * 10^sf`, computed so that one-decimal readings such as 2305 * 10^-1
/// come out as the nearest double to 230.5.
pub fn apply_scale(value: f64, sf: i16) -> f64 {
    if sf < 0 {
        value / 10f64.powi(-i32::from(sf))
    } else {
        value * 10f64.powi(i32::from(sf))
    }
}

/// Inverse of [`apply_scale`], rounded to the nearest raw integer.
pub fn remove_scale(value: f64, sf: i16) -> f64 {
    if sf < 0 {
        (value * 10f64.powi(-i32::from(sf))).round()
    } else {
        (value / 10f64.powi(i32::from(sf))).round()
    }
}
// }}}

// encode {{{
/// Encodes an engineering value for `point` into its register words.
///
/// `sf` is the current value of the point's scale factor, when it has one.
/// Fails without side effects if the value has the wrong kind, falls outside
/// the declared range, is finer than the scale factor allows, does not fit
/// the raw type, or would encode to the type's not-implemented pattern.
pub fn encode_point(
    model_id: u16,
    point: &PointDefinition,
    value: &PointValue,
    sf: Option<i16>,
) -> Result<Vec<u16>> {
    let out_of_range = |reason: String| Error::ValueOutOfRange {
        model_id,
        point: point.name.to_string(),
        reason,
    };
    let wrong_type = |expected: &str| Error::InvalidValueType {
        model_id,
        point: point.name.to_string(),
        expected: expected.to_string(),
    };

    match point.data_type {
        DataType::String(n) => {
            let text = value.as_str().ok_or_else(|| wrong_type("a string"))?;
            if text.len() > n as usize * 2 {
                return Err(out_of_range(format!("longer than {} characters", n * 2)));
            }
            let mut bytes = text.as_bytes().to_vec();
            bytes.resize(n as usize * 2, 0);
            return Ok(bytes.chunks_exact(2).map(|c| u16::from_be_bytes([c[0], c[1]])).collect());
        }
        DataType::Pad => return Err(wrong_type("nothing; padding is not writable")),
        _ => {}
    }

    let engineering = value.as_f64().ok_or_else(|| wrong_type("a number"))?;
    if !engineering.is_finite() {
        return Err(out_of_range("value is not finite".to_string()));
    }

    if let Some((min, max)) = point.range {
        if engineering < min || engineering > max {
            return Err(out_of_range(format!("{} outside {}..={}", engineering, min, max)));
        }
    }

    let raw = match (point.scale_factor, sf) {
        (Some(_), Some(sf)) => {
            let raw = remove_scale(engineering, sf);
            let stored = apply_scale(raw, sf);
            if (stored - engineering).abs() > 1e-9 * engineering.abs().max(1.0) {
                return Err(out_of_range(format!(
                    "{} is not representable at scale 10^{} (nearest {})",
                    engineering, sf, stored
                )));
            }
            raw
        }
        (Some(name), None) => {
            return Err(out_of_range(format!("scale factor {} is not implemented", name)))
        }
        (None, _) if engineering.fract() != 0.0 && point.data_type != DataType::Float32 => {
            return Err(wrong_type("an integer"))
        }
        (None, _) => engineering,
    };

    if !point.symbols.is_empty() && point.data_type == DataType::Enum16 {
        if raw < 0.0 || point.symbol_name(raw as u32).is_none() {
            return Err(out_of_range(format!("{} is not a defined enumeration value", raw)));
        }
    }

    let words = match point.data_type {
        DataType::Int16 | DataType::ScaleFactor => {
            check_raw(raw, f64::from(i16::MIN) + 1.0, f64::from(i16::MAX)).map_err(out_of_range)?;
            vec![raw as i16 as u16]
        }
        DataType::Uint16 | DataType::Enum16 | DataType::Bitfield16 => {
            check_raw(raw, 0.0, f64::from(u16::MAX) - 1.0).map_err(out_of_range)?;
            vec![raw as u16]
        }
        DataType::Int32 => {
            check_raw(raw, f64::from(i32::MIN) + 1.0, f64::from(i32::MAX)).map_err(out_of_range)?;
            split_u32(raw as i32 as u32)
        }
        DataType::Uint32 | DataType::Bitfield32 => {
            check_raw(raw, 0.0, f64::from(u32::MAX) - 1.0).map_err(out_of_range)?;
            split_u32(raw as u32)
        }
        DataType::Acc32 => {
            check_raw(raw, 1.0, f64::from(u32::MAX)).map_err(out_of_range)?;
            split_u32(raw as u32)
        }
        DataType::Acc64 => {
            check_raw(raw, 1.0, u64::MAX as f64).map_err(out_of_range)?;
            let v = raw as u64;
            vec![(v >> 48) as u16, (v >> 32) as u16, (v >> 16) as u16, v as u16]
        }
        DataType::Float32 => split_u32((raw as f32).to_bits()),
        DataType::String(_) | DataType::Pad => return Err(wrong_type("a string")),
    };

    Ok(words)
}

fn check_raw(raw: f64, min: f64, max: f64) -> std::result::Result<(), String> {
    if raw < min || raw > max {
        Err(format!("raw value {} does not fit {}..={}", raw, min, max))
    } else {
        Ok(())
    }
}

fn split_u32(v: u32) -> Vec<u16> {
    vec![(v >> 16) as u16, v as u16]
}
// }}}

pub(crate) fn to_bytes(words: &[u16]) -> BytesMut {
    let mut buf = BytesMut::with_capacity(words.len() * 2);
    for word in words {
        buf.put_u16(*word);
    }
    buf
}
