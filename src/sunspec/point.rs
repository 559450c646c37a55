use serde::Serialize;

// DataType {{{
/// Register encodings used by the standard SunSpec models.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataType {
    Int16,
    Uint16,
    Acc32,
    Acc64,
    Int32,
    Uint32,
    Float32,
    Enum16,
    /// Packed characters, two per register; the payload is the register count.
    String(u16),
    Bitfield16,
    Bitfield32,
    /// `sunssf`: signed base-10 exponent applied to sibling points.
    ScaleFactor,
    Pad,
}

impl DataType {
    pub const fn register_length(&self) -> u16 {
        match self {
            DataType::Int16
            | DataType::Uint16
            | DataType::Enum16
            | DataType::Bitfield16
            | DataType::ScaleFactor
            | DataType::Pad => 1,
            DataType::Acc32
            | DataType::Int32
            | DataType::Uint32
            | DataType::Float32
            | DataType::Bitfield32 => 2,
            DataType::Acc64 => 4,
            DataType::String(n) => *n,
        }
    }

    /// The raw register pattern a device reports when it does not implement a point.
    pub fn not_implemented_words(&self) -> Vec<u16> {
        match self {
            DataType::Int16 | DataType::ScaleFactor => vec![0x8000],
            DataType::Uint16 | DataType::Enum16 | DataType::Bitfield16 => vec![0xFFFF],
            DataType::Int32 => vec![0x8000, 0x0000],
            DataType::Uint32 | DataType::Bitfield32 => vec![0xFFFF, 0xFFFF],
            DataType::Float32 => vec![0x7FC0, 0x0000],
            DataType::Acc32 => vec![0; 2],
            DataType::Acc64 => vec![0; 4],
            DataType::String(n) => vec![0; *n as usize],
            DataType::Pad => vec![0x8000],
        }
    }

    pub fn is_numeric(&self) -> bool {
        !matches!(
            self,
            DataType::String(_) | DataType::Pad | DataType::Bitfield16 | DataType::Bitfield32
        )
    }
} // }}}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    ReadOnly,
    ReadWrite,
}

/// Enumerated value (for `enum16`) or bit position (for bitfields) with its name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Symbol {
    pub value: u32,
    pub name: &'static str,
}

pub const fn sym(value: u32, name: &'static str) -> Symbol {
    Symbol { value, name }
}

// PointDefinition {{{
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointDefinition {
    pub name: &'static str,
    pub data_type: DataType,
    pub scale_factor: Option<&'static str>,
    pub access: Access,
    pub mandatory: bool,
    pub units: Option<&'static str>,
    pub symbols: &'static [Symbol],
    /// Valid engineering-unit range for writes, inclusive.
    pub range: Option<(f64, f64)>,
}

impl PointDefinition {
    pub const fn new(name: &'static str, data_type: DataType) -> Self {
        Self {
            name,
            data_type,
            scale_factor: None,
            access: Access::ReadOnly,
            mandatory: false,
            units: None,
            symbols: &[],
            range: None,
        }
    }

    pub const fn sf(mut self, scale_factor: &'static str) -> Self {
        self.scale_factor = Some(scale_factor);
        self
    }

    pub const fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    pub const fn rw(mut self) -> Self {
        self.access = Access::ReadWrite;
        self
    }

    pub const fn units(mut self, units: &'static str) -> Self {
        self.units = Some(units);
        self
    }

    pub const fn symbols(mut self, symbols: &'static [Symbol]) -> Self {
        self.symbols = symbols;
        self
    }

    pub const fn range(mut self, min: f64, max: f64) -> Self {
        self.range = Some((min, max));
        self
    }

    pub const fn register_length(&self) -> u16 {
        self.data_type.register_length()
    }

    pub fn is_writable(&self) -> bool {
        self.access == Access::ReadWrite
    }

    pub fn symbol_name(&self, value: u32) -> Option<&'static str> {
        self.symbols.iter().find(|s| s.value == value).map(|s| s.name)
    }
} // }}}

// PointValue {{{
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EnumValue {
    pub value: u16,
    pub symbol: Option<&'static str>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FlagSet {
    pub raw: u32,
    pub flags: Vec<&'static str>,
}

impl FlagSet {
    pub fn new(raw: u32, symbols: &'static [Symbol]) -> Self {
        let flags = symbols
            .iter()
            .filter(|s| s.value < 32 && raw & (1 << s.value) != 0)
            .map(|s| s.name)
            .collect();

        Self { raw, flags }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.flags.iter().any(|f| *f == name)
    }
}

/// A decoded point. `Absent` is the not-implemented state and never carries a number.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PointValue {
    Integer(i64),
    Float(f64),
    String(String),
    Enum(EnumValue),
    Flags(FlagSet),
    Absent,
}

impl PointValue {
    pub fn is_absent(&self) -> bool {
        matches!(self, PointValue::Absent)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PointValue::Integer(v) => Some(*v as f64),
            PointValue::Float(v) => Some(*v),
            PointValue::Enum(e) => Some(f64::from(e.value)),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PointValue::Integer(v) => Some(*v),
            PointValue::Enum(e) => Some(i64::from(e.value)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PointValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<i64> for PointValue {
    fn from(v: i64) -> Self {
        PointValue::Integer(v)
    }
}

impl From<f64> for PointValue {
    fn from(v: f64) -> Self {
        PointValue::Float(v)
    }
}

impl From<&str> for PointValue {
    fn from(v: &str) -> Self {
        PointValue::String(v.to_string())
    }
}

impl TryFrom<&serde_json::Value> for PointValue {
    type Error = String;

    /// Accepts the scalar JSON bodies an HTTP write request carries.
    fn try_from(value: &serde_json::Value) -> Result<Self, Self::Error> {
        use serde_json::Value;

        match value {
            Value::Null => Ok(PointValue::Absent),
            Value::Bool(b) => Ok(PointValue::Integer(i64::from(*b))),
            Value::Number(n) => n
                .as_i64()
                .map(PointValue::Integer)
                .or_else(|| n.as_f64().map(PointValue::Float))
                .ok_or_else(|| format!("unsupported number {}", n)),
            Value::String(s) => Ok(PointValue::String(s.clone())),
            other => Err(format!("unsupported value {}", other)),
        }
    }
} // }}}
