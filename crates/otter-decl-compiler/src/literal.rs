//! Literal assignment checking and store selection
//!
//! [`check_literal`] converts a literal for a property type once, at
//! resolution time. The emitter turns the stored [`LiteralStore`] into an
//! instruction, so every literal that passes the check has exactly one store.

use otter_decl_bytecode::{CompiledComponent, CustomTypeData, Instruction};

use crate::convert;
use crate::meta::{MetaEnum, PropertyType};
use crate::registry::TypeRegistry;
use crate::tree::{Literal, ValueContent};

/// Untyped literal store
#[derive(Debug, Clone, PartialEq)]
pub enum VariantLiteral {
    /// Integral number
    Integer(i32),
    /// Non-integral number
    Double(f64),
    /// Boolean
    Bool(bool),
    /// Anything else, as text
    String(String),
}

/// A checked literal, ready to emit
#[derive(Debug, Clone, PartialEq)]
pub enum LiteralStore {
    /// Untyped property
    Variant(VariantLiteral),
    /// String
    String(String),
    /// Resolved url
    Url(String),
    /// Signed or unsigned integer
    Integer(i32),
    /// Enumeration or flag value
    Enum(i32),
    /// Single precision float
    Float(f32),
    /// Double
    Double(f64),
    /// ARGB color
    Color(u32),
    /// Julian day
    Date(i64),
    /// Hour, minute, second, millisecond
    Time([i32; 4]),
    /// Julian day followed by the time fields
    DateTime([i32; 5]),
    /// Integer point
    Point([f32; 2]),
    /// Float point
    PointF([f32; 2]),
    /// Integer size
    Size([f32; 2]),
    /// Float size
    SizeF([f32; 2]),
    /// Integer rect
    Rect([f32; 4]),
    /// Float rect
    RectF([f32; 4]),
    /// 3D vector
    Vector3D([f32; 3]),
    /// Boolean
    Bool(bool),
    /// Text handed to a registered string converter
    Custom {
        /// Literal text
        text: String,
        /// Target type code
        type_code: u32,
    },
}

/// Check a literal against a property type and convert it
///
/// On failure returns the diagnostic description.
pub fn check_literal(
    ty: &PropertyType,
    enumerator: Option<&MetaEnum>,
    value: &ValueContent,
    base_url: &str,
    registry: &dyn TypeRegistry,
) -> Result<LiteralStore, String> {
    let text = value.as_string();

    if let Some(enumerator) = enumerator {
        if let Some(n) = value.as_number() {
            return Ok(LiteralStore::Enum(n as i32));
        }
        let resolved = if enumerator.is_flag {
            enumerator.keys_to_value(&text)
        } else {
            enumerator.key_to_value(&text)
        };
        return resolved
            .map(LiteralStore::Enum)
            .ok_or_else(|| "Invalid property assignment: unknown enumeration".to_string());
    }

    let fail = |what: &str| format!("Invalid property assignment: {what} expected");

    match ty {
        PropertyType::Variant => Ok(LiteralStore::Variant(match value {
            ValueContent::Literal(Literal::Number(n)) if f64::from(*n as i32) == *n => {
                VariantLiteral::Integer(*n as i32)
            }
            ValueContent::Literal(Literal::Number(n)) => VariantLiteral::Double(*n),
            ValueContent::Literal(Literal::Bool(b)) => VariantLiteral::Bool(*b),
            _ => VariantLiteral::String(text),
        })),
        PropertyType::String => match value {
            ValueContent::Literal(Literal::String(s)) => Ok(LiteralStore::String(s.clone())),
            _ => Err(fail("string")),
        },
        PropertyType::Url => match value {
            ValueContent::Literal(Literal::String(s)) => Ok(LiteralStore::Url(convert::resolve_url(base_url, s))),
            _ => Err(fail("url")),
        },
        PropertyType::UInt => match value.as_number() {
            Some(n) if n >= 0.0 && n <= f64::from(u32::MAX) && f64::from(n as u32) == n => {
                Ok(LiteralStore::Integer(n as u32 as i32))
            }
            _ => Err(fail("unsigned int")),
        },
        PropertyType::Int => match value.as_number() {
            Some(n) if f64::from(n as i32) == n => Ok(LiteralStore::Integer(n as i32)),
            _ => Err(fail("int")),
        },
        PropertyType::Float => value
            .as_number()
            .map(|n| LiteralStore::Float(n as f32))
            .ok_or_else(|| fail("number")),
        PropertyType::Double => value
            .as_number()
            .map(LiteralStore::Double)
            .ok_or_else(|| fail("number")),
        PropertyType::Color => convert::color_from_string(&text)
            .map(LiteralStore::Color)
            .ok_or_else(|| fail("color")),
        PropertyType::Date => convert::date_from_string(&text)
            .map(|d| LiteralStore::Date(convert::julian_day(d)))
            .ok_or_else(|| fail("date")),
        PropertyType::Time => convert::time_from_string(&text)
            .map(|t| LiteralStore::Time(convert::pack_time(t)))
            .ok_or_else(|| fail("time")),
        PropertyType::DateTime => convert::datetime_from_string(&text)
            .map(|dt| LiteralStore::DateTime(convert::pack_datetime(dt)))
            .ok_or_else(|| fail("datetime")),
        PropertyType::Point => convert::point_from_string(&text)
            .map(LiteralStore::Point)
            .ok_or_else(|| fail("point")),
        PropertyType::PointF => convert::point_from_string(&text)
            .map(LiteralStore::PointF)
            .ok_or_else(|| fail("point")),
        PropertyType::Size => convert::size_from_string(&text)
            .map(LiteralStore::Size)
            .ok_or_else(|| fail("size")),
        PropertyType::SizeF => convert::size_from_string(&text)
            .map(LiteralStore::SizeF)
            .ok_or_else(|| fail("size")),
        PropertyType::Rect => convert::rect_from_string(&text)
            .map(LiteralStore::Rect)
            .ok_or_else(|| fail("rect")),
        PropertyType::RectF => convert::rect_from_string(&text)
            .map(LiteralStore::RectF)
            .ok_or_else(|| fail("rect")),
        PropertyType::Vector3D => convert::vector3d_from_string(&text)
            .map(LiteralStore::Vector3D)
            .ok_or_else(|| fail("3D vector")),
        PropertyType::Bool => match value {
            ValueContent::Literal(Literal::Bool(b)) => Ok(LiteralStore::Bool(*b)),
            _ => Err(fail("boolean")),
        },
        other => {
            let code = other.code();
            if registry.has_string_converter(code) {
                Ok(LiteralStore::Custom { text, type_code: code })
            } else {
                Err(format!(
                    "Invalid property assignment: unsupported type \"{}\"",
                    other.name()
                ))
            }
        }
    }
}

impl LiteralStore {
    /// Store instruction for `property`, interning data into `output`
    pub fn to_instruction(&self, property: u32, output: &mut CompiledComponent) -> Instruction {
        match self {
            Self::Variant(VariantLiteral::Integer(value)) => Instruction::StoreVariantInteger { property, value: *value },
            Self::Variant(VariantLiteral::Double(value)) => Instruction::StoreVariantDouble { property, value: *value },
            Self::Variant(VariantLiteral::Bool(value)) => Instruction::StoreVariantBool { property, value: *value },
            Self::Variant(VariantLiteral::String(s)) => Instruction::StoreVariant {
                property,
                value: output.pool.add_string(s),
            },
            Self::String(s) => Instruction::StoreString {
                property,
                value: output.pool.add_string(s),
            },
            Self::Url(s) => Instruction::StoreUrl {
                property,
                value: output.pool.add_url(s),
            },
            Self::Integer(value) | Self::Enum(value) => Instruction::StoreInteger { property, value: *value },
            Self::Float(value) => Instruction::StoreFloat { property, value: *value },
            Self::Double(value) => Instruction::StoreDouble { property, value: *value },
            Self::Color(value) => Instruction::StoreColor { property, value: *value },
            Self::Date(value) => Instruction::StoreDate { property, value: *value },
            Self::Time(fields) => Instruction::StoreTime {
                property,
                value: output.pool.add_int_data(fields),
            },
            Self::DateTime(fields) => Instruction::StoreDateTime {
                property,
                value: output.pool.add_int_data(fields),
            },
            Self::Point(v) => Instruction::StorePoint {
                property,
                value: output.pool.add_float_data(v),
            },
            Self::PointF(v) => Instruction::StorePointF {
                property,
                value: output.pool.add_float_data(v),
            },
            Self::Size(v) => Instruction::StoreSize {
                property,
                value: output.pool.add_float_data(v),
            },
            Self::SizeF(v) => Instruction::StoreSizeF {
                property,
                value: output.pool.add_float_data(v),
            },
            Self::Rect(v) => Instruction::StoreRect {
                property,
                value: output.pool.add_float_data(v),
            },
            Self::RectF(v) => Instruction::StoreRectF {
                property,
                value: output.pool.add_float_data(v),
            },
            Self::Vector3D(v) => Instruction::StoreVector3D {
                property,
                value: output.pool.add_float_data(v),
            },
            Self::Bool(value) => Instruction::StoreBool { property, value: *value },
            Self::Custom { text, type_code } => {
                let index = output.pool.add_string(text);
                let value = output.add_custom_type_data(CustomTypeData {
                    index,
                    type_code: *type_code,
                });
                Instruction::AssignCustomType { property, value }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::InMemoryRegistry;

    fn check(ty: PropertyType, value: ValueContent) -> Result<LiteralStore, String> {
        check_literal(&ty, None, &value, "file:///app/main.qml", &InMemoryRegistry::new())
    }

    fn num(n: f64) -> ValueContent {
        ValueContent::Literal(Literal::Number(n))
    }

    fn text(s: &str) -> ValueContent {
        ValueContent::Literal(Literal::String(s.into()))
    }

    #[test]
    fn test_integer_round_trip_check() {
        assert_eq!(check(PropertyType::Int, num(10.0)), Ok(LiteralStore::Integer(10)));
        assert_eq!(
            check(PropertyType::Int, num(1.5)),
            Err("Invalid property assignment: int expected".into())
        );
        assert_eq!(
            check(PropertyType::UInt, num(-1.0)),
            Err("Invalid property assignment: unsigned int expected".into())
        );
        assert_eq!(
            check(PropertyType::Int, text("10")),
            Err("Invalid property assignment: int expected".into())
        );
    }

    #[test]
    fn test_variant_shapes() {
        assert_eq!(
            check(PropertyType::Variant, num(3.0)),
            Ok(LiteralStore::Variant(VariantLiteral::Integer(3)))
        );
        assert_eq!(
            check(PropertyType::Variant, num(0.5)),
            Ok(LiteralStore::Variant(VariantLiteral::Double(0.5)))
        );
        assert_eq!(
            check(PropertyType::Variant, text("x")),
            Ok(LiteralStore::Variant(VariantLiteral::String("x".into())))
        );
    }

    #[test]
    fn test_enum_keys() {
        let plain = MetaEnum::new("HAlign", [("AlignLeft", 1), ("AlignRight", 2)]);
        let flags = MetaEnum::new("Alignment", [("Top", 1), ("Bottom", 2)]).flags();
        let registry = InMemoryRegistry::new();
        let store = |e: &MetaEnum, v: ValueContent| check_literal(&PropertyType::Int, Some(e), &v, "", &registry);

        assert_eq!(store(&plain, text("AlignRight")), Ok(LiteralStore::Enum(2)));
        assert_eq!(store(&flags, text("Top|Bottom")), Ok(LiteralStore::Enum(3)));
        assert_eq!(store(&plain, num(4.0)), Ok(LiteralStore::Enum(4)));
        assert_eq!(
            store(&plain, text("Middle")),
            Err("Invalid property assignment: unknown enumeration".into())
        );
    }

    #[test]
    fn test_color_literal_emits_argb() {
        let store = check(PropertyType::Color, text("#80112233")).unwrap();
        let mut output = CompiledComponent::new("file:///app/main.qml");
        match store.to_instruction(3, &mut output) {
            Instruction::StoreColor { property, value } => {
                assert_eq!(property, 3);
                assert_eq!(value >> 24, 0x80);
                assert_eq!((value >> 16) & 0xFF, 0x11);
                assert_eq!((value >> 8) & 0xFF, 0x22);
                assert_eq!(value & 0xFF, 0x33);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_unsupported_type_and_converter() {
        let custom = PropertyType::Custom(300, "Matrix".into());
        assert_eq!(
            check(custom.clone(), text("1 0 0 1")),
            Err("Invalid property assignment: unsupported type \"Matrix\"".into())
        );

        let mut registry = InMemoryRegistry::new();
        registry.register_string_converter(300);
        let store = check_literal(&custom, None, &text("1 0 0 1"), "", &registry).unwrap();
        let mut output = CompiledComponent::new("u");
        let instr = store.to_instruction(0, &mut output);
        assert_eq!(instr, Instruction::AssignCustomType { property: 0, value: 0 });
        assert_eq!(output.custom_type_data[0].type_code, 300);
    }

    #[test]
    fn test_url_is_resolved() {
        assert_eq!(
            check(PropertyType::Url, text("a.png")),
            Ok(LiteralStore::Url("file:///app/a.png".into()))
        );
        assert_eq!(check(PropertyType::Url, text("")), Ok(LiteralStore::Url(String::new())));
    }
}
