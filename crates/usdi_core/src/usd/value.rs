//! Typed attribute values shared by the parser and its consumers.
//!
//! The scene language is richly typed; this model keeps only the
//! closed set of variants the pipeline needs. Lookup is by name and
//! expected variant: asking for the wrong variant behaves as if the
//! attribute were absent.

use usdi_math::{Mat4, Vec2, Vec3, Vec4};

/// A tagged attribute value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i32),
    Float(f32),
    Double(f64),
    Str(String),
    /// Interned symbol (`token` in the source language).
    Token(String),
    /// Bare file-reference string (`asset`).
    Asset(String),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Matrix(Mat4),

    BoolArray(Vec<bool>),
    IntArray(Vec<i32>),
    FloatArray(Vec<f32>),
    DoubleArray(Vec<f64>),
    StrArray(Vec<String>),
    TokenArray(Vec<String>),
    AssetArray(Vec<String>),
    Vec2Array(Vec<Vec2>),
    Vec3Array(Vec<Vec3>),
    Vec4Array(Vec<Vec4>),
    MatrixArray(Vec<Mat4>),
}

impl Value {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Any scalar number, widened to f64. Used where the source type
    /// is authoring-dependent (`float` vs `double` vs a bare int).
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v as f64),
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// String or token text. Stage metadata is authored either way.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Str(s) | Value::Token(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_asset(&self) -> Option<&str> {
        match self {
            Value::Asset(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_vec3(&self) -> Option<Vec3> {
        match self {
            Value::Vec3(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_vec4(&self) -> Option<Vec4> {
        match self {
            Value::Vec4(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_matrix(&self) -> Option<&Mat4> {
        match self {
            Value::Matrix(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_int_array(&self) -> Option<&[i32]> {
        match self {
            Value::IntArray(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_vec2_array(&self) -> Option<&[Vec2]> {
        match self {
            Value::Vec2Array(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_vec3_array(&self) -> Option<&[Vec3]> {
        match self {
            Value::Vec3Array(v) => Some(v),
            _ => None,
        }
    }

    /// Token or string array text.
    pub fn as_text_array(&self) -> Option<&[String]> {
        match self {
            Value::TokenArray(v) | Value::StrArray(v) | Value::AssetArray(v) => Some(v),
            _ => None,
        }
    }
}

/// The scalar shape a declared type name maps to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScalarType {
    Bool,
    Int,
    Float,
    Double,
    Str,
    Token,
    Asset,
    Vec2,
    Vec3,
    Vec4,
    Matrix,
}

impl ScalarType {
    /// Map a declared type name to its value shape.
    ///
    /// Unknown names return `None`; the parser then skips one
    /// balanced value and records no attribute.
    pub fn from_type_name(name: &str) -> Option<ScalarType> {
        Some(match name {
            "bool" => ScalarType::Bool,
            "int" | "uint" | "int64" | "uchar" => ScalarType::Int,
            "float" | "half" => ScalarType::Float,
            "double" => ScalarType::Double,
            "string" => ScalarType::Str,
            "token" => ScalarType::Token,
            "asset" => ScalarType::Asset,
            "float2" | "double2" | "half2" | "texCoord2f" => ScalarType::Vec2,
            "float3" | "double3" | "half3" | "point3f" | "normal3f" | "vector3f" | "color3f" => {
                ScalarType::Vec3
            }
            "float4" | "double4" | "half4" | "quath" | "quatf" | "quatd" => ScalarType::Vec4,
            "matrix4d" => ScalarType::Matrix,
            _ => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mismatched_type_is_absent() {
        let v = Value::Int(3);
        assert_eq!(v.as_bool(), None);
        assert_eq!(v.as_vec3(), None);
        assert_eq!(v.as_int(), Some(3));
    }

    #[test]
    fn test_number_widening() {
        assert_eq!(Value::Int(2).as_number(), Some(2.0));
        assert_eq!(Value::Float(1.5).as_number(), Some(1.5));
        assert_eq!(Value::Double(0.25).as_number(), Some(0.25));
        assert_eq!(Value::Str("2".into()).as_number(), None);
    }

    #[test]
    fn test_text_accepts_string_and_token() {
        assert_eq!(Value::Str("Y".into()).as_text(), Some("Y"));
        assert_eq!(Value::Token("Z".into()).as_text(), Some("Z"));
    }

    #[test]
    fn test_type_name_mapping() {
        assert_eq!(ScalarType::from_type_name("point3f"), Some(ScalarType::Vec3));
        assert_eq!(ScalarType::from_type_name("quatf"), Some(ScalarType::Vec4));
        assert_eq!(ScalarType::from_type_name("matrix4d"), Some(ScalarType::Matrix));
        assert_eq!(ScalarType::from_type_name("color4f"), None);
    }
}
