/*!
 * Typecodes
 *
 * Element formats follow the C type table; sizes and alignments come from
 * the platform's `core::ffi` types.
 *
 * | code | C type             | Scalar  |
 * |------|--------------------|---------|
 * | `c`  | char               | Byte    |
 * | `b`  | signed char        | Int     |
 * | `B`  | unsigned char      | UInt    |
 * | `h`  | short              | Int     |
 * | `H`  | unsigned short     | UInt    |
 * | `i`  | int                | Int     |
 * | `I`  | unsigned int       | UInt    |
 * | `l`  | long               | Int     |
 * | `L`  | unsigned long      | UInt    |
 * | `q`  | long long          | Int     |
 * | `Q`  | unsigned long long | UInt    |
 * | `f`  | float              | Float   |
 * | `d`  | double             | Float   |
 */

use super::types::ShmError;
use serde::{Deserialize, Serialize};
use std::ffi::{
    c_double, c_float, c_int, c_long, c_longlong, c_schar, c_short, c_uchar, c_uint, c_ulong,
    c_ulonglong, c_ushort,
};
use std::fmt;
use std::mem::{align_of, size_of};
use std::ptr;
use std::str::FromStr;

/// Element format of a cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeCode {
    Char,
    SignedChar,
    UnsignedChar,
    Short,
    UnsignedShort,
    Int,
    UnsignedInt,
    Long,
    UnsignedLong,
    LongLong,
    UnsignedLongLong,
    Float,
    Double,
}

impl TypeCode {
    pub const ALL: [TypeCode; 13] = [
        TypeCode::Char,
        TypeCode::SignedChar,
        TypeCode::UnsignedChar,
        TypeCode::Short,
        TypeCode::UnsignedShort,
        TypeCode::Int,
        TypeCode::UnsignedInt,
        TypeCode::Long,
        TypeCode::UnsignedLong,
        TypeCode::LongLong,
        TypeCode::UnsignedLongLong,
        TypeCode::Float,
        TypeCode::Double,
    ];

    pub fn from_char(code: char) -> Result<Self, ShmError> {
        Ok(match code {
            'c' => TypeCode::Char,
            'b' => TypeCode::SignedChar,
            'B' => TypeCode::UnsignedChar,
            'h' => TypeCode::Short,
            'H' => TypeCode::UnsignedShort,
            'i' => TypeCode::Int,
            'I' => TypeCode::UnsignedInt,
            'l' => TypeCode::Long,
            'L' => TypeCode::UnsignedLong,
            'q' => TypeCode::LongLong,
            'Q' => TypeCode::UnsignedLongLong,
            'f' => TypeCode::Float,
            'd' => TypeCode::Double,
            other => return Err(ShmError::UnknownTypeCode(other.to_string())),
        })
    }

    pub fn as_char(self) -> char {
        match self {
            TypeCode::Char => 'c',
            TypeCode::SignedChar => 'b',
            TypeCode::UnsignedChar => 'B',
            TypeCode::Short => 'h',
            TypeCode::UnsignedShort => 'H',
            TypeCode::Int => 'i',
            TypeCode::UnsignedInt => 'I',
            TypeCode::Long => 'l',
            TypeCode::UnsignedLong => 'L',
            TypeCode::LongLong => 'q',
            TypeCode::UnsignedLongLong => 'Q',
            TypeCode::Float => 'f',
            TypeCode::Double => 'd',
        }
    }

    /// Element size in bytes
    pub fn size(self) -> usize {
        match self {
            TypeCode::Char | TypeCode::UnsignedChar => size_of::<c_uchar>(),
            TypeCode::SignedChar => size_of::<c_schar>(),
            TypeCode::Short => size_of::<c_short>(),
            TypeCode::UnsignedShort => size_of::<c_ushort>(),
            TypeCode::Int => size_of::<c_int>(),
            TypeCode::UnsignedInt => size_of::<c_uint>(),
            TypeCode::Long => size_of::<c_long>(),
            TypeCode::UnsignedLong => size_of::<c_ulong>(),
            TypeCode::LongLong => size_of::<c_longlong>(),
            TypeCode::UnsignedLongLong => size_of::<c_ulonglong>(),
            TypeCode::Float => size_of::<c_float>(),
            TypeCode::Double => size_of::<c_double>(),
        }
    }

    /// Natural alignment in bytes
    pub fn align(self) -> usize {
        match self {
            TypeCode::Char | TypeCode::UnsignedChar => align_of::<c_uchar>(),
            TypeCode::SignedChar => align_of::<c_schar>(),
            TypeCode::Short => align_of::<c_short>(),
            TypeCode::UnsignedShort => align_of::<c_ushort>(),
            TypeCode::Int => align_of::<c_int>(),
            TypeCode::UnsignedInt => align_of::<c_uint>(),
            TypeCode::Long => align_of::<c_long>(),
            TypeCode::UnsignedLong => align_of::<c_ulong>(),
            TypeCode::LongLong => align_of::<c_longlong>(),
            TypeCode::UnsignedLongLong => align_of::<c_ulonglong>(),
            TypeCode::Float => align_of::<c_float>(),
            TypeCode::Double => align_of::<c_double>(),
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, TypeCode::Float | TypeCode::Double)
    }

    /// Convert `value` to this format, range-checked
    pub(crate) fn encode(self, value: Scalar) -> Result<Native, ShmError> {
        let code = self.as_char();
        let out_of_range = || ShmError::ValueOutOfRange {
            typecode: code,
            value: value.to_string(),
        };
        let mismatch = || ShmError::TypeMismatch {
            typecode: code,
            value: value.to_string(),
        };

        if self.is_float() {
            let f = match value {
                Scalar::Float(f) => f,
                Scalar::Int(i) => i as f64,
                Scalar::UInt(u) => u as f64,
                Scalar::Byte(_) => return Err(mismatch()),
            };
            return Ok(match self {
                TypeCode::Float => {
                    let narrowed = f as c_float;
                    if f.is_finite() && narrowed.is_infinite() {
                        return Err(out_of_range());
                    }
                    Native::Float(narrowed)
                }
                _ => Native::Double(f),
            });
        }

        if self == TypeCode::Char {
            return match value {
                Scalar::Byte(b) => Ok(Native::Char(b)),
                Scalar::Int(i) => u8::try_from(i).map(Native::Char).map_err(|_| out_of_range()),
                Scalar::UInt(u) => u8::try_from(u).map(Native::Char).map_err(|_| out_of_range()),
                Scalar::Float(_) => Err(mismatch()),
            };
        }

        // Integer cells: widen to i128 once, then narrow with a range check
        let wide: i128 = match value {
            Scalar::Int(i) => i as i128,
            Scalar::UInt(u) => u as i128,
            Scalar::Byte(b) => b as i128,
            Scalar::Float(_) => return Err(mismatch()),
        };
        macro_rules! narrow {
            ($ty:ty, $variant:ident) => {
                <$ty>::try_from(wide)
                    .map(Native::$variant)
                    .map_err(|_| out_of_range())
            };
        }
        match self {
            TypeCode::SignedChar => narrow!(c_schar, SignedChar),
            TypeCode::UnsignedChar => narrow!(c_uchar, UnsignedChar),
            TypeCode::Short => narrow!(c_short, Short),
            TypeCode::UnsignedShort => narrow!(c_ushort, UnsignedShort),
            TypeCode::Int => narrow!(c_int, Int),
            TypeCode::UnsignedInt => narrow!(c_uint, UnsignedInt),
            TypeCode::Long => narrow!(c_long, Long),
            TypeCode::UnsignedLong => narrow!(c_ulong, UnsignedLong),
            TypeCode::LongLong => narrow!(c_longlong, LongLong),
            TypeCode::UnsignedLongLong => narrow!(c_ulonglong, UnsignedLongLong),
            TypeCode::Char | TypeCode::Float | TypeCode::Double => Err(mismatch()),
        }
    }

    /// Read one element
    ///
    /// # Safety
    /// `ptr` must be valid for reads of `self.size()` bytes and aligned to `self.align()`.
    pub(crate) unsafe fn load(self, ptr: *const u8) -> Scalar {
        match self {
            TypeCode::Char => Scalar::Byte(ptr::read_volatile(ptr)),
            TypeCode::SignedChar => Scalar::Int(ptr::read_volatile(ptr as *const c_schar) as i64),
            TypeCode::UnsignedChar => {
                Scalar::UInt(ptr::read_volatile(ptr as *const c_uchar) as u64)
            }
            TypeCode::Short => Scalar::Int(ptr::read_volatile(ptr as *const c_short) as i64),
            TypeCode::UnsignedShort => {
                Scalar::UInt(ptr::read_volatile(ptr as *const c_ushort) as u64)
            }
            TypeCode::Int => Scalar::Int(ptr::read_volatile(ptr as *const c_int) as i64),
            TypeCode::UnsignedInt => Scalar::UInt(ptr::read_volatile(ptr as *const c_uint) as u64),
            TypeCode::Long => Scalar::Int(ptr::read_volatile(ptr as *const c_long) as i64),
            TypeCode::UnsignedLong => {
                Scalar::UInt(ptr::read_volatile(ptr as *const c_ulong) as u64)
            }
            TypeCode::LongLong => Scalar::Int(ptr::read_volatile(ptr as *const c_longlong) as i64),
            TypeCode::UnsignedLongLong => {
                Scalar::UInt(ptr::read_volatile(ptr as *const c_ulonglong) as u64)
            }
            TypeCode::Float => Scalar::Float(ptr::read_volatile(ptr as *const c_float) as f64),
            TypeCode::Double => Scalar::Float(ptr::read_volatile(ptr as *const c_double)),
        }
    }
}

impl fmt::Display for TypeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

impl FromStr for TypeCode {
    type Err = ShmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(code), None) => Self::from_char(code),
            _ => Err(ShmError::UnknownTypeCode(s.to_string())),
        }
    }
}

impl TryFrom<char> for TypeCode {
    type Error = ShmError;

    fn try_from(code: char) -> Result<Self, Self::Error> {
        Self::from_char(code)
    }
}

/// Dynamically typed element value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scalar {
    /// Raw byte of a `c` cell
    Byte(u8),
    Int(i64),
    UInt(u64),
    Float(f64),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Byte(b) => write!(f, "b'\\x{:02x}'", b),
            Scalar::Int(i) => write!(f, "{}", i),
            Scalar::UInt(u) => write!(f, "{}", u),
            Scalar::Float(x) => write!(f, "{}", x),
        }
    }
}

macro_rules! scalar_from {
    ($variant:ident <- $($ty:ty),+) => {
        $(impl From<$ty> for Scalar {
            fn from(value: $ty) -> Self {
                Scalar::$variant(value.into())
            }
        })+
    };
}

scalar_from!(Int <- i8, i16, i32, i64);
scalar_from!(UInt <- u16, u32, u64);
scalar_from!(Float <- f32, f64);

impl From<u8> for Scalar {
    fn from(value: u8) -> Self {
        Scalar::UInt(value as u64)
    }
}

/// Value converted to a cell's C representation
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Native {
    Char(u8),
    SignedChar(c_schar),
    UnsignedChar(c_uchar),
    Short(c_short),
    UnsignedShort(c_ushort),
    Int(c_int),
    UnsignedInt(c_uint),
    Long(c_long),
    UnsignedLong(c_ulong),
    LongLong(c_longlong),
    UnsignedLongLong(c_ulonglong),
    Float(c_float),
    Double(c_double),
}

impl Native {
    /// Write the value
    ///
    /// # Safety
    /// `ptr` must be valid for writes of the value's size and suitably aligned.
    pub(crate) unsafe fn store(self, ptr: *mut u8) {
        match self {
            Native::Char(v) => ptr::write_volatile(ptr, v),
            Native::SignedChar(v) => ptr::write_volatile(ptr as *mut c_schar, v),
            Native::UnsignedChar(v) => ptr::write_volatile(ptr as *mut c_uchar, v),
            Native::Short(v) => ptr::write_volatile(ptr as *mut c_short, v),
            Native::UnsignedShort(v) => ptr::write_volatile(ptr as *mut c_ushort, v),
            Native::Int(v) => ptr::write_volatile(ptr as *mut c_int, v),
            Native::UnsignedInt(v) => ptr::write_volatile(ptr as *mut c_uint, v),
            Native::Long(v) => ptr::write_volatile(ptr as *mut c_long, v),
            Native::UnsignedLong(v) => ptr::write_volatile(ptr as *mut c_ulong, v),
            Native::LongLong(v) => ptr::write_volatile(ptr as *mut c_longlong, v),
            Native::UnsignedLongLong(v) => ptr::write_volatile(ptr as *mut c_ulonglong, v),
            Native::Float(v) => ptr::write_volatile(ptr as *mut c_float, v),
            Native::Double(v) => ptr::write_volatile(ptr as *mut c_double, v),
        }
    }
}

mod sealed {
    pub trait Sealed {}
}

/// Rust primitives usable as typed cell elements
pub trait Element: sealed::Sealed + Copy + Send + fmt::Debug + PartialEq + 'static {
    const TYPECODE: TypeCode;
}

macro_rules! element {
    ($($ty:ty => $code:ident),+ $(,)?) => {
        $(
            impl sealed::Sealed for $ty {}
            impl Element for $ty {
                const TYPECODE: TypeCode = TypeCode::$code;
            }
        )+
    };
}

element! {
    i8 => SignedChar,
    u8 => UnsignedChar,
    i16 => Short,
    u16 => UnsignedShort,
    i32 => Int,
    u32 => UnsignedInt,
    i64 => LongLong,
    u64 => UnsignedLongLong,
    f32 => Float,
    f64 => Double,
}
