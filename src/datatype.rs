//! Conceptual data types and the value ordering they impose.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::str::FromStr;

/// The closed set of NORMA conceptual data types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataTypeKind {
    Unspecified,
    FixedLengthText,
    VariableLengthText,
    LargeLengthText,
    SignedInteger,
    SignedSmallInteger,
    SignedLargeInteger,
    UnsignedInteger,
    UnsignedTinyInteger,
    UnsignedSmallInteger,
    UnsignedLargeInteger,
    AutoCounter,
    FloatingPoint,
    SinglePrecisionFloatingPoint,
    DoublePrecisionFloatingPoint,
    Decimal,
    Money,
    FixedLengthRawData,
    VariableLengthRawData,
    LargeLengthRawData,
    PictureRawData,
    OleObjectRawData,
    AutoTimestamp,
    Time,
    Date,
    DateAndTime,
    TrueOrFalse,
    YesOrNo,
    RowId,
    ObjectId,
}

/// Broad family of a data type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataTypeCategory {
    Unspecified,
    Text,
    Numeric,
    RawData,
    Temporal,
    Logical,
    Other,
}

/// How two values of a data type compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueOrdering {
    Numeric,
    Lexicographic,
}

impl DataTypeKind {
    /// Map a `<orm:DataTypes>` child tag to its kind.
    pub fn from_tag(tag: &str) -> Option<Self> {
        let kind = match tag {
            "UnspecifiedDataType" => Self::Unspecified,
            "FixedLengthTextDataType" => Self::FixedLengthText,
            "VariableLengthTextDataType" => Self::VariableLengthText,
            "LargeLengthTextDataType" => Self::LargeLengthText,
            "SignedIntegerNumericDataType" => Self::SignedInteger,
            "SignedSmallIntegerNumericDataType" => Self::SignedSmallInteger,
            "SignedLargeIntegerNumericDataType" => Self::SignedLargeInteger,
            "UnsignedIntegerNumericDataType" => Self::UnsignedInteger,
            "UnsignedTinyIntegerNumericDataType" => Self::UnsignedTinyInteger,
            "UnsignedSmallIntegerNumericDataType" => Self::UnsignedSmallInteger,
            "UnsignedLargeIntegerNumericDataType" => Self::UnsignedLargeInteger,
            "AutoCounterNumericDataType" => Self::AutoCounter,
            "FloatingPointNumericDataType" => Self::FloatingPoint,
            "SinglePrecisionFloatingPointNumericDataType" => Self::SinglePrecisionFloatingPoint,
            "DoublePrecisionFloatingPointNumericDataType" => Self::DoublePrecisionFloatingPoint,
            "DecimalNumericDataType" => Self::Decimal,
            "MoneyNumericDataType" => Self::Money,
            "FixedLengthRawDataDataType" => Self::FixedLengthRawData,
            "VariableLengthRawDataDataType" => Self::VariableLengthRawData,
            "LargeLengthRawDataDataType" => Self::LargeLengthRawData,
            "PictureRawDataDataType" => Self::PictureRawData,
            "OleObjectRawDataDataType" => Self::OleObjectRawData,
            "AutoTimestampTemporalDataType" => Self::AutoTimestamp,
            "TimeTemporalDataType" => Self::Time,
            "DateTemporalDataType" => Self::Date,
            "DateAndTimeTemporalDataType" => Self::DateAndTime,
            "TrueOrFalseLogicalDataType" => Self::TrueOrFalse,
            "YesOrNoLogicalDataType" => Self::YesOrNo,
            "RowIdOtherDataType" => Self::RowId,
            "ObjectIdOtherDataType" => Self::ObjectId,
            _ => return None,
        };
        Some(kind)
    }

    pub fn category(&self) -> DataTypeCategory {
        use DataTypeKind::*;
        match self {
            Unspecified => DataTypeCategory::Unspecified,
            FixedLengthText | VariableLengthText | LargeLengthText => DataTypeCategory::Text,
            SignedInteger | SignedSmallInteger | SignedLargeInteger | UnsignedInteger
            | UnsignedTinyInteger | UnsignedSmallInteger | UnsignedLargeInteger | AutoCounter
            | FloatingPoint | SinglePrecisionFloatingPoint | DoublePrecisionFloatingPoint
            | Decimal | Money => DataTypeCategory::Numeric,
            FixedLengthRawData | VariableLengthRawData | LargeLengthRawData | PictureRawData
            | OleObjectRawData => DataTypeCategory::RawData,
            AutoTimestamp | Time | Date | DateAndTime => DataTypeCategory::Temporal,
            TrueOrFalse | YesOrNo => DataTypeCategory::Logical,
            RowId | ObjectId => DataTypeCategory::Other,
        }
    }

    pub fn ordering(&self) -> ValueOrdering {
        match self.category() {
            DataTypeCategory::Numeric => ValueOrdering::Numeric,
            _ => ValueOrdering::Lexicographic,
        }
    }
}

impl ValueOrdering {
    /// Ordering for bounds with no declared data type: numeric when every
    /// bound parses as a number.
    pub fn infer<'a>(values: impl IntoIterator<Item = &'a str>) -> Self {
        let mut values = values.into_iter().peekable();
        if values.peek().is_some() && values.all(|v| parse_number(v).is_ok()) {
            ValueOrdering::Numeric
        } else {
            ValueOrdering::Lexicographic
        }
    }

    /// Compare two bound values. Numeric values that fail to parse yield
    /// an error naming the offending text.
    pub fn compare(&self, left: &str, right: &str) -> Result<Ordering, String> {
        match self {
            ValueOrdering::Lexicographic => Ok(left.cmp(right)),
            ValueOrdering::Numeric => {
                let l = parse_number(left)?;
                let r = parse_number(right)?;
                Ok(l.cmp(&r))
            }
        }
    }
}

fn parse_number(text: &str) -> Result<Decimal, String> {
    let trimmed = text.trim();
    Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .map_err(|_| format!("'{}' is not a number", text))
}
