use time::{PrimitiveDateTime, UtcDateTime};

use crate::row::{Column, Decode, DecodeError, Value};

/// `searchd` sends `timestamp` attributes as unix seconds.
fn unix_seconds(column: Column) -> Result<i64, DecodeError> {
    match column.into_value() {
        Value::Int(secs) => Ok(secs),
        Value::Null => Err(DecodeError::Null),
        value => Err(DecodeError::mismatch("timestamp", &value)),
    }
}

impl Decode for UtcDateTime {
    fn decode(column: Column) -> Result<Self, DecodeError> {
        let secs = unix_seconds(column)?;
        UtcDateTime::from_unix_timestamp(secs).map_err(|_| DecodeError::OutOfRange(secs))
    }
}

/// Decoded as UTC.
impl Decode for PrimitiveDateTime {
    fn decode(column: Column) -> Result<Self, DecodeError> {
        let utc = UtcDateTime::decode(column)?;
        Ok(PrimitiveDateTime::new(utc.date(), utc.time()))
    }
}
