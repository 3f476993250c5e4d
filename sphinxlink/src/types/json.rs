use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::row::{Column, Decode, DecodeError};

/// Decode json attribute text.
///
/// Pair with [`FieldType::Json`][crate::FieldType::Json] or [`FieldType::Text`][crate::FieldType::Text].
#[derive(Debug)]
pub struct Json<T>(pub T);

impl<T> Decode for Json<T>
where
    T: DeserializeOwned,
{
    fn decode(column: Column) -> Result<Self, DecodeError> {
        let value = column.try_into_text()?;
        serde_json::from_slice(&value).map(Json).map_err(Into::into)
    }
}

impl<T: Serialize> Serialize for Json<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Json<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Ok(Self(T::deserialize(deserializer)?))
    }
}
