use crate::atom::types::Value;
use crate::error::AtomError;
use once_cell::unsync::OnceCell;
use serde::de::{self, DeserializeSeed, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde::{Deserializer, Serialize};
use serde::de::DeserializeOwned;
use std::fmt;

/// Serializes an atom as a MessagePack map keyed by field name.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, AtomError> {
    rmp_serde::to_vec_named(value).map_err(|e| AtomError::Encode(e.to_string()))
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, AtomError> {
    rmp_serde::from_slice(bytes).map_err(|e| AtomError::Decode(e.to_string()))
}

/// Reads one top-level scalar field out of an encoded atom without
/// materializing it. Absent fields, nil and non-scalar values yield `None`.
pub fn extract_field(bytes: &[u8], name: &str) -> Result<Option<Value>, AtomError> {
    let mut deserializer = rmp_serde::Deserializer::from_read_ref(bytes);
    FieldSeed { name }
        .deserialize(&mut deserializer)
        .map_err(|e| AtomError::Decode(e.to_string()))
}

struct FieldSeed<'n> {
    name: &'n str,
}

impl<'de> DeserializeSeed<'de> for FieldSeed<'_> {
    type Value = Option<Value>;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        deserializer.deserialize_map(self)
    }
}

impl<'de> Visitor<'de> for FieldSeed<'_> {
    type Value = Option<Value>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an encoded atom map")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut found = None;
        // Drain every entry so the reader ends on a record boundary.
        while let Some(matched) = map.next_key_seed(KeyMatch { name: self.name })? {
            if matched && found.is_none() {
                found = map.next_value_seed(ScalarSeed)?;
            } else {
                map.next_value::<IgnoredAny>()?;
            }
        }
        Ok(found)
    }
}

struct KeyMatch<'n> {
    name: &'n str,
}

impl<'de> DeserializeSeed<'de> for KeyMatch<'_> {
    type Value = bool;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<bool, D::Error> {
        deserializer.deserialize_str(self)
    }
}

impl<'de> Visitor<'de> for KeyMatch<'_> {
    type Value = bool;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a field name")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<bool, E> {
        Ok(v == self.name)
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<bool, E> {
        Ok(v == self.name.as_bytes())
    }

    fn visit_u64<E: de::Error>(self, _v: u64) -> Result<bool, E> {
        Ok(false)
    }
}

struct ScalarSeed;

impl<'de> DeserializeSeed<'de> for ScalarSeed {
    type Value = Option<Value>;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        deserializer.deserialize_any(self)
    }
}

impl<'de> Visitor<'de> for ScalarSeed {
    type Value = Option<Value>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a scalar field value")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Self::Value, E> {
        Ok(Some(Value::Boolean(v)))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        Ok(Some(Value::Integer(v)))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(i64::try_from(v).ok().map(Value::Integer))
    }

    fn visit_f32<E: de::Error>(self, v: f32) -> Result<Self::Value, E> {
        self.visit_f64(f64::from(v))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        Ok(Value::Float(v).known())
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        Ok(Some(Value::Text(v.into())))
    }

    fn visit_bytes<E: de::Error>(self, _v: &[u8]) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        deserializer.deserialize_any(self)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        while seq.next_element::<IgnoredAny>()?.is_some() {}
        Ok(None)
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        while map.next_entry::<IgnoredAny, IgnoredAny>()?.is_some() {}
        Ok(None)
    }
}

/// A scanned record that decodes into `E` at most once, on first use.
pub struct EncodedAtom<E> {
    bytes: Vec<u8>,
    decoded: OnceCell<E>,
}

impl<E: DeserializeOwned> EncodedAtom<E> {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            decoded: OnceCell::new(),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn is_decoded(&self) -> bool {
        self.decoded.get().is_some()
    }

    pub fn atom(&self) -> Result<&E, AtomError> {
        self.decoded.get_or_try_init(|| decode(&self.bytes))
    }

    pub fn into_atom(self) -> Result<E, AtomError> {
        match self.decoded.into_inner() {
            Some(atom) => Ok(atom),
            None => decode(&self.bytes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{EncodedAtom, decode, encode, extract_field};
    use crate::atom::types::Value;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    enum Gear {
        Sword { damage: i16 },
        Orb { name: String },
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Record {
        name: String,
        gear: Option<Gear>,
        tags: Vec<String>,
        mana: i32,
        speed: f32,
        hidden: Option<bool>,
        alive: bool,
    }

    fn sample() -> Record {
        Record {
            name: "orc".into(),
            gear: Some(Gear::Orb { name: "ember".into() }),
            tags: vec!["a".into(), "b".into()],
            mana: -40,
            speed: 1.5,
            hidden: None,
            alive: true,
        }
    }

    #[test]
    fn extract_reads_scalars_after_nested_values() {
        let bytes = encode(&sample()).expect("encode");
        assert_eq!(
            extract_field(&bytes, "mana").expect("extract"),
            Some(Value::Integer(-40))
        );
        assert_eq!(
            extract_field(&bytes, "speed").expect("extract"),
            Some(Value::Float(1.5))
        );
        assert_eq!(
            extract_field(&bytes, "name").expect("extract"),
            Some(Value::Text("orc".into()))
        );
        assert_eq!(
            extract_field(&bytes, "alive").expect("extract"),
            Some(Value::Boolean(true))
        );
    }

    #[test]
    fn extract_treats_nil_missing_and_composite_fields_as_absent() {
        let bytes = encode(&sample()).expect("encode");
        assert_eq!(extract_field(&bytes, "hidden").expect("extract"), None);
        assert_eq!(extract_field(&bytes, "no_such_field").expect("extract"), None);
        assert_eq!(extract_field(&bytes, "tags").expect("extract"), None);
        assert_eq!(extract_field(&bytes, "gear").expect("extract"), None);
    }

    #[test]
    fn extract_treats_nan_as_absent() {
        let record = Record {
            speed: f32::NAN,
            ..sample()
        };
        let bytes = encode(&record).expect("encode");
        assert_eq!(extract_field(&bytes, "speed").expect("extract"), None);
    }

    #[test]
    fn encoded_atom_decodes_once() {
        let bytes = encode(&sample()).expect("encode");
        let encoded: EncodedAtom<Record> = EncodedAtom::new(bytes);
        assert!(!encoded.is_decoded());
        assert_eq!(encoded.atom().expect("decode").mana, -40);
        assert!(encoded.is_decoded());
        assert_eq!(encoded.into_atom().expect("decode"), sample());
    }

    #[test]
    fn truncated_records_fail_to_decode() {
        let bytes = encode(&sample()).expect("encode");
        let err = decode::<Record>(&bytes[..bytes.len() / 2]).expect_err("truncated");
        assert_eq!(err.code_str(), "decode");
    }
}
