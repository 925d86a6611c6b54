//! Conversion of caller values into query strings, form fields and raw bodies.
//!
//! Instead of open-ended reflection, values opt in through a closed set of
//! capability traits:
//!
//! - [`Encodable`]: anything that becomes a query fragment or a set of form
//!   fields (strings, maps, pair lists, [`FormValues`], JSON objects and
//!   serializable records wrapped in [`Fields`]).
//! - [`FieldValue`]: the member shapes a map or record may hold (scalars and
//!   flat sequences of scalars).
//! - [`RawData`]: anything that becomes an opaque request body.

use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

use crate::{RequestError, Result};

/// Ordered multi-valued map of field names to values.
///
/// Keys iterate in sorted order; values keep their insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormValues {
    inner: BTreeMap<String, Vec<String>>,
}

impl FormValues {
    /// Create an empty set of values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value to the list stored under `key`.
    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.inner.entry(key.into()).or_default().push(value.into());
    }

    /// Replace every value stored under `key` with a single value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.inner.insert(key.into(), vec![value.into()]);
    }

    /// First value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.inner
            .get(key)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// All values stored under `key`.
    pub fn get_all(&self, key: &str) -> &[String] {
        self.inner.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    /// Remove `key` and return its values.
    pub fn remove(&mut self, key: &str) -> Option<Vec<String>> {
        self.inner.remove(key)
    }

    /// Check if there are no fields.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Iterate over `(key, values)` entries.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Iterate over flattened `(key, value)` pairs.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner
            .iter()
            .flat_map(|(k, values)| values.iter().map(move |v| (k.as_str(), v.as_str())))
    }

    /// Percent-encode the values as `key=value` pairs joined by `&`.
    pub fn to_urlencoded(&self) -> Result<String> {
        let pairs: Vec<(&str, &str)> = self.pairs().collect();
        serde_urlencoded::to_string(pairs).map_err(|e| RequestError::encoding(e.to_string()))
    }

    /// Parse a URL-encoded string such as `a=1&b=2&b=3`.
    pub fn parse(encoded: &str) -> Result<Self> {
        let pairs: Vec<(String, String)> = serde_urlencoded::from_str(encoded)
            .map_err(|e| RequestError::encoding(e.to_string()))?;
        Ok(pairs.into_iter().collect())
    }

    fn extend_from(&mut self, other: FormValues) {
        for (key, values) in other.inner {
            self.inner.entry(key).or_default().extend(values);
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FormValues {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut values = Self::new();
        for (k, v) in iter {
            values.append(k, v);
        }
        values
    }
}

/// Result of encoding a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Encoded {
    /// A literal fragment, used verbatim.
    Raw(String),
    /// Structured fields.
    Values(FormValues),
}

impl Encoded {
    /// Render as a query-string fragment.
    pub fn into_query(self) -> Result<String> {
        match self {
            Self::Raw(fragment) => Ok(fragment),
            Self::Values(values) => values.to_urlencoded(),
        }
    }

    /// Interpret as form fields. Literal strings are parsed as URL-encoded
    /// pairs.
    pub fn into_values(self) -> Result<FormValues> {
        match self {
            Self::Raw(fragment) => FormValues::parse(&fragment),
            Self::Values(values) => Ok(values),
        }
    }
}

/// A value that can be turned into a query fragment or form fields.
pub trait Encodable {
    /// Encode the value.
    fn encode(&self) -> Result<Encoded>;
}

impl<T: Encodable + ?Sized> Encodable for &T {
    fn encode(&self) -> Result<Encoded> {
        (**self).encode()
    }
}

impl Encodable for str {
    fn encode(&self) -> Result<Encoded> {
        Ok(Encoded::Raw(self.to_string()))
    }
}

impl Encodable for String {
    fn encode(&self) -> Result<Encoded> {
        self.as_str().encode()
    }
}

impl Encodable for FormValues {
    fn encode(&self) -> Result<Encoded> {
        Ok(Encoded::Values(self.clone()))
    }
}

impl<K, V, S> Encodable for HashMap<K, V, S>
where
    K: AsRef<str>,
    V: FieldValue,
{
    fn encode(&self) -> Result<Encoded> {
        encode_entries(self.iter())
    }
}

impl<K, V> Encodable for BTreeMap<K, V>
where
    K: AsRef<str>,
    V: FieldValue,
{
    fn encode(&self) -> Result<Encoded> {
        encode_entries(self.iter())
    }
}

impl<K, V> Encodable for [(K, V)]
where
    K: AsRef<str>,
    V: FieldValue,
{
    fn encode(&self) -> Result<Encoded> {
        encode_entries(self.iter().map(|(k, v)| (k, v)))
    }
}

impl<K, V> Encodable for Vec<(K, V)>
where
    K: AsRef<str>,
    V: FieldValue,
{
    fn encode(&self) -> Result<Encoded> {
        self.as_slice().encode()
    }
}

impl<K, V, const N: usize> Encodable for [(K, V); N]
where
    K: AsRef<str>,
    V: FieldValue,
{
    fn encode(&self) -> Result<Encoded> {
        self.as_slice().encode()
    }
}

impl Encodable for Value {
    fn encode(&self) -> Result<Encoded> {
        let Value::Object(members) = self else {
            return Err(RequestError::encoding(format!(
                "expected an object, found {}",
                kind_of(self)
            )));
        };
        let mut values = FormValues::new();
        for (key, member) in members {
            push_json_member(&mut values, key, member)?;
        }
        Ok(Encoded::Values(values))
    }
}

/// Wrapper that encodes a serializable record as flat fields.
///
/// The record must serialize to an object whose members are scalars or
/// arrays of scalars; `null` members are skipped.
///
/// ```
/// use requester_http::{Encodable, Fields};
/// use serde::Serialize;
///
/// #[derive(Serialize)]
/// struct Search {
///     q: String,
///     tags: Vec<String>,
/// }
///
/// let search = Search { q: "rust".into(), tags: vec!["a".into(), "b".into()] };
/// let query = Fields(&search).encode().unwrap().into_query().unwrap();
/// assert_eq!(query, "q=rust&tags=a&tags=b");
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Fields<T>(pub T);

impl<T: Serialize> Encodable for Fields<T> {
    fn encode(&self) -> Result<Encoded> {
        let value =
            serde_json::to_value(&self.0).map_err(|e| RequestError::encoding(e.to_string()))?;
        value.encode()
    }
}

fn encode_entries<'a, K, V, I>(entries: I) -> Result<Encoded>
where
    K: AsRef<str> + 'a,
    V: FieldValue + 'a,
    I: Iterator<Item = (&'a K, &'a V)>,
{
    let mut values = FormValues::new();
    for (key, value) in entries {
        value.push_values(key.as_ref(), &mut values);
    }
    Ok(Encoded::Values(values))
}

fn push_json_member(values: &mut FormValues, key: &str, member: &Value) -> Result<()> {
    match member {
        Value::Null => Ok(()),
        Value::Array(items) => {
            for item in items {
                let text = json_scalar(item).ok_or_else(|| {
                    RequestError::encoding(format!(
                        "field `{key}` holds a nested {} inside an array",
                        kind_of(item)
                    ))
                })?;
                values.append(key, text);
            }
            Ok(())
        }
        other => {
            let text = json_scalar(other).ok_or_else(|| {
                RequestError::encoding(format!("field `{key}` holds a nested {}", kind_of(other)))
            })?;
            values.append(key, text);
            Ok(())
        }
    }
}

fn json_scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A member value of a map or record: a scalar or a flat sequence of scalars.
pub trait FieldValue {
    /// Push this value's textual form(s) under `key`.
    fn push_values(&self, key: &str, values: &mut FormValues);
}

impl<T: FieldValue + ?Sized> FieldValue for &T {
    fn push_values(&self, key: &str, values: &mut FormValues) {
        (**self).push_values(key, values);
    }
}

macro_rules! scalar_field_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl FieldValue for $ty {
                fn push_values(&self, key: &str, values: &mut FormValues) {
                    values.append(key, self.to_string());
                }
            }
        )*
    };
}

scalar_field_value!(
    str, String, bool, char, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32,
    f64,
);

impl<T: FieldValue> FieldValue for [T] {
    fn push_values(&self, key: &str, values: &mut FormValues) {
        for item in self {
            item.push_values(key, values);
        }
    }
}

impl<T: FieldValue> FieldValue for Vec<T> {
    fn push_values(&self, key: &str, values: &mut FormValues) {
        self.as_slice().push_values(key, values);
    }
}

impl<T: FieldValue> FieldValue for Option<T> {
    fn push_values(&self, key: &str, values: &mut FormValues) {
        if let Some(value) = self {
            value.push_values(key, values);
        }
    }
}

/// Encode several values into a single query string, joined by `&`.
///
/// Literal strings are used verbatim; structured values are percent-encoded.
/// Empty fragments are skipped.
pub fn to_query_fragment(values: &[&dyn Encodable]) -> Result<String> {
    let mut fragments = Vec::with_capacity(values.len());
    for value in values {
        let fragment = value.encode()?.into_query()?;
        if !fragment.is_empty() {
            fragments.push(fragment);
        }
    }
    Ok(fragments.join("&"))
}

/// Merge several values into one set of form fields.
pub fn to_form_values(values: &[&dyn Encodable]) -> Result<FormValues> {
    let mut merged = FormValues::new();
    for value in values {
        merged.extend_from(value.encode()?.into_values()?);
    }
    Ok(merged)
}

/// A value that can be used verbatim as a request body.
pub trait RawData {
    /// Convert into body bytes.
    fn to_raw_bytes(&self) -> Result<Bytes>;
}

impl<T: RawData + ?Sized> RawData for &T {
    fn to_raw_bytes(&self) -> Result<Bytes> {
        (**self).to_raw_bytes()
    }
}

impl RawData for str {
    fn to_raw_bytes(&self) -> Result<Bytes> {
        Ok(Bytes::copy_from_slice(self.as_bytes()))
    }
}

impl RawData for String {
    fn to_raw_bytes(&self) -> Result<Bytes> {
        self.as_str().to_raw_bytes()
    }
}

impl RawData for [u8] {
    fn to_raw_bytes(&self) -> Result<Bytes> {
        Ok(Bytes::copy_from_slice(self))
    }
}

impl<const N: usize> RawData for [u8; N] {
    fn to_raw_bytes(&self) -> Result<Bytes> {
        self.as_slice().to_raw_bytes()
    }
}

impl RawData for Vec<u8> {
    fn to_raw_bytes(&self) -> Result<Bytes> {
        self.as_slice().to_raw_bytes()
    }
}

impl RawData for Bytes {
    fn to_raw_bytes(&self) -> Result<Bytes> {
        Ok(self.clone())
    }
}

impl RawData for Value {
    fn to_raw_bytes(&self) -> Result<Bytes> {
        Json(self).to_raw_bytes()
    }
}

/// Wrapper that serializes a value as a JSON body.
#[derive(Debug, Clone, Copy)]
pub struct Json<T>(pub T);

impl<T: Serialize> RawData for Json<T> {
    fn to_raw_bytes(&self) -> Result<Bytes> {
        serde_json::to_vec(&self.0)
            .map(Bytes::from)
            .map_err(|e| RequestError::encoding(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Serialize)]
    struct Page {
        page: u32,
        size: u32,
        sort: Option<String>,
    }

    #[derive(Serialize)]
    struct Filter {
        name: String,
        ids: Vec<u64>,
    }

    #[derive(Serialize)]
    struct Nested {
        inner: Filter,
    }

    #[test]
    fn test_literal_strings_are_verbatim() {
        let fragment = to_query_fragment(&[&"a=1", &"b=%20x"]).unwrap();
        assert_eq!(fragment, "a=1&b=%20x");
    }

    #[test]
    fn test_record_fields() {
        let page = Page { page: 2, size: 50, sort: None };
        let fragment = to_query_fragment(&[&Fields(&page)]).unwrap();
        assert_eq!(fragment, "page=2&size=50");
    }

    #[test]
    fn test_sequence_fields_repeat() {
        let filter = Filter { name: "a b".to_string(), ids: vec![1, 2] };
        let fragment = to_query_fragment(&[&Fields(&filter)]).unwrap();
        assert_eq!(fragment, "ids=1&ids=2&name=a+b");
    }

    #[test]
    fn test_nested_record_rejected() {
        let nested = Nested {
            inner: Filter { name: "x".to_string(), ids: vec![] },
        };
        let err = to_query_fragment(&[&Fields(&nested)]).unwrap_err();
        assert!(err.is_encoding());
    }

    #[test]
    fn test_non_object_record_rejected() {
        let err = Fields(vec![1, 2, 3]).encode().unwrap_err();
        assert!(err.is_encoding());
    }

    #[test]
    fn test_map_shapes() {
        let mut single: HashMap<&str, i64> = HashMap::new();
        single.insert("n", 7);
        let mut multi: BTreeMap<String, Vec<i32>> = BTreeMap::new();
        multi.insert("m".to_string(), vec![1, 2]);

        let fragment = to_query_fragment(&[&single, &multi]).unwrap();
        assert_eq!(fragment, "n=7&m=1&m=2");
    }

    #[test]
    fn test_mixed_literal_and_structured() {
        let pairs = [("k", "v w")];
        let fragment = to_query_fragment(&[&"a=1", &pairs, &""]).unwrap();
        assert_eq!(fragment, "a=1&k=v+w");
    }

    #[test]
    fn test_form_values_round_trip() {
        let source = json!({"a": "1", "b": ["2", "3"]});
        let values = source.encode().unwrap().into_values().unwrap();
        let decoded = FormValues::parse(&values.to_urlencoded().unwrap()).unwrap();

        assert_eq!(decoded, values);
        assert_eq!(decoded.get_all("a"), ["1"]);
        assert_eq!(decoded.get_all("b"), ["2", "3"]);
    }

    #[test]
    fn test_string_as_form_values() {
        let values = to_form_values(&[&"x=1&x=2", &[("y", "3")]]).unwrap();
        assert_eq!(values.get_all("x"), ["1", "2"]);
        assert_eq!(values.get("y"), Some("3"));
    }

    #[test]
    fn test_raw_bytes() {
        assert_eq!("hi".to_raw_bytes().unwrap(), Bytes::from_static(b"hi"));
        assert_eq!(vec![0u8, 159].to_raw_bytes().unwrap().as_ref(), &[0u8, 159]);
        assert_eq!(
            json!({"x": 1}).to_raw_bytes().unwrap(),
            Bytes::from_static(br#"{"x":1}"#)
        );
    }

    #[test]
    fn test_unserializable_json_rejected() {
        let mut bad: HashMap<(u8, u8), u8> = HashMap::new();
        bad.insert((1, 2), 3);
        let err = Json(&bad).to_raw_bytes().unwrap_err();
        assert!(err.is_encoding());
    }
}
